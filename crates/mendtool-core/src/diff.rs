//! Line diffs for stored candidates.
//!
//! Hunks come from a longest-common-subsequence alignment of lines and carry
//! up to [`CONTEXT_LINES`] lines of context. Adjacent hunks whose contexts
//! touch are coalesced.

use std::fmt::Write as _;

pub const CONTEXT_LINES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line<'a> {
    Same(&'a str),
    Removed(&'a str),
    Added(&'a str),
}

fn align<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<Line<'a>> {
    let (n, m) = (old.len(), new.len());
    let mut table = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if old[i] == new[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }
    let mut out = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            out.push(Line::Same(old[i]));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            out.push(Line::Removed(old[i]));
            i += 1;
        } else {
            out.push(Line::Added(new[j]));
            j += 1;
        }
    }
    out.extend(old[i..].iter().map(|l| Line::Removed(*l)));
    out.extend(new[j..].iter().map(|l| Line::Added(*l)));
    out
}

/// Unified diff of `old` against `new`, labelled with `path`. Empty when the
/// texts are equal.
pub fn unified_diff(path: &str, old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let lines = align(&old_lines, &new_lines);

    // Index ranges of `lines` to print, widened by context and merged.
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if matches!(line, Line::Same(_)) {
            continue;
        }
        let start = i.saturating_sub(CONTEXT_LINES);
        let end = (i + CONTEXT_LINES + 1).min(lines.len());
        match ranges.last_mut() {
            Some(last) if start <= last.1 => last.1 = end,
            _ => ranges.push((start, end)),
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "--- a/{}", path);
    let _ = writeln!(out, "+++ b/{}", path);
    for (start, end) in ranges {
        let old_start = 1 + lines[..start].iter().filter(|l| !matches!(l, Line::Added(_))).count();
        let new_start = 1 + lines[..start].iter().filter(|l| !matches!(l, Line::Removed(_))).count();
        let hunk = &lines[start..end];
        let old_count = hunk.iter().filter(|l| !matches!(l, Line::Added(_))).count();
        let new_count = hunk.iter().filter(|l| !matches!(l, Line::Removed(_))).count();
        let _ = writeln!(out, "@@ -{},{} +{},{} @@", old_start, old_count, new_start, new_count);
        for line in hunk {
            let _ = match line {
                Line::Same(l) => writeln!(out, " {}", l),
                Line::Removed(l) => writeln!(out, "-{}", l),
                Line::Added(l) => writeln!(out, "+{}", l),
            };
        }
    }
    out
}
