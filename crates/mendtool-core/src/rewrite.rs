//! Span-anchored text edits.
//!
//! Edits always refer to offsets in the base text. [`splice`] applies them
//! back to front so earlier offsets stay valid. Insertions at the same
//! offset keep the order they were added in.

use serde::{Deserialize, Serialize};

use crate::types::Span;

/// Replace `span` of the base text with `text`. An empty span inserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub span: Span,
    pub text: String,
}

impl TextEdit {
    pub fn new(span: Span, text: impl Into<String>) -> Self {
        TextEdit {
            span,
            text: text.into(),
        }
    }

    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        TextEdit::new(Span::point(offset), text)
    }

    pub fn delete(span: Span) -> Self {
        TextEdit::new(span, String::new())
    }
}

/// Apply `edits` to `base`. When two edits overlap, the one starting later
/// wins and the other is dropped.
pub fn splice(base: &str, edits: &[TextEdit]) -> String {
    let mut order: Vec<usize> = (0..edits.len()).collect();
    // Descending start, then descending end; among insertions at one offset
    // the later-added goes first so that the earlier one ends up leftmost.
    order.sort_by(|a, b| {
        let (ea, eb) = (&edits[*a].span, &edits[*b].span);
        eb.start.cmp(&ea.start).then(eb.end.cmp(&ea.end)).then(b.cmp(a))
    });
    let mut out = base.to_string();
    let mut claimed: Option<usize> = None;
    for i in order {
        let edit = &edits[i];
        let (start, end) = (edit.span.start.min(base.len()), edit.span.end.min(base.len()));
        if let Some(floor) = claimed {
            if end > floor {
                continue;
            }
        }
        if !out.is_char_boundary(start) || !out.is_char_boundary(end) {
            continue;
        }
        out.replace_range(start..end, &edit.text);
        claimed = Some(start);
    }
    out
}

/// Pending edits over a fixed base text.
#[derive(Debug, Clone, Default)]
pub struct EditBuffer {
    edits: Vec<TextEdit>,
}

impl EditBuffer {
    pub fn new() -> Self {
        EditBuffer::default()
    }

    pub fn push(&mut self, edit: TextEdit) {
        self.edits.push(edit);
    }

    pub fn edits(&self) -> &[TextEdit] {
        &self.edits
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Render the buffer over `base` and clear it.
    pub fn render(&mut self, base: &str) -> String {
        let out = splice(base, &self.edits);
        self.edits.clear();
        out
    }

    pub fn clear(&mut self) {
        self.edits.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacements_use_base_offsets() {
        let base = "if (a == b) x();";
        let edits = vec![
            TextEdit::new(Span::new(6, 8), "!="),
            TextEdit::new(Span::new(12, 15), "y()"),
        ];
        assert_eq!(splice(base, &edits), "if (a != b) y();");
    }

    #[test]
    fn insertions_at_same_offset_keep_order() {
        let edits = vec![TextEdit::insert(1, "x"), TextEdit::insert(1, "y")];
        assert_eq!(splice("ab", &edits), "axyb");
    }

    #[test]
    fn overlapping_edit_is_dropped() {
        let edits = vec![
            TextEdit::new(Span::new(0, 4), "ZZ"),
            TextEdit::new(Span::new(2, 6), "QQ"),
        ];
        assert_eq!(splice("abcdef", &edits), "abQQ");
    }

    #[test]
    fn insertion_lands_before_replacement_at_same_offset() {
        let edits = vec![
            TextEdit::new(Span::new(0, 1), "B"),
            TextEdit::insert(0, "x "),
        ];
        assert_eq!(splice("ab", &edits), "x Bb");
    }

    #[test]
    fn render_resets_buffer() {
        let mut buffer = EditBuffer::new();
        buffer.push(TextEdit::delete(Span::new(0, 1)));
        assert_eq!(buffer.render("ab"), "b");
        assert!(buffer.is_empty());
        assert_eq!(buffer.render("ab"), "ab");
    }
}
