//! Text utilities: offset/line conversion, indentation, span extraction.
//!
//! Lines are 1-indexed. Offsets are byte offsets into UTF-8 text.

use crate::types::Span;

/// Convert a byte offset to a 1-indexed `(line, col)` pair.
///
/// Offsets past the end clamp to the end of the content.
pub fn byte_offset_to_position(content: &str, offset: usize) -> (u32, u32) {
    let offset = offset.min(content.len());
    let mut line = 1u32;
    let mut col = 1u32;
    for (i, byte) in content.bytes().enumerate() {
        if i >= offset {
            break;
        }
        if byte == b'\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// 1-indexed line number of a byte offset.
pub fn line_of(content: &str, offset: usize) -> u32 {
    byte_offset_to_position(content, offset).0
}

/// Offset of the first byte of the line containing `offset`.
pub fn line_start(content: &str, offset: usize) -> usize {
    let offset = offset.min(content.len());
    content[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

/// Offset of the newline ending the line containing `offset`, or the end of
/// the content when the line is the last one.
pub fn line_end(content: &str, offset: usize) -> usize {
    let offset = offset.min(content.len());
    content[offset..]
        .find('\n')
        .map(|i| offset + i)
        .unwrap_or(content.len())
}

/// Leading whitespace of the line containing `offset`.
pub fn indent_at(content: &str, offset: usize) -> &str {
    let start = line_start(content, offset);
    let rest = &content[start..];
    let width = rest
        .bytes()
        .take_while(|b| *b == b' ' || *b == b'\t')
        .count();
    &rest[..width]
}

/// Extract the text of a span, or `None` if the span is out of bounds or
/// does not fall on character boundaries.
pub fn extract_span<'a>(content: &'a str, span: &Span) -> Option<&'a str> {
    content.get(span.start..span.end)
}

/// Widen a statement span to cover its whole line(s) when nothing but
/// whitespace shares those lines, so that removing it leaves no blank line.
pub fn whole_line_span(content: &str, span: &Span) -> Span {
    let start = line_start(content, span.start);
    let before_blank = content[start..span.start].trim().is_empty();
    let end = line_end(content, span.end);
    let after_blank = content[span.end.min(end)..end].trim().is_empty();
    if before_blank && after_blank {
        let end = if end < content.len() { end + 1 } else { end };
        Span::new(start, end)
    } else {
        *span
    }
}

// ============================================================================
// Tests
// ============================================================================
