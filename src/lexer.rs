//! Minimal concrete-syntax view of a C-family source file.
//!
//! The source is cut into a flat list of [`Segment`]s: code, comments, and literals. Everything
//! that splices student code relies on this view so that braces, semicolons, or signatures that
//! appear inside strings and comments are never mistaken for structure.

use std::ops::Range;

use crate::rubric::FragmentShape;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Code,
    LineComment,
    BlockComment,
    Str,
    Char,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub span: Range<usize>,
}

pub struct SourceMap<'a> {
    text: &'a str,
    segments: Vec<Segment>,
}

impl<'a> SourceMap<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            segments: scan(text),
        }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    fn segment_at(&self, offset: usize) -> Option<&Segment> {
        let idx = self.segments.partition_point(|s| s.span.end <= offset);
        self.segments.get(idx).filter(|s| s.span.start <= offset)
    }

    pub fn is_code(&self, offset: usize) -> bool {
        matches!(self.segment_at(offset), Some(s) if s.kind == SegmentKind::Code)
    }

    /// Code characters at or after `offset`, with comments and literals skipped.
    pub fn code_from(&self, offset: usize) -> impl Iterator<Item = (usize, char)> + '_ {
        self.segments
            .iter()
            .filter(move |s| s.kind == SegmentKind::Code && s.span.end > offset)
            .flat_map(move |s| {
                let start = s.span.start.max(offset);
                self.text[start..s.span.end]
                    .char_indices()
                    .map(move |(i, c)| (start + i, c))
            })
    }

    /// Offset of the bracket closing the one at `open`, tracking `()`, `[]` and `{}` together.
    pub fn matching_close(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (pos, c) in self.code_from(open) {
            match c {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(pos);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// True when `range` holds nothing but whitespace and comments.
    pub fn is_blank(&self, range: Range<usize>) -> bool {
        self.segments
            .iter()
            .filter(|s| s.span.start < range.end && s.span.end > range.start)
            .all(|s| match s.kind {
                SegmentKind::LineComment | SegmentKind::BlockComment => true,
                SegmentKind::Code => {
                    let start = s.span.start.max(range.start);
                    let end = s.span.end.min(range.end);
                    self.text[start..end].trim().is_empty()
                }
                SegmentKind::Str | SegmentKind::Char => false,
            })
    }
}

fn scan(text: &str) -> Vec<Segment> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut code_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let (kind, end) = match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => (SegmentKind::LineComment, line_end(bytes, i)),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                (SegmentKind::BlockComment, block_comment_end(bytes, i + 2))
            }
            b'"' if bytes[i..].starts_with(b"\"\"\"") => (SegmentKind::Str, text_block_end(bytes, i + 3)),
            b'"' => (SegmentKind::Str, quoted_end(bytes, i + 1, b'"')),
            b'\'' => (SegmentKind::Char, quoted_end(bytes, i + 1, b'\'')),
            _ => {
                i += 1;
                continue;
            }
        };
        push_code(&mut segments, code_start..i);
        segments.push(Segment { kind, span: i..end });
        code_start = end;
        i = end;
    }
    push_code(&mut segments, code_start..bytes.len());

    segments
}

fn push_code(segments: &mut Vec<Segment>, span: Range<usize>) {
    if !span.is_empty() {
        segments.push(Segment {
            kind: SegmentKind::Code,
            span,
        });
    }
}

// The newline itself stays in the following code segment.
fn line_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| from + p)
}

fn block_comment_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |p| from + p + 2)
}

// Unterminated literals stop at the end of their line.
fn quoted_end(bytes: &[u8], from: usize, quote: u8) -> usize {
    let mut j = from;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b'\n' => return j,
            b if b == quote => return j + 1,
            _ => j += 1,
        }
    }
    bytes.len()
}

fn text_block_end(bytes: &[u8], from: usize) -> usize {
    let mut j = from;
    while j < bytes.len() {
        if bytes[j] == b'\\' {
            j += 2;
        } else if bytes[j..].starts_with(b"\"\"\"") {
            return j + 3;
        } else {
            j += 1;
        }
    }
    bytes.len()
}

/// Where a task's fragment lives inside a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentSpan {
    /// The whole replaceable region: a method body between its braces, or an initializer between
    /// `=` and `;`.
    pub region: Range<usize>,
    /// `region` without its surrounding whitespace.
    pub fragment: Range<usize>,
}

/// Finds the region described by `shape`. The extractor and the injector both go through here, so
/// they always agree on the boundaries.
pub fn locate(map: &SourceMap, shape: &FragmentShape) -> Option<FragmentSpan> {
    let anchor_end = find_anchor(map, shape.anchor())?;
    let region = match shape {
        FragmentShape::MethodBody { .. } => method_body(map, anchor_end)?,
        FragmentShape::FieldInitializer { .. } | FragmentShape::StatementExpression { .. } => {
            initializer(map, anchor_end)?
        }
    };
    let fragment = trim_range(map.text(), region.clone());

    Some(FragmentSpan { region, fragment })
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Turns a declaration signature into a pattern that tolerates any whitespace between tokens.
fn anchor_pattern(anchor: &str) -> String {
    let mut pattern = String::new();
    let mut prev_word: Option<bool> = None;
    let mut chars = anchor.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        let word = is_word(c);
        let mut token = c.to_string();
        if word {
            while let Some(&next) = chars.peek() {
                if !is_word(next) {
                    break;
                }
                token.push(next);
                chars.next();
            }
        }
        match prev_word {
            None if word => pattern.push_str(r"\b"),
            None => {}
            Some(true) if word => pattern.push_str(r"\s+"),
            Some(_) => pattern.push_str(r"\s*"),
        }
        pattern.push_str(&regex::escape(&token));
        prev_word = Some(word);
    }
    if prev_word == Some(true) {
        pattern.push_str(r"\b");
    }

    pattern
}

fn find_anchor(map: &SourceMap, anchor: &str) -> Option<usize> {
    if anchor.trim().is_empty() {
        return None;
    }
    let re = regex::Regex::new(&anchor_pattern(anchor)).ok()?;
    let found = re
        .find_iter(map.text())
        .find(|m| map.is_code(m.start()))
        .map(|m| m.end());
    found
}

fn method_body(map: &SourceMap, from: usize) -> Option<Range<usize>> {
    let mut pos = from;
    // anchors may stop at the method name; skip the parameter list
    if let Some((p, '(')) = map.code_from(from).find(|(_, c)| !c.is_whitespace()) {
        pos = map.matching_close(p)? + 1;
    }
    let (open, c) = map
        .code_from(pos)
        .find(|&(_, c)| matches!(c, '{' | ';' | '}'))?;
    if c != '{' {
        return None;
    }
    let close = map.matching_close(open)?;

    Some(open + 1..close)
}

fn initializer(map: &SourceMap, from: usize) -> Option<Range<usize>> {
    let mut code = map.code_from(from).skip_while(|(_, c)| c.is_whitespace());
    let (eq, _) = code.next().filter(|&(_, c)| c == '=')?;
    if matches!(code.next(), Some((_, '='))) {
        return None;
    }

    // A second top-level assignment means the initializer was left empty and the scan has run
    // into the next statement.
    let mut depth = 0usize;
    let mut prev = '=';
    let mut code = map.code_from(eq + 1).peekable();
    while let Some((pos, c)) = code.next() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.checked_sub(1)?,
            ';' if depth == 0 => return Some(eq + 1..pos),
            '=' if depth == 0 && is_assignment(prev, code.peek().map(|&(_, c)| c)) => return None,
            _ => {}
        }
        prev = c;
    }
    None
}

fn is_assignment(prev: char, next: Option<char>) -> bool {
    !matches!(prev, '=' | '!' | '<' | '>') && next != Some('=')
}

fn trim_range(text: &str, range: Range<usize>) -> Range<usize> {
    let slice = &text[range.clone()];
    let start = range.start + (slice.len() - slice.trim_start().len());
    let end = range.end - (slice.len() - slice.trim_end().len());
    start..end.max(start)
}
