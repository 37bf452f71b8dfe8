//! Record format templates
//!
//! User-supplied templates with two tokens:
//!
//! ```text
//! [%category%] %message%
//! ```
//!
//! `%category%` and `%message%` expand to the record's fields; every
//! other byte, `%` included, is literal. A template that does not end
//! with a newline gets one appended, so each record renders as exactly
//! one line.
//!
//! Templates are compiled once into a segment list; formatting a record
//! is then a handful of buffer appends with no per-record parsing.

#[derive(Debug, PartialEq, Eq)]
enum Segment {
    Literal(Vec<u8>),
    Category,
    Message,
}

/// A compiled format template
#[derive(Debug)]
pub struct Formatter {
    segments: Vec<Segment>,
}

impl Formatter {
    /// Compile a template
    pub fn new(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = Vec::new();
        let mut rest = template;

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix("%category%") {
                flush_literal(&mut segments, &mut literal);
                segments.push(Segment::Category);
                rest = after;
            } else if let Some(after) = rest.strip_prefix("%message%") {
                flush_literal(&mut segments, &mut literal);
                segments.push(Segment::Message);
                rest = after;
            } else {
                let mut chars = rest.chars();
                if let Some(ch) = chars.next() {
                    let mut buf = [0u8; 4];
                    literal.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
                rest = chars.as_str();
            }
        }

        if !template.ends_with('\n') {
            literal.push(b'\n');
        }
        flush_literal(&mut segments, &mut literal);

        Self { segments }
    }

    /// Render one record into `out`
    pub fn format_into(&self, out: &mut Vec<u8>, category: &[u8], message: &[u8]) {
        for segment in &self.segments {
            match segment {
                Segment::Literal(bytes) => out.extend_from_slice(bytes),
                Segment::Category => out.extend_from_slice(category),
                Segment::Message => out.extend_from_slice(message),
            }
        }
    }
}

fn flush_literal(segments: &mut Vec<Segment>, literal: &mut Vec<u8>) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}
