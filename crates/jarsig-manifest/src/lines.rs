//! Physical line scanning shared by the parser and the digester.
//!
//! Both need byte offsets into the original buffer, so lines are reported
//! as ranges rather than slices copied out.

/// One physical line of a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Line {
    /// Offset of the first byte of the line.
    pub start: usize,
    /// Offset one past the last content byte (terminator excluded).
    pub content_end: usize,
    /// Offset one past the terminator.
    pub end: usize,
    /// 1-based physical line number.
    pub number: usize,
}

impl Line {
    pub fn content<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.start..self.content_end]
    }

    pub fn is_blank(&self) -> bool {
        self.start == self.content_end
    }

    pub fn is_terminated(&self) -> bool {
        self.end > self.content_end
    }

    /// Length including the terminator.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_continuation(&self, buf: &[u8]) -> bool {
        buf.get(self.start) == Some(&b' ') && !self.is_blank()
    }
}

/// Iterator over the physical lines of a buffer.
///
/// Accepts `CRLF`, `LF` and lone `CR` terminators. A trailing fragment
/// without a terminator is yielded with `content_end == end`.
pub(crate) struct Lines<'a> {
    buf: &'a [u8],
    pos: usize,
    number: usize,
}

impl<'a> Lines<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            number: 0,
        }
    }
}

impl Iterator for Lines<'_> {
    type Item = Line;

    fn next(&mut self) -> Option<Line> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let start = self.pos;
        self.number += 1;
        let rest = &self.buf[start..];
        let line = match rest.iter().position(|b| *b == b'\r' || *b == b'\n') {
            Some(idx) => {
                let content_end = start + idx;
                let term_len = if rest[idx] == b'\r' && rest.get(idx + 1) == Some(&b'\n') {
                    2
                } else {
                    1
                };
                Line {
                    start,
                    content_end,
                    end: content_end + term_len,
                    number: self.number,
                }
            }
            None => Line {
                start,
                content_end: self.buf.len(),
                end: self.buf.len(),
                number: self.number,
            },
        };
        self.pos = line.end;
        Some(line)
    }
}

/// Case-insensitive check for a `Name: ` header at the start of `content`.
pub(crate) fn is_name_header(content: &[u8]) -> bool {
    content.len() >= 6 && content[..6].eq_ignore_ascii_case(b"name: ")
}
