//! Source positions and ranges
//!
//! Lines and columns are 1-based, bytes are 0-based. Columns count grapheme
//! clusters, so a base character with combining marks is a single column.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;

/// A single position in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
    pub byte: usize,
}

impl Pos {
    /// The position of the first byte of a file.
    pub const START: Pos = Pos {
        line: 1,
        column: 1,
        byte: 0,
    };

    pub fn new(line: usize, column: usize, byte: usize) -> Self {
        Self { line, column, byte }
    }

    /// Position reached after consuming `bytes` starting from `self`.
    ///
    /// Invalid UTF-8 sequences count one column per byte.
    pub fn advance(self, bytes: &[u8]) -> Pos {
        let mut pos = self;
        for chunk in bytes.utf8_chunks() {
            for grapheme in chunk.valid().graphemes(true) {
                pos.byte += grapheme.len();
                if grapheme == "\n" || grapheme == "\r\n" {
                    pos.line += 1;
                    pos.column = 1;
                } else {
                    pos.column += 1;
                }
            }
            for _ in chunk.invalid() {
                pos.byte += 1;
                pos.column += 1;
            }
        }
        pos
    }
}

impl Default for Pos {
    fn default() -> Self {
        Pos::START
    }
}

/// A half-open range of source text: `end` is the position after the last
/// byte. Empty ranges mark the location of a missing item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Range {
    pub filename: Arc<str>,
    pub start: Pos,
    pub end: Pos,
}

impl Range {
    pub fn new(filename: Arc<str>, start: Pos, end: Pos) -> Self {
        Self {
            filename,
            start,
            end,
        }
    }

    /// Range covering everything from the start of `a` to the end of `b`.
    pub fn between(a: &Range, b: &Range) -> Range {
        let start = a.start.min(b.start);
        let end = a.end.max(b.end);
        Range::new(a.filename.clone(), start, end)
    }

    /// Zero-length range at the start of this one.
    pub fn start_range(&self) -> Range {
        Range::new(self.filename.clone(), self.start, self.start)
    }

    /// Zero-length range at the end of this one.
    pub fn end_range(&self) -> Range {
        Range::new(self.filename.clone(), self.end, self.end)
    }

    pub fn is_empty(&self) -> bool {
        self.start.byte == self.end.byte
    }

    pub fn contains_offset(&self, byte: usize) -> bool {
        byte >= self.start.byte && byte < self.end.byte
    }

    pub fn contains_pos(&self, pos: Pos) -> bool {
        self.contains_offset(pos.byte)
    }

    /// True when `other` lies entirely within this range.
    pub fn covers(&self, other: &Range) -> bool {
        self.filename == other.filename
            && other.start.byte >= self.start.byte
            && other.end.byte <= self.end.byte
    }

    pub fn overlaps(&self, other: &Range) -> bool {
        self.filename == other.filename
            && self.start.byte < other.end.byte
            && other.start.byte < self.end.byte
    }

    /// The bytes of `src` that this range selects, if it lies within it.
    pub fn slice_of<'a>(&self, src: &'a [u8]) -> Option<&'a [u8]> {
        src.get(self.start.byte..self.end.byte)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.line == self.end.line {
            write!(
                f,
                "{}:{},{}-{}",
                self.filename, self.start.line, self.start.column, self.end.column
            )
        } else {
            write!(
                f,
                "{}:{},{}-{},{}",
                self.filename, self.start.line, self.start.column, self.end.line, self.end.column
            )
        }
    }
}
