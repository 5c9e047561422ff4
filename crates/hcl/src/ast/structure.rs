//! Files, bodies, attributes and blocks

use std::sync::Arc;

use indexmap::IndexMap;

use crate::pos::Range;

use super::Expression;

/// A parsed configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    pub body: Body,
    pub bytes: Arc<[u8]>,
}

/// Attributes and blocks of one nesting level.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    /// Unique by name, in definition order.
    pub attributes: IndexMap<String, Attribute>,
    /// In file order.
    pub blocks: Vec<Block>,
    pub src_range: Range,
    /// Empty range at the end of the body, where a missing item would go.
    pub end_range: Range,
}

impl Body {
    pub fn empty(range: Range) -> Self {
        Self {
            attributes: IndexMap::new(),
            blocks: Vec::new(),
            end_range: range.end_range(),
            src_range: range,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub expr: Expression,
    pub range: Range,
    pub name_range: Range,
    pub equals_range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub block_type: String,
    pub labels: Vec<String>,
    pub body: Body,
    pub type_range: Range,
    pub label_ranges: Vec<Range>,
    pub open_brace_range: Range,
    pub close_brace_range: Range,
}

impl Block {
    /// The header: type name and labels, up to the opening brace.
    pub fn def_range(&self) -> Range {
        match self.label_ranges.last() {
            Some(last) => Range::between(&self.type_range, last),
            None => self.type_range.clone(),
        }
    }

    pub fn range(&self) -> Range {
        Range::between(&self.type_range, &self.close_brace_range)
    }
}
