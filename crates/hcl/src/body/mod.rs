//! The `Body` seam between syntaxes and the decoder
//!
//! A [`Body`] is an opaque container of attributes and blocks. Consumers
//! never walk it directly; they describe what they expect with a
//! [`BodySchema`] and receive the matching items as [`BodyContent`]. The
//! native syntax tree implements it here; [`merge_bodies`] presents several
//! bodies as one.

mod merged;

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::ast::{self, Expression};
use crate::diagnostic::{Diagnostic, Diagnostics, name_suggestion};
use crate::pos::Range;

pub use merged::{MergedBodies, merge_bodies};

/// Extraction of schema-shaped content from a body.
pub trait Body {
    /// Items matching `schema`. Anything else in the body is an error.
    fn content(&self, schema: &BodySchema) -> (BodyContent<'_>, Diagnostics);

    /// Items matching `schema`, plus a body holding everything that was
    /// not consumed. Unexpected items are left for the remainder.
    fn partial_content(
        &self,
        schema: &BodySchema,
    ) -> (BodyContent<'_>, Box<dyn Body + '_>, Diagnostics);

    /// Every attribute, for bodies used as plain maps. Blocks are errors.
    fn just_attributes(&self) -> (IndexMap<String, ContentAttribute<'_>>, Diagnostics);

    /// Where an item that is required but absent would go.
    fn missing_item_range(&self) -> Range;
}

impl<T: Body + ?Sized> Body for &T {
    fn content(&self, schema: &BodySchema) -> (BodyContent<'_>, Diagnostics) {
        (**self).content(schema)
    }

    fn partial_content(
        &self,
        schema: &BodySchema,
    ) -> (BodyContent<'_>, Box<dyn Body + '_>, Diagnostics) {
        (**self).partial_content(schema)
    }

    fn just_attributes(&self) -> (IndexMap<String, ContentAttribute<'_>>, Diagnostics) {
        (**self).just_attributes()
    }

    fn missing_item_range(&self) -> Range {
        (**self).missing_item_range()
    }
}

/// The attributes and block types a consumer expects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodySchema {
    pub attributes: Vec<AttributeSchema>,
    pub blocks: Vec<BlockHeaderSchema>,
}

impl BodySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, required: bool) -> Self {
        self.attributes.push(AttributeSchema {
            name: name.into(),
            required,
        });
        self
    }

    pub fn with_block<I, S>(mut self, block_type: impl Into<String>, label_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocks.push(BlockHeaderSchema {
            block_type: block_type.into(),
            label_names: label_names.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn block(&self, block_type: &str) -> Option<&BlockHeaderSchema> {
        self.blocks.iter().find(|b| b.block_type == block_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSchema {
    pub name: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeaderSchema {
    pub block_type: String,
    pub label_names: Vec<String>,
}

/// Items extracted from a body by a schema.
pub struct BodyContent<'a> {
    pub attributes: IndexMap<String, ContentAttribute<'a>>,
    /// In source order.
    pub blocks: Vec<ContentBlock<'a>>,
    pub missing_item_range: Range,
}

impl<'a> BodyContent<'a> {
    pub fn blocks_of_type<'s>(
        &'s self,
        block_type: &'s str,
    ) -> impl Iterator<Item = &'s ContentBlock<'a>> + 's {
        self.blocks.iter().filter(move |b| b.block_type == block_type)
    }
}

#[derive(Debug, Clone)]
pub struct ContentAttribute<'a> {
    pub name: String,
    pub expr: &'a Expression,
    pub range: Range,
    pub name_range: Range,
}

pub struct ContentBlock<'a> {
    pub block_type: String,
    pub labels: Vec<String>,
    pub body: &'a dyn Body,
    pub def_range: Range,
    pub type_range: Range,
    pub label_ranges: Vec<Range>,
}

impl<'a> From<&'a ast::Attribute> for ContentAttribute<'a> {
    fn from(attr: &'a ast::Attribute) -> Self {
        Self {
            name: attr.name.clone(),
            expr: &attr.expr,
            range: attr.range.clone(),
            name_range: attr.name_range.clone(),
        }
    }
}

impl Body for ast::Body {
    fn content(&self, schema: &BodySchema) -> (BodyContent<'_>, Diagnostics) {
        NativeView::new(self).full_content(schema)
    }

    fn partial_content(
        &self,
        schema: &BodySchema,
    ) -> (BodyContent<'_>, Box<dyn Body + '_>, Diagnostics) {
        NativeView::new(self).partial(schema)
    }

    fn just_attributes(&self) -> (IndexMap<String, ContentAttribute<'_>>, Diagnostics) {
        NativeView::new(self).attributes_only()
    }

    fn missing_item_range(&self) -> Range {
        self.end_range.clone()
    }
}

/// A native body with the items consumed by earlier partial reads hidden.
struct NativeView<'a> {
    body: &'a ast::Body,
    hidden_attrs: HashSet<String>,
    hidden_blocks: HashSet<String>,
}

impl<'a> NativeView<'a> {
    fn new(body: &'a ast::Body) -> Self {
        Self {
            body,
            hidden_attrs: HashSet::new(),
            hidden_blocks: HashSet::new(),
        }
    }

    fn attributes(&self) -> impl Iterator<Item = &'a ast::Attribute> + '_ {
        self.body
            .attributes
            .values()
            .filter(|a| !self.hidden_attrs.contains(&a.name))
    }

    fn blocks(&self) -> impl Iterator<Item = &'a ast::Block> + '_ {
        self.body
            .blocks
            .iter()
            .filter(|b| !self.hidden_blocks.contains(&b.block_type))
    }

    fn full_content(&self, schema: &BodySchema) -> (BodyContent<'a>, Diagnostics) {
        let (content, mut diags) = self.extract(schema);

        for attr in self.attributes() {
            if schema.attribute(&attr.name).is_some() {
                continue;
            }
            let mut detail = format!("An argument named {:?} is not expected here.", attr.name);
            if schema.block(&attr.name).is_some() {
                detail = format!(
                    "{detail} Did you mean to define a block of type {:?}?",
                    attr.name
                );
            } else if let Some(suggestion) =
                name_suggestion(&attr.name, schema.attributes.iter().map(|a| a.name.as_str()))
            {
                detail = format!("{detail} Did you mean {suggestion:?}?");
            }
            diags.push(
                Diagnostic::error("Unsupported argument", detail)
                    .with_subject(attr.name_range.clone()),
            );
        }

        for block in self.blocks() {
            if schema.block(&block.block_type).is_some() {
                continue;
            }
            let mut detail = format!(
                "Blocks of type {:?} are not expected here.",
                block.block_type
            );
            if schema.attribute(&block.block_type).is_some() {
                detail = format!(
                    "{detail} Did you mean to define argument {:?}? If so, use the equals sign \
                     to assign it a value.",
                    block.block_type
                );
            } else if let Some(suggestion) = name_suggestion(
                &block.block_type,
                schema.blocks.iter().map(|b| b.block_type.as_str()),
            ) {
                detail = format!("{detail} Did you mean {suggestion:?}?");
            }
            diags.push(
                Diagnostic::error("Unsupported block type", detail)
                    .with_subject(block.type_range.clone()),
            );
        }

        (content, diags)
    }

    fn partial(&self, schema: &BodySchema) -> (BodyContent<'a>, Box<dyn Body + 'a>, Diagnostics) {
        let (content, diags) = self.extract(schema);
        let mut rest = NativeView {
            body: self.body,
            hidden_attrs: self.hidden_attrs.clone(),
            hidden_blocks: self.hidden_blocks.clone(),
        };
        rest.hidden_attrs
            .extend(schema.attributes.iter().map(|a| a.name.clone()));
        rest.hidden_blocks
            .extend(schema.blocks.iter().map(|b| b.block_type.clone()));
        (content, Box::new(rest), diags)
    }

    /// The items named by `schema`, checking required attributes and block
    /// label counts.
    fn extract(&self, schema: &BodySchema) -> (BodyContent<'a>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut attributes = IndexMap::new();
        for attr_schema in &schema.attributes {
            let found = self
                .body
                .attributes
                .get(&attr_schema.name)
                .filter(|_| !self.hidden_attrs.contains(&attr_schema.name));
            match found {
                Some(attr) => {
                    attributes.insert(attr.name.clone(), ContentAttribute::from(attr));
                }
                None if attr_schema.required => diags.push(
                    Diagnostic::error(
                        "Missing required argument",
                        format!(
                            "The argument {:?} is required, but no definition was found.",
                            attr_schema.name
                        ),
                    )
                    .with_subject(self.body.end_range.clone()),
                ),
                None => {}
            }
        }

        let mut blocks = Vec::new();
        for block in self.blocks() {
            let Some(header) = schema.block(&block.block_type) else {
                continue;
            };
            if let Some(diag) = check_labels(block, header) {
                diags.push(diag);
                continue;
            }
            blocks.push(ContentBlock {
                block_type: block.block_type.clone(),
                labels: block.labels.clone(),
                body: &block.body,
                def_range: block.def_range(),
                type_range: block.type_range.clone(),
                label_ranges: block.label_ranges.clone(),
            });
        }

        let content = BodyContent {
            attributes,
            blocks,
            missing_item_range: self.body.end_range.clone(),
        };
        (content, diags)
    }

    fn attributes_only(&self) -> (IndexMap<String, ContentAttribute<'a>>, Diagnostics) {
        let mut diags = Diagnostics::new();
        for block in self.blocks() {
            diags.push(
                Diagnostic::error(
                    format!("Unexpected {:?} block", block.block_type),
                    "Blocks are not allowed here.",
                )
                .with_subject(block.type_range.clone()),
            );
        }
        let attrs = self
            .attributes()
            .map(|a| (a.name.clone(), ContentAttribute::from(a)))
            .collect();
        (attrs, diags)
    }
}

impl Body for NativeView<'_> {
    fn content(&self, schema: &BodySchema) -> (BodyContent<'_>, Diagnostics) {
        self.full_content(schema)
    }

    fn partial_content(
        &self,
        schema: &BodySchema,
    ) -> (BodyContent<'_>, Box<dyn Body + '_>, Diagnostics) {
        self.partial(schema)
    }

    fn just_attributes(&self) -> (IndexMap<String, ContentAttribute<'_>>, Diagnostics) {
        self.attributes_only()
    }

    fn missing_item_range(&self) -> Range {
        self.body.end_range.clone()
    }
}

fn check_labels(block: &ast::Block, header: &BlockHeaderSchema) -> Option<Diagnostic> {
    let want = header.label_names.len();
    let got = block.labels.len();
    if got > want {
        let detail = if want == 0 {
            format!("No labels are expected for {} blocks.", block.block_type)
        } else {
            format!(
                "Only {want} labels ({}) are expected for {} blocks.",
                header.label_names.join(", "),
                block.block_type
            )
        };
        return Some(
            Diagnostic::error(format!("Extraneous label for {}", block.block_type), detail)
                .with_subject(block.label_ranges[want].clone())
                .with_context(block.def_range()),
        );
    }
    if got < want {
        let missing = &header.label_names[got];
        return Some(
            Diagnostic::error(
                format!("Missing {missing} for {}", block.block_type),
                format!(
                    "All {} blocks must have {want} labels ({}).",
                    block.block_type,
                    header.label_names.join(", ")
                ),
            )
            .with_subject(block.open_brace_range.clone())
            .with_context(block.def_range()),
        );
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_config;
    use crate::pos::Pos;

    fn parse(src: &str) -> ast::File {
        let (file, diags) = parse_config(src.as_bytes(), "test.hcl", Pos::START);
        assert!(diags.is_empty(), "{diags}");
        file
    }

    fn schema() -> BodySchema {
        BodySchema::new()
            .with_attribute("name", true)
            .with_attribute("count", false)
            .with_block("service", ["kind"])
    }

    // ============ Content ============

    #[test]
    fn content_extracts_schema_items() {
        let file = parse("name = \"a\"\nservice \"web\" {\n  port = 80\n}\n");
        let (content, diags) = file.body.content(&schema());
        assert!(diags.is_empty(), "{diags}");
        assert!(content.attributes.contains_key("name"));
        assert!(!content.attributes.contains_key("count"));
        assert_eq!(content.blocks.len(), 1);
        assert_eq!(content.blocks[0].labels, ["web"]);
        let (inner, diags) = content.blocks[0].body.just_attributes();
        assert!(diags.is_empty());
        assert!(inner.contains_key("port"));
    }

    #[test]
    fn content_reports_unexpected_items() {
        let file = parse("name = 1\nnmae = 2\nservce \"x\" {}\nservice = 3\n");
        let (_, diags) = file.body.content(&schema());
        let summaries: Vec<&str> = diags.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(
            summaries,
            ["Unsupported argument", "Unsupported argument", "Unsupported block type"]
        );
        assert!(diags[0].detail.contains("Did you mean \"name\"?"));
        assert!(diags[1].detail.contains("block of type \"service\""));
        assert!(diags[2].detail.contains("Did you mean \"service\"?"));
    }

    #[test]
    fn missing_required_argument() {
        let file = parse("count = 1\n");
        let (_, diags) = file.body.content(&schema());
        assert_eq!(diags[0].summary, "Missing required argument");
        assert_eq!(diags[0].subject, Some(file.body.end_range.clone()));
    }

    #[test]
    fn label_count_mismatches() {
        let file = parse("name = 1\nservice {}\nservice \"a\" \"b\" {}\n");
        let (content, diags) = file.body.content(&schema());
        assert!(content.blocks.is_empty());
        assert_eq!(diags[0].summary, "Missing kind for service");
        assert_eq!(diags[1].summary, "Extraneous label for service");
    }

    // ============ Partial content ============

    #[test]
    fn partial_content_leaves_the_rest() {
        let file = parse("name = 1\nextra = 2\nservice \"a\" {}\nother {}\n");
        let (content, rest, diags) = file.body.partial_content(&schema());
        assert!(diags.is_empty());
        assert_eq!(content.attributes.len(), 1);

        let rest_schema = BodySchema::new()
            .with_attribute("extra", true)
            .with_block("other", Vec::<String>::new());
        let (more, diags) = rest.content(&rest_schema);
        assert!(diags.is_empty(), "{diags}");
        assert!(more.attributes.contains_key("extra"));
        assert_eq!(more.blocks.len(), 1);

        // Consumed items are no longer visible.
        let (_, diags) = rest.content(&BodySchema::new().with_attribute("name", true));
        assert_eq!(diags[0].summary, "Missing required argument");
    }

    #[test]
    fn just_attributes_rejects_blocks() {
        let file = parse("a = 1\nb {}\n");
        let (attrs, diags) = file.body.just_attributes();
        assert_eq!(attrs.len(), 1);
        assert_eq!(diags[0].summary, "Unexpected \"b\" block");
    }
}
