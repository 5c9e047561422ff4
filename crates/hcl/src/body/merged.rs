//! Several bodies presented as one

use indexmap::IndexMap;

use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::pos::Range;

use super::{Body, BodyContent, BodySchema, ContentAttribute};

/// Bodies read as a single body. Each attribute may be defined in only one
/// of them; blocks are concatenated in body order.
pub struct MergedBodies<'a> {
    bodies: Vec<Box<dyn Body + 'a>>,
}

pub fn merge_bodies<'a>(bodies: &[&'a dyn Body]) -> MergedBodies<'a> {
    MergedBodies {
        bodies: bodies
            .iter()
            .map(|b| Box::new(*b) as Box<dyn Body + 'a>)
            .collect(),
    }
}

impl MergedBodies<'_> {
    fn merge<'s>(
        &'s self,
        schema: &BodySchema,
        partial: bool,
    ) -> (BodyContent<'s>, Vec<Box<dyn Body + 's>>, Diagnostics) {
        // Required attributes are checked across all bodies, not per body.
        let mut optional = schema.clone();
        for attr in &mut optional.attributes {
            attr.required = false;
        }

        let mut diags = Diagnostics::new();
        let mut attributes: IndexMap<String, ContentAttribute<'s>> = IndexMap::new();
        let mut blocks = Vec::new();
        let mut remains = Vec::new();
        for body in &self.bodies {
            let content = if partial {
                let (content, rest, more) = body.partial_content(&optional);
                remains.push(rest);
                diags.append(more);
                content
            } else {
                let (content, more) = body.content(&optional);
                diags.append(more);
                content
            };
            merge_attributes(&mut attributes, content.attributes, &mut diags);
            blocks.extend(content.blocks);
        }

        let missing_item_range = self.missing_item_range();
        for attr in schema.attributes.iter().filter(|a| a.required) {
            if !attributes.contains_key(&attr.name) {
                diags.push(
                    Diagnostic::error(
                        "Missing required argument",
                        format!(
                            "The argument {:?} is required, but was not set.",
                            attr.name
                        ),
                    )
                    .with_subject(missing_item_range.clone()),
                );
            }
        }

        let content = BodyContent {
            attributes,
            blocks,
            missing_item_range,
        };
        (content, remains, diags)
    }
}

fn merge_attributes<'a>(
    into: &mut IndexMap<String, ContentAttribute<'a>>,
    attrs: IndexMap<String, ContentAttribute<'a>>,
    diags: &mut Diagnostics,
) {
    for (name, attr) in attrs {
        if let Some(existing) = into.get(&name) {
            diags.push(
                Diagnostic::error(
                    "Duplicate argument",
                    format!(
                        "Argument {name:?} was already set at {}",
                        existing.name_range
                    ),
                )
                .with_subject(attr.name_range.clone()),
            );
            continue;
        }
        into.insert(name, attr);
    }
}

impl Body for MergedBodies<'_> {
    fn content(&self, schema: &BodySchema) -> (BodyContent<'_>, Diagnostics) {
        let (content, _, diags) = self.merge(schema, false);
        (content, diags)
    }

    fn partial_content(
        &self,
        schema: &BodySchema,
    ) -> (BodyContent<'_>, Box<dyn Body + '_>, Diagnostics) {
        let (content, remains, diags) = self.merge(schema, true);
        (content, Box::new(MergedBodies { bodies: remains }), diags)
    }

    fn just_attributes(&self) -> (IndexMap<String, ContentAttribute<'_>>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut attributes = IndexMap::new();
        for body in &self.bodies {
            let (attrs, more) = body.just_attributes();
            diags.append(more);
            merge_attributes(&mut attributes, attrs, &mut diags);
        }
        (attributes, diags)
    }

    fn missing_item_range(&self) -> Range {
        self.bodies
            .first()
            .map(|b| b.missing_item_range())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::File;
    use crate::parser::parse_config;
    use crate::pos::Pos;

    fn parse(src: &str, name: &str) -> File {
        let (file, diags) = parse_config(src.as_bytes(), name, Pos::START);
        assert!(diags.is_empty(), "{diags}");
        file
    }

    #[test]
    fn attributes_and_blocks_from_every_body() {
        let a = parse("x = 1\nthing {}\n", "a.hcl");
        let b = parse("y = 2\nthing {}\n", "b.hcl");
        let merged = merge_bodies(&[&a.body, &b.body]);
        let schema = BodySchema::new()
            .with_attribute("x", true)
            .with_attribute("y", true)
            .with_block("thing", Vec::<String>::new());
        let (content, diags) = merged.content(&schema);
        assert!(diags.is_empty(), "{diags}");
        assert_eq!(content.attributes.len(), 2);
        assert_eq!(content.blocks.len(), 2);
        assert_eq!(&*content.attributes["y"].range.filename, "b.hcl");
    }

    #[test]
    fn duplicates_and_missing_across_bodies() {
        let a = parse("x = 1\n", "a.hcl");
        let b = parse("x = 2\n", "b.hcl");
        let merged = merge_bodies(&[&a.body, &b.body]);
        let schema = BodySchema::new()
            .with_attribute("x", false)
            .with_attribute("z", true);
        let (_, diags) = merged.content(&schema);
        assert_eq!(diags[0].summary, "Duplicate argument");
        assert_eq!(diags[1].summary, "Missing required argument");
        assert_eq!(&*diags[1].subject.as_ref().unwrap().filename, "a.hcl");
    }

    #[test]
    fn partial_content_merges_remainders() {
        let a = parse("x = 1\nextra = true\n", "a.hcl");
        let b = parse("more = false\n", "b.hcl");
        let merged = merge_bodies(&[&a.body, &b.body]);
        let (_, rest, diags) = merged.partial_content(&BodySchema::new().with_attribute("x", true));
        assert!(diags.is_empty());
        let (attrs, diags) = rest.just_attributes();
        assert!(diags.is_empty());
        assert_eq!(attrs.keys().collect::<Vec<_>>(), ["extra", "more"]);
    }
}
