//! Bodies: attribute definitions and blocks

use indexmap::IndexMap;

use crate::ast::{Attribute, Block, Body};
use crate::lexer::{Token, TokenKind};
use crate::pos::Range;

use super::Parser;

enum BodyItem {
    Attribute(Attribute),
    Block(Block),
}

impl<'a> Parser<'a> {
    /// Parse attributes and blocks up to EOF, or up to the closing brace
    /// of the enclosing block when `nested`. The brace is not consumed.
    pub(super) fn parse_body_items(
        &mut self,
        nested: bool,
    ) -> (IndexMap<String, Attribute>, Vec<Block>) {
        let mut attributes = IndexMap::new();
        let mut blocks = Vec::new();
        loop {
            match self.stream.peek_kind() {
                TokenKind::Newline => {
                    self.stream.next();
                }
                TokenKind::EOF => break,
                TokenKind::CBrace if nested => break,
                TokenKind::Ident => match self.parse_body_item() {
                    Some(BodyItem::Attribute(attr)) => self.insert_attribute(&mut attributes, attr),
                    Some(BodyItem::Block(block)) => blocks.push(block),
                    None => {}
                },
                _ => {
                    let tok = self.stream.next();
                    self.report_unexpected(
                        &tok,
                        "Argument or block definition required",
                        "An argument or block definition is required here.",
                    );
                    self.recover_after_newline();
                }
            }
        }
        (attributes, blocks)
    }

    fn insert_attribute(&mut self, attributes: &mut IndexMap<String, Attribute>, attr: Attribute) {
        if let Some(existing) = attributes.get(&attr.name) {
            let detail = format!(
                "The argument \"{}\" was already set at {}. Each argument may be set only once.",
                attr.name, existing.name_range
            );
            self.error("Attribute redefined", detail, attr.name_range.clone());
            return;
        }
        attributes.insert(attr.name.clone(), attr);
    }

    fn parse_body_item(&mut self) -> Option<BodyItem> {
        let ident = self.stream.next();
        match self.stream.peek_kind() {
            TokenKind::Equal => Some(BodyItem::Attribute(self.finish_attribute(ident))),
            TokenKind::OQuote | TokenKind::OBrace | TokenKind::Ident => {
                self.finish_block(ident).map(BodyItem::Block)
            }
            _ => {
                let tok = self.stream.next();
                self.report_unexpected(
                    &tok,
                    "Argument or block definition required",
                    "An argument or block definition is required here. To set an argument, use \
                     the equals sign \"=\" to introduce the argument value.",
                );
                if !matches!(tok.kind, TokenKind::Newline | TokenKind::EOF) {
                    self.recover_after_newline();
                }
                None
            }
        }
    }

    /// `name = expr`, with the name already consumed.
    fn finish_attribute(&mut self, ident: Token<'a>) -> Attribute {
        let attr = self.attribute_definition(ident);
        match self.stream.peek_kind() {
            TokenKind::Newline => {
                self.stream.next();
            }
            TokenKind::EOF => {}
            TokenKind::CBrace => {
                let tok = self.stream.peek().clone();
                self.report_unexpected(
                    &tok,
                    "Missing newline after argument",
                    "An argument definition must end with a newline.",
                );
            }
            _ => {
                let tok = self.stream.next();
                self.report_unexpected(
                    &tok,
                    "Missing newline after argument",
                    "An argument definition must end with a newline.",
                );
                self.recover_after_newline();
            }
        }
        attr
    }

    fn attribute_definition(&mut self, ident: Token<'a>) -> Attribute {
        let equals = self.stream.next();
        let expr = self.parse_expression();
        Attribute {
            name: ident.text().into_owned(),
            range: Range::between(&ident.range, &expr.range),
            name_range: ident.range,
            equals_range: equals.range,
            expr,
        }
    }

    /// Labels, then a multi-line or single-line body, with the type name
    /// already consumed.
    fn finish_block(&mut self, ident: Token<'a>) -> Option<Block> {
        let mut labels = Vec::new();
        let mut label_ranges = Vec::new();
        let mut bad_label = false;
        let open = loop {
            let tok = self.stream.next();
            match tok.kind {
                TokenKind::OBrace => break tok,
                TokenKind::Ident => {
                    labels.push(tok.text().into_owned());
                    label_ranges.push(tok.range);
                }
                TokenKind::OQuote => match self.parse_static_string(&tok) {
                    Some(label) => {
                        labels.push(label);
                        label_ranges.push(Range::between(&tok.range, &self.stream.prev_range()));
                    }
                    None => bad_label = true,
                },
                _ => {
                    self.report_unexpected(
                        &tok,
                        "Invalid block definition",
                        "Either a quoted string block label or an opening brace (\"{\") is \
                         expected here.",
                    );
                    if !matches!(tok.kind, TokenKind::Newline | TokenKind::EOF) {
                        self.recover_after_newline();
                    }
                    return None;
                }
            }
        };

        let multi_line = self.stream.peek_kind() == TokenKind::Newline;
        let (attributes, blocks, close_range) = if multi_line {
            let (attributes, blocks) = self.parse_body_items(true);
            let close = self.stream.next();
            if close.kind != TokenKind::CBrace {
                self.error(
                    "Unclosed configuration block",
                    "There is no closing brace for this block before the end of the file. This \
                     may be caused by incorrect brace nesting elsewhere in this file.",
                    ident.range.clone(),
                );
            }
            (attributes, blocks, close.range)
        } else {
            let (attributes, close_range) = self.parse_single_line_body();
            (attributes, Vec::new(), close_range)
        };

        match self.stream.peek_kind() {
            TokenKind::Newline => {
                self.stream.next();
            }
            TokenKind::EOF | TokenKind::CBrace => {}
            _ => {
                let tok = self.stream.next();
                self.report_unexpected(
                    &tok,
                    "Missing newline after block definition",
                    "A block definition must end with a newline.",
                );
                self.recover_after_newline();
            }
        }

        if bad_label {
            return None;
        }
        let body = Body {
            attributes,
            blocks,
            src_range: Range::between(&open.range, &close_range),
            end_range: close_range.start_range(),
        };
        Some(Block {
            block_type: ident.text().into_owned(),
            labels,
            body,
            type_range: ident.range,
            label_ranges,
            open_brace_range: open.range,
            close_brace_range: close_range,
        })
    }

    /// `{ name = expr }` or `{}` on one line, with the brace consumed.
    /// Returns the attributes and the range of the closing brace.
    fn parse_single_line_body(&mut self) -> (IndexMap<String, Attribute>, Range) {
        let mut attributes = IndexMap::new();
        match self.stream.peek_kind() {
            TokenKind::CBrace => {}
            TokenKind::Ident if self.stream.peek_nth_kind(1) == TokenKind::Equal => {
                let ident = self.stream.next();
                let attr = self.attribute_definition(ident);
                attributes.insert(attr.name.clone(), attr);
            }
            TokenKind::Ident => {
                let tok = self.stream.peek().clone();
                self.report_unexpected(
                    &tok,
                    "Invalid single-argument block definition",
                    "A single-line block definition can contain only a single argument. To \
                     define a nested block, use a multi-line block.",
                );
                return (attributes, self.recover(TokenKind::CBrace));
            }
            _ => {
                let tok = self.stream.peek().clone();
                self.report_unexpected(
                    &tok,
                    "Invalid single-argument block definition",
                    "A single-line block definition must contain a single argument definition \
                     or nothing at all.",
                );
                return (attributes, self.recover(TokenKind::CBrace));
            }
        }

        let close = self.stream.peek().clone();
        match close.kind {
            TokenKind::CBrace => {
                self.stream.next();
                (attributes, close.range)
            }
            TokenKind::Comma | TokenKind::Ident => {
                self.report_unexpected(
                    &close,
                    "Invalid single-argument block definition",
                    "Only one argument is allowed in a single-line block definition.",
                );
                (attributes, self.recover(TokenKind::CBrace))
            }
            _ => {
                self.report_unexpected(
                    &close,
                    "Invalid single-argument block definition",
                    "A single-line block definition must end with a closing brace immediately \
                     after its single argument definition.",
                );
                (attributes, self.recover(TokenKind::CBrace))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse_config;
    use crate::pos::Pos;

    fn parse(src: &str) -> (crate::ast::File, crate::diagnostic::Diagnostics) {
        parse_config(src.as_bytes(), "test.hcl", Pos::START)
    }

    #[test]
    fn attributes_and_blocks() {
        let (file, diags) = parse("a = 1\nb = \"two\"\n\nthing \"x\" y {\n  c = 3\n}\n");
        assert!(diags.is_empty(), "{diags}");
        let body = &file.body;
        assert_eq!(body.attributes.keys().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(body.blocks.len(), 1);
        let block = &body.blocks[0];
        assert_eq!(block.block_type, "thing");
        assert_eq!(block.labels, ["x", "y"]);
        assert!(block.body.attributes.contains_key("c"));
        assert!(block.range().covers(&block.body.attributes["c"].range));
    }

    #[test]
    fn single_line_blocks() {
        let (file, diags) = parse("a { b = 1 }\nempty {}\n");
        assert!(diags.is_empty(), "{diags}");
        assert_eq!(file.body.blocks.len(), 2);
        assert!(file.body.blocks[0].body.attributes.contains_key("b"));
        assert!(file.body.blocks[1].body.attributes.is_empty());

        let (_, diags) = parse("a { b = 1, c = 2 }\n");
        assert_eq!(diags[0].summary, "Invalid single-argument block definition");
    }

    #[test]
    fn redefined_attribute_keeps_first() {
        let (file, diags) = parse("a = 1\na = 2\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, "Attribute redefined");
        assert_eq!(diags[0].subject.as_ref().unwrap().start.line, 2);
        let expr = &file.body.attributes["a"].expr;
        assert_eq!(expr.range.start.line, 1);
    }

    #[test]
    fn missing_newline_after_argument() {
        let (file, diags) = parse("a = 1 b = 2\nc = 3\n");
        assert_eq!(diags[0].summary, "Missing newline after argument");
        assert!(file.body.attributes.contains_key("c"));
    }

    #[test]
    fn unclosed_block() {
        let (file, diags) = parse("a {\n  b = 1\n");
        assert_eq!(diags[0].summary, "Unclosed configuration block");
        assert_eq!(file.body.blocks.len(), 1);
    }

    #[test]
    fn invalid_block_header() {
        let (_, diags) = parse("a \"x\" = 1\nb = 2\n");
        assert_eq!(diags[0].summary, "Invalid block definition");
    }

    #[test]
    fn labels_may_not_be_templates() {
        let (file, diags) = parse("a \"${x}\" {\n}\nb = 1\n");
        assert!(diags.has_errors());
        assert!(file.body.blocks.is_empty());
        assert!(file.body.attributes.contains_key("b"));
    }

    #[test]
    fn stray_tokens_recover_at_newline() {
        let (file, diags) = parse("= 1\nok = true\n");
        assert_eq!(diags[0].summary, "Argument or block definition required");
        assert!(file.body.attributes.contains_key("ok"));
    }
}
