//! Recursive descent parser for the native syntax
//!
//! Every entry point returns a structurally complete result together with
//! its diagnostics. On a syntax error the parser reports it, skips to the
//! next synchronization point (a newline or the closer of the current
//! bracket) and substitutes a null literal for the broken construct.

mod body;
mod escape;
mod expr;
mod stream;
mod template;

use std::sync::Arc;

use crate::ast::{Body, Expression, File};
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::lexer::{ScanMode, Token, TokenKind, scan_tokens};
use crate::pos::{Pos, Range};
use crate::traversal::{Traversal, Traverser};
use crate::value::{Number, Type, Value};

pub(crate) use escape::unescape;
use stream::TokenStream;

/// Parse a configuration file.
pub fn parse_config(src: &[u8], filename: &str, start: Pos) -> (File, Diagnostics) {
    let tokens = scan_tokens(src, filename, start, ScanMode::Normal);
    let file_start = tokens
        .first()
        .map(|t| t.range.start_range())
        .unwrap_or_default();
    let mut parser = Parser::new(tokens);
    let (attributes, blocks) = parser.parse_body_items(false);
    let eof = parser.stream.next();
    let body = Body {
        attributes,
        blocks,
        src_range: Range::between(&file_start, &eof.range),
        end_range: eof.range.end_range(),
    };
    let file = File {
        body,
        bytes: Arc::from(src),
    };
    (file, parser.diags)
}

/// Parse a standalone expression. The whole input must be one expression.
pub fn parse_expression(src: &[u8], filename: &str, start: Pos) -> (Expression, Diagnostics) {
    let tokens = scan_tokens(src, filename, start, ScanMode::Normal);
    let mut parser = Parser::new(tokens);
    parser.stream.push_newlines(false);
    let expr = parser.parse_expression();
    let next = parser.stream.peek();
    if next.kind != TokenKind::EOF {
        let diag = parser.unexpected_token_diag(
            next,
            "Extra characters after expression",
            "An expression was successfully parsed, but extra characters were found after it.",
        );
        parser.diags.push(diag);
    }
    (expr, parser.diags)
}

/// Parse a bare template: literal text with interpolation and directive
/// sequences, with no surrounding quotes.
pub fn parse_template(src: &[u8], filename: &str, start: Pos) -> (Expression, Diagnostics) {
    let tokens = scan_tokens(src, filename, start, ScanMode::Template);
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_bare_template();
    (expr, parser.diags)
}

/// Parse an absolute traversal such as `foo.bar[0]["baz"]`.
pub fn parse_traversal_abs(src: &[u8], filename: &str, start: Pos) -> (Traversal, Diagnostics) {
    let tokens = scan_tokens(src, filename, start, ScanMode::Normal);
    let mut parser = Parser::new(tokens);
    let traversal = parser.parse_traversal_abs();
    (traversal, parser.diags)
}

pub(crate) struct Parser<'a> {
    stream: TokenStream<'a>,
    diags: Diagnostics,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token<'a>>) -> Self {
        Self {
            stream: TokenStream::new(tokens),
            diags: Diagnostics::new(),
        }
    }

    fn error(&mut self, summary: &str, detail: impl Into<String>, subject: Range) {
        self.diags
            .push(Diagnostic::error(summary, detail).with_subject(subject));
    }

    /// A null literal standing in for a construct that failed to parse.
    fn placeholder(range: Range) -> Expression {
        Expression::literal(Value::null(Type::Dynamic), range)
    }

    /// Diagnostic for an unexpected token, preferring a specific message
    /// for characters that are never valid.
    fn unexpected_token_diag(&self, tok: &Token<'_>, summary: &str, detail: &str) -> Diagnostic {
        let (summary, detail) = match tok.kind {
            TokenKind::BadUTF8 => (
                "Invalid character encoding",
                "All input files must be UTF-8 encoded. Ensure that UTF-8 encoding is selected \
                 in your editor."
                    .to_string(),
            ),
            TokenKind::Invalid => invalid_character(tok.bytes),
            TokenKind::EOF if summary == "Invalid expression" => (
                "Missing expression",
                "Expected the start of an expression, but found the end of the file.".to_string(),
            ),
            _ => (summary, detail.to_string()),
        };
        Diagnostic::error(summary, detail).with_subject(tok.range.clone())
    }

    fn report_unexpected(&mut self, tok: &Token<'_>, summary: &str, detail: &str) {
        let diag = self.unexpected_token_diag(tok, summary, detail);
        self.diags.push(diag);
    }

    /// Skip tokens up to and including `end` at the current nesting level,
    /// or up to EOF. A closer belonging to an enclosing construct is left
    /// in place. Returns the range of the last token consumed.
    fn recover(&mut self, end: TokenKind) -> Range {
        log::trace!("parser recovering to {end}");
        let mut depth = 0usize;
        let mut last = self.stream.prev_range();
        loop {
            let tok = self.stream.next();
            if tok.kind == TokenKind::EOF || (depth == 0 && tok.kind == end) {
                return tok.range;
            }
            if is_opener(tok.kind) {
                depth += 1;
            } else if is_closer(tok.kind) {
                if depth == 0 {
                    self.stream.unread();
                    return last;
                }
                depth -= 1;
            }
            last = tok.range;
        }
    }

    /// Skip tokens through the next newline at the current nesting level.
    fn recover_after_newline(&mut self) {
        log::trace!("parser recovering to end of line");
        let mut depth = 0usize;
        loop {
            let tok = self.stream.next_raw();
            match tok.kind {
                TokenKind::EOF => return,
                TokenKind::Newline if depth == 0 => return,
                TokenKind::Comment if depth == 0 && tok.bytes.ends_with(b"\n") => return,
                kind if is_opener(kind) => depth += 1,
                kind if is_closer(kind) => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
    }

    fn parse_traversal_abs(&mut self) -> Traversal {
        let mut steps = Vec::new();
        let root = self.stream.next();
        if root.kind != TokenKind::Ident {
            self.report_unexpected(
                &root,
                "Variable name required",
                "Must begin with a variable name.",
            );
            return Traversal::default();
        }
        steps.push(Traverser::Root {
            name: root.text().into_owned(),
            range: root.range.clone(),
        });

        loop {
            match self.stream.peek_kind() {
                TokenKind::EOF => break,
                TokenKind::Dot => {
                    let dot = self.stream.next();
                    let name = self.stream.next();
                    match name.kind {
                        TokenKind::Ident => steps.push(Traverser::Attr {
                            name: name.text().into_owned(),
                            range: Range::between(&dot.range, &name.range),
                        }),
                        TokenKind::NumberLit if is_integer_literal(name.bytes) => {
                            steps.push(Traverser::Index {
                                key: number_value(name.bytes),
                                range: Range::between(&dot.range, &name.range),
                            })
                        }
                        _ => {
                            self.report_unexpected(
                                &name,
                                "Attribute name required",
                                "Dot must be followed by attribute name.",
                            );
                            break;
                        }
                    }
                }
                TokenKind::OBrack => {
                    let open = self.stream.next();
                    let key_tok = self.stream.next();
                    let key = match key_tok.kind {
                        TokenKind::NumberLit => Some(number_value(key_tok.bytes)),
                        TokenKind::OQuote => self.parse_static_string(&key_tok).map(Value::from),
                        _ => {
                            self.report_unexpected(
                                &key_tok,
                                "Index value required",
                                "Index brackets must contain either a literal number or a \
                                 literal string.",
                            );
                            None
                        }
                    };
                    let close = self.stream.next();
                    if close.kind != TokenKind::CBrack {
                        self.report_unexpected(
                            &close,
                            "Unclosed index brackets",
                            "Index key must be followed by a closing bracket.",
                        );
                        break;
                    }
                    match key {
                        Some(key) => steps.push(Traverser::Index {
                            key,
                            range: Range::between(&open.range, &close.range),
                        }),
                        None => break,
                    }
                }
                _ => {
                    let tok = self.stream.next();
                    self.report_unexpected(
                        &tok,
                        "Invalid traversal",
                        "Only attribute access and indexing with literal keys are allowed in a \
                         traversal.",
                    );
                    break;
                }
            }
        }
        Traversal::new(steps)
    }
}

fn is_opener(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::OBrace
            | TokenKind::OBrack
            | TokenKind::OParen
            | TokenKind::OQuote
            | TokenKind::OHeredoc
            | TokenKind::TemplateInterp
            | TokenKind::TemplateControl
    )
}

fn is_closer(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::CBrace
            | TokenKind::CBrack
            | TokenKind::CParen
            | TokenKind::CQuote
            | TokenKind::CHeredoc
            | TokenKind::TemplateSeqEnd
    )
}

fn is_integer_literal(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.iter().all(u8::is_ascii_digit)
}

fn number_value(bytes: &[u8]) -> Value {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(Number::parse)
        .map(Value::Number)
        .unwrap_or_else(|| Value::null(Type::Number))
}

fn invalid_character(bytes: &[u8]) -> (&'static str, String) {
    let detail = match bytes {
        b";" => "The \";\" character is not valid. Use newlines to separate arguments and \
                 blocks, and commas to separate items in collection values.",
        b"'" => "Single quotes are not valid. Use double quotes (\") to enclose strings.",
        b"`" => "The \"`\" character is not valid. To create a multi-line string, use the \
                 \"heredoc\" syntax, like \"<<EOT\".",
        b"~" => "The \"~\" character is not valid. In templates, it marks whitespace stripping \
                 only immediately inside a \"${\" or \"%{\" sequence, or immediately before \
                 the closing \"}\".",
        b"&" => {
            return (
                "Unsupported operator",
                "Bitwise operators are not supported. Did you mean boolean AND (\"&&\")?"
                    .to_string(),
            );
        }
        b"|" => {
            return (
                "Unsupported operator",
                "Bitwise operators are not supported. Did you mean boolean OR (\"||\")?"
                    .to_string(),
            );
        }
        b"^" => {
            return (
                "Unsupported operator",
                "Bitwise operators are not supported.".to_string(),
            );
        }
        b"\xEF\xBB\xBF" => {
            "The byte order mark (U+FEFF) is only allowed at the very start of a file."
        }
        _ if bytes.starts_with(b"/*") => {
            return (
                "Unterminated comment",
                "There is no closing \"*/\" for this comment.".to_string(),
            );
        }
        _ => "This character is not used within the language.",
    };
    ("Invalid character", detail.to_string())
}
