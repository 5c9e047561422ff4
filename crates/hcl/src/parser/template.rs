//! Templates: quoted strings, heredocs and bare templates
//!
//! Template tokens are first read into a flat list of pieces. Heredoc
//! indentation and `~` whitespace stripping are applied to that list, then
//! `if` and `for` directives are assembled into nested nodes.

use std::collections::VecDeque;

use crate::ast::{ExprKind, Expression};
use crate::lexer::{Token, TokenKind};
use crate::pos::Range;
use crate::value::Value;

use super::{Parser, unescape};

/// The `${`/`%{` ... `}` delimiters of one sequence.
#[derive(Debug)]
struct Marker {
    range: Range,
    strip_left: bool,
    strip_right: bool,
}

#[derive(Debug)]
enum Piece {
    Literal {
        text: String,
        range: Range,
        line_start: bool,
    },
    Interp {
        expr: Expression,
        marker: Marker,
    },
    If {
        cond: Expression,
        marker: Marker,
    },
    Else(Marker),
    EndIf(Marker),
    For {
        key_var: Option<String>,
        val_var: String,
        coll: Expression,
        marker: Marker,
    },
    EndFor(Marker),
}

impl Piece {
    fn marker(&self) -> Option<&Marker> {
        match self {
            Piece::Literal { .. } => None,
            Piece::Interp { marker, .. }
            | Piece::If { marker, .. }
            | Piece::For { marker, .. }
            | Piece::Else(marker)
            | Piece::EndIf(marker)
            | Piece::EndFor(marker) => Some(marker),
        }
    }

    fn literal_mut(&mut self) -> Option<&mut String> {
        match self {
            Piece::Literal { text, .. } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closer {
    Else,
    EndIf,
    EndFor,
}

impl<'a> Parser<'a> {
    pub(super) fn parse_quoted_template(&mut self, open: Token<'a>) -> Expression {
        let (pieces, close) = self.parse_template_pieces(TokenKind::CQuote, false);
        let end = match &close {
            Some(tok) => tok.range.clone(),
            None => self.stream.prev_range(),
        };
        let range = Range::between(&open.range, &end);
        self.build_template(pieces, range)
    }

    pub(super) fn parse_heredoc(&mut self, open: Token<'a>) -> Expression {
        let (mut pieces, close) = self.parse_template_pieces(TokenKind::CHeredoc, true);
        let end = match &close {
            Some(tok) => tok.range.clone(),
            None => self.stream.prev_range(),
        };
        if open.bytes.starts_with(b"<<-")
            && let Some(close) = &close
        {
            let indent = close
                .bytes
                .iter()
                .take_while(|b| matches!(b, b' ' | b'\t'))
                .count();
            strip_indent(&mut pieces, indent);
        }
        let range = Range::between(&open.range, &end);
        self.build_template(pieces, range)
    }

    pub(super) fn parse_bare_template(&mut self) -> Expression {
        let start = self.stream.peek_raw().range.start_range();
        let (pieces, _) = self.parse_template_pieces(TokenKind::EOF, false);
        let eof = self.stream.peek_raw().range.clone();
        self.build_template(pieces, Range::between(&start, &eof))
    }

    /// A quoted string with no template sequences, as used for block
    /// labels and traversal keys. The opening quote is already consumed.
    pub(super) fn parse_static_string(&mut self, open: &Token<'a>) -> Option<String> {
        let mut out = String::new();
        let mut valid = true;
        loop {
            let tok = self.stream.peek_raw().clone();
            match tok.kind {
                TokenKind::CQuote => {
                    self.stream.next_raw();
                    break;
                }
                TokenKind::QuotedLit => {
                    self.stream.next_raw();
                    let text = self.literal_text(&tok);
                    out.push_str(&text);
                }
                TokenKind::TemplateInterp | TokenKind::TemplateControl => {
                    self.stream.next_raw();
                    self.error(
                        "Invalid string literal",
                        "Template sequences are not allowed in this string. To include a literal \
                         \"$\" or \"%\", double it (as \"$$\" or \"%%\") to escape it.",
                        tok.range.clone(),
                    );
                    self.stream.push_newlines(false);
                    self.recover(TokenKind::TemplateSeqEnd);
                    self.stream.pop_newlines();
                    valid = false;
                }
                _ => {
                    self.error(
                        "Unterminated template string",
                        "No closing marker was found for the string.",
                        open.range.clone(),
                    );
                    return None;
                }
            }
        }
        valid.then_some(out)
    }

    /// Read pieces up to the `end` token. Returns the closing token, or
    /// `None` if the template was not properly closed.
    fn parse_template_pieces(
        &mut self,
        end: TokenKind,
        heredoc: bool,
    ) -> (Vec<Piece>, Option<Token<'a>>) {
        let mut pieces = Vec::new();
        let mut line_start = heredoc;
        loop {
            let tok = self.stream.peek_raw().clone();
            match tok.kind {
                kind if kind == end && kind != TokenKind::EOF => {
                    self.stream.next_raw();
                    return (pieces, Some(tok));
                }
                TokenKind::QuotedLit | TokenKind::StringLit => {
                    self.stream.next_raw();
                    let text = self.literal_text(&tok);
                    let ends_line = text.ends_with('\n');
                    pieces.push(Piece::Literal {
                        text,
                        range: tok.range,
                        line_start: line_start && heredoc,
                    });
                    line_start = ends_line;
                }
                TokenKind::TemplateInterp => {
                    self.stream.next_raw();
                    pieces.push(self.parse_interpolation(tok));
                    line_start = false;
                }
                TokenKind::TemplateControl => {
                    self.stream.next_raw();
                    if let Some(piece) = self.parse_directive(tok) {
                        pieces.push(piece);
                    }
                    line_start = false;
                }
                TokenKind::EOF => {
                    if end != TokenKind::EOF {
                        self.error(
                            "Unterminated template string",
                            "No closing marker was found for the string.",
                            tok.range.clone(),
                        );
                    }
                    return (pieces, None);
                }
                TokenKind::QuotedNewline => {
                    self.error(
                        "Invalid multi-line string",
                        "Quoted strings may not be split over multiple lines. To produce a \
                         multi-line string, either use the \\n escape to represent a newline \
                         character or use the \"heredoc\" multi-line template syntax.",
                        tok.range.clone(),
                    );
                    return (pieces, None);
                }
                _ => {
                    self.stream.next_raw();
                    self.report_unexpected(
                        &tok,
                        "Invalid template",
                        "Unexpected token in template.",
                    );
                }
            }
        }
    }

    /// Text of a literal token. `$${` and `%%{` arrive as a two-byte token
    /// followed by a literal starting with `{`, and read as one `$` or `%`.
    fn literal_text(&mut self, tok: &Token<'a>) -> String {
        if matches!(tok.bytes, b"$$" | b"%%") {
            let next = self.stream.peek_raw();
            if matches!(next.kind, TokenKind::QuotedLit | TokenKind::StringLit)
                && next.bytes.starts_with(b"{")
            {
                return String::from_utf8_lossy(&tok.bytes[..1]).into_owned();
            }
        }
        if tok.kind == TokenKind::QuotedLit {
            let (text, diags) = unescape(tok.bytes, &tok.range);
            self.diags.append(diags);
            text
        } else {
            tok.text().into_owned()
        }
    }

    fn parse_interpolation(&mut self, open: Token<'a>) -> Piece {
        self.stream.push_newlines(false);
        let expr = self.parse_expression();
        let close = self.close_sequence(
            "Extra characters after interpolation expression",
            "Expected a closing brace to end the interpolation expression, but found extra \
             characters.",
        );
        self.stream.pop_newlines();
        Piece::Interp {
            expr,
            marker: marker(&open, &close),
        }
    }

    fn parse_directive(&mut self, open: Token<'a>) -> Option<Piece> {
        self.stream.push_newlines(false);
        let piece = self.parse_directive_inner(open);
        self.stream.pop_newlines();
        piece
    }

    fn parse_directive_inner(&mut self, open: Token<'a>) -> Option<Piece> {
        let keyword = self.stream.peek().clone();
        let name = if keyword.kind == TokenKind::Ident {
            keyword.text().into_owned()
        } else {
            String::new()
        };
        match name.as_str() {
            "if" => {
                self.stream.next();
                let cond = self.parse_expression();
                let close = self.close_directive("if");
                Some(Piece::If {
                    cond,
                    marker: marker(&open, &close),
                })
            }
            "else" => {
                self.stream.next();
                let close = self.close_directive("else");
                Some(Piece::Else(marker(&open, &close)))
            }
            "endif" => {
                self.stream.next();
                let close = self.close_directive("endif");
                Some(Piece::EndIf(marker(&open, &close)))
            }
            "endfor" => {
                self.stream.next();
                let close = self.close_directive("endfor");
                Some(Piece::EndFor(marker(&open, &close)))
            }
            "for" => {
                self.stream.next();
                self.parse_for_directive(open)
            }
            _ => {
                self.error(
                    "Invalid template control keyword",
                    format!(
                        "\"{}\" is not a valid template control keyword.",
                        keyword.text()
                    ),
                    keyword.range.clone(),
                );
                self.recover(TokenKind::TemplateSeqEnd);
                None
            }
        }
    }

    fn parse_for_directive(&mut self, open: Token<'a>) -> Option<Piece> {
        if self.stream.peek_kind() != TokenKind::Ident {
            return self.invalid_for_directive("For directive requires variable name after 'for'.");
        }
        let first = self.stream.next().text().into_owned();
        let (key_var, val_var) = if self.stream.peek_kind() == TokenKind::Comma {
            self.stream.next();
            if self.stream.peek_kind() != TokenKind::Ident {
                return self.invalid_for_directive("For directive requires a value variable name after the comma.");
            }
            (Some(first), self.stream.next().text().into_owned())
        } else {
            (None, first)
        };

        let in_kw = self.stream.peek();
        if in_kw.kind != TokenKind::Ident || in_kw.bytes != b"in" {
            return self.invalid_for_directive(
                "For directive requires the 'in' keyword after its name declarations.",
            );
        }
        self.stream.next();
        let coll = self.parse_expression();
        let close = self.close_directive("for");
        Some(Piece::For {
            key_var,
            val_var,
            coll,
            marker: marker(&open, &close),
        })
    }

    fn invalid_for_directive(&mut self, detail: &str) -> Option<Piece> {
        let tok = self.stream.peek().clone();
        self.report_unexpected(&tok, "Invalid 'for' directive", detail);
        self.recover(TokenKind::TemplateSeqEnd);
        None
    }

    fn close_directive(&mut self, keyword: &str) -> Token<'a> {
        self.close_sequence(
            &format!("Extra characters in {keyword} marker"),
            "Expected a closing brace to end the sequence, but found extra characters.",
        )
    }

    /// Expect the `}` or `~}` that ends a sequence, recovering to it if
    /// something else comes first.
    fn close_sequence(&mut self, summary: &str, detail: &str) -> Token<'a> {
        let tok = self.stream.peek().clone();
        if tok.kind == TokenKind::TemplateSeqEnd {
            return self.stream.next();
        }
        self.report_unexpected(&tok, summary, detail);
        let end = self.recover(TokenKind::TemplateSeqEnd);
        Token {
            kind: TokenKind::TemplateSeqEnd,
            bytes: b"}",
            range: end,
        }
    }

    fn build_template(&mut self, mut pieces: Vec<Piece>, range: Range) -> Expression {
        apply_strip_markers(&mut pieces);
        pieces.retain(|p| !matches!(p, Piece::Literal { text, .. } if text.is_empty()));

        if pieces.len() == 1
            && matches!(pieces[0], Piece::Interp { .. })
            && let Some(Piece::Interp { expr, .. }) = pieces.pop()
        {
            return Expression::new(ExprKind::TemplateWrap(Box::new(expr)), range);
        }

        let mut queue: VecDeque<Piece> = pieces.into();
        let (parts, stray) = self.assemble(&mut queue, &[]);
        debug_assert!(stray.is_none());
        Expression::new(ExprKind::Template(parts), range)
    }

    /// Build parts until one of `closers` is reached. Returns the parts and
    /// the closing marker, or `None` when the pieces ran out first.
    fn assemble(
        &mut self,
        queue: &mut VecDeque<Piece>,
        closers: &[Closer],
    ) -> (Vec<Expression>, Option<(Closer, Marker)>) {
        let mut parts = Vec::new();
        while let Some(piece) = queue.pop_front() {
            match piece {
                Piece::Literal { text, range, .. } => push_literal(&mut parts, text, range),
                Piece::Interp { expr, .. } => parts.push(expr),
                Piece::If { cond, marker } => {
                    let expr = self.assemble_if(queue, cond, marker);
                    parts.push(expr);
                }
                Piece::For {
                    key_var,
                    val_var,
                    coll,
                    marker,
                } => {
                    let expr = self.assemble_for(queue, key_var, val_var, coll, marker);
                    parts.push(expr);
                }
                Piece::Else(marker) => {
                    if let Some(done) = self.closer(Closer::Else, marker, closers) {
                        return (parts, Some(done));
                    }
                }
                Piece::EndIf(marker) => {
                    if let Some(done) = self.closer(Closer::EndIf, marker, closers) {
                        return (parts, Some(done));
                    }
                }
                Piece::EndFor(marker) => {
                    if let Some(done) = self.closer(Closer::EndFor, marker, closers) {
                        return (parts, Some(done));
                    }
                }
            }
        }
        (parts, None)
    }

    fn closer(
        &mut self,
        kind: Closer,
        marker: Marker,
        closers: &[Closer],
    ) -> Option<(Closer, Marker)> {
        if closers.contains(&kind) {
            return Some((kind, marker));
        }
        let name = match kind {
            Closer::Else => "else",
            Closer::EndIf => "endif",
            Closer::EndFor => "endfor",
        };
        self.error(
            "Unexpected template directive",
            format!("The {name} directive does not match any open directive."),
            marker.range,
        );
        None
    }

    fn assemble_if(
        &mut self,
        queue: &mut VecDeque<Piece>,
        cond: Expression,
        if_marker: Marker,
    ) -> Expression {
        let (true_parts, closer) = self.assemble(queue, &[Closer::Else, Closer::EndIf]);
        let true_part = template_node(true_parts, if_marker.range.end_range());

        let (false_part, end) = match closer {
            Some((Closer::Else, else_marker)) => {
                let (false_parts, closer) = self.assemble(queue, &[Closer::EndIf]);
                let false_part = template_node(false_parts, else_marker.range.end_range());
                let end = match closer {
                    Some((_, end_marker)) => end_marker.range,
                    None => self.unterminated_directive("if", "endif", &if_marker, &false_part),
                };
                (Some(Box::new(false_part)), end)
            }
            Some((_, end_marker)) => (None, end_marker.range),
            None => (
                None,
                self.unterminated_directive("if", "endif", &if_marker, &true_part),
            ),
        };

        let range = Range::between(&if_marker.range, &end);
        Expression::new(
            ExprKind::TemplateIf {
                cond: Box::new(cond),
                true_part: Box::new(true_part),
                false_part,
            },
            range,
        )
    }

    fn assemble_for(
        &mut self,
        queue: &mut VecDeque<Piece>,
        key_var: Option<String>,
        val_var: String,
        coll: Expression,
        for_marker: Marker,
    ) -> Expression {
        let (body_parts, closer) = self.assemble(queue, &[Closer::EndFor]);
        let body = template_node(body_parts, for_marker.range.end_range());
        let end = match closer {
            Some((_, end_marker)) => end_marker.range,
            None => self.unterminated_directive("for", "endfor", &for_marker, &body),
        };
        let range = Range::between(&for_marker.range, &end);
        let each = Expression::new(
            ExprKind::TemplateFor {
                key_var,
                val_var,
                coll: Box::new(coll),
                body: Box::new(body),
            },
            range.clone(),
        );
        Expression::new(ExprKind::TemplateJoin(Box::new(each)), range)
    }

    fn unterminated_directive(
        &mut self,
        name: &str,
        closer: &str,
        open: &Marker,
        last: &Expression,
    ) -> Range {
        self.error(
            "Unterminated template directive",
            format!("The {name} directive has no matching {closer}."),
            open.range.clone(),
        );
        last.range.clone()
    }
}

fn marker(open: &Token<'_>, close: &Token<'_>) -> Marker {
    Marker {
        range: Range::between(&open.range, &close.range),
        strip_left: open.bytes.ends_with(b"~"),
        strip_right: close.bytes.starts_with(b"~"),
    }
}

/// Remove up to `indent` leading spaces or tabs from every literal that
/// starts a heredoc line.
fn strip_indent(pieces: &mut [Piece], indent: usize) {
    for piece in pieces {
        if let Piece::Literal {
            text,
            line_start: true,
            ..
        } = piece
        {
            let n = text
                .bytes()
                .take(indent)
                .take_while(|b| matches!(b, b' ' | b'\t'))
                .count();
            text.drain(..n);
        }
    }
}

/// `~` after `${`/`%{` trims the preceding literal's trailing whitespace;
/// `~` before `}` trims the following literal's leading whitespace.
fn apply_strip_markers(pieces: &mut [Piece]) {
    for i in 0..pieces.len() {
        let (strip_left, strip_right) = match pieces[i].marker() {
            Some(m) => (m.strip_left, m.strip_right),
            None => continue,
        };
        if strip_left
            && i > 0
            && let Some(text) = pieces[i - 1].literal_mut()
        {
            let trimmed = text.trim_end().len();
            text.truncate(trimmed);
        }
        if strip_right
            && let Some(text) = pieces.get_mut(i + 1).and_then(Piece::literal_mut)
        {
            *text = text.trim_start().to_string();
        }
    }
}

/// Push a literal, merging it into a preceding literal.
fn push_literal(parts: &mut Vec<Expression>, text: String, range: Range) {
    if let Some(last) = parts.last_mut()
        && let ExprKind::Literal(Value::String(prev)) = &mut last.kind
    {
        prev.push_str(&text);
        last.range = Range::between(&last.range, &range);
        return;
    }
    parts.push(Expression::literal(Value::String(text), range));
}

fn template_node(parts: Vec<Expression>, fallback: Range) -> Expression {
    let range = match (parts.first(), parts.last()) {
        (Some(first), Some(last)) => Range::between(&first.range, &last.range),
        _ => fallback,
    };
    Expression::new(ExprKind::Template(parts), range)
}
