//! Expressions: operators, collection constructors, calls and traversals

use crate::ast::{
    BinaryOperator, ExprKind, Expression, ForExpr, FunctionCall, ObjectItem, UnaryOperator,
};
use crate::lexer::{Token, TokenKind};
use crate::pos::Range;
use crate::traversal::{Traversal, Traverser};
use crate::value::{Number, Type, Value};

use super::{Parser, is_closer, is_integer_literal, number_value};

const INVALID_FOR: &str = "Invalid 'for' expression";

impl<'a> Parser<'a> {
    pub(super) fn parse_expression(&mut self) -> Expression {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Expression {
        let cond = self.parse_binary(1);
        if self.stream.peek_past_newlines() != TokenKind::Question {
            return cond;
        }
        self.stream.skip_newlines();
        self.stream.next();
        self.stream.skip_newlines();
        let true_result = self.parse_expression();

        let false_result = if self.stream.peek_past_newlines() == TokenKind::Colon {
            self.stream.skip_newlines();
            self.stream.next();
            self.stream.skip_newlines();
            self.parse_expression()
        } else {
            let tok = self.stream.peek().clone();
            self.report_unexpected(
                &tok,
                "Missing false expression in conditional",
                "The conditional operator (...?...:...) requires a false expression, delimited \
                 by a colon.",
            );
            Self::placeholder(true_result.range.end_range())
        };

        let range = Range::between(&cond.range, &false_result.range);
        Expression::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                true_result: Box::new(true_result),
                false_result: Box::new(false_result),
            },
            range,
        )
    }

    /// Left-associative binary operators at `level` and above.
    fn parse_binary(&mut self, level: u8) -> Expression {
        if level > BinaryOperator::MAX_PRECEDENCE {
            return self.parse_unary();
        }
        let mut lhs = self.parse_binary(level + 1);
        while let Some(op) = self.peek_binary_operator(level) {
            self.stream.skip_newlines();
            let op_tok = self.stream.next();
            self.stream.skip_newlines();
            let rhs = self.parse_binary(level + 1);
            let range = Range::between(&lhs.range, &rhs.range);
            lhs = Expression::new(
                ExprKind::BinaryOp {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    op_range: op_tok.range,
                },
                range,
            );
        }
        lhs
    }

    /// An operator continues the expression even on the next line, except
    /// a leading minus, which reads as the start of something new.
    fn peek_binary_operator(&self, level: u8) -> Option<BinaryOperator> {
        let kind = match self.stream.peek_kind() {
            TokenKind::Newline => match self.stream.peek_past_newlines() {
                TokenKind::Minus => return None,
                kind => kind,
            },
            kind => kind,
        };
        binary_operator(kind).filter(|op| op.precedence() == level)
    }

    fn parse_unary(&mut self) -> Expression {
        let op = match self.stream.peek_kind() {
            TokenKind::Minus => UnaryOperator::Negate,
            TokenKind::Bang => UnaryOperator::Not,
            _ => return self.parse_postfix(),
        };
        let op_tok = self.stream.next();
        let operand = self.parse_unary();
        let range = Range::between(&op_tok.range, &operand.range);
        if op == UnaryOperator::Negate
            && let ExprKind::Literal(Value::Number(n)) = &operand.kind
        {
            return Expression::literal(Value::Number(n.neg()), range);
        }
        Expression::new(
            ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
                op_range: op_tok.range,
            },
            range,
        )
    }

    fn parse_postfix(&mut self) -> Expression {
        let mut expr = self.parse_primary();
        loop {
            expr = match self.stream.peek_kind() {
                TokenKind::Dot => self.parse_dot(expr),
                TokenKind::OBrack => self.parse_bracket(expr),
                _ => return expr,
            };
        }
    }

    /// Consume the next token for an error report unless it ends the
    /// current construct, so recovery can still see it.
    fn take_bad_token(&mut self) -> (Token<'a>, bool) {
        let tok = self.stream.peek().clone();
        let keep = is_closer(tok.kind) || matches!(tok.kind, TokenKind::Newline | TokenKind::EOF);
        if !keep {
            self.stream.next();
        }
        (tok, !keep)
    }

    fn parse_primary(&mut self) -> Expression {
        match self.stream.peek_kind() {
            TokenKind::NumberLit => {
                let tok = self.stream.next();
                match std::str::from_utf8(tok.bytes).ok().and_then(Number::parse) {
                    Some(n) => Expression::literal(Value::Number(n), tok.range),
                    None => {
                        self.error(
                            "Invalid number literal",
                            "Failed to recognize the value of this number literal.",
                            tok.range.clone(),
                        );
                        Self::placeholder(tok.range)
                    }
                }
            }
            TokenKind::Ident => {
                let tok = self.stream.next();
                if self.stream.peek_kind() == TokenKind::OParen {
                    return self.parse_function_call(tok);
                }
                match tok.bytes {
                    b"true" => Expression::literal(Value::Bool(true), tok.range),
                    b"false" => Expression::literal(Value::Bool(false), tok.range),
                    b"null" => Expression::literal(Value::null(Type::Dynamic), tok.range),
                    _ => {
                        let root = Traverser::Root {
                            name: tok.text().into_owned(),
                            range: tok.range.clone(),
                        };
                        Expression::new(
                            ExprKind::ScopeTraversal(Traversal::new(vec![root])),
                            tok.range,
                        )
                    }
                }
            }
            TokenKind::OParen => self.parse_paren(),
            TokenKind::OBrack => self.parse_tuple_or_for(),
            TokenKind::OBrace => self.parse_object_or_for(),
            TokenKind::OQuote => {
                let open = self.stream.next();
                self.parse_quoted_template(open)
            }
            TokenKind::OHeredoc => {
                let open = self.stream.next();
                self.parse_heredoc(open)
            }
            _ => {
                let (tok, consumed) = self.take_bad_token();
                self.report_unexpected(
                    &tok,
                    "Invalid expression",
                    "Expected the start of an expression, but found an invalid expression token.",
                );
                let range = if consumed {
                    tok.range
                } else {
                    tok.range.start_range()
                };
                Self::placeholder(range)
            }
        }
    }

    fn parse_paren(&mut self) -> Expression {
        let open = self.stream.next();
        self.stream.push_newlines(false);
        let inner = self.parse_expression();
        let close = self.stream.peek().clone();
        let end = if close.kind == TokenKind::CParen {
            self.stream.next();
            close.range
        } else {
            self.report_unexpected(
                &close,
                "Unbalanced parentheses",
                "Expected a closing parenthesis to terminate the expression.",
            );
            self.recover(TokenKind::CParen)
        };
        self.stream.pop_newlines();
        Expression::new(
            ExprKind::Paren(Box::new(inner)),
            Range::between(&open.range, &end),
        )
    }

    fn parse_function_call(&mut self, name: Token<'a>) -> Expression {
        let open = self.stream.next();
        self.stream.push_newlines(false);
        let mut args = Vec::new();
        let mut expand_final = false;

        let close = loop {
            match self.stream.peek_kind() {
                TokenKind::CParen => break self.stream.next().range,
                TokenKind::EOF => break self.unterminated_call(&open),
                _ => {}
            }
            args.push(self.parse_expression());
            match self.stream.peek_kind() {
                TokenKind::Comma => {
                    self.stream.next();
                }
                TokenKind::CParen => {}
                TokenKind::EOF => break self.unterminated_call(&open),
                TokenKind::Ellipsis => {
                    self.stream.next();
                    expand_final = true;
                    let tok = self.stream.peek().clone();
                    if tok.kind == TokenKind::CParen {
                        break self.stream.next().range;
                    }
                    self.report_unexpected(
                        &tok,
                        "Missing close parenthesis",
                        "An expanded function argument (with ...) must be immediately followed by \
                         closing parentheses.",
                    );
                    break self.recover(TokenKind::CParen);
                }
                _ if self.stream.newline_before_next() => {
                    self.error(
                        "Missing close parenthesis",
                        "An argument list must end with a closing parenthesis (\")\").",
                        self.stream.prev_range().end_range(),
                    );
                    break self.stream.prev_range();
                }
                _ => {
                    let tok = self.stream.peek().clone();
                    self.report_unexpected(
                        &tok,
                        "Missing argument separator",
                        "A comma is required to separate each function argument from the next.",
                    );
                    break self.recover(TokenKind::CParen);
                }
            }
        };
        self.stream.pop_newlines();

        let range = Range::between(&name.range, &close);
        Expression::new(
            ExprKind::FunctionCall(FunctionCall {
                name: name.text().into_owned(),
                name_range: name.range,
                args,
                expand_final,
                open_paren_range: open.range,
                close_paren_range: close,
            }),
            range,
        )
    }

    fn unterminated_call(&mut self, open: &Token<'a>) -> Range {
        self.error(
            "Unterminated function call",
            "There is no closing parenthesis for this function call before the end of the file. \
             This may be caused by incorrect parenthesis nesting elsewhere in this file.",
            open.range.clone(),
        );
        self.stream.prev_range()
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let tok = self.stream.peek();
        tok.kind == TokenKind::Ident && tok.bytes == keyword.as_bytes()
    }

    fn at_for_keyword(&self) -> bool {
        self.peek_keyword("for") && self.stream.peek_nth_kind(1) == TokenKind::Ident
    }

    fn parse_tuple_or_for(&mut self) -> Expression {
        let open = self.stream.next();
        self.stream.push_newlines(false);
        if self.at_for_keyword() {
            let expr = self.parse_for(&open, false);
            self.stream.pop_newlines();
            return expr;
        }

        let mut items = Vec::new();
        let close = loop {
            match self.stream.peek_kind() {
                TokenKind::CBrack => break self.stream.next().range,
                TokenKind::EOF => {
                    self.error(
                        "Missing close bracket",
                        "There is no corresponding closing bracket before the end of the file. \
                         This may be caused by incorrect bracket nesting elsewhere in this file.",
                        open.range.clone(),
                    );
                    break self.stream.prev_range();
                }
                _ => {}
            }
            items.push(self.parse_expression());
            match self.stream.peek_kind() {
                TokenKind::Comma => {
                    self.stream.next();
                }
                TokenKind::CBrack | TokenKind::EOF => {}
                _ => {
                    let tok = self.stream.peek().clone();
                    self.report_unexpected(
                        &tok,
                        "Missing item separator",
                        "Expected a comma to mark the beginning of the next item.",
                    );
                    break self.recover(TokenKind::CBrack);
                }
            }
        };
        self.stream.pop_newlines();
        Expression::new(
            ExprKind::TupleCons(items),
            Range::between(&open.range, &close),
        )
    }

    fn parse_object_or_for(&mut self) -> Expression {
        let open = self.stream.next();
        self.stream.push_newlines(false);
        if self.at_for_keyword() {
            let expr = self.parse_for(&open, true);
            self.stream.pop_newlines();
            return expr;
        }
        self.stream.pop_newlines();

        self.stream.push_newlines(true);
        let mut items = Vec::new();
        let close = loop {
            self.stream.skip_newlines();
            match self.stream.peek_kind() {
                TokenKind::CBrace => break self.stream.next().range,
                TokenKind::EOF => {
                    self.error(
                        "Missing close brace",
                        "There is no corresponding closing brace before the end of the file. \
                         This may be caused by incorrect brace nesting elsewhere in this file.",
                        open.range.clone(),
                    );
                    break self.stream.prev_range();
                }
                _ => {}
            }

            let key = self.parse_object_key();
            let force_non_literal = matches!(key.kind, ExprKind::Paren(_));

            let sep = self.stream.peek().clone();
            if !matches!(sep.kind, TokenKind::Equal | TokenKind::Colon) {
                let detail = if sep.kind == TokenKind::Newline || sep.kind == TokenKind::Comma {
                    "Expected an equals sign (\"=\") to mark the beginning of the attribute value. \
                     If you intended to give an attribute name containing periods or spaces, \
                     write the name in quotes to create a string literal."
                } else {
                    "Expected an equals sign (\"=\") to mark the beginning of the attribute value."
                };
                self.report_unexpected(&sep, "Missing key/value separator", detail);
                break self.recover(TokenKind::CBrace);
            }
            self.stream.next();

            let value = self.parse_expression();
            items.push(ObjectItem {
                key,
                force_non_literal,
                value,
            });

            match self.stream.peek_kind() {
                TokenKind::Comma | TokenKind::Newline => {
                    self.stream.next();
                }
                TokenKind::CBrace | TokenKind::EOF => {}
                _ => {
                    let tok = self.stream.peek().clone();
                    self.report_unexpected(
                        &tok,
                        "Missing attribute separator",
                        "Expected a newline or comma to mark the beginning of the next attribute.",
                    );
                    break self.recover(TokenKind::CBrace);
                }
            }
        };
        self.stream.pop_newlines();
        Expression::new(
            ExprKind::ObjectCons(items),
            Range::between(&open.range, &close),
        )
    }

    /// A bare identifier followed by `=` or `:` is kept as a single-step
    /// traversal; evaluation reads it as a literal name.
    fn parse_object_key(&mut self) -> Expression {
        if self.stream.peek_kind() == TokenKind::Ident
            && matches!(
                self.stream.peek_nth_kind(1),
                TokenKind::Equal | TokenKind::Colon
            )
        {
            let tok = self.stream.next();
            let root = Traverser::Root {
                name: tok.text().into_owned(),
                range: tok.range.clone(),
            };
            return Expression::new(
                ExprKind::ScopeTraversal(Traversal::new(vec![root])),
                tok.range,
            );
        }
        self.stream.push_newlines(false);
        let key = self.parse_expression();
        self.stream.pop_newlines();
        key
    }

    /// `[for ...]` or `{for ...}` with the opening bracket consumed.
    fn parse_for(&mut self, open: &Token<'a>, object: bool) -> Expression {
        let close_kind = if object {
            TokenKind::CBrace
        } else {
            TokenKind::CBrack
        };
        match self.parse_for_clauses(open, object, close_kind) {
            Some(expr) => expr,
            None => {
                let end = self.stream.prev_range();
                Self::placeholder(Range::between(&open.range, &end))
            }
        }
    }

    fn for_error(&mut self, detail: &str, close_kind: TokenKind) {
        let tok = self.stream.peek().clone();
        self.report_unexpected(&tok, INVALID_FOR, detail);
        self.recover(close_kind);
    }

    fn parse_for_clauses(
        &mut self,
        open: &Token<'a>,
        object: bool,
        close_kind: TokenKind,
    ) -> Option<Expression> {
        self.stream.next();

        let first = self.stream.next();
        let (key_var, val_var) = if self.stream.peek_kind() == TokenKind::Comma {
            self.stream.next();
            if self.stream.peek_kind() != TokenKind::Ident {
                self.for_error(
                    "The 'for' expression requires a value variable name after the comma.",
                    close_kind,
                );
                return None;
            }
            let second = self.stream.next();
            (Some(first.text().into_owned()), second.text().into_owned())
        } else {
            (None, first.text().into_owned())
        };

        if !self.peek_keyword("in") {
            self.for_error(
                "For expression requires the 'in' keyword after its name declarations.",
                close_kind,
            );
            return None;
        }
        self.stream.next();
        let coll = self.parse_expression();

        if self.stream.peek_kind() != TokenKind::Colon {
            self.for_error(
                "For expression requires a colon after the collection expression.",
                close_kind,
            );
            return None;
        }
        self.stream.next();

        let first_expr = self.parse_expression();
        let mut group = false;
        let (key_expr, val_expr) = if object {
            if self.stream.peek_kind() != TokenKind::FatArrow {
                self.for_error(
                    "Key expression is required when building an object.",
                    close_kind,
                );
                return None;
            }
            self.stream.next();
            let val_expr = self.parse_expression();
            if self.stream.peek_kind() == TokenKind::Ellipsis {
                self.stream.next();
                group = true;
            }
            (Some(first_expr), val_expr)
        } else {
            match self.stream.peek_kind() {
                TokenKind::FatArrow => {
                    self.for_error(
                        "Key expression is not valid when building a tuple.",
                        close_kind,
                    );
                    return None;
                }
                TokenKind::Ellipsis => {
                    self.for_error(
                        "Grouping ellipsis (...) cannot be used when building a tuple.",
                        close_kind,
                    );
                    return None;
                }
                _ => (None, first_expr),
            }
        };

        let cond = if self.peek_keyword("if") {
            self.stream.next();
            Some(self.parse_expression())
        } else {
            None
        };

        if self.stream.peek_kind() != close_kind {
            self.for_error(
                "Extra characters after the end of the 'for' expression.",
                close_kind,
            );
            return None;
        }
        let close = self.stream.next();

        let range = Range::between(&open.range, &close.range);
        Some(Expression::new(
            ExprKind::For(Box::new(ForExpr {
                key_var,
                val_var,
                coll,
                key_expr,
                val_expr,
                cond,
                group,
                open_range: open.range.clone(),
                close_range: close.range,
            })),
            range,
        ))
    }

    /// `.name`, `.0`, or `.*` after an expression.
    fn parse_dot(&mut self, expr: Expression) -> Expression {
        let dot = self.stream.next();
        let tok = self.stream.peek().clone();
        match tok.kind {
            TokenKind::Ident => {
                self.stream.next();
                push_step(
                    expr,
                    Traverser::Attr {
                        name: tok.text().into_owned(),
                        range: Range::between(&dot.range, &tok.range),
                    },
                )
            }
            TokenKind::NumberLit if is_integer_literal(tok.bytes) => {
                self.stream.next();
                push_step(
                    expr,
                    Traverser::Index {
                        key: number_value(tok.bytes),
                        range: Range::between(&dot.range, &tok.range),
                    },
                )
            }
            TokenKind::NumberLit => {
                self.stream.next();
                self.error(
                    "Invalid legacy index syntax",
                    "When using the legacy index syntax, chaining two indexes together is not \
                     permitted. Use the proper index syntax instead, like [0].",
                    tok.range.clone(),
                );
                Self::placeholder(Range::between(&expr.range, &tok.range))
            }
            TokenKind::Star => {
                self.stream.next();
                let marker_range = Range::between(&dot.range, &tok.range);
                let mut each = Traversal::default();
                while self.stream.peek_kind() == TokenKind::Dot
                    && self.stream.peek_nth_kind(1) == TokenKind::Ident
                {
                    let dot = self.stream.next();
                    let name = self.stream.next();
                    each.push(Traverser::Attr {
                        name: name.text().into_owned(),
                        range: Range::between(&dot.range, &name.range),
                    });
                }
                let end = each.source_range().unwrap_or_else(|| marker_range.clone());
                let range = Range::between(&expr.range, &end);
                Expression::new(
                    ExprKind::SplatAttr {
                        source: Box::new(expr),
                        each,
                        marker_range,
                    },
                    range,
                )
            }
            _ => {
                let (tok, _) = self.take_bad_token();
                self.report_unexpected(
                    &tok,
                    "Invalid attribute name",
                    "An attribute name is required after a dot.",
                );
                Self::placeholder(Range::between(&expr.range, &dot.range))
            }
        }
    }

    /// `[key]` or `[*]` after an expression.
    fn parse_bracket(&mut self, expr: Expression) -> Expression {
        if self.stream.peek_nth_kind(1) == TokenKind::Star
            && self.stream.peek_nth_kind(2) == TokenKind::CBrack
        {
            return self.parse_full_splat(expr);
        }
        match self.parse_index_key() {
            Ok((IndexKey::Static(key), range)) => push_step(expr, Traverser::Index { key, range }),
            Ok((IndexKey::Dynamic(key), bracket_range)) => {
                let range = Range::between(&expr.range, &bracket_range);
                Expression::new(
                    ExprKind::Index {
                        collection: Box::new(expr),
                        key: Box::new(key),
                        bracket_range,
                    },
                    range,
                )
            }
            Err(end) => Self::placeholder(Range::between(&expr.range, &end)),
        }
    }

    /// Parse `[expr]`. On failure returns the range where recovery ended.
    fn parse_index_key(&mut self) -> Result<(IndexKey, Range), Range> {
        let open = self.stream.next();
        self.stream.push_newlines(false);
        let before = self.diags.len();
        let key = self.parse_expression();
        let close = self.stream.peek().clone();
        if close.kind != TokenKind::CBrack {
            self.report_unexpected(
                &close,
                "Missing close bracket on index",
                "The index operator must end with a closing bracket (\"]\").",
            );
            let end = self.recover(TokenKind::CBrack);
            self.stream.pop_newlines();
            return Err(end);
        }
        self.stream.next();
        self.stream.pop_newlines();

        let range = Range::between(&open.range, &close.range);
        if self.diags.len() > before {
            return Err(range);
        }
        let key = match key.as_literal() {
            Some(value) => IndexKey::Static(value.clone()),
            None => match key.as_static_string() {
                Some(s) => IndexKey::Static(Value::String(s)),
                None => IndexKey::Dynamic(key),
            },
        };
        Ok((key, range))
    }

    fn parse_full_splat(&mut self, expr: Expression) -> Expression {
        let open = self.stream.next();
        self.stream.next();
        let close = self.stream.next();
        let marker_range = Range::between(&open.range, &close.range);

        let mut each = Traversal::default();
        let mut trailing_index = None;
        loop {
            match (self.stream.peek_kind(), self.stream.peek_nth_kind(1)) {
                (TokenKind::Dot, TokenKind::Ident) => {
                    let dot = self.stream.next();
                    let name = self.stream.next();
                    each.push(Traverser::Attr {
                        name: name.text().into_owned(),
                        range: Range::between(&dot.range, &name.range),
                    });
                }
                (TokenKind::Dot, TokenKind::NumberLit)
                    if is_integer_literal(self.peek_nth_bytes(1)) =>
                {
                    let dot = self.stream.next();
                    let num = self.stream.next();
                    each.push(Traverser::Index {
                        key: number_value(num.bytes),
                        range: Range::between(&dot.range, &num.range),
                    });
                }
                (TokenKind::OBrack, kind) if kind != TokenKind::Star => {
                    match self.parse_index_key() {
                        Ok((IndexKey::Static(key), range)) => {
                            each.push(Traverser::Index { key, range })
                        }
                        Ok((IndexKey::Dynamic(key), range)) => {
                            trailing_index = Some((key, range));
                            break;
                        }
                        Err(end) => {
                            return Self::placeholder(Range::between(&expr.range, &end));
                        }
                    }
                }
                _ => break,
            }
        }

        let end = each.source_range().unwrap_or_else(|| marker_range.clone());
        let range = Range::between(&expr.range, &end);
        let splat = Expression::new(
            ExprKind::SplatFull {
                source: Box::new(expr),
                each,
                marker_range,
            },
            range,
        );
        match trailing_index {
            Some((key, bracket_range)) => {
                let range = Range::between(&splat.range, &bracket_range);
                Expression::new(
                    ExprKind::Index {
                        collection: Box::new(splat),
                        key: Box::new(key),
                        bracket_range,
                    },
                    range,
                )
            }
            None => splat,
        }
    }

    fn peek_nth_bytes(&self, n: usize) -> &'a [u8] {
        self.stream.peek_nth(n).bytes
    }
}

enum IndexKey {
    Static(Value),
    Dynamic(Expression),
}

fn binary_operator(kind: TokenKind) -> Option<BinaryOperator> {
    let op = match kind {
        TokenKind::Or => BinaryOperator::Or,
        TokenKind::And => BinaryOperator::And,
        TokenKind::EqualOp => BinaryOperator::Equal,
        TokenKind::NotEqual => BinaryOperator::NotEqual,
        TokenKind::LessThan => BinaryOperator::LessThan,
        TokenKind::LessThanEq => BinaryOperator::LessThanOrEqual,
        TokenKind::GreaterThan => BinaryOperator::GreaterThan,
        TokenKind::GreaterThanEq => BinaryOperator::GreaterThanOrEqual,
        TokenKind::Plus => BinaryOperator::Add,
        TokenKind::Minus => BinaryOperator::Subtract,
        TokenKind::Star => BinaryOperator::Multiply,
        TokenKind::Slash => BinaryOperator::Divide,
        TokenKind::Percent => BinaryOperator::Modulo,
        _ => return None,
    };
    Some(op)
}

/// Append a traversal step, extending an existing traversal node when
/// there is one.
fn push_step(expr: Expression, step: Traverser) -> Expression {
    let range = Range::between(&expr.range, step.range());
    match expr.kind {
        ExprKind::ScopeTraversal(mut traversal) => {
            traversal.push(step);
            Expression::new(ExprKind::ScopeTraversal(traversal), range)
        }
        ExprKind::RelativeTraversal {
            source,
            mut traversal,
        } => {
            traversal.push(step);
            Expression::new(ExprKind::RelativeTraversal { source, traversal }, range)
        }
        kind => {
            let source = Expression::new(kind, expr.range);
            Expression::new(
                ExprKind::RelativeTraversal {
                    source: Box::new(source),
                    traversal: Traversal::new(vec![step]),
                },
                range,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse_expression;
    use super::*;
    use crate::pos::Pos;

    fn parse(src: &str) -> Expression {
        let (expr, diags) = parse_expression(src.as_bytes(), "t", Pos::START);
        assert!(diags.is_empty(), "{src}: {diags}");
        expr
    }

    fn parse_err(src: &str) -> String {
        let (_, diags) = parse_expression(src.as_bytes(), "t", Pos::START);
        assert!(diags.has_errors(), "expected errors for {src}");
        diags[0].summary.clone()
    }

    // ============ Operators ============

    #[test]
    fn precedence_climbing() {
        let expr = parse("1 + 2 * 3 == 7 || false");
        let ExprKind::BinaryOp { op, lhs, .. } = &expr.kind else {
            panic!("expected binary op, got {expr:?}");
        };
        assert_eq!(*op, BinaryOperator::Or);
        let ExprKind::BinaryOp { op, lhs, .. } = &lhs.kind else {
            panic!("expected comparison");
        };
        assert_eq!(*op, BinaryOperator::Equal);
        let ExprKind::BinaryOp { op, rhs, .. } = &lhs.kind else {
            panic!("expected addition");
        };
        assert_eq!(*op, BinaryOperator::Add);
        assert!(matches!(
            rhs.kind,
            ExprKind::BinaryOp {
                op: BinaryOperator::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn left_associative() {
        let expr = parse("8 - 4 - 2");
        let ExprKind::BinaryOp { lhs, .. } = &expr.kind else {
            panic!("expected binary op");
        };
        assert!(matches!(
            lhs.kind,
            ExprKind::BinaryOp {
                op: BinaryOperator::Subtract,
                ..
            }
        ));
    }

    #[test]
    fn negative_literals_fold() {
        let expr = parse("-5");
        assert_eq!(expr.as_literal(), Some(&Value::from(-5)));
        assert!(matches!(parse("-a").kind, ExprKind::UnaryOp { .. }));
    }

    #[test]
    fn conditional_is_right_associative() {
        let expr = parse("a ? b : c ? d : e");
        let ExprKind::Conditional { false_result, .. } = &expr.kind else {
            panic!("expected conditional");
        };
        assert!(matches!(false_result.kind, ExprKind::Conditional { .. }));
        assert_eq!(
            parse_err("a ? b"),
            "Missing false expression in conditional"
        );
    }

    // ============ Traversals ============

    #[test]
    fn traversal_steps_merge() {
        let expr = parse("a.b[0][\"c\"].1");
        let ExprKind::ScopeTraversal(t) = &expr.kind else {
            panic!("expected scope traversal");
        };
        assert_eq!(t.len(), 5);
        assert_eq!(expr.range.end.byte, 13);
    }

    #[test]
    fn dynamic_index_is_a_node() {
        let expr = parse("a[b]");
        assert!(matches!(expr.kind, ExprKind::Index { .. }));
        let expr = parse("f()[0]");
        assert!(matches!(expr.kind, ExprKind::RelativeTraversal { .. }));
    }

    #[test]
    fn legacy_index_chain_is_rejected() {
        assert_eq!(parse_err("a.0.1"), "Invalid legacy index syntax");
    }

    #[test]
    fn splats() {
        let expr = parse("a.*.b.c[0]");
        let ExprKind::RelativeTraversal { source, traversal } = &expr.kind else {
            panic!("index after attribute splat applies to the result");
        };
        assert_eq!(traversal.len(), 1);
        let ExprKind::SplatAttr { each, .. } = &source.kind else {
            panic!("expected attribute splat");
        };
        assert_eq!(each.len(), 2);

        let expr = parse("a[*].b[0].c");
        let ExprKind::SplatFull { each, .. } = &expr.kind else {
            panic!("expected full splat");
        };
        assert_eq!(each.len(), 3);
    }

    // ============ Constructors ============

    #[test]
    fn collections() {
        let expr = parse("[1, 2, 3,]");
        assert!(matches!(&expr.kind, ExprKind::TupleCons(items) if items.len() == 3));

        let expr = parse("{\n  a = 1\n  \"b\" : 2, (c) = 3\n}");
        let ExprKind::ObjectCons(items) = &expr.kind else {
            panic!("expected object");
        };
        assert_eq!(items.len(), 3);
        assert!(!items[0].force_non_literal);
        assert!(items[2].force_non_literal);
    }

    #[test]
    fn collection_errors() {
        assert_eq!(parse_err("[1 2]"), "Missing item separator");
        assert_eq!(parse_err("{a 1}"), "Missing key/value separator");
        assert_eq!(parse_err("{a = 1 b = 2}"), "Missing attribute separator");
    }

    #[test]
    fn for_expressions() {
        let expr = parse("{for k, v in m: k => v... if v}");
        let ExprKind::For(f) = &expr.kind else {
            panic!("expected for");
        };
        assert_eq!(f.key_var.as_deref(), Some("k"));
        assert!(f.group && f.is_object() && f.cond.is_some());

        let expr = parse("[for x in xs: x * 2]");
        assert!(matches!(&expr.kind, ExprKind::For(f) if !f.is_object()));
    }

    #[test]
    fn for_errors() {
        let (_, diags) = parse_expression(b"[for x in xs: x => x]", "t", Pos::START);
        assert_eq!(diags[0].summary, INVALID_FOR);
        assert_eq!(diags[0].detail, "Key expression is not valid when building a tuple.");

        let (_, diags) = parse_expression(b"{for x in xs: x}", "t", Pos::START);
        assert_eq!(
            diags[0].detail,
            "Key expression is required when building an object."
        );

        let (_, diags) = parse_expression(b"[for x xs: x]", "t", Pos::START);
        assert!(diags[0].detail.contains("'in' keyword"));
    }

    // ============ Calls ============

    #[test]
    fn function_calls() {
        let expr = parse("f(1, g(2), xs...)");
        let ExprKind::FunctionCall(call) = &expr.kind else {
            panic!("expected call");
        };
        assert_eq!(call.name, "f");
        assert_eq!(call.args.len(), 3);
        assert!(call.expand_final);

        assert_eq!(parse_err("f(1 2)"), "Missing argument separator");
        assert_eq!(parse_err("f(1, 2"), "Unterminated function call");
    }

    #[test]
    fn invalid_expression_placeholder() {
        let (expr, diags) = parse_expression(b"1 + )", "t", Pos::START);
        assert_eq!(diags[0].summary, "Invalid expression");
        let ExprKind::BinaryOp { rhs, .. } = &expr.kind else {
            panic!("expected binary op");
        };
        assert!(rhs.as_literal().is_some_and(Value::is_null));
    }
}
