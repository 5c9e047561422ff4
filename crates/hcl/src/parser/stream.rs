//! Token stream with newline-sensitivity tracking.

use crate::lexer::{Token, TokenKind};
use crate::pos::Range;

/// Tokens with lookahead for the recursive descent parser.
///
/// Whether newlines are significant depends on the construct being parsed,
/// so the parser pushes a flag on entering brackets, parentheses and
/// templates and pops it on leaving. Insignificant newlines and comments
/// are skipped by `peek` and `next`. A line comment that ends in a newline
/// stands in for that newline.
pub(crate) struct TokenStream<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    /// Index of the most recently consumed token.
    prev: usize,
    newlines: Vec<bool>,
}

impl<'a> TokenStream<'a> {
    /// `tokens` must end with an `EOF` token.
    pub fn new(tokens: Vec<Token<'a>>) -> Self {
        Self {
            tokens,
            pos: 0,
            prev: 0,
            newlines: vec![true],
        }
    }

    pub fn push_newlines(&mut self, significant: bool) {
        self.newlines.push(significant);
    }

    pub fn pop_newlines(&mut self) {
        if self.newlines.len() > 1 {
            self.newlines.pop();
        }
    }

    fn newlines_significant(&self) -> bool {
        self.newlines.last().copied().unwrap_or(true)
    }

    /// Kind the parser sees for `tok`, or `None` if it is skipped.
    fn effective(&self, tok: &Token<'_>) -> Option<TokenKind> {
        let significant = self.newlines_significant();
        match tok.kind {
            TokenKind::Comment if significant && tok.bytes.ends_with(b"\n") => {
                Some(TokenKind::Newline)
            }
            TokenKind::Comment => None,
            TokenKind::Newline | TokenKind::QuotedNewline if significant => {
                Some(TokenKind::Newline)
            }
            TokenKind::Newline | TokenKind::QuotedNewline => None,
            kind => Some(kind),
        }
    }

    fn last_index(&self) -> usize {
        self.tokens.len().saturating_sub(1)
    }

    /// Index of the `n`th visible token from the current position.
    fn visible_index(&self, n: usize) -> usize {
        let mut seen = 0;
        let mut idx = self.pos;
        while idx < self.tokens.len() {
            if self.effective(&self.tokens[idx]).is_some() {
                if seen == n {
                    return idx;
                }
                seen += 1;
            }
            idx += 1;
        }
        self.last_index()
    }

    pub fn peek(&self) -> &Token<'a> {
        &self.tokens[self.visible_index(0)]
    }

    pub fn peek_nth(&self, n: usize) -> &Token<'a> {
        &self.tokens[self.visible_index(n)]
    }

    pub fn peek_kind(&self) -> TokenKind {
        self.peek_nth_kind(0)
    }

    pub fn peek_nth_kind(&self, n: usize) -> TokenKind {
        let tok = &self.tokens[self.visible_index(n)];
        self.effective(tok).unwrap_or(TokenKind::EOF)
    }

    /// First visible kind after any newlines.
    pub fn peek_past_newlines(&self) -> TokenKind {
        let mut n = 0;
        loop {
            match self.peek_nth_kind(n) {
                TokenKind::Newline => n += 1,
                kind => return kind,
            }
        }
    }

    /// Consume the next visible token. Comments standing in for a newline
    /// are returned with kind `Newline`.
    pub fn next(&mut self) -> Token<'a> {
        let idx = self.visible_index(0);
        self.prev = idx;
        let mut tok = self.tokens[idx].clone();
        if let Some(kind) = self.effective(&tok) {
            tok.kind = kind;
        }
        self.pos = (idx + 1).min(self.tokens.len());
        if tok.kind == TokenKind::EOF {
            self.pos = self.last_index();
        }
        tok
    }

    /// Next token with nothing skipped.
    pub fn peek_raw(&self) -> &Token<'a> {
        &self.tokens[self.pos.min(self.last_index())]
    }

    pub fn next_raw(&mut self) -> Token<'a> {
        let tok = self.peek_raw().clone();
        self.prev = self.pos.min(self.last_index());
        if tok.kind != TokenKind::EOF {
            self.pos += 1;
        }
        tok
    }

    /// Step back before the most recently consumed token.
    pub fn unread(&mut self) {
        self.pos = self.prev;
        self.prev = self.tokens[..self.pos]
            .iter()
            .rposition(|t| self.effective(t).is_some())
            .unwrap_or(0);
    }

    /// Consume any visible newlines.
    pub fn skip_newlines(&mut self) {
        while self.peek_kind() == TokenKind::Newline {
            self.next();
        }
    }

    /// Range of the most recently consumed token.
    pub fn prev_range(&self) -> Range {
        self.tokens[self.prev.min(self.last_index())].range.clone()
    }

    /// True when a newline separates the previous token from the next.
    pub fn newline_before_next(&self) -> bool {
        let mut idx = self.pos;
        while idx < self.tokens.len() {
            let tok = &self.tokens[idx];
            match tok.kind {
                TokenKind::Newline => return true,
                TokenKind::Comment if tok.bytes.ends_with(b"\n") => return true,
                TokenKind::Comment => idx += 1,
                _ => return false,
            }
        }
        false
    }
}
