//! Tokenizer for the native syntax
//!
//! Scans bytes into tokens with exact source ranges. The scanner keeps a
//! stack of modes: expression mode, quoted-template mode, heredoc mode and
//! bare-template mode. Entering `${` or `%{` from a template pushes an
//! expression frame whose brace count decides whether a later `}` closes an
//! object or the template sequence.
//!
//! The lexer never fails. Bytes it cannot use become `Invalid` or `BadUTF8`
//! tokens and the parser reports them.

use std::sync::Arc;

use winnow::ascii::digit1;
use winnow::combinator::{alt, opt};
use winnow::prelude::*;
use winnow::token::{one_of, take_till, take_until};

use crate::pos::{Pos, Range};

type PResult<T> = winnow::ModalResult<T>;

const BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    OBrace,
    CBrace,
    OBrack,
    CBrack,
    OParen,
    CParen,
    OQuote,
    CQuote,
    OHeredoc,
    CHeredoc,

    Star,
    Slash,
    Plus,
    Minus,
    Percent,

    Equal,
    EqualOp,
    NotEqual,
    LessThan,
    LessThanEq,
    GreaterThan,
    GreaterThanEq,

    And,
    Or,
    Bang,

    Dot,
    Comma,
    Ellipsis,
    FatArrow,
    Question,
    Colon,

    TemplateInterp,
    TemplateControl,
    TemplateSeqEnd,

    /// Literal text inside a quoted string; escapes are still raw.
    QuotedLit,
    /// Literal text inside a heredoc or bare template.
    StringLit,
    NumberLit,
    Ident,

    Comment,
    Newline,
    /// A newline inside a quoted string, which is not allowed.
    QuotedNewline,
    EOF,

    BadUTF8,
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub bytes: &'a [u8],
    pub range: Range,
}

impl Token<'_> {
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.bytes)
    }
}

/// Where scanning starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Configuration files and standalone expressions.
    Normal,
    /// A bare template with no surrounding quotes.
    Template,
}

#[derive(Debug, Clone)]
enum Mode<'a> {
    Expr { braces: usize, interp: bool },
    Quoted,
    Heredoc { marker: &'a [u8], at_line_start: bool },
    Template,
}

/// Scan `src` into tokens, always ending with an `EOF` token.
pub fn scan_tokens<'a>(src: &'a [u8], filename: &str, start: Pos, mode: ScanMode) -> Vec<Token<'a>> {
    let base = match mode {
        ScanMode::Normal => Mode::Expr {
            braces: 0,
            interp: false,
        },
        ScanMode::Template => Mode::Template,
    };
    let mut scanner = Scanner {
        src,
        filename: Arc::from(filename),
        i: 0,
        pos: start,
        modes: vec![base],
        tokens: Vec::new(),
    };
    scanner.run();
    scanner.tokens
}

struct Scanner<'a> {
    src: &'a [u8],
    filename: Arc<str>,
    i: usize,
    pos: Pos,
    modes: Vec<Mode<'a>>,
    tokens: Vec<Token<'a>>,
}

impl<'a> Scanner<'a> {
    fn run(&mut self) {
        if self.src.starts_with(BOM) {
            // Counts toward byte offsets only.
            self.i = BOM.len();
            self.pos.byte += BOM.len();
        }
        while self.i < self.src.len() {
            match self.modes.last().cloned() {
                Some(Mode::Expr { braces, interp }) => self.scan_expr(braces, interp),
                Some(Mode::Quoted) => self.scan_quoted(),
                Some(Mode::Heredoc {
                    marker,
                    at_line_start,
                }) => self.scan_heredoc(marker, at_line_start),
                Some(Mode::Template) | None => self.scan_template(),
            }
        }
        self.emit(TokenKind::EOF, 0);
    }

    fn rest(&self) -> &'a [u8] {
        &self.src[self.i..]
    }

    fn emit(&mut self, kind: TokenKind, len: usize) {
        let bytes = &self.src[self.i..self.i + len];
        let start = self.pos;
        let end = start.advance(bytes);
        self.tokens.push(Token {
            kind,
            bytes,
            range: Range::new(self.filename.clone(), start, end),
        });
        self.i += len;
        self.pos = end;
    }

    fn skip(&mut self, len: usize) {
        self.pos = self.pos.advance(&self.src[self.i..self.i + len]);
        self.i += len;
    }

    fn push(&mut self, mode: Mode<'a>) {
        self.modes.push(mode);
    }

    /// Pop the current mode, keeping the base mode in place.
    fn pop(&mut self) {
        if self.modes.len() > 1 {
            self.modes.pop();
        }
    }

    fn set_braces(&mut self, n: usize) {
        if let Some(Mode::Expr { braces, .. }) = self.modes.last_mut() {
            *braces = n;
        }
    }

    fn leave_line_start(&mut self) {
        if let Some(Mode::Heredoc { at_line_start, .. }) = self.modes.last_mut() {
            *at_line_start = false;
        }
    }

    fn scan_expr(&mut self, braces: usize, interp: bool) {
        let rest = self.rest();
        let b = rest[0];
        match b {
            b' ' | b'\t' => {
                let n = rest.iter().take_while(|c| matches!(c, b' ' | b'\t')).count();
                self.skip(n);
            }
            b'\n' => self.emit(TokenKind::Newline, 1),
            b'\r' if rest.get(1) == Some(&b'\n') => self.emit(TokenKind::Newline, 2),
            b'#' => self.emit(TokenKind::Comment, lexeme_len(rest, line_comment)),
            b'/' if rest.get(1) == Some(&b'/') => {
                self.emit(TokenKind::Comment, lexeme_len(rest, line_comment))
            }
            b'/' if rest.get(1) == Some(&b'*') => match lexeme_len(rest, block_comment) {
                0 => self.emit(TokenKind::Invalid, rest.len()),
                n => self.emit(TokenKind::Comment, n),
            },
            b'0'..=b'9' => self.emit(TokenKind::NumberLit, lexeme_len(rest, number)),
            b'"' => {
                self.emit(TokenKind::OQuote, 1);
                self.push(Mode::Quoted);
            }
            b'<' if heredoc_marker(rest).is_some() => {
                if let Some((len, marker)) = heredoc_marker(rest) {
                    self.emit(TokenKind::OHeredoc, len);
                    self.push(Mode::Heredoc {
                        marker,
                        at_line_start: true,
                    });
                }
            }
            b'{' => {
                self.emit(TokenKind::OBrace, 1);
                self.set_braces(braces + 1);
            }
            b'}' if braces == 0 && interp => {
                self.emit(TokenKind::TemplateSeqEnd, 1);
                self.pop();
            }
            b'}' => {
                self.emit(TokenKind::CBrace, 1);
                self.set_braces(braces.saturating_sub(1));
            }
            b'~' if braces == 0 && interp && rest.get(1) == Some(&b'}') => {
                self.emit(TokenKind::TemplateSeqEnd, 2);
                self.pop();
            }
            _ if rest.starts_with(BOM) => self.emit(TokenKind::Invalid, BOM.len()),
            _ => {
                let mut input = rest;
                if let Ok(kind) = operator.parse_next(&mut input) {
                    self.emit(kind, rest.len() - input.len());
                    return;
                }
                match leading_char(rest) {
                    None => self.emit(TokenKind::BadUTF8, 1),
                    Some(c) if is_ident_start(c) => self.emit(TokenKind::Ident, ident_len(rest)),
                    Some(c) => self.emit(TokenKind::Invalid, c.len_utf8()),
                }
            }
        }
    }

    fn scan_quoted(&mut self) {
        let rest = self.rest();
        if rest[0] == b'"' {
            self.emit(TokenKind::CQuote, 1);
            self.pop();
        } else if rest.starts_with(b"\n") || rest.starts_with(b"\r\n") {
            let len = if rest[0] == b'\n' { 1 } else { 2 };
            self.emit(TokenKind::QuotedNewline, len);
            self.pop();
        } else if !self.scan_sequence_start(rest, TokenKind::QuotedLit) {
            self.emit(TokenKind::QuotedLit, quoted_literal_len(rest));
        }
    }

    fn scan_heredoc(&mut self, marker: &'a [u8], at_line_start: bool) {
        let rest = self.rest();
        if at_line_start && let Some(len) = heredoc_close_len(rest, marker) {
            self.emit(TokenKind::CHeredoc, len);
            self.pop();
            return;
        }
        if self.scan_sequence_start(rest, TokenKind::StringLit) {
            return;
        }
        let len = template_literal_len(rest);
        let ends_line = rest[..len].ends_with(b"\n");
        self.emit(TokenKind::StringLit, len);
        if let Some(Mode::Heredoc { at_line_start, .. }) = self.modes.last_mut() {
            *at_line_start = ends_line;
        }
    }

    fn scan_template(&mut self) {
        let rest = self.rest();
        if !self.scan_sequence_start(rest, TokenKind::StringLit) {
            self.emit(TokenKind::StringLit, template_literal_len(rest));
        }
    }

    /// Template sequence openers and their `$$`/`%%` escapes, shared by the
    /// template modes. Returns false when `rest` starts with literal text.
    fn scan_sequence_start(&mut self, rest: &[u8], literal: TokenKind) -> bool {
        if rest.starts_with(b"$${") || rest.starts_with(b"%%{") {
            self.leave_line_start();
            self.emit(literal, 2);
            return true;
        }
        let kind = if rest.starts_with(b"${") {
            TokenKind::TemplateInterp
        } else if rest.starts_with(b"%{") {
            TokenKind::TemplateControl
        } else {
            return false;
        };
        let len = if rest.get(2) == Some(&b'~') { 3 } else { 2 };
        self.leave_line_start();
        self.emit(kind, len);
        self.push(Mode::Expr {
            braces: 0,
            interp: true,
        });
        true
    }
}

fn lexeme_len(rest: &[u8], mut parser: impl FnMut(&mut &[u8]) -> PResult<()>) -> usize {
    let mut input = rest;
    match parser(&mut input) {
        Ok(()) => rest.len() - input.len(),
        Err(_) => 0,
    }
}

fn number(input: &mut &[u8]) -> PResult<()> {
    (
        digit1,
        opt((".", digit1)),
        opt((one_of([b'e', b'E']), opt(one_of([b'+', b'-'])), digit1)),
    )
        .void()
        .parse_next(input)
}

/// `#` or `//` through the end of the line, including the newline.
fn line_comment(input: &mut &[u8]) -> PResult<()> {
    (alt(("#", "//")), take_till(0.., b'\n'), opt("\n"))
        .void()
        .parse_next(input)
}

fn block_comment(input: &mut &[u8]) -> PResult<()> {
    ("/*", take_until(0.., "*/"), "*/").void().parse_next(input)
}

fn operator(input: &mut &[u8]) -> PResult<TokenKind> {
    alt((
        alt((
            "...".value(TokenKind::Ellipsis),
            "==".value(TokenKind::EqualOp),
            "!=".value(TokenKind::NotEqual),
            "<=".value(TokenKind::LessThanEq),
            ">=".value(TokenKind::GreaterThanEq),
            "&&".value(TokenKind::And),
            "||".value(TokenKind::Or),
            "=>".value(TokenKind::FatArrow),
        )),
        alt((
            "=".value(TokenKind::Equal),
            "<".value(TokenKind::LessThan),
            ">".value(TokenKind::GreaterThan),
            "!".value(TokenKind::Bang),
            "+".value(TokenKind::Plus),
            "-".value(TokenKind::Minus),
            "*".value(TokenKind::Star),
            "/".value(TokenKind::Slash),
            "%".value(TokenKind::Percent),
            ".".value(TokenKind::Dot),
            ",".value(TokenKind::Comma),
            "?".value(TokenKind::Question),
            ":".value(TokenKind::Colon),
            "(".value(TokenKind::OParen),
            ")".value(TokenKind::CParen),
            "[".value(TokenKind::OBrack),
            "]".value(TokenKind::CBrack),
        )),
    ))
    .parse_next(input)
}

/// `<<MARKER\n` or `<<-MARKER\n`: total length and the marker bytes.
fn heredoc_marker(rest: &[u8]) -> Option<(usize, &[u8])> {
    let mut input = rest;
    let intro: PResult<()> = ("<<", opt("-")).void().parse_next(&mut input);
    intro.ok()?;
    let after_intro = rest.len() - input.len();
    let name_len = match leading_char(input) {
        Some(c) if is_ident_start(c) => ident_len(input),
        _ => return None,
    };
    let marker = &input[..name_len];
    let tail = &input[name_len..];
    let newline = if tail.starts_with(b"\n") {
        1
    } else if tail.starts_with(b"\r\n") {
        2
    } else {
        return None;
    };
    Some((after_intro + name_len + newline, marker))
}

/// Length of a closing heredoc line (indentation plus marker, without the
/// newline) if `rest` starts with one.
fn heredoc_close_len(rest: &[u8], marker: &[u8]) -> Option<usize> {
    let indent = rest.iter().take_while(|c| matches!(c, b' ' | b'\t')).count();
    let after = rest[indent..].strip_prefix(marker)?;
    if after.is_empty() || after.starts_with(b"\n") || after.starts_with(b"\r\n") {
        Some(indent + marker.len())
    } else {
        None
    }
}

fn is_sequence_start(rest: &[u8]) -> bool {
    rest.starts_with(b"${")
        || rest.starts_with(b"%{")
        || rest.starts_with(b"$${")
        || rest.starts_with(b"%%{")
}

/// Literal run inside quotes: up to a quote, newline or template sequence.
/// A backslash keeps the following byte in the run.
fn quoted_literal_len(rest: &[u8]) -> usize {
    let mut j = 0;
    while j < rest.len() {
        let tail = &rest[j..];
        if j > 0 && is_sequence_start(tail) {
            break;
        }
        match tail[0] {
            b'"' | b'\n' => break,
            b'\r' if tail.get(1) == Some(&b'\n') => break,
            b'\\' if tail.len() > 1 && !matches!(tail[1], b'\n' | b'\r') => j += 2,
            _ => j += 1,
        }
    }
    j.max(1)
}

/// Literal run in a heredoc or bare template: through the end of the line
/// or up to a template sequence.
fn template_literal_len(rest: &[u8]) -> usize {
    let mut j = 0;
    while j < rest.len() {
        if j > 0 && is_sequence_start(&rest[j..]) {
            break;
        }
        j += 1;
        if rest[j - 1] == b'\n' {
            break;
        }
    }
    j.max(1)
}

fn leading_char(bytes: &[u8]) -> Option<char> {
    bytes.utf8_chunks().next()?.valid().chars().next()
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

pub(crate) fn is_ident_continue(c: char) -> bool {
    c == '_' || c == '-' || c.is_alphanumeric() || is_combining_mark(c)
}

fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036F}' | '\u{1AB0}'..='\u{1AFF}' | '\u{20D0}'..='\u{20FF}')
}

fn ident_len(rest: &[u8]) -> usize {
    let valid = match rest.utf8_chunks().next() {
        Some(chunk) => chunk.valid(),
        None => return 0,
    };
    let mut chars = valid.char_indices();
    let mut end = match chars.next() {
        Some((_, c)) => c.len_utf8(),
        None => return 0,
    };
    for (idx, c) in chars {
        if !is_ident_continue(c) {
            break;
        }
        end = idx + c.len_utf8();
    }
    end
}

/// True when `s` is a valid identifier.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if is_ident_start(c)) && chars.all(is_ident_continue)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        scan_tokens(src.as_bytes(), "t.hcl", Pos::START, ScanMode::Normal)
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    use TokenKind::*;

    #[test]
    fn attribute_line() {
        assert_eq!(kinds("a = 1.5e3\n"), vec![Ident, Equal, NumberLit, Newline, EOF]);
    }

    #[test]
    fn operators_prefer_longest() {
        assert_eq!(
            kinds("a >= b ... => != &&"),
            vec![Ident, GreaterThanEq, Ident, Ellipsis, FatArrow, NotEqual, And, EOF]
        );
    }

    #[test]
    fn hyphenated_identifiers() {
        let toks = scan_tokens(b"foo-bar -baz", "t", Pos::START, ScanMode::Normal);
        assert_eq!(toks[0].bytes, b"foo-bar");
        assert_eq!(toks[1].kind, Minus);
        assert_eq!(toks[2].bytes, b"baz");
    }

    #[test]
    fn quoted_template_with_interp() {
        assert_eq!(
            kinds(r#""a ${b} c""#),
            vec![OQuote, QuotedLit, TemplateInterp, Ident, TemplateSeqEnd, QuotedLit, CQuote, EOF]
        );
    }

    #[test]
    fn braces_inside_interp() {
        assert_eq!(
            kinds(r#""${ {a=1}.a }""#),
            vec![
                OQuote,
                TemplateInterp,
                OBrace,
                Ident,
                Equal,
                NumberLit,
                CBrace,
                Dot,
                Ident,
                TemplateSeqEnd,
                CQuote,
                EOF
            ]
        );
    }

    #[test]
    fn strip_markers_stay_in_token_bytes() {
        let toks = scan_tokens(br#""${~ a ~}""#, "t", Pos::START, ScanMode::Normal);
        assert_eq!(toks[1].bytes, b"${~");
        assert_eq!(toks[3].bytes, b"~}");
    }

    #[test]
    fn escaped_sequences_split_literals() {
        let toks = scan_tokens(br#""$${x}""#, "t", Pos::START, ScanMode::Normal);
        let lits: Vec<&[u8]> = toks
            .iter()
            .filter(|t| t.kind == QuotedLit)
            .map(|t| t.bytes)
            .collect();
        assert_eq!(lits, vec![&b"$$"[..], &b"{x}"[..]]);
    }

    #[test]
    fn backslash_escapes_are_raw() {
        let toks = scan_tokens(br#""a\"b""#, "t", Pos::START, ScanMode::Normal);
        assert_eq!(toks[1].kind, QuotedLit);
        assert_eq!(toks[1].bytes, br#"a\"b"#);
        assert_eq!(toks[2].kind, CQuote);
    }

    #[test]
    fn heredoc_lines() {
        let src = "x = <<EOT\nhello\n  ${a}\nEOT\n";
        assert_eq!(
            kinds(src),
            vec![
                Ident,
                Equal,
                OHeredoc,
                StringLit,
                StringLit,
                TemplateInterp,
                Ident,
                TemplateSeqEnd,
                StringLit,
                CHeredoc,
                Newline,
                EOF
            ]
        );
    }

    #[test]
    fn indented_heredoc_close() {
        let toks = scan_tokens(b"<<-EOT\n  a\n  EOT\n", "t", Pos::START, ScanMode::Normal);
        let close = toks.iter().find(|t| t.kind == CHeredoc).unwrap();
        assert_eq!(close.bytes, b"  EOT");
    }

    #[test]
    fn comments_include_newline() {
        let toks = scan_tokens(b"# hi\na // x\n/* y */", "t", Pos::START, ScanMode::Normal);
        assert_eq!(toks[0].kind, Comment);
        assert_eq!(toks[0].bytes, b"# hi\n");
        assert_eq!(toks[2].bytes, b"// x\n");
        assert_eq!(toks[3].bytes, b"/* y */");
    }

    #[test]
    fn leading_bom_is_skipped() {
        let toks = scan_tokens(b"\xEF\xBB\xBFa", "t", Pos::START, ScanMode::Normal);
        assert_eq!(toks[0].kind, Ident);
        assert_eq!(toks[0].range.start.byte, 3);
        let toks = scan_tokens(b"a \xEF\xBB\xBF", "t", Pos::START, ScanMode::Normal);
        assert_eq!(toks[1].kind, Invalid);
    }

    #[test]
    fn invalid_bytes() {
        assert_eq!(kinds("a;"), vec![Ident, Invalid, EOF]);
        let toks = scan_tokens(b"\xff", "t", Pos::START, ScanMode::Normal);
        assert_eq!(toks[0].kind, BadUTF8);
    }

    #[test]
    fn newline_ends_quoted_string() {
        assert_eq!(kinds("\"abc\nd"), vec![OQuote, QuotedLit, QuotedNewline, Ident, EOF]);
    }

    #[test]
    fn bare_template_mode() {
        let toks = scan_tokens(b"hi ${x}!", "t", Pos::START, ScanMode::Template);
        let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![StringLit, TemplateInterp, Ident, TemplateSeqEnd, StringLit, EOF]
        );
    }

    #[test]
    fn token_bytes_match_ranges() {
        let src = b"a = \"x${y}\" # c\nb = [1, 2]\n";
        for tok in scan_tokens(src, "t", Pos::START, ScanMode::Normal) {
            assert_eq!(tok.range.slice_of(src), Some(tok.bytes));
        }
    }
}
