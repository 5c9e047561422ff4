//! Backslash escapes in quoted template literals

use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::pos::Range;

/// Interpret the escapes in the raw bytes of a quoted literal.
///
/// An invalid escape is reported and kept verbatim in the output.
pub(crate) fn unescape(bytes: &[u8], range: &Range) -> (String, Diagnostics) {
    let mut diags = Diagnostics::new();
    if !bytes.contains(&b'\\') {
        return (String::from_utf8_lossy(bytes).into_owned(), diags);
    }

    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let rest = &bytes[i + 1..];
        let (replacement, consumed) = match rest.first() {
            Some(b'n') => (Some('\n'), 1),
            Some(b'r') => (Some('\r'), 1),
            Some(b't') => (Some('\t'), 1),
            Some(b'"') => (Some('"'), 1),
            Some(b'\\') => (Some('\\'), 1),
            Some(b'u') => (hex_scalar(&rest[1..], 4), 5),
            Some(b'U') => (hex_scalar(&rest[1..], 8), 9),
            _ => (None, 1),
        };
        let consumed = consumed.min(rest.len());
        match replacement {
            Some(c) => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            None => {
                let seq = &bytes[i..i + 1 + consumed];
                diags.push(invalid_escape(seq, bytes, i, range));
                out.extend_from_slice(seq);
            }
        }
        i += 1 + consumed;
    }
    (String::from_utf8_lossy(&out).into_owned(), diags)
}

/// Parse exactly `len` hex digits as a Unicode scalar value.
fn hex_scalar(bytes: &[u8], len: usize) -> Option<char> {
    let digits = bytes.get(..len)?;
    if !digits.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let text = std::str::from_utf8(digits).ok()?;
    u32::from_str_radix(text, 16).ok().and_then(char::from_u32)
}

fn invalid_escape(seq: &[u8], bytes: &[u8], offset: usize, range: &Range) -> Diagnostic {
    let start = range.start.advance(&bytes[..offset]);
    let end = start.advance(seq);
    let subject = Range::new(range.filename.clone(), start, end);
    let detail = match seq.get(1) {
        Some(b'u') | Some(b'U') => {
            "The \\u and \\U escapes require exactly four or eight hexadecimal digits \
             forming a valid Unicode character."
                .to_string()
        }
        Some(_) => format!(
            "The symbol \"{}\" is not a valid escape sequence selector.",
            String::from_utf8_lossy(&seq[1..])
        ),
        None => "A backslash must be followed by an escape sequence selector.".to_string(),
    };
    Diagnostic::error("Invalid escape sequence", detail).with_subject(subject)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pos::Pos;

    fn range() -> Range {
        Range::new("t".into(), Pos::START, Pos::START)
    }

    #[test]
    fn simple_escapes() {
        let (s, diags) = unescape(br#"a\nb\t\"c\\"#, &range());
        assert!(diags.is_empty());
        assert_eq!(s, "a\nb\t\"c\\");
    }

    #[test]
    fn unicode_escapes() {
        let (s, diags) = unescape(r"\u00e9\U0001F600".as_bytes(), &range());
        assert!(diags.is_empty());
        assert_eq!(s, "é😀");
    }

    #[test]
    fn invalid_escape_is_kept() {
        let (s, diags) = unescape(br"a\qb", &range());
        assert_eq!(s, r"a\qb");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, "Invalid escape sequence");
        let subject = diags[0].subject.as_ref().unwrap();
        assert_eq!(subject.start.byte, 1);
        assert_eq!(subject.end.byte, 3);
    }

    #[test]
    fn short_unicode_escape_is_invalid() {
        let (s, diags) = unescape(br"\u12", &range());
        assert_eq!(s, r"\u12");
        assert!(diags.has_errors());

        let (_, diags) = unescape(br"\UFFFFFFFF", &range());
        assert!(diags.has_errors());
    }

    #[test]
    fn no_backslash_is_identity() {
        let (s, diags) = unescape("plain ${ text".as_bytes(), &range());
        assert!(diags.is_empty());
        assert_eq!(s, "plain ${ text");
    }
}
