//! Display implementations for types, values, traversals and operators

use std::fmt;

use crate::ast::{BinaryOperator, UnaryOperator};
use crate::lexer::TokenKind;
use crate::traversal::{Traversal, Traverser};
use crate::value::{Type, Value};

/// Friendly type names, as used in messages.
impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => f.write_str("bool"),
            Type::Number => f.write_str("number"),
            Type::String => f.write_str("string"),
            Type::List(elem) => write!(f, "list of {elem}"),
            Type::Set(elem) => write!(f, "set of {elem}"),
            Type::Map(elem) => write!(f, "map of {elem}"),
            Type::Object(_) => f.write_str("object"),
            Type::Tuple(_) => f.write_str("tuple"),
            Type::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// Values in literal syntax. Unknowns have no literal form and are shown
/// as `(unknown <type>)`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null(_) => f.write_str("null"),
            Value::Unknown(ty) => write!(f, "(unknown {ty})"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write_quoted(f, s),
            Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => {
                f.write_str("[")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{elem}")?;
                }
                f.write_str("]")
            }
            Value::Map(_, entries) | Value::Object(entries) => {
                if entries.is_empty() {
                    return f.write_str("{}");
                }
                f.write_str("{ ")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if is_identifier(k) {
                        write!(f, "{k} = {v}")?;
                    } else {
                        write_quoted(f, k)?;
                        write!(f, " = {v}")?;
                    }
                }
                f.write_str(" }")
            }
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            // Template sequences would be interpreted when read back.
            '$' | '%' if chars.peek() == Some(&'{') => write!(f, "{c}{c}")?,
            c if c.is_control() => write!(f, "\\u{:04X}", c as u32)?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

impl fmt::Display for Traverser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Traverser::Root { name, .. } => f.write_str(name),
            Traverser::Attr { name, .. } => write!(f, ".{name}"),
            Traverser::Index { key, .. } => write!(f, "[{key}]"),
            Traverser::Splat { each, .. } => write!(f, "[*]{each}"),
        }
    }
}

impl fmt::Display for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.steps().iter().try_for_each(|step| write!(f, "{step}"))
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOperator::Or => "||",
            BinaryOperator::And => "&&",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
        })
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOperator::Negate => "-",
            UnaryOperator::Not => "!",
        })
    }
}

/// Token kinds as a reader would name them in an error message.
impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TokenKind::OBrace => "opening brace",
            TokenKind::CBrace => "closing brace",
            TokenKind::OBrack => "opening bracket",
            TokenKind::CBrack => "closing bracket",
            TokenKind::OParen => "opening parenthesis",
            TokenKind::CParen => "closing parenthesis",
            TokenKind::OQuote => "opening quote",
            TokenKind::CQuote => "closing quote",
            TokenKind::OHeredoc => "heredoc marker",
            TokenKind::CHeredoc => "heredoc end marker",
            TokenKind::Star => "star",
            TokenKind::Slash => "slash",
            TokenKind::Plus => "plus sign",
            TokenKind::Minus => "minus sign",
            TokenKind::Percent => "percent sign",
            TokenKind::Equal => "equals sign",
            TokenKind::EqualOp => "equality operator",
            TokenKind::NotEqual => "inequality operator",
            TokenKind::LessThan => "less-than operator",
            TokenKind::LessThanEq => "less-than-or-equal operator",
            TokenKind::GreaterThan => "greater-than operator",
            TokenKind::GreaterThanEq => "greater-than-or-equal operator",
            TokenKind::And => "logical AND operator",
            TokenKind::Or => "logical OR operator",
            TokenKind::Bang => "logical NOT operator",
            TokenKind::Dot => "dot",
            TokenKind::Comma => "comma",
            TokenKind::Ellipsis => "ellipsis",
            TokenKind::FatArrow => "fat arrow",
            TokenKind::Question => "question mark",
            TokenKind::Colon => "colon",
            TokenKind::TemplateInterp => "template interpolation",
            TokenKind::TemplateControl => "template directive",
            TokenKind::TemplateSeqEnd => "end of template sequence",
            TokenKind::QuotedLit | TokenKind::StringLit => "literal text",
            TokenKind::NumberLit => "number literal",
            TokenKind::Ident => "identifier",
            TokenKind::Comment => "comment",
            TokenKind::Newline | TokenKind::QuotedNewline => "newline",
            TokenKind::EOF => "end of file",
            TokenKind::BadUTF8 => "invalid UTF-8 sequence",
            TokenKind::Invalid => "invalid character",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_traversal_abs;
    use crate::pos::Pos;

    #[test]
    fn type_names() {
        assert_eq!(Type::list(Type::map(Type::String)).to_string(), "list of map of string");
        assert_eq!(Type::empty_object().to_string(), "object");
    }

    #[test]
    fn values_as_literals() {
        let val = Value::object([
            ("name", Value::from("a \"b\" ${c}")),
            ("two words", Value::tuple(vec![Value::from(1), Value::null(Type::Bool)])),
        ]);
        assert_eq!(
            val.to_string(),
            r#"{ name = "a \"b\" $${c}", "two words" = [1, null] }"#
        );
        assert_eq!(Value::unknown(Type::Number).to_string(), "(unknown number)");
    }

    #[test]
    fn traversals() {
        let (t, diags) = parse_traversal_abs(b"a.b[0][\"k\"]", "t", Pos::START);
        assert!(diags.is_empty(), "{diags}");
        assert_eq!(t.to_string(), "a.b[0][\"k\"]");
    }

    #[test]
    fn operators_and_tokens() {
        assert_eq!(BinaryOperator::LessThanOrEqual.to_string(), "<=");
        assert_eq!(UnaryOperator::Not.to_string(), "!");
        assert_eq!(TokenKind::CBrace.to_string(), "closing brace");
    }
}
