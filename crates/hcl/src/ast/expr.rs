//! Expression nodes

use crate::pos::Range;
use crate::traversal::Traversal;
use crate::value::Value;

use super::{BinaryOperator, UnaryOperator};

/// An expression with the source range it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Value),
    /// Absolute traversal rooted in a variable.
    ScopeTraversal(Traversal),
    RelativeTraversal {
        source: Box<Expression>,
        traversal: Traversal,
    },
    /// A template that is exactly one interpolation; keeps the inner type.
    TemplateWrap(Box<Expression>),
    Template(Vec<Expression>),
    /// Concatenation of a tuple of strings produced by a template `for`.
    TemplateJoin(Box<Expression>),
    TemplateIf {
        cond: Box<Expression>,
        true_part: Box<Expression>,
        false_part: Option<Box<Expression>>,
    },
    /// Evaluates `body` once per element, yielding a tuple of strings.
    TemplateFor {
        key_var: Option<String>,
        val_var: String,
        coll: Box<Expression>,
        body: Box<Expression>,
    },
    BinaryOp {
        op: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
        op_range: Range,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
        op_range: Range,
    },
    Conditional {
        cond: Box<Expression>,
        true_result: Box<Expression>,
        false_result: Box<Expression>,
    },
    FunctionCall(FunctionCall),
    For(Box<ForExpr>),
    /// `source.*.each`
    SplatAttr {
        source: Box<Expression>,
        each: Traversal,
        marker_range: Range,
    },
    /// `source[*].each`
    SplatFull {
        source: Box<Expression>,
        each: Traversal,
        marker_range: Range,
    },
    /// Index with a key that is not a literal, so it cannot be a traversal step.
    Index {
        collection: Box<Expression>,
        key: Box<Expression>,
        bracket_range: Range,
    },
    ObjectCons(Vec<ObjectItem>),
    TupleCons(Vec<Expression>),
    Paren(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub name_range: Range,
    pub args: Vec<Expression>,
    /// The final argument was followed by `...`.
    pub expand_final: bool,
    pub open_paren_range: Range,
    pub close_paren_range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForExpr {
    pub key_var: Option<String>,
    pub val_var: String,
    pub coll: Expression,
    /// Present only in the object-producing form.
    pub key_expr: Option<Expression>,
    pub val_expr: Expression,
    pub cond: Option<Expression>,
    pub group: bool,
    pub open_range: Range,
    pub close_range: Range,
}

impl ForExpr {
    pub fn is_object(&self) -> bool {
        self.key_expr.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectItem {
    pub key: Expression,
    /// The key was parenthesized, so a bare identifier is a reference.
    pub force_non_literal: bool,
    pub value: Expression,
}

impl Expression {
    pub fn new(kind: ExprKind, range: Range) -> Self {
        Self { kind, range }
    }

    pub fn literal(value: Value, range: Range) -> Self {
        Self::new(ExprKind::Literal(value), range)
    }

    pub fn start_range(&self) -> Range {
        self.range.start_range()
    }

    /// Range to report for this node as an operand: the operator for
    /// unary and binary operations, the whole node otherwise.
    pub fn subject_range(&self) -> Range {
        match &self.kind {
            ExprKind::BinaryOp { op_range, .. } | ExprKind::UnaryOp { op_range, .. } => {
                op_range.clone()
            }
            _ => self.range.clone(),
        }
    }

    /// Direct child expressions, in source order.
    pub fn children(&self) -> Vec<&Expression> {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::ScopeTraversal(_) => Vec::new(),
            ExprKind::RelativeTraversal { source, .. }
            | ExprKind::SplatAttr { source, .. }
            | ExprKind::SplatFull { source, .. } => vec![source.as_ref()],
            ExprKind::TemplateWrap(inner)
            | ExprKind::TemplateJoin(inner)
            | ExprKind::Paren(inner) => vec![inner.as_ref()],
            ExprKind::Template(parts) | ExprKind::TupleCons(parts) => parts.iter().collect(),
            ExprKind::TemplateIf {
                cond,
                true_part,
                false_part,
            } => {
                let mut out = vec![cond.as_ref(), true_part.as_ref()];
                out.extend(false_part.as_deref());
                out
            }
            ExprKind::TemplateFor { coll, body, .. } => vec![coll.as_ref(), body.as_ref()],
            ExprKind::BinaryOp { lhs, rhs, .. } => vec![lhs.as_ref(), rhs.as_ref()],
            ExprKind::UnaryOp { operand, .. } => vec![operand.as_ref()],
            ExprKind::Conditional {
                cond,
                true_result,
                false_result,
            } => vec![cond.as_ref(), true_result.as_ref(), false_result.as_ref()],
            ExprKind::FunctionCall(call) => call.args.iter().collect(),
            ExprKind::For(f) => {
                let mut out = vec![&f.coll];
                out.extend(f.key_expr.as_ref());
                out.push(&f.val_expr);
                out.extend(f.cond.as_ref());
                out
            }
            ExprKind::Index {
                collection, key, ..
            } => vec![collection.as_ref(), key.as_ref()],
            ExprKind::ObjectCons(items) => items
                .iter()
                .flat_map(|item| [&item.key, &item.value])
                .collect(),
        }
    }

    /// The literal value, for literal expressions.
    pub fn as_literal(&self) -> Option<&Value> {
        match &self.kind {
            ExprKind::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// The string of a template made of literal text only.
    pub fn as_static_string(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Literal(Value::String(s)) => Some(s.clone()),
            ExprKind::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    out.push_str(part.as_literal()?.as_str()?);
                }
                Some(out)
            }
            _ => None,
        }
    }
}
