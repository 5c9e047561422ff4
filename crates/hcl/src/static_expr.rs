//! Static analysis of expressions
//!
//! Helpers that interpret an expression's syntax without evaluating it:
//! reading a list or map literally, extracting traversals, and finding the
//! variables and functions an expression refers to.

use std::collections::HashSet;

use crate::ast::{ExprKind, Expression, FunctionCall};
use crate::diagnostic::Diagnostic;
use crate::traversal::{Traversal, Traverser};

/// A key/value pair from a static map expression.
#[derive(Debug, Clone, Copy)]
pub struct KeyValuePair<'a> {
    pub key: &'a Expression,
    pub value: &'a Expression,
}

fn invalid(expr: &Expression, detail: &str) -> Diagnostic {
    Diagnostic::error("Invalid expression", detail).with_subject(expr.range.clone())
}

/// The element expressions of a tuple constructor.
pub fn expr_list(expr: &Expression) -> Result<Vec<&Expression>, Diagnostic> {
    match &expr.kind {
        ExprKind::TupleCons(items) => Ok(items.iter().collect()),
        ExprKind::Paren(inner) => expr_list(inner),
        _ => Err(invalid(expr, "A static list expression is required.")),
    }
}

/// The key/value expressions of an object constructor, in source order.
pub fn expr_map(expr: &Expression) -> Result<Vec<KeyValuePair<'_>>, Diagnostic> {
    match &expr.kind {
        ExprKind::ObjectCons(items) => Ok(items
            .iter()
            .map(|item| KeyValuePair {
                key: &item.key,
                value: &item.value,
            })
            .collect()),
        ExprKind::Paren(inner) => expr_map(inner),
        _ => Err(invalid(expr, "A static map expression is required.")),
    }
}

/// The traversal of an expression that is nothing but a variable
/// reference with attribute and constant index steps.
pub fn abs_traversal_for_expr(expr: &Expression) -> Result<Traversal, Diagnostic> {
    match &expr.kind {
        ExprKind::ScopeTraversal(t) => Ok(t.clone()),
        ExprKind::Paren(inner) => abs_traversal_for_expr(inner),
        _ => Err(invalid(
            expr,
            "A single static variable reference is required: only attribute access and \
             indexing with constant keys. No calculations, function calls, template \
             expressions, etc are allowed here.",
        )),
    }
}

/// Like [`abs_traversal_for_expr`], with the root read as an attribute of
/// some other value.
pub fn rel_traversal_for_expr(expr: &Expression) -> Result<Traversal, Diagnostic> {
    let mut traversal = abs_traversal_for_expr(expr).map_err(|_| {
        invalid(
            expr,
            "A single static attribute reference is required: only attribute access and \
             indexing with constant keys. No calculations, function calls, template \
             expressions, etc are allowed here.",
        )
    })?;
    if let Some(Traverser::Root { name, range }) = traversal.0.first().cloned() {
        traversal.0[0] = Traverser::Attr { name, range };
    }
    Ok(traversal)
}

/// The bare identifier an expression consists of, if that is all it is.
pub fn expr_as_keyword(expr: &Expression) -> Option<&str> {
    match &expr.kind {
        ExprKind::ScopeTraversal(t) if t.len() == 1 => t.root_name(),
        _ => None,
    }
}

impl Expression {
    /// Absolute traversals this expression reads from its context, in
    /// source order. Names bound by enclosing `for` expressions and
    /// directives are excluded.
    pub fn variables(&self) -> Vec<Traversal> {
        let mut out = Vec::new();
        let mut bound = Vec::new();
        collect_variables(self, &mut bound, &mut out);
        out
    }

    /// Every function call in this expression, outermost first.
    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        let mut out = Vec::new();
        collect_calls(self, &mut out);
        out
    }

    /// Names of the functions this expression calls, without repeats.
    pub fn function_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.function_calls()
            .into_iter()
            .filter(|c| seen.insert(c.name.as_str()))
            .map(|c| c.name.clone())
            .collect()
    }
}

fn collect_variables(expr: &Expression, bound: &mut Vec<String>, out: &mut Vec<Traversal>) {
    match &expr.kind {
        ExprKind::ScopeTraversal(t) => {
            if t.root_name().is_some_and(|name| !bound.iter().any(|b| b == name)) {
                out.push(t.clone());
            }
        }
        ExprKind::For(f) => {
            collect_variables(&f.coll, bound, out);
            let depth = bound.len();
            bound.extend(f.key_var.iter().cloned());
            bound.push(f.val_var.clone());
            if let Some(key) = &f.key_expr {
                collect_variables(key, bound, out);
            }
            collect_variables(&f.val_expr, bound, out);
            if let Some(cond) = &f.cond {
                collect_variables(cond, bound, out);
            }
            bound.truncate(depth);
        }
        ExprKind::TemplateFor {
            key_var,
            val_var,
            coll,
            body,
        } => {
            collect_variables(coll, bound, out);
            let depth = bound.len();
            bound.extend(key_var.iter().cloned());
            bound.push(val_var.clone());
            collect_variables(body, bound, out);
            bound.truncate(depth);
        }
        _ => {
            for child in expr.children() {
                collect_variables(child, bound, out);
            }
        }
    }
}

fn collect_calls<'a>(expr: &'a Expression, out: &mut Vec<&'a FunctionCall>) {
    if let ExprKind::FunctionCall(call) = &expr.kind {
        out.push(call);
    }
    for child in expr.children() {
        collect_calls(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;
    use crate::pos::Pos;

    fn parse(src: &str) -> Expression {
        let (expr, diags) = parse_expression(src.as_bytes(), "t", Pos::START);
        assert!(diags.is_empty(), "{diags}");
        expr
    }

    fn names(traversals: &[Traversal]) -> Vec<String> {
        traversals.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn static_list_and_map() {
        let expr = parse("[a.b, c]");
        let items = expr_list(&expr).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(abs_traversal_for_expr(items[0]).unwrap().to_string(), "a.b");

        let expr = parse("{x = 1, \"y\" = 2}");
        let pairs = expr_map(&expr).unwrap();
        assert_eq!(expr_as_keyword(pairs[0].key), Some("x"));
        assert_eq!(pairs[1].key.as_static_string().as_deref(), Some("y"));

        assert!(expr_list(&parse("a")).is_err());
        assert!(expr_map(&parse("[1]")).is_err());
    }

    #[test]
    fn traversals_from_references_only() {
        let t = abs_traversal_for_expr(&parse("res.web[0].id")).unwrap();
        assert_eq!(t.root_name(), Some("res"));
        assert_eq!(t.len(), 4);

        let err = abs_traversal_for_expr(&parse("a + 1")).unwrap_err();
        assert_eq!(err.summary, "Invalid expression");

        let rel = rel_traversal_for_expr(&parse("foo.bar")).unwrap();
        assert!(rel.is_relative());
        assert_eq!(rel.to_string(), ".foo.bar");
    }

    #[test]
    fn variables_exclude_for_bindings() {
        let expr = parse("[for k, v in var.items : \"${k}=${v.name}${sep}\" if v != local.skip]");
        assert_eq!(names(&expr.variables()), ["var.items", "sep", "local.skip"]);
    }

    #[test]
    fn variables_inside_template_for() {
        let expr = parse("\"%{ for x in xs }${x}${y}%{ endfor }\"");
        assert_eq!(names(&expr.variables()), ["xs", "y"]);
    }

    #[test]
    fn function_calls_are_found() {
        let expr = parse("upper(lower(a)) == upper(b)");
        let calls: Vec<&str> = expr.function_calls().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(calls, ["upper", "lower", "upper"]);
        assert_eq!(expr.function_names(), ["upper", "lower"]);
    }
}
