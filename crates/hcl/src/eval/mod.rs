//! Expression evaluator
//!
//! Evaluates AST expressions against an optional [`EvalContext`]. Every
//! evaluation returns a value together with its diagnostics. On an error
//! the value is an unknown of the most specific type that could still be
//! determined, so dependent expressions keep producing useful results.

mod call;
mod collections;
mod ops;
mod template;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::ast::{ExprKind, Expression};
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::function::Function;
use crate::pos::Range;
use crate::value::Value;

/// Variables and functions visible to an expression.
///
/// Contexts form an immutable parent chain: lookups walk from the child
/// towards the root, and [`EvalContext::new_child`] creates a new empty
/// frame without touching the receiver.
#[derive(Clone, Default)]
pub struct EvalContext(Arc<Scope>);

#[derive(Clone, Default)]
struct Scope {
    variables: Option<HashMap<String, Value>>,
    functions: Option<HashMap<String, Function>>,
    parent: Option<EvalContext>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        Arc::make_mut(&mut self.0)
            .variables
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value);
        self
    }

    pub fn with_variables<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let scope = Arc::make_mut(&mut self.0);
        let map = scope.variables.get_or_insert_with(HashMap::new);
        map.extend(vars.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    pub fn with_function(mut self, name: impl Into<String>, function: Function) -> Self {
        Arc::make_mut(&mut self.0)
            .functions
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), function);
        self
    }

    pub fn with_functions<I, S>(mut self, functions: I) -> Self
    where
        I: IntoIterator<Item = (S, Function)>,
        S: Into<String>,
    {
        let scope = Arc::make_mut(&mut self.0);
        let map = scope.functions.get_or_insert_with(HashMap::new);
        map.extend(functions.into_iter().map(|(k, f)| (k.into(), f)));
        self
    }

    /// Add the functions of [`crate::stdlib`].
    pub fn with_stdlib(self) -> Self {
        self.with_functions(crate::stdlib::functions())
    }

    /// An empty context whose parent is `self`.
    pub fn new_child(&self) -> EvalContext {
        EvalContext(Arc::new(Scope {
            parent: Some(self.clone()),
            ..Scope::default()
        }))
    }

    pub fn parent(&self) -> Option<&EvalContext> {
        self.0.parent.as_ref()
    }

    fn scopes(&self) -> impl Iterator<Item = &Scope> {
        std::iter::successors(Some(self), |ctx| ctx.parent()).map(|ctx| ctx.0.as_ref())
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.scopes()
            .find_map(|scope| scope.variables.as_ref()?.get(name))
    }

    /// Every variable name visible from this context, sorted.
    pub fn variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .scopes()
            .filter_map(|scope| scope.variables.as_ref())
            .flat_map(|vars| vars.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// False when no frame in the chain defines a variable table, meaning
    /// variables are not allowed at all.
    pub fn has_variables(&self) -> bool {
        self.scopes().any(|scope| scope.variables.is_some())
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.scopes()
            .find_map(|scope| scope.functions.as_ref()?.get(name))
    }

    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .scopes()
            .filter_map(|scope| scope.functions.as_ref())
            .flat_map(|funcs| funcs.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn has_functions(&self) -> bool {
        self.scopes().any(|scope| scope.functions.is_some())
    }
}

impl fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalContext")
            .field("variables", &self.variable_names())
            .field("functions", &self.function_names())
            .finish()
    }
}

impl Expression {
    /// Evaluate this expression. See [`eval`].
    pub fn value(&self, ctx: Option<&EvalContext>) -> (Value, Diagnostics) {
        eval(self, ctx)
    }
}

/// Evaluate `expr` in `ctx`. Diagnostics carry the expression and context
/// that produced them.
pub fn eval(expr: &Expression, ctx: Option<&EvalContext>) -> (Value, Diagnostics) {
    match &expr.kind {
        ExprKind::Literal(v) => (v.clone(), Diagnostics::new()),
        ExprKind::ScopeTraversal(traversal) => {
            let (val, diags) = traversal.traverse_abs(ctx);
            (val, diags.for_expression(expr, ctx))
        }
        ExprKind::RelativeTraversal { source, traversal } => {
            let (src, mut diags) = eval(source, ctx);
            let (val, more) = traversal.traverse_rel(&src);
            diags.append(more.for_expression(expr, ctx));
            (val, diags)
        }
        ExprKind::TemplateWrap(inner) | ExprKind::Paren(inner) => eval(inner, ctx),
        ExprKind::Template(parts) => template::eval_template(expr, parts, ctx),
        ExprKind::TemplateJoin(inner) => template::eval_join(expr, inner, ctx),
        ExprKind::TemplateIf {
            cond,
            true_part,
            false_part,
        } => template::eval_if(expr, cond, true_part, false_part.as_deref(), ctx),
        ExprKind::TemplateFor {
            key_var,
            val_var,
            coll,
            body,
        } => template::eval_for(expr, key_var.as_deref(), val_var, coll, body, ctx),
        ExprKind::BinaryOp { op, lhs, rhs, .. } => ops::eval_binary(expr, *op, lhs, rhs, ctx),
        ExprKind::UnaryOp { op, operand, .. } => ops::eval_unary(expr, *op, operand, ctx),
        ExprKind::Conditional {
            cond,
            true_result,
            false_result,
        } => ops::eval_conditional(expr, cond, true_result, false_result, ctx),
        ExprKind::FunctionCall(call) => call::eval_call(expr, call, ctx),
        ExprKind::For(for_expr) => collections::eval_for(expr, for_expr, ctx),
        ExprKind::SplatAttr {
            source,
            each,
            marker_range,
        }
        | ExprKind::SplatFull {
            source,
            each,
            marker_range,
        } => collections::eval_splat(expr, source, each, marker_range, ctx),
        ExprKind::Index {
            collection,
            key,
            bracket_range,
        } => collections::eval_index(expr, collection, key, bracket_range, ctx),
        ExprKind::ObjectCons(items) => collections::eval_object(expr, items, ctx),
        ExprKind::TupleCons(items) => collections::eval_tuple(items, ctx),
    }
}

/// An error diagnostic about `expr`, evaluated in `ctx`.
pub(crate) fn error(
    expr: &Expression,
    ctx: Option<&EvalContext>,
    summary: &str,
    detail: impl Into<String>,
    subject: Range,
) -> Diagnostic {
    Diagnostic::error(summary, detail)
        .with_subject(subject)
        .with_context(expr.range.clone())
        .with_expression(expr)
        .with_eval_context(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;
    use crate::pos::Pos;

    fn eval_str(src: &str, ctx: Option<&EvalContext>) -> (Value, Diagnostics) {
        let (expr, diags) = parse_expression(src.as_bytes(), "test.hcl", Pos::START);
        assert!(diags.is_empty(), "parse errors in {src}: {diags}");
        expr.value(ctx)
    }

    #[test]
    fn child_contexts_shadow_parents() {
        let parent = EvalContext::new()
            .with_variable("a", Value::from(1))
            .with_variable("b", Value::from(2));
        let child = parent.new_child().with_variable("a", Value::from(10));
        assert_eq!(child.variable("a"), Some(&Value::from(10)));
        assert_eq!(child.variable("b"), Some(&Value::from(2)));
        assert_eq!(parent.variable("a"), Some(&Value::from(1)));
        assert_eq!(child.variable_names(), ["a", "b"]);
    }

    #[test]
    fn variables_not_allowed_without_table() {
        let (val, diags) = eval_str("a", Some(&EvalContext::new()));
        assert_eq!(val, Value::dynamic());
        assert_eq!(diags[0].summary, "Variables not allowed");

        let (_, diags) = eval_str("a", None);
        assert_eq!(diags[0].summary, "Variables not allowed");
    }

    #[test]
    fn missing_variable_suggests_name() {
        let ctx = EvalContext::new().with_variable("name", Value::from("x"));
        let (_, diags) = eval_str("nmae", Some(&ctx));
        assert_eq!(diags[0].summary, "Variable not found");
        assert!(diags[0].detail.contains("Did you mean \"name\"?"));
        assert!(diags[0].expression.is_some());
        assert!(diags[0].eval_context.is_some());
    }

    #[test]
    fn relative_traversal_after_call() {
        let ctx = EvalContext::new().with_variable(
            "obj",
            Value::object([("items", Value::tuple(vec![Value::from("a"), Value::from("b")]))]),
        );
        let (val, diags) = eval_str("(obj).items[1]", Some(&ctx));
        assert!(diags.is_empty(), "{diags}");
        assert_eq!(val, Value::from("b"));
    }
}
