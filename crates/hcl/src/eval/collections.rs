//! Collection constructors, `for` expressions, splats and dynamic indexing

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::ast::{ExprKind, Expression, ForExpr, ObjectItem};
use crate::diagnostic::Diagnostics;
use crate::pos::Range;
use crate::traversal::{self, Traversal, Traverser};
use crate::value::{Type, Value, convert};

use super::{EvalContext, error, eval};

pub(super) fn eval_tuple(items: &[Expression], ctx: Option<&EvalContext>) -> (Value, Diagnostics) {
    let mut diags = Diagnostics::new();
    let mut elems = Vec::with_capacity(items.len());
    for item in items {
        let (val, more) = eval(item, ctx);
        diags.append(more);
        elems.push(val);
    }
    (Value::tuple(elems), diags)
}

pub(super) fn eval_object(
    expr: &Expression,
    items: &[ObjectItem],
    ctx: Option<&EvalContext>,
) -> (Value, Diagnostics) {
    let mut diags = Diagnostics::new();
    let mut attrs: BTreeMap<String, Value> = BTreeMap::new();
    let mut first_seen: BTreeMap<String, Range> = BTreeMap::new();
    let mut unknown_key = false;
    let mut failed = false;

    for item in items {
        let (val, more) = eval(&item.value, ctx);
        diags.append(more);

        let key = match object_key(expr, item, ctx, &mut diags) {
            ObjectKey::Name(name) => name,
            ObjectKey::Unknown => {
                unknown_key = true;
                continue;
            }
            ObjectKey::Failed => {
                failed = true;
                continue;
            }
        };
        if let Some(first) = first_seen.get(&key) {
            diags.push(error(
                expr,
                ctx,
                "Duplicate object attribute",
                format!("An attribute named {key:?} was already defined at {first}."),
                item.key.range.clone(),
            ));
            failed = true;
            continue;
        }
        first_seen.insert(key.clone(), item.key.range.clone());
        attrs.insert(key, val);
    }

    if unknown_key || failed {
        return (Value::dynamic(), diags);
    }
    (Value::Object(attrs), diags)
}

enum ObjectKey {
    Name(String),
    Unknown,
    Failed,
}

fn object_key(
    expr: &Expression,
    item: &ObjectItem,
    ctx: Option<&EvalContext>,
    diags: &mut Diagnostics,
) -> ObjectKey {
    // A bare identifier is taken literally unless parenthesized.
    if let ExprKind::ScopeTraversal(t) = &item.key.kind
        && !item.force_non_literal
    {
        if let [Traverser::Root { name, .. }] = t.steps() {
            return ObjectKey::Name(name.clone());
        }
        diags.push(error(
            expr,
            ctx,
            "Ambiguous attribute key",
            "If this expression is intended to be a reference, wrap it in parentheses. If it's \
             instead intended as a literal name containing periods, wrap it in quotes to create \
             a string literal.",
            item.key.range.clone(),
        ));
        return ObjectKey::Failed;
    }

    let (key, more) = eval(&item.key, ctx);
    let had_errors = more.has_errors();
    diags.append(more);
    if had_errors {
        return ObjectKey::Failed;
    }
    if key.is_null() {
        diags.push(error(
            expr,
            ctx,
            "Null value as key",
            "Can't use a null value as a key.",
            item.key.range.clone(),
        ));
        return ObjectKey::Failed;
    }
    match convert(&key, &Type::String) {
        Ok(Value::String(s)) => ObjectKey::Name(s),
        Ok(_) => ObjectKey::Unknown,
        Err(e) => {
            diags.push(error(
                expr,
                ctx,
                "Incorrect key type",
                format!("Can't use this value as a key: {e}."),
                item.key.range.clone(),
            ));
            ObjectKey::Failed
        }
    }
}

/// Evaluate a `for` expression, producing a tuple or an object.
pub(super) fn eval_for(
    expr: &Expression,
    for_expr: &ForExpr,
    ctx: Option<&EvalContext>,
) -> (Value, Diagnostics) {
    let (coll, mut diags) = eval(&for_expr.coll, ctx);
    if diags.has_errors() {
        return (Value::dynamic(), diags);
    }
    if coll.is_null() {
        diags.push(error(
            expr,
            ctx,
            "Iteration over null value",
            "A null value cannot be used as the collection in a 'for' expression.",
            for_expr.coll.range.clone(),
        ));
        return (Value::dynamic(), diags);
    }
    if !coll.is_known() {
        return (Value::dynamic(), diags);
    }
    if !coll.can_iterate() {
        diags.push(error(
            expr,
            ctx,
            "Iteration over non-iterable value",
            format!(
                "A value of type {} cannot be used as the collection in a 'for' expression.",
                coll.ty()
            ),
            for_expr.coll.range.clone(),
        ));
        return (Value::dynamic(), diags);
    }

    let parent = ctx.cloned().unwrap_or_default();
    let mut outcome = ForOutcome::default();
    for (key, val) in coll.elements() {
        let mut child = parent.new_child().with_variable(for_expr.val_var.clone(), val);
        if let Some(key_var) = &for_expr.key_var {
            child = child.with_variable(key_var.clone(), key);
        }
        let child = Some(&child);

        match for_condition(expr, for_expr, child, &mut diags) {
            Some(true) => {}
            Some(false) => continue,
            None => {
                outcome.unknown = true;
                continue;
            }
        }

        if let Some(key_expr) = &for_expr.key_expr {
            let (k, more) = eval(key_expr, child);
            diags.append(more);
            let (v, more) = eval(&for_expr.val_expr, child);
            diags.append(more);
            outcome.add_entry(expr, for_expr, key_expr, k, v, child, &mut diags);
        } else {
            let (v, more) = eval(&for_expr.val_expr, child);
            diags.append(more);
            outcome.elems.push(v);
        }
    }

    if outcome.unknown || diags.has_errors() {
        return (Value::dynamic(), diags);
    }
    if for_expr.is_object() {
        let attrs = outcome.entries.into_iter().map(|(k, entry)| match entry {
            Entry::Single(v) => (k, v),
            Entry::Group(vs) => (k, Value::tuple(vs)),
        });
        return (Value::object(attrs), diags);
    }
    (Value::tuple(outcome.elems), diags)
}

#[derive(Default)]
struct ForOutcome {
    elems: Vec<Value>,
    entries: IndexMap<String, Entry>,
    unknown: bool,
}

enum Entry {
    Single(Value),
    Group(Vec<Value>),
}

impl ForOutcome {
    #[allow(clippy::too_many_arguments)]
    fn add_entry(
        &mut self,
        expr: &Expression,
        for_expr: &ForExpr,
        key_expr: &Expression,
        key: Value,
        val: Value,
        ctx: Option<&EvalContext>,
        diags: &mut Diagnostics,
    ) {
        if key.is_null() {
            diags.push(error(
                expr,
                ctx,
                "Invalid object key",
                "Key expression in 'for' expression must not produce a null value.",
                key_expr.range.clone(),
            ));
            return;
        }
        let key = match convert(&key, &Type::String) {
            Ok(Value::String(s)) => s,
            Ok(_) => {
                self.unknown = true;
                return;
            }
            Err(e) => {
                diags.push(error(
                    expr,
                    ctx,
                    "Invalid object key",
                    format!("The key expression produced an invalid result: {e}."),
                    key_expr.range.clone(),
                ));
                return;
            }
        };

        if for_expr.group {
            match self.entries.entry(key).or_insert_with(|| Entry::Group(Vec::new())) {
                Entry::Group(vs) => vs.push(val),
                Entry::Single(_) => {}
            }
            return;
        }
        if self.entries.contains_key(&key) {
            diags.push(error(
                expr,
                ctx,
                "Duplicate object key",
                format!(
                    "Two different items produced the key {key:?} in this 'for' expression. If \
                     duplicates are expected, use the ellipsis (...) after the value expression \
                     to enable grouping by key."
                ),
                key_expr.range.clone(),
            ));
            return;
        }
        self.entries.insert(key, Entry::Single(val));
    }
}

/// The filter condition for one element; `None` when it is not yet known.
fn for_condition(
    expr: &Expression,
    for_expr: &ForExpr,
    ctx: Option<&EvalContext>,
    diags: &mut Diagnostics,
) -> Option<bool> {
    let Some(cond) = &for_expr.cond else {
        return Some(true);
    };
    let (val, more) = eval(cond, ctx);
    let had_errors = more.has_errors();
    diags.append(more);
    if had_errors {
        return Some(false);
    }
    if val.is_null() {
        diags.push(error(
            expr,
            ctx,
            "Condition is null",
            "The value of the 'if' clause must not be null.",
            cond.range.clone(),
        ));
        return Some(false);
    }
    match convert(&val, &Type::Bool) {
        Ok(v) => v.as_bool(),
        Err(e) => {
            diags.push(error(
                expr,
                ctx,
                "Invalid 'for' condition",
                format!("The 'if' clause value is invalid: {e}."),
                cond.range.clone(),
            ));
            Some(false)
        }
    }
}

/// Apply `each` to every element of the source sequence. A non-sequence
/// source is treated as a one-element tuple. A null source is an error.
pub(super) fn eval_splat(
    expr: &Expression,
    source: &Expression,
    each: &Traversal,
    marker_range: &Range,
    ctx: Option<&EvalContext>,
) -> (Value, Diagnostics) {
    let (src, mut diags) = eval(source, ctx);
    if diags.has_errors() {
        return (Value::dynamic(), diags);
    }
    if src.is_null() {
        diags.push(error(
            expr,
            ctx,
            traversal::NULL_SPLAT_SUMMARY,
            traversal::NULL_SPLAT_DETAIL,
            source.range.clone(),
        ));
        return (Value::dynamic(), diags);
    }
    if !src.is_known() {
        return (traversal::unknown_splat(&src.ty()), diags);
    }

    let (elems, as_list) = match &src {
        Value::List(_, elems) | Value::Set(_, elems) => (elems.clone(), true),
        Value::Tuple(elems) => (elems.clone(), false),
        other => (vec![other.clone()], false),
    };
    let mut out = Vec::with_capacity(elems.len());
    let mut failed = false;
    for elem in &elems {
        let (val, more) = each.traverse_rel(elem);
        failed |= more.has_errors();
        diags.append(more.in_context(marker_range).for_expression(expr, ctx));
        out.push(val);
    }
    if failed {
        return (Value::dynamic(), diags);
    }
    (traversal::sequence_result(out, as_list), diags)
}

pub(super) fn eval_index(
    expr: &Expression,
    collection: &Expression,
    key: &Expression,
    bracket_range: &Range,
    ctx: Option<&EvalContext>,
) -> (Value, Diagnostics) {
    let (coll, mut diags) = eval(collection, ctx);
    let (key, more) = eval(key, ctx);
    diags.append(more);
    if diags.has_errors() {
        return (Value::dynamic(), diags);
    }
    match traversal::index(&coll, &key, bracket_range) {
        Ok(val) => (val, diags),
        Err(diag) => {
            diags.push(
                diag.with_context(expr.range.clone())
                    .with_expression(expr)
                    .with_eval_context(ctx),
            );
            (Value::dynamic(), diags)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;
    use crate::pos::Pos;

    fn eval_in(src: &str, ctx: &EvalContext) -> (Value, Diagnostics) {
        let (expr, diags) = parse_expression(src.as_bytes(), "t", Pos::START);
        assert!(diags.is_empty(), "{diags}");
        expr.value(Some(ctx))
    }

    fn ctx() -> EvalContext {
        EvalContext::new()
            .with_variable(
                "items",
                Value::list(vec![Value::from("a"), Value::from("bb"), Value::from("a")]).unwrap(),
            )
            .with_variable(
                "users",
                Value::list(vec![
                    Value::object([("name", Value::from("ann")), ("age", Value::from(30))]),
                    Value::object([("name", Value::from("bob")), ("age", Value::from(25))]),
                ])
                .unwrap(),
            )
            .with_variable("k", Value::from("key"))
            .with_variable("idx", Value::from(1))
            .with_variable("unknown_list", Value::unknown(Type::list(Type::String)))
            .with_variable(
                "unknown_pair",
                Value::unknown(Type::tuple(vec![Type::String, Type::Number])),
            )
            .with_variable("nothing", Value::null(Type::Dynamic))
    }

    fn ok(src: &str) -> Value {
        let (val, diags) = eval_in(src, &ctx());
        assert!(diags.is_empty(), "{src}: {diags}");
        val
    }

    // ============ Constructors ============

    #[test]
    fn object_keys_literal_or_reference() {
        assert_eq!(ok("{k = 1}"), Value::object([("k", Value::from(1))]));
        assert_eq!(ok("{(k) = 1}"), Value::object([("key", Value::from(1))]));
        assert_eq!(ok("{\"a\" = 1, b: 2}"), Value::object([
            ("a", Value::from(1)),
            ("b", Value::from(2)),
        ]));
        assert_eq!(ok("{1 = true}"), Value::object([("1", Value::from(true))]));
    }

    #[test]
    fn object_key_errors() {
        let (val, diags) = eval_in("{a = 1, a = 2}", &ctx());
        assert_eq!(val, Value::dynamic());
        assert_eq!(diags[0].summary, "Duplicate object attribute");

        let (_, diags) = eval_in("{(null) = 1}", &ctx());
        assert_eq!(diags[0].summary, "Null value as key");

        let (_, diags) = eval_in("{([]) = 1}", &ctx());
        assert_eq!(diags[0].summary, "Incorrect key type");

        let (_, diags) = eval_in("{a.b = 1}", &ctx());
        assert_eq!(diags[0].summary, "Ambiguous attribute key");
    }

    #[test]
    fn tuples_keep_element_types() {
        assert_eq!(
            ok("[1, \"a\", true]"),
            Value::tuple(vec![Value::from(1), Value::from("a"), Value::from(true)])
        );
    }

    // ============ For ============

    #[test]
    fn for_tuple_with_condition() {
        assert_eq!(
            ok("[for i, v in items : v if i > 0]"),
            Value::tuple(vec![Value::from("bb"), Value::from("a")])
        );
    }

    #[test]
    fn for_object_grouping() {
        let val = ok("{for v in items : v => v...}");
        assert_eq!(
            val,
            Value::object([
                ("a", Value::tuple(vec![Value::from("a"), Value::from("a")])),
                ("bb", Value::tuple(vec![Value::from("bb")])),
            ])
        );
    }

    #[test]
    fn for_object_over_objects() {
        let val = ok("{for u in users : u.name => u.age}");
        assert_eq!(
            val,
            Value::object([("ann", Value::from(30)), ("bob", Value::from(25))])
        );
    }

    #[test]
    fn for_errors() {
        let (_, diags) = eval_in("{for v in items : v => 1}", &ctx());
        assert_eq!(diags[0].summary, "Duplicate object key");

        let (_, diags) = eval_in("[for v in null : v]", &ctx());
        assert_eq!(diags[0].summary, "Iteration over null value");

        let (_, diags) = eval_in("[for v in 1 : v]", &ctx());
        assert_eq!(diags[0].summary, "Iteration over non-iterable value");

        let (_, diags) = eval_in("[for v in items : v if null]", &ctx());
        assert_eq!(diags[0].summary, "Condition is null");

        let (_, diags) = eval_in("[for v in items : v if v]", &ctx());
        assert_eq!(diags[0].summary, "Invalid 'for' condition");

        let (_, diags) = eval_in("{for v in items : null => v}", &ctx());
        assert_eq!(diags[0].summary, "Invalid object key");
    }

    #[test]
    fn for_over_unknown_is_unknown() {
        assert_eq!(ok("[for v in unknown_list : v]"), Value::dynamic());
    }

    #[test]
    fn for_variables_do_not_leak() {
        let (_, diags) = eval_in("[[for v in items : v], v]", &ctx());
        assert_eq!(diags[0].summary, "Variable not found");
    }

    // ============ Splat and index ============

    #[test]
    fn splat_over_list_of_objects() {
        let names = Value::list(vec![Value::from("ann"), Value::from("bob")]).unwrap();
        assert_eq!(ok("users.*.name"), names);
        assert_eq!(ok("users[*].name"), names);
    }

    #[test]
    fn splat_special_sources() {
        assert_eq!(ok("k[*]"), Value::tuple(vec![Value::from("key")]));
        assert_eq!(ok("unknown_list[*]"), Value::unknown(Type::list(Type::Dynamic)));
        assert_eq!(
            ok("unknown_pair[*].a"),
            Value::unknown(Type::tuple(vec![Type::Dynamic, Type::Dynamic]))
        );
    }

    #[test]
    fn splat_of_null_is_an_error() {
        for src in ["null[*]", "nothing[*].a", "nothing.*.a"] {
            let (val, diags) = eval_in(src, &ctx());
            assert_eq!(val, Value::dynamic(), "{src}");
            assert_eq!(diags.len(), 1, "{src}: {diags}");
            assert_eq!(diags[0].summary, "Splat of null value");
            assert!(diags[0].detail.contains("null sequences"));
            let subject = diags[0].subject.as_ref().unwrap();
            assert_eq!(subject.start.byte, 0);
            assert!(subject.end.byte <= src.find(['[', '.']).unwrap());
        }
    }

    #[test]
    fn splat_errors_keep_marker_context() {
        let (val, diags) = eval_in("users.*.missing", &ctx());
        assert_eq!(val, Value::dynamic());
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].summary, "Unsupported attribute");
        assert!(diags[0].context.is_some());
    }

    #[test]
    fn dynamic_index() {
        assert_eq!(ok("items[idx]"), Value::from("bb"));
        let (val, diags) = eval_in("items[idx + 5]", &ctx());
        assert_eq!(val, Value::dynamic());
        assert_eq!(diags[0].summary, "Invalid index");
        assert!(diags[0].expression.is_some());
    }
}
