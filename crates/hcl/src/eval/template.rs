//! Template evaluation: interpolation, `%{if}` and `%{for}`

use crate::ast::Expression;
use crate::diagnostic::Diagnostics;
use crate::value::{Type, Value, convert};

use super::{EvalContext, error, eval};

/// Concatenate every part as a string.
pub(super) fn eval_template(
    expr: &Expression,
    parts: &[Expression],
    ctx: Option<&EvalContext>,
) -> (Value, Diagnostics) {
    let mut diags = Diagnostics::new();
    let mut out = String::new();
    let mut unknown = false;
    for part in parts {
        let (val, more) = eval(part, ctx);
        diags.append(more);
        match interpolation_string(expr, part, &val, ctx, &mut diags) {
            Some(Some(s)) => out.push_str(&s),
            Some(None) => unknown = true,
            None => {}
        }
    }
    if unknown || diags.has_errors() {
        return (Value::unknown(Type::String), diags);
    }
    (Value::String(out), diags)
}

/// Concatenate the strings produced by a template `for`.
pub(super) fn eval_join(
    expr: &Expression,
    inner: &Expression,
    ctx: Option<&EvalContext>,
) -> (Value, Diagnostics) {
    let (val, mut diags) = eval(inner, ctx);
    if !val.is_known() || diags.has_errors() {
        return (Value::unknown(Type::String), diags);
    }
    let Some(elems) = val.as_sequence() else {
        diags.push(error(
            expr,
            ctx,
            "Invalid template interpolation value",
            format!("Cannot join a value of type {}.", val.ty()),
            inner.range.clone(),
        ));
        return (Value::unknown(Type::String), diags);
    };

    let mut out = String::new();
    let mut unknown = false;
    for elem in elems {
        match interpolation_string(expr, inner, elem, ctx, &mut diags) {
            Some(Some(s)) => out.push_str(&s),
            Some(None) => unknown = true,
            None => {}
        }
    }
    if unknown || diags.has_errors() {
        return (Value::unknown(Type::String), diags);
    }
    (Value::String(out), diags)
}

pub(super) fn eval_if(
    expr: &Expression,
    cond: &Expression,
    true_part: &Expression,
    false_part: Option<&Expression>,
    ctx: Option<&EvalContext>,
) -> (Value, Diagnostics) {
    let (cv, mut diags) = eval(cond, ctx);
    if diags.has_errors() {
        return (Value::unknown(Type::String), diags);
    }
    if cv.is_null() {
        diags.push(error(
            expr,
            ctx,
            "Invalid 'if' directive",
            "The condition value is null. Conditions must either be true or false.",
            cond.range.clone(),
        ));
        return (Value::unknown(Type::String), diags);
    }
    let selected = match convert(&cv, &Type::Bool) {
        Ok(Value::Bool(true)) => Some(true_part),
        Ok(Value::Bool(false)) => false_part,
        Ok(_) => return (Value::unknown(Type::String), diags),
        Err(e) => {
            diags.push(error(
                expr,
                ctx,
                "Invalid 'if' directive",
                format!("The condition value is invalid: {e}."),
                cond.range.clone(),
            ));
            return (Value::unknown(Type::String), diags);
        }
    };
    let Some(selected) = selected else {
        return (Value::string(""), diags);
    };

    let (val, more) = eval(selected, ctx);
    diags.append(more);
    match interpolation_string(expr, selected, &val, ctx, &mut diags) {
        Some(Some(s)) => (Value::String(s), diags),
        _ => (Value::unknown(Type::String), diags),
    }
}

/// Evaluate `body` once per element of `coll`, producing a tuple of strings.
pub(super) fn eval_for(
    expr: &Expression,
    key_var: Option<&str>,
    val_var: &str,
    coll: &Expression,
    body: &Expression,
    ctx: Option<&EvalContext>,
) -> (Value, Diagnostics) {
    let (cv, mut diags) = eval(coll, ctx);
    if diags.has_errors() {
        return (Value::dynamic(), diags);
    }
    if cv.is_null() {
        diags.push(error(
            expr,
            ctx,
            "Iteration over null value",
            "A null value cannot be used as the collection in a 'for' directive.",
            coll.range.clone(),
        ));
        return (Value::dynamic(), diags);
    }
    if !cv.is_known() {
        return (Value::dynamic(), diags);
    }
    if !cv.can_iterate() {
        diags.push(error(
            expr,
            ctx,
            "Iteration over non-iterable value",
            format!(
                "A value of type {} cannot be used as the collection in a 'for' directive.",
                cv.ty()
            ),
            coll.range.clone(),
        ));
        return (Value::dynamic(), diags);
    }

    let parent = ctx.cloned().unwrap_or_default();
    let mut out = Vec::new();
    for (key, val) in cv.elements() {
        let mut child = parent.new_child().with_variable(val_var, val);
        if let Some(key_var) = key_var {
            child = child.with_variable(key_var, key);
        }
        let (v, more) = eval(body, Some(&child));
        diags.append(more);
        out.push(v);
    }
    (Value::tuple(out), diags)
}

/// The string form of one interpolated value; `Some(None)` when unknown,
/// `None` after reporting an error.
fn interpolation_string(
    expr: &Expression,
    part: &Expression,
    val: &Value,
    ctx: Option<&EvalContext>,
    diags: &mut Diagnostics,
) -> Option<Option<String>> {
    if val.is_null() {
        diags.push(error(
            expr,
            ctx,
            "Invalid template interpolation value",
            "The expression result is null. Cannot include a null value in a string template.",
            part.range.clone(),
        ));
        return None;
    }
    match convert(val, &Type::String) {
        Ok(Value::String(s)) => Some(Some(s)),
        Ok(_) => Some(None),
        Err(e) => {
            diags.push(error(
                expr,
                ctx,
                "Invalid template interpolation value",
                format!("Cannot include the given value in a string template: {e}."),
                part.range.clone(),
            ));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_expression, parse_template};
    use crate::pos::Pos;

    fn ctx() -> EvalContext {
        EvalContext::new()
            .with_variable("name", Value::from("world"))
            .with_variable("n", Value::from(3))
            .with_variable(
                "list",
                Value::list(vec![Value::from("a"), Value::from("b")]).unwrap(),
            )
            .with_variable("flag", Value::unknown(Type::Bool))
            .with_variable("nothing", Value::null(Type::String))
    }

    fn render(src: &str) -> (Value, Diagnostics) {
        let (expr, diags) = parse_expression(src.as_bytes(), "t", Pos::START);
        assert!(diags.is_empty(), "{diags}");
        expr.value(Some(&ctx()))
    }

    fn ok(src: &str) -> Value {
        let (val, diags) = render(src);
        assert!(diags.is_empty(), "{src}: {diags}");
        val
    }

    #[test]
    fn interpolation() {
        assert_eq!(ok("\"hello ${name}!\""), Value::from("hello world!"));
        assert_eq!(ok("\"${n} items\""), Value::from("3 items"));
        // A lone interpolation keeps its type.
        assert_eq!(ok("\"${n}\""), Value::from(3));
    }

    #[test]
    fn directives() {
        assert_eq!(ok("\"%{ if n > 2 }many%{ else }few%{ endif }\""), Value::from("many"));
        assert_eq!(ok("\"x%{ if false }y%{ endif }\""), Value::from("x"));
        assert_eq!(
            ok("\"%{ for i, v in list }${i}=${v};%{ endfor }\""),
            Value::from("0=a;1=b;")
        );
    }

    #[test]
    fn strip_markers_apply_before_evaluation() {
        let src = "%{ for v in list ~}\n  ${v}\n%{~ endfor }";
        let (expr, diags) = parse_template(src.as_bytes(), "t", Pos::START);
        assert!(diags.is_empty(), "{diags}");
        assert_eq!(expr.value(Some(&ctx())).0, Value::from("ab"));
    }

    #[test]
    fn unknowns_make_the_string_unknown() {
        assert_eq!(ok("\"${flag} x\""), Value::unknown(Type::String));
        assert_eq!(
            ok("\"%{ if flag }a%{ endif }\""),
            Value::unknown(Type::String)
        );
    }

    #[test]
    fn null_interpolation_is_an_error() {
        let (val, diags) = render("\"a${nothing}\"");
        assert_eq!(val, Value::unknown(Type::String));
        assert_eq!(diags[0].summary, "Invalid template interpolation value");
        assert!(diags[0].detail.contains("null"));

        let (_, diags) = render("\"${list} x\"");
        assert_eq!(diags[0].summary, "Invalid template interpolation value");
    }

    #[test]
    fn null_for_element_is_an_error() {
        let ctx = ctx().with_variable(
            "holes",
            Value::tuple(vec![Value::from("a"), Value::null(Type::String)]),
        );
        let (expr, diags) =
            parse_expression(b"\"%{ for v in holes }${v}%{ endfor }\"", "t", Pos::START);
        assert!(diags.is_empty(), "{diags}");
        let (val, diags) = expr.value(Some(&ctx));
        assert_eq!(val, Value::unknown(Type::String));
        assert_eq!(diags.len(), 1, "{diags}");
        assert_eq!(diags[0].summary, "Invalid template interpolation value");
        assert!(diags[0].detail.contains("null"));
    }

    #[test]
    fn bare_templates() {
        let (expr, diags) = parse_template(b"Hi ${name}", "t", Pos::START);
        assert!(diags.is_empty());
        assert_eq!(expr.value(Some(&ctx())).0, Value::from("Hi world"));
    }
}
