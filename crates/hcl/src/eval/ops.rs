//! Operators and conditionals

use crate::ast::{BinaryOperator, Expression, UnaryOperator};
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::pos::Range;
use crate::value::{Number, Type, Value, convert, unify};

use super::{EvalContext, error, eval};

/// A bool operand that may not be known yet.
type Truth = Option<bool>;

pub(super) fn eval_binary(
    expr: &Expression,
    op: BinaryOperator,
    lhs: &Expression,
    rhs: &Expression,
    ctx: Option<&EvalContext>,
) -> (Value, Diagnostics) {
    if op.is_logical() {
        return eval_logical(expr, op, lhs, rhs, ctx);
    }

    let (lv, mut diags) = eval(lhs, ctx);
    let (rv, more) = eval(rhs, ctx);
    diags.append(more);

    match op {
        BinaryOperator::Equal => return (lv.equals(&rv), diags),
        BinaryOperator::NotEqual => return (not(&lv.equals(&rv)), diags),
        _ => {}
    }

    let result_ty = if op.is_arithmetic() {
        Type::Number
    } else {
        Type::Bool
    };
    let left = number_operand(expr, ctx, &lv, &lhs.range, "left");
    let right = number_operand(expr, ctx, &rv, &rhs.range, "right");
    let (left, right) = match (left, right) {
        (Ok(l), Ok(r)) => (l, r),
        (l, r) => {
            diags.extend(l.err());
            diags.extend(r.err());
            return (Value::unknown(result_ty), diags);
        }
    };
    let (Some(a), Some(b)) = (left, right) else {
        return (Value::unknown(result_ty), diags);
    };

    let result = match op {
        BinaryOperator::Add => Value::Number(a.add(&b)),
        BinaryOperator::Subtract => Value::Number(a.sub(&b)),
        BinaryOperator::Multiply => Value::Number(a.mul(&b)),
        BinaryOperator::Divide | BinaryOperator::Modulo => {
            let quotient = if op == BinaryOperator::Divide {
                a.checked_div(&b)
            } else {
                a.checked_rem(&b)
            };
            match quotient {
                Some(n) => Value::Number(n),
                None => {
                    diags.push(error(
                        expr,
                        ctx,
                        "Operation failed",
                        "Error during operation: can't divide by zero.",
                        expr.range.clone(),
                    ));
                    Value::unknown(Type::Number)
                }
            }
        }
        BinaryOperator::LessThan => Value::Bool(a < b),
        BinaryOperator::LessThanOrEqual => Value::Bool(a <= b),
        BinaryOperator::GreaterThan => Value::Bool(a > b),
        BinaryOperator::GreaterThanOrEqual => Value::Bool(a >= b),
        BinaryOperator::Equal
        | BinaryOperator::NotEqual
        | BinaryOperator::And
        | BinaryOperator::Or => Value::unknown(result_ty),
    };
    (result, diags)
}

/// `&&` and `||` with short-circuiting and three-valued logic.
fn eval_logical(
    expr: &Expression,
    op: BinaryOperator,
    lhs: &Expression,
    rhs: &Expression,
    ctx: Option<&EvalContext>,
) -> (Value, Diagnostics) {
    let (lv, mut diags) = eval(lhs, ctx);
    let left = match bool_operand(expr, ctx, &lv, &lhs.range, "left") {
        Ok(t) => t,
        Err(diag) => {
            diags.push(diag);
            return (Value::unknown(Type::Bool), diags);
        }
    };
    let decisive = op == BinaryOperator::Or;
    if left == Some(decisive) {
        return (Value::Bool(decisive), diags);
    }

    let (rv, more) = eval(rhs, ctx);
    diags.append(more);
    let right = match bool_operand(expr, ctx, &rv, &rhs.range, "right") {
        Ok(t) => t,
        Err(diag) => {
            diags.push(diag);
            return (Value::unknown(Type::Bool), diags);
        }
    };

    let result = match (left, right) {
        (_, Some(b)) if b == decisive => Value::Bool(decisive),
        (Some(_), Some(_)) => Value::Bool(!decisive),
        _ => Value::unknown(Type::Bool),
    };
    (result, diags)
}

pub(super) fn eval_unary(
    expr: &Expression,
    op: UnaryOperator,
    operand: &Expression,
    ctx: Option<&EvalContext>,
) -> (Value, Diagnostics) {
    let (val, mut diags) = eval(operand, ctx);
    match op {
        UnaryOperator::Negate => match number_operand(expr, ctx, &val, &operand.range, "") {
            Ok(Some(n)) => (Value::Number(n.neg()), diags),
            Ok(None) => (Value::unknown(Type::Number), diags),
            Err(diag) => {
                diags.push(diag);
                (Value::unknown(Type::Number), diags)
            }
        },
        UnaryOperator::Not => match bool_operand(expr, ctx, &val, &operand.range, "") {
            Ok(Some(b)) => (Value::Bool(!b), diags),
            Ok(None) => (Value::unknown(Type::Bool), diags),
            Err(diag) => {
                diags.push(diag);
                (Value::unknown(Type::Bool), diags)
            }
        },
    }
}

pub(super) fn eval_conditional(
    expr: &Expression,
    cond: &Expression,
    true_result: &Expression,
    false_result: &Expression,
    ctx: Option<&EvalContext>,
) -> (Value, Diagnostics) {
    let (cv, mut diags) = eval(cond, ctx);
    let (tv, true_diags) = eval(true_result, ctx);
    let (fv, false_diags) = eval(false_result, ctx);

    let (tt, ft) = (tv.ty(), fv.ty());
    let result_ty = match (&tv, &fv) {
        (Value::Null(Type::Dynamic), _) => Some(ft.clone()),
        (_, Value::Null(Type::Dynamic)) => Some(tt.clone()),
        _ => unify(&[tt.clone(), ft.clone()]),
    };
    let Some(result_ty) = result_ty else {
        diags.append(true_diags);
        diags.append(false_diags);
        diags.push(error(
            expr,
            ctx,
            "Inconsistent conditional result types",
            format!(
                "The true and false result expressions must have consistent types. The given \
                 expressions are {tt} and {ft}, respectively."
            ),
            Range::between(&true_result.range, &false_result.range),
        ));
        return (Value::dynamic(), diags);
    };

    if cv.is_null() {
        diags.push(error(
            expr,
            ctx,
            "Null condition",
            "The condition value is null. Conditions must either be true or false.",
            cond.range.clone(),
        ));
        return (Value::unknown(result_ty), diags);
    }
    let cv = match convert(&cv, &Type::Bool) {
        Ok(v) => v,
        Err(e) => {
            diags.push(error(
                expr,
                ctx,
                "Incorrect condition type",
                format!("The condition expression must be of type bool: {e}."),
                cond.range.clone(),
            ));
            return (Value::unknown(result_ty), diags);
        }
    };

    let (selected, selected_diags, range) = match cv.as_bool() {
        Some(true) => (tv, true_diags, &true_result.range),
        Some(false) => (fv, false_diags, &false_result.range),
        None => {
            diags.append(true_diags);
            diags.append(false_diags);
            return (Value::unknown(result_ty), diags);
        }
    };
    diags.append(selected_diags);
    match convert(&selected, &result_ty) {
        Ok(v) => (v, diags),
        Err(e) => {
            diags.push(error(
                expr,
                ctx,
                "Inconsistent conditional result types",
                format!("The selected result value has the wrong type: {e}."),
                range.clone(),
            ));
            (Value::unknown(result_ty), diags)
        }
    }
}

fn not(val: &Value) -> Value {
    match val {
        Value::Bool(b) => Value::Bool(!b),
        other => other.clone(),
    }
}

fn operand_label(side: &str) -> String {
    if side.is_empty() {
        "Unsuitable value for unary operand".to_string()
    } else {
        format!("Unsuitable value for {side} operand")
    }
}

/// The operand as a number, `None` when not yet known.
fn number_operand(
    expr: &Expression,
    ctx: Option<&EvalContext>,
    val: &Value,
    range: &Range,
    side: &str,
) -> Result<Option<Number>, Diagnostic> {
    let label = operand_label(side);
    if val.is_null() {
        return Err(error(
            expr,
            ctx,
            "Invalid operand",
            format!("{label}: argument must not be null."),
            range.clone(),
        ));
    }
    match convert(val, &Type::Number) {
        Ok(Value::Number(n)) => Ok(Some(n)),
        Ok(_) => Ok(None),
        Err(e) => Err(error(
            expr,
            ctx,
            "Invalid operand",
            format!("{label}: {e}."),
            range.clone(),
        )),
    }
}

fn bool_operand(
    expr: &Expression,
    ctx: Option<&EvalContext>,
    val: &Value,
    range: &Range,
    side: &str,
) -> Result<Truth, Diagnostic> {
    let label = operand_label(side);
    if val.is_null() {
        return Err(error(
            expr,
            ctx,
            "Invalid operand",
            format!("{label}: argument must not be null."),
            range.clone(),
        ));
    }
    match convert(val, &Type::Bool) {
        Ok(Value::Bool(b)) => Ok(Some(b)),
        Ok(_) => Ok(None),
        Err(e) => Err(error(
            expr,
            ctx,
            "Invalid operand",
            format!("{label}: {e}."),
            range.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;
    use crate::pos::Pos;

    fn eval_with(src: &str, ctx: &EvalContext) -> (Value, Diagnostics) {
        let (expr, diags) = parse_expression(src.as_bytes(), "t", Pos::START);
        assert!(diags.is_empty(), "{diags}");
        expr.value(Some(ctx))
    }

    fn eval_ok(src: &str) -> Value {
        let (val, diags) = eval_with(src, &EvalContext::new());
        assert!(diags.is_empty(), "{src}: {diags}");
        val
    }

    fn unknowns() -> EvalContext {
        EvalContext::new()
            .with_variable("unum", Value::unknown(Type::Number))
            .with_variable("ubool", Value::unknown(Type::Bool))
            .with_variable("dyn", Value::dynamic())
    }

    // ============ Arithmetic ============

    #[test]
    fn arithmetic() {
        assert_eq!(eval_ok("1 + 2 * 3"), Value::from(7));
        assert_eq!(eval_ok("7 % 4"), Value::from(3));
        assert_eq!(eval_ok("\"2\" * 4"), Value::from(8));
        assert_eq!(eval_ok("1 / 4 * 4"), Value::from(1));
        assert_eq!(eval_ok("-(2 - 5)"), Value::from(3));
    }

    #[test]
    fn arithmetic_errors() {
        let (val, diags) = eval_with("1 / 0", &EvalContext::new());
        assert_eq!(val, Value::unknown(Type::Number));
        assert_eq!(diags[0].summary, "Operation failed");
        assert!(diags[0].detail.contains("divide by zero"));

        let (_, diags) = eval_with("1 + \"a\"", &EvalContext::new());
        assert_eq!(diags[0].summary, "Invalid operand");
        assert!(diags[0].detail.starts_with("Unsuitable value for right operand"));

        let (_, diags) = eval_with("null + 1", &EvalContext::new());
        assert!(diags[0].detail.contains("must not be null"));
    }

    #[test]
    fn unknown_operands() {
        let ctx = unknowns();
        assert_eq!(eval_with("unum + 1", &ctx).0, Value::unknown(Type::Number));
        assert_eq!(eval_with("dyn < 1", &ctx).0, Value::unknown(Type::Bool));
    }

    // ============ Comparison and logic ============

    #[test]
    fn equality_across_types() {
        assert_eq!(eval_ok("1 == \"1\""), Value::Bool(false));
        assert_eq!(eval_ok("null == null"), Value::Bool(true));
        assert_eq!(eval_ok("1 != null"), Value::Bool(true));
        assert_eq!(eval_ok("[1, 2] == [1, 2]"), Value::Bool(true));
        let ctx = unknowns();
        assert_eq!(eval_with("unum == 1", &ctx).0, Value::unknown(Type::Bool));
    }

    #[test]
    fn short_circuit_logic() {
        // The right side would fail if it were evaluated.
        assert_eq!(eval_ok("false && (1 / 0 == 1)"), Value::Bool(false));
        assert_eq!(eval_ok("true || (1 / 0 == 1)"), Value::Bool(true));
        assert_eq!(eval_ok("!false && true"), Value::Bool(true));
    }

    #[test]
    fn kleene_logic() {
        let ctx = unknowns();
        assert_eq!(eval_with("ubool && false", &ctx).0, Value::Bool(false));
        assert_eq!(eval_with("ubool || true", &ctx).0, Value::Bool(true));
        assert_eq!(eval_with("ubool && true", &ctx).0, Value::unknown(Type::Bool));
    }

    // ============ Conditionals ============

    #[test]
    fn conditionals() {
        assert_eq!(eval_ok("true ? 1 : 2"), Value::from(1));
        assert_eq!(eval_ok("false ? 1 : \"b\""), Value::from("b"));
        assert_eq!(eval_ok("true ? 1 : \"b\""), Value::from("1"));
        assert_eq!(eval_ok("false ? \"a\" : null"), Value::null(Type::String));
    }

    #[test]
    fn unknown_condition_and_arms() {
        let ctx = unknowns();
        assert_eq!(eval_with("ubool ? 1 : 2", &ctx).0, Value::unknown(Type::Number));
        let (val, diags) = eval_with("true ? dyn : null", &ctx);
        assert!(diags.is_empty());
        assert_eq!(val, Value::dynamic());
    }

    #[test]
    fn conditional_errors() {
        let (_, diags) = eval_with("null ? 1 : 2", &EvalContext::new());
        assert_eq!(diags[0].summary, "Null condition");

        let (_, diags) = eval_with("\"x\" ? 1 : 2", &EvalContext::new());
        assert_eq!(diags[0].summary, "Incorrect condition type");

        let (_, diags) = eval_with("true ? [1] : {a = 1}", &EvalContext::new());
        assert_eq!(diags[0].summary, "Inconsistent conditional result types");

        // Errors in the branch that is not taken are not reported.
        let (val, diags) = eval_with("true ? 1 : 1 / 0", &EvalContext::new());
        assert!(diags.is_empty());
        assert_eq!(val, Value::from(1));
    }
}
