//! Function calls

use crate::ast::{Expression, FunctionCall};
use crate::diagnostic::{Diagnostics, name_suggestion};
use crate::function::FunctionError;
use crate::pos::Range;
use crate::value::Value;

use super::{EvalContext, error, eval};

pub(super) fn eval_call(
    expr: &Expression,
    call: &FunctionCall,
    ctx: Option<&EvalContext>,
) -> (Value, Diagnostics) {
    let mut diags = Diagnostics::new();
    let Some(scope) = ctx.filter(|c| c.has_functions()) else {
        diags.push(error(
            expr,
            ctx,
            "Function calls not allowed",
            "Functions may not be called here.",
            call.name_range.clone(),
        ));
        return (Value::dynamic(), diags);
    };
    let Some(func) = scope.function(&call.name) else {
        let names = scope.function_names();
        let mut detail = format!("There is no function named {:?}.", call.name);
        if let Some(suggestion) = name_suggestion(&call.name, names.iter().map(String::as_str)) {
            detail = format!("{detail} Did you mean {suggestion:?}?");
        }
        diags.push(error(
            expr,
            ctx,
            "Call to unknown function",
            detail,
            call.name_range.clone(),
        ));
        return (Value::dynamic(), diags);
    };
    log::trace!("calling function {}", call.name);

    // Argument values, each with the expression it came from.
    let mut args: Vec<(Value, &Expression)> = Vec::with_capacity(call.args.len());
    for arg in &call.args {
        let (val, more) = eval(arg, ctx);
        diags.append(more);
        args.push((val, arg));
    }

    if call.expand_final
        && let Some((last, last_expr)) = args.pop()
    {
        if last.is_null() {
            diags.push(error(
                expr,
                ctx,
                "Invalid expanding argument value",
                "The expanding argument (indicated by ...) must not be null.",
                last_expr.range.clone(),
            ));
            return (Value::dynamic(), diags);
        }
        if !last.is_known() {
            return (Value::dynamic(), diags);
        }
        let Some(elems) = last.as_sequence() else {
            diags.push(error(
                expr,
                ctx,
                "Invalid expanding argument value",
                "The expanding argument (indicated by ...) must be of a tuple, list, or set type.",
                last_expr.range.clone(),
            ));
            return (Value::dynamic(), diags);
        };
        args.extend(elems.iter().map(|v| (v.clone(), last_expr)));
    }

    let params = func.params();
    if args.len() < params.len() {
        let missing = &params[args.len()];
        let mut detail = format!(
            "Function {:?} expects {} argument(s). Missing value for {:?}.",
            call.name,
            params.len(),
            missing.name
        );
        if func.var_param().is_some() {
            detail = format!(
                "Function {:?} expects at least {} argument(s). Missing value for {:?}.",
                call.name,
                params.len(),
                missing.name
            );
        }
        diags.push(error(
            expr,
            ctx,
            "Not enough function arguments",
            detail,
            call.close_paren_range.clone(),
        ));
        return (Value::dynamic(), diags);
    }
    if func.var_param().is_none() && args.len() > params.len() {
        let extra = args[params.len()].1;
        diags.push(error(
            expr,
            ctx,
            "Too many function arguments",
            format!(
                "Function {:?} expects only {} argument(s).",
                call.name,
                params.len()
            ),
            extra.range.clone(),
        ));
        return (Value::dynamic(), diags);
    }
    if diags.has_errors() {
        return (Value::dynamic(), diags);
    }

    let values: Vec<Value> = args.iter().map(|(v, _)| v.clone()).collect();
    match func.call(&values) {
        Ok(val) => (val, diags),
        Err(FunctionError::Arg { index, message }) => {
            let name = func.param_for(index).map(|p| p.name.as_str()).unwrap_or("");
            let subject = args
                .get(index)
                .map(|(_, e)| e.range.clone())
                .unwrap_or_else(|| call_range(call));
            diags.push(error(
                expr,
                ctx,
                "Invalid function argument",
                format!("Invalid value for {name:?} parameter: {message}."),
                subject,
            ));
            (Value::dynamic(), diags)
        }
        Err(FunctionError::Other(message)) => {
            diags.push(error(
                expr,
                ctx,
                "Error in function call",
                format!("Call to function {:?} failed: {message}.", call.name),
                call_range(call),
            ));
            (Value::dynamic(), diags)
        }
    }
}

fn call_range(call: &FunctionCall) -> Range {
    Range::between(&call.name_range, &call.close_paren_range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{FunctionSpec, Parameter};
    use crate::parser::parse_expression;
    use crate::pos::Pos;
    use crate::value::Type;

    fn ctx() -> EvalContext {
        let strict = FunctionSpec::new(|args, _| {
            if args[0].as_str() == Some("bad") {
                return Err(FunctionError::other("refusing bad input"));
            }
            Ok(args[0].clone())
        })
        .param(Parameter::new("text", Type::String))
        .returns(Type::String)
        .build();
        EvalContext::new()
            .with_stdlib()
            .with_function("strict", strict)
            .with_variable("nums", Value::tuple(vec![Value::from(1), Value::from(5), Value::from(3)]))
            .with_variable("pending", Value::unknown(Type::String))
    }

    fn call(src: &str) -> (Value, Diagnostics) {
        let (expr, diags) = parse_expression(src.as_bytes(), "t", Pos::START);
        assert!(diags.is_empty(), "{diags}");
        expr.value(Some(&ctx()))
    }

    #[test]
    fn calls_and_expansion() {
        assert_eq!(call("upper(\"abc\")").0, Value::from("ABC"));
        assert_eq!(call("max(nums...)").0, Value::from(5));
        assert_eq!(call("strict(pending)").0, Value::unknown(Type::String));
    }

    #[test]
    fn not_allowed_without_functions() {
        let (expr, _) = parse_expression(b"upper(\"a\")", "t", Pos::START);
        let (val, diags) = expr.value(Some(&EvalContext::new()));
        assert_eq!(val, Value::dynamic());
        assert_eq!(diags[0].summary, "Function calls not allowed");
    }

    #[test]
    fn unknown_function_suggests_name() {
        let (_, diags) = call("uper(\"a\")");
        assert_eq!(diags[0].summary, "Call to unknown function");
        assert!(diags[0].detail.contains("Did you mean \"upper\"?"));
    }

    #[test]
    fn arity_errors() {
        let (_, diags) = call("strict()");
        assert_eq!(diags[0].summary, "Not enough function arguments");
        assert!(diags[0].detail.contains("\"text\""));

        let (_, diags) = call("strict(\"a\", \"b\")");
        assert_eq!(diags[0].summary, "Too many function arguments");
        assert_eq!(diags[0].subject.as_ref().unwrap().start.column, 13);
    }

    #[test]
    fn argument_and_call_failures() {
        let (_, diags) = call("strict([])");
        assert_eq!(diags[0].summary, "Invalid function argument");
        assert!(diags[0].detail.starts_with("Invalid value for \"text\" parameter"));

        let (_, diags) = call("strict(\"bad\")");
        assert_eq!(diags[0].summary, "Error in function call");

        let (_, diags) = call("max(null...)");
        assert_eq!(diags[0].summary, "Invalid expanding argument value");
    }
}
