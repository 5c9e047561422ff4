//! A small standard function library
//!
//! Nothing is registered by default; add these to a context with
//! [`crate::EvalContext::with_stdlib`].

use std::collections::BTreeMap;

use unicode_segmentation::UnicodeSegmentation;

use crate::function::{Function, FunctionError, FunctionSpec, Parameter};
use crate::value::{Number, Type, Value, convert, unify};

/// Every stdlib function, by name.
pub fn functions() -> Vec<(&'static str, Function)> {
    vec![
        ("upper", upper()),
        ("lower", lower()),
        ("length", length()),
        ("join", join()),
        ("concat", concat()),
        ("keys", keys()),
        ("values", values()),
        ("min", min()),
        ("max", max()),
        ("abs", abs()),
        ("coalesce", coalesce()),
        ("tostring", tostring()),
        ("tonumber", tonumber()),
    ]
}

fn string_fn(f: fn(&str) -> String) -> Function {
    FunctionSpec::new(move |args, _| Ok(Value::String(f(args[0].as_str().unwrap_or_default()))))
        .param(Parameter::new("str", Type::String))
        .returns(Type::String)
        .build()
}

pub fn upper() -> Function {
    string_fn(str::to_uppercase)
}

pub fn lower() -> Function {
    string_fn(str::to_lowercase)
}

/// Elements of a collection, or user-perceived characters of a string.
pub fn length() -> Function {
    FunctionSpec::new(|args, _| {
        let val = &args[0];
        if let Some(s) = val.as_str() {
            return Ok(Value::number(s.graphemes(true).count()));
        }
        val.length()
            .map(Value::number)
            .ok_or_else(|| FunctionError::arg(0, format!("value of type {} has no length", val.ty())))
    })
    .param(Parameter::new("value", Type::Dynamic).allow_dynamic_type())
    .returns(Type::Number)
    .build()
}

pub fn join() -> Function {
    FunctionSpec::new(|args, _| {
        let sep = args[0].as_str().unwrap_or_default();
        let mut parts = Vec::new();
        for elem in args[1].as_sequence().unwrap_or_default() {
            match elem {
                Value::String(s) => parts.push(s.as_str()),
                Value::Null(_) => {
                    return Err(FunctionError::arg(1, "list elements must not be null"));
                }
                _ => {}
            }
        }
        Ok(Value::String(parts.join(sep)))
    })
    .param(Parameter::new("separator", Type::String))
    .param(Parameter::new("list", Type::list(Type::String)))
    .returns(Type::String)
    .build()
}

/// Concatenate sequences into one. The result is a list when every
/// argument is a list with a common element type.
pub fn concat() -> Function {
    FunctionSpec::new(|args, _| {
        let mut out = Vec::new();
        let mut all_lists = true;
        for (i, arg) in args.iter().enumerate() {
            let Some(elems) = arg.as_sequence() else {
                return Err(FunctionError::arg(i, "all arguments must be lists or tuples"));
            };
            all_lists &= arg.ty().is_list();
            out.extend(elems.iter().cloned());
        }
        if all_lists {
            let types: Vec<Type> = out.iter().map(Value::ty).collect();
            if let Some(elem) = unify(&types) {
                let converted: Result<Vec<Value>, _> =
                    out.iter().map(|v| convert(v, &elem)).collect();
                if let Ok(elems) = converted {
                    return Ok(match Value::list(elems) {
                        Ok(list) => list,
                        Err(_) => Value::tuple(out),
                    });
                }
            }
        }
        Ok(Value::tuple(out))
    })
    .var_param(Parameter::new("seqs", Type::Dynamic).allow_dynamic_type())
    .build()
}

pub fn keys() -> Function {
    FunctionSpec::new(|args, _| {
        let entries = args[0]
            .as_entries()
            .ok_or_else(|| FunctionError::arg(0, "must be a map or object"))?;
        let names: Vec<Value> = entries.keys().map(|k| Value::string(k.clone())).collect();
        if names.is_empty() {
            return Ok(Value::list_empty(Type::String));
        }
        Value::list(names).map_err(|e| FunctionError::other(e.to_string()))
    })
    .param(Parameter::new("inputMap", Type::Dynamic))
    .build()
}

pub fn values() -> Function {
    FunctionSpec::new(|args, _| {
        let entries: &BTreeMap<String, Value> = args[0]
            .as_entries()
            .ok_or_else(|| FunctionError::arg(0, "must be a map or object"))?;
        let elems: Vec<Value> = entries.values().cloned().collect();
        Ok(match &args[0] {
            Value::Map(elem, _) if elems.is_empty() => Value::list_empty(elem.clone()),
            Value::Map(..) => Value::list(elems.clone()).unwrap_or(Value::tuple(elems)),
            _ => Value::tuple(elems),
        })
    })
    .param(Parameter::new("mapping", Type::Dynamic))
    .build()
}

fn numbers(args: &[Value]) -> Result<Vec<&Number>, FunctionError> {
    if args.is_empty() {
        return Err(FunctionError::other("must pass at least one number"));
    }
    Ok(args.iter().filter_map(Value::as_number).collect())
}

pub fn min() -> Function {
    FunctionSpec::new(|args, _| {
        let nums = numbers(args)?;
        Ok(nums.into_iter().min().cloned().map_or(Value::unknown(Type::Number), Value::Number))
    })
    .var_param(Parameter::new("numbers", Type::Number))
    .returns(Type::Number)
    .build()
}

pub fn max() -> Function {
    FunctionSpec::new(|args, _| {
        let nums = numbers(args)?;
        Ok(nums.into_iter().max().cloned().map_or(Value::unknown(Type::Number), Value::Number))
    })
    .var_param(Parameter::new("numbers", Type::Number))
    .returns(Type::Number)
    .build()
}

pub fn abs() -> Function {
    FunctionSpec::new(|args, _| {
        Ok(args[0]
            .as_number()
            .map_or(Value::unknown(Type::Number), |n| Value::Number(n.abs())))
    })
    .param(Parameter::new("num", Type::Number))
    .returns(Type::Number)
    .build()
}

/// The first argument that is not null.
pub fn coalesce() -> Function {
    FunctionSpec::new(|args, _| {
        args.iter()
            .find(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| FunctionError::other("no non-null arguments"))
    })
    .var_param(
        Parameter::new("vals", Type::Dynamic)
            .allow_null()
            .allow_dynamic_type(),
    )
    .build()
}

pub fn tostring() -> Function {
    FunctionSpec::new(|args, _| Ok(args[0].clone()))
        .param(Parameter::new("v", Type::String).allow_null())
        .returns(Type::String)
        .build()
}

pub fn tonumber() -> Function {
    FunctionSpec::new(|args, _| Ok(args[0].clone()))
        .param(Parameter::new("v", Type::Number).allow_null())
        .returns(Type::Number)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings() {
        assert_eq!(upper().call(&[Value::from("abc")]).unwrap(), Value::from("ABC"));
        assert_eq!(lower().call(&[Value::from("ÀB")]).unwrap(), Value::from("àb"));
    }

    #[test]
    fn length_counts_graphemes() {
        // "e" followed by a combining acute accent is one character.
        let s = Value::from("cafe\u{301}");
        assert_eq!(length().call(&[s]).unwrap(), Value::from(4));
        let list = Value::list(vec![Value::from(1), Value::from(2)]).unwrap();
        assert_eq!(length().call(&[list]).unwrap(), Value::from(2));
        assert!(length().call(&[Value::from(true)]).is_err());
    }

    #[test]
    fn join_and_concat() {
        let list = Value::list(vec![Value::from("a"), Value::from("b")]).unwrap();
        assert_eq!(
            join().call(&[Value::from(", "), list.clone()]).unwrap(),
            Value::from("a, b")
        );
        let out = concat().call(&[list.clone(), list]).unwrap();
        assert_eq!(out.length(), Some(4));
        assert!(out.ty().is_list());

        let mixed = concat()
            .call(&[Value::tuple(vec![Value::from(1)]), Value::tuple(vec![Value::from("x")])])
            .unwrap();
        assert_eq!(mixed, Value::tuple(vec![Value::from(1), Value::from("x")]));
    }

    #[test]
    fn keys_and_values_are_lexically_ordered() {
        let obj = Value::object([("b", Value::from(2)), ("a", Value::from(1))]);
        assert_eq!(
            keys().call(&[obj.clone()]).unwrap(),
            Value::list(vec![Value::from("a"), Value::from("b")]).unwrap()
        );
        assert_eq!(
            values().call(&[obj]).unwrap(),
            Value::tuple(vec![Value::from(1), Value::from(2)])
        );
    }

    #[test]
    fn numeric() {
        let args = [Value::from(3), Value::from("-2"), Value::from(7)];
        assert_eq!(min().call(&args).unwrap(), Value::from(-2));
        assert_eq!(max().call(&args).unwrap(), Value::from(7));
        assert_eq!(abs().call(&[Value::from(-4)]).unwrap(), Value::from(4));
        assert!(max().call(&[]).is_err());
    }

    #[test]
    fn coalesce_and_conversions() {
        let out = coalesce()
            .call(&[Value::null(Type::String), Value::from("x")])
            .unwrap();
        assert_eq!(out, Value::from("x"));
        assert_eq!(tostring().call(&[Value::from(5)]).unwrap(), Value::from("5"));
        assert_eq!(tonumber().call(&[Value::from("1.5")]).unwrap().ty(), Type::Number);
        assert!(tonumber().call(&[Value::from("x")]).is_err());
    }
}
