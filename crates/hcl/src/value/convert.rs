//! Conversion between types and type unification

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use super::{Number, ObjectType, Type, Value};

/// A value could not be converted to the requested type.
#[derive(Error, Debug, Clone, PartialEq)]
pub struct ConvertError {
    /// Steps leading to the offending nested value, outermost first.
    pub path: Vec<String>,
    pub message: String,
}

impl ConvertError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            message: message.into(),
        }
    }

    fn within(mut self, step: String) -> Self {
        self.path.insert(0, step);
        self
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path.join(", "), self.message)
        }
    }
}

/// Convert `val` to `want`. `Dynamic` accepts anything unchanged.
pub fn convert(val: &Value, want: &Type) -> Result<Value, ConvertError> {
    if want.is_dynamic() {
        return Ok(val.clone());
    }
    match val {
        Value::Unknown(from) => {
            check_type(from, want)?;
            Ok(Value::Unknown(want.clone()))
        }
        Value::Null(from) => {
            check_type(from, want)?;
            Ok(Value::Null(want.clone()))
        }
        _ => convert_known(val, want),
    }
}

/// Whether values of type `from` may convert to `want`. Primitive
/// conversions that depend on the actual value (such as string to number)
/// are allowed here and may still fail for a particular value.
pub fn can_convert(from: &Type, want: &Type) -> bool {
    check_type(from, want).is_ok()
}

fn check_type(from: &Type, want: &Type) -> Result<(), ConvertError> {
    if from == want || from.is_dynamic() || want.is_dynamic() {
        return Ok(());
    }
    let ok = match (want, from) {
        (Type::String, Type::Number | Type::Bool) => true,
        (Type::Number | Type::Bool, Type::String) => true,
        (Type::List(w) | Type::Set(w), Type::List(f) | Type::Set(f)) => {
            return check_type(f, w);
        }
        (Type::List(w) | Type::Set(w), Type::Tuple(elems)) => {
            return elems.iter().try_for_each(|e| check_type(e, w));
        }
        (Type::Map(w), Type::Map(f)) => return check_type(f, w),
        (Type::Map(w), Type::Object(obj)) => {
            return obj.attributes().values().try_for_each(|a| check_type(a, w));
        }
        (Type::Tuple(ws), Type::Tuple(fs)) => {
            if ws.len() != fs.len() {
                return Err(ConvertError::new(format!(
                    "tuple with {} elements required",
                    ws.len()
                )));
            }
            return ws
                .iter()
                .zip(fs)
                .enumerate()
                .try_for_each(|(i, (w, f))| check_type(f, w).map_err(|e| e.within(format!("element {i}"))));
        }
        (Type::Tuple(ws), Type::List(f) | Type::Set(f)) => {
            return ws.iter().try_for_each(|w| check_type(f, w));
        }
        (Type::Object(want_obj), Type::Object(from_obj)) => {
            for (name, w) in want_obj.attributes() {
                match from_obj.attribute(name) {
                    Some(f) => check_type(f, w)
                        .map_err(|e| e.within(format!("attribute {name:?}")))?,
                    None if want_obj.is_optional(name) => {}
                    None => {
                        return Err(ConvertError::new(format!(
                            "attribute {name:?} is required"
                        )));
                    }
                }
            }
            return Ok(());
        }
        (Type::Object(want_obj), Type::Map(f)) => {
            return want_obj
                .attributes()
                .values()
                .try_for_each(|w| check_type(f, w));
        }
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(required(want))
    }
}

fn required(want: &Type) -> ConvertError {
    ConvertError::new(format!("{want} required"))
}

fn convert_known(val: &Value, want: &Type) -> Result<Value, ConvertError> {
    match want {
        Type::Dynamic => Ok(val.clone()),
        Type::Bool => match val {
            Value::Bool(_) => Ok(val.clone()),
            Value::String(s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" => Ok(Value::Bool(false)),
            Value::String(_) => Err(ConvertError::new("a bool is required")),
            _ => Err(required(want)),
        },
        Type::Number => match val {
            Value::Number(_) => Ok(val.clone()),
            Value::String(s) => Number::parse(s)
                .map(Value::Number)
                .ok_or_else(|| ConvertError::new("a number is required")),
            _ => Err(required(want)),
        },
        Type::String => match val {
            Value::String(_) => Ok(val.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(required(want)),
        },
        Type::List(elem) => {
            let elems = val.as_sequence().ok_or_else(|| required(want))?;
            let (elem_ty, converted) = convert_elements(elems, elem, "list")?;
            Ok(Value::List(elem_ty, converted))
        }
        Type::Set(elem) => {
            let elems = val.as_sequence().ok_or_else(|| required(want))?;
            let (elem_ty, mut converted) = convert_elements(elems, elem, "set")?;
            converted.sort();
            converted.dedup();
            Ok(Value::Set(elem_ty, converted))
        }
        Type::Map(elem) => {
            let entries = val.as_entries().ok_or_else(|| required(want))?;
            let target = if elem.is_dynamic() {
                let tys: Vec<Type> = entries.values().map(Value::ty).collect();
                unify(&tys).ok_or_else(|| {
                    ConvertError::new("all map elements must have the same type")
                })?
            } else {
                (**elem).clone()
            };
            let mut out = BTreeMap::new();
            for (k, v) in entries {
                let cv = convert(v, &target).map_err(|e| e.within(format!("element {k:?}")))?;
                out.insert(k.clone(), cv);
            }
            let elem_ty = if target.is_dynamic() && !out.is_empty() {
                out.values().next().map(Value::ty).unwrap_or(Type::Dynamic)
            } else {
                target
            };
            Ok(Value::Map(elem_ty, out))
        }
        Type::Tuple(want_elems) => {
            let elems = match val {
                Value::Tuple(elems) | Value::List(_, elems) | Value::Set(_, elems) => elems,
                _ => return Err(required(want)),
            };
            if elems.len() != want_elems.len() {
                return Err(ConvertError::new(format!(
                    "tuple with {} elements required",
                    want_elems.len()
                )));
            }
            let converted = elems
                .iter()
                .zip(want_elems)
                .enumerate()
                .map(|(i, (v, t))| convert(v, t).map_err(|e| e.within(format!("element {i}"))))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Tuple(converted))
        }
        Type::Object(want_obj) => convert_to_object(val, want_obj, want),
    }
}

fn convert_elements(
    elems: &[Value],
    elem: &Type,
    kind: &str,
) -> Result<(Type, Vec<Value>), ConvertError> {
    let target = if elem.is_dynamic() {
        let tys: Vec<Type> = elems.iter().map(Value::ty).collect();
        unify(&tys).ok_or_else(|| {
            ConvertError::new(format!("all {kind} elements must have the same type"))
        })?
    } else {
        elem.clone()
    };
    let converted = elems
        .iter()
        .enumerate()
        .map(|(i, v)| convert(v, &target).map_err(|e| e.within(format!("element {i}"))))
        .collect::<Result<Vec<_>, _>>()?;
    // A dynamic target leaves each element as-is; the unified type of the
    // converted elements is then the real element type.
    let elem_ty = if target.is_dynamic() {
        let tys: Vec<Type> = converted.iter().map(Value::ty).collect();
        match tys.split_first() {
            Some((first, rest)) if rest.iter().all(|t| t == first) => first.clone(),
            _ => Type::Dynamic,
        }
    } else {
        target
    };
    Ok((elem_ty, converted))
}

fn convert_to_object(val: &Value, want_obj: &ObjectType, want: &Type) -> Result<Value, ConvertError> {
    let entries = val.as_entries().ok_or_else(|| required(want))?;
    if let Value::Map(_, map) = val
        && let Some(extra) = map.keys().find(|k| want_obj.attribute(k).is_none())
    {
        return Err(ConvertError::new(format!("unexpected attribute {extra:?}")));
    }
    let mut out = BTreeMap::new();
    for (name, ty) in want_obj.attributes() {
        match entries.get(name) {
            Some(v) => {
                let cv = convert(v, ty).map_err(|e| e.within(format!("attribute {name:?}")))?;
                out.insert(name.clone(), cv);
            }
            None if want_obj.is_optional(name) => {
                out.insert(name.clone(), Value::Null(ty.clone()));
            }
            None => {
                return Err(ConvertError::new(format!("attribute {name:?} is required")));
            }
        }
    }
    Ok(Value::Object(out))
}

/// Find a single type that all of `types` can convert to.
pub fn unify(types: &[Type]) -> Option<Type> {
    let Some((first, rest)) = types.split_first() else {
        return Some(Type::Dynamic);
    };
    if rest.iter().all(|t| t == first) {
        return Some(first.clone());
    }
    if types.iter().any(Type::is_dynamic) {
        return Some(Type::Dynamic);
    }
    if types.iter().all(Type::is_primitive) {
        // Only strings can absorb the other primitives.
        return if types.contains(&Type::String) {
            Some(Type::String)
        } else {
            None
        };
    }
    if types.iter().all(Type::is_list) {
        return unify_elements(types).map(Type::list);
    }
    if types.iter().all(Type::is_set) {
        return unify_elements(types).map(Type::set);
    }
    if types.iter().all(Type::is_map) {
        return unify_elements(types).map(Type::map);
    }
    if types.iter().all(|t| t.is_list() || t.is_tuple()) {
        return unify(&sequence_members(types)).map(Type::list);
    }
    if types.iter().all(Type::is_tuple) {
        let len = first.tuple_element_types().map(<[Type]>::len);
        if types.iter().all(|t| t.tuple_element_types().map(<[Type]>::len) == len) {
            let n = len.unwrap_or(0);
            let mut elems = Vec::with_capacity(n);
            for i in 0..n {
                let column: Vec<Type> = types
                    .iter()
                    .filter_map(|t| t.tuple_element_types().and_then(|e| e.get(i)).cloned())
                    .collect();
                elems.push(unify(&column)?);
            }
            return Some(Type::Tuple(elems));
        }
        return unify(&sequence_members(types)).map(Type::list);
    }
    if types.iter().all(Type::is_object) {
        let names: Vec<Vec<&String>> = types
            .iter()
            .filter_map(|t| match t {
                Type::Object(obj) => Some(obj.attributes().keys().collect()),
                _ => None,
            })
            .collect();
        if names.iter().all(|n| *n == names[0]) {
            let mut attrs = BTreeMap::new();
            for name in &names[0] {
                let column: Vec<Type> = types
                    .iter()
                    .filter_map(|t| t.attribute_type(name).cloned())
                    .collect();
                attrs.insert((*name).clone(), unify(&column)?);
            }
            return Some(Type::Object(ObjectType::new(attrs)));
        }
        return unify(&mapping_members(types)).map(Type::map);
    }
    if types.iter().all(|t| t.is_map() || t.is_object()) {
        return unify(&mapping_members(types)).map(Type::map);
    }
    None
}

fn unify_elements(types: &[Type]) -> Option<Type> {
    let elems: Vec<Type> = types
        .iter()
        .filter_map(|t| t.element_type().cloned())
        .collect();
    unify(&elems)
}

fn sequence_members(types: &[Type]) -> Vec<Type> {
    types
        .iter()
        .flat_map(|t| match t {
            Type::Tuple(elems) => elems.clone(),
            other => other.element_type().cloned().into_iter().collect(),
        })
        .collect()
}

fn mapping_members(types: &[Type]) -> Vec<Type> {
    types
        .iter()
        .flat_map(|t| match t {
            Type::Object(obj) => obj.attributes().values().cloned().collect(),
            other => other.element_type().cloned().into_iter().collect::<Vec<_>>(),
        })
        .collect()
}
