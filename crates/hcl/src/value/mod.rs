//! Dynamically-typed value model
//!
//! Every value has a type. Null and unknown are orthogonal to type: a null
//! string and an unknown string are both `string`-typed and both distinct
//! from any concrete string.

mod convert;
mod number;
mod ty;

use std::collections::BTreeMap;

use thiserror::Error;

pub use convert::{ConvertError, can_convert, convert, unify};
pub use number::Number;
pub use ty::{ObjectType, Type};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("inconsistent element types: {first} and {other}")]
    InvalidValue { first: Type, other: Type },
}

/// A value of the expression language.
///
/// Derived equality is strict (`raw_equals`): it compares types, nulls and
/// unknowns exactly. Use [`Value::equals`] for the language's `==`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Null(Type),
    Unknown(Type),
    Bool(bool),
    Number(Number),
    String(String),
    List(Type, Vec<Value>),
    /// Elements are kept sorted and deduplicated.
    Set(Type, Vec<Value>),
    Map(Type, BTreeMap<String, Value>),
    Tuple(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn null(ty: Type) -> Value {
        Value::Null(ty)
    }

    pub fn unknown(ty: Type) -> Value {
        Value::Unknown(ty)
    }

    /// Unknown value of unknown type.
    pub fn dynamic() -> Value {
        Value::Unknown(Type::Dynamic)
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    pub fn number(n: impl Into<Number>) -> Value {
        Value::Number(n.into())
    }

    pub fn bool(b: bool) -> Value {
        Value::Bool(b)
    }

    pub fn list(elems: Vec<Value>) -> Result<Value, ValueError> {
        let ty = homogeneous_type(&elems)?;
        Ok(Value::List(ty, elems))
    }

    pub fn list_empty(elem: Type) -> Value {
        Value::List(elem, Vec::new())
    }

    pub fn set(mut elems: Vec<Value>) -> Result<Value, ValueError> {
        let ty = homogeneous_type(&elems)?;
        elems.sort();
        elems.dedup();
        Ok(Value::Set(ty, elems))
    }

    pub fn set_empty(elem: Type) -> Value {
        Value::Set(elem, Vec::new())
    }

    pub fn map(entries: BTreeMap<String, Value>) -> Result<Value, ValueError> {
        let values: Vec<&Value> = entries.values().collect();
        let ty = match values.split_first() {
            Some((first, rest)) => {
                let first_ty = first.ty();
                for v in rest {
                    let other = v.ty();
                    if other != first_ty {
                        return Err(ValueError::InvalidValue {
                            first: first_ty,
                            other,
                        });
                    }
                }
                first_ty
            }
            None => Type::Dynamic,
        };
        Ok(Value::Map(ty, entries))
    }

    pub fn map_empty(elem: Type) -> Value {
        Value::Map(elem, BTreeMap::new())
    }

    pub fn tuple(elems: Vec<Value>) -> Value {
        Value::Tuple(elems)
    }

    pub fn empty_tuple() -> Value {
        Value::Tuple(Vec::new())
    }

    pub fn object<I, S>(attrs: I) -> Value
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        Value::Object(attrs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn empty_object() -> Value {
        Value::Object(BTreeMap::new())
    }

    pub fn ty(&self) -> Type {
        match self {
            Value::Null(ty) | Value::Unknown(ty) => ty.clone(),
            Value::Bool(_) => Type::Bool,
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::List(ty, _) => Type::list(ty.clone()),
            Value::Set(ty, _) => Type::set(ty.clone()),
            Value::Map(ty, _) => Type::map(ty.clone()),
            Value::Tuple(elems) => Type::Tuple(elems.iter().map(Value::ty).collect()),
            Value::Object(attrs) => Type::object(attrs.iter().map(|(k, v)| (k.clone(), v.ty()))),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    /// False only for an unknown value itself; a known collection may still
    /// contain unknowns.
    pub fn is_known(&self) -> bool {
        !matches!(self, Value::Unknown(_))
    }

    pub fn is_wholly_known(&self) -> bool {
        match self {
            Value::Unknown(_) => false,
            Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => {
                elems.iter().all(Value::is_wholly_known)
            }
            Value::Map(_, entries) | Value::Object(entries) => {
                entries.values().all(Value::is_wholly_known)
            }
            _ => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Sequence elements of a list, set or tuple.
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => Some(elems),
            _ => None,
        }
    }

    /// Entries of a map or object.
    pub fn as_entries(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(_, entries) | Value::Object(entries) => Some(entries),
            _ => None,
        }
    }

    /// Number of elements of a known collection, tuple or object.
    pub fn length(&self) -> Option<usize> {
        self.as_sequence()
            .map(<[Value]>::len)
            .or_else(|| self.as_entries().map(BTreeMap::len))
    }

    pub fn can_iterate(&self) -> bool {
        self.as_sequence().is_some() || self.as_entries().is_some()
    }

    /// Key/value pairs of an iterable value. Lists and tuples are keyed by
    /// index, sets by the element itself, maps and objects by name in
    /// lexical order.
    pub fn elements(&self) -> Vec<(Value, Value)> {
        match self {
            Value::List(_, elems) | Value::Tuple(elems) => elems
                .iter()
                .enumerate()
                .map(|(i, v)| (Value::number(i), v.clone()))
                .collect(),
            Value::Set(_, elems) => elems.iter().map(|v| (v.clone(), v.clone())).collect(),
            Value::Map(_, entries) | Value::Object(entries) => entries
                .iter()
                .map(|(k, v)| (Value::string(k.clone()), v.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Language equality: unknown when it cannot yet be decided.
    pub fn equals(&self, other: &Value) -> Value {
        if self.is_null() && other.is_null() {
            return Value::Bool(true);
        }
        if self.is_null() || other.is_null() {
            return if self.is_known() && other.is_known() {
                Value::Bool(false)
            } else {
                Value::Unknown(Type::Bool)
            };
        }
        if !self.is_known() || !other.is_known() {
            return Value::Unknown(Type::Bool);
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(a == b),
            (Value::Number(a), Value::Number(b)) => Value::Bool(a == b),
            (Value::String(a), Value::String(b)) => Value::Bool(a == b),
            (Value::List(ta, a), Value::List(tb, b))
            | (Value::Set(ta, a), Value::Set(tb, b)) => {
                if !element_types_compatible(ta, tb) {
                    return Value::Bool(false);
                }
                all_equal(a, b)
            }
            (Value::Tuple(a), Value::Tuple(b)) => all_equal(a, b),
            (Value::Map(ta, a), Value::Map(tb, b)) => {
                if !element_types_compatible(ta, tb) {
                    return Value::Bool(false);
                }
                entries_equal(a, b)
            }
            (Value::Object(a), Value::Object(b)) => entries_equal(a, b),
            _ => Value::Bool(false),
        }
    }

    /// Strict equality including type, nulls and unknowns.
    pub fn raw_equals(&self, other: &Value) -> bool {
        self == other
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

fn homogeneous_type(elems: &[Value]) -> Result<Type, ValueError> {
    let Some((first, rest)) = elems.split_first() else {
        return Ok(Type::Dynamic);
    };
    let first_ty = first.ty();
    for elem in rest {
        let other = elem.ty();
        if other != first_ty {
            return Err(ValueError::InvalidValue {
                first: first_ty,
                other,
            });
        }
    }
    Ok(first_ty)
}

fn element_types_compatible(a: &Type, b: &Type) -> bool {
    a == b || a.is_dynamic() || b.is_dynamic()
}

/// Kleene conjunction of pairwise equality.
fn all_equal(a: &[Value], b: &[Value]) -> Value {
    if a.len() != b.len() {
        return Value::Bool(false);
    }
    let mut unknown = false;
    for (x, y) in a.iter().zip(b) {
        match x.equals(y) {
            Value::Bool(false) => return Value::Bool(false),
            Value::Bool(true) => {}
            _ => unknown = true,
        }
    }
    if unknown {
        Value::Unknown(Type::Bool)
    } else {
        Value::Bool(true)
    }
}

fn entries_equal(a: &BTreeMap<String, Value>, b: &BTreeMap<String, Value>) -> Value {
    if a.len() != b.len() || a.keys().zip(b.keys()).any(|(x, y)| x != y) {
        return Value::Bool(false);
    }
    let av: Vec<Value> = a.values().cloned().collect();
    let bv: Vec<Value> = b.values().cloned().collect();
    all_equal(&av, &bv)
}
