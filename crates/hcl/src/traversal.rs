//! Traversals: ordered lookup steps applied to a scope or a value

use crate::diagnostic::{Diagnostic, Diagnostics, name_suggestion};
use crate::eval::EvalContext;
use crate::pos::Range;
use crate::value::{Number, Type, Value, convert};

/// A single traversal step.
#[derive(Debug, Clone, PartialEq)]
pub enum Traverser {
    /// Variable lookup; only valid as the first step of an absolute traversal.
    Root { name: String, range: Range },
    Attr { name: String, range: Range },
    Index { key: Value, range: Range },
    /// Apply `each` to every element of a sequence.
    Splat { each: Traversal, range: Range },
}

impl Traverser {
    pub fn range(&self) -> &Range {
        match self {
            Traverser::Root { range, .. }
            | Traverser::Attr { range, .. }
            | Traverser::Index { range, .. }
            | Traverser::Splat { range, .. } => range,
        }
    }

    /// Apply a relative step to `val`. A root step is not relative and
    /// always fails here.
    pub fn traverse(&self, val: &Value) -> Result<Value, Diagnostics> {
        match self {
            Traverser::Root { range, .. } => Err(Diagnostic::error(
                "Invalid traversal",
                "A variable name may only appear at the start of a traversal.",
            )
            .with_subject(range.clone())
            .into()),
            Traverser::Attr { name, range } => get_attr(val, name, range).map_err(Into::into),
            Traverser::Index { key, range } => index(val, key, range).map_err(Into::into),
            Traverser::Splat { each, range } => splat(val, each, range),
        }
    }
}

/// An ordered sequence of steps. Absolute iff the first step is a root.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Traversal(pub Vec<Traverser>);

impl Traversal {
    pub fn new(steps: Vec<Traverser>) -> Self {
        Self(steps)
    }

    pub fn steps(&self) -> &[Traverser] {
        &self.0
    }

    pub fn push(&mut self, step: Traverser) {
        self.0.push(step);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_absolute(&self) -> bool {
        matches!(self.0.first(), Some(Traverser::Root { .. }))
    }

    pub fn is_relative(&self) -> bool {
        !self.is_absolute()
    }

    pub fn root_name(&self) -> Option<&str> {
        match self.0.first() {
            Some(Traverser::Root { name, .. }) => Some(name),
            _ => None,
        }
    }

    /// Split an absolute traversal into its root and the relative remainder.
    pub fn simple_split(&self) -> Option<(Traversal, Traversal)> {
        if !self.is_absolute() {
            return None;
        }
        let (root, rest) = self.0.split_first()?;
        Some((Traversal(vec![root.clone()]), Traversal(rest.to_vec())))
    }

    /// Range covering every step, if there are any.
    pub fn source_range(&self) -> Option<Range> {
        let first = self.0.first()?.range();
        let last = self.0.last()?.range();
        Some(Range::between(first, last))
    }

    /// Apply every step to `val`. Stops at the first failing step and
    /// returns an unknown of dynamic type with its diagnostics.
    pub fn traverse_rel(&self, val: &Value) -> (Value, Diagnostics) {
        let mut current = val.clone();
        for step in &self.0 {
            match step.traverse(&current) {
                Ok(next) => current = next,
                Err(diags) => return (Value::dynamic(), diags),
            }
        }
        (current, Diagnostics::new())
    }

    /// Resolve the root step in `ctx`, then apply the remaining steps.
    pub fn traverse_abs(&self, ctx: Option<&EvalContext>) -> (Value, Diagnostics) {
        let Some(Traverser::Root { name, range }) = self.0.first() else {
            let diag = Diagnostic::error(
                "Invalid traversal",
                "An absolute traversal must begin with a variable name.",
            );
            let diag = match self.source_range() {
                Some(range) => diag.with_subject(range),
                None => diag,
            };
            return (Value::dynamic(), diag.into());
        };

        let Some(ctx) = ctx.filter(|c| c.has_variables()) else {
            let diag = Diagnostic::error("Variables not allowed", "Variables may not be used here.")
                .with_subject(range.clone());
            return (Value::dynamic(), diag.into());
        };

        let Some(root) = ctx.variable(name) else {
            let names = ctx.variable_names();
            let mut detail = format!("There is no variable named {name:?}.");
            if let Some(suggestion) = name_suggestion(name, names.iter().map(String::as_str)) {
                detail = format!("{detail} Did you mean {suggestion:?}?");
            }
            let diag = Diagnostic::error("Variable not found", detail).with_subject(range.clone());
            return (Value::dynamic(), diag.into());
        };

        Traversal(self.0[1..].to_vec()).traverse_rel(root)
    }
}

/// Look up attribute `name` on an object, or key `name` on a map.
pub fn get_attr(val: &Value, name: &str, range: &Range) -> Result<Value, Diagnostic> {
    let fail = |summary: &str, detail: String| {
        Diagnostic::error(summary, detail).with_subject(range.clone())
    };
    match val {
        Value::Null(_) => Err(fail(
            "Attempt to get attribute from null value",
            "This value is null, so it does not have any attributes.".to_string(),
        )),
        Value::Unknown(ty) => match ty {
            Type::Dynamic => Ok(Value::dynamic()),
            Type::Map(elem) => Ok(Value::unknown((**elem).clone())),
            Type::Object(obj) => match obj.attribute(name) {
                Some(attr_ty) => Ok(Value::unknown(attr_ty.clone())),
                None => Err(fail(
                    "Unsupported attribute",
                    missing_attribute_detail(name, obj.attributes().keys()),
                )),
            },
            other => Err(fail("Unsupported attribute", no_attributes_detail(other, name))),
        },
        Value::Object(attrs) => attrs.get(name).cloned().ok_or_else(|| {
            fail(
                "Unsupported attribute",
                missing_attribute_detail(name, attrs.keys()),
            )
        }),
        Value::Map(_, entries) => entries.get(name).cloned().ok_or_else(|| {
            fail(
                "Missing map element",
                format!("This map does not have an element with the key {name:?}."),
            )
        }),
        other => Err(fail(
            "Unsupported attribute",
            no_attributes_detail(&other.ty(), name),
        )),
    }
}

fn missing_attribute_detail<'a>(name: &str, available: impl Iterator<Item = &'a String>) -> String {
    let mut detail = format!("This object does not have an attribute named {name:?}.");
    if let Some(suggestion) = name_suggestion(name, available.map(String::as_str)) {
        detail = format!("{detail} Did you mean {suggestion:?}?");
    }
    detail
}

fn no_attributes_detail(ty: &Type, name: &str) -> String {
    if ty.is_primitive() {
        format!("Can't access attributes on a primitive-typed value ({ty}).")
    } else if ty.is_list() || ty.is_set() || ty.is_tuple() {
        format!(
            "Can't access attributes on a list of objects. Did you mean to access attribute \
             {name:?} for a specific element of the list, or across all elements of the list?"
        )
    } else {
        "This value does not have any attributes.".to_string()
    }
}

const NOT_AN_ELEMENT: &str = "The given key does not identify an element in this collection value.";

/// Index a list, tuple, map or object by `key`.
pub fn index(collection: &Value, key: &Value, range: &Range) -> Result<Value, Diagnostic> {
    let fail = |summary: &str, detail: String| {
        Diagnostic::error(summary, detail).with_subject(range.clone())
    };
    if collection.is_null() {
        return Err(fail(
            "Attempt to index null value",
            "This value is null, so it does not have any indices.".to_string(),
        ));
    }
    if key.is_null() {
        return Err(fail(
            "Invalid index",
            "Can't use a null value as an indexing key.".to_string(),
        ));
    }

    let coll_ty = collection.ty();
    if coll_ty.is_set() {
        return Err(fail(
            "Invalid index",
            "Elements of a set are identified only by their value and don't have any separate \
             index or key to select with, so it's only possible to perform operations across \
             all elements of the set."
                .to_string(),
        ));
    }
    if !(coll_ty.is_dynamic()
        || coll_ty.is_list()
        || coll_ty.is_tuple()
        || coll_ty.is_map()
        || coll_ty.is_object())
    {
        return Err(fail(
            "Invalid index",
            "This value does not have any indices.".to_string(),
        ));
    }

    let sequence = coll_ty.is_list() || coll_ty.is_tuple();
    let key = if coll_ty.is_dynamic() {
        key.clone()
    } else {
        let want = if sequence { Type::Number } else { Type::String };
        convert(key, &want).map_err(|e| {
            fail(
                "Invalid index",
                format!(
                    "The given key does not identify an element in this collection value: {e}."
                ),
            )
        })?
    };

    if !collection.is_known() || !key.is_known() {
        return Ok(Value::unknown(unknown_element_type(&coll_ty, &key)));
    }

    match collection {
        Value::List(_, elems) | Value::Tuple(elems) => {
            let idx = key.as_number().and_then(Number::to_usize);
            match idx.and_then(|i| elems.get(i)) {
                Some(v) => Ok(v.clone()),
                None if key.as_number().is_some_and(Number::is_negative) => Err(fail(
                    "Invalid index",
                    "The given key does not identify an element in this collection value: a \
                     negative number is not a valid index for a sequence."
                        .to_string(),
                )),
                None => Err(fail("Invalid index", NOT_AN_ELEMENT.to_string())),
            }
        }
        Value::Map(_, entries) | Value::Object(entries) => key
            .as_str()
            .and_then(|k| entries.get(k))
            .cloned()
            .ok_or_else(|| fail("Invalid index", NOT_AN_ELEMENT.to_string())),
        _ => Err(fail("Invalid index", "This value does not have any indices.".to_string())),
    }
}

/// Best-known element type when either side of an index is unknown.
fn unknown_element_type(coll_ty: &Type, key: &Value) -> Type {
    match coll_ty {
        Type::List(elem) | Type::Map(elem) => (**elem).clone(),
        Type::Tuple(elems) => key
            .as_number()
            .and_then(Number::to_usize)
            .and_then(|i| elems.get(i).cloned())
            .unwrap_or(Type::Dynamic),
        Type::Object(obj) => key
            .as_str()
            .and_then(|k| obj.attribute(k).cloned())
            .unwrap_or(Type::Dynamic),
        _ => Type::Dynamic,
    }
}

pub(crate) const NULL_SPLAT_SUMMARY: &str = "Splat of null value";
pub(crate) const NULL_SPLAT_DETAIL: &str =
    "Splat expressions (with the * symbol) cannot be applied to null sequences.";

/// The result of splatting an unknown value of type `ty`. A tuple keeps
/// its length with every element unknown.
pub(crate) fn unknown_splat(ty: &Type) -> Value {
    match ty {
        Type::List(_) | Type::Set(_) => Value::unknown(Type::list(Type::Dynamic)),
        Type::Tuple(elems) => Value::unknown(Type::tuple(vec![Type::Dynamic; elems.len()])),
        _ => Value::dynamic(),
    }
}

fn splat(val: &Value, each: &Traversal, range: &Range) -> Result<Value, Diagnostics> {
    if val.is_null() {
        return Err(Diagnostic::error(NULL_SPLAT_SUMMARY, NULL_SPLAT_DETAIL)
            .with_subject(range.clone())
            .into());
    }
    if !val.is_known() {
        return Ok(unknown_splat(&val.ty()));
    }

    let (elems, as_list) = match val {
        Value::List(_, elems) | Value::Set(_, elems) => (elems.clone(), true),
        Value::Tuple(elems) => (elems.clone(), false),
        other => (vec![other.clone()], false),
    };
    let mut diags = Diagnostics::new();
    let mut out = Vec::with_capacity(elems.len());
    for elem in &elems {
        let (v, d) = each.traverse_rel(elem);
        diags.append(d);
        out.push(v);
    }
    if diags.has_errors() {
        return Err(diags);
    }
    Ok(sequence_result(out, as_list))
}

/// A list when the source was a list or set and every result has the same
/// type, otherwise a tuple.
pub(crate) fn sequence_result(elems: Vec<Value>, as_list: bool) -> Value {
    if as_list {
        if elems.is_empty() {
            return Value::list_empty(Type::Dynamic);
        }
        if let Ok(list) = Value::list(elems.clone()) {
            return list;
        }
    }
    Value::tuple(elems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pos::Pos;
    use std::sync::Arc;

    fn r() -> Range {
        Range::new(Arc::from("t.hcl"), Pos::START, Pos::new(1, 2, 1))
    }

    fn attr(name: &str) -> Traverser {
        Traverser::Attr {
            name: name.to_string(),
            range: r(),
        }
    }

    #[test]
    fn attr_on_object_and_map() {
        let obj = Value::object([("a", Value::from(1))]);
        assert_eq!(get_attr(&obj, "a", &r()).unwrap(), Value::from(1));
        let err = get_attr(&obj, "b", &r()).unwrap_err();
        assert_eq!(err.summary, "Unsupported attribute");

        let map = Value::map([("k".to_string(), Value::from("v"))].into()).unwrap();
        assert_eq!(get_attr(&map, "k", &r()).unwrap(), Value::from("v"));
        assert_eq!(
            get_attr(&map, "x", &r()).unwrap_err().summary,
            "Missing map element"
        );
    }

    #[test]
    fn index_sequences() {
        let list = Value::list(vec![Value::from("a"), Value::from("b")]).unwrap();
        assert_eq!(index(&list, &Value::from(1), &r()).unwrap(), Value::from("b"));
        assert_eq!(index(&list, &Value::from("0"), &r()).unwrap(), Value::from("a"));
        assert!(index(&list, &Value::from(2), &r()).is_err());
        assert!(index(&list, &Value::from("x"), &r()).is_err());
    }

    #[test]
    fn index_unknowns_keep_element_type() {
        let list = Value::unknown(Type::list(Type::String));
        assert_eq!(
            index(&list, &Value::from(0), &r()).unwrap(),
            Value::unknown(Type::String)
        );
        let tuple = Value::tuple(vec![Value::from(true)]);
        assert_eq!(
            index(&tuple, &Value::unknown(Type::Number), &r()).unwrap(),
            Value::dynamic()
        );
    }

    #[test]
    fn null_receivers_fail() {
        assert!(index(&Value::null(Type::Dynamic), &Value::from(0), &r()).is_err());
        assert!(get_attr(&Value::null(Type::Dynamic), "a", &r()).is_err());
    }

    #[test]
    fn splat_step_maps_over_list() {
        let list = Value::list(vec![
            Value::object([("id", Value::from("a"))]),
            Value::object([("id", Value::from("b"))]),
        ])
        .unwrap();
        let step = Traverser::Splat {
            each: Traversal::new(vec![attr("id")]),
            range: r(),
        };
        let out = step.traverse(&list).unwrap();
        assert_eq!(
            out,
            Value::list(vec![Value::from("a"), Value::from("b")]).unwrap()
        );
    }

    #[test]
    fn abs_traversal_without_variables() {
        let t = Traversal::new(vec![Traverser::Root {
            name: "x".into(),
            range: r(),
        }]);
        let (_, diags) = t.traverse_abs(None);
        assert_eq!(diags[0].summary, "Variables not allowed");

        let ctx = EvalContext::new().with_variable("y", Value::from(1));
        let (_, diags) = t.traverse_abs(Some(&ctx));
        assert_eq!(diags[0].summary, "Variable not found");
    }
}
