//! Type system shared by values, functions and decoder specs

use std::collections::{BTreeMap, BTreeSet};

/// The type of a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    Bool,
    Number,
    String,
    List(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>),
    Object(ObjectType),
    Tuple(Vec<Type>),
    /// Placeholder for "any type", resolved once a value is known.
    Dynamic,
}

/// Attribute types of an object, plus the attributes that may be absent
/// when converting a less-constrained value into this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectType {
    attrs: BTreeMap<String, Type>,
    optional: BTreeSet<String>,
}

impl ObjectType {
    pub fn new(attrs: BTreeMap<String, Type>) -> Self {
        Self {
            attrs,
            optional: BTreeSet::new(),
        }
    }

    /// Mark attributes as optional. Names that are not attributes are ignored.
    pub fn with_optional<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if self.attrs.contains_key(&name) {
                self.optional.insert(name);
            }
        }
        self
    }

    pub fn attributes(&self) -> &BTreeMap<String, Type> {
        &self.attrs
    }

    pub fn attribute(&self, name: &str) -> Option<&Type> {
        self.attrs.get(name)
    }

    pub fn is_optional(&self, name: &str) -> bool {
        self.optional.contains(name)
    }

    pub fn optional_attributes(&self) -> &BTreeSet<String> {
        &self.optional
    }
}

impl Type {
    pub fn list(elem: Type) -> Type {
        Type::List(Box::new(elem))
    }

    pub fn set(elem: Type) -> Type {
        Type::Set(Box::new(elem))
    }

    pub fn map(elem: Type) -> Type {
        Type::Map(Box::new(elem))
    }

    pub fn tuple(elems: Vec<Type>) -> Type {
        Type::Tuple(elems)
    }

    pub fn object<I, S>(attrs: I) -> Type
    where
        I: IntoIterator<Item = (S, Type)>,
        S: Into<String>,
    {
        Type::Object(ObjectType::new(
            attrs.into_iter().map(|(k, t)| (k.into(), t)).collect(),
        ))
    }

    pub fn empty_object() -> Type {
        Type::Object(ObjectType::default())
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Bool | Type::Number | Type::String)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Type::List(_))
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Type::Set(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Type::Map(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Type::Object(_))
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, Type::Tuple(_))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Type::Dynamic)
    }

    /// List, set or map.
    pub fn is_collection(&self) -> bool {
        matches!(self, Type::List(_) | Type::Set(_) | Type::Map(_))
    }

    /// Types whose values can be iterated by `for` expressions.
    pub fn is_iterable(&self) -> bool {
        self.is_collection() || self.is_object() || self.is_tuple()
    }

    /// Element type of a list, set or map.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::List(t) | Type::Set(t) | Type::Map(t) => Some(t),
            _ => None,
        }
    }

    pub fn attribute_type(&self, name: &str) -> Option<&Type> {
        match self {
            Type::Object(obj) => obj.attribute(name),
            _ => None,
        }
    }

    pub fn tuple_element_types(&self) -> Option<&[Type]> {
        match self {
            Type::Tuple(elems) => Some(elems),
            _ => None,
        }
    }

    /// True when `Dynamic` appears anywhere within the type.
    pub fn has_dynamic_types(&self) -> bool {
        match self {
            Type::Dynamic => true,
            Type::Bool | Type::Number | Type::String => false,
            Type::List(t) | Type::Set(t) | Type::Map(t) => t.has_dynamic_types(),
            Type::Object(obj) => obj.attrs.values().any(Type::has_dynamic_types),
            Type::Tuple(elems) => elems.iter().any(Type::has_dynamic_types),
        }
    }
}
