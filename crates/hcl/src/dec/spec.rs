//! Declarative decoder specifications

use std::collections::HashSet;

use indexmap::IndexMap;
use thiserror::Error;

use crate::ast::Expression;
use crate::body::{AttributeSchema, BlockHeaderSchema, BodySchema};
use crate::eval::EvalContext;
use crate::value::{Type, Value};

/// Describes how a body maps onto a value.
#[derive(Debug, Clone)]
pub enum Spec {
    /// A constant; consumes nothing.
    Literal(Value),
    Attr {
        name: String,
        ty: Type,
        required: bool,
    },
    /// At most one block of a type; null when absent.
    Block {
        block_type: String,
        required: bool,
        nested: Box<Spec>,
    },
    BlockList {
        block_type: String,
        nested: Box<Spec>,
        min_items: usize,
        max_items: Option<usize>,
    },
    BlockSet {
        block_type: String,
        nested: Box<Spec>,
        min_items: usize,
        max_items: Option<usize>,
    },
    /// Blocks keyed by their labels, one map level per label name.
    BlockMap {
        block_type: String,
        label_names: Vec<String>,
        nested: Box<Spec>,
    },
    /// One block whose body is read as a map of attributes.
    BlockAttrs {
        block_type: String,
        element_type: Type,
        required: bool,
    },
    /// A label of the enclosing block.
    BlockLabel { index: usize, name: String },
    Object(IndexMap<String, Spec>),
    Tuple(Vec<Spec>),
    /// `primary` unless it decodes to null, then `fallback`.
    Default {
        primary: Box<Spec>,
        fallback: Box<Spec>,
    },
    /// Evaluates `expr` in `ctx` with the wrapped value bound to `var_name`.
    Transform {
        wrapped: Box<Spec>,
        expr: Expression,
        var_name: String,
        ctx: EvalContext,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpecError {
    #[error("block_map spec for {block_type:?} must have at least one label name")]
    NoLabels { block_type: String },

    #[error(
        "block_map spec for {block_type:?} needs a concrete element type, but its nested spec produces {ty}"
    )]
    DynamicBlockMap { block_type: String, ty: Type },

    #[error("spec for {block_type:?} blocks has min_items {min} greater than max_items {max}")]
    ItemBounds {
        block_type: String,
        min: usize,
        max: usize,
    },

    #[error("label name {name:?} is used more than once in spec for {block_type:?} blocks")]
    DuplicateLabel { block_type: String, name: String },
}

impl Spec {
    pub fn literal(value: impl Into<Value>) -> Self {
        Spec::Literal(value.into())
    }

    pub fn attr(name: impl Into<String>, ty: Type) -> Self {
        Spec::Attr {
            name: name.into(),
            ty,
            required: false,
        }
    }

    pub fn block(block_type: impl Into<String>, nested: Spec) -> Self {
        Spec::Block {
            block_type: block_type.into(),
            required: false,
            nested: Box::new(nested),
        }
    }

    pub fn block_list(block_type: impl Into<String>, nested: Spec) -> Self {
        Spec::BlockList {
            block_type: block_type.into(),
            nested: Box::new(nested),
            min_items: 0,
            max_items: None,
        }
    }

    pub fn block_set(block_type: impl Into<String>, nested: Spec) -> Self {
        Spec::BlockSet {
            block_type: block_type.into(),
            nested: Box::new(nested),
            min_items: 0,
            max_items: None,
        }
    }

    pub fn block_map<I, S>(block_type: impl Into<String>, label_names: I, nested: Spec) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Spec::BlockMap {
            block_type: block_type.into(),
            label_names: label_names.into_iter().map(Into::into).collect(),
            nested: Box::new(nested),
        }
    }

    pub fn block_attrs(block_type: impl Into<String>, element_type: Type) -> Self {
        Spec::BlockAttrs {
            block_type: block_type.into(),
            element_type,
            required: false,
        }
    }

    pub fn block_label(index: usize, name: impl Into<String>) -> Self {
        Spec::BlockLabel {
            index,
            name: name.into(),
        }
    }

    pub fn object<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Spec)>,
        S: Into<String>,
    {
        Spec::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn tuple(elems: Vec<Spec>) -> Self {
        Spec::Tuple(elems)
    }

    pub fn with_default(primary: Spec, fallback: Spec) -> Self {
        Spec::Default {
            primary: Box::new(primary),
            fallback: Box::new(fallback),
        }
    }

    pub fn transform(
        wrapped: Spec,
        expr: Expression,
        var_name: impl Into<String>,
        ctx: EvalContext,
    ) -> Self {
        Spec::Transform {
            wrapped: Box::new(wrapped),
            expr,
            var_name: var_name.into(),
            ctx,
        }
    }

    /// Marks an attribute, block or block-attributes spec as required.
    /// Other variants are returned unchanged.
    pub fn required(mut self) -> Self {
        match &mut self {
            Spec::Attr { required, .. }
            | Spec::Block { required, .. }
            | Spec::BlockAttrs { required, .. } => *required = true,
            _ => {}
        }
        self
    }

    pub fn with_min_items(mut self, n: usize) -> Self {
        if let Spec::BlockList { min_items, .. } | Spec::BlockSet { min_items, .. } = &mut self {
            *min_items = n;
        }
        self
    }

    pub fn with_max_items(mut self, n: usize) -> Self {
        if let Spec::BlockList { max_items, .. } | Spec::BlockSet { max_items, .. } = &mut self {
            *max_items = Some(n);
        }
        self
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Spec::Literal(_) => "literal",
            Spec::Attr { .. } => "attr",
            Spec::Block { .. } => "block",
            Spec::BlockList { .. } => "block_list",
            Spec::BlockSet { .. } => "block_set",
            Spec::BlockMap { .. } => "block_map",
            Spec::BlockAttrs { .. } => "block_attrs",
            Spec::BlockLabel { .. } => "block_label",
            Spec::Object(_) => "object",
            Spec::Tuple(_) => "tuple",
            Spec::Default { .. } => "default",
            Spec::Transform { .. } => "transform",
        }
    }

    /// The block type this spec consumes, if it consumes blocks.
    pub(crate) fn block_type(&self) -> Option<&str> {
        match self {
            Spec::Block { block_type, .. }
            | Spec::BlockList { block_type, .. }
            | Spec::BlockSet { block_type, .. }
            | Spec::BlockMap { block_type, .. }
            | Spec::BlockAttrs { block_type, .. } => Some(block_type),
            _ => None,
        }
    }

    /// Specs evaluated against the same body as this one.
    pub(crate) fn same_body_children(&self) -> Vec<&Spec> {
        match self {
            Spec::Object(fields) => fields.values().collect(),
            Spec::Tuple(elems) => elems.iter().collect(),
            Spec::Default { primary, fallback } => vec![&**primary, &**fallback],
            Spec::Transform { wrapped, .. } => vec![&**wrapped],
            _ => Vec::new(),
        }
    }

    /// Checks the spec tree for configurations that can never decode.
    pub fn validate(&self) -> Result<(), SpecError> {
        match self {
            Spec::BlockList {
                block_type,
                nested,
                min_items,
                max_items,
            }
            | Spec::BlockSet {
                block_type,
                nested,
                min_items,
                max_items,
            } => {
                if let Some(max) = *max_items
                    && *min_items > max
                {
                    return Err(SpecError::ItemBounds {
                        block_type: block_type.clone(),
                        min: *min_items,
                        max,
                    });
                }
                check_labels(block_type, &[], nested)?;
                nested.validate()
            }
            Spec::BlockMap {
                block_type,
                label_names,
                nested,
            } => {
                if label_names.is_empty() {
                    return Err(SpecError::NoLabels {
                        block_type: block_type.clone(),
                    });
                }
                let ty = implied_type(nested);
                if ty.has_dynamic_types() {
                    return Err(SpecError::DynamicBlockMap {
                        block_type: block_type.clone(),
                        ty,
                    });
                }
                check_labels(block_type, label_names, nested)?;
                nested.validate()
            }
            Spec::Block {
                block_type, nested, ..
            } => {
                check_labels(block_type, &[], nested)?;
                nested.validate()
            }
            _ => self
                .same_body_children()
                .into_iter()
                .try_for_each(Spec::validate),
        }
    }
}

fn check_labels(block_type: &str, leading: &[String], nested: &Spec) -> Result<(), SpecError> {
    let mut seen = HashSet::new();
    for name in leading.iter().chain(&label_names(nested)) {
        if !seen.insert(name.as_str()) {
            return Err(SpecError::DuplicateLabel {
                block_type: block_type.to_string(),
                name: name.clone(),
            });
        }
    }
    Ok(())
}

/// Names of the block labels a nested spec reads, ordered by index.
pub(crate) fn label_names(nested: &Spec) -> Vec<String> {
    let mut found = Vec::new();
    collect_labels(nested, &mut found);
    found.sort_by_key(|(index, _)| *index);
    found.dedup_by_key(|(index, _)| *index);
    found.into_iter().map(|(_, name)| name).collect()
}

fn collect_labels(spec: &Spec, out: &mut Vec<(usize, String)>) {
    if let Spec::BlockLabel { index, name } = spec {
        out.push((*index, name.clone()));
    }
    for child in spec.same_body_children() {
        collect_labels(child, out);
    }
}

/// The schema a body must satisfy for `spec` to decode it.
pub fn implied_schema(spec: &Spec) -> BodySchema {
    let mut schema = BodySchema::new();
    add_to_schema(spec, &mut schema);
    schema
}

fn add_to_schema(spec: &Spec, schema: &mut BodySchema) {
    match spec {
        Spec::Attr { name, required, .. } => {
            match schema.attributes.iter_mut().find(|a| &a.name == name) {
                Some(existing) => existing.required |= *required,
                None => schema.attributes.push(AttributeSchema {
                    name: name.clone(),
                    required: *required,
                }),
            }
        }
        Spec::Block {
            block_type, nested, ..
        }
        | Spec::BlockList {
            block_type, nested, ..
        }
        | Spec::BlockSet {
            block_type, nested, ..
        } => add_block(schema, block_type, label_names(nested)),
        Spec::BlockMap {
            block_type,
            label_names: names,
            nested,
        } => {
            let mut labels = names.clone();
            labels.extend(label_names(nested));
            add_block(schema, block_type, labels);
        }
        Spec::BlockAttrs { block_type, .. } => add_block(schema, block_type, Vec::new()),
        Spec::Literal(_) | Spec::BlockLabel { .. } => {}
        Spec::Object(_) | Spec::Tuple(_) | Spec::Default { .. } | Spec::Transform { .. } => {
            for child in spec.same_body_children() {
                add_to_schema(child, schema);
            }
        }
    }
}

fn add_block(schema: &mut BodySchema, block_type: &str, label_names: Vec<String>) {
    if schema.block(block_type).is_none() {
        schema.blocks.push(BlockHeaderSchema {
            block_type: block_type.to_string(),
            label_names,
        });
    }
}

/// The type of value `spec` decodes to, as far as it can be known without
/// a body.
pub fn implied_type(spec: &Spec) -> Type {
    match spec {
        Spec::Literal(v) => v.ty(),
        Spec::Attr { ty, .. } => ty.clone(),
        Spec::Block { nested, .. } => implied_type(nested),
        Spec::BlockList { nested, .. } => Type::list(implied_type(nested)),
        Spec::BlockSet { nested, .. } => Type::set(implied_type(nested)),
        Spec::BlockMap {
            label_names,
            nested,
            ..
        } => label_names
            .iter()
            .fold(implied_type(nested), |ty, _| Type::map(ty)),
        Spec::BlockAttrs { element_type, .. } => Type::map(element_type.clone()),
        Spec::BlockLabel { .. } => Type::String,
        Spec::Object(fields) => {
            Type::object(fields.iter().map(|(k, v)| (k.clone(), implied_type(v))))
        }
        Spec::Tuple(elems) => Type::tuple(elems.iter().map(implied_type).collect()),
        Spec::Default { primary, .. } => implied_type(primary),
        Spec::Transform { .. } => Type::Dynamic,
    }
}
