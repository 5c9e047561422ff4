//! Decoding bodies into values

use std::collections::{BTreeMap, HashMap};

use crate::body::{Body, BodyContent, ContentAttribute, ContentBlock};
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::eval::EvalContext;
use crate::pos::Range;
use crate::value::{Type, Value, convert, unify};

use super::spec::{Spec, SpecError, implied_schema, implied_type};

/// Limits applied while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Deepest block nesting decoded before giving up.
    pub max_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Decode `body` into a single value shaped by `spec`.
pub fn decode(body: &dyn Body, spec: &Spec, ctx: Option<&EvalContext>) -> (Value, Diagnostics) {
    decode_with_options(body, spec, ctx, &DecodeOptions::default())
}

pub fn decode_with_options(
    body: &dyn Body,
    spec: &Spec,
    ctx: Option<&EvalContext>,
    options: &DecodeOptions,
) -> (Value, Diagnostics) {
    if let Err(e) = spec.validate() {
        return (Value::dynamic(), invalid_spec(body, &e));
    }
    Decoder::new(ctx, options).decode_body(spec, body, &[], 0)
}

/// Like [`decode`], but items `spec` does not consume are left in the
/// returned body instead of being reported.
pub fn partial_decode<'a>(
    body: &'a dyn Body,
    spec: &Spec,
    ctx: Option<&EvalContext>,
) -> (Value, Box<dyn Body + 'a>, Diagnostics) {
    if let Err(e) = spec.validate() {
        return (Value::dynamic(), Box::new(body), invalid_spec(body, &e));
    }
    let schema = implied_schema(spec);
    log::debug!("partially decoding {} spec with schema {schema:?}", spec.kind());
    let (content, rest, mut diags) = body.partial_content(&schema);
    let options = DecodeOptions::default();
    let (val, more) = Decoder::new(ctx, &options).decode_content(spec, &content, &[], 0);
    diags.append(more);
    (val, rest, diags)
}

/// Where in `body` the item `spec` reads is defined: the expression of an
/// attribute or the header of the first matching block. Falls back to the
/// body's missing-item range.
pub fn source_range(body: &dyn Body, spec: &Spec) -> Range {
    let (content, _, _) = body.partial_content(&implied_schema(spec));
    find_range(spec, &content).unwrap_or_else(|| content.missing_item_range.clone())
}

fn find_range(spec: &Spec, content: &BodyContent<'_>) -> Option<Range> {
    if let Spec::Attr { name, .. } = spec {
        return content.attributes.get(name).map(|a| a.expr.range.clone());
    }
    if let Some(block_type) = spec.block_type() {
        return content
            .blocks
            .iter()
            .find(|b| b.block_type == block_type)
            .map(|b| b.def_range.clone());
    }
    spec.same_body_children()
        .into_iter()
        .find_map(|child| find_range(child, content))
}

fn invalid_spec(body: &dyn Body, err: &SpecError) -> Diagnostics {
    Diagnostic::error("Invalid decoder specification", format!("{err}."))
        .with_subject(body.missing_item_range())
        .into()
}

struct Decoder<'c> {
    ctx: Option<&'c EvalContext>,
    max_depth: usize,
}

impl<'c> Decoder<'c> {
    fn new(ctx: Option<&'c EvalContext>, options: &DecodeOptions) -> Self {
        Self {
            ctx,
            max_depth: options.max_depth,
        }
    }

    fn decode_body(
        &self,
        spec: &Spec,
        body: &dyn Body,
        labels: &[String],
        depth: usize,
    ) -> (Value, Diagnostics) {
        if depth > self.max_depth {
            let diag = Diagnostic::error(
                "Maximum decode depth exceeded",
                format!("Blocks are nested more than {} levels deep.", self.max_depth),
            )
            .with_subject(body.missing_item_range());
            return (Value::unknown(implied_type(spec)), diag.into());
        }
        let schema = implied_schema(spec);
        log::debug!("decoding {} spec with schema {schema:?}", spec.kind());
        let (content, mut diags) = body.content(&schema);
        let (val, more) = self.decode_content(spec, &content, labels, depth);
        diags.append(more);
        (val, diags)
    }

    fn decode_content(
        &self,
        spec: &Spec,
        content: &BodyContent<'_>,
        labels: &[String],
        depth: usize,
    ) -> (Value, Diagnostics) {
        log::trace!("decoding {} spec", spec.kind());
        match spec {
            Spec::Literal(v) => (v.clone(), Diagnostics::new()),
            Spec::Attr { name, ty, .. } => match content.attributes.get(name) {
                Some(attr) => self.attribute(attr, ty),
                // Required attributes were already reported by the body.
                None => (Value::null(ty.clone()), Diagnostics::new()),
            },
            Spec::Block {
                block_type,
                required,
                nested,
            } => {
                let (block, mut diags) = single_block(content, block_type, *required);
                let Some(block) = block else {
                    return (Value::null(implied_type(nested)), diags);
                };
                let (val, more) = self.decode_body(nested, block.body, &block.labels, depth + 1);
                diags.append(more);
                (val, diags)
            }
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
                let set = matches!(spec, Spec::BlockSet { .. });
                let blocks: Vec<&ContentBlock<'_>> = blocks_of_type(content, block_type).collect();
                let mut diags = item_count(content, &blocks, block_type, *min_items, *max_items);
                let mut elems = Vec::with_capacity(blocks.len());
                for block in blocks {
                    let (val, more) =
                        self.decode_body(nested, block.body, &block.labels, depth + 1);
                    diags.append(more);
                    elems.push(val);
                }
                (sequence(elems, &implied_type(nested), set), diags)
            }
            Spec::BlockMap {
                block_type,
                label_names,
                nested,
            } => self.block_map(content, block_type, label_names, nested, depth),
            Spec::BlockAttrs {
                block_type,
                element_type,
                required,
            } => {
                let (block, mut diags) = single_block(content, block_type, *required);
                let Some(block) = block else {
                    return (Value::null(Type::map(element_type.clone())), diags);
                };
                let (attrs, more) = block.body.just_attributes();
                diags.append(more);
                let mut entries = BTreeMap::new();
                for (name, attr) in &attrs {
                    let (val, more) = self.attribute(attr, element_type);
                    diags.append(more);
                    entries.insert(name.clone(), val);
                }
                (map_value(entries, element_type), diags)
            }
            Spec::BlockLabel { index, .. } => {
                let val = labels
                    .get(*index)
                    .map_or(Value::null(Type::String), |l| Value::string(l.clone()));
                (val, Diagnostics::new())
            }
            Spec::Object(fields) => {
                let mut diags = Diagnostics::new();
                let mut attrs = BTreeMap::new();
                for (name, field) in fields {
                    let (val, more) = self.decode_content(field, content, labels, depth);
                    diags.append(more);
                    attrs.insert(name.clone(), val);
                }
                (Value::Object(attrs), diags)
            }
            Spec::Tuple(elems) => {
                let mut diags = Diagnostics::new();
                let mut vals = Vec::with_capacity(elems.len());
                for elem in elems {
                    let (val, more) = self.decode_content(elem, content, labels, depth);
                    diags.append(more);
                    vals.push(val);
                }
                (Value::tuple(vals), diags)
            }
            Spec::Default { primary, fallback } => {
                let (val, mut diags) = self.decode_content(primary, content, labels, depth);
                if !val.is_null() {
                    return (val, diags);
                }
                let (val, more) = self.decode_content(fallback, content, labels, depth);
                diags.append(more);
                (val, diags)
            }
            Spec::Transform {
                wrapped,
                expr,
                var_name,
                ctx,
            } => {
                let (wrapped_val, mut diags) = self.decode_content(wrapped, content, labels, depth);
                let child = ctx.new_child().with_variable(var_name.clone(), wrapped_val);
                let (val, more) = expr.value(Some(&child));
                diags.append(more);
                (val, diags)
            }
        }
    }

    /// Evaluate an attribute and convert it to `ty`.
    fn attribute(&self, attr: &ContentAttribute<'_>, ty: &Type) -> (Value, Diagnostics) {
        let (val, diags) = attr.expr.value(self.ctx);
        let mut diags = diags.in_context(&attr.range);
        match convert(&val, ty) {
            Ok(val) => (val, diags),
            Err(e) => {
                diags.push(
                    Diagnostic::error(
                        "Incorrect attribute value type",
                        format!("Inappropriate value for attribute {:?}: {e}.", attr.name),
                    )
                    .with_subject(attr.expr.range.clone())
                    .with_context(attr.range.clone())
                    .with_expression(attr.expr)
                    .with_eval_context(self.ctx),
                );
                (Value::unknown(ty.clone()), diags)
            }
        }
    }

    fn block_map(
        &self,
        content: &BodyContent<'_>,
        block_type: &str,
        label_names: &[String],
        nested: &Spec,
        depth: usize,
    ) -> (Value, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut root = BTreeMap::new();
        let mut seen: HashMap<&[String], &Range> = HashMap::new();
        let n = label_names.len();
        for block in blocks_of_type(content, block_type) {
            // Wrong label counts were reported when the content was read.
            if block.labels.len() < n {
                continue;
            }
            let (keys, rest) = block.labels.split_at(n);
            if let Some(prev) = seen.get(keys) {
                diags.push(
                    Diagnostic::error(
                        format!("Duplicate {block_type} block"),
                        format!(
                            "A {block_type} block for {} was already defined at {prev}.",
                            keys.join(".")
                        ),
                    )
                    .with_subject(block.def_range.clone()),
                );
                continue;
            }
            seen.insert(keys, &block.def_range);
            let (val, more) = self.decode_body(nested, block.body, rest, depth + 1);
            diags.append(more);
            insert_leaf(&mut root, keys, val);
        }
        let ty = label_names
            .iter()
            .fold(implied_type(nested), |ty, _| Type::map(ty));
        (node_value(root, &ty), diags)
    }
}

fn blocks_of_type<'c, 'a>(
    content: &'c BodyContent<'a>,
    block_type: &'c str,
) -> impl Iterator<Item = &'c ContentBlock<'a>> {
    content.blocks.iter().filter(move |b| b.block_type == block_type)
}

/// The only block of a type, reporting duplicates and a missing required
/// block.
fn single_block<'c, 'a>(
    content: &'c BodyContent<'a>,
    block_type: &'c str,
    required: bool,
) -> (Option<&'c ContentBlock<'a>>, Diagnostics) {
    let mut diags = Diagnostics::new();
    let mut found: Option<&ContentBlock<'a>> = None;
    for block in blocks_of_type(content, block_type) {
        match found {
            Some(first) => diags.push(
                Diagnostic::error(
                    format!("Duplicate {block_type} block"),
                    format!(
                        "Only one block of type {block_type:?} is allowed. Previous definition was at {}.",
                        first.def_range
                    ),
                )
                .with_subject(block.def_range.clone()),
            ),
            None => found = Some(block),
        }
    }
    if found.is_none() && required {
        diags.push(
            Diagnostic::error(
                format!("Missing {block_type} block"),
                format!("A block of type {block_type:?} is required here."),
            )
            .with_subject(content.missing_item_range.clone()),
        );
    }
    (found, diags)
}

fn item_count(
    content: &BodyContent<'_>,
    blocks: &[&ContentBlock<'_>],
    block_type: &str,
    min: usize,
    max: Option<usize>,
) -> Diagnostics {
    let mut diags = Diagnostics::new();
    if blocks.len() < min {
        diags.push(
            Diagnostic::error(
                format!("Insufficient {block_type} blocks"),
                format!("At least {min} {block_type:?} blocks are required."),
            )
            .with_subject(content.missing_item_range.clone()),
        );
    }
    if let Some(max) = max
        && let Some(extra) = blocks.get(max)
    {
        diags.push(
            Diagnostic::error(
                format!("Too many {block_type} blocks"),
                format!("No more than {max} {block_type:?} blocks are allowed."),
            )
            .with_subject(extra.def_range.clone()),
        );
    }
    diags
}

/// Values under a common element type, if they have one.
fn unified(vals: &[Value], elem: &Type) -> Option<Vec<Value>> {
    let ty = if elem.has_dynamic_types() {
        let types: Vec<Type> = vals.iter().map(Value::ty).collect();
        unify(&types)?
    } else {
        elem.clone()
    };
    vals.iter().map(|v| convert(v, &ty).ok()).collect()
}

/// A list or set of decoded block values. Values with no common type form
/// a tuple instead.
fn sequence(elems: Vec<Value>, elem: &Type, set: bool) -> Value {
    if elems.is_empty() {
        return if set {
            Value::set_empty(elem.clone())
        } else {
            Value::list_empty(elem.clone())
        };
    }
    let built = unified(&elems, elem).map(|vals| if set { Value::set(vals) } else { Value::list(vals) });
    match built {
        Some(Ok(val)) => val,
        _ => Value::tuple(elems),
    }
}

/// A map of decoded values; an object when they have no common type.
fn map_value(entries: BTreeMap<String, Value>, elem: &Type) -> Value {
    if entries.is_empty() {
        return Value::map_empty(elem.clone());
    }
    let vals: Vec<Value> = entries.values().cloned().collect();
    let built = unified(&vals, elem).map(|vals| {
        Value::map(entries.keys().cloned().zip(vals).collect())
    });
    match built {
        Some(Ok(val)) => val,
        _ => Value::Object(entries),
    }
}

enum Node {
    Leaf(Value),
    Branch(BTreeMap<String, Node>),
}

fn insert_leaf(map: &mut BTreeMap<String, Node>, path: &[String], val: Value) {
    match path {
        [] => {}
        [last] => {
            map.insert(last.clone(), Node::Leaf(val));
        }
        [first, rest @ ..] => {
            let entry = map
                .entry(first.clone())
                .or_insert_with(|| Node::Branch(BTreeMap::new()));
            if let Node::Branch(inner) = entry {
                insert_leaf(inner, rest, val);
            }
        }
    }
}

/// `ty` is the map type of this level.
fn node_value(map: BTreeMap<String, Node>, ty: &Type) -> Value {
    let elem = ty.element_type().cloned().unwrap_or(Type::Dynamic);
    let entries = map
        .into_iter()
        .map(|(key, node)| {
            let val = match node {
                Node::Leaf(val) => val,
                Node::Branch(inner) => node_value(inner, &elem),
            };
            (key, val)
        })
        .collect();
    map_value(entries, &elem)
}
