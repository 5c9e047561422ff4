//! Free variables and functions referenced by a decode

use std::collections::HashSet;

use crate::ast::Expression;
use crate::body::{Body, BodyContent};
use crate::traversal::Traversal;

use super::spec::{Spec, implied_schema};

/// Traversals that decoding `body` with `spec` would read from the
/// evaluation context, in body order. Lets a caller build the context
/// lazily.
pub fn variables(body: &dyn Body, spec: &Spec) -> Vec<Traversal> {
    let mut out = Vec::new();
    walk(body, spec, &mut |expr| out.extend(expr.variables()));
    out
}

/// Names of the functions decoding `body` with `spec` would call.
pub fn functions(body: &dyn Body, spec: &Spec) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    walk(body, spec, &mut |expr| {
        for name in expr.function_names() {
            if seen.insert(name.clone()) {
                out.push(name);
            }
        }
    });
    out
}

/// Visit every attribute expression `spec` would evaluate in `body`.
fn walk(body: &dyn Body, spec: &Spec, visit: &mut dyn FnMut(&Expression)) {
    let (content, _, _) = body.partial_content(&implied_schema(spec));
    walk_content(spec, &content, visit);
}

fn walk_content(
    spec: &Spec,
    content: &BodyContent<'_>,
    visit: &mut dyn FnMut(&Expression),
) {
    match spec {
        Spec::Attr { name, .. } => {
            if let Some(attr) = content.attributes.get(name) {
                visit(attr.expr);
            }
        }
        Spec::Block { nested, .. }
        | Spec::BlockList { nested, .. }
        | Spec::BlockSet { nested, .. }
        | Spec::BlockMap { nested, .. } => {
            let block_type = spec.block_type().unwrap_or_default();
            for block in content.blocks.iter().filter(|b| b.block_type == block_type) {
                walk(block.body, nested, visit);
            }
        }
        Spec::BlockAttrs { block_type, .. } => {
            for block in content.blocks.iter().filter(|b| &b.block_type == block_type) {
                let (attrs, _) = block.body.just_attributes();
                for attr in attrs.values() {
                    visit(attr.expr);
                }
            }
        }
        // The transform expression runs in its own context.
        _ => {
            for child in spec.same_body_children() {
                walk_content(child, content, visit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_config;
    use crate::pos::Pos;
    use crate::value::Type;

    #[test]
    fn variables_and_functions_of_consumed_attributes() {
        let src = "\
a = var.x + upper(local.y)
ignored = other.z
svc \"web\" {
  port = max(var.port, 80)
}
env {
  HOME = env.home
}
";
        let (file, diags) = parse_config(src.as_bytes(), "t.hcl", Pos::START);
        assert!(diags.is_empty(), "{diags}");
        let spec = Spec::object([
            ("a", Spec::attr("a", Type::Number)),
            (
                "svc",
                Spec::block_map("svc", ["name"], Spec::attr("port", Type::Number)),
            ),
            ("env", Spec::block_attrs("env", Type::String)),
        ]);
        let vars: Vec<String> = variables(&file.body, &spec)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(vars, ["var.x", "local.y", "var.port", "env.home"]);
        assert_eq!(functions(&file.body, &spec), ["upper", "max"]);
    }
}
