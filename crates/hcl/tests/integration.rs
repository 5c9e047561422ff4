//! Black-box integration tests for the HCL engine
//!
//! These tests exercise the full parse → eval → decode pipeline.

use std::collections::BTreeMap;

use hcl::dec::{self, implied_schema};
use hcl::static_expr::{abs_traversal_for_expr, expr_list};
use hcl::{
    Body, EvalContext, FunctionSpec, Parameter, Pos, Spec, Type, Value, decode, merge_bodies,
    parse_config, parse_expression, parse_template,
};

fn parse_file(src: &str, filename: &str) -> hcl::ast::File {
    let (file, diags) = parse_config(src.as_bytes(), filename, Pos::START);
    assert!(diags.is_empty(), "{diags}");
    file
}

fn eval(src: &str, ctx: Option<&EvalContext>) -> (Value, hcl::Diagnostics) {
    let (expr, diags) = parse_expression(src.as_bytes(), "expr.hcl", Pos::START);
    assert!(diags.is_empty(), "{diags}");
    expr.value(ctx)
}

fn summaries(diags: &hcl::Diagnostics) -> Vec<&str> {
    diags.iter().map(|d| d.summary.as_str()).collect()
}

// ============ Scenarios ============

#[test]
fn decode_single_number_attribute() {
    let file = parse_file("a = 1\n", "a.hcl");
    let (val, diags) = decode(&file.body, &Spec::attr("a", Type::Number), None);
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(val, Value::from(1));
}

#[test]
fn json_style_object_expression() {
    let (val, diags) = eval(r#"{"foo":true,"bar":false}"#, Some(&EvalContext::new()));
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(
        val,
        Value::object([("foo", Value::from(true)), ("bar", Value::from(false))])
    );
}

#[test]
fn object_for_expression_with_function() {
    let ctx = EvalContext::new().with_function("upper", hcl::stdlib::upper());
    let (val, diags) = eval(
        r#"{for k, v in {hello: "world"}: upper(k) => upper(v) if k == "hello"}"#,
        Some(&ctx),
    );
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(val, Value::object([("HELLO", Value::from("WORLD"))]));
}

#[test]
fn resource_block_with_labels_and_references() {
    let src = r#"
resource "happycloud_instance" "test" {
  instance_type = "z3.weedy"
  image_id      = var.image_id
  depends_on    = [ happycloud_security_group.public ]
}
"#;
    let file = parse_file(src, "main.hcl");
    let ctx = EvalContext::new().with_variable(
        "var",
        Value::object([("image_id", Value::from("image-1234"))]),
    );

    let schema = hcl::BodySchema::new().with_block("resource", ["type", "name"]);
    let (content, diags) = file.body.content(&schema);
    assert!(diags.is_empty(), "{diags}");
    let block = &content.blocks[0];
    assert_eq!(block.labels, ["happycloud_instance", "test"]);

    let spec = Spec::object([
        ("instance_type", Spec::attr("instance_type", Type::String)),
        ("image_id", Spec::attr("image_id", Type::String)),
    ]);
    let (val, rest, diags) = dec::partial_decode(block.body, &spec, Some(&ctx));
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(
        val,
        Value::object([
            ("instance_type", Value::from("z3.weedy")),
            ("image_id", Value::from("image-1234")),
        ])
    );

    let (attrs, diags) = rest.just_attributes();
    assert!(diags.is_empty(), "{diags}");
    let items = expr_list(attrs["depends_on"].expr).unwrap();
    let traversal = abs_traversal_for_expr(items[0]).unwrap();
    assert_eq!(traversal.to_string(), "happycloud_security_group.public");
}

#[test]
fn indented_heredoc_strips_closing_indent() {
    let src = "<<-EOT\n    Foo\n  Bar\n    Baz\n  EOT\n";
    let (val, diags) = eval(src, None);
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(val, Value::from("  Foo\nBar\n  Baz\n"));
}

#[test]
fn conditional_with_unknown_dynamic_arm() {
    let ctx = EvalContext::new().with_variable("var", Value::dynamic());
    let (val, diags) = eval("true ? var : null", Some(&ctx));
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(val, Value::dynamic());
}

// ============ Decoding ============

#[test]
fn service_config_end_to_end() {
    let src = r#"
region = "eu-${zone}"

service "web" {
  port     = 8080
  replicas = length(hosts)
  tags     = ["a", "b"]
}

service "worker" {
  port = 9000
}

env {
  LOG_LEVEL = "debug"
}
"#;
    let file = parse_file(src, "app.hcl");
    let ctx = EvalContext::new()
        .with_stdlib()
        .with_variable("zone", Value::from("west"))
        .with_variable(
            "hosts",
            Value::list(vec![Value::from("h1"), Value::from("h2")]).unwrap(),
        );

    let service = Spec::object([
        ("port", Spec::attr("port", Type::Number).required()),
        (
            "replicas",
            Spec::with_default(Spec::attr("replicas", Type::Number), Spec::literal(1)),
        ),
        ("tags", Spec::attr("tags", Type::list(Type::String))),
    ]);
    let spec = Spec::object([
        ("region", Spec::attr("region", Type::String).required()),
        ("services", Spec::block_map("service", ["name"], service)),
        ("env", Spec::block_attrs("env", Type::String)),
    ]);

    let (val, diags) = decode(&file.body, &spec, Some(&ctx));
    assert!(diags.is_empty(), "{diags}");

    let top = val.as_entries().unwrap();
    assert_eq!(top["region"], Value::from("eu-west"));
    let services = top["services"].as_entries().unwrap();
    let web = services["web"].as_entries().unwrap();
    assert_eq!(web["replicas"], Value::from(2));
    let worker = services["worker"].as_entries().unwrap();
    assert_eq!(worker["replicas"], Value::from(1));
    assert_eq!(worker["tags"], Value::null(Type::list(Type::String)));
    assert_eq!(
        top["env"],
        Value::map(BTreeMap::from([("LOG_LEVEL".to_string(), Value::from("debug"))])).unwrap()
    );
}

#[test]
fn schema_errors_are_collected_together() {
    let src = "prot = 80\nlistener {}\nlistener {}\n";
    let file = parse_file(src, "app.hcl");
    let spec = Spec::object([
        ("port", Spec::attr("port", Type::Number).required()),
        ("listener", Spec::block("listener", Spec::literal(true))),
    ]);
    let (_, diags) = decode(&file.body, &spec, None);
    let found = summaries(&diags);
    assert!(found.contains(&"Unsupported argument"), "{found:?}");
    assert!(found.contains(&"Missing required argument"), "{found:?}");
    assert!(found.contains(&"Duplicate listener block"), "{found:?}");

    let unsupported = diags.iter().find(|d| d.summary == "Unsupported argument").unwrap();
    assert!(unsupported.detail.contains("Did you mean \"port\"?"), "{}", unsupported.detail);
}

#[test]
fn decode_across_merged_files() {
    let base = parse_file("name = \"app\"\nlistener { port = 80 }\n", "base.hcl");
    let over = parse_file("debug = true\nlistener { port = 443 }\n", "override.hcl");
    let merged = merge_bodies(&[&base.body, &over.body]);

    let spec = Spec::object([
        ("name", Spec::attr("name", Type::String).required()),
        ("debug", Spec::attr("debug", Type::Bool)),
        (
            "ports",
            Spec::block_list("listener", Spec::attr("port", Type::Number)),
        ),
    ]);
    let (val, diags) = decode(&merged, &spec, None);
    assert!(diags.is_empty(), "{diags}");
    let entries = val.as_entries().unwrap();
    assert_eq!(entries["debug"], Value::from(true));
    assert_eq!(
        entries["ports"],
        Value::list(vec![Value::from(80), Value::from(443)]).unwrap()
    );
}

#[test]
fn variables_drive_lazy_context() {
    let file = parse_file("greeting = \"hi ${user.name}\"\ncount = max(limits...)\n", "a.hcl");
    let spec = Spec::object([
        ("greeting", Spec::attr("greeting", Type::String)),
        ("count", Spec::attr("count", Type::Number)),
    ]);

    let roots: Vec<String> = dec::variables(&file.body, &spec)
        .iter()
        .filter_map(|t| t.root_name().map(str::to_string))
        .collect();
    assert_eq!(roots, ["user", "limits"]);
    assert_eq!(dec::functions(&file.body, &spec), ["max"]);

    let ctx = EvalContext::new()
        .with_function("max", hcl::stdlib::max())
        .with_variable("user", Value::object([("name", Value::from("ann"))]))
        .with_variable("limits", Value::tuple(vec![Value::from(3), Value::from(9)]));
    let (val, diags) = decode(&file.body, &spec, Some(&ctx));
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(
        val,
        Value::object([("greeting", Value::from("hi ann")), ("count", Value::from(9))])
    );
}

#[test]
fn implied_schema_matches_consumed_items() {
    let spec = Spec::object([
        ("a", Spec::attr("a", Type::String)),
        ("b", Spec::block_list("b", Spec::block_label(0, "name"))),
    ]);
    let schema = implied_schema(&spec);
    assert_eq!(schema.attributes.len(), 1);
    assert_eq!(schema.blocks[0].label_names, ["name"]);
}

// ============ Evaluation ============

#[test]
fn unknowns_flow_through_operations() {
    let ctx = EvalContext::new().with_variable("n", Value::unknown(Type::Number));
    let (val, diags) = eval("n * 2 + 1", Some(&ctx));
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(val, Value::unknown(Type::Number));

    let (val, _) = eval("n > 1 ? \"big\" : \"small\"", Some(&ctx));
    assert_eq!(val, Value::unknown(Type::String));
}

#[test]
fn splat_over_list_of_objects() {
    let ctx = EvalContext::new().with_variable(
        "hosts",
        Value::tuple(vec![
            Value::object([("name", Value::from("a"))]),
            Value::object([("name", Value::from("b"))]),
        ]),
    );
    let (val, diags) = eval("hosts[*].name", Some(&ctx));
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(val, Value::tuple(vec![Value::from("a"), Value::from("b")]));
}

#[test]
fn template_directives() {
    let ctx = EvalContext::new().with_variable(
        "items",
        Value::list(vec![Value::from("x"), Value::from("y")]).unwrap(),
    );
    let (expr, diags) = parse_template(
        b"%{ for i, v in items }${i}=${v}%{ if i == 0 }, %{ endif }%{ endfor }",
        "t.tmpl",
        Pos::START,
    );
    assert!(diags.is_empty(), "{diags}");
    let (val, diags) = expr.value(Some(&ctx));
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(val, Value::from("0=x, 1=y"));
}

#[test]
fn custom_function_errors_point_at_arguments() {
    let half = FunctionSpec::new(|args, _| {
        let n = args[0].as_number().and_then(|n| n.to_i64()).unwrap_or_default();
        if n % 2 != 0 {
            return Err(hcl::FunctionError::arg(0, "must be even"));
        }
        Ok(Value::from(n / 2))
    })
    .param(Parameter::new("n", Type::Number))
    .returns(Type::Number)
    .build();
    let ctx = EvalContext::new().with_function("half", half);

    let (val, diags) = eval("half(10)", Some(&ctx));
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(val, Value::from(5));

    let (_, diags) = eval("half(3)", Some(&ctx));
    assert_eq!(summaries(&diags), ["Invalid function argument"]);
    let subject = diags[0].subject.as_ref().unwrap();
    assert_eq!((subject.start.column, subject.end.column), (6, 7));
}

#[test]
fn evaluation_diagnostics_keep_their_expression() {
    let (_, diags) = eval("1 / 0", None);
    assert_eq!(summaries(&diags), ["Operation failed"]);
    assert!(diags[0].expression.is_some());
}

// ============ Parsing ============

#[test]
fn syntax_errors_leave_a_usable_tree() {
    let src = "a = 1\nb = 2 +\nc = \"ok\"\n";
    let (file, diags) = parse_config(src.as_bytes(), "broken.hcl", Pos::START);
    assert!(diags.has_errors());
    assert!(file.body.attributes.contains_key("a"));
    assert!(file.body.attributes.contains_key("c"));
}

#[test]
fn diagnostics_serialize_to_wire_format() {
    let (_, diags) = parse_config(b"a = ;\n", "bad.hcl", Pos::START);
    let json = diags.to_json().unwrap();
    let first = &json["diagnostics"][0];
    assert_eq!(first["severity"], "error");
    assert_eq!(first["subject"]["filename"], "bad.hcl");
    assert_eq!(first["subject"]["start"]["line"], 1);
    assert_eq!(first["subject"]["start"]["byte"], 4);
}

#[test]
fn convenience_api_reports_errors() {
    let err = hcl::decode_str("a = \"x\"\n", "a.hcl", &Spec::attr("a", Type::Bool), None)
        .unwrap_err();
    let diags = err.diagnostics().unwrap();
    assert_eq!(summaries(diags), ["Incorrect attribute value type"]);

    let val = hcl::eval_str("[1, 2, 3][1]", None).unwrap();
    assert_eq!(val, Value::from(2));
}
