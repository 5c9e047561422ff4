use criterion::{Criterion, black_box, criterion_group, criterion_main};
use hcl::lexer::{ScanMode, scan_tokens};
use hcl::{EvalContext, Pos, Spec, Type, Value, decode, parse_config, parse_expression};

fn large_config() -> String {
    let mut src = String::from("region = \"eu-${zone}\"\n\n");
    for i in 0..500 {
        src.push_str(&format!(
            "service \"svc{i}\" {{\n  port     = {port}\n  replicas = length(hosts) * 2\n  tags     = [for h in hosts : upper(h) if h != \"skip\"]\n  motd     = <<-EOT\n    hello ${{zone}}\n    number {i}\n    EOT\n}}\n\n",
            port = 8000 + i,
        ));
    }
    src
}

fn eval_context() -> EvalContext {
    let hosts: Vec<Value> = (0..20).map(|i| Value::from(format!("host{i}"))).collect();
    EvalContext::new()
        .with_stdlib()
        .with_variable("zone", Value::from("west"))
        .with_variable("hosts", Value::list(hosts).unwrap())
}

fn service_spec() -> Spec {
    let service = Spec::object([
        ("port", Spec::attr("port", Type::Number).required()),
        ("replicas", Spec::attr("replicas", Type::Number)),
        ("tags", Spec::attr("tags", Type::list(Type::String))),
        ("motd", Spec::attr("motd", Type::String)),
    ]);
    Spec::object([
        ("region", Spec::attr("region", Type::String)),
        ("services", Spec::block_map("service", ["name"], service)),
    ])
}

fn bench_scan(c: &mut Criterion) {
    let src = large_config();
    c.bench_function("scan_large_config", |b| {
        b.iter(|| scan_tokens(black_box(src.as_bytes()), "bench.hcl", Pos::START, ScanMode::Normal))
    });
}

fn bench_parse(c: &mut Criterion) {
    let src = large_config();
    c.bench_function("parse_large_config", |b| {
        b.iter(|| parse_config(black_box(src.as_bytes()), "bench.hcl", Pos::START))
    });
}

fn bench_eval(c: &mut Criterion) {
    let ctx = eval_context();
    let (expr, _) = parse_expression(
        b"{for i, h in hosts : h => [for n in range : n * i if n % 2 == 0]}",
        "bench.hcl",
        Pos::START,
    );
    let range: Vec<Value> = (0..50).map(Value::from).collect();
    let ctx = ctx.new_child().with_variable("range", Value::tuple(range));

    c.bench_function("eval_nested_for", |b| {
        b.iter(|| black_box(&expr).value(Some(black_box(&ctx))))
    });
}

fn bench_decode(c: &mut Criterion) {
    let src = large_config();
    let (file, _) = parse_config(src.as_bytes(), "bench.hcl", Pos::START);
    let ctx = eval_context();
    let spec = service_spec();

    c.bench_function("decode_block_map", |b| {
        b.iter(|| decode(black_box(&file.body), black_box(&spec), Some(&ctx)))
    });
}

criterion_group!(benches, bench_scan, bench_parse, bench_eval, bench_decode);
criterion_main!(benches);
