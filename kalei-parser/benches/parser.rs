use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use kalei_parser::parser::Parser;
use kalei_source::Source;

fn program(source: &str) {
    let source = Source::new(source);
    let _items = Parser::new(&source).parse_program();
    assert!(source.has_no_errors());
}

fn long_expr(c: &mut Criterion) {
    let mut group = c.benchmark_group("long-expr");

    let mut source = "1".to_string();
    for _i in 0..1000 {
        source.push_str(" + 1");
    }
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("long-expr", |b| b.iter(|| program(&source)));
}

fn stress_precedence(c: &mut Criterion) {
    let mut group = c.benchmark_group("stress-precedence");

    let mut source = "1".to_string();
    for _i in 0..200 {
        source.push_str(" = 2 < 3 + 5 * 5");
    }
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("stress-precedence", |b| b.iter(|| program(&source)));
}

fn many_definitions(c: &mut Criterion) {
    let mut group = c.benchmark_group("many-definitions");

    let mut source = String::new();
    for i in 0..200 {
        source.push_str(&format!(
            "def f{}(x y) if x < y then var t = x in for i = 1, i < y in t = t * 2 else y;\n",
            i
        ));
    }
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("many-definitions", |b| b.iter(|| program(&source)));
}

criterion_group!(benches, long_expr, stress_precedence, many_definitions);
criterion_main!(benches);
