use criterion::{criterion_group, criterion_main, Criterion};
use kalei_parser::ast::Item;
use kalei_parser::parser::Parser;
use kalei_source::Source;
use kalei_vm::session::{Session, SessionOptions};

fn parse(source: &str) -> Vec<Item> {
    let source = Source::new(source);
    let items = Parser::new(&source).parse_program();
    assert!(source.has_no_errors());
    items
}

fn fib(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib");

    let items = parse("def fib(n) if n < 3 then 1 else fib(n - 1) + fib(n - 2); fib(20);");
    for &optimize in &[true, false] {
        let name = if optimize { "fib-optimized" } else { "fib-debug" };
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut session = Session::new(SessionOptions {
                    optimize,
                    ..SessionOptions::default()
                });
                assert_eq!(session.evaluate(&items), vec![6765.0]);
            })
        });
    }
}

fn many_statements(c: &mut Criterion) {
    let mut group = c.benchmark_group("many-statements");

    let mut source = String::new();
    for i in 0..200 {
        source.push_str(&format!(
            "def f{}(x) var t = x in (for i = 1, i < 10 in t = t + {}) + t;\nf{}({});\n",
            i, i, i, i
        ));
    }
    let items = parse(&source);
    group.bench_function("many-statements", |b| {
        b.iter(|| Session::default().evaluate(&items))
    });
}

criterion_group!(benches, fib, many_statements);
criterion_main!(benches);
