use criterion::{black_box, criterion_group, criterion_main, Criterion};

use langexpr::expr::parser::parse;
use langexpr::Engine;

const ARITH: &str = "(2 + 3) * 4 - 10 / 5 + 2 ^ 8 % 7";
const CHAIN: &str = "if level > 10: 'high' elif level > 3: 'mid' else: 'low'";
const CALLS: &str = "double(add(level, 1)) + strlen(toupper('hello'))";

fn engine() -> Engine {
    let mut e = Engine::new();
    e.set_variable("level", 5).ok();
    e.register_function_def("double(x) => x * 2").ok();
    e
}

fn bench_parse(c: &mut Criterion) {
    let mut g = c.benchmark_group("parse");
    for (name, src) in [("arith", ARITH), ("chain", CHAIN), ("calls", CALLS)] {
        g.bench_function(name, |b| b.iter(|| parse(black_box(src))));
    }
    g.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut g = c.benchmark_group("evaluate");
    for (name, src) in [("arith", ARITH), ("chain", CHAIN), ("calls", CALLS)] {
        let mut e = engine();
        g.bench_function(name, |b| b.iter(|| e.evaluate(black_box(src))));
    }
    g.finish();
}

fn bench_interpret_only(c: &mut Criterion) {
    let mut e = engine();
    let tree = parse(CALLS).expect("benchmark source parses");
    c.bench_function("interpret_calls", |b| {
        b.iter(|| e.interpreter_mut().interpret(black_box(&tree)))
    });
}

criterion_group!(benches, bench_parse, bench_evaluate, bench_interpret_only);
criterion_main!(benches);
