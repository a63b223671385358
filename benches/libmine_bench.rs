use criterion::{black_box, criterion_group, criterion_main, Criterion};
use libmine::{
    anti_unify::anti_unify, fresh::Fresh, Compressor, Corpus, Miner, SourceEntry, Term,
};

/// A corpus of small predicates and arithmetic helpers with a lot of shared
/// structure.
fn corpus(n: usize) -> Corpus {
    Corpus::ingest((0..n).map(|i| {
        let source = match i % 4 {
            0 => format!("def p{i}(a, b):\n    return a > {i} and b == -1\n"),
            1 => format!("def p{i}(a, b, c):\n    return a > {i} and b == -1 and c < 5\n"),
            2 => format!("def p{i}(x):\n    return (x * 2 + {i}) * (x * 2 + 1)\n"),
            _ => format!("def p{i}(xs):\n    return sum(xs[{i}:]) + len(xs) * 2\n"),
        };
        SourceEntry {
            id: format!("p{i}"),
            description: serde_json::Value::Null,
            source,
        }
    }))
}

fn criterion_benchmark(c: &mut Criterion) {
    let left: Term = "(lam (add (mul (get 0 $0) 2) (len (sorted $0))))".parse().unwrap();
    let right: Term = "(lam (add (mul (get 1 $0) 3) (len (sorted $0))))".parse().unwrap();
    c.bench_function("anti_unify", |b| {
        b.iter(|| anti_unify(black_box(&left), black_box(&right), &mut Fresh::new()))
    });

    let programs = corpus(40).terms();
    let miner = Miner::default();
    c.bench_function("mine_40", |b| b.iter(|| miner.compress(black_box(&programs))));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
