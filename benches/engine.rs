//! Benchmarks for the Shinka QA search engine.

use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use shinka_qa::{
    evolution::{IslandModel, NoveltyArchive, OracleError, Oracles, Ucb1Bandit},
    schema::{EngineConfig, Evaluation, IslandConfig},
};

/// A small pytest-style suite with `n` test functions.
fn suite(n: usize) -> String {
    let mut code = String::from("import pytest\nfrom calculator import add, divide\n\n");
    for i in 0..n {
        code.push_str(&format!(
            "def test_case_{i}():\n    assert add({i}, {i}) == {}\n\n",
            2 * i
        ));
        if i % 3 == 0 {
            code.push_str(&format!(
                "def test_zero_{i}():\n    with pytest.raises(ZeroDivisionError):\n        divide({i}, 0)\n\n"
            ));
        }
    }
    code
}

fn bench_novelty(c: &mut Criterion) {
    let mut group = c.benchmark_group("novelty_is_novel");

    for size in [10, 50, 100] {
        let mut archive = NoveltyArchive::new(0.9, size);
        for i in 0..size {
            archive.add(&suite(i + 1), i as f64);
        }
        let candidate = suite(size / 2 + 7);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| archive.is_novel(black_box(&candidate)));
        });
    }

    group.finish();
}

fn bench_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("island_generation");

    let mutate = |code: &str, _: &str, strategy: &str| -> Result<String, OracleError> {
        Ok(format!("{code}\n# {strategy}"))
    };
    let score = |code: &str| -> Result<Evaluation, OracleError> {
        let asserts = code.matches("assert").count() as f64;
        Ok(Evaluation::new(asserts / code.lines().count().max(1) as f64))
    };

    for (population_size, parallel) in [(10, false), (10, true), (40, false), (40, true)] {
        let config = EngineConfig {
            islands: IslandConfig {
                num_islands: 4,
                population_size,
                ..Default::default()
            },
            parallel,
            random_seed: Some(7),
            ..Default::default()
        };

        let label = format!(
            "{}x{}_{}",
            config.islands.num_islands,
            population_size,
            if parallel { "parallel" } else { "sequential" }
        );
        group.bench_function(BenchmarkId::from_parameter(label), |b| {
            b.iter_batched(
                || {
                    let mut model = IslandModel::new(&config).expect("valid config");
                    model.initialize(&suite(5), &score).expect("seed scores");
                    model
                },
                |mut model| {
                    model
                        .evolve(1, Oracles::new(&mutate, &score), "calculator.py", |_, _, _| {})
                        .expect("generation runs")
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_bandit(c: &mut Criterion) {
    let mut group = c.benchmark_group("bandit");

    let arms = ["add_edge_cases", "add_assertions", "parametrize", "add_exception_tests"];
    let means = [0.2, 0.5, 0.3, 0.1];
    let mut bandit = Ucb1Bandit::new(arms, 1.0).expect("valid arms");
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..1000 {
        let name = bandit.select_arm().to_string();
        let idx = arms.iter().position(|a| *a == name).unwrap_or(0);
        let noise = Normal::new(means[idx], 0.1).expect("valid distribution");
        let reward = noise.sample(&mut rng).clamp(0.0, 1.0);
        bandit.update(&name, reward).expect("known arm");
    }

    group.bench_function("select_arm", |b| {
        b.iter(|| black_box(&bandit).select_arm().len());
    });
    for batch in [16, 80] {
        group.bench_with_input(BenchmarkId::new("select_batch", batch), &batch, |b, &n| {
            b.iter(|| bandit.select_batch(black_box(n)).len());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_novelty, bench_generation, bench_bandit);
criterion_main!(benches);
