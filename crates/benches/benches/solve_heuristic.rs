use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use qadmm_api::{AdmmParameters, ConvexBackend, HeuristicSolver, ModelBuilder, QuboBackend, Sense};
use qadmm_core::math::Scalar;
use qadmm_core::problem::ProblemModel;
use rand::{rngs::SmallRng, Rng, SeedableRng};

/// Random facility-style instance: `n` open/close binaries, one continuous
/// flow per facility capped by its binary, and a demand to cover.
fn build_problem(n: usize, rng: &mut SmallRng) -> ProblemModel<Scalar> {
    let mut builder = ModelBuilder::new();
    for i in 0..n {
        let open = format!("open{i}");
        let flow = format!("flow{i}");
        builder = builder
            .binary(open.as_str())
            .continuous(flow.as_str(), 0.0, Scalar::INFINITY)
            .linear_term(open.as_str(), 1.0 + rng.gen::<Scalar>() * 4.0)
            .quadratic_term(flow.as_str(), flow.as_str(), 0.5 + rng.gen::<Scalar>())
            .constraint(
                format!("cap{i}"),
                &[(flow.as_str(), 1.0), (open.as_str(), -3.0)],
                Sense::LessEqual,
                0.0,
            );
    }
    let opens: Vec<String> = (0..n).map(|i| format!("open{i}")).collect();
    let flows: Vec<String> = (0..n).map(|i| format!("flow{i}")).collect();
    let open_terms: Vec<(&str, Scalar)> = opens.iter().map(|name| (name.as_str(), 1.0)).collect();
    let flow_terms: Vec<(&str, Scalar)> = flows.iter().map(|name| (name.as_str(), 1.0)).collect();
    builder
        .constraint("open_at_least_two", &open_terms, Sense::GreaterEqual, 2.0)
        .constraint("demand", &flow_terms, Sense::GreaterEqual, 4.0)
        .build()
        .map(|built| built.model)
        .unwrap_or_else(|err| panic!("benchmark model is invalid: {err}"))
}

fn parameters() -> AdmmParameters<Scalar> {
    AdmmParameters {
        rho_initial: 100.0,
        beta: 100.0,
        factor_c: 100.0,
        max_iterations: 20,
        ..AdmmParameters::default()
    }
}

fn solve_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("admm_heuristic_solve");
    let mut rng = SmallRng::seed_from_u64(42);
    group.bench_function("exhaustive_active_set_n=6", |b| {
        let solver = HeuristicSolver::new().params(parameters());
        b.iter_batched(
            || build_problem(6, &mut rng),
            |model| solver.solve(&model),
            BatchSize::SmallInput,
        );
    });
    group.bench_function("annealing_admm_qp_n=12", |b| {
        let solver = HeuristicSolver::new()
            .params(parameters())
            .qubo_backend(QuboBackend::Annealing, 7)
            .convex_backend(ConvexBackend::Admm);
        b.iter_batched(
            || build_problem(12, &mut rng),
            |model| solver.solve(&model),
            BatchSize::SmallInput,
        );
    });
    group.bench_function("batch_of_8_n=6", |b| {
        let solver = HeuristicSolver::new().params(parameters());
        b.iter_batched(
            || (0..8).map(|_| build_problem(6, &mut rng)).collect::<Vec<_>>(),
            |models| solver.solve_batch(&models),
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, solve_benchmark);
criterion_main!(benches);
