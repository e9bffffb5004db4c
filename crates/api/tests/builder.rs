use approx::assert_abs_diff_eq;
use qadmm_api::{
    AdmmParameters, ConvexBackend, HeuristicSolver, ModelBuilder, QuboBackend, Sense, TerminationReason,
};
use qadmm_core::math::Scalar;
use qadmm_core::problem::ProblemModel;

fn worked_example() -> qadmm_api::BuiltModel<Scalar> {
    // 5(u - 2)² + v + w + t
    ModelBuilder::new()
        .binary("v")
        .binary("w")
        .binary("t")
        .continuous("u", 0.0, Scalar::INFINITY)
        .quadratic_term("u", "u", 5.0)
        .linear_term("u", -20.0)
        .linear_term("v", 1.0)
        .linear_term("w", 1.0)
        .linear_term("t", 1.0)
        .constant(20.0)
        .constraint("budget", &[("v", 1.0), ("w", 2.0), ("t", 1.0), ("u", 1.0)], Sense::LessEqual, 3.0)
        .constraint("cover", &[("v", 1.0), ("w", 1.0), ("t", 1.0)], Sense::GreaterEqual, 1.0)
        .constraint("pick", &[("v", 1.0), ("w", 1.0)], Sense::Equal, 1.0)
        .build()
        .expect("valid model")
}

fn worked_parameters() -> AdmmParameters<Scalar> {
    AdmmParameters {
        rho_initial: 1001.0,
        beta: 1000.0,
        factor_c: 900.0,
        max_iterations: 100,
        ..AdmmParameters::with_tolerance(1e-6)
    }
}

#[test]
fn built_model_solves_to_named_assignment() {
    let built = worked_example();
    let result = HeuristicSolver::new()
        .params(worked_parameters())
        .qubo_backend(QuboBackend::Exhaustive, 0)
        .convex_backend(ConvexBackend::ActiveSet)
        .solve(&built.model)
        .unwrap();
    assert_eq!(result.termination, TerminationReason::Converged);
    let named = built.assignment(&result);
    assert_eq!(named.keys().collect::<Vec<_>>(), vec!["v", "w", "t", "u"]);
    assert_eq!(named["v"], 1.0);
    assert_eq!(named["w"], 0.0);
    assert_eq!(named["t"], 0.0);
    assert_abs_diff_eq!(named["u"], 2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(result.objective_value, 1.0, epsilon = 1e-9);
}

#[test]
fn annealing_backend_reaches_a_feasible_assignment() {
    // v and w tie in the first binary block, so either pick is acceptable
    let built = worked_example();
    let result = HeuristicSolver::new()
        .params(worked_parameters())
        .qubo_backend(QuboBackend::Annealing, 11)
        .solve(&built.model)
        .unwrap();
    assert!(result.feasible);
    assert_eq!(result.binary[0] + result.binary[1], 1.0);
    assert!(result.objective_value >= 1.0 - 1e-9);
}

#[test]
fn batch_matches_sequential_solves() {
    let models: Vec<ProblemModel<Scalar>> = (0..4)
        .map(|k| {
            let mut model = worked_example().model;
            // shift the continuous target: 5(u - 2)² + k u
            model.linear[3] += k as Scalar;
            model
        })
        .collect();
    let solver = HeuristicSolver::new().params(worked_parameters());
    let batch = solver.solve_batch(&models);
    assert_eq!(batch.len(), models.len());
    for (model, parallel) in models.iter().zip(batch) {
        let parallel = parallel.unwrap();
        let sequential = solver.solve(model).unwrap();
        assert_eq!(parallel.binary, sequential.binary);
        assert_eq!(parallel.continuous, sequential.continuous);
        assert_eq!(parallel.termination, sequential.termination);
        assert_eq!(parallel.residual_pairs(), sequential.residual_pairs());
    }
}

#[test]
fn parameters_round_trip_through_json() {
    let params = worked_parameters();
    let text = serde_json::to_string(&params).unwrap();
    let back: AdmmParameters<Scalar> = serde_json::from_str(&text).unwrap();
    assert_eq!(back.rho_initial, params.rho_initial);
    assert_eq!(back.penalty, params.penalty);
    let result = qadmm_api::solve(&worked_example().model, back).unwrap();
    assert!(result.feasible);
}

#[test]
fn default_backends_handle_wide_binary_blocks() {
    // sum_i c_i b_i + (u - 1)², c_i = -(i + 1) for even i and i + 1 for odd i,
    // with b0 + u <= 3. The z-block alone carries 28 box sides.
    let count = 14;
    let names: Vec<String> = (0..count).map(|i| format!("b{i}")).collect();
    let mut builder = ModelBuilder::new();
    for (i, name) in names.iter().enumerate() {
        let cost = if i % 2 == 0 { -((i + 1) as Scalar) } else { (i + 1) as Scalar };
        builder = builder.binary(name.as_str()).linear_term(name.as_str(), cost);
    }
    let built = builder
        .continuous("u", 0.0, Scalar::INFINITY)
        .quadratic_term("u", "u", 1.0)
        .linear_term("u", -2.0)
        .constant(1.0)
        .constraint("cap", &[("b0", 1.0), ("u", 1.0)], Sense::LessEqual, 3.0)
        .build()
        .expect("valid model");

    let params = AdmmParameters {
        rho_initial: 1.0,
        max_iterations: 20,
        ..AdmmParameters::with_tolerance(1e-6)
    };
    let result = HeuristicSolver::new().params(params).solve(&built.model).unwrap();
    assert_eq!(result.failure, None);
    assert_eq!(result.termination, TerminationReason::Converged);
    let expected: Vec<Scalar> = (0..count).map(|i| if i % 2 == 0 { 1.0 } else { 0.0 }).collect();
    assert_eq!(result.binary, expected);
    assert_abs_diff_eq!(result.continuous[0], 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(result.objective_value, -49.0, epsilon = 1e-9);
    assert!(result.feasible);
}
