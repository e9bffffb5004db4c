use approx::assert_abs_diff_eq;
use qadmm_algos::{ActiveSetQp, AdmmQp, AdmmQpSettings};
use qadmm_core::math::Scalar;
use qadmm_core::matrix::DenseMatrix;
use qadmm_core::subproblem::ConvexProblem;
use qadmm_core::traits::{ConvexOracle, OracleError};

fn box_qp() -> ConvexProblem<Scalar> {
    let mut problem = ConvexProblem::unconstrained(2);
    problem.quadratic = DenseMatrix::from_rows(2, &[vec![4.0, 1.0], vec![1.0, 2.0]]);
    problem.linear = vec![-1.0, -1.0];
    problem.lower = vec![0.0, 0.0];
    problem.upper = vec![1.0, 1.0];
    problem
}

fn coupled_qp() -> ConvexProblem<Scalar> {
    // the continuous block of a mixed model: 5(u0 - 2)² + (u1 - 1)² with a shared budget
    let mut problem = ConvexProblem::unconstrained(2);
    problem.quadratic = DenseMatrix::from_rows(2, &[vec![10.0, 0.0], vec![0.0, 2.0]]);
    problem.linear = vec![-20.0, -2.0];
    problem.constant = 21.0;
    problem.lower = vec![0.0, 0.0];
    problem.push_inequalities(DenseMatrix::from_rows(2, &[vec![1.0, 1.0]]), vec![2.0]);
    problem.push_equalities(DenseMatrix::from_rows(2, &[vec![1.0, -1.0]]), vec![1.0]);
    problem
}

#[test]
fn solves_box_qp() {
    let exact = ActiveSetQp::new().solve(&box_qp()).expect("active set");
    let approx = AdmmQp::default().solve(&box_qp()).expect("admm");
    for (a, b) in exact.iter().zip(approx.iter()) {
        assert!(*b >= -1e-6 && *b <= 1.0 + 1e-6);
        assert_abs_diff_eq!(a, b, epsilon = 1e-4);
    }
    // interior minimiser of the strictly convex objective
    assert_abs_diff_eq!(exact[0], 1.0 / 7.0, epsilon = 1e-12);
    assert_abs_diff_eq!(exact[1], 3.0 / 7.0, epsilon = 1e-12);
}

#[test]
fn backends_agree_with_mixed_rows() {
    let problem = coupled_qp();
    let exact = ActiveSetQp::new().solve(&problem).expect("active set");
    let approx = AdmmQp::default().solve(&problem).expect("admm");
    assert_abs_diff_eq!(exact[0], 1.5, epsilon = 1e-9);
    assert_abs_diff_eq!(exact[1], 0.5, epsilon = 1e-9);
    assert_abs_diff_eq!(problem.objective(&exact), problem.objective(&approx), epsilon = 1e-3);
    assert!(problem.max_violation(&approx) <= 1e-5);
}

#[test]
fn detailed_outcome_reports_convergence() {
    let outcome = AdmmQp::new(AdmmQpSettings::default())
        .solve_detailed(&box_qp())
        .expect("solve");
    assert!(outcome.converged);
    assert!(outcome.iterations > 0);
    assert!(outcome.max_violation <= 1e-8);
}

#[test]
fn infeasible_rows_are_reported() {
    let mut problem = ConvexProblem::unconstrained(1);
    problem.quadratic.set(0, 0, 1.0);
    problem.lower = vec![0.0];
    problem.push_inequalities(DenseMatrix::from_rows(1, &[vec![1.0]]), vec![-1.0]);
    let settings = AdmmQpSettings {
        max_iterations: 500,
        ..AdmmQpSettings::default()
    };
    assert!(matches!(
        AdmmQp::new(settings).solve(&problem),
        Err(OracleError::Infeasible(_))
    ));
    assert!(matches!(
        ActiveSetQp::new().solve(&problem),
        Err(OracleError::Infeasible(_))
    ));
}
