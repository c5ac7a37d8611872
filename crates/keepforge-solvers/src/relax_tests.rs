//! Tests for the relaxation solver.

use super::*;

fn sum_equals(a: ExtVarHandle, b: ExtVarHandle, total: f64) -> Term {
    Term::binary(
        Op::Eq,
        Term::binary(Op::Add, Term::Var(a), Term::Var(b)),
        Term::Const(Value::Number(total)),
    )
}

fn at_least(a: ExtVarHandle, bound: f64) -> Term {
    Term::binary(Op::Ge, Term::Var(a), Term::Const(Value::Number(bound)))
}

fn num(solver: &RelaxSolver, var: ExtVarHandle) -> f64 {
    solver.value(var).as_number().unwrap()
}

#[test]
fn test_sum_is_repaired_on_solve() {
    let mut solver = RelaxSolver::new();
    let a = solver.variable_for(&Value::Number(2.0), "a").unwrap();
    let b = solver.variable_for(&Value::Number(3.0), "b").unwrap();
    let p = solver.compile(&sum_equals(a, b, 3.0)).unwrap();
    solver.enable_primitive(p, Priority::Required).unwrap();
    solver.solve().unwrap();
    assert!((num(&solver, a) + num(&solver, b) - 3.0).abs() < 1e-9);
}

#[test]
fn test_suggested_variable_is_held() {
    let mut solver = RelaxSolver::new();
    let a = solver.variable_for(&Value::Number(1.0), "a").unwrap();
    let b = solver.variable_for(&Value::Number(2.0), "b").unwrap();
    let p = solver.compile(&sum_equals(a, b, 3.0)).unwrap();
    solver.enable_primitive(p, Priority::Required).unwrap();

    solver.suggest_value(a, &Value::Number(10.0)).unwrap();
    assert_eq!(num(&solver, a), 10.0);
    assert!((num(&solver, b) + 7.0).abs() < 1e-9);
}

#[test]
fn test_lower_bound() {
    let mut solver = RelaxSolver::new();
    let a = solver.variable_for(&Value::Number(8.0), "a").unwrap();
    let p = solver.compile(&at_least(a, 100.0)).unwrap();
    solver.enable_primitive(p, Priority::Required).unwrap();
    solver.solve().unwrap();
    assert_eq!(num(&solver, a), 100.0);

    solver.suggest_value(a, &Value::Number(110.0)).unwrap();
    assert_eq!(num(&solver, a), 110.0);

    let err = solver.suggest_value(a, &Value::Number(90.0)).unwrap_err();
    assert!(matches!(err, SolverError::Unsatisfiable(_)));
    assert_eq!(num(&solver, a), 110.0);

    solver.disable_primitive(p).unwrap();
    solver.suggest_value(a, &Value::Number(90.0)).unwrap();
    assert_eq!(num(&solver, a), 90.0);
}

#[test]
fn test_readonly_variable_is_not_moved() {
    let mut solver = RelaxSolver::new();
    let a = solver.variable_for(&Value::Number(10.0), "a").unwrap();
    let b = solver.variable_for(&Value::Number(0.0), "b").unwrap();
    solver.set_readonly(a, true);
    let term = Term::binary(Op::Eq, Term::Var(a), Term::Var(b));
    let p = solver.compile(&term).unwrap();
    solver.enable_primitive(p, Priority::Required).unwrap();
    solver.solve().unwrap();
    assert_eq!(num(&solver, a), 10.0);
    assert_eq!(num(&solver, b), 10.0);
}

#[test]
fn test_all_readonly_fails_to_compile() {
    let mut solver = RelaxSolver::new();
    let a = solver.variable_for(&Value::Number(1.0), "a").unwrap();
    let b = solver.variable_for(&Value::Number(2.0), "b").unwrap();
    solver.set_readonly(a, true);
    solver.set_readonly(b, true);
    let term = Term::binary(Op::Eq, Term::Var(a), Term::Var(b));
    assert!(matches!(solver.compile(&term), Err(SolverError::Unsupported(_))));
}

#[test]
fn test_stay_prefers_other_variable() {
    let mut solver = RelaxSolver::new();
    let a = solver.variable_for(&Value::Number(2.0), "a").unwrap();
    let b = solver.variable_for(&Value::Number(3.0), "b").unwrap();
    solver.stay(a, Priority::Weak).unwrap();
    let p = solver.compile(&sum_equals(a, b, 3.0)).unwrap();
    solver.enable_primitive(p, Priority::Required).unwrap();
    solver.solve().unwrap();
    assert_eq!(num(&solver, a), 2.0);
    assert_eq!(num(&solver, b), 1.0);
}

#[test]
fn test_required_identical_pins_value() {
    let mut solver = RelaxSolver::new();
    let a = solver.variable_for(&Value::Number(0.0), "a").unwrap();
    let b = solver.variable_for(&Value::Number(0.0), "b").unwrap();
    let eq = solver
        .compile(&Term::binary(Op::Eq, Term::Var(a), Term::Var(b)))
        .unwrap();
    let keep = solver.identical(a, &Value::Number(10.0)).unwrap();
    solver.enable_primitive(keep, Priority::Required).unwrap();
    solver.enable_primitive(eq, Priority::Required).unwrap();
    solver.solve().unwrap();
    assert_eq!(num(&solver, a), 10.0);
    assert_eq!(num(&solver, b), 10.0);
}

#[test]
fn test_failed_solve_rolls_back() {
    let mut solver = RelaxSolver::new();
    let a = solver.variable_for(&Value::Number(0.0), "a").unwrap();
    let low = solver.compile(&at_least(a, 10.0)).unwrap();
    let high = solver
        .compile(&Term::binary(Op::Le, Term::Var(a), Term::Const(Value::Number(5.0))))
        .unwrap();
    solver.enable_primitive(low, Priority::Required).unwrap();
    solver.enable_primitive(high, Priority::Required).unwrap();
    assert!(solver.solve().is_err());
    assert_eq!(num(&solver, a), 0.0);
}

#[test]
fn test_declines_non_numbers_and_strict_relations() {
    let mut solver = RelaxSolver::new();
    assert!(solver.variable_for(&Value::from("brown"), "shoes").is_none());
    assert!(!solver.supports_operation(Op::Lt));
    assert_eq!(solver.alternative_operation_for(Op::Lt), Some(Op::Le));
    assert!(!solver.capabilities().edit);
    assert!(solver.begin_edit(&[]).is_err());
}

#[test]
fn test_stats_count_work() {
    let mut solver = RelaxSolver::new().named("relax-2");
    assert_eq!(solver.name(), "relax-2");
    let a = solver.variable_for(&Value::Number(1.0), "a").unwrap();
    let p = solver.compile(&at_least(a, 0.0)).unwrap();
    solver.enable_primitive(p, Priority::Required).unwrap();
    solver.solve().unwrap();
    solver.suggest_value(a, &Value::Number(4.0)).unwrap();
    let stats = solver.stats();
    assert_eq!(stats.constraint_constructions, 1);
    assert_eq!(stats.solve_calls, 2);
}
