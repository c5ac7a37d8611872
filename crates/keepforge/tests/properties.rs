//! Invariants the engine keeps across arbitrary write sequences.

use keepforge::prelude::*;
use keepforge::{KeepForgeError, SolverId};
use keepforge_test::numbers;

const TOLERANCE: f64 = 1e-6;

fn num(engine: &Engine, obj: ObjectId, field: &str) -> f64 {
    engine.get(obj, field).unwrap().as_number().unwrap()
}

fn relax_engine() -> (Engine, SolverId) {
    let mut engine = Engine::default();
    let relax = engine.add_solver(Box::new(RelaxSolver::new()));
    (engine, relax)
}

/// `a + b == 10` with both fields kept non-negative.
fn bounded_sum() -> (Engine, SolverId, ObjectId) {
    let (mut engine, relax) = relax_engine();
    let obj = engine.object(numbers(&[("a", 5.0), ("b", 5.0)]));
    let a = || Expr::field(obj, "a");
    let b = || Expr::field(obj, "b");
    for relation in [(a() + b()).equals(10.0), b().ge(0.0), a().ge(0.0)] {
        engine
            .always(ConstraintOptions::new().with_solver(relax), relation)
            .unwrap()
            .unwrap();
    }
    (engine, relax, obj)
}

fn holds(engine: &Engine, obj: ObjectId) -> bool {
    let (a, b) = (num(engine, obj, "a"), num(engine, obj, "b"));
    (a + b - 10.0).abs() < TOLERANCE && a >= -TOLERANCE && b >= -TOLERANCE
}

#[test]
fn test_every_write_ends_satisfied_or_restored() {
    let (mut engine, _, obj) = bounded_sum();
    assert!(holds(&engine, obj));

    for value in [3.0, 7.0, 12.0, -1.0, 10.0, 0.0] {
        let before = (num(&engine, obj, "a"), num(&engine, obj, "b"));
        match engine.set(obj, "a", value) {
            Ok(_) => assert_eq!(num(&engine, obj, "a"), value),
            Err(err) => {
                assert!(err.is_unsatisfiable(), "write {value} failed with {err:?}");
                assert_eq!((num(&engine, obj, "a"), num(&engine, obj, "b")), before);
            }
        }
        assert!(holds(&engine, obj), "relation broken after writing {value}");
    }
    assert_eq!(num(&engine, obj, "a"), 0.0);
    assert!((num(&engine, obj, "b") - 10.0).abs() < TOLERANCE);
}

#[test]
fn test_infeasible_writes_are_rejected() {
    let (mut engine, _, obj) = bounded_sum();
    engine.set(obj, "a", 7.0).unwrap();

    for value in [12.0, -1.0] {
        let err = engine.set(obj, "a", value).unwrap_err();
        assert!(matches!(err, KeepForgeError::Unsatisfiable { ref solver, .. } if solver == "relax"));
        assert_eq!(num(&engine, obj, "a"), 7.0);
        assert!((num(&engine, obj, "b") - 3.0).abs() < TOLERANCE);
    }
}

#[test]
fn test_repeating_a_write_changes_nothing() {
    let (mut engine, relax, obj) = bounded_sum();
    engine.set(obj, "a", 4.0).unwrap();
    let values = (engine.get(obj, "a").unwrap(), engine.get(obj, "b").unwrap());
    let stats = engine.solver_stats(relax).unwrap();

    for _ in 0..3 {
        engine.set(obj, "a", 4.0).unwrap();
    }
    assert_eq!((engine.get(obj, "a").unwrap(), engine.get(obj, "b").unwrap()), values);
    assert_eq!(engine.solver_stats(relax).unwrap(), stats);
}

#[test]
fn test_single_solver_defines_its_fields() {
    let (mut engine, relax, obj) = bounded_sum();
    engine.set(obj, "a", 2.0).unwrap();

    for field in ["a", "b"] {
        let var = engine.variable_of(obj, field).unwrap();
        assert_eq!(engine.variable(var).unwrap().solvers().count(), 1);
        assert_eq!(engine.defining_solver(var), Some(relax));
        assert_eq!(engine.defining_solver(var), Some(relax));
    }
}

#[test]
fn test_shared_field_has_exactly_one_defining_solver() {
    let mut engine = Engine::default();
    let relax = engine.add_solver(Box::new(RelaxSolver::new()));
    let dataflow = engine.add_solver(Box::new(DataflowSolver::new()));
    let obj = engine.object(numbers(&[("a", 5.0), ("b", 5.0), ("c", 1.0)]));

    engine
        .always(
            ConstraintOptions::new().with_solver(relax),
            (Expr::field(obj, "a") + Expr::field(obj, "c")).equals(6.0),
        )
        .unwrap();
    engine
        .always(
            ConstraintOptions::new().with_solver(dataflow),
            Expr::field(obj, "b").equals(Expr::field(obj, "a")),
        )
        .unwrap();

    let a = engine.variable_of(obj, "a").unwrap();
    assert_eq!(engine.variable(a).unwrap().solvers().count(), 2);
    let defining = engine.defining_solver(a);
    assert_eq!(defining, Some(dataflow));

    engine.set(obj, "b", 3.0).unwrap();
    assert_eq!(engine.defining_solver(a), defining);
    assert_eq!(num(&engine, obj, "a"), 3.0);
    assert!((num(&engine, obj, "c") - 3.0).abs() < TOLERANCE);
}

#[test]
fn test_readonly_field_keeps_its_value_across_writes() {
    let (mut engine, relax) = relax_engine();
    let obj = engine.object(numbers(&[("a", 2.0), ("b", 3.0), ("c", 0.0)]));
    let sum = (Expr::field(obj, "a").readonly() + Expr::field(obj, "b") + Expr::field(obj, "c"))
        .equals(3.0);
    engine
        .always(ConstraintOptions::new().with_solver(relax), sum)
        .unwrap()
        .unwrap();
    assert_eq!(num(&engine, obj, "a"), 2.0);

    for value in [5.0, -4.0, 0.5] {
        engine.set(obj, "b", value).unwrap();
        assert_eq!(num(&engine, obj, "a"), 2.0);
        assert!((num(&engine, obj, "c") - (1.0 - value)).abs() < TOLERANCE);
    }
}

#[test]
fn test_relation_over_readonly_fields_only_is_rejected() {
    let (mut engine, relax) = relax_engine();
    let obj = engine.object(numbers(&[("a", 2.0), ("b", 3.0)]));
    let sum = (Expr::field(obj, "a").readonly() + Expr::field(obj, "b").readonly()).equals(3.0);

    let err = engine
        .always(ConstraintOptions::new().with_solver(relax), sum)
        .unwrap_err();
    let KeepForgeError::NoSolver { errors } = err else {
        panic!("expected NoSolver, got {err:?}");
    };
    assert!(matches!(errors.as_slice(), [KeepForgeError::Construction { .. }]));
    assert_eq!(num(&engine, obj, "a"), 2.0);
    assert_eq!(num(&engine, obj, "b"), 3.0);
    assert!(!engine.is_constrained(obj, "a"));
}
