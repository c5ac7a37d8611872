//! Tests for deferred callback delivery.

use super::*;
use crate::options::ConstraintOptions;
use keepforge_core::{Expr, Value};
use keepforge_solvers::RelaxSolver;
use keepforge_test::numbers;

#[test]
fn test_every_deferred_failure_reaches_the_caller() {
    let mut engine = Engine::default();
    let relax = engine.add_solver(Box::new(RelaxSolver::new()));
    let obj = engine.object(numbers(&[("a", 1.0)]));
    let other = engine.object(numbers(&[("v", 1.0)]));
    engine
        .always(ConstraintOptions::new().with_solver(relax), Expr::field(obj, "a").ge(0.0))
        .unwrap()
        .unwrap();

    // Two unhandled failures queued during one public call.
    engine
        .define_setter(obj, "a", move |engine, _, _| {
            for bound in [5.0, 0.0] {
                let options = ConstraintOptions::new().with_solver(relax);
                let _ = engine.always(options, Expr::field(other, "v").gt(bound));
            }
        })
        .unwrap();

    let err = engine.set(obj, "a", 5.0).unwrap_err();
    let KeepForgeError::NoSolver { errors } = err else {
        panic!("expected NoSolver, got {err:?}");
    };
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| !matches!(e, KeepForgeError::NoSolver { .. })));
    assert!(engine.callbacks.is_empty());
    assert_eq!(engine.get(obj, "a").unwrap(), Value::Number(5.0));
}

#[test]
fn test_single_deferred_failure_is_returned_unchanged() {
    let mut engine = Engine::default();
    let relax = engine.add_solver(Box::new(RelaxSolver::new()));
    let obj = engine.object(numbers(&[("a", 1.0)]));

    let err = engine
        .always(ConstraintOptions::new().with_solver(relax), Expr::field(obj, "a").gt(5.0))
        .unwrap_err();
    let KeepForgeError::NoSolver { errors } = err else {
        panic!("expected NoSolver, got {err:?}");
    };
    assert_eq!(errors.len(), 1);
    assert!(engine.callbacks.is_empty());
}

#[test]
fn test_merge_flattens_candidate_lists() {
    let unsat = |solver: &str| KeepForgeError::Unsatisfiable {
        solver: solver.to_string(),
        reason: String::new(),
    };
    assert!(merge_failures(Vec::new()).is_none());
    assert!(matches!(
        merge_failures(vec![unsat("relax")]),
        Some(KeepForgeError::Unsatisfiable { .. })
    ));

    let merged = merge_failures(vec![
        KeepForgeError::NoSolver { errors: vec![unsat("relax"), unsat("domain")] },
        unsat("dataflow"),
    ]);
    let Some(KeepForgeError::NoSolver { errors }) = merged else {
        panic!("expected NoSolver, got {merged:?}");
    };
    assert_eq!(errors.len(), 3);
}
