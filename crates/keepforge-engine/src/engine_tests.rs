//! Tests for the engine registry, heap access and setter hooks.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::*;
use crate::options::ConstraintOptions;
use keepforge_core::Expr;
use keepforge_solvers::{DataflowSolver, RelaxSolver};
use keepforge_test::numbers;

fn relax_engine() -> (Engine, SolverId) {
    let mut engine = Engine::default();
    let relax = engine.add_solver(Box::new(RelaxSolver::new()));
    (engine, relax)
}

#[test]
fn test_plain_fields() {
    let mut engine = Engine::default();
    let obj = engine.object(numbers(&[("a", 1.0)]));

    assert_eq!(engine.get(obj, "a").unwrap(), Value::Number(1.0));
    engine.set(obj, "a", 4.0).unwrap();
    assert_eq!(engine.get(obj, "a").unwrap(), Value::Number(4.0));

    // Writing a missing field creates it.
    engine.set(obj, "label", "left").unwrap();
    assert_eq!(engine.get(obj, "label").unwrap(), Value::from("left"));
    assert_eq!(engine.field_names(obj).unwrap(), vec!["a", "label"]);
}

#[test]
fn test_unknown_object_and_field() {
    let mut engine = Engine::default();
    let obj = engine.object(numbers(&[("a", 1.0)]));

    assert!(matches!(
        engine.get(obj, "missing"),
        Err(KeepForgeError::UnknownField { .. })
    ));
    assert!(matches!(
        engine.set(ObjectId(42), "a", 1.0),
        Err(KeepForgeError::UnknownObject(_))
    ));
}

#[test]
fn test_solver_registry() {
    let mut engine = Engine::default();
    let relax = engine.add_solver(Box::new(RelaxSolver::new()));
    let dataflow = engine.register_solver(Box::new(DataflowSolver::new()));

    assert_eq!(engine.default_solvers(), &[relax]);
    assert_eq!(engine.solver_by_name("dataflow"), Some(dataflow));
    assert_eq!(engine.solver_by_name("simplex"), None);
    assert!(matches!(
        engine.solver(SolverId(9)),
        Err(KeepForgeError::UnknownSolver(_))
    ));

    engine.set_solver_weight(relax, 5.0).unwrap();
    assert_eq!(engine.solver(relax).unwrap().weight(), 5.0);

    engine.set_default_solvers(vec![dataflow, relax]);
    assert_eq!(engine.default_solvers(), &[dataflow, relax]);
}

#[test]
fn test_constrained_field_is_intercepted() {
    let (mut engine, relax) = relax_engine();
    let obj = engine.object(numbers(&[("a", 8.0), ("b", 1.0)]));

    let options = ConstraintOptions::new().with_solver(relax).bind_object("obj", obj);
    let id = engine
        .always(options, Expr::name("obj").get("a").ge(100.0))
        .unwrap()
        .unwrap();

    assert!(engine.is_constrained(obj, "a"));
    assert!(!engine.is_constrained(obj, "b"));
    assert_eq!(engine.constraint_ids(), vec![id]);
    assert_eq!(engine.get(obj, "a").unwrap(), Value::Number(100.0));

    let var = engine.variable_of(obj, "a").unwrap();
    assert_eq!(engine.variable(var).unwrap().shadow_value(), &Value::Number(100.0));
    assert_eq!(engine.solver_stats(relax).unwrap().constraint_constructions, 1);
}

#[test]
fn test_setters_run_once_per_field_after_write() {
    let (mut engine, relax) = relax_engine();
    let obj = engine.object(numbers(&[("a", 1.0), ("b", 2.0)]));
    let options = ConstraintOptions::new().with_solver(relax).bind_object("obj", obj);
    let sum = (Expr::name("obj").get("a") + Expr::name("obj").get("b")).equals(3.0);
    engine.always(options, sum).unwrap();

    let seen: Rc<RefCell<Vec<(String, Value)>>> = Rc::default();
    for field in ["a", "b"] {
        let seen = seen.clone();
        engine
            .define_setter(obj, field, move |_, _, value| {
                seen.borrow_mut().push((field.to_string(), value.clone()));
            })
            .unwrap();
    }

    engine.set(obj, "a", 10.0).unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    assert!(seen.contains(&("a".to_string(), Value::Number(10.0))));
    assert!(seen.contains(&("b".to_string(), Value::Number(-7.0))));
}

#[test]
fn test_writes_from_setters_are_suppressed() {
    let (mut engine, relax) = relax_engine();
    let obj = engine.object(numbers(&[("a", 8.0), ("calls", 0.0)]));
    let options = ConstraintOptions::new().with_solver(relax).bind_object("obj", obj);
    engine.always(options, Expr::name("obj").get("a").ge(100.0)).unwrap();

    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    engine
        .define_setter(obj, "a", move |engine, receiver, _| {
            counter.set(counter.get() + 1);
            // Intercepted: suppressed while hooks run.
            let _ = engine.set(receiver, "a", 500.0);
        })
        .unwrap();

    engine.set(obj, "a", 120.0).unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(engine.get(obj, "a").unwrap(), Value::Number(120.0));
}
