//! End-to-end scenarios through the facade.

use std::time::Duration;

use keepforge::prelude::*;
use keepforge::{KeepForgeError, SolverId};
use keepforge_test::{numbers, DelayedSolver};

fn num(engine: &Engine, obj: ObjectId, field: &str) -> f64 {
    engine.get(obj, field).unwrap().as_number().unwrap()
}

#[test]
fn test_sum_is_kept_after_write() {
    let mut engine = engine_with_config(EngineConfig::default());
    let obj = engine.object(numbers(&[("a", 2.0), ("b", 3.0)]));

    let sum = (Expr::field(obj, "a") + Expr::field(obj, "b")).equals(3.0);
    engine.always(ConstraintOptions::new(), sum).unwrap().unwrap();
    assert!((num(&engine, obj, "a") + num(&engine, obj, "b") - 3.0).abs() < 1e-9);

    engine.set(obj, "a", 10.0).unwrap();
    assert_eq!(num(&engine, obj, "a"), 10.0);
    assert_eq!(num(&engine, obj, "b"), -7.0);
}

#[test]
fn test_lower_bound_rejects_and_restores() {
    let mut engine = engine_with_config(EngineConfig::default());
    let obj = engine.object(numbers(&[("a", 8.0)]));

    let id = engine
        .always(ConstraintOptions::new(), Expr::field(obj, "a").ge(100.0))
        .unwrap()
        .unwrap();
    assert_eq!(engine.constraint(id).unwrap().solver(), engine.solver_by_name("relax").unwrap());
    assert_eq!(num(&engine, obj, "a"), 100.0);

    engine.set(obj, "a", 110.0).unwrap();
    assert_eq!(num(&engine, obj, "a"), 110.0);

    let err = engine.set(obj, "a", 90.0).unwrap_err();
    assert!(matches!(err, KeepForgeError::Unsatisfiable { .. }));
    assert_eq!(num(&engine, obj, "a"), 110.0);

    engine.disable(id);
    engine.set(obj, "a", 90.0).unwrap();
    assert_eq!(num(&engine, obj, "a"), 90.0);

    engine.enable(id).unwrap();
    assert_eq!(num(&engine, obj, "a"), 100.0);
}

#[test]
fn test_selection_picks_the_faster_solver() {
    let mut engine = Engine::new(
        EngineConfig::default().with_optimization_priority(vec![Metric::Time]),
    );
    engine.add_solver(Box::new(DelayedSolver::new(
        "delayed",
        Box::new(RelaxSolver::new()),
        Duration::from_millis(10),
    )));
    let immediate = engine.add_solver(Box::new(DelayedSolver::new(
        "immediate",
        Box::new(RelaxSolver::new()),
        Duration::ZERO,
    )));
    let obj = engine.object(numbers(&[("a", 2.0), ("b", 3.0)]));

    let sum = (Expr::field(obj, "a") + Expr::field(obj, "b")).equals(3.0);
    let id = engine.always(ConstraintOptions::new(), sum).unwrap().unwrap();

    assert_eq!(engine.constraint(id).unwrap().solver(), immediate);
    assert_eq!(num(&engine, obj, "a") + num(&engine, obj, "b"), 3.0);
}

fn doubled_engine() -> (Engine, SolverId, ObjectId) {
    let mut engine = engine_with_config(EngineConfig::default());
    let dataflow = engine.solver_by_name("dataflow").unwrap();
    let obj = engine.object(numbers(&[("x", 0.0), ("y", 0.0)]));
    let relation = Expr::field(obj, "y").equals(Expr::field(obj, "x") * 2.0);
    engine
        .always(ConstraintOptions::new().with_solver(dataflow), relation)
        .unwrap()
        .unwrap();
    (engine, dataflow, obj)
}

#[test]
fn test_edit_session_matches_direct_writes_with_constant_constructions() {
    const N: i32 = 200;

    let (mut edited, dataflow, edited_obj) = doubled_engine();
    let before = edited.solver_stats(dataflow).unwrap().constraint_constructions;
    let session = edited.edit(edited_obj, &["x"]).unwrap();
    for i in 0..N {
        session.update(&mut edited, &[Value::from(i)]).unwrap();
    }
    session.finish(&mut edited).unwrap();
    let edit_cost = edited.solver_stats(dataflow).unwrap().constraint_constructions - before;

    let (mut direct, dataflow, direct_obj) = doubled_engine();
    let before = direct.solver_stats(dataflow).unwrap().constraint_constructions;
    for i in 0..N {
        direct.set(direct_obj, "x", i).unwrap();
    }
    let direct_cost = direct.solver_stats(dataflow).unwrap().constraint_constructions - before;

    for field in ["x", "y"] {
        assert_eq!(
            edited.get(edited_obj, field).unwrap(),
            direct.get(direct_obj, field).unwrap()
        );
    }
    assert_eq!(num(&edited, edited_obj, "y"), 2.0 * f64::from(N - 1));
    assert_eq!(edit_cost, 1);
    assert_eq!(direct_cost, u64::try_from(N - 1).unwrap());
}
