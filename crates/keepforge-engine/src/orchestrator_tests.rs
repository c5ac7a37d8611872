//! Tests for solver selection and the constraint entry points.

use std::cell::RefCell;
use std::time::Duration;

use super::*;
use crate::constraint::Assignment;
use keepforge_core::{Expr, Priority};
use keepforge_solvers::{DataflowSolver, DomainSolver, RelaxSolver};
use keepforge_test::{capture_events, numbers, DelayedSolver, StubSolver};

fn field(name: &str) -> Expr {
    Expr::name("obj").get(name)
}

fn metrics(elapsed_ms: f64, changes: &[(f64, f64)]) -> ComparisonMetrics {
    ComparisonMetrics {
        elapsed_ms,
        assignments: changes
            .iter()
            .enumerate()
            .map(|(i, (old, new))| Assignment {
                var: VarId(i),
                old: Value::Number(*old),
                new: Value::Number(*new),
            })
            .collect(),
    }
}

// ---- select_best ----

#[test]
fn test_select_best_prefers_lower_first_metric() {
    let slow = metrics(10.0, &[]);
    let fast = metrics(1.0, &[(0.0, 5.0)]);
    let order = [Metric::Time, Metric::NumberOfChangedVariables];
    assert_eq!(select_best(&[("slow", &slow), ("fast", &fast)], &order), Some("fast"));
    assert_eq!(select_best(&[("fast", &fast), ("slow", &slow)], &order), Some("fast"));
}

#[test]
fn test_select_best_defers_ties_to_next_metric() {
    let many = metrics(1.0, &[(0.0, 1.0), (0.0, 1.0)]);
    let few = metrics(1.0, &[(0.0, 1.0)]);
    let order = [Metric::Time, Metric::NumberOfChangedVariables];
    assert_eq!(select_best(&[("many", &many), ("few", &few)], &order), Some("few"));
}

#[test]
fn test_select_best_keeps_first_on_full_tie() {
    let a = metrics(1.0, &[(0.0, 1.0)]);
    let b = metrics(1.0, &[(2.0, 3.0)]);
    let order = [Metric::Time, Metric::NumberOfChangedVariables];
    assert_eq!(select_best(&[("a", &a), ("b", &b)], &order), Some("a"));
    assert_eq!(select_best::<&str>(&[], &order), None);
}

#[test]
fn test_select_best_nan_only_skips_the_comparison() {
    let text = ComparisonMetrics {
        elapsed_ms: 0.0,
        assignments: vec![Assignment {
            var: VarId(0),
            old: Value::from("a"),
            new: Value::from("b"),
        }],
    };
    let near = metrics(5.0, &[(0.0, 1.0)]);
    let far = metrics(5.0, &[(0.0, 9.0)]);
    let order = [Metric::SquaredChangeDistance, Metric::Time];

    // NaN first: the distance comparison is skipped and time decides.
    assert_eq!(select_best(&[("text", &text), ("near", &near)], &order), Some("text"));
    // The NaN candidate is not eliminated by later numeric candidates.
    assert_eq!(
        select_best(&[("far", &far), ("text", &text), ("near", &near)], &order),
        Some("text")
    );
    assert_eq!(select_best(&[("far", &far), ("near", &near)], &order), Some("near"));
}

// ---- filtering ----

#[test]
fn test_solver_without_finite_domains_is_never_built() {
    let mut engine = Engine::default();
    let stub = StubSolver::numeric("stub").accepting();
    let attempts = stub.compile_attempts();
    engine.add_solver(Box::new(stub));
    let domain = engine.add_solver(Box::new(DomainSolver::new()));
    let obj = engine.object(numbers(&[("a", 2.0)]));

    let options = ConstraintOptions::new()
        .bind_object("obj", obj)
        .with_log_reasons(true);
    let (id, events) = capture_events(|| {
        engine
            .always(options, field("a").in_domain([1, 2, 3]))
            .unwrap()
            .unwrap()
    });

    assert_eq!(attempts.get(), 0);
    assert_eq!(engine.constraint(id).unwrap().solver(), domain);
    let rejected: Vec<_> = events
        .iter()
        .filter(|e| e.event() == Some("solver_rejected"))
        .collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].field("solver"), Some("stub"));
    assert_eq!(rejected[0].field("reason"), Some("finite domains"));
}

#[test]
fn test_rejections_are_quiet_without_log_reasons() {
    let mut engine = Engine::default();
    engine.add_solver(Box::new(StubSolver::numeric("stub")));
    engine.add_solver(Box::new(DomainSolver::new()));
    let obj = engine.object(numbers(&[("a", 2.0)]));

    let options = ConstraintOptions::new().bind_object("obj", obj);
    let (_, events) = capture_events(|| {
        engine
            .always(options, field("a").in_domain([1, 2, 3]))
            .unwrap()
    });
    assert!(events.iter().all(|e| e.event() != Some("solver_rejected")));
}

#[test]
fn test_methods_and_soft_priorities_filter_solvers() {
    let mut engine = Engine::default();
    engine.add_solver(Box::new(RelaxSolver::new()));
    let dataflow = engine.add_solver(Box::new(DataflowSolver::new()));
    let obj = engine.object(numbers(&[("a", 1.0), ("b", 2.0), ("c", 4.0)]));

    let options = ConstraintOptions::new().bind_object("obj", obj).with_methods();
    let id = engine
        .always(options, field("a").equals(field("b")))
        .unwrap()
        .unwrap();
    assert_eq!(engine.constraint(id).unwrap().solver(), dataflow);
    assert_eq!(engine.get(obj, "b").unwrap(), Value::Number(1.0));

    let options = ConstraintOptions::new()
        .bind_object("obj", obj)
        .with_priority(Priority::Strong);
    let id = engine
        .always(options, field("c").equals(field("a") * 3.0))
        .unwrap()
        .unwrap();
    assert_eq!(engine.constraint(id).unwrap().solver(), dataflow);
    assert_eq!(engine.constraint(id).unwrap().priority(), Priority::Strong);
}

#[test]
fn test_no_solver_registered() {
    let mut engine = Engine::default();
    let obj = engine.object(numbers(&[("a", 1.0)]));
    let options = ConstraintOptions::new().bind_object("obj", obj);

    let err = engine.always(options, field("a").ge(0.0)).unwrap_err();
    assert!(matches!(err, KeepForgeError::NoSolver { ref errors } if errors.is_empty()));
}

// ---- entry points ----

#[test]
fn test_on_error_receives_construction_failures() {
    let mut engine = Engine::default();
    let relax = engine.add_solver(Box::new(RelaxSolver::new()));
    let obj = engine.object(numbers(&[("a", 1.0)]));

    let seen: Rc<RefCell<Vec<KeepForgeError>>> = Rc::default();
    let sink = seen.clone();
    let options = ConstraintOptions::new()
        .with_solver(relax)
        .bind_object("obj", obj)
        .on_error(move |_, errors| sink.borrow_mut().extend_from_slice(errors));

    let result = engine.always(options, field("a").lt(5.0)).unwrap();
    assert_eq!(result, None);
    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert!(matches!(seen[0], KeepForgeError::UnsolvableOperation { .. }));
}

#[test]
fn test_on_error_receives_write_failures() {
    let mut engine = Engine::default();
    let relax = engine.add_solver(Box::new(RelaxSolver::new()));
    let obj = engine.object(numbers(&[("a", 8.0)]));

    let seen: Rc<RefCell<Vec<KeepForgeError>>> = Rc::default();
    let sink = seen.clone();
    let options = ConstraintOptions::new()
        .with_solver(relax)
        .bind_object("obj", obj)
        .on_error(move |_, errors| sink.borrow_mut().extend_from_slice(errors));
    engine.always(options, field("a").ge(100.0)).unwrap();

    engine.set(obj, "a", 90.0).unwrap();
    assert_eq!(engine.get(obj, "a").unwrap(), Value::Number(100.0));
    assert_eq!(seen.borrow().len(), 1);
    assert!(seen.borrow()[0].is_unsatisfiable());
}

#[test]
fn test_once_solves_then_releases() {
    let mut engine = Engine::default();
    let relax = engine.add_solver(Box::new(RelaxSolver::new()));
    let obj = engine.object(numbers(&[("a", 8.0)]));
    let options = ConstraintOptions::new().with_solver(relax).bind_object("obj", obj);

    let id = engine.once(options, field("a").ge(100.0)).unwrap().unwrap();
    assert_eq!(engine.get(obj, "a").unwrap(), Value::Number(100.0));
    assert!(!engine.constraint(id).unwrap().is_enabled());

    engine.set(obj, "a", 5.0).unwrap();
    assert_eq!(engine.get(obj, "a").unwrap(), Value::Number(5.0));
}

#[test]
fn test_postponed_constraint_waits_for_enable() {
    let mut engine = Engine::default();
    let relax = engine.add_solver(Box::new(RelaxSolver::new()));
    let obj = engine.object(numbers(&[("a", 8.0)]));
    let options = ConstraintOptions::new()
        .with_solver(relax)
        .bind_object("obj", obj)
        .postpone_enabling();

    let id = engine.always(options, field("a").ge(100.0)).unwrap().unwrap();
    assert!(!engine.constraint(id).unwrap().is_enabled());
    assert_eq!(engine.get(obj, "a").unwrap(), Value::Number(8.0));

    engine.enable(id).unwrap();
    assert_eq!(engine.get(obj, "a").unwrap(), Value::Number(100.0));
}

#[test]
fn test_stay_keeps_field_as_input() {
    let mut engine = Engine::default();
    let dataflow = engine.add_solver(Box::new(DataflowSolver::new()));
    let obj = engine.object(numbers(&[("a", 1.0), ("b", 2.0)]));
    let options = ConstraintOptions::new()
        .with_solver(dataflow)
        .bind_object("obj", obj);

    let stay = engine.stay(options.clone(), field("b")).unwrap();
    assert_eq!(engine.constraint(stay).unwrap().priority(), Priority::Weak);
    engine
        .always(options, (field("a") + field("b")).equals(10.0))
        .unwrap();

    assert_eq!(engine.get(obj, "a").unwrap(), Value::Number(8.0));
    assert_eq!(engine.get(obj, "b").unwrap(), Value::Number(2.0));
}

// ---- selection ----

fn delayed_pair(slow_ms: u64, fast_ms: u64) -> (Engine, [(SolverId, Rc<std::cell::Cell<Duration>>); 2]) {
    let mut engine = Engine::default();
    let slow = DelayedSolver::new(
        "slow",
        Box::new(RelaxSolver::new()),
        Duration::from_millis(slow_ms),
    );
    let fast = DelayedSolver::new(
        "fast",
        Box::new(RelaxSolver::new()),
        Duration::from_millis(fast_ms),
    );
    let (slow_delay, fast_delay) = (slow.delay_handle(), fast.delay_handle());
    let slow = engine.add_solver(Box::new(slow));
    let fast = engine.add_solver(Box::new(fast));
    (engine, [(slow, slow_delay), (fast, fast_delay)])
}

#[test]
fn test_fastest_solver_is_selected() {
    let (mut engine, [(_, _), (fast, _)]) = delayed_pair(10, 0);
    let obj = engine.object(numbers(&[("a", 2.0), ("b", 3.0)]));
    let options = ConstraintOptions::new()
        .bind_object("obj", obj)
        .with_optimization_priority(vec![Metric::Time]);

    let (id, events) = capture_events(|| {
        engine
            .always(options, (field("a") + field("b")).equals(3.0))
            .unwrap()
            .unwrap()
    });

    assert_eq!(engine.constraint(id).unwrap().solver(), fast);
    assert_eq!(engine.constraint_ids(), vec![id]);
    assert_eq!(engine.get(obj, "a").unwrap(), Value::Number(1.0));
    assert_eq!(engine.get(obj, "b").unwrap(), Value::Number(2.0));
    let selected = events
        .iter()
        .find(|e| e.event() == Some("solver_selected"))
        .unwrap();
    assert_eq!(selected.field("solver"), Some("fast"));
    assert_eq!(selected.field("candidates"), Some("2"));
}

#[test]
fn test_reevaluation_moves_constraint_to_faster_solver() {
    let (mut engine, [(slow, slow_delay), (fast, fast_delay)]) = delayed_pair(10, 0);
    let obj = engine.object(numbers(&[("a", 8.0)]));
    let options = ConstraintOptions::new()
        .bind_object("obj", obj)
        .with_optimization_priority(vec![Metric::Time]);
    let id = engine.always(options, field("a").ge(100.0)).unwrap().unwrap();
    assert_eq!(engine.constraint(id).unwrap().solver(), fast);

    slow_delay.set(Duration::ZERO);
    fast_delay.set(Duration::from_millis(10));
    let (_, events) = capture_events(|| engine.reevaluate_solver_selection(id).unwrap());

    let c = engine.constraint(id).unwrap();
    assert_eq!(c.solver(), slow);
    assert!(c.is_enabled());
    assert_eq!(engine.constraint_ids(), vec![id]);
    let var = engine.variable_of(obj, "a").unwrap();
    assert_eq!(engine.variable(var).unwrap().solvers().collect::<Vec<_>>(), vec![slow]);

    let switched = events
        .iter()
        .find(|e| e.event() == Some("solver_switched"))
        .unwrap();
    assert_eq!(switched.field("from"), Some("fast"));
    assert_eq!(switched.field("to"), Some("slow"));

    // The constraint still holds under its new solver.
    assert!(engine.set(obj, "a", 90.0).unwrap_err().is_unsatisfiable());
    assert_eq!(engine.get(obj, "a").unwrap(), Value::Number(100.0));
}

#[test]
fn test_reevaluation_runs_after_interval_writes() {
    let (mut engine, [(slow, slow_delay), (fast, fast_delay)]) = delayed_pair(10, 0);
    let obj = engine.object(numbers(&[("a", 8.0)]));
    let options = ConstraintOptions::new()
        .bind_object("obj", obj)
        .with_optimization_priority(vec![Metric::Time])
        .with_reevaluation_interval(2);
    let id = engine.always(options, field("a").ge(100.0)).unwrap().unwrap();
    assert_eq!(engine.constraint(id).unwrap().solver(), fast);

    slow_delay.set(Duration::ZERO);
    fast_delay.set(Duration::from_millis(10));
    engine.set(obj, "a", 110.0).unwrap();
    assert_eq!(engine.constraint(id).unwrap().solver(), fast);
    assert_eq!(engine.constraint(id).unwrap().update_counter(), 1);

    engine.set(obj, "a", 120.0).unwrap();
    assert_eq!(engine.constraint(id).unwrap().solver(), slow);
    assert_eq!(engine.constraint(id).unwrap().update_counter(), 0);
    assert_eq!(engine.get(obj, "a").unwrap(), Value::Number(120.0));
}

#[test]
fn test_reevaluation_without_alternatives_keeps_solver() {
    let mut engine = Engine::default();
    let relax = engine.add_solver(Box::new(RelaxSolver::new()));
    let obj = engine.object(numbers(&[("a", 8.0)]));
    let options = ConstraintOptions::new().bind_object("obj", obj);
    let id = engine.always(options, field("a").ge(100.0)).unwrap().unwrap();

    engine.reevaluate_solver_selection(id).unwrap();
    assert_eq!(engine.constraint(id).unwrap().solver(), relax);
    assert!(engine.constraint(id).unwrap().is_enabled());
}

// ---- unconstrain ----

#[test]
fn test_unconstrain_releases_field() {
    let mut engine = Engine::default();
    let relax = engine.add_solver(Box::new(RelaxSolver::new()));
    let obj = engine.object(numbers(&[("a", 8.0)]));
    let options = ConstraintOptions::new().with_solver(relax).bind_object("obj", obj);
    engine.always(options, field("a").ge(100.0)).unwrap();

    engine.unconstrain(obj, "a").unwrap();
    assert!(!engine.is_constrained(obj, "a"));
    assert_eq!(engine.get(obj, "a").unwrap(), Value::Number(100.0));
    engine.set(obj, "a", 5.0).unwrap();
    assert_eq!(engine.get(obj, "a").unwrap(), Value::Number(5.0));

    // Plain fields are left alone.
    engine.unconstrain(obj, "a").unwrap();
}

#[test]
fn test_unconstrain_descends_into_held_objects() {
    let mut engine = Engine::default();
    let relax = engine.add_solver(Box::new(RelaxSolver::new()));
    let inner = engine.object(numbers(&[("v", 1.0)]));
    let outer = engine.object([("inner", Value::Object(inner))]);
    let options = ConstraintOptions::new().with_solver(relax).bind_object("outer", outer);
    engine
        .always(options, Expr::name("outer").get("inner").get("v").ge(10.0))
        .unwrap();
    assert!(engine.is_constrained(inner, "v"));

    engine.unconstrain_all(outer).unwrap();
    assert!(!engine.is_constrained(outer, "inner"));
    assert!(!engine.is_constrained(inner, "v"));
    engine.set(inner, "v", 3.0).unwrap();
    assert_eq!(engine.get(inner, "v").unwrap(), Value::Number(3.0));
}
