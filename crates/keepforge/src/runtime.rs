//! Engine entry points that hide the solver wiring.

use keepforge_config::EngineConfig;
use keepforge_engine::Engine;
use keepforge_solvers::{DataflowSolver, DomainSolver, RelaxSolver};
use tracing::debug;

/// Builds an engine from `keepforge.toml` in the working directory, or from
/// defaults when the file is missing or invalid.
pub fn engine() -> Engine {
    let config = EngineConfig::load("keepforge.toml").unwrap_or_default();
    engine_with_config(config)
}

/// Builds an engine with the reference solvers registered as defaults, in
/// the order dataflow, relax, domain.
pub fn engine_with_config(config: EngineConfig) -> Engine {
    #[cfg(feature = "console")]
    keepforge_console::init();

    let relax = config.relax.clone();
    let domain = config.domain.clone();
    let mut engine = Engine::new(config);
    engine.add_solver(Box::new(DataflowSolver::new()));
    engine.add_solver(Box::new(RelaxSolver::with_config(relax)));
    engine.add_solver(Box::new(DomainSolver::with_config(domain)));
    debug!(solvers = engine.default_solvers().len(), "engine ready");
    engine
}
