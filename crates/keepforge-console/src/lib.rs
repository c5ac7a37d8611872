//! Colored console output for engine events.
//!
//! Provides a `tracing` layer that renders the engine's structured events
//! (`event = "..."`) as one colored line each.
//!
//! ## Log Levels
//!
//! - **INFO**: Solver selection, rejection and switches
//! - **DEBUG**: Re-evaluation runs and solve timings

use owo_colors::OwoColorize;
use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static INIT: OnceLock<()> = OnceLock::new();
static EPOCH: OnceLock<Instant> = OnceLock::new();

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initializes console output.
///
/// Safe to call multiple times; only the first call has effect. `RUST_LOG`
/// overrides the default `keepforge_engine=info`.
pub fn init() {
    INIT.get_or_init(|| {
        EPOCH.get_or_init(Instant::now);
        print_banner();

        let mut filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .from_env_lossy();
        if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
            if let Ok(directive) = "keepforge_engine=info".parse::<Directive>() {
                filter = filter.add_directive(directive);
            }
        }

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(EngineConsoleLayer)
            .try_init();
    });
}

fn elapsed_secs() -> f64 {
    EPOCH.get().map_or(0.0, |epoch| epoch.elapsed().as_secs_f64())
}

fn print_banner() {
    let mut stdout = io::stdout().lock();
    let _ = writeln!(
        stdout,
        "{} {}",
        "KeepForge".bright_cyan().bold(),
        format!("v{VERSION} - multi-solver constraint maintenance").bright_white()
    );
    let _ = stdout.flush();
}

/// A tracing layer that formats engine events with colors.
pub struct EngineConsoleLayer;

impl<S: Subscriber> Layer<S> for EngineConsoleLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !metadata.target().starts_with("keepforge") {
            return;
        }

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let output = format_event(&visitor);
        if !output.is_empty() {
            let _ = writeln!(io::stdout(), "{}", output);
        }
    }
}

#[derive(Default)]
struct EventVisitor {
    event: Option<String>,
    solver: Option<String>,
    reason: Option<String>,
    constraint: Option<String>,
    from: Option<String>,
    to: Option<String>,
    during: Option<String>,
    candidates: Option<u64>,
    measured: Option<u64>,
    elapsed_ms: Option<f64>,
}

impl EventVisitor {
    fn set_text(&mut self, name: &str, value: String) {
        let slot = match name {
            "event" => &mut self.event,
            "solver" => &mut self.solver,
            "reason" => &mut self.reason,
            "constraint" => &mut self.constraint,
            "from" => &mut self.from,
            "to" => &mut self.to,
            "during" => &mut self.during,
            _ => return,
        };
        *slot = Some(value);
    }
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let s = format!("{:?}", value);
        self.set_text(field.name(), s.trim_matches('"').to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.set_text(field.name(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        match field.name() {
            "candidates" => self.candidates = Some(value),
            "measured" => self.measured = Some(value),
            _ => {}
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_u64(field, value.max(0) as u64);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if field.name() == "elapsed_ms" {
            self.elapsed_ms = Some(value);
        }
    }
}

fn format_event(v: &EventVisitor) -> String {
    match v.event.as_deref().unwrap_or("") {
        "solver_selected" => format_selected(v),
        "solver_rejected" => format_rejected(v),
        "solver_switched" => format_switched(v),
        "reevaluation" => format_reevaluation(v),
        "solve_timing" => format_timing(v),
        _ => String::new(),
    }
}

fn format_elapsed() -> String {
    format!("{:>7.3}s", elapsed_secs())
        .bright_black()
        .to_string()
}

fn solver_name(v: &EventVisitor) -> &str {
    v.solver.as_deref().unwrap_or("?")
}

fn format_selected(v: &EventVisitor) -> String {
    let candidates = v.candidates.unwrap_or(0);
    let measured = v.measured.unwrap_or(candidates);
    format!(
        "{} {} Selected {} │ {} of {} candidates measured",
        format_elapsed(),
        "✓".bright_green().bold(),
        solver_name(v).bright_cyan().bold(),
        measured.bright_yellow(),
        candidates.bright_yellow(),
    )
}

fn format_rejected(v: &EventVisitor) -> String {
    format!(
        "{} {} Rejected {} │ no support for {}",
        format_elapsed(),
        "✗".bright_red(),
        solver_name(v).white().bold(),
        v.reason.as_deref().unwrap_or("the predicate").yellow(),
    )
}

fn format_switched(v: &EventVisitor) -> String {
    format!(
        "{} {} {} moved │ {} → {}",
        format_elapsed(),
        "⇄".bright_magenta().bold(),
        v.constraint.as_deref().unwrap_or("constraint").white(),
        v.from.as_deref().unwrap_or("?").bright_black(),
        v.to.as_deref().unwrap_or("?").bright_cyan().bold(),
    )
}

fn format_reevaluation(v: &EventVisitor) -> String {
    format!(
        "{} {} Re-evaluating {} │ currently {}",
        format_elapsed(),
        "↻".bright_blue(),
        v.constraint.as_deref().unwrap_or("constraint").white(),
        solver_name(v).bright_cyan(),
    )
}

fn format_timing(v: &EventVisitor) -> String {
    let during = v.during.as_deref().unwrap_or("solve");
    format!(
        "{} {} {} {} │ {}",
        format_elapsed(),
        "⏱".bright_blue(),
        solver_name(v).bright_cyan(),
        during.white(),
        format_duration_ms(v.elapsed_ms.unwrap_or(0.0)).yellow(),
    )
}

fn format_duration_ms(ms: f64) -> String {
    if ms < 1.0 {
        format!("{:.0}µs", ms * 1000.0)
    } else if ms < 1000.0 {
        format!("{:.2}ms", ms)
    } else {
        format!("{:.2}s", ms / 1000.0)
    }
}
