//! Shared test fixtures for KeepForge crates.
//!
//! This crate wraps and fakes [`Solver`](keepforge_core::Solver)s and
//! captures engine events. It does NOT depend on `keepforge-engine`, so the
//! engine can use it as a dev-dependency.
//!
//! - [`delayed`] - solver wrapper with a forced, adjustable delay
//! - [`stub`] - capability-only solver that records compile attempts
//! - [`events`] - in-memory capture of structured `tracing` events
//! - [`fixtures`] - field lists for host objects
//!
//! # Usage
//!
//! Add as a dev-dependency in your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! keepforge-test = { workspace = true }
//! ```
//!
//! Then import the fixtures you need:
//!
//! ```ignore
//! use keepforge_test::{capture_events, numbers, DelayedSolver, StubSolver};
//! ```

pub mod delayed;
pub mod events;
pub mod fixtures;
pub mod stub;

pub use delayed::DelayedSolver;
pub use events::{capture_events, CapturedEvent};
pub use fixtures::numbers;
pub use stub::StubSolver;
