//! Deferred callback queue.
//!
//! Failure callbacks are never run from inside a write. They are queued and
//! drained by the outermost engine call once its own work is done.

use keepforge_core::{KeepForgeError, Result, VarId};
use tracing::debug;

use crate::engine::Engine;
use crate::options::ErrorHandler;

pub(crate) enum Callback {
    OnError {
        handler: ErrorHandler,
        errors: Vec<KeepForgeError>,
    },
    Rethrow(KeepForgeError),
}

impl Engine {
    /// Routes a recoverable write failure to the first `on_error` handler of
    /// the variable's constraints, or hands it back when there is none.
    pub(crate) fn add_error_callback(&mut self, var: VarId, error: KeepForgeError) -> Result<()> {
        let handler = self.variable(var).and_then(|v| {
            v.constraints
                .iter()
                .find_map(|cid| self.constraint(*cid).ok()?.options.on_error.clone())
        });
        match handler {
            Some(handler) => {
                debug!(%var, %error, "queued error for on_error handler");
                self.callbacks.push_back(Callback::OnError {
                    handler,
                    errors: vec![error],
                });
                Ok(())
            }
            None => Err(error),
        }
    }

    /// Drains the queue unless a public call is still in progress.
    ///
    /// A single rethrown failure is returned as is. Several are merged into
    /// one [`KeepForgeError::NoSolver`] carrying every candidate error.
    pub(crate) fn process_callbacks(&mut self) -> Result<()> {
        if self.guards.nested > 0 || self.guards.processing_callbacks {
            return Ok(());
        }
        self.guards.processing_callbacks = true;
        let mut rethrown = Vec::new();
        while let Some(callback) = self.callbacks.pop_front() {
            match callback {
                Callback::OnError { handler, errors } => handler(self, &errors),
                Callback::Rethrow(error) => rethrown.push(error),
            }
        }
        self.guards.processing_callbacks = false;
        match merge_failures(rethrown) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Runs `f` as a public entry point: nested callbacks are deferred until
    /// `f` returns, then drained.
    pub(crate) fn top_level<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.guards.nested += 1;
        let result = f(self);
        self.guards.nested -= 1;
        let drained = self.process_callbacks();
        let value = result?;
        drained?;
        Ok(value)
    }
}

fn merge_failures(mut failures: Vec<KeepForgeError>) -> Option<KeepForgeError> {
    if failures.len() <= 1 {
        return failures.pop();
    }
    debug!(count = failures.len(), "merging deferred failures");
    let mut errors = Vec::new();
    for failure in failures {
        match failure {
            KeepForgeError::NoSolver { errors: inner } => errors.extend(inner),
            other => errors.push(other),
        }
    }
    Some(KeepForgeError::NoSolver { errors })
}

#[cfg(test)]
#[path = "callbacks_tests.rs"]
mod tests;
