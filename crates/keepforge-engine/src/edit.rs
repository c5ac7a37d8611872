//! Edit sessions: batched assignments to a fixed set of fields.
//!
//! Opening a session asks each involved solver to prepare once; every batch
//! then goes straight to the solvers' `resolve_array`, so no per-assignment
//! constraint is built.

use keepforge_core::{ExtVarHandle, KeepForgeError, ObjectId, Result, SolverId, Value, VarId};
use tracing::debug;

use crate::engine::Engine;
use crate::variable::Origin;

#[derive(Debug, Clone)]
struct EditField {
    var: VarId,
    bindings: Vec<(SolverId, ExtVarHandle)>,
}

/// An open edit session returned by [`Engine::edit`].
///
/// Push batches with [`update`](Self::update) and close it with
/// [`finish`](Self::finish).
#[derive(Debug)]
#[must_use = "an edit session must be finished"]
pub struct EditSession {
    fields: Vec<EditField>,
    /// Per solver, the indices of the fields it edits in field order.
    solvers: Vec<(SolverId, Vec<usize>)>,
}

impl EditSession {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn solvers(&self) -> impl Iterator<Item = SolverId> + '_ {
        self.solvers.iter().map(|(s, _)| *s)
    }

    /// Assigns one value per field, in the order the fields were named.
    pub fn update(&self, engine: &mut Engine, values: &[Value]) -> Result<()> {
        if values.len() != self.fields.len() {
            return Err(KeepForgeError::TypeMismatch(format!(
                "edit session over {} fields got {} values",
                self.fields.len(),
                values.len()
            )));
        }
        engine.top_level(|engine| {
            for (solver, members) in &self.solvers {
                let batch: Vec<Value> = members.iter().map(|i| values[*i].clone()).collect();
                let name = engine.solver_name(*solver);
                engine
                    .solver_mut(*solver)?
                    .resolve_array(&batch)
                    .map_err(|e| KeepForgeError::from_solver(name, e))?;
            }
            for field in &self.fields {
                let value = engine.read_var(field.var);
                engine.suggest_value(field.var, value, Origin::Propagation, false)?;
            }
            Ok(())
        })
    }

    /// Closes the session on every solver. All solvers are closed even if
    /// one fails; the first failure is returned.
    pub fn finish(self, engine: &mut Engine) -> Result<()> {
        for field in &self.fields {
            for (solver, ext) in &field.bindings {
                if let Ok(s) = engine.solver_mut(*solver) {
                    s.finish_edit(*ext);
                }
            }
        }
        let mut first_error = None;
        for (solver, _) in &self.solvers {
            let name = engine.solver_name(*solver);
            let result = engine
                .solver_mut(*solver)
                .and_then(|s| s.end_edit().map_err(|e| KeepForgeError::from_solver(name, e)));
            if let Err(error) = result {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Engine {
    /// Opens an edit session over `fields` of `obj`.
    ///
    /// # Errors
    ///
    /// [`KeepForgeError::NotEditable`] if a field is not constrained, still
    /// has a binding its solver declined, or is bound by a solver without
    /// edit support.
    pub fn edit(&mut self, obj: ObjectId, fields: &[&str]) -> Result<EditSession> {
        let mut edit_fields = Vec::with_capacity(fields.len());
        for field in fields {
            let not_editable = |reason: String| KeepForgeError::NotEditable {
                field: format!("{obj}.{field}"),
                reason,
            };
            let var = self
                .variable_of(obj, field)
                .ok_or_else(|| not_editable("not constrained".to_string()))?;
            let v = self.expect_variable(var)?;
            if v.external.values().any(Option::is_none) {
                return Err(not_editable(
                    "a solver declined it; the relation needs recalculation".to_string(),
                ));
            }
            let bindings: Vec<(SolverId, ExtVarHandle)> = v
                .external
                .iter()
                .filter_map(|(s, e)| e.map(|e| (*s, e)))
                .collect();
            if bindings.is_empty() {
                return Err(not_editable("no solver binds it".to_string()));
            }
            for (solver, _) in &bindings {
                let s = self.solver(*solver)?;
                if !s.capabilities().edit {
                    return Err(not_editable(format!("{} has no edit sessions", s.name())));
                }
            }
            edit_fields.push(EditField { var, bindings });
        }

        let mut solvers: Vec<(SolverId, Vec<usize>)> = Vec::new();
        for (index, field) in edit_fields.iter().enumerate() {
            for (solver, ext) in &field.bindings {
                self.solver_mut(*solver)?.prepare_edit(*ext);
                match solvers.iter_mut().find(|(s, _)| s == solver) {
                    Some((_, members)) => members.push(index),
                    None => solvers.push((*solver, vec![index])),
                }
            }
        }
        for (solver, members) in &solvers {
            let exts: Vec<ExtVarHandle> = members
                .iter()
                .filter_map(|i| {
                    edit_fields[*i]
                        .bindings
                        .iter()
                        .find(|(s, _)| s == solver)
                        .map(|(_, e)| *e)
                })
                .collect();
            let name = self.solver_name(*solver);
            self.solver_mut(*solver)?
                .begin_edit(&exts)
                .map_err(|e| KeepForgeError::from_solver(name, e))?;
        }
        debug!(%obj, fields = fields.len(), solvers = solvers.len(), "opened edit session");
        Ok(EditSession {
            fields: edit_fields,
            solvers,
        })
    }
}

#[cfg(test)]
#[path = "edit_tests.rs"]
mod tests;
