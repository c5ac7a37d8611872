//! Variable and primitive bookkeeping shared by the reference solvers.

use keepforge_core::{ExtVarHandle, Priority, PrimitiveHandle, SolverError, Value};

#[derive(Debug, Clone)]
pub struct VariableSlot {
    pub name: String,
    pub value: Value,
    pub readonly: bool,
    pub stay: Option<Priority>,
}

/// Arena of solver variables addressed by [`ExtVarHandle`].
#[derive(Debug, Default)]
pub struct VariableStore {
    slots: Vec<Option<VariableSlot>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: Value) -> ExtVarHandle {
        let handle = ExtVarHandle(self.slots.len());
        self.slots.push(Some(VariableSlot {
            name: name.to_string(),
            value,
            readonly: false,
            stay: None,
        }));
        handle
    }

    pub fn remove(&mut self, var: ExtVarHandle) {
        if let Some(slot) = self.slots.get_mut(var.index()) {
            *slot = None;
        }
    }

    pub fn get(&self, var: ExtVarHandle) -> Result<&VariableSlot, SolverError> {
        self.slots
            .get(var.index())
            .and_then(Option::as_ref)
            .ok_or(SolverError::UnknownVariable(var))
    }

    pub fn get_mut(&mut self, var: ExtVarHandle) -> Result<&mut VariableSlot, SolverError> {
        self.slots
            .get_mut(var.index())
            .and_then(Option::as_mut)
            .ok_or(SolverError::UnknownVariable(var))
    }

    /// Current value, `Value::None` for unknown handles.
    pub fn value(&self, var: ExtVarHandle) -> Value {
        self.get(var).map(|s| s.value.clone()).unwrap_or_default()
    }

    pub fn number(&self, var: ExtVarHandle) -> f64 {
        self.get(var)
            .ok()
            .and_then(|s| s.value.as_number())
            .unwrap_or(0.0)
    }

    pub fn is_readonly(&self, var: ExtVarHandle) -> bool {
        self.get(var).map(|s| s.readonly).unwrap_or(false)
    }

    pub fn set_readonly(&mut self, var: ExtVarHandle, readonly: bool) {
        if let Ok(slot) = self.get_mut(var) {
            slot.readonly = readonly;
        }
    }

    /// Copies every value so a failed solve can be rolled back.
    pub fn snapshot(&self) -> Vec<Option<Value>> {
        self.slots
            .iter()
            .map(|s| s.as_ref().map(|s| s.value.clone()))
            .collect()
    }

    pub fn restore(&mut self, snapshot: Vec<Option<Value>>) {
        for (slot, value) in self.slots.iter_mut().zip(snapshot) {
            if let (Some(slot), Some(value)) = (slot.as_mut(), value) {
                slot.value = value;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PrimitiveEntry<T> {
    pub data: T,
    /// Priority while enabled.
    pub enabled: Option<Priority>,
}

/// Arena of compiled primitives addressed by [`PrimitiveHandle`].
#[derive(Debug)]
pub struct PrimitiveStore<T> {
    entries: Vec<Option<PrimitiveEntry<T>>>,
}

impl<T> Default for PrimitiveStore<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> PrimitiveStore<T> {
    pub fn insert(&mut self, data: T) -> PrimitiveHandle {
        let handle = PrimitiveHandle(self.entries.len());
        self.entries.push(Some(PrimitiveEntry {
            data,
            enabled: None,
        }));
        handle
    }

    pub fn remove(&mut self, primitive: PrimitiveHandle) {
        if let Some(entry) = self.entries.get_mut(primitive.index()) {
            *entry = None;
        }
    }

    pub fn get_mut(
        &mut self,
        primitive: PrimitiveHandle,
    ) -> Result<&mut PrimitiveEntry<T>, SolverError> {
        self.entries
            .get_mut(primitive.index())
            .and_then(Option::as_mut)
            .ok_or(SolverError::UnknownPrimitive(primitive))
    }

    pub fn set_enabled(
        &mut self,
        primitive: PrimitiveHandle,
        priority: Option<Priority>,
    ) -> Result<(), SolverError> {
        self.get_mut(primitive)?.enabled = priority;
        Ok(())
    }

    /// Enabled primitives with their priority, in creation order.
    pub fn enabled(&self) -> impl Iterator<Item = (&T, Priority)> {
        self.entries
            .iter()
            .flatten()
            .filter_map(|e| e.enabled.map(|p| (&e.data, p)))
    }
}
