//! Engine-owned host objects.
//!
//! Host objects are field maps addressed by [`ObjectId`]. A field is either a
//! plain value or intercepted by a constrained variable, in which case reads
//! and writes go through the engine.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use keepforge_core::{KeepForgeError, ObjectId, Result, Value, VarId};

use crate::engine::Engine;

/// Accessor hook invoked after a write changed the value observed through
/// `(receiver, field)`. Receives the field's current value.
pub type SetterHook = Rc<dyn Fn(&mut Engine, ObjectId, &Value)>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    Plain(Value),
    Intercepted(VarId),
}

#[derive(Default)]
pub(crate) struct HostObject {
    fields: BTreeMap<String, Slot>,
    setters: BTreeMap<String, SetterHook>,
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject")
            .field("fields", &self.fields)
            .field("setters", &self.setters.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Heap {
    objects: Vec<HostObject>,
}

impl Heap {
    pub fn insert<I, K>(&mut self, fields: I) -> ObjectId
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let id = ObjectId(self.objects.len());
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), Slot::Plain(v)))
            .collect();
        self.objects.push(HostObject {
            fields,
            setters: BTreeMap::new(),
        });
        id
    }

    fn object(&self, obj: ObjectId) -> Result<&HostObject> {
        self.objects
            .get(obj.index())
            .ok_or(KeepForgeError::UnknownObject(obj))
    }

    fn object_mut(&mut self, obj: ObjectId) -> Result<&mut HostObject> {
        self.objects
            .get_mut(obj.index())
            .ok_or(KeepForgeError::UnknownObject(obj))
    }

    pub fn slot(&self, obj: ObjectId, field: &str) -> Result<&Slot> {
        self.object(obj)?
            .fields
            .get(field)
            .ok_or_else(|| KeepForgeError::UnknownField {
                object: obj,
                field: field.to_string(),
            })
    }

    /// Returns the slot, creating an empty plain field if it is missing.
    pub fn slot_or_insert(&mut self, obj: ObjectId, field: &str) -> Result<Slot> {
        Ok(self
            .object_mut(obj)?
            .fields
            .entry(field.to_string())
            .or_insert(Slot::Plain(Value::None))
            .clone())
    }

    pub fn set_slot(&mut self, obj: ObjectId, field: &str, slot: Slot) -> Result<()> {
        self.object_mut(obj)?.fields.insert(field.to_string(), slot);
        Ok(())
    }

    pub fn field_names(&self, obj: ObjectId) -> Result<Vec<String>> {
        Ok(self.object(obj)?.fields.keys().cloned().collect())
    }

    pub fn define_setter(&mut self, obj: ObjectId, field: &str, hook: SetterHook) -> Result<()> {
        self.object_mut(obj)?.setters.insert(field.to_string(), hook);
        Ok(())
    }

    pub fn setter(&self, obj: ObjectId, field: &str) -> Option<SetterHook> {
        self.objects
            .get(obj.index())
            .and_then(|o| o.setters.get(field))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots() {
        let mut heap = Heap::default();
        let obj = heap.insert([("a", Value::Number(1.0))]);
        assert_eq!(heap.slot(obj, "a").unwrap(), &Slot::Plain(Value::Number(1.0)));
        assert!(matches!(
            heap.slot(obj, "b"),
            Err(KeepForgeError::UnknownField { .. })
        ));
        assert_eq!(heap.slot_or_insert(obj, "b").unwrap(), Slot::Plain(Value::None));
        heap.set_slot(obj, "a", Slot::Intercepted(VarId(0))).unwrap();
        assert_eq!(heap.field_names(obj).unwrap(), vec!["a", "b"]);
        assert!(matches!(
            heap.slot(ObjectId(9), "a"),
            Err(KeepForgeError::UnknownObject(_))
        ));
    }
}
