use std::collections::BTreeMap;

use crate::value::Value;

/// Opaque handle into a record's slot table, assigned at compile time.
///
/// Per the design notes in spec §9 ("Field identity"), Boxon never looks a
/// field up by name at decode/encode time; every [`crate::template::FieldOp`]
/// is bound to a `SlotId` once, during [`crate::template::TemplateCompiler`]
/// compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(pub(crate) u32);

impl SlotId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A write-once cell owned by a record during parsing.
///
/// `Unset` and `Set` are the only two states a slot ever occupies: once a
/// value is written it is never overwritten except by the `PostProcess`
/// pass, which is explicitly allowed to replace it (spec invariant I6).
#[derive(Debug, Clone, Default)]
enum RecordSlot {
    #[default]
    Unset,
    Set(Value),
}

/// The partial-then-complete record a [`crate::engine::ParseEngine`] builds
/// during decode, or reads from during encode.
///
/// Slots are addressed by [`SlotId`]; field *names* are retained only for
/// diagnostics (error messages, the describer) via the owning
/// [`crate::template::Template`]'s slot name table.
#[derive(Debug, Clone, Default)]
pub struct Record {
    slots: Vec<RecordSlot>,
}

impl Record {
    pub fn with_capacity(slot_count: usize) -> Self {
        Self {
            slots: vec![RecordSlot::Unset; slot_count],
        }
    }

    pub fn set_slot(&mut self, slot: SlotId, value: Value) {
        let idx = slot.index();
        if idx >= self.slots.len() {
            self.slots.resize_with(idx + 1, Default::default);
        }
        self.slots[idx] = RecordSlot::Set(value);
    }

    pub fn get_slot(&self, slot: SlotId) -> Option<&Value> {
        match self.slots.get(slot.index()) {
            Some(RecordSlot::Set(v)) => Some(v),
            _ => None,
        }
    }

    pub fn is_set(&self, slot: SlotId) -> bool {
        matches!(self.slots.get(slot.index()), Some(RecordSlot::Set(_)))
    }

    /// Snapshot of every currently-set slot, keyed by the caller-supplied
    /// name table; used by the evaluator's `self` context and by the
    /// describer. Unset slots are omitted rather than reported as `Null` so
    /// bare-identifier lookups (spec §3.1, "shorthand for already-set
    /// fields") correctly fail for fields not yet decoded.
    pub fn named_snapshot(&self, names: &[String]) -> BTreeMap<String, Value> {
        let mut map = BTreeMap::new();
        for (idx, slot) in self.slots.iter().enumerate() {
            if let RecordSlot::Set(v) = slot {
                if let Some(name) = names.get(idx) {
                    map.insert(name.clone(), v.clone());
                }
            }
        }
        map
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        if self.slots.len() != other.slots.len() {
            return false;
        }
        self.slots.iter().zip(other.slots.iter()).all(|(a, b)| match (a, b) {
            (RecordSlot::Unset, RecordSlot::Unset) => true,
            (RecordSlot::Set(a), RecordSlot::Set(b)) => a == b,
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_slots_are_absent_from_snapshot() {
        let mut rec = Record::with_capacity(2);
        rec.set_slot(SlotId(0), Value::Integer(42));
        let names = vec!["a".to_string(), "b".to_string()];
        let snap = rec.named_snapshot(&names);
        assert_eq!(snap.get("a"), Some(&Value::Integer(42)));
        assert!(!snap.contains_key("b"));
    }

    #[test]
    fn set_slot_grows_backing_storage() {
        let mut rec = Record::with_capacity(0);
        rec.set_slot(SlotId(3), Value::Bool(true));
        assert!(rec.is_set(SlotId(3)));
        assert!(!rec.is_set(SlotId(1)));
    }
}
