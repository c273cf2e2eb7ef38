// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::error::{Error, Result};
use crate::ids::XlatorId;

/// Opaque per-translator scratch payload: a pointer-or-integer value, left
/// uninterpreted by this crate.
pub type ScratchValue = u64;

/// A bounded array of `(translator identity, value)` slots, one per
/// translator that has ever called `ctx_set` on this client.
///
/// `key: None` means the slot is free; this is the §9 redesign that
/// replaces the original's "zero key but non-null `xl_key`" state with a
/// single `Option`, so insert-into-free-slot and erase-existing-slot are
/// the same code path.
#[derive(Debug)]
pub struct ScratchSlots {
    slots: Vec<Option<(XlatorId, ScratchValue)>>,
}

impl ScratchSlots {
    /// Allocates `capacity` slots, one per translator in the graph at the
    /// time the owning client was created (§3).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    /// Sets the slot for `xlator_id` to `value`, reusing a matching slot if
    /// one exists or else the first free slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if every slot is occupied by a
    /// different translator.
    pub fn set(&mut self, xlator_id: XlatorId, value: ScratchValue) -> Result<()> {
        if let Some(slot) = self.find_mut(xlator_id) {
            *slot = Some((xlator_id, value));
            return Ok(());
        }

        if let Some(slot) = self.slots.iter_mut().find(|s| s.is_none()) {
            *slot = Some((xlator_id, value));
            return Ok(());
        }

        Err(Error::OutOfMemory)
    }

    /// Looks up the value stored for `xlator_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no slot matches.
    pub fn get(&self, xlator_id: XlatorId) -> Result<ScratchValue> {
        self.slots
            .iter()
            .find_map(|s| s.filter(|(id, _)| *id == xlator_id).map(|(_, v)| v))
            .ok_or(Error::NotFound)
    }

    /// Frees the slot belonging to `xlator_id`, returning its prior value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no slot matches.
    pub fn del(&mut self, xlator_id: XlatorId) -> Result<ScratchValue> {
        let slot = self.find_mut(xlator_id).ok_or(Error::NotFound)?;
        let (_, value) = slot.take().expect("find_mut only returns occupied slots");
        Ok(value)
    }

    fn find_mut(&mut self, xlator_id: XlatorId) -> Option<&mut Option<(XlatorId, ScratchValue)>> {
        self.slots
            .iter_mut()
            .find(|s| matches!(s, Some((id, _)) if *id == xlator_id))
    }
}
