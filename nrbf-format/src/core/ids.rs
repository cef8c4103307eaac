//! Object id bookkeeping for both directions.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use crate::header::FIRST_OBJECT_ID;
use crate::value::Handle;
use crate::{Error, Result};

/// Writer side: hands out ids in first-encounter order, keyed by identity.
#[derive(Debug)]
pub(crate) struct IdAllocator {
    next: i32,
    assigned: HashMap<Handle, i32>,
}

impl IdAllocator {
    pub fn new() -> IdAllocator {
        IdAllocator {
            next: FIRST_OBJECT_ID,
            assigned: HashMap::new(),
        }
    }

    /// Returns the id of `handle` and whether it was allocated by this call.
    pub fn assign(&mut self, handle: Handle) -> Result<(i32, bool)> {
        if let Some(id) = self.assigned.get(&handle) {
            return Ok((*id, false));
        }
        let id = self.next_id()?;
        self.assigned.insert(handle, id);
        Ok((id, true))
    }

    /// Allocates an id not tied to any object. Libraries draw from the same
    /// sequence as objects.
    pub fn next_id(&mut self) -> Result<i32> {
        let id = self.next;
        if id == i32::MAX {
            return Err(Error::unsupported("object id space exhausted"));
        }
        self.next += 1;
        Ok(id)
    }

    pub fn get(&self, handle: Handle) -> Option<i32> {
        self.assigned.get(&handle).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DefineError {
    /// Id 0 never names an object.
    Reserved,
    Duplicate,
}

#[derive(Debug)]
struct Slot {
    handle: Handle,
    defined: bool,
}

/// Reader side: maps wire ids to arena handles.
///
/// A reference may arrive before the record defining its target, so
/// resolving an unknown id reserves a handle up front and leaves the slot
/// pending until [`IdTable::define`] claims it.
#[derive(Debug, Default)]
pub(crate) struct IdTable {
    slots: HashMap<i32, Slot>,
    pending: usize,
}

impl IdTable {
    pub fn new() -> IdTable {
        IdTable::default()
    }

    /// Registers the object defined under `id`. `alloc` is called only when
    /// no earlier reference already reserved a handle.
    pub fn define(
        &mut self,
        id: i32,
        alloc: impl FnOnce() -> Handle,
    ) -> std::result::Result<Handle, DefineError> {
        if id == 0 {
            return Err(DefineError::Reserved);
        }

        match self.slots.entry(id) {
            Entry::Occupied(mut entry) => {
                let slot = entry.get_mut();
                if slot.defined {
                    return Err(DefineError::Duplicate);
                }
                slot.defined = true;
                self.pending -= 1;
                Ok(slot.handle)
            }
            Entry::Vacant(entry) => {
                let handle = alloc();
                entry.insert(Slot {
                    handle,
                    defined: true,
                });
                Ok(handle)
            }
        }
    }

    /// Handle for a reference to `id`, reserving one if `id` is not known
    /// yet. Returns `None` for id 0.
    pub fn resolve(&mut self, id: i32, alloc: impl FnOnce() -> Handle) -> Option<Handle> {
        if id == 0 {
            return None;
        }

        let pending = &mut self.pending;
        let slot = self.slots.entry(id).or_insert_with(|| {
            *pending += 1;
            Slot {
                handle: alloc(),
                defined: false,
            }
        });
        Some(slot.handle)
    }

    /// The smallest id that was referenced but never defined.
    pub fn first_pending(&self) -> Option<i32> {
        if self.pending == 0 {
            return None;
        }
        self.slots
            .iter()
            .filter(|(_, slot)| !slot.defined)
            .map(|(id, _)| *id)
            .min()
    }

    /// Handle of a defined id.
    pub fn lookup(&self, id: i32) -> Option<Handle> {
        self.slots
            .get(&id)
            .filter(|slot| slot.defined)
            .map(|slot| slot.handle)
    }

    pub fn into_map(self) -> BTreeMap<i32, Handle> {
        self.slots
            .into_iter()
            .map(|(id, slot)| (id, slot.handle))
            .collect()
    }
}
