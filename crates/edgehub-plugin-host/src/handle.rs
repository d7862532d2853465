//! Opaque instance handles and the loader's handle table.
//!
//! A handle is a generational index into a table owned by the registry;
//! no raw plugin pointer ever crosses outward. A destroyed slot bumps its
//! generation, so a stale handle can never alias a reused slot.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::module::PluginModule;

/// Opaque token for one instantiated, configured plugin instance.
///
/// Never interpreted by callers, only passed back verbatim on every
/// subsequent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginHandle {
    slot: u32,
    generation: u32,
}

/// Mutable per-instance state, guarded by the entry's call lock.
pub(crate) struct InstanceState {
    /// Opaque pointer returned by the plugin's init entry point; nulled
    /// once the instance has been shut down.
    pub instance: *mut (),
}

/// One live plugin instance.
///
/// The per-entry mutex serializes calls against the same handle, which the
/// ABI requires; distinct entries are fully independent.
pub(crate) struct HandleEntry {
    pub module: Arc<PluginModule>,
    pub state: Mutex<InstanceState>,
}

// SAFETY: the raw instance pointer is only ever dereferenced while holding
// `state`, so all plugin calls on one instance are serialized. The plugin
// contract requires nothing more than serialized per-instance access.
unsafe impl Send for HandleEntry {}
unsafe impl Sync for HandleEntry {}

struct Slot {
    generation: u32,
    entry: Option<Arc<HandleEntry>>,
}

/// Slot table behind the registry's single critical section.
pub(crate) struct HandleTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, entry: Arc<HandleEntry>) -> PluginHandle {
        if let Some(slot) = self.free.pop() {
            let s = &mut self.slots[slot as usize];
            s.entry = Some(entry);
            PluginHandle {
                slot,
                generation: s.generation,
            }
        } else {
            let slot = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                entry: Some(entry),
            });
            PluginHandle {
                slot,
                generation: 0,
            }
        }
    }

    /// Look up a live entry; `None` for destroyed or never-issued handles.
    pub fn get(&self, handle: PluginHandle) -> Option<Arc<HandleEntry>> {
        self.slots
            .get(handle.slot as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.entry.clone())
    }

    /// Remove an entry, bumping the slot's generation. Idempotent: a
    /// second take of the same handle returns `None`.
    pub fn take(&mut self, handle: PluginHandle) -> Option<Arc<HandleEntry>> {
        let s = self.slots.get_mut(handle.slot as usize)?;
        if s.generation != handle.generation {
            return None;
        }
        let entry = s.entry.take()?;
        s.generation = s.generation.wrapping_add(1);
        self.free.push(handle.slot);
        Some(entry)
    }

    /// Remove every live entry, for registry shutdown.
    pub fn drain(&mut self) -> Vec<Arc<HandleEntry>> {
        let mut drained = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(entry) = slot.entry.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                drained.push(entry);
            }
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::StorageVtable;
    use edgehub_plugin_api::shim::{PluginShim, StoragePlugin};
    use edgehub_plugin_api::{
        Capabilities, Descriptor, InterfaceVersion, PluginError, PLUGIN_TYPE_STORAGE,
    };
    use serde_json::Value;

    struct Nop;

    impl StoragePlugin for Nop {
        fn init(_config: &Value) -> Result<Self, PluginError> {
            Ok(Self)
        }
    }

    fn entry() -> Arc<HandleEntry> {
        let descriptor = Descriptor::new(
            "nop",
            "1.0.0",
            Capabilities::empty(),
            PLUGIN_TYPE_STORAGE,
            InterfaceVersion::new(1, 0),
        );
        let vtable = StorageVtable::new(
            PluginShim::<Nop>::init,
            PluginShim::<Nop>::shutdown,
            PluginShim::<Nop>::release,
        );
        let module = Arc::new(PluginModule::builtin(descriptor, vtable).unwrap());
        Arc::new(HandleEntry {
            module,
            state: Mutex::new(InstanceState {
                instance: std::ptr::null_mut(),
            }),
        })
    }

    #[test]
    fn test_insert_and_get() {
        let mut table = HandleTable::new();
        let handle = table.insert(entry());
        assert!(table.get(handle).is_some());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_take_is_idempotent() {
        let mut table = HandleTable::new();
        let handle = table.insert(entry());

        assert!(table.take(handle).is_some());
        assert!(table.take(handle).is_none());
        assert!(table.get(handle).is_none());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_stale_handle_does_not_alias_reused_slot() {
        let mut table = HandleTable::new();
        let first = table.insert(entry());
        table.take(first);

        // Slot is reused with a new generation.
        let second = table.insert(entry());
        assert_ne!(first, second);
        assert!(table.get(first).is_none());
        assert!(table.get(second).is_some());
    }

    #[test]
    fn test_handles_are_independent() {
        let mut table = HandleTable::new();
        let a = table.insert(entry());
        let b = table.insert(entry());

        table.take(a);
        assert!(table.get(b).is_some());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_drain_empties_the_table() {
        let mut table = HandleTable::new();
        let a = table.insert(entry());
        let b = table.insert(entry());

        let drained = table.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(table.len(), 0);
        assert!(table.get(a).is_none());
        assert!(table.get(b).is_none());
    }
}
