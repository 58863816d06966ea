//! Generation-checked handle table of non-owning references.
//!
//! A handle resolves only while its slot still holds the same generation
//! and the owner has not dropped the object. Removing an entry bumps the
//! generation, so a handle kept past removal never aliases whatever reuses
//! the slot.

use std::fmt;
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RawHandle {
    index: u32,
    generation: u32,
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Handle to a registered media session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub(crate) RawHandle);

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Handle to a registered audio capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureSourceHandle(pub(crate) RawHandle);

impl fmt::Display for CaptureSourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "capture#{}", self.0)
    }
}

struct Slot<T: ?Sized> {
    generation: u32,
    entry: Option<Weak<T>>,
}

pub(crate) struct HandleTable<T: ?Sized> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T: ?Sized> Default for HandleTable<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }
}

impl<T: ?Sized> HandleTable<T> {
    pub(crate) fn insert(&mut self, item: &Arc<T>) -> RawHandle {
        let weak = Arc::downgrade(item);
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(weak);
            return RawHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(weak),
        });
        RawHandle {
            index,
            generation: 0,
        }
    }

    /// Vacate the slot. Returns the reference it held, or None for a stale handle.
    pub(crate) fn remove(&mut self, handle: RawHandle) -> Option<Weak<T>> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Some(entry)
    }

    /// True while the handle's slot is occupied, even if the owner dropped the object.
    pub(crate) fn contains(&self, handle: RawHandle) -> bool {
        self.weak(handle).is_some()
    }

    pub(crate) fn weak(&self, handle: RawHandle) -> Option<Weak<T>> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.clone()
    }

    pub(crate) fn get(&self, handle: RawHandle) -> Option<Arc<T>> {
        self.weak(handle)?.upgrade()
    }

    /// Handle currently registered for `item`, if any.
    pub(crate) fn find(&self, item: &Arc<T>) -> Option<RawHandle> {
        let target = Arc::downgrade(item);
        self.slots.iter().enumerate().find_map(|(index, slot)| {
            let entry = slot.entry.as_ref()?;
            Weak::ptr_eq(entry, &target).then_some(RawHandle {
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    /// Every occupied slot's reference, in slot order.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (RawHandle, &Weak<T>)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|weak| {
                (
                    RawHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    weak,
                )
            })
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named: Send + Sync {
        fn name(&self) -> &str;
    }

    struct Item(&'static str);

    impl Named for Item {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn item(name: &'static str) -> Arc<dyn Named> {
        Arc::new(Item(name))
    }

    #[test]
    fn test_insert_and_resolve() {
        let mut table: HandleTable<dyn Named> = HandleTable::default();
        let a = item("a");
        let handle = table.insert(&a);

        assert_eq!(table.get(handle).map(|i| i.name().to_string()), Some("a".to_string()));
        assert_eq!(table.len(), 1);
        assert_eq!(table.find(&a), Some(handle));
    }

    #[test]
    fn test_stale_handle_after_slot_reuse() {
        let mut table: HandleTable<dyn Named> = HandleTable::default();
        let a = item("a");
        let b = item("b");

        let old = table.insert(&a);
        assert!(table.remove(old).is_some());
        let new = table.insert(&b);

        assert_eq!(old.index, new.index);
        assert_ne!(old, new);
        assert!(table.get(old).is_none());
        assert!(table.remove(old).is_none());
        assert_eq!(table.get(new).map(|i| i.name().to_string()), Some("b".to_string()));
    }

    #[test]
    fn test_dropped_owner_does_not_resolve() {
        let mut table: HandleTable<dyn Named> = HandleTable::default();
        let a = item("a");
        let handle = table.insert(&a);
        drop(a);

        assert!(table.contains(handle));
        assert!(table.get(handle).is_none());
        assert!(table.remove(handle).is_some());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_find_unknown_item() {
        let mut table: HandleTable<dyn Named> = HandleTable::default();
        let a = item("a");
        table.insert(&a);

        assert!(table.find(&item("stranger")).is_none());
        assert_eq!(table.entries().count(), 1);
    }
}
