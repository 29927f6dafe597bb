use std::fmt;

/// Generational key into a `HandleTable`. The generation changes every time a slot is freed, so a
/// handle that outlives its value never resolves to whatever reuses the slot.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle {
    index: u32,
    generation: u32,
}

impl RawHandle {
    /// Never resolves in any table
    pub const INVALID: RawHandle = RawHandle {
        index: u32::MAX,
        generation: u32::MAX,
    };

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn is_invalid(&self) -> bool {
        *self == Self::INVALID
    }
}

impl Default for RawHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "RawHandle(INVALID)")
        } else {
            write!(f, "RawHandle({}v{})", self.index, self.generation)
        }
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Fixed-capacity storage for backend objects. All slots are allocated up front and the table
/// never grows, a full table refuses inserts instead.
pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,

    // Indices of empty slots, next to be used on top
    free_list: Vec<u32>,
    len: usize,
}

impl<T> HandleTable<T> {
    pub fn new(capacity: u32) -> Self {
        assert!(capacity < u32::MAX, "handle table capacity {} is too large", capacity);

        let mut slots = Vec::with_capacity(capacity as usize);
        slots.resize_with(capacity as usize, || Slot {
            generation: 0,
            value: None,
        });

        // reverse so index 0 is handed out first
        let free_list = (0..capacity).rev().collect();

        HandleTable {
            slots,
            free_list,
            len: 0,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns None if every slot is in use
    pub fn insert(
        &mut self,
        value: T,
    ) -> Option<RawHandle> {
        let index = self.free_list.pop()?;
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.value.is_none());
        slot.value = Some(value);
        self.len += 1;

        Some(RawHandle {
            index,
            generation: slot.generation,
        })
    }

    fn slot(
        &self,
        handle: RawHandle,
    ) -> Option<&Slot<T>> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
    }

    pub fn contains(
        &self,
        handle: RawHandle,
    ) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(
        &self,
        handle: RawHandle,
    ) -> Option<&T> {
        self.slot(handle)?.value.as_ref()
    }

    pub fn get_mut(
        &mut self,
        handle: RawHandle,
    ) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?
            .value
            .as_mut()
    }

    pub fn remove(
        &mut self,
        handle: RawHandle,
    ) -> Option<T> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?;

        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RawHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    RawHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RawHandle, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                let generation = slot.generation;
                slot.value.as_mut().map(|value| {
                    (
                        RawHandle {
                            index: index as u32,
                            generation,
                        },
                        value,
                    )
                })
            })
    }

    /// Removes every value, returning them with the handles they were stored under
    pub fn drain(&mut self) -> Vec<(RawHandle, T)> {
        let handles: Vec<RawHandle> = self.iter().map(|(handle, _)| handle).collect();
        handles
            .into_iter()
            .filter_map(|handle| self.remove(handle).map(|value| (handle, value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_until_full() {
        let mut table = HandleTable::new(3);
        let a = table.insert("a").unwrap();
        let b = table.insert("b").unwrap();
        let c = table.insert("c").unwrap();
        assert!(table.insert("d").is_none());

        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(c.index(), 2);
        assert_eq!(table.len(), 3);
        assert_eq!(table.capacity(), 3);
        assert_eq!(*table.get(b).unwrap(), "b");
    }

    #[test]
    fn test_stale_handle_does_not_resolve() {
        let mut table = HandleTable::new(4);
        let first = table.insert(1).unwrap();
        assert_eq!(table.remove(first), Some(1));

        let second = table.insert(2).unwrap();
        assert_eq!(second.index(), first.index());
        assert_ne!(second.generation(), first.generation());

        assert!(table.get(first).is_none());
        assert!(table.remove(first).is_none());
        assert_eq!(*table.get(second).unwrap(), 2);
    }

    #[test]
    fn test_most_recently_freed_reused_first() {
        let mut table = HandleTable::new(8);
        let handles: Vec<_> = (0..5).map(|i| table.insert(i).unwrap()).collect();
        table.remove(handles[1]);
        table.remove(handles[3]);

        assert_eq!(table.insert(10).unwrap().index(), 3);
        assert_eq!(table.insert(11).unwrap().index(), 1);
        assert_eq!(table.insert(12).unwrap().index(), 5);
    }

    #[test]
    fn test_invalid_never_resolves() {
        let mut table = HandleTable::new(2);
        table.insert(0).unwrap();
        assert!(!table.contains(RawHandle::INVALID));
        assert!(table.remove(RawHandle::INVALID).is_none());
        assert!(RawHandle::default().is_invalid());
    }

    #[test]
    fn test_iter_and_drain() {
        let mut table = HandleTable::new(4);
        let a = table.insert(10).unwrap();
        let b = table.insert(20).unwrap();
        let c = table.insert(30).unwrap();
        table.remove(b);

        for (_, value) in table.iter_mut() {
            *value += 1;
        }

        let values: Vec<_> = table.iter().map(|(_, value)| *value).collect();
        assert_eq!(values, vec![11, 31]);

        let drained = table.drain();
        assert_eq!(drained, vec![(a, 11), (c, 31)]);
        assert!(table.is_empty());
        assert!(!table.contains(a));
        assert_eq!(table.capacity(), 4);
    }

    #[test]
    #[should_panic(expected = "is too large")]
    fn test_capacity_limit() {
        let _table = HandleTable::<u8>::new(u32::MAX);
    }
}
