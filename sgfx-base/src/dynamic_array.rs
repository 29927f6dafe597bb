//! A growable array that keeps its first `N` elements inline and moves to the heap once it grows
//! past that. The draw and compute queues record into these so that a typical queue with a
//! handful of draws never allocates.

use std::fmt;
use std::mem::MaybeUninit;
use std::ops::{Deref, DerefMut};
use std::ptr;

enum Storage<T, const N: usize> {
    Inline {
        len: usize,
        data: [MaybeUninit<T>; N],
    },
    Heap(Vec<T>),
}

fn uninit_array<T, const N: usize>() -> [MaybeUninit<T>; N] {
    // SAFETY: an array of MaybeUninit does not require initialization
    unsafe { MaybeUninit::<[MaybeUninit<T>; N]>::uninit().assume_init() }
}

/// Vec-like storage with `N` elements of inline capacity.
///
/// Arrays with `N == 0` or a zero-sized `T` start out on the heap (which for zero-sized types never
/// allocates). Once an array has spilled to the heap it stays there, `clear()` keeps the heap
/// allocation so that queues which are re-recorded every frame stop allocating after the first
/// frame.
pub struct DynamicArray<T, const N: usize> {
    storage: Storage<T, N>,
}

impl<T, const N: usize> DynamicArray<T, N> {
    pub fn new() -> Self {
        let storage = if N == 0 || std::mem::size_of::<T>() == 0 {
            Storage::Heap(Vec::new())
        } else {
            Storage::Inline {
                len: 0,
                data: uninit_array(),
            }
        };

        DynamicArray { storage }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        if capacity > N {
            DynamicArray {
                storage: Storage::Heap(Vec::with_capacity(capacity)),
            }
        } else {
            Self::new()
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Inline { len, .. } => *len,
            Storage::Heap(vec) => vec.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        match &self.storage {
            Storage::Inline { .. } => N,
            Storage::Heap(vec) => vec.capacity(),
        }
    }

    /// True once the elements live in a heap allocation
    pub fn spilled(&self) -> bool {
        matches!(self.storage, Storage::Heap(_))
    }

    pub fn as_slice(&self) -> &[T] {
        match &self.storage {
            // SAFETY: elements 0..len are initialized
            Storage::Inline { len, data } => unsafe {
                std::slice::from_raw_parts(data.as_ptr() as *const T, *len)
            },
            Storage::Heap(vec) => vec.as_slice(),
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match &mut self.storage {
            // SAFETY: elements 0..len are initialized
            Storage::Inline { len, data } => unsafe {
                std::slice::from_raw_parts_mut(data.as_mut_ptr() as *mut T, *len)
            },
            Storage::Heap(vec) => vec.as_mut_slice(),
        }
    }

    // Moves the inline elements into a vec with room for at least min_capacity elements
    fn spill(
        &mut self,
        min_capacity: usize,
    ) {
        if let Storage::Inline { len, data } = &mut self.storage {
            let count = *len;
            let mut vec = Vec::with_capacity(min_capacity.max(N * 2).max(count));

            // Reset len first, if anything below panics the remaining elements leak rather than
            // being dropped twice
            *len = 0;
            for slot in &data[..count] {
                // SAFETY: slot was below len, and each is read exactly once
                vec.push(unsafe { slot.assume_init_read() });
            }

            self.storage = Storage::Heap(vec);
        }
    }

    pub fn reserve(
        &mut self,
        additional: usize,
    ) {
        match &mut self.storage {
            Storage::Inline { len, .. } => {
                let required = *len + additional;
                if required > N {
                    self.spill(required);
                }
            }
            Storage::Heap(vec) => vec.reserve(additional),
        }
    }

    pub fn push(
        &mut self,
        value: T,
    ) {
        if let Storage::Inline { len, data } = &mut self.storage {
            if *len < N {
                data[*len].write(value);
                *len += 1;
                return;
            }

            let required = *len + 1;
            self.spill(required);
        }

        if let Storage::Heap(vec) = &mut self.storage {
            vec.push(value);
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        match &mut self.storage {
            Storage::Inline { len, data } => {
                if *len == 0 {
                    return None;
                }

                *len -= 1;
                // SAFETY: the slot was below the old len and is now outside the initialized range
                Some(unsafe { data[*len].assume_init_read() })
            }
            Storage::Heap(vec) => vec.pop(),
        }
    }

    pub fn insert(
        &mut self,
        index: usize,
        value: T,
    ) {
        let length = self.len();
        assert!(index <= length, "insertion index {} out of bounds (len {})", index, length);

        if let Storage::Inline { len, data } = &mut self.storage {
            if *len < N {
                let base = data.as_mut_ptr() as *mut T;
                // SAFETY: index <= len < N, so shifting the tail up by one stays in bounds
                unsafe {
                    ptr::copy(base.add(index), base.add(index + 1), *len - index);
                    ptr::write(base.add(index), value);
                }
                *len += 1;
                return;
            }

            let required = *len + 1;
            self.spill(required);
        }

        if let Storage::Heap(vec) = &mut self.storage {
            vec.insert(index, value);
        }
    }

    pub fn remove(
        &mut self,
        index: usize,
    ) -> T {
        let length = self.len();
        assert!(index < length, "removal index {} out of bounds (len {})", index, length);

        match &mut self.storage {
            Storage::Inline { len, data } => {
                let base = data.as_mut_ptr() as *mut T;
                // SAFETY: index < len, the value is read once and the tail shifted over it
                unsafe {
                    let value = ptr::read(base.add(index));
                    ptr::copy(base.add(index + 1), base.add(index), *len - index - 1);
                    *len -= 1;
                    value
                }
            }
            Storage::Heap(vec) => vec.remove(index),
        }
    }

    pub fn swap_remove(
        &mut self,
        index: usize,
    ) -> T {
        let length = self.len();
        assert!(index < length, "swap_remove index {} out of bounds (len {})", index, length);

        match &mut self.storage {
            Storage::Inline { len, data } => {
                let base = data.as_mut_ptr() as *mut T;
                let last = *len - 1;
                // SAFETY: index and last are both below len. The last element is moved into the
                // hole (when they differ) and len shrinks so it is not dropped twice
                unsafe {
                    let value = ptr::read(base.add(index));
                    if index != last {
                        ptr::copy_nonoverlapping(base.add(last), base.add(index), 1);
                    }
                    *len = last;
                    value
                }
            }
            Storage::Heap(vec) => vec.swap_remove(index),
        }
    }

    pub fn truncate(
        &mut self,
        new_len: usize,
    ) {
        match &mut self.storage {
            Storage::Inline { len, data } => {
                while *len > new_len {
                    *len -= 1;
                    // SAFETY: the slot was initialized and is no longer counted by len
                    unsafe {
                        data[*len].assume_init_drop();
                    }
                }
            }
            Storage::Heap(vec) => vec.truncate(new_len),
        }
    }

    /// Drops all elements. Capacity (inline or heap) is kept.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    pub fn retain<F: FnMut(&T) -> bool>(
        &mut self,
        mut f: F,
    ) {
        match &mut self.storage {
            Storage::Inline { len, data } => {
                let original_len = *len;
                // A panic in f leaks the remaining elements instead of double dropping them
                *len = 0;

                let base = data.as_mut_ptr() as *mut T;
                let mut kept = 0;
                for i in 0..original_len {
                    // SAFETY: i < original_len so the element is initialized. Kept elements are
                    // compacted downward, removed elements are dropped exactly once
                    unsafe {
                        let element = base.add(i);
                        if f(&*element) {
                            if kept != i {
                                ptr::copy_nonoverlapping(element, base.add(kept), 1);
                            }
                            kept += 1;
                        } else {
                            ptr::drop_in_place(element);
                        }
                    }
                }

                *len = kept;
            }
            Storage::Heap(vec) => vec.retain(f),
        }
    }
}

impl<T: Clone, const N: usize> DynamicArray<T, N> {
    pub fn extend_from_slice(
        &mut self,
        values: &[T],
    ) {
        self.reserve(values.len());
        for value in values {
            self.push(value.clone());
        }
    }
}

impl<T, const N: usize> Drop for DynamicArray<T, N> {
    fn drop(&mut self) {
        if let Storage::Inline { .. } = self.storage {
            self.clear();
        }
    }
}

impl<T, const N: usize> Default for DynamicArray<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Deref for DynamicArray<T, N> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, const N: usize> DerefMut for DynamicArray<T, N> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: Clone, const N: usize> Clone for DynamicArray<T, N> {
    fn clone(&self) -> Self {
        let mut cloned = Self::with_capacity(self.len());
        cloned.extend_from_slice(self.as_slice());
        cloned
    }
}

impl<T: fmt::Debug, const N: usize> fmt::Debug for DynamicArray<T, N> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PartialEq, const N: usize> PartialEq for DynamicArray<T, N> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq, const N: usize> Eq for DynamicArray<T, N> {}

impl<T, const N: usize> Extend<T> for DynamicArray<T, N> {
    fn extend<I: IntoIterator<Item = T>>(
        &mut self,
        iter: I,
    ) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for value in iter {
            self.push(value);
        }
    }
}

impl<T, const N: usize> FromIterator<T> for DynamicArray<T, N> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut array = Self::new();
        array.extend(iter);
        array
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a DynamicArray<T, N> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a mut DynamicArray<T, N> {
    type Item = &'a mut T;
    type IntoIter = std::slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_mut_slice().iter_mut()
    }
}

/// By-value iterator over a `DynamicArray`. Elements that are not consumed are dropped with the
/// iterator.
pub enum IntoIter<T, const N: usize> {
    Inline {
        next: usize,
        end: usize,
        data: [MaybeUninit<T>; N],
    },
    Heap(std::vec::IntoIter<T>),
}

impl<T, const N: usize> Iterator for IntoIter<T, N> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match self {
            IntoIter::Inline { next, end, data } => {
                if *next == *end {
                    return None;
                }

                let index = *next;
                *next += 1;
                // SAFETY: slots next..end are initialized and each is read once
                Some(unsafe { data[index].assume_init_read() })
            }
            IntoIter::Heap(iter) => iter.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match self {
            IntoIter::Inline { next, end, .. } => *end - *next,
            IntoIter::Heap(iter) => iter.len(),
        };
        (remaining, Some(remaining))
    }
}

impl<T, const N: usize> ExactSizeIterator for IntoIter<T, N> {}

impl<T, const N: usize> Drop for IntoIter<T, N> {
    fn drop(&mut self) {
        if let IntoIter::Inline { .. } = self {
            for _ in self {}
        }
    }
}

impl<T, const N: usize> IntoIterator for DynamicArray<T, N> {
    type Item = T;
    type IntoIter = IntoIter<T, N>;

    fn into_iter(mut self) -> IntoIter<T, N> {
        let storage = std::mem::replace(&mut self.storage, Storage::Heap(Vec::new()));
        match storage {
            Storage::Inline { len, data } => IntoIter::Inline {
                next: 0,
                end: len,
                data,
            },
            Storage::Heap(vec) => IntoIter::Heap(vec.into_iter()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct DropCounter {
        drops: Rc<Cell<usize>>,
        value: u32,
    }

    impl DropCounter {
        fn new(
            drops: &Rc<Cell<usize>>,
            value: u32,
        ) -> Self {
            DropCounter {
                drops: drops.clone(),
                value,
            }
        }
    }

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test]
    fn test_stays_inline_until_full() {
        let mut array = DynamicArray::<u32, 4>::new();
        for i in 0..4 {
            array.push(i);
        }
        assert!(!array.spilled());
        assert_eq!(array.capacity(), 4);
        assert_eq!(array.as_slice(), &[0, 1, 2, 3]);

        array.push(4);
        assert!(array.spilled());
        assert!(array.capacity() >= 8);
        assert_eq!(array.as_slice(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_clear_keeps_heap_capacity() {
        let mut array = DynamicArray::<u32, 2>::new();
        array.extend(0..10);
        let capacity = array.capacity();
        array.clear();
        assert!(array.is_empty());
        assert!(array.spilled());
        assert_eq!(array.capacity(), capacity);
    }

    #[test]
    fn test_with_capacity_over_inline_goes_to_heap() {
        let array = DynamicArray::<u8, 4>::with_capacity(16);
        assert!(array.spilled());
        assert!(array.capacity() >= 16);

        let array = DynamicArray::<u8, 4>::with_capacity(3);
        assert!(!array.spilled());
    }

    #[test]
    fn test_every_element_dropped_once() {
        let drops = Rc::new(Cell::new(0));
        {
            let mut array = DynamicArray::<DropCounter, 3>::new();
            for i in 0..3 {
                array.push(DropCounter::new(&drops, i));
            }
            assert_eq!(drops.get(), 0);

            // Spilling moves the elements, it must not drop them
            array.push(DropCounter::new(&drops, 3));
            assert_eq!(drops.get(), 0);

            let popped = array.pop().unwrap();
            assert_eq!(popped.value, 3);
            drop(popped);
            assert_eq!(drops.get(), 1);
        }
        assert_eq!(drops.get(), 4);
    }

    #[test]
    fn test_inline_drop_and_truncate() {
        let drops = Rc::new(Cell::new(0));
        let mut array = DynamicArray::<DropCounter, 8>::new();
        for i in 0..5 {
            array.push(DropCounter::new(&drops, i));
        }

        array.truncate(2);
        assert_eq!(drops.get(), 3);
        assert_eq!(array.len(), 2);

        drop(array);
        assert_eq!(drops.get(), 5);
    }

    #[test]
    fn test_insert_and_remove_inline() {
        let mut array = DynamicArray::<u32, 8>::new();
        array.extend_from_slice(&[1, 2, 4]);
        array.insert(2, 3);
        array.insert(0, 0);
        assert_eq!(array.as_slice(), &[0, 1, 2, 3, 4]);

        assert_eq!(array.remove(0), 0);
        assert_eq!(array.remove(3), 4);
        assert_eq!(array.as_slice(), &[1, 2, 3]);

        assert_eq!(array.swap_remove(0), 1);
        assert_eq!(array.as_slice(), &[3, 2]);
        assert!(!array.spilled());
    }

    #[test]
    fn test_insert_spills_when_full() {
        let mut array = DynamicArray::<u32, 2>::new();
        array.push(1);
        array.push(3);
        array.insert(1, 2);
        assert!(array.spilled());
        assert_eq!(array.as_slice(), &[1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "insertion index 3 out of bounds")]
    fn test_insert_out_of_bounds() {
        let mut array = DynamicArray::<u32, 2>::new();
        array.push(1);
        array.insert(3, 2);
    }

    #[test]
    fn test_retain_inline() {
        let drops = Rc::new(Cell::new(0));
        let mut array = DynamicArray::<DropCounter, 8>::new();
        for i in 0..6 {
            array.push(DropCounter::new(&drops, i));
        }

        array.retain(|x| x.value % 2 == 0);
        assert_eq!(drops.get(), 3);
        let values: Vec<u32> = array.iter().map(|x| x.value).collect();
        assert_eq!(values, vec![0, 2, 4]);
    }

    #[test]
    fn test_sort_through_deref() {
        let mut array: DynamicArray<u32, 8> = [5, 1, 4, 2].iter().copied().collect();
        array.sort_by_key(|x| *x);
        assert_eq!(array.as_slice(), &[1, 2, 4, 5]);
        assert_eq!(array[2], 4);
    }

    #[test]
    fn test_clone_and_eq() {
        let mut array = DynamicArray::<String, 2>::new();
        array.push("a".to_string());
        let inline_clone = array.clone();
        assert_eq!(inline_clone, array);

        array.push("b".to_string());
        array.push("c".to_string());
        let heap_clone = array.clone();
        assert_eq!(heap_clone, array);
        assert_ne!(heap_clone, inline_clone);
    }

    #[test]
    fn test_into_iter_drops_unconsumed() {
        let drops = Rc::new(Cell::new(0));
        let mut array = DynamicArray::<DropCounter, 4>::new();
        for i in 0..4 {
            array.push(DropCounter::new(&drops, i));
        }

        let mut iter = array.into_iter();
        let first = iter.next().unwrap();
        assert_eq!(first.value, 0);
        assert_eq!(iter.len(), 3);
        drop(iter);
        assert_eq!(drops.get(), 3);
        drop(first);
        assert_eq!(drops.get(), 4);
    }

    #[test]
    fn test_zero_inline_capacity() {
        let mut array = DynamicArray::<u64, 0>::new();
        assert!(array.spilled());
        array.push(7);
        assert_eq!(array.pop(), Some(7));
        assert_eq!(array.pop(), None);
    }

    #[test]
    fn test_zero_sized_type() {
        let mut array = DynamicArray::<(), 4>::new();
        for _ in 0..100 {
            array.push(());
        }
        assert_eq!(array.len(), 100);
        assert_eq!(array.capacity(), usize::MAX);
    }
}
