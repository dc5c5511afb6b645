//! Binary min-heap over node indices with decrease-key.
//!
//! Each index `0..capacity` is in one of three states: never inserted,
//! queued with a key, or extracted with its final key.

/// State of an index in an [`IndexedHeap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<K> {
    Absent,
    Present(K),
    Extracted(K),
}

#[derive(Debug, Clone, Copy)]
enum Slot<K> {
    Absent,
    /// Position in `heap`.
    Queued(usize),
    Extracted(K),
}

#[derive(Debug, Clone)]
pub struct IndexedHeap<K> {
    heap: Vec<(usize, K)>,
    slots: Vec<Slot<K>>,
}

impl<K: Ord + Copy> IndexedHeap<K> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { heap: Vec::with_capacity(capacity), slots: vec![Slot::Absent; capacity] }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Queue `index` with `key`, or lower its key if already queued.
    ///
    /// Returns `false` (and does nothing) when the index was already
    /// extracted or is queued with a key not greater than `key`.
    pub fn insert_or_decrease_key(&mut self, index: usize, key: K) -> bool {
        if index >= self.slots.len() {
            self.slots.resize(index + 1, Slot::Absent);
        }
        match self.slots[index] {
            Slot::Extracted(_) => false,
            Slot::Queued(pos) => {
                if self.heap[pos].1 <= key {
                    return false;
                }
                self.heap[pos].1 = key;
                self.sift_up(pos);
                true
            }
            Slot::Absent => {
                self.heap.push((index, key));
                let pos = self.heap.len() - 1;
                self.slots[index] = Slot::Queued(pos);
                self.sift_up(pos);
                true
            }
        }
    }

    pub fn peek(&self) -> Option<(usize, K)> {
        self.heap.first().copied()
    }

    /// Remove the entry with the smallest key. The index is then
    /// `Extracted` and cannot be queued again.
    pub fn extract_min(&mut self) -> Option<(usize, K)> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.swap(0, last);
        let (index, key) = self.heap.pop()?;
        self.slots[index] = Slot::Extracted(key);
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some((index, key))
    }

    pub fn lookup(&self, index: usize) -> Lookup<K> {
        match self.slots.get(index) {
            None | Some(Slot::Absent) => Lookup::Absent,
            Some(Slot::Queued(pos)) => Lookup::Present(self.heap[*pos].1),
            Some(Slot::Extracted(k)) => Lookup::Extracted(*k),
        }
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        self.slots[self.heap[i].0] = Slot::Queued(i);
        self.slots[self.heap[j].0] = Slot::Queued(j);
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.heap[parent].1 <= self.heap[pos].1 {
                break;
            }
            self.swap(parent, pos);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let n = self.heap.len();
        loop {
            let (left, right) = (2 * pos + 1, 2 * pos + 2);
            let mut smallest = pos;
            if left < n && self.heap[left].1 < self.heap[smallest].1 {
                smallest = left;
            }
            if right < n && self.heap[right].1 < self.heap[smallest].1 {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.swap(pos, smallest);
            pos = smallest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decrease_key_and_states() {
        let mut h = IndexedHeap::with_capacity(4);
        assert!(h.insert_or_decrease_key(0, 10));
        assert!(h.insert_or_decrease_key(1, 5));
        assert!(h.insert_or_decrease_key(2, 7));
        assert!(!h.insert_or_decrease_key(0, 12));
        assert!(h.insert_or_decrease_key(0, 1));
        assert_eq!(h.lookup(0), Lookup::Present(1));
        assert_eq!(h.lookup(3), Lookup::Absent);

        assert_eq!(h.extract_min(), Some((0, 1)));
        assert_eq!(h.lookup(0), Lookup::Extracted(1));
        assert!(!h.insert_or_decrease_key(0, -5));
        assert_eq!(h.peek(), Some((1, 5)));
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn test_grows_past_capacity() {
        let mut h = IndexedHeap::with_capacity(0);
        assert!(h.insert_or_decrease_key(9, 3i64));
        assert_eq!(h.extract_min(), Some((9, 3)));
        assert!(h.is_empty());
    }

    proptest! {
        #[test]
        fn prop_extracts_in_key_order(keys in prop::collection::vec(-1000i64..1000, 1..64)) {
            let mut h = IndexedHeap::with_capacity(keys.len());
            for (i, k) in keys.iter().enumerate() {
                h.insert_or_decrease_key(i, *k);
            }
            let mut out = Vec::new();
            while let Some((_, k)) = h.extract_min() {
                out.push(k);
            }
            let mut sorted = keys.clone();
            sorted.sort_unstable();
            prop_assert_eq!(out, sorted);
        }
    }
}
