use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    weight: u64,
}

/// Bounded set of the heaviest values seen so far.
///
/// A min-heap on weight plus a value-to-slot index, so both updating a
/// tracked value and evicting the lightest one are `O(log n)`.
#[derive(Debug, Clone)]
pub struct TopHeavyHitters<T> {
    capacity: usize,
    heap: Vec<Entry<T>>,
    index: HashMap<T, usize>,
}

impl<T: Clone + Eq + Hash> TopHeavyHitters<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, value: &T) -> bool {
        self.index.contains_key(value)
    }

    /// Weight of the lightest tracked value, or zero while not full.
    pub fn lowest_hit_weight(&self) -> u64 {
        if self.heap.len() < self.capacity {
            0
        } else {
            self.heap.first().map_or(0, |entry| entry.weight)
        }
    }

    /// Offer `value` with its current estimated `weight`. Returns `true` if
    /// the value is tracked afterwards.
    pub fn update(&mut self, value: T, weight: u64) -> bool {
        if self.capacity == 0 {
            return false;
        }

        if let Some(&slot) = self.index.get(&value) {
            let entry = &mut self.heap[slot];
            if weight > entry.weight {
                entry.weight = weight;
                self.sift_down(slot);
            }
            return true;
        }

        if self.heap.len() < self.capacity {
            self.heap.push(Entry {
                value: value.clone(),
                weight,
            });
            let slot = self.heap.len() - 1;
            self.index.insert(value, slot);
            self.sift_up(slot);
            return true;
        }

        if weight <= self.heap[0].weight {
            return false;
        }

        let evicted = std::mem::replace(
            &mut self.heap[0],
            Entry {
                value: value.clone(),
                weight,
            },
        );
        self.index.remove(&evicted.value);
        self.index.insert(value, 0);
        self.sift_down(0);
        true
    }

    /// Tracked values with weights, heaviest first.
    pub fn snapshot(&self) -> Vec<(T, u64)> {
        let mut entries: Vec<_> = self
            .heap
            .iter()
            .map(|entry| (entry.value.clone(), entry.weight))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.heap[slot].weight >= self.heap[parent].weight {
                break;
            }
            self.swap(slot, parent);
            slot = parent;
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut smallest = slot;
            if left < len && self.heap[left].weight < self.heap[smallest].weight {
                smallest = left;
            }
            if right < len && self.heap[right].weight < self.heap[smallest].weight {
                smallest = right;
            }
            if smallest == slot {
                break;
            }
            self.swap(slot, smallest);
            slot = smallest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        if let Some(slot) = self.index.get_mut(&self.heap[a].value) {
            *slot = a;
        }
        if let Some(slot) = self.index.get_mut(&self.heap[b].value) {
            *slot = b;
        }
    }
}
