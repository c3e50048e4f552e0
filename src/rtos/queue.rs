//! Fixed-capacity min-heap of pending actions.

use core::cmp::Ordering;

use heapless::binary_heap::{BinaryHeap, Min};
use heapless::Vec;

use super::action::ScheduledAction;

/// Heap entry ordered by due time, then by insertion sequence so that actions
/// due at the same tick fire first-in first-out.
#[derive(Clone, Copy, Debug)]
struct Entry {
    seq: u32,
    action: ScheduledAction,
}

impl Entry {
    fn key(&self) -> (u64, u32) {
        (self.action.due, self.seq)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

pub struct ActionQueue<const N: usize> {
    heap: BinaryHeap<Entry, Min, N>,
    next_seq: u32,
}

impl<const N: usize> ActionQueue<N> {
    pub const fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Hands the action back if the queue is full.
    pub fn push(&mut self, action: ScheduledAction) -> Result<(), ScheduledAction> {
        let entry = Entry { seq: self.next_seq, action };
        self.heap.push(entry).map_err(|e| e.action)?;
        self.next_seq = self.next_seq.wrapping_add(1);
        Ok(())
    }

    pub fn peek(&self) -> Option<&ScheduledAction> {
        self.heap.peek().map(|e| &e.action)
    }

    pub fn pop(&mut self) -> Option<ScheduledAction> {
        self.heap.pop().map(|e| e.action)
    }

    pub fn next_due(&self) -> Option<u64> {
        self.peek().map(|a| a.due)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() == N
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Copy of every pending action, earliest first.
    pub fn snapshot(&self) -> Vec<ScheduledAction, N> {
        let mut entries: Vec<Entry, N> = self.heap.iter().copied().collect();
        entries.sort_unstable();
        entries.iter().map(|e| e.action).collect()
    }
}

impl<const N: usize> Default for ActionQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
