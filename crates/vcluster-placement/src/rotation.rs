//! Cyclic candidate rotation with eviction.
//!
//! Pools, hosts and datastores are all handed out the same way: walk the
//! candidates starting at a cursor, wrap around once, and drop candidates
//! that can no longer serve anything in this pass. The rotation owns its
//! candidate list; callers never mutate it behind the cursor's back.

use rand::Rng;
use rand::seq::SliceRandom;

/// Answer of a visitor for one candidate during [`Rotation::cycle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<R> {
    /// Use this candidate; the cursor stays on it.
    Take(R),
    /// Not now, move on to the next candidate.
    Pass,
    /// Never again in this rotation.
    Evict,
}

/// Candidates visited in round-robin order from a cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct Rotation<T> {
    items: Vec<T>,
    cursor: usize,
}

impl<T> Rotation<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, cursor: 0 }
    }

    /// Start from a random permutation of `items`.
    pub fn shuffled<R: Rng + ?Sized>(mut items: Vec<T>, rng: &mut R) -> Self {
        items.shuffle(rng);
        Self::new(items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Candidate under the cursor.
    pub fn current(&self) -> Option<&T> {
        self.items.get(self.cursor)
    }

    /// Move the cursor one step, wrapping around.
    pub fn advance(&mut self) {
        if !self.items.is_empty() {
            self.cursor = (self.cursor + 1) % self.items.len();
        }
    }

    /// Remove the candidate under the cursor; the cursor moves to its successor.
    pub fn evict_current(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let item = self.items.remove(self.cursor);
        if self.cursor >= self.items.len() {
            self.cursor = 0;
        }
        Some(item)
    }

    /// Evict every candidate for which `keep` returns false.
    ///
    /// The cursor stays on the first surviving candidate at or after it.
    pub fn retain<F: FnMut(&T) -> bool>(&mut self, mut keep: F) {
        let mut kept = Vec::with_capacity(self.items.len());
        let mut cursor = None;
        for (i, item) in self.items.drain(..).enumerate() {
            if keep(&item) {
                if cursor.is_none() && i >= self.cursor {
                    cursor = Some(kept.len());
                }
                kept.push(item);
            }
        }
        self.items = kept;
        self.cursor = cursor.unwrap_or(0);
    }

    /// One full lap over the candidates, starting at the cursor.
    pub fn lap(&self) -> impl Iterator<Item = &T> {
        let (head, tail) = self.items.split_at(self.cursor);
        tail.iter().chain(head.iter())
    }

    /// Place the cursor just after `item`, so the next lap starts behind it.
    pub fn advance_past(&mut self, item: &T)
    where
        T: PartialEq,
    {
        if let Some(pos) = self.items.iter().position(|i| i == item) {
            self.cursor = (pos + 1) % self.items.len();
        }
    }

    /// Visit candidates from the cursor until one is taken or a lap completes.
    ///
    /// Each remaining candidate is visited at most once. Evicted candidates
    /// are gone for good; passed ones stay for the next call.
    pub fn cycle<R, F>(&mut self, mut visit: F) -> Option<(T, R)>
    where
        T: Clone,
        F: FnMut(&T) -> Verdict<R>,
    {
        let mut remaining = self.items.len();
        while remaining > 0 {
            let item = self.items[self.cursor].clone();
            match visit(&item) {
                Verdict::Take(r) => return Some((item, r)),
                Verdict::Pass => self.advance(),
                Verdict::Evict => {
                    self.evict_current();
                }
            }
            remaining -= 1;
        }
        None
    }
}
