//! Fixed-capacity ring buffer.
//!
//! Backs both the movement queue and the step buffer. Slots are addressed
//! by raw index so the optimizer can walk the queue and splice entries in
//! without moving the head.
//!
//! ## Indices
//!
//! | Name | Meaning |
//! |------|---------|
//! | head | Oldest element, next to be consumed |
//! | tail | Newest element |
//! | next tail | Free slot after the tail, filled by `next_tail_mut()` + `enqueue()` |
//!
//! `count()` always equals `(next_tail - head) mod N`, except when full
//! where both indices coincide.

/// Ring buffer of `N` slots holding `Copy` records.
#[derive(Debug, Clone)]
pub struct RingBuffer<T, const N: usize> {
    buffer: [T; N],
    head: usize,
    next_tail: usize,
    count: usize,
}

impl<T: Copy + Default, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default, const N: usize> RingBuffer<T, N> {
    pub fn new() -> Self {
        Self { buffer: [T::default(); N], head: 0, next_tail: 0, count: 0 }
    }

    // ─── State ──────────────────────────────────────────────────────

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[inline]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub const fn free_count(&self) -> usize {
        N - self.count
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub const fn is_full(&self) -> bool {
        self.count == N
    }

    // ─── Index Arithmetic ───────────────────────────────────────────

    #[inline]
    pub const fn next_index(&self, idx: usize) -> usize {
        (idx + 1) % N
    }

    #[inline]
    pub const fn prev_index(&self, idx: usize) -> usize {
        (idx + N - 1) % N
    }

    #[inline]
    pub const fn head_index(&self) -> usize {
        self.head
    }

    /// Index of the newest element (meaningless when empty).
    #[inline]
    pub const fn tail_index(&self) -> usize {
        (self.next_tail + N - 1) % N
    }

    #[inline]
    pub const fn next_tail_index(&self) -> usize {
        self.next_tail
    }

    /// True if `idx` addresses a queued element.
    #[inline]
    pub const fn is_in_queue(&self, idx: usize) -> bool {
        idx < N && (idx + N - self.head) % N < self.count
    }

    /// Queued element after `idx` toward the tail.
    pub fn next_in_queue(&self, idx: usize) -> Option<usize> {
        let next = self.next_index(idx);
        (self.is_in_queue(idx) && self.is_in_queue(next) && next != self.head).then_some(next)
    }

    /// Queued element before `idx` toward the head.
    pub fn prev_in_queue(&self, idx: usize) -> Option<usize> {
        (self.is_in_queue(idx) && idx != self.head).then(|| self.prev_index(idx))
    }

    // ─── Access ─────────────────────────────────────────────────────

    #[inline]
    pub fn get(&self, idx: usize) -> &T {
        &self.buffer[idx % N]
    }

    #[inline]
    pub fn get_mut(&mut self, idx: usize) -> &mut T {
        &mut self.buffer[idx % N]
    }

    pub fn head(&self) -> Option<&T> {
        (!self.is_empty()).then(|| &self.buffer[self.head])
    }

    pub fn head_mut(&mut self) -> Option<&mut T> {
        if self.is_empty() {
            return None;
        }
        Some(&mut self.buffer[self.head])
    }

    pub fn tail(&self) -> Option<&T> {
        (!self.is_empty()).then(|| &self.buffer[self.tail_index()])
    }

    /// Free slot after the tail. Not part of the queue until `enqueue()`.
    #[inline]
    pub fn next_tail_mut(&mut self) -> &mut T {
        &mut self.buffer[self.next_tail]
    }

    // ─── Mutation ───────────────────────────────────────────────────

    /// Commit the slot returned by `next_tail_mut()`. False when full.
    pub fn enqueue(&mut self) -> bool {
        if self.is_full() {
            return false;
        }
        self.next_tail = self.next_index(self.next_tail);
        self.count += 1;
        true
    }

    /// Append `value`; hands it back when full.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }
        *self.next_tail_mut() = value;
        self.enqueue();
        Ok(())
    }

    /// Remove and return the head.
    pub fn dequeue(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let value = self.buffer[self.head];
        self.head = self.next_index(self.head);
        self.count -= 1;
        Some(value)
    }

    /// Open a slot at `at`, shifting `at..=tail` one slot toward the tail.
    ///
    /// `at` must be queued or equal the next tail index. Returns the freed
    /// slot, already counted as queued. `None` when full or out of range.
    pub fn insert_at(&mut self, at: usize) -> Option<&mut T> {
        if self.is_full() || !(self.is_in_queue(at) || at == self.next_tail) {
            return None;
        }
        let mut idx = self.next_tail;
        while idx != at {
            let prev = self.prev_index(idx);
            self.buffer[idx] = self.buffer[prev];
            idx = prev;
        }
        self.next_tail = self.next_index(self.next_tail);
        self.count += 1;
        Some(&mut self.buffer[at])
    }

    /// Drop every element after `idx`; `idx` becomes the tail.
    pub fn remove_tail(&mut self, idx: usize) {
        if !self.is_in_queue(idx) {
            return;
        }
        self.next_tail = self.next_index(idx);
        self.count = (idx + N - self.head) % N + 1;
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.next_tail = 0;
        self.count = 0;
    }

    /// Queued indices from head to tail.
    pub fn indices(&self) -> impl DoubleEndedIterator<Item = usize> + '_ {
        (0..self.count).map(move |i| (self.head + i) % N)
    }

    /// Queued elements from head to tail.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        self.indices().map(move |i| &self.buffer[i])
    }
}
