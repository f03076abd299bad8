//! Circular index arithmetic and cursor state
//!
//! Full/empty disambiguation is done with an occupancy counter: when the
//! write and read positions coincide, `occupied` tells whether every slot is
//! unreleased or none is.

use std::ops::Range;

/// Wrap-aware index arithmetic over `0..capacity`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircularIndex {
    capacity: usize,
}

impl CircularIndex {
    /// Create index arithmetic for a ring of `capacity` slots (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Map any logical position onto a slot index
    pub fn wrap(&self, pos: usize) -> usize {
        pos % self.capacity
    }

    pub fn next(&self, id: usize) -> usize {
        if id + 1 >= self.capacity {
            0
        } else {
            id + 1
        }
    }

    pub fn prev(&self, id: usize) -> usize {
        if id == 0 {
            self.capacity - 1
        } else {
            id - 1
        }
    }

    /// Number of forward steps from `from` to reach `to`
    pub fn distance(&self, from: usize, to: usize) -> usize {
        (to + self.capacity - from) % self.capacity
    }

    /// Split the inclusive circular span `first..=last` into at most two linear ranges
    pub fn span(&self, first: usize, last: usize) -> (Range<usize>, Range<usize>) {
        if first <= last {
            (first..last + 1, 0..0)
        } else {
            (first..self.capacity, 0..last + 1)
        }
    }
}

/// Writer and reader positions of a ring.
///
/// Slots `read, read+1, .., read+occupied-1` (modulo capacity) are
/// unreleased and may not be overwritten. When `held` is set, the slot at
/// `read` has been delivered but is kept reserved, so unread readings start
/// one slot later.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursors {
    index: CircularIndex,
    write: usize,
    read: usize,
    held: bool,
    occupied: usize,
    data_count: usize,
    last_sent: Option<usize>,
}

impl Cursors {
    pub fn new(capacity: usize) -> Self {
        Self {
            index: CircularIndex::new(capacity),
            write: 0,
            read: 0,
            held: false,
            occupied: 0,
            data_count: 0,
            last_sent: None,
        }
    }

    pub fn index(&self) -> CircularIndex {
        self.index
    }

    pub fn capacity(&self) -> usize {
        self.index.capacity()
    }

    /// Next slot to be written
    pub fn write_pos(&self) -> usize {
        self.write
    }

    /// Oldest unreleased slot
    pub fn read_pos(&self) -> usize {
        self.read
    }

    /// Whether the slot at `read_pos` is delivered but still reserved
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Number of unreleased slots, the held one included
    pub fn occupied(&self) -> usize {
        self.occupied
    }

    pub fn unread_count(&self) -> usize {
        self.occupied - usize::from(self.held)
    }

    pub fn is_full(&self) -> bool {
        self.occupied == self.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.unread_count() == 0
    }

    /// Writes since the last call to [`Cursors::take_data_count`]
    pub fn data_count(&self) -> usize {
        self.data_count
    }

    pub fn take_data_count(&mut self) -> usize {
        std::mem::take(&mut self.data_count)
    }

    pub fn last_sent(&self) -> Option<usize> {
        self.last_sent
    }

    pub fn set_last_sent(&mut self, id: usize) {
        self.last_sent = Some(id);
    }

    pub fn first_unread(&self) -> Option<usize> {
        if self.is_empty() {
            None
        } else if self.held {
            Some(self.index.next(self.read))
        } else {
            Some(self.read)
        }
    }

    pub fn last_unread(&self) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some(self.index.prev(self.write))
        }
    }

    /// Whether `id` lies in the unreleased region
    pub fn contains(&self, id: usize) -> bool {
        id < self.capacity() && self.index.distance(self.read, id) < self.occupied
    }

    /// Commit the slot at `write_pos`. Returns the committed slot, or `None` when full.
    pub fn advance_write(&mut self) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        let written = self.write;
        self.write = self.index.next(self.write);
        self.occupied += 1;
        self.data_count += 1;
        Some(written)
    }

    /// Release every slot strictly before `id` and keep `id` reserved.
    ///
    /// Returns false and changes nothing when `id` is not unreleased.
    pub fn release_until(&mut self, id: usize) -> bool {
        if !self.contains(id) {
            return false;
        }
        let offset = self.index.distance(self.read, id);
        self.read = id;
        self.occupied -= offset;
        self.held = true;
        true
    }

    /// Release every slot up to and including `id`.
    ///
    /// Returns false and changes nothing when `id` is not unreleased.
    pub fn release(&mut self, id: usize) -> bool {
        if !self.contains(id) {
            return false;
        }
        let offset = self.index.distance(self.read, id);
        self.read = self.index.next(id);
        self.occupied -= offset + 1;
        self.held = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    #[test]
    fn test_index_wraps() {
        let index = CircularIndex::new(4);
        assert_eq!(index.next(3), 0);
        assert_eq!(index.prev(0), 3);
        assert_eq!(index.distance(3, 1), 2);
        assert_eq!(index.distance(2, 2), 0);
        assert_eq!(index.wrap(9), 1);
    }

    #[test]
    fn test_span_split() {
        let index = CircularIndex::new(5);
        assert_eq!(index.span(1, 3), (1..4, 0..0));
        assert_eq!(index.span(3, 1), (3..5, 0..2));
        assert_eq!(index.span(4, 4), (4..5, 0..0));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let index = CircularIndex::new(0);
        assert_eq!(index.capacity(), 1);
        assert_eq!(index.next(0), 0);
    }

    #[test]
    fn test_full_and_empty_at_same_position() {
        let mut cursors = Cursors::new(3);
        assert!(cursors.is_empty());
        assert_eq!(cursors.write_pos(), cursors.read_pos());

        for _ in 0..3 {
            assert!(cursors.advance_write().is_some());
        }
        assert_eq!(cursors.write_pos(), cursors.read_pos());
        assert!(cursors.is_full());
        assert!(!cursors.is_empty());
        assert!(cursors.advance_write().is_none());

        assert!(cursors.release(2));
        assert_eq!(cursors.write_pos(), cursors.read_pos());
        assert!(cursors.is_empty());
        assert!(!cursors.is_full());
    }

    #[test]
    fn test_release_until_keeps_slot_reserved() {
        let mut cursors = Cursors::new(4);
        for _ in 0..3 {
            cursors.advance_write();
        }
        assert!(cursors.release_until(1));
        assert_eq!(cursors.read_pos(), 1);
        assert!(cursors.is_held());
        assert_eq!(cursors.occupied(), 2);
        assert_eq!(cursors.unread_count(), 1);
        assert_eq!(cursors.first_unread(), Some(2));
        assert_eq!(cursors.last_unread(), Some(2));

        assert!(cursors.release_until(2));
        assert!(cursors.is_empty());
        assert_eq!(cursors.first_unread(), None);
        assert_eq!(cursors.occupied(), 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut cursors = Cursors::new(4);
        for _ in 0..3 {
            cursors.advance_write();
        }
        assert!(cursors.release(1));
        let after_first = cursors.clone();
        assert!(!cursors.release(1));
        assert_eq!(cursors, after_first);
    }

    #[test]
    fn test_data_count_reset() {
        let mut cursors = Cursors::new(8);
        for _ in 0..5 {
            cursors.advance_write();
        }
        assert_eq!(cursors.take_data_count(), 5);
        assert_eq!(cursors.data_count(), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Write,
        ReleaseUntil(usize),
        Release(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => Just(Op::Write),
            1 => (0usize..16).prop_map(Op::ReleaseUntil),
            1 => (0usize..16).prop_map(Op::Release),
        ]
    }

    proptest! {
        #[test]
        fn prop_cursors_match_model(capacity in 1usize..8, ops in prop::collection::vec(op_strategy(), 0..64)) {
            let mut cursors = Cursors::new(capacity);
            // unreleased slots, oldest first, plus whether the front is held
            let mut model: VecDeque<usize> = VecDeque::new();
            let mut held = false;
            let mut next_write = 0usize;

            for op in ops {
                match op {
                    Op::Write => {
                        let written = cursors.advance_write();
                        if model.len() == capacity {
                            prop_assert!(written.is_none());
                        } else {
                            prop_assert_eq!(written, Some(next_write));
                            model.push_back(next_write);
                            next_write = (next_write + 1) % capacity;
                        }
                    }
                    Op::ReleaseUntil(k) => {
                        if model.is_empty() {
                            prop_assert!(!cursors.release_until(k % capacity));
                        } else {
                            let offset = k % model.len();
                            let id = model[offset];
                            prop_assert!(cursors.release_until(id));
                            model.drain(..offset);
                            held = true;
                        }
                    }
                    Op::Release(k) => {
                        if model.is_empty() {
                            prop_assert!(!cursors.release(k % capacity));
                        } else {
                            let offset = k % model.len();
                            let id = model[offset];
                            prop_assert!(cursors.release(id));
                            model.drain(..=offset);
                            held = false;
                        }
                    }
                }

                prop_assert_eq!(cursors.occupied(), model.len());
                prop_assert_eq!(cursors.is_full(), model.len() == capacity);
                let unread = model.len() - usize::from(held && !model.is_empty());
                prop_assert_eq!(cursors.unread_count(), unread);
                prop_assert_eq!(cursors.is_empty(), unread == 0);
                prop_assert_eq!(cursors.write_pos(), next_write);
                if let Some(&front) = model.front() {
                    prop_assert_eq!(cursors.read_pos(), front);
                }
            }
        }
    }
}
