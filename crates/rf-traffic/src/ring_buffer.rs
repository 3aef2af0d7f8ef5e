//! Fixed-capacity FIFO with oldest-eviction

use std::collections::VecDeque;

/// Fixed-capacity FIFO container
///
/// Pushing past capacity evicts the single oldest element in the same call,
/// so `len() <= capacity()` holds at all times. Iteration runs from oldest to
/// newest.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` items (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, returning the evicted oldest item if the buffer was full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Number of items held
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if nothing is held
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of items
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True if the next push will evict
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// Most recently pushed item
    pub fn newest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Oldest item still held
    pub fn oldest(&self) -> Option<&T> {
        self.items.front()
    }

    /// Drop every item, keeping the capacity
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<'a, T> IntoIterator for &'a RingBuffer<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_below_capacity() {
        let mut buf = RingBuffer::new(3);
        assert!(buf.push(1).is_none());
        assert!(buf.push(2).is_none());
        assert_eq!(buf.len(), 2);
        assert!(!buf.is_full());
        assert_eq!(buf.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_push_evicts_oldest() {
        let mut buf = RingBuffer::new(2);
        buf.push("a");
        buf.push("b");
        assert_eq!(buf.push("c"), Some("a"));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.oldest(), Some(&"b"));
        assert_eq!(buf.newest(), Some(&"c"));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buf = RingBuffer::new(0);
        assert_eq!(buf.capacity(), 1);
        buf.push(1);
        assert_eq!(buf.push(2), Some(1));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut buf = RingBuffer::new(4);
        buf.push(1);
        buf.push(2);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 4);
    }

    #[test]
    fn test_reverse_iteration_is_newest_first() {
        let mut buf = RingBuffer::new(3);
        for i in 0..5 {
            buf.push(i);
        }
        assert_eq!(buf.iter().rev().copied().collect::<Vec<_>>(), vec![4, 3, 2]);
    }
}
