//! FIFO queue holding a train's pending waypoints.

use std::collections::VecDeque;

/// A first-in first-out queue with peek and clear.
#[derive(Debug, Clone, PartialEq)]
pub struct Queue<T> {
    items: VecDeque<T>,
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Appends one item at the back.
    pub fn push(&mut self, value: T) {
        self.items.push_back(value);
    }

    /// Appends every item, preserving order.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, values: I) {
        self.items.extend(values);
    }

    /// Removes and returns the front item.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    /// Deletes all the items from the queue.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for Queue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut q = Queue::new();
        q.push(1);
        q.extend([2, 3]);

        assert_eq!(q.len(), 3);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_peek_does_not_remove() {
        let mut q: Queue<&str> = ["a", "b"].into_iter().collect();
        assert_eq!(q.peek(), Some(&"a"));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(), Some("a"));
        assert_eq!(q.peek(), Some(&"b"));
    }

    #[test]
    fn test_clear_and_empty() {
        let mut q: Queue<u8> = Queue::default();
        assert!(q.is_empty());
        assert_eq!(q.peek(), None);

        q.extend(0..5);
        q.clear();
        assert!(q.is_empty());
        // Clearing an empty queue is fine
        q.clear();
        assert_eq!(q.iter().count(), 0);
    }
}
