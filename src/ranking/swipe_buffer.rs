/// Returned by [`OrderedPopBuffer::push`] when the buffer is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Swipe buffer has reached its capacity of {capacity} items")]
pub struct CapacityExceeded {
    pub capacity: usize,
}

/// Last-in-first-out buffer serving candidates one at a time
///
/// One buffer per participant; it is never shared between tasks. An empty
/// buffer is the normal end of a swipe session, so [`pop`](Self::pop) and
/// [`peek`](Self::peek) report it with `None` rather than an error.
#[derive(Debug, Clone)]
pub struct OrderedPopBuffer<T> {
    items: Vec<T>,
    capacity: Option<usize>,
}

impl<T> Default for OrderedPopBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrderedPopBuffer<T> {
    /// Creates an unbounded buffer
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            capacity: None,
        }
    }

    /// Creates a buffer that rejects pushes beyond `capacity` items
    pub fn bounded(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity: Some(capacity),
        }
    }

    pub fn push(&mut self, item: T) -> Result<(), CapacityExceeded> {
        if let Some(capacity) = self.capacity {
            if self.items.len() >= capacity {
                return Err(CapacityExceeded { capacity });
            }
        }
        self.items.push(item);
        Ok(())
    }

    /// Removes and returns the most recently pushed item
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// The item the next [`pop`](Self::pop) would return
    pub fn peek(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_order_is_reverse_of_push_order() {
        let mut buffer = OrderedPopBuffer::new();
        for i in 0..5 {
            buffer.push(i).unwrap();
        }

        let popped: Vec<i32> = std::iter::from_fn(|| buffer.pop()).collect();
        assert_eq!(popped, vec![4, 3, 2, 1, 0]);
        assert_eq!(buffer.pop(), None);
        assert_eq!(buffer.size(), 0);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut buffer = OrderedPopBuffer::new();
        buffer.push("m1").unwrap();
        buffer.push("m2").unwrap();

        assert_eq!(buffer.peek(), Some(&"m2"));
        assert_eq!(buffer.size(), 2);
        assert_eq!(buffer.pop(), Some("m2"));
        assert_eq!(buffer.peek(), Some(&"m1"));
    }

    #[test]
    fn test_empty_buffer_signals_none() {
        let mut buffer: OrderedPopBuffer<u8> = OrderedPopBuffer::default();
        assert!(buffer.is_empty());
        assert_eq!(buffer.peek(), None);
        assert_eq!(buffer.pop(), None);
    }

    #[test]
    fn test_bounded_buffer_rejects_overflow() {
        let mut buffer = OrderedPopBuffer::bounded(2);
        buffer.push('a').unwrap();
        buffer.push('b').unwrap();

        let err = buffer.push('c').unwrap_err();
        assert_eq!(err, CapacityExceeded { capacity: 2 });
        assert_eq!(buffer.size(), 2);
        assert_eq!(buffer.peek(), Some(&'b'));
    }
}
