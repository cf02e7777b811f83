use std::num::NonZeroUsize;

/// Fixed-capacity circular buffer.
///
/// Storage is allocated once at construction; once full, every push overwrites
/// the oldest slot in place and advances `head`. Iteration always runs from
/// oldest to newest.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots:    Vec<T>,
    /// Index of the oldest element. Stays at 0 until the buffer first fills.
    head:     usize,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            slots:    Vec::with_capacity(capacity.get()),
            head:     0,
            capacity: capacity.get(),
        }
    }

    /// Push a value, returning the evicted oldest value if the buffer was full.
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.slots.len() < self.capacity {
            self.slots.push(value);
            return None;
        }
        let evicted = std::mem::replace(&mut self.slots[self.head], value);
        self.head = (self.head + 1) % self.capacity;
        Some(evicted)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn oldest(&self) -> Option<&T> {
        self.get(0)
    }

    pub fn newest(&self) -> Option<&T> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Element at logical position `index`, where 0 is the oldest.
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.slots.len() {
            return None;
        }
        self.slots.get((self.head + index) % self.slots.len())
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + '_ {
        let len = self.slots.len();
        (0..len).map(move |i| &self.slots[(self.head + i) % len])
    }

    /// The newest `n` elements (fewer if not yet available), oldest first.
    pub fn last_n(&self, n: usize) -> impl Iterator<Item = &T> + '_ {
        let skip = self.len().saturating_sub(n);
        self.iter().skip(skip)
    }
}
