use std::collections::HashMap;
use std::sync::Mutex;

/// Reorders indexed items produced out of order into in-order delivery.
///
/// A small `index → item` map with a monotonically advancing "next to emit"
/// cursor; add-and-drain happens under one mutex. An item whose index is
/// ahead of the cursor is held until every lower index has been emitted.
pub struct OrderedBuffer<T> {
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    pending: HashMap<usize, T>,
    next_index: usize,
}

impl<T> OrderedBuffer<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: HashMap::new(),
                next_index: 0,
            }),
        }
    }

    /// Insert `item` at `index` and return everything now deliverable, in
    /// order. A duplicate index overwrites the held item.
    pub fn push(&self, index: usize, item: T) -> Vec<(usize, T)> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        inner.pending.insert(index, item);

        let mut ready = Vec::new();
        while let Some(item) = inner.pending.remove(&inner.next_index) {
            ready.push((inner.next_index, item));
            inner.next_index += 1;
        }
        ready
    }

    /// Forget held items and rewind the cursor (new reply, new sequence).
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.pending.clear();
        inner.next_index = 0;
    }
}

impl<T> Default for OrderedBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}
