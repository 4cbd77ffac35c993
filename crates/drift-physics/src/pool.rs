/// Values that can be recycled through a [`Pool`]
pub trait Poolable {
    /// Clear per-use state while keeping allocations
    fn reset(&mut self);
}

/// Single-threaded free list.
///
/// Once warm, acquiring and releasing never allocates.
#[derive(Debug)]
pub struct Pool<T> {
    free: Vec<T>,
    created: usize,
}

impl<T: Poolable + Default> Pool<T> {
    pub fn new() -> Self {
        Self {
            free: Vec::new(),
            created: 0,
        }
    }

    /// Take a reset item, creating one only when the free list is empty
    pub fn acquire(&mut self) -> T {
        match self.free.pop() {
            Some(item) => item,
            None => {
                self.created += 1;
                T::default()
            }
        }
    }

    /// Return an item to the free list
    pub fn release(&mut self, mut item: T) {
        item.reset();
        self.free.push(item);
    }

    /// Items ever created by this pool
    pub fn created(&self) -> usize {
        self.created
    }

    /// Items currently available without allocating
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

impl<T: Poolable + Default> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}
