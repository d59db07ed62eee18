//! Specialized collection types

/// Items that can be returned to a [`FramePool`] and handed out again
///
/// `recycle` must leave the item in its "freshly acquired" state while
/// keeping any heap capacity it has grown.
pub trait Recycle: Default {
    /// Reset the item for reuse
    fn recycle(&mut self);
}

/// Frame-local pool addressed by small integer indices
///
/// Items are acquired in order during a frame and all released at once with
/// [`FramePool::reset`]. Storage is never freed, so after the first few
/// frames acquisition does not touch the allocator.
#[derive(Debug)]
pub struct FramePool<T: Recycle> {
    items: Vec<T>,
    live: usize,
}

impl<T: Recycle> FramePool<T> {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            live: 0,
        }
    }

    /// Borrow an item for the rest of the frame and return its index
    pub fn acquire(&mut self) -> usize {
        let index = self.live;
        if index == self.items.len() {
            self.items.push(T::default());
        }
        self.live += 1;
        index
    }

    /// Return every live item to the pool
    pub fn reset(&mut self) {
        for item in &mut self.items[..self.live] {
            item.recycle();
        }
        self.live = 0;
    }

    /// Get a live item by index
    pub fn get(&self, index: usize) -> &T {
        assert!(index < self.live, "pool index {} is not live ({} live)", index, self.live);
        &self.items[index]
    }

    /// Get a mutable reference to a live item by index
    pub fn get_mut(&mut self, index: usize) -> &mut T {
        assert!(index < self.live, "pool index {} is not live ({} live)", index, self.live);
        &mut self.items[index]
    }

    /// Number of items borrowed this frame
    pub fn live(&self) -> usize {
        self.live
    }

    /// Number of items ever allocated
    pub fn capacity(&self) -> usize {
        self.items.len()
    }
}

impl<T: Recycle> Default for FramePool<T> {
    fn default() -> Self {
        Self::new()
    }
}
