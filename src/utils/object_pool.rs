use super::handle::HandleLike;
use super::handle_pool::{HandlePool, Iter};

/// An arena of `T` named by handles. Every time a handle is created or freed, the attached
/// instance is created or dropped with it. Entries never move while they are alive, so a handle
/// keeps naming the same value regardless of what happens to the rest of the pool.
pub struct ObjectPool<H: HandleLike, T: Sized> {
    handles: HandlePool<H>,
    entries: Vec<Option<T>>,
}

impl<H: HandleLike, T: Sized> Default for ObjectPool<H, T> {
    fn default() -> Self {
        ObjectPool::new()
    }
}

impl<H: HandleLike, T: Sized> ObjectPool<H, T> {
    pub fn new() -> Self {
        ObjectPool {
            handles: HandlePool::new(),
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ObjectPool {
            handles: HandlePool::with_capacity(capacity),
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Stores `value` and names it with a fresh handle.
    pub fn create(&mut self, value: T) -> H {
        let handle = self.handles.create();
        let index = handle.index() as usize;

        if index >= self.entries.len() {
            self.entries.push(Some(value));
        } else {
            self.entries[index] = Some(value);
        }

        handle
    }

    #[inline]
    pub fn get(&self, handle: H) -> Option<&T> {
        if self.handles.contains(handle) {
            self.entries[handle.index() as usize].as_ref()
        } else {
            None
        }
    }

    #[inline]
    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        if self.handles.contains(handle) {
            self.entries[handle.index() as usize].as_mut()
        } else {
            None
        }
    }

    #[inline]
    pub fn contains(&self, handle: H) -> bool {
        self.handles.contains(handle)
    }

    /// Removes the value named by `handle` and hands it back.
    pub fn free(&mut self, handle: H) -> Option<T> {
        if self.handles.free(handle) {
            self.entries[handle.index() as usize].take()
        } else {
            None
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over the live handles.
    #[inline]
    pub fn iter(&self) -> Iter<H> {
        self.handles.iter()
    }

    /// Returns an iterator over the live handles and their values.
    pub fn values(&self) -> impl Iterator<Item = (H, &T)> {
        let entries = &self.entries;
        self.handles
            .iter()
            .filter_map(move |h| entries[h.index() as usize].as_ref().map(|v| (h, v)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::handle::Handle;

    #[test]
    fn basic() {
        let mut pool = ObjectPool::<Handle, i32>::new();

        let e1 = pool.create(3);
        assert_eq!(pool.get(e1), Some(&3));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.free(e1), Some(3));
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.get(e1), None);
        assert_eq!(pool.free(e1), None);
    }

    #[test]
    fn stable_across_mutation() {
        let mut pool = ObjectPool::<Handle, &'static str>::new();
        let a = pool.create("a");
        let b = pool.create("b");
        let c = pool.create("c");

        pool.free(b);
        let d = pool.create("d");

        assert_eq!(pool.get(a), Some(&"a"));
        assert_eq!(pool.get(c), Some(&"c"));
        assert_eq!(pool.get(d), Some(&"d"));
        assert_eq!(pool.get(b), None);

        let values: Vec<_> = pool.values().map(|(_, v)| *v).collect();
        assert_eq!(values, vec!["a", "d", "c"]);
    }
}
