use std::collections::VecDeque;
use std::marker::PhantomData;

use super::handle::{HandleIndex, HandleLike};

/// `HandlePool` hands out versioned handles with densely packed indices. A freed index goes back
/// into a FIFO free list and its version is bumped, so stale handles are detected instead of
/// aliasing the next occupant.
pub struct HandlePool<H: HandleLike> {
    versions: Vec<HandleIndex>,
    frees: VecDeque<HandleIndex>,
    _phantom: PhantomData<H>,
}

impl<H: HandleLike> Default for HandlePool<H> {
    fn default() -> Self {
        HandlePool::new()
    }
}

impl<H: HandleLike> HandlePool<H> {
    pub fn new() -> Self {
        HandlePool {
            versions: Vec::new(),
            frees: VecDeque::new(),
            _phantom: PhantomData,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        HandlePool {
            versions: Vec::with_capacity(capacity),
            frees: VecDeque::with_capacity(capacity),
            _phantom: PhantomData,
        }
    }

    /// Creates an unused handle. Live handles always carry an odd version.
    pub fn create(&mut self) -> H {
        if let Some(index) = self.frees.pop_front() {
            let v = &mut self.versions[index as usize];
            *v += 1;
            H::new(index, *v)
        } else {
            self.versions.push(1);
            H::new(self.versions.len() as HandleIndex - 1, 1)
        }
    }

    /// Returns true if `handle` was created by this pool and has not been freed yet.
    #[inline]
    pub fn contains(&self, handle: H) -> bool {
        self.versions
            .get(handle.index() as usize)
            .map(|&v| v == handle.version() && v & 0x1 == 1)
            .unwrap_or(false)
    }

    /// Recycles the index of `handle`. Returns false if the handle is stale.
    pub fn free(&mut self, handle: H) -> bool {
        if !self.contains(handle) {
            return false;
        }

        self.versions[handle.index() as usize] += 1;
        self.frees.push_back(handle.index());
        true
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.versions.len() - self.frees.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over every live handle, in index order.
    #[inline]
    pub fn iter(&self) -> Iter<H> {
        Iter {
            versions: &self.versions,
            cursor: 0,
            _phantom: PhantomData,
        }
    }
}

pub struct Iter<'a, H: HandleLike> {
    versions: &'a [HandleIndex],
    cursor: usize,
    _phantom: PhantomData<H>,
}

impl<'a, H: HandleLike> Iterator for Iter<'a, H> {
    type Item = H;

    fn next(&mut self) -> Option<H> {
        while self.cursor < self.versions.len() {
            let index = self.cursor;
            self.cursor += 1;

            let v = self.versions[index];
            if v & 0x1 == 1 {
                return Some(H::new(index as HandleIndex, v));
            }
        }

        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::handle::Handle;

    #[test]
    fn reuse_bumps_version() {
        let mut pool = HandlePool::<Handle>::new();
        let h1 = pool.create();
        assert!(pool.free(h1));
        assert!(!pool.free(h1));

        let h2 = pool.create();
        assert_eq!(h1.index(), h2.index());
        assert_eq!(h2.version(), 3);
        assert!(!pool.contains(h1));
        assert!(pool.contains(h2));
    }
}
