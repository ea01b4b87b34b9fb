use std::fmt;
use std::hash::Hash;

/// `HandleIndex` type is arbitrary. Keeping it 32-bits allows for a single 64-bits word per
/// `Handle`.
pub type HandleIndex = u32;

/// `Handle` names a slot inside an arena. The `index` addresses the slot and is recycled once the
/// slot is freed, the `version` tells apart the successive occupants of the same slot. A handle
/// stays valid while other slots are created or freed, and turns stale (never dangling) once its
/// own slot is freed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle {
    index: HandleIndex,
    version: HandleIndex,
}

impl Handle {
    #[inline]
    pub fn new(index: HandleIndex, version: HandleIndex) -> Self {
        Handle { index, version }
    }

    /// Constructs a nil handle, which never names a live slot.
    #[inline]
    pub fn nil() -> Self {
        Handle::default()
    }

    /// Returns true if this handle was handed out by a pool. Slots created by a pool always
    /// carry an odd version.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.version & 0x1 == 1
    }

    #[inline]
    pub fn index(self) -> HandleIndex {
        self.index
    }

    #[inline]
    pub fn version(self) -> HandleIndex {
        self.version
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Handle ({}, {})", self.index, self.version)
    }
}

pub trait HandleLike: fmt::Debug + Copy + Hash + PartialEq + Eq + Send + Sync + 'static {
    fn new(index: HandleIndex, version: HandleIndex) -> Self;
    fn index(&self) -> HandleIndex;
    fn version(&self) -> HandleIndex;
}

impl HandleLike for Handle {
    #[inline]
    fn new(index: HandleIndex, version: HandleIndex) -> Self {
        Handle { index, version }
    }

    #[inline]
    fn index(&self) -> HandleIndex {
        self.index
    }

    #[inline]
    fn version(&self) -> HandleIndex {
        self.version
    }
}

/// Declares a strongly typed handle, so handles of different arenas can not be mixed up.
#[macro_export]
macro_rules! impl_handle {
    ($name:ident) => {
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($crate::utils::handle::Handle);

        impl From<$name> for $crate::utils::handle::Handle {
            fn from(handle: $name) -> Self {
                handle.0
            }
        }

        impl From<$crate::utils::handle::Handle> for $name {
            fn from(handle: $crate::utils::handle::Handle) -> Self {
                $name(handle)
            }
        }

        impl $crate::utils::handle::HandleLike for $name {
            #[inline]
            fn new(
                index: $crate::utils::handle::HandleIndex,
                version: $crate::utils::handle::HandleIndex,
            ) -> Self {
                $name($crate::utils::handle::Handle::new(index, version))
            }

            #[inline]
            fn index(&self) -> $crate::utils::handle::HandleIndex {
                self.0.index()
            }

            #[inline]
            fn version(&self) -> $crate::utils::handle::HandleIndex {
                self.0.version()
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(
                    f,
                    "{} ({}, {})",
                    stringify!($name),
                    self.0.index(),
                    self.0.version()
                )
            }
        }
    };
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn basic() {
        let h = Handle::new(2, 3);
        assert_eq!(h.index(), 2);
        assert_eq!(h.version(), 3);
        assert!(h.is_valid());
        assert!(!Handle::nil().is_valid());
        assert!(!Handle::new(2, 4).is_valid());
    }

    #[test]
    fn container() {
        let h1 = Handle::new(1, 1);
        let h2 = Handle::new(1, 3);
        let h3 = Handle::new(2, 1);

        let mut set = HashSet::new();
        assert!(set.insert(h1));
        assert!(!set.insert(Handle::new(1, 1)));
        assert!(set.insert(h2));
        assert!(set.insert(h3));
        assert_eq!(set.len(), 3);
    }

    impl_handle!(TypeSafeHandle);

    #[test]
    fn type_safe_handle() {
        let h = TypeSafeHandle::new(4, 1);
        assert_eq!(Handle::from(h), Handle::new(4, 1));
        assert_eq!(format!("{}", h), "TypeSafeHandle (4, 1)");
    }
}
