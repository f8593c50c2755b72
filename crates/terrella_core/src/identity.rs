//! # Identifiers
//!
//! Every object in the scene (drawable groups and textures alike) is named by
//! an [`Identity`]. Identities come from one [`IdentityAllocator`] per scene,
//! so they are unique for the scene's lifetime and never handed out twice.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque 64-bit identifier of a scene object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct Identity(u64);

impl Identity {
    /// The reserved "no object" value.
    pub const EMPTY: Self = Self(0);

    /// Wraps a raw value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Checks if this is [`Identity::EMPTY`].
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Identity(EMPTY)")
        } else {
            write!(f, "Identity({})", self.0)
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out fresh identities.
///
/// Shared (behind an `Arc`) by every manager of one scene.
#[derive(Debug)]
pub struct IdentityAllocator {
    next: AtomicU64,
}

impl IdentityAllocator {
    /// Creates an allocator whose first identity is `1`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns a never-before-seen identity.
    #[inline]
    pub fn allocate(&self) -> Identity {
        Identity(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of identities handed out so far.
    #[must_use]
    pub fn allocated(&self) -> u64 {
        self.next.load(Ordering::Relaxed) - 1
    }
}

impl Default for IdentityAllocator {
    fn default() -> Self {
        Self::new()
    }
}
