//! # Change Sets
//!
//! The scene is never edited in place by managers. Instead they append
//! [`ChangeRecord`]s to a [`ChangeSet`], and the mutation thread hands the
//! whole batch to [`Scene::apply`](crate::Scene::apply) in one go.
//!
//! ```text
//!   Manager A ──┐
//!   Manager B ──┼──> [ChangeSet: r0 r1 r2 ...] ──> Scene::apply ──> new generation
//!   Textures  ──┘        (append only)              (all or nothing)
//! ```
//!
//! Order inside a set matters: a record that draws with a texture must come
//! after the record that allocates it.

use std::sync::Arc;

use crate::identity::Identity;
use crate::image::Image;
use crate::primitive::SceneObject;

/// One scene mutation instruction. Immutable once built.
#[derive(Clone, Debug)]
pub enum ChangeRecord {
    /// Allocate a texture from an image.
    AddTexture {
        /// New texture identity.
        id: Identity,
        /// Pixels to upload.
        image: Arc<Image>,
    },
    /// Release a texture.
    RemoveTexture {
        /// Texture to release.
        id: Identity,
    },
    /// Add a drawable group.
    AddObject {
        /// New object identity.
        id: Identity,
        /// The primitives.
        object: Arc<SceneObject>,
        /// Initial visibility.
        enabled: bool,
    },
    /// Toggle visibility of a drawable group.
    SetEnabled {
        /// Object to toggle.
        id: Identity,
        /// New visibility.
        enabled: bool,
    },
    /// Remove a drawable group.
    RemoveObject {
        /// Object to remove.
        id: Identity,
    },
}

impl ChangeRecord {
    /// The identity this record acts on.
    #[must_use]
    pub const fn target(&self) -> Identity {
        match self {
            Self::AddTexture { id, .. }
            | Self::RemoveTexture { id }
            | Self::AddObject { id, .. }
            | Self::SetEnabled { id, .. }
            | Self::RemoveObject { id } => *id,
        }
    }

    /// True for [`ChangeRecord::SetEnabled`].
    #[must_use]
    pub const fn is_visibility_toggle(&self) -> bool {
        matches!(self, Self::SetEnabled { .. })
    }
}

/// An ordered batch of records, consumed exactly once by the scene.
///
/// There is deliberately no `Clone`: [`Scene::apply`](crate::Scene::apply)
/// takes the set by value.
#[derive(Debug, Default)]
pub struct ChangeSet {
    records: Vec<ChangeRecord>,
}

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Creates an empty change set with room for `capacity` records.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    /// Appends a record.
    #[inline]
    pub fn push(&mut self, record: ChangeRecord) {
        self.records.push(record);
    }

    /// Moves every record of `other` to the end of this set.
    pub fn append(&mut self, mut other: Self) {
        self.records.append(&mut other.records);
    }

    /// Number of records.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when there is nothing to apply.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The records in order.
    #[inline]
    #[must_use]
    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    /// Iterates over the records in order.
    pub fn iter(&self) -> std::slice::Iter<'_, ChangeRecord> {
        self.records.iter()
    }

    /// Number of visibility-toggle records.
    #[must_use]
    pub fn visibility_toggles(&self) -> usize {
        self.records.iter().filter(|r| r.is_visibility_toggle()).count()
    }
}

impl IntoIterator for ChangeSet {
    type Item = ChangeRecord;
    type IntoIter = std::vec::IntoIter<ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a ChangeRecord;
    type IntoIter = std::slice::Iter<'a, ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
