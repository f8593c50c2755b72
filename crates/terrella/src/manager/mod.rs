//! # Feature Managers
//!
//! One manager per feature family. A manager turns a batch of public
//! features into one [`SceneObject`] and the records that put it in the
//! scene. It never applies anything itself.
//!
//! ```text
//!   Vec<Feature> + Style
//!         │
//!         ▼
//!   K::validate (every feature, before any side effect)
//!         │
//!         ▼
//!   K::build ──> TextureManager::add_texture ──> AddTexture records
//!         │
//!         ▼
//!   AddObject record (one grouping id per batch)
//! ```
//!
//! The family-specific parts live behind [`FeatureKind`]; the bookkeeping
//! is shared in [`FeatureManager`].

mod label;
mod marker;
mod vector;

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use terrella_core::{
    ChangeRecord, ChangeSet, Identity, IdentityAllocator, ObjectKind, SceneObject, SceneSnapshot,
    TerrellaError, TerrellaResult,
};

use crate::context::MutationContext;
use crate::texture::TextureManager;

pub use label::{LabelInfo, LabelKind, ScreenLabel};
pub use marker::{MarkerInfo, MarkerKind, ScreenMarker};
pub use vector::{VectorInfo, VectorKind, VectorObject};

/// A feature family: what it accepts and how it becomes a scene object.
pub trait FeatureKind: Sized + Send + Sync + 'static {
    /// Public feature type.
    type Feature: Send + 'static;
    /// Style shared by one batch.
    type Style: Send + 'static;

    /// Which scene object family this produces.
    const KIND: ObjectKind;

    /// Rejects a malformed feature.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidArgument`] describing the problem.
    fn validate(feature: &Self::Feature) -> TerrellaResult<()>;

    /// Converts a validated batch into one scene object, allocating textures
    /// as needed.
    ///
    /// # Errors
    ///
    /// Propagates texture allocation failures.
    fn build(
        features: &[Self::Feature],
        style: &Self::Style,
        textures: &mut TextureManager,
        changes: &mut ChangeSet,
    ) -> TerrellaResult<SceneObject>;

    /// Whether objects in this style start out visible.
    fn initial_enabled(style: &Self::Style) -> bool;

    /// This family's manager together with the texture manager.
    fn select(context: &mut MutationContext) -> (&mut FeatureManager<Self>, &mut TextureManager);
}

/// Tracks the grouping identities of one feature family.
pub struct FeatureManager<K: FeatureKind> {
    identities: Arc<IdentityAllocator>,
    live: HashSet<Identity>,
    torn_down: bool,
    _kind: PhantomData<fn() -> K>,
}

impl<K: FeatureKind> fmt::Debug for FeatureManager<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureManager")
            .field("kind", &K::KIND)
            .field("live", &self.live.len())
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

impl<K: FeatureKind> FeatureManager<K> {
    /// Creates an empty manager drawing ids from `identities`.
    #[must_use]
    pub fn new(identities: Arc<IdentityAllocator>) -> Self {
        Self {
            identities,
            live: HashSet::new(),
            torn_down: false,
            _kind: PhantomData,
        }
    }

    fn check_alive(&self) -> TerrellaResult<()> {
        if self.torn_down {
            Err(TerrellaError::InvalidState("feature manager has been torn down"))
        } else {
            Ok(())
        }
    }

    /// Builds the records for one batch and returns its grouping identity.
    ///
    /// An empty batch returns [`Identity::EMPTY`] and appends nothing. On
    /// validation failure nothing is appended and no texture is allocated.
    ///
    /// # Errors
    ///
    /// * [`TerrellaError::InvalidState`] after teardown
    /// * [`TerrellaError::InvalidArgument`] if any feature is malformed
    /// * [`TerrellaError::AllocationFailure`] if textures run out; records
    ///   already appended must then be discarded by the caller
    pub fn add_features(
        &mut self,
        features: &[K::Feature],
        style: &K::Style,
        textures: &mut TextureManager,
        changes: &mut ChangeSet,
    ) -> TerrellaResult<Identity> {
        self.check_alive()?;
        if features.is_empty() {
            return Ok(Identity::EMPTY);
        }

        for (index, feature) in features.iter().enumerate() {
            K::validate(feature).map_err(|e| match e {
                TerrellaError::InvalidArgument(msg) => {
                    TerrellaError::InvalidArgument(format!("{:?} feature {index}: {msg}", K::KIND))
                }
                other => other,
            })?;
        }

        let object = K::build(features, style, textures, changes)?;
        let id = self.identities.allocate();
        textures.attach(id, &object.texture_refs());
        changes.push(ChangeRecord::AddObject {
            id,
            object: Arc::new(object),
            enabled: K::initial_enabled(style),
        });
        self.live.insert(id);

        tracing::debug!(
            "{:?} manager built object {} from {} features",
            K::KIND,
            id,
            features.len()
        );
        Ok(id)
    }

    /// Appends a visibility toggle for every id this manager owns.
    ///
    /// Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidState`] after teardown.
    pub fn enable_features(
        &self,
        ids: &[Identity],
        enabled: bool,
        changes: &mut ChangeSet,
    ) -> TerrellaResult<()> {
        self.check_alive()?;
        for &id in ids.iter().filter(|id| self.live.contains(*id)) {
            changes.push(ChangeRecord::SetEnabled { id, enabled });
        }
        Ok(())
    }

    /// Appends a removal for every id this manager owns and stops tracking
    /// them. Unknown ids are skipped, so repeat removals append nothing.
    ///
    /// Textures left without users are removed in the same batch, after the
    /// objects that drew with them.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidState`] after teardown.
    pub fn remove_features(
        &mut self,
        ids: &[Identity],
        textures: &mut TextureManager,
        changes: &mut ChangeSet,
    ) -> TerrellaResult<()> {
        self.check_alive()?;
        for &id in ids {
            if self.live.remove(&id) {
                changes.push(ChangeRecord::RemoveObject { id });
                textures.detach(id, changes);
            }
        }
        Ok(())
    }

    /// Stops tracking an id whose add was never committed.
    pub fn forget(&mut self, id: Identity) -> bool {
        self.live.remove(&id)
    }

    /// Tracks exactly the objects of this family in `snapshot`.
    pub fn resync(&mut self, snapshot: &SceneSnapshot) {
        if self.torn_down {
            return;
        }
        self.live = snapshot
            .iter()
            .filter(|(_, entry)| entry.object.kind() == K::KIND)
            .map(|(id, _)| id)
            .collect();
    }

    /// True when this manager tracks `id`.
    #[must_use]
    pub fn contains(&self, id: Identity) -> bool {
        self.live.contains(&id)
    }

    /// Number of tracked objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// True when nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Appends a removal for everything still tracked and refuses further
    /// work. Idempotent.
    pub fn teardown(&mut self, changes: &mut ChangeSet) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        let mut ids: Vec<Identity> = self.live.drain().collect();
        ids.sort_unstable();
        for id in ids {
            changes.push(ChangeRecord::RemoveObject { id });
        }
    }
}
