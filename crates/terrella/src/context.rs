//! # Mutation Context
//!
//! Everything the mutation thread owns: the scene, the three feature
//! managers and the texture manager. One task gets `&mut MutationContext`,
//! builds a [`ChangeSet`], and commits it as one generation.
//!
//! If a batch fails, either while being built or when applied, the ids it
//! introduced are rolled back out of the managers so the tables never
//! mention objects the scene does not have.

use std::sync::Arc;

use terrella_core::{
    ApplyStats, ChangeRecord, ChangeSet, CommittedScene, Identity, ObjectKind, Scene,
    TerrellaResult,
};

use crate::component::ComponentObject;
use crate::config::ControllerConfig;
use crate::manager::{FeatureKind, FeatureManager, LabelKind, MarkerKind, VectorKind};
use crate::texture::TextureManager;

/// An id a batch allocated.
#[derive(Clone, Copy, Debug)]
enum Introduced {
    Texture(Identity),
    Object(ObjectKind, Identity),
}

fn introduced_by(changes: &ChangeSet) -> Vec<Introduced> {
    changes
        .iter()
        .filter_map(|record| match record {
            ChangeRecord::AddTexture { id, .. } => Some(Introduced::Texture(*id)),
            ChangeRecord::AddObject { id, object, .. } => {
                Some(Introduced::Object(object.kind(), *id))
            }
            _ => None,
        })
        .collect()
}

/// Scene plus managers, owned by the mutation thread.
#[derive(Debug)]
pub struct MutationContext {
    pub(crate) scene: Scene,
    pub(crate) vectors: FeatureManager<VectorKind>,
    pub(crate) markers: FeatureManager<MarkerKind>,
    pub(crate) labels: FeatureManager<LabelKind>,
    pub(crate) textures: TextureManager,
}

impl MutationContext {
    /// Creates an empty scene with its managers.
    #[must_use]
    pub fn new(config: &ControllerConfig) -> Self {
        let scene = Scene::new(config.texture_retire_frames);
        let identities = scene.identities();
        Self {
            vectors: FeatureManager::new(Arc::clone(&identities)),
            markers: FeatureManager::new(Arc::clone(&identities)),
            labels: FeatureManager::new(Arc::clone(&identities)),
            textures: TextureManager::new(identities, config.max_textures),
            scene,
        }
    }

    /// The scene.
    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Reader handle for the render thread.
    #[must_use]
    pub fn committed(&self) -> Arc<CommittedScene> {
        self.scene.committed()
    }

    /// The texture manager.
    #[must_use]
    pub fn textures(&self) -> &TextureManager {
        &self.textures
    }

    /// Objects tracked for one family.
    #[must_use]
    pub fn tracked(&self, kind: ObjectKind) -> usize {
        match kind {
            ObjectKind::Vector => self.vectors.len(),
            ObjectKind::Marker => self.markers.len(),
            ObjectKind::Label => self.labels.len(),
        }
    }

    /// Builds and commits one batch of features, recording the result in
    /// `component`.
    ///
    /// Whatever happens, `component` leaves the building state. On failure
    /// it stays empty.
    ///
    /// # Errors
    ///
    /// Propagates manager and scene errors; nothing is committed then.
    pub fn add_features<K: FeatureKind>(
        &mut self,
        features: &[K::Feature],
        style: &K::Style,
        component: &ComponentObject,
    ) -> TerrellaResult<()> {
        let enabled = K::initial_enabled(style);
        let result = self.add_features_inner::<K>(features, style, component);
        if result.is_err() {
            component.mark_live(true);
        } else {
            component.mark_live(enabled);
        }
        result
    }

    fn add_features_inner<K: FeatureKind>(
        &mut self,
        features: &[K::Feature],
        style: &K::Style,
        component: &ComponentObject,
    ) -> TerrellaResult<()> {
        let mut changes = ChangeSet::new();
        let (manager, textures) = K::select(self);
        let id = match manager.add_features(features, style, textures, &mut changes) {
            Ok(id) => id,
            Err(e) => {
                self.discard(changes);
                return Err(e);
            }
        };
        if id.is_empty() {
            return Ok(());
        }

        // Removed before this add ran; it must not appear at all.
        if component.is_cleared() {
            tracing::debug!("Dropping {:?} object {} of a cleared component", K::KIND, id);
            self.discard(changes);
            return Ok(());
        }

        self.commit(changes)?;
        component.add_id(K::KIND, id);
        Ok(())
    }

    /// Appends a visibility toggle for every id of `kind` in `ids`.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidState`](terrella_core::TerrellaError::InvalidState)
    /// after teardown.
    pub fn enable_ids(
        &self,
        kind: ObjectKind,
        ids: &[Identity],
        enabled: bool,
        changes: &mut ChangeSet,
    ) -> TerrellaResult<()> {
        match kind {
            ObjectKind::Vector => self.vectors.enable_features(ids, enabled, changes),
            ObjectKind::Marker => self.markers.enable_features(ids, enabled, changes),
            ObjectKind::Label => self.labels.enable_features(ids, enabled, changes),
        }
    }

    /// Appends a removal for every id of `kind` in `ids`.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidState`](terrella_core::TerrellaError::InvalidState)
    /// after teardown.
    pub fn remove_ids(
        &mut self,
        kind: ObjectKind,
        ids: &[Identity],
        changes: &mut ChangeSet,
    ) -> TerrellaResult<()> {
        let textures = &mut self.textures;
        match kind {
            ObjectKind::Vector => self.vectors.remove_features(ids, textures, changes),
            ObjectKind::Marker => self.markers.remove_features(ids, textures, changes),
            ObjectKind::Label => self.labels.remove_features(ids, textures, changes),
        }
    }

    /// Removes the objects of every component as one generation.
    ///
    /// Clearing a component updates the handle and the manager tables before
    /// the batch is applied. If the apply fails, the handles get their ids
    /// back and the tables are rebuilt from the scene, which still holds the
    /// objects.
    ///
    /// # Errors
    ///
    /// Propagates manager and scene errors; nothing is removed then.
    pub fn remove_components(&mut self, components: &[ComponentObject]) -> TerrellaResult<()> {
        let saved: Vec<_> = components.iter().map(ComponentObject::checkpoint).collect();
        let result = self.remove_components_inner(components);
        if result.is_err() {
            for (component, saved) in components.iter().zip(saved) {
                component.restore(saved);
            }
            self.resync();
        }
        result
    }

    fn remove_components_inner(&mut self, components: &[ComponentObject]) -> TerrellaResult<()> {
        let mut changes = ChangeSet::new();
        for component in components {
            component.clear(self, &mut changes)?;
        }
        self.commit(changes)?;
        Ok(())
    }

    /// Rebuilds the manager tables from the working snapshot.
    fn resync(&mut self) {
        let snapshot = self.scene.current();
        self.vectors.resync(snapshot);
        self.markers.resync(snapshot);
        self.labels.resync(snapshot);
        self.textures.resync(snapshot);
        tracing::warn!(
            "Manager tables resynced from scene generation {}",
            snapshot.generation()
        );
    }

    /// Applies `changes` as one generation. On failure the ids the batch
    /// introduced are rolled back.
    ///
    /// # Errors
    ///
    /// Propagates [`Scene::apply`] errors.
    pub fn commit(&mut self, changes: ChangeSet) -> TerrellaResult<ApplyStats> {
        let introduced = introduced_by(&changes);
        self.scene.apply(changes).map_err(|e| {
            self.roll_back(&introduced);
            e
        })
    }

    /// Drops a batch that will never be applied, rolling back its ids.
    pub fn discard(&mut self, changes: ChangeSet) {
        let introduced = introduced_by(&changes);
        if !introduced.is_empty() {
            tracing::debug!("Discarding batch of {} records", changes.len());
        }
        self.roll_back(&introduced);
    }

    fn roll_back(&mut self, introduced: &[Introduced]) {
        for item in introduced {
            match *item {
                Introduced::Texture(id) => {
                    self.textures.forget(id);
                }
                Introduced::Object(kind, id) => {
                    match kind {
                        ObjectKind::Vector => self.vectors.forget(id),
                        ObjectKind::Marker => self.markers.forget(id),
                        ObjectKind::Label => self.labels.forget(id),
                    };
                    self.textures.forget_object(id);
                }
            }
        }
    }

    /// Removes every object, then every texture, then tears the scene down.
    /// Idempotent.
    pub fn teardown(&mut self) {
        if self.scene.is_torn_down() {
            return;
        }

        let mut changes = ChangeSet::new();
        self.vectors.teardown(&mut changes);
        self.markers.teardown(&mut changes);
        self.labels.teardown(&mut changes);
        self.textures.teardown(&mut changes);

        if let Err(e) = self.scene.apply(changes) {
            tracing::warn!("Final removal batch failed during teardown: {}", e);
        }
        self.scene.teardown();
    }
}
