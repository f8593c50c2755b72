//! # Scene
//!
//! The authoritative object graph. [`Scene::apply`] is the single choke point
//! through which every mutation passes.
//!
//! ## Ownership
//!
//! The [`Scene`] value itself lives on the mutation thread; `apply` takes
//! `&mut self`, so there is exactly one writer by construction. Readers get
//! at the data through the [`CommittedScene`] it publishes to.
//!
//! ## All or Nothing
//!
//! A change set is applied to a private copy of the working snapshot. If any
//! record is invalid the copy is dropped and the scene is left exactly as it
//! was. Otherwise the copy becomes the new generation in one pointer swap.

use std::collections::HashMap;
use std::sync::Arc;

use crate::change::{ChangeRecord, ChangeSet};
use crate::error::{TerrellaError, TerrellaResult};
use crate::identity::{Identity, IdentityAllocator};
use crate::image::Image;
use crate::primitive::{LabelDrawable, MarkerDrawable, ObjectKind, SceneObject, VectorDrawable};
use crate::sync::CommittedScene;

/// A drawable group as stored in the scene.
#[derive(Clone, Debug)]
pub struct SceneEntry {
    /// The primitives.
    pub object: Arc<SceneObject>,
    /// Whether the group is drawn.
    pub enabled: bool,
}

/// One immutable generation of the scene.
#[derive(Clone, Debug, Default)]
pub struct SceneSnapshot {
    generation: u64,
    objects: HashMap<Identity, SceneEntry>,
    textures: HashMap<Identity, Arc<Image>>,
}

impl SceneSnapshot {
    /// Number of change sets applied to reach this snapshot.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of drawable groups.
    #[inline]
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of drawable groups of one kind.
    #[must_use]
    pub fn count_kind(&self, kind: ObjectKind) -> usize {
        self.objects.values().filter(|e| e.object.kind() == kind).count()
    }

    /// Number of allocated textures.
    #[inline]
    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Looks up a drawable group.
    #[inline]
    #[must_use]
    pub fn get(&self, id: Identity) -> Option<&SceneEntry> {
        self.objects.get(&id)
    }

    /// True when a drawable group with this id exists.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: Identity) -> bool {
        self.objects.contains_key(&id)
    }

    /// Visibility of a drawable group, `None` if it does not exist.
    #[must_use]
    pub fn is_enabled(&self, id: Identity) -> Option<bool> {
        self.objects.get(&id).map(|e| e.enabled)
    }

    /// The vector group with this id.
    #[must_use]
    pub fn vectors(&self, id: Identity) -> Option<&VectorDrawable> {
        match self.objects.get(&id).map(|e| e.object.as_ref()) {
            Some(SceneObject::Vectors(v)) => Some(v),
            _ => None,
        }
    }

    /// The marker group with this id.
    #[must_use]
    pub fn markers(&self, id: Identity) -> Option<&MarkerDrawable> {
        match self.objects.get(&id).map(|e| e.object.as_ref()) {
            Some(SceneObject::Markers(m)) => Some(m),
            _ => None,
        }
    }

    /// The label group with this id.
    #[must_use]
    pub fn labels(&self, id: Identity) -> Option<&LabelDrawable> {
        match self.objects.get(&id).map(|e| e.object.as_ref()) {
            Some(SceneObject::Labels(l)) => Some(l),
            _ => None,
        }
    }

    /// The image behind a texture id.
    #[inline]
    #[must_use]
    pub fn texture(&self, id: Identity) -> Option<&Arc<Image>> {
        self.textures.get(&id)
    }

    /// Iterates over every allocated texture.
    pub fn textures(&self) -> impl Iterator<Item = (Identity, &Arc<Image>)> {
        self.textures.iter().map(|(id, image)| (*id, image))
    }

    /// Iterates over every drawable group.
    pub fn iter(&self) -> impl Iterator<Item = (Identity, &SceneEntry)> {
        self.objects.iter().map(|(id, e)| (*id, e))
    }

    /// Iterates over the drawable groups that are switched on.
    pub fn iter_enabled(&self) -> impl Iterator<Item = (Identity, &SceneEntry)> {
        self.iter().filter(|(_, e)| e.enabled)
    }
}

/// What one [`Scene::apply`] call did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Generation after the apply.
    pub generation: u64,
    /// Records in the change set.
    pub records: usize,
    /// Drawable groups added.
    pub objects_added: usize,
    /// Drawable groups removed.
    pub objects_removed: usize,
    /// Visibility toggles that hit an existing group.
    pub visibility_toggles: usize,
    /// Textures allocated.
    pub textures_added: usize,
    /// Textures retired.
    pub textures_removed: usize,
}

/// The scene owned by the mutation thread.
#[derive(Debug)]
pub struct Scene {
    /// Last applied generation (same value as the committed one).
    working: Arc<SceneSnapshot>,
    /// Where readers look.
    committed: Arc<CommittedScene>,
    /// Identity source for every manager of this scene.
    identities: Arc<IdentityAllocator>,
    /// Set by [`Scene::teardown`].
    torn_down: bool,
}

impl Scene {
    /// Creates an empty scene.
    ///
    /// # Arguments
    ///
    /// * `retire_frames` - See [`CommittedScene::new`]
    #[must_use]
    pub fn new(retire_frames: u64) -> Self {
        Self {
            working: Arc::new(SceneSnapshot::default()),
            committed: CommittedScene::new(retire_frames),
            identities: Arc::new(IdentityAllocator::new()),
            torn_down: false,
        }
    }

    /// The reader side, for the render thread.
    #[must_use]
    pub fn committed(&self) -> Arc<CommittedScene> {
        Arc::clone(&self.committed)
    }

    /// The identity allocator managers must share.
    #[must_use]
    pub fn identities(&self) -> Arc<IdentityAllocator> {
        Arc::clone(&self.identities)
    }

    /// The current generation as seen by the writer.
    #[inline]
    #[must_use]
    pub fn current(&self) -> &SceneSnapshot {
        &self.working
    }

    /// Whether [`Scene::teardown`] has run.
    #[inline]
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Applies every record of `changes`, in order, as one generation.
    ///
    /// An empty change set is a no-op and does not bump the generation.
    ///
    /// # Errors
    ///
    /// * [`TerrellaError::InvalidState`] if the scene has been torn down
    /// * [`TerrellaError::InvalidArgument`] if a record adds an id twice,
    ///   uses [`Identity::EMPTY`], draws with a texture that is not
    ///   allocated, or removes a texture that is still drawn with
    ///
    /// On error nothing is applied.
    pub fn apply(&mut self, changes: ChangeSet) -> TerrellaResult<ApplyStats> {
        if self.torn_down {
            return Err(TerrellaError::InvalidState("scene has been torn down"));
        }

        let mut stats = ApplyStats {
            generation: self.working.generation,
            records: changes.len(),
            ..ApplyStats::default()
        };
        if changes.is_empty() {
            return Ok(stats);
        }

        let mut next = SceneSnapshot::clone(&self.working);
        let mut removed_textures = Vec::new();

        for record in changes {
            Self::apply_record(&mut next, record, &mut stats, &mut removed_textures)?;
        }

        for &tex in &removed_textures {
            if let Some((id, _)) = next
                .iter()
                .find(|(_, e)| e.object.texture_refs().contains(&tex))
            {
                return Err(TerrellaError::InvalidArgument(format!(
                    "texture {tex} removed while object {id} still draws with it"
                )));
            }
        }

        next.generation += 1;
        stats.generation = next.generation;

        let next = Arc::new(next);
        self.working = Arc::clone(&next);
        self.committed.publish(next, removed_textures);

        tracing::trace!(
            "Applied {} records as generation {} (+{} -{} objects, {} toggles)",
            stats.records,
            stats.generation,
            stats.objects_added,
            stats.objects_removed,
            stats.visibility_toggles
        );
        Ok(stats)
    }

    fn apply_record(
        next: &mut SceneSnapshot,
        record: ChangeRecord,
        stats: &mut ApplyStats,
        removed_textures: &mut Vec<Identity>,
    ) -> TerrellaResult<()> {
        match record {
            ChangeRecord::AddTexture { id, image } => {
                if id.is_empty() || next.textures.contains_key(&id) {
                    return Err(TerrellaError::InvalidArgument(format!(
                        "texture {id} is empty or already allocated"
                    )));
                }
                next.textures.insert(id, image);
                stats.textures_added += 1;
            }
            ChangeRecord::RemoveTexture { id } => {
                if next.textures.remove(&id).is_some() {
                    removed_textures.push(id);
                    stats.textures_removed += 1;
                } else {
                    tracing::debug!("Ignoring removal of unknown texture {}", id);
                }
            }
            ChangeRecord::AddObject {
                id,
                object,
                enabled,
            } => {
                if id.is_empty() || next.objects.contains_key(&id) {
                    return Err(TerrellaError::InvalidArgument(format!(
                        "object {id} is empty or already present"
                    )));
                }
                if let Some(tex) = object
                    .texture_refs()
                    .into_iter()
                    .find(|tex| !next.textures.contains_key(tex))
                {
                    return Err(TerrellaError::InvalidArgument(format!(
                        "object {id} draws with texture {tex} before it is allocated"
                    )));
                }
                next.objects.insert(id, SceneEntry { object, enabled });
                stats.objects_added += 1;
            }
            ChangeRecord::SetEnabled { id, enabled } => {
                if let Some(entry) = next.objects.get_mut(&id) {
                    entry.enabled = enabled;
                    stats.visibility_toggles += 1;
                } else {
                    tracing::debug!("Ignoring visibility change of unknown object {}", id);
                }
            }
            ChangeRecord::RemoveObject { id } => {
                if next.objects.remove(&id).is_some() {
                    stats.objects_removed += 1;
                } else {
                    tracing::debug!("Ignoring removal of unknown object {}", id);
                }
            }
        }
        Ok(())
    }

    /// Drops every object and retires every texture, then refuses further
    /// changes. Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        let remaining: Vec<Identity> = self.working.textures.keys().copied().collect();
        let empty = Arc::new(SceneSnapshot {
            generation: self.working.generation + 1,
            ..SceneSnapshot::default()
        });
        self.working = Arc::clone(&empty);
        self.committed.publish(empty, remaining);
        self.committed.release_all();

        tracing::info!("Scene torn down at generation {}", self.working.generation);
    }
}
