//! # Texture Manager
//!
//! Turns client images into texture identities. Identical images share one
//! texture: a lookup hit returns the existing id and appends nothing.
//!
//! Every live texture counts the scene objects drawing with it. Removing
//! the last of them appends a [`ChangeRecord::RemoveTexture`] right behind
//! the object removal, so at most one allocation per distinct image is live
//! at a time and the renderer frees the rest through the retirement
//! handshake.
//!
//! Lives inside the [`MutationContext`](crate::MutationContext), so it is
//! only ever touched from the mutation thread.

use std::collections::HashMap;
use std::sync::Arc;

use terrella_core::{
    ChangeRecord, ChangeSet, Identity, IdentityAllocator, Image, ImageKey, SceneSnapshot,
    TerrellaError, TerrellaResult,
};

/// Image to texture-id table.
#[derive(Debug)]
pub struct TextureManager {
    /// Shared with the feature managers of the same scene.
    identities: Arc<IdentityAllocator>,
    /// Most live textures allowed.
    max_textures: usize,
    /// Content key to candidates. More than one entry only on hash collision.
    by_key: HashMap<ImageKey, Vec<(Arc<Image>, Identity)>>,
    /// Reverse map for `forget`.
    live: HashMap<Identity, ImageKey>,
    /// Objects drawing with each live texture.
    refs: HashMap<Identity, usize>,
    /// Distinct textures of each tracked object.
    users: HashMap<Identity, Vec<Identity>>,
    torn_down: bool,
}

impl TextureManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new(identities: Arc<IdentityAllocator>, max_textures: usize) -> Self {
        Self {
            identities,
            max_textures,
            by_key: HashMap::new(),
            live: HashMap::new(),
            refs: HashMap::new(),
            users: HashMap::new(),
            torn_down: false,
        }
    }

    /// Returns the texture id for `image`, allocating one on first sight.
    ///
    /// A new allocation appends an [`ChangeRecord::AddTexture`] to
    /// `changes`; a repeat image appends nothing.
    ///
    /// # Errors
    ///
    /// * [`TerrellaError::InvalidState`] after [`TextureManager::teardown`]
    /// * [`TerrellaError::AllocationFailure`] when `max_textures` are live
    pub fn add_texture(
        &mut self,
        image: &Arc<Image>,
        changes: &mut ChangeSet,
    ) -> TerrellaResult<Identity> {
        if self.torn_down {
            return Err(TerrellaError::InvalidState("texture manager has been torn down"));
        }

        if let Some(id) = self.lookup(image) {
            return Ok(id);
        }

        if self.live.len() >= self.max_textures {
            return Err(TerrellaError::AllocationFailure {
                resource: "texture",
                limit: self.max_textures,
            });
        }

        let id = self.identities.allocate();
        let key = image.key();
        self.by_key
            .entry(key)
            .or_default()
            .push((Arc::clone(image), id));
        self.live.insert(id, key);
        changes.push(ChangeRecord::AddTexture {
            id,
            image: Arc::clone(image),
        });

        tracing::debug!(
            "Allocated texture {} for {}x{} image",
            id,
            image.width(),
            image.height()
        );
        Ok(id)
    }

    /// The texture already allocated for `image`, if any.
    #[must_use]
    pub fn lookup(&self, image: &Image) -> Option<Identity> {
        self.by_key
            .get(&image.key())?
            .iter()
            .find(|(known, _)| known.same_content(image))
            .map(|(_, id)| *id)
    }

    /// Drops an allocation that never made it into the scene.
    ///
    /// Returns `false` for unknown ids.
    pub fn forget(&mut self, id: Identity) -> bool {
        let Some(key) = self.live.remove(&id) else {
            return false;
        };
        self.refs.remove(&id);
        if let Some(candidates) = self.by_key.get_mut(&key) {
            candidates.retain(|(_, known)| *known != id);
            if candidates.is_empty() {
                self.by_key.remove(&key);
            }
        }
        true
    }

    /// Records that `object` draws with `textures`. Duplicates count once.
    pub fn attach(&mut self, object: Identity, textures: &[Identity]) {
        let mut distinct: Vec<Identity> = textures
            .iter()
            .copied()
            .filter(|id| self.live.contains_key(id))
            .collect();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.is_empty() {
            return;
        }
        for &tex in &distinct {
            *self.refs.entry(tex).or_insert(0) += 1;
        }
        self.users.insert(object, distinct);
    }

    /// Drops the references of a removed object. Appends a
    /// [`ChangeRecord::RemoveTexture`] for every texture it was the last
    /// user of.
    pub fn detach(&mut self, object: Identity, changes: &mut ChangeSet) {
        for tex in self.release_refs(object) {
            self.forget(tex);
            changes.push(ChangeRecord::RemoveTexture { id: tex });
            tracing::debug!("Texture {} lost its last user {}", tex, object);
        }
    }

    /// Drops the references of an object whose add was never committed.
    ///
    /// Appends nothing; a texture left without users stays allocated until
    /// teardown.
    pub fn forget_object(&mut self, object: Identity) {
        for tex in self.release_refs(object) {
            self.refs.remove(&tex);
        }
    }

    /// Decrements the counts of `object`'s textures, returning those that
    /// reached zero.
    fn release_refs(&mut self, object: Identity) -> Vec<Identity> {
        let Some(textures) = self.users.remove(&object) else {
            return Vec::new();
        };
        textures
            .into_iter()
            .filter(|tex| match self.refs.get_mut(tex) {
                Some(count) => {
                    *count = count.saturating_sub(1);
                    *count == 0
                }
                None => false,
            })
            .collect()
    }

    /// Objects currently drawing with `id`.
    #[must_use]
    pub fn ref_count(&self, id: Identity) -> usize {
        self.refs.get(&id).copied().unwrap_or(0)
    }

    /// Rebuilds every table from a committed snapshot.
    ///
    /// Used after a batch failed half way through its bookkeeping; the
    /// scene is authoritative then.
    pub fn resync(&mut self, snapshot: &SceneSnapshot) {
        if self.torn_down {
            return;
        }
        self.by_key.clear();
        self.live.clear();
        self.refs.clear();
        self.users.clear();

        for (id, image) in snapshot.textures() {
            let key = image.key();
            self.by_key
                .entry(key)
                .or_default()
                .push((Arc::clone(image), id));
            self.live.insert(id, key);
        }
        for (id, entry) in snapshot.iter() {
            self.attach(id, &entry.object.texture_refs());
        }
        tracing::debug!("Texture table resynced: {} live", self.live.len());
    }

    /// True when `id` is a live texture of this manager.
    #[must_use]
    pub fn contains(&self, id: Identity) -> bool {
        self.live.contains_key(&id)
    }

    /// Number of live textures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// True when no texture is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Appends a [`ChangeRecord::RemoveTexture`] for every live texture and
    /// refuses further allocations. Idempotent.
    pub fn teardown(&mut self, changes: &mut ChangeSet) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        let mut ids: Vec<Identity> = self.live.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            changes.push(ChangeRecord::RemoveTexture { id });
        }
        self.live.clear();
        self.by_key.clear();
        self.refs.clear();
        self.users.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(limit: usize) -> TextureManager {
        TextureManager::new(Arc::new(IdentityAllocator::new()), limit)
    }

    fn image(shade: u8) -> Arc<Image> {
        Arc::new(Image::solid(4, 4, [shade, shade, shade, 255]).unwrap())
    }

    #[test]
    fn test_dedup_by_content() {
        let mut textures = manager(16);
        let mut changes = ChangeSet::new();

        let a = textures.add_texture(&image(1), &mut changes).unwrap();
        // Different Arc, same pixels.
        let b = textures.add_texture(&image(1), &mut changes).unwrap();
        let c = textures.add_texture(&image(2), &mut changes).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(changes.len(), 2);
        assert_eq!(textures.len(), 2);
    }

    #[test]
    fn test_limit() {
        let mut textures = manager(1);
        let mut changes = ChangeSet::new();
        textures.add_texture(&image(1), &mut changes).unwrap();

        let err = textures.add_texture(&image(2), &mut changes).unwrap_err();
        assert!(matches!(
            err,
            TerrellaError::AllocationFailure {
                resource: "texture",
                limit: 1
            }
        ));
        // Repeats still resolve at the limit.
        assert!(textures.add_texture(&image(1), &mut changes).is_ok());
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_forget_allows_reallocation() {
        let mut textures = manager(16);
        let mut changes = ChangeSet::new();
        let img = image(5);

        let first = textures.add_texture(&img, &mut changes).unwrap();
        assert!(textures.forget(first));
        assert!(!textures.forget(first));
        assert_eq!(textures.lookup(&img), None);

        let second = textures.add_texture(&img, &mut changes).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_last_user_removes_texture() {
        let mut textures = manager(16);
        let mut changes = ChangeSet::new();
        let img = image(8);
        let tex = textures.add_texture(&img, &mut changes).unwrap();
        let (first, second) = (Identity::from_raw(100), Identity::from_raw(101));
        textures.attach(first, &[tex, tex]);
        textures.attach(second, &[tex]);
        assert_eq!(textures.ref_count(tex), 2);

        let mut removals = ChangeSet::new();
        textures.detach(first, &mut removals);
        assert!(removals.is_empty());
        assert!(textures.contains(tex));

        textures.detach(second, &mut removals);
        assert!(matches!(removals.records(), [ChangeRecord::RemoveTexture { id }] if *id == tex));
        assert!(!textures.contains(tex));
        assert_eq!(textures.lookup(&img), None);

        // Detaching again is harmless.
        textures.detach(second, &mut removals);
        assert_eq!(removals.len(), 1);
    }

    #[test]
    fn test_removed_texture_frees_a_slot() {
        let mut textures = manager(1);
        let mut changes = ChangeSet::new();
        let first = textures.add_texture(&image(1), &mut changes).unwrap();
        textures.attach(Identity::from_raw(50), &[first]);
        textures.detach(Identity::from_raw(50), &mut changes);

        let second = textures.add_texture(&image(2), &mut changes).unwrap();
        assert_ne!(first, second);
        assert_eq!(textures.len(), 1);
    }

    #[test]
    fn test_forget_object_appends_nothing() {
        let mut textures = manager(16);
        let mut changes = ChangeSet::new();
        let tex = textures.add_texture(&image(3), &mut changes).unwrap();
        textures.attach(Identity::from_raw(7), &[tex]);
        textures.attach(Identity::from_raw(8), &[tex]);

        textures.forget_object(Identity::from_raw(8));
        assert_eq!(textures.ref_count(tex), 1);
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_teardown() {
        let mut textures = manager(16);
        let mut changes = ChangeSet::new();
        textures.add_texture(&image(1), &mut changes).unwrap();
        textures.add_texture(&image(2), &mut changes).unwrap();

        let mut removals = ChangeSet::new();
        textures.teardown(&mut removals);
        textures.teardown(&mut removals);
        assert_eq!(removals.len(), 2);
        assert!(textures.is_empty());
        assert!(matches!(
            textures.add_texture(&image(3), &mut changes),
            Err(TerrellaError::InvalidState(_))
        ));
    }
}
