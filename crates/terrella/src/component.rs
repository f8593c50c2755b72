//! # Component Objects
//!
//! The handle returned by every add call. It remembers which scene objects
//! that call produced so they can be toggled or removed later.
//!
//! ## Lifecycle
//!
//! ```text
//!   Building ──add ran──> Live <──enable/disable──> Disabled
//!                           │                          │
//!                           └────────── clear ─────────┘
//!                                         │
//!                                         ▼
//!                                      Cleared (terminal)
//! ```
//!
//! Handles are cheap to clone; every clone refers to the same objects.

use std::sync::Arc;

use parking_lot::Mutex;
use terrella_core::{ChangeSet, Identity, ObjectKind, TerrellaResult};

use crate::context::MutationContext;

/// Where a [`ComponentObject`] is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentState {
    /// The add task has not run yet.
    Building,
    /// Objects are in the scene and visible.
    Live,
    /// Objects are in the scene and hidden.
    Disabled,
    /// Objects have been removed. Terminal.
    Cleared,
}

#[derive(Clone, Debug)]
struct ComponentInner {
    state: ComponentState,
    vectors: Vec<Identity>,
    markers: Vec<Identity>,
    labels: Vec<Identity>,
}

impl ComponentInner {
    fn ids(&self, kind: ObjectKind) -> &Vec<Identity> {
        match kind {
            ObjectKind::Vector => &self.vectors,
            ObjectKind::Marker => &self.markers,
            ObjectKind::Label => &self.labels,
        }
    }
}

/// Saved contents of a handle.
#[derive(Debug)]
pub(crate) struct ComponentCheckpoint(ComponentInner);

const KINDS: [ObjectKind; 3] = [ObjectKind::Vector, ObjectKind::Marker, ObjectKind::Label];

/// Handle to the scene objects of one add call.
#[derive(Clone, Debug)]
pub struct ComponentObject {
    inner: Arc<Mutex<ComponentInner>>,
}

impl Default for ComponentObject {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentObject {
    /// Creates an empty handle in [`ComponentState::Building`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ComponentInner {
                state: ComponentState::Building,
                vectors: Vec::new(),
                markers: Vec::new(),
                labels: Vec::new(),
            })),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ComponentState {
        self.inner.lock().state
    }

    /// True once cleared.
    #[must_use]
    pub fn is_cleared(&self) -> bool {
        self.state() == ComponentState::Cleared
    }

    /// True when the handle owns no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.vectors.is_empty() && inner.markers.is_empty() && inner.labels.is_empty()
    }

    /// Vector object ids.
    #[must_use]
    pub fn vector_ids(&self) -> Vec<Identity> {
        self.inner.lock().vectors.clone()
    }

    /// Marker object ids.
    #[must_use]
    pub fn marker_ids(&self) -> Vec<Identity> {
        self.inner.lock().markers.clone()
    }

    /// Label object ids.
    #[must_use]
    pub fn label_ids(&self) -> Vec<Identity> {
        self.inner.lock().labels.clone()
    }

    /// True when both handles refer to the same objects.
    #[must_use]
    pub fn same_handle(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Records an object produced for this handle.
    ///
    /// Ignores [`Identity::EMPTY`] and handles that are already cleared.
    pub(crate) fn add_id(&self, kind: ObjectKind, id: Identity) {
        if id.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.state == ComponentState::Cleared {
            return;
        }
        match kind {
            ObjectKind::Vector => inner.vectors.push(id),
            ObjectKind::Marker => inner.markers.push(id),
            ObjectKind::Label => inner.labels.push(id),
        }
    }

    /// Copies the handle's state and ids, for [`ComponentObject::restore`].
    pub(crate) fn checkpoint(&self) -> ComponentCheckpoint {
        ComponentCheckpoint(self.inner.lock().clone())
    }

    /// Puts back what [`ComponentObject::checkpoint`] saw.
    pub(crate) fn restore(&self, saved: ComponentCheckpoint) {
        *self.inner.lock() = saved.0;
    }

    /// Leaves [`ComponentState::Building`].
    pub(crate) fn mark_live(&self, enabled: bool) {
        let mut inner = self.inner.lock();
        if inner.state == ComponentState::Building {
            inner.state = if enabled {
                ComponentState::Live
            } else {
                ComponentState::Disabled
            };
        }
    }

    /// Appends a visibility toggle for every owned object.
    ///
    /// A cleared handle appends nothing. Repeating a call is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidState`](terrella_core::TerrellaError::InvalidState)
    /// once the managers are torn down.
    pub fn enable(
        &self,
        context: &MutationContext,
        enabled: bool,
        changes: &mut ChangeSet,
    ) -> TerrellaResult<()> {
        let mut inner = self.inner.lock();
        if inner.state == ComponentState::Cleared {
            return Ok(());
        }
        for kind in KINDS {
            context.enable_ids(kind, inner.ids(kind), enabled, changes)?;
        }
        inner.state = if enabled {
            ComponentState::Live
        } else {
            ComponentState::Disabled
        };
        Ok(())
    }

    /// Appends a removal for every owned object and empties the handle.
    ///
    /// The second and later calls append nothing.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidState`](terrella_core::TerrellaError::InvalidState)
    /// once the managers are torn down.
    pub fn clear(&self, context: &mut MutationContext, changes: &mut ChangeSet) -> TerrellaResult<()> {
        let mut inner = self.inner.lock();
        if inner.state == ComponentState::Cleared {
            return Ok(());
        }
        for kind in KINDS {
            context.remove_ids(kind, inner.ids(kind), changes)?;
        }
        inner.vectors.clear();
        inner.markers.clear();
        inner.labels.clear();
        inner.state = ComponentState::Cleared;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::manager::{VectorInfo, VectorKind, VectorObject};
    use terrella_core::{ChangeRecord, Point2d};

    fn live_component(ctx: &mut MutationContext) -> ComponentObject {
        let component = ComponentObject::new();
        ctx.add_features::<VectorKind>(
            &[VectorObject::point(Point2d::ZERO)],
            &VectorInfo::default(),
            &component,
        )
        .unwrap();
        component
    }

    #[test]
    fn test_states() {
        let mut ctx = MutationContext::new(&ControllerConfig::default());
        let component = live_component(&mut ctx);
        assert_eq!(component.state(), ComponentState::Live);

        let mut changes = ChangeSet::new();
        component.enable(&ctx, false, &mut changes).unwrap();
        assert_eq!(component.state(), ComponentState::Disabled);
        component.enable(&ctx, true, &mut changes).unwrap();
        assert_eq!(component.state(), ComponentState::Live);
        assert_eq!(changes.visibility_toggles(), 2);

        component.clear(&mut ctx, &mut changes).unwrap();
        assert!(component.is_cleared());
        assert!(component.is_empty());
    }

    #[test]
    fn test_clear_twice() {
        let mut ctx = MutationContext::new(&ControllerConfig::default());
        let component = live_component(&mut ctx);
        let id = component.vector_ids()[0];

        let mut first = ChangeSet::new();
        component.clear(&mut ctx, &mut first).unwrap();
        assert_eq!(first.len(), 1);
        assert!(matches!(first.records()[0], ChangeRecord::RemoveObject { id: r } if r == id));

        let mut second = ChangeSet::new();
        component.clear(&mut ctx, &mut second).unwrap();
        assert!(second.is_empty());

        let mut toggles = ChangeSet::new();
        component.enable(&ctx, true, &mut toggles).unwrap();
        assert!(toggles.is_empty());
    }

    #[test]
    fn test_restore_after_clear() {
        let mut ctx = MutationContext::new(&ControllerConfig::default());
        let component = live_component(&mut ctx);
        let ids = component.vector_ids();

        let saved = component.checkpoint();
        component.clear(&mut ctx, &mut ChangeSet::new()).unwrap();
        assert!(component.is_cleared());

        component.restore(saved);
        assert_eq!(component.state(), ComponentState::Live);
        assert_eq!(component.vector_ids(), ids);
    }

    #[test]
    fn test_clones_share_state() {
        let a = ComponentObject::new();
        let b = a.clone();
        a.add_id(ObjectKind::Label, Identity::from_raw(4));
        a.add_id(ObjectKind::Label, Identity::EMPTY);
        assert_eq!(b.label_ids(), vec![Identity::from_raw(4)]);
        assert!(a.same_handle(&b));
        assert!(!a.same_handle(&ComponentObject::new()));
    }
}
