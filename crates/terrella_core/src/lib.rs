//! # Terrella Core
//!
//! Scene state for an interactive map/globe renderer, built so that one
//! thread can edit it while another draws it.
//!
//! ## Architecture Rules
//!
//! 1. **One writer** - only the owner of the [`Scene`] can apply changes
//! 2. **Batches, not edits** - every mutation is a [`ChangeRecord`] inside a
//!    [`ChangeSet`], applied all-or-nothing
//! 3. **Readers see generations** - the renderer pins a committed
//!    [`SceneSnapshot`] per frame and never observes a half-applied batch
//!
//! ## Example
//!
//! ```rust,ignore
//! use terrella_core::{ChangeRecord, ChangeSet, Scene};
//!
//! let mut scene = Scene::new(2);
//! let reader = scene.committed();
//!
//! let mut changes = ChangeSet::new();
//! changes.push(ChangeRecord::AddObject { id, object, enabled: true });
//! scene.apply(changes)?;
//!
//! let frame = reader.begin_frame();
//! assert!(frame.contains(id));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod change;
pub mod error;
pub mod geometry;
pub mod identity;
pub mod image;
pub mod primitive;
pub mod scene;
pub mod sync;

pub use change::{ChangeRecord, ChangeSet};
pub use error::{TerrellaError, TerrellaResult};
pub use geometry::{Color, Point2d, Point3d};
pub use identity::{Identity, IdentityAllocator};
pub use image::{Image, ImageKey};
pub use primitive::{
    LabelDrawable, LabelPrimitive, MarkerDrawable, MarkerPrimitive, ObjectKind, SceneObject,
    VectorDrawable, VectorShape,
};
pub use scene::{ApplyStats, Scene, SceneEntry, SceneSnapshot};
pub use sync::{CommittedScene, FrameGuard};
