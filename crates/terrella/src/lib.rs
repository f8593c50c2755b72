//! # Terrella
//!
//! Thread-safe controller for an interactive map/globe renderer. Any thread
//! may add, toggle or remove map content; one dedicated mutation thread
//! applies all of it to the scene, and the render thread draws committed
//! snapshots on its own cadence.
//!
//! ## Threads
//!
//! ```text
//!   caller threads          mutation thread              render thread
//!   ──────────────          ───────────────              ─────────────
//!   MapController ──task──> MutationContext
//!                            ├─ feature managers
//!                            ├─ TextureManager
//!                            └─ Scene::apply ──publish──> CommittedScene
//!                                                          └─ RenderDriver
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use terrella::{MapController, VectorInfo, VectorObject};
//! use terrella_core::Point2d;
//!
//! let controller = MapController::with_defaults()?;
//! let coast = controller.add_vector(
//!     VectorObject::linear(vec![Point2d::new(0.1, 0.2), Point2d::new(0.3, 0.4)]),
//!     VectorInfo::default(),
//! );
//! controller.disable_objects(&[coast.clone()]);
//! controller.remove_object(&coast);
//! controller.shutdown();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod component;
pub mod config;
pub mod context;
pub mod controller;
pub mod input;
pub mod manager;
pub mod render;
pub mod texture;
pub mod thread;
pub mod view;

pub use component::{ComponentObject, ComponentState};
pub use config::ControllerConfig;
pub use context::MutationContext;
pub use controller::MapController;
pub use input::{GestureHandler, TouchEvent, TouchPhase};
pub use manager::{
    FeatureKind, FeatureManager, LabelInfo, LabelKind, MarkerInfo, MarkerKind, ScreenLabel,
    ScreenMarker, VectorInfo, VectorKind, VectorObject,
};
pub use render::{RenderBackend, RenderDriver, RenderSettings, RenderStats};
pub use texture::TextureManager;
pub use thread::{MutationThread, MutationThreadStats, Task};
pub use view::{MapView, ViewExtents};
