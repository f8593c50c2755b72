//! # Render Handoff
//!
//! ## The Problem
//!
//! ```text
//! Mutation thread:  APPLY change sets to the scene
//! Render thread:    READ the scene once per frame
//!
//! Reading mid-apply:    TORN FRAME (half a batch visible)
//! Big lock around both: render stalls behind every batch
//! ```
//!
//! ## The Solution: Committed Snapshots
//!
//! ```text
//! apply(batch N):
//!   clone working snapshot -> apply every record -> generation + 1
//!   SWAP the committed Arc pointer (one short write lock)
//!
//! frame K:
//!   clone the committed Arc (one short read lock)
//!   draw from it for the whole frame, whatever the writer does meanwhile
//! ```
//!
//! The renderer only ever holds a fully applied generation. Textures removed
//! by a batch are retired, not freed: they are released to the renderer
//! once every frame that could still draw them has completed.

mod committed;

pub use committed::{CommittedScene, FrameGuard};
