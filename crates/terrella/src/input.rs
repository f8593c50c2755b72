//! Touch input boundary.
//!
//! Gesture recognition lives outside this crate. The controller only hands
//! raw touches to whatever [`GestureHandler`] the platform installed.

use std::sync::Arc;

use terrella_core::Point2d;

use crate::view::MapView;

/// Phase of a touch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TouchPhase {
    /// Finger down.
    Began,
    /// Finger moved.
    Moved,
    /// Finger up.
    Ended,
    /// The platform took the touch away.
    Cancelled,
}

/// One raw touch, in screen pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct TouchEvent {
    /// Phase.
    pub phase: TouchPhase,
    /// Pointer id, stable for the duration of a touch.
    pub pointer: u32,
    /// Screen position.
    pub position: Point2d,
    /// Platform timestamp in milliseconds.
    pub timestamp_ms: u64,
}

/// Turns raw touches into view changes.
///
/// Implemented by the platform layer.
pub trait GestureHandler: Send + Sync {
    /// Handles one touch. Returns `true` if it was consumed.
    fn on_touch(&self, view: &Arc<MapView>, event: &TouchEvent) -> bool;
}
