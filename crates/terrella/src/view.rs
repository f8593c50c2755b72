//! # Map View
//!
//! Where the camera is. Unlike scene content, the view is written directly
//! by whoever calls [`MapView::set_position`]; it does not go through the
//! mutation thread.
//!
//! Positions are `(x, y, height)` in the caller's geographic coordinates,
//! typically radians. When extents are set, positions are clamped into
//! them. Extents whose west edge lies east of their east edge wrap across
//! the antimeridian.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use terrella_core::{Point2d, Point3d, TerrellaError, TerrellaResult};

/// Bounding box the view may move in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewExtents {
    /// South-west corner.
    pub ll: Point2d,
    /// North-east corner. `ur.x` is unwrapped, so `ur.x >= ll.x` always.
    pub ur: Point2d,
    wrapped: bool,
}

impl ViewExtents {
    /// Builds extents, unwrapping an east edge that lies west of the west
    /// edge.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidArgument`] for non-finite corners or
    /// a south edge above the north edge.
    pub fn new(ll: Point2d, ur: Point2d) -> TerrellaResult<Self> {
        if !ll.is_finite() || !ur.is_finite() {
            return Err(TerrellaError::InvalidArgument(
                "view extents must be finite".to_string(),
            ));
        }
        if ll.y > ur.y {
            return Err(TerrellaError::InvalidArgument(format!(
                "view extents south edge {} lies north of {}",
                ll.y, ur.y
            )));
        }

        let mut ur = ur;
        let wrapped = ll.x > ur.x;
        if wrapped {
            ur.x += TAU;
        }
        Ok(Self { ll, ur, wrapped })
    }

    /// True when the box crosses the antimeridian.
    #[must_use]
    pub fn wraps(&self) -> bool {
        self.wrapped
    }

    /// Moves `pos` into the box. Height is left alone.
    ///
    /// Longitudes are compared modulo a full turn, so `x` and `x + TAU`
    /// clamp to the same place.
    #[must_use]
    pub fn clamp(&self, pos: Point3d) -> Point3d {
        let mut x = pos.x;
        if x < self.ll.x || x > self.ur.x {
            // Same turn as the box: [ll.x, ll.x + TAU).
            x = self.ll.x + (x - self.ll.x).rem_euclid(TAU);
        }
        if x > self.ur.x {
            // Snap to whichever edge is nearer going around the globe.
            let past_east = x - self.ur.x;
            let before_west = (self.ll.x + TAU) - x;
            x = if past_east <= before_west {
                self.ur.x
            } else {
                self.ll.x
            };
        }
        let y = pos.y.clamp(self.ll.y, self.ur.y);
        Point3d::new(x, y, pos.z)
    }
}

#[derive(Debug)]
struct ViewState {
    position: Point3d,
    extents: Option<ViewExtents>,
}

/// Camera state shared between caller threads and the renderer.
#[derive(Debug)]
pub struct MapView {
    state: RwLock<ViewState>,
    animating: AtomicBool,
}

impl Default for MapView {
    fn default() -> Self {
        Self::new(Point3d::new(0.0, 0.0, 1.0))
    }
}

impl MapView {
    /// Creates a view at `position` with no extents.
    #[must_use]
    pub fn new(position: Point3d) -> Self {
        Self {
            state: RwLock::new(ViewState {
                position,
                extents: None,
            }),
            animating: AtomicBool::new(false),
        }
    }

    /// Current position.
    #[must_use]
    pub fn position(&self) -> Point3d {
        self.state.read().position
    }

    /// Current extents.
    #[must_use]
    pub fn extents(&self) -> Option<ViewExtents> {
        self.state.read().extents
    }

    /// Moves the view, clamped to the extents.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidArgument`] for a non-finite position.
    pub fn set_position(&self, position: Point3d) -> TerrellaResult<Point3d> {
        if !position.is_finite() {
            return Err(TerrellaError::InvalidArgument(
                "view position must be finite".to_string(),
            ));
        }
        let mut state = self.state.write();
        let position = match state.extents {
            Some(extents) => extents.clamp(position),
            None => position,
        };
        state.position = position;
        Ok(position)
    }

    /// Restricts the view and pulls the current position inside.
    pub fn set_extents(&self, extents: ViewExtents) {
        let mut state = self.state.write();
        state.extents = Some(extents);
        state.position = extents.clamp(state.position);
    }

    /// Marks an animation as running.
    pub fn start_animation(&self) {
        self.animating.store(true, Ordering::Release);
    }

    /// Stops any running animation.
    pub fn cancel_animation(&self) {
        if self.animating.swap(false, Ordering::AcqRel) {
            tracing::debug!("View animation cancelled");
        }
    }

    /// True while an animation runs.
    #[must_use]
    pub fn is_animating(&self) -> bool {
        self.animating.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_unbounded_view() {
        let view = MapView::default();
        let pos = view.set_position(Point3d::new(3.0, -1.0, 0.2)).unwrap();
        assert_eq!(pos, Point3d::new(3.0, -1.0, 0.2));
        assert!(view.set_position(Point3d::new(f64::NAN, 0.0, 1.0)).is_err());
        assert_eq!(view.position(), pos);
    }

    #[test]
    fn test_clamp_to_extents() {
        let view = MapView::default();
        let extents = ViewExtents::new(Point2d::new(-1.0, -0.5), Point2d::new(1.0, 0.5)).unwrap();
        view.set_extents(extents);
        assert!(!extents.wraps());

        let pos = view.set_position(Point3d::new(2.0, 0.9, 0.1)).unwrap();
        assert_eq!(pos, Point3d::new(1.0, 0.5, 0.1));
        let pos = view.set_position(Point3d::new(-1.5, -0.1, 0.1)).unwrap();
        assert_eq!(pos, Point3d::new(-1.0, -0.1, 0.1));
    }

    #[test]
    fn test_antimeridian_wrap() {
        // From 170E to 170W, across the date line.
        let west = 170.0_f64.to_radians();
        let east = -170.0_f64.to_radians();
        let extents = ViewExtents::new(Point2d::new(west, -0.1), Point2d::new(east, 0.1)).unwrap();
        assert!(extents.wraps());
        assert!((extents.ur.x - (east + 2.0 * PI)).abs() < 1e-12);

        // 175W sits inside the box once unwrapped.
        let inside = extents.clamp(Point3d::new(-175.0_f64.to_radians(), 0.0, 1.0));
        assert!((inside.x - (-175.0_f64.to_radians() + 2.0 * PI)).abs() < 1e-12);

        // 0 lies far outside; nearest edge wins.
        let outside = extents.clamp(Point3d::new(0.0, 0.0, 1.0));
        assert!(outside.x == extents.ll.x || outside.x == extents.ur.x);
    }

    #[test]
    fn test_clamp_a_turn_away() {
        let extents = ViewExtents::new(Point2d::new(-1.0, -1.0), Point2d::new(1.0, 1.0)).unwrap();

        // 6.0 is the same longitude as 6.0 - TAU, inside the box.
        let east = extents.clamp(Point3d::new(6.0, 0.0, 1.0));
        assert!((east.x - (6.0 - TAU)).abs() < 1e-12);

        let west = extents.clamp(Point3d::new(-6.0, 0.0, 1.0));
        assert!((west.x - (TAU - 6.0)).abs() < 1e-12);

        // Several turns out still lands on the nearer edge.
        let far = extents.clamp(Point3d::new(1.2 + 3.0 * TAU, 0.0, 1.0));
        assert!((far.x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_set_extents_pulls_position_in() {
        let view = MapView::new(Point3d::new(1.5, 5.0, 1.0));
        view.set_extents(ViewExtents::new(Point2d::ZERO, Point2d::new(1.0, 1.0)).unwrap());
        assert_eq!(view.position(), Point3d::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_bad_extents() {
        assert!(ViewExtents::new(Point2d::new(0.0, 1.0), Point2d::new(1.0, 0.0)).is_err());
        assert!(ViewExtents::new(Point2d::new(f64::INFINITY, 0.0), Point2d::ZERO).is_err());
    }

    #[test]
    fn test_animation_flag() {
        let view = MapView::default();
        view.start_animation();
        assert!(view.is_animating());
        view.cancel_animation();
        assert!(!view.is_animating());
    }
}
