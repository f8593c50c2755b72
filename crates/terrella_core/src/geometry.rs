//! Coordinate and colour types shared by public features and scene primitives.
//!
//! Coordinates are whatever the caller's coordinate system says they are
//! (typically geographic radians); nothing here projects them.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// 2D point - geographic location or screen-space size
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Point2d {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
}

impl Point2d {
    /// Creates a new Point2d
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Origin
    pub const ZERO: Self = Self::new(0.0, 0.0);

    /// True when neither component is NaN or infinite
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Extends to 3D with the given z
    #[must_use]
    pub const fn with_z(self, z: f64) -> Point3d {
        Point3d::new(self.x, self.y, z)
    }
}

impl std::ops::Add for Point2d {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point2d {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// 3D point - view position (x, y, height)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Point3d {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
    /// Z component
    pub z: f64,
}

impl Point3d {
    /// Creates a new Point3d
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Drops the z component
    #[must_use]
    pub const fn to_point2d(self) -> Point2d {
        Point2d::new(self.x, self.y)
    }

    /// True when no component is NaN or infinite
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// RGBA colour, 8 bits per channel
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize)]
pub struct Color {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
    /// Alpha
    pub a: u8,
}

impl Color {
    /// Creates a new colour
    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque white
    pub const WHITE: Self = Self::rgba(255, 255, 255, 255);

    /// Opaque black
    pub const BLACK: Self = Self::rgba(0, 0, 0, 255);

    /// Fully transparent
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}
