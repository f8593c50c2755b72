//! # Scene Primitives
//!
//! The internal, renderer-facing form of features. Managers build these from
//! public feature descriptions; the scene stores them; the renderer draws
//! them. Style values are carried verbatim, never interpreted here.

use crate::geometry::{Color, Point2d};
use crate::identity::Identity;

/// Which manager family produced an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Linear and areal vector data.
    Vector,
    /// Screen-space markers.
    Marker,
    /// Screen-space labels.
    Label,
}

/// Geometry of one vector feature.
#[derive(Clone, Debug, PartialEq)]
pub enum VectorShape {
    /// A single point.
    Point(Point2d),
    /// An open polyline, at least two points.
    Linear(Vec<Point2d>),
    /// A closed ring, at least three points.
    Areal(Vec<Point2d>),
}

impl VectorShape {
    /// The vertices of this shape.
    #[must_use]
    pub fn points(&self) -> &[Point2d] {
        match self {
            Self::Point(p) => std::slice::from_ref(p),
            Self::Linear(pts) | Self::Areal(pts) => pts,
        }
    }
}

/// All vector shapes of one add call, with their shared style.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorDrawable {
    /// Shapes to draw.
    pub shapes: Vec<VectorShape>,
    /// Stroke/fill colour.
    pub color: Color,
    /// Stroke width in pixels.
    pub line_width: f32,
    /// Fill areal shapes.
    pub filled: bool,
    /// Sort key among drawables.
    pub draw_priority: i32,
}

/// One screen marker.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerPrimitive {
    /// Anchor location.
    pub loc: Point2d,
    /// Size on screen.
    pub size: Point2d,
    /// Rotation in radians.
    pub rotation: f64,
    /// Tint colour.
    pub color: Color,
    /// Texture to draw, if the marker has an image.
    pub texture: Option<Identity>,
}

/// All markers of one add call.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerDrawable {
    /// The markers.
    pub markers: Vec<MarkerPrimitive>,
    /// Sort key among drawables.
    pub draw_priority: i32,
    /// Minimum view height at which the markers show.
    pub min_visible: f64,
    /// Maximum view height at which the markers show.
    pub max_visible: f64,
    /// Fade in/out time in seconds.
    pub fade: f32,
}

/// One screen label.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelPrimitive {
    /// Anchor location.
    pub loc: Point2d,
    /// Text to draw.
    pub text: String,
    /// Rotation in radians.
    pub rotation: f64,
    /// Screen offset from the anchor.
    pub offset: Point2d,
    /// Icon texture drawn beside the text.
    pub icon: Option<Identity>,
}

/// All labels of one add call.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelDrawable {
    /// The labels.
    pub labels: Vec<LabelPrimitive>,
    /// Text colour.
    pub text_color: Color,
    /// Background colour.
    pub background_color: Color,
    /// Font size in points.
    pub font_size: f32,
    /// Sort key among drawables.
    pub draw_priority: i32,
}

/// A drawable group owned by the scene.
#[derive(Clone, Debug, PartialEq)]
pub enum SceneObject {
    /// Vector group.
    Vectors(VectorDrawable),
    /// Marker group.
    Markers(MarkerDrawable),
    /// Label group.
    Labels(LabelDrawable),
}

impl SceneObject {
    /// The manager family this object belongs to.
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        match self {
            Self::Vectors(_) => ObjectKind::Vector,
            Self::Markers(_) => ObjectKind::Marker,
            Self::Labels(_) => ObjectKind::Label,
        }
    }

    /// Number of individual primitives in the group.
    #[must_use]
    pub fn primitive_count(&self) -> usize {
        match self {
            Self::Vectors(v) => v.shapes.len(),
            Self::Markers(m) => m.markers.len(),
            Self::Labels(l) => l.labels.len(),
        }
    }

    /// Every texture this object draws with, duplicates included.
    #[must_use]
    pub fn texture_refs(&self) -> Vec<Identity> {
        match self {
            Self::Vectors(_) => Vec::new(),
            Self::Markers(m) => m.markers.iter().filter_map(|p| p.texture).collect(),
            Self::Labels(l) => l.labels.iter().filter_map(|p| p.icon).collect(),
        }
    }
}
