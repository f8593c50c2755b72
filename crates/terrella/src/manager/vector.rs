//! Linear and areal vector features.

use terrella_core::{
    ChangeSet, Color, ObjectKind, Point2d, SceneObject, TerrellaError, TerrellaResult,
    VectorDrawable, VectorShape,
};

use super::{FeatureKind, FeatureManager};
use crate::context::MutationContext;
use crate::texture::TextureManager;

/// A vector feature: one or more shapes.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorObject {
    /// The shapes.
    pub shapes: Vec<VectorShape>,
}

impl VectorObject {
    /// Wraps a list of shapes.
    #[must_use]
    pub fn new(shapes: Vec<VectorShape>) -> Self {
        Self { shapes }
    }

    /// A single point.
    #[must_use]
    pub fn point(loc: Point2d) -> Self {
        Self::new(vec![VectorShape::Point(loc)])
    }

    /// A single polyline.
    #[must_use]
    pub fn linear(points: Vec<Point2d>) -> Self {
        Self::new(vec![VectorShape::Linear(points)])
    }

    /// A single closed ring.
    #[must_use]
    pub fn areal(points: Vec<Point2d>) -> Self {
        Self::new(vec![VectorShape::Areal(points)])
    }
}

/// How a batch of vectors looks.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorInfo {
    /// Stroke/fill colour.
    pub color: Color,
    /// Stroke width in pixels.
    pub line_width: f32,
    /// Fill areal shapes.
    pub filled: bool,
    /// Sort key among drawables.
    pub draw_priority: i32,
    /// Visible on arrival.
    pub enable: bool,
}

impl Default for VectorInfo {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            line_width: 1.0,
            filled: false,
            draw_priority: 0,
            enable: true,
        }
    }
}

/// [`FeatureKind`] for vectors.
#[derive(Debug)]
pub struct VectorKind;

impl FeatureKind for VectorKind {
    type Feature = VectorObject;
    type Style = VectorInfo;

    const KIND: ObjectKind = ObjectKind::Vector;

    fn validate(feature: &VectorObject) -> TerrellaResult<()> {
        if feature.shapes.is_empty() {
            return Err(TerrellaError::InvalidArgument(
                "vector object has no shapes".to_string(),
            ));
        }
        for shape in &feature.shapes {
            let (minimum, what) = match shape {
                VectorShape::Point(_) => (1, "point"),
                VectorShape::Linear(_) => (2, "linear shape"),
                VectorShape::Areal(_) => (3, "areal shape"),
            };
            let points = shape.points();
            if points.len() < minimum {
                return Err(TerrellaError::InvalidArgument(format!(
                    "{what} needs at least {minimum} points, got {}",
                    points.len()
                )));
            }
            if !points.iter().all(|p| p.is_finite()) {
                return Err(TerrellaError::InvalidArgument(format!(
                    "{what} has a non-finite coordinate"
                )));
            }
        }
        Ok(())
    }

    fn build(
        features: &[VectorObject],
        style: &VectorInfo,
        _textures: &mut TextureManager,
        _changes: &mut ChangeSet,
    ) -> TerrellaResult<SceneObject> {
        let shapes = features
            .iter()
            .flat_map(|f| f.shapes.iter().cloned())
            .collect();
        Ok(SceneObject::Vectors(VectorDrawable {
            shapes,
            color: style.color,
            line_width: style.line_width,
            filled: style.filled,
            draw_priority: style.draw_priority,
        }))
    }

    fn initial_enabled(style: &VectorInfo) -> bool {
        style.enable
    }

    fn select(context: &mut MutationContext) -> (&mut FeatureManager<Self>, &mut TextureManager) {
        (&mut context.vectors, &mut context.textures)
    }
}
