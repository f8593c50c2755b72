//! Screen-space markers.

use std::sync::Arc;

use terrella_core::{
    ChangeSet, Color, Image, MarkerDrawable, MarkerPrimitive, ObjectKind, Point2d, SceneObject,
    TerrellaError, TerrellaResult,
};

use super::{FeatureKind, FeatureManager};
use crate::context::MutationContext;
use crate::texture::TextureManager;

/// A 2D marker pinned to a location.
#[derive(Clone, Debug)]
pub struct ScreenMarker {
    /// Anchor location.
    pub loc: Point2d,
    /// Size on screen.
    pub size: Point2d,
    /// Rotation in radians.
    pub rotation: f64,
    /// Tint colour.
    pub color: Color,
    /// Artwork. Markers without one draw as a tinted quad.
    pub image: Option<Arc<Image>>,
}

impl ScreenMarker {
    /// An untextured marker.
    #[must_use]
    pub fn new(loc: Point2d, size: Point2d) -> Self {
        Self {
            loc,
            size,
            rotation: 0.0,
            color: Color::WHITE,
            image: None,
        }
    }

    /// Sets the artwork.
    #[must_use]
    pub fn with_image(mut self, image: Arc<Image>) -> Self {
        self.image = Some(image);
        self
    }
}

/// How a batch of markers looks.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerInfo {
    /// Sort key among drawables.
    pub draw_priority: i32,
    /// Minimum view height at which the markers show.
    pub min_visible: f64,
    /// Maximum view height at which the markers show.
    pub max_visible: f64,
    /// Fade in/out time in seconds.
    pub fade: f32,
    /// Visible on arrival.
    pub enable: bool,
}

impl Default for MarkerInfo {
    fn default() -> Self {
        Self {
            draw_priority: 0,
            min_visible: 0.0,
            max_visible: f64::MAX,
            fade: 0.0,
            enable: true,
        }
    }
}

/// [`FeatureKind`] for screen markers.
#[derive(Debug)]
pub struct MarkerKind;

impl FeatureKind for MarkerKind {
    type Feature = ScreenMarker;
    type Style = MarkerInfo;

    const KIND: ObjectKind = ObjectKind::Marker;

    fn validate(marker: &ScreenMarker) -> TerrellaResult<()> {
        if !marker.loc.is_finite() || !marker.rotation.is_finite() {
            return Err(TerrellaError::InvalidArgument(
                "marker location and rotation must be finite".to_string(),
            ));
        }
        if !marker.size.is_finite() || marker.size.x <= 0.0 || marker.size.y <= 0.0 {
            return Err(TerrellaError::InvalidArgument(format!(
                "marker size must be positive, got {}x{}",
                marker.size.x, marker.size.y
            )));
        }
        Ok(())
    }

    fn build(
        features: &[ScreenMarker],
        style: &MarkerInfo,
        textures: &mut TextureManager,
        changes: &mut ChangeSet,
    ) -> TerrellaResult<SceneObject> {
        let mut markers = Vec::with_capacity(features.len());
        for marker in features {
            let texture = match &marker.image {
                Some(image) => Some(textures.add_texture(image, changes)?),
                None => None,
            };
            markers.push(MarkerPrimitive {
                loc: marker.loc,
                size: marker.size,
                rotation: marker.rotation,
                color: marker.color,
                texture,
            });
        }

        Ok(SceneObject::Markers(MarkerDrawable {
            markers,
            draw_priority: style.draw_priority,
            min_visible: style.min_visible,
            max_visible: style.max_visible,
            fade: style.fade,
        }))
    }

    fn initial_enabled(style: &MarkerInfo) -> bool {
        style.enable
    }

    fn select(context: &mut MutationContext) -> (&mut FeatureManager<Self>, &mut TextureManager) {
        (&mut context.markers, &mut context.textures)
    }
}
