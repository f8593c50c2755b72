//! Screen-space labels.

use std::sync::Arc;

use terrella_core::{
    ChangeSet, Color, Image, LabelDrawable, LabelPrimitive, ObjectKind, Point2d, SceneObject,
    TerrellaError, TerrellaResult,
};

use super::{FeatureKind, FeatureManager};
use crate::context::MutationContext;
use crate::texture::TextureManager;

/// A text label pinned to a location.
#[derive(Clone, Debug)]
pub struct ScreenLabel {
    /// Anchor location.
    pub loc: Point2d,
    /// Text to draw. Must not be empty.
    pub text: String,
    /// Rotation in radians.
    pub rotation: f64,
    /// Screen offset from the anchor.
    pub offset: Point2d,
    /// Icon drawn beside the text.
    pub icon: Option<Arc<Image>>,
}

impl ScreenLabel {
    /// A plain label.
    #[must_use]
    pub fn new(loc: Point2d, text: impl Into<String>) -> Self {
        Self {
            loc,
            text: text.into(),
            rotation: 0.0,
            offset: Point2d::ZERO,
            icon: None,
        }
    }
}

/// How a batch of labels looks.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelInfo {
    /// Text colour.
    pub text_color: Color,
    /// Background colour.
    pub background_color: Color,
    /// Font size in points.
    pub font_size: f32,
    /// Sort key among drawables.
    pub draw_priority: i32,
    /// Visible on arrival.
    pub enable: bool,
}

impl Default for LabelInfo {
    fn default() -> Self {
        Self {
            text_color: Color::WHITE,
            background_color: Color::TRANSPARENT,
            font_size: 16.0,
            draw_priority: 0,
            enable: true,
        }
    }
}

/// [`FeatureKind`] for screen labels.
#[derive(Debug)]
pub struct LabelKind;

impl FeatureKind for LabelKind {
    type Feature = ScreenLabel;
    type Style = LabelInfo;

    const KIND: ObjectKind = ObjectKind::Label;

    fn validate(label: &ScreenLabel) -> TerrellaResult<()> {
        if label.text.is_empty() {
            return Err(TerrellaError::InvalidArgument(
                "label text must not be empty".to_string(),
            ));
        }
        if !label.loc.is_finite() || !label.offset.is_finite() || !label.rotation.is_finite() {
            return Err(TerrellaError::InvalidArgument(format!(
                "label {:?} has a non-finite placement",
                label.text
            )));
        }
        Ok(())
    }

    fn build(
        features: &[ScreenLabel],
        style: &LabelInfo,
        textures: &mut TextureManager,
        changes: &mut ChangeSet,
    ) -> TerrellaResult<SceneObject> {
        let labels = features
            .iter()
            .map(|label| {
                let icon = label
                    .icon
                    .as_ref()
                    .map(|image| textures.add_texture(image, changes))
                    .transpose()?;
                Ok(LabelPrimitive {
                    loc: label.loc,
                    text: label.text.clone(),
                    rotation: label.rotation,
                    offset: label.offset,
                    icon,
                })
            })
            .collect::<TerrellaResult<Vec<_>>>()?;

        Ok(SceneObject::Labels(LabelDrawable {
            labels,
            text_color: style.text_color,
            background_color: style.background_color,
            font_size: style.font_size,
            draw_priority: style.draw_priority,
        }))
    }

    fn initial_enabled(style: &LabelInfo) -> bool {
        style.enable
    }

    fn select(context: &mut MutationContext) -> (&mut FeatureManager<Self>, &mut TextureManager) {
        (&mut context.labels, &mut context.textures)
    }
}
