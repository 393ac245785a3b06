//! Graphics state: the stackable record mutated by content-stream
//! operators.

use pdfkit::font::Font;
use pdfkit::matrix::Matrix;
use pdfkit::object::Rectangle;
use pdfkit::primitive::{Name, Primitive};

use std::sync::Arc;

use crate::text::TextState;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Winding {
    NonZero,
    EvenOdd,
}

#[derive(Debug, Clone)]
pub enum ColorValue {
    Components(Vec<f32>),
    /// `scn`/`SCN` with a pattern name; any numeric operands ride along
    /// for uncolored patterns.
    Pattern {
        name: Name,
        components: Vec<f32>,
    },
}

/// Color conversion is a collaborator's job; the state records the
/// selected space and raw components.
#[derive(Debug, Clone)]
pub struct Color {
    pub space: Name,
    pub value: ColorValue,
}

impl Color {
    pub fn black() -> Color {
        Color {
            space: Name::new("DeviceGray"),
            value: ColorValue::Components(vec![0.]),
        }
    }
}

/// Conservative clipping record: the device-space bounding box of all
/// intersected paths. Exact clipping happens in the device.
#[derive(Debug, Clone, Default)]
pub struct ClipRegion {
    pub bounds: Option<Rectangle>,
}

impl ClipRegion {
    pub fn from_rect(rect: Rectangle) -> ClipRegion {
        ClipRegion {
            bounds: Some(rect.normalized()),
        }
    }
    pub fn intersect(&mut self, rect: Rectangle) {
        let rect = rect.normalized();
        self.bounds = Some(match self.bounds {
            None => rect,
            Some(old) => Rectangle {
                left: old.left.max(rect.left),
                bottom: old.bottom.max(rect.bottom),
                right: old.right.min(rect.right),
                top: old.top.min(rect.top),
            },
        });
    }
}

#[derive(Debug, Clone)]
pub struct GraphicsState {
    /// Maps user space to device space.
    pub ctm: Matrix,
    pub clip: ClipRegion,

    pub stroke_color: Color,
    pub fill_color: Color,

    pub line_width: f32,
    pub line_cap: i32,
    pub line_join: i32,
    pub miter_limit: f32,
    pub dash_pattern: (Vec<f32>, f32),
    pub flatness: f32,
    pub rendering_intent: Name,

    pub stroke_alpha: f32,
    pub fill_alpha: f32,
    pub blend_mode: Name,
    pub soft_mask: Option<Primitive>,

    pub text: TextState,
}

impl GraphicsState {
    /// The sentinel state pushed at page entry; the clip starts at the
    /// page crop box.
    pub fn initial(crop: Rectangle) -> GraphicsState {
        GraphicsState {
            ctm: Matrix::identity(),
            clip: ClipRegion::from_rect(crop),
            stroke_color: Color::black(),
            fill_color: Color::black(),
            line_width: 1.,
            line_cap: 0,
            line_join: 0,
            miter_limit: 10.,
            dash_pattern: (vec![], 0.),
            flatness: 0.,
            rendering_intent: Name::new("RelativeColorimetric"),
            stroke_alpha: 1.,
            fill_alpha: 1.,
            blend_mode: Name::new("Normal"),
            soft_mask: None,
            text: TextState::new(),
        }
    }

    pub fn concat_matrix(&mut self, m: Matrix) {
        self.ctm = m.then(self.ctm);
    }

    /// Transparency groups composite from a neutral state.
    pub fn reset_for_transparency_group(&mut self) {
        self.blend_mode = Name::new("Normal");
        self.stroke_alpha = 1.;
        self.fill_alpha = 1.;
        self.soft_mask = None;
    }

    pub fn font(&self) -> Option<&Arc<Font>> {
        self.text.font.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_intersection_shrinks() {
        let mut clip = ClipRegion::from_rect(Rectangle::new(0., 0., 100., 100.));
        clip.intersect(Rectangle::new(50., 25., 200., 75.));
        assert_eq!(clip.bounds.unwrap(), Rectangle::new(50., 25., 100., 75.));
    }

    #[test]
    fn snapshot_is_independent() {
        let mut a = GraphicsState::initial(Rectangle::new(0., 0., 10., 10.));
        let b = a.clone();
        a.concat_matrix(Matrix::scale(2., 2.));
        a.clip.intersect(Rectangle::new(0., 0., 1., 1.));
        assert_eq!(b.ctm, Matrix::identity());
        assert_eq!(b.clip.bounds.unwrap(), Rectangle::new(0., 0., 10., 10.));
    }
}
