//! The engine's output: a callback set. Rasterizers, text extractors
//! and validators implement this trait, overriding only the callbacks
//! they care about; every method defaults to a no-op.

use pdfkit::content::InlineImage;
use pdfkit::font::Font;
use pdfkit::matrix::Matrix;
use pdfkit::object::{ImageXObject, Rectangle};
use pdfkit::primitive::{Dictionary, Name, Primitive};

use crate::graphics::{GraphicsState, Winding};

/// What `draw_image` was given: a named image XObject or an inline
/// image assembled from `BI … ID … EI`.
pub enum ImageSource<'a> {
    XObject(&'a Name, &'a ImageXObject),
    Inline(&'a InlineImage),
}

#[allow(unused_variables)]
pub trait Device {
    fn begin_text(&mut self, gs: &GraphicsState) {}
    fn end_text(&mut self, gs: &GraphicsState) {}

    /// One glyph of a text-showing operator. `trm` is the text-rendering
    /// matrix in force; `displacement` is the advance in text space.
    fn show_glyph(
        &mut self,
        gs: &GraphicsState,
        trm: Matrix,
        font: &Font,
        code: u32,
        unicode: Option<&str>,
        displacement: (f32, f32),
    ) {
    }

    // path construction, in operand (user-space) coordinates; the CTM in
    // force is available through `gs`
    fn append_rectangle(&mut self, gs: &GraphicsState, rect: Rectangle) {}
    fn move_to(&mut self, gs: &GraphicsState, x: f32, y: f32) {}
    fn line_to(&mut self, gs: &GraphicsState, x: f32, y: f32) {}
    fn curve_to(
        &mut self,
        gs: &GraphicsState,
        c1: (f32, f32),
        c2: (f32, f32),
        p: (f32, f32),
    ) {
    }
    fn close_path(&mut self, gs: &GraphicsState) {}

    // path painting
    fn stroke_path(&mut self, gs: &GraphicsState) {}
    fn fill_path(&mut self, gs: &GraphicsState, winding: Winding) {}
    fn fill_and_stroke_path(&mut self, gs: &GraphicsState, winding: Winding) {}
    fn end_path(&mut self, gs: &GraphicsState) {}
    fn clip(&mut self, gs: &GraphicsState, winding: Winding) {}

    fn draw_image(&mut self, gs: &GraphicsState, image: ImageSource) {}
    fn shading_fill(&mut self, gs: &GraphicsState, name: &Name, shading: &Primitive) {}

    fn begin_marked_content_sequence(
        &mut self,
        gs: &GraphicsState,
        tag: &Name,
        properties: Option<&Dictionary>,
    ) {
    }
    fn end_marked_content_sequence(&mut self, gs: &GraphicsState) {}
}

/// Ignores everything; the default specialization base.
pub struct NopDevice;
impl Device for NopDevice {}
