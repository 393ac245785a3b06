//! Text state: the sub-record of the graphics state driven by the `T*`
//! operator families.

use pdfkit::font::Font;
use pdfkit::matrix::Matrix;

use std::sync::Arc;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TextRenderMode {
    Fill,
    Stroke,
    FillThenStroke,
    Invisible,
    FillAndClip,
    StrokeAndClip,
    FillStrokeAndClip,
    AddToClip,
}

impl TextRenderMode {
    pub fn from_code(mode: i32) -> Option<TextRenderMode> {
        Some(match mode {
            0 => TextRenderMode::Fill,
            1 => TextRenderMode::Stroke,
            2 => TextRenderMode::FillThenStroke,
            3 => TextRenderMode::Invisible,
            4 => TextRenderMode::FillAndClip,
            5 => TextRenderMode::StrokeAndClip,
            6 => TextRenderMode::FillStrokeAndClip,
            7 => TextRenderMode::AddToClip,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TextState {
    /// Shared with the resource scope; cloning the state shares the font.
    pub font: Option<Arc<Font>>,
    pub font_size: f32,
    pub char_spacing: f32,
    pub word_spacing: f32,
    /// `Tz` fraction: 100% is 1.0.
    pub horiz_scale: f32,
    pub leading: f32,
    pub rise: f32,
    pub render_mode: TextRenderMode,
    pub text_matrix: Matrix,
    pub line_matrix: Matrix,
}

impl TextState {
    pub fn new() -> TextState {
        TextState {
            font: None,
            font_size: 0.,
            char_spacing: 0.,
            word_spacing: 0.,
            horiz_scale: 1.,
            leading: 0.,
            rise: 0.,
            render_mode: TextRenderMode::Fill,
            text_matrix: Matrix::identity(),
            line_matrix: Matrix::identity(),
        }
    }

    /// `BT` resets both matrices.
    pub fn reset_matrices(&mut self) {
        self.set_matrix(Matrix::identity());
    }

    /// `Tm`: set text and line matrix together.
    pub fn set_matrix(&mut self, m: Matrix) {
        self.text_matrix = m;
        self.line_matrix = m;
    }

    /// `Td`: move to the start of the next line, offset from the current
    /// line start.
    pub fn translate_line(&mut self, tx: f32, ty: f32) {
        let m = Matrix::translate(tx, ty).then(self.line_matrix);
        self.set_matrix(m);
    }

    /// `T*`
    pub fn next_line(&mut self) {
        self.translate_line(0., -self.leading);
    }

    /// Advance after a glyph: `(displacement · size + spacing) · hscale`
    /// horizontally, or the vertical analogue.
    pub fn advance_glyph(&mut self, displacement: (f32, f32), extra_spacing: f32, vertical: bool) {
        if vertical {
            let ty = displacement.1 * self.font_size + extra_spacing;
            self.text_matrix = Matrix::translate(0., ty).then(self.text_matrix);
        } else {
            let tx = (displacement.0 * self.font_size + extra_spacing) * self.horiz_scale;
            self.text_matrix = Matrix::translate(tx, 0.).then(self.text_matrix);
        }
    }

    /// `TJ` numeric element: shift by `-amount/1000 · size` (scaled
    /// horizontally).
    pub fn adjust(&mut self, amount: f32, vertical: bool) {
        let shift = -amount / 1000. * self.font_size;
        if vertical {
            self.text_matrix = Matrix::translate(0., shift).then(self.text_matrix);
        } else {
            self.text_matrix =
                Matrix::translate(shift * self.horiz_scale, 0.).then(self.text_matrix);
        }
    }

    /// `parameters · text-matrix`, to be combined with the CTM.
    pub fn parameters_matrix(&self) -> Matrix {
        Matrix {
            a: self.font_size * self.horiz_scale,
            b: 0.,
            c: 0.,
            d: self.font_size,
            e: 0.,
            f: self.rise,
        }
    }
}

impl Default for TextState {
    fn default() -> Self {
        TextState::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn td_moves_relative_to_line_start() {
        let mut ts = TextState::new();
        ts.translate_line(10., 0.);
        ts.advance_glyph((0.5, 0.), 0., false); // moves only the text matrix
        ts.translate_line(10., 0.);
        assert_eq!(ts.text_matrix.e, 20.);
    }

    #[test]
    fn tj_adjustment_is_scaled() {
        let mut ts = TextState::new();
        ts.font_size = 10.;
        ts.horiz_scale = 2.;
        ts.adjust(-500., false);
        // -(-500)/1000 * 10 * 2 = 10
        assert_eq!(ts.text_matrix.e, 10.);
    }
}
