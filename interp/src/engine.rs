//! The stream engine: drives the operator registry over the token
//! stream, maintains the graphics and resource stacks, and recurses
//! into sub-streams.
//!
//! Entry points: page content, Form XObjects, transparency groups,
//! Type 3 character procedures, tiling patterns and annotation
//! appearances. Every entry acquires a resource scope and a graphics
//! stack snapshot and releases both on every exit path.

use pdfkit::content::{page_content_data, InlineImage, Token, Tokenize};
use pdfkit::document::LenientResolver;
use pdfkit::error::*;
use pdfkit::font::Font;
use pdfkit::matrix::Matrix;
use pdfkit::object::{
    Annot, FormXObject, GraphicsStateParameters, Object, Pattern, Rectangle, Resolve, Resources,
    Stream, XObject,
};
use pdfkit::primitive::{Dictionary, Name, Primitive};

use itertools::Itertools;
use std::sync::Arc;

use crate::device::{Device, ImageSource};
use crate::graphics::{Color, ColorValue, GraphicsState, Winding};
use crate::ops::{lookup, OpCode};
use crate::text::TextRenderMode;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Maximum depth of sub-stream recursion.
    pub max_depth: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions { max_depth: 12 }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum TextObject {
    Outside,
    Inside,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ResourceKind {
    Font,
    XObject,
    ExtGState,
    ColorSpace,
    Pattern,
    Shading,
    Properties,
}

impl ResourceKind {
    fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Font => "Font",
            ResourceKind::XObject => "XObject",
            ResourceKind::ExtGState => "ExtGState",
            ResourceKind::ColorSpace => "ColorSpace",
            ResourceKind::Pattern => "Pattern",
            ResourceKind::Shading => "Shading",
            ResourceKind::Properties => "Properties",
        }
    }
}

#[derive(Default)]
struct InlineImageBuilder {
    info: Option<Dictionary>,
    data: Option<Vec<u8>>,
}

struct DescendSetup {
    resources: Option<Resources>,
    /// Replaces the CTM before `matrix` is concatenated; Type 3 glyphs
    /// and tiling patterns anchor to a fixed frame, not the working CTM.
    base_ctm: Option<Matrix>,
    matrix: Matrix,
    clip_bbox: Option<Rectangle>,
    transparency_group: bool,
    reset_text: bool,
}

impl DescendSetup {
    fn new(matrix: Matrix) -> DescendSetup {
        DescendSetup {
            resources: None,
            base_ctm: None,
            matrix,
            clip_bbox: None,
            transparency_group: false,
            reset_text: false,
        }
    }
}

pub struct StreamEngine<'a, R: Resolve, T: Tokenize, D: Device> {
    resolve: &'a R,
    tokenizer: &'a T,
    device: D,
    options: EngineOptions,

    gs_stack: Vec<GraphicsState>,
    operands: Vec<Primitive>,
    resources: Vec<Resources>,
    level: usize,
    /// Coordinate frame of the enclosing stream; pattern placement is
    /// relative to this, not to the working CTM.
    init_matrix: Matrix,

    text_object: TextObject,
    in_path: bool,
    pending_clip: Option<Winding>,
    inline: Option<InlineImageBuilder>,
}

impl<'a, R: Resolve, T: Tokenize, D: Device> StreamEngine<'a, R, T, D> {
    pub fn new(resolve: &'a R, tokenizer: &'a T, device: D, options: EngineOptions) -> Self {
        StreamEngine {
            resolve,
            tokenizer,
            device,
            options,
            gs_stack: vec![GraphicsState::initial(Rectangle::new(0., 0., 612., 792.))],
            operands: Vec::new(),
            resources: Vec::new(),
            level: 0,
            init_matrix: Matrix::identity(),
            text_object: TextObject::Outside,
            in_path: false,
            pending_clip: None,
            inline: None,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
    pub fn into_device(self) -> D {
        self.device
    }

    pub fn state(&self) -> &GraphicsState {
        self.gs_stack.last().expect("sentinel state")
    }
    fn state_mut(&mut self) -> &mut GraphicsState {
        self.gs_stack.last_mut().expect("sentinel state")
    }
    pub fn stack_depth(&self) -> usize {
        self.gs_stack.len()
    }

    fn lenient(&self) -> LenientResolver<'a, R> {
        LenientResolver(self.resolve)
    }

    /// Interpret a page's content streams. The sentinel graphics state
    /// is clipped to the page view box.
    pub fn run_page(&mut self, page: &Dictionary) -> Result<()> {
        let view = self.page_view_box(page);
        self.gs_stack = vec![GraphicsState::initial(view)];
        self.init_matrix = Matrix::identity();
        self.operands.clear();
        self.text_object = TextObject::Outside;
        self.in_path = false;

        let resources = match page.get("Resources") {
            Some(p) => match Resources::from_primitive(p.clone(), &self.lenient()) {
                Ok(r) => r,
                Err(e) => {
                    warn!("unreadable page resources: {}", e);
                    Resources::default()
                }
            },
            None => Resources::default(),
        };
        self.resources = vec![resources];

        let data = match page.get("Contents") {
            Some(contents) => page_content_data(contents, &self.lenient())?,
            None => Vec::new(),
        };
        let result = self.execute_data(&data);

        if self.gs_stack.len() != 1 {
            warn!(
                "content stream left {} graphics states on the stack",
                self.gs_stack.len() - 1
            );
            self.gs_stack.truncate(1);
        }
        if self.text_object != TextObject::Outside {
            warn!("content stream ended inside a text object");
            self.text_object = TextObject::Outside;
        }
        result
    }

    fn page_view_box(&self, page: &Dictionary) -> Rectangle {
        let read = |key: &str| {
            page.get(key)
                .and_then(|p| Rectangle::from_primitive(p.clone(), &self.lenient()).ok())
        };
        read("CropBox")
            .or_else(|| read("MediaBox"))
            .unwrap_or(Rectangle::new(0., 0., 612., 792.))
            .normalized()
    }

    /// Evaluate a Form XObject in the current context.
    pub fn run_form_xobject(&mut self, form: &FormXObject) -> Result<()> {
        let mut setup = DescendSetup::new(form.matrix);
        setup.resources = self.load_resources(form.resources.as_ref());
        setup.clip_bbox = Some(form.bbox);
        setup.transparency_group = form.is_transparency_group();
        let data = form.stream.data()?.to_vec();
        self.descend(setup, &data)
    }

    /// Evaluate a tiling pattern's cell. Placement is anchored at the
    /// initial matrix of the enclosing stream.
    pub fn run_tiling_pattern(&mut self, pattern: &pdfkit::object::TilingPattern) -> Result<()> {
        let mut setup = DescendSetup::new(pattern.matrix);
        setup.resources = self.load_resources(pattern.resources.as_ref());
        setup.base_ctm = Some(self.init_matrix);
        setup.clip_bbox = Some(pattern.bbox);
        setup.reset_text = true;
        let data = pattern.stream.data()?.to_vec();
        self.descend(setup, &data)
    }

    /// Evaluate an annotation's normal appearance, mapped onto the
    /// annotation rectangle.
    pub fn run_annotation(&mut self, annot: &Annot) -> Result<()> {
        if annot.is_hidden() {
            return Ok(());
        }
        let lenient = self.lenient();
        let appearance = match annot.normal_appearance(&lenient)? {
            Some(p) => p,
            None => return Ok(()),
        };
        let stream = Stream::from_stream(appearance.into_stream(&lenient)?, &lenient)?;
        let form = FormXObject::from_stream(stream, &lenient)?;
        let rect = match annot.rect {
            Some(r) => r.normalized(),
            None => return Ok(()),
        };

        // map the appearance box, as transformed by its own matrix, onto
        // the annotation rectangle; axes scale independently, and the
        // composition order matches viewer behaviour rather than the
        // published one
        let tb = form.bbox.transformed(form.matrix).normalized();
        let sx = if tb.width() != 0. {
            rect.width() / tb.width()
        } else {
            1.
        };
        let sy = if tb.height() != 0. {
            rect.height() / tb.height()
        } else {
            1.
        };
        let placement = Matrix::translate(-tb.left, -tb.bottom)
            .then(Matrix::scale(sx, sy))
            .then(Matrix::translate(rect.left, rect.bottom));

        let mut setup = DescendSetup::new(form.matrix.then(placement));
        setup.resources = self.load_resources(form.resources.as_ref());
        setup.clip_bbox = Some(form.bbox);
        let data = form.stream.data()?.to_vec();
        self.descend(setup, &data)
    }

    fn run_type3_glyph(&mut self, font: &Font, char_proc: &Primitive, trm: Matrix) -> Result<()> {
        let lenient = self.lenient();
        let stream = Stream::from_primitive(char_proc.clone(), &lenient)?;
        let mut setup = DescendSetup::new(font.font_matrix);
        setup.resources = self.load_resources(font.resources.as_ref());
        setup.base_ctm = Some(trm);
        // no bounding-box clip: Type 3 boxes are unreliable in the wild
        setup.reset_text = true;
        let data = stream.data()?.to_vec();
        self.descend(setup, &data)
    }

    fn load_resources(&self, p: Option<&Primitive>) -> Option<Resources> {
        let p = p?;
        match Resources::from_primitive(p.clone(), &self.lenient()) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!("unreadable resource dictionary: {}", e);
                None
            }
        }
    }

    fn descend(&mut self, setup: DescendSetup, data: &[u8]) -> Result<()> {
        if self.level >= self.options.max_depth {
            return Err(PdfError::DepthExceeded {
                depth: self.level + 1,
                limit: self.options.max_depth,
            });
        }
        self.level += 1;

        // acquire: resource scope, graphics snapshot, interpreter state
        let pushed_resources = match setup.resources {
            Some(r) => {
                self.resources.push(r);
                true
            }
            None => false,
        };
        let top = self.state().clone();
        let saved_stack = std::mem::replace(&mut self.gs_stack, vec![top]);
        let saved_init = self.init_matrix;
        let saved_text_object = self.text_object;
        let saved_in_path = self.in_path;
        let saved_pending = self.pending_clip.take();
        let saved_operands = std::mem::take(&mut self.operands);

        {
            let gs = self.state_mut();
            if let Some(base) = setup.base_ctm {
                gs.ctm = base;
            }
            gs.ctm = setup.matrix.then(gs.ctm);
            if setup.transparency_group {
                gs.reset_for_transparency_group();
            }
            if setup.reset_text {
                gs.text.reset_matrices();
            }
        }
        self.init_matrix = self.state().ctm;
        if let Some(bbox) = setup.clip_bbox {
            let ctm = self.state().ctm;
            self.state_mut().clip.intersect(bbox.transformed(ctm));
        }
        self.text_object = TextObject::Outside;
        self.in_path = false;

        let result = self.execute_data(data);

        // release on every exit path
        self.operands = saved_operands;
        self.pending_clip = saved_pending;
        self.in_path = saved_in_path;
        self.text_object = saved_text_object;
        self.init_matrix = saved_init;
        self.gs_stack = saved_stack;
        if pushed_resources {
            self.resources.pop();
        }
        self.level -= 1;
        result
    }

    fn execute_data(&mut self, data: &[u8]) -> Result<()> {
        let tokens = self.tokenizer.tokens(data)?;
        for token in tokens {
            match token {
                Token::Operand(p) => self.operands.push(p),
                Token::ImageData(bytes) => match self.inline {
                    Some(ref mut builder) => builder.data = Some(bytes),
                    None => warn!("image data outside an inline image"),
                },
                Token::Operator(op) => {
                    let result = self.dispatch(&op);
                    self.operands.clear();
                    if let Err(e) = result {
                        if e.is_recoverable() {
                            log_recovered(&op, &e);
                        } else {
                            return Err(e);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, mnemonic: &str) -> Result<()> {
        let info = lookup(mnemonic).ok_or_else(|| PdfError::UnknownOperator {
            operator: mnemonic.into(),
        })?;
        if let Some(arity) = info.arity {
            if self.operands.len() < arity as usize {
                return Err(PdfError::MissingOperand {
                    operator: mnemonic.into(),
                    index: self.operands.len(),
                    expected: "operand",
                });
            }
        }
        if !self.state_machine_allows(info.code) {
            return Ok(());
        }
        let mut operands = std::mem::take(&mut self.operands);
        if let Some(arity) = info.arity {
            // surplus operands are ignored; the ones nearest the
            // operator count
            operands.drain(..operands.len() - arity as usize);
        }
        // `Do` faults demote to warnings: historical leniency
        if info.code == OpCode::Invoke {
            if let Err(e) = self.op_invoke(&operands) {
                warn!("Do: {}", e);
            }
            return Ok(());
        }
        self.run_op(info.code, mnemonic, &operands)
    }

    /// Enforce the outside-text / inside-text / inside-path transitions;
    /// illegal operators are skipped with a warning.
    fn state_machine_allows(&mut self, code: OpCode) -> bool {
        use OpCode::*;
        match code {
            ShowText | ShowTextAdjusted | MoveShowText | SpacingMoveShowText => {
                if self.text_object != TextObject::Inside {
                    warn!("text-showing operator outside BT/ET; skipped");
                    return false;
                }
            }
            MoveTo | LineTo | CurveTo | CurveToReplicateInitial | CurveToReplicateFinal | Rect
            | ClosePath | Stroke | CloseStroke | Fill | FillCompat | FillEvenOdd | FillStroke
            | FillStrokeEvenOdd | CloseFillStroke | CloseFillStrokeEvenOdd | EndPath | Clip
            | ClipEvenOdd => {
                if self.text_object == TextObject::Inside {
                    warn!("path operator inside BT/ET; skipped");
                    return false;
                }
            }
            BeginText => {
                if self.text_object == TextObject::Inside {
                    warn!("BT inside a text object; skipped");
                    return false;
                }
            }
            EndText => {
                if self.text_object != TextObject::Inside {
                    warn!("ET outside a text object; skipped");
                    return false;
                }
            }
            _ => (),
        }
        true
    }

    fn run_op(&mut self, code: OpCode, mnemonic: &str, ops: &[Primitive]) -> Result<()> {
        use OpCode::*;
        match code {
            SetLineWidth => self.state_mut().line_width = number(ops, mnemonic, 0)?,
            SetLineCap => self.state_mut().line_cap = integer(ops, mnemonic, 0)?,
            SetLineJoin => self.state_mut().line_join = integer(ops, mnemonic, 0)?,
            SetMiterLimit => self.state_mut().miter_limit = number(ops, mnemonic, 0)?,
            SetDash => {
                let dashes = operand(ops, mnemonic, 0)?
                    .as_array()?
                    .iter()
                    .map(|p| p.as_number())
                    .collect::<Result<Vec<f32>>>()?;
                let phase = number(ops, mnemonic, 1)?;
                self.state_mut().dash_pattern = (dashes, phase);
            }
            SetRenderingIntent => {
                self.state_mut().rendering_intent = name(ops, mnemonic, 0)?;
            }
            SetFlatness => self.state_mut().flatness = number(ops, mnemonic, 0)?,
            SetExtGState => self.op_ext_g_state(ops, mnemonic)?,

            Save => {
                self.in_path = false;
                let top = self.state().clone();
                self.gs_stack.push(top);
            }
            Restore => {
                self.in_path = false;
                if self.gs_stack.len() <= 1 {
                    // the sentinel stays; restore degrades to a no-op
                    return Err(PdfError::EmptyGraphicsStack);
                }
                self.gs_stack.pop();
            }
            Concat => {
                let m = matrix_from(ops, mnemonic)?;
                self.state_mut().concat_matrix(m);
            }

            MoveTo => {
                self.in_path = true;
                let (x, y) = point(ops, mnemonic, 0)?;
                let gs = self.gs_stack.last().expect("sentinel state");
                self.device.move_to(gs, x, y);
            }
            LineTo => {
                let (x, y) = point(ops, mnemonic, 0)?;
                let gs = self.gs_stack.last().expect("sentinel state");
                self.device.line_to(gs, x, y);
            }
            CurveTo => {
                let c1 = point(ops, mnemonic, 0)?;
                let c2 = point(ops, mnemonic, 2)?;
                let p = point(ops, mnemonic, 4)?;
                let gs = self.gs_stack.last().expect("sentinel state");
                self.device.curve_to(gs, c1, c2, p);
            }
            CurveToReplicateInitial => {
                let c2 = point(ops, mnemonic, 0)?;
                let p = point(ops, mnemonic, 2)?;
                let gs = self.gs_stack.last().expect("sentinel state");
                self.device.curve_to(gs, p, c2, p);
            }
            CurveToReplicateFinal => {
                let c1 = point(ops, mnemonic, 0)?;
                let p = point(ops, mnemonic, 2)?;
                let gs = self.gs_stack.last().expect("sentinel state");
                self.device.curve_to(gs, c1, p, p);
            }
            Rect => {
                self.in_path = true;
                let (x, y) = point(ops, mnemonic, 0)?;
                let (w, h) = point(ops, mnemonic, 2)?;
                let rect = Rectangle::new(x, y, x + w, y + h);
                let gs = self.gs_stack.last().expect("sentinel state");
                self.device.append_rectangle(gs, rect);
            }
            ClosePath => {
                let gs = self.gs_stack.last().expect("sentinel state");
                self.device.close_path(gs);
            }

            Stroke => self.paint(PaintOp::Stroke, false),
            CloseStroke => self.paint(PaintOp::Stroke, true),
            Fill | FillCompat => self.paint(PaintOp::Fill(Winding::NonZero), false),
            FillEvenOdd => self.paint(PaintOp::Fill(Winding::EvenOdd), false),
            FillStroke => self.paint(PaintOp::FillStroke(Winding::NonZero), false),
            FillStrokeEvenOdd => self.paint(PaintOp::FillStroke(Winding::EvenOdd), false),
            CloseFillStroke => self.paint(PaintOp::FillStroke(Winding::NonZero), true),
            CloseFillStrokeEvenOdd => self.paint(PaintOp::FillStroke(Winding::EvenOdd), true),
            EndPath => self.paint(PaintOp::None, false),

            Clip => self.pending_clip = Some(Winding::NonZero),
            ClipEvenOdd => self.pending_clip = Some(Winding::EvenOdd),

            BeginText => {
                self.text_object = TextObject::Inside;
                self.state_mut().text.reset_matrices();
                let gs = self.gs_stack.last().expect("sentinel state");
                self.device.begin_text(gs);
            }
            EndText => {
                self.text_object = TextObject::Outside;
                let gs = self.gs_stack.last().expect("sentinel state");
                self.device.end_text(gs);
            }

            SetCharSpacing => self.state_mut().text.char_spacing = number(ops, mnemonic, 0)?,
            SetWordSpacing => self.state_mut().text.word_spacing = number(ops, mnemonic, 0)?,
            SetHorizScaling => {
                self.state_mut().text.horiz_scale = number(ops, mnemonic, 0)? / 100.;
            }
            SetLeading => self.state_mut().text.leading = number(ops, mnemonic, 0)?,
            SetFont => self.op_set_font(ops, mnemonic)?,
            SetRenderMode => {
                let mode = integer(ops, mnemonic, 0)?;
                match TextRenderMode::from_code(mode) {
                    Some(mode) => self.state_mut().text.render_mode = mode,
                    None => warn!("invalid text render mode {}", mode),
                }
            }
            SetRise => self.state_mut().text.rise = number(ops, mnemonic, 0)?,

            TextMove => {
                let (tx, ty) = point(ops, mnemonic, 0)?;
                self.state_mut().text.translate_line(tx, ty);
            }
            TextMoveSetLeading => {
                let (tx, ty) = point(ops, mnemonic, 0)?;
                let text = &mut self.state_mut().text;
                text.leading = -ty;
                text.translate_line(tx, ty);
            }
            SetTextMatrix => {
                let m = matrix_from(ops, mnemonic)?;
                self.state_mut().text.set_matrix(m);
            }
            TextNextLine => self.state_mut().text.next_line(),

            ShowText => {
                let text = string(ops, mnemonic, 0)?;
                self.show_text(&text)?;
            }
            ShowTextAdjusted => self.op_show_adjusted(ops, mnemonic)?,
            MoveShowText => {
                self.state_mut().text.next_line();
                let text = string(ops, mnemonic, 0)?;
                self.show_text(&text)?;
            }
            SpacingMoveShowText => {
                let word_spacing = number(ops, mnemonic, 0)?;
                let char_spacing = number(ops, mnemonic, 1)?;
                {
                    let text = &mut self.state_mut().text;
                    text.word_spacing = word_spacing;
                    text.char_spacing = char_spacing;
                    text.next_line();
                }
                let text = string(ops, mnemonic, 2)?;
                self.show_text(&text)?;
            }

            SetStrokeColorSpace => self.op_color_space(ops, mnemonic, true)?,
            SetFillColorSpace => self.op_color_space(ops, mnemonic, false)?,
            SetStrokeColor | SetStrokeColorN => self.op_color(ops, mnemonic, true)?,
            SetFillColor | SetFillColorN => self.op_color(ops, mnemonic, false)?,
            SetStrokeGray => self.set_device_color(ops, mnemonic, true, "DeviceGray", 1)?,
            SetFillGray => self.set_device_color(ops, mnemonic, false, "DeviceGray", 1)?,
            SetStrokeRgb => self.set_device_color(ops, mnemonic, true, "DeviceRGB", 3)?,
            SetFillRgb => self.set_device_color(ops, mnemonic, false, "DeviceRGB", 3)?,
            SetStrokeCmyk => self.set_device_color(ops, mnemonic, true, "DeviceCMYK", 4)?,
            SetFillCmyk => self.set_device_color(ops, mnemonic, false, "DeviceCMYK", 4)?,

            ShadingFill => {
                let shading_name = name(ops, mnemonic, 0)?;
                let shading = self.lookup_resource(ResourceKind::Shading, &shading_name)?;
                let gs = self.gs_stack.last().expect("sentinel state");
                self.device.shading_fill(gs, &shading_name, &shading);
            }

            BeginInlineImage => self.inline = Some(InlineImageBuilder::default()),
            InlineImageData => {
                let mut info = Dictionary::new();
                for (key, value) in ops.iter().tuples() {
                    match key.as_name() {
                        Ok(key) => {
                            info.insert(key.clone(), value.clone());
                        }
                        Err(_) => warn!("inline image key is a {}", key.get_debug_name()),
                    }
                }
                match self.inline {
                    Some(ref mut builder) => builder.info = Some(info),
                    None => warn!("ID without BI"),
                }
            }
            EndInlineImage => self.op_end_inline_image()?,

            Invoke => unreachable!("handled in dispatch"),

            MarkPoint | MarkPointProps => (),
            BeginMarkedContent => {
                let tag = name(ops, mnemonic, 0)?;
                let gs = self.gs_stack.last().expect("sentinel state");
                self.device.begin_marked_content_sequence(gs, &tag, None);
            }
            BeginMarkedContentProps => {
                let tag = name(ops, mnemonic, 0)?;
                let props = self.marked_content_properties(operand(ops, mnemonic, 1)?)?;
                let gs = self.gs_stack.last().expect("sentinel state");
                self.device
                    .begin_marked_content_sequence(gs, &tag, props.as_ref());
            }
            EndMarkedContent => {
                let gs = self.gs_stack.last().expect("sentinel state");
                self.device.end_marked_content_sequence(gs);
            }

            BeginCompat | EndCompat => (),
            // Type 3 glyph metrics; displacement comes from the font
            SetCharWidth | SetCacheDevice => (),
        }
        Ok(())
    }

    fn marked_content_properties(&self, p: &Primitive) -> Result<Option<Dictionary>> {
        Ok(match p {
            Primitive::Name(n) => {
                let props = self.lookup_resource(ResourceKind::Properties, n)?;
                let lenient = self.lenient();
                props.resolve(&lenient)?.into_dictionary(&lenient).ok()
            }
            Primitive::Dictionary(d) => Some(d.clone()),
            p => {
                warn!("BDC properties are a {}", p.get_debug_name());
                None
            }
        })
    }

    fn paint(&mut self, op: PaintOp, close_first: bool) {
        let gs = self.gs_stack.last().expect("sentinel state");
        if close_first {
            self.device.close_path(gs);
        }
        match op {
            PaintOp::Stroke => self.device.stroke_path(gs),
            PaintOp::Fill(w) => self.device.fill_path(gs, w),
            PaintOp::FillStroke(w) => self.device.fill_and_stroke_path(gs, w),
            PaintOp::None => self.device.end_path(gs),
        }
        // a pending W/W* takes effect once the path is painted
        if let Some(winding) = self.pending_clip.take() {
            let gs = self.gs_stack.last().expect("sentinel state");
            self.device.clip(gs, winding);
        }
        self.in_path = false;
    }

    fn op_ext_g_state(&mut self, ops: &[Primitive], mnemonic: &str) -> Result<()> {
        let gs_name = name(ops, mnemonic, 0)?;
        let dict = self.lookup_resource(ResourceKind::ExtGState, &gs_name)?;
        let lenient = self.lenient();
        let params = GraphicsStateParameters::from_primitive(dict, &lenient)?;

        let font = match params.font {
            Some((ref font_ref, size)) => {
                let font_dict = font_ref
                    .clone()
                    .resolve(&lenient)?
                    .into_dictionary(&lenient)?;
                Some((Arc::new(Font::from_dict(font_dict, &lenient)?), size))
            }
            None => None,
        };

        let state = self.state_mut();
        if let Some(w) = params.line_width {
            state.line_width = w;
        }
        if let Some(c) = params.line_cap {
            state.line_cap = c;
        }
        if let Some(j) = params.line_join {
            state.line_join = j;
        }
        if let Some(m) = params.miter_limit {
            state.miter_limit = m;
        }
        if let Some(d) = params.dash_pattern {
            state.dash_pattern = d;
        }
        if let Some(ri) = params.rendering_intent {
            state.rendering_intent = ri;
        }
        if let Some(f) = params.flatness {
            state.flatness = f;
        }
        if let Some(bm) = params.blend_mode {
            state.blend_mode = match bm {
                Primitive::Name(n) => n,
                Primitive::Array(ref arr) => match arr.first() {
                    Some(Primitive::Name(n)) => n.clone(),
                    _ => Name::new("Normal"),
                },
                _ => Name::new("Normal"),
            };
        }
        if let Some(sm) = params.smask {
            state.soft_mask = match sm {
                Primitive::Name(ref n) if n == "None" => None,
                sm => Some(sm),
            };
        }
        if let Some(a) = params.stroke_alpha {
            state.stroke_alpha = a;
        }
        if let Some(a) = params.fill_alpha {
            state.fill_alpha = a;
        }
        if let Some((font, size)) = font {
            state.text.font = Some(font);
            state.text.font_size = size;
        }
        Ok(())
    }

    fn op_set_font(&mut self, ops: &[Primitive], mnemonic: &str) -> Result<()> {
        let font_name = name(ops, mnemonic, 0)?;
        let size = number(ops, mnemonic, 1)?;
        let dict_prim = self.lookup_resource(ResourceKind::Font, &font_name)?;
        let lenient = self.lenient();
        let dict = dict_prim.resolve(&lenient)?.into_dictionary(&lenient)?;
        let font = Arc::new(Font::from_dict(dict, &lenient)?);
        let text = &mut self.state_mut().text;
        text.font = Some(font);
        text.font_size = size;
        Ok(())
    }

    fn op_color_space(&mut self, ops: &[Primitive], mnemonic: &str, stroke: bool) -> Result<()> {
        let space = name(ops, mnemonic, 0)?;
        let components = match space.as_str() {
            "DeviceGray" | "CalGray" | "G" => vec![0.],
            "DeviceRGB" | "CalRGB" | "Lab" | "RGB" => vec![0., 0., 0.],
            "DeviceCMYK" | "CMYK" => vec![0., 0., 0., 1.],
            "Pattern" => vec![],
            _ => {
                // named spaces must exist in the resource scope
                self.lookup_resource(ResourceKind::ColorSpace, &space)?;
                vec![]
            }
        };
        let color = Color {
            space,
            value: ColorValue::Components(components),
        };
        if stroke {
            self.state_mut().stroke_color = color;
        } else {
            self.state_mut().fill_color = color;
        }
        Ok(())
    }

    fn op_color(&mut self, ops: &[Primitive], mnemonic: &str, stroke: bool) -> Result<()> {
        if ops.is_empty() {
            return Err(PdfError::MissingOperand {
                operator: mnemonic.into(),
                index: 0,
                expected: "color component",
            });
        }
        let value = match ops.last() {
            Some(Primitive::Name(pattern)) => {
                let components = numbers(&ops[..ops.len() - 1], mnemonic)?;
                ColorValue::Pattern {
                    name: pattern.clone(),
                    components,
                }
            }
            _ => ColorValue::Components(numbers(ops, mnemonic)?),
        };
        let state = self.state_mut();
        let color = if stroke {
            &mut state.stroke_color
        } else {
            &mut state.fill_color
        };
        color.value = value;
        Ok(())
    }

    fn set_device_color(
        &mut self,
        ops: &[Primitive],
        mnemonic: &str,
        stroke: bool,
        space: &str,
        n: usize,
    ) -> Result<()> {
        let mut components = Vec::with_capacity(n);
        for i in 0..n {
            components.push(number(ops, mnemonic, i)?);
        }
        let color = Color {
            space: Name::new(space),
            value: ColorValue::Components(components),
        };
        if stroke {
            self.state_mut().stroke_color = color;
        } else {
            self.state_mut().fill_color = color;
        }
        Ok(())
    }

    fn op_show_adjusted(&mut self, ops: &[Primitive], mnemonic: &str) -> Result<()> {
        let array = operand(ops, mnemonic, 0)?.as_array()?.to_vec();
        let vertical = self
            .state()
            .text
            .font
            .as_ref()
            .map_or(false, |f| f.vertical);
        for element in array {
            match element {
                Primitive::String(s) => self.show_text(s.as_bytes())?,
                ref p => match p.as_number() {
                    Ok(adjustment) => self.state_mut().text.adjust(adjustment, vertical),
                    Err(_) => {
                        return Err(PdfError::MissingOperand {
                            operator: mnemonic.into(),
                            index: 0,
                            expected: "number or string",
                        })
                    }
                },
            }
        }
        Ok(())
    }

    fn show_text(&mut self, bytes: &[u8]) -> Result<()> {
        let font = match self.state().text.font {
            Some(ref f) => Arc::clone(f),
            None => {
                return Err(PdfError::MissingResource {
                    kind: "Font",
                    name: "(no font set)".into(),
                })
            }
        };
        let mut rest = bytes;
        while let Some((code, tail)) = font.next_code(rest) {
            rest = tail;
            let (trm, displacement) = {
                let gs = self.gs_stack.last().expect("sentinel state");
                let ts = &gs.text;
                let mut m = ts.parameters_matrix().then(ts.text_matrix).then(gs.ctm);
                if font.vertical {
                    // shift by the position vector: origin moves to the
                    // glyph's top center
                    let v = (font.nominal_width(code) / 2., 0.88);
                    m = Matrix::translate(-v.0, -v.1).then(m);
                }
                (m, font.displacement(code))
            };

            {
                let gs = self.gs_stack.last().expect("sentinel state");
                self.device
                    .show_glyph(gs, trm, &font, code, font.unicode(code), displacement);
            }
            if font.is_type3() {
                match font.char_proc(code) {
                    Some(char_proc) => {
                        let char_proc = char_proc.clone();
                        if let Err(e) = self.run_type3_glyph(&font, &char_proc, trm) {
                            if e.is_recoverable() {
                                warn!("type 3 glyph {}: {}", code, e);
                            } else {
                                return Err(e);
                            }
                        }
                    }
                    None => info!("no char proc for code {}", code),
                }
            }

            // word spacing only for the single byte 0x20
            let word = if code == 0x20 && font.code_len == 1 {
                self.state().text.word_spacing
            } else {
                0.
            };
            let spacing = self.state().text.char_spacing + word;
            self.state_mut()
                .text
                .advance_glyph(displacement, spacing, font.vertical);
        }
        Ok(())
    }

    fn op_invoke(&mut self, ops: &[Primitive]) -> Result<()> {
        let xobject_name = name(ops, "Do", 0)?;
        let p = self.lookup_resource(ResourceKind::XObject, &xobject_name)?;
        let lenient = self.lenient();
        let xobject = XObject::from_primitive(p, &lenient)?;
        match xobject {
            XObject::Form(form) => self.run_form_xobject(&form),
            XObject::Image(image) => {
                let gs = self.gs_stack.last().expect("sentinel state");
                self.device
                    .draw_image(gs, ImageSource::XObject(&xobject_name, &image));
                Ok(())
            }
            XObject::Postscript(_) => {
                info!("ignoring PostScript XObject /{}", xobject_name.as_str());
                Ok(())
            }
        }
    }

    fn op_end_inline_image(&mut self) -> Result<()> {
        let builder = match self.inline.take() {
            Some(b) => b,
            None => {
                warn!("EI without BI");
                return Ok(());
            }
        };
        let info = builder.info.unwrap_or_default();
        let data = builder.data.unwrap_or_default();
        if let Some(filter) = unsupported_inline_filter(&info) {
            return Err(PdfError::MissingImageDecoder { filter });
        }
        let image = InlineImage { info, data };
        let gs = self.gs_stack.last().expect("sentinel state");
        self.device.draw_image(gs, ImageSource::Inline(&image));
        Ok(())
    }

    /// Innermost scope first, then enclosing scopes down to the page.
    /// An outer-scope hit is the inheritance fallback real documents
    /// rely on, so it is logged for strict validators.
    fn lookup_resource(&self, kind: ResourceKind, name: &str) -> Result<Primitive> {
        for (i, scope) in self.resources.iter().enumerate().rev() {
            let map = match kind {
                ResourceKind::Font => &scope.fonts,
                ResourceKind::XObject => &scope.xobjects,
                ResourceKind::ExtGState => &scope.ext_g_states,
                ResourceKind::ColorSpace => &scope.color_spaces,
                ResourceKind::Pattern => &scope.patterns,
                ResourceKind::Shading => &scope.shadings,
                ResourceKind::Properties => &scope.properties,
            };
            if let Some(p) = map.get(name) {
                if i + 1 != self.resources.len() {
                    info!(
                        "resource /{} ({}) inherited from an enclosing scope",
                        name,
                        kind.as_str()
                    );
                }
                return Ok(p.clone());
            }
        }
        Err(PdfError::MissingResource {
            kind: kind.as_str(),
            name: name.into(),
        })
    }

    /// Resolve a pattern by resource name, for devices descending into
    /// tiling patterns at paint time.
    pub fn pattern(&self, name: &str) -> Result<Pattern> {
        let p = self.lookup_resource(ResourceKind::Pattern, name)?;
        Pattern::from_primitive(p, &self.lenient())
    }
}

fn log_recovered(op: &str, e: &PdfError) {
    match e {
        PdfError::EmptyGraphicsStack => warn!("{}: {}", op, e),
        PdfError::UnknownOperator { .. } => info!("{}", e),
        PdfError::InvalidMatrix { .. } | PdfError::InvalidColor { .. } => warn!("{}", e),
        PdfError::DepthExceeded { .. } => warn!("{}: {}", op, e),
        _ => error!("{}: {}", op, e),
    }
}

fn unsupported_inline_filter(info: &Dictionary) -> Option<String> {
    let filters = info.get("Filter").or_else(|| info.get("F"))?;
    let check = |name: &Name| -> Option<String> {
        match name.as_str() {
            "ASCIIHexDecode" | "AHx" | "ASCII85Decode" | "A85" | "LZWDecode" | "LZW"
            | "FlateDecode" | "Fl" | "RunLengthDecode" | "RL" => None,
            other => Some(other.into()),
        }
    };
    match filters {
        Primitive::Name(n) => check(n),
        Primitive::Array(arr) => arr.iter().filter_map(|p| p.as_name().ok()).find_map(check),
        _ => None,
    }
}

#[derive(Copy, Clone)]
enum PaintOp {
    Stroke,
    Fill(Winding),
    FillStroke(Winding),
    None,
}

// operand readers; after surplus trimming, index 0 is the first
// expected operand
fn operand<'p>(ops: &'p [Primitive], operator: &str, index: usize) -> Result<&'p Primitive> {
    ops.get(index).ok_or_else(|| PdfError::MissingOperand {
        operator: operator.into(),
        index,
        expected: "operand",
    })
}

fn number(ops: &[Primitive], operator: &str, index: usize) -> Result<f32> {
    operand(ops, operator, index)?
        .as_number()
        .map_err(|_| PdfError::MissingOperand {
            operator: operator.into(),
            index,
            expected: "number",
        })
}

fn numbers(ops: &[Primitive], operator: &str) -> Result<Vec<f32>> {
    ops.iter()
        .map(|p| {
            p.as_number().map_err(|_| PdfError::InvalidColor {
                operator: operator.into(),
                reason: format!("{} operand", p.get_debug_name()),
            })
        })
        .collect()
}

fn integer(ops: &[Primitive], operator: &str, index: usize) -> Result<i32> {
    Ok(number(ops, operator, index)? as i32)
}

fn point(ops: &[Primitive], operator: &str, index: usize) -> Result<(f32, f32)> {
    Ok((
        number(ops, operator, index)?,
        number(ops, operator, index + 1)?,
    ))
}

fn name(ops: &[Primitive], operator: &str, index: usize) -> Result<Name> {
    operand(ops, operator, index)?
        .as_name()
        .cloned()
        .map_err(|_| PdfError::MissingOperand {
            operator: operator.into(),
            index,
            expected: "name",
        })
}

fn string(ops: &[Primitive], operator: &str, index: usize) -> Result<Vec<u8>> {
    operand(ops, operator, index)?
        .as_string()
        .map(|s| s.as_bytes().to_vec())
        .map_err(|_| PdfError::MissingOperand {
            operator: operator.into(),
            index,
            expected: "string",
        })
}

fn matrix_from(ops: &[Primitive], operator: &str) -> Result<Matrix> {
    let mut m = [0.; 6];
    for (i, slot) in m.iter_mut().enumerate() {
        *slot = number(ops, operator, i)?;
    }
    let m = Matrix::from_array(&m);
    if !m.to_array().iter().all(|v| v.is_finite()) {
        return Err(PdfError::InvalidMatrix {
            operator: operator.into(),
        });
    }
    Ok(m)
}
