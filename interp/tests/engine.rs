//! Scenario tests for the stream engine, driving it through the same
//! token contract the external parser uses.

mod common;

use common::TestTokenizer;

use pdfkit::document::Document;
use pdfkit::matrix::Matrix;
use pdfkit::object::{Rectangle, Updater};
use pdfkit::primitive::{Dictionary, Name, PdfStream, Primitive};
use pdfkit_interp::device::ImageSource;
use pdfkit_interp::{Device, EngineOptions, GraphicsState, StreamEngine, Winding};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    BeginText,
    EndText,
    Glyph {
        trm: Matrix,
        code: u32,
        displacement: (f32, f32),
    },
    Rect {
        rect: Rectangle,
        ctm: Matrix,
    },
    MoveTo {
        x: f32,
        y: f32,
        ctm: Matrix,
    },
    LineTo {
        x: f32,
        y: f32,
    },
    Stroke {
        ctm: Matrix,
    },
    Fill(Winding),
    EndPath,
    Clip(Winding),
    Image {
        bytes: usize,
    },
    BeginMarked(String),
    EndMarked,
}

#[derive(Default)]
struct Recorder {
    events: Vec<Event>,
}

impl Device for Recorder {
    fn begin_text(&mut self, _gs: &GraphicsState) {
        self.events.push(Event::BeginText);
    }
    fn end_text(&mut self, _gs: &GraphicsState) {
        self.events.push(Event::EndText);
    }
    fn show_glyph(
        &mut self,
        _gs: &GraphicsState,
        trm: Matrix,
        _font: &pdfkit::font::Font,
        code: u32,
        _unicode: Option<&str>,
        displacement: (f32, f32),
    ) {
        self.events.push(Event::Glyph {
            trm,
            code,
            displacement,
        });
    }
    fn append_rectangle(&mut self, gs: &GraphicsState, rect: Rectangle) {
        self.events.push(Event::Rect { rect, ctm: gs.ctm });
    }
    fn move_to(&mut self, gs: &GraphicsState, x: f32, y: f32) {
        self.events.push(Event::MoveTo { x, y, ctm: gs.ctm });
    }
    fn line_to(&mut self, _gs: &GraphicsState, x: f32, y: f32) {
        self.events.push(Event::LineTo { x, y });
    }
    fn stroke_path(&mut self, gs: &GraphicsState) {
        self.events.push(Event::Stroke { ctm: gs.ctm });
    }
    fn fill_path(&mut self, _gs: &GraphicsState, winding: Winding) {
        self.events.push(Event::Fill(winding));
    }
    fn end_path(&mut self, _gs: &GraphicsState) {
        self.events.push(Event::EndPath);
    }
    fn clip(&mut self, _gs: &GraphicsState, winding: Winding) {
        self.events.push(Event::Clip(winding));
    }
    fn draw_image(&mut self, _gs: &GraphicsState, image: ImageSource) {
        let bytes = match image {
            ImageSource::Inline(img) => img.data.len(),
            ImageSource::XObject(_, img) => img.stream.raw_data().len(),
        };
        self.events.push(Event::Image { bytes });
    }
    fn begin_marked_content_sequence(
        &mut self,
        _gs: &GraphicsState,
        tag: &Name,
        _properties: Option<&Dictionary>,
    ) {
        self.events.push(Event::BeginMarked(tag.as_str().into()));
    }
    fn end_marked_content_sequence(&mut self, _gs: &GraphicsState) {
        self.events.push(Event::EndMarked);
    }
}

fn page_with(doc: &mut Document, content: &str, extra: impl FnOnce(&mut Dictionary, &mut Document)) -> Dictionary {
    let stream_ref = doc
        .create_primitive(Primitive::Stream(PdfStream {
            info: Dictionary::new(),
            data: content.as_bytes().to_vec(),
        }))
        .unwrap();
    let mut page = Dictionary::new();
    page.insert(
        "MediaBox",
        Primitive::Array(vec![
            Primitive::Integer(0),
            Primitive::Integer(0),
            Primitive::Integer(612),
            Primitive::Integer(792),
        ]),
    );
    page.insert("Contents", Primitive::Reference(stream_ref));
    extra(&mut page, doc);
    page
}

fn run(doc: &Document, page: &Dictionary) -> (Recorder, Matrix, usize) {
    let tokenizer = TestTokenizer;
    let mut engine = StreamEngine::new(doc, &tokenizer, Recorder::default(), EngineOptions::default());
    engine.run_page(page).expect("run_page");
    let ctm = engine.state().ctm;
    let depth = engine.stack_depth();
    (engine.into_device(), ctm, depth)
}

fn simple_font_dict(widths: &[i32], first_char: i32) -> Dictionary {
    let mut font = Dictionary::new();
    font.insert("Type", Primitive::name("Font"));
    font.insert("Subtype", Primitive::name("Type1"));
    font.insert("BaseFont", Primitive::name("Helvetica"));
    font.insert("FirstChar", Primitive::Integer(first_char));
    font.insert(
        "Widths",
        Primitive::Array(widths.iter().map(|&w| Primitive::Integer(w)).collect()),
    );
    font
}

fn font_resources(doc: &mut Document, font: Dictionary) -> Primitive {
    let font_ref = doc.create_primitive(Primitive::Dictionary(font)).unwrap();
    let mut fonts = Dictionary::new();
    fonts.insert("F1", Primitive::Reference(font_ref));
    let mut resources = Dictionary::new();
    resources.insert("Font", Primitive::Dictionary(fonts));
    Primitive::Dictionary(resources)
}

#[test]
fn balanced_save_restore_leaves_state_unchanged() {
    let mut doc = Document::new();
    let page = page_with(&mut doc, "q 2 0 0 2 0 0 cm Q", |_, _| {});
    let (_, ctm, depth) = run(&doc, &page);
    assert_eq!(ctm, Matrix::identity());
    assert_eq!(depth, 1);
}

#[test]
fn restore_on_sentinel_is_a_warning_not_a_fault() {
    let mut doc = Document::new();
    let page = page_with(&mut doc, "Q Q 0 0 m 5 5 l S", |_, _| {});
    let (recorder, _, depth) = run(&doc, &page);
    // the walk continued past the bad restores
    assert!(recorder
        .events
        .contains(&Event::LineTo { x: 5., y: 5. }));
    assert_eq!(depth, 1);
}

#[test]
fn nested_form_concatenates_its_matrix() {
    let mut doc = Document::new();

    let mut form_info = Dictionary::new();
    form_info.insert("Type", Primitive::name("XObject"));
    form_info.insert("Subtype", Primitive::name("Form"));
    form_info.insert(
        "BBox",
        Primitive::Array(vec![
            Primitive::Integer(0),
            Primitive::Integer(0),
            Primitive::Integer(100),
            Primitive::Integer(100),
        ]),
    );
    form_info.insert(
        "Matrix",
        Primitive::Array(vec![
            Primitive::Integer(2),
            Primitive::Integer(0),
            Primitive::Integer(0),
            Primitive::Integer(2),
            Primitive::Integer(0),
            Primitive::Integer(0),
        ]),
    );
    let form_ref = doc
        .create_primitive(Primitive::Stream(PdfStream {
            info: form_info,
            data: b"10 20 m 30 40 l S".to_vec(),
        }))
        .unwrap();

    let page = page_with(&mut doc, "/Fx Do", move |page, _| {
        let mut xobjects = Dictionary::new();
        xobjects.insert("Fx", Primitive::Reference(form_ref));
        let mut resources = Dictionary::new();
        resources.insert("XObject", Primitive::Dictionary(xobjects));
        page.insert("Resources", Primitive::Dictionary(resources));
    });

    let (recorder, ctm, _) = run(&doc, &page);
    let scale2 = Matrix::scale(2., 2.);
    assert_eq!(
        recorder.events,
        vec![
            Event::MoveTo {
                x: 10.,
                y: 20.,
                ctm: scale2
            },
            Event::LineTo { x: 30., y: 40. },
            Event::Stroke { ctm: scale2 },
        ]
    );
    // the parent frame is untouched
    assert_eq!(ctm, Matrix::identity());
}

#[test]
fn show_glyph_positions_advance_by_width_and_spacing() {
    let mut doc = Document::new();
    let resources = font_resources(&mut doc, simple_font_dict(&[500, 500], 65));
    let page = page_with(
        &mut doc,
        "BT /F1 2 Tf 0.5 Tc (AB) Tj ET",
        move |page, _| {
            page.insert("Resources", resources);
        },
    );
    let (recorder, _, _) = run(&doc, &page);

    let glyphs: Vec<&Event> = recorder
        .events
        .iter()
        .filter(|e| matches!(e, Event::Glyph { .. }))
        .collect();
    assert_eq!(glyphs.len(), 2);
    let (trm_a, trm_b) = match (glyphs[0], glyphs[1]) {
        (Event::Glyph { trm: a, .. }, Event::Glyph { trm: b, .. }) => (a, b),
        _ => unreachable!(),
    };
    // advance = w·fs + char spacing = 0.5·2 + 0.5
    assert!((trm_b.e - trm_a.e - 1.5).abs() < 1e-5);
    assert_eq!(trm_b.f, trm_a.f);
}

#[test]
fn tj_numeric_elements_shift_the_text_matrix() {
    let mut doc = Document::new();
    let resources = font_resources(&mut doc, simple_font_dict(&[500, 500], 65));
    let page = page_with(
        &mut doc,
        "BT /F1 2 Tf [ (A) -500 (B) ] TJ ET",
        move |page, _| {
            page.insert("Resources", resources);
        },
    );
    let (recorder, _, _) = run(&doc, &page);
    let glyphs: Vec<Matrix> = recorder
        .events
        .iter()
        .filter_map(|e| match e {
            Event::Glyph { trm, .. } => Some(*trm),
            _ => None,
        })
        .collect();
    assert_eq!(glyphs.len(), 2);
    // width advance 0.5·2 = 1, adjustment -(-500)/1000·2 = 1
    assert!((glyphs[1].e - glyphs[0].e - 2.0).abs() < 1e-5);
}

#[test]
fn word_spacing_applies_only_to_space_code() {
    let mut doc = Document::new();
    let resources = font_resources(&mut doc, simple_font_dict(&[500; 64], 32));
    let page = page_with(
        &mut doc,
        "BT /F1 1 Tf 3 Tw ( A) Tj ET",
        move |page, _| {
            page.insert("Resources", resources);
        },
    );
    let (recorder, _, _) = run(&doc, &page);
    let glyphs: Vec<Matrix> = recorder
        .events
        .iter()
        .filter_map(|e| match e {
            Event::Glyph { trm, .. } => Some(*trm),
            _ => None,
        })
        .collect();
    // space glyph advanced by 0.5 width + 3 word spacing
    assert!((glyphs[1].e - glyphs[0].e - 3.5).abs() < 1e-5);
}

#[test]
fn type3_glyph_recurses_with_the_rendering_matrix() {
    let mut doc = Document::new();

    let proc_ref = doc
        .create_primitive(Primitive::Stream(PdfStream {
            info: Dictionary::new(),
            data: b"10 0 d0 0 0 10 10 re f".to_vec(),
        }))
        .unwrap();

    let mut char_procs = Dictionary::new();
    char_procs.insert("glyph", Primitive::Reference(proc_ref));
    let mut encoding = Dictionary::new();
    encoding.insert(
        "Differences",
        Primitive::Array(vec![Primitive::Integer(65), Primitive::name("glyph")]),
    );
    let mut font = Dictionary::new();
    font.insert("Type", Primitive::name("Font"));
    font.insert("Subtype", Primitive::name("Type3"));
    font.insert(
        "FontMatrix",
        Primitive::Array(vec![
            Primitive::Number(0.01),
            Primitive::Number(0.),
            Primitive::Number(0.),
            Primitive::Number(0.01),
            Primitive::Number(0.),
            Primitive::Number(0.),
        ]),
    );
    font.insert(
        "FontBBox",
        Primitive::Array(vec![
            Primitive::Integer(0),
            Primitive::Integer(0),
            Primitive::Integer(100),
            Primitive::Integer(100),
        ]),
    );
    font.insert("CharProcs", Primitive::Dictionary(char_procs));
    font.insert("Encoding", Primitive::Dictionary(encoding));
    font.insert("FirstChar", Primitive::Integer(65));
    font.insert(
        "Widths",
        Primitive::Array(vec![Primitive::Integer(10)]),
    );

    let resources = font_resources(&mut doc, font);
    let page = page_with(
        &mut doc,
        "BT /F1 5 Tf 100 200 Td (A) Tj ET",
        move |page, _| {
            page.insert("Resources", resources);
        },
    );

    let (recorder, _, _) = run(&doc, &page);

    let trm = recorder
        .events
        .iter()
        .find_map(|e| match e {
            Event::Glyph { trm, .. } => Some(*trm),
            _ => None,
        })
        .expect("show_glyph emitted");

    let rect_ctm = recorder
        .events
        .iter()
        .find_map(|e| match e {
            Event::Rect { ctm, .. } => Some(*ctm),
            _ => None,
        })
        .expect("char proc executed");

    // the CTM inside the glyph is font-matrix · TRM
    let expected = Matrix::scale(0.01, 0.01).then(trm);
    assert!((rect_ctm.a - expected.a).abs() < 1e-5);
    assert!((rect_ctm.e - expected.e).abs() < 1e-5);
    assert!((rect_ctm.f - expected.f).abs() < 1e-5);
}

#[test]
fn text_showing_outside_bt_is_skipped() {
    let mut doc = Document::new();
    let resources = font_resources(&mut doc, simple_font_dict(&[500], 65));
    let page = page_with(&mut doc, "/F1 2 Tf (A) Tj", move |page, _| {
        page.insert("Resources", resources);
    });
    let (recorder, _, _) = run(&doc, &page);
    assert!(recorder
        .events
        .iter()
        .all(|e| !matches!(e, Event::Glyph { .. })));
}

#[test]
fn unknown_and_short_operators_do_not_abort() {
    let mut doc = Document::new();
    // `cm` with too few operands, an unknown operator, then a valid line
    let page = page_with(&mut doc, "1 0 cm xyzzy 0 0 m 1 1 l S", |_, _| {});
    let (recorder, ctm, _) = run(&doc, &page);
    assert_eq!(ctm, Matrix::identity());
    assert!(recorder.events.contains(&Event::LineTo { x: 1., y: 1. }));
}

#[test]
fn clip_is_applied_after_painting() {
    let mut doc = Document::new();
    let page = page_with(&mut doc, "0 0 100 100 re W n", |_, _| {});
    let (recorder, _, _) = run(&doc, &page);
    let idx_end = recorder
        .events
        .iter()
        .position(|e| *e == Event::EndPath)
        .unwrap();
    let idx_clip = recorder
        .events
        .iter()
        .position(|e| *e == Event::Clip(Winding::NonZero))
        .unwrap();
    assert!(idx_clip > idx_end);
}

#[test]
fn marked_content_sequences_are_reported() {
    let mut doc = Document::new();
    let page = page_with(&mut doc, "/Span BMC EMC", |_, _| {});
    let (recorder, _, _) = run(&doc, &page);
    assert_eq!(
        recorder.events,
        vec![Event::BeginMarked("Span".into()), Event::EndMarked]
    );
}

#[test]
fn inline_image_reaches_the_device() {
    let mut doc = Document::new();
    let page = page_with(
        &mut doc,
        "BI /W 2 /H 2 /BPC 8 /CS /G ID \x01\x02\x03\x04 EI",
        |_, _| {},
    );
    let (recorder, _, _) = run(&doc, &page);
    assert_eq!(recorder.events, vec![Event::Image { bytes: 4 }]);
}

#[test]
fn recursion_depth_is_bounded() {
    let mut doc = Document::new();

    // a form whose resources point back at itself
    let form_promise = doc.promise();
    let mut xobjects = Dictionary::new();
    xobjects.insert("Fx", Primitive::Reference(form_promise));
    let mut resources = Dictionary::new();
    resources.insert("XObject", Primitive::Dictionary(xobjects));

    let mut form_info = Dictionary::new();
    form_info.insert("Type", Primitive::name("XObject"));
    form_info.insert("Subtype", Primitive::name("Form"));
    form_info.insert(
        "BBox",
        Primitive::Array(vec![
            Primitive::Integer(0),
            Primitive::Integer(0),
            Primitive::Integer(10),
            Primitive::Integer(10),
        ]),
    );
    form_info.insert("Resources", Primitive::Dictionary(resources.clone()));
    doc.update_primitive(
        form_promise,
        Primitive::Stream(PdfStream {
            info: form_info,
            data: b"/Fx Do".to_vec(),
        }),
    )
    .unwrap();

    let page = page_with(&mut doc, "/Fx Do", move |page, _| {
        page.insert("Resources", Primitive::Dictionary(resources));
    });

    // the refusal is a warning, not a fault
    let (_, _, depth) = run(&doc, &page);
    assert_eq!(depth, 1);
}
