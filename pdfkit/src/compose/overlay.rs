//! Stamp foreground or background layers onto the pages of a document.
//!
//! Each overlay page is imported once as a Form XObject and invoked
//! from a short generated content stream that positions it (centered by
//! default). In foreground mode the original content is bracketed in
//! `q`/`Q` so its graphics state cannot leak into the overlay.

use crate::clone::Cloner;
use crate::document::{Document, PageEntry};
use crate::error::*;
use crate::matrix::Matrix;
use crate::object::{PlainRef, Rectangle, Resolve, Updater};
use crate::primitive::{format_number, Dictionary, PdfStream, Primitive};

use std::collections::HashMap;
use std::io::Write;

use super::{form_extent, import_page_as_form, page_rotation, page_view_box};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum OverlayMode {
    #[default]
    Foreground,
    Background,
}

#[derive(Debug, Copy, Clone, Default)]
pub enum OverlayPosition {
    /// Center the overlay on the target page.
    #[default]
    Center,
    /// Explicit placement matrix.
    Matrix(Matrix),
}

#[derive(Debug, Clone, Default)]
pub struct OverlayOptions {
    pub mode: OverlayMode,
    pub position: OverlayPosition,
}

/// Which overlay document serves which target page. Slots are tried in
/// order: specific page, first/last, odd/even, default, then the
/// all-pages document cycled modulo its page count.
#[derive(Default)]
pub struct OverlaySpec<'a> {
    pub default: Option<&'a Document>,
    pub first_page: Option<&'a Document>,
    pub last_page: Option<&'a Document>,
    pub odd_pages: Option<&'a Document>,
    pub even_pages: Option<&'a Document>,
    pub all_pages: Option<&'a Document>,
    /// zero-based target page number -> overlay document
    pub specific: HashMap<u32, &'a Document>,
}

impl<'a> OverlaySpec<'a> {
    fn select(&self, page: u32, page_count: u32) -> Option<(&'a Document, SlotPage)> {
        if let Some(&doc) = self.specific.get(&page) {
            return Some((doc, SlotPage::First));
        }
        if page == 0 {
            if let Some(doc) = self.first_page {
                return Some((doc, SlotPage::First));
            }
        }
        if page + 1 == page_count {
            if let Some(doc) = self.last_page {
                return Some((doc, SlotPage::First));
            }
        }
        // one-based for odd/even, as users count pages
        if (page + 1) % 2 == 1 {
            if let Some(doc) = self.odd_pages {
                return Some((doc, SlotPage::First));
            }
        } else if let Some(doc) = self.even_pages {
            return Some((doc, SlotPage::First));
        }
        if let Some(doc) = self.default {
            return Some((doc, SlotPage::First));
        }
        self.all_pages.map(|doc| (doc, SlotPage::Cycled(page)))
    }
}

#[derive(Debug, Copy, Clone)]
enum SlotPage {
    First,
    Cycled(u32),
}

#[derive(Debug, Copy, Clone)]
struct PlacedForm {
    form: PlainRef,
    width: f32,
    height: f32,
}

struct OverlaySource<'a> {
    doc: &'a Document,
    cloner: Cloner<'a, Document>,
    pages: Vec<PageEntry>,
    forms: HashMap<usize, PlacedForm>,
}

impl<'a> OverlaySource<'a> {
    fn form(&mut self, page_idx: usize, dst: &mut Document) -> Result<Option<PlacedForm>> {
        if let Some(&placed) = self.forms.get(&page_idx) {
            return Ok(Some(placed));
        }
        let entry = match self.pages.get(page_idx) {
            Some(e) => e.clone(),
            None => return Ok(None),
        };
        let form = import_page_as_form(self.doc, &entry, &mut self.cloner, dst)?;
        let view = page_view_box(self.doc, &entry);
        let rotate = page_rotation(self.doc, &entry);
        let (width, height) = form_extent(rotate, view);
        let placed = PlacedForm {
            form,
            width,
            height,
        };
        self.forms.insert(page_idx, placed);
        Ok(Some(placed))
    }
}

/// Apply overlays to every page of `target` per `spec`.
pub fn overlay(
    target: &mut Document,
    spec: &OverlaySpec,
    options: &OverlayOptions,
) -> Result<()> {
    let target_pages = target.pages()?;
    let page_count = target_pages.len() as u32;
    let mut sources: Vec<OverlaySource> = Vec::new();

    for (i, entry) in target_pages.iter().enumerate() {
        let (doc, slot) = match spec.select(i as u32, page_count) {
            Some(hit) => hit,
            None => continue,
        };
        let src_idx = source_index(&mut sources, doc);
        let overlay_page = match slot {
            SlotPage::First => 0,
            SlotPage::Cycled(page) => {
                let n = sources[src_idx].pages.len();
                if n == 0 {
                    continue;
                }
                page as usize % n
            }
        };
        let placed = match sources[src_idx].form(overlay_page, target)? {
            Some(p) => p,
            None => {
                warn!("overlay document has no page {}", overlay_page);
                continue;
            }
        };
        apply_to_page(target, entry, placed, options)?;
    }
    Ok(())
}

fn source_index<'a>(sources: &mut Vec<OverlaySource<'a>>, doc: &'a Document) -> usize {
    if let Some(i) = sources
        .iter()
        .position(|s| std::ptr::eq(s.doc as *const Document, doc as *const Document))
    {
        return i;
    }
    sources.push(OverlaySource {
        doc,
        cloner: Cloner::new(doc),
        pages: doc.pages().unwrap_or_default(),
        forms: HashMap::new(),
    });
    sources.len() - 1
}

fn apply_to_page(
    target: &mut Document,
    entry: &PageEntry,
    placed: PlacedForm,
    options: &OverlayOptions,
) -> Result<()> {
    let view = page_view_box(target, entry);
    let placement = match options.position {
        OverlayPosition::Matrix(m) => m,
        OverlayPosition::Center => Matrix::translate(
            view.left + (view.width() - placed.width) / 2.,
            view.bottom + (view.height() - placed.height) / 2.,
        ),
    };

    let mut page = target.resolve(entry.page_ref)?.into_dictionary(target)?;
    materialize_resources(&mut page, entry);
    let name = add_xobject(&mut page, target, "OL", placed.form)?;

    let mut invoke = Vec::new();
    write_matrix_op(&mut invoke, placement)?;
    writeln!(invoke, "/{} Do", name)?;

    let mut contents = contents_array(&mut page, target)?;
    match options.mode {
        OverlayMode::Foreground => {
            // bracket the original content, then draw on top
            let open = content_stream(target, b"q\n".to_vec())?;
            let mut data = b"Q\nq\n".to_vec();
            data.extend_from_slice(&invoke);
            data.extend_from_slice(b"Q\n");
            let close = content_stream(target, data)?;
            contents.insert(0, Primitive::Reference(open));
            contents.push(Primitive::Reference(close));
        }
        OverlayMode::Background => {
            let mut data = b"q\n".to_vec();
            data.extend_from_slice(&invoke);
            data.extend_from_slice(b"Q\n");
            let back = content_stream(target, data)?;
            contents.insert(0, Primitive::Reference(back));
        }
    }
    page.insert("Contents", Primitive::Array(contents));
    target.update_primitive(entry.page_ref, Primitive::Dictionary(page))
}

/// `a b c d e f cm` with the fixed-point number renderer.
pub(crate) fn write_matrix_op(out: &mut Vec<u8>, m: Matrix) -> Result<()> {
    writeln!(
        out,
        "{} {} {} {} {} {} cm",
        format_number(m.a),
        format_number(m.b),
        format_number(m.c),
        format_number(m.d),
        format_number(m.e),
        format_number(m.f),
    )?;
    Ok(())
}

/// Pull inherited resources into the page dictionary so additions stay
/// local to this page.
pub(crate) fn materialize_resources(page: &mut Dictionary, entry: &PageEntry) {
    if !page.contains_key("Resources") {
        match entry.attrs.resources {
            Some(ref r) => {
                page.insert("Resources", r.clone());
            }
            None => {
                page.insert("Resources", Primitive::Dictionary(Dictionary::new()));
            }
        }
    }
}

/// Register `form` under a fresh `/XObject` name with the given prefix.
pub(crate) fn add_xobject(
    page: &mut Dictionary,
    doc: &Document,
    prefix: &str,
    form: PlainRef,
) -> Result<String> {
    let mut resources = match page.remove("Resources") {
        Some(p) => p.resolve(doc)?.into_dictionary(doc)?,
        None => Dictionary::new(),
    };
    let mut xobjects = match resources.remove("XObject") {
        Some(p) => p.resolve(doc)?.into_dictionary(doc)?,
        None => Dictionary::new(),
    };
    let mut n = 0;
    let name = loop {
        let candidate = format!("{}{}", prefix, n);
        if !xobjects.contains_key(candidate.as_str()) {
            break candidate;
        }
        n += 1;
    };
    xobjects.insert(name.as_str(), Primitive::Reference(form));
    resources.insert("XObject", Primitive::Dictionary(xobjects));
    page.insert("Resources", Primitive::Dictionary(resources));
    Ok(name)
}

/// Normalize `/Contents` to an array of stream references, in painting
/// order.
pub(crate) fn contents_array(
    page: &mut Dictionary,
    doc: &mut Document,
) -> Result<Vec<Primitive>> {
    Ok(match page.remove("Contents") {
        None | Some(Primitive::Null) => vec![],
        Some(Primitive::Array(items)) => items,
        Some(r @ Primitive::Reference(_)) => {
            match r.clone().resolve(doc)? {
                Primitive::Array(items) => items,
                _ => vec![r],
            }
        }
        Some(s @ Primitive::Stream(_)) => {
            let r = doc.create_primitive(s)?;
            vec![Primitive::Reference(r)]
        }
        Some(p) => {
            warn!("/Contents is a {}", p.get_debug_name());
            vec![]
        }
    })
}

pub(crate) fn content_stream(doc: &mut Document, data: Vec<u8>) -> Result<PlainRef> {
    let mut info = Dictionary::new();
    info.insert("Length", Primitive::Integer(data.len() as i32));
    doc.create_primitive(Primitive::Stream(PdfStream { info, data }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centering_translation() {
        let view = Rectangle::new(0., 0., 100., 200.);
        let placement = Matrix::translate(
            view.left + (view.width() - 40.) / 2.,
            view.bottom + (view.height() - 60.) / 2.,
        );
        assert_eq!((placement.e, placement.f), (30., 70.));
    }

    #[test]
    fn matrix_op_uses_fixed_point() {
        let mut out = Vec::new();
        write_matrix_op(&mut out, Matrix::translate(30., 70.)).unwrap();
        assert_eq!(out, b"1.0 0.0 0.0 1.0 30.0 70.0 cm\n");
    }
}
