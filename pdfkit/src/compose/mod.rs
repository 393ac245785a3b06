//! Document composition: merge, split, overlay and layer import.
//!
//! All four operations clone object subgraphs through [`Cloner`] and
//! mutate only the destination document.

mod acroform;
mod layer;
mod merge;
mod overlay;
mod split;
mod structure;

pub use self::layer::*;
pub use self::merge::*;
pub use self::overlay::*;
pub use self::split::*;

use crate::clone::Cloner;
use crate::content::page_content_data;
use crate::document::{Document, PageEntry};
use crate::error::*;
use crate::matrix::Matrix;
use crate::object::{Object, ObjectWrite, PlainRef, Rectangle, Resolve, Updater};
use crate::primitive::{Dictionary, PdfStream, Primitive};

/// The page dictionary with tree-inherited attributes pulled down and
/// the tree link removed, ready for cloning into another document.
pub(crate) fn materialized_page_dict(src: &Document, entry: &PageEntry) -> Result<Dictionary> {
    let mut dict = src.resolve(entry.page_ref)?.into_dictionary(src)?;
    let inherit = |dict: &mut Dictionary, key: &str, value: &Option<Primitive>| {
        if !dict.contains_key(key) {
            if let Some(v) = value {
                dict.insert(key, v.clone());
            }
        }
    };
    inherit(&mut dict, "Resources", &entry.attrs.resources);
    inherit(&mut dict, "MediaBox", &entry.attrs.media_box);
    inherit(&mut dict, "CropBox", &entry.attrs.crop_box);
    inherit(&mut dict, "Rotate", &entry.attrs.rotate);
    dict.remove("Parent");
    Ok(dict)
}

/// The view box of a page: `/CropBox` falling back to `/MediaBox`,
/// falling back to US Letter.
pub(crate) fn page_view_box(src: &Document, entry: &PageEntry) -> Rectangle {
    let read = |p: &Option<Primitive>| {
        p.as_ref()
            .and_then(|p| Rectangle::from_primitive(p.clone(), src).ok())
    };
    let dict = src
        .resolve(entry.page_ref)
        .ok()
        .and_then(|p| p.into_dictionary(src).ok());
    let own = |key: &str| {
        dict.as_ref()
            .and_then(|d| d.get(key).cloned())
            .and_then(|p| Rectangle::from_primitive(p, src).ok())
    };
    own("CropBox")
        .or_else(|| read(&entry.attrs.crop_box))
        .or_else(|| own("MediaBox"))
        .or_else(|| read(&entry.attrs.media_box))
        .unwrap_or(Rectangle::new(0., 0., 612., 792.))
        .normalized()
}

pub(crate) fn page_rotation(src: &Document, entry: &PageEntry) -> i32 {
    let own = src
        .resolve(entry.page_ref)
        .ok()
        .and_then(|p| p.into_dictionary(src).ok())
        .and_then(|d| d.get("Rotate").and_then(|p| p.as_integer().ok()));
    own.or_else(|| {
        entry
            .attrs
            .rotate
            .as_ref()
            .and_then(|p| p.as_integer().ok())
    })
    .unwrap_or(0)
    .rem_euclid(360)
}

/// Matrix that undoes a page's rotation and view-box origin, so that the
/// page content lands in `[0, w] × [0, h]` of an unrotated frame.
pub(crate) fn page_form_matrix(rotate: i32, view: Rectangle) -> Matrix {
    let Rectangle {
        left,
        bottom,
        right,
        top,
    } = view;
    match rotate {
        90 => Matrix::rotate_quarters(3).then(Matrix::translate(-bottom, right)),
        180 => Matrix::rotate_quarters(2).then(Matrix::translate(right, top)),
        270 => Matrix::rotate_quarters(1).then(Matrix::translate(top, -left)),
        _ => Matrix::translate(-left, -bottom),
    }
}

/// Import a page of `src` into `dst` as a Form XObject: `/BBox` is the
/// page view box, `/Matrix` undoes the page rotation and origin, and the
/// page resources travel along.
pub(crate) fn import_page_as_form(
    src: &Document,
    entry: &PageEntry,
    cloner: &mut Cloner<'_, Document>,
    dst: &mut Document,
) -> Result<PlainRef> {
    let view = page_view_box(src, entry);
    let rotate = page_rotation(src, entry);
    let matrix = page_form_matrix(rotate, view);

    let dict = materialized_page_dict(src, entry)?;
    let data = match dict.get("Contents") {
        Some(contents) => page_content_data(contents, src)?,
        None => Vec::new(),
    };

    let mut info = Dictionary::new();
    info.insert("Type", Primitive::name("XObject"));
    info.insert("Subtype", Primitive::name("Form"));
    info.insert("FormType", Primitive::Integer(1));
    info.insert(
        "BBox",
        Rectangle::to_primitive(&view, dst)?,
    );
    info.insert("Matrix", matrix.to_primitive(dst)?);
    if let Some(res) = dict.get("Resources") {
        let res = cloner.clone_primitive(res, dst)?;
        info.insert("Resources", res);
    }
    dst.create_primitive(Primitive::Stream(PdfStream { info, data }))
}

/// Extent of an imported page form after its compensation matrix:
/// width/height swap for quarter rotations.
pub(crate) fn form_extent(rotate: i32, view: Rectangle) -> (f32, f32) {
    match rotate {
        90 | 270 => (view.height(), view.width()),
        _ => (view.width(), view.height()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_matrix_maps_view_box_to_origin() {
        let view = Rectangle::new(10., 20., 110., 220.);
        for &rotate in &[0, 90, 180, 270] {
            let m = page_form_matrix(rotate, view);
            let t = view.transformed(m);
            let (w, h) = form_extent(rotate, view);
            assert!(t.left.abs() < 1e-4 && t.bottom.abs() < 1e-4, "rot {}", rotate);
            assert!((t.width() - w).abs() < 1e-4, "rot {}", rotate);
            assert!((t.height() - h).abs() < 1e-4, "rot {}", rotate);
        }
    }
}
