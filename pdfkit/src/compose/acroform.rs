//! Interactive-form merging.
//!
//! Legacy mode renames colliding fields with a numbered suffix. Join
//! mode coalesces widgets of same-named text fields under one field;
//! every other field type falls back to the legacy rename, since only
//! text fields have agreed join semantics.

use crate::clone::Cloner;
use crate::document::Document;
use crate::error::*;
use crate::object::{PlainRef, Resolve, Updater};
use crate::primitive::{Dictionary, PdfString, Primitive};

use std::collections::HashMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum AcroFormMode {
    #[default]
    Legacy,
    Join,
}

/// Field-level keys; everything else belongs to the widget annotation
/// when a unified field/widget dictionary is taken apart.
const FIELD_KEYS: &[&str] = &[
    "T", "FT", "Ff", "V", "DV", "TU", "TM", "DA", "Q", "MaxLen", "Kids", "Parent", "AA",
];

pub(crate) fn merge_acro_form(
    dst: &mut Document,
    src: &Document,
    cloner: &mut Cloner<'_, Document>,
    mode: AcroFormMode,
) -> Result<()> {
    let src_catalog = src.catalog()?;
    let src_form = match src_catalog.get("AcroForm") {
        Some(p) => p.clone().resolve(src)?.into_dictionary(src)?,
        None => return Ok(()),
    };

    let mut dst_catalog = dst.catalog()?;
    let dest_form_prim = match dst_catalog.get("AcroForm") {
        Some(p) => Some(p.clone()),
        None => None,
    };

    let Some(dest_form_prim) = dest_form_prim else {
        // no destination form: the source form moves over wholesale
        let cloned = cloner.clone_dict(&src_form, dst)?;
        let r = dst.create_primitive(Primitive::Dictionary(cloned))?;
        dst_catalog.insert("AcroForm", Primitive::Reference(r));
        dst.update_catalog(dst_catalog)?;
        return Ok(());
    };

    let dest_form_ref = dest_form_prim.as_reference().ok();
    let mut dest_form = dest_form_prim.resolve(dst)?.into_dictionary(dst)?;

    // default resources and appearance settings: union, destination wins
    if let Some(src_dr) = src_form.get("DR") {
        let dst_dr = dest_form.remove("DR").unwrap_or(Primitive::Null);
        let merged = cloner.merge(src_dr, dst_dr.resolve(dst)?, dst)?;
        dest_form.insert("DR", merged);
    }
    for key in ["DA", "Q", "NeedAppearances"] {
        if !dest_form.contains_key(key) {
            if let Some(v) = src_form.get(key) {
                let v = cloner.clone_primitive(v, dst)?;
                dest_form.insert(dst.intern(key), v);
            }
        }
    }

    let mut fields = match dest_form.remove("Fields") {
        Some(p) => p.into_array(dst)?,
        None => vec![],
    };
    let mut by_name: HashMap<String, PlainRef> = HashMap::new();
    for field in &fields {
        if let Ok(r) = field.as_reference() {
            if let Some(name) = field_name(dst, r)? {
                by_name.insert(name, r);
            }
        }
    }

    let src_fields = match src_form.get("Fields") {
        Some(p) => p.clone().resolve(src)?.into_array(src)?,
        None => vec![],
    };
    for field in src_fields {
        let src_ref = match field.as_reference() {
            Ok(r) => r,
            Err(_) => {
                warn!("direct field dictionary; skipping");
                continue;
            }
        };
        let cloned = cloner.clone_ref(src_ref, dst)?;
        let name = match field_name(dst, cloned)? {
            Some(n) => n,
            None => {
                fields.push(Primitive::Reference(cloned));
                continue;
            }
        };
        match by_name.get(&name) {
            None => {
                by_name.insert(name, cloned);
                fields.push(Primitive::Reference(cloned));
            }
            Some(&existing) => {
                let joinable = mode == AcroFormMode::Join
                    && field_type(dst, existing)?.as_deref() == Some("Tx")
                    && field_type(dst, cloned)?.as_deref() == Some("Tx");
                if joinable {
                    join_text_fields(dst, existing, cloned)?;
                } else {
                    if mode == AcroFormMode::Join {
                        warn!(
                            "field '{}' is not a text field; falling back to rename",
                            name
                        );
                    }
                    let renamed = unique_name(&name, &by_name);
                    rename_field(dst, cloned, &renamed)?;
                    by_name.insert(renamed, cloned);
                    fields.push(Primitive::Reference(cloned));
                }
            }
        }
    }

    dest_form.insert("Fields", Primitive::Array(fields));
    match dest_form_ref {
        Some(r) => dst.update_primitive(r, Primitive::Dictionary(dest_form))?,
        None => {
            dst_catalog.insert("AcroForm", Primitive::Dictionary(dest_form));
            dst.update_catalog(dst_catalog)?;
        }
    }
    Ok(())
}

fn field_name(doc: &Document, r: PlainRef) -> Result<Option<String>> {
    let dict = doc.resolve(r)?.into_dictionary(doc)?;
    Ok(dict
        .get("T")
        .and_then(|p| p.as_string().ok())
        .and_then(|s| s.to_text().ok()))
}

fn field_type(doc: &Document, r: PlainRef) -> Result<Option<String>> {
    let dict = doc.resolve(r)?.into_dictionary(doc)?;
    match dict.get("FT") {
        Some(p) => Ok(Some(p.as_name()?.as_str().into())),
        None => Ok(None),
    }
}

fn unique_name(base: &str, taken: &HashMap<String, PlainRef>) -> String {
    let mut n = 2;
    loop {
        let candidate = format!("{}.{}", base, n);
        if !taken.contains_key(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn rename_field(doc: &mut Document, r: PlainRef, name: &str) -> Result<()> {
    let mut dict = doc.resolve(r)?.into_dictionary(doc)?;
    dict.insert("T", Primitive::String(PdfString::from_str(name)));
    doc.update_primitive(r, Primitive::Dictionary(dict))
}

/// Move the widgets of `addition` under `target`. A unified field/widget
/// dictionary is taken apart first so the kept field is a pure parent.
fn join_text_fields(doc: &mut Document, target: PlainRef, addition: PlainRef) -> Result<()> {
    ensure_widget_kids(doc, target)?;

    let addition_dict = doc.resolve(addition)?.into_dictionary(doc)?;
    let new_kids = match addition_dict.get("Kids") {
        Some(p) => p.clone().into_array(doc)?,
        None => {
            // the addition is its own widget
            let widget = split_widget(&addition_dict);
            vec![Primitive::Reference(
                doc.create_primitive(Primitive::Dictionary(widget))?,
            )]
        }
    };

    let mut target_dict = doc.resolve(target)?.into_dictionary(doc)?;
    let mut kids = match target_dict.remove("Kids") {
        Some(p) => p.into_array(doc)?,
        None => vec![],
    };
    for kid in new_kids {
        if let Ok(kid_ref) = kid.as_reference() {
            let mut kid_dict = doc.resolve(kid_ref)?.into_dictionary(doc)?;
            kid_dict.insert("Parent", Primitive::Reference(target));
            kid_dict.remove("T");
            doc.update_primitive(kid_ref, Primitive::Dictionary(kid_dict))?;
            kids.push(Primitive::Reference(kid_ref));
        }
    }
    target_dict.insert("Kids", Primitive::Array(kids));
    doc.update_primitive(target, Primitive::Dictionary(target_dict))?;
    Ok(())
}

/// If `field` is a unified field/widget, demote its widget half into a
/// kid so further widgets can be appended next to it.
fn ensure_widget_kids(doc: &mut Document, field: PlainRef) -> Result<()> {
    let dict = doc.resolve(field)?.into_dictionary(doc)?;
    if dict.contains_key("Kids") {
        return Ok(());
    }
    let widget = split_widget(&dict);
    let mut widget = widget;
    widget.insert("Parent", Primitive::Reference(field));
    let widget_ref = doc.create_primitive(Primitive::Dictionary(widget))?;

    let mut parent = Dictionary::new();
    for (key, value) in dict.iter() {
        if FIELD_KEYS.contains(&key.as_str()) {
            parent.insert(key.clone(), value.clone());
        }
    }
    parent.insert("Kids", Primitive::Array(vec![Primitive::Reference(widget_ref)]));
    doc.update_primitive(field, Primitive::Dictionary(parent))
}

/// The widget-annotation half of a unified field/widget dictionary.
fn split_widget(dict: &Dictionary) -> Dictionary {
    let mut widget = Dictionary::new();
    widget.insert("Type", Primitive::name("Annot"));
    widget.insert("Subtype", Primitive::name("Widget"));
    for (key, value) in dict.iter() {
        if !FIELD_KEYS.contains(&key.as_str()) && key.as_str() != "Type" && key.as_str() != "Subtype"
        {
            widget.insert(key.clone(), value.clone());
        }
    }
    widget
}
