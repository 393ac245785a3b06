//! Concatenate documents, stitching the catalog-level structures:
//! tagged structure, name trees, outlines, page labels, output intents,
//! optional content, viewer preferences and interactive forms.

use crate::clone::Cloner;
use crate::document::Document;
use crate::error::*;
use crate::object::{NameTree, NumberTree, Object, PlainRef, Resolve, Updater};
use crate::primitive::{Dictionary, PdfString, Primitive};

use std::collections::HashSet;

pub use super::acroform::AcroFormMode;
use super::materialized_page_dict;
use super::structure::{k_items, source_parent_tree_entries};

#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub acro_form_mode: AcroFormMode,
}

/// Merge all sources into a fresh document, in order.
pub fn merge(sources: &[&Document], options: &MergeOptions) -> Result<Document> {
    let mut dst = Document::new();
    for src in sources {
        append(&mut dst, src, options)?;
    }
    Ok(dst)
}

/// Append all pages of `src` to `dst` and stitch the document-level
/// structures. `pages(dst_after) = pages(dst_before) ++ pages(src)`.
pub fn append(dst: &mut Document, src: &Document, options: &MergeOptions) -> Result<()> {
    let src_catalog = src.catalog()?;
    if has_dynamic_xfa(&src_catalog, src)? {
        return Err(PdfError::DynamicXfaPresent);
    }

    let dest_page_count = dst.page_count()?;
    let parent_key_offset = parent_tree_next_key(dst)?;
    let mut cloner = Cloner::new(src);

    // reserve destination numbers for every source page up front, so
    // links and structure entries between source pages resolve to clones
    let src_pages = src.pages()?;
    let promised: Vec<PlainRef> = src_pages
        .iter()
        .map(|entry| {
            let r = dst.promise();
            cloner.insert_mapping(entry.page_ref, r);
            r
        })
        .collect();

    for (entry, &dst_ref) in src_pages.iter().zip(&promised) {
        let dict = materialized_page_dict(src, entry)?;
        let mut cloned = cloner.clone_dict_filtered(&dict, &["StructParents"], dst)?;
        if let Some(n) = dict.get("StructParents").and_then(|p| p.as_integer().ok()) {
            cloned.insert("StructParents", Primitive::Integer(n + parent_key_offset));
        }
        dst.update_primitive(dst_ref, Primitive::Dictionary(cloned))?;
        dst.append_page_ref(dst_ref)?;
    }
    offset_annotation_parent_keys(dst, &promised, parent_key_offset)?;

    stitch_structure(dst, src, &src_catalog, &mut cloner, parent_key_offset)?;
    merge_name_dictionary(dst, src, &src_catalog, &mut cloner)?;
    merge_old_style_dests(dst, src, &src_catalog, &mut cloner)?;
    merge_outlines(dst, src, &src_catalog, &mut cloner)?;
    merge_page_labels(dst, src, &src_catalog, &mut cloner, dest_page_count)?;
    merge_output_intents(dst, src, &src_catalog, &mut cloner)?;
    merge_optional_content(dst, src, &src_catalog, &mut cloner)?;
    merge_viewer_preferences(dst, src, &src_catalog, &mut cloner)?;
    merge_language_and_mark_info(dst, src, &src_catalog)?;
    super::acroform::merge_acro_form(dst, src, &mut cloner, options.acro_form_mode)?;
    Ok(())
}

/// A form is dynamic XFA when it carries `/XFA` but no widget fields.
fn has_dynamic_xfa(catalog: &Dictionary, src: &Document) -> Result<bool> {
    let form = match catalog.get("AcroForm") {
        Some(p) => p.clone().resolve(src)?.into_dictionary(src)?,
        None => return Ok(false),
    };
    if !form.contains_key("XFA") {
        return Ok(false);
    }
    let fields = match form.get("Fields") {
        Some(p) => p.clone().resolve(src)?.into_array(src).unwrap_or_default(),
        None => vec![],
    };
    Ok(fields.is_empty())
}

/// One past the highest structural-parent number the destination uses.
fn parent_tree_next_key(dst: &Document) -> Result<i32> {
    let catalog = dst.catalog()?;
    let root = match catalog.get("StructTreeRoot") {
        Some(p) => p.clone().resolve(dst)?.into_dictionary(dst)?,
        None => return Ok(0),
    };
    let declared = root
        .get("ParentTreeNextKey")
        .and_then(|p| p.as_integer().ok())
        .unwrap_or(0);
    let computed = source_parent_tree_entries(dst)?
        .keys()
        .max()
        .map_or(0, |&k| k + 1);
    Ok(declared.max(computed))
}

/// Cloned annotations carried their source `/StructParent`; shift them
/// into the destination numbering. Shared annotations are shifted once.
fn offset_annotation_parent_keys(
    dst: &mut Document,
    pages: &[PlainRef],
    offset: i32,
) -> Result<()> {
    if offset == 0 {
        return Ok(());
    }
    let mut done: HashSet<PlainRef> = HashSet::new();
    for &page_ref in pages {
        let page = dst.resolve(page_ref)?.into_dictionary(dst)?;
        let annots = match page.get("Annots") {
            Some(p) => p.clone().resolve(dst)?.into_array(dst).unwrap_or_default(),
            None => continue,
        };
        for annot in annots {
            let r = match annot.as_reference() {
                Ok(r) => r,
                Err(_) => continue,
            };
            if !done.insert(r) {
                continue;
            }
            let mut dict = dst.resolve(r)?.into_dictionary(dst)?;
            if let Some(n) = dict.get("StructParent").and_then(|p| p.as_integer().ok()) {
                dict.insert("StructParent", Primitive::Integer(n + offset));
                dst.update_primitive(r, Primitive::Dictionary(dict))?;
            }
        }
    }
    Ok(())
}

fn stitch_structure(
    dst: &mut Document,
    src: &Document,
    src_catalog: &Dictionary,
    cloner: &mut Cloner<'_, Document>,
    offset: i32,
) -> Result<()> {
    let src_root_prim = match src_catalog.get("StructTreeRoot") {
        Some(p) => p.clone(),
        None => return Ok(()),
    };
    let src_root_ref = src_root_prim.as_reference().ok();
    let src_root = src_root_prim.resolve(src)?.into_dictionary(src)?;

    let src_entries = source_parent_tree_entries(src)?;
    let src_next = src_root
        .get("ParentTreeNextKey")
        .and_then(|p| p.as_integer().ok())
        .unwrap_or(0)
        .max(src_entries.keys().max().map_or(0, |&k| k + 1));

    // ensure the destination root exists as an indirect object
    let mut dst_catalog = dst.catalog()?;
    let dest_root_ref = match dst_catalog.get("StructTreeRoot") {
        Some(p) => match p.as_reference() {
            Ok(r) => r,
            Err(_) => {
                let r = dst.create_primitive(p.clone())?;
                dst_catalog.insert("StructTreeRoot", Primitive::Reference(r));
                dst.update_catalog(dst_catalog.clone())?;
                r
            }
        },
        None => {
            let mut root = Dictionary::new();
            root.insert("Type", Primitive::name("StructTreeRoot"));
            let r = dst.create_primitive(Primitive::Dictionary(root))?;
            dst_catalog.insert("StructTreeRoot", Primitive::Reference(r));
            dst.update_catalog(dst_catalog.clone())?;
            r
        }
    };
    let mut dest_root = dst.resolve(dest_root_ref)?.into_dictionary(dst)?;

    // the level-zero /Document node collecting old and new roots
    let doc_ref = dst.promise();
    if let Some(r) = src_root_ref {
        // `/P` of the source's top elements lands on the new node
        cloner.insert_mapping(r, doc_ref);
    }

    let dest_top = k_items(dest_root.get("K"), dst)?;
    for item in &dest_top {
        if let Ok(r) = item.as_reference() {
            if let Ok(mut elem) = dst.resolve(r)?.into_dictionary(dst) {
                elem.insert("P", Primitive::Reference(doc_ref));
                dst.update_primitive(r, Primitive::Dictionary(elem))?;
            }
        }
    }

    let mut kids = dest_top;
    for item in k_items(src_root.get("K"), src)? {
        kids.push(cloner.clone_primitive(&item, dst)?);
    }

    let mut doc_elem = Dictionary::new();
    doc_elem.insert("S", Primitive::name("Document"));
    doc_elem.insert("P", Primitive::Reference(dest_root_ref));
    doc_elem.insert("K", Primitive::Array(kids));
    dst.update_primitive(doc_ref, Primitive::Dictionary(doc_elem))?;
    dest_root.insert("K", Primitive::Array(vec![Primitive::Reference(doc_ref)]));

    // parent tree: keep the destination entries, append the source's at
    // offset numbers
    let mut entries = source_parent_tree_entries(dst)?
        .into_iter()
        .collect::<Vec<_>>();
    let mut src_sorted: Vec<_> = src_entries.into_iter().collect();
    src_sorted.sort_by_key(|&(k, _)| k);
    for (key, value) in src_sorted {
        let cloned = cloner.clone_primitive(&value, dst)?;
        entries.push((key + offset, cloned));
    }
    let tree_ref = dst.create_primitive(Primitive::Dictionary(NumberTree::build_leaf(entries)))?;
    dest_root.insert("ParentTree", Primitive::Reference(tree_ref));
    dest_root.insert("ParentTreeNextKey", Primitive::Integer(offset + src_next));

    merge_role_map(&mut dest_root, &src_root, src, dst)?;
    merge_id_tree(&mut dest_root, &src_root, src, dst, cloner)?;

    dst.update_primitive(dest_root_ref, Primitive::Dictionary(dest_root))?;
    Ok(())
}

/// Union with destination precedence; a differing collision is logged.
fn merge_role_map(
    dest_root: &mut Dictionary,
    src_root: &Dictionary,
    src: &Document,
    dst: &Document,
) -> Result<()> {
    let src_map = match src_root.get("RoleMap") {
        Some(p) => p.clone().resolve(src)?.into_dictionary(src)?,
        None => return Ok(()),
    };
    let mut dest_map = match dest_root.remove("RoleMap") {
        Some(p) => p.resolve(dst)?.into_dictionary(dst).unwrap_or_default(),
        None => Dictionary::new(),
    };
    for (key, value) in src_map.iter() {
        match dest_map.get(key.as_str()) {
            None => {
                dest_map.insert(key.clone(), value.clone());
            }
            Some(existing) if existing.as_name().ok() != value.as_name().ok() => {
                warn!(
                    "role map collision on /{}: keeping destination mapping",
                    key.as_str()
                );
            }
            Some(_) => (),
        }
    }
    dest_root.insert("RoleMap", Primitive::Dictionary(dest_map));
    Ok(())
}

fn merge_id_tree(
    dest_root: &mut Dictionary,
    src_root: &Dictionary,
    src: &Document,
    dst: &mut Document,
    cloner: &mut Cloner<'_, Document>,
) -> Result<()> {
    let src_tree = match src_root.get("IDTree") {
        Some(p) => NameTree::from_primitive(p.clone(), src)?,
        None => return Ok(()),
    };
    let mut entries = match dest_root.remove("IDTree") {
        Some(p) => NameTree::from_primitive(p, dst)?.entries(dst)?,
        None => vec![],
    };
    let existing: HashSet<PdfString> = entries.iter().map(|(k, _)| k.clone()).collect();
    for (key, value) in src_tree.entries(src)? {
        if existing.contains(&key) {
            warn!("ID tree collision on {:?}: keeping destination entry", key);
            continue;
        }
        let cloned = cloner.clone_primitive(&value, dst)?;
        entries.push((key, cloned));
    }
    dest_root.insert(
        "IDTree",
        Primitive::Dictionary(NameTree::build_leaf(entries)),
    );
    Ok(())
}

/// `/Names`: every name tree in the source is unioned into the
/// destination's, entry-wise with destination precedence.
fn merge_name_dictionary(
    dst: &mut Document,
    src: &Document,
    src_catalog: &Dictionary,
    cloner: &mut Cloner<'_, Document>,
) -> Result<()> {
    let src_names = match src_catalog.get("Names") {
        Some(p) => p.clone().resolve(src)?.into_dictionary(src)?,
        None => return Ok(()),
    };
    let mut dst_catalog = dst.catalog()?;
    let mut dest_names = match dst_catalog.get("Names") {
        Some(p) => p.clone().resolve(dst)?.into_dictionary(dst)?,
        None => Dictionary::new(),
    };

    for (kind, src_tree) in src_names.iter() {
        let src_tree = match NameTree::from_primitive(src_tree.clone(), src) {
            Ok(t) => t,
            Err(e) => {
                warn!("unreadable /{} name tree: {}", kind.as_str(), e);
                continue;
            }
        };
        let mut entries = match dest_names.remove(kind.as_str()) {
            Some(p) => NameTree::from_primitive(p, dst)?.entries(dst)?,
            None => vec![],
        };
        let existing: HashSet<PdfString> = entries.iter().map(|(k, _)| k.clone()).collect();
        for (key, value) in src_tree.entries(src)? {
            if existing.contains(&key) {
                warn!(
                    "/{} name tree collision on {:?}: keeping destination entry",
                    kind.as_str(),
                    key
                );
                continue;
            }
            let cloned = cloner.clone_primitive(&value, dst)?;
            entries.push((key, cloned));
        }
        dest_names.insert(
            dst.intern(kind.as_str()),
            Primitive::Dictionary(NameTree::build_leaf(entries)),
        );
    }

    let r = dst.create_primitive(Primitive::Dictionary(dest_names))?;
    dst_catalog.insert("Names", Primitive::Reference(r));
    dst.update_catalog(dst_catalog)
}

/// Pre-PDF-1.2 `/Dests` dictionary in the catalog.
fn merge_old_style_dests(
    dst: &mut Document,
    src: &Document,
    src_catalog: &Dictionary,
    cloner: &mut Cloner<'_, Document>,
) -> Result<()> {
    let src_dests = match src_catalog.get("Dests") {
        Some(p) => p.clone().resolve(src)?.into_dictionary(src)?,
        None => return Ok(()),
    };
    let mut dst_catalog = dst.catalog()?;
    let mut dest_dests = match dst_catalog.get("Dests") {
        Some(p) => p.clone().resolve(dst)?.into_dictionary(dst)?,
        None => Dictionary::new(),
    };
    for (key, value) in src_dests.iter() {
        if dest_dests.contains_key(key.as_str()) {
            warn!("/Dests collision on /{}: keeping destination", key.as_str());
            continue;
        }
        let cloned = cloner.clone_primitive(value, dst)?;
        dest_dests.insert(dst.intern(key.as_str()), cloned);
    }
    let r = dst.create_primitive(Primitive::Dictionary(dest_dests))?;
    dst_catalog.insert("Dests", Primitive::Reference(r));
    dst.update_catalog(dst_catalog)
}

/// Clone the source's top-level outline items and splice them as
/// siblings after the destination's last child.
fn merge_outlines(
    dst: &mut Document,
    src: &Document,
    src_catalog: &Dictionary,
    cloner: &mut Cloner<'_, Document>,
) -> Result<()> {
    let src_outlines_prim = match src_catalog.get("Outlines") {
        Some(p) => p.clone(),
        None => return Ok(()),
    };
    let src_outlines_ref = src_outlines_prim.as_reference().ok();
    let src_outlines = src_outlines_prim.resolve(src)?.into_dictionary(src)?;
    let src_first = match src_outlines.get("First") {
        Some(p) => p.as_reference()?,
        None => return Ok(()),
    };

    let mut dst_catalog = dst.catalog()?;
    let dest_ref = match dst_catalog.get("Outlines").and_then(|p| p.as_reference().ok()) {
        Some(r) => r,
        None => {
            let mut outlines = Dictionary::new();
            outlines.insert("Type", Primitive::name("Outlines"));
            outlines.insert("Count", Primitive::Integer(0));
            let r = dst.create_primitive(Primitive::Dictionary(outlines))?;
            dst_catalog.insert("Outlines", Primitive::Reference(r));
            dst.update_catalog(dst_catalog)?;
            r
        }
    };
    if let Some(r) = src_outlines_ref {
        // cloned items' /Parent must land on the destination root
        cloner.insert_mapping(r, dest_ref);
    }

    // clone the sibling chain
    let mut cloned_chain = Vec::new();
    let mut cursor = Some(src_first);
    while let Some(item_ref) = cursor {
        cloned_chain.push(cloner.clone_ref(item_ref, dst)?);
        let item = src.resolve(item_ref)?.into_dictionary(src)?;
        cursor = item.get("Next").and_then(|p| p.as_reference().ok());
    }
    let (&first_cloned, &last_cloned) = match (cloned_chain.first(), cloned_chain.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return Ok(()),
    };

    let mut dest_outlines = dst.resolve(dest_ref)?.into_dictionary(dst)?;
    match dest_outlines.get("Last").and_then(|p| p.as_reference().ok()) {
        Some(old_last) => {
            let mut last = dst.resolve(old_last)?.into_dictionary(dst)?;
            last.insert("Next", Primitive::Reference(first_cloned));
            dst.update_primitive(old_last, Primitive::Dictionary(last))?;
            let mut first = dst.resolve(first_cloned)?.into_dictionary(dst)?;
            first.insert("Prev", Primitive::Reference(old_last));
            dst.update_primitive(first_cloned, Primitive::Dictionary(first))?;
        }
        None => {
            dest_outlines.insert("First", Primitive::Reference(first_cloned));
        }
    }
    dest_outlines.insert("Last", Primitive::Reference(last_cloned));
    let count = dest_outlines
        .get("Count")
        .and_then(|p| p.as_integer().ok())
        .unwrap_or(0)
        .max(0);
    dest_outlines.insert(
        "Count",
        Primitive::Integer(count + cloned_chain.len() as i32),
    );
    dst.update_primitive(dest_ref, Primitive::Dictionary(dest_outlines))?;
    Ok(())
}

/// Page-label ranges shift by the destination page count; a source
/// without labels contributes a default range so its pages do not pick
/// up the previous document's numbering.
fn merge_page_labels(
    dst: &mut Document,
    src: &Document,
    src_catalog: &Dictionary,
    cloner: &mut Cloner<'_, Document>,
    dest_page_count: u32,
) -> Result<()> {
    let src_tree = match src_catalog.get("PageLabels") {
        Some(p) => Some(NumberTree::from_primitive(p.clone(), src)?),
        None => None,
    };
    let mut dst_catalog = dst.catalog()?;
    let dest_has = dst_catalog.contains_key("PageLabels");
    if src_tree.is_none() && !dest_has {
        return Ok(());
    }

    let mut entries = match dst_catalog.remove("PageLabels") {
        Some(p) => NumberTree::from_primitive(p, dst)?.entries(dst)?,
        None => vec![],
    };
    if entries.is_empty() && dest_page_count > 0 {
        // existing pages keep plain numbering
        entries.push((0, Primitive::Dictionary(Dictionary::new())));
    }
    match src_tree {
        Some(tree) => {
            for (key, value) in tree.entries(src)? {
                let cloned = cloner.clone_primitive(&value, dst)?;
                entries.push((key + dest_page_count as i32, cloned));
            }
        }
        None => {
            entries.push((
                dest_page_count as i32,
                Primitive::Dictionary(Dictionary::new()),
            ));
        }
    }
    let r = dst.create_primitive(Primitive::Dictionary(NumberTree::build_leaf(entries)))?;
    dst_catalog.insert("PageLabels", Primitive::Reference(r));
    dst.update_catalog(dst_catalog)
}

/// Deduplicated on `/OutputConditionIdentifier`, except `"Custom"`,
/// which is never treated as a duplicate.
fn merge_output_intents(
    dst: &mut Document,
    src: &Document,
    src_catalog: &Dictionary,
    cloner: &mut Cloner<'_, Document>,
) -> Result<()> {
    let src_intents = match src_catalog.get("OutputIntents") {
        Some(p) => p.clone().resolve(src)?.into_array(src)?,
        None => return Ok(()),
    };
    let mut dst_catalog = dst.catalog()?;
    let mut dest_intents = match dst_catalog.remove("OutputIntents") {
        Some(p) => p.into_array(dst)?,
        None => vec![],
    };

    let identifier = |p: &Primitive, doc: &Document| -> Option<String> {
        p.clone()
            .resolve(doc)
            .ok()?
            .into_dictionary(doc)
            .ok()?
            .get("OutputConditionIdentifier")?
            .as_string()
            .ok()?
            .to_text()
            .ok()
    };
    let existing: HashSet<String> = dest_intents
        .iter()
        .filter_map(|p| identifier(p, dst))
        .collect();

    for intent in src_intents {
        let id = identifier(&intent, src);
        let keep = match id.as_deref() {
            Some("Custom") | None => true,
            Some(id) => !existing.contains(id),
        };
        if keep {
            dest_intents.push(cloner.clone_primitive(&intent, dst)?);
        }
    }
    dst_catalog.insert("OutputIntents", Primitive::Array(dest_intents));
    dst.update_catalog(dst_catalog)
}

/// `/OCProperties`: group and configuration arrays concatenate, scalar
/// conflicts keep the destination value.
fn merge_optional_content(
    dst: &mut Document,
    src: &Document,
    src_catalog: &Dictionary,
    cloner: &mut Cloner<'_, Document>,
) -> Result<()> {
    let src_ocp = match src_catalog.get("OCProperties") {
        Some(p) => p.clone().resolve(src)?,
        None => return Ok(()),
    };
    let mut dst_catalog = dst.catalog()?;
    let dest_ocp = match dst_catalog.remove("OCProperties") {
        Some(p) => p.resolve(dst)?,
        None => Primitive::Null,
    };
    let merged = cloner.merge(&src_ocp, dest_ocp, dst)?;
    dst_catalog.insert("OCProperties", merged);
    dst.update_catalog(dst_catalog)
}

/// Boolean preferences OR across both documents; anything else keeps
/// the destination value.
fn merge_viewer_preferences(
    dst: &mut Document,
    src: &Document,
    src_catalog: &Dictionary,
    cloner: &mut Cloner<'_, Document>,
) -> Result<()> {
    let src_prefs = match src_catalog.get("ViewerPreferences") {
        Some(p) => p.clone().resolve(src)?.into_dictionary(src)?,
        None => return Ok(()),
    };
    let mut dst_catalog = dst.catalog()?;
    let mut dest_prefs = match dst_catalog.remove("ViewerPreferences") {
        Some(p) => p.resolve(dst)?.into_dictionary(dst)?,
        None => Dictionary::new(),
    };
    for (key, value) in src_prefs.iter() {
        match (dest_prefs.get(key.as_str()), value) {
            (Some(&Primitive::Boolean(a)), &Primitive::Boolean(b)) => {
                dest_prefs.insert(key.clone(), Primitive::Boolean(a || b));
            }
            (Some(_), _) => (),
            (None, _) => {
                let cloned = cloner.clone_primitive(value, dst)?;
                dest_prefs.insert(dst.intern(key.as_str()), cloned);
            }
        }
    }
    dst_catalog.insert("ViewerPreferences", Primitive::Dictionary(dest_prefs));
    dst.update_catalog(dst_catalog)
}

fn merge_language_and_mark_info(
    dst: &mut Document,
    src: &Document,
    src_catalog: &Dictionary,
) -> Result<()> {
    let mut dst_catalog = dst.catalog()?;
    let mut changed = false;

    if !dst_catalog.contains_key("Lang") {
        if let Some(lang) = src_catalog.get("Lang") {
            dst_catalog.insert("Lang", lang.clone());
            changed = true;
        }
    }

    if let Some(src_mi) = src_catalog.get("MarkInfo") {
        let src_mi = src_mi.clone().resolve(src)?.into_dictionary(src)?;
        let mut dest_mi = match dst_catalog.remove("MarkInfo") {
            Some(p) => p.resolve(dst)?.into_dictionary(dst)?,
            None => Dictionary::new(),
        };
        for key in ["Marked", "UserProperties", "Suspects"] {
            let a = dest_mi.get(key).and_then(|p| p.as_bool().ok()).unwrap_or(false);
            let b = src_mi.get(key).and_then(|p| p.as_bool().ok()).unwrap_or(false);
            if a || b {
                dest_mi.insert(dst.intern(key), Primitive::Boolean(true));
            }
        }
        dst_catalog.insert("MarkInfo", Primitive::Dictionary(dest_mi));
        changed = true;
    }

    if changed {
        dst.update_catalog(dst_catalog)?;
    }
    Ok(())
}
