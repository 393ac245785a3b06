//! Tagged-structure surgery for the splitter: rebuild the structure
//! tree of an output document from the subset of pages it keeps.
//!
//! The kids tree is walked twice. The first pass decides, per element,
//! whether the element or any descendant marks content on a kept page
//! (or points at a kept annotation). The second pass clones only those
//! elements, reparenting as it goes, and rebuilds the parent tree, ID
//! tree and role map from what survived.

use crate::clone::Cloner;
use crate::document::Document;
use crate::error::*;
use crate::object::{NameTree, NumberTree, Object, PlainRef, Resolve, Updater};
use crate::primitive::{Dictionary, Name, PdfString, Primitive};

use std::collections::{HashMap, HashSet};

use super::split::SplitPageClone;

/// Interpret a `/K` value: absent and null mean no kids, a lone item is
/// a one-element list.
pub(crate) fn k_items(k: Option<&Primitive>, resolve: &impl Resolve) -> Result<Vec<Primitive>> {
    Ok(match k {
        None | Some(Primitive::Null) => vec![],
        Some(Primitive::Array(items)) => items.clone(),
        Some(Primitive::Reference(r)) => match resolve.resolve(*r)? {
            // a reference to the kids array itself
            Primitive::Array(items) => items,
            _ => vec![Primitive::Reference(*r)],
        },
        Some(other) => vec![other.clone()],
    })
}

#[derive(Debug, Copy, Clone, PartialEq)]
enum KidKind {
    Element,
    MarkedContentRef,
    ObjectRef,
}

fn classify(dict: &Dictionary) -> KidKind {
    match dict.get("Type").and_then(|p| p.as_name().ok()) {
        Some(t) if t == "MCR" => KidKind::MarkedContentRef,
        Some(t) if t == "OBJR" => KidKind::ObjectRef,
        _ => KidKind::Element,
    }
}

fn dict_page(dict: &Dictionary) -> Option<PlainRef> {
    dict.get("Pg").and_then(|p| p.as_reference().ok())
}

pub(crate) fn rebuild_structure(
    src: &Document,
    dst: &mut Document,
    cloner: &mut Cloner<'_, Document>,
    pages: &[SplitPageClone],
) -> Result<()> {
    let catalog = src.catalog()?;
    let root_prim = match catalog.get("StructTreeRoot") {
        Some(p) => p.clone(),
        None => return Ok(()),
    };
    let root_ref = root_prim.as_reference().ok();
    let root_dict = match root_prim.resolve(src) {
        Ok(p) => p.into_dictionary(src)?,
        Err(_) => return Ok(()),
    };

    let page_set: HashSet<PlainRef> = pages.iter().map(|p| p.src_page).collect();
    let kept_objs: HashSet<PlainRef> = pages
        .iter()
        .flat_map(|p| p.annots.iter().filter_map(|a| a.src_ref))
        .collect();

    let top_kids = k_items(root_dict.get("K"), src)?;

    let mut analyzer = Analyzer {
        src,
        page_set: &page_set,
        kept_objs: &kept_objs,
        memo: HashMap::new(),
        visiting: HashSet::new(),
    };
    // analyze every top-level subtree; the memo must cover the whole
    // tree before cloning starts
    let mut any_kept = false;
    for item in &top_kids {
        if analyzer.item_touches(item, None).unwrap_or(false) {
            any_kept = true;
        }
    }
    if !any_kept {
        return Ok(());
    }

    let dest_root_ref = dst.promise();
    if let Some(r) = root_ref {
        // `/P` of top-level elements points at the root
        cloner.insert_mapping(r, dest_root_ref);
    }

    let mut builder = Builder {
        src,
        keep: analyzer.memo,
        page_set: &page_set,
        elem_map: HashMap::new(),
        used_types: HashSet::new(),
        ids: Vec::new(),
    };

    let mut kept_top = Vec::new();
    for item in &top_kids {
        if let Primitive::Reference(r) = *item {
            if let Some(cloned) = builder.clone_elem(r, dest_root_ref, None, dst, cloner)? {
                kept_top.push(Primitive::Reference(cloned));
            }
        }
    }

    let parent_tree = rebuild_parent_tree(src, dst, pages, &builder.elem_map)?;

    let mut root = Dictionary::new();
    root.insert("Type", Primitive::name("StructTreeRoot"));
    root.insert("K", Primitive::Array(kept_top));
    let parent_tree_next = parent_tree.next_key;
    let tree_ref = dst.create_primitive(Primitive::Dictionary(parent_tree.tree))?;
    root.insert("ParentTree", Primitive::Reference(tree_ref));
    root.insert("ParentTreeNextKey", Primitive::Integer(parent_tree_next));

    if let Some(role_map) = filtered_role_map(&root_dict, &builder.used_types, src)? {
        root.insert("RoleMap", Primitive::Dictionary(role_map));
    }
    if !builder.ids.is_empty() {
        let entries = builder
            .ids
            .into_iter()
            .map(|(id, r)| (id, Primitive::Reference(r)))
            .collect();
        root.insert(
            "IDTree",
            Primitive::Dictionary(NameTree::build_leaf(entries)),
        );
    }
    dst.update_primitive(dest_root_ref, Primitive::Dictionary(root))?;

    let mut dst_catalog = dst.catalog()?;
    dst_catalog.insert("StructTreeRoot", Primitive::Reference(dest_root_ref));
    dst.update_catalog(dst_catalog)?;
    Ok(())
}

struct Analyzer<'a> {
    src: &'a Document,
    page_set: &'a HashSet<PlainRef>,
    kept_objs: &'a HashSet<PlainRef>,
    memo: HashMap<PlainRef, bool>,
    visiting: HashSet<PlainRef>,
}

impl<'a> Analyzer<'a> {
    fn elem_touches(&mut self, elem_ref: PlainRef, inherited_pg: Option<PlainRef>) -> bool {
        if let Some(&kept) = self.memo.get(&elem_ref) {
            return kept;
        }
        if !self.visiting.insert(elem_ref) {
            // a cycle; the element will be decided by its first visitor
            return false;
        }
        let kept = self.compute(elem_ref, inherited_pg).unwrap_or(false);
        self.visiting.remove(&elem_ref);
        self.memo.insert(elem_ref, kept);
        kept
    }

    fn compute(&mut self, elem_ref: PlainRef, inherited_pg: Option<PlainRef>) -> Result<bool> {
        let dict = self.src.resolve(elem_ref)?.into_dictionary(self.src)?;
        let pg = dict_page(&dict).or(inherited_pg);
        // no early exit: descendants must all land in the memo, the
        // clone pass relies on it
        let mut touched = pg.map_or(false, |r| self.page_set.contains(&r));
        for item in k_items(dict.get("K"), self.src)? {
            if self.item_touches(&item, pg)? {
                touched = true;
            }
        }
        Ok(touched)
    }

    fn item_touches(&mut self, item: &Primitive, inherited_pg: Option<PlainRef>) -> Result<bool> {
        Ok(match *item {
            Primitive::Integer(_) => {
                inherited_pg.map_or(false, |r| self.page_set.contains(&r))
            }
            Primitive::Reference(r) => {
                let dict = self.src.resolve(r)?.into_dictionary(self.src)?;
                match classify(&dict) {
                    KidKind::Element => self.elem_touches(r, inherited_pg),
                    KidKind::MarkedContentRef => dict_page(&dict)
                        .or(inherited_pg)
                        .map_or(false, |r| self.page_set.contains(&r)),
                    KidKind::ObjectRef => dict
                        .get("Obj")
                        .and_then(|p| p.as_reference().ok())
                        .map_or(false, |r| self.kept_objs.contains(&r)),
                }
            }
            Primitive::Dictionary(ref dict) => match classify(dict) {
                KidKind::MarkedContentRef => dict_page(dict)
                    .or(inherited_pg)
                    .map_or(false, |r| self.page_set.contains(&r)),
                KidKind::ObjectRef => dict
                    .get("Obj")
                    .and_then(|p| p.as_reference().ok())
                    .map_or(false, |r| self.kept_objs.contains(&r)),
                KidKind::Element => {
                    warn!("inline structure element; pruning");
                    false
                }
            },
            _ => false,
        })
    }
}

struct Builder<'a> {
    src: &'a Document,
    keep: HashMap<PlainRef, bool>,
    page_set: &'a HashSet<PlainRef>,
    elem_map: HashMap<PlainRef, PlainRef>,
    used_types: HashSet<Name>,
    ids: Vec<(PdfString, PlainRef)>,
}

impl<'a> Builder<'a> {
    fn clone_elem(
        &mut self,
        elem_ref: PlainRef,
        dest_parent: PlainRef,
        inherited_pg: Option<PlainRef>,
        dst: &mut Document,
        cloner: &mut Cloner<'_, Document>,
    ) -> Result<Option<PlainRef>> {
        if !self.keep.get(&elem_ref).copied().unwrap_or(false) {
            return Ok(None);
        }
        if let Some(&cloned) = self.elem_map.get(&elem_ref) {
            return Ok(Some(cloned));
        }
        let dst_ref = dst.promise();
        self.elem_map.insert(elem_ref, dst_ref);
        cloner.insert_mapping(elem_ref, dst_ref);

        let dict = self.src.resolve(elem_ref)?.into_dictionary(self.src)?;
        let own_pg = dict_page(&dict);
        let eff_pg = own_pg.or(inherited_pg);

        let mut out = Dictionary::new();
        for (key, value) in dict.iter() {
            match key.as_str() {
                "P" => {
                    out.insert("P", Primitive::Reference(dest_parent));
                }
                "Pg" => {
                    if let Some(mapped) = own_pg.and_then(|r| cloner.mapped(r)) {
                        out.insert("Pg", Primitive::Reference(mapped));
                    }
                }
                "K" => {
                    let kids = self.rebuild_kids(Some(value), dst_ref, eff_pg, dst, cloner)?;
                    if !kids.is_null() {
                        out.insert("K", kids);
                    }
                }
                "S" => {
                    let name = value.as_name()?;
                    self.used_types.insert(name.clone());
                    out.insert("S", Primitive::Name(name.clone()));
                }
                "ID" => {
                    if let Ok(id) = value.as_string() {
                        self.ids.push((id.clone(), dst_ref));
                    }
                    out.insert("ID", value.clone());
                }
                _ => {
                    let cloned = cloner.clone_primitive(value, dst)?;
                    out.insert(dst.intern(key.as_str()), cloned);
                }
            }
        }
        if !out.contains_key("P") {
            out.insert("P", Primitive::Reference(dest_parent));
        }
        dst.update_primitive(dst_ref, Primitive::Dictionary(out))?;
        Ok(Some(dst_ref))
    }

    fn rebuild_kids(
        &mut self,
        k: Option<&Primitive>,
        parent_dst: PlainRef,
        eff_pg: Option<PlainRef>,
        dst: &mut Document,
        cloner: &mut Cloner<'_, Document>,
    ) -> Result<Primitive> {
        let mut out = Vec::new();
        for item in k_items(k, self.src)? {
            match item {
                Primitive::Integer(mcid) => {
                    if eff_pg.map_or(false, |r| self.page_set.contains(&r)) {
                        out.push(Primitive::Integer(mcid));
                    }
                }
                Primitive::Reference(r) => {
                    let dict = self.src.resolve(r)?.into_dictionary(self.src)?;
                    match classify(&dict) {
                        KidKind::Element => {
                            if let Some(cloned) =
                                self.clone_elem(r, parent_dst, eff_pg, dst, cloner)?
                            {
                                out.push(Primitive::Reference(cloned));
                            }
                        }
                        kind => {
                            if let Some(rebuilt) =
                                self.rebuild_content_item(&dict, kind, eff_pg, cloner)?
                            {
                                let r = dst.create_primitive(rebuilt)?;
                                out.push(Primitive::Reference(r));
                            }
                        }
                    }
                }
                Primitive::Dictionary(ref dict) => {
                    let kind = classify(dict);
                    if kind == KidKind::Element {
                        continue;
                    }
                    if let Some(rebuilt) = self.rebuild_content_item(dict, kind, eff_pg, cloner)? {
                        out.push(rebuilt);
                    }
                }
                p => warn!("unexpected {} in /K", p.get_debug_name()),
            }
        }
        Ok(match out.len() {
            0 => Primitive::Null,
            1 => out.into_iter().next().unwrap(),
            _ => Primitive::Array(out),
        })
    }

    fn rebuild_content_item(
        &mut self,
        dict: &Dictionary,
        kind: KidKind,
        eff_pg: Option<PlainRef>,
        cloner: &mut Cloner<'_, Document>,
    ) -> Result<Option<Primitive>> {
        match kind {
            KidKind::MarkedContentRef => {
                let page = dict_page(dict).or(eff_pg);
                let mapped = match page.and_then(|r| cloner.mapped(r)) {
                    Some(r) => r,
                    None => return Ok(None),
                };
                let mut out = Dictionary::new();
                out.insert("Type", Primitive::name("MCR"));
                out.insert("Pg", Primitive::Reference(mapped));
                if let Some(mcid) = dict.get("MCID") {
                    out.insert("MCID", mcid.clone());
                }
                Ok(Some(Primitive::Dictionary(out)))
            }
            KidKind::ObjectRef => {
                let obj = dict.get("Obj").and_then(|p| p.as_reference().ok());
                let mapped = match obj.and_then(|r| cloner.mapped(r)) {
                    Some(r) => r,
                    None => return Ok(None),
                };
                let mut out = Dictionary::new();
                out.insert("Type", Primitive::name("OBJR"));
                if let Some(pg) = dict_page(dict).and_then(|r| cloner.mapped(r)) {
                    out.insert("Pg", Primitive::Reference(pg));
                }
                out.insert("Obj", Primitive::Reference(mapped));
                Ok(Some(Primitive::Dictionary(out)))
            }
            KidKind::Element => Ok(None),
        }
    }
}

struct RebuiltParentTree {
    tree: Dictionary,
    next_key: i32,
}

/// New parent tree numbering: dense, in output page order, pages first
/// then their annotations.
fn rebuild_parent_tree(
    src: &Document,
    dst: &mut Document,
    pages: &[SplitPageClone],
    elem_map: &HashMap<PlainRef, PlainRef>,
) -> Result<RebuiltParentTree> {
    let src_entries = source_parent_tree_entries(src)?;
    let map_elem = |p: &Primitive| -> Primitive {
        match p.as_reference().ok().and_then(|r| elem_map.get(&r)) {
            Some(&mapped) => Primitive::Reference(mapped),
            None => Primitive::Null,
        }
    };

    let mut next = 0i32;
    let mut nums: Vec<(i32, Primitive)> = Vec::new();

    for page in pages {
        let src_dict = src.resolve(page.src_page)?.into_dictionary(src)?;
        if let Some(n) = src_dict
            .get("StructParents")
            .and_then(|p| p.as_integer().ok())
        {
            let new_key = next;
            next += 1;
            let entry = match src_entries.get(&n) {
                Some(Primitive::Array(items)) => {
                    Primitive::Array(items.iter().map(map_elem).collect())
                }
                Some(p @ Primitive::Reference(_)) => {
                    match src.resolve(p.as_reference()?)? {
                        Primitive::Array(items) => {
                            Primitive::Array(items.iter().map(map_elem).collect())
                        }
                        _ => map_elem(p),
                    }
                }
                Some(p) => map_elem(p),
                None => Primitive::Null,
            };
            nums.push((new_key, entry));

            let mut cloned = dst.resolve(page.dst_page)?.into_dictionary(dst)?;
            cloned.insert("StructParents", Primitive::Integer(new_key));
            dst.update_primitive(page.dst_page, Primitive::Dictionary(cloned))?;
        }

        for annot in &page.annots {
            let src_ref = match annot.src_ref {
                Some(r) => r,
                None => continue,
            };
            let src_annot = src.resolve(src_ref)?.into_dictionary(src)?;
            if let Some(n) = src_annot
                .get("StructParent")
                .and_then(|p| p.as_integer().ok())
            {
                let new_key = next;
                next += 1;
                let entry = src_entries.get(&n).map(map_elem).unwrap_or(Primitive::Null);
                nums.push((new_key, entry));

                let mut cloned = dst.resolve(annot.dst_ref)?.into_dictionary(dst)?;
                cloned.insert("StructParent", Primitive::Integer(new_key));
                dst.update_primitive(annot.dst_ref, Primitive::Dictionary(cloned))?;
            }
        }
    }

    Ok(RebuiltParentTree {
        tree: NumberTree::build_leaf(nums),
        next_key: next,
    })
}

pub(crate) fn source_parent_tree_entries(src: &Document) -> Result<HashMap<i32, Primitive>> {
    let catalog = src.catalog()?;
    let root = match catalog.get("StructTreeRoot") {
        Some(p) => p.clone().resolve(src)?.into_dictionary(src)?,
        None => return Ok(HashMap::new()),
    };
    let tree = match root.get("ParentTree") {
        Some(p) => NumberTree::from_primitive(p.clone(), src)?,
        None => return Ok(HashMap::new()),
    };
    Ok(tree.entries(src)?.into_iter().collect())
}

fn filtered_role_map(
    root: &Dictionary,
    used: &HashSet<Name>,
    src: &Document,
) -> Result<Option<Dictionary>> {
    let role_map = match root.get("RoleMap") {
        Some(p) => p.clone().resolve(src)?.into_dictionary(src)?,
        None => return Ok(None),
    };
    let mut out = Dictionary::new();
    for (key, value) in role_map.iter() {
        if used.contains(key) {
            out.insert(key.clone(), value.clone());
        }
    }
    Ok(if out.is_empty() { None } else { Some(out) })
}
