//! In-memory document: object table, trailer, catalog and page helpers.
//!
//! The external parser populates the table; the composer mutates it
//! through the `Updater` impl so the change tracker sees every write.

use crate::error::*;
use crate::object::{ObjNr, PlainRef, Resolve, Trace, Updater};
use crate::observer::ChangeTracker;
use crate::primitive::{Dictionary, Name, Primitive};

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct InheritedAttrs {
    pub resources: Option<Primitive>,
    pub media_box: Option<Primitive>,
    pub crop_box: Option<Primitive>,
    pub rotate: Option<Primitive>,
}

impl InheritedAttrs {
    fn overlay(&self, dict: &Dictionary) -> InheritedAttrs {
        let pick = |key: &str, fallback: &Option<Primitive>| {
            dict.get(key).cloned().or_else(|| fallback.clone())
        };
        InheritedAttrs {
            resources: pick("Resources", &self.resources),
            media_box: pick("MediaBox", &self.media_box),
            crop_box: pick("CropBox", &self.crop_box),
            rotate: pick("Rotate", &self.rotate),
        }
    }
}

/// A page leaf together with the attributes inherited down the page tree.
#[derive(Debug, Clone)]
pub struct PageEntry {
    pub page_ref: PlainRef,
    pub attrs: InheritedAttrs,
}

pub struct Document {
    objects: BTreeMap<ObjNr, Primitive>,
    next_id: ObjNr,
    pub trailer: Dictionary,
    names: RefCell<HashSet<Arc<str>>>,
    tracker: RefCell<ChangeTracker>,
}

const PAGE_TREE_DEPTH_LIMIT: usize = 64;

impl Document {
    /// Minimal document: catalog plus an empty page tree. Split and merge
    /// outputs start here.
    pub fn new() -> Document {
        let mut doc = Document {
            objects: BTreeMap::new(),
            next_id: 1,
            trailer: Dictionary::new(),
            names: RefCell::new(HashSet::new()),
            tracker: RefCell::new(ChangeTracker::new()),
        };
        let mut pages = Dictionary::new();
        pages.insert("Type", Primitive::name("Pages"));
        pages.insert("Kids", Primitive::Array(vec![]));
        pages.insert("Count", Primitive::Integer(0));
        let pages_ref = doc.create_primitive(Primitive::Dictionary(pages)).unwrap();

        let mut catalog = Dictionary::new();
        catalog.insert("Type", Primitive::name("Catalog"));
        catalog.insert("Pages", Primitive::Reference(pages_ref));
        let catalog_ref = doc
            .create_primitive(Primitive::Dictionary(catalog))
            .unwrap();

        doc.trailer.insert("Root", Primitive::Reference(catalog_ref));
        doc.tracker.borrow_mut().hold_trailer(&doc.trailer);
        doc
    }

    /// Wrap an object table produced by the external parser. All entries
    /// are registered as pre-existing with the change tracker.
    pub fn from_objects(
        objects: impl IntoIterator<Item = (ObjNr, Primitive)>,
        trailer: Dictionary,
    ) -> Document {
        let objects: BTreeMap<ObjNr, Primitive> = objects.into_iter().collect();
        let next_id = objects.keys().next_back().map_or(1, |&id| id + 1);
        let mut tracker = ChangeTracker::new();
        for (&id, p) in &objects {
            tracker.loaded(PlainRef { id, gen: 0 }, p);
        }
        tracker.hold_trailer(&trailer);
        Document {
            objects,
            next_id,
            trailer,
            names: RefCell::new(HashSet::new()),
            tracker: RefCell::new(tracker),
        }
    }

    pub fn intern(&self, s: &str) -> Name {
        let mut names = self.names.borrow_mut();
        match names.get(s) {
            Some(shared) => Name::from_shared(shared.clone()),
            None => {
                let shared: Arc<str> = Arc::from(s);
                names.insert(shared.clone());
                Name::from_shared(shared)
            }
        }
    }

    pub fn tracker(&self) -> std::cell::Ref<ChangeTracker> {
        self.tracker.borrow()
    }

    pub fn contains(&self, r: PlainRef) -> bool {
        self.objects.contains_key(&r.id)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn catalog_ref(&self) -> Result<PlainRef> {
        try_opt!(self.trailer.get("Root")).as_reference()
    }

    pub fn catalog(&self) -> Result<Dictionary> {
        self.resolve(self.catalog_ref()?)?.into_dictionary(self)
    }

    pub fn update_catalog(&mut self, catalog: Dictionary) -> Result<()> {
        let r = self.catalog_ref()?;
        self.update_primitive(r, Primitive::Dictionary(catalog))
    }

    /// The trailer's `/Info` dictionary, if any.
    pub fn info(&self) -> Result<Option<Dictionary>> {
        match self.trailer.get("Info") {
            Some(p) => Ok(Some(p.clone().resolve(self)?.into_dictionary(self)?)),
            None => Ok(None),
        }
    }

    pub fn pages_root_ref(&self) -> Result<PlainRef> {
        try_opt!(self.catalog()?.get("Pages")).as_reference()
    }

    /// All page leaves in document order, each with the attributes
    /// inherited from its ancestor tree nodes.
    pub fn pages(&self) -> Result<Vec<PageEntry>> {
        let root = self.pages_root_ref()?;
        let mut out = Vec::new();
        self.walk_pages(
            root,
            &InheritedAttrs::default(),
            &mut out,
            PAGE_TREE_DEPTH_LIMIT,
        )?;
        Ok(out)
    }

    fn walk_pages(
        &self,
        node_ref: PlainRef,
        inherited: &InheritedAttrs,
        out: &mut Vec<PageEntry>,
        depth: usize,
    ) -> Result<()> {
        if depth == 0 {
            bail!("page tree depth exceeded");
        }
        let dict = self.resolve(node_ref)?.into_dictionary(self)?;
        let attrs = inherited.overlay(&dict);
        match dict.get("Type").and_then(|p| p.as_name().ok()) {
            Some(t) if t == "Pages" => {
                let kids = match dict.get("Kids") {
                    Some(k) => k.clone().into_array(self)?,
                    None => vec![],
                };
                for kid in kids {
                    let kid_ref = kid.as_reference()?;
                    self.walk_pages(kid_ref, &attrs, out, depth - 1)?;
                }
            }
            _ => {
                // a leaf; tolerate a missing /Type
                out.push(PageEntry {
                    page_ref: node_ref,
                    attrs,
                });
            }
        }
        Ok(())
    }

    pub fn page_count(&self) -> Result<u32> {
        Ok(self.pages()?.len() as u32)
    }

    pub fn get_page(&self, n: u32) -> Result<PageEntry> {
        let pages = self.pages()?;
        let max = pages.len() as u32;
        pages
            .into_iter()
            .nth(n as usize)
            .ok_or(PdfError::PageOutOfBounds { page_nr: n, max })
    }

    /// Append a page dictionary to the root page tree (flat kids).
    /// `/Parent` is set and `/Count` bumped.
    pub fn add_page(&mut self, mut page: Dictionary) -> Result<PlainRef> {
        let pages_ref = self.pages_root_ref()?;
        page.insert("Type", Primitive::name("Page"));
        page.insert("Parent", Primitive::Reference(pages_ref));
        let page_ref = self.create_primitive(Primitive::Dictionary(page))?;

        let mut pages = self.resolve(pages_ref)?.into_dictionary(self)?;
        let mut kids = match pages.remove("Kids") {
            Some(k) => k.into_array(self)?,
            None => vec![],
        };
        kids.push(Primitive::Reference(page_ref));
        let count = kids.len() as i32;
        pages.insert("Kids", Primitive::Array(kids));
        pages.insert("Count", Primitive::Integer(count));
        self.update_primitive(pages_ref, Primitive::Dictionary(pages))?;
        Ok(page_ref)
    }

    /// Attach an already-created object as a page leaf of the root tree.
    /// Sets `/Parent` and `/Type` on the object and bumps `/Count`.
    pub fn append_page_ref(&mut self, page_ref: PlainRef) -> Result<()> {
        let pages_ref = self.pages_root_ref()?;
        let mut page = self.resolve(page_ref)?.into_dictionary(self)?;
        page.insert("Type", Primitive::name("Page"));
        page.insert("Parent", Primitive::Reference(pages_ref));
        self.update_primitive(page_ref, Primitive::Dictionary(page))?;

        let mut pages = self.resolve(pages_ref)?.into_dictionary(self)?;
        let mut kids = match pages.remove("Kids") {
            Some(k) => k.into_array(self)?,
            None => vec![],
        };
        kids.push(Primitive::Reference(page_ref));
        let count = kids.len() as i32;
        pages.insert("Kids", Primitive::Array(kids));
        pages.insert("Count", Primitive::Integer(count));
        self.update_primitive(pages_ref, Primitive::Dictionary(pages))
    }

    /// Direct children of `r` were mutated in place without going through
    /// `update_primitive`.
    pub fn note_direct_update(&mut self, r: PlainRef) {
        self.tracker.borrow_mut().direct_update(r);
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

impl Resolve for Document {
    fn resolve(&self, r: PlainRef) -> Result<Primitive> {
        match self.objects.get(&r.id) {
            Some(p) => {
                self.tracker.borrow_mut().dereferenced(r);
                Ok(p.clone())
            }
            None => Err(PdfError::NullRef { obj_nr: r.id }),
        }
    }
}

impl Updater for Document {
    fn create_primitive(&mut self, p: Primitive) -> Result<PlainRef> {
        let id = self.next_id;
        self.next_id += 1;
        let r = PlainRef { id, gen: 0 };
        self.tracker.borrow_mut().created(r, &p);
        self.objects.insert(id, p);
        Ok(r)
    }

    fn update_primitive(&mut self, r: PlainRef, p: Primitive) -> Result<()> {
        let old = self.objects.insert(r.id, p);
        let new = &self.objects[&r.id];
        match old {
            Some(old) => self.tracker.borrow_mut().replaced(r, &old, new),
            None => self.tracker.borrow_mut().created(r, new),
        }
        if r.id >= self.next_id {
            self.next_id = r.id + 1;
        }
        Ok(())
    }

    fn promise(&mut self) -> PlainRef {
        let id = self.next_id;
        self.next_id += 1;
        self.objects.insert(id, Primitive::Null);
        let r = PlainRef { id, gen: 0 };
        self.tracker.borrow_mut().created(r, &Primitive::Null);
        r
    }

    fn remove(&mut self, r: PlainRef) {
        if let Some(old) = self.objects.remove(&r.id) {
            self.tracker.borrow_mut().removed(r, &old);
        }
    }
}

/// Resolver wrapper the engine uses: unresolvable references degrade to
/// `Null` with a warning instead of failing the walk.
pub struct LenientResolver<'a, R: Resolve>(pub &'a R);

impl<'a, R: Resolve> Resolve for LenientResolver<'a, R> {
    fn resolve(&self, r: PlainRef) -> Result<Primitive> {
        match self.0.resolve(r) {
            Ok(p) => Ok(p),
            Err(e) => {
                warn!("unresolved reference {} {} R: {}", r.id, r.gen, e);
                Ok(Primitive::Null)
            }
        }
    }
}

impl Trace for Document {
    fn trace(&self, cb: &mut impl FnMut(PlainRef)) {
        self.trailer.trace(cb);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_has_no_pages() {
        let doc = Document::new();
        assert_eq!(doc.page_count().unwrap(), 0);
    }

    #[test]
    fn add_page_updates_tree() {
        let mut doc = Document::new();
        let mut page = Dictionary::new();
        page.insert("MediaBox", media_box(612., 792.));
        let r = doc.add_page(page).unwrap();

        assert_eq!(doc.page_count().unwrap(), 1);
        let entry = doc.get_page(0).unwrap();
        assert_eq!(entry.page_ref, r);
        let pages = doc
            .resolve(doc.pages_root_ref().unwrap())
            .unwrap()
            .into_dictionary(&doc)
            .unwrap();
        assert_eq!(pages["Count"].as_integer().unwrap(), 1);
    }

    #[test]
    fn attrs_inherit_from_tree() {
        // hand-build a two-level tree with MediaBox on the intermediate node
        let mut doc = Document::new();
        let pages_ref = doc.pages_root_ref().unwrap();

        let mut page = Dictionary::new();
        page.insert("Type", Primitive::name("Page"));
        let page_ref = doc.create_primitive(page.into()).unwrap();

        let mut inner = Dictionary::new();
        inner.insert("Type", Primitive::name("Pages"));
        inner.insert("MediaBox", media_box(100., 200.));
        inner.insert("Kids", Primitive::Array(vec![page_ref.into()]));
        inner.insert("Count", Primitive::Integer(1));
        let inner_ref = doc.create_primitive(inner.into()).unwrap();

        let mut root = doc.resolve(pages_ref).unwrap().into_dictionary(&doc).unwrap();
        root.insert("Kids", Primitive::Array(vec![inner_ref.into()]));
        root.insert("Count", Primitive::Integer(1));
        doc.update_primitive(pages_ref, root.into()).unwrap();

        let entry = doc.get_page(0).unwrap();
        let mb = entry.attrs.media_box.unwrap();
        assert_eq!(mb.as_array().unwrap()[2].as_number().unwrap(), 100.);
    }

    #[test]
    fn interned_names_share_storage() {
        let doc = Document::new();
        let a = doc.intern("Helvetica");
        let b = doc.intern("Helvetica");
        assert!(Arc::ptr_eq(&a.shared(), &b.shared()));
    }

    fn media_box(w: f32, h: f32) -> Primitive {
        Primitive::Array(vec![
            Primitive::Integer(0),
            Primitive::Integer(0),
            Primitive::Number(w),
            Primitive::Number(h),
        ])
    }
}
