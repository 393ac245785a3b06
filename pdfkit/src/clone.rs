//! Identity-memoized deep cloning between documents.
//!
//! Cloning keys on source object identity (object number), so shared
//! subgraphs stay shared in the destination and reference cycles —
//! including an object referencing itself — are rewritten to their
//! destination counterparts instead of looping.

use crate::document::Document;
use crate::error::*;
use crate::object::{PlainRef, Resolve, Updater};
use crate::primitive::{Dictionary, PdfStream, Primitive};

use std::collections::{HashMap, HashSet};

pub struct Cloner<'s, S: Resolve> {
    src: &'s S,
    /// source ref -> destination ref
    visited: HashMap<PlainRef, PlainRef>,
    /// destination refs this cloner produced; cloning one's own output is
    /// the identity
    clones: HashSet<PlainRef>,
}

impl<'s, S: Resolve> Cloner<'s, S> {
    pub fn new(src: &'s S) -> Self {
        Cloner {
            src,
            visited: HashMap::new(),
            clones: HashSet::new(),
        }
    }

    /// The source→destination reference mapping accumulated so far.
    pub fn mapping(&self) -> &HashMap<PlainRef, PlainRef> {
        &self.visited
    }

    pub fn mapped(&self, r: PlainRef) -> Option<PlainRef> {
        self.visited.get(&r).copied()
    }

    /// Pre-seed a source→destination pair. Composers use this to route
    /// back-references (a page's `/Parent`, a structure element's `/P`)
    /// at objects they build themselves instead of letting the cloner
    /// copy the whole ancestor chain.
    pub fn insert_mapping(&mut self, src: PlainRef, dst: PlainRef) {
        self.visited.insert(src, dst);
        self.clones.insert(dst);
    }

    /// Clone the object behind `r` into `dst`, returning the destination
    /// reference. Repeated calls with the same source return the same
    /// destination reference.
    pub fn clone_ref(&mut self, r: PlainRef, dst: &mut Document) -> Result<PlainRef> {
        if self.clones.contains(&r) {
            return Ok(r);
        }
        if let Some(&cloned) = self.visited.get(&r) {
            return Ok(cloned);
        }
        let value = match self.src.resolve(r) {
            Ok(p) => p,
            Err(e) => {
                warn!("cloning unresolved reference {} {} R as null: {}", r.id, r.gen, e);
                Primitive::Null
            }
        };
        // reserve the slot first so cycles back into `r` find it
        let dst_ref = dst.promise();
        self.visited.insert(r, dst_ref);
        self.clones.insert(dst_ref);
        let cloned = self.clone_primitive(&value, dst)?;
        dst.update_primitive(dst_ref, cloned)?;
        Ok(dst_ref)
    }

    pub fn clone_primitive(&mut self, p: &Primitive, dst: &mut Document) -> Result<Primitive> {
        Ok(match *p {
            Primitive::Reference(r) => Primitive::Reference(self.clone_ref(r, dst)?),
            Primitive::Array(ref parts) => Primitive::Array(
                parts
                    .iter()
                    .map(|p| self.clone_primitive(p, dst))
                    .collect::<Result<_>>()?,
            ),
            Primitive::Dictionary(ref dict) => {
                Primitive::Dictionary(self.clone_dict(dict, dst)?)
            }
            // raw bytes verbatim; the filter chain travels in the dict
            Primitive::Stream(ref s) => Primitive::Stream(PdfStream {
                info: self.clone_dict(&s.info, dst)?,
                data: s.data.clone(),
            }),
            ref scalar => scalar.clone(),
        })
    }

    pub fn clone_dict(&mut self, dict: &Dictionary, dst: &mut Document) -> Result<Dictionary> {
        self.clone_dict_filtered(dict, &[], dst)
    }

    /// Clone a dictionary, skipping the named keys. Keys are re-interned
    /// in the destination document.
    pub fn clone_dict_filtered(
        &mut self,
        dict: &Dictionary,
        skip: &[&str],
        dst: &mut Document,
    ) -> Result<Dictionary> {
        let mut out = Dictionary::new();
        for (key, value) in dict.iter() {
            if skip.contains(&key.as_str()) {
                continue;
            }
            let value = self.clone_primitive(value, dst)?;
            out.insert(dst.intern(key.as_str()), value);
        }
        Ok(out)
    }

    /// Combine `src` into `dst_value`: dictionary entries missing from the
    /// destination are cloned in, entries present on both sides recurse,
    /// array contents are appended. Not commutative; the destination wins
    /// on scalar conflicts.
    pub fn merge(
        &mut self,
        src: &Primitive,
        dst_value: Primitive,
        dst: &mut Document,
    ) -> Result<Primitive> {
        let src = src.clone().resolve(self.src)?;
        match (src, dst_value) {
            (Primitive::Dictionary(ref s), Primitive::Dictionary(mut d)) => {
                for (key, value) in s.iter() {
                    match d.remove(key.as_str()) {
                        None => {
                            let cloned = self.clone_primitive(value, dst)?;
                            d.insert(dst.intern(key.as_str()), cloned);
                        }
                        Some(existing) => {
                            let merged = self.merge(value, existing, dst)?;
                            d.insert(dst.intern(key.as_str()), merged);
                        }
                    }
                }
                Ok(Primitive::Dictionary(d))
            }
            (Primitive::Array(ref s), Primitive::Array(mut d)) => {
                for value in s {
                    d.push(self.clone_primitive(value, dst)?);
                }
                Ok(Primitive::Array(d))
            }
            (Primitive::Null, d) => Ok(d),
            (s, Primitive::Null) => self.clone_primitive(&s, dst),
            (ref s, d) => {
                if std::mem::discriminant(s) != std::mem::discriminant(&d) {
                    let e = PdfError::CloneTypeMismatch {
                        src: s.get_debug_name(),
                        dst: d.get_debug_name(),
                    };
                    warn!("{}", e);
                }
                // destination wins
                Ok(d)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjNr;

    fn doc_with(objects: Vec<(ObjNr, Primitive)>) -> Document {
        Document::from_objects(objects, Dictionary::new())
    }

    fn r(id: ObjNr) -> PlainRef {
        PlainRef { id, gen: 0 }
    }

    #[test]
    fn shared_references_stay_shared() {
        // 1 -> {A: 2 R, B: 2 R}, 2 -> 7
        let mut d = Dictionary::new();
        d.insert("A", Primitive::Reference(r(2)));
        d.insert("B", Primitive::Reference(r(2)));
        let src = doc_with(vec![(1, d.into()), (2, Primitive::Integer(7))]);

        let mut dst = Document::new();
        let mut cloner = Cloner::new(&src);
        let cloned = cloner.clone_ref(r(1), &mut dst).unwrap();

        let out = dst.resolve(cloned).unwrap().into_dictionary(&dst).unwrap();
        assert_eq!(
            out["A"].as_reference().unwrap(),
            out["B"].as_reference().unwrap()
        );
    }

    #[test]
    fn self_reference_rewrites_to_clone() {
        let mut d = Dictionary::new();
        d.insert("Self", Primitive::Reference(r(1)));
        let src = doc_with(vec![(1, d.into())]);

        let mut dst = Document::new();
        let mut cloner = Cloner::new(&src);
        let cloned = cloner.clone_ref(r(1), &mut dst).unwrap();

        let out = dst.resolve(cloned).unwrap().into_dictionary(&dst).unwrap();
        assert_eq!(out["Self"].as_reference().unwrap(), cloned);
    }

    #[test]
    fn clone_is_idempotent() {
        let src = doc_with(vec![(1, Primitive::Integer(42))]);
        let mut dst = Document::new();
        let mut cloner = Cloner::new(&src);
        let once = cloner.clone_ref(r(1), &mut dst).unwrap();
        // cloning the cloner's own output must not copy again
        let twice = cloner.clone_ref(once, &mut dst).unwrap();
        assert_eq!(once, twice);
        // and re-cloning the source maps to the same destination
        assert_eq!(cloner.clone_ref(r(1), &mut dst).unwrap(), once);
    }

    #[test]
    fn stream_bytes_copied_verbatim() {
        let stream = PdfStream {
            info: {
                let mut d = Dictionary::new();
                d.insert("Filter", Primitive::name("FlateDecode"));
                d
            },
            data: vec![1, 2, 3, 255],
        };
        let src = doc_with(vec![(1, Primitive::Stream(stream))]);
        let mut dst = Document::new();
        let mut cloner = Cloner::new(&src);
        let cloned = cloner.clone_ref(r(1), &mut dst).unwrap();
        match dst.resolve(cloned).unwrap() {
            Primitive::Stream(s) => assert_eq!(s.data, vec![1, 2, 3, 255]),
            p => panic!("not a stream: {:?}", p),
        }
    }

    #[test]
    fn merge_appends_arrays_and_destination_wins() {
        let src_doc = doc_with(vec![]);
        let mut dst = Document::new();
        let mut cloner = Cloner::new(&src_doc);

        let mut s = Dictionary::new();
        s.insert("Shared", Primitive::Integer(1));
        s.insert("New", Primitive::Integer(2));
        s.insert(
            "List",
            Primitive::Array(vec![Primitive::Integer(3)]),
        );

        let mut d = Dictionary::new();
        d.insert("Shared", Primitive::Integer(9));
        d.insert(
            "List",
            Primitive::Array(vec![Primitive::Integer(8)]),
        );

        let merged = cloner
            .merge(&s.into(), Primitive::Dictionary(d), &mut dst)
            .unwrap();
        let merged = merged.as_dict().unwrap();
        assert_eq!(merged["Shared"].as_integer().unwrap(), 9);
        assert_eq!(merged["New"].as_integer().unwrap(), 2);
        let list = merged["List"].as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].as_integer().unwrap(), 8);
        assert_eq!(list[1].as_integer().unwrap(), 3);
    }
}
