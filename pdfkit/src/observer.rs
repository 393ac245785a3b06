//! Change tracking for incremental saves.
//!
//! Watches mutations of the object graph and keeps the set of objects an
//! incremental writer would have to emit. The writer itself is an
//! external collaborator; this module only maintains the contract:
//!
//! - objects present at load are *pre-existing*; dereferencing one does
//!   not mark it updated
//! - creating or replacing an object marks it updated
//! - a direct mutation inside an object propagates along the reverse
//!   holder map to every indirect ancestor
//! - dropping the last holder of an object unmonitors it and removes it
//!   from the update set; objects held by the trailer are never dropped

use crate::object::{PlainRef, Trace};
use crate::primitive::{Dictionary, Primitive};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Default)]
pub struct ChangeTracker {
    monitored: HashSet<PlainRef>,
    pre_existing: HashSet<PlainRef>,
    updated: BTreeSet<PlainRef>,
    /// child -> the indirect objects whose value references it
    holders: HashMap<PlainRef, HashSet<PlainRef>>,
    /// held by the trailer; never unmonitored
    trailer_held: HashSet<PlainRef>,
}

impl ChangeTracker {
    pub fn new() -> ChangeTracker {
        ChangeTracker::default()
    }

    fn add_holds(&mut self, holder: PlainRef, p: &Primitive) {
        p.trace(&mut |child| {
            self.holders.entry(child).or_default().insert(holder);
        });
    }

    fn drop_holds(&mut self, holder: PlainRef, p: &Primitive) {
        let mut orphans = Vec::new();
        p.trace(&mut |child| {
            if let Some(set) = self.holders.get_mut(&child) {
                set.remove(&holder);
                if set.is_empty() {
                    orphans.push(child);
                }
            }
        });
        for child in orphans {
            self.holders.remove(&child);
            if !self.trailer_held.contains(&child) {
                self.monitored.remove(&child);
                self.updated.remove(&child);
            }
        }
    }

    /// Register an object that was already indirect at load time.
    pub fn loaded(&mut self, r: PlainRef, p: &Primitive) {
        self.monitored.insert(r);
        self.pre_existing.insert(r);
        self.add_holds(r, p);
    }

    pub fn hold_trailer(&mut self, trailer: &Dictionary) {
        trailer.trace(&mut |child| {
            self.trailer_held.insert(child);
        });
    }

    pub fn created(&mut self, r: PlainRef, p: &Primitive) {
        self.monitored.insert(r);
        self.updated.insert(r);
        self.add_holds(r, p);
    }

    pub fn replaced(&mut self, r: PlainRef, old: &Primitive, new: &Primitive) {
        self.drop_holds(r, old);
        self.add_holds(r, new);
        self.monitored.insert(r);
        self.updated.insert(r);
    }

    pub fn removed(&mut self, r: PlainRef, old: &Primitive) {
        self.drop_holds(r, old);
        if !self.trailer_held.contains(&r) {
            self.monitored.remove(&r);
            self.updated.remove(&r);
        }
    }

    /// Resolving a pre-existing object is not a mutation.
    pub fn dereferenced(&mut self, r: PlainRef) {
        self.monitored.insert(r);
    }

    /// A value inside `r` changed without the reference itself changing:
    /// `r` and all its transitive holders must be rewritten.
    pub fn direct_update(&mut self, r: PlainRef) {
        let mut queue = vec![r];
        while let Some(r) = queue.pop() {
            if !self.updated.insert(r) {
                continue;
            }
            self.monitored.insert(r);
            if let Some(parents) = self.holders.get(&r) {
                queue.extend(parents.iter().copied());
            }
        }
    }

    pub fn is_monitored(&self, r: PlainRef) -> bool {
        self.monitored.contains(&r)
    }
    pub fn is_pre_existing(&self, r: PlainRef) -> bool {
        self.pre_existing.contains(&r)
    }
    pub fn is_updated(&self, r: PlainRef) -> bool {
        self.updated.contains(&r)
    }
    /// Objects an incremental save must include, in object-number order.
    pub fn changed_objects(&self) -> impl Iterator<Item = PlainRef> + '_ {
        self.updated.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjNr;

    fn r(id: ObjNr) -> PlainRef {
        PlainRef { id, gen: 0 }
    }

    fn dict_with_ref(child: PlainRef) -> Primitive {
        let mut d = Dictionary::new();
        d.insert("Kid", Primitive::Reference(child));
        Primitive::Dictionary(d)
    }

    #[test]
    fn dereference_does_not_update_pre_existing() {
        let mut t = ChangeTracker::new();
        t.loaded(r(1), &Primitive::Integer(5));
        t.dereferenced(r(1));
        assert!(t.is_monitored(r(1)));
        assert!(!t.is_updated(r(1)));
    }

    #[test]
    fn direct_update_propagates_to_holders() {
        let mut t = ChangeTracker::new();
        t.loaded(r(1), &dict_with_ref(r(2)));
        t.loaded(r(2), &dict_with_ref(r(3)));
        t.loaded(r(3), &Primitive::Integer(0));

        t.direct_update(r(3));
        assert!(t.is_updated(r(3)));
        assert!(t.is_updated(r(2)));
        assert!(t.is_updated(r(1)));
    }

    #[test]
    fn losing_last_holder_unmonitors() {
        let mut t = ChangeTracker::new();
        t.loaded(r(1), &dict_with_ref(r(2)));
        t.loaded(r(2), &Primitive::Integer(0));
        t.direct_update(r(2));
        assert!(t.is_updated(r(2)));

        // rewrite obj 1 so it no longer references obj 2
        t.replaced(r(1), &dict_with_ref(r(2)), &Primitive::Null);
        assert!(!t.is_monitored(r(2)));
        assert!(!t.is_updated(r(2)));
    }

    #[test]
    fn trailer_held_objects_survive() {
        let mut t = ChangeTracker::new();
        let mut trailer = Dictionary::new();
        trailer.insert("Root", Primitive::Reference(r(5)));
        t.hold_trailer(&trailer);
        t.loaded(r(1), &dict_with_ref(r(5)));
        t.loaded(r(5), &Primitive::Null);

        t.replaced(r(1), &dict_with_ref(r(5)), &Primitive::Null);
        assert!(t.is_monitored(r(5)) || t.is_pre_existing(r(5)));
    }

    #[test]
    fn cyclic_graph_terminates() {
        let mut t = ChangeTracker::new();
        t.loaded(r(1), &dict_with_ref(r(2)));
        t.loaded(r(2), &dict_with_ref(r(1)));
        t.direct_update(r(1));
        assert!(t.is_updated(r(1)) && t.is_updated(r(2)));
    }
}
