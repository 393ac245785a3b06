use super::prelude::*;
use itertools::Itertools;

/// Name tree (string → value). The root is the node without `/Limits`.
#[derive(Debug)]
pub struct NameTree {
    pub limits: Option<(PdfString, PdfString)>,
    pub node: NameTreeNode,
}

#[derive(Debug)]
pub enum NameTreeNode {
    Intermediate(Vec<PlainRef>),
    Leaf(Vec<(PdfString, Primitive)>),
}

impl Object for NameTree {
    fn from_primitive(p: Primitive, resolve: &impl Resolve) -> Result<Self> {
        let mut dict = t!(p.resolve(resolve)?.into_dictionary(resolve));

        let limits = match dict.remove("Limits") {
            Some(limits) => {
                let limits = limits.resolve(resolve)?.into_array(resolve)?;
                if limits.len() != 2 {
                    bail!("'Limits' is not of length 2");
                }
                let min = limits[0].clone().resolve(resolve)?.into_string()?;
                let max = limits[1].clone().resolve(resolve)?.into_string()?;
                Some((min, max))
            }
            None => None,
        };

        let kids = dict.remove("Kids");
        let names = dict.remove("Names");
        // If no `kids`, try `names`. Else there is an error.
        Ok(match (kids, names) {
            (Some(kids), _) => {
                let kids = t!(kids
                    .resolve(resolve)?
                    .into_array(resolve)?
                    .iter()
                    .map(|kid| kid.as_reference())
                    .collect::<Result<Vec<_>>>());
                NameTree {
                    limits,
                    node: NameTreeNode::Intermediate(kids),
                }
            }
            (None, Some(names)) => {
                let names = names.resolve(resolve)?.into_array(resolve)?;
                let mut items = Vec::with_capacity(names.len() / 2);
                for (name, value) in names.into_iter().tuples() {
                    let name = name.resolve(resolve)?.into_string()?;
                    items.push((name, value));
                }
                NameTree {
                    limits,
                    node: NameTreeNode::Leaf(items),
                }
            }
            (None, None) => {
                warn!("Neither Kids nor Names present in NameTree node.");
                NameTree {
                    limits,
                    node: NameTreeNode::Intermediate(vec![]),
                }
            }
        })
    }
}

impl NameTree {
    pub fn walk(
        &self,
        r: &impl Resolve,
        callback: &mut dyn FnMut(&PdfString, &Primitive),
    ) -> Result<()> {
        match self.node {
            NameTreeNode::Leaf(ref items) => {
                for (name, val) in items {
                    callback(name, val);
                }
            }
            NameTreeNode::Intermediate(ref items) => {
                for &tree_ref in items {
                    let tree = NameTree::from_primitive(r.resolve(tree_ref)?, r)?;
                    tree.walk(r, callback)?;
                }
            }
        }
        Ok(())
    }

    /// All entries in tree order.
    pub fn entries(&self, r: &impl Resolve) -> Result<Vec<(PdfString, Primitive)>> {
        let mut out = Vec::new();
        self.walk(r, &mut |name, value| out.push((name.clone(), value.clone())))?;
        Ok(out)
    }

    /// Build a single-leaf tree dictionary; entries are sorted by key as
    /// the format requires.
    pub fn build_leaf(mut entries: Vec<(PdfString, Primitive)>) -> Dictionary {
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        let mut names = Vec::with_capacity(entries.len() * 2);
        for (name, value) in entries {
            names.push(Primitive::String(name));
            names.push(value);
        }
        let mut dict = Dictionary::new();
        dict.insert("Names", Primitive::Array(names));
        dict
    }
}
