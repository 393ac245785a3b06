use super::prelude::*;
use itertools::Itertools;

/// Number tree (integer → value); backs the structural parent tree and
/// page labels.
#[derive(Debug)]
pub struct NumberTree {
    pub limits: Option<(i32, i32)>,
    pub node: NumberTreeNode,
}

#[derive(Debug)]
pub enum NumberTreeNode {
    Leaf(Vec<(i32, Primitive)>),
    Intermediate(Vec<PlainRef>),
}

impl Object for NumberTree {
    fn from_primitive(p: Primitive, resolve: &impl Resolve) -> Result<Self> {
        let mut dict = p.resolve(resolve)?.into_dictionary(resolve)?;

        let limits = match dict.remove("Limits") {
            Some(limits) => {
                let limits = t!(limits.resolve(resolve)?.into_array(resolve));
                if limits.len() != 2 {
                    bail!("'Limits' is not of length 2");
                }
                let min = t!(limits[0].as_integer());
                let max = t!(limits[1].as_integer());
                Some((min, max))
            }
            None => None,
        };

        let kids = dict.remove("Kids");
        let nums = dict.remove("Nums");
        match (kids, nums) {
            (Some(kids), _) => {
                let kids = t!(kids
                    .resolve(resolve)?
                    .into_array(resolve)?
                    .iter()
                    .map(|kid| kid.as_reference())
                    .collect::<Result<Vec<_>>>());
                Ok(NumberTree {
                    limits,
                    node: NumberTreeNode::Intermediate(kids),
                })
            }
            (None, Some(nums)) => {
                let list = nums.resolve(resolve)?.into_array(resolve)?;
                let mut items = Vec::with_capacity(list.len() / 2);
                for (key, item) in list.into_iter().tuples() {
                    let idx = t!(key.resolve(resolve)?.as_integer());
                    items.push((idx, item));
                }
                Ok(NumberTree {
                    limits,
                    node: NumberTreeNode::Leaf(items),
                })
            }
            (None, None) => {
                warn!("Neither Kids nor Nums present in NumberTree node.");
                Ok(NumberTree {
                    limits,
                    node: NumberTreeNode::Intermediate(vec![]),
                })
            }
        }
    }
}

impl NumberTree {
    pub fn walk(
        &self,
        r: &impl Resolve,
        callback: &mut dyn FnMut(i32, &Primitive),
    ) -> Result<()> {
        match self.node {
            NumberTreeNode::Leaf(ref items) => {
                for &(idx, ref val) in items {
                    callback(idx, val);
                }
            }
            NumberTreeNode::Intermediate(ref items) => {
                for &tree_ref in items {
                    let tree = NumberTree::from_primitive(r.resolve(tree_ref)?, r)?;
                    tree.walk(r, callback)?;
                }
            }
        }
        Ok(())
    }

    pub fn entries(&self, r: &impl Resolve) -> Result<Vec<(i32, Primitive)>> {
        let mut out = Vec::new();
        self.walk(r, &mut |idx, value| out.push((idx, value.clone())))?;
        Ok(out)
    }

    /// Build a single-leaf tree dictionary with sorted keys.
    pub fn build_leaf(mut entries: Vec<(i32, Primitive)>) -> Dictionary {
        entries.sort_by_key(|&(idx, _)| idx);
        let mut nums = Vec::with_capacity(entries.len() * 2);
        for (idx, value) in entries {
            nums.push(Primitive::Integer(idx));
            nums.push(value);
        }
        let mut dict = Dictionary::new();
        dict.insert("Nums", Primitive::Array(nums));
        dict
    }
}
