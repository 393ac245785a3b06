use super::prelude::*;

/// An explicit destination: a target page plus a view. Named
/// destinations resolve through the `/Dests` name tree before this type
/// applies.
#[derive(Debug, Clone)]
pub struct Dest {
    pub page: Option<PlainRef>,
    /// `/XYZ`, `/Fit`, … with its parameters, kept verbatim.
    pub view: Vec<Primitive>,
}

impl Dest {
    /// Accepts the array form, or a dictionary with a `/D` entry.
    pub fn from_primitive_opt(p: Primitive, resolve: &impl Resolve) -> Result<Option<Dest>> {
        let p = p.resolve(resolve)?;
        let arr = match p {
            Primitive::Array(arr) => arr,
            Primitive::Dictionary(dict) => match dict.get("D") {
                Some(d) => d.clone().resolve(resolve)?.into_array(resolve)?,
                None => return Ok(None),
            },
            Primitive::Null => return Ok(None),
            p => {
                warn!("destination is a {}", p.get_debug_name());
                return Ok(None);
            }
        };
        let mut iter = arr.into_iter();
        let page = match iter.next() {
            Some(Primitive::Reference(r)) => Some(r),
            // a page number instead of a reference (remote destinations)
            Some(Primitive::Integer(_)) => None,
            _ => None,
        };
        Ok(Some(Dest {
            page,
            view: iter.collect(),
        }))
    }

    pub fn to_primitive_with_page(&self, page: Option<PlainRef>) -> Primitive {
        match page {
            Some(r) => {
                let mut arr = vec![Primitive::Reference(r)];
                arr.extend(self.view.iter().cloned());
                Primitive::Array(arr)
            }
            None => Primitive::Null,
        }
    }
}
