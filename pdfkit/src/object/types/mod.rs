//! Typed views over dictionary shapes the interpreter and composer use.

mod prelude {
    pub use crate::error::*;
    pub use crate::matrix::Matrix;
    pub use crate::object::*;
    pub use crate::primitive::{Dictionary, Name, PdfString, Primitive};
}

use prelude::*;
use std::collections::HashMap;

macro_rules! mods {
    ($($name:ident),*) => {
        $( mod $name; )*
        $( pub use $name::*; )*
    };
}

mods!(annot, dest, extgstate, nametree, numbertree, pattern, xobject);

/// Lower-left / upper-right rectangle, the `[llx lly urx ury]` array form.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Rectangle {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl Rectangle {
    pub fn new(left: f32, bottom: f32, right: f32, top: f32) -> Rectangle {
        Rectangle {
            left,
            bottom,
            right,
            top,
        }
    }
    pub fn width(&self) -> f32 {
        self.right - self.left
    }
    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }
    /// Corners sorted so width and height come out non-negative.
    pub fn normalized(&self) -> Rectangle {
        Rectangle {
            left: self.left.min(self.right),
            bottom: self.bottom.min(self.top),
            right: self.left.max(self.right),
            top: self.bottom.max(self.top),
        }
    }
    /// Bounding box of the four transformed corners.
    pub fn transformed(&self, m: Matrix) -> Rectangle {
        let corners = [
            m.apply(self.left, self.bottom),
            m.apply(self.right, self.bottom),
            m.apply(self.left, self.top),
            m.apply(self.right, self.top),
        ];
        let xs = corners.iter().map(|c| c.0);
        let ys = corners.iter().map(|c| c.1);
        Rectangle {
            left: xs.clone().fold(f32::INFINITY, f32::min),
            bottom: ys.clone().fold(f32::INFINITY, f32::min),
            right: xs.fold(f32::NEG_INFINITY, f32::max),
            top: ys.fold(f32::NEG_INFINITY, f32::max),
        }
    }
}

impl Object for Rectangle {
    fn from_primitive(p: Primitive, r: &impl Resolve) -> Result<Self> {
        let arr = p.resolve(r)?.into_array(r)?;
        if arr.len() != 4 {
            bail!("rectangle array has {} elements", arr.len());
        }
        Ok(Rectangle {
            left: arr[0].clone().resolve(r)?.as_number()?,
            bottom: arr[1].clone().resolve(r)?.as_number()?,
            right: arr[2].clone().resolve(r)?.as_number()?,
            top: arr[3].clone().resolve(r)?.as_number()?,
        })
    }
}
impl ObjectWrite for Rectangle {
    fn to_primitive(&self, update: &mut impl Updater) -> Result<Primitive> {
        Primitive::array::<f32, _, _, _>(
            [self.left, self.bottom, self.right, self.top].iter(),
            update,
        )
    }
}

/// The resource dictionary of a content stream: named slots per resource
/// kind. Entries stay unresolved so missing collaborators surface only
/// when actually used.
#[derive(Debug, Default, Clone)]
pub struct Resources {
    pub ext_g_states: HashMap<Name, Primitive>,
    pub color_spaces: HashMap<Name, Primitive>,
    pub patterns: HashMap<Name, Primitive>,
    pub shadings: HashMap<Name, Primitive>,
    pub xobjects: HashMap<Name, Primitive>,
    pub fonts: HashMap<Name, Primitive>,
    pub properties: HashMap<Name, Primitive>,
}

fn sub_dict(
    dict: &Dictionary,
    key: &str,
    resolve: &impl Resolve,
) -> Result<HashMap<Name, Primitive>> {
    let mut map = HashMap::new();
    if let Some(p) = dict.get(key) {
        match p.clone().resolve(resolve)? {
            Primitive::Dictionary(d) => {
                for (name, value) in d.into_iter() {
                    map.insert(name, value);
                }
            }
            Primitive::Null => (),
            p => warn!("/{} resource slot is a {}", key, p.get_debug_name()),
        }
    }
    Ok(map)
}

impl Resources {
    pub fn from_dict(dict: &Dictionary, resolve: &impl Resolve) -> Result<Resources> {
        Ok(Resources {
            ext_g_states: sub_dict(dict, "ExtGState", resolve)?,
            color_spaces: sub_dict(dict, "ColorSpace", resolve)?,
            patterns: sub_dict(dict, "Pattern", resolve)?,
            shadings: sub_dict(dict, "Shading", resolve)?,
            xobjects: sub_dict(dict, "XObject", resolve)?,
            fonts: sub_dict(dict, "Font", resolve)?,
            properties: sub_dict(dict, "Properties", resolve)?,
        })
    }
}

impl Object for Resources {
    fn from_primitive(p: Primitive, resolve: &impl Resolve) -> Result<Self> {
        let dict = p.resolve(resolve)?.into_dictionary(resolve)?;
        Resources::from_dict(&dict, resolve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_transform() {
        let r = Rectangle::new(0., 0., 10., 20.);
        let t = r.transformed(Matrix::scale(2., 1.).then(Matrix::translate(5., 0.)));
        assert_eq!(t, Rectangle::new(5., 0., 25., 20.));
    }

    #[test]
    fn rectangle_normalize() {
        let r = Rectangle::new(10., 30., 0., 20.).normalized();
        assert_eq!(r, Rectangle::new(0., 20., 10., 30.));
    }
}
