use super::prelude::*;
use crate::object::Stream;

/// `/Pattern` resource: a tiling pattern carries its own content stream,
/// a shading pattern only a shading dictionary.
#[derive(Debug)]
pub enum Pattern {
    Tiling(TilingPattern),
    Shading(ShadingPattern),
}

impl Object for Pattern {
    fn from_primitive(p: Primitive, resolve: &impl Resolve) -> Result<Self> {
        let p = p.resolve(resolve)?;
        let dict = match p {
            Primitive::Stream(ref s) => &s.info,
            Primitive::Dictionary(ref d) => d,
            ref p => err!(PdfError::UnexpectedPrimitive {
                expected: "Dictionary or Stream",
                found: p.get_debug_name(),
            }),
        };
        let pattern_type = match dict.get("PatternType") {
            Some(p) => p.as_integer()?,
            None => 1,
        };
        match pattern_type {
            1 => Ok(Pattern::Tiling(TilingPattern::from_primitive(p, resolve)?)),
            2 => Ok(Pattern::Shading(ShadingPattern::from_primitive(p, resolve)?)),
            n => bail!("unknown /PatternType {}", n),
        }
    }
}

#[derive(Debug)]
pub struct TilingPattern {
    pub stream: Stream,
    pub paint_type: i32,
    pub bbox: Rectangle,
    pub x_step: f32,
    pub y_step: f32,
    pub resources: Option<Primitive>,
    pub matrix: Matrix,
}

impl Object for TilingPattern {
    fn from_primitive(p: Primitive, resolve: &impl Resolve) -> Result<Self> {
        let stream = Stream::from_primitive(p, resolve)?;
        let info = &stream.info;
        let bbox = Rectangle::from_primitive(try_opt!(info.get("BBox")).clone(), resolve)?;
        let number = |key: &str, default: f32| -> Result<f32> {
            match info.get(key) {
                Some(p) => p.clone().resolve(resolve)?.as_number(),
                None => Ok(default),
            }
        };
        let matrix = match info.get("Matrix") {
            Some(p) => Matrix::from_primitive(p.clone(), resolve)?,
            None => Matrix::identity(),
        };
        Ok(TilingPattern {
            paint_type: match info.get("PaintType") {
                Some(p) => p.as_integer()?,
                None => 1,
            },
            x_step: number("XStep", bbox.width())?,
            y_step: number("YStep", bbox.height())?,
            resources: info.get("Resources").cloned(),
            bbox,
            matrix,
            stream,
        })
    }
}

#[derive(Debug)]
pub struct ShadingPattern {
    pub shading: Primitive,
    pub matrix: Matrix,
}

impl Object for ShadingPattern {
    fn from_primitive(p: Primitive, resolve: &impl Resolve) -> Result<Self> {
        let dict = p.resolve(resolve)?.into_dictionary(resolve)?;
        let matrix = match dict.get("Matrix") {
            Some(p) => Matrix::from_primitive(p.clone(), resolve)?,
            None => Matrix::identity(),
        };
        Ok(ShadingPattern {
            shading: try_opt!(dict.get("Shading")).clone(),
            matrix,
        })
    }
}
