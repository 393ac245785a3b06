use super::prelude::*;
use crate::object::Stream;

/// External object invoked by `Do`.
#[derive(Debug)]
pub enum XObject {
    Form(FormXObject),
    Image(ImageXObject),
    Postscript(Stream),
}

impl Object for XObject {
    fn from_primitive(p: Primitive, resolve: &impl Resolve) -> Result<Self> {
        let stream = Stream::from_primitive(p, resolve)?;
        let subtype = try_opt!(stream.info.get("Subtype")).as_name()?.clone();
        Ok(match subtype.as_str() {
            "Form" => XObject::Form(FormXObject::from_stream(stream, resolve)?),
            "Image" => XObject::Image(ImageXObject::from_stream(stream, resolve)?),
            "PS" => XObject::Postscript(stream),
            other => err!(PdfError::WrongDictionaryType {
                expected: "Form, Image or PS".into(),
                found: other.into(),
            }),
        })
    }
}

/// A reusable content stream with its own coordinate system and
/// (optional) resources.
#[derive(Debug)]
pub struct FormXObject {
    pub stream: Stream,
    pub bbox: Rectangle,
    pub matrix: Matrix,
    pub resources: Option<Primitive>,
    /// `/Group` with `/S /Transparency` marks a transparency group.
    pub group: Option<Dictionary>,
    pub struct_parent: Option<i32>,
    pub struct_parents: Option<i32>,
}

impl FormXObject {
    pub fn from_stream(stream: Stream, resolve: &impl Resolve) -> Result<FormXObject> {
        let info = &stream.info;
        let bbox = Rectangle::from_primitive(try_opt!(info.get("BBox")).clone(), resolve)?;
        let matrix = match info.get("Matrix") {
            Some(p) => Matrix::from_primitive(p.clone(), resolve)?,
            None => Matrix::identity(),
        };
        let resources = info.get("Resources").cloned();
        let group = match info.get("Group") {
            Some(p) => Some(p.clone().resolve(resolve)?.into_dictionary(resolve)?),
            None => None,
        };
        let int = |key: &str| -> Option<i32> {
            info.get(key).and_then(|p| p.as_integer().ok())
        };
        Ok(FormXObject {
            struct_parent: int("StructParent"),
            struct_parents: int("StructParents"),
            stream,
            bbox,
            matrix,
            resources,
            group,
        })
    }

    pub fn is_transparency_group(&self) -> bool {
        self.group
            .as_ref()
            .and_then(|g| g.get("S"))
            .and_then(|s| s.as_name().ok())
            .map_or(false, |s| s == "Transparency")
    }
}

impl Object for FormXObject {
    fn from_primitive(p: Primitive, resolve: &impl Resolve) -> Result<Self> {
        let stream = Stream::from_primitive(p, resolve)?;
        stream.info.expect("FormXObject", "Subtype", "Form", false)?;
        FormXObject::from_stream(stream, resolve)
    }
}

/// Raster image; sample decoding is a collaborator's job, so only the
/// geometry needed for callbacks is parsed.
#[derive(Debug)]
pub struct ImageXObject {
    pub stream: Stream,
    pub width: u32,
    pub height: u32,
    pub image_mask: bool,
}

impl ImageXObject {
    pub fn from_stream(stream: Stream, resolve: &impl Resolve) -> Result<ImageXObject> {
        let info = &stream.info;
        let width = try_opt!(info.get("Width")).clone().resolve(resolve)?.as_u32()?;
        let height = try_opt!(info.get("Height")).clone().resolve(resolve)?.as_u32()?;
        let image_mask = match info.get("ImageMask") {
            Some(p) => p.clone().resolve(resolve)?.as_bool()?,
            None => false,
        };
        Ok(ImageXObject {
            stream,
            width,
            height,
            image_mask,
        })
    }
}
