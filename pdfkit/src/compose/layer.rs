//! Import a page of another document as a toggleable optional-content
//! layer.

use crate::clone::Cloner;
use crate::document::Document;
use crate::error::*;
use crate::matrix::Matrix;
use crate::object::{PlainRef, Resolve, Updater};
use crate::primitive::{Dictionary, PdfString, Primitive};

use std::io::Write;

use super::overlay::{
    add_xobject, content_stream, contents_array, materialize_resources, write_matrix_op,
};
use super::import_page_as_form;

#[derive(Debug, Clone)]
pub struct LayerOptions {
    /// Placement of the imported page on the target page.
    pub position: Matrix,
}

impl Default for LayerOptions {
    fn default() -> Self {
        LayerOptions {
            position: Matrix::identity(),
        }
    }
}

/// Draw page `src_page` of `src` onto page `target_page` of `target`
/// inside a marked-content sequence tagged with a new optional-content
/// group named `layer_name`. Returns the group's reference.
pub fn import_page_as_layer(
    target: &mut Document,
    src: &Document,
    src_page: u32,
    target_page: u32,
    layer_name: &str,
    options: &LayerOptions,
) -> Result<PlainRef> {
    let src_entry = src.get_page(src_page)?;
    let target_entry = target.get_page(target_page)?;

    let mut cloner = Cloner::new(src);
    let form = import_page_as_form(src, &src_entry, &mut cloner, target)?;

    let mut ocg = Dictionary::new();
    ocg.insert("Type", Primitive::name("OCG"));
    ocg.insert(
        "Name",
        Primitive::String(PdfString::from_str(layer_name)),
    );
    let ocg_ref = target.create_primitive(Primitive::Dictionary(ocg))?;

    let mut page = target
        .resolve(target_entry.page_ref)?
        .into_dictionary(target)?;
    materialize_resources(&mut page, &target_entry);
    let form_name = add_xobject(&mut page, target, "Layer", form)?;
    let prop_name = add_property(&mut page, target, ocg_ref)?;

    let mut data = Vec::new();
    writeln!(data, "q")?;
    writeln!(data, "/OC /{} BDC", prop_name)?;
    write_matrix_op(&mut data, options.position)?;
    writeln!(data, "/{} Do", form_name)?;
    writeln!(data, "EMC")?;
    writeln!(data, "Q")?;
    let stream = content_stream(target, data)?;

    let mut contents = contents_array(&mut page, target)?;
    contents.push(Primitive::Reference(stream));
    page.insert("Contents", Primitive::Array(contents));
    target.update_primitive(target_entry.page_ref, Primitive::Dictionary(page))?;

    register_group(target, ocg_ref)?;
    merge_source_oc_properties(target, src, &mut cloner)?;
    Ok(ocg_ref)
}

fn add_property(page: &mut Dictionary, doc: &Document, ocg: PlainRef) -> Result<String> {
    let mut resources = match page.remove("Resources") {
        Some(p) => p.resolve(doc)?.into_dictionary(doc)?,
        None => Dictionary::new(),
    };
    let mut properties = match resources.remove("Properties") {
        Some(p) => p.resolve(doc)?.into_dictionary(doc)?,
        None => Dictionary::new(),
    };
    let mut n = 0;
    let name = loop {
        let candidate = format!("oc{}", n);
        if !properties.contains_key(candidate.as_str()) {
            break candidate;
        }
        n += 1;
    };
    properties.insert(name.as_str(), Primitive::Reference(ocg));
    resources.insert("Properties", Primitive::Dictionary(properties));
    page.insert("Resources", Primitive::Dictionary(resources));
    Ok(name)
}

/// Register the group in `/OCProperties`: listed in `/OCGs`, ordered
/// and switched on in the default configuration.
fn register_group(doc: &mut Document, ocg: PlainRef) -> Result<()> {
    let mut catalog = doc.catalog()?;
    let mut ocp = match catalog.remove("OCProperties") {
        Some(p) => p.resolve(doc)?.into_dictionary(doc)?,
        None => Dictionary::new(),
    };
    push_ref(doc, &mut ocp, "OCGs", Primitive::Reference(ocg))?;

    let mut default_config = match ocp.remove("D") {
        Some(p) => p.resolve(doc)?.into_dictionary(doc)?,
        None => Dictionary::new(),
    };
    push_ref(doc, &mut default_config, "Order", Primitive::Reference(ocg))?;
    push_ref(doc, &mut default_config, "ON", Primitive::Reference(ocg))?;
    ocp.insert("D", Primitive::Dictionary(default_config));

    catalog.insert("OCProperties", Primitive::Dictionary(ocp));
    doc.update_catalog(catalog)
}

fn push_ref(
    doc: &Document,
    container: &mut Dictionary,
    key: &str,
    value: Primitive,
) -> Result<()> {
    let mut arr = match container.remove(key) {
        Some(p) => p.resolve(doc)?.into_array(doc).unwrap_or_default(),
        None => vec![],
    };
    arr.push(value);
    container.insert(key, Primitive::Array(arr));
    Ok(())
}

fn merge_source_oc_properties(
    target: &mut Document,
    src: &Document,
    cloner: &mut Cloner<'_, Document>,
) -> Result<()> {
    let src_catalog = src.catalog()?;
    let src_ocp = match src_catalog.get("OCProperties") {
        Some(p) => p.clone().resolve(src)?,
        None => return Ok(()),
    };
    let mut catalog = target.catalog()?;
    let dest_ocp = match catalog.remove("OCProperties") {
        Some(p) => p.resolve(target)?,
        None => Primitive::Null,
    };
    let merged = cloner.merge(&src_ocp, dest_ocp, target)?;
    catalog.insert("OCProperties", merged);
    target.update_catalog(catalog)
}
