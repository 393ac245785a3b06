//! Integration tests for the merge / split / overlay / layer
//! composers, over programmatically built documents.

use pdfkit::compose::{
    append, import_page_as_layer, merge, overlay, split, AcroFormMode, LayerOptions, MergeOptions,
    OverlayMode, OverlayOptions, OverlaySpec, SplitOptions,
};
use pdfkit::document::Document;
use pdfkit::error::PdfError;
use pdfkit::object::{NumberTree, Object, PlainRef, Resolve, Updater};
use pdfkit::primitive::{Dictionary, PdfStream, PdfString, Primitive};

fn media_box(w: i32, h: i32) -> Primitive {
    Primitive::Array(vec![
        Primitive::Integer(0),
        Primitive::Integer(0),
        Primitive::Integer(w),
        Primitive::Integer(h),
    ])
}

/// `n` pages; each page carries its index in a private key so ordering
/// is observable after composition.
fn doc_with_pages(n: usize, width: i32) -> Document {
    let mut doc = Document::new();
    for i in 0..n {
        let mut page = Dictionary::new();
        page.insert("MediaBox", media_box(width, 792));
        page.insert("PieceInfo", Primitive::Integer(i as i32));
        doc.add_page(page).unwrap();
    }
    doc
}

fn page_dict(doc: &Document, n: u32) -> Dictionary {
    let entry = doc.get_page(n).unwrap();
    doc.resolve(entry.page_ref)
        .unwrap()
        .into_dictionary(doc)
        .unwrap()
}

fn page_marker(doc: &Document, n: u32) -> i32 {
    page_dict(doc, n)["PieceInfo"].as_integer().unwrap()
}

fn struct_root(doc: &Document) -> Dictionary {
    doc.catalog()
        .unwrap()
        .get("StructTreeRoot")
        .expect("struct tree root")
        .clone()
        .resolve(doc)
        .unwrap()
        .into_dictionary(doc)
        .unwrap()
}

/// One structure element per page, each with a parent-tree entry, and
/// the declared next key.
fn add_struct_tree(doc: &mut Document, next_key: i32) {
    let pages = doc.pages().unwrap();
    let root_ref = doc.promise();

    let mut kids = Vec::new();
    let mut nums = Vec::new();
    for (i, entry) in pages.iter().enumerate() {
        let mut elem = Dictionary::new();
        elem.insert("S", Primitive::name("P"));
        elem.insert("P", Primitive::Reference(root_ref));
        elem.insert("Pg", Primitive::Reference(entry.page_ref));
        elem.insert("K", Primitive::Integer(0));
        elem.insert(
            "ID",
            Primitive::String(PdfString::from_str(&format!("elem{}", i))),
        );
        let elem_ref = doc.create_primitive(Primitive::Dictionary(elem)).unwrap();
        kids.push(Primitive::Reference(elem_ref));
        nums.push((
            i as i32,
            Primitive::Array(vec![Primitive::Reference(elem_ref)]),
        ));

        let mut page = doc
            .resolve(entry.page_ref)
            .unwrap()
            .into_dictionary(doc)
            .unwrap();
        page.insert("StructParents", Primitive::Integer(i as i32));
        doc.update_primitive(entry.page_ref, Primitive::Dictionary(page))
            .unwrap();
    }

    let tree_ref = doc
        .create_primitive(Primitive::Dictionary(NumberTree::build_leaf(nums)))
        .unwrap();
    let mut root = Dictionary::new();
    root.insert("Type", Primitive::name("StructTreeRoot"));
    root.insert("K", Primitive::Array(kids));
    root.insert("ParentTree", Primitive::Reference(tree_ref));
    root.insert("ParentTreeNextKey", Primitive::Integer(next_key));
    doc.update_primitive(root_ref, Primitive::Dictionary(root))
        .unwrap();

    let mut catalog = doc.catalog().unwrap();
    catalog.insert("StructTreeRoot", Primitive::Reference(root_ref));
    doc.update_catalog(catalog).unwrap();
}

fn add_link(doc: &mut Document, on_page: u32, target: PlainRef) -> PlainRef {
    let entry = doc.get_page(on_page).unwrap();
    let mut annot = Dictionary::new();
    annot.insert("Type", Primitive::name("Annot"));
    annot.insert("Subtype", Primitive::name("Link"));
    annot.insert("Rect", media_box(10, 10));
    annot.insert(
        "Dest",
        Primitive::Array(vec![Primitive::Reference(target), Primitive::name("Fit")]),
    );
    annot.insert("P", Primitive::Reference(entry.page_ref));
    let annot_ref = doc.create_primitive(Primitive::Dictionary(annot)).unwrap();

    let mut page = doc
        .resolve(entry.page_ref)
        .unwrap()
        .into_dictionary(doc)
        .unwrap();
    let mut annots = match page.remove("Annots") {
        Some(p) => p.into_array(doc).unwrap(),
        None => vec![],
    };
    annots.push(Primitive::Reference(annot_ref));
    page.insert("Annots", Primitive::Array(annots));
    doc.update_primitive(entry.page_ref, Primitive::Dictionary(page))
        .unwrap();
    annot_ref
}

#[test]
fn merge_concatenates_pages_in_order() {
    let a = doc_with_pages(3, 100);
    let b = doc_with_pages(3, 200);
    let merged = merge(&[&a, &b], &MergeOptions::default()).unwrap();
    assert_eq!(merged.page_count().unwrap(), 6);
    for i in 0..3 {
        assert_eq!(page_marker(&merged, i), i as i32);
        assert_eq!(page_marker(&merged, i + 3), i as i32);
    }
    // pages of the second source keep their own media box
    let mb = page_dict(&merged, 4)["MediaBox"].as_array().unwrap()[2]
        .as_integer()
        .unwrap();
    assert_eq!(mb, 200);
}

#[test]
fn merge_offsets_parent_tree_keys() {
    let mut a = doc_with_pages(3, 100);
    add_struct_tree(&mut a, 5);
    let mut b = doc_with_pages(3, 100);
    add_struct_tree(&mut b, 7);

    let merged = merge(&[&a, &b], &MergeOptions::default()).unwrap();
    let root = struct_root(&merged);
    let next = root["ParentTreeNextKey"].as_integer().unwrap();
    assert!(next >= 12, "ParentTreeNextKey is {}", next);

    // pages of the second source had their keys shifted by the first
    // source's next key
    let sp = page_dict(&merged, 3)["StructParents"].as_integer().unwrap();
    assert_eq!(sp, 5);

    // every parent tree key is distinct
    let tree = NumberTree::from_primitive(root["ParentTree"].clone(), &merged).unwrap();
    let keys: Vec<i32> = tree
        .entries(&merged)
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    let mut deduped = keys.clone();
    deduped.dedup();
    assert_eq!(keys, deduped);
}

#[test]
fn merge_stitches_structure_under_a_document_node() {
    let mut a = doc_with_pages(1, 100);
    add_struct_tree(&mut a, 1);
    let merged = merge(&[&a], &MergeOptions::default()).unwrap();

    let root = struct_root(&merged);
    let kids = root["K"].as_array().unwrap();
    assert_eq!(kids.len(), 1);
    let doc_node = merged
        .resolve(kids[0].as_reference().unwrap())
        .unwrap()
        .into_dictionary(&merged)
        .unwrap();
    assert_eq!(doc_node["S"].as_name().unwrap().as_str(), "Document");
    // the moved element's parent points at the new node
    let elem_ref = doc_node["K"].as_array().unwrap()[0].as_reference().unwrap();
    let elem = merged
        .resolve(elem_ref)
        .unwrap()
        .into_dictionary(&merged)
        .unwrap();
    assert_eq!(
        elem["P"].as_reference().unwrap(),
        kids[0].as_reference().unwrap()
    );
}

#[test]
fn merge_rejects_dynamic_xfa() {
    let mut src = doc_with_pages(1, 100);
    let mut form = Dictionary::new();
    form.insert("XFA", Primitive::Array(vec![]));
    let mut catalog = src.catalog().unwrap();
    catalog.insert("AcroForm", Primitive::Dictionary(form));
    src.update_catalog(catalog).unwrap();

    let mut dst = Document::new();
    let err = append(&mut dst, &src, &MergeOptions::default()).unwrap_err();
    assert!(matches!(err, PdfError::DynamicXfaPresent));
}

fn doc_with_text_field(name: &str) -> Document {
    let mut doc = doc_with_pages(1, 100);
    let mut field = Dictionary::new();
    field.insert("FT", Primitive::name("Tx"));
    field.insert("T", Primitive::String(PdfString::from_str(name)));
    field.insert("Subtype", Primitive::name("Widget"));
    field.insert("Rect", media_box(50, 20));
    let field_ref = doc.create_primitive(Primitive::Dictionary(field)).unwrap();

    let mut form = Dictionary::new();
    form.insert(
        "Fields",
        Primitive::Array(vec![Primitive::Reference(field_ref)]),
    );
    let mut catalog = doc.catalog().unwrap();
    catalog.insert("AcroForm", Primitive::Dictionary(form));
    doc.update_catalog(catalog).unwrap();
    doc
}

fn merged_form_fields(doc: &Document) -> Vec<Dictionary> {
    let catalog = doc.catalog().unwrap();
    let form = catalog
        .get("AcroForm")
        .unwrap()
        .clone()
        .resolve(doc)
        .unwrap()
        .into_dictionary(doc)
        .unwrap();
    form.get("Fields")
        .unwrap()
        .clone()
        .into_array(doc)
        .unwrap()
        .into_iter()
        .map(|f| f.resolve(doc).unwrap().into_dictionary(doc).unwrap())
        .collect()
}

#[test]
fn acroform_legacy_mode_renames_collisions() {
    let a = doc_with_text_field("Name");
    let b = doc_with_text_field("Name");
    let merged = merge(&[&a, &b], &MergeOptions::default()).unwrap();
    let fields = merged_form_fields(&merged);
    assert_eq!(fields.len(), 2);
    let names: Vec<String> = fields
        .iter()
        .map(|f| f["T"].as_string().unwrap().to_text().unwrap())
        .collect();
    assert_eq!(names[0], "Name");
    assert_eq!(names[1], "Name.2");
}

#[test]
fn acroform_join_mode_coalesces_text_widgets() {
    let a = doc_with_text_field("Name");
    let b = doc_with_text_field("Name");
    let merged = merge(
        &[&a, &b],
        &MergeOptions {
            acro_form_mode: AcroFormMode::Join,
        },
    )
    .unwrap();
    let fields = merged_form_fields(&merged);
    assert_eq!(fields.len(), 1);
    let kids = fields[0]["Kids"].as_array().unwrap();
    assert_eq!(kids.len(), 2);
    for kid in kids {
        let kid = merged
            .resolve(kid.as_reference().unwrap())
            .unwrap()
            .into_dictionary(&merged)
            .unwrap();
        // widgets lost their field name and point at the kept parent
        assert!(kid.get("T").is_none());
        assert!(kid.get("Parent").is_some());
    }
}

#[test]
fn split_partitions_page_counts() {
    let src = doc_with_pages(5, 100);
    let outputs = split(
        &src,
        &SplitOptions {
            pages_per_document: 2,
        },
    )
    .unwrap();
    let counts: Vec<u32> = outputs.iter().map(|d| d.page_count().unwrap()).collect();
    assert_eq!(counts, vec![2, 2, 1]);
    // concatenation of outputs preserves page order
    let markers: Vec<i32> = outputs
        .iter()
        .flat_map(|d| (0..d.page_count().unwrap()).map(move |i| page_marker(d, i)))
        .collect();
    assert_eq!(markers, vec![0, 1, 2, 3, 4]);
}

#[test]
fn split_default_is_one_page_per_output() {
    let src = doc_with_pages(3, 100);
    let outputs = split(&src, &SplitOptions::default()).unwrap();
    assert_eq!(outputs.len(), 3);
    let total: u32 = outputs.iter().map(|d| d.page_count().unwrap()).sum();
    assert_eq!(total, 3);
}

#[test]
fn split_clears_cross_output_links_and_keeps_local_ones() {
    let mut src = doc_with_pages(5, 100);
    let page0 = src.get_page(0).unwrap().page_ref;
    let page3 = src.get_page(3).unwrap().page_ref;
    // page 3 (1-based) links out to page 1 and within its range to page 4
    add_link(&mut src, 2, page0);
    add_link(&mut src, 2, page3);

    let outputs = split(
        &src,
        &SplitOptions {
            pages_per_document: 2,
        },
    )
    .unwrap();
    let second = &outputs[1];

    let page = page_dict(second, 0);
    let annots = page["Annots"].as_array().unwrap();
    assert_eq!(annots.len(), 2);

    let dest_of = |annot: &Primitive| -> Primitive {
        let annot = second
            .resolve(annot.as_reference().unwrap())
            .unwrap()
            .into_dictionary(second)
            .unwrap();
        annot["Dest"].clone()
    };

    // cross-output link cleared
    assert!(dest_of(&annots[0]).is_null());
    // intra-output link points at the local clone
    let local = dest_of(&annots[1]);
    let target = local.as_array().unwrap()[0].as_reference().unwrap();
    assert_eq!(target, second.get_page(1).unwrap().page_ref);
}

#[test]
fn split_rebuilds_the_structure_tree_per_output() {
    let mut src = doc_with_pages(2, 100);
    add_struct_tree(&mut src, 2);

    let outputs = split(&src, &SplitOptions::default()).unwrap();
    for (i, out) in outputs.iter().enumerate() {
        let root = struct_root(out);
        let kids = root["K"].as_array().unwrap();
        assert_eq!(kids.len(), 1, "output {} keeps one element", i);
        let elem = out
            .resolve(kids[0].as_reference().unwrap())
            .unwrap()
            .into_dictionary(out)
            .unwrap();
        // the kept element points at the local page clone
        assert_eq!(
            elem["Pg"].as_reference().unwrap(),
            out.get_page(0).unwrap().page_ref
        );
        assert_eq!(root["ParentTreeNextKey"].as_integer().unwrap(), 1);
        assert_eq!(
            page_dict(out, 0)["StructParents"].as_integer().unwrap(),
            0
        );
        // only this output's identifier survives
        let ids = root["IDTree"].as_dict().unwrap()["Names"].as_array().unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(
            ids[0].as_string().unwrap().to_text().unwrap(),
            format!("elem{}", i)
        );
    }
}

fn contents_len(doc: &Document, page: u32) -> usize {
    match page_dict(doc, page).get("Contents") {
        Some(Primitive::Array(items)) => items.len(),
        Some(_) => 1,
        None => 0,
    }
}

fn content_bytes(doc: &Document, page: u32) -> Vec<u8> {
    let dict = page_dict(doc, page);
    pdfkit::content::page_content_data(dict.get("Contents").unwrap(), doc).unwrap()
}

#[test]
fn overlay_centers_and_brackets_the_original_content() {
    let mut target = Document::new();
    let mut page = Dictionary::new();
    page.insert("MediaBox", media_box(100, 200));
    let stream = target
        .create_primitive(Primitive::Stream(PdfStream {
            info: Dictionary::new(),
            data: b"0 0 m 10 10 l S".to_vec(),
        }))
        .unwrap();
    page.insert("Contents", Primitive::Reference(stream));
    target.add_page(page).unwrap();

    let mut stamp = Document::new();
    let mut overlay_page = Dictionary::new();
    overlay_page.insert("MediaBox", media_box(40, 60));
    stamp.add_page(overlay_page).unwrap();

    let spec = OverlaySpec {
        default: Some(&stamp),
        ..OverlaySpec::default()
    };
    overlay(&mut target, &spec, &OverlayOptions::default()).unwrap();

    // foreground mode adds exactly two content streams
    assert_eq!(contents_len(&target, 0), 3);
    let bytes = content_bytes(&target, 0);
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("1.0 0.0 0.0 1.0 30.0 70.0 cm"), "{}", text);
    assert!(text.starts_with("q\n"), "{}", text);

    // a second pass grows the array by exactly two again
    overlay(&mut target, &spec, &OverlayOptions::default()).unwrap();
    assert_eq!(contents_len(&target, 0), 5);
}

#[test]
fn overlay_background_prepends_one_stream() {
    let mut target = doc_with_pages(1, 100);
    let stamp = doc_with_pages(1, 40);
    let spec = OverlaySpec {
        default: Some(&stamp),
        ..OverlaySpec::default()
    };
    overlay(
        &mut target,
        &spec,
        &OverlayOptions {
            mode: OverlayMode::Background,
            ..OverlayOptions::default()
        },
    )
    .unwrap();
    assert_eq!(contents_len(&target, 0), 1);
    let bytes = content_bytes(&target, 0);
    assert!(String::from_utf8_lossy(&bytes).contains("/OL0 Do"));
}

#[test]
fn overlay_all_pages_slot_cycles() {
    let mut target = doc_with_pages(4, 100);
    let stamp = doc_with_pages(2, 40);
    let spec = OverlaySpec {
        all_pages: Some(&stamp),
        ..OverlaySpec::default()
    };
    overlay(&mut target, &spec, &OverlayOptions::default()).unwrap();
    for i in 0..4 {
        assert_eq!(contents_len(&target, i), 2, "page {}", i);
    }
    // two distinct forms imported, reused across the four pages
    let r0 = page_dict(&target, 0)["Resources"].as_dict().unwrap()["XObject"]
        .as_dict()
        .unwrap()["OL0"]
        .as_reference()
        .unwrap();
    let r2 = page_dict(&target, 2)["Resources"].as_dict().unwrap()["XObject"]
        .as_dict()
        .unwrap()["OL0"]
        .as_reference()
        .unwrap();
    assert_eq!(r0, r2);
}

#[test]
fn layer_import_registers_an_optional_content_group() {
    let mut target = doc_with_pages(1, 100);
    let mut src = Document::new();
    let mut page = Dictionary::new();
    page.insert("MediaBox", media_box(50, 50));
    page.insert("Rotate", Primitive::Integer(90));
    src.add_page(page).unwrap();

    let ocg = import_page_as_layer(
        &mut target,
        &src,
        0,
        0,
        "Background grid",
        &LayerOptions::default(),
    )
    .unwrap();

    let catalog = target.catalog().unwrap();
    let ocp = catalog["OCProperties"].as_dict().unwrap();
    let ocgs = ocp["OCGs"].as_array().unwrap();
    assert_eq!(ocgs.len(), 1);
    assert_eq!(ocgs[0].as_reference().unwrap(), ocg);

    let bytes = content_bytes(&target, 0);
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("BDC"), "{}", text);
    assert!(text.contains("EMC"), "{}", text);

    // the imported form compensates the source rotation
    let page_dict_0 = page_dict(&target, 0);
    let xobjects = page_dict_0["Resources"].as_dict().unwrap()["XObject"]
        .as_dict()
        .unwrap();
    let form_ref = xobjects["Layer0"].as_reference().unwrap();
    let form = match target.resolve(form_ref).unwrap() {
        Primitive::Stream(s) => s,
        p => panic!("form is {:?}", p),
    };
    let matrix = form.info["Matrix"].as_array().unwrap();
    // a quarter turn: a == 0
    assert_eq!(matrix[0].as_number().unwrap(), 0.);
}

#[test]
fn merge_unions_name_trees_with_destination_precedence() {
    let mut a = doc_with_pages(1, 100);
    let mut names = Dictionary::new();
    let mut dests = Dictionary::new();
    dests.insert(
        "Names",
        Primitive::Array(vec![
            Primitive::String(PdfString::from_str("shared")),
            Primitive::Integer(1),
            Primitive::String(PdfString::from_str("only-a")),
            Primitive::Integer(2),
        ]),
    );
    names.insert("Dests", Primitive::Dictionary(dests));
    let mut catalog = a.catalog().unwrap();
    catalog.insert("Names", Primitive::Dictionary(names));
    a.update_catalog(catalog).unwrap();

    let mut b = doc_with_pages(1, 100);
    let mut names = Dictionary::new();
    let mut dests = Dictionary::new();
    dests.insert(
        "Names",
        Primitive::Array(vec![
            Primitive::String(PdfString::from_str("shared")),
            Primitive::Integer(9),
            Primitive::String(PdfString::from_str("only-b")),
            Primitive::Integer(3),
        ]),
    );
    names.insert("Dests", Primitive::Dictionary(dests));
    let mut catalog = b.catalog().unwrap();
    catalog.insert("Names", Primitive::Dictionary(names));
    b.update_catalog(catalog).unwrap();

    let merged = merge(&[&a, &b], &MergeOptions::default()).unwrap();
    let catalog = merged.catalog().unwrap();
    let names = catalog["Names"]
        .clone()
        .resolve(&merged)
        .unwrap()
        .into_dictionary(&merged)
        .unwrap();
    let tree = pdfkit::object::NameTree::from_primitive(names["Dests"].clone(), &merged).unwrap();
    let entries = tree.entries(&merged).unwrap();
    assert_eq!(entries.len(), 3);
    let shared = entries
        .iter()
        .find(|(k, _)| k.as_bytes() == b"shared")
        .unwrap();
    // first-merged wins: it is the destination when B arrives
    assert_eq!(shared.1.as_integer().unwrap(), 1);
}

#[test]
fn merge_deduplicates_output_intents() {
    let intent = |id: &str| -> Primitive {
        let mut d = Dictionary::new();
        d.insert("Type", Primitive::name("OutputIntent"));
        d.insert(
            "OutputConditionIdentifier",
            Primitive::String(PdfString::from_str(id)),
        );
        Primitive::Dictionary(d)
    };
    let with_intents = |ids: &[&str]| -> Document {
        let mut doc = doc_with_pages(1, 100);
        let mut catalog = doc.catalog().unwrap();
        catalog.insert(
            "OutputIntents",
            Primitive::Array(ids.iter().map(|id| intent(id)).collect()),
        );
        doc.update_catalog(catalog).unwrap();
        doc
    };
    let a = with_intents(&["FOGRA39", "Custom"]);
    let b = with_intents(&["FOGRA39", "Custom"]);
    let merged = merge(&[&a, &b], &MergeOptions::default()).unwrap();
    let intents = merged.catalog().unwrap()["OutputIntents"]
        .as_array()
        .unwrap()
        .len();
    // FOGRA39 deduplicated, Custom never is
    assert_eq!(intents, 3);
}

#[test]
fn merge_offsets_page_labels() {
    let mut a = doc_with_pages(2, 100);
    let mut style = Dictionary::new();
    style.insert("S", Primitive::name("r"));
    let labels = NumberTree::build_leaf(vec![(0, Primitive::Dictionary(style))]);
    let mut catalog = a.catalog().unwrap();
    catalog.insert("PageLabels", Primitive::Dictionary(labels));
    a.update_catalog(catalog).unwrap();

    let b = doc_with_pages(3, 100);
    let mut merged = Document::new();
    append(&mut merged, &a, &MergeOptions::default()).unwrap();
    append(&mut merged, &b, &MergeOptions::default()).unwrap();

    let catalog = merged.catalog().unwrap();
    let tree = NumberTree::from_primitive(catalog["PageLabels"].clone(), &merged).unwrap();
    let keys: Vec<i32> = tree
        .entries(&merged)
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    // A's range starts at 0; B (no labels) resets at its first page
    assert_eq!(keys, vec![0, 2]);
}
