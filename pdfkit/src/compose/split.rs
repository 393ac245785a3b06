//! Split a document into per-range output documents.

use crate::clone::Cloner;
use crate::document::Document;
use crate::error::*;
use crate::object::{Dest, PlainRef, Resolve, Updater};
use crate::primitive::{Dictionary, Primitive};

use super::materialized_page_dict;
use super::structure::rebuild_structure;

#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// Pages per output document.
    pub pages_per_document: usize,
}

impl Default for SplitOptions {
    fn default() -> Self {
        SplitOptions {
            pages_per_document: 1,
        }
    }
}

pub(crate) struct SplitAnnotClone {
    pub src_ref: Option<PlainRef>,
    pub dst_ref: PlainRef,
}

pub(crate) struct SplitPageClone {
    pub src_page: PlainRef,
    pub dst_page: PlainRef,
    pub annots: Vec<SplitAnnotClone>,
}

struct LinkFix {
    annot: PlainRef,
    dest: Option<Primitive>,
    action: Option<Primitive>,
}

/// Partition `src` into consecutive page ranges, producing one document
/// per range. Annotations are cloned individually so link destinations
/// can be rewritten; links across outputs are cleared to null.
pub fn split(src: &Document, options: &SplitOptions) -> Result<Vec<Document>> {
    let per_doc = options.pages_per_document.max(1);
    let pages = src.pages()?;
    let mut outputs = Vec::new();

    for chunk in pages.chunks(per_doc) {
        let mut dst = Document::new();
        let mut cloner = Cloner::new(src);
        let mut cloned_pages = Vec::new();
        let mut link_fixes = Vec::new();

        // reserve destination numbers first so references between pages
        // of the same range resolve to their clones
        let promised: Vec<PlainRef> = chunk
            .iter()
            .map(|entry| {
                let r = dst.promise();
                cloner.insert_mapping(entry.page_ref, r);
                r
            })
            .collect();

        for (entry, &dst_page) in chunk.iter().zip(&promised) {
            let page_dict = materialized_page_dict(src, entry)?;
            let annots_src = match page_dict.get("Annots") {
                Some(p) => p.clone().resolve(src)?.into_array(src).unwrap_or_default(),
                None => vec![],
            };

            let mut cloned = cloner.clone_dict_filtered(
                &page_dict,
                &["Annots", "StructParents"],
                &mut dst,
            )?;

            let mut annots = Vec::new();
            let mut annot_refs = Vec::new();
            for annot in annots_src {
                let (src_ref, annot_dict) = match annot {
                    Primitive::Reference(r) => {
                        (Some(r), src.resolve(r)?.into_dictionary(src)?)
                    }
                    Primitive::Dictionary(d) => (None, d),
                    p => {
                        warn!("annotation is a {}", p.get_debug_name());
                        continue;
                    }
                };
                let dst_ref = dst.promise();
                if let Some(r) = src_ref {
                    cloner.insert_mapping(r, dst_ref);
                }
                let mut body = cloner.clone_dict_filtered(
                    &annot_dict,
                    &["P", "Parent", "Dest", "A", "StructParent"],
                    &mut dst,
                )?;
                body.insert("P", Primitive::Reference(dst_page));
                dst.update_primitive(dst_ref, Primitive::Dictionary(body))?;

                link_fixes.push(LinkFix {
                    annot: dst_ref,
                    dest: annot_dict.get("Dest").cloned(),
                    action: annot_dict.get("A").cloned(),
                });
                annots.push(SplitAnnotClone { src_ref, dst_ref });
                annot_refs.push(Primitive::Reference(dst_ref));
            }
            if !annot_refs.is_empty() {
                cloned.insert("Annots", Primitive::Array(annot_refs));
            }

            dst.update_primitive(dst_page, Primitive::Dictionary(cloned))?;
            dst.append_page_ref(dst_page)?;
            cloned_pages.push(SplitPageClone {
                src_page: entry.page_ref,
                dst_page,
                annots,
            });
        }

        for fix in link_fixes {
            apply_link_fix(src, &mut dst, &mut cloner, fix)?;
        }

        rebuild_structure(src, &mut dst, &mut cloner, &cloned_pages)?;
        outputs.push(dst);
    }
    Ok(outputs)
}

/// Rewrite `/Dest` and GoTo `/A` entries: targets inside the output map
/// to their clones, targets outside clear to null.
fn apply_link_fix(
    src: &Document,
    dst: &mut Document,
    cloner: &mut Cloner<'_, Document>,
    fix: LinkFix,
) -> Result<()> {
    let mut annot = dst.resolve(fix.annot)?.into_dictionary(dst)?;
    let mut changed = false;

    if let Some(dest) = fix.dest {
        annot.insert("Dest", rewrite_destination(&dest, src, cloner)?);
        changed = true;
    }
    if let Some(action) = fix.action {
        let action = action.resolve(src)?;
        let rewritten = match action {
            Primitive::Dictionary(ref a)
                if a.get("S").and_then(|s| s.as_name().ok()).map_or(false, |s| s == "GoTo") =>
            {
                let mut out = Dictionary::new();
                for (key, value) in a.iter() {
                    match key.as_str() {
                        "D" => {
                            out.insert("D", rewrite_destination(value, src, cloner)?);
                        }
                        "Next" => (), // chained actions may leave the range; dropped
                        _ => {
                            let v = cloner.clone_primitive(value, dst)?;
                            out.insert(dst.intern(key.as_str()), v);
                        }
                    }
                }
                Primitive::Dictionary(out)
            }
            ref other => cloner.clone_primitive(other, dst)?,
        };
        annot.insert("A", rewritten);
        changed = true;
    }

    if changed {
        dst.update_primitive(fix.annot, Primitive::Dictionary(annot))?;
    }
    Ok(())
}

fn rewrite_destination(
    dest: &Primitive,
    src: &Document,
    cloner: &Cloner<'_, Document>,
) -> Result<Primitive> {
    let parsed = match Dest::from_primitive_opt(dest.clone(), src)? {
        Some(d) => d,
        None => return Ok(Primitive::Null),
    };
    let mapped = parsed.page.and_then(|r| cloner.mapped(r));
    Ok(parsed.to_primitive_with_page(mapped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_splits_one_page_per_output() {
        assert_eq!(SplitOptions::default().pages_per_document, 1);
    }
}
