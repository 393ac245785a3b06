use super::prelude::*;

bitflags::bitflags! {
    #[derive(Debug, Copy, Clone, Default)]
    pub struct AnnotFlags: u32 {
        const INVISIBLE       = 1 << 0;
        const HIDDEN          = 1 << 1;
        const PRINT           = 1 << 2;
        const NO_ZOOM         = 1 << 3;
        const NO_ROTATE       = 1 << 4;
        const NO_VIEW         = 1 << 5;
        const READ_ONLY       = 1 << 6;
        const LOCKED          = 1 << 7;
        const TOGGLE_NO_VIEW  = 1 << 8;
        const LOCKED_CONTENTS = 1 << 9;
    }
}

/// Annotation view: the fields the appearance walk needs. The composer
/// keeps working on the raw dictionary.
#[derive(Debug)]
pub struct Annot {
    pub subtype: Name,
    pub rect: Option<Rectangle>,
    pub flags: AnnotFlags,
    /// `/AP` appearance dictionary, unresolved.
    pub appearance: Option<Primitive>,
    /// `/AS` selects a sub-state inside the appearance entries.
    pub appearance_state: Option<Name>,
}

impl Object for Annot {
    fn from_primitive(p: Primitive, resolve: &impl Resolve) -> Result<Self> {
        let dict = p.resolve(resolve)?.into_dictionary(resolve)?;
        dict.expect("Annot", "Type", "Annot", false)?;
        let rect = match dict.get("Rect") {
            Some(p) => Some(Rectangle::from_primitive(p.clone(), resolve)?),
            None => None,
        };
        let flags = match dict.get("F") {
            Some(p) => AnnotFlags::from_bits_truncate(p.clone().resolve(resolve)?.as_u32()?),
            None => AnnotFlags::default(),
        };
        Ok(Annot {
            subtype: try_opt!(dict.get("Subtype")).as_name()?.clone(),
            rect,
            flags,
            appearance: dict.get("AP").cloned(),
            appearance_state: match dict.get("AS") {
                Some(p) => Some(p.as_name()?.clone()),
                None => None,
            },
        })
    }
}

impl Annot {
    pub fn is_hidden(&self) -> bool {
        self.flags.contains(AnnotFlags::HIDDEN)
            || self.flags.contains(AnnotFlags::NO_VIEW)
    }

    /// Pick the normal appearance stream: `/AP /N`, descending into the
    /// `/AS`-selected entry when `/N` is a sub-dictionary of states.
    pub fn normal_appearance(&self, resolve: &impl Resolve) -> Result<Option<Primitive>> {
        let ap = match self.appearance {
            Some(ref p) => p.clone().resolve(resolve)?,
            None => return Ok(None),
        };
        let ap = ap.into_dictionary(resolve)?;
        let normal = match ap.get("N") {
            Some(p) => p.clone().resolve(resolve)?,
            None => return Ok(None),
        };
        match normal {
            p @ Primitive::Stream(_) => Ok(Some(p)),
            Primitive::Dictionary(states) => {
                let state = match self.appearance_state {
                    Some(ref name) => states.get(name.as_str()).cloned(),
                    None => states.values().next().cloned(),
                };
                match state {
                    Some(p) => Ok(Some(p.resolve(resolve)?)),
                    None => Ok(None),
                }
            }
            p => {
                warn!("/N appearance is a {}", p.get_debug_name());
                Ok(None)
            }
        }
    }
}
