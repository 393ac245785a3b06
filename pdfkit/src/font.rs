//! Font metrics view.
//!
//! Glyph loading and rasterization belong to an external collaborator;
//! the interpreter only needs what text advancement requires: the byte
//! length of a character code, the displacement vector per code, and for
//! Type 3 fonts the character procedures, font matrix and resources.

use crate::error::*;
use crate::matrix::Matrix;
use crate::object::{Object, Resolve};
use crate::primitive::{Dictionary, Name, Primitive};

use std::collections::HashMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FontType {
    Type0,
    Type1,
    TrueType,
    Type3,
    MmType1,
    Other,
}

impl FontType {
    fn from_name(name: &str) -> FontType {
        match name {
            "Type0" => FontType::Type0,
            "Type1" => FontType::Type1,
            "TrueType" => FontType::TrueType,
            "Type3" => FontType::Type3,
            "MMType1" => FontType::MmType1,
            _ => FontType::Other,
        }
    }
}

#[derive(Debug)]
pub struct Font {
    pub subtype: FontType,
    pub name: Option<Name>,
    /// Bytes per character code (1 for simple fonts, 2 for Identity-coded
    /// composite fonts).
    pub code_len: usize,
    /// Writing mode 1 (vertical) per the encoding name suffix.
    pub vertical: bool,
    pub font_matrix: Matrix,
    /// Type 3 only: glyph name -> character procedure stream.
    pub char_procs: Option<Dictionary>,
    /// Type 3 only: code -> glyph name from /Encoding /Differences.
    pub encoding_map: HashMap<u32, Name>,
    /// Type 3 only: the font's own resource dictionary.
    pub resources: Option<Primitive>,
    /// Caller-attached unicode mapping (ToUnicode CMaps are decoded by
    /// the external parser).
    pub unicode_map: Option<HashMap<u32, String>>,

    first_char: u32,
    widths: Vec<f32>,
    cid_widths: HashMap<u32, f32>,
    default_width: f32,
    missing_width: f32,
}

impl Font {
    pub fn from_dict(mut dict: Dictionary, resolve: &impl Resolve) -> Result<Font> {
        dict.expect("Font", "Type", "Font", false)?;
        let subtype = match dict.get("Subtype") {
            Some(p) => FontType::from_name(p.as_name()?),
            None => FontType::Other,
        };
        let name = match dict.get("BaseFont").or_else(|| dict.get("Name")) {
            Some(p) => Some(p.clone().resolve(resolve)?.into_name()?),
            None => None,
        };

        let mut font = Font {
            subtype,
            name,
            code_len: 1,
            vertical: false,
            font_matrix: Matrix::scale(0.001, 0.001),
            char_procs: None,
            encoding_map: HashMap::new(),
            resources: None,
            unicode_map: None,
            first_char: 0,
            widths: Vec::new(),
            cid_widths: HashMap::new(),
            default_width: 1000.,
            missing_width: 0.,
        };

        match subtype {
            FontType::Type0 => {
                font.code_len = 2;
                if let Some(enc) = dict.get("Encoding") {
                    if let Ok(enc) = enc.as_name() {
                        font.vertical = enc.as_str().ends_with("-V");
                    }
                }
                let descendants = match dict.remove("DescendantFonts") {
                    Some(p) => p.into_array(resolve)?,
                    None => vec![],
                };
                if let Some(descendant) = descendants.into_iter().next() {
                    let desc = descendant.into_dictionary(resolve)?;
                    if let Some(dw) = desc.get("DW") {
                        font.default_width = dw.clone().resolve(resolve)?.as_number()?;
                    }
                    if let Some(w) = desc.get("W") {
                        font.cid_widths = parse_cid_widths(w.clone(), resolve)?;
                    }
                }
            }
            FontType::Type3 => {
                font.font_matrix = match dict.get("FontMatrix") {
                    Some(p) => Matrix::from_primitive(p.clone(), resolve)?,
                    None => Matrix::scale(0.001, 0.001),
                };
                font.char_procs = match dict.remove("CharProcs") {
                    Some(p) => Some(p.into_dictionary(resolve)?),
                    None => None,
                };
                font.resources = dict.remove("Resources");
                font.encoding_map = parse_differences(&dict, resolve)?;
                read_simple_widths(&mut font, &dict, resolve)?;
            }
            _ => {
                read_simple_widths(&mut font, &dict, resolve)?;
            }
        }
        Ok(font)
    }

    /// Split the next character code off an encoded string.
    pub fn next_code<'a>(&self, bytes: &'a [u8]) -> Option<(u32, &'a [u8])> {
        if bytes.is_empty() {
            return None;
        }
        let n = self.code_len.clamp(1, 4).min(bytes.len());
        let mut code: u32 = 0;
        for &b in &bytes[..n] {
            code = code << 8 | b as u32;
        }
        Some((code, &bytes[n..]))
    }

    /// Horizontal (or vertical) displacement of `code` in text space,
    /// already divided by the glyph-space unit.
    pub fn displacement(&self, code: u32) -> (f32, f32) {
        let w = self.glyph_width(code);
        let (x, y) = match self.subtype {
            // Type 3 widths are in glyph space; the font matrix maps them
            FontType::Type3 => {
                let (x, y) = self.font_matrix.apply(w, 0.);
                let (ox, oy) = self.font_matrix.apply(0., 0.);
                (x - ox, y - oy)
            }
            _ => (w / 1000., 0.),
        };
        if self.vertical {
            // vertical writing advances downward
            (0., -x.max(y.abs()))
        } else {
            (x, y)
        }
    }

    fn glyph_width(&self, code: u32) -> f32 {
        match self.subtype {
            FontType::Type0 => self
                .cid_widths
                .get(&code)
                .copied()
                .unwrap_or(self.default_width),
            _ => {
                if code >= self.first_char {
                    self.widths
                        .get((code - self.first_char) as usize)
                        .copied()
                        .unwrap_or(self.missing_width)
                } else {
                    self.missing_width
                }
            }
        }
    }

    /// Nominal horizontal width in text space, for vertical-mode
    /// position vectors.
    pub fn nominal_width(&self, code: u32) -> f32 {
        self.glyph_width(code) / 1000.
    }

    pub fn unicode(&self, code: u32) -> Option<&str> {
        self.unicode_map
            .as_ref()
            .and_then(|m| m.get(&code))
            .map(|s| s.as_str())
    }

    /// Type 3: look up the character procedure stream for `code`.
    pub fn char_proc(&self, code: u32) -> Option<&Primitive> {
        let procs = self.char_procs.as_ref()?;
        let glyph_name = self.encoding_map.get(&code)?;
        procs.get(glyph_name.as_str())
    }

    pub fn is_type3(&self) -> bool {
        self.subtype == FontType::Type3
    }
}

fn read_simple_widths(font: &mut Font, dict: &Dictionary, resolve: &impl Resolve) -> Result<()> {
    if let Some(fc) = dict.get("FirstChar") {
        font.first_char = fc.clone().resolve(resolve)?.as_u32()?;
    }
    if let Some(w) = dict.get("Widths") {
        font.widths = w
            .clone()
            .into_array(resolve)?
            .into_iter()
            .map(|p| p.resolve(resolve)?.as_number())
            .collect::<Result<_>>()?;
    }
    if let Some(fd) = dict.get("FontDescriptor") {
        let fd = fd.clone().into_dictionary(resolve)?;
        if let Some(mw) = fd.get("MissingWidth") {
            font.missing_width = mw.clone().resolve(resolve)?.as_number()?;
        }
    }
    Ok(())
}

fn parse_differences(dict: &Dictionary, resolve: &impl Resolve) -> Result<HashMap<u32, Name>> {
    let mut map = HashMap::new();
    let enc = match dict.get("Encoding") {
        Some(p) => p.clone().resolve(resolve)?,
        None => return Ok(map),
    };
    let enc = match enc {
        Primitive::Dictionary(d) => d,
        _ => return Ok(map),
    };
    if let Some(diff) = enc.get("Differences") {
        let mut code = 0u32;
        for item in diff.clone().into_array(resolve)? {
            match item {
                Primitive::Integer(n) => code = n.max(0) as u32,
                Primitive::Name(name) => {
                    map.insert(code, name);
                    code += 1;
                }
                p => warn!("unexpected {} in /Differences", p.get_debug_name()),
            }
        }
    }
    Ok(map)
}

/// `/W` syntax: `c [w1 w2 …]` assigns consecutive widths from `c`;
/// `c_first c_last w` assigns one width to a range.
fn parse_cid_widths(w: Primitive, resolve: &impl Resolve) -> Result<HashMap<u32, f32>> {
    let mut widths = HashMap::new();
    let items = w.into_array(resolve)?;
    let mut iter = items.into_iter();
    while let Some(first) = iter.next() {
        let first = first.resolve(resolve)?.as_u32()?;
        match try_opt!(iter.next()).resolve(resolve)? {
            Primitive::Array(ws) => {
                for (i, w) in ws.into_iter().enumerate() {
                    widths.insert(first + i as u32, w.as_number()?);
                }
            }
            last => {
                let last = last.as_u32()?;
                let w = try_opt!(iter.next()).resolve(resolve)?.as_number()?;
                for code in first..=last {
                    widths.insert(code, w);
                }
            }
        }
    }
    Ok(widths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::NoResolve;

    fn simple_font(widths: Vec<f32>, first_char: i32) -> Font {
        let mut dict = Dictionary::new();
        dict.insert("Type", Primitive::name("Font"));
        dict.insert("Subtype", Primitive::name("Type1"));
        dict.insert("BaseFont", Primitive::name("Helvetica"));
        dict.insert("FirstChar", Primitive::Integer(first_char));
        dict.insert(
            "Widths",
            Primitive::Array(widths.into_iter().map(Primitive::Number).collect()),
        );
        Font::from_dict(dict, &NoResolve).unwrap()
    }

    #[test]
    fn simple_widths() {
        let font = simple_font(vec![500., 600.], 65);
        assert_eq!(font.displacement(65), (0.5, 0.));
        assert_eq!(font.displacement(66), (0.6, 0.));
        // out of range falls back to missing width
        assert_eq!(font.displacement(64), (0., 0.));
        assert_eq!(font.code_len, 1);
    }

    #[test]
    fn cid_width_ranges() {
        let w = Primitive::Array(vec![
            Primitive::Integer(1),
            Primitive::Array(vec![Primitive::Number(400.), Primitive::Number(450.)]),
            Primitive::Integer(10),
            Primitive::Integer(12),
            Primitive::Number(250.),
        ]);
        let widths = parse_cid_widths(w, &NoResolve).unwrap();
        assert_eq!(widths[&1], 400.);
        assert_eq!(widths[&2], 450.);
        assert_eq!(widths[&11], 250.);
        assert_eq!(widths.get(&13), None);
    }

    #[test]
    fn composite_code_length() {
        let mut dict = Dictionary::new();
        dict.insert("Type", Primitive::name("Font"));
        dict.insert("Subtype", Primitive::name("Type0"));
        dict.insert("Encoding", Primitive::name("Identity-H"));
        let font = Font::from_dict(dict, &NoResolve).unwrap();
        assert_eq!(font.code_len, 2);
        let (code, rest) = font.next_code(&[0x01, 0x41, 0x02]).unwrap();
        assert_eq!(code, 0x0141);
        assert_eq!(rest, &[0x02]);
    }
}
