use crate::error::*;
use crate::object::{Object, ObjectWrite, PlainRef, Resolve, Updater};

use indexmap::map::{self, IndexMap};
use itertools::Itertools;
use std::borrow::Borrow;
use std::fmt;
use std::io;
use std::ops::{Deref, Index};
use std::str;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum Primitive {
    Null,
    Integer(i32),
    Number(f32),
    Boolean(bool),
    String(PdfString),
    Stream(PdfStream),
    Dictionary(Dictionary),
    Array(Vec<Primitive>),
    Reference(PlainRef),
    Name(Name),
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Primitive::Null => write!(f, "null"),
            Primitive::Integer(i) => i.fmt(f),
            Primitive::Number(n) => n.fmt(f),
            Primitive::Boolean(b) => b.fmt(f),
            Primitive::String(ref s) => write!(f, "{:?}", s),
            Primitive::Stream(_) => write!(f, "stream"),
            Primitive::Dictionary(ref d) => d.fmt(f),
            Primitive::Array(ref arr) => write!(f, "[{}]", arr.iter().format(", ")),
            Primitive::Reference(r) => write!(f, "@{}", r.id),
            Primitive::Name(ref s) => write!(f, "/{}", s.as_str()),
        }
    }
}

/// Interned, case-sensitive short string. Cloning is cheap; dictionary keys
/// and name operands are all `Name`s.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(Arc<str>);

impl Name {
    pub fn new(s: &str) -> Name {
        Name(Arc::from(s))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
    pub(crate) fn shared(&self) -> Arc<str> {
        self.0.clone()
    }
    pub(crate) fn from_shared(s: Arc<str>) -> Name {
        Name(s)
    }
}
impl Deref for Name {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}
impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}
impl From<&str> for Name {
    fn from(s: &str) -> Name {
        Name::new(s)
    }
}
impl From<String> for Name {
    fn from(s: String) -> Name {
        Name(Arc::from(s))
    }
}
impl PartialEq<str> for Name {
    fn eq(&self, rhs: &str) -> bool {
        self.as_str() == rhs
    }
}
impl PartialEq<&str> for Name {
    fn eq(&self, rhs: &&str) -> bool {
        self.as_str() == *rhs
    }
}
impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "/{}", self.as_str())
    }
}
impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "/{}", self.as_str())
    }
}

impl Primitive {
    pub fn name(name: impl Into<Name>) -> Primitive {
        Primitive::Name(name.into())
    }
    pub fn array<O, T, I, U>(i: I, update: &mut U) -> Result<Primitive>
    where
        O: ObjectWrite,
        I: Iterator<Item = T>,
        T: Borrow<O>,
        U: Updater,
    {
        i.map(|t| t.borrow().to_primitive(update))
            .collect::<Result<_>>()
            .map(Primitive::Array)
    }
    pub fn serialize(&self, out: &mut impl io::Write) -> Result<()> {
        match self {
            Primitive::Null => write!(out, "null")?,
            Primitive::Integer(i) => write!(out, "{}", i)?,
            Primitive::Number(n) => write!(out, "{}", format_number(*n))?,
            Primitive::Boolean(b) => write!(out, "{}", b)?,
            Primitive::String(ref s) => s.serialize(out)?,
            Primitive::Stream(ref s) => s.serialize(out)?,
            Primitive::Dictionary(ref d) => d.serialize(out)?,
            Primitive::Array(ref arr) => {
                write!(out, "[")?;
                for (i, p) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(out, " ")?;
                    }
                    p.serialize(out)?;
                }
                write!(out, "]")?;
            }
            Primitive::Reference(r) => write!(out, "{} {} R", r.id, r.gen)?,
            Primitive::Name(ref s) => serialize_name(s.as_str(), out)?,
        }
        Ok(())
    }
}

pub fn serialize_name(s: &str, out: &mut impl io::Write) -> Result<()> {
    write!(out, "/")?;
    for &b in s.as_bytes() {
        match b {
            b'\0'..=b' ' | b'/' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'%'
            | b'#' | 0x7f..=0xff => write!(out, "#{:02x}", b)?,
            _ => out.write_all(&[b])?,
        }
    }
    Ok(())
}

/// Base-10 fixed-point rendering for generated content streams. Trailing
/// fraction zeros are stripped, but at least one fraction digit survives so
/// a real never reads back as an integer.
pub fn format_number(x: f32) -> String {
    let mut s = format!("{:.4}", x);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.push('0');
    }
    s
}

/// Insertion-ordered mapping from `Name` to `Primitive`. Entry iteration
/// yields keys in the order they were first inserted.
#[derive(Default, Clone)]
pub struct Dictionary {
    dict: IndexMap<Name, Primitive>,
}
impl Dictionary {
    pub fn new() -> Dictionary {
        Dictionary {
            dict: IndexMap::new(),
        }
    }
    pub fn len(&self) -> usize {
        self.dict.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn get(&self, key: &str) -> Option<&Primitive> {
        self.dict.get(key)
    }
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Primitive> {
        self.dict.get_mut(key)
    }
    pub fn contains_key(&self, key: &str) -> bool {
        self.dict.contains_key(key)
    }
    /// Replaces any existing entry for `key`, returning the old value.
    pub fn insert(&mut self, key: impl Into<Name>, val: impl Into<Primitive>) -> Option<Primitive> {
        self.dict.insert(key.into(), val.into())
    }
    pub fn iter(&self) -> map::Iter<Name, Primitive> {
        self.dict.iter()
    }
    pub fn keys(&self) -> map::Keys<Name, Primitive> {
        self.dict.keys()
    }
    pub fn values(&self) -> map::Values<Name, Primitive> {
        self.dict.values()
    }
    pub fn values_mut(&mut self) -> map::ValuesMut<Name, Primitive> {
        self.dict.values_mut()
    }
    /// Removes while preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<Primitive> {
        self.dict.shift_remove(key)
    }
    /// like remove, but takes the name of the calling type and returns `PdfError::MissingEntry` if the entry is not found
    pub fn require(&mut self, typ: &'static str, key: &str) -> Result<Primitive> {
        self.remove(key).ok_or(PdfError::MissingEntry {
            typ,
            field: key.into(),
        })
    }
    /// assert that the given key/value pair is in the dictionary (`required=true`),
    /// or the key is not present at all (`required=false`)
    pub fn expect(&self, typ: &'static str, key: &str, value: &str, required: bool) -> Result<()> {
        match self.dict.get(key) {
            Some(ty) => {
                let ty = ty.as_name()?;
                if ty != value {
                    Err(PdfError::WrongDictionaryType {
                        expected: value.into(),
                        found: ty.as_str().into(),
                    })
                } else {
                    Ok(())
                }
            }
            None if required => Err(PdfError::MissingEntry {
                typ,
                field: key.into(),
            }),
            None => Ok(()),
        }
    }
    fn serialize(&self, out: &mut impl io::Write) -> Result<()> {
        write!(out, "<<")?;
        for (key, val) in self.iter() {
            serialize_name(key.as_str(), out)?;
            write!(out, " ")?;
            val.serialize(out)?;
        }
        write!(out, ">>")?;
        Ok(())
    }
}
impl Deref for Dictionary {
    type Target = IndexMap<Name, Primitive>;
    fn deref(&self) -> &IndexMap<Name, Primitive> {
        &self.dict
    }
}
impl fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{{")?;
        for (k, v) in self {
            writeln!(f, "{:>15}: {}", k.as_str(), v)?;
        }
        write!(f, "}}")
    }
}
impl fmt::Display for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<{}>",
            self.iter()
                .format_with(", ", |(k, v), f| f(&format_args!("{}={}", k.as_str(), v)))
        )
    }
}
impl<'a> Index<&'a str> for Dictionary {
    type Output = Primitive;
    fn index(&self, idx: &'a str) -> &Primitive {
        self.dict.index(idx)
    }
}
impl IntoIterator for Dictionary {
    type Item = (Name, Primitive);
    type IntoIter = map::IntoIter<Name, Primitive>;
    fn into_iter(self) -> Self::IntoIter {
        self.dict.into_iter()
    }
}
impl<'a> IntoIterator for &'a Dictionary {
    type Item = (&'a Name, &'a Primitive);
    type IntoIter = map::Iter<'a, Name, Primitive>;
    fn into_iter(self) -> Self::IntoIter {
        self.dict.iter()
    }
}
impl FromIterator<(Name, Primitive)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (Name, Primitive)>>(iter: I) -> Dictionary {
        Dictionary {
            dict: iter.into_iter().collect(),
        }
    }
}

/// Raw stream: dictionary plus undecoded payload bytes. The typed, lazily
/// decoding wrapper lives in `object::stream`.
#[derive(Clone, Debug)]
pub struct PdfStream {
    pub info: Dictionary,
    pub data: Vec<u8>,
}
impl PdfStream {
    pub fn serialize(&self, out: &mut impl io::Write) -> Result<()> {
        self.info.serialize(out)?;
        writeln!(out, "\nstream")?;
        out.write_all(&self.data)?;
        writeln!(out, "\nendstream")?;
        Ok(())
    }
}
impl Object for PdfStream {
    fn from_primitive(p: Primitive, resolve: &impl Resolve) -> Result<Self> {
        match p {
            Primitive::Stream(stream) => Ok(stream),
            Primitive::Reference(r) => PdfStream::from_primitive(resolve.resolve(r)?, resolve),
            p => Err(PdfError::UnexpectedPrimitive {
                expected: "Stream",
                found: p.get_debug_name(),
            }),
        }
    }
}

macro_rules! unexpected_primitive {
    ($expected:ident, $found:expr) => {
        Err(PdfError::UnexpectedPrimitive {
            expected: stringify!($expected),
            found: $found,
        })
    };
}

/// Byte string.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PdfString {
    pub data: Vec<u8>,
}
impl fmt::Debug for PdfString {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"")?;
        for &b in &self.data {
            match b {
                b'"' => write!(f, "\\\"")?,
                b' '..=b'~' => write!(f, "{}", b as char)?,
                o @ 0..=7 => write!(f, "\\{}", o)?,
                x => write!(f, "\\x{:02x}", x)?,
            }
        }
        write!(f, "\"")
    }
}
impl PdfString {
    pub fn new(data: Vec<u8>) -> PdfString {
        PdfString { data }
    }
    pub fn from_str(s: &str) -> PdfString {
        PdfString {
            data: s.as_bytes().to_vec(),
        }
    }
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
    /// Text content: UTF-16BE when the BOM is present, else treated as
    /// one-byte text.
    pub fn to_text(&self) -> Result<String> {
        if self.data.starts_with(&[0xfe, 0xff]) {
            let utf16: Vec<u16> = self.data[2..]
                .chunks(2)
                .map(|c| (c[0] as u16) << 8 | *c.get(1).unwrap_or(&0) as u16)
                .collect();
            Ok(String::from_utf16(&utf16)?)
        } else {
            Ok(str::from_utf8(&self.data)?.into())
        }
    }
    pub fn serialize(&self, out: &mut impl io::Write) -> Result<()> {
        if self.data.iter().any(|&b| b >= 0x80) {
            write!(out, "<")?;
            for &b in &self.data {
                write!(out, "{:02x}", b)?;
            }
            write!(out, ">")?;
        } else {
            write!(out, "(")?;
            for &b in &self.data {
                match b {
                    b'\\' | b'(' | b')' => write!(out, r"\")?,
                    _ => (),
                }
                out.write_all(&[b])?;
            }
            write!(out, ")")?;
        }
        Ok(())
    }
}
impl AsRef<[u8]> for PdfString {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
impl Object for PdfString {
    fn from_primitive(p: Primitive, r: &impl Resolve) -> Result<Self> {
        match p {
            Primitive::String(string) => Ok(string),
            Primitive::Reference(id) => PdfString::from_primitive(r.resolve(id)?, r),
            _ => unexpected_primitive!(String, p.get_debug_name()),
        }
    }
}
impl ObjectWrite for PdfString {
    fn to_primitive(&self, _update: &mut impl Updater) -> Result<Primitive> {
        Ok(Primitive::String(self.clone()))
    }
}

impl Primitive {
    /// For debugging / error messages: get the name of the variant
    pub fn get_debug_name(&self) -> &'static str {
        match *self {
            Primitive::Null => "Null",
            Primitive::Integer(..) => "Integer",
            Primitive::Number(..) => "Number",
            Primitive::Boolean(..) => "Boolean",
            Primitive::String(..) => "String",
            Primitive::Stream(..) => "Stream",
            Primitive::Dictionary(..) => "Dictionary",
            Primitive::Array(..) => "Array",
            Primitive::Reference(..) => "Reference",
            Primitive::Name(..) => "Name",
        }
    }
    pub fn is_null(&self) -> bool {
        matches!(*self, Primitive::Null)
    }
    /// Follow references until a direct value is reached.
    pub fn resolve(self, r: &impl Resolve) -> Result<Primitive> {
        match self {
            Primitive::Reference(id) => r.resolve(id),
            p => Ok(p),
        }
    }
    pub fn as_integer(&self) -> Result<i32> {
        match *self {
            Primitive::Integer(n) => Ok(n),
            ref p => unexpected_primitive!(Integer, p.get_debug_name()),
        }
    }
    pub fn as_u32(&self) -> Result<u32> {
        match *self {
            Primitive::Integer(n) if n >= 0 => Ok(n as u32),
            Primitive::Integer(_) => bail!("negative integer"),
            ref p => unexpected_primitive!(Integer, p.get_debug_name()),
        }
    }
    /// Integers and reals are distinct variants but compare equal as numbers.
    pub fn as_number(&self) -> Result<f32> {
        match *self {
            Primitive::Integer(n) => Ok(n as f32),
            Primitive::Number(f) => Ok(f),
            ref p => unexpected_primitive!(Number, p.get_debug_name()),
        }
    }
    pub fn as_bool(&self) -> Result<bool> {
        match *self {
            Primitive::Boolean(b) => Ok(b),
            ref p => unexpected_primitive!(Boolean, p.get_debug_name()),
        }
    }
    pub fn as_name(&self) -> Result<&Name> {
        match self {
            Primitive::Name(ref name) => Ok(name),
            p => unexpected_primitive!(Name, p.get_debug_name()),
        }
    }
    pub fn as_string(&self) -> Result<&PdfString> {
        match self {
            Primitive::String(ref data) => Ok(data),
            p => unexpected_primitive!(String, p.get_debug_name()),
        }
    }
    /// Does not accept a Reference
    pub fn as_array(&self) -> Result<&[Primitive]> {
        match self {
            Primitive::Array(ref v) => Ok(v),
            p => unexpected_primitive!(Array, p.get_debug_name()),
        }
    }
    /// Does not accept a Reference
    pub fn as_dict(&self) -> Result<&Dictionary> {
        match self {
            Primitive::Dictionary(ref d) => Ok(d),
            p => unexpected_primitive!(Dictionary, p.get_debug_name()),
        }
    }
    pub fn as_reference(&self) -> Result<PlainRef> {
        match *self {
            Primitive::Reference(id) => Ok(id),
            ref p => unexpected_primitive!(Reference, p.get_debug_name()),
        }
    }
    pub fn into_reference(self) -> Result<PlainRef> {
        match self {
            Primitive::Reference(id) => Ok(id),
            p => unexpected_primitive!(Reference, p.get_debug_name()),
        }
    }
    /// Does accept a Reference
    pub fn into_array(self, r: &impl Resolve) -> Result<Vec<Primitive>> {
        match self {
            Primitive::Array(v) => Ok(v),
            Primitive::Reference(id) => r.resolve(id)?.into_array(r),
            p => unexpected_primitive!(Array, p.get_debug_name()),
        }
    }
    pub fn into_dictionary(self, r: &impl Resolve) -> Result<Dictionary> {
        match self {
            Primitive::Dictionary(dict) => Ok(dict),
            Primitive::Stream(s) => Ok(s.info),
            Primitive::Reference(id) => r.resolve(id)?.into_dictionary(r),
            p => unexpected_primitive!(Dictionary, p.get_debug_name()),
        }
    }
    /// Doesn't accept a Reference
    pub fn into_name(self) -> Result<Name> {
        match self {
            Primitive::Name(name) => Ok(name),
            p => unexpected_primitive!(Name, p.get_debug_name()),
        }
    }
    /// Doesn't accept a Reference
    pub fn into_string(self) -> Result<PdfString> {
        match self {
            Primitive::String(data) => Ok(data),
            p => unexpected_primitive!(String, p.get_debug_name()),
        }
    }
    pub fn into_stream(self, r: &impl Resolve) -> Result<PdfStream> {
        match self {
            Primitive::Stream(s) => Ok(s),
            Primitive::Reference(id) => r.resolve(id)?.into_stream(r),
            p => unexpected_primitive!(Stream, p.get_debug_name()),
        }
    }
}

impl From<i32> for Primitive {
    fn from(x: i32) -> Primitive {
        Primitive::Integer(x)
    }
}
impl From<f32> for Primitive {
    fn from(x: f32) -> Primitive {
        Primitive::Number(x)
    }
}
impl From<bool> for Primitive {
    fn from(x: bool) -> Primitive {
        Primitive::Boolean(x)
    }
}
impl From<Name> for Primitive {
    fn from(x: Name) -> Primitive {
        Primitive::Name(x)
    }
}
impl From<PdfString> for Primitive {
    fn from(x: PdfString) -> Primitive {
        Primitive::String(x)
    }
}
impl From<PdfStream> for Primitive {
    fn from(x: PdfStream) -> Primitive {
        Primitive::Stream(x)
    }
}
impl From<Dictionary> for Primitive {
    fn from(x: Dictionary) -> Primitive {
        Primitive::Dictionary(x)
    }
}
impl From<Vec<Primitive>> for Primitive {
    fn from(x: Vec<Primitive>) -> Primitive {
        Primitive::Array(x)
    }
}
impl From<PlainRef> for Primitive {
    fn from(x: PlainRef) -> Primitive {
        Primitive::Reference(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_preserves_insertion_order() {
        let mut dict = Dictionary::new();
        dict.insert("Zebra", Primitive::Integer(1));
        dict.insert("Alpha", Primitive::Integer(2));
        dict.insert("Mango", Primitive::Integer(3));
        let keys: Vec<&str> = dict.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, ["Zebra", "Alpha", "Mango"]);

        // replacement keeps the original position
        dict.insert("Alpha", Primitive::Integer(9));
        let keys: Vec<&str> = dict.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, ["Zebra", "Alpha", "Mango"]);
        assert_eq!(dict["Alpha"].as_integer().unwrap(), 9);
    }

    #[test]
    fn numbers_compare_across_variants() {
        let int = Primitive::Integer(1);
        let real = Primitive::Number(1.0);
        assert_ne!(int.get_debug_name(), real.get_debug_name());
        assert_eq!(int.as_number().unwrap(), real.as_number().unwrap());
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(2.0), "2.0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(30.0), "30.0");
        assert_eq!(format_number(0.125), "0.125");
        assert_eq!(format_number(-1.5), "-1.5");
    }

    #[test]
    fn name_escaping() {
        let mut out = Vec::new();
        serialize_name("A B#C", &mut out).unwrap();
        assert_eq!(out, b"/A#20B#23C");
    }
}
