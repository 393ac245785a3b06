use crate::enc::{decode, parse_filters, StreamFilter};
use crate::error::*;
use crate::object::{Object, ObjectWrite, Resolve, Updater};
use crate::primitive::{Dictionary, PdfStream, Primitive};

use once_cell::unsync::OnceCell;
use std::fmt;

/// Stream with a parsed filter chain and a lazily decoded payload.
///
/// `raw_data` returns the stored (still filtered) bytes; `data` runs the
/// filter chain once and caches the result.
#[derive(Clone)]
pub struct Stream {
    pub info: Dictionary,
    filters: Vec<StreamFilter>,
    raw_data: Vec<u8>,
    decoded: OnceCell<Vec<u8>>,
}

impl Stream {
    pub fn from_stream(s: PdfStream, resolve: &impl Resolve) -> Result<Self> {
        let PdfStream { info, data } = s;
        let filters = parse_filters(&info, resolve)?;
        Ok(Stream {
            info,
            filters,
            raw_data: data,
            decoded: OnceCell::new(),
        })
    }

    /// A stream holding `data` verbatim, no filters.
    pub fn new(info: Dictionary, data: Vec<u8>) -> Stream {
        Stream {
            info,
            filters: Vec::new(),
            raw_data: data,
            decoded: OnceCell::new(),
        }
    }

    pub fn filters(&self) -> &[StreamFilter] {
        &self.filters
    }

    pub fn raw_data(&self) -> &[u8] {
        &self.raw_data
    }

    /// decode the data, not storing the result.
    fn decode_chain(&self) -> Result<Vec<u8>> {
        let mut data = self.raw_data.clone();
        for filter in &self.filters {
            data = decode(&data, filter)?;
        }
        Ok(data)
    }

    pub fn data(&self) -> Result<&[u8]> {
        self.decoded
            .get_or_try_init(|| self.decode_chain())
            .map(|v| v.as_slice())
    }

    pub fn to_pdf_stream(&self) -> PdfStream {
        let mut info = self.info.clone();
        info.insert("Length", Primitive::Integer(self.raw_data.len() as _));
        match self.filters.len() {
            0 => (),
            1 => {
                info.insert("Filter", Primitive::name(self.filters[0].name()));
            }
            _ => {
                info.insert(
                    "Filter",
                    Primitive::Array(
                        self.filters
                            .iter()
                            .map(|f| Primitive::name(f.name()))
                            .collect(),
                    ),
                );
            }
        }
        PdfStream {
            info,
            data: self.raw_data.clone(),
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "Stream({} bytes) {:?}", self.raw_data.len(), self.info)
    }
}

impl Object for Stream {
    fn from_primitive(p: Primitive, resolve: &impl Resolve) -> Result<Self> {
        let s = PdfStream::from_primitive(p, resolve)?;
        Stream::from_stream(s, resolve)
    }
}
impl ObjectWrite for Stream {
    fn to_primitive(&self, _update: &mut impl Updater) -> Result<Primitive> {
        Ok(Primitive::Stream(self.to_pdf_stream()))
    }
}
