//! Stream filter chain decoding.
//!
//! Image-compression filters (DCT, JPX, CCITT, JBIG2) are decoded by
//! external collaborators; this module reports them as unsupported and
//! leaves the data untouched for the caller to hand off.

use crate::error::*;
use crate::object::Resolve;
use crate::primitive::{Dictionary, Primitive};
use itertools::Itertools;
use std::io::Read;

#[derive(Debug, Clone, PartialEq)]
pub struct LzwFlateParams {
    pub predictor: i32,
    pub n_components: i32,
    pub bits_per_component: i32,
    pub columns: i32,
    pub early_change: i32,
}
impl Default for LzwFlateParams {
    fn default() -> LzwFlateParams {
        LzwFlateParams {
            predictor: 1,
            n_components: 1,
            bits_per_component: 8,
            columns: 1,
            early_change: 1,
        }
    }
}
impl LzwFlateParams {
    fn from_dict(dict: &Dictionary, r: &impl Resolve) -> Result<LzwFlateParams> {
        let mut params = LzwFlateParams::default();
        let get = |key: &str, default: i32| -> Result<i32> {
            match dict.get(key) {
                Some(p) => p.clone().resolve(r)?.as_integer(),
                None => Ok(default),
            }
        };
        params.predictor = get("Predictor", 1)?;
        params.n_components = get("Colors", 1)?;
        params.bits_per_component = get("BitsPerComponent", 8)?;
        params.columns = get("Columns", 1)?;
        params.early_change = get("EarlyChange", 1)?;
        Ok(params)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamFilter {
    AsciiHex,
    Ascii85,
    Lzw(LzwFlateParams),
    Flate(LzwFlateParams),
    RunLength,
    /// Image or crypt filters handled outside the core; carried so the
    /// filter chain round-trips.
    External(String),
}

impl StreamFilter {
    pub fn from_kind_and_params(
        kind: &str,
        params: Option<&Dictionary>,
        r: &impl Resolve,
    ) -> Result<StreamFilter> {
        let lzw_flate = || match params {
            Some(d) => LzwFlateParams::from_dict(d, r),
            None => Ok(LzwFlateParams::default()),
        };
        Ok(match kind {
            "ASCIIHexDecode" | "AHx" => StreamFilter::AsciiHex,
            "ASCII85Decode" | "A85" => StreamFilter::Ascii85,
            "LZWDecode" | "LZW" => StreamFilter::Lzw(lzw_flate()?),
            "FlateDecode" | "Fl" => StreamFilter::Flate(lzw_flate()?),
            "RunLengthDecode" | "RL" => StreamFilter::RunLength,
            other => StreamFilter::External(other.into()),
        })
    }
    pub fn name(&self) -> &str {
        match *self {
            StreamFilter::AsciiHex => "ASCIIHexDecode",
            StreamFilter::Ascii85 => "ASCII85Decode",
            StreamFilter::Lzw(_) => "LZWDecode",
            StreamFilter::Flate(_) => "FlateDecode",
            StreamFilter::RunLength => "RunLengthDecode",
            StreamFilter::External(ref name) => name,
        }
    }
}

/// Read the `/Filter` and `/DecodeParms` entries of a stream dictionary.
pub fn parse_filters(dict: &Dictionary, r: &impl Resolve) -> Result<Vec<StreamFilter>> {
    let filters = match dict.get("Filter") {
        None => return Ok(vec![]),
        Some(p) => match p.clone().resolve(r)? {
            Primitive::Name(name) => vec![Primitive::Name(name)],
            Primitive::Array(arr) => arr,
            Primitive::Null => vec![],
            p => err!(PdfError::UnexpectedPrimitive {
                expected: "Name or Array",
                found: p.get_debug_name(),
            }),
        },
    };
    let params = match dict.get("DecodeParms").or_else(|| dict.get("DP")) {
        None => vec![],
        Some(p) => match p.clone().resolve(r)? {
            Primitive::Dictionary(d) => vec![Some(d)],
            Primitive::Array(arr) => arr
                .into_iter()
                .map(|p| match p.resolve(r)? {
                    Primitive::Dictionary(d) => Ok(Some(d)),
                    _ => Ok(None),
                })
                .collect::<Result<_>>()?,
            _ => vec![],
        },
    };
    filters
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            let name = p.resolve(r)?.into_name()?;
            StreamFilter::from_kind_and_params(&name, params.get(i).and_then(|p| p.as_ref()), r)
        })
        .collect()
}

pub fn decode(data: &[u8], filter: &StreamFilter) -> Result<Vec<u8>> {
    match *filter {
        StreamFilter::AsciiHex => decode_hex(data),
        StreamFilter::Ascii85 => decode_85(data),
        StreamFilter::Lzw(ref params) => {
            let decoded = lzw_decode(data)?;
            unpredict(decoded, params)
        }
        StreamFilter::Flate(ref params) => {
            let decoded = flate_decode(data)?;
            unpredict(decoded, params)
        }
        StreamFilter::RunLength => run_length_decode(data),
        StreamFilter::External(ref name) => err!(PdfError::UnsupportedFilter {
            name: name.clone()
        }),
    }
}

#[inline]
fn decode_nibble(c: u8) -> Option<u8> {
    match c {
        n @ b'0'..=b'9' => Some(n - b'0'),
        a @ b'a'..=b'f' => Some(a - b'a' + 0xa),
        a @ b'A'..=b'F' => Some(a - b'A' + 0xA),
        _ => None,
    }
}

pub fn decode_hex(data: &[u8]) -> Result<Vec<u8>> {
    let mut digits = data
        .iter()
        .cloned()
        .take_while(|&b| b != b'>')
        .filter(|&b| !matches!(b, 0 | 9 | 10 | 12 | 13 | 32))
        .collect_vec();
    // an odd final digit behaves as if followed by 0
    if digits.len() % 2 == 1 {
        digits.push(b'0');
    }
    let mut out = Vec::with_capacity(digits.len() / 2);
    for (i, (high, low)) in digits.iter().cloned().tuples().enumerate() {
        match (decode_nibble(high), decode_nibble(low)) {
            (Some(high), Some(low)) => out.push(high << 4 | low),
            _ => err!(PdfError::HexDecode {
                pos: i * 2,
                bytes: [high, low]
            }),
        }
    }
    Ok(out)
}

#[inline]
fn sym_85(byte: u8) -> Option<u8> {
    match byte {
        b @ 0x21..=0x75 => Some(b - 0x21),
        _ => None,
    }
}

fn word_85([a, b, c, d, e]: [u8; 5]) -> Option<[u8; 4]> {
    fn s(b: u8) -> Option<u32> {
        sym_85(b).map(|n| n as u32)
    }
    let (a, b, c, d, e) = (s(a)?, s(b)?, s(c)?, s(d)?, s(e)?);
    let q = (((a * 85 + b) * 85 + c) * 85 + d).checked_mul(85)?.checked_add(e)?;
    Some(q.to_be_bytes())
}

pub fn decode_85(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity((data.len() + 4) / 5 * 4);

    let mut stream = data
        .iter()
        .cloned()
        .filter(|&b| !matches!(b, b' ' | b'\n' | b'\r' | b'\t'));

    let mut symbols = stream.by_ref().take_while(|&b| b != b'~');

    let (tail_len, tail) = loop {
        match symbols.next() {
            Some(b'z') => out.extend_from_slice(&[0; 4]),
            Some(a) => {
                let (b, c, d, e) = match (
                    symbols.next(),
                    symbols.next(),
                    symbols.next(),
                    symbols.next(),
                ) {
                    (Some(b), Some(c), Some(d), Some(e)) => (b, c, d, e),
                    (None, _, _, _) => break (1, [a, b'u', b'u', b'u', b'u']),
                    (Some(b), None, _, _) => break (2, [a, b, b'u', b'u', b'u']),
                    (Some(b), Some(c), None, _) => break (3, [a, b, c, b'u', b'u']),
                    (Some(b), Some(c), Some(d), None) => break (4, [a, b, c, d, b'u']),
                };
                out.extend_from_slice(&word_85([a, b, c, d, e]).ok_or(PdfError::Ascii85TailError)?);
            }
            None => break (0, [b'u'; 5]),
        }
    };

    if tail_len > 0 {
        if tail_len == 1 {
            return Err(PdfError::Ascii85TailError);
        }
        let last = word_85(tail).ok_or(PdfError::Ascii85TailError)?;
        out.extend_from_slice(&last[..tail_len - 1]);
    }
    Ok(out)
}

pub fn flate_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match libflate::zlib::Decoder::new(data) {
        Ok(mut decoder) => {
            decoder.read_to_end(&mut out).map_err(|_| PdfError::FlateDecode)?;
        }
        Err(_) => {
            // no zlib header: raw deflate data is seen in the wild
            let mut decoder = libflate::deflate::Decoder::new(data);
            decoder.read_to_end(&mut out).map_err(|_| PdfError::FlateDecode)?;
        }
    }
    Ok(out)
}

pub fn lzw_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut decoder = weezl::decode::Decoder::new(weezl::BitOrder::Msb, 8);
    let result = decoder.into_stream(&mut out).decode_all(data);
    result
        .status
        .map_err(|e| PdfError::Other {
            msg: format!("LZW: {:?}", e),
        })?;
    Ok(out)
}

pub fn run_length_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let length = data[i];
        i += 1;
        match length {
            0..=127 => {
                let n = length as usize + 1;
                if i + n > data.len() {
                    err!(PdfError::EOF);
                }
                out.extend_from_slice(&data[i..i + n]);
                i += n;
            }
            128 => break,
            129..=255 => {
                let byte = *data.get(i).ok_or(PdfError::EOF)?;
                i += 1;
                out.extend(std::iter::repeat(byte).take(257 - length as usize));
            }
        }
    }
    Ok(out)
}

/// Reverse the PNG / TIFF predictor applied before compression.
fn unpredict(data: Vec<u8>, params: &LzwFlateParams) -> Result<Vec<u8>> {
    if row_length(params) == 0 {
        return Ok(data);
    }
    match params.predictor {
        1 => Ok(data),
        2 => tiff_unpredict(data, params),
        10..=15 => png_unpredict(data, params),
        n => Err(PdfError::IncorrectPredictorType { n: n as u8 }),
    }
}

fn bytes_per_pixel(params: &LzwFlateParams) -> usize {
    ((params.n_components * params.bits_per_component + 7) / 8).max(1) as usize
}

fn row_length(params: &LzwFlateParams) -> usize {
    ((params.columns * params.n_components * params.bits_per_component + 7) / 8) as usize
}

fn tiff_unpredict(mut data: Vec<u8>, params: &LzwFlateParams) -> Result<Vec<u8>> {
    if params.bits_per_component != 8 {
        bail!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        );
    }
    let stride = row_length(params);
    let bpp = bytes_per_pixel(params);
    for row in data.chunks_mut(stride) {
        for i in bpp..row.len() {
            row[i] = row[i].wrapping_add(row[i - bpp]);
        }
    }
    Ok(data)
}

fn png_unpredict(data: Vec<u8>, params: &LzwFlateParams) -> Result<Vec<u8>> {
    let stride = row_length(params);
    let bpp = bytes_per_pixel(params);
    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; stride];

    for chunk in data.chunks(stride + 1) {
        let (&tag, row) = try_opt!(chunk.split_first());
        let mut row = row.to_vec();
        row.resize(stride, 0);
        match tag {
            0 => (),
            1 => {
                for i in bpp..stride {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            }
            2 => {
                for i in 0..stride {
                    row[i] = row[i].wrapping_add(prev[i]);
                }
            }
            3 => {
                for i in 0..stride {
                    let left = if i >= bpp { row[i - bpp] as u16 } else { 0 };
                    let up = prev[i] as u16;
                    row[i] = row[i].wrapping_add(((left + up) / 2) as u8);
                }
            }
            4 => {
                for i in 0..stride {
                    let left = if i >= bpp { row[i - bpp] as i16 } else { 0 };
                    let up = prev[i] as i16;
                    let up_left = if i >= bpp { prev[i - bpp] as i16 } else { 0 };
                    let p = left + up - up_left;
                    let pred = [left, up, up_left]
                        .into_iter()
                        .min_by_key(|&v| (p - v).abs())
                        .unwrap();
                    row[i] = row[i].wrapping_add(pred as u8);
                }
            }
            n => err!(PdfError::IncorrectPredictorType { n }),
        }
        out.extend_from_slice(&row);
        prev = row;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        assert_eq!(decode_hex(b"48656C6C6F>").unwrap(), b"Hello");
        assert_eq!(decode_hex(b"48 65 6C\n6C 6F>").unwrap(), b"Hello");
        // odd digit padded with zero
        assert_eq!(decode_hex(b"7>").unwrap(), vec![0x70]);
    }

    #[test]
    fn run_length() {
        // literal run of 3, then 4x 'a', then EOD
        let data = [2, b'x', b'y', b'z', 253, b'a', 128];
        assert_eq!(run_length_decode(&data).unwrap(), b"xyzaaaa");
    }

    #[test]
    fn ascii85() {
        assert_eq!(decode_85(b"87cUR~>").unwrap(), b"Hell");
        assert_eq!(decode_85(b"z~>").unwrap(), vec![0; 4]);
    }
}
