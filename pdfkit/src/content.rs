//! The token-stream contract between the external parser and the
//! content-stream interpreter.
//!
//! The parser owns lexing; the interpreter consumes a finite sequence of
//! tokens and never buffers more than one operator's operands.

use crate::error::*;
use crate::object::{Resolve, Stream};
use crate::primitive::{Dictionary, Primitive};

/// One token of a content stream.
#[derive(Debug, Clone)]
pub enum Token {
    /// A scalar or container literal operand.
    Operand(Primitive),
    /// An operator mnemonic (1-3 bytes).
    Operator(String),
    /// The raw payload following an `ID` operator. Inline-image bytes are
    /// not lexable as primitives, so they cross the boundary whole.
    ImageData(Vec<u8>),
}

impl Token {
    pub fn operator(op: impl Into<String>) -> Token {
        Token::Operator(op.into())
    }
}

/// Supplied by the external parser: turns decoded content-stream bytes
/// into tokens. The engine calls this once per stream it descends into.
pub trait Tokenize {
    fn tokens(&self, data: &[u8]) -> Result<Vec<Token>>;
}

/// Collect the content bytes of a page: `/Contents` is a single stream or
/// an array of streams concatenated in painting order.
pub fn page_content_data(contents: &Primitive, resolve: &impl Resolve) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    match contents.clone().resolve(resolve)? {
        Primitive::Array(parts) => {
            for part in parts {
                let stream = Stream::from_stream(part.into_stream(resolve)?, resolve)?;
                data.extend_from_slice(stream.data()?);
                // streams may not end with whitespace; a token must not
                // span the boundary
                data.push(b'\n');
            }
        }
        p @ Primitive::Stream(_) => {
            let stream = Stream::from_stream(p.into_stream(resolve)?, resolve)?;
            data.extend_from_slice(stream.data()?);
        }
        Primitive::Null => (),
        p => err!(PdfError::UnexpectedPrimitive {
            expected: "Stream or Array",
            found: p.get_debug_name(),
        }),
    }
    Ok(data)
}

/// An inline image assembled by the engine from `BI … ID <bytes> EI`.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub info: Dictionary,
    pub data: Vec<u8>,
}
