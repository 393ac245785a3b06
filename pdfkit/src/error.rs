use crate::object::ObjNr;
use std::error::Error;
use std::io;

#[derive(Debug, Snafu)]
pub enum PdfError {
    // Syntax / token stream
    #[snafu(display("Unexpected end of token stream"))]
    EOF,

    #[snafu(display("Malformed content stream: {}", reason))]
    ParseStructural { reason: String },

    #[snafu(display("Invalid UTF-8: {}", source))]
    Utf8 { source: Box<dyn Error + Send + Sync> },

    //////////////////
    // Interpreter
    #[snafu(display("Operator '{}' is missing operand {} ({})", operator, index, expected))]
    MissingOperand {
        operator: String,
        index: usize,
        expected: &'static str,
    },

    #[snafu(display("Resource /{} of kind {} not found", name, kind))]
    MissingResource { kind: &'static str, name: String },

    #[snafu(display("No decoder for inline image filter {}", filter))]
    MissingImageDecoder { filter: String },

    #[snafu(display("Graphics state stack is empty"))]
    EmptyGraphicsStack,

    #[snafu(display("Unknown operator '{}'", operator))]
    UnknownOperator { operator: String },

    #[snafu(display("Operator '{}' given a non-invertible or malformed matrix", operator))]
    InvalidMatrix { operator: String },

    #[snafu(display("Invalid color operand for '{}': {}", operator, reason))]
    InvalidColor { operator: String, reason: String },

    #[snafu(display("Content recursion depth {} exceeds the limit {}", depth, limit))]
    DepthExceeded { depth: usize, limit: usize },

    //////////////////
    // Encode/decode
    #[snafu(display("Hex decode error. Position {}, bytes {:?}", pos, bytes))]
    HexDecode { pos: usize, bytes: [u8; 2] },

    #[snafu(display("Ascii85 tail error"))]
    Ascii85TailError,

    #[snafu(display("Flate decode error"))]
    FlateDecode,

    #[snafu(display("Unsupported stream filter {}", name))]
    UnsupportedFilter { name: String },

    #[snafu(display("Failed to convert '{}' into PredictorType", n))]
    IncorrectPredictorType { n: u8 },

    //////////////////
    // Dictionary
    #[snafu(display("Can't parse field {} of struct {}.", field, typ))]
    FromPrimitive {
        typ: &'static str,
        field: &'static str,
        source: Box<PdfError>,
    },

    #[snafu(display("Field /{} is missing in dictionary for type {}.", field, typ))]
    MissingEntry { typ: &'static str, field: String },

    #[snafu(display("Expected dictionary /Type = {}. Found /Type = {}.", expected, found))]
    WrongDictionaryType { expected: String, found: String },

    //////////////////
    // Composer
    #[snafu(display("Cannot merge {} into {}; keeping the destination value", src, dst))]
    CloneTypeMismatch {
        src: &'static str,
        dst: &'static str,
    },

    #[snafu(display("Source document carries a dynamic XFA form; merging is not supported"))]
    DynamicXfaPresent,

    //////////////////
    // Misc
    #[snafu(display("Tried to dereference non-existing object nr {}.", obj_nr))]
    NullRef { obj_nr: ObjNr },

    #[snafu(display("Expected primitive {}, found primitive {} instead.", expected, found))]
    UnexpectedPrimitive {
        expected: &'static str,
        found: &'static str,
    },

    #[snafu(display("Page out of bounds ({}/{}).", page_nr, max))]
    PageOutOfBounds { page_nr: u32, max: u32 },

    #[snafu(display("IO Error"))]
    Io { source: io::Error },

    #[snafu(display("{}", msg))]
    Other { msg: String },

    #[snafu(display("NoneError at {}:{}:{}", file, line, column))]
    NoneError {
        file: &'static str,
        line: u32,
        column: u32,
    },
}

impl PdfError {
    /// Faults the stream engine recovers from by skipping the operator.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PdfError::MissingOperand { .. }
                | PdfError::MissingResource { .. }
                | PdfError::MissingImageDecoder { .. }
                | PdfError::EmptyGraphicsStack
                | PdfError::UnknownOperator { .. }
                | PdfError::InvalidMatrix { .. }
                | PdfError::InvalidColor { .. }
                | PdfError::DepthExceeded { .. }
        )
    }
}

pub type Result<T, E = PdfError> = std::result::Result<T, E>;

impl From<io::Error> for PdfError {
    fn from(source: io::Error) -> PdfError {
        PdfError::Io { source }
    }
}
impl From<String> for PdfError {
    fn from(msg: String) -> PdfError {
        PdfError::Other { msg }
    }
}

macro_rules! err_from {
    ($($st:ty),* => $variant:ident) => (
        $(
            impl From<$st> for PdfError {
                fn from(e: $st) -> PdfError {
                    PdfError::$variant { source: e.into() }
                }
            }
        )*
    )
}
err_from!(std::str::Utf8Error, std::string::FromUtf8Error, std::string::FromUtf16Error => Utf8);

#[macro_export]
macro_rules! try_opt {
    ($e:expr) => {
        match $e {
            Some(v) => v,
            None => {
                return Err($crate::error::PdfError::NoneError {
                    file: file!(),
                    line: line!(),
                    column: column!(),
                })
            }
        }
    };
}

/// Shorthand to add context to errors bubbling up through `?`-less call sites.
#[macro_export]
macro_rules! t {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return Err(e.into()),
        }
    };
}

macro_rules! err {
    ($e: expr) => {{
        return Err($e);
    }};
}
macro_rules! bail {
    ($($t:tt)*) => {
        err!($crate::error::PdfError::Other { msg: format!($($t)*) })
    }
}
