//! Content-stream interpreter over the `pdfkit` object model.
//!
//! A stack-machine evaluator for the page-description language: it
//! walks the token stream delivered by an external parser, maintains
//! the graphics and text state, resolves resources against the scope
//! stack, and reports everything it paints through the [`Device`]
//! callback trait. Rasterizers, text extractors and validators are
//! device implementations, not engine subclasses.

#[macro_use]
extern crate log;

pub mod device;
pub mod engine;
pub mod graphics;
pub mod ops;
pub mod text;

pub use crate::device::{Device, ImageSource, NopDevice};
pub use crate::engine::{EngineOptions, StreamEngine};
pub use crate::graphics::{GraphicsState, Winding};
pub use crate::text::{TextRenderMode, TextState};
