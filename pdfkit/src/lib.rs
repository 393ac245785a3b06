//! PDF object model, documents and structure-aware composition.
//!
//! Parsing bytes into objects and writing documents back out are the
//! job of external collaborators; this crate owns everything in
//! between: the primitive object model, the in-memory document with its
//! change tracker, identity-aware deep cloning, and the merge / split /
//! overlay / layer composers.

#[macro_use]
extern crate snafu;
#[macro_use]
extern crate log;

#[macro_use]
pub mod error;
pub mod clone;
pub mod compose;
pub mod content;
pub mod document;
pub mod enc;
pub mod font;
pub mod matrix;
pub mod object;
pub mod observer;
pub mod primitive;

pub use crate::error::PdfError;
