//! gasm-util - Foundation types for the gasm assembler.
//!
//! This crate holds the pieces that every later stage of the pipeline
//! leans on:
//!
//! - [`origin`] - source locations attached to tokens and diagnostics
//! - [`diagnostic`] - error/warning records and the collector that
//!   accumulates them across stages
//! - [`symbol`] - the label table shared by the preprocessor, emitter,
//!   and finalizer
//! - [`buffer`] - a growable big-endian byte buffer used for source
//!   input and for building the output image
//! - [`utf8`] - a one-code-point-at-a-time decoder tolerant of
//!   malformed input

pub mod buffer;
pub mod diagnostic;
pub mod origin;
pub mod symbol;
pub mod utf8;

pub use buffer::ByteBuffer;
pub use diagnostic::{Diagnostic, Diagnostics, Severity};
pub use origin::Origin;
pub use symbol::SymbolTable;
