//! gasm-str - String compression for `.encoded` strings.
//!
//! The preprocessor feeds every `.encoded` string's code points into a
//! [`CharFrequencies`] table. After preprocessing and before code
//! emission, [`StringTable::build`] turns the frequencies into a
//! prefix-code tree (Huffman-shaped). The emitter then asks the table
//! to serialize itself wherever `.string_table` appears, and to encode
//! each `.encoded` string as a bit-packed tree walk.

pub mod bits;
pub mod frequency;
pub mod tree;

pub use bits::BitWriter;
pub use frequency::CharFrequencies;
pub use tree::{NodeId, NodeKind, StringTable};
