//! gasm-gen - Code emission and image finalization.
//!
//! The second pass over the (preprocessed) token sequence. [`emit`]
//! walks the tokens once, binding labels, writing directives'
//! bytes, and encoding instructions with variable-width operands;
//! unresolved operands leave zero placeholders plus backpatch
//! records. [`finalize`] then pads the image, resolves the
//! backpatches against the complete symbol table, writes the header,
//! and computes the checksum.
//!
//! [`size`] isolates the operand size classifier and nibble packing;
//! [`opcodes`] is the mnemonic table, data rather than logic.

mod emit;
mod finalize;
pub mod opcodes;
pub mod program;
pub mod size;

pub use emit::assemble;
pub use program::{Backpatch, ProgramInfo, HEADER_SIZE, TIMESTAMP_SIZE};
