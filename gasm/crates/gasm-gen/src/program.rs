//! Program-wide assembly state.
//!
//! One [`ProgramInfo`] value is threaded through preprocessing,
//! emission, and finalization; there is no ambient global state.

use std::io::{self, Write};

use gasm_par::Operand;
use gasm_str::StringTable;
use gasm_util::origin::Origin;
use gasm_util::symbol::SymbolTable;

/// Size of the fixed header at the start of the image.
pub const HEADER_SIZE: usize = 64;

/// Maximum timestamp length stored in the header.
pub const TIMESTAMP_SIZE: usize = 12;

/// A deferred operand write, created when an operand's value is not
/// known at emit time and resolved during finalization.
#[derive(Debug)]
pub struct Backpatch {
    /// Where the operand appeared in the source.
    pub origin: Origin,
    /// Byte offset of the placeholder in the output image.
    pub position: u32,
    /// For a relative branch target: the position just after the
    /// instruction's last operand, used to transform the value.
    pub position_after: Option<u32>,
    /// Width of the placeholder in bytes.
    pub max_width: u32,
    /// The unresolved operand expression, owned by this record.
    pub operand: Operand,
    /// The expression as written, kept for `-dump-patches`.
    pub expr_text: String,
    /// Resolved value, filled in during finalization.
    pub value_final: Option<i32>,
}

impl Backpatch {
    /// Create a record for the placeholder just written at `position`.
    pub fn new(
        position: u32,
        position_after: Option<u32>,
        max_width: u32,
        operand: Operand,
    ) -> Self {
        Self {
            origin: operand.origin.clone(),
            position,
            position_after,
            max_width,
            expr_text: operand.expr.to_string(),
            operand,
            value_final: None,
        }
    }
}

/// Everything the pipeline accumulates about the program being built.
#[derive(Debug)]
pub struct ProgramInfo {
    /// Requested stack size for the header.
    pub stack_size: i32,
    /// Extra writable memory past end-of-memory.
    pub extended_memory: i32,
    /// Header timestamp, zero-padded.
    pub timestamp: [u8; TIMESTAMP_SIZE],
    /// Start of RAM, bound by `.end_header`.
    pub ram_start: u32,
    /// End of initialized memory, set during finalization.
    pub end_memory: u32,
    /// Image offset of the serialized string table, 0 when absent.
    pub string_table_position: u32,
    /// Label giving the execution start address.
    pub start_label: String,
    /// The built string-compression tree.
    pub strings: StringTable,
    /// The global symbol table.
    pub symbols: SymbolTable,
    /// Deferred operand writes, drained during finalization.
    pub patches: Vec<Backpatch>,
}

impl Default for ProgramInfo {
    fn default() -> Self {
        Self {
            stack_size: 2048,
            extended_memory: 0,
            timestamp: [0; TIMESTAMP_SIZE],
            ram_start: 0,
            end_memory: 0,
            string_table_position: 0,
            start_label: "start".to_string(),
            strings: StringTable::new(),
            symbols: SymbolTable::new(),
            patches: Vec::new(),
        }
    }
}

impl ProgramInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a timestamp, truncated to the header field's capacity and
    /// zero-padded.
    pub fn set_timestamp(&mut self, text: &str) {
        self.timestamp = [0; TIMESTAMP_SIZE];
        let bytes = text.as_bytes();
        let length = bytes.len().min(TIMESTAMP_SIZE);
        self.timestamp[..length].copy_from_slice(&bytes[..length]);
    }

    /// Write the backpatch table in `-dump-patches` format.
    pub fn dump_patches(&self, out: &mut dyn Write) -> io::Result<()> {
        if self.patches.is_empty() {
            return writeln!(out, "No backpatches found!");
        }
        for patch in &self.patches {
            let resolved = match patch.value_final {
                Some(value) => value.to_string(),
                None => "-".to_string(),
            };
            writeln!(
                out,
                "{:<30}  0x{:08X} = {} (width {})",
                patch.expr_text, patch.position, resolved, patch.max_width
            )?;
        }
        Ok(())
    }
}
