//! Finalization: padding, backpatch resolution, header, checksum.
//!
//! Runs after the emission pass whether or not that pass recorded
//! errors, so every resolvable diagnostic is collected in one build.
//! The overall assembly still fails if anything was recorded.

use gasm_par::{eval_operand, Eval};
use gasm_util::buffer::ByteBuffer;
use gasm_util::diagnostic::Diagnostics;

use crate::program::ProgramInfo;
use crate::size::value_fits;

/// Offset of the checksum word in the header.
const CHECKSUM_OFFSET: usize = 32;

/// Offset of the timestamp bytes in the header.
const TIMESTAMP_OFFSET: usize = 40;

pub(crate) fn finalize(
    buf: &mut ByteBuffer,
    info: &mut ProgramInfo,
    in_header: bool,
    diagnostics: &mut Diagnostics,
) {
    if in_header {
        diagnostics.error(None, "missing .end_header directive");
    }

    // Final padding and the memory-layout symbols.
    buf.pad_to(256);
    info.end_memory = buf.len() as u32;
    let end_memory = info.end_memory as i32;
    let _ = info.symbols.define("_EXTSTART", end_memory);
    let _ = info
        .symbols
        .define("_ENDMEM", end_memory.wrapping_add(info.extended_memory));

    resolve_patches(buf, info, diagnostics);
    write_header(buf, info, diagnostics);

    // Checksum over the whole image with the checksum slot still zero.
    let checksum = buf.checksum_words();
    buf.set_word(CHECKSUM_OFFSET, checksum);
}

/// Re-evaluate every saved operand expression against the now-final
/// symbol table and overwrite its placeholder.
fn resolve_patches(buf: &mut ByteBuffer, info: &mut ProgramInfo, diagnostics: &mut Diagnostics) {
    let ProgramInfo {
        symbols, patches, ..
    } = info;

    // Function scopes are all closed by now; locals never survive to
    // the backpatch pass.
    let no_locals: [String; 0] = [];

    for patch in patches.iter_mut() {
        let result = eval_operand(&mut patch.operand, symbols, &no_locals, true, diagnostics);
        if result != Eval::Known {
            // eval_operand already reported the unknown identifier or
            // the structural problem.
            continue;
        }
        let mut value = match patch.operand.value() {
            Some(value) => value,
            None => continue,
        };
        if let Some(after) = patch.position_after {
            value = value.wrapping_sub(after as i32).wrapping_add(2);
        }
        patch.value_final = Some(value);

        if !value_fits(value as u32, patch.max_width) {
            diagnostics.warning(
                Some(patch.origin.clone()),
                "value is larger than storage specification and will be truncated",
            );
        }
        buf.set_variable(patch.position as usize, value as u32, patch.max_width);
    }
}

fn write_header(buf: &mut ByteBuffer, info: &ProgramInfo, diagnostics: &mut Diagnostics) {
    // Magic "Glul" and the Glulx 3.1.2 version.
    buf.set_word(0, 0x476C_756C);
    buf.set_word(4, 0x0003_0102);

    buf.set_word(8, info.ram_start);
    buf.set_word(12, info.end_memory);
    buf.set_word(
        16,
        info.end_memory.wrapping_add(info.extended_memory as u32),
    );
    buf.set_word(20, info.stack_size as u32);

    match info.symbols.lookup(&info.start_label) {
        Some(address) => buf.set_word(24, address as u32),
        None => {
            buf.set_word(24, 0);
            diagnostics.error(None, "missing start label");
        }
    }

    if info.string_table_position == 0 {
        buf.set_word(28, 0);
        if info.strings.has_nodes() {
            diagnostics.error(
                None,
                "source contains encoded strings but does not include .string_table directive",
            );
        }
    } else {
        buf.set_word(28, info.string_table_position);
    }

    // Checksum placeholder stays zero until the final sum.
    buf.set_word(CHECKSUM_OFFSET, 0);

    buf.set_byte(36, b'g');
    buf.set_byte(37, b'a');
    buf.set_byte(38, b's');
    buf.set_byte(39, b'm');

    for (index, byte) in info.timestamp.iter().enumerate() {
        buf.set_byte(TIMESTAMP_OFFSET + index, *byte);
    }
}
