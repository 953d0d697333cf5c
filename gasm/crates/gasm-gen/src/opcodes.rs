//! The mnemonic table.
//!
//! This is data supplied to the emitter, not logic: each entry maps a
//! textual mnemonic to its numeric opcode, the exact operand count the
//! assembler must parse, and whether the final operand is a
//! PC-relative branch target.

use std::sync::OnceLock;

use rustc_hash::FxHashMap;

/// One mnemonic's encoding facts.
#[derive(Clone, Copy, Debug)]
pub struct Mnemonic {
    pub name: &'static str,
    pub opcode: u32,
    pub operand_count: u32,
    pub last_operand_is_relative: bool,
}

const fn m(name: &'static str, opcode: u32, operand_count: u32) -> Mnemonic {
    Mnemonic {
        name,
        opcode,
        operand_count,
        last_operand_is_relative: false,
    }
}

const fn rel(name: &'static str, opcode: u32, operand_count: u32) -> Mnemonic {
    Mnemonic {
        name,
        opcode,
        operand_count,
        last_operand_is_relative: true,
    }
}

/// Every known mnemonic.
pub static MNEMONICS: &[Mnemonic] = &[
    m("nop", 0x00, 0),
    m("quit", 0x120, 0),
    m("glk", 0x130, 3),
    m("getiosys", 0x148, 2),
    m("setiosys", 0x149, 2),
    m("gestalt", 0x100, 3),
    m("debugtrap", 0x101, 1),
    m("getmemsize", 0x102, 1),
    m("setmemsize", 0x103, 2),
    m("random", 0x110, 2),
    m("setrandom", 0x111, 1),
    m("verify", 0x121, 1),
    m("restart", 0x122, 0),
    m("save", 0x123, 2),
    m("restore", 0x124, 2),
    m("saveundo", 0x125, 1),
    m("restoreundo", 0x126, 1),
    m("protect", 0x127, 2),
    m("getstringtbl", 0x140, 1),
    m("setstringtbl", 0x141, 1),
    m("linearsearch", 0x150, 8),
    m("binarysearch", 0x151, 8),
    m("linkedsearch", 0x152, 7),
    m("mzero", 0x170, 2),
    m("mcopy", 0x171, 3),
    m("malloc", 0x178, 2),
    m("mfree", 0x179, 1),
    m("accelfunc", 0x180, 2),
    m("accelparam", 0x181, 2),
    // integer math
    m("add", 0x10, 3),
    m("sub", 0x11, 3),
    m("mul", 0x12, 3),
    m("div", 0x13, 3),
    m("mod", 0x14, 3),
    m("neg", 0x15, 2),
    // bitwise operations
    m("bitand", 0x18, 3),
    m("bitor", 0x19, 3),
    m("bitxor", 0x1A, 3),
    m("bitnot", 0x1B, 2),
    m("shiftl", 0x1C, 3),
    m("sshiftr", 0x1D, 3),
    m("ushiftr", 0x1E, 3),
    // floating conversions
    m("numtof", 0x190, 2),
    m("ftonumz", 0x191, 2),
    m("ftonumn", 0x192, 2),
    // floating point math
    m("ceil", 0x198, 2),
    m("floor", 0x199, 2),
    m("fadd", 0x1A0, 3),
    m("fsub", 0x1A1, 3),
    m("fmul", 0x1A2, 3),
    m("fdiv", 0x1A3, 3),
    m("fmod", 0x1A4, 4),
    m("sqrt", 0x1A8, 2),
    m("exp", 0x1A9, 2),
    m("log", 0x1AA, 2),
    m("pow", 0x1AB, 3),
    m("sin", 0x1B0, 2),
    m("cos", 0x1B1, 2),
    m("tan", 0x1B2, 2),
    m("asin", 0x1B3, 2),
    m("acos", 0x1B4, 2),
    m("atan", 0x1B5, 2),
    m("atan2", 0x1B6, 3),
    // floating point branching
    rel("jfeq", 0x1C0, 4),
    rel("jfne", 0x1C1, 4),
    rel("jflt", 0x1C2, 3),
    rel("jfle", 0x1C3, 3),
    rel("jfgt", 0x1C4, 3),
    rel("jfge", 0x1C5, 3),
    rel("jisnan", 0x1C8, 2),
    rel("jisinf", 0x1C9, 2),
    // jumps
    rel("jump", 0x20, 1),
    rel("jz", 0x22, 2),
    rel("jnz", 0x23, 2),
    rel("jeq", 0x24, 3),
    rel("jne", 0x25, 3),
    rel("jlt", 0x26, 3),
    rel("jge", 0x27, 3),
    rel("jgt", 0x28, 3),
    rel("jle", 0x29, 3),
    rel("jltu", 0x2A, 3),
    rel("jgeu", 0x2B, 3),
    rel("jgtu", 0x2C, 3),
    rel("jleu", 0x2D, 3),
    m("jumpabs", 0x104, 1),
    // function calls
    m("call", 0x30, 3),
    m("return", 0x31, 1),
    m("catch", 0x32, 2),
    m("throw", 0x33, 2),
    m("tailcall", 0x34, 2),
    m("callf", 0x160, 2),
    m("callfi", 0x161, 3),
    m("callfii", 0x162, 4),
    m("callfiii", 0x163, 5),
    // moving data
    m("copy", 0x40, 2),
    m("copys", 0x41, 2),
    m("copyb", 0x42, 2),
    m("sexs", 0x44, 2),
    m("sexb", 0x45, 2),
    m("aload", 0x48, 3),
    m("aloads", 0x49, 3),
    m("aloadb", 0x4A, 3),
    m("aloadbit", 0x4B, 3),
    m("astore", 0x4C, 3),
    m("astores", 0x4D, 3),
    m("astoreb", 0x4E, 3),
    m("astorebit", 0x4F, 3),
    // output operations
    m("streamchar", 0x70, 1),
    m("streamnum", 0x71, 1),
    m("streamstr", 0x72, 1),
    m("streamunichar", 0x73, 1),
    // stack operations
    m("stkcount", 0x50, 1),
    m("stkpeek", 0x51, 2),
    m("stkswap", 0x52, 0),
    m("stkroll", 0x53, 2),
    m("stkcopy", 0x54, 1),
];

/// Find a mnemonic by name.
pub fn lookup(name: &str) -> Option<&'static Mnemonic> {
    static INDEX: OnceLock<FxHashMap<&'static str, &'static Mnemonic>> = OnceLock::new();
    INDEX
        .get_or_init(|| MNEMONICS.iter().map(|m| (m.name, m)).collect())
        .get(name)
        .copied()
}
