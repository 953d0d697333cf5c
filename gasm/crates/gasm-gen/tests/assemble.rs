//! End-to-end assembly tests: source text in, image bytes out.

use gasm_gen::{assemble, ProgramInfo};
use gasm_lex::lex_bytes;
use gasm_par::preprocess;
use gasm_str::{CharFrequencies, StringTable};
use gasm_util::diagnostic::Diagnostics;

struct Build {
    image: Option<Vec<u8>>,
    info: ProgramInfo,
    diagnostics: Diagnostics,
}

fn build(source: &str) -> Build {
    let mut tokens = lex_bytes("test.ga", source.as_bytes()).expect("source should lex");
    let mut info = ProgramInfo::new();
    let mut frequencies = CharFrequencies::new();
    let mut diagnostics = Diagnostics::new();

    preprocess(
        &mut tokens,
        &mut info.symbols,
        &mut frequencies,
        &mut diagnostics,
    );
    info.strings = StringTable::build(&frequencies);

    let image = assemble(&tokens, &mut info, &mut diagnostics, None);
    Build {
        image: image.map(|buffer| buffer.into_vec()),
        info,
        diagnostics,
    }
}

fn build_ok(source: &str) -> Vec<u8> {
    let result = build(source);
    let messages: Vec<String> = result.diagnostics.iter().map(|d| d.to_string()).collect();
    result
        .image
        .unwrap_or_else(|| panic!("build should succeed, got: {:?}", messages))
}

fn word(image: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(image[offset..offset + 4].try_into().unwrap())
}

const MINIMAL: &str = "\
.extra_memory 0
.stack_size 256
.end_header
start:
  quit
";

#[test]
fn minimal_program_header_layout() {
    let image = build_ok(MINIMAL);

    assert_eq!(&image[0..4], &[0x47, 0x6C, 0x75, 0x6C], "magic");
    assert_eq!(&image[4..8], &[0x00, 0x03, 0x01, 0x02], "version");
    assert_eq!(word(&image, 8), 0x100, "ram_start");
    assert_eq!(word(&image, 12), 0x200, "end_memory");
    assert_eq!(word(&image, 16), 0x200, "extended memory end");
    assert_eq!(word(&image, 20), 0x100, "stack_size");
    assert_eq!(word(&image, 24), 0x100, "start address");
    assert_eq!(word(&image, 28), 0, "string table");
    assert_eq!(&image[36..40], b"gasm", "marker");
    assert_eq!(image.len(), 0x200);

    // quit = 0x120, two-byte form, at the start of RAM; the rest of
    // the image is padding.
    assert_eq!(&image[0x100..0x103], &[0x81, 0x20, 0x00]);
}

#[test]
fn minimal_program_checksum_matches_recomputation() {
    let image = build_ok(MINIMAL);
    let stored = word(&image, 32);

    let mut zeroed = image.clone();
    zeroed[32..36].copy_from_slice(&[0, 0, 0, 0]);
    let recomputed = zeroed
        .chunks_exact(4)
        .map(|chunk| u32::from_be_bytes(chunk.try_into().unwrap()))
        .fold(0u32, u32::wrapping_add);

    assert_eq!(stored, recomputed);
}

#[test]
fn assembly_is_deterministic() {
    assert_eq!(build_ok(MINIMAL), build_ok(MINIMAL));
}

#[test]
fn forward_label_backpatch() {
    let image = build_ok(
        ".end_header
start: jump target
target: quit
",
    );

    // jump is opcode 0x20 at 0x100, one type byte (constant, four
    // bytes: 0x03), then the operand.
    assert_eq!(image[0x100], 0x20);
    assert_eq!(image[0x101], 0x03);

    // after = 0x102 + 4; target lands right after the instruction.
    let after = 0x106u32;
    let stored = word(&image, 0x102) as i32;
    assert_eq!(stored, 2, "target - after + 2");

    // Inverting the relative encoding recovers the target position.
    let target = (after as i32 + stored - 2) as u32;
    assert_eq!(target, 0x106);
    assert_eq!(&image[0x106..0x108], &[0x81, 0x20], "quit at target");
}

#[test]
fn backward_branch_is_negative_and_still_four_bytes() {
    let image = build_ok(
        ".end_header
start:
target: jump target
",
    );

    assert_eq!(image[0x100], 0x20);
    assert_eq!(image[0x101], 0x03, "forced four-byte operand");
    // after = 0x106; value = 0x100 - 0x106 + 2 = -4.
    assert_eq!(word(&image, 0x102) as i32, -4);
}

#[test]
fn relative_branch_last_operand_is_always_four_bytes() {
    let image = build_ok(
        ".end_header
start: jz sp next
next: quit
",
    );

    // jz = 0x22; operands sp (stack, size 0) and the branch target
    // (constant, forced size 3): packed type byte 0x38.
    assert_eq!(image[0x100], 0x22);
    assert_eq!(image[0x101], 0x38);
    // after = 0x102 + 0 + 4 = 0x106, next = 0x106.
    assert_eq!(word(&image, 0x102) as i32, 2);
}

#[test]
fn define_resolves_at_emit_time() {
    let image = build_ok(
        ".define X 42
.end_header
start: copy X sp
",
    );

    // copy = 0x40; operands: constant 42 (size 1) then stack: type
    // byte 0x81; payload byte 42.
    assert_eq!(image[0x100], 0x40);
    assert_eq!(image[0x101], 0x81);
    assert_eq!(image[0x102], 42);
}

#[test]
fn zero_constant_takes_no_payload() {
    let image = build_ok(
        ".end_header
start: copy 0 sp
",
    );
    assert_eq!(image[0x100], 0x40);
    // constant size 0 (value 0), stack: type byte 0x80, no payload.
    assert_eq!(image[0x101], 0x80);
    assert_eq!(image[0x102], 0x00);
}

#[test]
fn operand_size_classes_select_payload_width() {
    let image = build_ok(
        ".end_header
start:
  copy 127 sp
  copy 128 sp
  copy $8000 sp
",
    );

    let mut at = 0x100;
    // copy 127: one-byte payload.
    assert_eq!(image[at], 0x40);
    assert_eq!(image[at + 1], 0x81);
    assert_eq!(image[at + 2], 127);
    at += 3;
    // copy 128: two-byte payload.
    assert_eq!(image[at], 0x40);
    assert_eq!(image[at + 1], 0x82);
    assert_eq!(&image[at + 2..at + 4], &128u16.to_be_bytes());
    at += 4;
    // copy $8000 (32768, past the signed 16-bit range): four bytes.
    assert_eq!(image[at], 0x40);
    assert_eq!(image[at + 1], 0x83);
    assert_eq!(word(&image, at + 2), 0x8000);
}

#[test]
fn string_directives_emit_expected_bytes() {
    let image = build_ok(
        ".end_header
start: quit
text: .string \"Hi\"
raw: .cstring \"Hi\"
uni: .unicode \"Hi\"
",
    );

    let text = 0x102;
    assert_eq!(&image[text..text + 4], &[0xE0, b'H', b'i', 0x00]);
    let raw = text + 4;
    assert_eq!(&image[raw..raw + 3], &[b'H', b'i', 0x00]);
    let uni = raw + 3;
    assert_eq!(&image[uni..uni + 4], &[0xE2, 0, 0, 0]);
    assert_eq!(word(&image, uni + 4), 'H' as u32);
    assert_eq!(word(&image, uni + 8), 'i' as u32);
    assert_eq!(word(&image, uni + 12), 0);
}

#[test]
fn encoded_string_and_table() {
    let result = build(
        ".end_header
start: quit
table: .string_table
text: .encoded \"AAB\"
",
    );
    let image = result.image.expect("build should succeed");

    // Frequencies: A:2, B:1, terminator:1 -> three leaves plus two
    // branches.
    let table = 0x102;
    assert_eq!(result.info.string_table_position, table as u32);
    assert_eq!(word(&image, 28), table as u32, "header points at table");

    // 5 nodes: three leaves and two branches; size word counts the
    // 12-byte header plus 9 + 9 + 2 + 2 + 1 node bytes.
    assert_eq!(word(&image, table), 12 + 23);
    assert_eq!(word(&image, table + 4), 5);
    // Pre-order: the root is the first node, a branch (tag 0).
    assert_eq!(word(&image, table + 8), table as u32 + 12);
    assert_eq!(image[table + 12], 0);

    // The encoded string starts right after the 35-byte table.
    let encoded = table + 35;
    assert_eq!(image[encoded], 0xE1);

    // Decoding the payload recovers the original code points.
    let decoded = result.info.strings.decode(&image[encoded + 1..]);
    let expected: Vec<u32> = "AAB".chars().map(|c| c as u32).collect();
    assert_eq!(decoded, expected);
}

#[test]
fn byte_data_with_forward_reference() {
    let image = build_ok(
        ".end_header
start: quit
values: .byte 1 2 target
target: quit
",
    );

    let values = 0x102;
    assert_eq!(image[values], 1);
    assert_eq!(image[values + 1], 2);
    // target = values + 3 = 0x105; patched at one-byte width.
    assert_eq!(image[values + 2], 0x05);
    assert_eq!(&image[0x105..0x107], &[0x81, 0x20]);
}

#[test]
fn word_data_and_expressions() {
    let image = build_ok(
        ".define BASE 1000
.end_header
start: quit
values: .word BASE + 24 -1
",
    );
    let values = 0x102;
    assert_eq!(word(&image, values), 1024);
    assert_eq!(word(&image, values + 4) as i32, -1);
}

#[test]
fn function_prolog_with_named_locals() {
    let image = build_ok(
        ".end_header
.function a b
start:
  copy 9 a
  copy a b
  quit
",
    );

    // Prolog: 0xC1 (locals-based), format pair (4, 2), terminator.
    assert_eq!(&image[0x100..0x105], &[0xC1, 0x04, 0x02, 0x00, 0x00]);

    // copy 9 a: constant 9 (size 1), local offset 0 (size 1): type
    // byte 0x91; payloads 9 then 0.
    let copy1 = 0x105;
    assert_eq!(image[copy1], 0x40);
    assert_eq!(image[copy1 + 1], 0x91);
    assert_eq!(image[copy1 + 2], 9);
    assert_eq!(image[copy1 + 3], 0);

    // copy a b: locals at offsets 0 and 4: type byte 0x99.
    let copy2 = copy1 + 4;
    assert_eq!(image[copy2], 0x40);
    assert_eq!(image[copy2 + 1], 0x99);
    assert_eq!(image[copy2 + 2], 0);
    assert_eq!(image[copy2 + 3], 4);
}

#[test]
fn stack_function_prolog() {
    let image = build_ok(
        ".end_header
.function stk 300
start: quit
",
    );

    // 0xC0, then (4, 255) and (4, 45) pairs for 300 locals, then the
    // terminator.
    assert_eq!(
        &image[0x100..0x107],
        &[0xC0, 0x04, 0xFF, 0x04, 45, 0x00, 0x00]
    );
}

#[test]
fn new_function_closes_previous_scope() {
    let result = build(
        ".end_header
.function a
.function b
start: copy a sp
",
    );
    // `a` is out of scope in the second function, so it is treated as
    // an undefined label at finalize.
    assert!(result.image.is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("unknown identifier ~a~")));
}

#[test]
fn local_shadowing_global_is_an_error() {
    let result = build(
        ".define size 4
.end_header
.function size
start: quit
",
    );
    assert!(result.image.is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("shadowed by global")));
}

#[test]
fn duplicate_local_is_an_error() {
    let result = build(
        ".end_header
.function x x
start: quit
",
    );
    assert!(result.image.is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("duplicate named local")));
}

#[test]
fn pad_and_zero_directives() {
    let image = build_ok(
        ".end_header
start: quit
.pad 16
marker: .byte 255
.zero 3
tail: .byte 254
",
    );

    // quit ends at 0x102; .pad 16 fills to 0x110.
    assert!(image[0x102..0x110].iter().all(|&b| b == 0));
    assert_eq!(image[0x110], 255);
    assert_eq!(&image[0x111..0x114], &[0, 0, 0]);
    assert_eq!(image[0x114], 254);
}

#[test]
fn custom_opcode_directive() {
    let image = build_ok(
        ".end_header
start: opcode $150 1, 2, 3, 4, 5, 6, 7, sp
",
    );

    // 0x150 needs the two-byte opcode form.
    assert_eq!(&image[0x100..0x102], &[0x81, 0x50]);
    // Eight operands: seven one-byte constants and the stack.
    assert_eq!(&image[0x102..0x106], &[0x11, 0x11, 0x11, 0x81]);
    assert_eq!(&image[0x106..0x10D], &[1, 2, 3, 4, 5, 6, 7]);
}

#[test]
fn custom_opcode_relative() {
    let image = build_ok(
        ".end_header
start: opcode rel $22 sp, next
next: quit
",
    );
    // Identical encoding to `jz sp next`.
    assert_eq!(image[0x100], 0x22);
    assert_eq!(image[0x101], 0x38);
    assert_eq!(word(&image, 0x102) as i32, 2);
}

#[test]
fn include_binary_copies_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blob.bin");
    std::fs::write(&path, [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x0A]).unwrap();

    let image = build_ok(&format!(
        ".end_header
start: quit
blob: .include_binary \"{}\"
",
        path.display()
    ));
    assert_eq!(&image[0x102..0x108], &[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x0A]);
}

#[test]
fn missing_end_header_is_an_error() {
    let result = build("start: quit\n");
    assert!(result.image.is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("missing .end_header")));
}

#[test]
fn missing_start_label_is_an_error() {
    let result = build(".end_header\nnop\n");
    assert!(result.image.is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("missing start label")));
}

#[test]
fn duplicate_label_is_an_error() {
    let result = build(
        ".end_header
start: quit
start: quit
",
    );
    assert!(result.image.is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("could not create label")));
}

#[test]
fn extra_memory_must_be_multiple_of_256() {
    let result = build(".extra_memory 100\n.end_header\nstart: quit\n");
    assert!(result.image.is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("must be multiple of 256")));
}

#[test]
fn stack_size_must_be_multiple_of_256() {
    let result = build(".stack_size 100\n.end_header\nstart: quit\n");
    assert!(result.image.is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("must be multiple of 256")));
}

#[test]
fn encoded_without_string_table_is_an_error() {
    let result = build(
        ".end_header
start: quit
text: .encoded \"hello\"
",
    );
    assert!(result.image.is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains(".string_table")));
}

#[test]
fn wrong_operand_count_is_an_error() {
    let result = build(".end_header\nstart: copy 1\n");
    assert!(result.image.is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("bad operand count for copy; expected 2, but found 1")));
}

#[test]
fn unknown_mnemonic_is_an_error() {
    let result = build(".end_header\nstart: frobnicate\n");
    assert!(result.image.is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("unknown mnemonic frobnicate")));
}

#[test]
fn undefined_identifier_reported_at_finalize() {
    let result = build(".end_header\nstart: jump nowhere\n");
    assert!(result.image.is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("unknown identifier ~nowhere~")));
}

#[test]
fn truncation_is_a_warning_not_an_error() {
    let result = build(
        ".end_header
start: quit
values: .short target
.pad 256
.zero 65536
target: .byte 1
",
    );
    // target sits past 0xFFFF, so the two-byte patch truncates.
    assert!(result.image.is_some());
    assert!(result.diagnostics.warning_count() >= 1);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("larger than storage specification")));
}

#[test]
fn reserved_symbols_are_defined() {
    let result = build(
        ".extra_memory 512
.end_header
start: quit
",
    );
    assert!(result.image.is_some());
    assert_eq!(result.info.symbols.lookup("_RAMSTART"), Some(0x100));
    assert_eq!(result.info.symbols.lookup("_EXTSTART"), Some(0x200));
    assert_eq!(result.info.symbols.lookup("_ENDMEM"), Some(0x400));
}

#[test]
fn extstart_usable_in_data() {
    let image = build_ok(
        ".end_header
start: quit
mem: .word _ENDMEM
",
    );
    // _ENDMEM = end_memory (0x200) + 0.
    assert_eq!(word(&image, 0x102), 0x200);
}

#[test]
fn header_marker_and_timestamp_slot() {
    let image = build_ok(".end_header\nstart: quit\n");
    assert_eq!(&image[36..40], b"gasm");
    assert_eq!(&image[40..52], &[0u8; 12], "default timestamp is blank");
}
