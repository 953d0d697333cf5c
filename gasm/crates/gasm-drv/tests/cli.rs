//! End-to-end tests driving the `gasm` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const MINIMAL: &str = "\
.extra_memory 0
.stack_size 256
.end_header
start:
  quit
";

fn gasm(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("gasm").unwrap();
    cmd.current_dir(dir.path());
    cmd
}

fn write_source(dir: &TempDir, name: &str, contents: &str) {
    std::fs::write(dir.path().join(name), contents).unwrap();
}

fn read_output(dir: &TempDir, name: &str) -> Vec<u8> {
    std::fs::read(dir.path().join(name)).unwrap()
}

fn word(image: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(image[offset..offset + 4].try_into().unwrap())
}

#[test]
fn assembles_minimal_program() {
    let dir = TempDir::new().unwrap();
    write_source(&dir, "input.ga", MINIMAL);

    gasm(&dir)
        .args(["-timestamp", "202503010830"])
        .assert()
        .success();

    let image = read_output(&dir, "output.ulx");
    assert_eq!(&image[0..4], &[0x47, 0x6C, 0x75, 0x6C]);
    assert_eq!(&image[4..8], &[0x00, 0x03, 0x01, 0x02]);
    assert_eq!(word(&image, 8), 0x100);
    assert_eq!(word(&image, 12), 0x200);
    assert_eq!(word(&image, 20), 0x100);
    assert_eq!(word(&image, 24), 0x100);
    assert_eq!(&image[36..40], b"gasm");
    assert_eq!(&image[40..52], b"202503010830");
    assert_eq!(&image[0x100..0x102], &[0x81, 0x20]);
}

#[test]
fn explicit_file_arguments() {
    let dir = TempDir::new().unwrap();
    write_source(&dir, "game.ga", MINIMAL);

    gasm(&dir)
        .args(["game.ga", "game.ulx", "-timestamp", "x"])
        .assert()
        .success();

    assert!(dir.path().join("game.ulx").exists());
}

#[test]
fn fixed_timestamp_builds_are_byte_identical() {
    let dir = TempDir::new().unwrap();
    write_source(&dir, "input.ga", MINIMAL);

    gasm(&dir)
        .args(["-timestamp", "FIXED", "input.ga", "first.ulx"])
        .assert()
        .success();
    gasm(&dir)
        .args(["-timestamp", "FIXED", "input.ga", "second.ulx"])
        .assert()
        .success();

    assert_eq!(read_output(&dir, "first.ulx"), read_output(&dir, "second.ulx"));
}

#[test]
fn reads_source_from_stdin() {
    let dir = TempDir::new().unwrap();

    gasm(&dir)
        .args(["-timestamp", "x", "-"])
        .write_stdin(MINIMAL)
        .assert()
        .success();

    let image = read_output(&dir, "output.ulx");
    assert_eq!(&image[0..4], &[0x47, 0x6C, 0x75, 0x6C]);
}

#[test]
fn missing_input_file_fails() {
    let dir = TempDir::new().unwrap();

    gasm(&dir)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("could not open source file"));
}

#[test]
fn checksum_survives_round_trip() {
    let dir = TempDir::new().unwrap();
    write_source(&dir, "input.ga", MINIMAL);
    gasm(&dir).args(["-timestamp", "x"]).assert().success();

    let image = read_output(&dir, "output.ulx");
    let stored = word(&image, 32);
    let mut zeroed = image.clone();
    zeroed[32..36].fill(0);
    let sum = zeroed
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes(c.try_into().unwrap()))
        .fold(0u32, u32::wrapping_add);
    assert_eq!(stored, sum);
}

#[test]
fn dump_files_are_written() {
    let dir = TempDir::new().unwrap();
    write_source(
        &dir,
        "input.ga",
        ".define X 7\n.end_header\nstart: jump fin\nfin: quit\n",
    );

    gasm(&dir)
        .args([
            "-dump-pretokens",
            "-dump-tokens",
            "-dump-labels",
            "-dump-patches",
            "-dump-debug",
            "-timestamp",
            "x",
        ])
        .assert()
        .success();

    let pretokens = std::fs::read_to_string(dir.path().join("out_pretokens.txt")).unwrap();
    assert!(pretokens.contains(".define"));

    let tokens = std::fs::read_to_string(dir.path().join("out_tokens.txt")).unwrap();
    // Preprocessing removed the .define line.
    assert!(!tokens.contains(".define"));
    assert!(tokens.contains("identifier ~start~"));

    let labels = std::fs::read_to_string(dir.path().join("out_labels.txt")).unwrap();
    assert!(labels.contains("start"));
    assert!(labels.contains("X"));
    assert!(labels.contains("_RAMSTART"));

    let patches = std::fs::read_to_string(dir.path().join("out_patches.txt")).unwrap();
    assert!(patches.contains("fin"));

    let debug = std::fs::read_to_string(dir.path().join("out_debug.txt")).unwrap();
    assert!(debug.contains("~jump~"));
}

#[test]
fn string_table_dump() {
    let dir = TempDir::new().unwrap();
    write_source(
        &dir,
        "input.ga",
        ".end_header\nstart: quit\ntable: .string_table\ntext: .encoded \"AB\"\n",
    );

    gasm(&dir)
        .args(["-dump-stringtable", "-timestamp", "x"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Compressed"));

    let dump = std::fs::read_to_string(dir.path().join("out_strings.txt")).unwrap();
    assert!(dump.contains("NODES"));
    assert!(dump.contains("BRANCH"));
}

#[test]
fn misaligned_extra_memory_fails_with_message() {
    let dir = TempDir::new().unwrap();
    write_source(
        &dir,
        "input.ga",
        ".extra_memory 100\n.end_header\nstart: quit\n",
    );

    gasm(&dir)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains(
            "extra memory must be multiple of 256",
        ));
    assert!(!dir.path().join("output.ulx").exists());
}

#[test]
fn failed_build_removes_stale_output() {
    let dir = TempDir::new().unwrap();
    write_source(&dir, "input.ga", MINIMAL);
    gasm(&dir).args(["-timestamp", "x"]).assert().success();
    assert!(dir.path().join("output.ulx").exists());

    // Break the source; the old image must not survive the failure.
    write_source(&dir, "input.ga", ".end_header\nstart: jump nowhere\n");
    gasm(&dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown identifier ~nowhere~"));
    assert!(!dir.path().join("output.ulx").exists());
}

#[test]
fn include_cycle_fails_without_hanging() {
    let dir = TempDir::new().unwrap();
    write_source(&dir, "a.ga", ".include \"a.ga\"\n.end_header\nstart: quit\n");
    write_source(&dir, "input.ga", ".include \"a.ga\"\n");

    gasm(&dir)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("recursive include"));
}

#[test]
fn include_splices_across_files() {
    let dir = TempDir::new().unwrap();
    write_source(&dir, "defs.ga", ".define VALUE 65\n");
    write_source(
        &dir,
        "input.ga",
        ".include \"defs.ga\"\n.end_header\nstart: copy VALUE sp\n",
    );

    gasm(&dir).args(["-timestamp", "x"]).assert().success();
    let image = read_output(&dir, "output.ulx");
    assert_eq!(image[0x100], 0x40);
    assert_eq!(image[0x101], 0x81);
    assert_eq!(image[0x102], 65);
}

#[test]
fn diagnostics_carry_origin() {
    let dir = TempDir::new().unwrap();
    write_source(&dir, "input.ga", ".end_header\nstart: quit\nbad: frobnicate\n");

    gasm(&dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("input.ga:3:6"))
        .stderr(predicate::str::contains("unknown mnemonic frobnicate"));
}

#[test]
fn no_time_timestamp_is_date_only() {
    let dir = TempDir::new().unwrap();
    write_source(&dir, "input.ga", MINIMAL);

    gasm(&dir).arg("-no-time").assert().success();

    let image = read_output(&dir, "output.ulx");
    let stamp = &image[40..52];
    // Eight digits of date, then zero padding.
    assert!(stamp[..8].iter().all(|b| b.is_ascii_digit()));
    assert_eq!(&stamp[8..], &[0, 0, 0, 0]);
}

#[test]
fn overlong_timestamp_is_rejected() {
    let dir = TempDir::new().unwrap();
    write_source(&dir, "input.ga", MINIMAL);

    gasm(&dir)
        .args(["-timestamp", "1234567890123"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("max custom timestamp length"));
}
