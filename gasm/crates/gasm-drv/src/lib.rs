//! gasm-drv - The assembler driver.
//!
//! Orchestrates the pipeline:
//!
//! 1. lex the input file,
//! 2. preprocess (includes, defines, encoded-string frequencies),
//! 3. build the string-compression tree,
//! 4. emit code and finalize the image,
//! 5. write the output file and any requested dump files.
//!
//! Each stage accumulates diagnostics and runs to completion; a
//! stage's errors stop the pipeline only where the next stage needs
//! its output. On a failed build no output image is left behind.

pub mod config;

use std::fs::File;
use std::io::Write;

use anyhow::{bail, Context, Result};
use tracing::info;

use gasm_gen::{assemble, ProgramInfo};
use gasm_lex::{dump_tokens, lex_file, Token};
use gasm_par::preprocess;
use gasm_str::{CharFrequencies, StringTable};
use gasm_util::diagnostic::Diagnostics;

pub use config::{make_timestamp, parse_args, Config, TimestampMode};

/// Run a full assembly for the given configuration.
///
/// Diagnostics are printed to standard error as each stage completes.
/// Returns an error (for a nonzero exit) if any stage failed.
pub fn run(config: &Config) -> Result<()> {
    let mut program = ProgramInfo::new();
    program.set_timestamp(&make_timestamp(&config.timestamp));

    info!(input = %config.infile, "lexing");
    let mut tokens = match lex_file(&config.infile) {
        Ok(tokens) => tokens,
        Err(diagnostics) => {
            print_diagnostics(&diagnostics);
            bail!("errors occurred during lexing");
        }
    };

    if config.dump_pretokens {
        write_token_dump("out_pretokens.txt", &tokens)?;
    }

    info!(tokens = tokens.len(), "preprocessing");
    let mut frequencies = CharFrequencies::new();
    let mut diagnostics = Diagnostics::new();
    preprocess(
        &mut tokens,
        &mut program.symbols,
        &mut frequencies,
        &mut diagnostics,
    );
    print_diagnostics(&diagnostics);
    if diagnostics.has_errors() {
        bail!("errors occurred during preprocessing");
    }

    program.strings = StringTable::build(&frequencies);

    if config.dump_stringtable {
        let mut out = create_dump("out_strings.txt")?;
        program.strings.dump(&mut out)?;
    }
    if config.dump_tokens {
        write_token_dump("out_tokens.txt", &tokens)?;
    }

    let mut debug_out = if config.dump_debug {
        Some(create_dump("out_debug.txt")?)
    } else {
        None
    };

    info!("emitting code");
    let mut diagnostics = Diagnostics::new();
    let image = assemble(
        &tokens,
        &mut program,
        &mut diagnostics,
        debug_out.as_mut().map(|file| file as &mut dyn Write),
    );
    print_diagnostics(&diagnostics);

    let image = match image {
        Some(image) => image,
        None => {
            // A failed build must not leave an image behind, not even
            // a stale one from an earlier run.
            let _ = std::fs::remove_file(&config.outfile);
            bail!("errors occurred during parse & build");
        }
    };

    image
        .write_to_file(&config.outfile)
        .with_context(|| format!("could not write output file `{}`", config.outfile.display()))?;
    info!(output = %config.outfile.display(), bytes = image.len(), "image written");

    if config.dump_labels {
        let mut out = create_dump("out_labels.txt")?;
        program.symbols.dump(&mut out)?;
    }
    if config.dump_patches {
        let mut out = create_dump("out_patches.txt")?;
        program.dump_patches(&mut out)?;
    }

    if program.strings.input_bytes > 0 {
        println!(
            "Compressed {} bytes of text into {} bytes.",
            program.strings.input_bytes, program.strings.output_bytes
        );
    }

    Ok(())
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    for diagnostic in diagnostics.iter() {
        eprintln!("{}", diagnostic);
    }
}

fn create_dump(name: &str) -> Result<File> {
    File::create(name).with_context(|| format!("could not open dump file `{}`", name))
}

fn write_token_dump(name: &str, tokens: &[Token]) -> Result<()> {
    let mut out = create_dump(name)?;
    dump_tokens(&mut out, tokens)?;
    Ok(())
}
