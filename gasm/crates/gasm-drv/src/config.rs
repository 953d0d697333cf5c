//! Command-line configuration.
//!
//! `gasm [options] [infile] [outfile]`. The option spellings use a
//! single dash (`-dump-labels`), so parsing is a plain argument walk;
//! anything that is not a recognized option is taken positionally as
//! the input then the output file. The input name `-` means standard
//! input.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use chrono::Local;

use gasm_gen::TIMESTAMP_SIZE;

/// How the header timestamp is chosen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimestampMode {
    /// Local date and time of day, `YYYYMMDDHHMM`.
    Standard,
    /// Local date only, `YYYYMMDD`.
    NoTime,
    /// A fixed, caller-supplied stamp.
    Custom(String),
}

/// Parsed command-line options.
#[derive(Clone, Debug)]
pub struct Config {
    /// Source file, `-` for standard input.
    pub infile: String,
    /// Output image path.
    pub outfile: PathBuf,
    pub dump_pretokens: bool,
    pub dump_tokens: bool,
    pub dump_labels: bool,
    pub dump_patches: bool,
    pub dump_stringtable: bool,
    pub dump_debug: bool,
    pub timestamp: TimestampMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            infile: "input.ga".to_string(),
            outfile: PathBuf::from("output.ulx"),
            dump_pretokens: false,
            dump_tokens: false,
            dump_labels: false,
            dump_patches: false,
            dump_stringtable: false,
            dump_debug: false,
            timestamp: TimestampMode::Standard,
        }
    }
}

/// Parse command-line arguments (without the program name).
pub fn parse_args<I>(args: I) -> Result<Config>
where
    I: IntoIterator<Item = String>,
{
    let mut config = Config::default();
    let mut positional = 0;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-dump-pretokens" => config.dump_pretokens = true,
            "-dump-tokens" => config.dump_tokens = true,
            "-dump-labels" => config.dump_labels = true,
            "-dump-patches" => config.dump_patches = true,
            "-dump-stringtable" => config.dump_stringtable = true,
            "-dump-debug" => config.dump_debug = true,
            "-no-time" => config.timestamp = TimestampMode::NoTime,
            "-timestamp" => {
                let stamp = args
                    .next()
                    .ok_or_else(|| anyhow!("-timestamp passed but no timestamp provided"))?;
                if stamp.len() > TIMESTAMP_SIZE {
                    return Err(anyhow!(
                        "max custom timestamp length is {}; provided stamp has length of {}",
                        TIMESTAMP_SIZE,
                        stamp.len()
                    ));
                }
                config.timestamp = TimestampMode::Custom(stamp);
            }
            _ => match positional {
                0 => {
                    config.infile = arg;
                    positional = 1;
                }
                1 => {
                    config.outfile = PathBuf::from(arg);
                    positional = 2;
                }
                _ => eprintln!("Unknown argument \"{}\" passed.", arg),
            },
        }
    }

    Ok(config)
}

/// Render the timestamp text for the chosen mode.
pub fn make_timestamp(mode: &TimestampMode) -> String {
    match mode {
        TimestampMode::Standard => Local::now().format("%Y%m%d%H%M").to_string(),
        TimestampMode::NoTime => Local::now().format("%Y%m%d").to_string(),
        TimestampMode::Custom(text) => text.clone(),
    }
}
