//! Symbol module - The global label table.
//!
//! Labels, `.define` constants, and the reserved symbols the emitter
//! injects (`_RAMSTART`, `_EXTSTART`, `_ENDMEM`) all live here. Names
//! are unique; a second definition of the same name fails. The table is
//! insertion-ordered so `-dump-labels` output is deterministic.

use std::io::{self, Write};

use indexmap::IndexMap;
use thiserror::Error;

/// Returned when a name is defined a second time.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("name `{0}` is already in use")]
pub struct Redefinition(pub String);

/// Map from symbol name to its 32-bit value.
///
/// # Examples
///
/// ```
/// use gasm_util::symbol::SymbolTable;
///
/// let mut symbols = SymbolTable::new();
/// symbols.define("start", 0x100).unwrap();
///
/// assert_eq!(symbols.lookup("start"), Some(0x100));
/// assert!(symbols.define("start", 0x200).is_err());
/// ```
#[derive(Debug, Default)]
pub struct SymbolTable {
    map: IndexMap<String, i32>,
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a symbol. Fails if the name already exists; the existing
    /// value is left untouched.
    pub fn define(&mut self, name: &str, value: i32) -> Result<(), Redefinition> {
        if self.map.contains_key(name) {
            return Err(Redefinition(name.to_string()));
        }
        self.map.insert(name.to_string(), value);
        Ok(())
    }

    /// Look up a symbol's value.
    pub fn lookup(&self, name: &str) -> Option<i32> {
        self.map.get(name).copied()
    }

    /// True if the name is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Number of defined symbols.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True if no symbols are defined.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate over (name, value) pairs in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.map.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Write the table in `-dump-labels` format, one
    /// `0xXXXXXXXX  name` line per symbol.
    pub fn dump(&self, out: &mut dyn Write) -> io::Result<()> {
        for (name, value) in self.iter() {
            writeln!(out, "0x{:08X}  {}", value as u32, name)?;
        }
        Ok(())
    }
}
