//! Origin module - Source location tracking.
//!
//! Every token, operand expression, and diagnostic carries an [`Origin`]
//! naming the file, line, and column it came from. Items generated
//! internally (the synthetic end-of-line the lexer appends, symbols the
//! finalizer defines) are marked `synthetic` and render without a
//! line/column pair.

use std::fmt;
use std::sync::Arc;

/// Where an item originated in the source text.
///
/// The filename is shared (`Arc<str>`) because every token from a file
/// carries a copy of it.
///
/// # Examples
///
/// ```
/// use gasm_util::origin::Origin;
///
/// let origin = Origin::new("input.ga", 3, 7);
/// assert_eq!(origin.to_string(), "input.ga:3:7");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Origin {
    /// Name of the file the item originated in.
    pub filename: Arc<str>,
    /// Line number (1-based).
    pub line: u32,
    /// Column number (1-based).
    pub column: u32,
    /// Item was generated internally; line/column are meaningless.
    pub synthetic: bool,
}

impl Origin {
    /// Create an origin at a specific file position.
    pub fn new(filename: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        Self {
            filename: filename.into(),
            line,
            column,
            synthetic: false,
        }
    }

    /// Create a synthetic origin for an internally generated item.
    ///
    /// The filename is kept so messages can still say which file (or
    /// output target) the item belongs to.
    pub fn generated(filename: impl Into<Arc<str>>) -> Self {
        Self {
            filename: filename.into(),
            line: 0,
            column: 0,
            synthetic: true,
        }
    }

    /// An origin at the same position but marked synthetic.
    pub fn as_generated(&self) -> Self {
        Self {
            filename: Arc::clone(&self.filename),
            line: self.line,
            column: self.column,
            synthetic: true,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.synthetic {
            write!(f, "{}", self.filename)
        } else {
            write!(f, "{}:{}:{}", self.filename, self.line, self.column)
        }
    }
}
