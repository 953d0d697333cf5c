//! Token types produced by the lexer.
//!
//! Tokens form an ordered sequence (`Vec<Token>`); the preprocessor
//! splices and removes entries, the emitter walks them read-only.

use std::fmt;
use std::io::{self, Write};

use gasm_util::origin::Origin;

/// Expression operator kinds.
///
/// The lexer only produces `Add` and `Subtract` (the `+` and `-`
/// punctuation); the remaining kinds exist for the operand evaluator's
/// binary nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    ShiftLeft,
    ShiftRight,
    BitAnd,
    BitOr,
    BitXor,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::ShiftLeft => "<<",
            Operator::ShiftRight => ">>",
            Operator::BitAnd => "&",
            Operator::BitOr => "|",
            Operator::BitXor => "^",
        };
        write!(f, "{}", text)
    }
}

/// The kind of a single token.
///
/// Float literals never survive past token construction: they are
/// reinterpreted as `Integer` carrying the IEEE-754 bit pattern.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    /// A name: label, mnemonic, or local variable.
    Identifier(String),
    /// A directive, text including the leading dot (`.include`).
    Directive(String),
    /// A 32-bit integer value (or a float's bit pattern).
    Integer(i32),
    /// A string literal, escapes already processed.
    Str(String),
    /// `:` after a label name.
    Colon,
    /// `#`, the local-variable operand prefix.
    LocalMarker,
    /// `*`, the indirect-memory operand prefix.
    IndirectMarker,
    /// `,` between instruction operands.
    Comma,
    /// `+` or `-` punctuation in an expression.
    Operator(Operator),
    /// End of a source line (runs collapse to one).
    Eol,
}

impl TokenKind {
    /// Human-readable kind name for diagnostics, mirroring the dump
    /// format.
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Identifier(_) => "identifier",
            TokenKind::Directive(_) => "directive",
            TokenKind::Integer(_) => "integer",
            TokenKind::Str(_) => "string",
            TokenKind::Colon => "colon",
            TokenKind::LocalMarker => "local",
            TokenKind::IndirectMarker => "indirect",
            TokenKind::Comma => "comma",
            TokenKind::Operator(_) => "operator",
            TokenKind::Eol => "EOL",
        }
    }
}

/// One token with its source origin.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub origin: Origin,
}

impl Token {
    pub fn new(kind: TokenKind, origin: Origin) -> Self {
        Self { kind, origin }
    }

    /// True for the end-of-line token.
    pub fn is_eol(&self) -> bool {
        matches!(self.kind, TokenKind::Eol)
    }

    /// True if this is an identifier with exactly the given text.
    pub fn is_identifier(&self, text: &str) -> bool {
        matches!(&self.kind, TokenKind::Identifier(name) if name == text)
    }

    /// True if this is a directive with exactly the given text
    /// (including the leading dot).
    pub fn is_directive(&self, text: &str) -> bool {
        matches!(&self.kind, TokenKind::Directive(name) if name == text)
    }
}

/// Escape a string for dump output: newlines, carriage returns, and
/// tabs become their two-character escapes, and text beyond
/// `max_length` bytes is replaced with `...`.
pub fn escape_for_dump(text: &str, max_length: usize) -> String {
    let mut result = String::new();
    let mut truncated = false;
    for (count, c) in text.chars().enumerate() {
        if count >= max_length {
            truncated = true;
            break;
        }
        match c {
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            _ => result.push(c),
        }
    }
    if truncated {
        result.push_str("...");
    }
    result
}

/// Write a token list in the `-dump-pretokens` / `-dump-tokens`
/// format: one `file:line:col  :  kind` line per token, with the text
/// payload between tildes and integer values after `i:`.
pub fn dump_tokens(out: &mut dyn Write, tokens: &[Token]) -> io::Result<()> {
    for token in tokens {
        write!(
            out,
            "{}:{}:{}  :  {} ",
            token.origin.filename, token.origin.line, token.origin.column,
            token.kind.name()
        )?;
        match &token.kind {
            TokenKind::Identifier(text) | TokenKind::Directive(text) | TokenKind::Str(text) => {
                write!(out, "~{}~", escape_for_dump(text, 2_000_000_000))?;
            }
            TokenKind::Operator(op) => write!(out, "~{}~", op)?,
            _ => write!(out, "(null)")?,
        }
        if let TokenKind::Integer(value) = token.kind {
            write!(out, "  i:{}", value)?;
        }
        writeln!(out)?;
    }
    Ok(())
}
