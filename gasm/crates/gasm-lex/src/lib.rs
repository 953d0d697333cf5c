//! gasm-lex - Lexical analysis for Glulx assembly source.
//!
//! The lexer reads one source file (loaded fully into memory) and
//! produces an ordered token sequence, or a non-empty diagnostic list
//! when the source is unusable. Every token carries the origin of the
//! source byte that produced its first character.
//!
//! Rule order matters and is fixed: line endings, line continuations,
//! comments, whitespace, punctuation, `$hex`, numbers, identifiers and
//! directives, string literals, character literals. A synthetic
//! end-of-line token is appended before returning so later stages can
//! end every statement uniformly.

pub mod cursor;
pub mod token;

use std::sync::Arc;

use gasm_util::buffer::ByteBuffer;
use gasm_util::diagnostic::Diagnostics;
use gasm_util::origin::Origin;
use gasm_util::utf8;

use cursor::Cursor;
pub use token::{dump_tokens, escape_for_dump, Operator, Token, TokenKind};

/// The filename reported for tokens read from standard input.
pub const STDIN_NAME: &str = "(stdin)";

/// Lex a source file. The filename `-` means standard input.
///
/// Returns the token sequence, or the accumulated diagnostics if any
/// lexical error occurred (including an unreadable file).
pub fn lex_file(filename: &str) -> Result<Vec<Token>, Diagnostics> {
    let (display_name, loaded) = if filename == "-" {
        (STDIN_NAME, ByteBuffer::from_stdin())
    } else {
        (filename, ByteBuffer::from_file(filename.as_ref()))
    };

    let buffer = match loaded {
        Ok(buffer) => buffer,
        Err(err) => {
            let mut diagnostics = Diagnostics::new();
            diagnostics.error(
                None,
                format!("could not open source file `{}`: {}", filename, err),
            );
            return Err(diagnostics);
        }
    };

    lex_bytes(display_name, buffer.as_slice())
}

/// Lex an in-memory source text under the given display name.
pub fn lex_bytes(filename: &str, bytes: &[u8]) -> Result<Vec<Token>, Diagnostics> {
    Lexer::new(filename, bytes).run()
}

struct Lexer<'a> {
    cursor: Cursor<'a>,
    filename: Arc<str>,
    tokens: Vec<Token>,
    diagnostics: Diagnostics,
}

impl<'a> Lexer<'a> {
    fn new(filename: &str, bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
            filename: Arc::from(filename),
            tokens: Vec::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    fn origin_here(&self) -> Origin {
        Origin {
            filename: Arc::clone(&self.filename),
            line: self.cursor.line(),
            column: self.cursor.column(),
            synthetic: false,
        }
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let origin = self.origin_here();
        self.diagnostics.error(Some(origin), message);
    }

    fn push(&mut self, kind: TokenKind, origin: Origin) {
        self.tokens.push(Token::new(kind, origin));
    }

    fn run(mut self) -> Result<Vec<Token>, Diagnostics> {
        while let Some(byte) = self.cursor.peek() {
            match byte {
                b'\n' | b'\r' => {
                    let origin = self.origin_here();
                    self.push(TokenKind::Eol, origin);
                    while matches!(self.cursor.peek(), Some(b'\n') | Some(b'\r')) {
                        self.cursor.bump();
                    }
                }
                b'\\' => {
                    let origin = self.origin_here();
                    self.cursor.bump();
                    if matches!(self.cursor.peek(), Some(b'\n') | Some(b'\r')) {
                        self.cursor.bump();
                    } else {
                        self.diagnostics.error(
                            Some(origin),
                            "unexpected character; \\ only permitted at end of line",
                        );
                    }
                }
                b';' => {
                    while !matches!(self.cursor.peek(), None | Some(b'\n')) {
                        self.cursor.bump();
                    }
                }
                b' ' | b'\t' | 0x0B | 0x0C => {
                    self.cursor.bump();
                }
                b',' => {
                    let origin = self.origin_here();
                    self.cursor.bump();
                    self.push(TokenKind::Comma, origin);
                }
                b'+' => {
                    let origin = self.origin_here();
                    self.cursor.bump();
                    self.push(TokenKind::Operator(Operator::Add), origin);
                }
                b'-' => {
                    if matches!(self.cursor.peek_at(1), Some(b) if b.is_ascii_digit()) {
                        self.lex_number();
                    } else {
                        let origin = self.origin_here();
                        self.cursor.bump();
                        self.push(TokenKind::Operator(Operator::Subtract), origin);
                    }
                }
                b'*' => {
                    let origin = self.origin_here();
                    self.cursor.bump();
                    self.push(TokenKind::IndirectMarker, origin);
                }
                b':' => {
                    let origin = self.origin_here();
                    self.cursor.bump();
                    self.push(TokenKind::Colon, origin);
                }
                b'#' => {
                    let origin = self.origin_here();
                    self.cursor.bump();
                    self.push(TokenKind::LocalMarker, origin);
                }
                b'$' => self.lex_hex(),
                b'0'..=b'9' => self.lex_number(),
                b'A'..=b'Z' | b'a'..=b'z' | b'_' | b'.' => self.lex_identifier(),
                b'"' => {
                    if !self.lex_string_literal() {
                        break;
                    }
                }
                b'\'' => {
                    if !self.lex_char_literal() {
                        break;
                    }
                }
                _ => {
                    self.error_here("unexpected character");
                    self.cursor.bump();
                }
            }
        }

        if self.diagnostics.has_errors() {
            return Err(self.diagnostics);
        }

        // Implicit terminal end-of-line so the parser can end every
        // statement the same way.
        let origin = Origin {
            filename: Arc::clone(&self.filename),
            line: self.cursor.line(),
            column: self.cursor.column(),
            synthetic: true,
        };
        self.push(TokenKind::Eol, origin);
        Ok(self.tokens)
    }

    fn lex_hex(&mut self) {
        let origin = self.origin_here();
        self.cursor.bump(); // '$'
        let start = self.cursor.position();
        while matches!(self.cursor.peek(), Some(b) if b.is_ascii_hexdigit()) {
            self.cursor.bump();
        }
        let digits = self.cursor.slice_from(start);
        if digits.is_empty() {
            self.diagnostics
                .error(Some(origin), "expected hexadecimal digits after '$'");
            return;
        }
        let text = std::str::from_utf8(digits).unwrap_or("");
        match u64::from_str_radix(text, 16) {
            Ok(value) if value <= u32::MAX as u64 => {
                self.push(TokenKind::Integer(value as u32 as i32), origin);
            }
            _ => {
                self.diagnostics
                    .error(Some(origin), format!("hexadecimal value ${} out of range", text));
            }
        }
    }

    fn lex_number(&mut self) {
        let origin = self.origin_here();
        let start = self.cursor.position();
        if self.cursor.peek() == Some(b'-') {
            self.cursor.bump();
        }

        let mut found_dot = false;
        let mut bad_dot = false;
        while let Some(byte) = self.cursor.peek() {
            if byte == b'.' {
                if found_dot && !bad_dot {
                    bad_dot = true;
                    self.diagnostics
                        .error(Some(origin.clone()), "malformed floating point number");
                }
                found_dot = true;
            } else if !byte.is_ascii_digit() {
                break;
            }
            self.cursor.bump();
        }
        if bad_dot {
            return;
        }

        let text = std::str::from_utf8(self.cursor.slice_from(start)).unwrap_or("");
        if found_dot {
            match text.parse::<f32>() {
                Ok(value) => self.push(TokenKind::Integer(value.to_bits() as i32), origin),
                Err(_) => self
                    .diagnostics
                    .error(Some(origin), "malformed floating point number"),
            }
        } else {
            match text.parse::<i64>() {
                Ok(value) if (i32::MIN as i64..=u32::MAX as i64).contains(&value) => {
                    self.push(TokenKind::Integer(value as i32), origin);
                }
                _ => self
                    .diagnostics
                    .error(Some(origin), format!("integer value {} out of range", text)),
            }
        }
    }

    fn lex_identifier(&mut self) {
        let origin = self.origin_here();
        let start = self.cursor.position();
        self.cursor.bump();
        while matches!(self.cursor.peek(), Some(b) if is_identifier_byte(b)) {
            self.cursor.bump();
        }
        let bytes = self.cursor.slice_from(start);
        let text = String::from_utf8_lossy(bytes).into_owned();
        if text == "." {
            self.diagnostics
                .error(Some(origin), "found zero length directive");
            return;
        }
        if text.starts_with('.') {
            self.push(TokenKind::Directive(text), origin);
        } else {
            self.push(TokenKind::Identifier(text), origin);
        }
    }

    /// Collect the raw bytes of a quoted literal, not including the
    /// quotes. Returns `None` (after reporting) if the literal never
    /// terminates; lexing cannot usefully continue past that.
    fn read_quoted(&mut self, quote: u8) -> Option<Vec<u8>> {
        let origin = self.origin_here();
        self.cursor.bump(); // opening quote
        let mut raw = Vec::new();
        let mut escaped = false;
        loop {
            match self.cursor.bump() {
                None => {
                    self.diagnostics.error(Some(origin), "unterminated string");
                    return None;
                }
                Some(byte) => {
                    if !escaped && byte == quote {
                        return Some(raw);
                    }
                    escaped = !escaped && byte == b'\\';
                    raw.push(byte);
                }
            }
        }
    }

    fn lex_string_literal(&mut self) -> bool {
        let origin = self.origin_here();
        let raw = match self.read_quoted(b'"') {
            Some(raw) => raw,
            None => return false,
        };
        let (text, bad_escape) = cleanup_string(&raw);
        if let Some(c) = bad_escape {
            self.diagnostics.error(
                Some(origin.clone()),
                format!("string contains invalid escape code '\\{}'", c),
            );
        }
        self.push(TokenKind::Str(text), origin);
        true
    }

    fn lex_char_literal(&mut self) -> bool {
        let origin = self.origin_here();
        let raw = match self.read_quoted(b'\'') {
            Some(raw) => raw,
            None => return false,
        };
        if raw.is_empty() {
            self.diagnostics
                .error(Some(origin), "empty character literal");
            return true;
        }
        let (text, bad_escape) = cleanup_string(&raw);
        if let Some(c) = bad_escape {
            self.diagnostics.error(
                Some(origin.clone()),
                format!("character literal contains invalid escape code '\\{}'", c),
            );
        }

        let bytes = text.as_bytes();
        if bytes.is_empty() {
            self.diagnostics
                .error(Some(origin), "empty character literal");
            return true;
        }
        let (codepoint, advance) = utf8::decode_char(bytes, 0);
        if advance < bytes.len() {
            self.diagnostics
                .error(Some(origin.clone()), "character literal too long");
        }
        self.push(TokenKind::Integer(codepoint as i32), origin);
        true
    }
}

fn is_identifier_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Process a raw string-literal body: collapse source newlines (with
/// their surrounding whitespace) to a single space, except directly
/// after an explicit `\n` escape where the run disappears entirely;
/// then substitute the recognized escapes `\\`, `\"`, `\'`, `\n`.
///
/// Returns the processed text together with the first invalid escape
/// character, if one was found (processing stops there, as the
/// remaining text cannot be trusted).
pub fn cleanup_string(raw: &[u8]) -> (String, Option<char>) {
    let mut text = raw.to_vec();

    // Collapse newlines that come from the source layout.
    let mut i = 0;
    while i < text.len() {
        if text[i] != b'\n' {
            i += 1;
            continue;
        }
        let mut start = i + 1;
        let mut end = i + 1;
        while start > 0 && text[start - 1].is_ascii_whitespace() {
            start -= 1;
        }
        while end < text.len() && text[end].is_ascii_whitespace() {
            end += 1;
        }
        if start > 1 && text[start - 1] == b'n' && text[start - 2] == b'\\' {
            // An explicit \n escape precedes: the layout whitespace
            // disappears entirely.
            text.drain(start..end);
        } else {
            text[start] = b' ';
            text.drain(start + 1..end);
        }
        i = start + 1;
    }

    // Substitute escapes.
    let mut bad_escape = None;
    let mut i = 0;
    while i < text.len() {
        if text[i] != b'\\' {
            i += 1;
            continue;
        }
        if i + 1 >= text.len() {
            bad_escape = Some('\0');
            break;
        }
        match text[i + 1] {
            b'"' | b'\'' | b'\\' => text[i] = text[i + 1],
            b'n' => text[i] = b'\n',
            other => {
                bad_escape = Some(other as char);
                break;
            }
        }
        text.remove(i + 1);
        i += 1;
    }

    (String::from_utf8_lossy(&text).into_owned(), bad_escape)
}
