//! A cursor over a token sequence.
//!
//! Statements end at an end-of-line token, and the lexer guarantees a
//! terminal one, so "skip to the next line" is always well defined.

use gasm_lex::{Token, TokenKind};
use gasm_util::diagnostic::Diagnostics;

/// Read-only cursor over a slice of tokens.
pub struct TokenStream<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TokenStream<'a> {
    /// Create a stream at the start of `tokens`.
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    /// The next unconsumed token.
    pub fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    /// The token `offset` positions ahead.
    pub fn peek_at(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset)
    }

    /// Consume and return the next token.
    pub fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    /// Consume the next token without looking at it.
    pub fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// True once every token has been consumed.
    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// True if the next token ends the line (or the stream is done).
    pub fn at_eol(&self) -> bool {
        match self.peek() {
            Some(token) => token.is_eol(),
            None => true,
        }
    }

    /// Current position, usable with [`TokenStream::new`] slicing.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Skip forward past the next end-of-line token.
    pub fn skip_line(&mut self) {
        while let Some(token) = self.next() {
            if token.is_eol() {
                break;
            }
        }
    }

    /// Expect the statement to be over: consume the end-of-line, or
    /// report the excess tokens once and skip past them.
    pub fn expect_eol(&mut self, diagnostics: &mut Diagnostics) -> bool {
        match self.peek() {
            None => true,
            Some(token) if token.is_eol() => {
                self.advance();
                true
            }
            Some(token) => {
                diagnostics.error(
                    Some(token.origin.clone()),
                    "expected EOL (ignoring excess tokens)",
                );
                self.skip_line();
                false
            }
        }
    }
}
