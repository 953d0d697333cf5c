//! The preprocessing pass.
//!
//! A single walk over the token sequence that:
//!
//! - skips label lines (the emitter handles those),
//! - replaces `.include "path"` with the named file's tokens, lexed
//!   and recursively preprocessed in place,
//! - evaluates `.define name expr` into the symbol table and removes
//!   the line,
//! - feeds `.encoded "text"` strings into the character frequency
//!   table, leaving the tokens for the emitter.
//!
//! Includes are tracked in an open-file set so an include cycle fails
//! with a diagnostic instead of recursing forever. Including standard
//! input is forbidden.

use gasm_lex::{lex_file, Token, TokenKind};
use gasm_str::CharFrequencies;
use gasm_util::diagnostic::Diagnostics;
use gasm_util::symbol::SymbolTable;

use crate::operand::parse_operand_constant;
use crate::stream::TokenStream;

struct Preprocessor<'a> {
    symbols: &'a mut SymbolTable,
    frequencies: &'a mut CharFrequencies,
    diagnostics: &'a mut Diagnostics,
    open_includes: Vec<String>,
}

/// Run the preprocessing pass over `tokens`, mutating the sequence in
/// place. Defined constants land in `symbols`; `.encoded` character
/// counts land in `frequencies`. Problems are reported into
/// `diagnostics`; the caller decides whether they gate emission.
pub fn preprocess(
    tokens: &mut Vec<Token>,
    symbols: &mut SymbolTable,
    frequencies: &mut CharFrequencies,
    diagnostics: &mut Diagnostics,
) {
    let mut preprocessor = Preprocessor {
        symbols,
        frequencies,
        diagnostics,
        open_includes: Vec::new(),
    };
    preprocessor.run(tokens);
}

impl Preprocessor<'_> {
    fn run(&mut self, tokens: &mut Vec<Token>) {
        let mut i = 0;
        while i < tokens.len() {
            // Label definitions are none of our business; step over
            // them so the name is not mistaken for a directive line.
            if matches!(tokens[i].kind, TokenKind::Identifier(_))
                && matches!(tokens.get(i + 1).map(|t| &t.kind), Some(TokenKind::Colon))
            {
                i += 2;
                continue;
            }

            if tokens[i].is_directive(".encoded") {
                self.collect_encoded(tokens, i);
                i = skip_past_eol(tokens, i);
                continue;
            }

            if tokens[i].is_directive(".include") {
                i = self.splice_include(tokens, i);
                continue;
            }

            if tokens[i].is_directive(".define") {
                self.process_define(tokens, i);
                // The line has been removed; the next line now starts
                // at the same index.
                continue;
            }

            i = skip_past_eol(tokens, i);
        }
    }

    /// Count the code points of an `.encoded` string. The tokens stay
    /// in place for the emitter.
    fn collect_encoded(&mut self, tokens: &[Token], i: usize) {
        match tokens.get(i + 1).map(|t| &t.kind) {
            Some(TokenKind::Str(text)) => self.frequencies.add_string(text),
            other => {
                let origin = tokens
                    .get(i + 1)
                    .unwrap_or(&tokens[i])
                    .origin
                    .clone();
                let found = other.map(|kind| kind.name()).unwrap_or("end of input");
                self.diagnostics
                    .error(Some(origin), format!("expected string, found {}", found));
            }
        }
    }

    /// Handle `.include "path"`: remove the directive and path tokens,
    /// lex and preprocess the named file, and splice its tokens in
    /// place. Returns the index to continue scanning from.
    fn splice_include(&mut self, tokens: &mut Vec<Token>, i: usize) -> usize {
        let directive_origin = tokens[i].origin.clone();

        let path = match tokens.get(i + 1).map(|t| &t.kind) {
            Some(TokenKind::Str(path)) => path.clone(),
            _ => {
                self.diagnostics
                    .error(Some(directive_origin), "expected string");
                return skip_past_eol(tokens, i);
            }
        };
        if !matches!(
            tokens.get(i + 2).map(|t| &t.kind),
            Some(TokenKind::Eol) | None
        ) {
            self.diagnostics
                .error(Some(tokens[i + 2].origin.clone()), "expected EOL");
            return skip_past_eol(tokens, i);
        }

        // The directive and its path are consumed either way; the
        // line's EOL stays behind.
        tokens.drain(i..i + 2);

        if path == "-" {
            self.diagnostics.error(
                Some(directive_origin),
                "cannot include standard input",
            );
            return i;
        }

        let canonical = std::fs::canonicalize(&path)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| path.clone());
        if self.open_includes.contains(&canonical) {
            self.diagnostics.error(
                Some(directive_origin),
                format!("recursive include of `{}`", path),
            );
            return i;
        }

        let mut included = match lex_file(&path) {
            Ok(included) => included,
            Err(diagnostics) => {
                self.diagnostics.merge(diagnostics);
                return i;
            }
        };

        self.open_includes.push(canonical);
        self.run(&mut included);
        self.open_includes.pop();

        let count = included.len();
        tokens.splice(i..i, included);
        i + count
    }

    /// Handle `.define name expr`: evaluate (all names must already be
    /// defined), insert the symbol, and remove the whole line.
    fn process_define(&mut self, tokens: &mut Vec<Token>, i: usize) {
        let line_end = tokens[i..]
            .iter()
            .position(|t| t.is_eol())
            .map(|offset| i + offset)
            .unwrap_or(tokens.len());

        self.define_from_line(&tokens[i..line_end]);

        // Remove the directive line, end-of-line included.
        let drain_end = (line_end + 1).min(tokens.len());
        tokens.drain(i..drain_end);
    }

    fn define_from_line(&mut self, line: &[Token]) {
        let name = match line.get(1).map(|t| &t.kind) {
            Some(TokenKind::Identifier(name)) => name.clone(),
            _ => {
                let origin = line.get(1).unwrap_or(&line[0]).origin.clone();
                self.diagnostics
                    .error(Some(origin), "expected identifier after .define");
                return;
            }
        };
        let name_origin = line[1].origin.clone();

        if self.symbols.contains(&name) {
            self.diagnostics.error(
                Some(name_origin),
                format!("name {} already in use", name),
            );
            return;
        }

        let mut stream = TokenStream::new(&line[2..]);
        let operand =
            parse_operand_constant(&mut stream, self.symbols, &[], true, self.diagnostics);
        let operand = match operand {
            Some(operand) => operand,
            None => return,
        };
        if !stream.at_end() {
            self.diagnostics.error(
                stream.peek().map(|t| t.origin.clone()),
                "expected EOL (ignoring excess tokens)",
            );
        }

        // Known is guaranteed by require_known above.
        if let Some(value) = operand.value() {
            if self.symbols.define(&name, value).is_err() {
                self.diagnostics.error(
                    Some(name_origin),
                    format!("name {} already in use", name),
                );
            }
        }
    }
}

/// Index of the first token after the current line's end-of-line.
fn skip_past_eol(tokens: &[Token], from: usize) -> usize {
    let mut i = from;
    while i < tokens.len() {
        if tokens[i].is_eol() {
            return i + 1;
        }
        i += 1;
    }
    tokens.len()
}
