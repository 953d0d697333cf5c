//! The code emitter: the single forward pass over the token sequence.
//!
//! Labels bind to the current output position; directives write their
//! bytes; mnemonics write a variable-length opcode, packed operand
//! type nibbles, and operand payloads. An operand whose value is not
//! yet known gets a zero placeholder and a backpatch record; the
//! finalizer resolves those once every label exists.
//!
//! The image is built in a byte buffer, so the current code position
//! is always the buffer length.

use std::io::Write;

use gasm_lex::{escape_for_dump, Token, TokenKind};
use gasm_par::{parse_operand, parse_operand_constant, Mode, Operand, TokenStream};
use gasm_util::buffer::ByteBuffer;
use gasm_util::diagnostic::Diagnostics;
use gasm_util::origin::Origin;

use crate::finalize;
use crate::opcodes;
use crate::program::{Backpatch, ProgramInfo, HEADER_SIZE};
use crate::size::{operand_size, size_bytes, type_nibble, value_fits};

/// Run the emission pass and the finalizer over a preprocessed token
/// sequence. Returns the finished image, or `None` once any error has
/// been recorded (the finalizer still runs either way, so all
/// diagnostics are collected).
pub fn assemble(
    tokens: &[Token],
    info: &mut ProgramInfo,
    diagnostics: &mut Diagnostics,
    debug: Option<&mut dyn Write>,
) -> Option<ByteBuffer> {
    let mut emitter = Emitter {
        info: &mut *info,
        diagnostics: &mut *diagnostics,
        debug,
        buf: ByteBuffer::new(),
        in_header: true,
        locals: Vec::new(),
    };
    emitter.run(tokens);

    let Emitter {
        mut buf, in_header, ..
    } = emitter;

    finalize::finalize(&mut buf, info, in_header, diagnostics);

    if diagnostics.has_errors() {
        None
    } else {
        Some(buf)
    }
}

/// What an instruction line resolved to: a table mnemonic or a custom
/// `opcode [rel] N` spec.
struct InstrSpec {
    opcode: u32,
    operand_count: Option<u32>,
    relative: bool,
}

struct Emitter<'a, W: Write + ?Sized> {
    info: &'a mut ProgramInfo,
    diagnostics: &'a mut Diagnostics,
    debug: Option<&'a mut W>,
    buf: ByteBuffer,
    in_header: bool,
    locals: Vec<String>,
}

impl<W: Write + ?Sized> Emitter<'_, W> {
    fn position(&self) -> u32 {
        self.buf.len() as u32
    }

    fn trace(&mut self, args: std::fmt::Arguments) {
        if let Some(out) = self.debug.as_mut() {
            let _ = out.write_fmt(args);
        }
    }

    fn error(&mut self, origin: &Origin, message: impl Into<String>) {
        self.diagnostics.error(Some(origin.clone()), message);
    }

    /// Report leftover tokens on the current line once. The caller's
    /// line skip consumes them.
    fn expect_line_end(&mut self, stream: &mut TokenStream<'_>) {
        if !stream.at_eol() {
            if let Some(token) = stream.peek() {
                let origin = token.origin.clone();
                self.error(&origin, "expected EOL (ignoring excess tokens)");
            }
        }
    }

    fn run(&mut self, tokens: &[Token]) {
        self.buf.push_zeroes(HEADER_SIZE);

        let mut stream = TokenStream::new(tokens);
        while let Some(token) = stream.peek() {
            match &token.kind {
                TokenKind::Eol => {
                    stream.advance();
                }
                TokenKind::Directive(name) => {
                    let name = name.clone();
                    let origin = token.origin.clone();
                    stream.advance();
                    self.directive(&name, &origin, &mut stream);
                    stream.skip_line();
                }
                TokenKind::Identifier(name)
                    if matches!(
                        stream.peek_at(1).map(|t| &t.kind),
                        Some(TokenKind::Colon)
                    ) =>
                {
                    let name = name.clone();
                    let origin = token.origin.clone();
                    let position = self.position() as i32;
                    if self.info.symbols.define(&name, position).is_err() {
                        self.error(
                            &origin,
                            format!("could not create label ~{}~ (already exists?)", name),
                        );
                    }
                    stream.advance();
                    stream.advance();
                }
                TokenKind::Identifier(_) => {
                    self.instruction(&mut stream);
                    stream.skip_line();
                }
                other => {
                    let origin = token.origin.clone();
                    let message =
                        format!("expected identifier or directive, found {}", other.name());
                    self.error(&origin, message);
                    stream.skip_line();
                }
            }
        }

        // End of input closes any open function scope.
        self.locals.clear();
    }

    /* ********************************************************** *
     * Directives                                                 *
     * ********************************************************** */

    fn directive(&mut self, name: &str, origin: &Origin, stream: &mut TokenStream<'_>) {
        match name {
            ".cstring" => self.string_data(origin, stream, false),
            ".string" => self.string_data(origin, stream, true),
            ".unicode" => self.unicode_data(origin, stream),
            ".encoded" => self.encoded_data(origin, stream),
            ".byte" => self.data_values(stream, 1),
            ".short" => self.data_values(stream, 2),
            ".word" => self.data_values(stream, 4),
            ".pad" => self.pad(origin, stream),
            ".zero" => self.zeroes(origin, stream),
            ".function" => self.function(stream),
            ".end_header" => self.end_header(origin, stream),
            ".extra_memory" => self.extra_memory(origin, stream),
            ".stack_size" => self.stack_size(origin, stream),
            ".include_binary" => self.include_binary(origin, stream),
            ".string_table" => self.string_table(stream),
            ".include" | ".define" => {
                self.error(
                    origin,
                    format!(
                        "(internal) encountered {} directive after pre-processing",
                        name
                    ),
                );
            }
            _ => self.error(origin, format!("unknown directive {}", name)),
        }
    }

    /// The next token must be a string literal; consume and return it.
    fn expect_string(
        &mut self,
        origin: &Origin,
        stream: &mut TokenStream<'_>,
    ) -> Option<String> {
        match stream.peek() {
            Some(token) => {
                if let TokenKind::Str(text) = &token.kind {
                    let text = text.clone();
                    stream.advance();
                    Some(text)
                } else {
                    let found = token.kind.name();
                    let origin = token.origin.clone();
                    self.error(&origin, format!("expected string, found {}", found));
                    None
                }
            }
            None => {
                self.error(origin, "expected string, found end of input");
                None
            }
        }
    }

    /// The next token must be an integer; consume and return it.
    fn expect_integer(&mut self, origin: &Origin, stream: &mut TokenStream<'_>) -> Option<i32> {
        match stream.peek() {
            Some(token) => {
                if let TokenKind::Integer(value) = token.kind {
                    stream.advance();
                    Some(value)
                } else {
                    let found = token.kind.name();
                    let origin = token.origin.clone();
                    self.error(&origin, format!("expected integer, found {}", found));
                    None
                }
            }
            None => {
                self.error(origin, "expected integer, found end of input");
                None
            }
        }
    }

    /// `.cstring` / `.string`: raw NUL-terminated text, optionally
    /// preceded by the 0xE0 string-type byte.
    fn string_data(&mut self, origin: &Origin, stream: &mut TokenStream<'_>, add_type_byte: bool) {
        let text = match self.expect_string(origin, stream) {
            Some(text) => text,
            None => return,
        };
        self.trace(format_args!(
            "0x{:08X} string ~{}~\n",
            self.position(),
            escape_for_dump(&text, 32)
        ));
        if add_type_byte {
            self.buf.push_byte(0xE0);
        }
        self.buf.push_bytes(text.as_bytes());
        self.buf.push_byte(0);
        self.expect_line_end(stream);
    }

    /// `.unicode`: type byte 0xE2, three pad bytes, big-endian code
    /// points, and a zero terminator word.
    fn unicode_data(&mut self, origin: &Origin, stream: &mut TokenStream<'_>) {
        let text = match self.expect_string(origin, stream) {
            Some(text) => text,
            None => return,
        };
        self.trace(format_args!(
            "0x{:08X} unicode ~{}~\n",
            self.position(),
            escape_for_dump(&text, 32)
        ));
        self.buf.push_byte(0xE2);
        self.buf.push_byte(0);
        self.buf.push_byte(0);
        self.buf.push_byte(0);
        for c in text.chars() {
            self.buf.push_word(c as u32);
        }
        self.buf.push_word(0);
        self.expect_line_end(stream);
    }

    /// `.encoded`: the 0xE1 marker and the bit-packed tree walk.
    fn encoded_data(&mut self, origin: &Origin, stream: &mut TokenStream<'_>) {
        let text = match self.expect_string(origin, stream) {
            Some(text) => text,
            None => return,
        };
        self.trace(format_args!(
            "0x{:08X} encoded ~{}~\n",
            self.position(),
            escape_for_dump(&text, 32)
        ));
        self.info
            .strings
            .encode(&mut self.buf, &text, self.diagnostics);
        self.expect_line_end(stream);
    }

    /// `.byte` / `.short` / `.word`: constant expressions emitted at a
    /// fixed width; unresolved expressions become backpatches.
    fn data_values(&mut self, stream: &mut TokenStream<'_>, width: u32) {
        self.trace(format_args!("0x{:08X} data({})", self.position(), width));
        while !stream.at_eol() {
            let op_origin = stream.peek().map(|t| t.origin.clone());
            let operand = parse_operand_constant(
                stream,
                &self.info.symbols,
                &self.locals,
                false,
                self.diagnostics,
            );
            let operand = match operand {
                Some(operand) => operand,
                None => break,
            };
            match operand.value() {
                Some(value) => {
                    self.trace(format_args!(" {}", value));
                    if !value_fits(value as u32, width) {
                        if let Some(origin) = op_origin {
                            self.error(&origin, "value is larger than storage specification");
                        }
                        continue;
                    }
                    self.buf.push_variable(value as u32, width);
                }
                None => {
                    self.trace(format_args!(" ???"));
                    self.info.patches.push(Backpatch::new(
                        self.position(),
                        None,
                        width,
                        operand,
                    ));
                    self.buf.push_variable(0, width);
                }
            }
        }
        self.trace(format_args!("\n"));
    }

    /// `.pad`: zero bytes up to the next multiple of the argument.
    fn pad(&mut self, origin: &Origin, stream: &mut TokenStream<'_>) {
        let boundary = match self.expect_integer(origin, stream) {
            Some(value) => value,
            None => return,
        };
        if boundary <= 0 {
            self.error(origin, "padding boundary must be a positive value");
            return;
        }
        let before = self.position();
        self.buf.pad_to(boundary as usize);
        self.trace(format_args!(
            "0x{:08X} {} bytes padding\n",
            before,
            self.position() - before
        ));
        self.expect_line_end(stream);
    }

    /// `.zero`: a fixed count of zero bytes.
    fn zeroes(&mut self, origin: &Origin, stream: &mut TokenStream<'_>) {
        let count = match self.expect_integer(origin, stream) {
            Some(value) => value,
            None => return,
        };
        self.trace(format_args!(
            "0x{:08X} zeroes ({})\n",
            self.position(),
            count
        ));
        self.buf.push_zeroes(count.max(0) as usize);
        self.expect_line_end(stream);
    }

    /// `.function [stk] [locals...]`: open a new scope and emit the
    /// function prolog with its local-format block.
    fn function(&mut self, stream: &mut TokenStream<'_>) {
        // A new function closes the previous scope.
        self.locals.clear();
        let start_position = self.position();

        let mut stack_based = false;
        if matches!(stream.peek(), Some(token) if token.is_identifier("stk")) {
            stack_based = true;
            stream.advance();
        }

        let mut local_count: u32 = 0;
        if let Some(TokenKind::Integer(count)) = stream.peek().map(|t| &t.kind) {
            // Anonymous locals: a count instead of names.
            let count = *count;
            let origin = stream.peek().map(|t| t.origin.clone());
            stream.advance();
            if count < 0 {
                if let Some(origin) = origin {
                    self.error(&origin, "local count may not be negative");
                }
            } else {
                local_count = count as u32;
            }
            self.expect_line_end(stream);
        } else {
            while !stream.at_eol() {
                let token = match stream.next() {
                    Some(token) => token,
                    None => break,
                };
                let name = match &token.kind {
                    TokenKind::Identifier(name) => name.clone(),
                    other => {
                        let origin = token.origin.clone();
                        let message =
                            format!("expected identifier, found {}", other.name());
                        self.error(&origin, message);
                        continue;
                    }
                };
                if self.info.symbols.contains(&name) {
                    let origin = token.origin.clone();
                    self.error(
                        &origin,
                        format!(
                            "local variable {} shadowed by global value of same name",
                            name
                        ),
                    );
                }
                if self.locals.contains(&name) {
                    let origin = token.origin.clone();
                    self.error(&origin, format!("duplicate named local \"{}\"", name));
                }
                self.locals.push(name);
                local_count += 1;
            }
        }

        self.buf.push_byte(if stack_based { 0xC0 } else { 0xC1 });

        self.trace(format_args!(
            "\n0x{:08X} FUNCTION {}  {} LOCALS",
            start_position,
            if stack_based { "(stk)" } else { "" },
            local_count
        ));
        if !self.locals.is_empty() {
            let names = self.locals.join(" ");
            self.trace(format_args!(": {}", names));
        }
        self.trace(format_args!("\n"));

        // Local-format block: (type=4, count) pairs, then the (0, 0)
        // terminator.
        let mut remaining = local_count;
        while remaining > 0 {
            let chunk = remaining.min(255);
            self.buf.push_byte(4);
            self.buf.push_byte(chunk as u8);
            remaining -= chunk;
        }
        self.buf.push_byte(0);
        self.buf.push_byte(0);
    }

    /// `.end_header`: pad to 256 bytes, leave header mode, bind
    /// `_RAMSTART`.
    fn end_header(&mut self, origin: &Origin, stream: &mut TokenStream<'_>) {
        if !self.in_header {
            self.error(origin, "ended header when not in header");
            return;
        }
        self.buf.pad_to(256);
        self.in_header = false;
        self.info.ram_start = self.position();
        let ram_start = self.info.ram_start as i32;
        let _ = self.info.symbols.define("_RAMSTART", ram_start);
        self.expect_line_end(stream);
    }

    fn expect_multiple_of_256(
        &mut self,
        origin: &Origin,
        stream: &mut TokenStream<'_>,
        what: &str,
    ) -> Option<i32> {
        let value = self.expect_integer(origin, stream)?;
        if value % 256 != 0 {
            self.error(
                origin,
                format!(
                    "{} must be multiple of 256 (currently {}, next multiple {})",
                    what,
                    value,
                    (value / 256 + 1) * 256
                ),
            );
            return None;
        }
        Some(value)
    }

    fn extra_memory(&mut self, origin: &Origin, stream: &mut TokenStream<'_>) {
        if let Some(value) = self.expect_multiple_of_256(origin, stream, "extra memory") {
            self.info.extended_memory = value;
            self.expect_line_end(stream);
        }
    }

    fn stack_size(&mut self, origin: &Origin, stream: &mut TokenStream<'_>) {
        if let Some(value) = self.expect_multiple_of_256(origin, stream, "stack size") {
            self.info.stack_size = value;
            self.expect_line_end(stream);
        }
    }

    /// `.include_binary`: the named file's bytes, verbatim.
    fn include_binary(&mut self, origin: &Origin, stream: &mut TokenStream<'_>) {
        let path = match self.expect_string(origin, stream) {
            Some(path) => path,
            None => return,
        };
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(err) => {
                self.error(
                    origin,
                    format!("could not read binary file ~{}~: {}", path, err),
                );
                return;
            }
        };
        self.trace(format_args!(
            "0x{:08X} BINARY FILE ~{}~ ({} bytes)\n",
            self.position(),
            path,
            data.len()
        ));
        self.buf.push_bytes(&data);
        self.expect_line_end(stream);
    }

    /// `.string_table`: serialize the compression table here.
    fn string_table(&mut self, stream: &mut TokenStream<'_>) {
        self.expect_line_end(stream);
        if !self.info.strings.has_nodes() {
            return;
        }
        let position = self.position();
        self.info.string_table_position = position;
        self.trace(format_args!("0x{:08X} STRING TABLE\n", position));
        self.info.strings.serialize(&mut self.buf, position);
    }

    /* ********************************************************** *
     * Mnemonics                                                  *
     * ********************************************************** */

    fn instruction(&mut self, stream: &mut TokenStream<'_>) {
        let token = match stream.next() {
            Some(token) => token,
            None => return,
        };
        let origin = token.origin.clone();
        let name = match &token.kind {
            TokenKind::Identifier(name) => name.clone(),
            _ => return,
        };

        let spec = if name == "opcode" {
            // Raw custom opcode: `opcode [rel] N`.
            let mut relative = false;
            if matches!(stream.peek(), Some(t) if t.is_identifier("rel")) {
                relative = true;
                stream.advance();
            }
            let operand = parse_operand_constant(
                stream,
                &self.info.symbols,
                &self.locals,
                true,
                self.diagnostics,
            );
            let opcode = match operand.as_ref().and_then(|op| op.value()) {
                Some(value) => value as u32,
                None => return,
            };
            InstrSpec {
                opcode,
                operand_count: None,
                relative,
            }
        } else {
            match opcodes::lookup(&name) {
                Some(mnemonic) => InstrSpec {
                    opcode: mnemonic.opcode,
                    operand_count: Some(mnemonic.operand_count),
                    relative: mnemonic.last_operand_is_relative,
                },
                None => {
                    self.error(&origin, format!("unknown mnemonic {}", name));
                    return;
                }
            }
        };

        self.trace(format_args!(
            "0x{:08X} ~{}~ {}/0x{:x}  ",
            self.position(),
            name,
            spec.opcode,
            spec.opcode
        ));

        // Variable-length opcode tag.
        if spec.opcode <= 0x7F {
            self.buf.push_byte(spec.opcode as u8);
        } else if spec.opcode <= 0x3FFF {
            self.buf.push_short(spec.opcode as u16 | 0x8000);
        } else {
            self.buf.push_word(spec.opcode | 0xC000_0000);
        }

        // Operands, separated by commas or whitespace.
        let mut operands: Vec<Operand> = Vec::new();
        while !stream.at_eol() {
            if !operands.is_empty() {
                if matches!(stream.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
                    stream.advance();
                    if stream.at_eol() {
                        let origin = origin.clone();
                        self.error(&origin, "expected operand");
                        break;
                    }
                }
            }
            match parse_operand(
                stream,
                &self.info.symbols,
                &self.locals,
                self.diagnostics,
            ) {
                Some(operand) => operands.push(operand),
                None => break,
            }
        }

        if let Some(expected) = spec.operand_count {
            if operands.len() as u32 != expected {
                self.error(
                    &origin,
                    format!(
                        "bad operand count for {}; expected {}, but found {}",
                        name,
                        expected,
                        operands.len()
                    ),
                );
                return;
            }
        }

        // Relative branches: pre-compute the position just after the
        // last operand, with that operand forced to four bytes, and
        // transform a known target now.
        let mut after_position = None;
        if spec.relative && !operands.is_empty() {
            let mut after = self.position();
            after += (operands.len() as u32 + 1) / 2;
            let last = operands.len() - 1;
            for (index, operand) in operands.iter_mut().enumerate() {
                if index == last {
                    operand.force_4byte = true;
                    after += 4;
                } else {
                    after += size_bytes(operand_size(operand));
                }
            }
            if let Some(value) = operands[last].value() {
                operands[last].set_value(value.wrapping_sub(after as i32).wrapping_add(2));
            }
            after_position = Some(after);
        }

        // Packed operand type nibbles, first operand in the low nibble.
        self.trace(format_args!(" types"));
        let mut pending: Option<u8> = None;
        for operand in &operands {
            let nibble = type_nibble(operand);
            match pending.take() {
                None => pending = Some(nibble),
                Some(low) => {
                    let byte = low | (nibble << 4);
                    self.buf.push_byte(byte);
                    self.trace(format_args!(" {:X}", byte));
                }
            }
        }
        if let Some(low) = pending {
            self.buf.push_byte(low);
            self.trace(format_args!(" {:X}", low));
        }

        // Operand payloads.
        let count = operands.len();
        for (index, operand) in operands.into_iter().enumerate() {
            let size = operand_size(&operand);
            let value = operand.value();
            self.trace_operand(&operand, value);
            match value {
                Some(value) => {
                    if size > 0 {
                        self.buf.push_variable(value as u32, size_bytes(size));
                    }
                }
                None => {
                    let after = if index + 1 == count {
                        after_position
                    } else {
                        None
                    };
                    self.info.patches.push(Backpatch::new(
                        self.position(),
                        after,
                        4,
                        operand,
                    ));
                    self.buf.push_word(0);
                }
            }
        }
        self.trace(format_args!("\n"));
    }

    fn trace_operand(&mut self, operand: &Operand, value: Option<i32>) {
        if self.debug.is_none() {
            return;
        }
        if operand.mode == Mode::Stack {
            self.trace(format_args!(" STACK"));
            return;
        }
        let prefix = match operand.mode {
            Mode::Constant => " c:",
            Mode::Local => " l:",
            Mode::Indirect => " i:",
            Mode::AfterRam => " a:",
            Mode::Stack => unreachable!(),
        };
        match value {
            Some(value) => self.trace(format_args!("{}{}", prefix, value)),
            None => self.trace(format_args!("{}???", prefix)),
        }
    }
}
