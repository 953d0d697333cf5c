//! Operand expressions: parsing and evaluation.
//!
//! An operand is a mode (addressing class) plus an expression tree.
//! Parsing accepts an optional mode prefix (`*` indirect, `#` local),
//! an optional unary sign, and right-associative binary operator
//! chains with no precedence. Evaluation resolves symbolic leaves
//! against the global symbol table, then the open function's local
//! names; a leaf that resolves to neither stays unresolved, which is
//! acceptable during the emission pass and an error at finalize.
//!
//! Only constant-mode values may participate in arithmetic: negating
//! or combining locals and stack values is invalid.

use std::fmt;

use gasm_lex::{Operator, TokenKind};
use gasm_util::diagnostic::Diagnostics;
use gasm_util::origin::Origin;
use gasm_util::symbol::SymbolTable;

use crate::stream::TokenStream;

/// Operand addressing class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// An immediate value.
    Constant,
    /// Contents of a memory address.
    Indirect,
    /// A function-scoped local, addressed by byte offset.
    Local,
    /// Pushed to / popped from the stack.
    Stack,
    /// Contents of a RAM-relative address.
    AfterRam,
}

/// An expression tree node.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A resolved value.
    Value(i32),
    /// An unresolved symbolic name.
    Name(String),
    /// Unary negation.
    Negate(Box<Expr>),
    /// A binary operation; all nine operator kinds are legal here.
    Binary(Operator, Box<Expr>, Box<Expr>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Value(value) => write!(f, "{}", value),
            Expr::Name(name) => write!(f, "{}", name),
            Expr::Negate(inner) => write!(f, "-{}", inner),
            Expr::Binary(op, left, right) => write!(f, "{} {} {}", left, op, right),
        }
    }
}

/// A parsed operand.
#[derive(Clone, Debug)]
pub struct Operand {
    pub mode: Mode,
    pub expr: Expr,
    pub origin: Origin,
    /// Encode at 4 bytes regardless of value (relative-branch
    /// targets).
    pub force_4byte: bool,
}

impl Operand {
    /// The resolved value, if evaluation has produced one.
    pub fn value(&self) -> Option<i32> {
        match self.expr {
            Expr::Value(value) => Some(value),
            _ => None,
        }
    }

    /// True once the expression has fully resolved.
    pub fn is_known(&self) -> bool {
        matches!(self.expr, Expr::Value(_))
    }

    /// Overwrite the resolved value (relative-branch adjustment).
    pub fn set_value(&mut self, value: i32) {
        self.expr = Expr::Value(value);
    }
}

/// Result of evaluating an operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Eval {
    /// Fully resolved to a value.
    Known,
    /// Contains a name not (yet) defined; tolerable mid-emission.
    Unknown,
    /// Structurally bad (arithmetic on non-constants, division by
    /// zero); always a diagnostic.
    Invalid,
}

/// Parse an operand at the stream cursor: optional mode prefix, then
/// an expression. Returns `None` after reporting if the operand is
/// malformed or invalid.
pub fn parse_operand(
    stream: &mut TokenStream<'_>,
    symbols: &SymbolTable,
    locals: &[String],
    diagnostics: &mut Diagnostics,
) -> Option<Operand> {
    let start_origin = match stream.peek() {
        Some(token) => token.origin.clone(),
        None => return None,
    };

    let prefix = match stream.peek().map(|t| &t.kind) {
        Some(TokenKind::IndirectMarker) => {
            stream.advance();
            Some(Mode::Indirect)
        }
        Some(TokenKind::LocalMarker) => {
            stream.advance();
            Some(Mode::Local)
        }
        _ => None,
    };

    let (expr, is_stack) = parse_expr(stream, diagnostics)?;

    let mut operand = Operand {
        mode: if is_stack { Mode::Stack } else { Mode::Constant },
        expr,
        origin: start_origin.clone(),
        force_4byte: false,
    };

    if prefix == Some(Mode::Local) {
        // A literal local index is given in words; scale to the byte
        // offset used in the encoding.
        if let Expr::Value(value) = operand.expr {
            operand.expr = Expr::Value(value.wrapping_mul(4));
        }
        if operand.mode == Mode::Stack {
            diagnostics.error(
                Some(start_origin),
                "cannot mark the stack as a local variable",
            );
            return None;
        }
        operand.mode = Mode::Local;
    }

    if eval_operand(&mut operand, symbols, locals, false, diagnostics) == Eval::Invalid {
        return None;
    }

    if prefix == Some(Mode::Indirect) {
        if operand.mode != Mode::Constant {
            diagnostics.error(
                Some(start_origin),
                "cannot indirect reference operand (is it a local variable?)",
            );
            return None;
        }
        operand.mode = Mode::Indirect;
    }

    Some(operand)
}

/// Parse an operand that must be constant-mode, optionally requiring
/// it to be fully resolved already.
pub fn parse_operand_constant(
    stream: &mut TokenStream<'_>,
    symbols: &SymbolTable,
    locals: &[String],
    require_known: bool,
    diagnostics: &mut Diagnostics,
) -> Option<Operand> {
    let start_origin = stream.peek().map(|t| t.origin.clone());
    let operand = parse_operand(stream, symbols, locals, diagnostics)?;
    if operand.mode != Mode::Constant {
        diagnostics.error(start_origin, "value must be constant");
        return None;
    }
    if require_known && !operand.is_known() {
        diagnostics.error(start_origin, "value must be previously defined");
        return None;
    }
    Some(operand)
}

/// Parse a (right-associative) expression. The second tuple element is
/// true when the expression is the bare stack name `sp`.
fn parse_expr(
    stream: &mut TokenStream<'_>,
    diagnostics: &mut Diagnostics,
) -> Option<(Expr, bool)> {
    let (left, is_stack) = parse_unary(stream, diagnostics)?;

    if let Some(TokenKind::Operator(op)) = stream.peek().map(|t| &t.kind) {
        let op = *op;
        let op_origin = stream.peek().map(|t| t.origin.clone());
        stream.advance();
        let (right, right_is_stack) = parse_expr(stream, diagnostics)?;
        if is_stack || right_is_stack {
            diagnostics.error(op_origin, "only constant values may be used in expressions");
            return None;
        }
        return Some((Expr::Binary(op, Box::new(left), Box::new(right)), false));
    }

    Some((left, is_stack))
}

/// Parse a unary operand: optional sign, then an integer literal or a
/// name.
fn parse_unary(
    stream: &mut TokenStream<'_>,
    diagnostics: &mut Diagnostics,
) -> Option<(Expr, bool)> {
    let mut negate = false;
    match stream.peek().map(|t| &t.kind) {
        Some(TokenKind::Operator(Operator::Add)) => stream.advance(),
        Some(TokenKind::Operator(Operator::Subtract)) => {
            negate = true;
            stream.advance();
        }
        Some(TokenKind::Operator(_)) => {
            let origin = stream.peek().map(|t| t.origin.clone());
            diagnostics.error(origin, "operator is not unary");
            return None;
        }
        _ => {}
    }

    let token = match stream.peek() {
        Some(token) => token,
        None => {
            diagnostics.error(None, "expected operand, found end of input");
            return None;
        }
    };

    let expr = match &token.kind {
        TokenKind::Integer(value) => {
            let value = *value;
            stream.advance();
            if negate {
                Expr::Value(value.wrapping_neg())
            } else {
                Expr::Value(value)
            }
        }
        TokenKind::Identifier(name) if name == "sp" => {
            let origin = token.origin.clone();
            stream.advance();
            if negate {
                diagnostics.error(
                    Some(origin),
                    "unary operators may only be applied to constant values",
                );
                return None;
            }
            return Some((Expr::Value(0), true));
        }
        TokenKind::Identifier(name) => {
            let name = name.clone();
            stream.advance();
            if negate {
                Expr::Negate(Box::new(Expr::Name(name)))
            } else {
                Expr::Name(name)
            }
        }
        other => {
            let origin = token.origin.clone();
            diagnostics.error(
                Some(origin),
                format!("unexpected {} token found", other.name()),
            );
            return None;
        }
    };

    Some((expr, false))
}

/// Outcome of evaluating a subexpression.
enum ExprEval {
    Resolved { value: i32, is_local: bool },
    Unknown,
    Invalid,
}

fn eval_expr(
    expr: &mut Expr,
    origin: &Origin,
    symbols: &SymbolTable,
    locals: &[String],
    report_unknown: bool,
    diagnostics: &mut Diagnostics,
) -> ExprEval {
    match expr {
        Expr::Value(value) => ExprEval::Resolved {
            value: *value,
            is_local: false,
        },
        Expr::Name(name) => {
            if let Some(value) = symbols.lookup(name) {
                *expr = Expr::Value(value);
                return ExprEval::Resolved {
                    value,
                    is_local: false,
                };
            }
            if let Some(index) = locals.iter().position(|local| local == name) {
                let value = (index as i32).wrapping_mul(4);
                *expr = Expr::Value(value);
                return ExprEval::Resolved {
                    value,
                    is_local: true,
                };
            }
            if report_unknown {
                diagnostics.error(
                    Some(origin.clone()),
                    format!("unknown identifier ~{}~", name),
                );
            }
            ExprEval::Unknown
        }
        Expr::Negate(inner) => {
            match eval_expr(inner, origin, symbols, locals, report_unknown, diagnostics) {
                ExprEval::Resolved { is_local: true, .. } => {
                    diagnostics.error(
                        Some(origin.clone()),
                        "unary operators may only be applied to constant values",
                    );
                    ExprEval::Invalid
                }
                ExprEval::Resolved { value, .. } => {
                    let value = value.wrapping_neg();
                    *expr = Expr::Value(value);
                    ExprEval::Resolved {
                        value,
                        is_local: false,
                    }
                }
                other => other,
            }
        }
        Expr::Binary(op, left, right) => {
            let left_eval =
                eval_expr(left, origin, symbols, locals, report_unknown, diagnostics);
            let right_eval =
                eval_expr(right, origin, symbols, locals, report_unknown, diagnostics);

            if matches!(left_eval, ExprEval::Invalid) || matches!(right_eval, ExprEval::Invalid) {
                return ExprEval::Invalid;
            }
            if matches!(left_eval, ExprEval::Resolved { is_local: true, .. })
                || matches!(right_eval, ExprEval::Resolved { is_local: true, .. })
            {
                diagnostics.error(
                    Some(origin.clone()),
                    "only constant values may be used in expressions",
                );
                return ExprEval::Invalid;
            }
            let (left_value, right_value) = match (left_eval, right_eval) {
                (
                    ExprEval::Resolved { value: l, .. },
                    ExprEval::Resolved { value: r, .. },
                ) => (l, r),
                _ => return ExprEval::Unknown,
            };

            let value = match op {
                Operator::Add => left_value.wrapping_add(right_value),
                Operator::Subtract => left_value.wrapping_sub(right_value),
                Operator::Multiply => left_value.wrapping_mul(right_value),
                Operator::Divide => {
                    if right_value == 0 {
                        diagnostics.error(Some(origin.clone()), "division by zero");
                        return ExprEval::Invalid;
                    }
                    left_value.wrapping_div(right_value)
                }
                Operator::ShiftLeft => left_value.wrapping_shl(right_value as u32),
                Operator::ShiftRight => left_value.wrapping_shr(right_value as u32),
                Operator::BitAnd => left_value & right_value,
                Operator::BitOr => left_value | right_value,
                Operator::BitXor => left_value ^ right_value,
            };
            *expr = Expr::Value(value);
            ExprEval::Resolved {
                value,
                is_local: false,
            }
        }
    }
}

/// Try to resolve an operand's expression in place.
///
/// A leaf that names a local switches the operand to local mode with
/// the scaled index as its value. With `report_unknown` set (the
/// finalize pass), unresolved names become diagnostics.
pub fn eval_operand(
    operand: &mut Operand,
    symbols: &SymbolTable,
    locals: &[String],
    report_unknown: bool,
    diagnostics: &mut Diagnostics,
) -> Eval {
    let origin = operand.origin.clone();
    match eval_expr(
        &mut operand.expr,
        &origin,
        symbols,
        locals,
        report_unknown,
        diagnostics,
    ) {
        ExprEval::Resolved { is_local, .. } => {
            if is_local && operand.mode == Mode::Constant {
                operand.mode = Mode::Local;
            }
            Eval::Known
        }
        ExprEval::Unknown => Eval::Unknown,
        ExprEval::Invalid => Eval::Invalid,
    }
}
