//! gasm-par - Token-stream parsing stages.
//!
//! Two consumers of the lexer's output live here:
//!
//! - [`preprocess`] - the single pass that resolves `.include` by
//!   splicing lexed files in place, evaluates `.define` constants into
//!   the symbol table, and collects `.encoded` character frequencies.
//! - [`operand`] - the operand expression parser and evaluator used by
//!   the preprocessor (`.define`) and by the code emitter for every
//!   instruction and data directive.
//!
//! [`stream`] provides the shared cursor over a token sequence.

pub mod operand;
pub mod preprocess;
pub mod stream;

pub use operand::{
    eval_operand, parse_operand, parse_operand_constant, Eval, Expr, Mode, Operand,
};
pub use preprocess::preprocess;
pub use stream::TokenStream;
