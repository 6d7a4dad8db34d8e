// Output and configuration
#[macro_use]
mod output;
pub use output::Output;
pub mod env;
mod error;

// Sources
mod source;
pub use source::{SourceCache, SourceFile};
mod span;
mod symbol;
pub use symbol::{FileId, Symbol, SymbolTable};

// Expressions and instructions
mod lexer;
mod expr;
pub use expr::{evaluate, evaluate_constant, ExprError};
mod isa;
pub use isa::{AddressMode, Mnemonic};
mod encoder;

// Passes
mod air;
mod parser;
mod resolver;
mod emitter;
pub use emitter::{Program, Segment};
mod xex;
pub use xex::{
    Block, BlockKind, XexBuilder, DEFAULT_INIT_STUB, INIT_VECTOR, RUN_VECTOR, SIGNATURE,
};
mod assembler;
pub use assembler::{Assembler, Assembly, MAX_PASSES};

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;
