use crate::{
    isa::Mnemonic,
    span::Location,
    symbol::{Scope, Symbol},
};

/// Assembly intermediate representation: the flat statement list of one pass.
/// Rebuilt from source on every pass, never patched in place.
pub type Air = Vec<Stmt>;

/// Single statement, with where it came from and the label scope its expressions see.
#[derive(Clone, Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: Location,
    pub scope: Scope,
}

impl Stmt {
    pub fn new(kind: StmtKind, loc: Location, scope: Scope) -> Self {
        Stmt { kind, loc, scope }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum StmtKind {
    /// Symbol at the current address
    Label(Symbol),
    /// Symbol bound to an expression, re-evaluated every pass
    Equate(Symbol, String),
    /// Set the current address and start a new segment
    Org(String),
    /// Code at this address runs once while the file is loading
    Init(String),
    /// Entry point after loading completes
    Run(String),
    /// One byte per expression
    Bytes(Vec<String>),
    /// One little-endian word per expression
    Words(Vec<String>),
    Instruction {
        mnemonic: Mnemonic,
        operand: String,
        /// Only used while the operand cannot be evaluated
        estimated_size: u8,
    },
    /// Raised when emission reaches it
    Error(String),
}
