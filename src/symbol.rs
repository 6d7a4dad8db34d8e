use std::fmt;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;

pub type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Symbol table of symbol -> 16-bit value. Threaded explicitly from pass to pass.
pub type SymbolTable = FxMap<Symbol, u16>;

pub fn new_table() -> SymbolTable {
    IndexMap::with_hasher(FxBuildHasher::default())
}

/// Identity of a source file within one assembly run.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FileId(pub u32);

/// Key inside the symbol table. Names are case-insensitive and stored upper case.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Symbol {
    /// `name:` or `NAME = expr`
    Global(String),
    /// `@name:`, unique per originating file
    Local(FileId, String),
    /// `@:`, numbered across the whole assembly
    Anonymous(u32),
}

impl Symbol {
    pub fn global(name: &str) -> Self {
        Symbol::Global(name.to_ascii_uppercase())
    }

    pub fn local(file: FileId, name: &str) -> Self {
        Symbol::Local(file, name.to_ascii_uppercase())
    }

    /// Anonymous labels and file locals are generated keys, not user-facing names.
    pub fn is_global(&self) -> bool {
        matches!(self, Symbol::Global(_))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Global(name) => f.write_str(name),
            Symbol::Local(file, name) => write!(f, "@{name} (file #{})", file.0),
            Symbol::Anonymous(n) => write!(f, "@:{n}"),
        }
    }
}

/// What a statement's expressions see when they mention `@name`, `@+` or `@-`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Scope {
    pub file: FileId,
    /// Number of the next anonymous label at the point the statement was parsed
    pub next_anon: u32,
}

impl Scope {
    pub fn new(file: FileId, next_anon: u32) -> Self {
        Scope { file, next_anon }
    }

    pub fn local(&self, name: &str) -> Symbol {
        Symbol::local(self.file, name)
    }

    /// Target of `@+`.
    pub fn next_anonymous(&self) -> Symbol {
        Symbol::Anonymous(self.next_anon)
    }

    /// Target of `@-`, if any anonymous label was defined before.
    pub fn prev_anonymous(&self) -> Option<Symbol> {
        self.next_anon.checked_sub(1).map(Symbol::Anonymous)
    }
}
