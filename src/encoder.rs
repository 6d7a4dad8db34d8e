use std::{error::Error, fmt};

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    expr::{evaluate, ExprError},
    isa::{AddressMode, Mnemonic},
    symbol::{Scope, SymbolTable},
};

lazy_static! {
    static ref X_SUFFIX: Regex = Regex::new(r"^(.+?)\s*,\s*[xX]$").unwrap();
    static ref Y_SUFFIX: Regex = Regex::new(r"^(.+?)\s*,\s*[yY]$").unwrap();
    static ref Y_TAIL: Regex = Regex::new(r"^\s*,\s*[yY]$").unwrap();
}

/// Operand shape, decided from surface syntax before anything is evaluated.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Operand<'a> {
    None,
    Accumulator,
    /// `#expr`
    Immediate(&'a str),
    /// `(expr)`
    Indirect(&'a str),
    /// `(expr,X)`
    IndirectX(&'a str),
    /// `(expr),Y`
    IndirectY(&'a str),
    /// `expr,X`: zero page or absolute, decided by value
    IndexedX(&'a str),
    /// `expr,Y`: zero page or absolute, decided by value
    IndexedY(&'a str),
    /// `expr`: zero page, absolute or a branch target
    Direct(&'a str),
}

/// Index of the parenthesis closing the one that opens `s`.
fn closing_paren(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn classify(mnemonic: Mnemonic, text: &str) -> Operand<'_> {
    let s = text.trim();
    if s.is_empty() {
        return if mnemonic.is_shift() {
            Operand::Accumulator
        } else {
            Operand::None
        };
    }
    if mnemonic.is_shift() && s.eq_ignore_ascii_case("a") {
        return Operand::Accumulator;
    }
    if let Some(expr) = s.strip_prefix('#') {
        return Operand::Immediate(expr.trim());
    }
    if s.starts_with('(') {
        if let Some(close) = closing_paren(s) {
            let inner = s[1..close].trim();
            let tail = &s[close + 1..];
            if tail.is_empty() {
                return match X_SUFFIX.captures(inner) {
                    Some(caps) => Operand::IndirectX(caps.get(1).map_or("", |m| m.as_str())),
                    None => Operand::Indirect(inner),
                };
            }
            if Y_TAIL.is_match(tail) {
                return Operand::IndirectY(inner);
            }
        }
    }
    if let Some(caps) = X_SUFFIX.captures(s) {
        return Operand::IndexedX(caps.get(1).map_or("", |m| m.as_str()));
    }
    if let Some(caps) = Y_SUFFIX.captures(s) {
        return Operand::IndexedY(caps.get(1).map_or("", |m| m.as_str()));
    }
    Operand::Direct(s)
}

/// Size used while the operand cannot be evaluated yet.
///
/// Operands that may end up zero page are counted as absolute: an estimate may only
/// over-count, otherwise later labels would have to grow back and never settle.
pub fn estimate_size(mnemonic: Mnemonic, text: &str) -> u8 {
    let mode = match classify(mnemonic, text) {
        Operand::None => AddressMode::Implied,
        Operand::Accumulator => AddressMode::Accumulator,
        Operand::Immediate(_) => AddressMode::Immediate,
        Operand::IndirectX(_) => AddressMode::IndirectX,
        Operand::IndirectY(_) => AddressMode::IndirectY,
        Operand::Indirect(_) => AddressMode::Indirect,
        Operand::IndexedX(_) => AddressMode::AbsoluteX,
        Operand::IndexedY(_) => AddressMode::AbsoluteY,
        Operand::Direct(_) if mnemonic.is_branch() => AddressMode::Relative,
        Operand::Direct(_) => AddressMode::Absolute,
    };
    mode.size()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodeError {
    Expr(ExprError),
    InvalidAddressingMode {
        mnemonic: Mnemonic,
        mode: AddressMode,
    },
    BranchOutOfRange {
        mnemonic: Mnemonic,
        offset: i32,
        address: u16,
        target: u16,
    },
}

impl From<ExprError> for EncodeError {
    fn from(value: ExprError) -> Self {
        EncodeError::Expr(value)
    }
}

impl Error for EncodeError {}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expr(e) => e.fmt(f),
            Self::InvalidAddressingMode { mnemonic, mode } => {
                write!(f, "{mnemonic} has no {mode} addressing mode")
            }
            Self::BranchOutOfRange {
                mnemonic,
                offset,
                address,
                target,
            } => write!(
                f,
                "Branch out of range: {mnemonic} (offset {offset:+}, PC=${address:04X} target=${target:04X})"
            ),
        }
    }
}

fn opcode(mnemonic: Mnemonic, mode: AddressMode) -> Result<u8, EncodeError> {
    mnemonic
        .opcode(mode)
        .ok_or(EncodeError::InvalidAddressingMode { mnemonic, mode })
}

/// Encode one instruction at `address`.
///
/// Undefined symbols surface as `EncodeError::Expr`, which callers treat as "not yet
/// resolvable" until symbols converge.
pub fn encode(
    mnemonic: Mnemonic,
    text: &str,
    symbols: &SymbolTable,
    scope: Scope,
    address: u16,
) -> Result<Vec<u8>, EncodeError> {
    let eval = |expr: &str| evaluate(expr, symbols, scope, address, false);

    let bytes = match classify(mnemonic, text) {
        Operand::None => vec![opcode(mnemonic, AddressMode::Implied)?],
        Operand::Accumulator => vec![opcode(mnemonic, AddressMode::Accumulator)?],
        Operand::Immediate(expr) => {
            let op = opcode(mnemonic, AddressMode::Immediate)?;
            vec![op, eval(expr)? as u8]
        }
        Operand::IndirectX(expr) => {
            let op = opcode(mnemonic, AddressMode::IndirectX)?;
            vec![op, eval(expr)? as u8]
        }
        Operand::IndirectY(expr) => {
            let op = opcode(mnemonic, AddressMode::IndirectY)?;
            vec![op, eval(expr)? as u8]
        }
        Operand::Indirect(expr) if mnemonic.supports(AddressMode::Indirect) => {
            let op = opcode(mnemonic, AddressMode::Indirect)?;
            let value = eval(expr)?;
            vec![op, value as u8, (value >> 8) as u8]
        }
        // `lda (a+b)` is a parenthesized expression for everything but JMP
        Operand::Indirect(_) => {
            let value = eval(text.trim())?;
            zero_page_or_absolute(mnemonic, value, AddressMode::ZeroPage, AddressMode::Absolute)?
        }
        Operand::Direct(expr) if mnemonic.is_branch() => {
            let op = opcode(mnemonic, AddressMode::Relative)?;
            let target = eval(expr)? as u16;
            let offset = target as i32 - (address as i32 + 2);
            if !(-128..=127).contains(&offset) {
                return Err(EncodeError::BranchOutOfRange {
                    mnemonic,
                    offset,
                    address,
                    target,
                });
            }
            vec![op, offset as u8]
        }
        Operand::Direct(expr) => {
            let value = eval(expr)?;
            zero_page_or_absolute(mnemonic, value, AddressMode::ZeroPage, AddressMode::Absolute)?
        }
        Operand::IndexedX(expr) => {
            let value = eval(expr)?;
            zero_page_or_absolute(mnemonic, value, AddressMode::ZeroPageX, AddressMode::AbsoluteX)?
        }
        Operand::IndexedY(expr) => {
            let value = eval(expr)?;
            zero_page_or_absolute(mnemonic, value, AddressMode::ZeroPageY, AddressMode::AbsoluteY)?
        }
    };
    Ok(bytes)
}

/// Zero page wins whenever the value fits and the instruction has the mode.
fn zero_page_or_absolute(
    mnemonic: Mnemonic,
    value: u32,
    zp: AddressMode,
    abs: AddressMode,
) -> Result<Vec<u8>, EncodeError> {
    let value = value as u16;
    match mnemonic.opcode(zp) {
        Some(op) if value <= 0xFF => Ok(vec![op, value as u8]),
        _ => Ok(vec![opcode(mnemonic, abs)?, value as u8, (value >> 8) as u8]),
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, encode, estimate_size, EncodeError, Operand};
    use crate::{
        expr::ExprError,
        isa::{AddressMode, Mnemonic},
        symbol::{new_table, FileId, Scope, Symbol, SymbolTable},
    };

    fn table() -> SymbolTable {
        let mut table = new_table();
        table.insert(Symbol::global("zp"), 0x80);
        table.insert(Symbol::global("abs"), 0x1234);
        table.insert(Symbol::global("screen"), 0xBC40);
        table
    }

    fn enc(mnemonic: Mnemonic, operand: &str, address: u16) -> Result<Vec<u8>, EncodeError> {
        encode(mnemonic, operand, &table(), Scope::new(FileId(0), 0), address)
    }

    #[test]
    fn classification() {
        assert_eq!(classify(Mnemonic::Nop, ""), Operand::None);
        assert_eq!(classify(Mnemonic::Asl, ""), Operand::Accumulator);
        assert_eq!(classify(Mnemonic::Lsr, "A"), Operand::Accumulator);
        assert_eq!(classify(Mnemonic::Lda, "a"), Operand::Direct("a"));
        assert_eq!(classify(Mnemonic::Lda, "#<abs"), Operand::Immediate("<abs"));
        assert_eq!(classify(Mnemonic::Lda, "(zp),y"), Operand::IndirectY("zp"));
        assert_eq!(classify(Mnemonic::Lda, "(zp , X)"), Operand::IndirectX("zp"));
        assert_eq!(classify(Mnemonic::Jmp, "(abs)"), Operand::Indirect("abs"));
        assert_eq!(classify(Mnemonic::Lda, "abs,x"), Operand::IndexedX("abs"));
        assert_eq!(classify(Mnemonic::Ldx, "abs, Y"), Operand::IndexedY("abs"));
        assert_eq!(classify(Mnemonic::Lda, "(a)+(b)"), Operand::Direct("(a)+(b)"));
    }

    #[test]
    fn estimates_never_undercount() {
        assert_eq!(estimate_size(Mnemonic::Rts, ""), 1);
        assert_eq!(estimate_size(Mnemonic::Lda, "#1"), 2);
        assert_eq!(estimate_size(Mnemonic::Bne, "later"), 2);
        assert_eq!(estimate_size(Mnemonic::Lda, "(ptr),y"), 2);
        assert_eq!(estimate_size(Mnemonic::Lda, "later"), 3);
        assert_eq!(estimate_size(Mnemonic::Lda, "later,x"), 3);
        assert_eq!(estimate_size(Mnemonic::Ldx, "later,y"), 3);
        assert_eq!(estimate_size(Mnemonic::Jmp, "(vector)"), 3);
        assert_eq!(estimate_size(Mnemonic::Lda, "(a)+1"), 3);
        assert_eq!(estimate_size(Mnemonic::Sta, "(ptr,x)"), 2);
        assert_eq!(estimate_size(Mnemonic::Asl, "a"), 1);
    }

    #[test]
    fn implied_and_accumulator() {
        assert_eq!(enc(Mnemonic::Nop, "", 0), Ok(vec![0xEA]));
        assert_eq!(enc(Mnemonic::Rol, "a", 0), Ok(vec![0x2A]));
        assert_eq!(
            enc(Mnemonic::Lda, "", 0),
            Err(EncodeError::InvalidAddressingMode {
                mnemonic: Mnemonic::Lda,
                mode: AddressMode::Implied
            })
        );
    }

    #[test]
    fn prefers_zero_page() {
        assert_eq!(enc(Mnemonic::Lda, "zp", 0), Ok(vec![0xA5, 0x80]));
        assert_eq!(enc(Mnemonic::Lda, "zp,x", 0), Ok(vec![0xB5, 0x80]));
        assert_eq!(enc(Mnemonic::Ldx, "zp,y", 0), Ok(vec![0xB6, 0x80]));
        assert_eq!(enc(Mnemonic::Lda, "abs", 0), Ok(vec![0xAD, 0x34, 0x12]));
        // No zero page mode: absolute even for small values
        assert_eq!(enc(Mnemonic::Jmp, "zp", 0), Ok(vec![0x4C, 0x80, 0x00]));
        assert_eq!(enc(Mnemonic::Lda, "zp,y", 0), Ok(vec![0xB9, 0x80, 0x00]));
        assert_eq!(enc(Mnemonic::Sta, "zp,y", 0), Ok(vec![0x99, 0x80, 0x00]));
    }

    #[test]
    fn immediate_and_indirect() {
        assert_eq!(enc(Mnemonic::Lda, "#<screen", 0), Ok(vec![0xA9, 0x40]));
        assert_eq!(enc(Mnemonic::Ldx, "#>screen", 0), Ok(vec![0xA2, 0xBC]));
        assert_eq!(enc(Mnemonic::Lda, "(zp),y", 0), Ok(vec![0xB1, 0x80]));
        assert_eq!(enc(Mnemonic::Sta, "(zp,x)", 0), Ok(vec![0x81, 0x80]));
        assert_eq!(enc(Mnemonic::Jmp, "(abs)", 0), Ok(vec![0x6C, 0x34, 0x12]));
        assert_eq!(enc(Mnemonic::Lda, "(zp+1)", 0), Ok(vec![0xA5, 0x81]));
        assert!(matches!(
            enc(Mnemonic::Sta, "#1", 0),
            Err(EncodeError::InvalidAddressingMode { .. })
        ));
    }

    #[test]
    fn branch_range_edges() {
        let at = 0x2000;
        // target = next instruction + offset
        assert_eq!(enc(Mnemonic::Bne, "$2002-128", at), Ok(vec![0xD0, 0x80]));
        assert_eq!(enc(Mnemonic::Bne, "$2002+127", at), Ok(vec![0xD0, 0x7F]));
        assert_eq!(enc(Mnemonic::Beq, "*", at), Ok(vec![0xF0, 0xFE]));
        assert_eq!(
            enc(Mnemonic::Bne, "$2002-129", at),
            Err(EncodeError::BranchOutOfRange {
                mnemonic: Mnemonic::Bne,
                offset: -129,
                address: 0x2000,
                target: 0x1F81,
            })
        );
        assert!(matches!(
            enc(Mnemonic::Bne, "$2002+128", at),
            Err(EncodeError::BranchOutOfRange { offset: 128, .. })
        ));
    }

    #[test]
    fn unresolved_operands() {
        assert_eq!(
            enc(Mnemonic::Jsr, "later", 0),
            Err(EncodeError::Expr(ExprError::Undefined("later".into())))
        );
    }
}
