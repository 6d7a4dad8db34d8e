use crate::{
    air::{Stmt, StmtKind},
    encoder::{encode, EncodeError},
    expr::{evaluate, ExprError},
    symbol::SymbolTable,
};

/// Statement that could not be evaluated in a pass, with the address it sat at.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Unresolved {
    pub index: usize,
    pub address: u16,
}

/// One resolve pass: assign addresses to labels, evaluate equates and size instructions.
///
/// Starts from `previous`, so a symbol whose definition temporarily fails to evaluate
/// keeps last pass's value for its dependents.
pub fn resolve(air: &[Stmt], previous: &SymbolTable) -> (SymbolTable, Vec<Unresolved>) {
    let mut symbols = previous.clone();
    let mut unresolved = Vec::new();
    let mut address: u16 = 0;

    for (index, stmt) in air.iter().enumerate() {
        let here = Unresolved { index, address };
        match &stmt.kind {
            StmtKind::Label(symbol) => {
                symbols.insert(symbol.clone(), address);
            }
            StmtKind::Equate(symbol, expr) => {
                match evaluate(expr, &symbols, stmt.scope, address, false) {
                    Ok(value) => {
                        symbols.insert(symbol.clone(), value as u16);
                    }
                    Err(_) => unresolved.push(here),
                }
            }
            StmtKind::Org(expr) => match evaluate(expr, &symbols, stmt.scope, address, false) {
                Ok(value) => address = value as u16,
                Err(_) => unresolved.push(here),
            },
            StmtKind::Init(expr) | StmtKind::Run(expr) => {
                if evaluate(expr, &symbols, stmt.scope, address, false).is_err() {
                    unresolved.push(here);
                }
            }
            StmtKind::Bytes(exprs) | StmtKind::Words(exprs) => {
                let width = data_width(&stmt.kind);
                let mut failed = false;
                for expr in exprs {
                    if evaluate(expr, &symbols, stmt.scope, address, false).is_err() && !failed {
                        failed = true;
                        unresolved.push(here);
                    }
                    address = address.wrapping_add(width);
                }
            }
            StmtKind::Instruction {
                mnemonic,
                operand,
                estimated_size,
            } => match encode(*mnemonic, operand, &symbols, stmt.scope, address) {
                Ok(bytes) => address = address.wrapping_add(bytes.len() as u16),
                // Only final addresses decide range, which emission checks
                Err(EncodeError::BranchOutOfRange { .. }) => address = address.wrapping_add(2),
                Err(_) => {
                    unresolved.push(here);
                    address = address.wrapping_add(*estimated_size as u16);
                }
            },
            StmtKind::Error(_) => {}
        }
    }
    (symbols, unresolved)
}

fn data_width(kind: &StmtKind) -> u16 {
    match kind {
        StmtKind::Words(_) => 2,
        _ => 1,
    }
}

/// Evaluate a statement again against final symbols to find out why it failed.
pub fn diagnose(stmt: &Stmt, symbols: &SymbolTable, address: u16) -> Option<EncodeError> {
    let eval = |expr: &str, address: u16| -> Result<u32, ExprError> {
        evaluate(expr, symbols, stmt.scope, address, false)
    };
    let res = match &stmt.kind {
        StmtKind::Equate(_, expr)
        | StmtKind::Org(expr)
        | StmtKind::Init(expr)
        | StmtKind::Run(expr) => eval(expr, address).map(|_| ()).map_err(EncodeError::from),
        StmtKind::Bytes(exprs) | StmtKind::Words(exprs) => {
            let width = data_width(&stmt.kind);
            exprs
                .iter()
                .zip((0..).map(|i: u16| address.wrapping_add(i.wrapping_mul(width))))
                .try_for_each(|(expr, address)| eval(expr, address).map(|_| ()))
                .map_err(EncodeError::from)
        }
        StmtKind::Instruction {
            mnemonic, operand, ..
        } => encode(*mnemonic, operand, symbols, stmt.scope, address).map(|_| ()),
        StmtKind::Label(_) | StmtKind::Error(_) => Ok(()),
    };
    res.err()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::{
        air::Air,
        parser::parse,
        source::SourceCache,
        symbol::{new_table, Symbol},
    };

    fn air(src: &str) -> Air {
        let mut cache = SourceCache::new();
        cache.insert("/virtual/main.asm", src);
        parse(Path::new("/virtual/main.asm"), &new_table(), &mut cache, &[]).unwrap()
    }

    fn value(symbols: &SymbolTable, name: &str) -> Option<u16> {
        symbols.get(&Symbol::global(name)).copied()
    }

    #[test]
    fn backward_references_resolve_in_one_pass() {
        let (symbols, unresolved) = resolve(&air("org $2000\na: nop\njmp a\nb: rts"), &new_table());
        assert!(unresolved.is_empty());
        assert_eq!(value(&symbols, "a"), Some(0x2000));
        assert_eq!(value(&symbols, "b"), Some(0x2004));
    }

    #[test]
    fn forward_references_shrink_to_zero_page() {
        let stmts = air("org $10\nlda fwd\nfwd: nop");
        let (first, unresolved) = resolve(&stmts, &new_table());
        assert_eq!(unresolved, vec![Unresolved { index: 1, address: 0x10 }]);
        // Absolute estimate
        assert_eq!(value(&first, "fwd"), Some(0x13));

        let (second, unresolved) = resolve(&stmts, &first);
        assert!(unresolved.is_empty());
        assert_eq!(value(&second, "fwd"), Some(0x12));

        let (third, _) = resolve(&stmts, &second);
        assert_eq!(third, second);
    }

    #[test]
    fn failed_equates_keep_previous_value() {
        let stmts = air("x = missing + 1");
        let mut previous = new_table();
        previous.insert(Symbol::global("x"), 7);
        let (symbols, unresolved) = resolve(&stmts, &previous);
        assert_eq!(value(&symbols, "x"), Some(7));
        assert_eq!(unresolved.len(), 1);
    }

    #[test]
    fn data_advances_even_when_unresolved() {
        let (symbols, unresolved) = resolve(
            &air("org $600\n.byte 1, later, later\n.word later, 2\nend: nop"),
            &new_table(),
        );
        assert_eq!(value(&symbols, "end"), Some(0x600 + 3 + 4));
        // One entry per statement
        assert_eq!(
            unresolved,
            vec![
                Unresolved { index: 1, address: 0x600 },
                Unresolved { index: 2, address: 0x603 },
            ]
        );
    }

    #[test]
    fn branch_range_is_left_to_emission() {
        let src = format!("org $2000\nloop: nop\n.byte {}\nbne loop\nafter: nop", "0, ".repeat(199) + "0");
        let (symbols, unresolved) = resolve(&air(&src), &new_table());
        assert!(unresolved.is_empty());
        assert_eq!(value(&symbols, "after"), Some(0x2001 + 200 + 2));
    }

    #[test]
    fn invalid_modes_are_reported() {
        let stmts = air("org $2000\nstx $1234,x\nrts");
        let (symbols, unresolved) = resolve(&stmts, &new_table());
        assert_eq!(unresolved, vec![Unresolved { index: 1, address: 0x2000 }]);
        assert!(matches!(
            diagnose(&stmts[1], &symbols, 0x2000),
            Some(EncodeError::InvalidAddressingMode { .. })
        ));
    }

    #[test]
    fn diagnose_names_the_missing_symbol() {
        let stmts = air(".word 1, nowhere");
        assert_eq!(
            diagnose(&stmts[0], &new_table(), 0),
            Some(EncodeError::Expr(ExprError::Undefined("nowhere".into())))
        );
    }
}
