use miette::Result;

use crate::{
    air::{Stmt, StmtKind},
    encoder::{encode, EncodeError},
    error,
    expr::evaluate,
    symbol::SymbolTable,
};

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Segment {
    /// Contiguous bytes loaded at `start`, never empty
    Data { start: u16, data: Vec<u8> },
    /// Run `target` once while loading
    Init { target: u16 },
}

/// Output of the final pass, before it is wrapped into a binary image.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Program {
    pub segments: Vec<Segment>,
    /// Post-load entry point
    pub run: Option<u16>,
}

/// Final walk over converged statements. Every failure here is fatal.
pub fn emit(air: &[Stmt], symbols: &SymbolTable) -> Result<Program> {
    let mut emitter = Emitter {
        symbols,
        program: Program::default(),
        open: None,
        address: 0,
    };
    for stmt in air {
        if let StmtKind::Error(message) = &stmt.kind {
            return Err(error::user_error(&stmt.loc, message));
        }
        emitter
            .stmt(stmt)
            .map_err(|e| error::encode_failed(&stmt.loc, &e, 0))?;
    }
    emitter.close();
    Ok(emitter.program)
}

struct Emitter<'a> {
    symbols: &'a SymbolTable,
    program: Program,
    /// Start and bytes of the segment being filled
    open: Option<(u16, Vec<u8>)>,
    address: u16,
}

impl Emitter<'_> {
    fn stmt(&mut self, stmt: &Stmt) -> Result<(), EncodeError> {
        let symbols = self.symbols;
        let eval = |expr: &str, address: u16| evaluate(expr, symbols, stmt.scope, address, false);
        match &stmt.kind {
            StmtKind::Label(_) | StmtKind::Equate(..) | StmtKind::Error(_) => {}
            StmtKind::Org(expr) => {
                let start = eval(expr, self.address)? as u16;
                self.close();
                self.address = start;
                self.open = Some((start, Vec::new()));
            }
            StmtKind::Init(expr) => {
                let target = eval(expr, self.address)? as u16;
                self.close();
                self.program.segments.push(Segment::Init { target });
            }
            StmtKind::Run(expr) => {
                self.program.run = Some(eval(expr, self.address)? as u16);
            }
            StmtKind::Bytes(exprs) => {
                for expr in exprs {
                    let value = eval(expr, self.address)?;
                    self.put(&[value as u8]);
                }
            }
            StmtKind::Words(exprs) => {
                for expr in exprs {
                    let value = eval(expr, self.address)? as u16;
                    self.put(&value.to_le_bytes());
                }
            }
            StmtKind::Instruction {
                mnemonic, operand, ..
            } => {
                let bytes = encode(*mnemonic, operand, symbols, stmt.scope, self.address)?;
                self.put(&bytes);
            }
        }
        Ok(())
    }

    fn put(&mut self, bytes: &[u8]) {
        let address = self.address;
        let (_, data) = self.open.get_or_insert_with(|| (address, Vec::new()));
        data.extend_from_slice(bytes);
        self.address = address.wrapping_add(bytes.len() as u16);
    }

    /// Segments that never received bytes are dropped.
    fn close(&mut self) {
        if let Some((start, data)) = self.open.take() {
            if !data.is_empty() {
                self.program.segments.push(Segment::Data { start, data });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::{
        air::Air, parser::parse, resolver::resolve, source::SourceCache, symbol::new_table,
    };

    /// Parse and resolve to a fixed point, then emit.
    fn program(src: &str) -> Result<Program> {
        let mut cache = SourceCache::new();
        cache.insert("/virtual/main.asm", src);
        let mut symbols = new_table();
        let mut air: Air = Vec::new();
        for _ in 0..5 {
            air = parse(Path::new("/virtual/main.asm"), &symbols, &mut cache, &[])?;
            symbols = resolve(&air, &symbols).0;
        }
        emit(&air, &symbols)
    }

    fn data(start: u16, data: &[u8]) -> Segment {
        Segment::Data {
            start,
            data: data.to_vec(),
        }
    }

    #[test]
    fn jump_to_label() {
        let program = program("org $2000\na: nop\njmp a").unwrap();
        assert_eq!(program.segments, vec![data(0x2000, &[0xEA, 0x4C, 0x00, 0x20])]);
        assert_eq!(program.run, None);
    }

    #[test]
    fn anonymous_forward_branch() {
        let program = program("org $2000\nbeq @+\nnop\n@: rts").unwrap();
        assert_eq!(program.segments, vec![data(0x2000, &[0xF0, 0x01, 0xEA, 0x60])]);
    }

    #[test]
    fn anonymous_backward_branch() {
        let program = program("org $2000\n@: dex\nbne @-").unwrap();
        assert_eq!(program.segments, vec![data(0x2000, &[0xCA, 0xD0, 0xFD])]);
    }

    #[test]
    fn segments_split_on_org_and_init() {
        let program =
            program("org $600\n.byte 1\norg $700\norg $800\nmain: .word $1234\nini main\n.byte 2\nrun main")
                .unwrap();
        assert_eq!(
            program.segments,
            vec![
                data(0x600, &[1]),
                data(0x800, &[0x34, 0x12]),
                Segment::Init { target: 0x800 },
                data(0x802, &[2]),
            ]
        );
        assert_eq!(program.run, Some(0x800));
    }

    #[test]
    fn data_without_org_starts_at_zero() {
        let program = program(".byte 'A', -1, >$1234").unwrap();
        assert_eq!(program.segments, vec![data(0, &[0x41, 0xFF, 0x12])]);
    }

    #[test]
    fn zero_page_preferred() {
        let program = program("org $80\nptr: .byte 0\norg $2000\nlda ptr\nsta ptr,x\nlda fwd\norg $90\nfwd: .byte 0").unwrap();
        assert_eq!(
            program.segments[1],
            data(0x2000, &[0xA5, 0x80, 0x95, 0x80, 0xA5, 0x90])
        );
    }

    #[test]
    fn branch_range_limits() {
        let filler = |n: usize| vec!["nop"; n].join("\n");
        // Target 128 bytes before the branch's next instruction
        let back = format!("org $2000\nt: {}\nbne t", filler(126));
        assert!(program(&back).is_ok());
        let too_far = format!("org $2000\nt: {}\nbne t", filler(127));
        let err = program(&too_far).unwrap_err();
        assert!(err.to_string().starts_with("Branch out of range: BNE (offset -129"));

        let forward = format!("org $2000\nbne t\n{}\nt: nop", filler(127));
        assert!(program(&forward).is_ok());
        let too_far = format!("org $2000\nbne t\n{}\nt: nop", filler(128));
        let err = program(&too_far).unwrap_err();
        assert!(err.to_string().starts_with("Branch out of range: BNE (offset +128"));
    }

    #[test]
    fn error_statements_abort() {
        let err = program("org $2000\nnop\n.error \"not yet\"").unwrap_err();
        assert_eq!(err.to_string(), "not yet");
    }
}
