use std::{fs, path::{Path, PathBuf}};

use miette::{Report, Result};

use crate::{
    air::Air,
    emitter::{emit, Program},
    error,
    parser::parse,
    resolver::{diagnose, resolve, Unresolved},
    source::SourceCache,
    symbol::{new_table, Symbol, SymbolTable},
    xex::{Block, XexBuilder},
};

/// Hard cap on parse/resolve passes.
pub const MAX_PASSES: usize = 20;
/// Pass 1 never counts as converged, no forward reference has been tried yet.
const MIN_PASSES: usize = 2;
/// Passes inspected when reporting symbols that keep changing.
const HISTORY_WINDOW: usize = 4;
const MAX_REPORTED_SYMBOLS: usize = 10;

/// Assembly of one entry file into a binary load image.
///
/// ```no_run
/// let assembly = xexasm::Assembler::new("demo.asm")
///     .search_path("lib")
///     .init_stub(0x0600)
///     .assemble()?;
/// assembly.write("demo.xex".as_ref())?;
/// # Ok::<(), miette::Report>(())
/// ```
pub struct Assembler {
    entry: PathBuf,
    search_paths: Vec<PathBuf>,
    xex: XexBuilder,
    cache: SourceCache,
}

/// Everything a successful assembly produced.
#[derive(Debug)]
pub struct Assembly {
    /// Complete binary load file
    pub image: Vec<u8>,
    pub program: Program,
    /// `program` as laid out in `image`
    pub blocks: Vec<Block>,
    /// Converged symbol table
    pub symbols: SymbolTable,
    pub passes: usize,
}

impl Assembly {
    /// Final value of a global symbol.
    pub fn symbol(&self, name: &str) -> Option<u16> {
        self.symbols.get(&Symbol::global(name)).copied()
    }

    pub fn write(&self, dest: &Path) -> Result<()> {
        fs::write(dest, &self.image).map_err(|e| error::output_unwritable(dest, e))
    }
}

impl Assembler {
    pub fn new(entry: impl Into<PathBuf>) -> Self {
        Assembler {
            entry: entry.into(),
            search_paths: Vec::new(),
            xex: XexBuilder::new(),
            cache: SourceCache::new(),
        }
    }

    /// Directory searched for `icl` files after the including file's own directory.
    pub fn search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_paths.push(dir.into());
        self
    }

    pub fn init_stub(mut self, address: u16) -> Self {
        self.xex = self.xex.init_stub(address);
        self
    }

    /// Use a cache holding sources that should not be read from disk.
    pub fn with_cache(mut self, cache: SourceCache) -> Self {
        self.cache = cache;
        self
    }

    /// Parse and resolve until the symbol table stops changing, then emit.
    pub fn assemble(mut self) -> Result<Assembly> {
        let mut symbols = new_table();
        let mut history = Vec::new();

        for pass in 1..=MAX_PASSES {
            // Conditionals depend on symbols, so every pass parses from scratch
            let air = parse(&self.entry, &symbols, &mut self.cache, &self.search_paths)?;
            let (next, unresolved) = resolve(&air, &symbols);
            let converged = pass >= MIN_PASSES && next == symbols;
            crate::trace!(
                "pass {:>2}: {} symbols, {} unresolved, {}",
                pass,
                next.len(),
                unresolved.len(),
                if converged { "converged" } else { "changing" }
            );

            if converged {
                if !unresolved.is_empty() {
                    return Err(unresolved_report(&air, &unresolved, &next));
                }
                return self.finish(&air, next, pass);
            }
            history.push(next.clone());
            symbols = next;
        }
        Err(no_convergence_report(&history))
    }

    fn finish(&self, air: &Air, symbols: SymbolTable, passes: usize) -> Result<Assembly> {
        let program = emit(air, &symbols)?;
        let blocks = self.xex.blocks(&program)?;
        let image = self.xex.build(&program)?;
        for (symbol, value) in symbols.iter().filter(|(symbol, _)| symbol.is_global()) {
            crate::trace!("  {} = ${:04X}", symbol, value);
        }
        Ok(Assembly {
            image,
            program,
            blocks,
            symbols,
            passes,
        })
    }
}

/// First statement still unresolved after convergence, with a count of the rest.
fn unresolved_report(air: &Air, unresolved: &[Unresolved], symbols: &SymbolTable) -> Report {
    let first = unresolved[0];
    let stmt = &air[first.index];
    let others = unresolved.len() - 1;
    match diagnose(stmt, symbols, first.address) {
        Some(e) => error::encode_failed(&stmt.loc, &e, others),
        None => error::unresolved(&stmt.loc, others),
    }
}

/// Symbols whose value changed over the last passes, as `NAME: $2000 -> $2001 -> ...`.
fn no_convergence_report(history: &[SymbolTable]) -> Report {
    let window = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
    let mut unstable = Vec::new();
    if window.len() == HISTORY_WINDOW {
        let mut names: Vec<&Symbol> = window[window.len() - 1]
            .keys()
            .filter(|symbol| !matches!(symbol, Symbol::Anonymous(_)))
            .collect();
        names.sort();
        for symbol in names {
            let trail: Vec<Option<u16>> = window.iter().map(|t| t.get(symbol).copied()).collect();
            let first = trail.iter().flatten().next();
            if trail.iter().flatten().any(|v| Some(v) != first) {
                let values: Vec<String> = trail
                    .iter()
                    .map(|v| v.map_or("?".to_string(), |v| format!("${v:04X}")))
                    .collect();
                unstable.push(format!("{symbol}: {}", values.join(" -> ")));
            }
        }
    }
    let extra = unstable.len().saturating_sub(MAX_REPORTED_SYMBOLS);
    unstable.truncate(MAX_REPORTED_SYMBOLS);
    if extra > 0 {
        unstable.push(format!("...and {extra} more"));
    }
    error::no_convergence(history.len(), &unstable)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(files: &[(&str, &str)]) -> Result<Assembly> {
        let mut cache = SourceCache::new();
        for (path, text) in files {
            cache.insert(path, *text);
        }
        Assembler::new(files[0].0).with_cache(cache).assemble()
    }

    fn image(src: &str) -> Vec<u8> {
        assemble(&[("/virtual/main.asm", src)]).unwrap().image
    }

    #[test]
    fn label_and_jump() {
        assert_eq!(
            image("org $2000\na: nop\njmp a"),
            vec![0xFF, 0xFF, 0x00, 0x20, 0x03, 0x20, 0xEA, 0x4C, 0x00, 0x20]
        );
    }

    #[test]
    fn single_byte_image() {
        assert_eq!(
            image("org $0600\n.byte $AA"),
            vec![0xFF, 0xFF, 0x00, 0x06, 0x00, 0x06, 0xAA]
        );
    }

    #[test]
    fn runs_at_least_two_passes() {
        let assembly = assemble(&[("/virtual/main.asm", "org $600\nnop")]).unwrap();
        assert_eq!(assembly.passes, 2);
    }

    #[test]
    fn zero_page_forward_reference() {
        let assembly = assemble(&[(
            "/virtual/main.asm",
            "org $2000\nlda counter\nsta counter,x\nrts\norg $80\ncounter: .byte 0",
        )])
        .unwrap();
        assert_eq!(assembly.symbol("counter"), Some(0x80));
        assert_eq!(
            assembly.program.segments[0],
            crate::emitter::Segment::Data {
                start: 0x2000,
                data: vec![0xA5, 0x80, 0x95, 0x80, 0x60]
            }
        );
    }

    #[test]
    fn shrinking_forward_references_converge() {
        // Every label moves once the zero page operands shrink
        let assembly = assemble(&[(
            "/virtual/main.asm",
            "org $40\nlda a\nlda b\na: .byte 1\nb: .byte 2\nc: nop",
        )])
        .unwrap();
        assert_eq!(assembly.symbol("a"), Some(0x44));
        assert_eq!(assembly.symbol("b"), Some(0x45));
        assert_eq!(assembly.symbol("c"), Some(0x46));
    }

    #[test]
    fn conditional_on_later_label_stabilizes() {
        let src = "
org $2000
.if late > 0
  FLAG = 1
.endif
.if FLAG = 1
  nop
.endif
late: rts";
        let first = assemble(&[("/virtual/main.asm", src)]).unwrap();
        let second = assemble(&[("/virtual/main.asm", src)]).unwrap();
        assert_eq!(first.symbol("flag"), Some(1));
        assert_eq!(first.image, second.image);
        assert!(first.passes <= MAX_PASSES);
    }

    #[test]
    fn oscillation_does_not_converge() {
        let err = assemble(&[(
            "/virtual/main.asm",
            "org $2000\n.if x = $2000\nnop\n.endif\nx: rts",
        )])
        .unwrap_err();
        assert_eq!(err.to_string(), "Assembly did not converge after 20 passes");
        let help = err.help().map(|help| help.to_string()).unwrap_or_default();
        assert!(help.contains("X: $2000 -> $2001 -> $2000 -> $2001"), "{help}");
    }

    #[test]
    fn undefined_symbol() {
        let err = assemble(&[(
            "/virtual/main.asm",
            "org $2000\njmp nowhere\nlda missing\nrts",
        )])
        .unwrap_err();
        assert_eq!(err.to_string(), "Undefined symbol `nowhere` (+1 more)");
        assert_eq!(
            err.code().map(|code| code.to_string()),
            Some("resolve::undefined".to_string())
        );
    }

    #[test]
    fn error_directive() {
        let err = assemble(&[("/virtual/main.asm", "org $2000\n.if 1\n.error \"boom\"\n.endif")])
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn unknown_mnemonic() {
        let err = assemble(&[("/virtual/main.asm", "org $2000\nxyz #1")]).unwrap_err();
        assert_eq!(err.to_string(), "Unknown instruction `xyz`");
    }

    #[test]
    fn include_chain_in_help() {
        let err = assemble(&[
            ("/virtual/main.asm", "org $2000\nicl 'lib.asm'"),
            ("/virtual/lib.asm", "nop\njmp missing"),
        ])
        .unwrap_err();
        let help = err.help().map(|help| help.to_string()).unwrap_or_default();
        assert!(help.starts_with("included from main.asm:2"), "{help}");
    }

    #[test]
    fn same_local_names_in_two_files() {
        let assembly = assemble(&[
            (
                "/virtual/main.asm",
                "org $2000\njsr one\njsr two\nrts\nicl 'one.asm'\nicl 'two.asm'",
            ),
            ("/virtual/one.asm", "one: ldx #2\n@loop: dex\nbne @loop\nrts"),
            ("/virtual/two.asm", "two: ldy #2\n@loop: dey\nbne @loop\nrts"),
        ])
        .unwrap();
        assert_eq!(
            assembly.program.segments[0],
            crate::emitter::Segment::Data {
                start: 0x2000,
                data: vec![
                    0x20, 0x07, 0x20, 0x20, 0x0D, 0x20, 0x60, // main
                    0xA2, 0x02, 0xCA, 0xD0, 0xFD, 0x60, // one
                    0xA0, 0x02, 0x88, 0xD0, 0xFD, 0x60, // two
                ]
            }
        );
    }

    #[test]
    fn init_and_run() {
        let assembly = assemble(&[(
            "/virtual/main.asm",
            "org $2000\nsetup: rts\nmain: jmp main\nini setup\nrun main",
        )])
        .unwrap();
        assert_eq!(
            assembly.image,
            vec![
                0xFF, 0xFF, //
                0x00, 0x20, 0x03, 0x20, 0x60, 0x4C, 0x01, 0x20, //
                0x00, 0x2E, 0x02, 0x2E, 0x4C, 0x00, 0x20, //
                0xE2, 0x02, 0xE3, 0x02, 0x00, 0x2E, //
                0xE0, 0x02, 0xE1, 0x02, 0x01, 0x20,
            ]
        );
        assert_eq!(assembly.blocks.len(), 3);
    }

    #[test]
    fn resolve_is_idempotent_at_fixed_point() {
        let files = [(
            "/virtual/main.asm",
            "org $10\nlda fwd\nbne @+\nnop\n@: fwd: .word *",
        )];
        let assembly = assemble(&files).unwrap();
        let mut cache = SourceCache::new();
        cache.insert(files[0].0, files[0].1);
        let air = parse(
            std::path::Path::new(files[0].0),
            &assembly.symbols,
            &mut cache,
            &[],
        )
        .unwrap();
        let (again, unresolved) = resolve(&air, &assembly.symbols);
        assert!(unresolved.is_empty());
        assert_eq!(again, assembly.symbols);
    }
}
