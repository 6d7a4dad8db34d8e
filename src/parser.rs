use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use lazy_static::lazy_static;
use miette::Result;
use regex::Regex;

use crate::{
    air::{Air, Stmt, StmtKind},
    encoder::estimate_size,
    error,
    expr::{evaluate, ExprError},
    isa::Mnemonic,
    source::{SourceCache, SourceFile},
    span::{IncludeSite, Location},
    symbol::{Scope, Symbol, SymbolTable},
};

/// Deeper nesting than this can only come from a file including itself.
const MAX_INCLUDE_DEPTH: usize = 64;

lazy_static! {
    static ref ANON_LABEL: Regex = Regex::new(r"^@\s*:").unwrap();
    static ref LOCAL_LABEL: Regex = Regex::new(r"^@([A-Za-z_]\w*)\s*:").unwrap();
    static ref GLOBAL_LABEL: Regex = Regex::new(r"^([A-Za-z_]\w*)\s*:").unwrap();
    static ref EQUATE: Regex = Regex::new(r"^([A-Za-z_]\w*)\s*=\s*(.+)$").unwrap();
}

/// Parse `entry` and everything it includes into one flat statement list.
///
/// `symbols` is the table of the previous pass, only consulted by conditionals.
pub fn parse(
    entry: &Path,
    symbols: &SymbolTable,
    cache: &mut SourceCache,
    search_paths: &[PathBuf],
) -> Result<Air> {
    let file = cache
        .load(entry)
        .map_err(|e| error::source_unreadable(entry, e))?;
    let mut parser = AsmParser::new(symbols, cache, search_paths);
    parser.parse_file(file)?;
    parser.finish()
}

/// One `.if` block being parsed.
struct Frame {
    /// Lines of the current branch produce statements
    active: bool,
    /// Some branch of this block was already taken
    taken: bool,
    opened_at: Location,
}

/// Line-oriented parser. One instance lives for exactly one pass.
pub struct AsmParser<'a> {
    symbols: &'a SymbolTable,
    cache: &'a mut SourceCache,
    search_paths: &'a [PathBuf],
    includes: Vec<IncludeSite>,
    conditions: Vec<Frame>,
    next_anon: u32,
    air: Air,
}

impl<'a> AsmParser<'a> {
    pub fn new(
        symbols: &'a SymbolTable,
        cache: &'a mut SourceCache,
        search_paths: &'a [PathBuf],
    ) -> Self {
        AsmParser {
            symbols,
            cache,
            search_paths,
            includes: Vec::new(),
            conditions: Vec::new(),
            next_anon: 0,
            air: Vec::new(),
        }
    }

    pub fn parse_file(&mut self, file: Arc<SourceFile>) -> Result<()> {
        let included_from: Arc<[IncludeSite]> = self.includes.clone().into();
        for line in 1..=file.line_count() {
            let text = strip_comment(file.line(line)).trim();
            if text.is_empty() {
                continue;
            }
            let loc = Location::new(Arc::clone(&file), line, Arc::clone(&included_from));
            self.parse_line(text, loc)?;
        }
        Ok(())
    }

    /// Fails if a conditional block is still open at the end of input.
    pub fn finish(self) -> Result<Air> {
        match self.conditions.last() {
            Some(frame) => Err(error::parse_unterminated_if(
                &frame.opened_at,
                self.conditions.len(),
            )),
            None => Ok(self.air),
        }
    }

    fn is_active(&self) -> bool {
        self.conditions.last().map_or(true, |frame| frame.active)
    }

    /// Whether the block enclosing the innermost `.if` is emitting.
    fn parent_active(&self) -> bool {
        match self.conditions.len() {
            0 | 1 => true,
            n => self.conditions[n - 2].active,
        }
    }

    fn push(&mut self, kind: StmtKind, loc: &Location) {
        let scope = Scope::new(loc.file.id(), self.next_anon);
        self.air.push(Stmt::new(kind, loc.clone(), scope));
    }

    fn parse_line(&mut self, text: &str, loc: Location) -> Result<()> {
        let (word, rest) = split_word(text);
        let keyword = word.to_ascii_lowercase();

        // Conditionals keep nesting balanced even inside inactive blocks
        match keyword.as_str() {
            ".if" => {
                let active = self.is_active() && self.condition(rest, &loc)?;
                self.conditions.push(Frame {
                    active,
                    taken: active,
                    opened_at: loc,
                });
                return Ok(());
            }
            ".elseif" => {
                let parent_active = self.parent_active();
                let taken = self.innermost(".elseif", &loc)?.taken;
                let active = parent_active && !taken && self.condition(rest, &loc)?;
                let frame = self.innermost(".elseif", &loc)?;
                frame.active = active;
                frame.taken |= active;
                return Ok(());
            }
            ".else" => {
                let parent_active = self.parent_active();
                let frame = self.innermost(".else", &loc)?;
                frame.active = parent_active && !frame.taken;
                frame.taken = true;
                return Ok(());
            }
            ".endif" => {
                self.innermost(".endif", &loc)?;
                self.conditions.pop();
                return Ok(());
            }
            _ => {}
        }
        if !self.is_active() {
            return Ok(());
        }

        if keyword == "icl" {
            return self.include(rest, &loc);
        }

        if ANON_LABEL.is_match(text) {
            self.push(StmtKind::Label(Symbol::Anonymous(self.next_anon)), &loc);
            self.next_anon += 1;
            let after = text[text.find(':').map_or(text.len(), |i| i + 1)..].trim();
            return self.parse_rest(after, loc);
        }
        if let Some(caps) = LOCAL_LABEL.captures(text) {
            let symbol = Symbol::local(loc.file.id(), &caps[1]);
            self.push(StmtKind::Label(symbol), &loc);
            let after = text[caps[0].len()..].trim();
            return self.parse_rest(after, loc);
        }
        if let Some(caps) = GLOBAL_LABEL.captures(text) {
            self.push(StmtKind::Label(Symbol::global(&caps[1])), &loc);
            let after = text[caps[0].len()..].trim();
            return self.parse_rest(after, loc);
        }

        if let Some(caps) = EQUATE.captures(text) {
            let kind = match Mnemonic::from_str(&caps[1]) {
                Ok(mnemonic) => StmtKind::Error(format!(
                    "`{mnemonic}` is an instruction mnemonic and cannot be assigned"
                )),
                Err(_) => StmtKind::Equate(Symbol::global(&caps[1]), caps[2].trim().to_string()),
            };
            self.push(kind, &loc);
            return Ok(());
        }

        let kind = match keyword.as_str() {
            "org" => StmtKind::Org(required(rest, "org", &loc)?.to_string()),
            "ini" => StmtKind::Init(required(rest, "ini", &loc)?.to_string()),
            "run" => StmtKind::Run(required(rest, "run", &loc)?.to_string()),
            ".byte" => StmtKind::Bytes(byte_args(required(rest, ".byte", &loc)?)),
            ".word" => StmtKind::Words(split_data_args(required(rest, ".word", &loc)?)),
            ".error" => StmtKind::Error(unquote(rest).to_string()),
            _ => match Mnemonic::from_str(word) {
                Ok(mnemonic) => StmtKind::Instruction {
                    mnemonic,
                    operand: rest.to_string(),
                    estimated_size: estimate_size(mnemonic, rest),
                },
                Err(_) => StmtKind::Error(format!("Unknown instruction `{word}`")),
            },
        };
        self.push(kind, &loc);
        Ok(())
    }

    /// A label may be followed by more on the same line.
    fn parse_rest(&mut self, rest: &str, loc: Location) -> Result<()> {
        if rest.is_empty() {
            return Ok(());
        }
        self.parse_line(rest, loc)
    }

    fn innermost(&mut self, directive: &str, loc: &Location) -> Result<&mut Frame> {
        self.conditions
            .last_mut()
            .ok_or_else(|| error::parse_stray_directive(loc, directive))
    }

    /// Undefined symbols read as false until they converge.
    fn condition(&self, text: &str, loc: &Location) -> Result<bool> {
        let scope = Scope::new(loc.file.id(), self.next_anon);
        match evaluate(text, self.symbols, scope, 0, true) {
            Ok(value) => Ok(value != 0),
            Err(ExprError::Undefined(_)) => Ok(false),
            Err(e) => Err(error::parse_bad_condition(loc, &e)),
        }
    }

    fn include(&mut self, rest: &str, loc: &Location) -> Result<()> {
        let Some(name) = quoted(rest) else {
            return Err(error::parse_malformed(
                loc,
                "Expected a quoted file name after icl",
                "write icl \"file.asm\"",
            ));
        };
        if self.includes.len() >= MAX_INCLUDE_DEPTH {
            return Err(error::parse_include_depth(loc, MAX_INCLUDE_DEPTH));
        }
        let path = self
            .cache
            .find_include(name, loc.file.dir(), self.search_paths)
            .map_err(|searched| error::parse_include_missing(loc, name, &searched))?;
        let file = self
            .cache
            .load(&path)
            .map_err(|e| error::parse_include_unreadable(loc, &path, e))?;

        self.includes.push(IncludeSite {
            file: Arc::clone(&loc.file),
            line: loc.line,
        });
        let res = self.parse_file(file);
        self.includes.pop();
        res
    }
}

fn required<'t>(rest: &'t str, directive: &str, loc: &Location) -> Result<&'t str> {
    if rest.is_empty() {
        return Err(error::parse_malformed(
            loc,
            format!("{directive} needs an argument"),
            "add an expression after the directive",
        ));
    }
    Ok(rest)
}

/// First whitespace-delimited word and the trimmed remainder.
fn split_word(text: &str) -> (&str, &str) {
    match text.find(char::is_whitespace) {
        Some(i) => (&text[..i], text[i..].trim()),
        None => (text, ""),
    }
}

/// Cut a `;` comment, leaving quoted `;` alone.
fn strip_comment(line: &str) -> &str {
    let mut quote = None;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, ';') => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Contents of a leading `"..."` or `'...'`.
fn quoted(text: &str) -> Option<&str> {
    let q = text.chars().next().filter(|c| matches!(c, '"' | '\''))?;
    let inner = &text[1..];
    inner.find(q).map(|end| &inner[..end])
}

fn unquote(text: &str) -> &str {
    text.trim_matches(|c| c == '"' || c == '\'')
}

/// Split on top-level commas; commas inside parentheses or quotes do not count.
pub fn split_data_args(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut quote = None;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            (None, ',') if depth == 0 => {
                args.push(text[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        args.push(tail.to_string());
    }
    args
}

/// `.byte` arguments, with quoted strings expanded to one value per character.
/// A single quoted character stays as is, the evaluator reads it as a literal.
fn byte_args(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    for arg in split_data_args(text) {
        match quoted(&arg) {
            Some(inner) if inner.len() + 2 == arg.len() && !is_char_literal(&arg) => {
                args.extend(inner.chars().map(|c| (c as u32).to_string()));
            }
            _ => args.push(arg),
        }
    }
    args
}

fn is_char_literal(arg: &str) -> bool {
    arg.starts_with('\'') && arg[1..arg.len() - 1].chars().count() == 1
}
