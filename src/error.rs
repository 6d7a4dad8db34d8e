use std::{io, path::Path, path::PathBuf};

use miette::{miette, LabeledSpan, MietteDiagnostic, Report, Severity};

use crate::{encoder::EncodeError, expr::ExprError, span::Location};

const UNDEFINED_HINT: &str =
    "check the spelling; a symbol defined in another file is only visible once that file is included with `icl`";
const BRANCH_HINT: &str =
    "branches reach 128 bytes back and 127 forward; use JMP for longer distances";

/// Report pointing at a source line, with the include chain and an optional hint as help.
fn located(
    loc: &Location,
    code: &'static str,
    label: &str,
    message: impl Into<String>,
    hint: Option<&str>,
) -> Report {
    let mut diag = MietteDiagnostic::new(message)
        .with_code(code)
        .with_severity(Severity::Error)
        .with_label(LabeledSpan::at(loc.span(), label));
    let mut help: Vec<String> = loc
        .include_chain()
        .map(|site| format!("included from {}:{}", site.file.name(), site.line))
        .collect();
    help.extend(hint.map(str::to_string));
    if !help.is_empty() {
        diag = diag.with_help(help.join("\n"));
    }
    Report::new(diag).with_source_code(loc.named_source())
}

// Source errors

pub fn source_unreadable(path: &Path, e: io::Error) -> Report {
    miette!(
        severity = Severity::Error,
        code = "source::read",
        help = "check that the path exists and is readable",
        "Could not read `{}`: {e}",
        path.display()
    )
}

// Parser errors

pub fn parse_include_missing(loc: &Location, name: &str, searched: &[PathBuf]) -> Report {
    let searched = searched
        .iter()
        .map(|dir| dir.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    located(
        loc,
        "parse::include",
        "included here",
        format!("Include file not found: `{name}`"),
        Some(&format!("searched: {searched}")),
    )
}

pub fn parse_include_unreadable(loc: &Location, path: &Path, e: io::Error) -> Report {
    located(
        loc,
        "parse::include",
        "included here",
        format!("Could not read include file `{}`: {e}", path.display()),
        None,
    )
}

pub fn parse_include_depth(loc: &Location, depth: usize) -> Report {
    located(
        loc,
        "parse::include",
        "included here",
        format!("Includes nested more than {depth} levels deep"),
        Some("check for a file that includes itself"),
    )
}

pub fn parse_unterminated_if(loc: &Location, depth: usize) -> Report {
    located(
        loc,
        "parse::unterminated_if",
        "opened here",
        format!("Unclosed .if ({depth} level(s) deep)"),
        Some("every .if needs a matching .endif"),
    )
}

pub fn parse_stray_directive(loc: &Location, directive: &str) -> Report {
    located(
        loc,
        "parse::stray_directive",
        "no open .if",
        format!("{directive} without .if"),
        None,
    )
}

pub fn parse_bad_condition(loc: &Location, e: &ExprError) -> Report {
    located(loc, "parse::condition", "in this condition", e.to_string(), None)
}

pub fn parse_malformed(loc: &Location, message: impl Into<String>, help: &str) -> Report {
    located(loc, "parse::malformed", "malformed line", message, Some(help))
}

// Resolve and emit errors

/// Failure of one statement's expression or encoding, with `others` more failures pending.
pub fn encode_failed(loc: &Location, e: &EncodeError, others: usize) -> Report {
    let message = match others {
        0 => e.to_string(),
        n => format!("{e} (+{n} more)"),
    };
    match e {
        EncodeError::Expr(ExprError::Undefined(_)) => located(
            loc,
            "resolve::undefined",
            "unresolved reference",
            message,
            Some(UNDEFINED_HINT),
        ),
        EncodeError::Expr(ExprError::Syntax(_)) => {
            located(loc, "expr::syntax", "invalid expression", message, None)
        }
        EncodeError::InvalidAddressingMode { .. } => located(
            loc,
            "encode::addressing_mode",
            "unsupported operand",
            message,
            Some("check which addressing modes this instruction supports"),
        ),
        EncodeError::BranchOutOfRange { .. } => located(
            loc,
            "encode::branch_range",
            "branch target too far",
            message,
            Some(BRANCH_HINT),
        ),
    }
}

/// Statement still unresolved after convergence that evaluates fine on its own.
pub fn unresolved(loc: &Location, others: usize) -> Report {
    let mut message = format!("Unresolved reference in: {}", loc.source().trim());
    if others > 0 {
        message.push_str(&format!(" (+{others} more)"));
    }
    located(loc, "resolve::undefined", "unresolved reference", message, Some(UNDEFINED_HINT))
}

/// `.error` assertions and statements the parser could not make sense of.
pub fn user_error(loc: &Location, message: &str) -> Report {
    located(loc, "asm::error", "raised here", message, None)
}

pub fn no_convergence(passes: usize, unstable: &[String]) -> Report {
    let help = if unstable.is_empty() {
        "look for a label whose address depends on its own value".to_string()
    } else {
        format!("symbols that did not stabilize:\n{}", unstable.join("\n"))
    };
    miette!(
        severity = Severity::Error,
        code = "resolve::no_convergence",
        help = help,
        "Assembly did not converge after {passes} passes",
    )
}

// Image errors

pub fn output_unwritable(path: &Path, e: io::Error) -> Report {
    miette!(
        severity = Severity::Error,
        code = "xex::write",
        help = "check that the destination directory exists and is writable",
        "Could not write `{}`: {e}",
        path.display()
    )
}

pub fn xex_overflow(start: u16, len: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "xex::overflow",
        help = "move the segment with org or make it smaller",
        "Segment at ${start:04X} overflows: {len} bytes would run past $FFFF",
    )
}

pub fn xex_stub_overlap(stub: u16, start: u16, end: u16) -> Report {
    miette!(
        severity = Severity::Error,
        code = "xex::init_stub",
        help = "relocate the init stub with --init-stub",
        "Init stub at ${stub:04X} would overwrite segment ${start:04X}-${end:04X}",
    )
}

pub fn xex_empty() -> Report {
    miette!(
        severity = Severity::Error,
        code = "xex::empty",
        help = "set an address with org and emit code or data",
        "Nothing to write: the program produced no segments",
    )
}
