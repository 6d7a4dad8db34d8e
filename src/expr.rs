use std::{error::Error, fmt, iter::Peekable, vec::IntoIter};

use crate::{
    lexer::{tokenize, LiteralKind, Token, TokenKind},
    symbol::{new_table, FileId, Scope, Symbol, SymbolTable},
};

/// Why an expression has no value (yet).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExprError {
    /// Expected while passes are still converging.
    Undefined(String),
    Syntax(String),
}

impl Error for ExprError {}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined(name) => write!(f, "Undefined symbol `{name}`"),
            Self::Syntax(message) => write!(f, "Invalid expression: {message}"),
        }
    }
}

/// Evaluate `text` against `symbols`, with `*` standing for `address`.
///
/// In condition context `= <> < > <= >=` compare and yield 0 or 1; elsewhere unary
/// `<` and `>` select the low and high byte. The result is masked to 32 bits.
pub fn evaluate(
    text: &str,
    symbols: &SymbolTable,
    scope: Scope,
    address: u16,
    condition: bool,
) -> Result<u32, ExprError> {
    let toks = tokenize(text, condition);
    if toks.is_empty() {
        return Err(ExprError::Syntax("empty expression".into()));
    }
    let mut eval = Evaluator {
        src: text,
        toks: toks.into_iter().peekable(),
        symbols,
        scope,
        address,
    };
    let value = eval.binary(0)?;
    if let Some(tok) = eval.toks.next() {
        return Err(eval.unexpected(tok));
    }
    Ok((value as u64 & 0xFFFF_FFFF) as u32)
}

/// Evaluate an expression that may only contain literals, e.g. a command line address.
pub fn evaluate_constant(text: &str) -> Result<u32, ExprError> {
    evaluate(text, &new_table(), Scope::new(FileId(0), 0), 0, false)
}

struct Evaluator<'a> {
    src: &'a str,
    toks: Peekable<IntoIter<Token>>,
    symbols: &'a SymbolTable,
    scope: Scope,
    address: u16,
}

/// Binding power of a binary operator; higher binds tighter.
fn precedence(kind: TokenKind) -> Option<u8> {
    match kind {
        TokenKind::Eq
        | TokenKind::Ne
        | TokenKind::Lt
        | TokenKind::Gt
        | TokenKind::Le
        | TokenKind::Ge => Some(1),
        TokenKind::Plus | TokenKind::Minus => Some(2),
        TokenKind::Star | TokenKind::Slash => Some(3),
        _ => None,
    }
}

impl Evaluator<'_> {
    fn text(&self, tok: Token) -> &str {
        &self.src[tok.span.as_range()]
    }

    fn unexpected(&self, tok: Token) -> ExprError {
        ExprError::Syntax(format!("unexpected `{}`", self.text(tok)))
    }

    fn binary(&mut self, min_prec: u8) -> Result<i64, ExprError> {
        let mut left = self.atom()?;
        while let Some(&op) = self.toks.peek() {
            let Some(prec) = precedence(op.kind) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.toks.next();
            let right = self.binary(prec + 1)?;
            left = match op.kind {
                TokenKind::Plus => left.wrapping_add(right),
                TokenKind::Minus => left.wrapping_sub(right),
                TokenKind::Star => left.wrapping_mul(right),
                // Truncates toward zero, never traps
                TokenKind::Slash if right == 0 => 0,
                TokenKind::Slash => left.wrapping_div(right),
                TokenKind::Eq => (left == right) as i64,
                TokenKind::Ne => (left != right) as i64,
                TokenKind::Lt => (left < right) as i64,
                TokenKind::Gt => (left > right) as i64,
                TokenKind::Le => (left <= right) as i64,
                TokenKind::Ge => (left >= right) as i64,
                _ => unreachable!(),
            };
        }
        Ok(left)
    }

    fn atom(&mut self) -> Result<i64, ExprError> {
        let Some(tok) = self.toks.next() else {
            return Err(ExprError::Syntax("unexpected end of expression".into()));
        };
        match tok.kind {
            TokenKind::Lo => Ok(self.atom()? & 0xFF),
            TokenKind::Hi => Ok((self.atom()? >> 8) & 0xFF),
            TokenKind::Minus => Ok(self.atom()?.wrapping_neg()),
            TokenKind::OpenParen => {
                let value = self.binary(0)?;
                match self.toks.next() {
                    Some(close) if close.kind == TokenKind::CloseParen => Ok(value),
                    _ => Err(ExprError::Syntax("missing closing parenthesis".into())),
                }
            }
            TokenKind::Lit(kind) => self.literal(tok, kind),
            TokenKind::Here => Ok(self.address as i64),
            TokenKind::Ident => {
                let name = self.text(tok);
                self.lookup(&Symbol::global(name), name)
            }
            TokenKind::Local => {
                let name = self.text(tok);
                self.lookup(&self.scope.local(&name[1..]), name)
            }
            TokenKind::AnonNext => self.lookup(&self.scope.next_anonymous(), "@+"),
            TokenKind::AnonPrev => match self.scope.prev_anonymous() {
                Some(sym) => self.lookup(&sym, "@-"),
                None => Err(ExprError::Undefined("@-".into())),
            },
            _ => Err(self.unexpected(tok)),
        }
    }

    fn lookup(&self, sym: &Symbol, written: &str) -> Result<i64, ExprError> {
        self.symbols
            .get(sym)
            .map(|&v| v as i64)
            .ok_or_else(|| ExprError::Undefined(written.to_string()))
    }

    fn literal(&self, tok: Token, kind: LiteralKind) -> Result<i64, ExprError> {
        let text = self.text(tok);
        let (digits, radix) = match kind {
            LiteralKind::Hex if text.len() == 1 => {
                return Err(ExprError::Syntax("empty hex literal".into()))
            }
            LiteralKind::Hex => (&text[1..], 16),
            // A bare `%` reads as zero
            LiteralKind::Bin if text.len() == 1 => return Ok(0),
            LiteralKind::Bin => (&text[1..], 2),
            LiteralKind::Dec => (text, 10),
            LiteralKind::Char { terminated } => {
                let mut chars = text[1..].chars();
                return match (chars.next(), chars.next(), terminated) {
                    (Some(c), Some('\''), true) if c != '\'' => Ok(c as i64),
                    _ => Err(ExprError::Syntax(format!("bad character literal {text}"))),
                };
            }
        };
        u32::from_str_radix(digits, radix)
            .map(i64::from)
            .map_err(|_| ExprError::Syntax(format!("literal {text} does not fit in 32 bits")))
    }
}
