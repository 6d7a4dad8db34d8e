use crate::lexer::cursor::Cursor;
use crate::span::{Idx, Span};

pub mod cursor;

/// A 'light' token that only carries its kind and where it sits in the expression text.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LiteralKind {
    /// `$FF`
    Hex,
    /// `255`
    Dec,
    /// `%11111111`
    Bin,
    /// `'A'`
    Char { terminated: bool },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    Lit(LiteralKind),
    Ident,
    /// `@name`
    Local,
    /// `@+`
    AnonNext,
    /// `@-`
    AnonPrev,
    /// `*` in value position
    Here,
    Plus,
    Minus,
    Star,
    Slash,
    /// Unary `<`, outside conditions
    Lo,
    /// Unary `>`, outside conditions
    Hi,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    OpenParen,
    CloseParen,
    Whitespace,
    Unknown,
    Eof,
}

impl TokenKind {
    /// Tokens after which `*` means multiply rather than the current address.
    fn ends_operand(self) -> bool {
        matches!(
            self,
            TokenKind::Lit(_)
                | TokenKind::Ident
                | TokenKind::Local
                | TokenKind::AnonNext
                | TokenKind::AnonPrev
                | TokenKind::Here
                | TokenKind::CloseParen
        )
    }
}

/// Test if a character may start a symbol name.
pub(crate) fn is_id_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Test if a character may continue a symbol name.
pub(crate) fn is_id(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Expression tokenizer. In condition context `<`, `>` and `=` compare instead of
/// selecting bytes.
pub struct Lexer<'a> {
    cursor: Cursor<'a>,
    pos: u32,
    condition: bool,
    after_operand: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, condition: bool) -> Self {
        Lexer {
            cursor: Cursor::new(input),
            pos: 0,
            condition,
            after_operand: false,
        }
    }

    pub fn advance_token(&mut self) -> Token {
        let first_char = match self.cursor.bump() {
            Some(c) => c,
            None => {
                return Token {
                    kind: TokenKind::Eof,
                    span: Span::new(Idx(self.pos), 0),
                }
            }
        };
        let kind = match first_char {
            c if c.is_whitespace() => {
                self.cursor.take_while(char::is_whitespace);
                TokenKind::Whitespace
            }
            '$' => {
                self.cursor.take_while(|c| c.is_ascii_hexdigit());
                TokenKind::Lit(LiteralKind::Hex)
            }
            '%' => {
                self.cursor.take_while(|c| c == '0' || c == '1');
                TokenKind::Lit(LiteralKind::Bin)
            }
            c if c.is_ascii_digit() => {
                self.cursor.take_while(|c| c.is_ascii_digit());
                TokenKind::Lit(LiteralKind::Dec)
            }
            '\'' => {
                self.cursor.take_while(|c| c != '\'');
                let terminated = self.cursor.bump() == Some('\'');
                TokenKind::Lit(LiteralKind::Char { terminated })
            }
            c if is_id_start(c) => {
                self.cursor.take_while(is_id);
                TokenKind::Ident
            }
            '@' => match self.cursor.first() {
                '+' => {
                    self.cursor.bump();
                    TokenKind::AnonNext
                }
                '-' => {
                    self.cursor.bump();
                    TokenKind::AnonPrev
                }
                c if is_id_start(c) => {
                    self.cursor.take_while(is_id);
                    TokenKind::Local
                }
                _ => TokenKind::Unknown,
            },
            '*' if self.after_operand => TokenKind::Star,
            '*' => TokenKind::Here,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '/' => TokenKind::Slash,
            '(' => TokenKind::OpenParen,
            ')' => TokenKind::CloseParen,
            '<' if self.condition => match self.cursor.first() {
                '=' => {
                    self.cursor.bump();
                    TokenKind::Le
                }
                '>' => {
                    self.cursor.bump();
                    TokenKind::Ne
                }
                _ => TokenKind::Lt,
            },
            '>' if self.condition => match self.cursor.first() {
                '=' => {
                    self.cursor.bump();
                    TokenKind::Ge
                }
                _ => TokenKind::Gt,
            },
            '=' if self.condition => TokenKind::Eq,
            '<' => TokenKind::Lo,
            '>' => TokenKind::Hi,
            _ => TokenKind::Unknown,
        };
        if kind != TokenKind::Whitespace {
            self.after_operand = kind.ends_operand();
        }
        let len = self.cursor.pos_in_token();
        let token = Token {
            kind,
            span: Span::new(Idx(self.pos), len),
        };
        self.pos += len;
        self.cursor.reset_pos();
        token
    }
}

/// Significant tokens of an expression, whitespace dropped, `Eof` excluded.
pub fn tokenize(input: &str, condition: bool) -> Vec<Token> {
    let mut lexer = Lexer::new(input, condition);
    std::iter::from_fn(move || {
        let token = lexer.advance_token();
        (token.kind != TokenKind::Eof).then_some(token)
    })
    .filter(|token| token.kind != TokenKind::Whitespace)
    .collect()
}
