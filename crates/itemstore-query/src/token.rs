//! Token definitions for the query language

use crate::Span;
use logos::Logos;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r\n\f]+")] // Skip whitespace
#[logos(skip r"--[^\n]*")] // Skip line comments
pub enum TokenKind {
    // === Keywords (case-insensitive) ===
    #[token("select", ignore(ascii_case))]
    Select,
    #[token("from", ignore(ascii_case))]
    From,
    #[token("where", ignore(ascii_case))]
    Where,
    #[token("order", ignore(ascii_case))]
    Order,
    #[token("by", ignore(ascii_case))]
    By,
    #[token("asc", ignore(ascii_case))]
    Asc,
    #[token("desc", ignore(ascii_case))]
    Desc,
    #[token("as", ignore(ascii_case))]
    As,
    #[token("update", ignore(ascii_case))]
    Update,
    #[token("set", ignore(ascii_case))]
    Set,
    #[token("delete", ignore(ascii_case))]
    Delete,
    #[token("and", ignore(ascii_case))]
    And,
    #[token("or", ignore(ascii_case))]
    Or,
    #[token("not", ignore(ascii_case))]
    Not,
    #[token("like", ignore(ascii_case))]
    Like,
    #[token("in", ignore(ascii_case))]
    In,
    #[token("contains", ignore(ascii_case))]
    Contains,
    #[token("is", ignore(ascii_case))]
    Is,

    // Literals
    #[token("null", ignore(ascii_case))]
    Null,
    #[token("true", ignore(ascii_case))]
    True,
    #[token("false", ignore(ascii_case))]
    False,

    // === Operators ===
    #[token("=")]
    Eq,
    #[token("!=")]
    #[token("<>")]
    Ne,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,

    // === Delimiters ===
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token("*")]
    Star,

    // === Literals ===
    #[regex(r"-?[0-9]+", priority = 3)]
    Int,

    #[regex(r"-?[0-9]+\.[0-9]+")]
    Float,

    #[regex(r#""([^"\\]|\\.)*""#)]
    #[regex(r"'([^']|'')*'")]
    String,

    // === Parameters ===
    #[regex(r":[a-zA-Z_][a-zA-Z0-9_]*")]
    NamedParam,

    #[regex(r"\?[0-9]+")]
    PositionalParam,

    // === Identifiers ===
    /// Property or type name; type names may be qualified with dots
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*")]
    Ident,

    // === Special ===
    Error,
    Eof,
}

impl TokenKind {
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Select
                | TokenKind::From
                | TokenKind::Where
                | TokenKind::Order
                | TokenKind::By
                | TokenKind::Asc
                | TokenKind::Desc
                | TokenKind::As
                | TokenKind::Update
                | TokenKind::Set
                | TokenKind::Delete
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Not
                | TokenKind::Like
                | TokenKind::In
                | TokenKind::Contains
                | TokenKind::Is
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::Ne
                | TokenKind::Lt
                | TokenKind::Le
                | TokenKind::Gt
                | TokenKind::Ge
        )
    }

    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Select => "'SELECT'",
            TokenKind::From => "'FROM'",
            TokenKind::Where => "'WHERE'",
            TokenKind::Order => "'ORDER'",
            TokenKind::By => "'BY'",
            TokenKind::Asc => "'ASC'",
            TokenKind::Desc => "'DESC'",
            TokenKind::As => "'AS'",
            TokenKind::Update => "'UPDATE'",
            TokenKind::Set => "'SET'",
            TokenKind::Delete => "'DELETE'",
            TokenKind::And => "'AND'",
            TokenKind::Or => "'OR'",
            TokenKind::Not => "'NOT'",
            TokenKind::Like => "'LIKE'",
            TokenKind::In => "'IN'",
            TokenKind::Contains => "'CONTAINS'",
            TokenKind::Is => "'IS'",
            TokenKind::Null => "'NULL'",
            TokenKind::True => "'TRUE'",
            TokenKind::False => "'FALSE'",
            TokenKind::Eq => "'='",
            TokenKind::Ne => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::Le => "'<='",
            TokenKind::Gt => "'>'",
            TokenKind::Ge => "'>='",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::Comma => "','",
            TokenKind::Star => "'*'",
            TokenKind::Int => "integer",
            TokenKind::Float => "float",
            TokenKind::String => "string",
            TokenKind::NamedParam => "named parameter",
            TokenKind::PositionalParam => "positional parameter",
            TokenKind::Ident => "identifier",
            TokenKind::Error => "invalid character",
            TokenKind::Eof => "end of query",
        }
    }
}

/// A token with its span
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.start..self.span.end]
    }
}

/// Tokenize a query string; the last token is always `Eof`
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(source);

    while let Some(result) = lexer.next() {
        let span = Span::new(lexer.span().start, lexer.span().end);
        let kind = match result {
            Ok(kind) => kind,
            Err(_) => TokenKind::Error,
        };
        tokens.push(Token { kind, span });
    }

    let end = source.len();
    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(end, end),
    });

    tokens
}
