//! Itemstore Query - Statement language for item queries
//!
//! A small SQL-like language over item types:
//! - `SELECT * | prop [AS alias], ... FROM type [WHERE cond] [ORDER BY prop [ASC|DESC], ...]`
//! - `UPDATE type SET prop = value, ... [WHERE cond]`
//! - `DELETE FROM type [WHERE cond]`
//!
//! Keywords are case-insensitive. Values are literals or parameters
//! (`:name`, `?1`) bound when the statement is executed.

pub mod ast;
mod error;
mod parser;
mod span;
mod token;

pub use ast::*;
pub use error::ParseError;
pub use parser::Parser;
pub use span::{Span, Spanned};
pub use token::{tokenize, Token, TokenKind};

/// Parse a query string into a statement
pub fn parse(source: &str) -> Result<Statement, ParseError> {
    let tokens = tokenize(source);
    let mut parser = Parser::new(source, tokens);
    parser.parse_statement()
}
