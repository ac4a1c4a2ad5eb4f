//! Parser error types

use crate::{Span, TokenKind};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("unexpected token: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("unexpected end of query")]
    UnexpectedEof { span: Span },

    #[error("invalid character")]
    InvalidCharacter { span: Span },

    #[error("invalid literal: {reason}")]
    InvalidLiteral { reason: String, span: Span },

    #[error("empty query")]
    Empty { span: Span },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. } => *span,
            ParseError::UnexpectedEof { span } => *span,
            ParseError::InvalidCharacter { span } => *span,
            ParseError::InvalidLiteral { span, .. } => *span,
            ParseError::Empty { span } => *span,
        }
    }

    pub fn unexpected(expected: impl Into<String>, found: TokenKind, span: Span) -> Self {
        match found {
            TokenKind::Eof => ParseError::UnexpectedEof { span },
            TokenKind::Error => ParseError::InvalidCharacter { span },
            _ => ParseError::UnexpectedToken {
                expected: expected.into(),
                found: found.describe().to_string(),
                span,
            },
        }
    }

    /// Short label for the offending span in rendered diagnostics
    pub fn label(&self) -> String {
        match self {
            ParseError::UnexpectedToken { expected, .. } => format!("expected {}", expected),
            ParseError::UnexpectedEof { .. } => "query ends here".to_string(),
            ParseError::InvalidCharacter { .. } => "not part of the query language".to_string(),
            ParseError::InvalidLiteral { reason, .. } => reason.clone(),
            ParseError::Empty { .. } => "expected SELECT, UPDATE or DELETE".to_string(),
        }
    }
}
