//! Recursive descent parser implementation

use crate::ast::*;
use crate::{ParseError, Span, Spanned, Token, TokenKind};

pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
        }
    }

    // === Utilities ===

    fn current(&self) -> Token {
        match self.tokens.get(self.pos).or_else(|| self.tokens.last()) {
            Some(token) => token.clone(),
            None => Token {
                kind: TokenKind::Eof,
                span: Span::new(self.source.len(), self.source.len()),
            },
        }
    }

    fn peek(&self) -> TokenKind {
        self.current().kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek() == kind
    }

    /// Advance past `kind` if it is next
    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(kind.describe()))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.current();
        ParseError::unexpected(expected, token.kind, token.span)
    }

    fn text(&self, token: &Token) -> &'a str {
        token.text(self.source)
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn ident(&mut self) -> Result<Spanned<String>, ParseError> {
        let token = self.consume(TokenKind::Ident)?;
        Ok(Spanned::new(self.text(&token).to_string(), token.span))
    }

    // === Statements ===

    pub fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let statement = match self.peek() {
            TokenKind::Select => Statement::Select(self.parse_select()?),
            TokenKind::Update => Statement::Update(self.parse_update()?),
            TokenKind::Delete => Statement::Delete(self.parse_delete()?),
            TokenKind::Eof => return Err(ParseError::Empty { span: self.span() }),
            _ => return Err(self.unexpected("SELECT, UPDATE or DELETE")),
        };
        if !self.at(TokenKind::Eof) {
            return Err(self.unexpected("end of query"));
        }
        Ok(statement)
    }

    fn parse_select(&mut self) -> Result<SelectStatement, ParseError> {
        let start = self.span();
        self.consume(TokenKind::Select)?;
        let projection = self.parse_select_list()?;
        self.consume(TokenKind::From)?;
        let type_name = self.ident()?;
        let condition = self.parse_where()?;

        let order_by = if self.eat(TokenKind::Order) {
            self.consume(TokenKind::By)?;
            self.parse_order_items()?
        } else {
            Vec::new()
        };

        let end = self.span();
        Ok(SelectStatement {
            projection,
            type_name,
            condition,
            order_by,
            span: start.merge(end),
        })
    }

    fn parse_select_list(&mut self) -> Result<SelectList, ParseError> {
        if self.eat(TokenKind::Star) {
            return Ok(SelectList::Star);
        }
        let mut items = Vec::new();
        loop {
            let property = self.ident()?;
            let alias = if self.eat(TokenKind::As) {
                Some(self.ident()?.node)
            } else {
                None
            };
            items.push(SelectItem { property, alias });

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(SelectList::Columns(items))
    }

    fn parse_order_items(&mut self) -> Result<Vec<OrderItem>, ParseError> {
        let mut items = Vec::new();
        loop {
            let property = self.ident()?;
            let descending = match self.peek() {
                TokenKind::Asc => {
                    self.advance();
                    false
                }
                TokenKind::Desc => {
                    self.advance();
                    true
                }
                _ => false,
            };
            items.push(OrderItem {
                property,
                descending,
            });

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn parse_update(&mut self) -> Result<UpdateStatement, ParseError> {
        let start = self.span();
        self.consume(TokenKind::Update)?;
        let type_name = self.ident()?;
        self.consume(TokenKind::Set)?;

        let mut assignments = Vec::new();
        loop {
            let property = self.ident()?;
            self.consume(TokenKind::Eq)?;
            let value = self.parse_operand()?;
            assignments.push(Assignment { property, value });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        let condition = self.parse_where()?;
        let end = self.span();
        Ok(UpdateStatement {
            type_name,
            assignments,
            condition,
            span: start.merge(end),
        })
    }

    fn parse_delete(&mut self) -> Result<DeleteStatement, ParseError> {
        let start = self.span();
        self.consume(TokenKind::Delete)?;
        self.consume(TokenKind::From)?;
        let type_name = self.ident()?;
        let condition = self.parse_where()?;
        let end = self.span();
        Ok(DeleteStatement {
            type_name,
            condition,
            span: start.merge(end),
        })
    }

    fn parse_where(&mut self) -> Result<Option<Condition>, ParseError> {
        if self.eat(TokenKind::Where) {
            Ok(Some(self.parse_or()?))
        } else {
            Ok(None)
        }
    }

    // === Conditions ===

    fn parse_or(&mut self) -> Result<Condition, ParseError> {
        let mut parts = vec![self.parse_and()?];
        while self.eat(TokenKind::Or) {
            parts.push(self.parse_and()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Condition::Or(parts)
        })
    }

    fn parse_and(&mut self) -> Result<Condition, ParseError> {
        let mut parts = vec![self.parse_unary()?];
        while self.eat(TokenKind::And) {
            parts.push(self.parse_unary()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Condition::And(parts)
        })
    }

    fn parse_unary(&mut self) -> Result<Condition, ParseError> {
        if self.eat(TokenKind::Not) {
            return Ok(Condition::Not(Box::new(self.parse_unary()?)));
        }
        if self.eat(TokenKind::LParen) {
            let inner = self.parse_or()?;
            self.consume(TokenKind::RParen)?;
            return Ok(inner);
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<Condition, ParseError> {
        let property = self.ident()?;

        if self.peek().is_comparison() {
            let op = match self.advance().kind {
                TokenKind::Eq => ComparisonOp::Eq,
                TokenKind::Ne => ComparisonOp::Ne,
                TokenKind::Lt => ComparisonOp::Lt,
                TokenKind::Le => ComparisonOp::Le,
                TokenKind::Gt => ComparisonOp::Gt,
                _ => ComparisonOp::Ge,
            };
            let operand = self.parse_operand()?;
            return Ok(Condition::Compare {
                property,
                op,
                operand,
            });
        }

        match self.peek() {
            TokenKind::Is => {
                self.advance();
                let negated = self.eat(TokenKind::Not);
                self.consume(TokenKind::Null)?;
                Ok(Condition::IsNull { property, negated })
            }
            TokenKind::Contains => {
                self.advance();
                let operand = self.parse_operand()?;
                Ok(Condition::Contains { property, operand })
            }
            TokenKind::Not => {
                self.advance();
                let inner = self.parse_membership(property)?;
                Ok(Condition::Not(Box::new(inner)))
            }
            TokenKind::Like | TokenKind::In => self.parse_membership(property),
            _ => Err(self.unexpected("comparison, LIKE, IN, CONTAINS or IS")),
        }
    }

    /// `LIKE pattern` or `IN (operands)`, which may follow `NOT`
    fn parse_membership(&mut self, property: Spanned<String>) -> Result<Condition, ParseError> {
        if self.eat(TokenKind::Like) {
            let pattern = self.parse_operand()?;
            return Ok(Condition::Like { property, pattern });
        }
        self.consume(TokenKind::In)?;
        self.consume(TokenKind::LParen)?;
        let mut operands = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                operands.push(self.parse_operand()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen)?;
        Ok(Condition::In { property, operands })
    }

    // === Operands ===

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        let token = self.current();
        let text = self.text(&token);
        let kind = match token.kind {
            TokenKind::Null => OperandKind::Literal(Literal::Null),
            TokenKind::True => OperandKind::Literal(Literal::Bool(true)),
            TokenKind::False => OperandKind::Literal(Literal::Bool(false)),
            TokenKind::Int => match text.parse::<i64>() {
                Ok(n) => OperandKind::Literal(Literal::Int(n)),
                Err(e) => {
                    return Err(ParseError::InvalidLiteral {
                        reason: e.to_string(),
                        span: token.span,
                    })
                }
            },
            TokenKind::Float => match text.parse::<f64>() {
                Ok(f) => OperandKind::Literal(Literal::Float(f)),
                Err(e) => {
                    return Err(ParseError::InvalidLiteral {
                        reason: e.to_string(),
                        span: token.span,
                    })
                }
            },
            TokenKind::String => OperandKind::Literal(Literal::Text(parse_string_literal(text))),
            TokenKind::NamedParam => OperandKind::Param(ParamRef::Named(text[1..].to_string())),
            TokenKind::PositionalParam => match text[1..].parse::<usize>() {
                Ok(index) if index > 0 => OperandKind::Param(ParamRef::Positional(index)),
                _ => {
                    return Err(ParseError::InvalidLiteral {
                        reason: "positional parameters are numbered from 1".to_string(),
                        span: token.span,
                    })
                }
            },
            _ => return Err(self.unexpected("literal or parameter")),
        };
        self.advance();
        Ok(Spanned::new(kind, token.span))
    }
}

// === Helpers ===

fn parse_string_literal(text: &str) -> String {
    let inner = &text[1..text.len() - 1];
    if text.starts_with('\'') {
        return inner.replace("''", "'");
    }
    inner
        .replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\r", "\r")
        .replace("\\\"", "\"")
        .replace("\\\\", "\\")
}
