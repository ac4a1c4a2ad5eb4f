//! Statement tree produced by the parser

use crate::{Span, Spanned};

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

impl Statement {
    /// Type name the statement targets, as written
    pub fn type_name(&self) -> &Spanned<String> {
        match self {
            Statement::Select(s) => &s.type_name,
            Statement::Update(s) => &s.type_name,
            Statement::Delete(s) => &s.type_name,
        }
    }

    pub fn condition(&self) -> Option<&Condition> {
        match self {
            Statement::Select(s) => s.condition.as_ref(),
            Statement::Update(s) => s.condition.as_ref(),
            Statement::Delete(s) => s.condition.as_ref(),
        }
    }

    /// Whether the statement modifies stored items
    pub fn is_write(&self) -> bool {
        !matches!(self, Statement::Select(_))
    }

    pub fn span(&self) -> Span {
        match self {
            Statement::Select(s) => s.span,
            Statement::Update(s) => s.span,
            Statement::Delete(s) => s.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub projection: SelectList,
    pub type_name: Spanned<String>,
    pub condition: Option<Condition>,
    pub order_by: Vec<OrderItem>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectList {
    /// `*`: whole items
    Star,
    Columns(Vec<SelectItem>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub property: Spanned<String>,
    pub alias: Option<String>,
}

impl SelectItem {
    /// Column name in the result: the alias, else the property
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.property.node)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub property: Spanned<String>,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub type_name: Spanned<String>,
    pub assignments: Vec<Assignment>,
    pub condition: Option<Condition>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub property: Spanned<String>,
    pub value: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub type_name: Spanned<String>,
    pub condition: Option<Condition>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        property: Spanned<String>,
        op: ComparisonOp,
        operand: Operand,
    },
    Like {
        property: Spanned<String>,
        pattern: Operand,
    },
    In {
        property: Spanned<String>,
        operands: Vec<Operand>,
    },
    Contains {
        property: Spanned<String>,
        operand: Operand,
    },
    IsNull {
        property: Spanned<String>,
        negated: bool,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// Every property the condition reads, with its location
    pub fn properties(&self) -> Vec<&Spanned<String>> {
        let mut out = Vec::new();
        self.collect_properties(&mut out);
        out
    }

    fn collect_properties<'a>(&'a self, out: &mut Vec<&'a Spanned<String>>) {
        match self {
            Condition::Compare { property, .. }
            | Condition::Like { property, .. }
            | Condition::In { property, .. }
            | Condition::Contains { property, .. }
            | Condition::IsNull { property, .. } => out.push(property),
            Condition::And(parts) | Condition::Or(parts) => {
                parts.iter().for_each(|p| p.collect_properties(out))
            }
            Condition::Not(inner) => inner.collect_properties(out),
        }
    }
}

/// Right-hand side of a condition or assignment
pub type Operand = Spanned<OperandKind>;

#[derive(Debug, Clone, PartialEq)]
pub enum OperandKind {
    Literal(Literal),
    Param(ParamRef),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamRef {
    /// `:name`
    Named(String),
    /// `?1`, numbered from one
    Positional(usize),
}

impl std::fmt::Display for ParamRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamRef::Named(name) => write!(f, ":{}", name),
            ParamRef::Positional(index) => write!(f, "?{}", index),
        }
    }
}
