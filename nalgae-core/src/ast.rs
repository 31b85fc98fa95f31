//! Syntax tree produced by the parser. Nodes are never mutated after
//! construction; every node keeps the source line it came from.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Identifier {
        name: String,
        line: usize,
    },
    StringLiteral {
        value: String,
        line: usize,
    },
    Call {
        target: String,
        arguments: Vec<Term>,
        line: usize,
    },
    Group {
        expressions: Vec<Expression>,
        line: usize,
    },
}

impl Term {
    pub fn line(&self) -> usize {
        match self {
            Term::Identifier { line, .. }
            | Term::StringLiteral { line, .. }
            | Term::Call { line, .. }
            | Term::Group { line, .. } => *line,
        }
    }
}

/// A pipeline `term | term | ...`, the only expression form.
///
/// The parser guarantees `terms` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub terms: Vec<Term>,
    pub line: usize,
}

/// `def name(parameter) = body`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: String,
    pub parameter: String,
    pub body: Expression,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub definitions: Vec<Definition>,
    pub expression: Expression,
}
