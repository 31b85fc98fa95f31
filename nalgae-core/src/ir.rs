//! Procedural form produced by lowering.
//!
//! Each procedure takes one string and returns one string. Its body is
//! a linear list of single-assignment bindings; temps are numbered per
//! procedure starting at zero.

use std::fmt;

use crate::builtins::{BuiltinKind, descriptor_for};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempId(pub u32);

/// A value available inside a procedure body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// The procedure's single parameter.
    Param,
    Temp(TempId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// A string constant, checked against the ASCII policy when produced.
    Literal(String),
    /// A runtime builtin; `args[0]` is the subject value.
    Builtin { kind: BuiltinKind, args: Vec<Operand> },
    /// A call to another procedure of the same program.
    Invoke { callee: String, argument: Operand },
    /// Newline-separated concatenation, in order. Never empty.
    Join(Vec<Operand>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub temp: TempId,
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Procedure {
    pub name: String,
    pub parameter: String,
    pub bindings: Vec<Binding>,
    pub result: Operand,
}

/// Lowered form of a whole program: one procedure per definition,
/// in declaration order, plus the entry procedure for the top-level
/// expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweredProgram {
    pub functions: Vec<Procedure>,
    pub entry: Procedure,
}

impl LoweredProgram {
    pub fn procedures(&self) -> impl Iterator<Item = &Procedure> {
        self.functions.iter().chain(std::iter::once(&self.entry))
    }

    /// Kinds of every builtin the program calls, deduplicated, in order
    /// of first use.
    pub fn used_builtins(&self) -> Vec<BuiltinKind> {
        let mut used = Vec::new();
        for procedure in self.procedures() {
            for binding in &procedure.bindings {
                if let Operation::Builtin { kind, .. } = &binding.operation {
                    if !used.contains(kind) {
                        used.push(*kind);
                    }
                }
            }
        }
        used
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tmp{}", self.0)
    }
}

struct ShowOperand<'a> {
    operand: Operand,
    parameter: &'a str,
}

impl fmt::Display for ShowOperand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Operand::Param => f.write_str(self.parameter),
            Operand::Temp(temp) => write!(f, "{temp}"),
        }
    }
}

impl Procedure {
    fn show(&self, operand: Operand) -> ShowOperand<'_> {
        ShowOperand {
            operand,
            parameter: &self.parameter,
        }
    }

    fn show_all(&self, operands: &[Operand]) -> String {
        operands
            .iter()
            .map(|operand| self.show(*operand).to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "proc {}({}) {{", self.name, self.parameter)?;
        for binding in &self.bindings {
            write!(f, "    {} = ", binding.temp)?;
            match &binding.operation {
                Operation::Literal(text) => writeln!(f, "literal {text:?}")?,
                Operation::Builtin { kind, args } => {
                    let name = descriptor_for(*kind).map_or("?", |b| b.name);
                    writeln!(f, "{name}({})", self.show_all(args))?
                }
                Operation::Invoke { callee, argument } => {
                    writeln!(f, "call {callee}({})", self.show(*argument))?
                }
                Operation::Join(parts) => writeln!(f, "join_lines({})", self.show_all(parts))?,
            }
        }
        writeln!(f, "    return {}", self.show(self.result))?;
        writeln!(f, "}}")
    }
}

impl fmt::Display for LoweredProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for procedure in &self.functions {
            writeln!(f, "{procedure}")?;
        }
        write!(f, "{}", self.entry)
    }
}
