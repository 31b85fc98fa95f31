//! Name resolution and lowering from the syntax tree to procedures.
//!
//! Lowering is a single walk over the program. Every call site is
//! resolved while its procedure body is being emitted, so an unknown
//! name or a wrong argument count stops the walk at the first
//! offending term.
//!
//! A term is lowered in one of two contexts:
//!
//! - *value context*: no threaded value exists (first term of a
//!   pipeline). Builtins need their subject as an explicit argument.
//! - *pipeline context*: the previous step's result is threaded in as
//!   the subject of the call.
//!
//! Groups entered from pipeline context rebind the scope parameter to
//! the threaded value, so `x | { x | upper; x | lower }` forks `x`.

use std::collections::HashMap;

use crate::ast::{Definition, Expression, Program, Term};
use crate::builtins::{BuiltinCatalog, BuiltinDescriptor};
use crate::error::CoreError;
use crate::ir::{Binding, LoweredProgram, Operand, Operation, Procedure, TempId};

/// Name of the value the top-level expression sees as its parameter.
pub const TOP_LEVEL_PARAMETER: &str = "it";

/// Parameter name of the entry procedure in generated code.
pub const ENTRY_PARAMETER: &str = "input";

/// Generated procedure name for a user definition.
pub fn function_name(name: &str) -> String {
    format!("fn_{name}")
}

pub fn lower_program(
    program: &Program,
    catalog: &BuiltinCatalog,
    entry_point: &str,
) -> Result<LoweredProgram, CoreError> {
    let definitions = index_definitions(program, catalog)?;
    let lowerer = Lowerer {
        catalog,
        definitions: &definitions,
    };

    let mut functions = Vec::with_capacity(program.definitions.len());
    for definition in &program.definitions {
        let scope = lowerer.scope(&definition.parameter);
        functions.push(lowerer.lower_procedure(
            function_name(&definition.name),
            &definition.parameter,
            &definition.body,
            &scope,
        )?);
    }

    let scope = lowerer.scope(TOP_LEVEL_PARAMETER);
    let entry = lowerer.lower_procedure(
        entry_point.to_string(),
        ENTRY_PARAMETER,
        &program.expression,
        &scope,
    )?;

    let lowered = LoweredProgram { functions, entry };
    tracing::debug!(
        procedures = lowered.functions.len() + 1,
        bindings = lowered.procedures().map(|p| p.bindings.len()).sum::<usize>(),
        "lowered program"
    );
    Ok(lowered)
}

type DefinitionMap<'p> = HashMap<&'p str, &'p Definition>;

fn index_definitions<'p>(
    program: &'p Program,
    catalog: &BuiltinCatalog,
) -> Result<DefinitionMap<'p>, CoreError> {
    let mut definitions = HashMap::new();
    for definition in &program.definitions {
        let name = definition.name.as_str();
        if definitions.insert(name, definition).is_some() {
            return Err(CoreError::resolution(
                definition.line,
                format!("Function '{name}' is already defined"),
            ));
        }
        if catalog.contains(name) {
            tracing::warn!(
                line = definition.line,
                "function '{name}' is shadowed by the builtin of the same name"
            );
        }
    }
    Ok(definitions)
}

/// What a name at a call site refers to.
enum Callee<'p> {
    Builtin(&'static BuiltinDescriptor),
    Function(&'p Definition),
}

#[derive(Debug, Clone, Copy)]
struct Scope<'a> {
    /// Source name denoting the parameter, or the threaded value inside
    /// a forked group.
    parameter: &'a str,
    /// What that name evaluates to in generated code.
    current: Operand,
    definitions: &'a DefinitionMap<'a>,
}

impl<'a> Scope<'a> {
    fn rebind(&self, current: Operand) -> Scope<'a> {
        Scope { current, ..*self }
    }
}

/// Bindings of the procedure being emitted.
#[derive(Debug, Default)]
struct ProcedureBuilder {
    bindings: Vec<Binding>,
    next_temp: u32,
}

impl ProcedureBuilder {
    fn bind(&mut self, operation: Operation) -> Operand {
        let temp = TempId(self.next_temp);
        self.next_temp += 1;
        self.bindings.push(Binding { temp, operation });
        Operand::Temp(temp)
    }
}

struct Lowerer<'p> {
    catalog: &'p BuiltinCatalog,
    definitions: &'p DefinitionMap<'p>,
}

impl<'p> Lowerer<'p> {
    fn scope(&self, parameter: &'p str) -> Scope<'p> {
        Scope {
            parameter,
            current: Operand::Param,
            definitions: self.definitions,
        }
    }

    fn lower_procedure(
        &self,
        name: String,
        parameter: &str,
        body: &Expression,
        scope: &Scope<'_>,
    ) -> Result<Procedure, CoreError> {
        let mut builder = ProcedureBuilder::default();
        let result = self.lower_expression(body, scope, &mut builder)?;
        Ok(Procedure {
            name,
            parameter: parameter.to_string(),
            bindings: builder.bindings,
            result,
        })
    }

    fn lower_expression(
        &self,
        expression: &Expression,
        scope: &Scope<'_>,
        builder: &mut ProcedureBuilder,
    ) -> Result<Operand, CoreError> {
        let Some((first, rest)) = expression.terms.split_first() else {
            return Err(CoreError::resolution(expression.line, "Empty pipeline"));
        };
        let mut current = self.lower_value(first, scope, builder)?;
        for term in rest {
            current = self.lower_step(term, scope, builder, current)?;
        }
        Ok(current)
    }

    /// Builtins are checked before definitions.
    fn resolve<'s>(
        &self,
        scope: &Scope<'s>,
        name: &str,
        line: usize,
    ) -> Result<Callee<'s>, CoreError> {
        if let Some(builtin) = self.catalog.find(name) {
            return Ok(Callee::Builtin(builtin));
        }
        if let Some(definition) = scope.definitions.get(name).copied() {
            return Ok(Callee::Function(definition));
        }
        Err(CoreError::resolution(
            line,
            format!("Unknown function '{name}'"),
        ))
    }

    /// Lower a term with no threaded value.
    fn lower_value(
        &self,
        term: &Term,
        scope: &Scope<'_>,
        builder: &mut ProcedureBuilder,
    ) -> Result<Operand, CoreError> {
        match term {
            Term::Identifier { name, line } => {
                if name == scope.parameter {
                    Ok(scope.current)
                } else {
                    Err(CoreError::resolution(
                        *line,
                        format!("Unknown identifier '{name}' in value context"),
                    ))
                }
            }
            Term::StringLiteral { value, .. } => Ok(builder.bind(Operation::Literal(value.clone()))),
            Term::Call {
                target,
                arguments,
                line,
            } => match self.resolve(scope, target, *line)? {
                Callee::Builtin(builtin) => {
                    let expected = builtin.operand_count();
                    if arguments.len() != expected {
                        return Err(CoreError::resolution(
                            *line,
                            format!(
                                "Builtin '{target}' expects {expected} arguments in value context"
                            ),
                        ));
                    }
                    let args = self.lower_arguments(arguments, scope, builder)?;
                    Ok(builder.bind(Operation::Builtin {
                        kind: builtin.kind,
                        args,
                    }))
                }
                Callee::Function(definition) => {
                    let [argument] = arguments.as_slice() else {
                        return Err(CoreError::resolution(
                            *line,
                            format!("Function '{target}' expects exactly one argument"),
                        ));
                    };
                    let argument = self.lower_value(argument, scope, builder)?;
                    Ok(builder.bind(Operation::Invoke {
                        callee: function_name(&definition.name),
                        argument,
                    }))
                }
            },
            Term::Group { expressions, .. } => self.lower_group(expressions, scope, builder),
        }
    }

    /// Lower a term that receives `current` as its subject.
    fn lower_step(
        &self,
        term: &Term,
        scope: &Scope<'_>,
        builder: &mut ProcedureBuilder,
        current: Operand,
    ) -> Result<Operand, CoreError> {
        match term {
            Term::Identifier { name, line } => {
                if name == scope.parameter {
                    return Err(CoreError::resolution(
                        *line,
                        format!("Cannot call parameter '{name}' as a function"),
                    ));
                }
                match self.resolve(scope, name, *line)? {
                    Callee::Builtin(builtin) if builtin.arity == 0 => {
                        Ok(builder.bind(Operation::Builtin {
                            kind: builtin.kind,
                            args: vec![current],
                        }))
                    }
                    Callee::Builtin(builtin) => Err(CoreError::resolution(
                        *line,
                        format!(
                            "Builtin '{name}' requires {} argument(s)",
                            builtin.arity
                        ),
                    )),
                    Callee::Function(definition) => Ok(builder.bind(Operation::Invoke {
                        callee: function_name(&definition.name),
                        argument: current,
                    })),
                }
            }
            // a bare literal resets the pipeline to its own value
            Term::StringLiteral { value, .. } => Ok(builder.bind(Operation::Literal(value.clone()))),
            Term::Call {
                target,
                arguments,
                line,
            } => match self.resolve(scope, target, *line)? {
                Callee::Builtin(builtin) => {
                    if arguments.len() != builtin.arity {
                        return Err(CoreError::resolution(
                            *line,
                            format!(
                                "Builtin '{target}' expects {} argument(s) in pipeline context",
                                builtin.arity
                            ),
                        ));
                    }
                    let mut args = Vec::with_capacity(builtin.operand_count());
                    args.push(current);
                    args.extend(self.lower_arguments(arguments, scope, builder)?);
                    Ok(builder.bind(Operation::Builtin {
                        kind: builtin.kind,
                        args,
                    }))
                }
                Callee::Function(_) => Err(CoreError::resolution(
                    *line,
                    format!(
                        "User function '{target}' does not accept additional arguments in pipeline"
                    ),
                )),
            },
            Term::Group { expressions, .. } => {
                self.lower_group(expressions, &scope.rebind(current), builder)
            }
        }
    }

    fn lower_arguments(
        &self,
        arguments: &[Term],
        scope: &Scope<'_>,
        builder: &mut ProcedureBuilder,
    ) -> Result<Vec<Operand>, CoreError> {
        arguments
            .iter()
            .map(|argument| self.lower_value(argument, scope, builder))
            .collect()
    }

    fn lower_group(
        &self,
        expressions: &[Expression],
        scope: &Scope<'_>,
        builder: &mut ProcedureBuilder,
    ) -> Result<Operand, CoreError> {
        if expressions.is_empty() {
            return Ok(builder.bind(Operation::Literal(String::new())));
        }
        let parts = expressions
            .iter()
            .map(|expression| self.lower_expression(expression, scope, builder))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(builder.bind(Operation::Join(parts)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::BuiltinKind;
    use crate::parser::parse;

    fn lower(source: &str) -> Result<LoweredProgram, CoreError> {
        let program = parse(source)?;
        lower_program(&program, BuiltinCatalog::standard(), "run")
    }

    fn temp(id: u32) -> Operand {
        Operand::Temp(TempId(id))
    }

    fn resolution_message(source: &str) -> String {
        match lower(source) {
            Err(CoreError::ResolutionError { message, .. }) => message,
            other => panic!("expected resolution error, got {other:?}"),
        }
    }

    #[test]
    fn identity_program_has_no_bindings() {
        let lowered = lower("it").expect("lower");
        assert!(lowered.functions.is_empty());
        assert_eq!(lowered.entry.name, "run");
        assert_eq!(lowered.entry.parameter, ENTRY_PARAMETER);
        assert!(lowered.entry.bindings.is_empty());
        assert_eq!(lowered.entry.result, Operand::Param);
    }

    #[test]
    fn lowers_definition_and_invocation() {
        let lowered = lower("def shout(x) = x | upper | append \"!\"\nit | shout").expect("lower");
        let shout = &lowered.functions[0];
        assert_eq!(shout.name, "fn_shout");
        assert_eq!(shout.parameter, "x");
        let operations: Vec<_> = shout.bindings.iter().map(|b| b.operation.clone()).collect();
        assert_eq!(
            operations,
            vec![
                Operation::Builtin {
                    kind: BuiltinKind::Upper,
                    args: vec![Operand::Param],
                },
                Operation::Literal("!".to_string()),
                Operation::Builtin {
                    kind: BuiltinKind::Append,
                    args: vec![temp(0), temp(1)],
                },
            ]
        );
        assert_eq!(shout.result, temp(2));

        // a bare name in value context can only be the parameter
        assert_eq!(
            resolution_message("def shout(x) = x | upper\nshout"),
            "Unknown identifier 'shout' in value context"
        );
        let lowered = lower("def shout(x) = x | upper\nit | shout").expect("lower");
        assert_eq!(
            lowered.entry.bindings[0].operation,
            Operation::Invoke {
                callee: "fn_shout".to_string(),
                argument: Operand::Param,
            }
        );
    }

    #[test]
    fn temp_counter_restarts_per_procedure() {
        let lowered =
            lower("def a(x) = x | upper | lower\ndef b(y) = y | trim\nit | a | b").expect("lower");
        let first_temps: Vec<_> = lowered
            .procedures()
            .map(|p| p.bindings.first().map(|b| b.temp))
            .collect();
        assert_eq!(
            first_temps,
            vec![Some(TempId(0)), Some(TempId(0)), Some(TempId(0))]
        );
    }

    #[test]
    fn value_context_builtin_takes_subject_explicitly() {
        let lowered = lower("wrap { it } \"<\" \">\"").expect("lower");
        assert_eq!(
            lowered.entry.bindings.last().map(|b| b.operation.clone()),
            Some(Operation::Builtin {
                kind: BuiltinKind::Wrap,
                args: vec![temp(0), temp(1), temp(2)],
            })
        );
    }

    #[test]
    fn value_context_arity_error_names_expected_count() {
        assert_eq!(
            resolution_message("append \"only-one-arg\""),
            "Builtin 'append' expects 2 arguments in value context"
        );
    }

    #[test]
    fn value_context_user_function_needs_one_argument() {
        let lowered = lower("def f(x) = x | upper\nf \"a\"").expect("lower");
        assert_eq!(
            lowered.entry.bindings[1].operation,
            Operation::Invoke {
                callee: "fn_f".to_string(),
                argument: temp(0),
            }
        );
        assert_eq!(
            resolution_message("def f(x) = x\nf \"a\" \"b\""),
            "Function 'f' expects exactly one argument"
        );
    }

    #[test]
    fn unknown_identifier_in_value_context() {
        assert_eq!(
            resolution_message("upper"),
            "Unknown identifier 'upper' in value context"
        );
        assert_eq!(
            resolution_message("def f(x) = it\nf"),
            "Unknown identifier 'it' in value context"
        );
    }

    #[test]
    fn calling_the_parameter_is_rejected() {
        let err = lower("def f(x) = x | x\nit | f").unwrap_err();
        assert_eq!(
            err,
            CoreError::resolution(1, "Cannot call parameter 'x' as a function")
        );
    }

    #[test]
    fn pipeline_context_arity_checks() {
        assert_eq!(
            resolution_message("it | append"),
            "Builtin 'append' requires 1 argument(s)"
        );
        assert_eq!(
            resolution_message("it | replace \"a\""),
            "Builtin 'replace' expects 2 argument(s) in pipeline context"
        );
        assert_eq!(
            resolution_message("def f(x) = x\nit | f \"a\""),
            "User function 'f' does not accept additional arguments in pipeline"
        );
    }

    #[test]
    fn unknown_functions_report_their_line() {
        let err = lower("it\n| upper\n| shout").unwrap_err();
        assert_eq!(err, CoreError::resolution(3, "Unknown function 'shout'"));
        assert_eq!(
            resolution_message("frobnicate \"x\""),
            "Unknown function 'frobnicate'"
        );
    }

    #[test]
    fn builtins_win_over_definitions() {
        let lowered = lower("def upper(x) = x | lower\nit | upper").expect("lower");
        assert_eq!(
            lowered.entry.bindings[0].operation,
            Operation::Builtin {
                kind: BuiltinKind::Upper,
                args: vec![Operand::Param],
            }
        );
    }

    #[test]
    fn duplicate_definitions_are_rejected() {
        let err = lower("def f(x) = x | upper\ndef f(x) = x | lower\nit | f").unwrap_err();
        assert_eq!(
            err,
            CoreError::resolution(2, "Function 'f' is already defined")
        );
    }

    #[test]
    fn literal_step_discards_current_value() {
        let lowered = lower("it | upper | \"LIT\"").expect("lower");
        assert_eq!(
            lowered.entry.bindings[1].operation,
            Operation::Literal("LIT".to_string())
        );
        assert_eq!(lowered.entry.result, temp(1));
    }

    #[test]
    fn pipeline_group_rebinds_parameter() {
        let lowered = lower("it | upper | { it; it | lower }").expect("lower");
        let bindings = &lowered.entry.bindings;
        // tmp0 = upper(it); tmp1 = lower(tmp0); tmp2 = join(tmp0, tmp1)
        assert_eq!(
            bindings[1].operation,
            Operation::Builtin {
                kind: BuiltinKind::Lower,
                args: vec![temp(0)],
            }
        );
        assert_eq!(bindings[2].operation, Operation::Join(vec![temp(0), temp(1)]));
    }

    #[test]
    fn value_group_keeps_scope() {
        let lowered = lower("def f(x) = { x; \"b\" }\nit | f").expect("lower");
        assert_eq!(
            lowered.functions[0].bindings[1].operation,
            Operation::Join(vec![Operand::Param, temp(0)])
        );
    }

    #[test]
    fn empty_group_is_empty_literal() {
        let lowered = lower("{}").expect("lower");
        assert_eq!(
            lowered.entry.bindings,
            vec![Binding {
                temp: TempId(0),
                operation: Operation::Literal(String::new()),
            }]
        );
    }

    #[test]
    fn const_builtin_takes_subject_in_pipeline() {
        let lowered = lower("it | const \"x\"").expect("lower");
        assert_eq!(
            lowered.entry.bindings[1].operation,
            Operation::Builtin {
                kind: BuiltinKind::Const,
                args: vec![Operand::Param, temp(0)],
            }
        );
    }
}
