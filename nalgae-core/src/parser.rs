use crate::ast::{Definition, Expression, Program, Term};
use crate::error::CoreError;
use crate::lexer::{Token, TokenKind, lex};

/// Deepest nesting of groups and call arguments the parser accepts.
pub const MAX_NESTING: usize = 256;

/// Lex and parse a complete program.
pub fn parse(input: &str) -> Result<Program, CoreError> {
    let tokens = lex(input)?;
    parse_program(&tokens)
}

/// Parse a token stream produced by [`lex`] into a program.
///
/// The whole stream must be consumed; anything after the top-level
/// expression is an error.
pub fn parse_program(tokens: &[Token]) -> Result<Program, CoreError> {
    let mut position = 0;
    let mut definitions = Vec::new();
    while matches_kind(tokens, &mut position, TokenKind::Def) {
        definitions.push(parse_definition(tokens, &mut position)?);
    }
    let expression = parse_expression(tokens, &mut position, 0)?;
    expect(tokens, &mut position, TokenKind::Eof, "Expected end of input")?;
    tracing::debug!(definitions = definitions.len(), "parsed program");
    Ok(Program {
        definitions,
        expression,
    })
}

fn parse_definition(tokens: &[Token], position: &mut usize) -> Result<Definition, CoreError> {
    let name = expect(tokens, position, TokenKind::Ident, "Expected function name")?;
    expect(tokens, position, TokenKind::LParen, "Expected '('")?;
    let parameter = expect(tokens, position, TokenKind::Ident, "Expected parameter name")?;
    expect(tokens, position, TokenKind::RParen, "Expected ')'")?;
    let equal = expect(tokens, position, TokenKind::Equal, "Expected '='")?;
    let body = parse_expression(tokens, position, 0)?;
    Ok(Definition {
        name: name.lexeme.clone(),
        parameter: parameter.lexeme.clone(),
        body,
        line: equal.line,
    })
}

fn parse_expression(
    tokens: &[Token],
    position: &mut usize,
    depth: usize,
) -> Result<Expression, CoreError> {
    let first = parse_term(tokens, position, depth)?;
    let line = first.line();
    let mut terms = vec![first];
    while matches_kind(tokens, position, TokenKind::Pipe) {
        terms.push(parse_term(tokens, position, depth)?);
    }
    Ok(Expression { terms, line })
}

fn parse_term(tokens: &[Token], position: &mut usize, depth: usize) -> Result<Term, CoreError> {
    let token = peek(tokens, *position)?;
    if depth >= MAX_NESTING {
        return Err(error_at(token, "Expression nested too deeply"));
    }
    match token.kind {
        TokenKind::LBrace => {
            *position += 1;
            parse_group(tokens, position, token.line, depth + 1)
        }
        TokenKind::Ident => {
            *position += 1;
            let arguments = parse_call_arguments(tokens, position, token.line, depth + 1)?;
            if arguments.is_empty() {
                Ok(Term::Identifier {
                    name: token.lexeme.clone(),
                    line: token.line,
                })
            } else {
                Ok(Term::Call {
                    target: token.lexeme.clone(),
                    arguments,
                    line: token.line,
                })
            }
        }
        TokenKind::StringLiteral => {
            *position += 1;
            Ok(Term::StringLiteral {
                value: token.lexeme.clone(),
                line: token.line,
            })
        }
        TokenKind::LParen => Err(error_at(
            token,
            "Parenthesised expressions are not supported",
        )),
        TokenKind::Eof => Err(error_at(token, "Expected expression")),
        _ => Err(error_at(
            token,
            &format!("Unexpected token '{}'", token.lexeme),
        )),
    }
}

/// `{` has been consumed.
fn parse_group(
    tokens: &[Token],
    position: &mut usize,
    line: usize,
    depth: usize,
) -> Result<Term, CoreError> {
    let mut expressions = Vec::new();
    if !check(tokens, *position, TokenKind::RBrace) {
        loop {
            expressions.push(parse_expression(tokens, position, depth)?);
            if !matches_kind(tokens, position, TokenKind::Semi) {
                break;
            }
        }
    }
    expect(tokens, position, TokenKind::RBrace, "Expected '}'")?;
    Ok(Term::Group { expressions, line })
}

/// Arguments of a call must start on the same line as the call head.
fn parse_call_arguments(
    tokens: &[Token],
    position: &mut usize,
    call_line: usize,
    depth: usize,
) -> Result<Vec<Term>, CoreError> {
    let mut arguments = Vec::new();
    while let Some(next) = tokens.get(*position) {
        if next.line > call_line {
            break;
        }
        match next.kind {
            TokenKind::Ident | TokenKind::StringLiteral | TokenKind::LBrace => {
                arguments.push(parse_term(tokens, position, depth)?);
            }
            _ => break,
        }
    }
    Ok(arguments)
}

fn peek(tokens: &[Token], position: usize) -> Result<&Token, CoreError> {
    tokens
        .get(position)
        .or_else(|| tokens.last())
        .ok_or_else(|| CoreError::parse(1, "Error at end: unexpected end of input"))
}

fn check(tokens: &[Token], position: usize, kind: TokenKind) -> bool {
    match tokens.get(position) {
        Some(token) => token.kind == kind,
        None => kind == TokenKind::Eof,
    }
}

fn matches_kind(tokens: &[Token], position: &mut usize, kind: TokenKind) -> bool {
    if kind != TokenKind::Eof && check(tokens, *position, kind) {
        *position += 1;
        return true;
    }
    false
}

fn expect<'t>(
    tokens: &'t [Token],
    position: &mut usize,
    kind: TokenKind,
    message: &str,
) -> Result<&'t Token, CoreError> {
    let token = peek(tokens, *position)?;
    if token.kind != kind {
        return Err(error_at(token, message));
    }
    if kind != TokenKind::Eof {
        *position += 1;
    }
    Ok(token)
}

fn error_at(token: &Token, message: &str) -> CoreError {
    let location = match token.kind {
        TokenKind::Eof => "end".to_string(),
        _ => format!("'{}'", token.lexeme),
    };
    CoreError::parse(token.line, format!("Error at {location}: {message}"))
}
