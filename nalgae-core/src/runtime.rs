//! String operations behind the builtins.
//!
//! Every operation checks the ASCII policy (TAB, CR, LF and printable
//! 0x20..=0x7E) on each string it receives and on the string it
//! produces. The lexer applies the same policy to literals, but values
//! reaching the runtime (notably the program input) are checked again
//! here.

use crate::builtins::BuiltinKind;
use crate::error::CoreError;

pub fn is_ascii_allowed(ch: char) -> bool {
    matches!(ch, '\t' | '\n' | '\r' | ' '..='~')
}

pub fn ensure_ascii(value: &str) -> Result<(), CoreError> {
    match value.chars().find(|&ch| !is_ascii_allowed(ch)) {
        Some(character) => Err(CoreError::AsciiViolation { character }),
        None => Ok(()),
    }
}

fn checked(value: String) -> Result<String, CoreError> {
    ensure_ascii(&value)?;
    Ok(value)
}

fn is_blank(line: &str) -> bool {
    line.chars().all(|ch| ch <= ' ')
}

pub fn id(input: &str) -> Result<String, CoreError> {
    checked(input.to_string())
}

pub fn upper(input: &str) -> Result<String, CoreError> {
    ensure_ascii(input)?;
    checked(input.to_ascii_uppercase())
}

pub fn lower(input: &str) -> Result<String, CoreError> {
    ensure_ascii(input)?;
    checked(input.to_ascii_lowercase())
}

/// Strips control characters and spaces from both ends.
pub fn trim(input: &str) -> Result<String, CoreError> {
    ensure_ascii(input)?;
    checked(input.trim_matches(|ch: char| ch <= ' ').to_string())
}

pub fn append(input: &str, suffix: &str) -> Result<String, CoreError> {
    ensure_ascii(input)?;
    ensure_ascii(suffix)?;
    checked(format!("{input}{suffix}"))
}

pub fn prepend(input: &str, prefix: &str) -> Result<String, CoreError> {
    ensure_ascii(input)?;
    ensure_ascii(prefix)?;
    checked(format!("{prefix}{input}"))
}

/// Literal replacement of every occurrence of `target`.
pub fn replace(input: &str, target: &str, replacement: &str) -> Result<String, CoreError> {
    ensure_ascii(input)?;
    ensure_ascii(target)?;
    ensure_ascii(replacement)?;
    checked(input.replace(target, replacement))
}

pub fn indent(input: &str, prefix: &str) -> Result<String, CoreError> {
    ensure_ascii(input)?;
    ensure_ascii(prefix)?;
    let lines: Vec<String> = input
        .split('\n')
        .map(|line| format!("{prefix}{line}"))
        .collect();
    checked(lines.join("\n"))
}

/// Drops leading and trailing blank lines, then removes the smallest
/// leading-whitespace width of the non-blank lines from every line.
pub fn trim_indent(input: &str) -> Result<String, CoreError> {
    ensure_ascii(input)?;
    let lines: Vec<&str> = input.split('\n').collect();
    let Some(start) = lines.iter().position(|line| !is_blank(line)) else {
        return Ok(String::new());
    };
    let end = lines
        .iter()
        .rposition(|line| !is_blank(line))
        .unwrap_or(start);
    let kept = &lines[start..=end];

    let width = kept
        .iter()
        .filter(|line| !is_blank(line))
        .map(|line| {
            line.bytes()
                .take_while(|&b| b == b' ' || b == b'\t')
                .count()
        })
        .min()
        .unwrap_or(0);

    let stripped: Vec<&str> = kept
        .iter()
        .map(|line| &line[width.min(line.len())..])
        .collect();
    checked(stripped.join("\n"))
}

pub fn wrap(input: &str, prefix: &str, suffix: &str) -> Result<String, CoreError> {
    ensure_ascii(input)?;
    ensure_ascii(prefix)?;
    ensure_ascii(suffix)?;
    checked(format!("{prefix}{input}{suffix}"))
}

/// Materialises a literal value.
pub fn constant(value: &str) -> Result<String, CoreError> {
    checked(value.to_string())
}

/// Newline join used for group results.
pub fn join_lines(first: &str, second: &str) -> Result<String, CoreError> {
    ensure_ascii(first)?;
    ensure_ascii(second)?;
    checked(format!("{first}\n{second}"))
}

/// Run the operation for `kind`. `args[0]` is the subject value.
pub fn apply(kind: BuiltinKind, args: &[String]) -> Result<String, CoreError> {
    match (kind, args) {
        (BuiltinKind::Id, [input]) => id(input),
        (BuiltinKind::Upper, [input]) => upper(input),
        (BuiltinKind::Lower, [input]) => lower(input),
        (BuiltinKind::Trim, [input]) => trim(input),
        (BuiltinKind::TrimIndent, [input]) => trim_indent(input),
        (BuiltinKind::Append, [input, suffix]) => append(input, suffix),
        (BuiltinKind::Prepend, [input, prefix]) => prepend(input, prefix),
        (BuiltinKind::Indent, [input, prefix]) => indent(input, prefix),
        // the subject is discarded, like a bare literal in a pipeline
        (BuiltinKind::Const, [input, value]) => {
            ensure_ascii(input)?;
            constant(value)
        }
        (BuiltinKind::Replace, [input, target, replacement]) => {
            replace(input, target, replacement)
        }
        (BuiltinKind::Wrap, [input, prefix, suffix]) => wrap(input, prefix, suffix),
        (kind, args) => Err(CoreError::Execution(format!(
            "builtin {kind:?} received {} operand(s)",
            args.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn folds_case() {
        assert_eq!(upper("Hello, World").unwrap(), "HELLO, WORLD");
        assert_eq!(lower("Hello, World").unwrap(), "hello, world");
    }

    #[test]
    fn case_folding_is_stable_per_direction() {
        for word in ["abc", "ABC", "MiXeD"] {
            let lowered = lower(word).unwrap();
            assert_eq!(lower(&upper(&lowered).unwrap()).unwrap(), lowered);
            let uppered = upper(word).unwrap();
            assert_eq!(upper(&lower(&uppered).unwrap()).unwrap(), uppered);
        }
    }

    #[test]
    fn trims_whitespace_and_controls() {
        assert_eq!(trim(" \t\r\n a b \n").unwrap(), "a b");
        assert_eq!(trim("   ").unwrap(), "");
    }

    #[test]
    fn appends_prepends_and_wraps() {
        assert_eq!(append("hi", "!").unwrap(), "hi!");
        assert_eq!(prepend("hi", ">").unwrap(), ">hi");
        assert_eq!(wrap("hi", "<", ">").unwrap(), "<hi>");
    }

    #[test]
    fn replaces_literally() {
        assert_eq!(replace("a.b.c", ".", "::").unwrap(), "a::b::c");
        assert_eq!(replace("a+b", "+", "[+]").unwrap(), "a[+]b");
        assert_eq!(replace("ab", "", "-").unwrap(), "-a-b-");
    }

    #[test]
    fn wrap_then_replace_recovers_value() {
        let wrapped = wrap("value", "<<", ">>").unwrap();
        let stripped = replace(&wrapped, "<<", "").unwrap();
        assert_eq!(replace(&stripped, ">>", "").unwrap(), "value");
    }

    #[test]
    fn indents_every_line() {
        assert_eq!(indent("a\nb", "  ").unwrap(), "  a\n  b");
        assert_eq!(indent("a\n", "> ").unwrap(), "> a\n> ");
        assert_eq!(indent("", "-").unwrap(), "-");
    }

    #[test]
    fn trims_common_indent() {
        assert_eq!(trim_indent("  foo\n  bar").unwrap(), "foo\nbar");
        assert_eq!(
            trim_indent("\n\n    a\n      b\n\n    c\n  \n").unwrap(),
            "a\n  b\n\nc"
        );
        assert_eq!(trim_indent(" \n\t\n").unwrap(), "");
        assert_eq!(trim_indent("").unwrap(), "");
    }

    #[test]
    fn trim_indent_keeps_short_blank_lines_inside() {
        assert_eq!(trim_indent("    a\n \n    b").unwrap(), "a\n\nb");
    }

    #[test]
    fn trim_indent_is_idempotent() {
        for input in ["  foo\n  bar", "\n   x\n     y\n", "a\n b", "\t\tq\n\t r"] {
            let once = trim_indent(input).unwrap();
            assert_eq!(trim_indent(&once).unwrap(), once);
        }
    }

    #[test]
    fn rejects_non_ascii_input_and_arguments() {
        assert_eq!(
            id("caf\u{e9}"),
            Err(CoreError::AsciiViolation { character: '\u{e9}' })
        );
        assert!(append("ok", "\u{1F600}").is_err());
        assert!(replace("ok", "o", "\u{0}").is_err());
        assert!(wrap("ok", "", "\u{7f}").is_err());
        assert!(constant("\u{b}").is_err());
    }

    #[test]
    fn apply_dispatches_by_kind() {
        assert_eq!(
            apply(BuiltinKind::Wrap, &strings(&["x", "(", ")"])).unwrap(),
            "(x)"
        );
        assert_eq!(
            apply(BuiltinKind::Const, &strings(&["ignored", "kept"])).unwrap(),
            "kept"
        );
        assert_eq!(
            apply(BuiltinKind::TrimIndent, &strings(&["  a"])).unwrap(),
            "a"
        );
    }

    #[test]
    fn apply_rejects_wrong_operand_count() {
        let err = apply(BuiltinKind::Append, &strings(&["x"])).unwrap_err();
        assert!(matches!(err, CoreError::Execution(_)));
    }

    #[test]
    fn joins_lines() {
        assert_eq!(join_lines("a", "b").unwrap(), "a\nb");
        assert_eq!(join_lines("", "").unwrap(), "\n");
    }
}
