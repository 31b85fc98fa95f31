//! Builtin operations visible at the nalgae language level.
//!
//! This module only describes builtins. Lowering resolves call sites
//! against [`BuiltinCatalog`]; the runtime library implements each
//! [`BuiltinKind`]; the wasm backend turns every used builtin into a
//! host import named after it.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Runtime operation a builtin lowers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    Id,
    Upper,
    Lower,
    Trim,
    Append,
    Prepend,
    Replace,
    Const,
    Indent,
    TrimIndent,
    Wrap,
}

/// Metadata about a single builtin symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinDescriptor {
    /// Name of the builtin at the language level (e.g. `append`).
    pub name: &'static str,

    /// Number of explicit arguments beyond the threaded subject value.
    pub arity: usize,

    /// Kind tag used by the runtime and backends.
    pub kind: BuiltinKind,
}

impl BuiltinDescriptor {
    /// Total number of strings the runtime operation receives,
    /// subject included.
    pub fn operand_count(&self) -> usize {
        self.arity + 1
    }
}

/// The complete list of builtins known to the core.
pub const BUILTINS: &[BuiltinDescriptor] = &[
    BuiltinDescriptor {
        name: "id",
        arity: 0,
        kind: BuiltinKind::Id,
    },
    BuiltinDescriptor {
        name: "upper",
        arity: 0,
        kind: BuiltinKind::Upper,
    },
    BuiltinDescriptor {
        name: "lower",
        arity: 0,
        kind: BuiltinKind::Lower,
    },
    BuiltinDescriptor {
        name: "trim",
        arity: 0,
        kind: BuiltinKind::Trim,
    },
    BuiltinDescriptor {
        name: "append",
        arity: 1,
        kind: BuiltinKind::Append,
    },
    BuiltinDescriptor {
        name: "prepend",
        arity: 1,
        kind: BuiltinKind::Prepend,
    },
    BuiltinDescriptor {
        name: "replace",
        arity: 2,
        kind: BuiltinKind::Replace,
    },
    BuiltinDescriptor {
        name: "const",
        arity: 1,
        kind: BuiltinKind::Const,
    },
    BuiltinDescriptor {
        name: "indent",
        arity: 1,
        kind: BuiltinKind::Indent,
    },
    BuiltinDescriptor {
        name: "trim_indent",
        arity: 0,
        kind: BuiltinKind::TrimIndent,
    },
    BuiltinDescriptor {
        name: "wrap",
        arity: 2,
        kind: BuiltinKind::Wrap,
    },
];

static STANDARD: LazyLock<BuiltinCatalog> = LazyLock::new(|| BuiltinCatalog::new(BUILTINS));

/// Read-only name index over a builtin table.
#[derive(Debug)]
pub struct BuiltinCatalog {
    by_name: HashMap<&'static str, &'static BuiltinDescriptor>,
}

impl BuiltinCatalog {
    pub fn new(table: &'static [BuiltinDescriptor]) -> Self {
        let by_name = table.iter().map(|b| (b.name, b)).collect();
        BuiltinCatalog { by_name }
    }

    /// The catalog over [`BUILTINS`], built once per process.
    pub fn standard() -> &'static BuiltinCatalog {
        &STANDARD
    }

    pub fn find(&self, name: &str) -> Option<&'static BuiltinDescriptor> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}

/// Look up a builtin in the standard table.
pub fn find_builtin(name: &str) -> Option<&'static BuiltinDescriptor> {
    BuiltinCatalog::standard().find(name)
}

/// Descriptor for a kind; every kind has exactly one entry in `BUILTINS`.
pub fn descriptor_for(kind: BuiltinKind) -> Option<&'static BuiltinDescriptor> {
    BUILTINS.iter().find(|b| b.kind == kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalog_has_every_builtin() {
        let catalog = BuiltinCatalog::standard();
        assert_eq!(catalog.by_name.len(), BUILTINS.len());
        for builtin in BUILTINS {
            assert_eq!(catalog.find(builtin.name), Some(builtin));
        }
    }

    #[test]
    fn standard_catalog_is_shared() {
        assert!(std::ptr::eq(
            BuiltinCatalog::standard(),
            BuiltinCatalog::standard()
        ));
    }

    #[test]
    fn reports_arity() {
        let arities: Vec<_> = ["id", "append", "replace", "const", "trim_indent", "wrap"]
            .iter()
            .map(|name| find_builtin(name).map(|b| b.arity))
            .collect();
        assert_eq!(
            arities,
            vec![Some(0), Some(1), Some(2), Some(1), Some(0), Some(2)]
        );
        assert_eq!(find_builtin("wrap").map(|b| b.operand_count()), Some(3));
    }

    #[test]
    fn unknown_names_are_absent() {
        assert!(find_builtin("shout").is_none());
        assert!(!BuiltinCatalog::standard().contains("constValue"));
    }

    #[test]
    fn kinds_map_back_to_descriptors() {
        for builtin in BUILTINS {
            assert_eq!(descriptor_for(builtin.kind).map(|b| b.name), Some(builtin.name));
        }
    }
}
