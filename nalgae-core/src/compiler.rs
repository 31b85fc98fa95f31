use crate::builtins::{BuiltinCatalog, BuiltinDescriptor, descriptor_for};
use crate::codegen_wasm::{MEMORY_EXPORT, generate_wasm};
use crate::error::CoreError;
use crate::executor::{TargetExecutor, WasmExecutor};
use crate::ir::LoweredProgram;
use crate::lower::lower_program;
use crate::parser::parse;
use crate::runtime::ensure_ascii;

/// Name the entry procedure is exported under unless configured.
pub const DEFAULT_ENTRY_POINT: &str = "run";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub entry_point: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationArtifact {
    pub wasm: Vec<u8>,
    pub entry_point: String,
    /// Builtins the module imports, in import order.
    pub builtins: Vec<BuiltinDescriptor>,
}

pub fn lower_source(source: &str, options: &CompileOptions) -> Result<LoweredProgram, CoreError> {
    let program = parse(source)?;
    let lowered = lower_program(&program, BuiltinCatalog::standard(), &options.entry_point)?;
    check_entry_point(&options.entry_point, &lowered)?;
    Ok(lowered)
}

/// The entry procedure shares the export and function namespaces with
/// the memory export and the definitions' procedures.
fn check_entry_point(name: &str, lowered: &LoweredProgram) -> Result<(), CoreError> {
    let reason = if name.is_empty() {
        Some("name is empty".to_string())
    } else if name == MEMORY_EXPORT {
        Some("name is reserved for the exported memory".to_string())
    } else if lowered.functions.iter().any(|procedure| procedure.name == name) {
        Some("name collides with a generated function".to_string())
    } else {
        None
    };
    match reason {
        Some(reason) => Err(CoreError::InvalidEntryPoint {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

pub fn compile_wasm(
    source: &str,
    options: &CompileOptions,
) -> Result<CompilationArtifact, CoreError> {
    let lowered = lower_source(source, options)?;
    let wasm = generate_wasm(&lowered)?;
    let builtins = lowered
        .used_builtins()
        .into_iter()
        .filter_map(descriptor_for)
        .cloned()
        .collect();

    Ok(CompilationArtifact {
        wasm,
        entry_point: options.entry_point.clone(),
        builtins,
    })
}

/// Textual listing of the lowered procedures.
pub fn emit_ir(source: &str, options: &CompileOptions) -> Result<String, CoreError> {
    let lowered = lower_source(source, options)?;
    Ok(lowered.to_string())
}

/// Compile `source` and run it on `input` with the wasm executor.
pub fn run(source: &str, input: &str) -> Result<String, CoreError> {
    ensure_ascii(input)?;
    let artifact = compile_wasm(source, &CompileOptions::default())?;
    WasmExecutor::new().execute(&artifact, input)
}
