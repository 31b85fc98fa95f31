//! Execution of compiled artifacts.
//!
//! [`WasmExecutor`] instantiates a module produced by the wasm backend
//! with `wasmi` and provides the host side of the string handles: every
//! string lives in [`HostState`], and the module only ever sees indices
//! into it.

use wasmi::errors::LinkerError;
use wasmi::{Caller, Engine, Extern, Linker, Module, Store};

use crate::builtins::{BUILTINS, BuiltinKind};
use crate::codegen_wasm::{HOST_MODULE, JOIN_IMPORT, LITERAL_IMPORT, MEMORY_EXPORT};
use crate::compiler::CompilationArtifact;
use crate::error::CoreError;
use crate::runtime;

/// Runs a compiled artifact on one input string.
pub trait TargetExecutor {
    fn execute(&self, artifact: &CompilationArtifact, input: &str) -> Result<String, CoreError>;
}

#[derive(Debug, Default)]
pub struct WasmExecutor {
    engine: Engine,
}

impl WasmExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TargetExecutor for WasmExecutor {
    fn execute(&self, artifact: &CompilationArtifact, input: &str) -> Result<String, CoreError> {
        runtime::ensure_ascii(input)?;

        let module = Module::new(&self.engine, &artifact.wasm)
            .map_err(|err| CoreError::Execution(format!("failed to compile wasm artifact: {err}")))?;
        let mut linker = Linker::<HostState>::new(&self.engine);
        register_host_functions(&mut linker)?;

        let mut store = Store::new(&self.engine, HostState::new(input));
        let instance = linker
            .instantiate_and_start(&mut store, &module)
            .map_err(|err| CoreError::Execution(format!("failed to instantiate module: {err}")))?;
        let entry = instance
            .get_typed_func::<i32, i32>(&store, &artifact.entry_point)
            .map_err(|err| {
                CoreError::Execution(format!(
                    "entry point '{}' missing or has wrong type: {err}",
                    artifact.entry_point
                ))
            })?;

        tracing::debug!(entry = %artifact.entry_point, "executing wasm module");
        let handle = match entry.call(&mut store, HostState::INPUT) {
            Ok(handle) => handle,
            Err(trap) => {
                return Err(store
                    .data_mut()
                    .failure
                    .take()
                    .unwrap_or_else(|| CoreError::Execution(trap.to_string())));
            }
        };
        let state = store.data();
        tracing::debug!(strings = state.strings.len(), "execution finished");
        state.get(handle).map(str::to_string)
    }
}

/// Strings owned by the host while a module runs.
#[derive(Debug, Default)]
pub struct HostState {
    strings: Vec<String>,
    /// First error raised by a host function, reported instead of the trap.
    failure: Option<CoreError>,
}

impl HostState {
    /// Handle of the program input.
    pub const INPUT: i32 = 0;

    pub fn new(input: &str) -> Self {
        HostState {
            strings: vec![input.to_string()],
            failure: None,
        }
    }

    pub fn get(&self, handle: i32) -> Result<&str, CoreError> {
        usize::try_from(handle)
            .ok()
            .and_then(|index| self.strings.get(index))
            .map(String::as_str)
            .ok_or_else(|| CoreError::Execution(format!("unknown string handle {handle}")))
    }

    fn store(&mut self, value: String) -> Result<i32, CoreError> {
        let handle = i32::try_from(self.strings.len())
            .map_err(|_| CoreError::Execution("too many live strings".to_string()))?;
        self.strings.push(value);
        Ok(handle)
    }

    fn resolve(&self, handles: &[i32]) -> Result<Vec<String>, CoreError> {
        handles
            .iter()
            .map(|&handle| self.get(handle).map(str::to_string))
            .collect()
    }

    fn settle(&mut self, result: Result<i32, CoreError>) -> Result<i32, wasmi::Error> {
        result.map_err(|err| {
            let message = err.to_string();
            self.failure.get_or_insert(err);
            wasmi::Error::new(message)
        })
    }
}

fn register_host_functions(linker: &mut Linker<HostState>) -> Result<(), CoreError> {
    let link_error = |name: &str, err: LinkerError| {
        CoreError::Execution(format!("failed to link host function '{name}': {err}"))
    };

    linker
        .func_wrap(
            HOST_MODULE,
            LITERAL_IMPORT,
            |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> Result<i32, wasmi::Error> {
                let text = read_literal(&caller, ptr, len);
                let state = caller.data_mut();
                let result = text
                    .and_then(|text| runtime::constant(&text))
                    .and_then(|value| state.store(value));
                state.settle(result)
            },
        )
        .map_err(|err| link_error(LITERAL_IMPORT, err))?;

    linker
        .func_wrap(
            HOST_MODULE,
            JOIN_IMPORT,
            |mut caller: Caller<'_, HostState>, first: i32, second: i32| -> Result<i32, wasmi::Error> {
                let state = caller.data_mut();
                let result = state
                    .resolve(&[first, second])
                    .and_then(|parts| runtime::join_lines(&parts[0], &parts[1]))
                    .and_then(|value| state.store(value));
                state.settle(result)
            },
        )
        .map_err(|err| link_error(JOIN_IMPORT, err))?;

    for builtin in BUILTINS {
        let kind = builtin.kind;
        let linked = match builtin.operand_count() {
            1 => linker.func_wrap(
                HOST_MODULE,
                builtin.name,
                move |mut caller: Caller<'_, HostState>, a: i32| -> Result<i32, wasmi::Error> {
                    invoke(&mut caller, kind, &[a])
                },
            ),
            2 => linker.func_wrap(
                HOST_MODULE,
                builtin.name,
                move |mut caller: Caller<'_, HostState>, a: i32, b: i32| -> Result<i32, wasmi::Error> {
                    invoke(&mut caller, kind, &[a, b])
                },
            ),
            3 => linker.func_wrap(
                HOST_MODULE,
                builtin.name,
                move |mut caller: Caller<'_, HostState>,
                      a: i32,
                      b: i32,
                      c: i32|
                      -> Result<i32, wasmi::Error> { invoke(&mut caller, kind, &[a, b, c]) },
            ),
            other => {
                return Err(CoreError::Execution(format!(
                    "builtin '{}' takes {other} operands, which the host does not support",
                    builtin.name
                )));
            }
        };
        linked.map_err(|err| link_error(builtin.name, err))?;
    }
    Ok(())
}

fn invoke(
    caller: &mut Caller<'_, HostState>,
    kind: BuiltinKind,
    handles: &[i32],
) -> Result<i32, wasmi::Error> {
    let state = caller.data_mut();
    let result = state
        .resolve(handles)
        .and_then(|args| runtime::apply(kind, &args))
        .and_then(|value| state.store(value));
    state.settle(result)
}

fn read_literal(caller: &Caller<'_, HostState>, ptr: i32, len: i32) -> Result<String, CoreError> {
    let memory = caller
        .get_export(MEMORY_EXPORT)
        .and_then(Extern::into_memory)
        .ok_or_else(|| CoreError::Execution("module does not export its memory".to_string()))?;
    let (Ok(offset), Ok(len)) = (usize::try_from(ptr), usize::try_from(len)) else {
        return Err(CoreError::Execution(format!(
            "invalid literal location {ptr}+{len}"
        )));
    };
    let mut buffer = vec![0u8; len];
    memory
        .read(caller, offset, &mut buffer)
        .map_err(|err| CoreError::Execution(format!("failed to read literal: {err}")))?;
    String::from_utf8(buffer)
        .map_err(|_| CoreError::Execution("literal data is not valid text".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompileOptions, compile_wasm};
    use wasm_encoder::{
        CodeSection, EntityType, ExportKind, ExportSection, Function, FunctionSection,
        ImportSection, Instruction, TypeSection, ValType,
    };

    fn execute(source: &str, input: &str) -> Result<String, CoreError> {
        let artifact = compile_wasm(source, &CompileOptions::default()).expect("compile");
        WasmExecutor::new().execute(&artifact, input)
    }

    #[test]
    fn runs_pipeline_on_input() {
        assert_eq!(execute("it | upper | append \"!\"", "hi").unwrap(), "HI!");
        assert_eq!(execute("it", "unchanged").unwrap(), "unchanged");
    }

    #[test]
    fn reads_literals_from_memory() {
        assert_eq!(
            execute("{ \"first\"; it; \"first\" }", "mid").unwrap(),
            "first\nmid\nfirst"
        );
        assert_eq!(execute("it | \"\"", "dropped").unwrap(), "");
    }

    #[test]
    fn calls_definitions() {
        let source = "def quote(x) = x | wrap \"'\" \"'\"\n\
                      def shout(x) = x | upper | quote\n\
                      it | trim | shout";
        assert_eq!(execute(source, "  hey  ").unwrap(), "'HEY'");
    }

    #[test]
    fn rejects_non_ascii_input() {
        assert_eq!(
            execute("it", "na\u{ef}ve"),
            Err(CoreError::AsciiViolation { character: '\u{ef}' })
        );
    }

    #[test]
    fn reports_missing_entry_point() {
        let mut artifact = compile_wasm("it", &CompileOptions::default()).expect("compile");
        artifact.entry_point = "main".to_string();
        let err = WasmExecutor::new().execute(&artifact, "x").unwrap_err();
        assert!(matches!(err, CoreError::Execution(message) if message.contains("'main'")));
    }

    #[test]
    fn host_failures_surface_as_core_errors() {
        // run(x) = upper(99), with no string behind handle 99
        let mut module = wasm_encoder::Module::new();
        let mut types = TypeSection::new();
        types.ty().function([ValType::I32], [ValType::I32]);
        let mut imports = ImportSection::new();
        imports.import(HOST_MODULE, "upper", EntityType::Function(0));
        let mut functions = FunctionSection::new();
        functions.function(0);
        let mut exports = ExportSection::new();
        exports.export("run", ExportKind::Func, 1);
        let mut code = CodeSection::new();
        let mut body = Function::new(vec![]);
        body.instruction(&Instruction::I32Const(99));
        body.instruction(&Instruction::Call(0));
        body.instruction(&Instruction::End);
        code.function(&body);
        module.section(&types);
        module.section(&imports);
        module.section(&functions);
        module.section(&exports);
        module.section(&code);

        let artifact = CompilationArtifact {
            wasm: module.finish(),
            entry_point: "run".to_string(),
            builtins: Vec::new(),
        };
        let err = WasmExecutor::new().execute(&artifact, "x").unwrap_err();
        assert_eq!(
            err,
            CoreError::Execution("unknown string handle 99".to_string())
        );
    }

    #[test]
    fn host_state_keeps_first_failure() {
        let mut state = HostState::new("in");
        assert_eq!(state.get(HostState::INPUT).unwrap(), "in");
        assert!(state.settle(Err(CoreError::Execution("first".into()))).is_err());
        assert!(state.settle(Err(CoreError::Execution("second".into()))).is_err());
        assert_eq!(state.failure, Some(CoreError::Execution("first".into())));
        assert_eq!(state.settle(Ok(3)).ok(), Some(3));
    }
}
