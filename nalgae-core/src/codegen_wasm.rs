//! WASM backend.
//!
//! Translates a [`LoweredProgram`] into a wasm module using the
//! `wasm-encoder` crate. Strings never live in wasm values: every
//! string is an `i32` handle owned by the host, and every string
//! operation is a host import from the [`HOST_MODULE`] namespace.
//!
//! Module layout:
//!
//! - imports: `literal(ptr, len)`, `join_lines(a, b)`, then one import
//!   per builtin used by the program, named after the builtin;
//! - one function `(i32) -> i32` per procedure, definitions first and
//!   the entry procedure last;
//! - an exported memory holding every literal's bytes in one data
//!   segment at offset 0;
//! - the entry procedure exported under its own name.

use std::collections::HashMap;

use wasm_encoder::{
    CodeSection, ConstExpr, DataSection, EntityType, ExportKind, ExportSection, Function,
    FunctionSection, ImportSection, Instruction, MemorySection, MemoryType, Module, TypeSection,
    ValType,
};

use crate::builtins::{BuiltinKind, descriptor_for};
use crate::error::CoreError;
use crate::ir::{LoweredProgram, Operand, Operation, Procedure};

/// Import namespace for every host function.
pub const HOST_MODULE: &str = "nalgae";

/// `literal(ptr, len) -> handle`
pub const LITERAL_IMPORT: &str = "literal";

/// `join_lines(a, b) -> handle`
pub const JOIN_IMPORT: &str = "join_lines";

/// Exported linear memory holding the literal data.
pub const MEMORY_EXPORT: &str = "memory";

const PAGE_SIZE: usize = 65536;

pub fn generate_wasm(program: &LoweredProgram) -> Result<Vec<u8>, CoreError> {
    let mut emitter = WasmEmitter::default();
    emitter.emit_module(program)
}

#[derive(Default)]
struct WasmEmitter {
    /// Function type per parameter count; every type returns one i32.
    type_index: HashMap<usize, u32>,
    builtin_index: HashMap<BuiltinKind, u32>,
    function_index: HashMap<String, u32>,
    literal_index: u32,
    join_index: u32,
    /// Literal text -> (offset, length) in `data_bytes`.
    literals: HashMap<String, (i32, i32)>,
    data_bytes: Vec<u8>,
}

impl WasmEmitter {
    fn emit_module(&mut self, program: &LoweredProgram) -> Result<Vec<u8>, CoreError> {
        let mut module = Module::new();
        let mut types = TypeSection::new();
        let mut imports = ImportSection::new();
        let mut functions = FunctionSection::new();
        let mut memory = MemorySection::new();
        let mut exports = ExportSection::new();
        let mut code = CodeSection::new();
        let mut data = DataSection::new();

        let mut import_count = 0u32;
        let literal_type = self.register_type(&mut types, 2);
        imports.import(HOST_MODULE, LITERAL_IMPORT, EntityType::Function(literal_type));
        self.literal_index = import_count;
        import_count += 1;

        let join_type = self.register_type(&mut types, 2);
        imports.import(HOST_MODULE, JOIN_IMPORT, EntityType::Function(join_type));
        self.join_index = import_count;
        import_count += 1;

        for kind in program.used_builtins() {
            let builtin = descriptor_for(kind).ok_or_else(|| {
                CoreError::Codegen(format!("no descriptor for builtin {kind:?}"))
            })?;
            let type_index = self.register_type(&mut types, builtin.operand_count());
            imports.import(HOST_MODULE, builtin.name, EntityType::Function(type_index));
            self.builtin_index.insert(kind, import_count);
            import_count += 1;
        }

        let procedure_type = self.register_type(&mut types, 1);
        for (offset, procedure) in program.procedures().enumerate() {
            let index = import_count + offset as u32;
            if self
                .function_index
                .insert(procedure.name.clone(), index)
                .is_some()
            {
                return Err(CoreError::Codegen(format!(
                    "procedure '{}' is emitted twice",
                    procedure.name
                )));
            }
            functions.function(procedure_type);
        }

        for procedure in program.procedures() {
            let function = self.emit_function(procedure)?;
            code.function(&function);
        }

        let pages = self.data_bytes.len().div_ceil(PAGE_SIZE).max(1);
        memory.memory(MemoryType {
            minimum: pages as u64,
            maximum: None,
            memory64: false,
            shared: false,
            page_size_log2: None,
        });
        if !self.data_bytes.is_empty() {
            data.active(0, &ConstExpr::i32_const(0), self.data_bytes.iter().copied());
        }

        let entry_index = self
            .function_index
            .get(&program.entry.name)
            .copied()
            .ok_or_else(|| CoreError::Codegen("entry procedure was not emitted".to_string()))?;
        exports.export(&program.entry.name, ExportKind::Func, entry_index);
        exports.export(MEMORY_EXPORT, ExportKind::Memory, 0);

        module.section(&types);
        module.section(&imports);
        module.section(&functions);
        module.section(&memory);
        module.section(&exports);
        module.section(&code);
        if !self.data_bytes.is_empty() {
            module.section(&data);
        }

        let bytes = module.finish();
        tracing::debug!(size = bytes.len(), "generated wasm module");
        Ok(bytes)
    }

    fn register_type(&mut self, types: &mut TypeSection, params: usize) -> u32 {
        if let Some(index) = self.type_index.get(&params) {
            return *index;
        }
        let index = types.len();
        types
            .ty()
            .function(vec![ValType::I32; params], [ValType::I32]);
        self.type_index.insert(params, index);
        index
    }

    /// Local 0 is the parameter; temp `n` lives in local `n + 1`.
    fn emit_function(&mut self, procedure: &Procedure) -> Result<Function, CoreError> {
        let temps = procedure.bindings.len() as u32;
        let locals = if temps == 0 {
            Vec::new()
        } else {
            vec![(temps, ValType::I32)]
        };
        let mut function = Function::new(locals);

        for binding in &procedure.bindings {
            match &binding.operation {
                Operation::Literal(text) => {
                    let (offset, len) = self.intern_literal(text)?;
                    function.instruction(&Instruction::I32Const(offset));
                    function.instruction(&Instruction::I32Const(len));
                    function.instruction(&Instruction::Call(self.literal_index));
                }
                Operation::Builtin { kind, args } => {
                    for arg in args {
                        function.instruction(&Instruction::LocalGet(local(*arg)));
                    }
                    let index = self.builtin_index.get(kind).copied().ok_or_else(|| {
                        CoreError::Codegen(format!("builtin {kind:?} was not imported"))
                    })?;
                    function.instruction(&Instruction::Call(index));
                }
                Operation::Invoke { callee, argument } => {
                    let index = self.function_index.get(callee).copied().ok_or_else(|| {
                        CoreError::Codegen(format!("unknown procedure '{callee}'"))
                    })?;
                    function.instruction(&Instruction::LocalGet(local(*argument)));
                    function.instruction(&Instruction::Call(index));
                }
                Operation::Join(parts) => {
                    let Some((first, rest)) = parts.split_first() else {
                        return Err(CoreError::Codegen("empty join".to_string()));
                    };
                    function.instruction(&Instruction::LocalGet(local(*first)));
                    for part in rest {
                        function.instruction(&Instruction::LocalGet(local(*part)));
                        function.instruction(&Instruction::Call(self.join_index));
                    }
                }
            }
            function.instruction(&Instruction::LocalSet(binding.temp.0 + 1));
        }

        function.instruction(&Instruction::LocalGet(local(procedure.result)));
        function.instruction(&Instruction::End);
        Ok(function)
    }

    fn intern_literal(&mut self, text: &str) -> Result<(i32, i32), CoreError> {
        if let Some(location) = self.literals.get(text) {
            return Ok(*location);
        }
        let too_large = || CoreError::Codegen("literal data exceeds the wasm address space".to_string());
        let offset = i32::try_from(self.data_bytes.len()).map_err(|_| too_large())?;
        let len = i32::try_from(text.len()).map_err(|_| too_large())?;
        self.data_bytes.extend_from_slice(text.as_bytes());
        self.literals.insert(text.to_string(), (offset, len));
        Ok((offset, len))
    }
}

fn local(operand: Operand) -> u32 {
    match operand {
        Operand::Param => 0,
        Operand::Temp(temp) => temp.0 + 1,
    }
}
