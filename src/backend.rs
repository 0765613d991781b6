//! Back-end adapter interface.
//!
//! A back-end consumes the verified IR stream plus the global-symbol table
//! and owns everything past that point: how structured markers map onto its
//! branching model, how `print` and memory grow surface in the host
//! runtime, and the 4/8/1-byte memory widths. The native (LLVM), wasm and
//! Python emitters are external collaborators that plug in through this
//! trait; the crate ships the canonical IR-text adapter, which is also the
//! serialization used by golden tests.

use anyhow::Result;

use crate::ircode::{self, IrProgram};
use crate::scope::GlobalSymbols;

pub trait Backend {
    fn name(&self) -> &'static str;
    fn emit(&mut self, program: &IrProgram, symbols: &GlobalSymbols) -> Result<Vec<u8>>;
}

/// Canonical line-based IR text.
pub struct IrText;

impl Backend for IrText {
    fn name(&self) -> &'static str {
        "ir"
    }

    fn emit(&mut self, program: &IrProgram, _symbols: &GlobalSymbols) -> Result<Vec<u8>> {
        Ok(ircode::serialize(program).into_bytes())
    }
}

pub fn backends() -> Vec<Box<dyn Backend>> {
    vec![Box::new(IrText)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ircode::{Instruction, IrFunction, IrType};

    #[test]
    fn ir_text_backend_matches_serializer() {
        let program = IrProgram {
            globals: vec![],
            functions: vec![IrFunction {
                name: "main".to_string(),
                params: vec![],
                return_type: IrType::I,
                code: vec![Instruction::ConstI(0), Instruction::Return],
            }],
        };
        let mut backend = IrText;
        let bytes = backend
            .emit(&program, &GlobalSymbols::default())
            .expect("emit should succeed");
        assert_eq!(bytes, ircode::serialize(&program).into_bytes());
    }

    #[test]
    fn registry_contains_ir_text() {
        let names: Vec<&str> = backends().iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["ir"]);
    }
}
