//! Instruction registry: opcode → handler.

use std::sync::OnceLock;

use crate::instructions::base::InstructionHandler;
use crate::instructions::registry_instructions::register_default_instructions;
use crate::types::{InstructionContext, InstructionResult};

/// Central table mapping opcodes to instruction handlers.
pub struct InstructionRegistry {
    handlers: Vec<Option<Box<dyn InstructionHandler>>>,
}

impl InstructionRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: (0..=u8::MAX).map(|_| None).collect(),
        }
    }

    /// Registry with the full instruction set.
    #[must_use]
    pub fn with_default_instructions() -> Self {
        let mut registry = Self::new();
        register_default_instructions(&mut registry);
        registry
    }

    /// Shared registry with the full instruction set.
    pub fn global() -> &'static Self {
        static REGISTRY: OnceLock<InstructionRegistry> = OnceLock::new();
        REGISTRY.get_or_init(Self::with_default_instructions)
    }

    pub fn register(&mut self, handler: Box<dyn InstructionHandler>) {
        let opcode = usize::from(handler.opcode());
        self.handlers[opcode] = Some(handler);
    }

    #[must_use]
    pub fn get_handler(&self, opcode: u8) -> Option<&dyn InstructionHandler> {
        self.handlers[usize::from(opcode)].as_deref()
    }

    #[must_use]
    pub fn has_handler(&self, opcode: u8) -> bool {
        self.handlers[usize::from(opcode)].is_some()
    }

    #[must_use]
    pub fn registered_opcodes(&self) -> Vec<u8> {
        (0..=u8::MAX).filter(|&op| self.has_handler(op)).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.iter().flatten().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the handler for `opcode`; unknown opcodes trap.
    pub fn execute(&self, opcode: u8, context: &mut InstructionContext<'_>) -> InstructionResult {
        match self.get_handler(opcode) {
            Some(handler) => handler.execute(context),
            None => InstructionResult::TRAP,
        }
    }

    /// Mnemonic plus operand hex, for tracing.
    #[must_use]
    pub fn disassemble(&self, opcode: u8, operands: &[u8]) -> String {
        self.get_handler(opcode).map_or_else(
            || format!("UNKNOWN({opcode})"),
            |handler| handler.disassemble(operands),
        )
    }
}

impl Default for InstructionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
