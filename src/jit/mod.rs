//! JIT backend: rebased flat memory, a block compiler producing pre-decoded
//! closures, and an executor with a compile cache. No native code is emitted;
//! "compiled" means decoded once into closures.
//!
//! Opcodes without a compiler in [`JitCoverage`] run through the interpreter's
//! handler for that opcode, so every program executes with interpreter parity.

pub mod compiler;
pub mod executor;
pub mod layout;
pub mod memory;

pub use compiler::{CompiledOp, CompiledProgram, JitCompiler, JitCoverage, OpCompiler};
pub use executor::{CacheStats, CompileCache, JitExecutor};
pub use layout::{JitMemoryLayout, JitZone, MAX_JIT_BUFFER_SIZE};
pub use memory::JitMemory;
