//! JIT execution of standard programs with a compile cache keyed by code hash.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace};

use crate::crypto::blake2b256;
use crate::error::JitError;
use crate::gas::Gas;
use crate::interpreter::{run_with_host_calls, InvocationContext, VmState};
use crate::memory::Memory;
use crate::jit::compiler::{CompiledProgram, JitCompiler};
use crate::jit::memory::JitMemory;
use crate::parser::ProgramCode;
use crate::program::StandardProgram;
use crate::types::{ExitReason, VmExecutionResult};

pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Hit/miss counters of a [`CompileCache`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<[u8; 32], Arc<CompiledProgram>>,
    order: VecDeque<[u8; 32]>,
    hits: u64,
    misses: u64,
}

/// Compiled programs by Blake2b-256 of their code blob. The oldest insertion is evicted first.
pub struct CompileCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl CompileCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Cached program for `code`, compiling it on a miss.
    pub fn get_or_compile(&self, code: &ProgramCode, compiler: &JitCompiler) -> Arc<CompiledProgram> {
        let key = blake2b256(code.blob());
        {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(compiled) = inner.entries.get(&key).cloned() {
                inner.hits += 1;
                trace!(key = %crate::types::bytes_to_hex(&key[..8]), "compile cache hit");
                return compiled;
            }
            inner.misses += 1;
        }

        // compile outside the lock; a racing compile of the same code is harmless
        let compiled = Arc::new(compiler.compile(Arc::new(code.clone())));

        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.entries.contains_key(&key) {
            while inner.entries.len() >= self.capacity {
                let Some(oldest) = inner.order.pop_front() else { break };
                inner.entries.remove(&oldest);
            }
            inner.order.push_back(key);
            inner.entries.insert(key, compiled.clone());
        }
        compiled
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.entries.len(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stats().entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        inner.entries.clear();
        inner.order.clear();
    }
}

impl Default for CompileCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// Runs standard programs through the block compiler over rebased memory.
#[derive(Default)]
pub struct JitExecutor {
    compiler: JitCompiler,
    cache: CompileCache,
}

impl JitExecutor {
    #[must_use]
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            compiler: JitCompiler::new(),
            cache: CompileCache::new(cache_capacity),
        }
    }

    #[must_use]
    pub const fn cache(&self) -> &CompileCache {
        &self.cache
    }

    pub async fn execute(
        &self,
        program: &StandardProgram,
        pc: u32,
        gas: Gas,
        context: Option<&mut dyn InvocationContext>,
    ) -> Result<VmExecutionResult, JitError> {
        let compiled = self.cache.get_or_compile(program.code(), &self.compiler);
        let memory = JitMemory::new(&program.initial_memory()?)?;
        debug!(
            pc,
            gas = gas.value(),
            buffer = memory.layout().total_size(),
            "jit execution"
        );
        let mut state = VmState::new(program.initial_registers(), memory, gas, pc);
        let exit_reason = run_with_host_calls(&mut state, context, |state| compiled.run(state)).await;
        Ok(VmExecutionResult {
            exit_reason,
            gas_used: gas.value().saturating_sub(state.gas.value()),
            output: if exit_reason.is_halt() { state.output() } else { None },
        })
    }

    /// Run raw program code over caller-owned memory, such as a
    /// [`GeneralMemory`](crate::memory::GeneralMemory).
    ///
    /// Without a context the run stops at each host call with `state.pc` past
    /// the `ecalli`; the caller may change `state` (reprotect pages, set
    /// registers) and call again to resume.
    pub async fn execute_code<M: Memory>(
        &self,
        code: &ProgramCode,
        state: &mut VmState<M>,
        context: Option<&mut dyn InvocationContext>,
    ) -> ExitReason {
        let compiled = self.cache.get_or_compile(code, &self.compiler);
        run_with_host_calls(state, context, |state| compiled.run(state)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::ProgramBuilder;
    use crate::types::ExitReason;

    fn program(builder: &ProgramBuilder) -> StandardProgram {
        StandardProgram::new(&builder.minimal_standard_blob(), None).unwrap()
    }

    #[test]
    fn cache_hits_by_code_hash_and_evicts_oldest() {
        let cache = CompileCache::new(2);
        let compiler = JitCompiler::new();
        let a = ProgramCode::new(&ProgramBuilder::new().trap().code_blob()).unwrap();
        let b = ProgramCode::new(&ProgramBuilder::new().fallthrough().trap().code_blob()).unwrap();
        let c = ProgramCode::new(&ProgramBuilder::new().halt().code_blob()).unwrap();

        let first = cache.get_or_compile(&a, &compiler);
        let again = cache.get_or_compile(&a, &compiler);
        assert!(Arc::ptr_eq(&first, &again));
        cache.get_or_compile(&b, &compiler);
        cache.get_or_compile(&c, &compiler);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 3, entries: 2 });

        // `a` was evicted
        let recompiled = cache.get_or_compile(&a, &compiler);
        assert!(!Arc::ptr_eq(&first, &recompiled));
    }

    #[tokio::test]
    async fn halts_with_output() {
        // write 8 bytes to the stack and return them
        let builder = ProgramBuilder::new()
            .load_imm_64(3, 0x0807_0605_0403_0201)
            .store_u64(3, 0xFEFE_0000 - 8)
            .load_imm_64(7, 0xFEFE_0000 - 8)
            .load_imm(8, 8)
            .halt();
        let executor = JitExecutor::default();
        let result = executor.execute(&program(&builder), 0, Gas::new(100), None).await.unwrap();
        assert_eq!(result.exit_reason, ExitReason::Halt);
        assert_eq!(result.gas_used, 5);
        assert_eq!(result.output, Some(vec![1, 2, 3, 4, 5, 6, 7, 8]));
        assert_eq!(executor.cache().len(), 1);
    }

    #[tokio::test]
    async fn heap_growth_is_visible() {
        let builder = ProgramBuilder::new()
            .load_imm(1, 4096)
            .sbrk(2, 1)
            .load_imm(4, 7)
            .two_reg_imm(crate::config::opcode::STORE_IND_U8, 4, 2, 0)
            .two_reg_imm(crate::config::opcode::LOAD_IND_U8, 5, 2, 0)
            .move_reg(7, 2)
            .load_imm(8, 1)
            .halt();
        let result = JitExecutor::default()
            .execute(&program(&builder), 0, Gas::new(100), None)
            .await
            .unwrap();
        assert_eq!(result.exit_reason, ExitReason::Halt);
        assert_eq!(result.gas_used, 8);
        assert_eq!(result.output, Some(vec![7]));
    }

    #[tokio::test]
    async fn raw_code_resumes_after_pages_are_reprotected() {
        use crate::memory::GeneralMemory;
        use crate::types::RegisterState;

        let code = ProgramCode::new(
            &ProgramBuilder::new()
                .ecalli(1)
                .load_imm(3, 42)
                .store_u64(3, 0x3_0000)
                .halt()
                .code_blob(),
        )
        .unwrap();
        let memory = GeneralMemory::new(&[(0x2_0000, 4096, true)], Vec::new()).unwrap();
        let mut registers = RegisterState::default();
        registers[0] = u64::from(crate::config::HALT_ADDRESS);
        let mut state = VmState::new(registers, memory, Gas::new(100), 0);
        let executor = JitExecutor::default();

        assert_eq!(executor.execute_code(&code, &mut state, None).await, ExitReason::HostCall(1));
        assert!(!state.memory.is_writable(0x3_0000, 8));
        state.memory.zero(0x3_0000 / 4096, 1).unwrap();

        assert_eq!(executor.execute_code(&code, &mut state, None).await, ExitReason::Halt);
        assert_eq!(state.memory.read(0x3_0000, 8).unwrap(), 42u64.to_le_bytes().to_vec());
        assert_eq!(state.gas.value(), 96);
        assert_eq!(executor.cache().stats().misses, 1);
    }
}
