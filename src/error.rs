//! Error types for the infrastructure layers. VM outcomes (halt, panic, out of gas) are not errors.

use thiserror::Error;

/// Program-code blob decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("invalid jump table entries count")]
    InvalidJumpTableEntriesCount,
    #[error("invalid jump table encode size")]
    InvalidJumpTableEncodeSize,
    #[error("invalid code length")]
    InvalidCodeLength,
    #[error("invalid data length")]
    InvalidDataLength,
}

/// Standard program header and layout failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StandardProgramError {
    #[error("invalid read-only data length")]
    InvalidReadOnlyLength,
    #[error("invalid read-write data length")]
    InvalidReadWriteLength,
    #[error("invalid heap pages")]
    InvalidHeapPages,
    #[error("invalid stack size")]
    InvalidStackSize,
    #[error("invalid data length")]
    InvalidDataLength,
    #[error("invalid code length")]
    InvalidCodeLength,
    #[error("declared memory exceeds the addressable limit")]
    InvalidTotalMemorySize,
    #[error("argument of {0} bytes exceeds the input size")]
    InvalidArgumentLength(usize),
    #[error("memory layout: {0}")]
    Memory(#[from] MemoryError),
    #[error("program code: {0}")]
    Code(#[from] ProgramError),
}

/// Memory model failures; every variant names the offending address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("zone not found at {0:#x}")]
    ZoneNotFound(u32),
    #[error("chunk not found at {0:#x}")]
    ChunkNotFound(u32),
    #[error("invalid zone at {0:#x}")]
    InvalidZone(u32),
    #[error("access exceeds zone boundary at {0:#x}")]
    ExceedZoneBoundary(u32),
    #[error("invalid chunk at {0:#x}")]
    InvalidChunk(u32),
    #[error("access exceeds chunk boundary at {0:#x}")]
    ExceedChunkBoundary(u32),
    #[error("not readable at {0:#x}")]
    NotReadable(u32),
    #[error("not writable at {0:#x}")]
    NotWritable(u32),
    #[error("out of memory at {0:#x}")]
    OutOfMemory(u32),
    #[error("chunk not adjacent at {0:#x}")]
    NotAdjacent(u32),
}

impl MemoryError {
    #[must_use]
    pub const fn address(&self) -> u32 {
        match *self {
            Self::ZoneNotFound(a)
            | Self::ChunkNotFound(a)
            | Self::InvalidZone(a)
            | Self::ExceedZoneBoundary(a)
            | Self::InvalidChunk(a)
            | Self::ExceedChunkBoundary(a)
            | Self::NotReadable(a)
            | Self::NotWritable(a)
            | Self::OutOfMemory(a)
            | Self::NotAdjacent(a) => a,
        }
    }

    /// Faulting address aligned down to its page.
    #[must_use]
    pub const fn page_address(&self, page_size: u32) -> u32 {
        let a = self.address();
        a - a % page_size
    }
}

/// Failure reported by a host-call dispatcher; the engine maps it to `panic(trap)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("host call {index} failed: {message}")]
pub struct HostCallError {
    pub index: u32,
    pub message: String,
}

/// Frame and message exchange failures on the sandbox channel.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("encode: {0}")]
    Encode(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("remote error ({error_type}): {message}")]
    Remote { error_type: u8, message: String },
}

impl From<serde_json::Error> for IpcError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Child process management failures.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to create channel: {0}")]
    Channel(std::io::Error),
    #[error("failed to spawn {path}: {source}")]
    Spawn {
        path: String,
        source: std::io::Error,
    },
    #[error("child process has no pid")]
    MissingPid,
    #[error("child process timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("wait failed: {0}")]
    Wait(std::io::Error),
}

/// Worker pool failures.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool is shut down")]
    PoolShutdown,
    #[error("pool is unhealthy: {0}")]
    PoolUnhealthy(String),
    #[error("pool exhausted")]
    PoolExhausted,
    #[error("request queue full ({0})")]
    QueueFull(usize),
    #[error("timed out waiting for a worker after {0:?}")]
    RequestTimeout(std::time::Duration),
    #[error("failed to spawn worker: {0}")]
    WorkerSpawnFailed(String),
    #[error("execution on worker {worker} failed: {source}")]
    ExecutionFailed {
        worker: u64,
        #[source]
        source: IpcError,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("worker {0} not available")]
    WorkerNotAvailable(u64),
    #[error("worker {0} busy")]
    WorkerBusy(u64),
}

/// JIT compilation and buffer setup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JitError {
    #[error("layout exceeds the addressable buffer: {0} bytes")]
    LayoutTooLarge(u64),
    #[error("{0:?} zone is not at the end of the buffer")]
    ZoneNotAtTail(crate::memory::ZoneKind),
    #[error("program: {0}")]
    Program(#[from] StandardProgramError),
}

/// Errors surfaced by the executor facade.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("program: {0}")]
    Program(#[from] StandardProgramError),
    #[error("jit: {0}")]
    Jit(#[from] JitError),
    #[error("pool: {0}")]
    Pool(#[from] PoolError),
    #[error("ipc: {0}")]
    Ipc(#[from] IpcError),
}
