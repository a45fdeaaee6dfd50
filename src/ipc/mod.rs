//! Length-prefixed JSON messaging between the host and sandbox children.

pub mod client;
pub mod messages;
pub mod protocol;
pub mod server;

pub use client::{IpcClient, DEFAULT_IPC_TIMEOUT};
pub use messages::{
    ErrorKind, ErrorMessage, ExecuteRequest, ExecuteResponse, Heartbeat, HeartbeatStatus, IpcMessage, MessageType,
};
pub use protocol::{decode_message, encode_message, read_message, write_message, MAX_MESSAGE_SIZE};
pub use server::{IpcServer, RequestHandler, ServeSummary};
