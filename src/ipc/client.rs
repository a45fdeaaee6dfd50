//! Host side of the sandbox channel.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::error::IpcError;
use crate::ipc::messages::{ErrorMessage, ExecuteRequest, ExecuteResponse, Heartbeat, IpcMessage, MessageType};
use crate::ipc::protocol::{read_message, write_message};
use crate::types::VmExecutionResult;

pub const DEFAULT_IPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends one request at a time and waits for the matching response.
///
/// After any error the peer's state is unknown; callers must not reuse the
/// channel.
#[derive(Debug)]
pub struct IpcClient<S> {
    stream: S,
    next_request_id: u32,
    timeout: Duration,
}

impl<S> IpcClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub const fn new(stream: S, timeout: Duration) -> Self {
        Self {
            stream,
            next_request_id: 0,
            timeout,
        }
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    pub async fn execute(&mut self, request: &ExecuteRequest) -> Result<VmExecutionResult, IpcError> {
        let response = self
            .exchange(MessageType::ExecuteRequest, Some(request))
            .await?
            .payload_as::<ExecuteResponse>(MessageType::ExecuteResponse)?;
        response.into_result()
    }

    /// Liveness check; the child echoes a heartbeat with the same request id.
    pub async fn heartbeat(&mut self) -> Result<Option<Heartbeat>, IpcError> {
        let reply = self.exchange::<()>(MessageType::Heartbeat, None).await?;
        if reply.kind != MessageType::Heartbeat {
            return Err(IpcError::InvalidResponse(format!("expected Heartbeat, got {:?}", reply.kind)));
        }
        match reply.payload {
            Some(payload) => Ok(Some(serde_json::from_value(payload)?)),
            None => Ok(None),
        }
    }

    async fn exchange<T: serde::Serialize>(
        &mut self,
        kind: MessageType,
        payload: Option<&T>,
    ) -> Result<IpcMessage, IpcError> {
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let request_id = self.next_request_id;
        let message = match payload {
            Some(payload) => IpcMessage::with_payload(kind, request_id, payload)?,
            None => IpcMessage::empty(kind, request_id),
        };

        let timeout = self.timeout;
        let stream = &mut self.stream;
        let reply = tokio::time::timeout(timeout, async move {
            write_message(&mut *stream, &message).await?;
            read_message(&mut *stream).await?.ok_or(IpcError::ConnectionClosed)
        })
        .await
        .map_err(|_| {
            warn!(request_id, ?timeout, "ipc request timed out");
            IpcError::Timeout(timeout)
        })??;

        if reply.request_id != request_id {
            return Err(IpcError::InvalidResponse(format!(
                "request id mismatch: expected {request_id}, got {}",
                reply.request_id
            )));
        }
        if reply.kind == MessageType::Error {
            let error = reply.payload_as::<ErrorMessage>(MessageType::Error)?;
            debug!(request_id, message = %error.message, "child reported an error");
            return Err(error.into());
        }
        Ok(reply)
    }
}
