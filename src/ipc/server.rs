//! Child side of the sandbox channel.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, trace, warn};

use crate::error::IpcError;
use crate::ipc::messages::{
    ErrorKind, ErrorMessage, ExecuteRequest, ExecuteResponse, Heartbeat, HeartbeatStatus, IpcMessage, MessageType,
};
use crate::ipc::protocol::{read_message, write_message};

/// Runs the execute requests a server receives.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Execute one request. An `Err` is reported to the host as an error message.
    async fn handle(&self, request: ExecuteRequest) -> Result<ExecuteResponse, String>;
}

/// Counters returned when the serve loop ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServeSummary {
    pub executions: u64,
    pub heartbeats: u64,
    pub errors: u64,
}

pub struct IpcServer<S, H> {
    stream: S,
    handler: H,
}

impl<S, H> IpcServer<S, H>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    H: RequestHandler,
{
    pub const fn new(stream: S, handler: H) -> Self {
        Self { stream, handler }
    }

    /// Answer requests until the host closes the channel or sends an error message.
    pub async fn serve(mut self) -> Result<ServeSummary, IpcError> {
        let mut summary = ServeSummary::default();
        while let Some(message) = read_message(&mut self.stream).await? {
            trace!(kind = ?message.kind, request_id = message.request_id, "ipc server received");
            match message.kind {
                MessageType::ExecuteRequest => {
                    let reply = self.execute(&message).await;
                    if reply.kind == MessageType::Error {
                        summary.errors += 1;
                    } else {
                        summary.executions += 1;
                    }
                    write_message(&mut self.stream, &reply).await?;
                }
                MessageType::Heartbeat => {
                    summary.heartbeats += 1;
                    let reply = IpcMessage::with_payload(
                        MessageType::Heartbeat,
                        message.request_id,
                        &Heartbeat::now(HeartbeatStatus::Ready),
                    )?;
                    write_message(&mut self.stream, &reply).await?;
                }
                MessageType::Error => {
                    error!(request_id = message.request_id, "host sent an error message, stopping");
                    break;
                }
                MessageType::ExecuteResponse => {
                    warn!(request_id = message.request_id, "ignoring unexpected execute response");
                }
            }
        }
        debug!(?summary, "ipc server stopped");
        Ok(summary)
    }

    async fn execute(&self, message: &IpcMessage) -> IpcMessage {
        let request_id = message.request_id;
        let (kind, text) = match message.payload_as::<ExecuteRequest>(MessageType::ExecuteRequest) {
            Ok(request) => match self.handler.handle(request).await {
                Ok(response) => match IpcMessage::with_payload(MessageType::ExecuteResponse, request_id, &response) {
                    Ok(reply) => return reply,
                    Err(e) => (ErrorKind::Unknown, e.to_string()),
                },
                Err(text) => (ErrorKind::Execution, text),
            },
            Err(e) => (ErrorKind::Deserialization, e.to_string()),
        };
        warn!(request_id, error = %text, "execute request failed");
        let error = ErrorMessage {
            error_type: kind,
            message: text,
        };
        IpcMessage::with_payload(MessageType::Error, request_id, &error)
            .unwrap_or_else(|_| IpcMessage::empty(MessageType::Error, request_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::client::IpcClient;
    use crate::types::{ExitReason, PanicReason};
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl RequestHandler for Echo {
        async fn handle(&self, request: ExecuteRequest) -> Result<ExecuteResponse, String> {
            if request.blob.is_empty() {
                return Err("empty blob".into());
            }
            Ok(ExecuteResponse {
                exit_reason_code: ExitReason::Panic(PanicReason::Trap).to_u64(),
                gas_used: request.gas / 2,
                output_data: request.argument_data,
                error_message: None,
            })
        }
    }

    #[tokio::test]
    async fn serves_until_the_host_hangs_up() {
        let (host, child) = tokio::io::duplex(4096);
        let server = tokio::spawn(IpcServer::new(child, Echo).serve());

        let mut client = IpcClient::new(host, Duration::from_secs(5));
        assert!(client.heartbeat().await.unwrap().is_some());
        let request = ExecuteRequest {
            blob: vec![1],
            pc: 0,
            gas: 10,
            argument_data: Some(vec![3]),
            execution_mode: 0,
        };
        let result = client.execute(&request).await.unwrap();
        assert_eq!(result.exit_reason, ExitReason::Panic(PanicReason::Trap));
        assert_eq!(result.gas_used, 5);
        assert_eq!(result.output, Some(vec![3]));

        let failing = ExecuteRequest { blob: vec![], ..request };
        assert!(matches!(
            client.execute(&failing).await,
            Err(IpcError::Remote { error_type: 2, .. })
        ));

        drop(client);
        let summary = server.await.unwrap().unwrap();
        assert_eq!(
            summary,
            ServeSummary {
                executions: 1,
                heartbeats: 1,
                errors: 1
            }
        );
    }

    #[tokio::test]
    async fn undecodable_request_is_a_deserialization_error() {
        let (mut host, child) = tokio::io::duplex(4096);
        tokio::spawn(IpcServer::new(child, Echo).serve());
        let bogus = IpcMessage::with_payload(MessageType::ExecuteRequest, 5, &"not a request").unwrap();
        write_message(&mut host, &bogus).await.unwrap();
        let reply = read_message(&mut host).await.unwrap().unwrap();
        assert_eq!(reply.kind, MessageType::Error);
        assert_eq!(reply.request_id, 5);
        let error: ErrorMessage = reply.payload_as(MessageType::Error).unwrap();
        assert_eq!(error.error_type, ErrorKind::Deserialization);
    }
}
