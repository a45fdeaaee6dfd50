//! Messages exchanged between the host and a sandbox child.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::IpcError;
use crate::types::{ExitReason, VmExecutionResult};

/// Envelope `type` tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageType {
    ExecuteRequest = 1,
    ExecuteResponse = 2,
    Error = 3,
    Heartbeat = 4,
}

impl TryFrom<u8> for MessageType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            1 => Ok(Self::ExecuteRequest),
            2 => Ok(Self::ExecuteResponse),
            3 => Ok(Self::Error),
            4 => Ok(Self::Heartbeat),
            other => Err(format!("unknown message type {other}")),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        value as u8
    }
}

/// One framed message: `{type, requestId, payload}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IpcMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(rename = "requestId")]
    pub request_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl IpcMessage {
    #[must_use]
    pub const fn empty(kind: MessageType, request_id: u32) -> Self {
        Self {
            kind,
            request_id,
            payload: None,
        }
    }

    pub fn with_payload<T: Serialize>(kind: MessageType, request_id: u32, payload: &T) -> Result<Self, IpcError> {
        let payload = serde_json::to_value(payload).map_err(|e| IpcError::Encode(e.to_string()))?;
        Ok(Self {
            kind,
            request_id,
            payload: Some(payload),
        })
    }

    /// Payload decoded as `T`, after checking the message is of kind `expected`.
    pub fn payload_as<T: DeserializeOwned>(&self, expected: MessageType) -> Result<T, IpcError> {
        if self.kind != expected {
            return Err(IpcError::InvalidResponse(format!(
                "expected {expected:?}, got {:?}",
                self.kind
            )));
        }
        let payload = self
            .payload
            .clone()
            .ok_or_else(|| IpcError::Decode(format!("{expected:?} without payload")))?;
        Ok(serde_json::from_value(payload)?)
    }
}

/// Byte fields travel as standard base64 strings.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(de::Error::custom)
    }

    pub mod option {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|text| STANDARD.decode(text).map_err(de::Error::custom))
                .transpose()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(with = "base64_bytes")]
    pub blob: Vec<u8>,
    pub pc: u32,
    pub gas: u64,
    #[serde(default, with = "base64_bytes::option")]
    pub argument_data: Option<Vec<u8>>,
    /// `ExecutionMode` bits.
    pub execution_mode: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    /// `ExitReason::to_u64`.
    pub exit_reason_code: u64,
    pub gas_used: u64,
    #[serde(default, with = "base64_bytes::option")]
    pub output_data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExecuteResponse {
    #[must_use]
    pub fn from_result(result: &VmExecutionResult) -> Self {
        Self {
            exit_reason_code: result.exit_reason.to_u64(),
            gas_used: result.gas_used,
            output_data: result.output.clone(),
            error_message: None,
        }
    }

    pub fn into_result(self) -> Result<VmExecutionResult, IpcError> {
        if let Some(message) = self.error_message {
            return Err(IpcError::Remote {
                error_type: ErrorKind::Execution as u8,
                message,
            });
        }
        let exit_reason = ExitReason::from_u64(self.exit_reason_code).ok_or_else(|| {
            IpcError::InvalidResponse(format!("unknown exit reason code {:#x}", self.exit_reason_code))
        })?;
        Ok(VmExecutionResult {
            exit_reason,
            gas_used: self.gas_used,
            output: self.output_data,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ErrorKind {
    Deserialization = 1,
    Execution = 2,
    Security = 3,
    Unknown = 4,
}

impl TryFrom<u8> for ErrorKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            1 => Ok(Self::Deserialization),
            2 => Ok(Self::Execution),
            3 => Ok(Self::Security),
            4 => Ok(Self::Unknown),
            other => Err(format!("unknown error type {other}")),
        }
    }
}

impl From<ErrorKind> for u8 {
    fn from(value: ErrorKind) -> Self {
        value as u8
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub error_type: ErrorKind,
    pub message: String,
}

impl From<ErrorMessage> for IpcError {
    fn from(e: ErrorMessage) -> Self {
        Self::Remote {
            error_type: e.error_type.into(),
            message: e.message,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum HeartbeatStatus {
    Ready = 1,
    Busy = 2,
    Error = 3,
}

impl TryFrom<u8> for HeartbeatStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            1 => Ok(Self::Ready),
            2 => Ok(Self::Busy),
            3 => Ok(Self::Error),
            other => Err(format!("unknown heartbeat status {other}")),
        }
    }
}

impl From<HeartbeatStatus> for u8 {
    fn from(value: HeartbeatStatus) -> Self {
        value as u8
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub status: HeartbeatStatus,
}

impl Heartbeat {
    #[must_use]
    pub fn now(status: HeartbeatStatus) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        Self { timestamp, status }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PanicReason;

    #[test]
    fn envelope_uses_wire_field_names() {
        let message = IpcMessage::with_payload(
            MessageType::ExecuteRequest,
            7,
            &ExecuteRequest {
                blob: vec![1, 2],
                pc: 0,
                gas: 10,
                argument_data: None,
                execution_mode: 1,
            },
        )
        .unwrap();
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], 1);
        assert_eq!(json["requestId"], 7);
        assert_eq!(json["payload"]["executionMode"], 1);
        assert_eq!(json["payload"]["blob"], "AQI=");
        assert_eq!(json["payload"]["argumentData"], serde_json::Value::Null);

        let heartbeat = serde_json::to_string(&IpcMessage::empty(MessageType::Heartbeat, 1)).unwrap();
        assert_eq!(heartbeat, r#"{"type":4,"requestId":1}"#);
    }

    #[test]
    fn rejects_unknown_message_types() {
        let err = serde_json::from_str::<IpcMessage>(r#"{"type":9,"requestId":1}"#).unwrap_err();
        assert!(err.to_string().contains("unknown message type 9"));
    }

    #[test]
    fn payload_kind_is_checked() {
        let message = IpcMessage::empty(MessageType::Heartbeat, 1);
        assert!(matches!(
            message.payload_as::<ExecuteResponse>(MessageType::ExecuteResponse),
            Err(IpcError::InvalidResponse(_))
        ));
        let message = IpcMessage::empty(MessageType::ExecuteResponse, 1);
        assert!(matches!(
            message.payload_as::<ExecuteResponse>(MessageType::ExecuteResponse),
            Err(IpcError::Decode(_))
        ));
    }

    #[test]
    fn response_carries_exit_reason_code() {
        let result = VmExecutionResult {
            exit_reason: ExitReason::Panic(PanicReason::InvalidBranch),
            gas_used: 3,
            output: None,
        };
        let response = ExecuteResponse::from_result(&result);
        assert_eq!(response.exit_reason_code, 0x301);
        assert_eq!(response.into_result().unwrap(), result);

        let failed = ExecuteResponse {
            exit_reason_code: 0,
            gas_used: 0,
            output_data: None,
            error_message: Some("bad blob".into()),
        };
        assert!(matches!(failed.into_result(), Err(IpcError::Remote { error_type: 2, .. })));

        let unknown = ExecuteResponse {
            exit_reason_code: 2,
            gas_used: 0,
            output_data: None,
            error_message: None,
        };
        assert!(matches!(unknown.into_result(), Err(IpcError::InvalidResponse(_))));
    }

    #[test]
    fn byte_fields_are_base64() {
        let response = ExecuteResponse {
            exit_reason_code: 0,
            gas_used: 1,
            output_data: Some(vec![0xff; 4]),
            error_message: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["outputData"], "/////w==");
        assert_eq!(serde_json::from_value::<ExecuteResponse>(json).unwrap(), response);

        let bad = serde_json::json!({"blob": "not base64!", "pc": 0, "gas": 1, "executionMode": 0});
        assert!(serde_json::from_value::<ExecuteRequest>(bad).is_err());
    }

    #[test]
    fn largest_program_blobs_fit_in_one_frame() {
        use crate::ipc::protocol::{decode_message, encode_message, MAX_MESSAGE_SIZE};

        // 16 MiB read-only plus 16 MiB read-write data
        let request = ExecuteRequest {
            blob: vec![0xff; 32 << 20],
            pc: 0,
            gas: 1,
            argument_data: Some(vec![0xfe; 1 << 20]),
            execution_mode: 0,
        };
        let message = IpcMessage::with_payload(MessageType::ExecuteRequest, 1, &request).unwrap();
        let frame = encode_message(&message).unwrap();
        assert!(frame.len() < MAX_MESSAGE_SIZE);
        let (decoded, consumed) = decode_message(&frame).unwrap().unwrap();
        assert_eq!(consumed, frame.len());
        assert_eq!(decoded.payload_as::<ExecuteRequest>(MessageType::ExecuteRequest).unwrap(), request);
    }
}
