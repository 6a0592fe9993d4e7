//! JSON-RPC 2.0 framing and the runner method set.
//!
//! Frames are newline-delimited JSON over the plugin's stdio. The channel
//! is bidirectional: the host calls `plugin.*` methods on the plugin, and
//! during an evaluation the plugin calls `host.*` methods back over the
//! same pipe. Each side allocates ids from its own counter and only matches
//! responses against its own pending table, so the two id spaces never
//! interfere.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtoError, ProtoResult};
use crate::evidence::Evidence;
use crate::wire::WireConfig;

/// Method names understood by the plugin side.
pub mod methods {
    /// Host → plugin: deliver the plugin's configuration.
    pub const CONFIGURE: &str = "plugin.configure";
    /// Host → plugin: run an evaluation over the given policy bundles.
    pub const EVAL: &str = "plugin.eval";
    /// Plugin → host: submit a batch of evidence during an evaluation.
    pub const CREATE_EVIDENCE: &str = "host.create_evidence";
}

/// Well-known JSON-RPC error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

const JSONRPC: &str = "2.0";

/// An outgoing or incoming JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC.to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// A JSON-RPC response carrying either a result or an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Turn the response into its result, surfacing a peer error.
    pub fn into_result(self) -> ProtoResult<Value> {
        if let Some(err) = self.error {
            return Err(ProtoError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// The error object of a failed JSON-RPC call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// One parsed line off the channel.
#[derive(Debug)]
pub enum Frame {
    Request(Request),
    Response(Response),
}

impl Frame {
    /// Classify and parse a raw line. A frame with a `method` member is a
    /// request; anything else must be a response.
    pub fn parse(line: &str) -> ProtoResult<Self> {
        let value: Value = serde_json::from_str(line).map_err(|e| ProtoError::MalformedFrame {
            reason: e.to_string(),
        })?;
        if value.get("method").is_some() {
            let request = serde_json::from_value(value).map_err(|e| ProtoError::MalformedFrame {
                reason: e.to_string(),
            })?;
            Ok(Self::Request(request))
        } else {
            let response = serde_json::from_value(value).map_err(|e| ProtoError::MalformedFrame {
                reason: e.to_string(),
            })?;
            Ok(Self::Response(response))
        }
    }
}

/// Encode a frame as one transport line (no trailing newline).
pub fn encode_line<T: Serialize>(frame: &T) -> String {
    // The frame types above always serialize.
    serde_json::to_string(frame).unwrap_or_default()
}

/// Params of `plugin.configure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigureRequest {
    pub config: WireConfig,
}

/// Result of `plugin.configure`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigureResponse {}

/// Params of `plugin.eval`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRequest {
    /// Local paths of the policy bundles to evaluate.
    pub policy_paths: Vec<String>,
    /// Broker id of the evidence endpoint stood up for this evaluation.
    pub callback_id: u32,
}

/// Result of `plugin.eval`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResponse {
    pub status: EvalStatus,
}

/// Terminal status of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvalStatus {
    Success,
    Failure,
}

/// Params of `host.create_evidence`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEvidenceRequest {
    /// The broker id handed out in the eval request.
    pub callback_id: u32,
    pub evidence: Vec<Evidence>,
}

/// Result of `host.create_evidence`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateEvidenceResponse {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_classification() {
        let request = Request::new(1, methods::CONFIGURE, serde_json::json!({"config": {"items": []}}));
        let line = encode_line(&request);
        assert!(matches!(Frame::parse(&line).unwrap(), Frame::Request(_)));

        let response = Response::success(1, Value::Null);
        let line = encode_line(&response);
        assert!(matches!(Frame::parse(&line).unwrap(), Frame::Response(_)));
    }

    #[test]
    fn test_malformed_frame() {
        assert!(matches!(
            Frame::parse("not json").unwrap_err(),
            ProtoError::MalformedFrame { .. }
        ));
        assert!(matches!(
            Frame::parse(r#"{"id": "strings are not ids"}"#).unwrap_err(),
            ProtoError::MalformedFrame { .. }
        ));
    }

    #[test]
    fn test_response_error_surfaces() {
        let response = Response::failure(7, error_codes::INTERNAL_ERROR, "boom");
        let err = response.into_result().unwrap_err();
        assert!(matches!(err, ProtoError::Rpc { code, .. } if code == error_codes::INTERNAL_ERROR));
    }

    #[test]
    fn test_eval_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&EvalStatus::Success).unwrap(),
            r#""SUCCESS""#
        );
        assert_eq!(
            serde_json::to_string(&EvalStatus::Failure).unwrap(),
            r#""FAILURE""#
        );
    }

    #[test]
    fn test_eval_request_roundtrip() {
        let request = EvalRequest {
            policy_paths: vec!["/tmp/policies".into()],
            callback_id: 3,
        };
        let value = serde_json::to_value(&request).unwrap();
        let back: EvalRequest = serde_json::from_value(value).unwrap();
        assert_eq!(back.policy_paths, vec!["/tmp/policies".to_string()]);
        assert_eq!(back.callback_id, 3);
    }
}
