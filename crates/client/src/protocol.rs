//! Wire envelopes and payloads.
//!
//! Every message is a single line of JSON terminated by `\n`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Value carried in every envelope's `protocol_version` field.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Method names used by the session.
pub mod methods {
    /// Capability negotiation; must precede everything else.
    pub const HANDSHAKE: &str = "initialize";
    /// List the operations the subprocess can run.
    pub const DISCOVER: &str = "operations/list";
    /// Run one named operation.
    pub const INVOKE: &str = "operations/call";
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Envelopes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An outbound request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestEnvelope {
    pub protocol_version: String,
    pub method: String,
    pub params: Value,
    pub id: u64,
}

impl RequestEnvelope {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.into(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// An inbound reply.
///
/// `protocol_version` and `id` are optional on the way in: some servers
/// answer with a bare `{"result": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResponseEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// `Some(Value::Null)` when the reply carried `"result": null`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

/// Distinguishes an explicit `null` from an absent field.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// What a reply resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Result(Value),
    Error(RemoteError),
}

impl ResponseEnvelope {
    /// Resolve the reply. An `error` field wins over `result`; `None` means
    /// the envelope carried neither.
    pub fn into_reply(self) -> Option<Reply> {
        match (self.error, self.result) {
            (Some(err), _) => Some(Reply::Error(err)),
            (None, Some(value)) => Some(Reply::Result(value)),
            (None, None) => None,
        }
    }
}

/// Error object reported by the subprocess.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteError {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Any other fields the server attached.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Self-description returned by the handshake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Capabilities and anything else the server reported.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of the discovery result.
///
/// `parameter_schema` is passed through untouched; it is `null` when the
/// server omitted it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameter_schema: Value,
}

/// The result payload of a discovery request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub operations: Vec<OperationDescriptor>,
}

/// A single content block of an invocation result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// The result payload of an invocation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationResult {
    pub content: Vec<ContentBlock>,
}

impl InvocationResult {
    /// Text of the first content block, if it has any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().and_then(|block| block.text.as_deref())
    }
}

/// Build the params for an invocation request.
pub fn invoke_params(name: &str, arguments: Map<String, Value>) -> Value {
    serde_json::json!({
        "name": name,
        "arguments": arguments,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_request() {
        let req = RequestEnvelope::new(1, methods::HANDSHAKE, serde_json::json!({}));
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"protocol_version":"2.0","method":"initialize","params":{},"id":1}"#
        );
    }

    #[test]
    fn request_with_newline_in_arguments_stays_on_one_line() {
        let mut args = Map::new();
        args.insert("text".into(), Value::String("two\nlines".into()));
        let req = RequestEnvelope::new(7, methods::INVOKE, invoke_params("echo", args));
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains('\n'));
        assert!(json.contains(r#""name":"echo""#));
    }

    #[test]
    fn deserialize_success_response() {
        let raw = r#"{"protocol_version":"2.0","id":1,"result":{"name":"mock","version":"1"}}"#;
        let resp: ResponseEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.id, Some(1));
        match resp.into_reply() {
            Some(Reply::Result(value)) => assert_eq!(value["name"], "mock"),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn bare_error_response_without_id() {
        let raw = r#"{"error":{"message":"boom"}}"#;
        let resp: ResponseEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.id, None);
        match resp.into_reply() {
            Some(Reply::Error(err)) => {
                assert_eq!(err.message, "boom");
                assert_eq!(err.to_string(), "boom");
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn null_result_is_still_a_result() {
        let resp: ResponseEnvelope = serde_json::from_str(r#"{"id":3,"result":null}"#).unwrap();
        assert_eq!(resp.into_reply(), Some(Reply::Result(Value::Null)));
    }

    #[test]
    fn envelope_without_result_or_error() {
        let resp: ResponseEnvelope = serde_json::from_str(r#"{"id":3}"#).unwrap();
        assert_eq!(resp.into_reply(), None);
    }

    #[test]
    fn remote_error_keeps_extra_fields() {
        let raw = r#"{"message":"denied","code":-32001,"retry_after":5}"#;
        let err: RemoteError = serde_json::from_str(raw).unwrap();
        assert_eq!(err.code, Some(-32001));
        assert_eq!(err.extra["retry_after"], 5);
        assert_eq!(err.to_string(), "denied (code -32001)");
    }

    #[test]
    fn server_info_flattens_capabilities() {
        let raw = r#"{"name":"mock","version":"1","capabilities":{"streaming":false}}"#;
        let info: ServerInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.name, "mock");
        assert_eq!(info.extra["capabilities"]["streaming"], false);
    }

    #[test]
    fn discovery_result_preserves_order_and_schema() {
        let raw = r#"{
            "operations": [
                { "name": "echo", "description": "echoes input", "parameter_schema": {"type": "object"} },
                { "name": "ping" }
            ]
        }"#;
        let result: DiscoveryResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.operations.len(), 2);
        assert_eq!(result.operations[0].name, "echo");
        assert_eq!(result.operations[0].parameter_schema["type"], "object");
        assert_eq!(result.operations[1].description, "");
        assert!(result.operations[1].parameter_schema.is_null());
    }

    #[test]
    fn invocation_first_text() {
        let raw = r#"{"content":[{"type":"text","text":"hello"},{"type":"text","text":"ignored"}]}"#;
        let result: InvocationResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.first_text(), Some("hello"));

        let empty: InvocationResult = serde_json::from_str(r#"{"content":[]}"#).unwrap();
        assert_eq!(empty.first_text(), None);

        let image: InvocationResult =
            serde_json::from_str(r#"{"content":[{"type":"image","data":"..."}]}"#).unwrap();
        assert_eq!(image.first_text(), None);
    }
}
