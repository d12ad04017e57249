//! The JSON-RPC 2.0 wire message and batch handling (§3 "JSON message", §4.1).

use crate::error::StatusError;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Protocol version string every request and response must carry.
pub const JSONRPC_VERSION: &str = "2.0";

/// A single JSON-RPC 2.0 message as it appears on the wire.
///
/// This single struct represents both requests and responses: a request
/// carries `service`/`method` (and, for the `anserpc` extension, `group`/
/// `service_version`); a response carries `result` xor `error`, echoing
/// `id`. `params`, `id`, `result` are kept as raw JSON so the codec never
/// has to guess a concrete type before the registry has resolved a
/// callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonMessage {
    #[serde(default = "default_version")]
    pub jsonrpc: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,

    #[serde(default, rename = "service_version", skip_serializing_if = "String::is_empty")]
    pub service_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Box<RawValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Box<RawValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StatusError>,
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

impl JsonMessage {
    /// Builds a successful response echoing `id`.
    pub fn success(id: Option<Box<RawValue>>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            group: String::new(),
            service: String::new(),
            service_version: String::new(),
            method: String::new(),
            params: None,
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response echoing `id`.
    pub fn failure(id: Option<Box<RawValue>>, error: StatusError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            group: String::new(),
            service: String::new(),
            service_version: String::new(),
            method: String::new(),
            params: None,
            id,
            result: None,
            error: Some(error),
        }
    }

    /// A message is valid iff `jsonrpc == "2.0"` and both `service` and
    /// `method` are non-empty (§4.1 Validation).
    pub fn validate(&self) -> Result<(), StatusError> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(StatusError::invalid_version());
        }
        if self.service.is_empty() || self.method.is_empty() {
            return Err(StatusError::missing_service_or_method());
        }
        Ok(())
    }

    /// `params` decoded into a positional JSON array, per §4.1. `None` and
    /// `Null` both mean "no params supplied"; anything else that isn't a
    /// JSON array is `"invalid params"`.
    pub fn params_array(&self) -> Result<Vec<serde_json::Value>, StatusError> {
        let Some(raw) = &self.params else {
            return Ok(Vec::new());
        };
        let value: serde_json::Value = serde_json::from_str(raw.get())
            .map_err(|e| StatusError::invalid_params(e.to_string()))?;
        match value {
            serde_json::Value::Null => Ok(Vec::new()),
            serde_json::Value::Array(items) => Ok(items),
            _ => Err(StatusError::invalid_params("params must be an array")),
        }
    }
}

/// A decoded wire payload: either a single message or a batch of them.
/// Encoding mirrors the shape back: a batch input yields a JSON array
/// response, a single input yields a single JSON object response (§4.4.4).
#[derive(Debug)]
pub enum Payload {
    Single(Box<JsonMessage>),
    Batch(Vec<JsonMessage>),
}

impl Payload {
    /// Parses one top-level JSON value from `raw`. A batch is the first
    /// non-whitespace byte being `[`; the whole batch is re-parsed
    /// element-by-element so a single malformed element fails the whole
    /// batch with [`StatusError::parse_error`] (§4.1, §9 open question #1).
    pub fn decode(raw: &[u8]) -> Result<Self, StatusError> {
        let first_non_ws = raw
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .copied();
        match first_non_ws {
            Some(b'[') => {
                let items: Vec<JsonMessage> =
                    serde_json::from_slice(raw).map_err(|_| StatusError::parse_error())?;
                Ok(Payload::Batch(items))
            }
            Some(_) => {
                let msg: JsonMessage =
                    serde_json::from_slice(raw).map_err(|_| StatusError::parse_error())?;
                Ok(Payload::Single(Box::new(msg)))
            }
            None => Err(StatusError::parse_error()),
        }
    }

    pub fn into_messages(self) -> Vec<JsonMessage> {
        match self {
            Payload::Single(m) => vec![*m],
            Payload::Batch(items) => items,
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Payload::Batch(_))
    }
}

/// Serializes a set of responses back into the shape dictated by the
/// request payload: a batch in, a JSON array out; a single message in, a
/// single JSON object out.
pub fn encode_responses(is_batch: bool, responses: Vec<JsonMessage>) -> serde_json::Value {
    if is_batch {
        serde_json::to_value(responses).expect("response list always serializes")
    } else {
        serde_json::to_value(
            responses
                .into_iter()
                .next()
                .expect("single payload always yields exactly one response"),
        )
        .expect("response always serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_version_and_required_fields() {
        let mut msg = JsonMessage::success(None, serde_json::Value::Null);
        msg.jsonrpc = "1.0".into();
        assert_eq!(
            msg.validate().unwrap_err().code,
            crate::error::CODE_INVALID_VERSION
        );

        msg.jsonrpc = "2.0".into();
        assert_eq!(
            msg.validate().unwrap_err().code,
            crate::error::CODE_MISSING_SERVICE_OR_METHOD
        );

        msg.service = "svc".into();
        msg.method = "Do".into();
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn decodes_single_and_batch() {
        let single = Payload::decode(br#"{"jsonrpc":"2.0","service":"a","method":"b"}"#).unwrap();
        assert!(!single.is_batch());

        let batch = Payload::decode(br#"[{"jsonrpc":"2.0","service":"a","method":"b"}]"#).unwrap();
        assert!(batch.is_batch());
    }

    #[test]
    fn malformed_batch_element_fails_whole_batch() {
        let err = Payload::decode(br#"[{"jsonrpc":"2.0"}, not-json]"#).unwrap_err();
        assert_eq!(err.code, crate::error::CODE_PARSE_ERROR);
    }

    #[test]
    fn params_array_rejects_non_array() {
        let raw = RawValue::from_string("42".to_string()).unwrap();
        let mut msg = JsonMessage::success(None, serde_json::Value::Null);
        msg.params = Some(raw);
        assert_eq!(
            msg.params_array().unwrap_err().code,
            crate::error::CODE_INVALID_PARAMS
        );
    }

    #[test]
    fn params_array_treats_null_and_absent_as_empty() {
        let msg = JsonMessage::success(None, serde_json::Value::Null);
        assert_eq!(msg.params_array().unwrap(), Vec::<serde_json::Value>::new());

        let mut msg2 = msg.clone();
        msg2.params = Some(RawValue::from_string("null".into()).unwrap());
        assert_eq!(msg2.params_array().unwrap(), Vec::<serde_json::Value>::new());
    }
}
