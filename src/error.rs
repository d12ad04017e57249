//! JSON-RPC 2.0 error taxonomy.
//!
//! A single [`StatusError`] value carries a numeric `code`, a human-readable
//! `message`, and optional structured `data`. It is the error type every
//! response-building path in this crate converges on: the codec, the
//! registry, and the dispatch handler all produce `StatusError` when a
//! request cannot be honored, and [`StatusError::from_result_error`] lifts
//! whatever error type a handler method returned into the same shape.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// JSON-RPC reserved "Parse error" code.
pub const CODE_PARSE_ERROR: i32 = -32700;
/// JSON-RPC reserved "Invalid Request" code.
pub const CODE_INVALID_REQUEST: i32 = -32600;
/// JSON-RPC reserved "Method not found" code.
pub const CODE_METHOD_NOT_FOUND: i32 = -32601;
/// JSON-RPC reserved "Invalid params" code.
pub const CODE_INVALID_PARAMS: i32 = -32602;
/// JSON-RPC reserved "Internal error" code.
pub const CODE_INTERNAL_ERROR: i32 = -32603;

/// Invalid `jsonrpc` protocol version field.
pub const CODE_INVALID_VERSION: i32 = -32001;
/// Request is missing `service` or `method`.
pub const CODE_MISSING_SERVICE_OR_METHOD: i32 = -32002;
/// Registration supplied an empty service name or version.
pub const CODE_MISSING_SERVICE_NAME_OR_VERSION: i32 = -32003;
/// A callback's return shape carried no error output where one was required.
pub const CODE_MISSING_ERROR_RETURN: i32 = -32004;
/// A callback declared more than two return values.
pub const CODE_TOO_MANY_RETURNS: i32 = -32005;
/// A handler invocation panicked.
pub const CODE_HANDLER_PANIC: i32 = -32006;
/// `params` carried more elements than the callback declares.
pub const CODE_TOO_MANY_PARAMS: i32 = -32007;
/// A non-pointer/non-optional parameter had no value to decode.
pub const CODE_MISSING_PARAM_VALUE: i32 = -32008;
/// A handler did not complete within the configured timeout.
pub const CODE_HANDLER_TIMEOUT: i32 = -32009;

/// Default code for an error that carries no explicit classification.
pub const CODE_DEFAULT: i32 = -32000;

/// A JSON-RPC 2.0 error object.
///
/// This is the one error type that crosses the wire: every failure mode in
/// the registry, codec, and dispatch pipeline is represented as a
/// `StatusError` before it is serialized into a response's `error` field.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("status error {code}: {message}")]
pub struct StatusError {
    /// A number indicating the error type.
    pub code: i32,
    /// Short, human-readable description of the error.
    pub message: String,
    /// Optional additional information about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl StatusError {
    /// Builds a status error with no attached data.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Builds a status error with attached structured data.
    pub fn with_data(code: i32, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn parse_error() -> Self {
        Self::new(CODE_PARSE_ERROR, "invalid JSON content")
    }

    pub fn invalid_request() -> Self {
        Self::new(CODE_INVALID_REQUEST, "invalid request")
    }

    pub fn method_not_found() -> Self {
        Self::new(CODE_METHOD_NOT_FOUND, "method not found")
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(CODE_INVALID_PARAMS, format!("invalid params: {}", detail.into()))
    }

    pub fn invalid_version() -> Self {
        Self::new(CODE_INVALID_VERSION, "invalid protocol version")
    }

    pub fn missing_service_or_method() -> Self {
        Self::new(CODE_MISSING_SERVICE_OR_METHOD, "missing service or method")
    }

    pub fn missing_service_name_or_version() -> Self {
        Self::new(
            CODE_MISSING_SERVICE_NAME_OR_VERSION,
            "service name or version must not be empty",
        )
    }

    pub fn missing_error_return() -> Self {
        Self::new(
            CODE_MISSING_ERROR_RETURN,
            "callback's declared output shape requires an error return",
        )
    }

    pub fn too_many_returns() -> Self {
        Self::new(CODE_TOO_MANY_RETURNS, "callback declared too many return values")
    }

    pub fn handler_panic() -> Self {
        Self::new(CODE_HANDLER_PANIC, "method running crash")
    }

    pub fn too_many_params() -> Self {
        Self::new(CODE_TOO_MANY_PARAMS, "too many params")
    }

    pub fn missing_value_for_params() -> Self {
        Self::new(CODE_MISSING_PARAM_VALUE, "missing value for params")
    }

    pub fn handler_timeout() -> Self {
        Self::new(CODE_HANDLER_TIMEOUT, "handling message timeout")
    }

    /// Lifts the richest available variant of a handler-returned error into
    /// a `StatusError`, per §4.2: `ResultError` > `ResultDataError` +
    /// `ResultCodeError` > the error's `Display` form with [`CODE_DEFAULT`].
    pub fn from_result_error<E: ResultErrorLike>(err: &E) -> Self {
        let code = err.error_code().unwrap_or(CODE_DEFAULT);
        let message = err
            .error_message()
            .unwrap_or_else(|| err.to_string());
        let data = err.error_data();
        Self {
            code,
            message,
            data,
        }
    }
}

/// A handler error type that can optionally expose a JSON-RPC error code
/// and/or structured data, mirroring the Go interfaces `ResultCodeError`,
/// `ResultDataError`, and `ResultError`.
///
/// Plain `std::error::Error` implementors get the default behavior (their
/// `Display` form as the message, [`CODE_DEFAULT`] as the code, no data) by
/// way of the blanket implementation below; a handler that wants to surface
/// a specific code or structured data implements this trait directly.
pub trait ResultErrorLike: fmt::Display {
    /// `ResultCodeError::ErrorCode`. `None` means "use the default code".
    fn error_code(&self) -> Option<i32> {
        None
    }

    /// `ResultCodeError::ErrorMessage`. `None` means "use `Display`".
    fn error_message(&self) -> Option<String> {
        None
    }

    /// `ResultDataError::ErrorData`. `None` means "no data attached".
    fn error_data(&self) -> Option<serde_json::Value> {
        None
    }
}

impl<E: std::error::Error> ResultErrorLike for E {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct PlainError(String);

    impl fmt::Display for PlainError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }
    impl std::error::Error for PlainError {}

    #[derive(Debug)]
    struct RichError {
        code: i32,
        message: String,
        data: serde_json::Value,
    }

    impl fmt::Display for RichError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.message)
        }
    }
    impl std::error::Error for RichError {}
    impl ResultErrorLike for RichError {
        fn error_code(&self) -> Option<i32> {
            Some(self.code)
        }
        fn error_message(&self) -> Option<String> {
            Some(self.message.clone())
        }
        fn error_data(&self) -> Option<serde_json::Value> {
            Some(self.data.clone())
        }
    }

    #[test]
    fn plain_error_uses_default_code_and_display() {
        let err = PlainError("boom".into());
        let status = StatusError::from_result_error(&err);
        assert_eq!(status.code, CODE_DEFAULT);
        assert_eq!(status.message, "boom");
        assert!(status.data.is_none());
    }

    #[test]
    fn rich_error_uses_richest_variant() {
        let err = RichError {
            code: -1,
            message: "error message".into(),
            data: serde_json::json!({}),
        };
        let status = StatusError::from_result_error(&err);
        assert_eq!(status.code, -1);
        assert_eq!(status.message, "error message");
        assert_eq!(status.data, Some(serde_json::json!({})));
    }

    #[test]
    fn serializes_without_data_when_absent() {
        let status = StatusError::method_not_found();
        let v = serde_json::to_value(&status).unwrap();
        assert!(v.get("data").is_none());
        assert_eq!(v["code"], CODE_METHOD_NOT_FOUND);
    }
}
