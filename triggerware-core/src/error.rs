//! Error types for the Triggerware client
//!
//! There are two error types:
//!
//! - **Error**: the crate-wide error returned by every fallible operation (uses thiserror)
//! - **JsonRpcErrorData**: the `error` object as it travels on the wire
//!
//! # Error Families
//!
//! `Error` mixes three families that behave differently:
//!
//! - **Protocol errors** cross the wire. Each known kind owns a fixed numeric
//!   code, and the conversion between `Error` and `JsonRpcErrorData` works in
//!   both directions.
//! - **Transport errors** (`Io`, `Serialization`, `ConnectionClosed`,
//!   `NotConnected`) describe the local stream.
//! - **Usage errors** (`WrongAddressingMode`, `ParameterOutOfRange`,
//!   `TypeMismatch`, `InvalidSchedule`, `InvalidState`) are raised by the
//!   session layer before anything is sent. They are never serialized, except
//!   as an internal error when a local method handler fails with one.
//!
//! # Error Codes
//!
//! - `-32700`: Parse error
//! - `-32600`: Invalid request
//! - `-32601`: Method not found
//! - `-32602`: Invalid params
//! - `-32603`: Internal error
//! - `-32000`: Server error
//! - anything else: unranked, kept verbatim
//!
//! # Examples
//!
//! ```rust
//! use triggerware_core::{Error, JsonRpcErrorData};
//!
//! let wire = JsonRpcErrorData::method_not_found("poll7");
//! let error = Error::from(wire.clone());
//! assert!(matches!(error, Error::MethodNotFound { .. }));
//! assert_eq!(error.to_error_data(), wire);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result type for Triggerware client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Invalid JSON was received
pub const PARSE_ERROR: i32 = -32700;
/// The JSON sent is not a valid request object
pub const INVALID_REQUEST: i32 = -32600;
/// The method does not exist or is not available
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameters
pub const INVALID_PARAMS: i32 = -32602;
/// Internal JSON-RPC error
pub const INTERNAL_ERROR: i32 = -32603;
/// Generic server-side failure
pub const SERVER_ERROR: i32 = -32000;

/// Crate-wide error type
///
/// The protocol variants hold the wire `message` and `data` verbatim, so
/// converting a received error object into an `Error` and back reproduces
/// the same object.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Peer could not parse a document (-32700)
    #[error("[-32700] {message}")]
    Parse { message: String, data: Option<Value> },

    /// Document was valid JSON but not a valid request (-32600)
    #[error("[-32600] {message}")]
    InvalidRequest { message: String, data: Option<Value> },

    /// No handler registered under the requested name (-32601)
    #[error("[-32601] {message}")]
    MethodNotFound { message: String, data: Option<Value> },

    /// Handler rejected its parameters (-32602)
    #[error("[-32602] {message}")]
    InvalidParams { message: String, data: Option<Value> },

    /// Unexpected failure while handling a call (-32603)
    #[error("[-32603] {message}")]
    Internal { message: String, data: Option<Value> },

    /// Server-side failure (-32000), e.g. a query that did not compile
    #[error("[-32000] {message}")]
    Server { message: String, data: Option<Value> },

    /// Error object whose code is none of the known kinds
    #[error("JSON-RPC error: {0}")]
    Unranked(JsonRpcErrorData),

    /// Conversion between Rust types and JSON failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stream read or write failed
    #[error("IO error: {0}")]
    Io(String),

    /// The connection is closed; pending calls are rejected with this
    #[error("Connection closed")]
    ConnectionClosed,

    /// `call`/`notify` used before `connect`
    #[error("Not connected")]
    NotConnected,

    /// Positional index used on a named statement, or the other way around
    #[error("Wrong parameter addressing: {0}")]
    WrongAddressingMode(String),

    /// Parameter index or name outside the statement's input signature
    #[error("Parameter out of range: {0}")]
    ParameterOutOfRange(String),

    /// Bound value does not satisfy the declared parameter type
    #[error("Type mismatch for parameter {parameter}: expected {expected}, got {value}")]
    TypeMismatch {
        /// Parameter name from the input signature
        parameter: String,
        /// Declared type name
        expected: String,
        /// Rejected value
        value: serde_json::Value,
    },

    /// Polled-query schedule failed validation
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Operation not allowed in the current state (subscriptions, batches, connection)
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse { message: message.into(), data: None }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Error::InvalidRequest { message: message.into(), data: None }
    }

    pub fn method_not_found(message: impl Into<String>) -> Self {
        Error::MethodNotFound { message: message.into(), data: None }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Error::InvalidParams { message: message.into(), data: None }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal { message: message.into(), data: None }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Error::Server { message: message.into(), data: None }
    }

    /// Numeric code for protocol errors, `None` for local errors
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Parse { .. } => Some(PARSE_ERROR),
            Error::InvalidRequest { .. } => Some(INVALID_REQUEST),
            Error::MethodNotFound { .. } => Some(METHOD_NOT_FOUND),
            Error::InvalidParams { .. } => Some(INVALID_PARAMS),
            Error::Internal { .. } => Some(INTERNAL_ERROR),
            Error::Server { .. } => Some(SERVER_ERROR),
            Error::Unranked(data) => Some(data.code),
            _ => None,
        }
    }

    /// True for errors that came from, or can go to, the wire
    pub fn is_protocol(&self) -> bool {
        self.code().is_some()
    }

    /// The `data` member of a protocol error, when the peer sent one
    pub fn data(&self) -> Option<&Value> {
        match self {
            Error::Parse { data, .. }
            | Error::InvalidRequest { data, .. }
            | Error::MethodNotFound { data, .. }
            | Error::InvalidParams { data, .. }
            | Error::Internal { data, .. }
            | Error::Server { data, .. } => data.as_ref(),
            Error::Unranked(error) => error.data.as_ref(),
            _ => None,
        }
    }

    /// Convert into a wire error object
    ///
    /// Local errors have no code of their own and are reported as internal
    /// errors carrying their display text.
    pub fn to_error_data(&self) -> JsonRpcErrorData {
        let (message, data) = match self {
            Error::Parse { message, data }
            | Error::InvalidRequest { message, data }
            | Error::MethodNotFound { message, data }
            | Error::InvalidParams { message, data }
            | Error::Internal { message, data }
            | Error::Server { message, data } => (message, data),
            Error::Unranked(error) => return error.clone(),
            other => return JsonRpcErrorData::internal_error(other.to_string()),
        };

        JsonRpcErrorData {
            code: self.code().unwrap_or(INTERNAL_ERROR),
            message: message.clone(),
            data: data.clone(),
        }
    }
}

impl From<JsonRpcErrorData> for Error {
    fn from(error: JsonRpcErrorData) -> Self {
        let JsonRpcErrorData { code, message, data } = error;
        match code {
            PARSE_ERROR => Error::Parse { message, data },
            INVALID_REQUEST => Error::InvalidRequest { message, data },
            METHOD_NOT_FOUND => Error::MethodNotFound { message, data },
            INVALID_PARAMS => Error::InvalidParams { message, data },
            INTERNAL_ERROR => Error::Internal { message, data },
            SERVER_ERROR => Error::Server { message, data },
            _ => Error::Unranked(JsonRpcErrorData { code, message, data }),
        }
    }
}

impl From<&Error> for JsonRpcErrorData {
    fn from(error: &Error) -> Self {
        error.to_error_data()
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

/// JSON-RPC 2.0 error object
///
/// Appears in the `error` field of a response. `code` and `message` are
/// required; `data` is optional and omitted from the encoding when absent.
///
/// ```rust
/// use triggerware_core::JsonRpcErrorData;
/// use serde_json::json;
///
/// let error = JsonRpcErrorData::with_data(-32000, "query failed", json!({"line": 3}));
/// assert_eq!(error.to_string(), "[-32000] query failed");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    /// Numeric error code
    pub code: i32,

    /// Short description of the error
    pub message: String,

    /// Optional additional information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Create an error object with code and message
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create an error object carrying additional data
    pub fn with_data(code: i32, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Parse error (-32700)
    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    /// Invalid request (-32600)
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, msg)
    }

    /// Method not found (-32601)
    ///
    /// ```rust
    /// use triggerware_core::JsonRpcErrorData;
    ///
    /// let error = JsonRpcErrorData::method_not_found("sub3");
    /// assert_eq!(error.message, "Method not found: sub3");
    /// ```
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method.into()))
    }

    /// Invalid params (-32602)
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, msg)
    }

    /// Internal error (-32603)
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, msg)
    }

    /// Server error (-32000)
    pub fn server_error(msg: impl Into<String>) -> Self {
        Self::new(SERVER_ERROR, msg)
    }
}

impl std::fmt::Display for JsonRpcErrorData {
    /// Formats as "[code] message"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcErrorData {}
