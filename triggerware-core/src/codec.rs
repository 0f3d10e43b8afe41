//! Encoding, classification and stream decoding of JSON-RPC documents
//!
//! The Triggerware stream carries concatenated JSON documents with no framing:
//! no length prefix, no delimiter, document boundaries are found purely by
//! structural completeness. [`JsonStreamDecoder`] buffers raw bytes and yields
//! each complete top-level value as soon as it has been received, and
//! [`classify`] sorts a value into request, notification or response.
//!
//! # Examples
//!
//! ```rust
//! use triggerware_core::codec::{self, JsonStreamDecoder};
//!
//! let mut decoder = JsonStreamDecoder::new();
//! decoder.push(br#"{"id":0,"result":1}{"id":1,"#);
//!
//! let first = decoder.next_value().unwrap().unwrap();
//! assert!(codec::classify(first).unwrap().is_response());
//! assert!(decoder.next_value().is_none());
//!
//! decoder.push(br#""result":2}"#);
//! assert!(decoder.next_value().is_some());
//! ```

use crate::error::{Error, Result};
use crate::types::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use serde::Serialize;
use serde_json::Value;

/// Encode any serializable document to a JSON string
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

pub fn encode_request(req: &JsonRpcRequest) -> Result<String> {
    encode(req)
}

pub fn encode_notification(notif: &JsonRpcNotification) -> Result<String> {
    encode(notif)
}

pub fn encode_response(resp: &JsonRpcResponse) -> Result<String> {
    encode(resp)
}

/// Classify a decoded value by shape
///
/// - object with a string `method` and a non-null `id`: request
/// - object with a string `method` and no (or null) `id`: notification
/// - any other object: response
///
/// Non-objects and objects whose members have the wrong types are rejected
/// with `Error::InvalidRequest`.
pub fn classify(value: Value) -> Result<JsonRpcMessage> {
    let obj = match value.as_object() {
        Some(obj) => obj,
        None => {
            return Err(Error::invalid_request(format!(
                "Expected a JSON object, got {}",
                value
            )))
        }
    };

    if obj.contains_key("method") {
        let has_id = obj.get("id").map(|id| !id.is_null()).unwrap_or(false);
        if has_id {
            serde_json::from_value(value)
                .map(JsonRpcMessage::Request)
                .map_err(|e| Error::invalid_request(format!("Malformed request: {}", e)))
        } else {
            serde_json::from_value(value)
                .map(JsonRpcMessage::Notification)
                .map_err(|e| Error::invalid_request(format!("Malformed notification: {}", e)))
        }
    } else {
        serde_json::from_value(value)
            .map(JsonRpcMessage::Response)
            .map_err(|e| Error::invalid_request(format!("Malformed response: {}", e)))
    }
}

/// Decode and classify one complete document
pub fn decode(data: &str) -> Result<JsonRpcMessage> {
    let value: Value = serde_json::from_str(data).map_err(|e| Error::parse(e.to_string()))?;
    classify(value)
}

/// Incremental decoder for concatenated JSON documents
///
/// Bytes are appended with [`push`](Self::push) as they arrive from the
/// stream; [`next_value`](Self::next_value) returns the next complete value,
/// `None` when the buffer holds only a partial document (or nothing), and a
/// parse error when the buffered bytes can never form valid JSON. After a
/// parse error the buffered bytes are discarded, since there is no framing to
/// resynchronize on.
///
/// Objects and arrays are delimited by a bracket scan that resumes where the
/// previous call stopped, so a document split over many reads is scanned once
/// and parsed once. Top-level scalars have no closing delimiter and are
/// handed to `serde_json` directly.
#[derive(Debug, Default)]
pub struct JsonStreamDecoder {
    buf: Vec<u8>,
    scan: Scan,
}

/// Progress through the document at the front of the buffer
#[derive(Debug, Default, Clone, Copy)]
struct Scan {
    /// Bytes already examined
    offset: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl JsonStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes buffered but not yet decoded
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete value, if one is buffered
    pub fn next_value(&mut self) -> Option<Result<Value>> {
        if self.scan.offset == 0 {
            match self.buf.iter().position(|b| !b.is_ascii_whitespace()) {
                Some(start) => {
                    self.buf.drain(..start);
                }
                None => {
                    self.buf.clear();
                    return None;
                }
            }
        }

        match self.buf[0] {
            b'{' | b'[' => {
                let end = self.find_end()?;
                let parsed = serde_json::from_slice::<Value>(&self.buf[..end]);
                self.scan = Scan::default();
                match parsed {
                    Ok(value) => {
                        self.buf.drain(..end);
                        Some(Ok(value))
                    }
                    Err(e) => self.discard(e),
                }
            }
            _ => self.next_scalar(),
        }
    }

    /// Length of the container at the front of the buffer, once it is complete
    fn find_end(&mut self) -> Option<usize> {
        let mut scan = self.scan;
        let mut end = None;

        for (i, &byte) in self.buf.iter().enumerate().skip(scan.offset) {
            if scan.in_string {
                match byte {
                    _ if scan.escaped => scan.escaped = false,
                    b'\\' => scan.escaped = true,
                    b'"' => scan.in_string = false,
                    _ => {}
                }
                continue;
            }
            match byte {
                b'"' => scan.in_string = true,
                b'{' | b'[' => scan.depth += 1,
                b'}' | b']' => {
                    scan.depth = scan.depth.saturating_sub(1);
                    if scan.depth == 0 {
                        end = Some(i + 1);
                        break;
                    }
                }
                _ => {}
            }
        }

        if end.is_none() {
            scan.offset = self.buf.len();
        }
        self.scan = scan;
        end
    }

    fn next_scalar(&mut self) -> Option<Result<Value>> {
        let (item, consumed) = {
            let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
            let item = stream.next();
            (item, stream.byte_offset())
        };

        match item {
            Some(Ok(value)) => {
                self.buf.drain(..consumed);
                Some(Ok(value))
            }
            Some(Err(e)) if e.is_eof() => None,
            Some(Err(e)) => self.discard(e),
            None => None,
        }
    }

    fn discard(&mut self, e: serde_json::Error) -> Option<Result<Value>> {
        self.buf.clear();
        self.scan = Scan::default();
        Some(Err(Error::parse(e.to_string())))
    }
}
