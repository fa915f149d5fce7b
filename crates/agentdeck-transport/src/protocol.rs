//! Wire decoding for HTTP bodies and inbound channel frames.

use agentdeck_core::ClientError;
use serde_json::Value;

/// Decode a response body. An empty body decodes to `null`.
///
/// # Errors
/// Returns `Protocol` if the body is not JSON.
pub fn decode_body(body: &str) -> Result<Value, ClientError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| ClientError::Protocol(format!("invalid JSON body: {e}")))
}

/// Decode one inbound text frame.
///
/// Frames carry the same shape as a direct answer from the ask call, so
/// anything other than a JSON object is rejected.
///
/// # Errors
/// Returns `Protocol` if the frame is not a JSON object.
pub fn decode_frame(text: &str) -> Result<Value, ClientError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ClientError::Protocol(format!("invalid frame: {e}")))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(ClientError::Protocol(format!("frame is not an object: {value}")))
    }
}

/// Decode one inbound binary frame as UTF-8 text.
///
/// # Errors
/// Returns `Protocol` if the bytes are not UTF-8 or not a JSON object.
pub fn decode_binary_frame(data: &[u8]) -> Result<Value, ClientError> {
    let text = std::str::from_utf8(data)
        .map_err(|e| ClientError::Protocol(format!("binary frame is not UTF-8: {e}")))?;
    decode_frame(text)
}
