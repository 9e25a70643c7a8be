//!
//! Envelope normalization
//! ----------------------
//! The admin API wraps its answers inconsistently: the success flag, message and
//! payload may sit at the root, under `data`, or up to three more levels down, and
//! key casing varies between endpoints (`success`/`isSuccess`/`IsSuccess`,
//! `data`/`Data`/`value`/`Value`/`list`, ...).
//!
//! Normalization works on an ordered list of layers. The root object is layer 0
//! and each further layer is the first non-null `data`/`value`/`list`-like member
//! of the previous one, as long as that member is itself an object. Field lookups
//! then scan the layers deepest-first, so whichever layer carries the real payload
//! wins and the result is deterministic.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ApiError, ApiResult, INVALID_RESPONSE, OPERATION_FAILED, OPERATION_SUCCEEDED};

/// Maximum number of layers considered, root included.
pub const MAX_DEPTH: usize = 4;

const SUCCESS_KEYS: &[&str] = &["success", "Success", "isSuccess", "IsSuccess"];
const MESSAGE_KEYS: &[&str] = &["message", "Message"];
const ERROR_MESSAGE_KEYS: &[&str] = &["message", "Message", "title", "Title"];
const DETAILS_KEYS: &[&str] = &["details", "Details"];
const TRACE_ID_KEYS: &[&str] = &["traceId", "TraceId"];
const PAYLOAD_KEYS: &[&str] = &["value", "Value", "data", "Data", "list"];
const DESCENT_KEYS: &[&str] = &["data", "Data", "value", "Value", "list"];

/// Canonical `{success, message, data, details, traceId}` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalResult<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    pub details: Option<String>,
    pub trace_id: Option<String>,
}

impl<T> CanonicalResult<T> {
    pub fn invalid() -> Self {
        Self { success: false, message: INVALID_RESPONSE.to_string(), data: None, details: None, trace_id: None }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CanonicalResult<U> {
        CanonicalResult {
            success: self.success,
            message: self.message,
            data: self.data.map(f),
            details: self.details,
            trace_id: self.trace_id,
        }
    }

    /// `Ok(data)` when the server reported success, otherwise the logical error it described.
    pub fn into_result(self) -> ApiResult<Option<T>> {
        if self.success {
            return Ok(self.data);
        }
        let message = if self.message.is_empty() { OPERATION_FAILED.to_string() } else { self.message };
        Err(ApiError::Logical { status: None, message, details: self.details, trace_id: self.trace_id })
    }
}

/// Ordered object layers of an envelope, shallowest first.
fn layers(raw: &Value) -> Vec<&Map<String, Value>> {
    let mut out = Vec::with_capacity(MAX_DEPTH);
    let Value::Object(root) = raw else { return out; };
    out.push(root);
    let mut current = root;
    while out.len() < MAX_DEPTH {
        let next = DESCENT_KEYS
            .iter()
            .filter_map(|k| current.get(*k))
            .find(|v| !v.is_null());
        match next {
            Some(Value::Object(map)) => {
                out.push(map);
                current = map;
            }
            _ => break,
        }
    }
    out
}

fn scan<'a, T>(
    layers: &[&'a Map<String, Value>],
    keys: &[&str],
    pick: impl Fn(&'a Value) -> Option<T>,
) -> Option<T> {
    layers
        .iter()
        .rev()
        .find_map(|layer| keys.iter().filter_map(|k| layer.get(*k)).find_map(&pick))
}

fn as_string(v: &Value) -> Option<String> {
    v.as_str().map(str::to_string)
}

/// Normalize an arbitrary response body. Never fails: malformed input yields
/// `success=false` with [`INVALID_RESPONSE`].
pub fn normalize(raw: &Value) -> CanonicalResult<Value> {
    let layers = layers(raw);
    if layers.is_empty() {
        return CanonicalResult::invalid();
    }

    let success = scan(&layers, SUCCESS_KEYS, Value::as_bool).unwrap_or(false);
    let message = scan(&layers, MESSAGE_KEYS, as_string).unwrap_or_else(|| {
        if success { OPERATION_SUCCEEDED.to_string() } else { OPERATION_FAILED.to_string() }
    });
    let data = scan(&layers, PAYLOAD_KEYS, |v| (!v.is_null()).then(|| v.clone()));
    let details = scan(&layers, DETAILS_KEYS, as_string);
    let trace_id = scan(&layers, TRACE_ID_KEYS, as_string);

    CanonicalResult { success, message, data, details, trace_id }
}

/// Message carried by an error body, if any layer has one.
pub fn error_message(raw: &Value) -> Option<String> {
    let layers = layers(raw);
    scan(&layers, ERROR_MESSAGE_KEYS, as_string).filter(|m| !m.trim().is_empty())
}

/// Deepest layer holding any of `keys`. Used to find token grants that may or
/// may not be wrapped in an envelope.
pub fn find_layer<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Map<String, Value>> {
    layers(raw)
        .into_iter()
        .rev()
        .find(|layer| keys.iter().any(|k| layer.contains_key(*k)))
}
