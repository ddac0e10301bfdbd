use super::ProviderError;
use crate::resolution::{truncate_chars, MAX_REASON_CHARS};
use serde_json::Value;
use tracing::trace;

const SCRIPT_KEYS: &[&str] = &["loadstring", "script", "code"];
const DESTINATION_KEYS: &[&str] = &["destination", "result", "bypassed_url", "url"];
const ERROR_KEYS: &[&str] = &["message", "error"];

/// What a provider body says, once a shape matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum ProviderReply {
    Payload(String),
    Error(String),
    Unsupported(String),
}

type ShapeDecoder = fn(&Value) -> Option<ProviderReply>;

/// Known response layouts, tried in order. Adding a provider format means
/// appending one decoder.
const RESPONSE_SHAPES: &[(&str, ShapeDecoder)] = &[
    ("status_envelope", decode_status_envelope),
    ("script_fields", decode_script_fields),
    ("destination_fields", decode_destination_fields),
    ("error_fields", decode_error_fields),
];

/// Decode a 200 body into a reply.
pub(super) fn decode_body(body: &str) -> Result<ProviderReply, ProviderError> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        ProviderError::Malformed(format!("{e}: {}", truncate_chars(body.trim(), MAX_REASON_CHARS)))
    })?;

    for (shape, decode) in RESPONSE_SHAPES {
        if let Some(reply) = decode(&value) {
            trace!(shape = *shape, "Provider response shape matched");
            return Ok(reply);
        }
    }

    Err(ProviderError::EmptyResult(truncate_chars(
        &value.to_string(),
        MAX_REASON_CHARS,
    )))
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn first_string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(non_empty_str))
}

fn error_reply(message: String) -> ProviderReply {
    let lower = message.to_lowercase();
    if lower.contains("not supported") || lower.contains("unsupported") {
        ProviderReply::Unsupported(message)
    } else {
        ProviderReply::Error(message)
    }
}

/// `{"status": "success", "result": ["payload", "url"] | "payload"}` or
/// `{"status": "error" | "fail", "message": "..."}`
fn decode_status_envelope(value: &Value) -> Option<ProviderReply> {
    let status = value.get("status")?.as_str()?.to_lowercase();

    match status.as_str() {
        "success" => {
            let result = value.get("result")?;
            let payload = match result {
                Value::Array(items) => items.iter().find_map(non_empty_str),
                other => non_empty_str(other),
            }?;
            Some(ProviderReply::Payload(payload))
        }
        "error" | "fail" | "failed" => {
            let message = first_string_field(value, ERROR_KEYS)
                .unwrap_or_else(|| format!("provider reported status '{status}'"));
            Some(error_reply(message))
        }
        _ => None,
    }
}

fn decode_script_fields(value: &Value) -> Option<ProviderReply> {
    first_string_field(value, SCRIPT_KEYS).map(ProviderReply::Payload)
}

fn decode_destination_fields(value: &Value) -> Option<ProviderReply> {
    first_string_field(value, DESTINATION_KEYS).map(ProviderReply::Payload)
}

fn decode_error_fields(value: &Value) -> Option<ProviderReply> {
    first_string_field(value, ERROR_KEYS).map(error_reply)
}
