//! Translation of REST responses into values and typed errors.

use std::sync::LazyLock;

use campus_domain::{ApiResponse, ValidationErrors};
use regex::Regex;
use serde_json::Value;

use crate::error::{ApplicationError, ApplicationResult};

/// Fields a conflict message may name in prose ("email already exists").
static FIELD_IN_MESSAGE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(email|username|user name|phone|code|slug|title|name)\b[^.;]*?\b(already|taken|in use|exists|duplicate)",
    )
    .ok()
});

/// Interprets a response that is not a 401 on a protected call.
///
/// # Errors
///
/// Returns the error matching the status; see [`error_for_status`].
pub fn interpret(response: &ApiResponse) -> ApplicationResult<Value> {
    if response.is_success() {
        return response
            .json_body()
            .map_err(|e| ApplicationError::Decode(e.to_string()));
    }
    Err(error_for_status(response))
}

/// Maps a non-2xx response to its error.
#[must_use]
pub fn error_for_status(response: &ApiResponse) -> ApplicationError {
    let body = response.json_body().unwrap_or(Value::Null);
    let message = message_of(&body).unwrap_or_else(|| default_message(response.status));

    match response.status {
        401 | 400 | 409 | 422 => ApplicationError::RemoteConflict {
            fields: conflict_fields(&body, &message),
            message,
        },
        403 => ApplicationError::Forbidden(message),
        404 => ApplicationError::NotFound(message),
        429 => ApplicationError::RateLimited {
            retry_after_secs: retry_after(&body, response),
        },
        status if status >= 500 => ApplicationError::ServerError { status, message },
        status => ApplicationError::RemoteConflict {
            message: format!("{message} (status {status})"),
            fields: ValidationErrors::new(),
        },
    }
}

fn default_message(status: u16) -> String {
    format!("request failed with status {status}")
}

fn message_of(body: &Value) -> Option<String> {
    ["message", "error", "detail"]
        .iter()
        .find_map(|field| body.get(*field).and_then(Value::as_str))
        .map(str::to_string)
}

/// Seconds to wait, from a `retryAfter` body field or a `Retry-After` header.
fn retry_after(body: &Value, response: &ApiResponse) -> Option<u64> {
    let from_body = body.get("retryAfter").and_then(|v| match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(seconds_ceil)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });
    from_body.or_else(|| {
        response
            .header("retry-after")
            .and_then(|h| h.trim().parse().ok())
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn seconds_ceil(secs: f64) -> u64 {
    secs.ceil() as u64
}

/// Field errors from `{errors: {field: msg}}`, `{errors: [{field, message}]}`
/// or, failing both, a message naming a known field.
fn conflict_fields(body: &Value, message: &str) -> ValidationErrors {
    let mut fields = ValidationErrors::new();
    match body.get("errors") {
        Some(Value::Object(map)) => {
            for (field, value) in map {
                if let Some(text) = first_text(value) {
                    fields.add(field.clone(), text);
                }
            }
        }
        Some(Value::Array(items)) => {
            for item in items {
                let field = ["field", "path", "param"]
                    .iter()
                    .find_map(|k| item.get(*k).and_then(Value::as_str));
                let text = ["message", "msg"]
                    .iter()
                    .find_map(|k| item.get(*k).and_then(Value::as_str));
                if let (Some(field), Some(text)) = (field, text) {
                    fields.add(field, text);
                }
            }
        }
        _ => {}
    }

    if fields.is_empty()
        && let Some(captures) = FIELD_IN_MESSAGE.as_ref().and_then(|re| re.captures(message))
        && let Some(field) = captures.get(1)
    {
        let field = field.as_str().to_ascii_lowercase().replace(' ', "");
        fields.add(field, message);
    }
    fields
}

fn first_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_text),
        Value::Object(map) => map.get("message").and_then(first_text),
        _ => None,
    }
}
