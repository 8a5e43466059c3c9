use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::ApiError;

pub(crate) fn agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

/// Send a body-less request and map failures into [`ApiError`].
pub(crate) fn call(request: ureq::Request) -> Result<ureq::Response, ApiError> {
    request.call().map_err(map_error)
}

pub(crate) fn send_json(
    request: ureq::Request,
    body: &serde_json::Value,
) -> Result<ureq::Response, ApiError> {
    request.send_json(body).map_err(map_error)
}

pub(crate) fn read_json<T: DeserializeOwned>(response: ureq::Response) -> Result<T, ApiError> {
    response.into_json::<T>().map_err(|err| ApiError::Decode(err.to_string()))
}

fn map_error(err: ureq::Error) -> ApiError {
    match err {
        ureq::Error::Status(status, response) => {
            let message = response.into_string().ok().and_then(|body| upstream_message(&body));
            ApiError::Upstream { status, message }
        }
        ureq::Error::Transport(transport) => {
            let detail = transport.to_string();
            if transport.kind() == ureq::ErrorKind::Io && detail.contains("timed out") {
                ApiError::Timeout(detail)
            } else {
                ApiError::Network(detail)
            }
        }
    }
}

/// Pull a human-readable message out of an error body. Handles Airtable's
/// `{"error":{"message"}}`, `{"error":"..."}` and PostgREST's `{"message"}`.
pub(crate) fn upstream_message(body: &str) -> Option<String> {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => {
            let trimmed = body.trim();
            return (!trimmed.is_empty()).then(|| trimmed.chars().take(200).collect());
        }
    };
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .or_else(|| value.get("error"))
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_messages_from_known_error_shapes() {
        assert_eq!(
            upstream_message(r#"{"error":{"type":"INVALID_FILTER","message":"Unknown field"}}"#),
            Some("Unknown field".to_string())
        );
        assert_eq!(
            upstream_message(r#"{"code":"42P01","message":"relation does not exist"}"#),
            Some("relation does not exist".to_string())
        );
        assert_eq!(upstream_message(r#"{"error":"NOT_FOUND"}"#), Some("NOT_FOUND".to_string()));
        assert_eq!(upstream_message("Bad Gateway"), Some("Bad Gateway".to_string()));
        assert_eq!(upstream_message(""), None);
        assert_eq!(upstream_message(r#"{"status":500}"#), None);
    }
}
