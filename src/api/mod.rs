//! HTTP clients for the task service and the local inference service.

pub mod llm;
pub mod task;

use reqwest::StatusCode;

/// Failure talking to a remote service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Connection, timeout or body transfer error.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-2xx response whose body could not be interpreted.
    #[error("HTTP status {status} error: {body}")]
    Status { status: StatusCode, body: String },
    /// The requested task does not exist.
    #[error("task not found: {0}")]
    NotFound(String),
    /// Response body was not the expected JSON.
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    /// Local file could not be read for upload.
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Convert non-2xx responses into a structured error.
async fn ensure_success(resp: reqwest::Response) -> ApiResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_else(|_| "".into());
    Err(ApiError::Status { status, body })
}

/// Decode a JSON body that the service sends for both success and failure.
///
/// The inference service answers failed calls with a 5xx status *and* a
/// `{"success": false, "error": ...}` body, so the status alone is not an error.
async fn decode_any_status<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> ApiResult<T> {
    let status = resp.status();
    let body = resp.text().await?;
    decode_body(status, &body)
}

/// Status-aware JSON decode: an unreadable body is a status error on non-2xx.
fn decode_body<T: serde::de::DeserializeOwned>(status: StatusCode, body: &str) -> ApiResult<T> {
    match serde_json::from_str::<T>(body) {
        Ok(v) => Ok(v),
        Err(_) if !status.is_success() => Err(ApiError::Status {
            status,
            body: body.to_string(),
        }),
        Err(e) => Err(ApiError::Decode(e)),
    }
}

/// Join a base url and a path without doubling or dropping the slash.
fn join(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_normalizes_slashes() {
        assert_eq!(join("http://h/api/", "/health"), "http://h/api/health");
        assert_eq!(join("http://h/api", "health"), "http://h/api/health");
        assert_eq!(join("http://h/api/", ""), "http://h/api");
    }

    #[test]
    fn status_error_message_includes_body() {
        let e = ApiError::Status {
            status: StatusCode::BAD_GATEWAY,
            body: "upstream down".into(),
        };
        assert_eq!(e.to_string(), "HTTP status 502 Bad Gateway error: upstream down");
    }

    #[derive(Debug, serde::Deserialize)]
    struct Reply {
        success: bool,
        error: Option<String>,
    }

    #[test]
    fn failure_body_on_server_error_is_decoded() {
        let body = r#"{"success":false,"error":"model crashed"}"#;
        let r: Reply = decode_body(StatusCode::INTERNAL_SERVER_ERROR, body).unwrap();
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("model crashed"));
    }

    #[test]
    fn unreadable_error_body_becomes_status_error() {
        let err = decode_body::<Reply>(StatusCode::BAD_GATEWAY, "<html>down</html>").unwrap_err();
        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(body, "<html>down</html>");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn unreadable_success_body_becomes_decode_error() {
        let err = decode_body::<Reply>(StatusCode::OK, "not json").unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }
}
