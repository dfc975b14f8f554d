//! HTTP rendering of [`longjob_core::Error`].
//!
//! Every error leaving a handler is an [`ApiError`], rendered as a JSON object
//! `{ "error": <message>, "code": <status> }`.
//!
//! | Error              | Status                      |
//! |--------------------|-----------------------------|
//! | `InvalidArgument`  | 400 Bad Request             |
//! | `InvalidRequest`   | 400 Bad Request             |
//! | `JobNotFound`      | 404 Not Found               |
//! | `RequestCancelled` | 499 Client Closed Request   |
//! | `ChannelError`     | 500 Internal Server Error   |
//! | `ServiceShutdown`  | 503 Service Unavailable     |

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use longjob_core::Error;
use serde::Serialize;

/// Non-standard status used when the client went away mid-request.
const CLIENT_CLOSED_REQUEST: u16 = 499;

#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    code: u16,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub const fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidArgument { reason } | Error::InvalidRequest { reason } => {
                Self::bad_request(reason)
            }
            Error::JobNotFound { .. } => {
                Self::new(StatusCode::NOT_FOUND, "Job not found or already completed.")
            }
            Error::RequestCancelled => Self::new(
                StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST),
                "Request was cancelled by the client.",
            ),
            Error::ChannelError { context } => {
                tracing::error!(%context, "Internal channel failure");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Channel error: {context}"),
                )
            }
            Error::ServiceShutdown => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "Service is shutting down")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: &self.message,
            code: self.status.as_u16(),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use longjob_core::JobId;

    #[test]
    fn statuses_follow_the_error_taxonomy() {
        let cases = [
            (Error::InvalidRequest { reason: "x".into() }, 400),
            (Error::InvalidArgument { reason: "x".into() }, 400),
            (Error::JobNotFound { job_id: JobId::generate() }, 404),
            (Error::RequestCancelled, 499),
            (Error::ChannelError { context: "x".into() }, 500),
            (Error::ServiceShutdown, 503),
        ];
        for (err, code) in cases {
            assert_eq!(ApiError::from(err.clone()).status().as_u16(), code, "{err}");
        }
    }

    #[tokio::test]
    async fn renders_a_json_object() {
        let response = ApiError::bad_request("Text is required.").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Text is required.");
        assert_eq!(json["code"], 400);
    }
}
