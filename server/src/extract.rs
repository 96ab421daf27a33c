//! Extractors whose rejections use the JSON error body.
//!
//! Drop-in replacements for axum's `Json`, `Query` and `Path`. A request the
//! handler never sees still answers with `{code, message}`.

use crate::error::AppError;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts};

/// JSON request body
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Query string
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Path parameters
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            // Well-formed JSON of the wrong shape.
            JsonRejection::JsonDataError(err) => Self::validation(err.body_text()),
            other => Self::bad_request(other.body_text()),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode, header};
    use axum::{Router, body::Body, routing::post};
    use serde::Deserialize;
    use topout_scoring::api::ErrorBody;
    use tower::ServiceExt;

    #[derive(Debug, Deserialize)]
    struct Tap {
        boulder: u32,
    }

    fn app() -> Router {
        Router::new().route(
            "/taps/:judge",
            post(|ApiPath(judge): ApiPath<u32>, ApiJson(tap): ApiJson<Tap>| async move {
                format!("{judge}:{}", tap.boulder)
            }),
        )
    }

    async fn send(uri: &str, body: &'static str) -> (StatusCode, ErrorBody) {
        let response = app()
            .oneshot(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn malformed_json_gets_error_body() {
        let (status, body) = send("/taps/1", "{\"boulder\":").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "BAD_REQUEST");
        assert!(!body.message.is_empty());
    }

    #[tokio::test]
    async fn wrong_shape_is_a_validation_error() {
        let (status, body) = send("/taps/1", "{\"boulder\":\"two\"}").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.code, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn bad_path_parameter_gets_error_body() {
        let (status, body) = send("/taps/judge-3", "{\"boulder\":2}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "BAD_REQUEST");
    }
}
