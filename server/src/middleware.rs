//! Request tracking.
//!
//! Every request gets a request id, read from `X-Request-ID` when the client
//! sent a valid UUID and generated otherwise. The id is stored in the request
//! extensions as [`RequestId`], recorded on the request's tracing span and
//! echoed back in the response header.

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use metrics::counter;
use tracing::Instrument;
use uuid::Uuid;

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Request id of the current request.
///
/// Handlers can take it with `Extension<RequestId>` once [`track_request`]
/// is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub Uuid);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Tag the request with a [`RequestId`], run it inside a span and count it
/// by status.
///
/// Install with `axum::middleware::from_fn(track_request)`.
pub async fn track_request(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .map_or_else(|| RequestId(Uuid::new_v4()), RequestId);
    req.extensions_mut().insert(id);

    let span = tracing::info_span!(
        "http_request",
        request_id = %id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    let mut response = next.run(req).instrument(span).await;

    counter!("http.requests.total", "status" => response.status().as_u16().to_string())
        .increment(1);
    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{Extension, Router, body::Body, http::Request, middleware, routing::get};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/echo", get(|Extension(id): Extension<RequestId>| async move { id.to_string() }))
            .layer(middleware::from_fn(track_request))
    }

    fn header(response: &Response) -> String {
        response.headers()[REQUEST_ID_HEADER].to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn generated_when_missing() {
        let response = app()
            .oneshot(Request::builder().uri("/echo").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(Uuid::parse_str(&header(&response)).is_ok());
    }

    #[tokio::test]
    async fn client_id_is_kept_and_visible_to_handlers() {
        let sent = Uuid::new_v4();
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/echo")
                    .header(REQUEST_ID_HEADER, sent.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(header(&response), sent.to_string());
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(body, sent.to_string().as_bytes());
    }

    #[tokio::test]
    async fn malformed_id_is_replaced() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/echo")
                    .header(REQUEST_ID_HEADER, "judge-3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let id = header(&response);
        assert_ne!(id, "judge-3");
        assert!(Uuid::parse_str(&id).is_ok());
    }
}
