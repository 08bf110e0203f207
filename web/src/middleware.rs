//! Request tracing middleware.
//!
//! Every request gets a trace id: the one the caller sent in `X-Trace-ID`
//! when it is a valid UUID, a fresh one otherwise. The id is stored in the
//! request extensions, recorded on the request span, and echoed back in the
//! response header so gateway logs and ours can be joined.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware::from_fn};
//! use callback_correlation_web::middleware::trace_id;
//!
//! let app = Router::new()
//!     .route("/health", get(health_check))
//!     .layer(from_fn(trace_id));
//! ```

use axum::{extract::Request, middleware::Next, response::Response};
use http::HeaderValue;
use tracing::Instrument;
use uuid::Uuid;

/// Header carrying the trace id.
pub const TRACE_ID_HEADER: &str = "X-Trace-ID";

/// Trace id of the current request, available as an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceId(pub Uuid);

/// Attach a trace id to the request, its span and its response.
pub async fn trace_id(mut req: Request, next: Next) -> Response {
    let trace_id = req
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    req.extensions_mut().insert(TraceId(trace_id));

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        uri = %req.uri(),
    );

    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&trace_id.to_string()) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use axum::{body::Body, middleware::from_fn, routing::get, Extension, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/test",
                get(|Extension(TraceId(id)): Extension<TraceId>| async move { id.to_string() }),
            )
            .layer(from_fn(trace_id))
    }

    #[tokio::test]
    async fn generates_trace_id_when_missing() {
        let response = app()
            .oneshot(http::Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let header = response
            .headers()
            .get(TRACE_ID_HEADER)
            .expect("Trace id header should be present");
        assert!(Uuid::parse_str(header.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn preserves_caller_trace_id() {
        let id = Uuid::new_v4();
        let response = app()
            .oneshot(
                http::Request::builder()
                    .uri("/test")
                    .header(TRACE_ID_HEADER, id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[TRACE_ID_HEADER], id.to_string().as_str());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, id.to_string().as_bytes());
    }

    #[tokio::test]
    async fn replaces_invalid_trace_id() {
        let response = app()
            .oneshot(
                http::Request::builder()
                    .uri("/test")
                    .header(TRACE_ID_HEADER, "not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let header = response.headers()[TRACE_ID_HEADER].to_str().unwrap();
        assert_ne!(header, "not-a-uuid");
        assert!(Uuid::parse_str(header).is_ok());
    }
}
