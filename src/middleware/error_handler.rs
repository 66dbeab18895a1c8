use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tracing::error;

/// Logs the method, path and status of every 5xx response. The cause is
/// logged where the error is turned into a response.
pub async fn log_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;

    if response.status().is_server_error() {
        error!("Server error on {} {} - Status: {}", method, path, response.status());
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::to_bytes, http::StatusCode, routing::get};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/boom", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "db down") }))
            .route("/fine", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(log_errors))
    }

    async fn body_of(uri: &str) -> (StatusCode, String) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), 1024).await.unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn server_error_response_is_left_intact() {
        assert_eq!(
            body_of("/boom").await,
            (StatusCode::INTERNAL_SERVER_ERROR, "db down".to_string())
        );
    }

    #[tokio::test]
    async fn other_responses_pass_through() {
        assert_eq!(body_of("/fine").await, (StatusCode::OK, "ok".to_string()));
    }
}
