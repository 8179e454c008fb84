use std::sync::Arc;
use tokio::sync::RwLock;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

/// Shared secret the chat gateway presents on every request.
///
/// When `token` is `None` the middleware is a transparent no-op.
#[derive(Debug, Clone, Default)]
pub struct GatewayAuth {
    pub token: Option<String>,
}

impl GatewayAuth {
    pub fn none() -> Self {
        Self { token: None }
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }
}

/// Axum middleware requiring `Authorization: Bearer <token>` when a gateway
/// token is configured. The token is re-read on every request so a settings
/// reload takes effect immediately.
pub async fn auth_middleware(
    State(config): State<Arc<RwLock<GatewayAuth>>>,
    req: Request,
    next: Next,
) -> Response {
    let token = config.read().await.token.clone();
    let Some(token) = token else {
        return next.run(req).await;
    };

    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    if presented == Some(token.as_str()) {
        return next.run(req).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "missing or invalid gateway token" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, middleware, routing::get, Router};
    use tower::ServiceExt;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    fn test_app(config: GatewayAuth) -> Router {
        let arc = Arc::new(RwLock::new(config));
        Router::new()
            .route("/api/health", get(ok_handler))
            .layer(middleware::from_fn_with_state(arc, auth_middleware))
    }

    fn request(auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/health");
        if let Some(value) = auth {
            builder = builder.header("authorization", value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn no_token_passes_through() {
        let resp = test_app(GatewayAuth::none())
            .oneshot(request(None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn valid_bearer_passes_through() {
        let resp = test_app(GatewayAuth::with_token("secret"))
            .oneshot(request(Some("Bearer secret")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_header_is_401() {
        let resp = test_app(GatewayAuth::with_token("secret"))
            .oneshot(request(None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_token_is_401() {
        let resp = test_app(GatewayAuth::with_token("secret"))
            .oneshot(request(Some("Bearer nope")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn basic_scheme_is_rejected() {
        let resp = test_app(GatewayAuth::with_token("secret"))
            .oneshot(request(Some("Basic secret")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
