use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::error::{ApiError, with_internal_detail};

/// Extract and validate JWT from Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized("Missing bearer token"))?;

    let claims = state
        .tokens
        .verify(token)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token"))?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Development mode only: put the cause of a 500 into the response body.
pub async fn render_internal_detail(
    State(development): State<bool>,
    req: Request,
    next: Next,
) -> Response {
    let response = next.run(req).await;
    if development {
        with_internal_detail(response)
    } else {
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::StatusCode, middleware::from_fn_with_state, routing::get};
    use tower::ServiceExt;

    async fn failing() -> Result<(), ApiError> {
        Err(ApiError::Internal(anyhow::anyhow!("database is locked")))
    }

    async fn body_for(development: bool) -> (StatusCode, serde_json::Value) {
        let app = Router::new()
            .route("/fail", get(failing))
            .layer(from_fn_with_state(development, render_internal_detail));
        let response = app
            .oneshot(axum::http::Request::get("/fail").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn production_hides_internal_cause() {
        let (status, body) = body_for(false).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal_error");
        assert!(body.get("details").is_none());
        assert!(!body.to_string().contains("database is locked"));
    }

    #[tokio::test]
    async fn development_shows_internal_cause() {
        let (status, body) = body_for(true).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["details"][0]["message"], "database is locked");
    }
}
