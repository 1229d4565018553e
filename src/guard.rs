//! Shared-secret check applied to every endpoint.

use crate::error::{GatewayError, Result};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// Header carrying the caller's token.
pub const TOKEN_HEADER: &str = "x-token";

#[derive(Debug, Clone, Default)]
pub struct AccessGuard {
    secret: Option<String>,
}

impl AccessGuard {
    /// `None` lets every request through.
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    pub fn is_permissive(&self) -> bool {
        self.secret.is_none()
    }

    pub fn check(&self, token: Option<&str>) -> Result<()> {
        match self.secret.as_deref() {
            None => Ok(()),
            Some(secret) if token == Some(secret) => Ok(()),
            Some(_) => Err(GatewayError::Unauthorized),
        }
    }
}

/// Middleware rejecting requests whose [`TOKEN_HEADER`] does not match.
pub async fn require_token(State(guard): State<AccessGuard>, req: Request, next: Next) -> Response {
    let token = req
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    match guard.check(token) {
        Ok(()) => next.run(req).await,
        Err(e) => {
            tracing::warn!(path = %req.uri().path(), "Rejected request with missing or wrong token");
            e.into_response()
        }
    }
}
