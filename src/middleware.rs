use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::{
    api::tokens::TokenType, app_error::AppError, app_state::AppState, domain::role::Role,
};

/// Identity of the caller, inserted into request extensions by [`authorization`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i32,
    pub role: Role,
}

impl AuthUser {
    pub fn is_shopkeeper(&self) -> bool {
        self.role == Role::Shopkeeper
    }
}

pub fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Rejects requests without a valid access token and exposes the caller as `Extension<AuthUser>`.
pub async fn authorization(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req).ok_or_else(|| {
        AppError::Unauthorized("Authentication credentials were not provided.".into())
    })?;

    let claims = state
        .tokens
        .decode(token, TokenType::Access)
        .map_err(|err| {
            tracing::debug!(error = %err, "Rejected access token");
            AppError::Unauthorized("Given token not valid for any token type".into())
        })?;

    req.extensions_mut().insert(AuthUser {
        id: claims.sub,
        role: claims.role,
    });

    Ok(next.run(req).await)
}
