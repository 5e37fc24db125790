use crate::auth::{token, AuthError};
use crate::config::Settings;
use crate::error::AppError;
use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use std::sync::Arc;

/// Resolves the bearer token into an `Identity` request extension.
pub async fn auth_middleware(
    Extension(settings): Extension<Arc<Settings>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(AuthError::MissingToken)?;
    let identity = token::authenticate(
        bearer.token(),
        &settings.security.jwt_secret,
        chrono::Utc::now(),
    )?;

    tracing::Span::current().record("user_id", identity.user_id);
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
