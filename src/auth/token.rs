use super::{AuthError, Identity};
use crate::entities::user::Role;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

pub const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

pub fn issue(
    identity: &Identity,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: identity.user_id.to_string(),
        role: identity.role,
        iat: now.timestamp(),
        exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verifies signature and expiry against `now` rather than the wall clock,
/// with no leeway: valid up to and including `exp`.
pub fn authenticate(token: &str, secret: &str, now: DateTime<Utc>) -> Result<Identity, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.leeway = 0;

    let claims = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|_| AuthError::InvalidToken)?
        .claims;

    if now.timestamp() > claims.exp {
        return Err(AuthError::ExpiredToken);
    }

    let user_id = claims.sub.parse().map_err(|_| AuthError::InvalidToken)?;
    Ok(Identity {
        user_id,
        role: claims.role,
    })
}
