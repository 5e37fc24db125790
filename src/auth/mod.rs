//! Identity, bearer tokens and credentials.

pub mod password;
pub mod token;

use crate::entities::user::Role;
use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Authorization token is missing")]
    MissingToken,

    #[error("Authorization token is invalid")]
    InvalidToken,

    #[error("Authorization token has expired")]
    ExpiredToken,

    #[error("No account is registered with this email")]
    UnknownAccount,

    #[error("Incorrect password")]
    WrongPassword,

    #[error("Incorrect login code")]
    InvalidCode,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::UnknownAccount => StatusCode::NOT_FOUND,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "AUTH_MISSING_TOKEN",
            AuthError::InvalidToken => "AUTH_INVALID_TOKEN",
            AuthError::ExpiredToken => "AUTH_EXPIRED_TOKEN",
            AuthError::UnknownAccount => "AUTH_UNKNOWN_ACCOUNT",
            AuthError::WrongPassword => "AUTH_WRONG_PASSWORD",
            AuthError::InvalidCode => "AUTH_INVALID_CODE",
        }
    }
}

/// The authenticated caller, inserted into request extensions by the auth
/// middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i32,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn may_modify(&self, owner_id: i32) -> bool {
        self.is_admin() || self.user_id == owner_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_account_is_distinct_from_wrong_password() {
        assert_eq!(AuthError::UnknownAccount.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AuthError::WrongPassword.status_code(), StatusCode::UNAUTHORIZED);
        assert_ne!(
            AuthError::UnknownAccount.error_type(),
            AuthError::WrongPassword.error_type()
        );
    }

    #[test]
    fn owners_and_admins_may_modify() {
        let user = Identity {
            user_id: 4,
            role: Role::User,
        };
        let admin = Identity {
            user_id: 1,
            role: Role::Admin,
        };
        assert!(user.may_modify(4));
        assert!(!user.may_modify(5));
        assert!(admin.may_modify(5));
    }
}
