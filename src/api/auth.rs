use super::{now, record_event};
use crate::auth::{password, token, AuthError, Identity};
use crate::config::Settings;
use crate::entities::user::{self, Role};
use crate::entities::User;
use crate::error::{AppError, AppResult};
use crate::notifications::Mailer;
use crate::validation::{self, FieldError};
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use validator::Validate;

const CODE_ATTEMPTS: usize = 20;

pub fn public_routes() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/code", post(login_with_code))
}

pub fn routes() -> Router {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/password", put(change_password))
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: i32,
    pub username: String,
    pub role: Role,
}

impl From<&user::Model> for UserSummary {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: UserSummary,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: UserSummary,
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 50, message = "must be between 3 and 50 characters"))]
    pub username: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "must be at least 6 characters"))]
    pub password: String,
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn session(user: &user::Model, settings: &Settings) -> AppResult<SessionResponse> {
    let identity = Identity {
        user_id: user.id,
        role: user.role,
    };
    let token = token::issue(&identity, &settings.security.jwt_secret, chrono::Utc::now())
        .map_err(|e| AppError::Internal(format!("failed to sign token: {e}")))?;
    Ok(SessionResponse {
        user: user.into(),
        token,
    })
}

/// Field errors for a username or email already held by someone else.
pub fn duplicate_fields(existing: &[user::Model], username: &str, email: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if existing.iter().any(|u| u.email == email) {
        errors.push(FieldError::new("email", "is already registered"));
    }
    if existing.iter().any(|u| u.username == username) {
        errors.push(FieldError::new("username", "is already taken"));
    }
    errors
}

async fn unused_code(db: &DatabaseConnection) -> AppResult<String> {
    for _ in 0..CODE_ATTEMPTS {
        let code = password::generate_code(&mut rand::thread_rng());
        let holders = User::find()
            .filter(user::Column::Code.eq(code.as_str()))
            .count(db)
            .await?;
        if holders == 0 {
            return Ok(code);
        }
    }
    Err(AppError::Internal("no free login code found".into()))
}

fn unique_violation(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::invalid("email", "username or email is already registered")
        }
        _ => err.into(),
    }
}

// POST /api/auth/register
pub async fn register(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(mailer): Extension<Mailer>,
    Json(mut payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    payload.username = payload.username.trim().to_string();
    payload.email = normalize_email(&payload.email);
    validation::check(&payload)?;

    let existing = User::find()
        .filter(
            Condition::any()
                .add(user::Column::Username.eq(payload.username.as_str()))
                .add(user::Column::Email.eq(payload.email.as_str())),
        )
        .all(&*db)
        .await?;
    let duplicates = duplicate_fields(&existing, &payload.username, &payload.email);
    if !duplicates.is_empty() {
        tracing::Span::current()
            .record("table", "users")
            .record("action", "register_user_failed")
            .record("error", "duplicate_account");
        return Err(AppError::Validation(duplicates));
    }

    let password_hash = password::hash_password(&payload.password)?;
    let code = unused_code(&*db).await?;

    let now = now();
    let user = user::ActiveModel {
        username: Set(payload.username),
        email: Set(payload.email),
        password_hash: Set(password_hash),
        code: Set(Some(code.clone())),
        role: Set(Role::User),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&*db)
    .await
    .map_err(unique_violation)?;

    tracing::Span::current().record("user_id", user.id);
    record_event("users", "register_user", "User registered successfully");
    crate::metrics::user_registered();

    if let Err(e) = mailer.send_login_code(&user.email, &user.username, &code).await {
        tracing::warn!(user_id = user.id, error = %e, "login code email not delivered");
    }

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: (&user).into(),
            code,
        }),
    ))
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "is required"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

// POST /api/auth/login
pub async fn login(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(settings): Extension<Arc<Settings>>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<SessionResponse>> {
    validation::check(&payload)?;

    let user = User::find()
        .filter(user::Column::Email.eq(normalize_email(&payload.email)))
        .one(&*db)
        .await?
        .ok_or(AuthError::UnknownAccount)?;

    if !password::verify_password(&payload.password, &user.password_hash)? {
        tracing::Span::current()
            .record("table", "users")
            .record("action", "login_user_failed")
            .record("error", "invalid_credentials");
        return Err(AuthError::WrongPassword.into());
    }

    tracing::Span::current().record("user_id", user.id);
    record_event("users", "login_user", "User logged in successfully");
    Ok(Json(session(&user, &settings)?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CodeLoginRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "is required"))]
    pub code: String,
}

// POST /api/auth/code
pub async fn login_with_code(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(settings): Extension<Arc<Settings>>,
    Json(payload): Json<CodeLoginRequest>,
) -> AppResult<Json<SessionResponse>> {
    validation::check(&payload)?;

    let user = User::find()
        .filter(user::Column::Code.eq(payload.code.trim()))
        .one(&*db)
        .await?
        .ok_or(AuthError::InvalidCode)?;

    tracing::Span::current().record("user_id", user.id);
    record_event("users", "login_with_code", "User logged in with code");
    Ok(Json(session(&user, &settings)?))
}

// POST /api/auth/logout
pub async fn logout(Extension(identity): Extension<Identity>) -> Json<Value> {
    record_event("users", "logout_user", "User logged out");
    tracing::debug!(user_id = identity.user_id, "logout acknowledged");
    Json(json!({ "message": "Logged out" }))
}

// GET /api/auth/me
pub async fn me(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
) -> AppResult<Json<user::Model>> {
    let user = User::find_by_id(identity.user_id)
        .one(&*db)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "is required"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "must be at least 6 characters"))]
    pub new_password: String,
}

// PUT /api/auth/password
pub async fn change_password(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<Json<Value>> {
    validation::check(&payload)?;

    let user = User::find_by_id(identity.user_id)
        .one(&*db)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    if !password::verify_password(&payload.current_password, &user.password_hash)? {
        return Err(AuthError::WrongPassword.into());
    }

    let mut active = user.into_active_model();
    active.password_hash = Set(password::hash_password(&payload.new_password)?);
    active.updated_at = Set(now());
    active.update(&*db).await?;

    record_event("users", "change_password", "Password changed");
    Ok(Json(json!({ "message": "Password updated" })))
}
