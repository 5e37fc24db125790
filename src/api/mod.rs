//! HTTP surface: one module per resource plus the shared router.

pub mod alerts;
pub mod auth;
pub mod cost;
pub mod environmental;
pub mod feeding;
pub mod history;
pub mod middleware;
pub mod production;
pub mod response;
pub mod vaccine;

#[cfg(test)]
pub(crate) mod testing;

use crate::auth::Identity;
use crate::config::Settings;
use crate::error::{AppError, AppResult};
use crate::notifications::Mailer;
use axum::{
    http::{header, HeaderValue, Method, Request},
    routing::get,
    Extension, Router,
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn router(db: DatabaseConnection, settings: Arc<Settings>, mailer: Mailer) -> Router {
    let public_routes = Router::new().nest("/api/auth", auth::public_routes());

    let protected_routes = Router::new()
        .nest("/api/auth", auth::routes())
        .nest("/api/productions", production::routes())
        .nest("/api/vaccins", vaccine::routes())
        .nest("/api/feedings", feeding::routes())
        .nest("/api/costs", cost::routes())
        .nest(
            "/api/environmental",
            environmental::routes().merge(alerts::routes()),
        )
        .nest("/api/history", history::routes())
        .route_layer(axum::middleware::from_fn(middleware::auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .merge(public_routes)
        .merge(protected_routes)
        .layer(Extension(Arc::new(db)))
        .layer(Extension(mailer))
        .layer(cors_layer(&settings.server.cors_origin))
        .layer(Extension(settings))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<axum::body::Body>| {
                    let matched_path = request
                        .extensions()
                        .get::<axum::extract::MatchedPath>()
                        .map(|matched| matched.as_str());
                    let span_name = match matched_path {
                        Some(path) => format!("{} {}", request.method(), path),
                        None => format!("{} {}", request.method(), request.uri().path()),
                    };
                    let user_ip = request
                        .headers()
                        .get("x-forwarded-for")
                        .or_else(|| request.headers().get("x-real-ip"))
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown");

                    tracing::info_span!(
                        "request",
                        "otel.name" = span_name,
                        user_ip = user_ip,
                        method = ?request.method(),
                        uri = ?request.uri(),
                        table = tracing::field::Empty,
                        action = tracing::field::Empty,
                        user_id = tracing::field::Empty,
                        business_event = tracing::field::Empty,
                        error = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency = tracing::field::Empty,
                    )
                })
                .on_request(|_request: &Request<axum::body::Body>, _span: &tracing::Span| {})
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record("status", tracing::field::display(response.status()));
                        span.record("latency", tracing::field::debug(latency));
                        tracing::info!("request completed");
                    },
                ),
        )
}

async fn health_check() -> &'static str {
    "OK"
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    match origin.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(origin, "CORS_ORIGIN is not a valid header value; no origin allowed");
            layer
        }
    }
}

pub(crate) fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Fills the request span's business fields.
pub(crate) fn record_event(table: &str, action: &str, event: &str) {
    tracing::Span::current()
        .record("table", table)
        .record("action", action)
        .record("business_event", event);
}

pub(crate) fn ensure_can_modify(identity: &Identity, owner_id: i32, what: &str) -> AppResult<()> {
    if identity.may_modify(owner_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Only the owner or an admin may modify this {what}"
        )))
    }
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
pub(crate) fn parse_instant(field: &str, raw: &str) -> AppResult<NaiveDateTime> {
    if let Ok(at) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(at.naive_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| AppError::invalid(field, "expected an RFC 3339 timestamp or YYYY-MM-DD"))
}

/// `start_date` / `end_date` / `limit` query shared by the list and stats
/// routes.
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl RangeQuery {
    pub fn range(&self) -> AppResult<Range> {
        let start = self
            .start_date
            .as_deref()
            .map(|raw| parse_instant("start_date", raw))
            .transpose()?;
        let end = self
            .end_date
            .as_deref()
            .map(|raw| parse_instant("end_date", raw))
            .transpose()?;
        crate::validation::date_range(start, end)?;
        Ok(Range { start, end })
    }
}

impl Range {
    /// `column >= start AND column <= end`, for the bounds that are set.
    pub fn condition<C: sea_orm::ColumnTrait>(&self, column: C) -> sea_orm::Condition {
        let mut cond = sea_orm::Condition::all();
        if let Some(start) = self.start {
            cond = cond.add(column.gte(start));
        }
        if let Some(end) = self.end {
            cond = cond.add(column.lte(end));
        }
        cond
    }
}
