use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use poultry_farm_server::api;
use poultry_farm_server::auth::{token, Identity};
use poultry_farm_server::config::Settings;
use poultry_farm_server::entities::{alert, user::Role};
use poultry_farm_server::notifications::Mailer;
use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "integration-secret";

fn app(db: DatabaseConnection) -> Router {
    api::router(
        db,
        Arc::new(Settings::for_secret(SECRET)),
        Mailer::mock("no-reply@poultry-farm.local"),
    )
}

fn empty_db() -> DatabaseConnection {
    MockDatabase::new(DatabaseBackend::Postgres).into_connection()
}

fn bearer(issued: chrono::DateTime<Utc>) -> String {
    let identity = Identity {
        user_id: 7,
        role: Role::User,
    };
    format!("Bearer {}", token::issue(&identity, SECRET, issued).unwrap())
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let response = app(empty_db())
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_route_without_token_is_unauthorized() {
    let response = app(empty_db())
        .oneshot(
            Request::get("/api/productions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error_type"], "AUTH_MISSING_TOKEN");
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let issued = Utc::now() - Duration::hours(25);
    let response = app(empty_db())
        .oneshot(
            Request::get("/api/costs")
                .header(header::AUTHORIZATION, bearer(issued))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error_type"], "AUTH_EXPIRED_TOKEN");
}

#[tokio::test]
async fn active_alerts_are_listed_for_a_valid_token() {
    let at = Utc::now().naive_utc();
    let raised = alert::Model {
        id: uuid::Uuid::new_v4(),
        reading_id: Some(3),
        category: alert::AlertCategory::Humidity,
        value: 82.0,
        status: alert::AlertStatus::Active,
        triggered_at: at,
        acknowledged_by: None,
        acknowledged_at: None,
        resolved_by: None,
        resolved_at: None,
        created_at: at,
    };
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![raised]])
        .into_connection();

    let response = app(db)
        .oneshot(
            Request::get("/api/environmental/alerts/active")
                .header(header::AUTHORIZATION, bearer(Utc::now()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body[0]["category"], "humidity");
    assert_eq!(body[0]["status"], "active");
}

#[tokio::test]
async fn invalid_reading_is_a_validation_error() {
    let response = app(empty_db())
        .oneshot(
            Request::post("/api/environmental")
                .header(header::AUTHORIZATION, bearer(Utc::now()))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"temperature":22.0,"humidity":140.0,"light_level":30.0}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error_type"], "VALIDATION_ERROR");
    assert_eq!(body["details"][0]["field"], "humidity");
}
