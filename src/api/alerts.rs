use super::response::{Mutation, SideEffects};
use super::{now, record_event};
use crate::audit::{self, HistorySnapshot, NewEntry};
use crate::auth::Identity;
use crate::config::Settings;
use crate::entities::{alert, history_entry::HistoryAction};
use crate::error::AppResult;
use crate::monitoring::alerts::{self as store, AlertDetail, Transition};
use crate::validation;
use axum::{
    extract::{Extension, Json, Path},
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

pub fn routes() -> Router {
    Router::new()
        .route("/alerts", get(list_alerts))
        .route("/alerts/active", get(list_active_alerts))
        .route("/alerts/critical", get(list_critical_alerts))
        .route("/alerts/:id", get(get_alert))
        .route("/alerts/:id/acknowledge", post(acknowledge_alert))
        .route("/alerts/:id/resolve", post(resolve_alert))
        .route("/alerts/:id/actions", post(add_alert_action))
}

// GET /api/environmental/alerts
pub async fn list_alerts(
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> AppResult<Json<Vec<alert::Model>>> {
    Ok(Json(store::list_all(&*db).await?))
}

// GET /api/environmental/alerts/active
pub async fn list_active_alerts(
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> AppResult<Json<Vec<alert::Model>>> {
    Ok(Json(store::list_active(&*db).await?))
}

// GET /api/environmental/alerts/critical
pub async fn list_critical_alerts(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(settings): Extension<Arc<Settings>>,
) -> AppResult<Json<Vec<alert::Model>>> {
    Ok(Json(
        store::list_critical(&*db, &settings.monitoring.critical).await?,
    ))
}

// GET /api/environmental/alerts/:id
pub async fn get_alert(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AlertDetail>> {
    Ok(Json(store::find_with_actions(&*db, id).await?))
}

async fn history_for(
    db: &DatabaseConnection,
    identity: &Identity,
    alert: &alert::Model,
    description: String,
) -> SideEffects {
    let mut effects = SideEffects::default();
    effects.check(
        "history",
        audit::record(
            db,
            NewEntry::new(
                HistorySnapshot::Alert(alert.clone()),
                identity.user_id,
                HistoryAction::Update,
                description,
            ),
        )
        .await,
    );
    effects
}

async fn finish_transition(
    db: &DatabaseConnection,
    identity: &Identity,
    transition: Transition,
    verb: &str,
) -> Mutation<alert::Model> {
    let Transition { alert, changed } = transition;
    if !changed {
        return Mutation::ok(alert, SideEffects::default());
    }

    record_event("alerts", verb, "Alert status changed");
    let description = format!("Alert {verb}: {} {}", alert.category.as_str(), alert.value);
    let effects = history_for(db, identity, &alert, description).await;
    Mutation::ok(alert, effects)
}

// POST /api/environmental/alerts/:id/acknowledge
pub async fn acknowledge_alert(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> AppResult<Mutation<alert::Model>> {
    let transition = store::acknowledge(&*db, id, identity.user_id, now()).await?;
    Ok(finish_transition(&*db, &identity, transition, "acknowledged").await)
}

// POST /api/environmental/alerts/:id/resolve
pub async fn resolve_alert(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> AppResult<Mutation<alert::Model>> {
    let transition = store::resolve(&*db, id, identity.user_id, now()).await?;
    Ok(finish_transition(&*db, &identity, transition, "resolved").await)
}

#[derive(Debug, Deserialize, Validate)]
pub struct AlertActionRequest {
    #[serde(alias = "action")]
    #[validate(length(min = 1, message = "must not be empty"))]
    pub content: String,
}

// POST /api/environmental/alerts/:id/actions
pub async fn add_alert_action(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AlertActionRequest>,
) -> AppResult<Mutation<AlertDetail>> {
    validation::check(&payload)?;

    let (alert, action) =
        store::add_action(&*db, id, identity.user_id, payload.content, now()).await?;
    record_event("alert_actions", "add_alert_action", "Action added to alert");

    let description = format!("Action added to {} alert", alert.category.as_str());
    let mut effects = history_for(&*db, &identity, &alert, description).await;
    let detail = effects
        .check("reload", store::find_with_actions(&*db, id).await)
        .unwrap_or(AlertDetail {
            alert,
            actions: vec![action],
        });
    Ok(Mutation::ok(detail, effects))
}
