//! Alert persistence and lifecycle.

use super::thresholds::{AlertCandidate, Bounds};
use crate::entities::alert::{self, AlertCategory, AlertStatus, StatusChange};
use crate::entities::{alert_action, Alert, AlertAction};
use crate::error::{AppError, AppResult};
use chrono::NaiveDateTime;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use uuid::Uuid;

/// Bounds outside of which an unresolved alert is escalated as critical.
/// Wider than the alerting table.
#[derive(Debug, Clone, PartialEq)]
pub struct CriticalPolicy {
    pub temperature: Bounds,
    pub humidity: Bounds,
    pub light: Bounds,
}

impl Default for CriticalPolicy {
    fn default() -> Self {
        Self {
            temperature: Bounds::between(10.0, 32.0),
            humidity: Bounds::between(30.0, 85.0),
            light: Bounds::at_least(5.0),
        }
    }
}

impl CriticalPolicy {
    pub fn is_critical(&self, alert: &alert::Model) -> bool {
        if alert.status == AlertStatus::Resolved {
            return false;
        }
        let bounds = match alert.category {
            AlertCategory::Temperature => self.temperature,
            AlertCategory::Humidity => self.humidity,
            AlertCategory::Light => self.light,
            AlertCategory::Other => return false,
        };
        !bounds.contains(alert.value)
    }
}

#[derive(Debug, Serialize)]
pub struct AlertDetail {
    #[serde(flatten)]
    pub alert: alert::Model,
    pub actions: Vec<alert_action::Model>,
}

/// Result of a status change. `changed` is false when the alert was already
/// in the requested status and nothing was written.
#[derive(Debug)]
pub struct Transition {
    pub alert: alert::Model,
    pub changed: bool,
}

pub fn build(reading_id: Option<i32>, candidate: &AlertCandidate) -> alert::Model {
    alert::Model {
        id: Uuid::new_v4(),
        reading_id,
        category: candidate.category,
        value: candidate.value,
        status: candidate.status,
        triggered_at: candidate.triggered_at,
        acknowledged_by: None,
        acknowledged_at: None,
        resolved_by: None,
        resolved_at: None,
        created_at: candidate.triggered_at,
    }
}

/// Persists all candidates raised by one reading in a single insert.
pub async fn create_many(
    db: &DatabaseConnection,
    reading_id: i32,
    candidates: &[AlertCandidate],
) -> Result<Vec<alert::Model>, DbErr> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let models: Vec<alert::Model> = candidates
        .iter()
        .map(|c| build(Some(reading_id), c))
        .collect();
    let rows: Vec<alert::ActiveModel> = models.iter().cloned().map(Into::into).collect();

    Alert::insert_many(rows).exec_without_returning(db).await?;

    for model in &models {
        crate::metrics::alert_raised(model.category);
    }
    Ok(models)
}

pub async fn list_all(db: &DatabaseConnection) -> Result<Vec<alert::Model>, DbErr> {
    Alert::find()
        .order_by_desc(alert::Column::CreatedAt)
        .all(db)
        .await
}

pub async fn list_active(db: &DatabaseConnection) -> Result<Vec<alert::Model>, DbErr> {
    Alert::find()
        .filter(alert::Column::Status.eq(AlertStatus::Active))
        .order_by_desc(alert::Column::CreatedAt)
        .all(db)
        .await
}

pub async fn list_critical(
    db: &DatabaseConnection,
    policy: &CriticalPolicy,
) -> Result<Vec<alert::Model>, DbErr> {
    let open = Alert::find()
        .filter(alert::Column::Status.ne(AlertStatus::Resolved))
        .order_by_desc(alert::Column::CreatedAt)
        .all(db)
        .await?;
    Ok(open.into_iter().filter(|a| policy.is_critical(a)).collect())
}

async fn find(db: &DatabaseConnection, id: Uuid) -> AppResult<alert::Model> {
    Alert::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Alert"))
}

pub async fn find_with_actions(db: &DatabaseConnection, id: Uuid) -> AppResult<AlertDetail> {
    let alert = find(db, id).await?;
    let actions = alert
        .find_related(AlertAction)
        .order_by_asc(alert_action::Column::CreatedAt)
        .all(db)
        .await?;
    Ok(AlertDetail { alert, actions })
}

/// Decides the write for moving `alert` to `next`. `None` means the alert is
/// already there.
pub fn transition(
    alert: &alert::Model,
    next: AlertStatus,
    actor: i32,
    now: NaiveDateTime,
) -> AppResult<Option<alert::ActiveModel>> {
    match alert.status.change_to(next) {
        StatusChange::AlreadyThere => Ok(None),
        StatusChange::Illegal => Err(AppError::Conflict(format!(
            "Alert is already {} and cannot be {}",
            alert.status.as_str(),
            next.as_str()
        ))),
        StatusChange::Apply => {
            let mut active: alert::ActiveModel = alert.clone().into();
            active.status = Set(next);
            match next {
                AlertStatus::Acknowledged => {
                    active.acknowledged_by = Set(Some(actor));
                    active.acknowledged_at = Set(Some(now));
                }
                AlertStatus::Resolved => {
                    active.resolved_by = Set(Some(actor));
                    active.resolved_at = Set(Some(now));
                }
                AlertStatus::Active => {}
            }
            Ok(Some(active))
        }
    }
}

async fn move_to(
    db: &DatabaseConnection,
    id: Uuid,
    next: AlertStatus,
    actor: i32,
    now: NaiveDateTime,
) -> AppResult<Transition> {
    let alert = find(db, id).await?;
    match transition(&alert, next, actor, now)? {
        None => Ok(Transition {
            alert,
            changed: false,
        }),
        Some(active) => Ok(Transition {
            alert: active.update(db).await?,
            changed: true,
        }),
    }
}

pub async fn acknowledge(
    db: &DatabaseConnection,
    id: Uuid,
    actor: i32,
    now: NaiveDateTime,
) -> AppResult<Transition> {
    move_to(db, id, AlertStatus::Acknowledged, actor, now).await
}

pub async fn resolve(
    db: &DatabaseConnection,
    id: Uuid,
    actor: i32,
    now: NaiveDateTime,
) -> AppResult<Transition> {
    move_to(db, id, AlertStatus::Resolved, actor, now).await
}

pub async fn add_action(
    db: &DatabaseConnection,
    id: Uuid,
    actor: i32,
    content: String,
    now: NaiveDateTime,
) -> AppResult<(alert::Model, alert_action::Model)> {
    let alert = find(db, id).await?;
    let action = alert_action::ActiveModel {
        id: Set(Uuid::new_v4()),
        alert_id: Set(alert.id),
        user_id: Set(actor),
        content: Set(content),
        created_at: Set(now),
    }
    .insert(db)
    .await?;
    Ok((alert, action))
}
