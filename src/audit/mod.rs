//! Append-only audit trail of every tracked mutation.

pub mod query;

use crate::entities::history_entry::{self, HistoryAction, HistoryKind};
use crate::entities::{
    alert, cost, environmental_reading, feeding, production, user, vaccine, HistoryEntry,
};
use chrono::NaiveDateTime;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Typed view over the `kind` and `data` columns of a history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum HistorySnapshot {
    Environmental(environmental_reading::Model),
    Feeding(feeding::Model),
    Vaccine(vaccine::Model),
    Production(production::Model),
    Alert(alert::Model),
    /// No maintenance entity exists yet; stored as given.
    Maintenance(serde_json::Value),
    Cost(cost::Model),
}

impl HistorySnapshot {
    pub fn kind(&self) -> HistoryKind {
        match self {
            HistorySnapshot::Environmental(_) => HistoryKind::Environmental,
            HistorySnapshot::Feeding(_) => HistoryKind::Feeding,
            HistorySnapshot::Vaccine(_) => HistoryKind::Vaccine,
            HistorySnapshot::Production(_) => HistoryKind::Production,
            HistorySnapshot::Alert(_) => HistoryKind::Alert,
            HistorySnapshot::Maintenance(_) => HistoryKind::Maintenance,
            HistorySnapshot::Cost(_) => HistoryKind::Cost,
        }
    }

    /// The `data` column value.
    pub fn to_data(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut tagged = serde_json::to_value(self)?;
        Ok(tagged["data"].take())
    }

    pub fn from_parts(
        kind: HistoryKind,
        data: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::json!({ "type": kind.as_str(), "data": data }))
    }
}

#[derive(Debug, Clone)]
pub struct NewEntry {
    pub snapshot: HistorySnapshot,
    pub actor: i32,
    pub action: HistoryAction,
    pub description: String,
    pub metadata: Option<serde_json::Value>,
}

impl NewEntry {
    pub fn new(
        snapshot: HistorySnapshot,
        actor: i32,
        action: HistoryAction,
        description: impl Into<String>,
    ) -> Self {
        Self {
            snapshot,
            actor,
            action,
            description: description.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    fn into_active_model(self, now: NaiveDateTime) -> Result<history_entry::ActiveModel, DbErr> {
        let data = self
            .snapshot
            .to_data()
            .map_err(|e| DbErr::Json(e.to_string()))?;
        Ok(history_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            kind: Set(self.snapshot.kind()),
            data: Set(data),
            user_id: Set(self.actor),
            action: Set(self.action),
            description: Set(self.description),
            metadata: Set(self.metadata),
            created_at: Set(now),
        })
    }
}

pub async fn record(
    db: &DatabaseConnection,
    entry: NewEntry,
) -> Result<history_entry::Model, DbErr> {
    let (kind, action) = (entry.snapshot.kind(), entry.action);
    let model = entry
        .into_active_model(chrono::Utc::now().naive_utc())?
        .insert(db)
        .await?;

    crate::metrics::history_recorded(kind, action, 1);
    Ok(model)
}

/// One statement for a whole batch; returns the number of rows written.
pub async fn record_many(db: &DatabaseConnection, entries: Vec<NewEntry>) -> Result<u64, DbErr> {
    let Some(first) = entries.first() else {
        return Ok(0);
    };
    let (kind, action) = (first.snapshot.kind(), first.action);

    let now = chrono::Utc::now().naive_utc();
    let rows = entries
        .into_iter()
        .map(|e| e.into_active_model(now))
        .collect::<Result<Vec<_>, _>>()?;

    let written = HistoryEntry::insert_many(rows)
        .exec_without_returning(db)
        .await?;

    crate::metrics::history_recorded(kind, action, written);
    Ok(written)
}

#[derive(Debug, Clone, Serialize)]
pub struct Actor {
    pub id: i32,
    pub username: String,
}

/// A history row as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryView {
    pub id: Uuid,
    #[serde(flatten)]
    pub snapshot: HistorySnapshot,
    pub user: Option<Actor>,
    pub action: HistoryAction,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: NaiveDateTime,
}

impl HistoryView {
    pub fn new(
        entry: history_entry::Model,
        actor: Option<user::Model>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: entry.id,
            snapshot: HistorySnapshot::from_parts(entry.kind, entry.data)?,
            user: actor.map(|u| Actor {
                id: u.id,
                username: u.username,
            }),
            action: entry.action,
            description: entry.description,
            metadata: entry.metadata,
            created_at: entry.created_at,
        })
    }
}
