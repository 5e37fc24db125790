use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Deserialize, Serialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    #[sea_orm(string_value = "temperature")]
    Temperature,
    #[sea_orm(string_value = "humidity")]
    Humidity,
    #[sea_orm(string_value = "light")]
    Light,
    #[sea_orm(string_value = "other")]
    Other,
}

impl AlertCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertCategory::Temperature => "temperature",
            AlertCategory::Humidity => "humidity",
            AlertCategory::Light => "light",
            AlertCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Deserialize, Serialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "acknowledged")]
    Acknowledged,
    #[sea_orm(string_value = "resolved")]
    Resolved,
}

/// Outcome of asking an alert to move to a new status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Apply,
    /// Already there; the first actor and timestamp are kept.
    AlreadyThere,
    Illegal,
}

impl AlertStatus {
    fn rank(self) -> u8 {
        match self {
            AlertStatus::Active => 0,
            AlertStatus::Acknowledged => 1,
            AlertStatus::Resolved => 2,
        }
    }

    /// Status only moves forward: active -> acknowledged -> resolved, and
    /// active -> resolved directly.
    pub fn change_to(self, next: AlertStatus) -> StatusChange {
        if self == next {
            StatusChange::AlreadyThere
        } else if next.rank() > self.rank() {
            StatusChange::Apply
        } else {
            StatusChange::Illegal
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "alerts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub reading_id: Option<i32>,
    pub category: AlertCategory,
    pub value: f64,
    pub status: AlertStatus,
    pub triggered_at: DateTime,
    pub acknowledged_by: Option<i32>,
    pub acknowledged_at: Option<DateTime>,
    pub resolved_by: Option<i32>,
    pub resolved_at: Option<DateTime>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::environmental_reading::Entity",
        from = "Column::ReadingId",
        to = "super::environmental_reading::Column::Id",
        on_update = "Cascade",
        on_delete = "SetNull"
    )]
    EnvironmentalReading,
    #[sea_orm(has_many = "super::alert_action::Entity")]
    AlertAction,
}

impl Related<super::environmental_reading::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EnvironmentalReading.def()
    }
}

impl Related<super::alert_action::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AlertAction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
