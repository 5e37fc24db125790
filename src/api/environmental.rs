use super::response::{Mutation, SideEffects};
use super::{now, record_event, RangeQuery};
use crate::audit::{self, HistorySnapshot, NewEntry};
use crate::auth::Identity;
use crate::config::Settings;
use crate::entities::{
    alert, environmental_reading, history_entry::HistoryAction, EnvironmentalReading,
};
use crate::error::{AppError, AppResult};
use crate::monitoring::{self, alerts as alert_store, Adjustments, Measurements, Parameter};
use crate::validation;
use axum::{
    extract::{Extension, Json, Query},
    routing::{get, post},
    Router,
};
use chrono::{Datelike, NaiveDateTime, Timelike};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, FromQueryResult,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use validator::Validate;

const DEFAULT_LIMIT: u64 = 100;

pub fn routes() -> Router {
    Router::new()
        .route("/", get(list_readings).post(create_reading))
        .route("/stats", get(reading_stats))
        .route("/trends", get(reading_trends))
        .route("/auto-adjust", post(auto_adjust))
}

fn column_for(parameter: Parameter) -> environmental_reading::Column {
    match parameter {
        Parameter::Temperature => environmental_reading::Column::Temperature,
        Parameter::Humidity => environmental_reading::Column::Humidity,
        Parameter::LightLevel => environmental_reading::Column::LightLevel,
    }
}

fn parse_parameter(raw: &str) -> AppResult<Parameter> {
    Parameter::parse(raw).ok_or_else(|| {
        AppError::invalid("parameter", "must be one of temperature, humidity, light_level")
    })
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReadingRequest {
    #[validate(range(min = -50.0, max = 70.0, message = "must be between -50 and 70 °C"))]
    pub temperature: f64,
    #[validate(range(min = 0.0, max = 100.0, message = "must be between 0 and 100 %"))]
    pub humidity: f64,
    #[serde(alias = "lightLevel")]
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub light_level: f64,
}

#[derive(Debug, Serialize)]
pub struct ReadingResponse {
    pub data: environmental_reading::Model,
    pub alerts: Vec<alert::Model>,
}

// POST /api/environmental
pub async fn create_reading(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(settings): Extension<Arc<Settings>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<ReadingRequest>,
) -> AppResult<Mutation<ReadingResponse>> {
    validation::check(&payload)?;

    let reading = environmental_reading::ActiveModel {
        user_id: Set(identity.user_id),
        temperature: Set(payload.temperature),
        humidity: Set(payload.humidity),
        light_level: Set(payload.light_level),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(&*db)
    .await?;
    crate::metrics::reading_stored();
    record_event("environmental_readings", "create_reading", "Environmental reading stored");

    let candidates = monitoring::evaluate(
        &settings.monitoring.thresholds,
        &Measurements::from(&reading),
        reading.created_at,
    );

    let mut effects = SideEffects::default();
    let alerts = effects
        .check(
            "alerts",
            alert_store::create_many(&*db, reading.id, &candidates).await,
        )
        .unwrap_or_default();
    if !alerts.is_empty() {
        tracing::warn!(
            reading_id = reading.id,
            alerts = alerts.len(),
            "reading out of safe range"
        );
    }

    let entry = NewEntry::new(
        HistorySnapshot::Environmental(reading.clone()),
        identity.user_id,
        HistoryAction::Create,
        format!(
            "New environmental reading: {}°C, {}%",
            reading.temperature, reading.humidity
        ),
    );
    effects.check("history", audit::record(&*db, entry).await);

    Ok(Mutation::created(
        ReadingResponse {
            data: reading,
            alerts,
        },
        effects,
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReadingQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<u64>,
    pub parameter: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

impl ReadingQuery {
    pub fn condition(&self) -> AppResult<Condition> {
        let range = RangeQuery {
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            limit: None,
        }
        .range()?;
        let mut cond = range.condition(environmental_reading::Column::CreatedAt);

        let bounded = self.min_value.is_some() || self.max_value.is_some();
        match self.parameter.as_deref() {
            Some(raw) => {
                let column = column_for(parse_parameter(raw)?);
                if let Some(min) = self.min_value {
                    cond = cond.add(column.gte(min));
                }
                if let Some(max) = self.max_value {
                    cond = cond.add(column.lte(max));
                }
            }
            None if bounded => {
                return Err(AppError::invalid(
                    "parameter",
                    "is required with min_value or max_value",
                ))
            }
            None => {}
        }
        Ok(cond)
    }
}

// GET /api/environmental
pub async fn list_readings(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(query): Query<ReadingQuery>,
) -> AppResult<Json<Vec<environmental_reading::Model>>> {
    let cond = query.condition()?;
    let limit = validation::limit(query.limit, DEFAULT_LIMIT)?;
    let readings = EnvironmentalReading::find()
        .filter(cond)
        .order_by_desc(environmental_reading::Column::CreatedAt)
        .limit(limit)
        .all(&*db)
        .await?;
    Ok(Json(readings))
}

#[derive(Debug, Default, FromQueryResult)]
pub struct ReadingTotals {
    pub temperature_sum: Option<f64>,
    pub humidity_sum: Option<f64>,
    pub light_sum: Option<f64>,
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub min_humidity: Option<f64>,
    pub max_humidity: Option<f64>,
    pub count: i64,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct ReadingStats {
    pub avg_temperature: Option<f64>,
    pub avg_humidity: Option<f64>,
    pub avg_light_level: Option<f64>,
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub min_humidity: Option<f64>,
    pub max_humidity: Option<f64>,
    pub count: i64,
}

impl From<ReadingTotals> for ReadingStats {
    fn from(t: ReadingTotals) -> Self {
        let avg = |sum: Option<f64>| (t.count > 0).then(|| sum.unwrap_or(0.0) / t.count as f64);
        Self {
            avg_temperature: avg(t.temperature_sum),
            avg_humidity: avg(t.humidity_sum),
            avg_light_level: avg(t.light_sum),
            min_temperature: t.min_temperature,
            max_temperature: t.max_temperature,
            min_humidity: t.min_humidity,
            max_humidity: t.max_humidity,
            count: t.count,
        }
    }
}

// GET /api/environmental/stats
pub async fn reading_stats(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<ReadingStats>> {
    let range = query.range()?;
    use environmental_reading::Column;

    let totals = EnvironmentalReading::find()
        .select_only()
        .column_as(Column::Temperature.sum(), "temperature_sum")
        .column_as(Column::Humidity.sum(), "humidity_sum")
        .column_as(Column::LightLevel.sum(), "light_sum")
        .column_as(Column::Temperature.min(), "min_temperature")
        .column_as(Column::Temperature.max(), "max_temperature")
        .column_as(Column::Humidity.min(), "min_humidity")
        .column_as(Column::Humidity.max(), "max_humidity")
        .column_as(Column::Id.count(), "count")
        .filter(range.condition(Column::CreatedAt))
        .into_model::<ReadingTotals>()
        .one(&*db)
        .await
        .map_err(AppError::aggregate)?
        .unwrap_or_default();

    Ok(Json(totals.into()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    Hour,
    Day,
}

impl Interval {
    pub fn parse(raw: Option<&str>) -> AppResult<Self> {
        match raw.unwrap_or("hour") {
            "hour" => Ok(Interval::Hour),
            "day" => Ok(Interval::Day),
            _ => Err(AppError::invalid("interval", "must be hour or day")),
        }
    }

    fn key(self, at: NaiveDateTime) -> TrendKey {
        TrendKey {
            year: at.year(),
            month: at.month(),
            day: at.day(),
            hour: match self {
                Interval::Hour => Some(at.hour()),
                Interval::Day => None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TrendKey {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hour: Option<u32>,
}

#[derive(Debug, Clone, FromQueryResult)]
pub struct TrendPoint {
    pub created_at: NaiveDateTime,
    pub value: f64,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct TrendBucket {
    pub key: TrendKey,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

/// Newest bucket first.
pub fn trend_buckets(points: &[TrendPoint], interval: Interval) -> Vec<TrendBucket> {
    let mut groups: BTreeMap<TrendKey, Vec<f64>> = BTreeMap::new();
    for point in points {
        groups
            .entry(interval.key(point.created_at))
            .or_default()
            .push(point.value);
    }
    groups
        .into_iter()
        .rev()
        .map(|(key, values)| TrendBucket {
            key,
            avg: values.iter().sum::<f64>() / values.len() as f64,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            count: values.len(),
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
pub struct TrendQuery {
    pub parameter: Option<String>,
    pub interval: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

// GET /api/environmental/trends
pub async fn reading_trends(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(query): Query<TrendQuery>,
) -> AppResult<Json<Vec<TrendBucket>>> {
    let parameter = match query.parameter.as_deref() {
        Some(raw) => parse_parameter(raw)?,
        None => return Err(AppError::invalid("parameter", "is required")),
    };
    let interval = Interval::parse(query.interval.as_deref())?;
    let range = RangeQuery {
        start_date: query.start_date,
        end_date: query.end_date,
        limit: None,
    }
    .range()?;

    let points = EnvironmentalReading::find()
        .select_only()
        .column(environmental_reading::Column::CreatedAt)
        .column_as(column_for(parameter), "value")
        .filter(range.condition(environmental_reading::Column::CreatedAt))
        .into_model::<TrendPoint>()
        .all(&*db)
        .await
        .map_err(AppError::aggregate)?;

    Ok(Json(trend_buckets(&points, interval)))
}

// POST /api/environmental/auto-adjust
pub async fn auto_adjust(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(settings): Extension<Arc<Settings>>,
) -> AppResult<Json<Adjustments>> {
    let latest = EnvironmentalReading::find()
        .order_by_desc(environmental_reading::Column::CreatedAt)
        .one(&*db)
        .await?
        .ok_or_else(|| AppError::not_found("Environmental reading"))?;

    let adjustments = monitoring::recommend_adjustments(
        &settings.monitoring.thresholds,
        &Measurements::from(&latest),
    );
    record_event("environmental_readings", "auto_adjust", "Equipment adjustments computed");
    Ok(Json(adjustments))
}
