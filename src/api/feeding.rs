use super::response::{Deleted, Mutation, SideEffects};
use super::{ensure_can_modify, now, record_event, RangeQuery};
use crate::audit::{self, HistorySnapshot, NewEntry};
use crate::auth::Identity;
use crate::config::Settings;
use crate::entities::{feeding, history_entry::HistoryAction, Feeding};
use crate::error::{AppError, AppResult};
use crate::validation::{self, FieldError};
use axum::{
    extract::{Extension, Json, Path, Query},
    routing::{get, post, put},
    Router,
};
use chrono::NaiveDateTime;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use validator::Validate;

const DEFAULT_LIMIT: u64 = 50;

pub fn routes() -> Router {
    Router::new()
        .route("/", get(list_feedings).post(create_feeding))
        .route("/stats", get(feeding_stats))
        .route("/alerts/low-stock", get(low_stock_alerts))
        .route("/bulk", post(bulk_create_feedings))
        .route("/:id", put(update_feeding).delete(delete_feeding))
        .route("/:id/water-supply", put(update_water_supply))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WaterSupply {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

impl WaterSupply {
    fn findings(&self, prefix: &str) -> Vec<Option<FieldError>> {
        let check = |name: &str, value: &Option<String>| {
            value
                .as_deref()
                .and_then(|v| validation::clock_time(&format!("{prefix}{name}"), v))
        };
        vec![
            check("start_time", &self.start_time),
            check("end_time", &self.end_time),
        ]
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateFeedingRequest {
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub quantity: f64,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub feed_type: String,
    #[serde(default = "default_true")]
    pub automatic_feeding: bool,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub remaining_stock: f64,
    #[serde(default)]
    pub water_supply: Option<WaterSupply>,
}

impl CreateFeedingRequest {
    fn into_active_model(self, owner: i32, now: NaiveDateTime) -> feeding::ActiveModel {
        let water = self.water_supply.unwrap_or_default();
        feeding::ActiveModel {
            user_id: Set(owner),
            quantity: Set(self.quantity),
            feed_type: Set(self.feed_type),
            automatic_feeding: Set(self.automatic_feeding),
            remaining_stock: Set(self.remaining_stock),
            water_start_time: Set(water.start_time),
            water_end_time: Set(water.end_time),
            water_enabled: Set(water.enabled),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateFeedingRequest {
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub quantity: Option<f64>,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub feed_type: Option<String>,
    pub automatic_feeding: Option<bool>,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub remaining_stock: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct BulkFeedingRequest {
    pub feedings: Vec<CreateFeedingRequest>,
}

#[derive(Debug, Deserialize)]
pub struct WaterSupplyRequest {
    pub start_time: String,
    pub end_time: String,
    pub enabled: bool,
}

fn describe(prefix: &str, feeding: &feeding::Model) -> String {
    format!("{prefix}: {}kg of {}", feeding.quantity, feeding.feed_type)
}

async fn record(
    db: &DatabaseConnection,
    feeding: &feeding::Model,
    actor: i32,
    action: HistoryAction,
    description: String,
) -> SideEffects {
    let mut effects = SideEffects::default();
    let entry = NewEntry::new(
        HistorySnapshot::Feeding(feeding.clone()),
        actor,
        action,
        description,
    );
    effects.check("history", audit::record(db, entry).await);
    effects
}

/// Every item is checked before anything is written; errors are indexed.
pub fn validate_batch(items: &[CreateFeedingRequest]) -> AppResult<()> {
    let mut errors = match validation::check_all("feedings", items) {
        Ok(()) => Vec::new(),
        Err(AppError::Validation(fields)) => fields,
        Err(other) => return Err(other),
    };
    for (index, item) in items.iter().enumerate() {
        if let Some(water) = &item.water_supply {
            errors.extend(
                water
                    .findings(&format!("feedings[{index}].water_supply."))
                    .into_iter()
                    .flatten(),
            );
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        errors.sort_by(|a, b| a.field.cmp(&b.field));
        Err(AppError::Validation(errors))
    }
}

// POST /api/feedings
pub async fn create_feeding(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateFeedingRequest>,
) -> AppResult<Mutation<feeding::Model>> {
    validation::check(&payload)?;
    if let Some(water) = &payload.water_supply {
        validation::finish(water.findings("water_supply."))?;
    }

    let feeding = payload
        .into_active_model(identity.user_id, now())
        .insert(&*db)
        .await?;

    record_event("feedings", "create_feeding", "Feeding recorded");
    let description = describe("Feeding added", &feeding);
    let effects = record(
        &*db,
        &feeding,
        identity.user_id,
        HistoryAction::Create,
        description,
    )
    .await;
    Ok(Mutation::created(feeding, effects))
}

// GET /api/feedings
pub async fn list_feedings(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<Vec<feeding::Model>>> {
    let range = query.range()?;
    let limit = validation::limit(query.limit, DEFAULT_LIMIT)?;
    let feedings = Feeding::find()
        .filter(range.condition(feeding::Column::CreatedAt))
        .order_by_desc(feeding::Column::CreatedAt)
        .limit(limit)
        .all(&*db)
        .await?;
    Ok(Json(feedings))
}

async fn find_owned(
    db: &DatabaseConnection,
    identity: &Identity,
    id: i32,
) -> AppResult<feeding::Model> {
    let feeding = Feeding::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Feeding"))?;
    ensure_can_modify(identity, feeding.user_id, "feeding")?;
    Ok(feeding)
}

// PUT /api/feedings/:id
pub async fn update_feeding(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateFeedingRequest>,
) -> AppResult<Mutation<feeding::Model>> {
    validation::check(&payload)?;
    let feeding = find_owned(&*db, &identity, id).await?;

    let mut active = feeding.into_active_model();
    if let Some(v) = payload.quantity {
        active.quantity = Set(v);
    }
    if let Some(v) = payload.feed_type {
        active.feed_type = Set(v);
    }
    if let Some(v) = payload.automatic_feeding {
        active.automatic_feeding = Set(v);
    }
    if let Some(v) = payload.remaining_stock {
        active.remaining_stock = Set(v);
    }
    active.updated_at = Set(now());
    let feeding = active.update(&*db).await?;

    record_event("feedings", "update_feeding", "Feeding updated");
    let description = describe("Feeding updated", &feeding);
    let effects = record(
        &*db,
        &feeding,
        identity.user_id,
        HistoryAction::Update,
        description,
    )
    .await;
    Ok(Mutation::ok(feeding, effects))
}

// DELETE /api/feedings/:id
pub async fn delete_feeding(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
) -> AppResult<Mutation<Deleted<feeding::Model>>> {
    let feeding = find_owned(&*db, &identity, id).await?;
    Feeding::delete_by_id(id).exec(&*db).await?;

    record_event("feedings", "delete_feeding", "Feeding deleted");
    let description = describe("Feeding deleted", &feeding);
    let effects = record(
        &*db,
        &feeding,
        identity.user_id,
        HistoryAction::Delete,
        description,
    )
    .await;
    Ok(Mutation::ok(Deleted::new("Feeding", feeding), effects))
}

#[derive(Debug, FromQueryResult)]
struct FeedGroup {
    feed_type: String,
    total_quantity: Option<f64>,
    count: i64,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct FeedingStats {
    pub feed_type: String,
    pub total_quantity: f64,
    pub average_quantity: f64,
    pub count: i64,
}

impl From<FeedGroup> for FeedingStats {
    fn from(g: FeedGroup) -> Self {
        let total = g.total_quantity.unwrap_or(0.0);
        Self {
            feed_type: g.feed_type,
            total_quantity: total,
            average_quantity: if g.count > 0 { total / g.count as f64 } else { 0.0 },
            count: g.count,
        }
    }
}

// GET /api/feedings/stats
pub async fn feeding_stats(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<Vec<FeedingStats>>> {
    let range = query.range()?;
    let groups = Feeding::find()
        .select_only()
        .column(feeding::Column::FeedType)
        .column_as(feeding::Column::Quantity.sum(), "total_quantity")
        .column_as(feeding::Column::Id.count(), "count")
        .filter(range.condition(feeding::Column::CreatedAt))
        .group_by(feeding::Column::FeedType)
        .order_by_asc(feeding::Column::FeedType)
        .into_model::<FeedGroup>()
        .all(&*db)
        .await
        .map_err(AppError::aggregate)?;
    Ok(Json(groups.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Clone, FromQueryResult)]
pub struct StockLevel {
    pub feed_type: String,
    pub remaining_stock: f64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct LowStock {
    pub feed_type: String,
    pub current_stock: f64,
    pub threshold: f64,
    pub recorded_at: NaiveDateTime,
}

/// Keeps the newest level per feed type and reports those under `threshold`.
/// `levels` must be ordered newest first.
pub fn low_stock(levels: Vec<StockLevel>, threshold: f64) -> Vec<LowStock> {
    let mut seen = HashSet::new();
    levels
        .into_iter()
        .filter(|level| seen.insert(level.feed_type.clone()))
        .filter(|level| level.remaining_stock < threshold)
        .map(|level| LowStock {
            feed_type: level.feed_type,
            current_stock: level.remaining_stock,
            threshold,
            recorded_at: level.created_at,
        })
        .collect()
}

// GET /api/feedings/alerts/low-stock
pub async fn low_stock_alerts(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(settings): Extension<Arc<Settings>>,
) -> AppResult<Json<Vec<LowStock>>> {
    let levels = Feeding::find()
        .select_only()
        .columns([
            feeding::Column::FeedType,
            feeding::Column::RemainingStock,
            feeding::Column::CreatedAt,
        ])
        .order_by_desc(feeding::Column::CreatedAt)
        .order_by_desc(feeding::Column::Id)
        .into_model::<StockLevel>()
        .all(&*db)
        .await
        .map_err(AppError::aggregate)?;
    Ok(Json(low_stock(levels, settings.monitoring.low_stock_threshold)))
}

// POST /api/feedings/bulk
pub async fn bulk_create_feedings(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<BulkFeedingRequest>,
) -> AppResult<Mutation<Vec<feeding::Model>>> {
    validate_batch(&payload.feedings)?;

    let now = now();
    let txn = db.begin().await?;
    let mut feedings = Vec::with_capacity(payload.feedings.len());
    for item in payload.feedings {
        feedings.push(item.into_active_model(identity.user_id, now).insert(&txn).await?);
    }
    txn.commit().await?;

    record_event("feedings", "bulk_create_feedings", "Feedings recorded in bulk");
    let entries = feedings
        .iter()
        .map(|f| {
            NewEntry::new(
                HistorySnapshot::Feeding(f.clone()),
                identity.user_id,
                HistoryAction::BulkCreate,
                describe("Bulk feeding added", f),
            )
        })
        .collect();

    let mut effects = SideEffects::default();
    effects.check("history", audit::record_many(&*db, entries).await);
    Ok(Mutation::created(feedings, effects))
}

// PUT /api/feedings/:id/water-supply
pub async fn update_water_supply(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
    Json(payload): Json<WaterSupplyRequest>,
) -> AppResult<Mutation<feeding::Model>> {
    validation::finish([
        validation::clock_time("start_time", &payload.start_time),
        validation::clock_time("end_time", &payload.end_time),
    ])?;
    let feeding = find_owned(&*db, &identity, id).await?;

    let mut active = feeding.into_active_model();
    active.water_start_time = Set(Some(payload.start_time.clone()));
    active.water_end_time = Set(Some(payload.end_time.clone()));
    active.water_enabled = Set(payload.enabled);
    active.updated_at = Set(now());
    let feeding = active.update(&*db).await?;

    record_event("feedings", "update_water_supply", "Water supply schedule changed");
    let description = format!(
        "Water supply updated: start {}, end {}",
        payload.start_time, payload.end_time
    );
    let effects = record(
        &*db,
        &feeding,
        identity.user_id,
        HistoryAction::Update,
        description,
    )
    .await;
    Ok(Mutation::ok(feeding, effects))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{
        body_json, caller, exec_ok, history_row, single_history, transaction_log, written_history,
    };
    use crate::entities::history_entry::{self, HistoryKind};
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn at(hour: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn item(quantity: f64, feed_type: &str) -> CreateFeedingRequest {
        CreateFeedingRequest {
            quantity,
            feed_type: feed_type.into(),
            automatic_feeding: true,
            remaining_stock: 500.0,
            water_supply: None,
        }
    }

    fn level(feed_type: &str, remaining_stock: f64, hour: u32) -> StockLevel {
        StockLevel {
            feed_type: feed_type.into(),
            remaining_stock,
            created_at: at(hour),
        }
    }

    fn stored(id: i32, quantity: f64, feed_type: &str) -> feeding::Model {
        feeding::Model {
            id,
            user_id: 5,
            quantity,
            feed_type: feed_type.into(),
            automatic_feeding: true,
            remaining_stock: 500.0,
            water_start_time: None,
            water_end_time: None,
            water_enabled: false,
            created_at: at(9),
            updated_at: at(9),
        }
    }

    fn history(data: &feeding::Model, action: HistoryAction) -> history_entry::Model {
        history_row(HistoryKind::Feeding, data, data.user_id, action)
    }

    #[test]
    fn one_bad_item_rejects_the_batch_with_its_index() {
        let batch = vec![item(10.0, "starter"), item(12.0, "grower"), item(-1.0, "layer")];
        let Err(AppError::Validation(fields)) = validate_batch(&batch) else {
            panic!("expected validation error");
        };
        assert_eq!(fields, vec![FieldError::new("feedings[2].quantity", "must not be negative")]);
    }

    #[test]
    fn bad_water_times_in_a_batch_are_indexed() {
        let mut second = item(12.0, "grower");
        second.water_supply = Some(WaterSupply {
            start_time: Some("06:00".into()),
            end_time: Some("25:00".into()),
            enabled: true,
        });
        let Err(AppError::Validation(fields)) = validate_batch(&[item(1.0, "starter"), second])
        else {
            panic!("expected validation error");
        };
        assert_eq!(fields[0].field, "feedings[1].water_supply.end_time");
    }

    #[test]
    fn only_the_latest_level_per_feed_type_counts() {
        let levels = vec![
            level("layer", 80.0, 12),
            level("grower", 300.0, 11),
            level("grower", 20.0, 9),
            level("layer", 900.0, 8),
        ];
        let low = low_stock(levels, 100.0);
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].feed_type, "layer");
        assert_eq!(low[0].current_stock, 80.0);
        assert_eq!(low[0].recorded_at, at(12));
    }

    #[test]
    fn average_is_total_over_count() {
        let stats = FeedingStats::from(FeedGroup {
            feed_type: "starter".into(),
            total_quantity: Some(90.0),
            count: 3,
        });
        assert_eq!(stats.average_quantity, 30.0);
    }

    #[tokio::test]
    async fn create_records_the_new_feeding() {
        let created = stored(1, 25.0, "starter");
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![created.clone()]])
                .append_query_results([vec![history(&created, HistoryAction::Create)]])
                .into_connection(),
        );

        let mutation = create_feeding(
            Extension(db.clone()),
            Extension(caller(5)),
            Json(item(25.0, "starter")),
        )
        .await
        .unwrap();
        let response = axum::response::IntoResponse::into_response(mutation);
        assert_eq!(response.status(), axum::http::StatusCode::CREATED);

        let entry = single_history(&transaction_log(db));
        assert_eq!(entry.kind, "feeding");
        assert_eq!(entry.action, "create");
        assert_eq!(entry.user_id, 5);
        assert_eq!(entry.description, "Feeding added: 25kg of starter");
        assert_eq!(entry.data, serde_json::to_value(&created).unwrap());
    }

    #[tokio::test]
    async fn update_records_the_updated_feeding() {
        let before = stored(1, 25.0, "starter");
        let after = feeding::Model {
            quantity: 30.5,
            ..before.clone()
        };
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![before]])
                .append_query_results([vec![after.clone()]])
                .append_query_results([vec![history(&after, HistoryAction::Update)]])
                .into_connection(),
        );
        let payload = UpdateFeedingRequest {
            quantity: Some(30.5),
            ..UpdateFeedingRequest::default()
        };
        update_feeding(Extension(db.clone()), Extension(caller(5)), Path(1), Json(payload))
            .await
            .unwrap();

        let entry = single_history(&transaction_log(db));
        assert_eq!(entry.action, "update");
        assert_eq!(entry.description, "Feeding updated: 30.5kg of starter");
        assert_eq!(entry.data, serde_json::to_value(&after).unwrap());
    }

    #[tokio::test]
    async fn delete_records_the_removed_feeding() {
        let removed = stored(1, 25.0, "starter");
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![removed.clone()]])
                .append_exec_results([exec_ok(1)])
                .append_query_results([vec![history(&removed, HistoryAction::Delete)]])
                .into_connection(),
        );

        delete_feeding(Extension(db.clone()), Extension(caller(5)), Path(1))
            .await
            .unwrap();

        let entry = single_history(&transaction_log(db));
        assert_eq!(entry.action, "delete");
        assert_eq!(entry.description, "Feeding deleted: 25kg of starter");
        assert_eq!(entry.data, serde_json::to_value(&removed).unwrap());
    }

    #[tokio::test]
    async fn strangers_cannot_delete() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![stored(1, 25.0, "starter")]])
                .into_connection(),
        );
        let err = delete_feeding(Extension(db), Extension(caller(9)), Path(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn bulk_create_writes_one_history_row_per_feeding() {
        let first = stored(1, 10.0, "starter");
        let second = stored(2, 12.0, "grower");
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![first.clone()]])
                .append_query_results([vec![second.clone()]])
                .append_exec_results([exec_ok(2)])
                .into_connection(),
        );
        let payload = BulkFeedingRequest {
            feedings: vec![item(10.0, "starter"), item(12.0, "grower")],
        };

        let mutation =
            bulk_create_feedings(Extension(db.clone()), Extension(caller(5)), Json(payload))
                .await
                .unwrap();
        let response = axum::response::IntoResponse::into_response(mutation);
        assert_eq!(response.status(), axum::http::StatusCode::CREATED);
        assert_eq!(
            body_json(response).await,
            serde_json::to_value(vec![&first, &second]).unwrap()
        );

        let rows = written_history(&transaction_log(db));
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.action == "bulk_create" && r.kind == "feeding"));
        assert_eq!(rows[0].description, "Bulk feeding added: 10kg of starter");
        assert_eq!(rows[0].data, serde_json::to_value(&first).unwrap());
        assert_eq!(rows[1].data, serde_json::to_value(&second).unwrap());
    }

    #[tokio::test]
    async fn water_supply_change_is_recorded() {
        let before = stored(1, 25.0, "starter");
        let after = feeding::Model {
            water_start_time: Some("06:00".into()),
            water_end_time: Some("18:30".into()),
            water_enabled: true,
            ..before.clone()
        };
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![before]])
                .append_query_results([vec![after.clone()]])
                .append_query_results([vec![history(&after, HistoryAction::Update)]])
                .into_connection(),
        );
        let payload = WaterSupplyRequest {
            start_time: "06:00".into(),
            end_time: "18:30".into(),
            enabled: true,
        };
        update_water_supply(Extension(db.clone()), Extension(caller(5)), Path(1), Json(payload))
            .await
            .unwrap();

        let entry = single_history(&transaction_log(db));
        assert_eq!(entry.description, "Water supply updated: start 06:00, end 18:30");
        assert_eq!(entry.data, serde_json::to_value(&after).unwrap());
    }
}
