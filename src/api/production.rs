use super::response::{Deleted, Mutation, SideEffects};
use super::{ensure_can_modify, now, record_event, RangeQuery};
use crate::audit::{self, HistorySnapshot, NewEntry};
use crate::auth::Identity;
use crate::entities::{history_entry::HistoryAction, production, Production};
use crate::error::{AppError, AppResult};
use crate::validation;
use axum::{
    extract::{Extension, Json, Path, Query},
    routing::{get, put},
    Router,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

const DEFAULT_LIMIT: u64 = 50;

pub fn routes() -> Router {
    Router::new()
        .route("/", get(list_productions).post(create_production))
        .route("/user", get(list_my_productions))
        .route("/stats", get(production_stats))
        .route("/:id", put(update_production).delete(delete_production))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductionRequest {
    #[validate(range(min = 0, message = "must not be negative"))]
    pub chicken_count: i32,
    #[serde(default)]
    #[validate(range(min = 0, message = "must not be negative"))]
    pub mortality: i32,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub feed_consumption: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub feed_cost: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub vaccine_cost: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub utility_cost: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub other_cost: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub revenue: f64,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProductionRequest {
    #[validate(range(min = 0, message = "must not be negative"))]
    pub chicken_count: Option<i32>,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub mortality: Option<i32>,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub feed_consumption: Option<f64>,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub feed_cost: Option<f64>,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub vaccine_cost: Option<f64>,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub utility_cost: Option<f64>,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub other_cost: Option<f64>,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub revenue: Option<f64>,
}

impl UpdateProductionRequest {
    fn apply(self, active: &mut production::ActiveModel) {
        if let Some(v) = self.chicken_count {
            active.chicken_count = Set(v);
        }
        if let Some(v) = self.mortality {
            active.mortality = Set(v);
        }
        if let Some(v) = self.feed_consumption {
            active.feed_consumption = Set(v);
        }
        if let Some(v) = self.feed_cost {
            active.feed_cost = Set(v);
        }
        if let Some(v) = self.vaccine_cost {
            active.vaccine_cost = Set(v);
        }
        if let Some(v) = self.utility_cost {
            active.utility_cost = Set(v);
        }
        if let Some(v) = self.other_cost {
            active.other_cost = Set(v);
        }
        if let Some(v) = self.revenue {
            active.revenue = Set(v);
        }
    }
}

async fn record(
    db: &DatabaseConnection,
    production: &production::Model,
    actor: i32,
    action: HistoryAction,
    description: String,
) -> SideEffects {
    let mut effects = SideEffects::default();
    let entry = NewEntry::new(
        HistorySnapshot::Production(production.clone()),
        actor,
        action,
        description,
    );
    effects.check("history", audit::record(db, entry).await);
    effects
}

// POST /api/productions
pub async fn create_production(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateProductionRequest>,
) -> AppResult<Mutation<production::Model>> {
    validation::check(&payload)?;

    let now = now();
    let production = production::ActiveModel {
        user_id: Set(identity.user_id),
        chicken_count: Set(payload.chicken_count),
        mortality: Set(payload.mortality),
        feed_consumption: Set(payload.feed_consumption),
        feed_cost: Set(payload.feed_cost),
        vaccine_cost: Set(payload.vaccine_cost),
        utility_cost: Set(payload.utility_cost),
        other_cost: Set(payload.other_cost),
        revenue: Set(payload.revenue),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&*db)
    .await?;

    record_event("productions", "create_production", "Production batch recorded");
    let description = format!("Production: {} chickens", production.chicken_count);
    let effects = record(
        &*db,
        &production,
        identity.user_id,
        HistoryAction::Create,
        description,
    )
    .await;
    Ok(Mutation::created(production, effects))
}

// GET /api/productions
pub async fn list_productions(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<Vec<production::Model>>> {
    let range = query.range()?;
    let limit = validation::limit(query.limit, DEFAULT_LIMIT)?;

    let productions = Production::find()
        .filter(range.condition(production::Column::CreatedAt))
        .order_by_desc(production::Column::CreatedAt)
        .limit(limit)
        .all(&*db)
        .await?;
    Ok(Json(productions))
}

// GET /api/productions/user
pub async fn list_my_productions(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
) -> AppResult<Json<Vec<production::Model>>> {
    let productions = Production::find()
        .filter(production::Column::UserId.eq(identity.user_id))
        .order_by_desc(production::Column::CreatedAt)
        .all(&*db)
        .await?;
    Ok(Json(productions))
}

#[derive(Debug, Default, FromQueryResult)]
pub struct ProductionTotals {
    pub chickens: Option<i64>,
    pub mortality: Option<i64>,
    pub feed_consumption: Option<f64>,
    pub feed_cost: Option<f64>,
    pub vaccine_cost: Option<f64>,
    pub utility_cost: Option<f64>,
    pub other_cost: Option<f64>,
    pub revenue: Option<f64>,
    pub count: i64,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct ProductionStats {
    pub total_chickens: i64,
    pub total_mortality: i64,
    pub total_feed_consumption: f64,
    pub total_costs: f64,
    pub total_revenue: f64,
    pub profit: f64,
    pub count: i64,
}

impl From<ProductionTotals> for ProductionStats {
    fn from(t: ProductionTotals) -> Self {
        let total_costs = t.feed_cost.unwrap_or(0.0)
            + t.vaccine_cost.unwrap_or(0.0)
            + t.utility_cost.unwrap_or(0.0)
            + t.other_cost.unwrap_or(0.0);
        let total_revenue = t.revenue.unwrap_or(0.0);
        Self {
            total_chickens: t.chickens.unwrap_or(0),
            total_mortality: t.mortality.unwrap_or(0),
            total_feed_consumption: t.feed_consumption.unwrap_or(0.0),
            total_costs,
            total_revenue,
            profit: total_revenue - total_costs,
            count: t.count,
        }
    }
}

// GET /api/productions/stats
pub async fn production_stats(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<ProductionStats>> {
    let range = query.range()?;

    let totals = Production::find()
        .select_only()
        .column_as(production::Column::ChickenCount.sum(), "chickens")
        .column_as(production::Column::Mortality.sum(), "mortality")
        .column_as(production::Column::FeedConsumption.sum(), "feed_consumption")
        .column_as(production::Column::FeedCost.sum(), "feed_cost")
        .column_as(production::Column::VaccineCost.sum(), "vaccine_cost")
        .column_as(production::Column::UtilityCost.sum(), "utility_cost")
        .column_as(production::Column::OtherCost.sum(), "other_cost")
        .column_as(production::Column::Revenue.sum(), "revenue")
        .column_as(production::Column::Id.count(), "count")
        .filter(range.condition(production::Column::CreatedAt))
        .into_model::<ProductionTotals>()
        .one(&*db)
        .await
        .map_err(AppError::aggregate)?
        .unwrap_or_default();

    Ok(Json(totals.into()))
}

async fn find_owned(
    db: &DatabaseConnection,
    identity: &Identity,
    id: i32,
) -> AppResult<production::Model> {
    let production = Production::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Production"))?;
    ensure_can_modify(identity, production.user_id, "production")?;
    Ok(production)
}

// PUT /api/productions/:id
pub async fn update_production(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateProductionRequest>,
) -> AppResult<Mutation<production::Model>> {
    validation::check(&payload)?;
    let production = find_owned(&*db, &identity, id).await?;

    let mut active = production.into_active_model();
    payload.apply(&mut active);
    active.updated_at = Set(now());
    let production = active.update(&*db).await?;

    record_event("productions", "update_production", "Production batch updated");
    let description = format!("Production updated: {} chickens", production.chicken_count);
    let effects = record(
        &*db,
        &production,
        identity.user_id,
        HistoryAction::Update,
        description,
    )
    .await;
    Ok(Mutation::ok(production, effects))
}

// DELETE /api/productions/:id
pub async fn delete_production(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
) -> AppResult<Mutation<Deleted<production::Model>>> {
    let production = find_owned(&*db, &identity, id).await?;
    Production::delete_by_id(id).exec(&*db).await?;

    record_event("productions", "delete_production", "Production batch deleted");
    let description = format!("Production deleted: {} chickens", production.chicken_count);
    let effects = record(
        &*db,
        &production,
        identity.user_id,
        HistoryAction::Delete,
        description,
    )
    .await;
    Ok(Mutation::ok(Deleted::new("Production", production), effects))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{at, caller, exec_ok, history_row, single_history, transaction_log};
    use crate::entities::history_entry::{self, HistoryKind};
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn batch(user_id: i32, chicken_count: i32) -> production::Model {
        production::Model {
            id: 5,
            user_id,
            chicken_count,
            mortality: 2,
            feed_consumption: 40.0,
            feed_cost: 100.0,
            vaccine_cost: 20.0,
            utility_cost: 10.0,
            other_cost: 5.0,
            revenue: 300.0,
            created_at: at(),
            updated_at: at(),
        }
    }

    fn history(data: &production::Model, action: HistoryAction) -> history_entry::Model {
        history_row(HistoryKind::Production, data, data.user_id, action)
    }

    #[test]
    fn stats_derive_costs_and_profit() {
        let stats = ProductionStats::from(ProductionTotals {
            chickens: Some(500),
            mortality: Some(4),
            feed_consumption: Some(120.0),
            feed_cost: Some(200.0),
            vaccine_cost: Some(50.0),
            utility_cost: Some(30.0),
            other_cost: Some(20.0),
            revenue: Some(1000.0),
            count: 3,
        });
        assert_eq!(stats.total_costs, 300.0);
        assert_eq!(stats.profit, 700.0);
        assert_eq!(stats.count, 3);

        let empty = ProductionStats::from(ProductionTotals::default());
        assert_eq!(empty.total_chickens, 0);
        assert_eq!(empty.profit, 0.0);
    }

    #[tokio::test]
    async fn create_writes_one_history_entry() {
        let created = batch(3, 120);
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![created.clone()]])
                .append_query_results([vec![history(&created, HistoryAction::Create)]])
                .into_connection(),
        );

        let payload = CreateProductionRequest {
            chicken_count: 120,
            mortality: 2,
            feed_consumption: 40.0,
            feed_cost: 100.0,
            vaccine_cost: 20.0,
            utility_cost: 10.0,
            other_cost: 5.0,
            revenue: 300.0,
        };
        let mutation =
            create_production(Extension(db.clone()), Extension(caller(3)), Json(payload))
                .await
                .unwrap();
        let response = axum::response::IntoResponse::into_response(mutation);
        assert_eq!(response.status(), axum::http::StatusCode::CREATED);

        let log = transaction_log(db);
        assert_eq!(log.len(), 2);
        let entry = single_history(&log);
        assert_eq!(entry.kind, "production");
        assert_eq!(entry.action, "create");
        assert_eq!(entry.user_id, 3);
        assert_eq!(entry.description, "Production: 120 chickens");
        assert_eq!(entry.data, serde_json::to_value(&created).unwrap());
    }

    #[tokio::test]
    async fn update_records_the_updated_batch() {
        let before = batch(3, 120);
        let after = production::Model {
            chicken_count: 118,
            mortality: 4,
            ..before.clone()
        };
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![before]])
                .append_query_results([vec![after.clone()]])
                .append_query_results([vec![history(&after, HistoryAction::Update)]])
                .into_connection(),
        );

        let payload = UpdateProductionRequest {
            chicken_count: Some(118),
            mortality: Some(4),
            ..UpdateProductionRequest::default()
        };
        let mutation = update_production(
            Extension(db.clone()),
            Extension(caller(3)),
            Path(5),
            Json(payload),
        )
        .await
        .unwrap();
        let response = axum::response::IntoResponse::into_response(mutation);
        assert_eq!(response.status(), axum::http::StatusCode::OK);

        let entry = single_history(&transaction_log(db));
        assert_eq!(entry.action, "update");
        assert_eq!(entry.description, "Production updated: 118 chickens");
        assert_eq!(entry.data, serde_json::to_value(&after).unwrap());
    }

    #[tokio::test]
    async fn negative_update_is_rejected_before_any_query() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let payload = UpdateProductionRequest {
            mortality: Some(-1),
            ..UpdateProductionRequest::default()
        };
        let err = update_production(
            Extension(db.clone()),
            Extension(caller(3)),
            Path(5),
            Json(payload),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(transaction_log(db).is_empty());
    }

    #[tokio::test]
    async fn strangers_cannot_delete() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![batch(3, 120)]])
                .into_connection(),
        );

        let err = delete_production(Extension(db), Extension(caller(4)), Path(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn missing_batch_is_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<production::Model>::new()])
                .into_connection(),
        );

        let err = delete_production(Extension(db), Extension(caller(3)), Path(9))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_records_the_removed_batch() {
        let removed = batch(3, 80);
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![removed.clone()]])
                .append_exec_results([exec_ok(1)])
                .append_query_results([vec![history(&removed, HistoryAction::Delete)]])
                .into_connection(),
        );

        delete_production(Extension(db.clone()), Extension(caller(3)), Path(5))
            .await
            .unwrap();

        let entry = single_history(&transaction_log(db));
        assert_eq!(entry.action, "delete");
        assert_eq!(entry.description, "Production deleted: 80 chickens");
        assert_eq!(entry.data, serde_json::to_value(&removed).unwrap());
    }
}
