use super::response::{Deleted, Mutation, SideEffects};
use super::{ensure_can_modify, now, parse_instant, record_event, RangeQuery};
use crate::audit::{self, HistorySnapshot, NewEntry};
use crate::auth::Identity;
use crate::entities::cost::{self, CostCategory};
use crate::entities::{history_entry::HistoryAction, Cost};
use crate::error::{AppError, AppResult};
use crate::validation;
use axum::{
    extract::{Extension, Json, Path, Query},
    routing::{get, put},
    Router,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, FromQueryResult,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, SelectModel, Selector, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use validator::Validate;

const DEFAULT_LIMIT: u64 = 50;

pub fn routes() -> Router {
    Router::new()
        .route("/", get(list_costs).post(create_cost))
        .route("/stats", get(cost_stats))
        .route("/total", get(total_costs))
        .route("/:id", put(update_cost).delete(delete_cost))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCostRequest {
    #[serde(alias = "type")]
    pub category: CostCategory,
    #[serde(default)]
    pub description: String,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub amount: f64,
    pub date: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateCostRequest {
    #[serde(alias = "type")]
    pub category: Option<CostCategory>,
    pub description: Option<String>,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub amount: Option<f64>,
    pub date: Option<String>,
}

fn describe(prefix: &str, cost: &cost::Model) -> String {
    format!("{prefix}: {} for {}", cost.amount, cost.category.as_str())
}

async fn record(
    db: &DatabaseConnection,
    cost: &cost::Model,
    actor: i32,
    action: HistoryAction,
    description: String,
) -> SideEffects {
    let mut effects = SideEffects::default();
    let entry = NewEntry::new(HistorySnapshot::Cost(cost.clone()), actor, action, description);
    effects.check("history", audit::record(db, entry).await);
    effects
}

// POST /api/costs
pub async fn create_cost(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateCostRequest>,
) -> AppResult<Mutation<cost::Model>> {
    validation::check(&payload)?;
    let now = now();
    let date = match payload.date.as_deref() {
        Some(raw) => parse_instant("date", raw)?,
        None => now,
    };

    let cost = cost::ActiveModel {
        user_id: Set(identity.user_id),
        category: Set(payload.category),
        description: Set(payload.description),
        amount: Set(payload.amount),
        date: Set(date),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&*db)
    .await?;

    record_event("costs", "create_cost", "Cost recorded");
    let description = describe("Cost added", &cost);
    let effects = record(
        &*db,
        &cost,
        identity.user_id,
        HistoryAction::Create,
        description,
    )
    .await;
    Ok(Mutation::created(cost, effects))
}

// GET /api/costs
pub async fn list_costs(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<Vec<cost::Model>>> {
    let range = query.range()?;
    let limit = validation::limit(query.limit, DEFAULT_LIMIT)?;
    let costs = Cost::find()
        .filter(range.condition(cost::Column::Date))
        .order_by_desc(cost::Column::Date)
        .limit(limit)
        .all(&*db)
        .await?;
    Ok(Json(costs))
}

async fn find_owned(
    db: &DatabaseConnection,
    identity: &Identity,
    id: i32,
) -> AppResult<cost::Model> {
    let cost = Cost::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Cost"))?;
    ensure_can_modify(identity, cost.user_id, "cost")?;
    Ok(cost)
}

// PUT /api/costs/:id
pub async fn update_cost(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateCostRequest>,
) -> AppResult<Mutation<cost::Model>> {
    validation::check(&payload)?;
    let date = payload
        .date
        .as_deref()
        .map(|raw| parse_instant("date", raw))
        .transpose()?;
    let cost = find_owned(&*db, &identity, id).await?;

    let mut active = cost.into_active_model();
    if let Some(v) = payload.category {
        active.category = Set(v);
    }
    if let Some(v) = payload.description {
        active.description = Set(v);
    }
    if let Some(v) = payload.amount {
        active.amount = Set(v);
    }
    if let Some(v) = date {
        active.date = Set(v);
    }
    active.updated_at = Set(now());
    let cost = active.update(&*db).await?;

    record_event("costs", "update_cost", "Cost updated");
    let description = describe("Cost updated", &cost);
    let effects = record(
        &*db,
        &cost,
        identity.user_id,
        HistoryAction::Update,
        description,
    )
    .await;
    Ok(Mutation::ok(cost, effects))
}

// DELETE /api/costs/:id
pub async fn delete_cost(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
) -> AppResult<Mutation<Deleted<cost::Model>>> {
    let cost = find_owned(&*db, &identity, id).await?;
    Cost::delete_by_id(id).exec(&*db).await?;

    record_event("costs", "delete_cost", "Cost deleted");
    let description = describe("Cost deleted", &cost);
    let effects = record(
        &*db,
        &cost,
        identity.user_id,
        HistoryAction::Delete,
        description,
    )
    .await;
    Ok(Mutation::ok(Deleted::new("Cost", cost), effects))
}

#[derive(Debug, FromQueryResult)]
pub struct CategoryGroup {
    pub category: CostCategory,
    pub total_amount: Option<f64>,
    pub count: i64,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct CostStats {
    pub category: CostCategory,
    pub total_amount: f64,
    pub average_amount: f64,
    pub count: i64,
}

impl From<CategoryGroup> for CostStats {
    fn from(g: CategoryGroup) -> Self {
        let total = g.total_amount.unwrap_or(0.0);
        Self {
            category: g.category,
            total_amount: total,
            average_amount: if g.count > 0 { total / g.count as f64 } else { 0.0 },
            count: g.count,
        }
    }
}

fn grouped_by_category(cond: Condition) -> Selector<SelectModel<CategoryGroup>> {
    Cost::find()
        .select_only()
        .column(cost::Column::Category)
        .column_as(cost::Column::Amount.sum(), "total_amount")
        .column_as(cost::Column::Id.count(), "count")
        .filter(cond)
        .group_by(cost::Column::Category)
        .order_by_asc(cost::Column::Category)
        .into_model::<CategoryGroup>()
}

// GET /api/costs/stats
pub async fn cost_stats(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<Vec<CostStats>>> {
    let range = query.range()?;
    let groups = grouped_by_category(range.condition(cost::Column::Date))
        .all(&*db)
        .await
        .map_err(AppError::aggregate)?;
    Ok(Json(groups.into_iter().map(Into::into).collect()))
}

#[derive(Debug, PartialEq, Serialize)]
pub struct CostTotal {
    pub total_costs: f64,
    pub costs_by_category: BTreeMap<&'static str, f64>,
}

impl CostTotal {
    pub fn from_groups(groups: &[CategoryGroup]) -> Self {
        let costs_by_category: BTreeMap<_, _> = groups
            .iter()
            .map(|g| (g.category.as_str(), g.total_amount.unwrap_or(0.0)))
            .collect();
        Self {
            total_costs: costs_by_category.values().sum(),
            costs_by_category,
        }
    }
}

// GET /api/costs/total
pub async fn total_costs(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
) -> AppResult<Json<CostTotal>> {
    let groups = grouped_by_category(
        Condition::all().add(cost::Column::UserId.eq(identity.user_id)),
    )
    .all(&*db)
    .await
    .map_err(AppError::aggregate)?;
    Ok(Json(CostTotal::from_groups(&groups)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{
        admin, at, caller, exec_ok, history_row, single_history, transaction_log,
    };
    use crate::entities::history_entry::{self, HistoryKind};
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn group(category: CostCategory, total: f64, count: i64) -> CategoryGroup {
        CategoryGroup {
            category,
            total_amount: Some(total),
            count,
        }
    }

    fn expense(user_id: i32, amount: f64) -> cost::Model {
        cost::Model {
            id: 8,
            user_id,
            category: CostCategory::Food,
            description: "layer mash".into(),
            amount,
            date: at(),
            created_at: at(),
            updated_at: at(),
        }
    }

    fn history(data: &cost::Model, actor: i32, action: HistoryAction) -> history_entry::Model {
        history_row(HistoryKind::Cost, data, actor, action)
    }

    #[test]
    fn totals_sum_every_category() {
        let total = CostTotal::from_groups(&[
            group(CostCategory::Food, 300.0, 3),
            group(CostCategory::Health, 45.5, 1),
        ]);
        assert_eq!(total.total_costs, 345.5);
        assert_eq!(total.costs_by_category["food"], 300.0);
        assert_eq!(total.costs_by_category.len(), 2);
        assert_eq!(CostTotal::from_groups(&[]).total_costs, 0.0);
    }

    #[test]
    fn category_average() {
        let stats = CostStats::from(group(CostCategory::Water, 90.0, 4));
        assert_eq!(stats.average_amount, 22.5);
    }

    #[test]
    fn request_accepts_type_as_category() {
        let request: CreateCostRequest =
            serde_json::from_str(r#"{"type":"equipment","amount":12.0}"#).unwrap();
        assert_eq!(request.category, CostCategory::Equipment);
        assert!(request.date.is_none());
        let recorded = cost::Model {
            category: request.category,
            amount: request.amount,
            ..expense(1, 0.0)
        };
        assert_eq!(describe("Cost added", &recorded), "Cost added: 12 for equipment");
    }

    #[tokio::test]
    async fn create_records_the_new_cost() {
        let created = expense(2, 150.0);
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![created.clone()]])
                .append_query_results([vec![history(&created, 2, HistoryAction::Create)]])
                .into_connection(),
        );

        let payload = CreateCostRequest {
            category: CostCategory::Food,
            description: "layer mash".into(),
            amount: 150.0,
            date: Some("2025-03-01".into()),
        };
        let mutation = create_cost(Extension(db.clone()), Extension(caller(2)), Json(payload))
            .await
            .unwrap();
        let response = axum::response::IntoResponse::into_response(mutation);
        assert_eq!(response.status(), axum::http::StatusCode::CREATED);

        let entry = single_history(&transaction_log(db));
        assert_eq!(entry.kind, "cost");
        assert_eq!(entry.action, "create");
        assert_eq!(entry.description, "Cost added: 150 for food");
        assert_eq!(entry.data, serde_json::to_value(&created).unwrap());
    }

    #[tokio::test]
    async fn bad_date_is_rejected_before_insert() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let payload = CreateCostRequest {
            category: CostCategory::Food,
            description: String::new(),
            amount: 1.0,
            date: Some("last tuesday".into()),
        };
        let err = create_cost(Extension(db.clone()), Extension(caller(2)), Json(payload))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(transaction_log(db).is_empty());
    }

    #[tokio::test]
    async fn admin_update_is_recorded_against_the_admin() {
        let before = expense(2, 150.0);
        let after = cost::Model {
            amount: 175.0,
            category: CostCategory::Health,
            ..before.clone()
        };
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![before]])
                .append_query_results([vec![after.clone()]])
                .append_query_results([vec![history(&after, 1, HistoryAction::Update)]])
                .into_connection(),
        );

        let payload = UpdateCostRequest {
            category: Some(CostCategory::Health),
            amount: Some(175.0),
            ..UpdateCostRequest::default()
        };
        let mutation = update_cost(
            Extension(db.clone()),
            Extension(admin(1)),
            Path(8),
            Json(payload),
        )
        .await
        .unwrap();
        let response = axum::response::IntoResponse::into_response(mutation);
        assert_eq!(response.status(), axum::http::StatusCode::OK);

        let entry = single_history(&transaction_log(db));
        assert_eq!(entry.action, "update");
        assert_eq!(entry.user_id, 1);
        assert_eq!(entry.description, "Cost updated: 175 for health");
        assert_eq!(entry.data, serde_json::to_value(&after).unwrap());
    }

    #[tokio::test]
    async fn delete_records_the_removed_cost() {
        let removed = expense(2, 60.0);
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![removed.clone()]])
                .append_exec_results([exec_ok(1)])
                .append_query_results([vec![history(&removed, 2, HistoryAction::Delete)]])
                .into_connection(),
        );

        delete_cost(Extension(db.clone()), Extension(caller(2)), Path(8))
            .await
            .unwrap();

        let entry = single_history(&transaction_log(db));
        assert_eq!(entry.action, "delete");
        assert_eq!(entry.data, serde_json::to_value(&removed).unwrap());
    }

    #[tokio::test]
    async fn strangers_cannot_update() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![expense(2, 60.0)]])
                .into_connection(),
        );
        let err = update_cost(
            Extension(db),
            Extension(caller(3)),
            Path(8),
            Json(UpdateCostRequest::default()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
