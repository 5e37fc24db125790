use super::{record_event, RangeQuery};
use crate::audit::query::{self, Bucket, HistoryFilter, HistoryPage, KindStats, PageRequest, Period};
use crate::audit::HistoryView;
use crate::auth::Identity;
use crate::entities::history_entry::{self, HistoryKind};
use crate::error::{AppError, AppResult};
use axum::{
    extract::{Extension, Json, Path, Query},
    routing::{delete, get},
    Router,
};
use sea_orm::{DatabaseConnection, Iterable};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub fn routes() -> Router {
    Router::new()
        .route("/", get(list_history))
        .route("/stats", get(history_stats))
        .route("/type/:kind", get(history_by_type))
        .route("/user/:user_id", get(history_by_user))
        .route("/search", get(search_history))
        .route("/day", get(history_by_day))
        .route("/week", get(history_by_week))
        .route("/month", get(history_by_month))
        .route("/:id", delete(delete_history_entry))
}

pub fn parse_kind(raw: &str) -> AppResult<HistoryKind> {
    HistoryKind::iter()
        .find(|kind| kind.as_str() == raw)
        .ok_or_else(|| {
            let known: Vec<&str> = HistoryKind::iter().map(HistoryKind::as_str).collect();
            AppError::invalid("type", format!("must be one of {}", known.join(", ")))
        })
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl HistoryQuery {
    fn filter(&self) -> AppResult<HistoryFilter> {
        let range = RangeQuery {
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            limit: None,
        }
        .range()?;
        Ok(HistoryFilter {
            kind: self.kind.as_deref().map(parse_kind).transpose()?,
            user_id: None,
            start: range.start,
            end: range.end,
        })
    }
}

// GET /api/history
pub async fn list_history(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<HistoryPage>> {
    let filter = query.filter()?;
    let page = PageRequest::new(query.page, query.limit)?;
    Ok(Json(query::list(&*db, &filter, page).await?))
}

// GET /api/history/stats
pub async fn history_stats(
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> AppResult<Json<Vec<KindStats>>> {
    Ok(Json(query::stats(&*db).await?))
}

// GET /api/history/type/:kind
pub async fn history_by_type(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Path(kind): Path<String>,
) -> AppResult<Json<Vec<HistoryView>>> {
    let filter = HistoryFilter {
        kind: Some(parse_kind(&kind)?),
        ..HistoryFilter::default()
    };
    Ok(Json(query::recent(&*db, &filter).await?))
}

// GET /api/history/user/:user_id
pub async fn history_by_user(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Vec<HistoryView>>> {
    let filter = HistoryFilter {
        user_id: Some(user_id),
        ..HistoryFilter::default()
    };
    Ok(Json(query::recent(&*db, &filter).await?))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub keyword: String,
}

// GET /api/history/search
pub async fn search_history(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(search): Query<SearchQuery>,
) -> AppResult<Json<Vec<HistoryView>>> {
    Ok(Json(query::search(&*db, &search.keyword).await?))
}

async fn grouped(
    db: &DatabaseConnection,
    query: &HistoryQuery,
    period: Period,
) -> AppResult<Json<Vec<Bucket<HistoryView>>>> {
    let filter = query.filter()?;
    Ok(Json(query::grouped(db, &filter, period).await?))
}

// GET /api/history/day
pub async fn history_by_day(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<Bucket<HistoryView>>>> {
    grouped(&*db, &query, Period::Day).await
}

// GET /api/history/week
pub async fn history_by_week(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<Bucket<HistoryView>>>> {
    grouped(&*db, &query, Period::Week).await
}

// GET /api/history/month
pub async fn history_by_month(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<Bucket<HistoryView>>>> {
    grouped(&*db, &query, Period::Month).await
}

// DELETE /api/history/:id
pub async fn delete_history_entry(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<history_entry::Model>> {
    if !identity.is_admin() {
        return Err(AppError::Forbidden(
            "Only an admin may delete history entries".into(),
        ));
    }
    let removed = query::purge(&*db, id).await?;
    tracing::warn!(entry_id = %id, admin_id = identity.user_id, "history entry purged");
    record_event("history_entries", "purge", "History entry deleted");
    Ok(Json(removed))
}
