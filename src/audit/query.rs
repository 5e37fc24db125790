//! Read side of the audit trail. Everything is newest first.

use super::HistoryView;
use crate::entities::history_entry::{self, HistoryKind};
use crate::entities::{HistoryEntry, User};
use crate::error::{AppError, AppResult};
use crate::validation;
use chrono::{Datelike, NaiveDateTime};
use sea_orm::sea_query::{Expr, Func, LikeExpr};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, FromQueryResult, LoaderTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Cap for the fixed-size "latest" listings.
pub const RECENT_LIMIT: u64 = 50;
pub const DEFAULT_PAGE_LIMIT: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
    offset: u64,
}

impl PageRequest {
    pub fn new(page: Option<u64>, limit: Option<u64>) -> AppResult<Self> {
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(AppError::invalid("page", "must be at least 1"));
        }
        let limit = validation::limit(limit, DEFAULT_PAGE_LIMIT)?;
        // Postgres OFFSET is a signed bigint.
        let offset = (page - 1)
            .checked_mul(limit)
            .filter(|offset| *offset <= i64::MAX as u64)
            .ok_or_else(|| AppError::invalid("page", "is beyond the last possible page"))?;
        Ok(Self {
            page,
            limit,
            offset,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(total: u64, request: &PageRequest) -> Self {
        Self {
            total,
            page: request.page,
            pages: total.div_ceil(request.limit),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryPage {
    pub history: Vec<HistoryView>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub kind: Option<HistoryKind>,
    pub user_id: Option<i32>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl HistoryFilter {
    fn condition(&self) -> Condition {
        let mut cond = Condition::all();
        if let Some(kind) = self.kind {
            cond = cond.add(history_entry::Column::Kind.eq(kind));
        }
        if let Some(user_id) = self.user_id {
            cond = cond.add(history_entry::Column::UserId.eq(user_id));
        }
        if let Some(start) = self.start {
            cond = cond.add(history_entry::Column::CreatedAt.gte(start));
        }
        if let Some(end) = self.end {
            cond = cond.add(history_entry::Column::CreatedAt.lte(end));
        }
        cond
    }
}

async fn with_actors(
    db: &DatabaseConnection,
    entries: Vec<history_entry::Model>,
) -> AppResult<Vec<HistoryView>> {
    let actors = entries.load_one(User, db).await?;
    entries
        .into_iter()
        .zip(actors)
        .map(|(entry, actor)| HistoryView::new(entry, actor))
        .collect::<Result<_, _>>()
        .map_err(|e| AppError::Internal(format!("undecodable history entry: {e}")))
}

pub async fn list(
    db: &DatabaseConnection,
    filter: &HistoryFilter,
    page: PageRequest,
) -> AppResult<HistoryPage> {
    let base = HistoryEntry::find().filter(filter.condition());
    let total = base.clone().count(db).await?;
    let entries = base
        .order_by_desc(history_entry::Column::CreatedAt)
        .offset(page.offset())
        .limit(page.limit)
        .all(db)
        .await?;

    Ok(HistoryPage {
        history: with_actors(db, entries).await?,
        pagination: Pagination::new(total, &page),
    })
}

/// The latest `RECENT_LIMIT` entries matching `filter`.
pub async fn recent(
    db: &DatabaseConnection,
    filter: &HistoryFilter,
) -> AppResult<Vec<HistoryView>> {
    let entries = HistoryEntry::find()
        .filter(filter.condition())
        .order_by_desc(history_entry::Column::CreatedAt)
        .limit(RECENT_LIMIT)
        .all(db)
        .await?;
    with_actors(db, entries).await
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Case-insensitive substring match on the description.
pub async fn search(db: &DatabaseConnection, keyword: &str) -> AppResult<Vec<HistoryView>> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return Err(AppError::invalid("keyword", "must not be empty"));
    }
    let pattern = format!("%{}%", escape_like(&keyword.to_lowercase()));

    let entries = HistoryEntry::find()
        .filter(
            Expr::expr(Func::lower(Expr::col((
                HistoryEntry,
                history_entry::Column::Description,
            ))))
            .like(LikeExpr::new(pattern).escape('\\')),
        )
        .order_by_desc(history_entry::Column::CreatedAt)
        .limit(RECENT_LIMIT)
        .all(db)
        .await?;
    with_actors(db, entries).await
}

#[derive(Debug, Clone, PartialEq, FromQueryResult, Serialize)]
pub struct KindStats {
    pub kind: HistoryKind,
    pub count: i64,
    pub last_action: Option<NaiveDateTime>,
}

pub async fn stats(db: &DatabaseConnection) -> AppResult<Vec<KindStats>> {
    HistoryEntry::find()
        .select_only()
        .column(history_entry::Column::Kind)
        .column_as(history_entry::Column::Id.count(), "count")
        .column_as(history_entry::Column::CreatedAt.max(), "last_action")
        .group_by(history_entry::Column::Kind)
        .order_by_asc(history_entry::Column::Kind)
        .into_model::<KindStats>()
        .all(db)
        .await
        .map_err(AppError::aggregate)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
}

/// Calendar bucket. Weeks are ISO weeks, keyed by ISO year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PeriodKey {
    pub year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
}

impl Period {
    pub fn key(self, at: NaiveDateTime) -> PeriodKey {
        match self {
            Period::Day => PeriodKey {
                year: at.year(),
                month: Some(at.month()),
                week: None,
                day: Some(at.day()),
            },
            Period::Week => {
                let iso = at.iso_week();
                PeriodKey {
                    year: iso.year(),
                    month: None,
                    week: Some(iso.week()),
                    day: None,
                }
            }
            Period::Month => PeriodKey {
                year: at.year(),
                month: Some(at.month()),
                week: None,
                day: None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Bucket<T> {
    pub key: PeriodKey,
    pub entries: Vec<T>,
    pub count: usize,
}

/// Groups items by calendar period, newest bucket first and newest item
/// first inside each bucket.
pub fn bucket_by<T>(
    items: Vec<T>,
    period: Period,
    at: impl Fn(&T) -> NaiveDateTime,
) -> Vec<Bucket<T>> {
    let mut groups: BTreeMap<PeriodKey, Vec<T>> = BTreeMap::new();
    for item in items {
        groups.entry(period.key(at(&item))).or_default().push(item);
    }
    groups
        .into_iter()
        .rev()
        .map(|(key, mut entries)| {
            entries.sort_by_key(|e| std::cmp::Reverse(at(e)));
            Bucket {
                key,
                count: entries.len(),
                entries,
            }
        })
        .collect()
}

pub async fn grouped(
    db: &DatabaseConnection,
    filter: &HistoryFilter,
    period: Period,
) -> AppResult<Vec<Bucket<HistoryView>>> {
    let entries = HistoryEntry::find()
        .filter(filter.condition())
        .order_by_desc(history_entry::Column::CreatedAt)
        .all(db)
        .await?;
    let views = with_actors(db, entries).await?;
    Ok(bucket_by(views, period, |v| v.created_at))
}

/// Removes one entry and returns it.
pub async fn purge(db: &DatabaseConnection, id: Uuid) -> AppResult<history_entry::Model> {
    let entry = HistoryEntry::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("History entry"))?;
    HistoryEntry::delete_by_id(id).exec(db).await?;
    Ok(entry)
}
