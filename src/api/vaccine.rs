use super::response::{Deleted, Mutation, SideEffects};
use super::{ensure_can_modify, now, record_event};
use crate::audit::{self, HistorySnapshot, NewEntry};
use crate::auth::Identity;
use crate::entities::{history_entry::HistoryAction, vaccine, Vaccine};
use crate::error::{AppError, AppResult};
use crate::validation::{self, FieldError};
use axum::{
    extract::{Extension, Json, Path, Query},
    routing::{get, put},
    Router,
};
use chrono::{Duration, NaiveDate};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

const DEFAULT_UPCOMING_DAYS: i64 = 7;
const MAX_UPCOMING_DAYS: i64 = 366;

pub fn routes() -> Router {
    Router::new()
        .route("/", get(list_vaccines).post(create_vaccine))
        .route("/upcoming", get(upcoming_vaccines))
        .route("/user", get(list_my_vaccines))
        .route("/stats", get(vaccine_stats))
        .route("/:id", put(update_vaccine).delete(delete_vaccine))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVaccineRequest {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub name: String,
    pub date_administered: NaiveDate,
    pub next_due_date: NaiveDate,
    pub batch_number: Option<String>,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub number_of_chickens: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateVaccineRequest {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub name: Option<String>,
    pub date_administered: Option<NaiveDate>,
    pub next_due_date: Option<NaiveDate>,
    pub batch_number: Option<String>,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub number_of_chickens: Option<i32>,
    pub notes: Option<String>,
}

pub fn due_after_administered(administered: NaiveDate, next_due: NaiveDate) -> Option<FieldError> {
    (next_due < administered).then(|| {
        FieldError::new("next_due_date", "must not be earlier than date_administered")
    })
}

async fn record(
    db: &DatabaseConnection,
    vaccine: &vaccine::Model,
    actor: i32,
    action: HistoryAction,
    description: String,
) -> SideEffects {
    let mut effects = SideEffects::default();
    let entry = NewEntry::new(
        HistorySnapshot::Vaccine(vaccine.clone()),
        actor,
        action,
        description,
    );
    effects.check("history", audit::record(db, entry).await);
    effects
}

// POST /api/vaccins
pub async fn create_vaccine(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateVaccineRequest>,
) -> AppResult<Mutation<vaccine::Model>> {
    validation::check(&payload)?;
    validation::finish([due_after_administered(
        payload.date_administered,
        payload.next_due_date,
    )])?;

    let now = now();
    let vaccine = vaccine::ActiveModel {
        user_id: Set(identity.user_id),
        name: Set(payload.name),
        date_administered: Set(payload.date_administered),
        next_due_date: Set(payload.next_due_date),
        batch_number: Set(payload.batch_number),
        number_of_chickens: Set(payload.number_of_chickens),
        notes: Set(payload.notes),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&*db)
    .await?;

    record_event("vaccines", "create_vaccine", "Vaccination recorded");
    let description = format!("New vaccine: {}", vaccine.name);
    let effects = record(
        &*db,
        &vaccine,
        identity.user_id,
        HistoryAction::Create,
        description,
    )
    .await;
    Ok(Mutation::created(vaccine, effects))
}

// GET /api/vaccins
pub async fn list_vaccines(
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> AppResult<Json<Vec<vaccine::Model>>> {
    let vaccines = Vaccine::find()
        .order_by_desc(vaccine::Column::DateAdministered)
        .all(&*db)
        .await?;
    Ok(Json(vaccines))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpcomingQuery {
    pub days: Option<i64>,
}

/// `[today, today + days]`, inclusive.
pub fn upcoming_window(today: NaiveDate, days: Option<i64>) -> AppResult<(NaiveDate, NaiveDate)> {
    let days = days.unwrap_or(DEFAULT_UPCOMING_DAYS);
    if !(0..=MAX_UPCOMING_DAYS).contains(&days) {
        return Err(AppError::invalid(
            "days",
            format!("must be between 0 and {MAX_UPCOMING_DAYS}"),
        ));
    }
    Ok((today, today + Duration::days(days)))
}

// GET /api/vaccins/upcoming
pub async fn upcoming_vaccines(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(query): Query<UpcomingQuery>,
) -> AppResult<Json<Vec<vaccine::Model>>> {
    let (from, until) = upcoming_window(chrono::Utc::now().date_naive(), query.days)?;
    let vaccines = Vaccine::find()
        .filter(vaccine::Column::NextDueDate.between(from, until))
        .order_by_asc(vaccine::Column::NextDueDate)
        .all(&*db)
        .await?;
    Ok(Json(vaccines))
}

// GET /api/vaccins/user
pub async fn list_my_vaccines(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
) -> AppResult<Json<Vec<vaccine::Model>>> {
    let vaccines = Vaccine::find()
        .filter(vaccine::Column::UserId.eq(identity.user_id))
        .order_by_desc(vaccine::Column::DateAdministered)
        .all(&*db)
        .await?;
    Ok(Json(vaccines))
}

#[derive(Debug, FromQueryResult)]
struct VaccineGroup {
    name: String,
    count: i64,
    total_chickens: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct VaccineStats {
    pub name: String,
    pub count: i64,
    pub total_chickens: i64,
}

// GET /api/vaccins/stats
pub async fn vaccine_stats(
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> AppResult<Json<Vec<VaccineStats>>> {
    let groups = Vaccine::find()
        .select_only()
        .column(vaccine::Column::Name)
        .column_as(vaccine::Column::Id.count(), "count")
        .column_as(vaccine::Column::NumberOfChickens.sum(), "total_chickens")
        .group_by(vaccine::Column::Name)
        .order_by_asc(vaccine::Column::Name)
        .into_model::<VaccineGroup>()
        .all(&*db)
        .await
        .map_err(AppError::aggregate)?;

    Ok(Json(
        groups
            .into_iter()
            .map(|g| VaccineStats {
                name: g.name,
                count: g.count,
                total_chickens: g.total_chickens.unwrap_or(0),
            })
            .collect(),
    ))
}

async fn find_owned(
    db: &DatabaseConnection,
    identity: &Identity,
    id: i32,
) -> AppResult<vaccine::Model> {
    let vaccine = Vaccine::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Vaccine"))?;
    ensure_can_modify(identity, vaccine.user_id, "vaccine")?;
    Ok(vaccine)
}

// PUT /api/vaccins/:id
pub async fn update_vaccine(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateVaccineRequest>,
) -> AppResult<Mutation<vaccine::Model>> {
    validation::check(&payload)?;
    let vaccine = find_owned(&*db, &identity, id).await?;

    let administered = payload.date_administered.unwrap_or(vaccine.date_administered);
    let next_due = payload.next_due_date.unwrap_or(vaccine.next_due_date);
    validation::finish([due_after_administered(administered, next_due)])?;

    let mut active = vaccine.into_active_model();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    active.date_administered = Set(administered);
    active.next_due_date = Set(next_due);
    if let Some(batch) = payload.batch_number {
        active.batch_number = Set(Some(batch));
    }
    if let Some(count) = payload.number_of_chickens {
        active.number_of_chickens = Set(Some(count));
    }
    if let Some(notes) = payload.notes {
        active.notes = Set(Some(notes));
    }
    active.updated_at = Set(now());
    let vaccine = active.update(&*db).await?;

    record_event("vaccines", "update_vaccine", "Vaccination updated");
    let description = format!("Vaccine updated: {}", vaccine.name);
    let effects = record(
        &*db,
        &vaccine,
        identity.user_id,
        HistoryAction::Update,
        description,
    )
    .await;
    Ok(Mutation::ok(vaccine, effects))
}

// DELETE /api/vaccins/:id
pub async fn delete_vaccine(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
) -> AppResult<Mutation<Deleted<vaccine::Model>>> {
    let vaccine = find_owned(&*db, &identity, id).await?;
    Vaccine::delete_by_id(id).exec(&*db).await?;

    record_event("vaccines", "delete_vaccine", "Vaccination deleted");
    let description = format!("Vaccine deleted: {}", vaccine.name);
    let effects = record(
        &*db,
        &vaccine,
        identity.user_id,
        HistoryAction::Delete,
        description,
    )
    .await;
    Ok(Mutation::ok(Deleted::new("Vaccine", vaccine), effects))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{at, caller, exec_ok, history_row, single_history, transaction_log};
    use crate::entities::history_entry::{self, HistoryKind};
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn dose(user_id: i32) -> vaccine::Model {
        vaccine::Model {
            id: 4,
            user_id,
            name: "Newcastle".into(),
            date_administered: day(3, 1),
            next_due_date: day(4, 1),
            batch_number: Some("NC-17".into()),
            number_of_chickens: Some(200),
            notes: None,
            created_at: at(),
            updated_at: at(),
        }
    }

    fn history(data: &vaccine::Model, action: HistoryAction) -> history_entry::Model {
        history_row(HistoryKind::Vaccine, data, data.user_id, action)
    }

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    #[test]
    fn next_dose_cannot_precede_the_first() {
        assert!(due_after_administered(day(3, 10), day(3, 1)).is_some());
        assert!(due_after_administered(day(3, 10), day(3, 10)).is_none());
        assert!(due_after_administered(day(3, 10), day(4, 10)).is_none());
    }

    #[test]
    fn upcoming_defaults_to_a_week() {
        assert_eq!(
            upcoming_window(day(3, 1), None).unwrap(),
            (day(3, 1), day(3, 8))
        );
        assert_eq!(
            upcoming_window(day(3, 1), Some(30)).unwrap(),
            (day(3, 1), day(3, 31))
        );
        assert!(upcoming_window(day(3, 1), Some(-1)).is_err());
    }

    #[test]
    fn empty_name_fails_validation() {
        let request = CreateVaccineRequest {
            name: String::new(),
            date_administered: day(3, 1),
            next_due_date: day(4, 1),
            batch_number: None,
            number_of_chickens: Some(-5),
            notes: None,
        };
        let Err(AppError::Validation(fields)) = validation::check(&request) else {
            panic!("expected validation error");
        };
        let names: Vec<_> = fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(names, vec!["name", "number_of_chickens"]);
    }

    #[tokio::test]
    async fn create_records_the_new_vaccine() {
        let created = dose(6);
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![created.clone()]])
                .append_query_results([vec![history(&created, HistoryAction::Create)]])
                .into_connection(),
        );

        let payload = CreateVaccineRequest {
            name: "Newcastle".into(),
            date_administered: day(3, 1),
            next_due_date: day(4, 1),
            batch_number: Some("NC-17".into()),
            number_of_chickens: Some(200),
            notes: None,
        };
        let mutation = create_vaccine(Extension(db.clone()), Extension(caller(6)), Json(payload))
            .await
            .unwrap();
        let response = axum::response::IntoResponse::into_response(mutation);
        assert_eq!(response.status(), axum::http::StatusCode::CREATED);

        let entry = single_history(&transaction_log(db));
        assert_eq!(entry.kind, "vaccine");
        assert_eq!(entry.action, "create");
        assert_eq!(entry.description, "New vaccine: Newcastle");
        assert_eq!(entry.data, serde_json::to_value(&created).unwrap());
    }

    #[tokio::test]
    async fn update_checks_dates_against_the_stored_record() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![dose(6)]])
                .into_connection(),
        );
        let payload = UpdateVaccineRequest {
            next_due_date: Some(day(2, 1)),
            ..UpdateVaccineRequest::default()
        };
        let err = update_vaccine(
            Extension(db.clone()),
            Extension(caller(6)),
            Path(4),
            Json(payload),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        // Only the lookup ran.
        assert_eq!(transaction_log(db).len(), 1);
    }

    #[tokio::test]
    async fn update_records_the_updated_vaccine() {
        let before = dose(6);
        let after = vaccine::Model {
            next_due_date: day(5, 1),
            notes: Some("booster".into()),
            ..before.clone()
        };
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![before]])
                .append_query_results([vec![after.clone()]])
                .append_query_results([vec![history(&after, HistoryAction::Update)]])
                .into_connection(),
        );
        let payload = UpdateVaccineRequest {
            next_due_date: Some(day(5, 1)),
            notes: Some("booster".into()),
            ..UpdateVaccineRequest::default()
        };
        update_vaccine(Extension(db.clone()), Extension(caller(6)), Path(4), Json(payload))
            .await
            .unwrap();

        let entry = single_history(&transaction_log(db));
        assert_eq!(entry.action, "update");
        assert_eq!(entry.description, "Vaccine updated: Newcastle");
        assert_eq!(entry.data, serde_json::to_value(&after).unwrap());
    }

    #[tokio::test]
    async fn delete_records_the_removed_vaccine() {
        let removed = dose(6);
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![removed.clone()]])
                .append_exec_results([exec_ok(1)])
                .append_query_results([vec![history(&removed, HistoryAction::Delete)]])
                .into_connection(),
        );

        delete_vaccine(Extension(db.clone()), Extension(caller(6)), Path(4))
            .await
            .unwrap();

        let entry = single_history(&transaction_log(db));
        assert_eq!(entry.action, "delete");
        assert_eq!(entry.description, "Vaccine deleted: Newcastle");
        assert_eq!(entry.data, serde_json::to_value(&removed).unwrap());
    }
}
