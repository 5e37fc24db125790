//! Pure validation pass run before anything touches the database.
//!
//! Field rules are declared on the request DTOs with `validator`; the helpers
//! here flatten the results into a stable, field-addressed list.

use crate::error::{AppError, AppResult};
use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

pub const MAX_LIMIT: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Flattens nested `validator` output into `field`, `parent.field` and
/// `list[i].field` paths, sorted by path.
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out = Vec::new();
    collect("", errors, &mut out);
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

fn collect(prefix: &str, errors: &ValidationErrors, out: &mut Vec<FieldError>) {
    for (field, kind) in errors.errors() {
        let path = format!("{prefix}{field}");
        match kind {
            ValidationErrorsKind::Field(list) => {
                for e in list {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed `{}` check", e.code));
                    out.push(FieldError::new(path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(inner) => collect(&format!("{path}."), inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect(&format!("{path}[{index}]."), inner, out);
                }
            }
        }
    }
}

pub fn check<T: Validate>(value: &T) -> AppResult<()> {
    value.validate().map_err(AppError::from)
}

/// Validates every item of a batch; errors are reported as `field[i].name`.
pub fn check_all<T: Validate>(field: &str, items: &[T]) -> AppResult<()> {
    let mut out = Vec::new();
    for (index, item) in items.iter().enumerate() {
        if let Err(errors) = item.validate() {
            collect(&format!("{field}[{index}]."), &errors, &mut out);
        }
    }
    if items.is_empty() {
        out.push(FieldError::new(field, "must contain at least one item"));
    }
    if out.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(out))
    }
}

/// Accepts `HH:MM` in 24-hour time.
pub fn clock_time(field: &str, value: &str) -> Option<FieldError> {
    match NaiveTime::parse_from_str(value, "%H:%M") {
        Ok(_) => None,
        Err(_) => Some(FieldError::new(field, "expected a HH:MM time")),
    }
}

pub fn limit(value: Option<u64>, default: u64) -> AppResult<u64> {
    match value.unwrap_or(default) {
        0 => Err(AppError::invalid("limit", "must be at least 1")),
        n if n > MAX_LIMIT => Err(AppError::invalid(
            "limit",
            format!("must not exceed {MAX_LIMIT}"),
        )),
        n => Ok(n),
    }
}

pub fn date_range(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> AppResult<()> {
    match (start, end) {
        (Some(s), Some(e)) if s > e => Err(AppError::invalid(
            "start_date",
            "must not be after end_date",
        )),
        _ => Ok(()),
    }
}

/// Collapses a list of optional findings into a validation error.
pub fn finish(findings: impl IntoIterator<Item = Option<FieldError>>) -> AppResult<()> {
    let errors: Vec<FieldError> = findings.into_iter().flatten().collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}
