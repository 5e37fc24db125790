//! Response wrappers for mutations that run follow-up steps after the
//! primary write.

use crate::error::ErrorResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedStep {
    pub step: &'static str,
    pub message: String,
}

/// Collects the outcome of each follow-up step. A failure is logged and
/// counted here; it never aborts the request.
#[derive(Debug, Default)]
pub struct SideEffects {
    failed: Vec<FailedStep>,
}

impl SideEffects {
    pub fn check<T, E: Display>(&mut self, step: &'static str, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(step, error = %e, "follow-up step failed");
                crate::metrics::side_effect_failed(step);
                self.failed.push(FailedStep {
                    step,
                    message: format!("{step} step failed"),
                });
                None
            }
        }
    }

    pub fn failed(&self) -> &[FailedStep] {
        &self.failed
    }
}

/// The primary result of a mutation plus whatever follow-up steps failed.
#[derive(Debug)]
pub struct Mutation<T> {
    status: StatusCode,
    data: T,
    effects: SideEffects,
}

impl<T> Mutation<T> {
    pub fn ok(data: T, effects: SideEffects) -> Self {
        Self {
            status: StatusCode::OK,
            data,
            effects,
        }
    }

    pub fn created(data: T, effects: SideEffects) -> Self {
        Self {
            status: StatusCode::CREATED,
            data,
            effects,
        }
    }
}

#[derive(Serialize)]
struct PartialFailure<T> {
    #[serde(flatten)]
    error: ErrorResponse,
    data: T,
    failed_steps: Vec<FailedStep>,
}

impl<T: Serialize> IntoResponse for Mutation<T> {
    fn into_response(self) -> Response {
        if self.effects.failed.is_empty() {
            return (self.status, Json(self.data)).into_response();
        }

        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let message = format!(
            "The change was saved but {} follow-up step(s) failed",
            self.effects.failed.len()
        );
        let error = ErrorResponse::new("PARTIAL_FAILURE", message, status);
        tracing::Span::current().record("error", "PARTIAL_FAILURE");

        let body = PartialFailure {
            error,
            data: self.data,
            failed_steps: self.effects.failed,
        };
        (status, Json(body)).into_response()
    }
}

/// Body for a successful delete: the removed record.
#[derive(Debug, Serialize)]
pub struct Deleted<T> {
    pub message: String,
    pub data: T,
}

impl<T> Deleted<T> {
    pub fn new(what: &str, data: T) -> Self {
        Self {
            message: format!("{what} deleted successfully"),
            data,
        }
    }
}
