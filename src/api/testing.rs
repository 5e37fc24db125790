//! Fixtures shared by the handler tests.

use crate::auth::Identity;
use crate::entities::history_entry::{self, HistoryAction, HistoryKind};
use crate::entities::user::Role;
use chrono::NaiveDateTime;
use sea_orm::{DatabaseConnection, MockExecResult, Transaction, Value};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

pub fn at() -> NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2025, 3, 1)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

pub fn caller(user_id: i32) -> Identity {
    Identity {
        user_id,
        role: Role::User,
    }
}

pub fn admin(user_id: i32) -> Identity {
    Identity {
        user_id,
        role: Role::Admin,
    }
}

pub fn exec_ok(rows_affected: u64) -> MockExecResult {
    MockExecResult {
        last_insert_id: 0,
        rows_affected,
    }
}

/// Row the mock hands back from `INSERT ... RETURNING` on `history_entries`.
pub fn history_row<T: Serialize>(
    kind: HistoryKind,
    data: &T,
    user_id: i32,
    action: HistoryAction,
) -> history_entry::Model {
    history_entry::Model {
        id: uuid::Uuid::new_v4(),
        kind,
        data: serde_json::to_value(data).unwrap(),
        user_id,
        action,
        description: String::new(),
        metadata: None,
        created_at: at(),
    }
}

/// Takes the connection back from the handler and drains its log.
pub fn transaction_log(db: Arc<DatabaseConnection>) -> Vec<Transaction> {
    match Arc::try_unwrap(db) {
        Ok(db) => db.into_transaction_log(),
        Err(_) => panic!("connection is still shared"),
    }
}

/// A `history_entries` row as it was bound into the insert statement.
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenHistory {
    pub kind: String,
    pub action: String,
    pub user_id: i32,
    pub description: String,
    pub data: serde_json::Value,
}

fn text(value: &Value) -> String {
    match value {
        Value::String(Some(s)) => (**s).clone(),
        other => panic!("expected text, got {other:?}"),
    }
}

/// Every history row inserted in `log`, in statement order.
pub fn written_history(log: &[Transaction]) -> Vec<WrittenHistory> {
    let mut rows = Vec::new();
    for stmt in log.iter().flat_map(|t| t.statements()) {
        if !stmt.sql.starts_with(r#"INSERT INTO "history_entries""#) {
            continue;
        }
        let open = stmt.sql.find('(').unwrap();
        let close = stmt.sql.find(')').unwrap();
        let columns: Vec<&str> = stmt.sql[open + 1..close]
            .split(',')
            .map(|c| c.trim().trim_matches('"'))
            .collect();
        let values = &stmt.values.as_ref().unwrap().0;

        for chunk in values.chunks(columns.len()) {
            let row: HashMap<&str, &Value> = columns.iter().copied().zip(chunk).collect();
            rows.push(WrittenHistory {
                kind: text(row["kind"]),
                action: text(row["action"]),
                user_id: match row["user_id"] {
                    Value::Int(Some(id)) => *id,
                    other => panic!("expected user id, got {other:?}"),
                },
                description: text(row["description"]),
                data: match row["data"] {
                    Value::Json(Some(data)) => (**data).clone(),
                    other => panic!("expected json, got {other:?}"),
                },
            });
        }
    }
    rows
}

/// Asserts `log` wrote exactly one history row and returns it.
pub fn single_history(log: &[Transaction]) -> WrittenHistory {
    let mut rows = written_history(log);
    assert_eq!(rows.len(), 1, "expected one history row, got {rows:?}");
    rows.remove(0)
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
