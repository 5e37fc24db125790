use crate::entities::alert::AlertCategory;
use crate::entities::history_entry::{HistoryAction, HistoryKind};
use crate::entities::{EnvironmentalReading, User};
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};

/// Seeds the totals gauges from the database at start.
pub async fn init_metrics(db: &DatabaseConnection) {
    let user_count = User::find().count(db).await.unwrap_or(0);
    metrics::gauge!("farm_users_total").set(user_count as f64);

    let reading_count = EnvironmentalReading::find().count(db).await.unwrap_or(0);
    metrics::gauge!("farm_readings_total").set(reading_count as f64);

    tracing::info!(
        "Initialized metrics: Users={}, Readings={}",
        user_count,
        reading_count
    );
}

pub fn user_registered() {
    metrics::counter!("farm_users_registered_total").increment(1);
    metrics::gauge!("farm_users_total").increment(1.0);
}

pub fn reading_stored() {
    metrics::gauge!("farm_readings_total").increment(1.0);
}

pub fn alert_raised(category: AlertCategory) {
    metrics::counter!("farm_alerts_raised_total", "category" => category.as_str()).increment(1);
}

pub fn history_recorded(kind: HistoryKind, action: HistoryAction, count: u64) {
    metrics::counter!(
        "farm_history_entries_total",
        "kind" => kind.as_str(),
        "action" => action.as_str()
    )
    .increment(count);
}

pub fn side_effect_failed(step: &'static str) {
    metrics::counter!("farm_side_effect_failures_total", "step" => step).increment(1);
}

pub fn mail_sent() {
    metrics::counter!("farm_mail_sent_total").increment(1);
}

pub fn mail_failed() {
    metrics::counter!("farm_mail_failed_total").increment(1);
}
