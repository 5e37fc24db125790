use axum::{extract::DefaultBodyLimit, routing::get};
use poultry_farm_server::config::Settings;
use poultry_farm_server::notifications::Mailer;
use poultry_farm_server::{api, migrator};
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env().expect("Invalid configuration");
    poultry_farm_server::telemetry::init_telemetry("poultry-farm-server", &settings.telemetry);

    let (prometheus_layer, metric_handle) = axum_prometheus::PrometheusMetricLayer::pair();

    let db = Database::connect(&settings.database_url)
        .await
        .expect("Failed to connect to database");

    migrator::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    poultry_farm_server::metrics::init_metrics(&db).await;

    let mailer = Mailer::new(&settings.mail);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .expect("SERVER_HOST/PORT do not form a socket address");

    let app = api::router(db, Arc::new(settings), mailer)
        .layer(prometheus_layer)
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .layer(DefaultBodyLimit::max(1024 * 1024));

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}
