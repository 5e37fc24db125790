pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod entities;
pub mod error;
pub mod metrics;
pub mod migrator;
pub mod monitoring;
pub mod notifications;
pub mod telemetry;
pub mod validation;

pub use sea_orm;
