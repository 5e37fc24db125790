//! Environmental monitoring: threshold evaluation over sensor readings and
//! the lifecycle of the alerts it raises.

pub mod alerts;
pub mod thresholds;

pub use alerts::CriticalPolicy;
pub use thresholds::{
    evaluate, recommend_adjustments, Adjustments, AlertCandidate, Bounds, Measurements, Parameter,
    ThresholdTable,
};
