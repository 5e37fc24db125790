pub use super::alert::{AlertCategory, AlertStatus};
pub use super::cost::CostCategory;
pub use super::history_entry::{HistoryAction, HistoryKind};
pub use super::user::Role;
pub use super::{
    Alert, AlertAction, Cost, EnvironmentalReading, Feeding, HistoryEntry, Production, User,
    Vaccine,
};
