pub mod alert;
pub mod alert_action;
pub mod cost;
pub mod environmental_reading;
pub mod feeding;
pub mod history_entry;
pub mod production;
pub mod user;
pub mod vaccine;

pub use alert::Entity as Alert;
pub use alert_action::Entity as AlertAction;
pub use cost::Entity as Cost;
pub use environmental_reading::Entity as EnvironmentalReading;
pub use feeding::Entity as Feeding;
pub use history_entry::Entity as HistoryEntry;
pub use production::Entity as Production;
pub use user::Entity as User;
pub use vaccine::Entity as Vaccine;

pub mod prelude;
