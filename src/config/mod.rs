pub mod application_settings;

pub use application_settings::{ApiSettings, BrokerSettings, RefreshSettings, Settings};
