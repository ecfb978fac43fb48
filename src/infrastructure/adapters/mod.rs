pub mod broker;
pub mod notifications;
