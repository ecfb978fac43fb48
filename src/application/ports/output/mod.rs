pub mod broker_port;
pub mod notification_port;
