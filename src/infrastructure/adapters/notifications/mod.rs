pub mod http_notification_adapter;
pub mod memory_notification_adapter;

// Re-export main adapters for convenience
pub use http_notification_adapter::HttpNotificationAdapter;
pub use memory_notification_adapter::InMemoryNotificationApi;
