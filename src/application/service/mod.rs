pub mod notifier;

pub use notifier::{NotificationCard, NotificationCenter};
