pub mod category;
pub mod identity;
pub mod notification;
