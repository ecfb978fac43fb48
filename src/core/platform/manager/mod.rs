pub mod category_resolver;
pub mod connection_manager;
pub mod notification_store;
pub mod read_state_coordinator;
pub mod topic_router;
