pub mod memory_broker;
pub mod stomp_frame;
pub mod websocket_transport;

pub use memory_broker::InMemoryBroker;
pub use websocket_transport::StompWebSocketTransport;
