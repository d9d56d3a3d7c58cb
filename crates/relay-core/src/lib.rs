pub mod dispatcher;
pub mod ids;
pub mod protocol;
pub mod registry;

pub use dispatcher::{
    ConnectionState, Delivery, Dispatcher, DispatcherOptions, Recipients, ABSENT_SENDER,
};
pub use ids::ConnectionId;
pub use protocol::{ChatMessage, InboundEvent, OutboundEvent, ProtocolError};
pub use registry::Registry;
