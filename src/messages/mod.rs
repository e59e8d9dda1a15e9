//! Lifecycle messages and the buses that carry them

mod bus;
mod message;
mod sink;

pub use bus::{create_message_bus, AsyncMessageBus, MessageBus, SynchronousMessageBus};
pub use message::*;
pub use sink::{CollectingSink, MessageSink};
