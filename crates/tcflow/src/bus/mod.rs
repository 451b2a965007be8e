//! Command, query, and event buses.
//!
//! Each bus is a registry from message type to handler. Handlers are
//! registered during wiring, before any traffic; only the event bus
//! fans out to more than one receiver.

pub mod command;
pub mod event;
pub mod query;

pub use command::{Command, CommandBus, CommandHandler};
pub use event::{EventBus, EventSubscriber};
pub use query::{Query, QueryBus, QueryHandler};
