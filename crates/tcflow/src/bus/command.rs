//! Command dispatch.
//!
//! The bus is a registry from command type to its single handler.
//! Handlers are registered while the bus is still exclusively owned
//! (`&mut self`), before any traffic; dispatch then needs no locking.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{Error, Result};

/// Marker for dispatchable commands.
pub trait Command: Send + 'static {}

/// Handles one command type.
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    /// Execute the command. Mutating handlers persist events and apply
    /// them to the kernel; nothing is returned on success.
    async fn handle(&self, command: C) -> Result<()>;
}

/// Registry mapping command types to handlers, one handler per type.
#[derive(Default)]
pub struct CommandBus {
    handlers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl CommandBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `C`. Registering twice replaces the
    /// previous handler.
    pub fn register<C, H>(&mut self, handler: H)
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        self.register_arc::<C, H>(Arc::new(handler));
    }

    /// Register a shared handler instance for `C`. Used when one handler
    /// object serves several command types.
    pub fn register_arc<C, H>(&mut self, handler: Arc<H>)
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        let erased: Arc<dyn CommandHandler<C>> = handler;
        if self
            .handlers
            .insert(TypeId::of::<C>(), Box::new(erased))
            .is_some()
        {
            warn!(command = type_name::<C>(), "replacing command handler");
        }
    }

    /// Dispatch a command to its handler.
    pub async fn dispatch<C: Command>(&self, command: C) -> Result<()> {
        let handler = self
            .handlers
            .get(&TypeId::of::<C>())
            .and_then(|h| h.downcast_ref::<Arc<dyn CommandHandler<C>>>())
            .ok_or(Error::NoHandler(type_name::<C>()))?
            .clone();
        handler.handle(command).await
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True when no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Ping;
    impl Command for Ping {}

    struct Pong;
    impl Command for Pong {}

    #[derive(Default)]
    struct Counter(AtomicUsize);

    #[async_trait]
    impl CommandHandler<Ping> for Arc<Counter> {
        async fn handle(&self, _command: Ping) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_type() {
        let counter = Arc::new(Counter::default());
        let mut bus = CommandBus::new();
        bus.register::<Ping, _>(counter.clone());

        bus.dispatch(Ping).await.unwrap();
        bus.dispatch(Ping).await.unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unregistered_command_errors() {
        let bus = CommandBus::new();
        let err = bus.dispatch(Pong).await.unwrap_err();
        assert!(matches!(err, Error::NoHandler(_)));
        assert!(err.to_string().contains("Pong"));
    }
}
