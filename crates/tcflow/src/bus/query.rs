//! Query dispatch.
//!
//! Same registry shape as the command bus, but a query declares its
//! result type and dispatch returns it.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{Error, Result};

/// A read-side request with a typed result.
pub trait Query: Send + 'static {
    /// What the query resolves to.
    type Output: Send;
}

/// Handles one query type.
#[async_trait]
pub trait QueryHandler<Q: Query>: Send + Sync {
    /// Resolve the query.
    async fn handle(&self, query: Q) -> Result<Q::Output>;
}

/// Registry mapping query types to handlers, one handler per type.
#[derive(Default)]
pub struct QueryBus {
    handlers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl QueryBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `Q`. Registering twice replaces the
    /// previous handler.
    pub fn register<Q, H>(&mut self, handler: H)
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
    {
        self.register_arc::<Q, H>(Arc::new(handler));
    }

    /// Register a shared handler instance for `Q`.
    pub fn register_arc<Q, H>(&mut self, handler: Arc<H>)
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
    {
        let erased: Arc<dyn QueryHandler<Q>> = handler;
        if self
            .handlers
            .insert(TypeId::of::<Q>(), Box::new(erased))
            .is_some()
        {
            warn!(query = type_name::<Q>(), "replacing query handler");
        }
    }

    /// Dispatch a query and return its result.
    pub async fn dispatch<Q: Query>(&self, query: Q) -> Result<Q::Output> {
        let handler = self
            .handlers
            .get(&TypeId::of::<Q>())
            .and_then(|h| h.downcast_ref::<Arc<dyn QueryHandler<Q>>>())
            .ok_or(Error::NoHandler(type_name::<Q>()))?
            .clone();
        handler.handle(query).await
    }
}
