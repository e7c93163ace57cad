//! Handler registry.
//!
//! Handlers are keyed by the `TypeId` of the message they serve. The registry
//! is filled through a [`RegistryBuilder`] during start-up and frozen with
//! [`RegistryBuilder::build`]; after that it is only read, so resolution
//! needs no lock.

use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::handler::{Handler, handler_fn};
use crate::message::Message;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Type-erased handler slot.
///
/// Holds an `Arc<dyn Handler<M>>` for the message type it is keyed by.
struct Registration {
    name: &'static str,
    handler: Box<dyn Any + Send + Sync>,
}

/// Immutable table of message handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TypeId, Registration>,
}

impl HandlerRegistry {
    /// Start an empty builder.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Look up the handler registered for `M`.
    pub fn resolve<M: Message>(&self) -> Result<Arc<dyn Handler<M>>> {
        self.handlers
            .get(&TypeId::of::<M>())
            .and_then(|registration| {
                registration
                    .handler
                    .downcast_ref::<Arc<dyn Handler<M>>>()
                    .cloned()
            })
            .ok_or(Error::NotRegistered(M::name()))
    }

    /// Check whether `M` has a handler.
    pub fn contains<M: Message>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<M>())
    }

    /// Number of registered message types.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Names of every registered message type, sorted.
    pub fn message_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.values().map(|r| r.name).collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn insert<M, H>(&mut self, handler: H) -> Result<()>
    where
        M: Message,
        H: Handler<M>,
    {
        match self.handlers.entry(TypeId::of::<M>()) {
            Entry::Occupied(_) => Err(Error::AlreadyRegistered(M::name())),
            Entry::Vacant(slot) => {
                let handler: Arc<dyn Handler<M>> = Arc::new(handler);
                slot.insert(Registration {
                    name: M::name(),
                    handler: Box::new(handler),
                });
                debug!(message = M::name(), "Registered handler");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("messages", &self.message_names())
            .finish()
    }
}

/// Collects handlers before the registry is frozen.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    registry: HandlerRegistry,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `M`.
    ///
    /// Fails with [`Error::AlreadyRegistered`] when `M` already has one; the
    /// existing registration is kept and the new handler dropped.
    pub fn register<M, H>(&mut self, handler: H) -> Result<&mut Self>
    where
        M: Message,
        H: Handler<M>,
    {
        self.registry.insert::<M, H>(handler)?;
        Ok(self)
    }

    /// Register an async function as the handler for `M`.
    pub fn register_fn<M, F, Fut>(&mut self, f: F) -> Result<&mut Self>
    where
        M: Message,
        F: Fn(RequestContext, M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<M::Result>> + Send + 'static,
    {
        self.register::<M, _>(handler_fn(f))
    }

    /// Freeze the table.
    pub fn build(self) -> HandlerRegistry {
        debug!(handlers = self.registry.len(), "Handler registry built");
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct GetTenant;
    struct GetUser;
    struct DeleteUser;

    impl Message for GetTenant {
        type Result = &'static str;
    }

    impl Message for GetUser {
        type Result = &'static str;
    }

    impl Message for DeleteUser {
        type Result = ();
    }

    struct Named(&'static str);

    #[async_trait]
    impl Handler<GetTenant> for Named {
        async fn handle(&self, _ctx: &RequestContext, _msg: GetTenant) -> Result<&'static str> {
            Ok(self.0)
        }
    }

    #[async_trait]
    impl Handler<GetUser> for Named {
        async fn handle(&self, _ctx: &RequestContext, _msg: GetUser) -> Result<&'static str> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn test_resolve_returns_registered_handler() {
        let mut builder = RegistryBuilder::new();
        builder
            .register::<GetTenant, _>(Named("tenant"))
            .unwrap()
            .register::<GetUser, _>(Named("user"))
            .unwrap()
            .register_fn::<DeleteUser, _, _>(|_ctx, _msg| async { Ok::<_, Error>(()) })
            .unwrap();
        let registry = builder.build();

        let ctx = RequestContext::new();
        let tenant = registry.resolve::<GetTenant>().unwrap();
        let user = registry.resolve::<GetUser>().unwrap();

        assert_eq!(tenant.handle(&ctx, GetTenant).await.unwrap(), "tenant");
        assert_eq!(user.handle(&ctx, GetUser).await.unwrap(), "user");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut builder = RegistryBuilder::new();
        builder.register::<GetTenant, _>(Named("first")).unwrap();

        let err = builder
            .register::<GetTenant, _>(Named("second"))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered("GetTenant")));
        assert_eq!(builder.build().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_keeps_first_handler() {
        let mut builder = RegistryBuilder::new();
        builder.register::<GetTenant, _>(Named("first")).unwrap();
        let _ = builder.register::<GetTenant, _>(Named("second"));
        let registry = builder.build();

        let handler = registry.resolve::<GetTenant>().unwrap();
        let result = handler.handle(&RequestContext::new(), GetTenant).await;
        assert_eq!(result.unwrap(), "first");
    }

    #[test]
    fn test_missing_handler() {
        let registry = RegistryBuilder::new().build();
        assert!(registry.is_empty());
        assert!(!registry.contains::<GetUser>());

        let err = registry.resolve::<GetUser>().err().unwrap();
        assert!(matches!(err, Error::NotRegistered("GetUser")));
        assert_eq!(err.to_string(), "no handler registered for GetUser");
    }

    #[test]
    fn test_message_names_sorted() {
        let mut builder = HandlerRegistry::builder();
        builder.register::<GetUser, _>(Named("user")).unwrap();
        builder.register::<GetTenant, _>(Named("tenant")).unwrap();
        let registry = builder.build();

        assert_eq!(registry.message_names(), vec!["GetTenant", "GetUser"]);
    }
}
