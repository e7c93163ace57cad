//! In-process command/query dispatch bus.
//!
//! The request-handling layer issues typed commands and queries without
//! knowing which handler serves them:
//!
//! - **Messages** - [`Command`] and [`Query`] types, each with a result type
//! - **Registry** - exactly one handler per message type, frozen at start-up
//! - **Dispatcher** - resolves by type identity and invokes the handler
//! - **Context** - request-scoped values, cancellation and deadline
//! - **Errors** - wrapping that keeps the sentinel cause testable
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier_bus::*;
//! use async_trait::async_trait;
//!
//! // Define a query
//! struct GetUserByEmail {
//!     email: String,
//! }
//!
//! impl Message for GetUserByEmail {
//!     type Result = User;
//! }
//!
//! impl Query for GetUserByEmail {}
//!
//! // Define its handler
//! struct GetUserByEmailHandler {
//!     users: UserStore,
//! }
//!
//! #[async_trait]
//! impl Handler<GetUserByEmail> for GetUserByEmailHandler {
//!     async fn handle(&self, ctx: &RequestContext, query: GetUserByEmail) -> Result<User> {
//!         ctx.check()?;
//!         self.users
//!             .find_by_email(&query.email)
//!             .ok_or(Error::NotFound)
//!             .wrap_err_with(|| format!("user {}", query.email))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Register once, before serving requests
//!     let mut registry = RegistryBuilder::new();
//!     registry.register::<GetUserByEmail, _>(GetUserByEmailHandler { users })?;
//!     let dispatcher = Dispatcher::new(registry.build());
//!
//!     // One scope per request
//!     let scope = RequestScope::begin();
//!     match dispatcher.dispatch(&scope, GetUserByEmail { email }).await {
//!         Ok(user) => println!("found {}", user.name),
//!         Err(err) if err.is(ErrorKind::NotFound) => println!("no such user"),
//!         Err(err) => return Err(err),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Chaining
//!
//! Inside a handler the context is bound to the dispatcher that invoked it,
//! so composite operations dispatch further messages on the same request:
//!
//! ```rust,ignore
//! #[async_trait]
//! impl Handler<SignUp> for SignUpHandler {
//!     async fn handle(&self, ctx: &RequestContext, cmd: SignUp) -> Result<i64> {
//!         let user = ctx.dispatch(RegisterUser { user: cmd.into_user() }).await?;
//!         ctx.dispatch(SaveVerificationKey::for_user(&user)).await?;
//!         Ok(user.id)
//!     }
//! }
//! ```

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;

pub use config::DispatchConfig;
pub use context::{RequestContext, RequestScope, keys};
pub use dispatch::Dispatcher;
pub use error::{Chain, Error, ErrorClass, ErrorKind, Result, ResultExt, cause, wrap};
pub use handler::{Handler, HandlerFn, handler_fn};
pub use message::{Command, Message, Query};
pub use registry::{HandlerRegistry, RegistryBuilder};
