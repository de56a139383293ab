//! # anvil-di
//!
//! Runtime inversion-of-control container with compiled resolve delegates.
//!
//! ## Features
//!
//! - **Compiled resolution**: the first resolve of a key compiles a single
//!   closure and publishes it into a lock-free copy-on-write table
//! - **Named registrations**: case-insensitive service names alongside the
//!   default registration for an identity
//! - **Lifetimes**: transient, per-request (scope-tracked disposables),
//!   per-scope, and per-container strategies, plus user-implemented ones
//! - **Nested scopes**: a scope tree with thread-local current-scope
//!   propagation and reverse-order disposal
//! - **Decorators, overrides, initializers, fallbacks**: layered on top of
//!   registrations with stable, documented ordering
//! - **Open generics**: generic service families closed on demand through
//!   [`GenericDefinition`]
//! - **Cycle detection**: per-thread dependency stacks with full path
//!   reporting
//!
//! ## Quick start
//!
//! ```rust
//! use anvil_di::{per_scope, Container, TypeMeta};
//! use std::sync::Arc;
//!
//! trait Store: Send + Sync {
//!     fn url(&self) -> &str;
//! }
//!
//! struct PgStore;
//! impl Store for PgStore {
//!     fn url(&self) -> &str {
//!         "postgres://localhost"
//!     }
//! }
//!
//! struct Handler {
//!     store: Arc<dyn Store>,
//! }
//!
//! let container = Container::new();
//! container.register_meta(
//!     TypeMeta::of::<PgStore>().ctor0(|| PgStore).build(),
//! );
//! container.register_meta(
//!     TypeMeta::of::<Handler>()
//!         .ctor1::<Arc<dyn Store>>(["store"], |store| Handler { store })
//!         .build(),
//! );
//! container.register::<dyn Store, PgStore>(|s| s);
//! container.register_with::<Handler, Handler>(None, Some(per_scope()), |h| h);
//!
//! let scope = container.begin_scope().unwrap();
//! let handler = container.get::<Handler>().unwrap();
//! assert_eq!(handler.store.url(), "postgres://localhost");
//! scope.end().unwrap();
//! ```
//!
//! ## Lifetimes
//!
//! - **Transient** (the default): a fresh instance on every resolve
//! - **PerRequest**: fresh every resolve; disposable instances are owned
//!   by the current scope
//! - **PerScope**: one instance per scope, disposed when the scope ends
//! - **PerContainer**: one instance per container, materialized into the
//!   compiled delegate and disposed with the container
//!
//! ## Locking
//!
//! All registration happens before the first resolve. The first resolve
//! locks the container: later registration writes log a warning and are
//! ignored, and decorator/override registration fails with
//! [`DiError::RegistrationAfterLock`].

mod compiler;
mod constants;
mod container;
mod deferred;
mod descriptors;
mod dispose;
mod error;
mod generics;
mod internal;
mod key;
mod lifetime;
mod metadata;
mod options;
mod payload;
mod planner;
mod registration;
mod scope;

pub use container::{Container, ResolverContext};
pub use deferred::{ArgsFn, Lazy, ServiceFn};
pub use descriptors::{RegistrationKind, ServiceDescriptor};
pub use dispose::{Dispose, DisposeHook};
pub use payload::AnyArc;
pub use error::{DiError, DiResult};
pub use generics::GenericDefinition;
pub use key::{ServiceKey, ServiceName};
pub use lifetime::{
    per_container, per_request, per_scope, transient, Lifetime, PerContainer, PerRequest,
    PerScope, Transient,
};
pub use metadata::{ConstructorMeta, Inject, ParamMeta, PropertyMeta, TypeMeta, TypeMetaBuilder};
pub use options::{ContainerOptions, FacadeLogSink, LogEntry, LogLevel, LogSink, ScopeFlow};
pub use registration::{
    DecoratorRegistration, FactoryRule, Initializer, ServiceOverride, ServiceRegistration,
    ServiceRequest,
};
pub use scope::{Scope, ScopeHandle, ScopeManager};
