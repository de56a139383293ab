//! Open-generic service definitions.
//!
//! Rust monomorphizes generics, so an open registration cannot be closed
//! by walking type arguments at runtime. Instead a definition type links
//! the open family to its closed instances through a generic associated
//! type: registering the definition once makes `get_open::<D, A>()` work
//! for every concrete `A`, and each closed instance is installed under its
//! own key with a fresh copy of the definition's lifetime, making it
//! indistinguishable from a direct registration afterwards.
//!
//! # Examples
//!
//! ```
//! use anvil_di::{per_container, Container, DiResult, GenericDefinition, ResolverContext};
//! use std::marker::PhantomData;
//!
//! struct Repo<T> {
//!     _marker: PhantomData<fn() -> T>,
//! }
//!
//! struct RepoDef;
//!
//! impl GenericDefinition for RepoDef {
//!     type Output<A: Send + Sync + 'static> = Repo<A>;
//!
//!     fn construct<A: Send + Sync + 'static>(
//!         _ctx: &ResolverContext<'_>,
//!     ) -> DiResult<Repo<A>> {
//!         Ok(Repo {
//!             _marker: PhantomData,
//!         })
//!     }
//! }
//!
//! let container = Container::new();
//! container.register_open::<RepoDef>(Some(per_container()));
//!
//! let ints = container.get_open::<RepoDef, i32>().unwrap();
//! let again = container.get_open::<RepoDef, i32>().unwrap();
//! assert!(std::sync::Arc::ptr_eq(&ints, &again));
//! ```

use crate::container::ResolverContext;
use crate::error::DiResult;

/// An open-generic service family.
///
/// `Output<A>` is the closed service type for argument `A`; `construct`
/// builds one instance, resolving dependencies through the context.
/// Families over several type parameters take a tuple argument.
pub trait GenericDefinition: Send + Sync + 'static {
    type Output<A: Send + Sync + 'static>: Send + Sync + 'static;

    /// Whether the definition accepts the argument. Returning `false`
    /// makes expansion fall through to the remaining resolution
    /// strategies (surfaced as `GenericConstraint` only if none succeed).
    fn supports<A: Send + Sync + 'static>() -> bool {
        true
    }

    fn construct<A: Send + Sync + 'static>(
        ctx: &ResolverContext<'_>,
    ) -> DiResult<Self::Output<A>>;
}
