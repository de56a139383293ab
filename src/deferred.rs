//! Deferred service shapes: lazy handles and factory delegates.
//!
//! These are the structural shapes the resolver synthesizes on demand: a
//! dependency can ask for `Lazy<T>` or `ServiceFn<T>` instead of `Arc<T>`
//! and receive a handle that resolves on first use (or on every call)
//! rather than during construction. `ArgsFn` is the parameterised variant
//! carrying caller-supplied arguments into the registration's factory.

use std::marker::PhantomData;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::DiResult;
use crate::payload::{downcast_payload, AnyArc, ErasedResolve};

/// Memoized deferred resolve of `T`. Clones share the memo.
pub struct Lazy<T: ?Sized + Send + Sync + 'static> {
    inner: Arc<LazyInner<T>>,
}

struct LazyInner<T: ?Sized + Send + Sync + 'static> {
    cell: OnceCell<Arc<T>>,
    resolve: ErasedResolve,
}

impl<T: ?Sized + Send + Sync + 'static> Lazy<T> {
    pub(crate) fn from_erased(resolve: ErasedResolve) -> Self {
        Self {
            inner: Arc::new(LazyInner {
                cell: OnceCell::new(),
                resolve,
            }),
        }
    }

    /// Resolves on first call; later calls return the memoized instance.
    pub fn value(&self) -> DiResult<Arc<T>> {
        self.inner
            .cell
            .get_or_try_init(|| downcast_payload::<T>((self.inner.resolve)()?))
            .cloned()
    }

    /// True once the underlying service has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.inner.cell.get().is_some()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Delegate performing a fresh resolve of `T` on every call.
pub struct ServiceFn<T: ?Sized + Send + Sync + 'static> {
    resolve: ErasedResolve,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> ServiceFn<T> {
    pub(crate) fn from_erased(resolve: ErasedResolve) -> Self {
        Self {
            resolve,
            _marker: PhantomData,
        }
    }

    pub fn invoke(&self) -> DiResult<Arc<T>> {
        downcast_payload::<T>((self.resolve)()?)
    }
}

impl<T: ?Sized + Send + Sync + 'static> Clone for ServiceFn<T> {
    fn clone(&self) -> Self {
        Self {
            resolve: self.resolve.clone(),
            _marker: PhantomData,
        }
    }
}

/// Delegate resolving `T` with caller-supplied arguments. The argument
/// bundle `A` is usually a tuple; the registration's factory receives it
/// through the runtime-arguments hole.
pub struct ArgsFn<A, T>
where
    A: Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    resolve: Arc<dyn Fn(AnyArc) -> DiResult<AnyArc> + Send + Sync>,
    _marker: PhantomData<fn(A) -> Arc<T>>,
}

impl<A, T> ArgsFn<A, T>
where
    A: Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    pub(crate) fn from_erased(
        resolve: Arc<dyn Fn(AnyArc) -> DiResult<AnyArc> + Send + Sync>,
    ) -> Self {
        Self {
            resolve,
            _marker: PhantomData,
        }
    }

    pub fn invoke(&self, args: A) -> DiResult<Arc<T>> {
        downcast_payload::<T>((self.resolve)(Arc::new(args))?)
    }
}

impl<A, T> Clone for ArgsFn<A, T>
where
    A: Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            resolve: self.resolve.clone(),
            _marker: PhantomData,
        }
    }
}
