//! Lifetime strategies controlling instance reuse across resolves.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::dispose::{AnyArc, DisposeHook};
use crate::error::{DiError, DiResult};
use crate::scope::Scope;

static NEXT_LIFETIME_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_LIFETIME_ID.fetch_add(1, Ordering::Relaxed)
}

/// Policy deciding when `create` runs and who owns the result.
///
/// Implementations must be safe under concurrent `get_instance` calls.
/// A registration without a lifetime is transient.
pub trait Lifetime: Send + Sync + 'static {
    /// Produces or reuses an instance. `scope` is the caller's current
    /// scope, if any; `dispose` is the registration's dispose hook, present
    /// only for services declared disposable.
    fn get_instance(
        &self,
        create: &dyn Fn() -> DiResult<AnyArc>,
        scope: Option<&Arc<Scope>>,
        dispose: Option<&DisposeHook>,
    ) -> DiResult<AnyArc>;

    /// Whether the compiler may materialize the instance at emit time and
    /// inline it as a constants-table slot. Only stable-per-container
    /// strategies should return true.
    fn materialize_at_emit(&self) -> bool {
        false
    }

    /// A fresh strategy of the same kind with no cached state, used when a
    /// container is cloned.
    fn duplicate(&self) -> Arc<dyn Lifetime>;

    /// Releases state owned by the lifetime object. Called when the
    /// container is disposed.
    fn dispose(&self) {}
}

/// New instance on every call, no tracking.
pub struct Transient;

impl Lifetime for Transient {
    fn get_instance(
        &self,
        create: &dyn Fn() -> DiResult<AnyArc>,
        _scope: Option<&Arc<Scope>>,
        _dispose: Option<&DisposeHook>,
    ) -> DiResult<AnyArc> {
        create()
    }

    fn duplicate(&self) -> Arc<dyn Lifetime> {
        Arc::new(Transient)
    }
}

/// New instance on every call; disposable instances are owned by the
/// current scope.
pub struct PerRequest;

impl Lifetime for PerRequest {
    fn get_instance(
        &self,
        create: &dyn Fn() -> DiResult<AnyArc>,
        scope: Option<&Arc<Scope>>,
        dispose: Option<&DisposeHook>,
    ) -> DiResult<AnyArc> {
        let value = create()?;
        if let Some(hook) = dispose {
            if let Some(disposer) = hook(&value) {
                match scope {
                    Some(scope) => scope.track_instance(disposer)?,
                    None => {
                        return Err(DiError::InvalidScope(
                            "per-request disposable resolved outside any scope".to_string(),
                        ))
                    }
                }
            }
        }
        Ok(value)
    }

    fn duplicate(&self) -> Arc<dyn Lifetime> {
        Arc::new(PerRequest)
    }
}

/// One instance per (registration, scope); the scope owns the instance and
/// disposes it when it ends.
pub struct PerScope {
    id: u64,
}

impl PerScope {
    pub fn new() -> Self {
        Self { id: next_id() }
    }
}

impl Default for PerScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifetime for PerScope {
    fn get_instance(
        &self,
        create: &dyn Fn() -> DiResult<AnyArc>,
        scope: Option<&Arc<Scope>>,
        dispose: Option<&DisposeHook>,
    ) -> DiResult<AnyArc> {
        let scope = scope.ok_or_else(|| {
            DiError::InvalidScope("per-scope service resolved outside any scope".to_string())
        })?;
        match dispose {
            Some(hook) => {
                let make = |value: &AnyArc| hook(value);
                scope.get_or_create(self.id, &create, Some(&make))
            }
            None => scope.get_or_create(self.id, &create, None),
        }
    }

    fn duplicate(&self) -> Arc<dyn Lifetime> {
        Arc::new(PerScope::new())
    }
}

/// One instance per container, created on first use and disposed with the
/// container.
pub struct PerContainer {
    cell: OnceCell<AnyArc>,
    disposer: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl PerContainer {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            disposer: Mutex::new(None),
        }
    }
}

impl Default for PerContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifetime for PerContainer {
    fn get_instance(
        &self,
        create: &dyn Fn() -> DiResult<AnyArc>,
        _scope: Option<&Arc<Scope>>,
        dispose: Option<&DisposeHook>,
    ) -> DiResult<AnyArc> {
        let value = self
            .cell
            .get_or_try_init(|| -> DiResult<AnyArc> {
                let value = create()?;
                if let Some(hook) = dispose {
                    if let Some(disposer) = hook(&value) {
                        *self.disposer.lock() = Some(disposer);
                    }
                }
                Ok(value)
            })?
            .clone();
        Ok(value)
    }

    fn materialize_at_emit(&self) -> bool {
        true
    }

    fn duplicate(&self) -> Arc<dyn Lifetime> {
        Arc::new(PerContainer::new())
    }

    fn dispose(&self) {
        if let Some(disposer) = self.disposer.lock().take() {
            disposer();
        }
    }
}

/// Convenience constructors matching the registration API.
pub fn transient() -> Arc<dyn Lifetime> {
    Arc::new(Transient)
}

pub fn per_request() -> Arc<dyn Lifetime> {
    Arc::new(PerRequest)
}

pub fn per_scope() -> Arc<dyn Lifetime> {
    Arc::new(PerScope::new())
}

pub fn per_container() -> Arc<dyn Lifetime> {
    Arc::new(PerContainer::new())
}
