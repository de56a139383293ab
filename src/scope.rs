//! Nested scopes and the scope manager.
//!
//! Scopes form a tree: `begin_scope` creates a child of the current scope
//! and makes it current; ending a scope disposes its owned instances in
//! reverse insertion order and restores its parent as current. The current
//! scope lives in thread-local storage keyed by manager id, so sibling
//! threads using the same container each carry their own scope path.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::dispose::{AnyArc, DisposeBag};
use crate::error::{DiError, DiResult};
use crate::options::{LogEntry, LogLevel, LogSink, ScopeFlow};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_SCOPES: RefCell<HashMap<u64, Arc<Scope>>> =
        RefCell::new(HashMap::new());
}

/// A lifetime boundary owning the disposables created during its lifetime.
///
/// Per-scope services cache into the scope keyed by their lifetime object's
/// id; per-request disposables register a disposal hook. Both are released
/// when the scope ends.
pub struct Scope {
    id: u64,
    manager_id: u64,
    parent: Option<Arc<Scope>>,
    state: Mutex<ScopeState>,
}

struct ScopeState {
    child: Option<Weak<Scope>>,
    cache: HashMap<u64, AnyArc>,
    disposables: DisposeBag,
    ended: bool,
}

impl Scope {
    fn new(manager_id: u64, parent: Option<Arc<Scope>>) -> Self {
        Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            manager_id,
            parent,
            state: Mutex::new(ScopeState {
                child: None,
                cache: HashMap::new(),
                disposables: DisposeBag::default(),
                ended: false,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn parent(&self) -> Option<&Arc<Scope>> {
        self.parent.as_ref()
    }

    pub fn is_ended(&self) -> bool {
        self.state.lock().ended
    }

    /// Number of disposables currently owned by this scope.
    pub fn tracked_count(&self) -> usize {
        self.state.lock().disposables.len()
    }

    /// Takes ownership of a disposal hook. Fails on an ended scope.
    pub(crate) fn track_instance(&self, disposer: Box<dyn FnOnce() + Send>) -> DiResult<()> {
        let mut state = self.state.lock();
        if state.ended {
            return Err(DiError::InvalidScope(
                "cannot track an instance on an ended scope".to_string(),
            ));
        }
        state.disposables.push(disposer);
        Ok(())
    }

    /// Per-scope cache lookup with double-checked insert. The factory runs
    /// outside the lock so that dependencies of the instance may themselves
    /// cache into this scope.
    pub(crate) fn get_or_create(
        &self,
        lifetime_id: u64,
        create: &dyn Fn() -> DiResult<AnyArc>,
        disposer_for: Option<&dyn Fn(&AnyArc) -> Option<Box<dyn FnOnce() + Send>>>,
    ) -> DiResult<AnyArc> {
        {
            let state = self.state.lock();
            if state.ended {
                return Err(DiError::InvalidScope(
                    "cannot resolve a per-scope service from an ended scope".to_string(),
                ));
            }
            if let Some(cached) = state.cache.get(&lifetime_id) {
                return Ok(cached.clone());
            }
        }

        let value = create()?;

        let mut state = self.state.lock();
        if let Some(cached) = state.cache.get(&lifetime_id) {
            return Ok(cached.clone());
        }
        state.cache.insert(lifetime_id, value.clone());
        if let Some(make_disposer) = disposer_for {
            if let Some(disposer) = make_disposer(&value) {
                state.disposables.push(disposer);
            }
        }
        Ok(value)
    }

    fn has_live_child(&self) -> bool {
        self.state
            .lock()
            .child
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|child| !child.is_ended())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// Manages a tree of nested scopes and the thread-local current scope.
pub struct ScopeManager {
    id: u64,
    flow: ScopeFlow,
}

impl ScopeManager {
    pub(crate) fn new(flow: ScopeFlow) -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            flow,
        }
    }

    /// The deepest live scope on this thread's path, if any.
    pub fn current_scope(&self) -> Option<Arc<Scope>> {
        CURRENT_SCOPES.with(|map| map.borrow().get(&self.id).cloned())
    }

    /// Creates a scope whose parent is the current scope and makes it
    /// current.
    pub fn begin_scope(&self) -> DiResult<Arc<Scope>> {
        if self.flow == ScopeFlow::AsyncFlow {
            return Err(DiError::InvalidScope(
                "async-flow scope storage is not available; select per-thread scopes".to_string(),
            ));
        }
        let parent = self.current_scope();
        let scope = Arc::new(Scope::new(self.id, parent.clone()));
        if let Some(parent) = &parent {
            let mut state = parent.state.lock();
            state.child = Some(Arc::downgrade(&scope));
        }
        CURRENT_SCOPES.with(|map| {
            map.borrow_mut().insert(self.id, scope.clone());
        });
        Ok(scope)
    }

    /// Ends a scope: runs its disposables in reverse insertion order,
    /// unlinks it from its parent, and restores the parent as current.
    ///
    /// The scope must be current on the calling thread and must have no
    /// live child. Ending an already-ended scope is a no-op.
    pub fn end_scope(&self, scope: &Arc<Scope>) -> DiResult<()> {
        if scope.is_ended() {
            return Ok(());
        }
        let current = self.current_scope().ok_or_else(|| {
            DiError::InvalidScope("no scope is current on this thread".to_string())
        })?;
        if !Arc::ptr_eq(&current, scope) {
            return Err(DiError::InvalidScope(
                "scope is not current on this thread".to_string(),
            ));
        }
        if scope.has_live_child() {
            return Err(DiError::InvalidScope(
                "cannot end a scope with a live child scope".to_string(),
            ));
        }

        // Mark ended before disposal so a disposable that re-enters the
        // scope (track_instance, per-scope resolution) gets InvalidScope
        // instead of corrupting the tree.
        let mut disposables = {
            let mut state = scope.state.lock();
            state.ended = true;
            state.cache.clear();
            std::mem::take(&mut state.disposables)
        };
        disposables.run_all_reverse();

        if let Some(parent) = scope.parent() {
            parent.state.lock().child = None;
        }
        CURRENT_SCOPES.with(|map| {
            let mut map = map.borrow_mut();
            match scope.parent() {
                Some(parent) => {
                    map.insert(self.id, parent.clone());
                }
                None => {
                    map.remove(&self.id);
                }
            }
        });
        Ok(())
    }
}

/// Lazy single-instance factory of the container's scope manager.
pub(crate) struct ScopeManagerProvider {
    flow: ScopeFlow,
    manager: once_cell::sync::OnceCell<Arc<ScopeManager>>,
}

impl ScopeManagerProvider {
    pub(crate) fn new(flow: ScopeFlow) -> Self {
        Self {
            flow,
            manager: once_cell::sync::OnceCell::new(),
        }
    }

    pub(crate) fn get(&self) -> Arc<ScopeManager> {
        self.manager
            .get_or_init(|| Arc::new(ScopeManager::new(self.flow)))
            .clone()
    }
}

/// Handle returned by `Container::begin_scope`. Ends the scope when
/// explicitly closed or when dropped.
pub struct ScopeHandle {
    scope: Option<Arc<Scope>>,
    manager: Arc<ScopeManager>,
    sink: Arc<dyn LogSink>,
}

impl ScopeHandle {
    pub(crate) fn new(
        scope: Arc<Scope>,
        manager: Arc<ScopeManager>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            scope: Some(scope),
            manager,
            sink,
        }
    }

    pub fn scope(&self) -> &Arc<Scope> {
        self.scope.as_ref().expect("scope handle already ended")
    }

    /// Ends the scope, propagating scope-tree violations.
    pub fn end(mut self) -> DiResult<()> {
        match self.scope.take() {
            Some(scope) => self.manager.end_scope(&scope),
            None => Ok(()),
        }
    }
}

impl Drop for ScopeHandle {
    fn drop(&mut self) {
        if let Some(scope) = self.scope.take() {
            if let Err(err) = self.manager.end_scope(&scope) {
                self.sink.log(LogEntry {
                    level: LogLevel::Warning,
                    message: format!("scope dropped without clean end: {}", err),
                });
            }
        }
    }
}
