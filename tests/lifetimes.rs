use anvil_di::{
    per_container, per_request, per_scope, Container, DiError, Dispose, TypeMeta,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[test]
fn per_container_returns_same_reference_across_calls() {
    let calls = Arc::new(Mutex::new(0u32));
    let calls_clone = calls.clone();

    let container = Container::new();
    container.register_factory_with::<String, _>(None, Some(per_container()), move |_| {
        *calls_clone.lock() += 1;
        Ok(Arc::new("singleton".to_string()))
    });

    let a = container.get::<String>().unwrap();
    let b = container.get::<String>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(*calls.lock(), 1);
}

#[test]
fn per_container_is_shared_across_scopes() {
    struct Db;

    let container = Container::new();
    container.register_meta(TypeMeta::of::<Db>().ctor0(|| Db).build());
    container.register_with::<Db, Db>(None, Some(per_container()), |d| d);

    let root = container.get::<Db>().unwrap();
    let scope = container.begin_scope().unwrap();
    let scoped = container.get::<Db>().unwrap();
    assert!(Arc::ptr_eq(&root, &scoped));
    scope.end().unwrap();
}

#[test]
fn transient_is_the_default_lifetime() {
    struct Item;

    let container = Container::new();
    container.register_meta(TypeMeta::of::<Item>().ctor0(|| Item).build());
    container.register::<Item, Item>(|i| i);

    let a = container.get::<Item>().unwrap();
    let b = container.get::<Item>().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
}

#[test]
fn default_lifetime_applies_to_subsequent_registrations_only() {
    let container = Container::new();
    container.register_factory::<u32, _>(|_| Ok(Arc::new(1)));
    container.set_default_lifetime(per_container());
    container.register_factory::<u64, _>(|_| Ok(Arc::new(2)));

    // u32 was registered before the default changed: still transient.
    let a = container.get::<u32>().unwrap();
    let b = container.get::<u32>().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));

    let c = container.get::<u64>().unwrap();
    let d = container.get::<u64>().unwrap();
    assert!(Arc::ptr_eq(&c, &d));
}

#[derive(Debug)]
struct Connection {
    disposed: Arc<AtomicU32>,
}

impl Dispose for Connection {
    fn dispose(&self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn per_request_disposable_is_owned_by_the_scope() {
    let disposed = Arc::new(AtomicU32::new(0));
    let disposed_clone = disposed.clone();

    let container = Container::new();
    container.register_factory_disposable::<Connection, _>(
        None,
        Some(per_request()),
        move |_| {
            Ok(Arc::new(Connection {
                disposed: disposed_clone.clone(),
            }))
        },
    );

    let scope = container.begin_scope().unwrap();
    let a = container.get::<Connection>().unwrap();
    let b = container.get::<Connection>().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(disposed.load(Ordering::SeqCst), 0);
    scope.end().unwrap();
    // Both per-request instances were tracked and disposed.
    assert_eq!(disposed.load(Ordering::SeqCst), 2);
}

#[test]
fn per_request_disposable_without_scope_fails() {
    let disposed = Arc::new(AtomicU32::new(0));
    let disposed_clone = disposed.clone();

    let container = Container::new();
    container.register_factory_disposable::<Connection, _>(
        None,
        Some(per_request()),
        move |_| {
            Ok(Arc::new(Connection {
                disposed: disposed_clone.clone(),
            }))
        },
    );

    let err = container.get::<Connection>().unwrap_err();
    assert!(matches!(err.root_cause(), DiError::InvalidScope(_)));
}

#[test]
fn container_dispose_disposes_cached_singletons() {
    let disposed = Arc::new(AtomicU32::new(0));
    let disposed_clone = disposed.clone();

    let container = Container::new();
    container.register_factory_disposable::<Connection, _>(
        None,
        Some(per_container()),
        move |_| {
            Ok(Arc::new(Connection {
                disposed: disposed_clone.clone(),
            }))
        },
    );

    container.get::<Connection>().unwrap();
    container.get::<Connection>().unwrap();
    assert_eq!(disposed.load(Ordering::SeqCst), 0);

    container.dispose();
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    // Idempotent disposal.
    container.dispose();
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
}

#[test]
fn per_scope_disposable_disposed_once_at_scope_end() {
    let disposed = Arc::new(AtomicU32::new(0));
    let disposed_clone = disposed.clone();

    let container = Container::new();
    container.register_factory_disposable::<Connection, _>(
        None,
        Some(per_scope()),
        move |_| {
            Ok(Arc::new(Connection {
                disposed: disposed_clone.clone(),
            }))
        },
    );

    let scope = container.begin_scope().unwrap();
    let a = container.get::<Connection>().unwrap();
    let b = container.get::<Connection>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(disposed.load(Ordering::SeqCst), 0);
    scope.end().unwrap();
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
}

#[test]
fn user_lifetime_obeys_the_contract() {
    use anvil_di::{AnyArc, DiResult, DisposeHook, Lifetime, Scope};
    use once_cell::sync::OnceCell;

    // Caches the first instance forever, like a bare singleton.
    struct OnceOnly {
        cell: OnceCell<AnyArc>,
    }

    impl Lifetime for OnceOnly {
        fn get_instance(
            &self,
            create: &dyn Fn() -> DiResult<AnyArc>,
            _scope: Option<&Arc<Scope>>,
            _dispose: Option<&DisposeHook>,
        ) -> DiResult<AnyArc> {
            Ok(self.cell.get_or_try_init(create)?.clone())
        }

        fn duplicate(&self) -> Arc<dyn Lifetime> {
            Arc::new(OnceOnly {
                cell: OnceCell::new(),
            })
        }
    }

    let container = Container::new();
    container.register_factory_with::<u32, _>(
        None,
        Some(Arc::new(OnceOnly {
            cell: once_cell::sync::OnceCell::new(),
        })),
        |_| Ok(Arc::new(9)),
    );

    let a = container.get::<u32>().unwrap();
    let b = container.get::<u32>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}
