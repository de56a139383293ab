use anvil_di::{per_scope, Container, DiError, TypeMeta};
use parking_lot::Mutex;
use std::sync::Arc;

trait Foo: Send + Sync {}
struct FooA;
impl Foo for FooA {}

trait Bar: Send + Sync + std::fmt::Debug {}
struct BarA {
    #[allow(dead_code)]
    foo: Arc<dyn Foo>,
}
impl std::fmt::Debug for BarA {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BarA").finish()
    }
}
impl Bar for BarA {}

struct Baz {
    bar: Arc<dyn Bar>,
}

fn build_container() -> Container {
    let container = Container::new();
    container.register_meta(TypeMeta::of::<FooA>().ctor0(|| FooA).build());
    container.register_meta(
        TypeMeta::of::<BarA>()
            .ctor1::<Arc<dyn Foo>>(["foo"], |foo| BarA { foo })
            .build(),
    );
    container.register_meta(
        TypeMeta::of::<Baz>()
            .ctor1::<Arc<dyn Bar>>(["bar"], |bar| Baz { bar })
            .build(),
    );
    container.register::<dyn Foo, FooA>(|f| f);
    container.register_with::<dyn Bar, BarA>(None, Some(per_scope()), |b| b);
    container.register::<Baz, Baz>(|b| b);
    container
}

#[test]
fn per_scope_shares_within_and_isolates_across_scopes() {
    let container = build_container();

    let scope = container.begin_scope().unwrap();
    let baz1 = container.get::<Baz>().unwrap();
    let baz2 = container.get::<Baz>().unwrap();

    // Transient outer instances differ, the per-scope dependency is shared.
    assert!(!Arc::ptr_eq(&baz1, &baz2));
    assert!(Arc::ptr_eq(&baz1.bar, &baz2.bar));
    let first_bar = baz1.bar.clone();
    scope.end().unwrap();

    let sibling = container.begin_scope().unwrap();
    let baz3 = container.get::<Baz>().unwrap();
    assert!(!Arc::ptr_eq(&baz3.bar, &first_bar));
    sibling.end().unwrap();
}

#[test]
fn per_scope_outside_scope_fails() {
    let container = build_container();
    let err = container.get::<dyn Bar>().unwrap_err();
    assert!(matches!(err.root_cause(), DiError::InvalidScope(_)));
}

#[test]
fn nested_scopes_cache_independently() {
    let counter = Arc::new(Mutex::new(0u32));
    let counter_clone = counter.clone();

    let container = Container::new();
    container.register_factory_with::<String, _>(None, Some(per_scope()), move |_| {
        let mut c = counter_clone.lock();
        *c += 1;
        Ok(Arc::new(format!("req-{}", *c)))
    });

    let outer = container.begin_scope().unwrap();
    let a = container.get::<String>().unwrap();

    let inner = container.begin_scope().unwrap();
    let b = container.get::<String>().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(*b, "req-2");
    inner.end().unwrap();

    // Back in the outer scope, its cached instance is still current.
    let c = container.get::<String>().unwrap();
    assert!(Arc::ptr_eq(&a, &c));
    outer.end().unwrap();
}

#[test]
fn ending_outer_scope_with_live_child_fails() {
    let container = Container::new();
    container.register_instance(Arc::new(1u8));

    let outer = container.begin_scope().unwrap();
    let inner = container.begin_scope().unwrap();

    let err = outer.end().unwrap_err();
    assert!(matches!(err, DiError::InvalidScope(_)));

    inner.end().unwrap();
}

#[test]
fn scope_handle_ends_scope_on_drop() {
    let counter = Arc::new(Mutex::new(0u32));
    let counter_clone = counter.clone();

    let container = Container::new();
    container.register_factory_with::<u32, _>(None, Some(per_scope()), move |_| {
        let mut c = counter_clone.lock();
        *c += 1;
        Ok(Arc::new(*c))
    });

    {
        let _scope = container.begin_scope().unwrap();
        container.get::<u32>().unwrap();
    }
    // Dropped scope is gone; a fresh one gets a fresh instance.
    let scope = container.begin_scope().unwrap();
    assert_eq!(*container.get::<u32>().unwrap(), 2);
    scope.end().unwrap();
}

#[test]
fn sibling_threads_carry_independent_scopes() {
    let container = Arc::new(build_container());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let container = container.clone();
            std::thread::spawn(move || {
                let scope = container.begin_scope().unwrap();
                let a = container.get::<Baz>().unwrap();
                let b = container.get::<Baz>().unwrap();
                assert!(Arc::ptr_eq(&a.bar, &b.bar));
                scope.end().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}
