use anvil_di::{per_container, Container, TypeMeta};
use std::sync::Arc;

struct Config {
    env: &'static str,
}

fn seeded() -> Container {
    let container = Container::new();
    container.register_meta(TypeMeta::of::<Config>().ctor0(|| Config { env: "prod" }).build());
    container.register_with::<Config, Config>(None, Some(per_container()), |c| c);
    container
}

#[test]
fn clone_mirrors_registrations_without_shared_state() {
    let original = seeded();
    let first = original.get::<Config>().unwrap();

    let clone = original.clone_container();
    let second = clone.get::<Config>().unwrap();

    // Same recipe, independent per-container caches.
    assert_eq!(first.env, second.env);
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn clone_of_a_locked_container_accepts_registrations() {
    let original = seeded();
    original.get::<Config>().unwrap(); // locks the original

    let clone = original.clone_container();
    clone.register_instance(Arc::new(13u8));
    assert_eq!(*clone.get::<u8>().unwrap(), 13);

    // The original remains locked and unchanged.
    assert!(original.get::<u8>().is_err());
}

#[test]
fn decorator_indices_continue_across_clone() {
    trait Svc: Send + Sync {
        fn chain(&self) -> String;
    }
    struct Base;
    impl Svc for Base {
        fn chain(&self) -> String {
            "base".to_string()
        }
    }
    struct Layer {
        tag: &'static str,
        inner: Arc<dyn Svc>,
    }
    impl Svc for Layer {
        fn chain(&self) -> String {
            format!("{}({})", self.tag, self.inner.chain())
        }
    }

    let original = Container::new();
    original.register_meta(TypeMeta::of::<Base>().ctor0(|| Base).build());
    original.register::<dyn Svc, Base>(|s| s);
    original
        .decorate::<dyn Svc, _>(|_, inner| Ok(Arc::new(Layer { tag: "a", inner })))
        .unwrap();

    let clone = original.clone_container();
    clone
        .decorate::<dyn Svc, _>(|_, inner| Ok(Arc::new(Layer { tag: "b", inner })))
        .unwrap();

    // The clone carries both decorators in registration order.
    assert_eq!(clone.get::<dyn Svc>().unwrap().chain(), "a(b(base))");
    // The original is untouched by the clone's decorator.
    assert_eq!(original.get::<dyn Svc>().unwrap().chain(), "a(base)");
}

#[test]
fn disposing_the_clone_leaves_the_original_alive() {
    let original = seeded();
    let clone = original.clone_container();

    clone.get::<Config>().unwrap();
    clone.dispose();
    assert!(clone.get::<Config>().is_err());
    assert_eq!(original.get::<Config>().unwrap().env, "prod");
}
