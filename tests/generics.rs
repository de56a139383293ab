use anvil_di::{
    per_container, Container, DiError, DiResult, GenericDefinition, ResolverContext,
};
use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

static REPO_BUILDS: AtomicU32 = AtomicU32::new(0);

#[derive(Debug)]
struct Repo<T> {
    _marker: PhantomData<fn() -> T>,
}

struct RepoDef;

impl GenericDefinition for RepoDef {
    type Output<A: Send + Sync + 'static> = Repo<A>;

    fn construct<A: Send + Sync + 'static>(_ctx: &ResolverContext<'_>) -> DiResult<Repo<A>> {
        REPO_BUILDS.fetch_add(1, Ordering::SeqCst);
        Ok(Repo {
            _marker: PhantomData,
        })
    }
}

#[test]
fn open_generic_closes_per_argument_with_the_open_lifetime() {
    let container = Container::new();
    container.register_open::<RepoDef>(Some(per_container()));

    let ints_a = container.get_open::<RepoDef, i32>().unwrap();
    let ints_b = container.get_open::<RepoDef, i32>().unwrap();
    let strings = container.get_open::<RepoDef, String>().unwrap();

    // Each closed instantiation is a singleton within the container.
    assert!(Arc::ptr_eq(&ints_a, &ints_b));
    // Distinct arguments yield distinct instances.
    assert_ne!(
        Arc::as_ptr(&ints_a) as *const (),
        Arc::as_ptr(&strings) as *const ()
    );
}

#[test]
fn closed_instantiation_is_equivalent_to_direct_registration() {
    let container = Container::new();
    container.register_open::<RepoDef>(Some(per_container()));

    let opened = container.get_open::<RepoDef, u64>().unwrap();
    // The synthesized registration was installed under the closed key, so
    // a plain resolve now hits the same compiled delegate.
    let plain = container.get::<Repo<u64>>().unwrap();
    assert!(Arc::ptr_eq(&opened, &plain));
}

#[test]
fn direct_registration_takes_precedence_over_expansion() {
    let container = Container::new();
    container.register_open::<RepoDef>(Some(per_container()));
    let direct = Arc::new(Repo::<u8> {
        _marker: PhantomData,
    });
    container.register_instance(direct.clone());

    let resolved = container.get_open::<RepoDef, u8>().unwrap();
    assert!(Arc::ptr_eq(&resolved, &direct));
}

struct PickyDef;

impl GenericDefinition for PickyDef {
    type Output<A: Send + Sync + 'static> = Repo<A>;

    fn supports<A: Send + Sync + 'static>() -> bool {
        TypeId::of::<A>() != TypeId::of::<bool>()
    }

    fn construct<A: Send + Sync + 'static>(_ctx: &ResolverContext<'_>) -> DiResult<Repo<A>> {
        Ok(Repo {
            _marker: PhantomData,
        })
    }
}

#[test]
fn constraint_violation_falls_through_then_surfaces() {
    let container = Container::new();
    container.register_open::<PickyDef>(None);

    // No other strategy can produce Repo<bool>: the constraint surfaces.
    let err = container.get_open::<PickyDef, bool>().unwrap_err();
    assert!(matches!(err, DiError::GenericConstraint { .. }));

    // A direct registration still satisfies the refused argument.
    let direct = Arc::new(Repo::<bool> {
        _marker: PhantomData,
    });
    let container = Container::new();
    container.register_open::<PickyDef>(None);
    container.register_instance(direct.clone());
    let resolved = container.get_open::<PickyDef, bool>().unwrap();
    assert!(Arc::ptr_eq(&resolved, &direct));
}

struct Unregistered;

impl GenericDefinition for Unregistered {
    type Output<A: Send + Sync + 'static> = Repo<A>;

    fn construct<A: Send + Sync + 'static>(_ctx: &ResolverContext<'_>) -> DiResult<Repo<A>> {
        Ok(Repo {
            _marker: PhantomData,
        })
    }
}

#[test]
fn unregistered_definition_is_not_registered() {
    let container = Container::new();
    let err = container.get_open::<Unregistered, i32>().unwrap_err();
    assert!(err.is_not_registered());
}

struct NeedsDeps<T> {
    label: Arc<String>,
    _marker: PhantomData<fn() -> T>,
}

struct NeedsDepsDef;

impl GenericDefinition for NeedsDepsDef {
    type Output<A: Send + Sync + 'static> = NeedsDeps<A>;

    fn construct<A: Send + Sync + 'static>(
        ctx: &ResolverContext<'_>,
    ) -> DiResult<NeedsDeps<A>> {
        Ok(NeedsDeps {
            label: ctx.get::<String>()?,
            _marker: PhantomData,
        })
    }
}

#[test]
fn definitions_resolve_dependencies_through_the_context() {
    let container = Container::new();
    container.register_instance(Arc::new("labelled".to_string()));
    container.register_open::<NeedsDepsDef>(None);

    let service = container.get_open::<NeedsDepsDef, i16>().unwrap();
    assert_eq!(*service.label, "labelled");
}
