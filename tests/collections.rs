use anvil_di::{Container, ContainerOptions, TypeMeta};
use std::sync::Arc;

trait Animal: Send + Sync {
    fn name(&self) -> &'static str;
}

struct Dog;
impl Animal for Dog {
    fn name(&self) -> &'static str {
        "dog"
    }
}

struct Cat;
impl Animal for Cat {
    fn name(&self) -> &'static str {
        "cat"
    }
}

struct Parrot;
impl Animal for Parrot {
    fn name(&self) -> &'static str {
        "parrot"
    }
}

fn register_animals(container: &Container) {
    container.register_meta(TypeMeta::of::<Dog>().ctor0(|| Dog).build());
    container.register_meta(TypeMeta::of::<Cat>().ctor0(|| Cat).build());
    container.register_named::<dyn Animal, Dog>("d", |a| a);
    container.register_named::<dyn Animal, Cat>("c", |a| a);
}

#[test]
fn get_all_returns_registrations_in_registration_order() {
    let container = Container::new();
    register_animals(&container);

    let animals = container.get_all::<dyn Animal>().unwrap();
    let names: Vec<_> = animals.iter().map(|a| a.name()).collect();
    assert_eq!(names, vec!["dog", "cat"]);
}

#[test]
fn variance_widens_to_assignable_registrations() {
    let container = Container::new();
    register_animals(&container);
    // Parrot is registered under its own identity but declared assignable
    // to the animal enumeration.
    container.register_meta(TypeMeta::of::<Parrot>().ctor0(|| Parrot).build());
    container.register::<Parrot, Parrot>(|p| p);
    container.register_assignable::<dyn Animal, Parrot>(|p| p);

    let names: Vec<_> = container
        .get_all::<dyn Animal>()
        .unwrap()
        .iter()
        .map(|a| a.name())
        .collect();
    assert_eq!(names, vec!["dog", "cat", "parrot"]);
}

#[test]
fn variance_disabled_keeps_exact_matches_only() {
    let container = Container::with_options(ContainerOptions::new().variance(false));
    register_animals(&container);
    container.register_meta(TypeMeta::of::<Parrot>().ctor0(|| Parrot).build());
    container.register::<Parrot, Parrot>(|p| p);
    container.register_assignable::<dyn Animal, Parrot>(|p| p);

    let names: Vec<_> = container
        .get_all::<dyn Animal>()
        .unwrap()
        .iter()
        .map(|a| a.name())
        .collect();
    assert_eq!(names, vec!["dog", "cat"]);
}

#[test]
fn get_all_of_unregistered_identity_is_empty() {
    trait Nothing: Send + Sync {}
    let container = Container::new();
    assert!(container.get_all::<dyn Nothing>().unwrap().is_empty());
}

struct Kennel {
    animals: Vec<Arc<dyn Animal>>,
}

#[test]
fn constructor_can_take_every_registration_of_a_service() {
    let container = Container::new();
    register_animals(&container);
    container.register_meta(
        TypeMeta::of::<Kennel>()
            .ctor1::<Vec<Arc<dyn Animal>>>(["animals"], |animals| Kennel { animals })
            .build(),
    );
    container.register::<Kennel, Kennel>(|k| k);

    let kennel = container.get::<Kennel>().unwrap();
    assert_eq!(kennel.animals.len(), 2);
}

struct Chorus {
    voices: Vec<Arc<dyn Animal>>,
}
impl Animal for Chorus {
    fn name(&self) -> &'static str {
        "chorus"
    }
}

#[test]
fn aggregated_service_excludes_itself_from_its_own_enumeration() {
    let container = Container::new();
    register_animals(&container);
    // Chorus is itself an Animal registration whose constructor aggregates
    // all animals; without self-exclusion this would recurse forever.
    container.register_meta(
        TypeMeta::of::<Chorus>()
            .ctor1::<Vec<Arc<dyn Animal>>>(["voices"], |voices| Chorus { voices })
            .build(),
    );
    container.register_named::<dyn Animal, Chorus>("chorus", |c| c);

    let chorus = container.get_named::<dyn Animal>("chorus").unwrap();
    assert_eq!(chorus.name(), "chorus");

    let all = container.get_all::<dyn Animal>().unwrap();
    let names: Vec<_> = all.iter().map(|a| a.name()).collect();
    assert_eq!(names, vec!["dog", "cat", "chorus"]);
}
