//! Service registrations and the registry.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::container::{Container, ResolverContext};
use crate::dispose::DisposeHook;
use crate::error::DiResult;
use crate::key::{ServiceKey, ServiceName};
use crate::lifetime::Lifetime;
use crate::payload::AnyArc;

/// Opaque factory closure replacing constructor planning for a
/// registration.
pub(crate) type OpaqueFactory =
    Arc<dyn for<'a> Fn(&ResolverContext<'a>) -> DiResult<AnyArc> + Send + Sync>;

/// Factory spliced in for a dependency type instead of recursive
/// resolution.
pub(crate) type DepFactory = OpaqueFactory;

/// Converts a payload of one service type into a payload of a wider one.
pub(crate) type Upcast = Arc<dyn Fn(AnyArc) -> DiResult<AnyArc> + Send + Sync>;

/// Recipe for producing instances of one `(identity, name)`.
///
/// Exactly one of {implementing type, factory, value} is primary. Equality
/// and hashing are on the key alone; re-registering the same key replaces
/// the entry in place.
#[derive(Clone)]
pub struct ServiceRegistration {
    pub(crate) key: ServiceKey,
    pub(crate) implementing: Option<TypeId>,
    pub(crate) implementing_name: Option<&'static str>,
    pub(crate) factory: Option<OpaqueFactory>,
    pub(crate) value: Option<AnyArc>,
    pub(crate) lifetime: Option<Arc<dyn Lifetime>>,
    pub(crate) dispose: Option<DisposeHook>,
    /// Upcast from the implementing type's payload to the service
    /// identity's payload; identity for self-registrations.
    pub(crate) upcast: Option<Upcast>,
}

impl ServiceRegistration {
    pub fn with_type(key: ServiceKey, implementing: TypeId, implementing_name: &'static str) -> Self {
        Self {
            key,
            implementing: Some(implementing),
            implementing_name: Some(implementing_name),
            factory: None,
            value: None,
            lifetime: None,
            dispose: None,
            upcast: None,
        }
    }

    pub(crate) fn with_factory(key: ServiceKey, factory: OpaqueFactory) -> Self {
        Self {
            key,
            implementing: None,
            implementing_name: None,
            factory: Some(factory),
            value: None,
            lifetime: None,
            dispose: None,
            upcast: None,
        }
    }

    pub(crate) fn with_value(key: ServiceKey, value: AnyArc) -> Self {
        Self {
            key,
            implementing: None,
            implementing_name: None,
            factory: None,
            value: Some(value),
            lifetime: None,
            dispose: None,
            upcast: None,
        }
    }

    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    pub fn service_name(&self) -> &ServiceName {
        self.key.service_name()
    }

    pub fn implementing_type(&self) -> Option<TypeId> {
        self.implementing
    }

    pub fn implementing_type_name(&self) -> Option<&'static str> {
        self.implementing_name
    }

    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Replaces the lifetime; used by overrides.
    pub fn with_lifetime(mut self, lifetime: Arc<dyn Lifetime>) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    /// Replaces the recipe with a factory closure; used by overrides.
    pub fn with_replacement_factory<S, F>(mut self, factory: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: for<'a> Fn(&crate::container::ResolverContext<'a>) -> DiResult<Arc<S>>
            + Send
            + Sync
            + 'static,
    {
        self.factory = Some(Arc::new(move |ctx: &ResolverContext<'_>| {
            Ok(crate::payload::wrap_shared(factory(ctx)?))
        }));
        self.implementing = None;
        self.implementing_name = None;
        self.value = None;
        self.upcast = None;
        self
    }
}

impl PartialEq for ServiceRegistration {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ServiceRegistration {}

impl std::hash::Hash for ServiceRegistration {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// Factory-form decorator body: receives the built inner instance.
pub(crate) type DecoratorFactory =
    Arc<dyn for<'a> Fn(&ResolverContext<'a>, AnyArc) -> DiResult<AnyArc> + Send + Sync>;

/// A wrapper applied around a service's emitter.
///
/// Either constructor-form (an implementing type whose metadata names a
/// target parameter of the decorated identity) or factory-form (a closure
/// receiving the inner instance). `index` is assigned monotonically at
/// registration and decides composition order: lowest index ends up
/// outermost.
#[derive(Clone)]
pub struct DecoratorRegistration {
    pub(crate) service_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) implementing: Option<TypeId>,
    pub(crate) factory: Option<DecoratorFactory>,
    pub(crate) upcast: Option<Upcast>,
    pub(crate) predicate: Arc<dyn Fn(&ServiceRegistration) -> bool + Send + Sync>,
    pub(crate) index: usize,
}

impl DecoratorRegistration {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Request context handed to fallback-rule factories.
pub struct ServiceRequest<'a> {
    pub key: &'a ServiceKey,
    pub resolver: &'a ResolverContext<'a>,
}

/// Last-chance rule consulted when no registration matches a key.
#[derive(Clone)]
pub struct FactoryRule {
    pub(crate) predicate: Arc<dyn Fn(&ServiceKey) -> bool + Send + Sync>,
    pub(crate) factory:
        Arc<dyn for<'a> Fn(&ServiceRequest<'a>) -> DiResult<AnyArc> + Send + Sync>,
    pub(crate) lifetime: Option<Arc<dyn Lifetime>>,
}

/// Post-construction action applied to matching registrations' instances.
#[derive(Clone)]
pub struct Initializer {
    pub(crate) predicate: Arc<dyn Fn(&ServiceRegistration) -> bool + Send + Sync>,
    pub(crate) action:
        Arc<dyn for<'a> Fn(&ResolverContext<'a>, &AnyArc) -> DiResult<()> + Send + Sync>,
}

/// Emit-time registration rewrite.
#[derive(Clone)]
pub struct ServiceOverride {
    pub(crate) predicate: Arc<dyn Fn(&ServiceRegistration) -> bool + Send + Sync>,
    pub(crate) rewrite:
        Arc<dyn Fn(&Container, ServiceRegistration) -> ServiceRegistration + Send + Sync>,
}

/// Declared covariance link: registrations of `source` may satisfy an
/// enumeration of the wider identity this link is stored under.
#[derive(Clone)]
pub(crate) struct AssignableLink {
    pub(crate) source_id: TypeId,
    pub(crate) upcast: Upcast,
}

/// Open-generic registration: the definition's lifetime and diagnostics
/// name. Closing happens through the typed `get_open` door, where the type
/// argument is statically known.
#[derive(Clone)]
pub(crate) struct OpenRegistration {
    pub(crate) definition_name: &'static str,
    pub(crate) lifetime: Option<Arc<dyn Lifetime>>,
}

/// Two-level registration store plus the decorator, override, fallback,
/// and initializer lists.
///
/// Per-identity registrations keep insertion order in a small vector
/// (lookups are linear; identities rarely carry more than a handful of
/// names), which is also the enumeration order.
pub(crate) struct Registry {
    services: HashMap<TypeId, Vec<ServiceRegistration>>,
    pub(crate) assignable: HashMap<TypeId, Vec<AssignableLink>>,
    pub(crate) open_generics: HashMap<TypeId, OpenRegistration>,
    pub(crate) decorators: Vec<DecoratorRegistration>,
    pub(crate) overrides: Vec<ServiceOverride>,
    pub(crate) fallbacks: Vec<FactoryRule>,
    pub(crate) initializers: Vec<Initializer>,
    pub(crate) ctor_dep_factories: HashMap<TypeId, DepFactory>,
    pub(crate) prop_dep_factories: HashMap<TypeId, DepFactory>,
    pub(crate) default_lifetime: Option<Arc<dyn Lifetime>>,
    next_decorator_index: usize,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            services: HashMap::new(),
            assignable: HashMap::new(),
            open_generics: HashMap::new(),
            decorators: Vec::new(),
            overrides: Vec::new(),
            fallbacks: Vec::new(),
            initializers: Vec::new(),
            ctor_dep_factories: HashMap::new(),
            prop_dep_factories: HashMap::new(),
            default_lifetime: None,
            next_decorator_index: 0,
        }
    }

    /// Insert-or-replace; replacement keeps the original position so
    /// enumeration order stays stable.
    pub(crate) fn insert(&mut self, registration: ServiceRegistration) {
        let entries = self.services.entry(registration.key.service_id()).or_default();
        match entries.iter().position(|r| r.key == registration.key) {
            Some(pos) => entries[pos] = registration,
            None => entries.push(registration),
        }
    }

    pub(crate) fn find(&self, key: &ServiceKey) -> Option<&ServiceRegistration> {
        self.services
            .get(&key.service_id())?
            .iter()
            .find(|r| r.key == *key)
    }

    pub(crate) fn contains(&self, key: &ServiceKey) -> bool {
        self.find(key).is_some()
    }

    /// All registrations for an identity, in insertion order.
    pub(crate) fn registrations_for(&self, id: TypeId) -> &[ServiceRegistration] {
        self.services.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn add_decorator(
        &mut self,
        service_id: TypeId,
        type_name: &'static str,
        implementing: Option<TypeId>,
        factory: Option<DecoratorFactory>,
        upcast: Option<Upcast>,
        predicate: Arc<dyn Fn(&ServiceRegistration) -> bool + Send + Sync>,
    ) -> usize {
        let index = self.next_decorator_index;
        self.next_decorator_index += 1;
        self.decorators.push(DecoratorRegistration {
            service_id,
            type_name,
            implementing,
            factory,
            upcast,
            predicate,
            index,
        });
        index
    }

    /// Applicable decorators for a registration, ascending by index.
    pub(crate) fn decorators_for(
        &self,
        registration: &ServiceRegistration,
    ) -> Vec<DecoratorRegistration> {
        let mut matches: Vec<DecoratorRegistration> = self
            .decorators
            .iter()
            .filter(|d| {
                d.service_id == registration.key.service_id() && (d.predicate)(registration)
            })
            .cloned()
            .collect();
        matches.sort_by_key(|d| d.index);
        matches
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ServiceRegistration> {
        self.services.values().flatten()
    }

    /// Every lifetime object attached to a registration, plus the default.
    pub(crate) fn lifetimes(&self) -> Vec<Arc<dyn Lifetime>> {
        let mut out: Vec<Arc<dyn Lifetime>> = self
            .iter()
            .filter_map(|r| r.lifetime.clone())
            .collect();
        if let Some(default) = &self.default_lifetime {
            out.push(default.clone());
        }
        out
    }

    /// A mirror of this registry for an independent container: same
    /// registrations, fresh lifetime objects, decorator counter carried
    /// forward.
    pub(crate) fn duplicate(&self) -> Registry {
        let mut services = HashMap::with_capacity(self.services.len());
        for (id, entries) in &self.services {
            let copies = entries
                .iter()
                .map(|r| {
                    let mut copy = r.clone();
                    copy.lifetime = r.lifetime.as_ref().map(|l| l.duplicate());
                    copy
                })
                .collect();
            services.insert(*id, copies);
        }
        let open_generics = self
            .open_generics
            .iter()
            .map(|(id, open)| {
                let mut copy = open.clone();
                copy.lifetime = open.lifetime.as_ref().map(|l| l.duplicate());
                (*id, copy)
            })
            .collect();
        Registry {
            services,
            assignable: self.assignable.clone(),
            open_generics,
            decorators: self.decorators.clone(),
            overrides: self.overrides.clone(),
            fallbacks: self.fallbacks.clone(),
            initializers: self.initializers.clone(),
            ctor_dep_factories: self.ctor_dep_factories.clone(),
            prop_dep_factories: self.prop_dep_factories.clone(),
            default_lifetime: self.default_lifetime.as_ref().map(|l| l.duplicate()),
            next_decorator_index: self.next_decorator_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg_of<S: 'static>(name: &str) -> ServiceRegistration {
        ServiceRegistration::with_type(
            ServiceKey::of_named::<S>(name),
            TypeId::of::<S>(),
            std::any::type_name::<S>(),
        )
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut registry = Registry::new();
        registry.insert(reg_of::<u32>("a"));
        registry.insert(reg_of::<u32>("b"));
        registry.insert(reg_of::<u32>("A"));
        let names: Vec<String> = registry
            .registrations_for(TypeId::of::<u32>())
            .iter()
            .map(|r| r.service_name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn decorator_indices_are_monotone() {
        let mut registry = Registry::new();
        let pred: Arc<dyn Fn(&ServiceRegistration) -> bool + Send + Sync> = Arc::new(|_| true);
        let i0 = registry.add_decorator(
            TypeId::of::<u32>(),
            "u32",
            None,
            None,
            None,
            pred.clone(),
        );
        let i1 = registry.add_decorator(TypeId::of::<u32>(), "u32", None, None, None, pred);
        assert!(i0 < i1);
    }

    #[test]
    fn decorators_for_filters_by_identity_and_predicate() {
        let mut registry = Registry::new();
        registry.add_decorator(
            TypeId::of::<u32>(),
            "u32",
            None,
            None,
            None,
            Arc::new(|_| true),
        );
        registry.add_decorator(
            TypeId::of::<u32>(),
            "u32",
            None,
            None,
            None,
            Arc::new(|r: &ServiceRegistration| r.service_name().matches("special")),
        );
        registry.add_decorator(
            TypeId::of::<u64>(),
            "u64",
            None,
            None,
            None,
            Arc::new(|_| true),
        );

        let plain = reg_of::<u32>("");
        assert_eq!(registry.decorators_for(&plain).len(), 1);
        let special = reg_of::<u32>("special");
        assert_eq!(registry.decorators_for(&special).len(), 2);
    }
}
