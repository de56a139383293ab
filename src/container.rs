//! The container façade: registration and resolution surface.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, ReentrantMutex, RwLock};

use crate::compiler::{PropertyInjector, ResolveDelegate};
use crate::constants::ConstantsTable;
use crate::deferred::{ArgsFn, Lazy, ServiceFn};
use crate::descriptors::{RegistrationKind, ServiceDescriptor};
use crate::dispose::{dispose_hook_of, Dispose};
use crate::error::{DiError, DiResult};
use crate::generics::GenericDefinition;
use crate::internal::cycle;
use crate::key::{ServiceKey, ServiceName};
use crate::lifetime::Lifetime;
use crate::metadata::TypeMeta;
use crate::options::{ContainerOptions, LogEntry, LogLevel};
use crate::payload::{downcast_payload, wrap, wrap_shared, AnyArc};
use crate::planner::plan_properties;
use crate::registration::{
    Registry, ServiceRegistration, ServiceRequest,
};
use crate::scope::{ScopeHandle, ScopeManagerProvider};

pub(crate) struct ContainerInner {
    pub(crate) registry: RwLock<Registry>,
    pub(crate) metas: RwLock<HashMap<TypeId, Arc<TypeMeta>>>,
    pub(crate) constants: ConstantsTable,
    pub(crate) delegates: ArcSwap<HashMap<ServiceKey, ResolveDelegate>>,
    pub(crate) injectors: ArcSwap<HashMap<TypeId, PropertyInjector>>,
    pub(crate) build_lock: ReentrantMutex<()>,
    pub(crate) locked: AtomicBool,
    pub(crate) disposed: AtomicBool,
    pub(crate) scopes: ScopeManagerProvider,
    pub(crate) scope_slot: OnceCell<usize>,
    pub(crate) composed_roots: Mutex<HashSet<TypeId>>,
    pub(crate) options: ContainerOptions,
}

/// Recovers a container handle from the weak reference emitted closures
/// capture, failing if the container is gone.
pub(crate) fn upgrade(weak: &Weak<ContainerInner>) -> DiResult<Container> {
    weak.upgrade()
        .map(|inner| Container { inner })
        .ok_or_else(|| DiError::InvalidScope("container has been dropped".to_string()))
}

/// Inversion-of-control container.
///
/// Registrations populate the registry; the first resolution of a key
/// compiles a resolve delegate and publishes it into an immutable
/// copy-on-write table, after which resolution is lock-free. The first
/// resolve also locks the container: later registration writes are
/// rejected with a warning (decorator and override registration becomes a
/// hard error).
///
/// # Examples
///
/// ```
/// use anvil_di::{Container, TypeMeta};
/// use std::sync::Arc;
///
/// struct Config { url: String }
/// struct Client { config: Arc<Config> }
///
/// let container = Container::new();
/// container.register_instance(Arc::new(Config {
///     url: "https://localhost".to_string(),
/// }));
/// container.register_meta(
///     TypeMeta::of::<Client>()
///         .ctor1::<Arc<Config>>(["config"], |config| Client { config })
///         .build(),
/// );
/// container.register::<Client, Client>(|c| c);
///
/// let client = container.get::<Client>().unwrap();
/// assert_eq!(client.config.url, "https://localhost");
/// ```
pub struct Container {
    pub(crate) inner: Arc<ContainerInner>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    pub fn with_options(options: ContainerOptions) -> Self {
        let scopes = ScopeManagerProvider::new(options.scope_flow);
        Self {
            inner: Arc::new(ContainerInner {
                registry: RwLock::new(Registry::new()),
                metas: RwLock::new(HashMap::new()),
                constants: ConstantsTable::new(),
                delegates: ArcSwap::from_pointee(HashMap::new()),
                injectors: ArcSwap::from_pointee(HashMap::new()),
                build_lock: ReentrantMutex::new(()),
                locked: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                scopes,
                scope_slot: OnceCell::new(),
                composed_roots: Mutex::new(HashSet::new()),
                options,
            }),
        }
    }

    #[inline]
    pub(crate) fn inner(&self) -> &ContainerInner {
        &self.inner
    }

    #[inline]
    pub(crate) fn inner_arc(&self) -> &Arc<ContainerInner> {
        &self.inner
    }

    pub(crate) fn handle(&self) -> Container {
        Container {
            inner: self.inner.clone(),
        }
    }

    pub(crate) fn options(&self) -> &ContainerOptions {
        &self.inner.options
    }

    pub(crate) fn scope_manager_slot(&self) -> usize {
        *self
            .inner
            .scope_slot
            .get_or_init(|| self.inner.constants.push_scopes(self.inner.scopes.get()))
    }

    fn log(&self, level: LogLevel, message: String) {
        self.inner.options.log_sink.log(LogEntry { level, message });
    }

    fn is_locked(&self) -> bool {
        self.inner.locked.load(Ordering::Acquire)
    }

    fn mark_resolved(&self) {
        self.inner.locked.store(true, Ordering::Release);
    }

    fn ensure_live(&self) -> DiResult<()> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(DiError::InvalidScope(
                "container has been disposed".to_string(),
            ));
        }
        Ok(())
    }

    /// Registration write gate: after the first resolve, writes are
    /// rejected and the existing state retained.
    fn registration_gate(&self, what: &str) -> bool {
        if self.is_locked() {
            self.log(
                LogLevel::Warning,
                format!("{} rejected: container is locked after first resolve", what),
            );
            return false;
        }
        true
    }

    // ----- Metadata -----

    /// Registers type metadata used by the construction planner,
    /// `create`, and `inject_properties`.
    pub fn register_meta(&self, meta: TypeMeta) -> &Self {
        if self.registration_gate("type metadata registration") {
            self.inner.metas.write().insert(meta.type_id(), Arc::new(meta));
        }
        self
    }

    // ----- Registration by implementing type -----

    /// Registers `I` as the implementation of `S` with the default name
    /// and lifetime. The closure performs the `Arc<I> -> Arc<S>` unsized
    /// coercion at the call site; for a self-registration pass `|x| x`.
    pub fn register<S, I>(
        &self,
        up: impl Fn(Arc<I>) -> Arc<S> + Send + Sync + 'static,
    ) -> &Self
    where
        S: ?Sized + Send + Sync + 'static,
        I: Send + Sync + 'static,
    {
        self.register_with::<S, I>(None, None, up)
    }

    pub fn register_named<S, I>(
        &self,
        name: &str,
        up: impl Fn(Arc<I>) -> Arc<S> + Send + Sync + 'static,
    ) -> &Self
    where
        S: ?Sized + Send + Sync + 'static,
        I: Send + Sync + 'static,
    {
        self.register_with::<S, I>(Some(name), None, up)
    }

    /// Full form of implementing-type registration.
    pub fn register_with<S, I>(
        &self,
        name: Option<&str>,
        lifetime: Option<Arc<dyn Lifetime>>,
        up: impl Fn(Arc<I>) -> Arc<S> + Send + Sync + 'static,
    ) -> &Self
    where
        S: ?Sized + Send + Sync + 'static,
        I: Send + Sync + 'static,
    {
        let key = ServiceKey::new(
            TypeId::of::<S>(),
            std::any::type_name::<S>(),
            ServiceName::from(name),
        );
        let mut registration = ServiceRegistration::with_type(
            key,
            TypeId::of::<I>(),
            std::any::type_name::<I>(),
        );
        registration.upcast = Some(Arc::new(move |any: AnyArc| {
            Ok(wrap_shared(up(downcast_payload::<I>(any)?)))
        }));
        // Self-registrations inherit the implementing type's dispose hook.
        if TypeId::of::<S>() == TypeId::of::<I>() {
            if let Some(meta) = self.inner.metas.read().get(&TypeId::of::<I>()) {
                registration.dispose = meta.dispose.clone();
            }
        }
        self.finish_registration(registration, lifetime)
    }

    /// Like [`register_with`](Self::register_with), for service identities
    /// that own their cleanup. The dispose hook is attached at the service
    /// level so lifetime owners can dispose what they cache.
    pub fn register_disposable<S, I>(
        &self,
        name: Option<&str>,
        lifetime: Option<Arc<dyn Lifetime>>,
        up: impl Fn(Arc<I>) -> Arc<S> + Send + Sync + 'static,
    ) -> &Self
    where
        S: ?Sized + Dispose + Send + Sync + 'static,
        I: Send + Sync + 'static,
    {
        let key = ServiceKey::new(
            TypeId::of::<S>(),
            std::any::type_name::<S>(),
            ServiceName::from(name),
        );
        let mut registration = ServiceRegistration::with_type(
            key,
            TypeId::of::<I>(),
            std::any::type_name::<I>(),
        );
        registration.upcast = Some(Arc::new(move |any: AnyArc| {
            Ok(wrap_shared(up(downcast_payload::<I>(any)?)))
        }));
        registration.dispose = Some(dispose_hook_of::<S>());
        self.finish_registration(registration, lifetime)
    }

    // ----- Registration by pre-built instance -----

    /// Registers a pre-built instance; implies per-container lifetime. The
    /// caller keeps ownership of the instance's cleanup.
    pub fn register_instance<S>(&self, value: Arc<S>) -> &Self
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.register_instance_named("", value)
    }

    pub fn register_instance_named<S>(&self, name: &str, value: Arc<S>) -> &Self
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let key = ServiceKey::of_named::<S>(name);
        let registration = ServiceRegistration::with_value(key, wrap_shared(value));
        if self.registration_gate("instance registration") {
            self.inner.registry.write().insert(registration);
        }
        self
    }

    // ----- Registration by factory closure -----

    /// Registers a transient factory with the default name.
    pub fn register_factory<S, F>(&self, factory: F) -> &Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>) -> DiResult<Arc<S>> + Send + Sync + 'static,
    {
        self.register_factory_with(None, None, factory)
    }

    /// Full form of factory registration.
    pub fn register_factory_with<S, F>(
        &self,
        name: Option<&str>,
        lifetime: Option<Arc<dyn Lifetime>>,
        factory: F,
    ) -> &Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>) -> DiResult<Arc<S>> + Send + Sync + 'static,
    {
        let key = ServiceKey::new(
            TypeId::of::<S>(),
            std::any::type_name::<S>(),
            ServiceName::from(name),
        );
        let registration = ServiceRegistration::with_factory(
            key,
            Arc::new(move |ctx: &ResolverContext<'_>| Ok(wrap_shared(factory(ctx)?))),
        );
        self.finish_registration(registration, lifetime)
    }

    /// Factory registration for a disposable service.
    pub fn register_factory_disposable<S, F>(
        &self,
        name: Option<&str>,
        lifetime: Option<Arc<dyn Lifetime>>,
        factory: F,
    ) -> &Self
    where
        S: ?Sized + Dispose + Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>) -> DiResult<Arc<S>> + Send + Sync + 'static,
    {
        let key = ServiceKey::new(
            TypeId::of::<S>(),
            std::any::type_name::<S>(),
            ServiceName::from(name),
        );
        let mut registration = ServiceRegistration::with_factory(
            key,
            Arc::new(move |ctx: &ResolverContext<'_>| Ok(wrap_shared(factory(ctx)?))),
        );
        registration.dispose = Some(dispose_hook_of::<S>());
        self.finish_registration(registration, lifetime)
    }

    /// Factory taking caller-supplied arguments; resolve with
    /// [`get_with`](Self::get_with) or through an [`ArgsFn`]. The argument
    /// bundle is usually a tuple of up to four values.
    pub fn register_args_factory<S, A, F>(
        &self,
        name: Option<&str>,
        lifetime: Option<Arc<dyn Lifetime>>,
        factory: F,
    ) -> &Self
    where
        S: ?Sized + Send + Sync + 'static,
        A: Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>, &A) -> DiResult<Arc<S>> + Send + Sync + 'static,
    {
        let key = ServiceKey::new(
            TypeId::of::<S>(),
            std::any::type_name::<S>(),
            ServiceName::from(name),
        );
        let registration = ServiceRegistration::with_factory(
            key,
            Arc::new(move |ctx: &ResolverContext<'_>| {
                let args = ctx.arg::<A>()?;
                Ok(wrap_shared(factory(ctx, args)?))
            }),
        );
        self.finish_registration(registration, lifetime)
    }

    fn finish_registration(
        &self,
        mut registration: ServiceRegistration,
        lifetime: Option<Arc<dyn Lifetime>>,
    ) -> &Self {
        if !self.registration_gate("service registration") {
            return self;
        }
        let mut registry = self.inner.registry.write();
        registration.lifetime = lifetime.or_else(|| registry.default_lifetime.clone());
        registry.insert(registration);
        self
    }

    /// Default lifetime applied to subsequent registrations that omit an
    /// explicit lifetime; prior registrations are unchanged.
    pub fn set_default_lifetime(&self, lifetime: Arc<dyn Lifetime>) -> &Self {
        if self.registration_gate("default lifetime change") {
            self.inner.registry.write().default_lifetime = Some(lifetime);
        }
        self
    }

    // ----- Decorators, overrides, fallbacks, initializers -----

    /// Registers a factory-form decorator for `S`: the closure receives
    /// the inner (decorated) instance and returns the replacement.
    /// First-registered decorators end up outermost.
    pub fn decorate<S, F>(&self, factory: F) -> DiResult<()>
    where
        S: ?Sized + Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>, Arc<S>) -> DiResult<Arc<S>> + Send + Sync + 'static,
    {
        self.decorate_when::<S, _, _>(|_| true, factory)
    }

    /// Factory-form decorator applied only to registrations accepted by
    /// the predicate.
    pub fn decorate_when<S, P, F>(&self, predicate: P, factory: F) -> DiResult<()>
    where
        S: ?Sized + Send + Sync + 'static,
        P: Fn(&ServiceRegistration) -> bool + Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>, Arc<S>) -> DiResult<Arc<S>> + Send + Sync + 'static,
    {
        if self.is_locked() {
            return Err(DiError::RegistrationAfterLock("decorator"));
        }
        self.inner.registry.write().add_decorator(
            TypeId::of::<S>(),
            std::any::type_name::<S>(),
            None,
            Some(Arc::new(move |ctx: &ResolverContext<'_>, inner: AnyArc| {
                Ok(wrap_shared(factory(ctx, downcast_payload::<S>(inner)?)?))
            })),
            None,
            Arc::new(predicate),
        );
        Ok(())
    }

    /// Registers a constructor-form decorator: `D`'s metadata must have a
    /// constructor with a parameter of type `Arc<S>` or `Lazy<S>` — the
    /// target — which receives the decorated instance.
    pub fn decorate_with<S, D>(
        &self,
        up: impl Fn(Arc<D>) -> Arc<S> + Send + Sync + 'static,
    ) -> DiResult<()>
    where
        S: ?Sized + Send + Sync + 'static,
        D: Send + Sync + 'static,
    {
        if self.is_locked() {
            return Err(DiError::RegistrationAfterLock("decorator"));
        }
        self.inner.registry.write().add_decorator(
            TypeId::of::<S>(),
            std::any::type_name::<S>(),
            Some(TypeId::of::<D>()),
            None,
            Some(Arc::new(move |any: AnyArc| {
                Ok(wrap_shared(up(downcast_payload::<D>(any)?)))
            })),
            Arc::new(|_| true),
        );
        Ok(())
    }

    /// Registers an emit-time override: every matching override may
    /// rewrite the registration, composed in declaration order.
    pub fn register_override<P, R>(&self, predicate: P, rewrite: R) -> DiResult<()>
    where
        P: Fn(&ServiceRegistration) -> bool + Send + Sync + 'static,
        R: Fn(&Container, ServiceRegistration) -> ServiceRegistration + Send + Sync + 'static,
    {
        if self.is_locked() {
            return Err(DiError::RegistrationAfterLock("override"));
        }
        self.inner
            .registry
            .write()
            .overrides
            .push(crate::registration::ServiceOverride {
                predicate: Arc::new(predicate),
                rewrite: Arc::new(rewrite),
            });
        Ok(())
    }

    /// Registers a fallback rule for `S`, consulted when no registration
    /// matches a requested key of that identity. The first matching rule
    /// synthesizes a registration that is installed under the key.
    pub fn register_fallback<S, P, F>(
        &self,
        predicate: P,
        lifetime: Option<Arc<dyn Lifetime>>,
        factory: F,
    ) -> &Self
    where
        S: ?Sized + Send + Sync + 'static,
        P: Fn(&ServiceKey) -> bool + Send + Sync + 'static,
        F: for<'a> Fn(&ServiceRequest<'a>) -> DiResult<Arc<S>> + Send + Sync + 'static,
    {
        if !self.registration_gate("fallback registration") {
            return self;
        }
        self.inner
            .registry
            .write()
            .fallbacks
            .push(crate::registration::FactoryRule {
                predicate: Arc::new(move |key: &ServiceKey| {
                    key.service_id() == TypeId::of::<S>() && predicate(key)
                }),
                factory: Arc::new(move |request: &ServiceRequest<'_>| {
                    Ok(wrap_shared(factory(request)?))
                }),
                lifetime,
            });
        self
    }

    /// Registers a post-construction initializer for matching
    /// registrations of `S`, applied in declaration order.
    pub fn register_initializer<S, P, F>(&self, predicate: P, action: F) -> &Self
    where
        S: ?Sized + Send + Sync + 'static,
        P: Fn(&ServiceRegistration) -> bool + Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>, &Arc<S>) -> DiResult<()> + Send + Sync + 'static,
    {
        if !self.registration_gate("initializer registration") {
            return self;
        }
        self.inner
            .registry
            .write()
            .initializers
            .push(crate::registration::Initializer {
                predicate: Arc::new(move |registration: &ServiceRegistration| {
                    registration.key().service_id() == TypeId::of::<S>()
                        && predicate(registration)
                }),
                action: Arc::new(move |ctx: &ResolverContext<'_>, any: &AnyArc| {
                    let typed = any
                        .downcast_ref::<Arc<S>>()
                        .ok_or(DiError::TypeMismatch(std::any::type_name::<S>()))?;
                    action(ctx, typed)
                }),
            });
        self
    }

    /// Declares that registrations of `S` may satisfy enumerations of the
    /// wider identity `W` (covariant widening when variance is enabled).
    pub fn register_assignable<W, S>(
        &self,
        up: impl Fn(Arc<S>) -> Arc<W> + Send + Sync + 'static,
    ) -> &Self
    where
        W: ?Sized + Send + Sync + 'static,
        S: ?Sized + Send + Sync + 'static,
    {
        if !self.registration_gate("assignability registration") {
            return self;
        }
        self.inner
            .registry
            .write()
            .assignable
            .entry(TypeId::of::<W>())
            .or_default()
            .push(crate::registration::AssignableLink {
                source_id: TypeId::of::<S>(),
                upcast: Arc::new(move |any: AnyArc| {
                    Ok(wrap_shared(up(downcast_payload::<S>(any)?)))
                }),
            });
        self
    }

    /// Factory spliced in for every constructor dependency on `P` instead
    /// of recursive resolution. Post-lock writes warn and are ignored.
    pub fn register_ctor_dependency_factory<P, F>(&self, factory: F) -> &Self
    where
        P: ?Sized + Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>) -> DiResult<Arc<P>> + Send + Sync + 'static,
    {
        if !self.registration_gate("constructor dependency factory") {
            return self;
        }
        self.inner.registry.write().ctor_dep_factories.insert(
            TypeId::of::<P>(),
            Arc::new(move |ctx: &ResolverContext<'_>| Ok(wrap_shared(factory(ctx)?))),
        );
        self
    }

    /// Property-dependency counterpart of
    /// [`register_ctor_dependency_factory`](Self::register_ctor_dependency_factory).
    pub fn register_property_dependency_factory<P, F>(&self, factory: F) -> &Self
    where
        P: ?Sized + Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>) -> DiResult<Arc<P>> + Send + Sync + 'static,
    {
        if !self.registration_gate("property dependency factory") {
            return self;
        }
        self.inner.registry.write().prop_dep_factories.insert(
            TypeId::of::<P>(),
            Arc::new(move |ctx: &ResolverContext<'_>| Ok(wrap_shared(factory(ctx)?))),
        );
        self
    }

    // ----- Open generics -----

    /// Registers an open-generic definition; `get_open::<D, A>()` closes
    /// it over concrete arguments on demand.
    pub fn register_open<D: GenericDefinition>(
        &self,
        lifetime: Option<Arc<dyn Lifetime>>,
    ) -> &Self {
        if !self.registration_gate("open-generic registration") {
            return self;
        }
        self.inner.registry.write().open_generics.insert(
            TypeId::of::<D>(),
            crate::registration::OpenRegistration {
                definition_name: std::any::type_name::<D>(),
                lifetime,
            },
        );
        self
    }

    /// Resolves the closed generic `D::Output<A>`, expanding the open
    /// registration when no direct registration exists. The synthesized
    /// registration is installed under the closed key with a fresh copy of
    /// the open registration's lifetime, so later plain `get` calls are
    /// equivalent to a direct registration.
    pub fn get_open<D, A>(&self) -> DiResult<Arc<D::Output<A>>>
    where
        D: GenericDefinition,
        A: Send + Sync + 'static,
    {
        let key = ServiceKey::of::<D::Output<A>>();
        let known = self.inner.registry.read().contains(&key)
            || self.inner.delegates.load().contains_key(&key);
        if known {
            return self.get::<D::Output<A>>();
        }

        let open = self
            .inner
            .registry
            .read()
            .open_generics
            .get(&TypeId::of::<D>())
            .cloned();
        match open {
            Some(open) => {
                if !D::supports::<A>() {
                    // Constraint violation falls through to the remaining
                    // strategies; only when nothing else succeeds does the
                    // caller see the constraint error.
                    return match self.get::<D::Output<A>>() {
                        Err(err) if err.is_not_registered() => Err(DiError::GenericConstraint {
                            definition: open.definition_name,
                            argument: std::any::type_name::<A>(),
                        }),
                        other => other,
                    };
                }
                let mut registration = ServiceRegistration::with_factory(
                    key,
                    Arc::new(|ctx: &ResolverContext<'_>| Ok(wrap(D::construct::<A>(ctx)?))),
                );
                registration.lifetime = open.lifetime.as_ref().map(|l| l.duplicate());
                self.inner.registry.write().insert(registration);
                self.get::<D::Output<A>>()
            }
            None => self.get::<D::Output<A>>(),
        }
    }

    // ----- Resolution -----

    pub(crate) fn resolve_erased(
        &self,
        key: &ServiceKey,
        args: Option<AnyArc>,
    ) -> DiResult<AnyArc> {
        self.ensure_live()?;
        self.mark_resolved();
        let is_root = cycle::stack_depth() == 0;
        match self.run_delegate(key, args) {
            Ok(value) => Ok(value),
            Err(cause) if is_root => Err(DiError::ResolutionFailed {
                service: key.to_string(),
                cause: Box::new(cause),
            }),
            Err(err) => Err(err),
        }
    }

    /// Resolves the default registration of `S`.
    pub fn get<S: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<S>> {
        downcast_payload::<S>(self.resolve_erased(&ServiceKey::of::<S>(), None)?)
    }

    /// Resolves a named registration of `S` (names are case-insensitive).
    pub fn get_named<S: ?Sized + Send + Sync + 'static>(&self, name: &str) -> DiResult<Arc<S>> {
        downcast_payload::<S>(self.resolve_erased(&ServiceKey::of_named::<S>(name), None)?)
    }

    /// Resolves `S`, passing caller-supplied arguments to its factory.
    pub fn get_with<S, A>(&self, args: A) -> DiResult<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
        A: Send + Sync + 'static,
    {
        downcast_payload::<S>(
            self.resolve_erased(&ServiceKey::of::<S>(), Some(Arc::new(args)))?,
        )
    }

    pub fn get_named_with<S, A>(&self, name: &str, args: A) -> DiResult<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
        A: Send + Sync + 'static,
    {
        downcast_payload::<S>(
            self.resolve_erased(&ServiceKey::of_named::<S>(name), Some(Arc::new(args)))?,
        )
    }

    /// `None` when `S` is not registered; other failures propagate.
    pub fn try_get<S: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Option<Arc<S>>> {
        match self.get::<S>() {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_registered() => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn try_get_named<S: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> DiResult<Option<Arc<S>>> {
        match self.get_named::<S>(name) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_registered() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Resolves every registration of `S` (plus assignable registrations
    /// under variance), in registration order.
    pub fn get_all<S: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<S>>> {
        self.ensure_live()?;
        self.mark_resolved();
        let elements = self.resolve_all_erased(TypeId::of::<S>())?;
        let mut typed = Vec::with_capacity(elements.len());
        for element in elements {
            typed.push(downcast_payload::<S>(element)?);
        }
        Ok(typed)
    }

    /// A lazy handle resolving `S` on first use.
    pub fn get_lazy<S: ?Sized + Send + Sync + 'static>(&self) -> Lazy<S> {
        let weak = self.downgrade();
        let key = ServiceKey::of::<S>();
        Lazy::from_erased(Arc::new(move || upgrade(&weak)?.resolve_erased(&key, None)))
    }

    pub fn get_lazy_named<S: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Lazy<S> {
        let weak = self.downgrade();
        let key = ServiceKey::of_named::<S>(name);
        Lazy::from_erased(Arc::new(move || upgrade(&weak)?.resolve_erased(&key, None)))
    }

    /// A delegate performing a fresh resolve of `S` on every call.
    pub fn get_fn<S: ?Sized + Send + Sync + 'static>(&self) -> ServiceFn<S> {
        let weak = self.downgrade();
        let key = ServiceKey::of::<S>();
        ServiceFn::from_erased(Arc::new(move || upgrade(&weak)?.resolve_erased(&key, None)))
    }

    pub fn get_fn_named<S: ?Sized + Send + Sync + 'static>(&self, name: &str) -> ServiceFn<S> {
        let weak = self.downgrade();
        let key = ServiceKey::of_named::<S>(name);
        ServiceFn::from_erased(Arc::new(move || upgrade(&weak)?.resolve_erased(&key, None)))
    }

    /// A delegate resolving `S` with caller-supplied arguments.
    pub fn get_args_fn<S, A>(&self) -> ArgsFn<A, S>
    where
        S: ?Sized + Send + Sync + 'static,
        A: Send + Sync + 'static,
    {
        let weak = self.downgrade();
        let key = ServiceKey::of::<S>();
        ArgsFn::from_erased(Arc::new(move |args: AnyArc| {
            upgrade(&weak)?.resolve_erased(&key, Some(args))
        }))
    }

    // ----- Scopes -----

    /// Begins a nested scope and makes it current on this thread. The
    /// returned handle ends the scope when closed or dropped.
    pub fn begin_scope(&self) -> DiResult<ScopeHandle> {
        self.ensure_live()?;
        let manager = self.inner.scopes.get();
        let scope = manager.begin_scope()?;
        Ok(ScopeHandle::new(
            scope,
            manager,
            self.inner.options.log_sink.clone(),
        ))
    }

    // ----- Property injection -----

    /// Sets every discovered property dependency on an externally supplied
    /// instance. Setters are idempotent, so injecting twice equals
    /// injecting once. A no-op when property injection is disabled or `T`
    /// has no metadata.
    pub fn inject_properties<T: Send + Sync + 'static>(
        &self,
        instance: Arc<T>,
    ) -> DiResult<Arc<T>> {
        self.ensure_live()?;
        if !self.options().enable_property_injection {
            return Ok(instance);
        }
        let id = TypeId::of::<T>();
        let injector = match self.inner.injectors.load().get(&id) {
            Some(injector) => injector.clone(),
            None => {
                let _build = self.inner.build_lock.lock();
                if let Some(injector) = self.inner.injectors.load().get(&id) {
                    injector.clone()
                } else {
                    let injector = self.build_injector(id)?;
                    let mut table: HashMap<TypeId, PropertyInjector> =
                        (**self.inner.injectors.load()).clone();
                    table.insert(id, injector.clone());
                    self.inner.injectors.store(Arc::new(table));
                    injector
                }
            }
        };
        self.mark_resolved();
        let payload: AnyArc = Arc::new(instance.clone());
        injector(&self.inner.constants.snapshot(), &payload)?;
        Ok(instance)
    }

    fn build_injector(&self, id: TypeId) -> DiResult<PropertyInjector> {
        let meta = self.inner.metas.read().get(&id).cloned();
        let props = match meta {
            Some(meta) => {
                let registry = self.inner.registry.read();
                plan_properties(&meta, &registry, true)
            }
            None => Vec::new(),
        };

        let owner_name = self
            .inner
            .metas
            .read()
            .get(&id)
            .map(|m| m.type_name())
            .unwrap_or("<unknown>");
        let owner = ServiceRegistration::with_type(
            ServiceKey::new(id, owner_name, ServiceName::default_name()),
            id,
            owner_name,
        );

        let mut slots = Vec::with_capacity(props.len());
        for prop in &props {
            slots.push((self.emit_property(&owner, prop)?, prop.set.clone()));
        }
        Ok(Arc::new(move |c, instance| {
            for (producer, set) in &slots {
                if let Some(producer) = producer {
                    set(instance, producer(c)?)?;
                }
            }
            Ok(())
        }))
    }

    // ----- Remaining façade operations -----

    /// Register-if-missing, then resolve. Requires metadata for `T`. The
    /// implicit registration uses the default name and default lifetime.
    pub fn create<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let key = ServiceKey::of::<T>();
        let missing = !self.inner.registry.read().contains(&key);
        if missing {
            if !self.inner.metas.read().contains_key(&TypeId::of::<T>()) {
                return Err(DiError::NoPublicConstructor(std::any::type_name::<T>()));
            }
            let mut registration = ServiceRegistration::with_type(
                key,
                TypeId::of::<T>(),
                std::any::type_name::<T>(),
            );
            if let Some(meta) = self.inner.metas.read().get(&TypeId::of::<T>()) {
                registration.dispose = meta.dispose.clone();
            }
            let mut registry = self.inner.registry.write();
            registration.lifetime = registry.default_lifetime.clone();
            registry.insert(registration);
        }
        self.get::<T>()
    }

    /// Runs a composition root exactly once per root token `R`; duplicate
    /// executions are skipped with a warning.
    pub fn compose<R: 'static>(&self, compose: impl FnOnce(&Container)) -> bool {
        let fresh = self.inner.composed_roots.lock().insert(TypeId::of::<R>());
        if !fresh {
            self.log(
                LogLevel::Warning,
                format!(
                    "composition root {} already executed; skipping",
                    std::any::type_name::<R>()
                ),
            );
            return false;
        }
        compose(self);
        true
    }

    /// An independent container mirroring this one's registrations but
    /// sharing no compiled state: fresh delegate table, constants, lock
    /// state, and lifetime objects. The decorator index counter carries
    /// forward.
    pub fn clone_container(&self) -> Container {
        let registry = self.inner.registry.read().duplicate();
        let metas = self.inner.metas.read().clone();
        let options = self.inner.options.clone();
        let scopes = ScopeManagerProvider::new(options.scope_flow);
        Container {
            inner: Arc::new(ContainerInner {
                registry: RwLock::new(registry),
                metas: RwLock::new(metas),
                constants: ConstantsTable::new(),
                delegates: ArcSwap::from_pointee(HashMap::new()),
                injectors: ArcSwap::from_pointee(HashMap::new()),
                build_lock: ReentrantMutex::new(()),
                locked: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                scopes,
                scope_slot: OnceCell::new(),
                composed_roots: Mutex::new(HashSet::new()),
                options,
            }),
        }
    }

    /// Descriptors for every registration, for diagnostics.
    pub fn available_services(&self) -> Vec<ServiceDescriptor> {
        self.inner
            .registry
            .read()
            .iter()
            .map(|registration| ServiceDescriptor {
                key: registration.key().clone(),
                implementing: registration.implementing_type_name(),
                kind: if registration.has_value() {
                    RegistrationKind::Value
                } else if registration.has_factory() {
                    RegistrationKind::Factory
                } else {
                    RegistrationKind::ImplementingType
                },
            })
            .collect()
    }

    /// Disposes every disposable lifetime object (which disposes cached
    /// per-container instances) and drops compiled state. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        for lifetime in self.inner.registry.read().lifetimes() {
            lifetime.dispose();
        }
        self.inner.delegates.store(Arc::new(HashMap::new()));
        self.inner.injectors.store(Arc::new(HashMap::new()));
        self.log(LogLevel::Info, "container disposed".to_string());
    }
}

/// Context handed to factories, initializers, and overrides for resolving
/// further services and reading per-call arguments.
pub struct ResolverContext<'a> {
    container: &'a Container,
    args: Option<&'a AnyArc>,
}

impl<'a> ResolverContext<'a> {
    pub(crate) fn new(container: &'a Container, args: Option<&'a AnyArc>) -> Self {
        Self { container, args }
    }

    pub fn get<S: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<S>> {
        self.container.get::<S>()
    }

    pub fn get_named<S: ?Sized + Send + Sync + 'static>(&self, name: &str) -> DiResult<Arc<S>> {
        self.container.get_named::<S>(name)
    }

    pub fn try_get<S: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Option<Arc<S>>> {
        self.container.try_get::<S>()
    }

    pub fn get_all<S: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<S>>> {
        self.container.get_all::<S>()
    }

    pub fn get_lazy<S: ?Sized + Send + Sync + 'static>(&self) -> Lazy<S> {
        self.container.get_lazy::<S>()
    }

    pub fn get_fn<S: ?Sized + Send + Sync + 'static>(&self) -> ServiceFn<S> {
        self.container.get_fn::<S>()
    }

    /// The caller-supplied argument bundle for this resolve.
    pub fn arg<A: Send + Sync + 'static>(&self) -> DiResult<&A> {
        self.args
            .ok_or(DiError::TypeMismatch("missing runtime arguments"))?
            .downcast_ref::<A>()
            .ok_or(DiError::TypeMismatch(std::any::type_name::<A>()))
    }

    pub fn container(&self) -> &Container {
        self.container
    }
}
