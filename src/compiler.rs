//! The recipe compiler: lowers planned constructions into resolve delegates.
//!
//! The first resolution of a key compiles a single closure of signature
//! `(constants) -> instance` and publishes it into the copy-on-write
//! delegate table; subsequent resolutions hit the table without locking.
//! Emit composes, inside-out: base construction (value slot, opaque
//! factory, or planned constructor with property injection), overrides,
//! decorators, lifetime wrapping, and the runtime cycle guard around the
//! whole pipeline.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::constants::Constants;
use crate::container::{upgrade, Container, ContainerInner, ResolverContext};
use crate::error::{DiError, DiResult};
use crate::internal::cycle::{is_on_stack, StackFrame};
use crate::key::ServiceKey;
use crate::metadata::{ParamShape, ShapeResolver};
use crate::payload::{AnyArc, ErasedResolve, ErasedResolveAll};
use crate::planner::{plan, Dependency, PropertyDependency};
use crate::registration::{
    DecoratorRegistration, Initializer, ServiceRegistration, ServiceRequest,
};

/// A compiled resolve delegate: everything it needs beyond the constants
/// view was captured at emit time.
pub(crate) type ResolveDelegate = Arc<dyn Fn(&Constants) -> DiResult<AnyArc> + Send + Sync>;

/// Property-injection delegate for one concrete type.
pub(crate) type PropertyInjector =
    Arc<dyn Fn(&Constants, &AnyArc) -> DiResult<()> + Send + Sync>;

impl Container {
    /// Fast-path lookup of the compiled delegate, building and publishing
    /// it on first use. Compilation for any one key happens on a single
    /// thread; others wait on the (re-entrant) build lock.
    pub(crate) fn delegate_for(&self, key: &ServiceKey) -> DiResult<ResolveDelegate> {
        if let Some(delegate) = self.inner().delegates.load().get(key) {
            return Ok(delegate.clone());
        }
        let _build = self.inner().build_lock.lock();
        self.delegate_for_locked(key)
    }

    /// Same as [`delegate_for`](Self::delegate_for) but assumes the build
    /// lock is held; used for dependency recursion during emit.
    pub(crate) fn delegate_for_locked(&self, key: &ServiceKey) -> DiResult<ResolveDelegate> {
        if let Some(delegate) = self.inner().delegates.load().get(key) {
            return Ok(delegate.clone());
        }
        let frame = StackFrame::enter(key)?;
        let delegate = self.build_delegate(key)?;
        drop(frame);

        let mut table: HashMap<ServiceKey, ResolveDelegate> =
            (**self.inner().delegates.load()).clone();
        table.insert(key.clone(), delegate.clone());
        self.inner().delegates.store(Arc::new(table));
        Ok(delegate)
    }

    /// Emit algorithm: registered emitter, single-named redirect, fallback
    /// synthesis, and finally NotRegistered. Open-generic expansion happens
    /// in the typed `get_open` door before this point.
    fn build_delegate(&self, key: &ServiceKey) -> DiResult<ResolveDelegate> {
        let registration = self.inner().registry.read().find(key).cloned();
        if let Some(registration) = registration {
            return self.emit_registration(&registration);
        }

        // An unnamed request for an identity with exactly one named
        // registration redirects to that registration.
        if key.is_default() {
            let sole = {
                let registry = self.inner().registry.read();
                let all = registry.registrations_for(key.service_id());
                if all.len() == 1 {
                    Some(all[0].key().clone())
                } else {
                    None
                }
            };
            if let Some(named_key) = sole {
                return self.delegate_for_locked(&named_key);
            }
        }

        if let Some(registration) = self.synthesize_from_fallback(key) {
            return self.emit_registration(&registration);
        }

        Err(DiError::NotRegistered(key.to_string()))
    }

    /// First matching fallback rule wins; the synthetic registration is
    /// installed back into the registry under the requested key.
    fn synthesize_from_fallback(&self, key: &ServiceKey) -> Option<ServiceRegistration> {
        let (factory, lifetime) = {
            let registry = self.inner().registry.read();
            let rule = registry.fallbacks.iter().find(|r| (r.predicate)(key))?;
            (rule.factory.clone(), rule.lifetime.clone())
        };

        let request_key = key.clone();
        let mut registration = ServiceRegistration::with_factory(
            key.clone(),
            Arc::new(move |ctx: &ResolverContext<'_>| {
                let request = ServiceRequest {
                    key: &request_key,
                    resolver: ctx,
                };
                factory(&request)
            }),
        );
        // Every synthesized registration owns a fresh lifetime object, so
        // one rule serving many keys never shares cached instances.
        registration.lifetime = lifetime.map(|l| l.duplicate());

        self.inner().registry.write().insert(registration.clone());
        Some(registration)
    }

    /// Wraps a registration's base emitter with overrides, decorators, and
    /// its lifetime.
    pub(crate) fn emit_registration(
        &self,
        registration: &ServiceRegistration,
    ) -> DiResult<ResolveDelegate> {
        let mut registration = registration.clone();

        // Overrides, in declaration order; every match may rewrite.
        let overrides = self.inner().registry.read().overrides.clone();
        for service_override in overrides {
            if (service_override.predicate)(&registration) {
                registration = (service_override.rewrite)(&self.handle(), registration);
            }
        }

        let mut emitter = self.emit_base(&registration)?;

        // Decorators fold descending by index so the lowest index (first
        // registered) ends up outermost.
        let decorators = self.inner().registry.read().decorators_for(&registration);
        for decorator in decorators.iter().rev() {
            emitter = self.emit_decorator(decorator, emitter)?;
        }

        self.wrap_lifetime(&registration, emitter)
    }

    /// Base emitter: value slot load, opaque factory, or planned
    /// construction with property injection and initializers. Initializers
    /// run inside the construction path, so caching lifetimes apply them
    /// once per constructed instance.
    fn emit_base(&self, registration: &ServiceRegistration) -> DiResult<ResolveDelegate> {
        let initializers: Vec<Initializer> = self
            .inner()
            .registry
            .read()
            .initializers
            .iter()
            .filter(|i| (i.predicate)(registration))
            .cloned()
            .collect();
        let weak = self.downgrade();

        if let Some(value) = &registration.value {
            let slot = self.inner().constants.push_instance(value.clone());
            let base: ResolveDelegate = Arc::new(move |c: &Constants| c.instance(slot));
            return Ok(self.attach_initializers(base, initializers));
        }

        if let Some(factory) = &registration.factory {
            let factory = factory.clone();
            let base: ResolveDelegate = Arc::new(move |c: &Constants| {
                let container = upgrade(&weak)?;
                let ctx = ResolverContext::new(&container, c.args());
                factory(&ctx)
            });
            return Ok(self.attach_initializers(base, initializers));
        }

        // Planned construction from type metadata.
        let info = {
            let registry = self.inner().registry.read();
            let metas = self.inner().metas.read();
            plan(
                registration,
                &registry,
                &metas,
                self.options().enable_property_injection,
            )?
        };
        let ctor = info
            .ctor
            .ok_or_else(|| DiError::NotRegistered(registration.key().to_string()))?;

        let mut producers = Vec::with_capacity(info.ctor_deps.len());
        for dep in &info.ctor_deps {
            producers.push(self.emit_dependency(registration, dep)?);
        }

        let mut property_slots = Vec::with_capacity(info.prop_deps.len());
        for prop in &info.prop_deps {
            property_slots.push((self.emit_property(registration, prop)?, prop.set.clone()));
        }

        let invoke = ctor.invoke.clone();
        let upcast = registration.upcast.clone();
        let base: ResolveDelegate = Arc::new(move |c: &Constants| {
            let mut args = Vec::with_capacity(producers.len());
            for producer in &producers {
                args.push(producer(c)?);
            }
            let instance = invoke(args)?;
            for (producer, set) in &property_slots {
                if let Some(producer) = producer {
                    set(&instance, producer(c)?)?;
                }
            }
            match &upcast {
                Some(up) => up(instance),
                None => Ok(instance),
            }
        });
        Ok(self.attach_initializers(base, initializers))
    }

    fn attach_initializers(
        &self,
        base: ResolveDelegate,
        initializers: Vec<Initializer>,
    ) -> ResolveDelegate {
        if initializers.is_empty() {
            return base;
        }
        let weak = self.downgrade();
        Arc::new(move |c: &Constants| {
            let instance = base(c)?;
            let container = upgrade(&weak)?;
            let ctx = ResolverContext::new(&container, c.args());
            for initializer in &initializers {
                (initializer.action)(&ctx, &instance)?;
            }
            Ok(instance)
        })
    }

    /// Producer for one constructor dependency.
    fn emit_dependency(
        &self,
        owner: &ServiceRegistration,
        dep: &Dependency,
    ) -> DiResult<ResolveDelegate> {
        if let Some(factory) = &dep.factory {
            let factory = factory.clone();
            let weak = self.downgrade();
            return Ok(Arc::new(move |c: &Constants| {
                let container = upgrade(&weak)?;
                let ctx = ResolverContext::new(&container, c.args());
                factory(&ctx)
            }));
        }

        match &dep.shape {
            ParamShape::Deferred(synth) => {
                let synth = synth.clone();
                let resolver = self.shape_resolver(dep);
                Ok(Arc::new(move |_c: &Constants| synth(&resolver)))
            }
            ParamShape::Service => {
                let delegate = match self.delegate_for_locked(&dep.default_key()) {
                    Ok(delegate) => delegate,
                    Err(err) if err.is_not_registered() => {
                        // Named-by-parameter-name convention.
                        match self.delegate_for_locked(&dep.named_key()) {
                            Ok(delegate) => delegate,
                            Err(inner) if inner.is_not_registered() => {
                                if dep.is_required {
                                    return Err(DiError::UnresolvedDependency {
                                        service: owner
                                            .implementing_type_name()
                                            .unwrap_or(owner.key().display_name()),
                                        dependency: dep.type_name.to_string(),
                                        cause: Box::new(err),
                                    });
                                }
                                return Err(err);
                            }
                            Err(inner) => return Err(inner),
                        }
                    }
                    Err(err) => return Err(err),
                };
                Ok(delegate)
            }
        }
    }

    /// Producer for one property dependency; `None` means the optional
    /// dependency is unregistered and the property is skipped.
    pub(crate) fn emit_property(
        &self,
        owner: &ServiceRegistration,
        prop: &PropertyDependency,
    ) -> DiResult<Option<ResolveDelegate>> {
        match self.emit_dependency(owner, &prop.dep) {
            Ok(producer) => Ok(Some(producer)),
            Err(err) if err.is_not_registered() => Ok(None),
            Err(DiError::UnresolvedDependency { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Deferred-shape resolution capabilities for a dependency: a fresh
    /// front-door resolve and an enumerate-all, both late-bound through a
    /// weak handle so delegates never keep their container alive.
    fn shape_resolver(&self, dep: &Dependency) -> ShapeResolver {
        let weak = self.downgrade();
        let key = dep.default_key();
        let one: ErasedResolve = Arc::new(move || upgrade(&weak)?.resolve_erased(&key, None));

        let weak = self.downgrade();
        let id = dep.service_id;
        let all: ErasedResolveAll = Arc::new(move || upgrade(&weak)?.resolve_all_erased(id));

        ShapeResolver { one, all }
    }

    /// One decorator layer around `inner`.
    fn emit_decorator(
        &self,
        decorator: &DecoratorRegistration,
        inner: ResolveDelegate,
    ) -> DiResult<ResolveDelegate> {
        if let Some(factory) = &decorator.factory {
            let factory = factory.clone();
            let weak = self.downgrade();
            return Ok(Arc::new(move |c: &Constants| {
                let inner_value = inner(c)?;
                let container = upgrade(&weak)?;
                let ctx = ResolverContext::new(&container, c.args());
                factory(&ctx, inner_value)
            }));
        }

        // Constructor-form decorator: build the implementing type,
        // substituting `inner` for the target parameter. The substitution
        // is the one structural exemption from the cycle guard.
        let implementing = decorator
            .implementing
            .ok_or(DiError::NoPublicConstructor(decorator.type_name))?;
        let meta = self
            .inner()
            .metas
            .read()
            .get(&implementing)
            .cloned()
            .ok_or(DiError::NoPublicConstructor(decorator.type_name))?;
        let ctor = meta
            .constructors
            .iter()
            .find(|ctor| {
                ctor.params
                    .iter()
                    .any(|p| p.service_id == decorator.service_id)
            })
            .ok_or(DiError::NoResolvableConstructor(decorator.type_name))?;

        let mut producers: Vec<ResolveDelegate> = Vec::with_capacity(ctor.params.len());
        let mut target_seen = false;
        for param in &ctor.params {
            if param.service_id == decorator.service_id && !target_seen {
                target_seen = true;
                match &param.shape {
                    // Plain `Arc<identity>` target: splice the inner
                    // emitter directly.
                    ParamShape::Service => producers.push(inner.clone()),
                    // `Lazy<identity>` (or other deferred) target: the
                    // synthesizer's fresh-resolve is the inner emitter.
                    ParamShape::Deferred(synth) => {
                        let synth = synth.clone();
                        let inner = inner.clone();
                        let weak = self.downgrade();
                        let id = param.service_id;
                        producers.push(Arc::new(move |c: &Constants| {
                            let c2 = c.clone();
                            let inner = inner.clone();
                            let one: ErasedResolve = Arc::new(move || inner(&c2));
                            let weak = weak.clone();
                            let all: ErasedResolveAll =
                                Arc::new(move || upgrade(&weak)?.resolve_all_erased(id));
                            synth(&ShapeResolver { one, all })
                        }));
                    }
                }
            } else {
                let dep = Dependency {
                    service_id: param.service_id,
                    type_name: param.type_name,
                    service_name: crate::key::ServiceName::default_name(),
                    name: param.name,
                    is_required: true,
                    shape: param.shape.clone(),
                    factory: None,
                };
                let owner = ServiceRegistration::with_type(
                    ServiceKey::new(
                        decorator.service_id,
                        decorator.type_name,
                        crate::key::ServiceName::default_name(),
                    ),
                    implementing,
                    decorator.type_name,
                );
                producers.push(self.emit_dependency(&owner, &dep)?);
            }
        }
        if !target_seen {
            return Err(DiError::NoResolvableConstructor(decorator.type_name));
        }

        let invoke = ctor.invoke.clone();
        let upcast = decorator
            .upcast
            .clone()
            .ok_or(DiError::TypeMismatch(decorator.type_name))?;
        Ok(Arc::new(move |c: &Constants| {
            let mut args = Vec::with_capacity(producers.len());
            for producer in &producers {
                args.push(producer(c)?);
            }
            upcast(invoke(args)?)
        }))
    }

    /// Lifetime wrapping. Per-container lifetimes are materialized at emit
    /// time and inlined as a constants slot; everything else emits the
    /// generic call path through the scope manager.
    fn wrap_lifetime(
        &self,
        registration: &ServiceRegistration,
        base: ResolveDelegate,
    ) -> DiResult<ResolveDelegate> {
        // A pre-built value is per-container by construction: evaluate the
        // full pipeline (decorators, initializers) once and inline the
        // result as a constants slot.
        if registration.has_value() {
            let constants = self.inner().constants.snapshot();
            let value = base(&constants)?;
            let slot = self.inner().constants.push_instance(value);
            return Ok(Arc::new(move |c: &Constants| c.instance(slot)));
        }
        let lifetime = match &registration.lifetime {
            Some(lifetime) => lifetime.clone(),
            None => return Ok(base),
        };
        let hook = registration.dispose.clone();

        if lifetime.materialize_at_emit() {
            let constants = self.inner().constants.snapshot();
            let create = || base(&constants);
            let value = lifetime.get_instance(&create, None, hook.as_ref())?;
            let slot = self.inner().constants.push_instance(value);
            return Ok(Arc::new(move |c: &Constants| c.instance(slot)));
        }

        let lifetime_slot = self.inner().constants.push_lifetime(lifetime);
        let scope_slot = self.scope_manager_slot();
        Ok(Arc::new(move |c: &Constants| {
            let lifetime = c.lifetime(lifetime_slot)?;
            let manager = c.scopes(scope_slot)?;
            let scope = manager.current_scope();
            let create = || base(c);
            lifetime.get_instance(&create, scope.as_ref(), hook.as_ref())
        }))
    }

    /// Resolves every registration whose identity is `element_id` (plus,
    /// under variance, registrations declared assignable to it), in
    /// registration order. Registrations currently being expanded on this
    /// thread are excluded from their own enumeration.
    pub(crate) fn resolve_all_erased(
        &self,
        element_id: std::any::TypeId,
    ) -> DiResult<Vec<AnyArc>> {
        let (exact, widened) = {
            let registry = self.inner().registry.read();
            let exact: Vec<ServiceKey> = registry
                .registrations_for(element_id)
                .iter()
                .map(|r| r.key().clone())
                .collect();
            let mut widened = Vec::new();
            if self.options().enable_variance {
                if let Some(links) = registry.assignable.get(&element_id) {
                    for link in links {
                        for registration in registry.registrations_for(link.source_id) {
                            widened.push((registration.key().clone(), link.upcast.clone()));
                        }
                    }
                }
            }
            (exact, widened)
        };

        let mut out = Vec::with_capacity(exact.len() + widened.len());
        for key in exact {
            if is_on_stack(&key) {
                continue;
            }
            out.push(self.run_delegate(&key, None)?);
        }
        for (key, up) in widened {
            if is_on_stack(&key) {
                continue;
            }
            out.push(up(self.run_delegate(&key, None)?)?);
        }
        Ok(out)
    }

    /// Executes one key's delegate under a runtime guard frame.
    pub(crate) fn run_delegate(
        &self,
        key: &ServiceKey,
        args: Option<AnyArc>,
    ) -> DiResult<AnyArc> {
        let delegate = self.delegate_for(key)?;
        let frame = StackFrame::enter(key)?;
        let constants = self.inner().constants.snapshot();
        let constants = match args {
            Some(args) => constants.with_args(args),
            None => constants,
        };
        let out = delegate(&constants);
        drop(frame);
        out
    }

    pub(crate) fn downgrade(&self) -> Weak<ContainerInner> {
        Arc::downgrade(self.inner_arc())
    }
}
