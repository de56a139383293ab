//! Construction planning: constructor selection and dependency discovery.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::key::{ServiceKey, ServiceName};
use crate::metadata::{ConstructorMeta, ParamMeta, ParamShape, TypeMeta};
use crate::payload::AnyArc;
use crate::registration::{DepFactory, OpaqueFactory, Registry, ServiceRegistration};

/// One discovered dependency of a planned construction.
#[derive(Clone)]
pub(crate) struct Dependency {
    pub(crate) service_id: TypeId,
    pub(crate) type_name: &'static str,
    /// Registration name to resolve under; the planner always plans for the
    /// default name, with `name` as the named-by-parameter fallback.
    pub(crate) service_name: ServiceName,
    /// Parameter or property name, matched case-insensitively against named
    /// registrations when the default lookup misses.
    pub(crate) name: &'static str,
    pub(crate) is_required: bool,
    pub(crate) shape: ParamShape,
    /// Registered dependency factory spliced in instead of recursion.
    pub(crate) factory: Option<DepFactory>,
}

impl Dependency {
    fn from_param(param: &ParamMeta, required: bool, factory: Option<DepFactory>) -> Self {
        Self {
            service_id: param.service_id,
            type_name: param.type_name,
            service_name: ServiceName::default_name(),
            name: param.name,
            is_required: required,
            shape: param.shape.clone(),
            factory,
        }
    }

    pub(crate) fn default_key(&self) -> ServiceKey {
        ServiceKey::new(self.service_id, self.type_name, self.service_name.clone())
    }

    pub(crate) fn named_key(&self) -> ServiceKey {
        ServiceKey::new(self.service_id, self.type_name, ServiceName::new(self.name))
    }
}

/// A property dependency plus its setter.
#[derive(Clone)]
pub(crate) struct PropertyDependency {
    pub(crate) dep: Dependency,
    pub(crate) set: Arc<dyn Fn(&AnyArc, AnyArc) -> DiResult<()> + Send + Sync>,
}

/// Output of the planner: either an opaque factory, or a chosen
/// constructor with its ordered dependencies.
pub(crate) struct ConstructionInfo {
    pub(crate) ctor: Option<ConstructorMeta>,
    pub(crate) ctor_deps: Vec<Dependency>,
    pub(crate) prop_deps: Vec<PropertyDependency>,
    pub(crate) factory: Option<OpaqueFactory>,
}

impl ConstructionInfo {
    fn from_factory(factory: OpaqueFactory) -> Self {
        Self {
            ctor: None,
            ctor_deps: Vec::new(),
            prop_deps: Vec::new(),
            factory: Some(factory),
        }
    }
}

/// Plans the construction of one registration.
///
/// A registration carrying an opaque factory skips introspection entirely.
/// Otherwise the implementing type's metadata is consulted and a
/// constructor chosen by the "most resolvable" rule: a single candidate is
/// taken as-is; multiple candidates are tried in descending parameter
/// count, the first whose every parameter is resolvable winning.
pub(crate) fn plan(
    registration: &ServiceRegistration,
    registry: &Registry,
    metas: &HashMap<TypeId, Arc<TypeMeta>>,
    property_injection: bool,
) -> DiResult<ConstructionInfo> {
    if let Some(factory) = &registration.factory {
        return Ok(ConstructionInfo::from_factory(factory.clone()));
    }

    let implementing = registration
        .implementing
        .ok_or_else(|| DiError::NotRegistered(registration.key.to_string()))?;
    let implementing_name = registration.implementing_name.unwrap_or("<unknown>");
    let meta = metas
        .get(&implementing)
        .ok_or(DiError::NoPublicConstructor(implementing_name))?;

    let ctor = select_constructor(meta, registry)?;
    let ctor_deps = ctor
        .params
        .iter()
        .map(|p| {
            let factory = registry.ctor_dep_factories.get(&p.service_id).cloned();
            Dependency::from_param(p, true, factory)
        })
        .collect();

    let prop_deps = if property_injection {
        meta.properties
            .iter()
            .map(|p| PropertyDependency {
                dep: Dependency::from_param(
                    &p.param,
                    false,
                    registry.prop_dep_factories.get(&p.param.service_id).cloned(),
                ),
                set: p.set.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    Ok(ConstructionInfo {
        ctor: Some(ctor.clone()),
        ctor_deps,
        prop_deps,
        factory: None,
    })
}

/// Builds the property-injection plan for an externally supplied instance.
pub(crate) fn plan_properties(
    meta: &TypeMeta,
    registry: &Registry,
    property_injection: bool,
) -> Vec<PropertyDependency> {
    if !property_injection {
        return Vec::new();
    }
    meta.properties
        .iter()
        .map(|p| PropertyDependency {
            dep: Dependency::from_param(
                &p.param,
                false,
                registry.prop_dep_factories.get(&p.param.service_id).cloned(),
            ),
            set: p.set.clone(),
        })
        .collect()
}

fn select_constructor<'m>(
    meta: &'m TypeMeta,
    registry: &Registry,
) -> DiResult<&'m ConstructorMeta> {
    match meta.constructors.len() {
        0 => Err(DiError::NoPublicConstructor(meta.type_name)),
        1 => Ok(&meta.constructors[0]),
        _ => {
            let mut candidates: Vec<&ConstructorMeta> = meta.constructors.iter().collect();
            candidates.sort_by(|a, b| b.params.len().cmp(&a.params.len()));
            candidates
                .into_iter()
                .find(|ctor| ctor.params.iter().all(|p| is_resolvable(p, registry)))
                .ok_or(DiError::NoResolvableConstructor(meta.type_name))
        }
    }
}

fn is_resolvable(param: &ParamMeta, registry: &Registry) -> bool {
    match &param.shape {
        // Deferred shapes are synthesized, never looked up eagerly.
        ParamShape::Deferred(_) => true,
        ParamShape::Service => {
            let default = ServiceKey::new(
                param.service_id,
                param.type_name,
                ServiceName::default_name(),
            );
            let named = ServiceKey::new(
                param.service_id,
                param.type_name,
                ServiceName::new(param.name),
            );
            registry.contains(&default)
                || registry.contains(&named)
                || registry.ctor_dep_factories.contains_key(&param.service_id)
        }
    }
}
