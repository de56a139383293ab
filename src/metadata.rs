//! Type metadata: the introspection surface the planner works from.
//!
//! Rust has no runtime reflection, so a concrete type describes its
//! constructors and settable properties once, through [`TypeMeta`]. Each
//! constructor captures its parameter keys, names, and shapes plus an
//! `invoke` closure that downcasts the resolved arguments positionally;
//! the planner then selects among candidates exactly as it would over
//! reflected constructors.

use std::any::TypeId;
use std::sync::Arc;

use crate::deferred::{Lazy, ServiceFn};
use crate::dispose::{dispose_hook_of, Dispose, DisposeHook};
use crate::error::{DiError, DiResult};
use crate::payload::{downcast_payload, wrap, AnyArc, ErasedResolve, ErasedResolveAll};

/// Resolution capabilities handed to deferred-shape synthesizers at emit
/// time: a fresh single resolve and an enumerate-all resolve for the
/// dependency's service identity.
pub(crate) struct ShapeResolver {
    pub(crate) one: ErasedResolve,
    pub(crate) all: ErasedResolveAll,
}

pub(crate) type Synth = Arc<dyn Fn(&ShapeResolver) -> DiResult<AnyArc> + Send + Sync>;

/// How a dependency slot is satisfied.
#[derive(Clone)]
pub(crate) enum ParamShape {
    /// Recursive resolution of the dependency's service.
    Service,
    /// Synthesized on demand (`Lazy<T>`, `ServiceFn<T>`, `Vec<Arc<T>>`).
    Deferred(Synth),
}

/// One constructor parameter or property dependency.
#[derive(Clone)]
pub struct ParamMeta {
    pub(crate) service_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) name: &'static str,
    pub(crate) shape: ParamShape,
}

/// Dependency slot types a constructor may accept.
///
/// Implemented for `Arc<T>` (plain service), `Lazy<T>`, `ServiceFn<T>`,
/// and `Vec<Arc<T>>` (every registration of `T`).
pub trait Inject: Send + Sync + Sized + 'static {
    fn param(name: &'static str) -> ParamMeta;
    fn obtain(value: AnyArc) -> DiResult<Self>;
}

impl<T: ?Sized + Send + Sync + 'static> Inject for Arc<T> {
    fn param(name: &'static str) -> ParamMeta {
        ParamMeta {
            service_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            name,
            shape: ParamShape::Service,
        }
    }

    fn obtain(value: AnyArc) -> DiResult<Self> {
        downcast_payload::<T>(value)
    }
}

impl<T: ?Sized + Send + Sync + 'static> Inject for Lazy<T> {
    fn param(name: &'static str) -> ParamMeta {
        let synth: Synth = Arc::new(|resolver: &ShapeResolver| {
            Ok(wrap(Lazy::<T>::from_erased(resolver.one.clone())))
        });
        ParamMeta {
            service_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            name,
            shape: ParamShape::Deferred(synth),
        }
    }

    fn obtain(value: AnyArc) -> DiResult<Self> {
        Ok((*downcast_payload::<Lazy<T>>(value)?).clone())
    }
}

impl<T: ?Sized + Send + Sync + 'static> Inject for ServiceFn<T> {
    fn param(name: &'static str) -> ParamMeta {
        let synth: Synth = Arc::new(|resolver: &ShapeResolver| {
            Ok(wrap(ServiceFn::<T>::from_erased(resolver.one.clone())))
        });
        ParamMeta {
            service_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            name,
            shape: ParamShape::Deferred(synth),
        }
    }

    fn obtain(value: AnyArc) -> DiResult<Self> {
        Ok((*downcast_payload::<ServiceFn<T>>(value)?).clone())
    }
}

impl<T: ?Sized + Send + Sync + 'static> Inject for Vec<Arc<T>> {
    fn param(name: &'static str) -> ParamMeta {
        let synth: Synth = Arc::new(|resolver: &ShapeResolver| {
            let elements = (resolver.all)()?;
            let mut typed = Vec::with_capacity(elements.len());
            for element in elements {
                typed.push(downcast_payload::<T>(element)?);
            }
            Ok(wrap(typed))
        });
        ParamMeta {
            service_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            name,
            shape: ParamShape::Deferred(synth),
        }
    }

    fn obtain(value: AnyArc) -> DiResult<Self> {
        Ok((*downcast_payload::<Vec<Arc<T>>>(value)?).clone())
    }
}

/// One constructor candidate: ordered parameters plus the invoker.
#[derive(Clone)]
pub struct ConstructorMeta {
    pub(crate) params: Vec<ParamMeta>,
    pub(crate) invoke: Arc<dyn Fn(Vec<AnyArc>) -> DiResult<AnyArc> + Send + Sync>,
}

/// One settable property: dependency description plus the setter.
#[derive(Clone)]
pub struct PropertyMeta {
    pub(crate) param: ParamMeta,
    pub(crate) set: Arc<dyn Fn(&AnyArc, AnyArc) -> DiResult<()> + Send + Sync>,
}

/// Metadata for one concrete type: constructor candidates, property
/// dependencies, and the optional dispose hook.
#[derive(Clone)]
pub struct TypeMeta {
    pub(crate) id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) constructors: Vec<ConstructorMeta>,
    pub(crate) properties: Vec<PropertyMeta>,
    pub(crate) dispose: Option<DisposeHook>,
}

impl TypeMeta {
    /// Starts describing the concrete type `T`.
    pub fn of<T: Send + Sync + 'static>() -> TypeMetaBuilder<T> {
        TypeMetaBuilder {
            meta: TypeMeta {
                id: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
                constructors: Vec::new(),
                properties: Vec::new(),
                dispose: None,
            },
            _marker: std::marker::PhantomData,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Builder capturing constructors and properties monomorphically.
pub struct TypeMetaBuilder<T: Send + Sync + 'static> {
    meta: TypeMeta,
    _marker: std::marker::PhantomData<fn() -> T>,
}

fn arity_error(_expected: usize, _got: usize) -> DiError {
    DiError::TypeMismatch("constructor argument count")
}

impl<T: Send + Sync + 'static> TypeMetaBuilder<T> {
    /// Zero-argument constructor.
    pub fn ctor0(mut self, f: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.meta.constructors.push(ConstructorMeta {
            params: Vec::new(),
            invoke: Arc::new(move |args| {
                if !args.is_empty() {
                    return Err(arity_error(0, args.len()));
                }
                Ok(wrap(f()))
            }),
        });
        self
    }

    pub fn ctor1<A: Inject>(
        mut self,
        names: [&'static str; 1],
        f: impl Fn(A) -> T + Send + Sync + 'static,
    ) -> Self {
        self.meta.constructors.push(ConstructorMeta {
            params: vec![A::param(names[0])],
            invoke: Arc::new(move |mut args| {
                if args.len() != 1 {
                    return Err(arity_error(1, args.len()));
                }
                let a = A::obtain(args.pop().unwrap())?;
                Ok(wrap(f(a)))
            }),
        });
        self
    }

    pub fn ctor2<A: Inject, B: Inject>(
        mut self,
        names: [&'static str; 2],
        f: impl Fn(A, B) -> T + Send + Sync + 'static,
    ) -> Self {
        self.meta.constructors.push(ConstructorMeta {
            params: vec![A::param(names[0]), B::param(names[1])],
            invoke: Arc::new(move |mut args| {
                if args.len() != 2 {
                    return Err(arity_error(2, args.len()));
                }
                let b = B::obtain(args.pop().unwrap())?;
                let a = A::obtain(args.pop().unwrap())?;
                Ok(wrap(f(a, b)))
            }),
        });
        self
    }

    pub fn ctor3<A: Inject, B: Inject, C: Inject>(
        mut self,
        names: [&'static str; 3],
        f: impl Fn(A, B, C) -> T + Send + Sync + 'static,
    ) -> Self {
        self.meta.constructors.push(ConstructorMeta {
            params: vec![A::param(names[0]), B::param(names[1]), C::param(names[2])],
            invoke: Arc::new(move |mut args| {
                if args.len() != 3 {
                    return Err(arity_error(3, args.len()));
                }
                let c = C::obtain(args.pop().unwrap())?;
                let b = B::obtain(args.pop().unwrap())?;
                let a = A::obtain(args.pop().unwrap())?;
                Ok(wrap(f(a, b, c)))
            }),
        });
        self
    }

    pub fn ctor4<A: Inject, B: Inject, C: Inject, D: Inject>(
        mut self,
        names: [&'static str; 4],
        f: impl Fn(A, B, C, D) -> T + Send + Sync + 'static,
    ) -> Self {
        self.meta.constructors.push(ConstructorMeta {
            params: vec![
                A::param(names[0]),
                B::param(names[1]),
                C::param(names[2]),
                D::param(names[3]),
            ],
            invoke: Arc::new(move |mut args| {
                if args.len() != 4 {
                    return Err(arity_error(4, args.len()));
                }
                let d = D::obtain(args.pop().unwrap())?;
                let c = C::obtain(args.pop().unwrap())?;
                let b = B::obtain(args.pop().unwrap())?;
                let a = A::obtain(args.pop().unwrap())?;
                Ok(wrap(f(a, b, c, d)))
            }),
        });
        self
    }

    /// A settable property dependency. Setters receive the shared instance
    /// and use interior mutability; they must be idempotent.
    pub fn property<P: Inject>(
        mut self,
        name: &'static str,
        set: impl Fn(&T, P) + Send + Sync + 'static,
    ) -> Self {
        let param = P::param(name);
        self.meta.properties.push(PropertyMeta {
            param,
            set: Arc::new(move |instance: &AnyArc, value: AnyArc| {
                let instance = instance
                    .downcast_ref::<Arc<T>>()
                    .ok_or(DiError::TypeMismatch(std::any::type_name::<T>()))?;
                set(instance, P::obtain(value)?);
                Ok(())
            }),
        });
        self
    }

    /// Marks the type disposable; its registrations carry the dispose hook.
    pub fn disposable(mut self) -> Self
    where
        T: Dispose,
    {
        self.meta.dispose = Some(dispose_hook_of::<T>());
        self
    }

    pub fn build(self) -> TypeMeta {
        self.meta
    }
}
