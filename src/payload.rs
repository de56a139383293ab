//! Type-erased instance payloads.
//!
//! Every value stored or produced by the container is an `AnyArc` whose
//! concrete payload type is the sized wrapper `Arc<S>` for the service `S`.
//! The uniform convention lets one compiler handle concrete types and trait
//! objects alike; typed front doors unwrap with [`downcast_payload`].

use std::any::Any;
use std::sync::Arc;

use crate::error::{DiError, DiResult};

/// Type-erased instance handle, as seen by lifetime strategies and dispose
/// hooks. The concrete payload type is always the sized wrapper `Arc<S>`
/// for the registered service `S`.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Wraps a freshly built instance into the payload convention.
pub(crate) fn wrap<S: Send + Sync + 'static>(value: S) -> AnyArc {
    Arc::new(Arc::new(value))
}

/// Wraps an already shared instance.
pub(crate) fn wrap_shared<S: ?Sized + Send + Sync + 'static>(value: Arc<S>) -> AnyArc {
    Arc::new(value)
}

/// Recovers `Arc<S>` from a payload.
pub(crate) fn downcast_payload<S: ?Sized + Send + Sync + 'static>(
    any: AnyArc,
) -> DiResult<Arc<S>> {
    any.downcast_ref::<Arc<S>>()
        .cloned()
        .ok_or(DiError::TypeMismatch(std::any::type_name::<S>()))
}

/// Type-erased fresh resolve of a single service.
pub(crate) type ErasedResolve = Arc<dyn Fn() -> DiResult<AnyArc> + Send + Sync>;

/// Type-erased resolve of every registration for an element identity.
pub(crate) type ErasedResolveAll = Arc<dyn Fn() -> DiResult<Vec<AnyArc>> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    trait Speak: Send + Sync {
        fn noise(&self) -> &'static str;
    }

    struct Dog;
    impl Speak for Dog {
        fn noise(&self) -> &'static str {
            "woof"
        }
    }

    #[test]
    fn concrete_round_trip() {
        let any = wrap(41u32);
        let back = downcast_payload::<u32>(any).unwrap();
        assert_eq!(*back, 41);
    }

    #[test]
    fn trait_object_round_trip() {
        let any = wrap_shared(Arc::new(Dog) as Arc<dyn Speak>);
        let back = downcast_payload::<dyn Speak>(any).unwrap();
        assert_eq!(back.noise(), "woof");
    }

    #[test]
    fn wrong_type_is_a_mismatch() {
        let any = wrap(41u32);
        assert!(matches!(
            downcast_payload::<u64>(any),
            Err(DiError::TypeMismatch(_))
        ));
    }
}
