//! Disposal traits and the LIFO dispose bag.

use std::sync::Arc;

pub use crate::payload::AnyArc;

/// Cleanup hook for services that own resources.
///
/// Disposability is declared, not discovered: a registration carries a
/// dispose hook only when it was created through an API that requires
/// `T: Dispose`. Takes `&self` because instances are shared behind `Arc`.
pub trait Dispose: Send + Sync {
    fn dispose(&self);
}

/// Produces the disposal closure for a type-erased instance, or `None` when
/// the payload is not the expected type. Lifetime strategies receive the
/// registration's hook and decide which owner tracks the closure.
pub type DisposeHook =
    Arc<dyn Fn(&AnyArc) -> Option<Box<dyn FnOnce() + Send>> + Send + Sync>;

/// Builds the dispose hook for a service type, capturing the downcast
/// monomorphically.
pub(crate) fn dispose_hook_of<S>() -> DisposeHook
where
    S: ?Sized + Dispose + Send + Sync + 'static,
{
    Arc::new(|any: &AnyArc| {
        any.downcast_ref::<Arc<S>>().map(|instance| {
            let instance = instance.clone();
            Box::new(move || instance.dispose()) as Box<dyn FnOnce() + Send>
        })
    })
}

/// Ordered container of disposal hooks, run in reverse insertion order.
#[derive(Default)]
pub(crate) struct DisposeBag {
    hooks: Vec<Box<dyn FnOnce() + Send>>,
}

impl DisposeBag {
    pub(crate) fn push(&mut self, f: Box<dyn FnOnce() + Send>) {
        self.hooks.push(f);
    }

    /// Runs every hook, last-in first-out.
    pub(crate) fn run_all_reverse(&mut self) {
        while let Some(f) = self.hooks.pop() {
            f();
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.hooks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn bag_runs_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut bag = DisposeBag::default();
        for i in 0..3 {
            let order = order.clone();
            bag.push(Box::new(move || order.lock().push(i)));
        }
        bag.run_all_reverse();
        assert_eq!(*order.lock(), vec![2, 1, 0]);
        assert!(bag.is_empty());
    }

    #[test]
    fn hook_downcasts_payload() {
        struct Thing(Arc<Mutex<u32>>);
        impl Dispose for Thing {
            fn dispose(&self) {
                *self.0.lock() += 1;
            }
        }

        let count = Arc::new(Mutex::new(0));
        let hook = dispose_hook_of::<Thing>();
        let payload: AnyArc = Arc::new(Arc::new(Thing(count.clone())));
        let disposer = hook(&payload).expect("payload should downcast");
        disposer();
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn hook_rejects_wrong_payload() {
        struct Thing;
        impl Dispose for Thing {
            fn dispose(&self) {}
        }

        let hook = dispose_hook_of::<Thing>();
        let payload: AnyArc = Arc::new(Arc::new(42u32));
        assert!(hook(&payload).is_none());
    }
}
