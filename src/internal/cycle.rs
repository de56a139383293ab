//! Dependency-stack cycle guard.
//!
//! The stack is thread-local, never container-global: concurrent resolves on
//! different threads each see their own stack. Frames are pushed while an
//! emitter is being expanded at compile time and again at every runtime
//! re-entry through the container's front door, so both planner-visible
//! cycles and factory-driven cycles are caught.

use std::cell::RefCell;

use crate::error::{DiError, DiResult};
use crate::key::ServiceKey;

const MAX_DEPTH: usize = 256;

thread_local! {
    static DEPENDENCY_STACK: RefCell<Vec<ServiceKey>> = const { RefCell::new(Vec::new()) };
}

/// RAII frame on the thread's dependency stack. Construction fails when the
/// key is already on the stack (a cycle) or the depth limit is hit; the
/// frame pops itself on drop, which clears the stack during error unwind.
pub(crate) struct StackFrame {
    key: ServiceKey,
}

impl StackFrame {
    pub(crate) fn enter(key: &ServiceKey) -> DiResult<Self> {
        DEPENDENCY_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|k| k == key) {
                let mut path: Vec<&'static str> =
                    stack.iter().map(|k| k.display_name()).collect();
                path.push(key.display_name());
                return Err(DiError::CyclicDependency(path));
            }
            if stack.len() >= MAX_DEPTH {
                return Err(DiError::DepthExceeded(stack.len()));
            }
            stack.push(key.clone());
            Ok(())
        })?;
        Ok(Self { key: key.clone() })
    }
}

impl Drop for StackFrame {
    fn drop(&mut self) {
        DEPENDENCY_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(last) = stack.pop() {
                debug_assert_eq!(last, self.key);
            }
        });
    }
}

/// True when `key` is currently being expanded on this thread. Enumerable
/// aggregation uses this to exclude a registration from its own enumeration.
pub(crate) fn is_on_stack(key: &ServiceKey) -> bool {
    DEPENDENCY_STACK.with(|stack| stack.borrow().iter().any(|k| k == key))
}

/// Current depth of this thread's dependency stack. Zero means the next
/// resolve is a top-level call.
pub(crate) fn stack_depth() -> usize {
    DEPENDENCY_STACK.with(|stack| stack.borrow().len())
}
