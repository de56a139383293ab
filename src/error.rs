//! Error types for the container.

use std::fmt;

/// Container errors.
///
/// Raised during registration, planning, compilation, or resolution.
/// `try_*` resolution variants suppress [`DiError::NotRegistered`] (and its
/// fallthroughs) into `None`; every other kind propagates.
#[derive(Debug)]
pub enum DiError {
    /// No emitter was found for the requested key after every expansion
    /// strategy (direct lookup, named redirect, open-generic expansion,
    /// fallback rules).
    NotRegistered(String),
    /// The dependency stack re-entered the same emitter. Carries the
    /// dependency path, first entry repeated at the end.
    CyclicDependency(Vec<&'static str>),
    /// A required constructor dependency could not be resolved during emit.
    UnresolvedDependency {
        service: &'static str,
        dependency: String,
        cause: Box<DiError>,
    },
    /// The implementing type has no registered constructors.
    NoPublicConstructor(&'static str),
    /// No constructor candidate had all of its parameters resolvable.
    NoResolvableConstructor(&'static str),
    /// Scope misuse: ending a scope with a live child, ending a scope that
    /// is not current, or tracking a disposable with no scope available.
    InvalidScope(String),
    /// A decorator, override, or open-generic registration was attempted
    /// after the container's first resolve.
    RegistrationAfterLock(&'static str),
    /// An open-generic definition refused the requested type argument.
    /// Causes fallthrough to the remaining expansion strategies.
    GenericConstraint {
        definition: &'static str,
        argument: &'static str,
    },
    /// A stored instance failed to downcast to the requested type.
    TypeMismatch(&'static str),
    /// The emit or resolve recursion exceeded the depth limit.
    DepthExceeded(usize),
    /// Top-level wrapper surfaced by `resolve`; preserves the inner cause.
    ResolutionFailed {
        service: String,
        cause: Box<DiError>,
    },
}

impl DiError {
    /// True when the error (or the cause it wraps) means "nothing was
    /// registered for this key". This is the only condition the `try_*`
    /// resolution variants turn into `None`.
    pub fn is_not_registered(&self) -> bool {
        match self {
            DiError::NotRegistered(_) => true,
            // Only the top-level wrapper is transparent here: a registered
            // service whose *dependency* is missing is a hard error.
            DiError::ResolutionFailed { cause, .. } => cause.is_not_registered(),
            _ => false,
        }
    }

    /// Unwraps the wrapping variants down to the original failure.
    pub fn root_cause(&self) -> &DiError {
        match self {
            DiError::ResolutionFailed { cause, .. } => cause.root_cause(),
            DiError::UnresolvedDependency { cause, .. } => cause.root_cause(),
            _ => self,
        }
    }
}

impl fmt::Display for DiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiError::NotRegistered(key) => write!(f, "no registration for {}", key),
            DiError::CyclicDependency(path) => {
                write!(f, "cyclic dependency: {}", path.join(" -> "))
            }
            DiError::UnresolvedDependency { service, dependency, cause } => {
                write!(
                    f,
                    "unresolved dependency {} of {}: {}",
                    dependency, service, cause
                )
            }
            DiError::NoPublicConstructor(name) => {
                write!(f, "no constructors registered for {}", name)
            }
            DiError::NoResolvableConstructor(name) => {
                write!(f, "no resolvable constructor for {}", name)
            }
            DiError::InvalidScope(msg) => write!(f, "invalid scope: {}", msg),
            DiError::RegistrationAfterLock(what) => {
                write!(f, "{} registered after first resolve", what)
            }
            DiError::GenericConstraint { definition, argument } => {
                write!(f, "{} does not support type argument {}", definition, argument)
            }
            DiError::TypeMismatch(name) => write!(f, "type mismatch for {}", name),
            DiError::DepthExceeded(depth) => write!(f, "max resolve depth {} exceeded", depth),
            DiError::ResolutionFailed { service, cause } => {
                write!(f, "failed to resolve {}: {}", service, cause)
            }
        }
    }
}

impl std::error::Error for DiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiError::ResolutionFailed { cause, .. } => Some(cause),
            DiError::UnresolvedDependency { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

/// Result type for container operations.
pub type DiResult<T> = Result<T, DiError>;
