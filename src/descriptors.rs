//! Registration descriptors for diagnostics.

use crate::key::{ServiceKey, ServiceName};

/// Which primary recipe a registration carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationKind {
    ImplementingType,
    Factory,
    Value,
}

/// Snapshot of one registration, as returned by
/// `Container::available_services`.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub key: ServiceKey,
    pub implementing: Option<&'static str>,
    pub kind: RegistrationKind,
}

impl ServiceDescriptor {
    pub fn type_name(&self) -> &'static str {
        self.key.display_name()
    }

    pub fn service_name(&self) -> &ServiceName {
        self.key.service_name()
    }

    pub fn is_named(&self) -> bool {
        !self.key.is_default()
    }
}
