//! Container options and the logging sink.

use std::fmt;
use std::sync::Arc;

/// Severity of a container log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
}

/// A single log entry emitted by the container.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            LogLevel::Info => write!(f, "INFO {}", self.message),
            LogLevel::Warning => write!(f, "WARN {}", self.message),
        }
    }
}

/// Receiver for container diagnostics.
///
/// The default sink forwards to the `log` facade under the `anvil_di`
/// target; supply a custom sink through [`ContainerOptions`] to capture
/// entries in tests or route them elsewhere.
pub trait LogSink: Send + Sync {
    fn log(&self, entry: LogEntry);
}

/// Sink that forwards entries to the `log` crate.
pub struct FacadeLogSink;

impl LogSink for FacadeLogSink {
    fn log(&self, entry: LogEntry) {
        match entry.level {
            LogLevel::Info => log::info!(target: "anvil_di", "{}", entry.message),
            LogLevel::Warning => log::warn!(target: "anvil_di", "{}", entry.message),
        }
    }
}

/// Storage strategy for the scope manager's current-scope pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeFlow {
    /// Current scope lives in thread-local storage.
    PerThread,
    /// Current scope flows across asynchronous continuations. Not
    /// supported by this synchronous implementation; selecting it makes
    /// `begin_scope` fail with `InvalidScope`.
    AsyncFlow,
}

/// Behavioral switches for a container.
#[derive(Clone)]
pub struct ContainerOptions {
    /// When enabled (the default), enumerable resolution widens to
    /// registrations declared assignable to the requested element type.
    pub enable_variance: bool,
    /// When disabled, the property selector yields the empty list and
    /// `inject_properties` becomes a no-op.
    pub enable_property_injection: bool,
    /// Current-scope storage strategy.
    pub scope_flow: ScopeFlow,
    /// Diagnostics sink.
    pub log_sink: Arc<dyn LogSink>,
}

impl ContainerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variance(mut self, enabled: bool) -> Self {
        self.enable_variance = enabled;
        self
    }

    pub fn property_injection(mut self, enabled: bool) -> Self {
        self.enable_property_injection = enabled;
        self
    }

    pub fn scope_flow(mut self, flow: ScopeFlow) -> Self {
        self.scope_flow = flow;
        self
    }

    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            enable_variance: true,
            enable_property_injection: true,
            scope_flow: ScopeFlow::PerThread,
            log_sink: Arc::new(FacadeLogSink),
        }
    }
}

impl fmt::Debug for ContainerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerOptions")
            .field("enable_variance", &self.enable_variance)
            .field("enable_property_injection", &self.enable_property_injection)
            .field("scope_flow", &self.scope_flow)
            .finish()
    }
}
