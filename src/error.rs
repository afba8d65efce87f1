//! Structured error type shared by every public operation in the crate.
//!
//! Failing operations never return an unstructured string or a bare `None`
//! standing in for "unknown error": every failure carries a `kind`, the
//! `component` that raised it, the `operation` that was attempted,
//! free-form `metadata`, and an optional boxed `cause`.

use std::collections::BTreeMap;
use std::fmt;

/// The five error buckets. Each maps to a distinct handling policy in the
/// owning subsystem (retry, surface immediately, defer, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid input shape, unknown ids, empty sets. Never retried.
    Validation,
    /// Unknown algorithm/strategy, out-of-range weights or thresholds.
    /// Surfaced at construction.
    Configuration,
    /// Agent timeout, transient transport failure, lock timeout. Retried
    /// while budget allows, escalated otherwise.
    Transient,
    /// No capable agent, insufficient memory/cpu. Deferred to next tick.
    ResourceExhaustion,
    /// Invalid workflow transition, dependency cycle, orphaned execution.
    /// Fatal for the affected unit; the system stays operational.
    Invariant,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Transient => "transient",
            ErrorKind::ResourceExhaustion => "resource_exhaustion",
            ErrorKind::Invariant => "invariant",
        };
        write!(f, "{s}")
    }
}

/// Structured error returned by every fallible public operation.
#[derive(Debug)]
pub struct OrchestrationError {
    pub kind: ErrorKind,
    pub component: &'static str,
    pub operation: &'static str,
    pub message: String,
    pub metadata: BTreeMap<String, String>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl OrchestrationError {
    pub fn new(
        kind: ErrorKind,
        component: &'static str,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            component,
            operation,
            message: message.into(),
            metadata: BTreeMap::new(),
            cause: None,
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn validation(component: &'static str, operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, component, operation, message)
    }

    pub fn configuration(component: &'static str, operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, component, operation, message)
    }

    pub fn transient(component: &'static str, operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, component, operation, message)
    }

    pub fn resource_exhausted(component: &'static str, operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceExhaustion, component, operation, message)
    }

    pub fn invariant(component: &'static str, operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invariant, component, operation, message)
    }

    /// Cancellation is explicitly never logged/surfaced as an error;
    /// callers that need a "cancelled" result should use a dedicated status
    /// enum variant rather than constructing one of these.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Transient)
    }
}

impl fmt::Display for OrchestrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}::{}: {}",
            self.kind, self.component, self.operation, self.message
        )
    }
}

impl std::error::Error for OrchestrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}

pub type Result<T> = std::result::Result<T, OrchestrationError>;
