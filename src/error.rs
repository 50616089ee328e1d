use crate::failure::FailureClass;
use crate::saga::SagaError;
use crate::transport::TransportError;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "config.max_retries", "body.user")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "registry_client", "memory_store")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the gateway.
///
/// Routing failures carry enough structure for the HTTP boundary to pick a
/// status code without string matching (see [`Error::failure_class`]).
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("Shared store error: {message}{}", format_context(.context))]
    Store {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    /// Every attempt against one instance failed; its circuit has been opened.
    #[error("Max retries reached, {service} at {instance} is unavailable after {attempts} attempts: {message}")]
    InstanceExhausted {
        service: String,
        instance: String,
        attempts: u32,
        status: Option<u16>,
        message: String,
    },

    #[error("No available {service} instances")]
    NoAvailableInstances { service: String },

    #[error("{failed} instances of {service} failed to process the request (last error: {last_error})")]
    RedirectsExhausted {
        service: String,
        failed: u32,
        last_error: String,
    },

    /// A backend answered with a non-success status where success was required.
    #[error("Upstream rejected request: HTTP {status}: {body}")]
    UpstreamRejected { status: u16, body: String },

    #[error(transparent)]
    Saga(#[from] SagaError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a new shared store error with structured context
    pub fn store_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Store {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Runtime { context, .. }
            | Error::Store { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Which branch of the failure taxonomy this error belongs to.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Error::Validation { .. } => FailureClass::InvalidRequest,
            Error::UpstreamRejected { status, .. } => {
                FailureClass::from_http_status(*status).unwrap_or(FailureClass::Internal)
            }
            Error::Transport(_) | Error::InstanceExhausted { .. } => FailureClass::InstanceFault,
            Error::NoAvailableInstances { .. } => FailureClass::PoolExhausted,
            Error::RedirectsExhausted { .. } => FailureClass::RedirectsExhausted,
            Error::Saga(_) => FailureClass::SagaStepFault,
            Error::Store { .. } => FailureClass::CacheStoreFault,
            Error::Configuration { .. }
            | Error::Runtime { .. }
            | Error::Io(_)
            | Error::Serialization(_) => FailureClass::Internal,
        }
    }

    /// HTTP status the inbound surface answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            // Backend client faults keep the backend's own status.
            Error::UpstreamRejected { status, .. } if (400..500).contains(status) => *status,
            _ => self.failure_class().http_status(),
        }
    }
}
