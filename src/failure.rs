//! Gateway failure taxonomy.
//!
//! Every failure the routing fabric can produce falls into one of these
//! classes. The class decides whether an attempt is retried, whether the
//! instance's circuit is affected, and which HTTP status the inbound surface
//! answers with.
//!
//! | Code  | Class               | Retried | Redirected | HTTP |
//! |-------|---------------------|---------|------------|------|
//! | G1001 | invalid_request     | no      | no         | 400  |
//! | G1002 | client_fault        | no      | no         | pass-through |
//! | G2001 | instance_fault      | yes     | yes        | 502  |
//! | G2002 | pool_exhausted      | no      | no         | 503  |
//! | G2003 | redirects_exhausted | no      | no         | 503  |
//! | G3001 | saga_step_fault     | no      | no         | 500  |
//! | G4001 | cache_store_fault   | no      | no         | never surfaced |
//! | G9999 | internal            | no      | no         | 500  |
//!
//! ## Example
//!
//! ```rust
//! use service_gateway::failure::FailureClass;
//!
//! let class = FailureClass::from_http_status(503).unwrap();
//! assert_eq!(class, FailureClass::InstanceFault);
//! assert!(class.retryable());
//! assert!(FailureClass::from_http_status(204).is_none());
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// G1001: the inbound request itself is malformed
    InvalidRequest,
    /// G1002: a backend answered 4xx; caller fault, passed through untouched
    ClientFault,
    /// G2001: a backend answered 5xx or could not be reached
    InstanceFault,
    /// G2002: no instance of the service has a closed circuit
    PoolExhausted,
    /// G2003: every alternate instance attempt failed
    RedirectsExhausted,
    /// G3001: a saga step failed and the saga was rolled back
    SagaStepFault,
    /// G4001: the shared store could not be read or written
    CacheStoreFault,
    /// G9999: anything else
    Internal,
}

impl FailureClass {
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "G1001",
            Self::ClientFault => "G1002",
            Self::InstanceFault => "G2001",
            Self::PoolExhausted => "G2002",
            Self::RedirectsExhausted => "G2003",
            Self::SagaStepFault => "G3001",
            Self::CacheStoreFault => "G4001",
            Self::Internal => "G9999",
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::ClientFault => "client_fault",
            Self::InstanceFault => "instance_fault",
            Self::PoolExhausted => "pool_exhausted",
            Self::RedirectsExhausted => "redirects_exhausted",
            Self::SagaStepFault => "saga_step_fault",
            Self::CacheStoreFault => "cache_store_fault",
            Self::Internal => "internal",
        }
    }

    /// Whether another attempt against the same instance may succeed.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::InstanceFault)
    }

    /// Whether trying a different instance of the same service may succeed.
    #[inline]
    pub fn redirectable(&self) -> bool {
        matches!(self, Self::InstanceFault)
    }

    /// Status used when this class is surfaced as a gateway-generated error.
    #[inline]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest | Self::ClientFault => 400,
            Self::InstanceFault => 502,
            Self::PoolExhausted | Self::RedirectsExhausted => 503,
            Self::SagaStepFault | Self::CacheStoreFault | Self::Internal => 500,
        }
    }

    /// Classifies a backend response status. Success (1xx-3xx) is `None`.
    pub fn from_http_status(status: u16) -> Option<Self> {
        match status {
            400..=499 => Some(Self::ClientFault),
            s if s >= 500 => Some(Self::InstanceFault),
            _ => None,
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
