//! Error types for AgentPay
//!
//! Every failure is an explicit, typed value. Errors carry a category so a
//! caller can distinguish retryable integration failures from fatal
//! validation or state failures.

use thiserror::Error;

/// Result type for AgentPay operations
pub type Result<T> = std::result::Result<T, AgentPayError>;

/// Broad failure categories, used by the coordinator to decide whether an
/// error triggers a FAILED transition or propagates uncaught.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed or over-limit input, rejected locally, never retried
    Validation,
    /// Bad signature, unknown or expired key - always fatal to the operation
    Crypto,
    /// Network/remote failure - counted by the circuit breaker
    Integration,
    /// Illegal state transition - a caller/programmer bug
    State,
    /// Missing mandate/workflow
    NotFound,
    /// Everything else
    Internal,
}

/// AgentPay error types
#[derive(Debug, Clone, Error)]
pub enum AgentPayError {
    // ========================================================================
    // Validation Errors
    // ========================================================================

    /// Business has not enabled agent payments
    #[error("Business {business_id} is not payment-enabled")]
    BusinessNotPaymentEnabled { business_id: String },

    /// Requested payment method is not supported by the business
    #[error("Payment method {method} is not supported by business {business_id}")]
    UnsupportedPaymentMethod { business_id: String, method: String },

    /// Intent constraint is malformed
    #[error("Invalid constraint: {field} - {reason}")]
    InvalidConstraint { field: String, reason: String },

    /// Cart total exceeds the intent's spending ceiling
    #[error("Cart total {total} exceeds intent maximum {max_amount}")]
    CartExceedsIntent { total: f64, max_amount: f64 },

    /// Cart contains no items
    #[error("Cart contains no items")]
    EmptyCart,

    /// Item category is outside the intent's allow-list
    #[error("Category {category} is not allowed by the intent mandate")]
    CategoryNotAllowed { category: String },

    /// Item quantity exceeds the per-item cap declared in the intent
    #[error("Quantity {quantity} for item {item} exceeds the per-item cap {limit}")]
    QuantityLimitExceeded {
        item: String,
        quantity: u32,
        limit: u32,
    },

    /// Business-quoted price disagrees with the computed cart total
    #[error("Price mismatch: business quoted {quoted}, cart computes to {computed}")]
    PriceMismatch { quoted: f64, computed: f64 },

    // ========================================================================
    // Mandate Lifecycle Errors
    // ========================================================================

    /// Mandate not found (locally or remotely)
    #[error("Mandate {mandate_id} not found")]
    MandateNotFound { mandate_id: String },

    /// Mandate exists but is not usable
    #[error("Mandate {mandate_id} is not active (status: {status})")]
    MandateInactive { mandate_id: String, status: String },

    /// Mandate has passed its expiry
    #[error("Mandate {mandate_id} expired at {expired_at}")]
    MandateExpired {
        mandate_id: String,
        expired_at: String,
    },

    /// Mandate payload is structurally unusable
    #[error("Malformed mandate: {reason}")]
    MalformedMandate { reason: String },

    // ========================================================================
    // Crypto Errors
    // ========================================================================

    /// Signature on a mandate did not verify
    #[error("Invalid signature on mandate {mandate_id}")]
    InvalidMandateSignature { mandate_id: String },

    /// Lower-level cryptographic failure
    #[error("Cryptographic error: {message}")]
    Crypto { message: String },

    // ========================================================================
    // Integration Errors
    // ========================================================================

    /// Transport-level failure talking to the payment network
    #[error("Payment network error: {message}")]
    Network { message: String },

    /// Payment network answered with a non-success status
    #[error("Payment network rejected the request ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// Circuit breaker is open; the dependency was not called
    #[error("Circuit breaker {breaker} is open")]
    CircuitOpen { breaker: String },

    /// Call exceeded the circuit breaker's deadline
    #[error("Call through circuit breaker {breaker} timed out after {timeout_ms}ms")]
    CircuitTimeout { breaker: String, timeout_ms: u64 },

    // ========================================================================
    // State Errors
    // ========================================================================

    /// Transition not present in the workflow state machine
    #[error("Invalid workflow transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Workflow is terminal and cannot change any further
    #[error("Workflow {workflow_id} is terminal (status: {status})")]
    WorkflowTerminal {
        workflow_id: String,
        status: String,
    },

    /// Workflow ID collision on create
    #[error("Workflow {workflow_id} already exists")]
    WorkflowAlreadyExists { workflow_id: String },

    // ========================================================================
    // Not Found Errors
    // ========================================================================

    /// Workflow not found
    #[error("Workflow {workflow_id} not found")]
    WorkflowNotFound { workflow_id: String },

    // ========================================================================
    // General Errors
    // ========================================================================

    /// Storage backend failure
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Serialization failure
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AgentPayError {
    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// The broad category this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::BusinessNotPaymentEnabled { .. }
            | Self::UnsupportedPaymentMethod { .. }
            | Self::InvalidConstraint { .. }
            | Self::CartExceedsIntent { .. }
            | Self::EmptyCart
            | Self::CategoryNotAllowed { .. }
            | Self::QuantityLimitExceeded { .. }
            | Self::PriceMismatch { .. }
            | Self::MandateInactive { .. }
            | Self::MandateExpired { .. }
            | Self::MalformedMandate { .. } => ErrorCategory::Validation,

            Self::InvalidMandateSignature { .. } | Self::Crypto { .. } => ErrorCategory::Crypto,

            Self::Network { .. }
            | Self::RemoteRejected { .. }
            | Self::CircuitOpen { .. }
            | Self::CircuitTimeout { .. } => ErrorCategory::Integration,

            Self::InvalidStateTransition { .. }
            | Self::WorkflowTerminal { .. }
            | Self::WorkflowAlreadyExists { .. } => ErrorCategory::State,

            Self::MandateNotFound { .. } | Self::WorkflowNotFound { .. } => ErrorCategory::NotFound,

            Self::Storage { .. } | Self::Serialization { .. } | Self::Internal { .. } => {
                ErrorCategory::Internal
            }
        }
    }

    /// Check if this is a retriable error
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Integration | ErrorCategory::Internal
        ) && !matches!(self, Self::CircuitOpen { .. })
    }

    /// Get an error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BusinessNotPaymentEnabled { .. } => "BUSINESS_NOT_PAYMENT_ENABLED",
            Self::UnsupportedPaymentMethod { .. } => "UNSUPPORTED_PAYMENT_METHOD",
            Self::InvalidConstraint { .. } => "INVALID_CONSTRAINT",
            Self::CartExceedsIntent { .. } => "CART_EXCEEDS_INTENT",
            Self::EmptyCart => "EMPTY_CART",
            Self::CategoryNotAllowed { .. } => "CATEGORY_NOT_ALLOWED",
            Self::QuantityLimitExceeded { .. } => "QUANTITY_LIMIT_EXCEEDED",
            Self::PriceMismatch { .. } => "PRICE_MISMATCH",
            Self::MandateNotFound { .. } => "MANDATE_NOT_FOUND",
            Self::MandateInactive { .. } => "MANDATE_INACTIVE",
            Self::MandateExpired { .. } => "MANDATE_EXPIRED",
            Self::MalformedMandate { .. } => "MALFORMED_MANDATE",
            Self::InvalidMandateSignature { .. } => "INVALID_MANDATE_SIGNATURE",
            Self::Crypto { .. } => "CRYPTO_ERROR",
            Self::Network { .. } => "NETWORK_ERROR",
            Self::RemoteRejected { .. } => "REMOTE_REJECTED",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::CircuitTimeout { .. } => "CIRCUIT_TIMEOUT",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::WorkflowTerminal { .. } => "WORKFLOW_TERMINAL",
            Self::WorkflowAlreadyExists { .. } => "WORKFLOW_ALREADY_EXISTS",
            Self::WorkflowNotFound { .. } => "WORKFLOW_NOT_FOUND",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::Serialization { .. } => "SERIALIZATION_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for AgentPayError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}
