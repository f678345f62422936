//! Identity types for AgentPay
//!
//! Record identifiers (mandates, workflows, transactions) are string-backed
//! so that remote-assigned IDs round-trip unchanged; locally created records
//! get a prefixed UUID. Principal identifiers (users, businesses, agents)
//! come from external systems and are opaque strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Macro to generate record ID types with common implementations
macro_rules! define_record_id {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new random, prefixed ID for a locally created record
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::new_v4()))
            }

            /// Wrap an existing (possibly remote-assigned) identifier
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// The identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

/// Macro to generate opaque principal ID types
macro_rules! define_principal_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap an externally assigned identifier
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// The identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

// Record identity types
define_record_id!(MandateId, "mandate", "Unique identifier for a mandate");
define_record_id!(WorkflowId, "wf", "Unique identifier for a payment workflow");
define_record_id!(TransactionId, "tx", "Unique identifier for a payment transaction");

// Principal identity types (externally assigned)
define_principal_id!(UserId, "Identifier of the user granting authority");
define_principal_id!(BusinessId, "Identifier of the counterparty business");
define_principal_id!(AgentId, "Identifier of the agent acting on the user's behalf");
