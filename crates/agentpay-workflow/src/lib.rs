//! AgentPay Workflow - the payment coordinator
//!
//! [`PaymentProcessor`] drives one payment end to end: intent mandate, cart
//! mandate, execution. Every external call goes through a circuit breaker,
//! every state change goes through the workflow store's transition table,
//! and any mid-flight failure rolls back the mandates that were already
//! created.
//!
//! # Architectural Invariants
//!
//! 1. The workflow status in the store is the single source of truth
//! 2. A failed workflow never leaves live mandates behind (best effort)
//! 3. Mandate operations and payment execution fail independently - each
//!    has its own breaker

pub mod processor;

pub use processor::{PaymentProcessor, PaymentProcessorConfig};
