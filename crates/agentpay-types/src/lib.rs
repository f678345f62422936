//! AgentPay Types - Canonical domain types for agent-initiated payments
//!
//! This crate contains all foundational types for AgentPay with zero
//! dependencies on other agentpay crates. It defines:
//!
//! - Identity types (MandateId, WorkflowId, UserId, BusinessId, etc.)
//! - Mandate types (intent and cart mandates, signature envelopes)
//! - Cart items and intent constraints
//! - Workflow aggregate and its status transition table
//! - The domain-wide error taxonomy
//!
//! # Architectural Invariants
//!
//! 1. A cart mandate always references an active, unexpired intent mandate
//! 2. A cart's total never exceeds the intent's spending ceiling
//! 3. Workflow status only moves along the legal transition table
//! 4. No mandate is trusted until its signature has been verified

pub mod cart;
pub mod error;
pub mod identity;
pub mod mandate;
pub mod workflow;

pub use cart::*;
pub use error::*;
pub use identity::*;
pub use mandate::*;
pub use workflow::*;

/// Version of the AgentPay types schema
pub const TYPES_VERSION: &str = "0.1.0";
