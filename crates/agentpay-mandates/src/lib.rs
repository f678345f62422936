//! AgentPay Mandates - mandate lifecycle on top of the crypto layer
//!
//! The [`MandateManager`] enforces business rules around mandate creation:
//! constraints are validated locally before anything touches the network,
//! and nothing returned by the network is trusted until its signature has
//! been re-verified.

pub mod business;
pub mod manager;
pub mod network;

pub use business::{BusinessDirectory, BusinessProfile, StaticBusinessDirectory};
pub use manager::{MandateManager, MandateManagerConfig};
pub use network::{HttpPaymentNetworkClient, PaymentNetworkClient};
