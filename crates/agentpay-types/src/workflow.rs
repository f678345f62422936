//! Payment workflow aggregate and its status transition table
//!
//! A workflow is one end-to-end attempt to move funds under a mandate. Its
//! status only ever moves along `WorkflowStatus::can_transition_to`; terminal
//! states never change again.

use crate::{AgentId, BusinessId, IntentConstraints, MandateId, TransactionId, UserId, WorkflowId};
use crate::cart::CartItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a payment workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Initializing,
    IntentAuthorized,
    CartConfirmed,
    PaymentProcessing,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    /// Whether the workflow can never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// The legal transition table. Everything not listed here is rejected.
    pub fn can_transition_to(&self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (self, next),
            (Initializing, IntentAuthorized)
                | (Initializing, Failed)
                | (Initializing, Cancelled)
                | (IntentAuthorized, CartConfirmed)
                | (IntentAuthorized, Failed)
                | (IntentAuthorized, Cancelled)
                | (CartConfirmed, PaymentProcessing)
                | (CartConfirmed, Failed)
                | (CartConfirmed, Cancelled)
                | (PaymentProcessing, Completed)
                | (PaymentProcessing, Failed)
                | (PaymentProcessing, Cancelled)
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initializing => "INITIALIZING",
            Self::IntentAuthorized => "INTENT_AUTHORIZED",
            Self::CartConfirmed => "CART_CONFIRMED",
            Self::PaymentProcessing => "PAYMENT_PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

/// Everything needed to start a payment workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub user_id: UserId,
    pub business_id: BusinessId,
    pub agent_id: AgentId,
    /// Human-readable description of what the agent is buying
    pub description: String,
    /// Constraints the user placed on the authorization
    pub constraints: IntentConstraints,
    /// The priced items the agent intends to buy
    pub items: Vec<CartItem>,
    /// Payment method to execute with
    pub payment_method: String,
    /// Intent validity in hours
    pub expiry_hours: i64,
    /// Cross-check the cart total with the business before committing
    #[serde(default)]
    pub validate_with_business: bool,
}

/// A completed payment on the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub cart_mandate_id: MandateId,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// One payment attempt, tracked as a state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub user_id: UserId,
    pub business_id: BusinessId,
    pub agent_id: AgentId,
    pub status: WorkflowStatus,
    pub intent_mandate_id: Option<MandateId>,
    pub cart_mandate_id: Option<MandateId>,
    pub transaction_id: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Workflow {
    /// Create a fresh workflow in INITIALIZING
    pub fn new(user_id: UserId, business_id: BusinessId, agent_id: AgentId) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::new(),
            user_id,
            business_id,
            agent_id,
            status: WorkflowStatus::Initializing,
            intent_mandate_id: None,
            cart_mandate_id: None,
            transaction_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            error_message: None,
        }
    }
}

/// Filter for listing workflows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowFilter {
    pub business_id: Option<BusinessId>,
    pub user_id: Option<UserId>,
    pub status: Option<WorkflowStatus>,
}

impl WorkflowFilter {
    /// Whether a workflow matches every set field
    pub fn matches(&self, workflow: &Workflow) -> bool {
        if let Some(ref business_id) = self.business_id {
            if &workflow.business_id != business_id {
                return false;
            }
        }
        if let Some(ref user_id) = self.user_id {
            if &workflow.user_id != user_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if workflow.status != status {
                return false;
            }
        }
        true
    }
}
