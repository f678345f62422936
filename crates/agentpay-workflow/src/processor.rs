//! Payment processor
//!
//! Drives a [`Workflow`] along INITIALIZING -> INTENT_AUTHORIZED ->
//! CART_CONFIRMED -> PAYMENT_PROCESSING -> COMPLETED. Mandate operations and
//! payment execution each sit behind their own circuit breaker, so a broken
//! payment rail does not stop mandate issuance and vice versa.

use agentpay_mandates::{MandateManager, PaymentNetworkClient};
use agentpay_resilience::{
    with_backoff, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError,
    CircuitBreakerSnapshot,
};
use agentpay_store::{WorkflowReferences, WorkflowStore};
use agentpay_types::{
    AgentPayError, ErrorCategory, PaymentRequest, Result, Workflow, WorkflowId, WorkflowStatus,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

const MANDATE_BREAKER: &str = "mandate-operations";
const PAYMENT_BREAKER: &str = "payment-execution";
const INIT_ATTEMPTS: u32 = 3;

/// Breaker tuning for the two external dependencies
#[derive(Debug, Clone, Default)]
pub struct PaymentProcessorConfig {
    pub mandate_breaker: CircuitBreakerConfig,
    pub payment_breaker: CircuitBreakerConfig,
}

/// Coordinates one payment end to end
pub struct PaymentProcessor {
    mandates: Arc<MandateManager>,
    store: Arc<dyn WorkflowStore>,
    network: Arc<dyn PaymentNetworkClient>,
    mandate_breaker: CircuitBreaker,
    payment_breaker: CircuitBreaker,
}

impl PaymentProcessor {
    /// Create with default breaker tuning
    pub fn new(
        mandates: Arc<MandateManager>,
        store: Arc<dyn WorkflowStore>,
        network: Arc<dyn PaymentNetworkClient>,
    ) -> Self {
        Self::with_config(mandates, store, network, PaymentProcessorConfig::default())
    }

    /// Create with explicit breaker tuning
    pub fn with_config(
        mandates: Arc<MandateManager>,
        store: Arc<dyn WorkflowStore>,
        network: Arc<dyn PaymentNetworkClient>,
        config: PaymentProcessorConfig,
    ) -> Self {
        Self {
            mandates,
            store,
            network,
            mandate_breaker: CircuitBreaker::new(MANDATE_BREAKER, config.mandate_breaker),
            payment_breaker: CircuitBreaker::new(PAYMENT_BREAKER, config.payment_breaker),
        }
    }

    /// Construct a processor through a factory, retrying transient startup
    /// failures with bounded exponential backoff
    pub async fn initialize<F, Fut>(factory: F) -> Result<Self>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Self>>,
    {
        with_backoff(INIT_ATTEMPTS, factory).await
    }

    /// Run a payment to completion.
    ///
    /// Validation, crypto and integration failures mark the workflow FAILED
    /// with the error recorded and revoke already-created mandates
    /// best-effort. Everything else (missing records, illegal transitions,
    /// storage faults) propagates without touching the workflow.
    pub async fn start(&self, request: PaymentRequest) -> Result<Workflow> {
        let workflow = Workflow::new(
            request.user_id.clone(),
            request.business_id.clone(),
            request.agent_id.clone(),
        );
        let id = workflow.id.clone();
        self.store.create(workflow).await?;
        info!(
            workflow_id = %id,
            business_id = %request.business_id,
            agent_id = %request.agent_id,
            "payment workflow started"
        );

        match self.run(&id, &request).await {
            Ok(workflow) => {
                info!(workflow_id = %id, "payment workflow completed");
                Ok(workflow)
            }
            Err(e) => Err(self.fail(&id, e).await),
        }
    }

    async fn run(&self, id: &WorkflowId, request: &PaymentRequest) -> Result<Workflow> {
        // Step 1: intent mandate
        let intent = self
            .mandate_breaker
            .call(|| {
                self.mandates.create_intent(
                    &request.user_id,
                    &request.business_id,
                    &request.description,
                    &request.constraints,
                    request.expiry_hours,
                )
            })
            .await
            .map_err(map_breaker)?;
        self.store
            .set_references(id, WorkflowReferences::intent(intent.id.clone()))
            .await?;
        self.store
            .update_status(id, WorkflowStatus::IntentAuthorized, None)
            .await?;

        // Step 2: cart mandate
        let cart = self
            .mandate_breaker
            .call(|| {
                self.mandates.create_cart_with_validation(
                    &intent.id,
                    &request.items,
                    request.validate_with_business,
                )
            })
            .await
            .map_err(map_breaker)?;
        self.store
            .set_references(id, WorkflowReferences::cart(cart.id.clone()))
            .await?;
        self.store
            .update_status(id, WorkflowStatus::CartConfirmed, None)
            .await?;

        // Step 3: execute
        self.store
            .update_status(id, WorkflowStatus::PaymentProcessing, None)
            .await?;
        let transaction = self
            .payment_breaker
            .call(|| self.network.execute_payment(&cart.id, &request.payment_method))
            .await
            .map_err(map_breaker)?;
        info!(
            workflow_id = %id,
            transaction_id = %transaction.id,
            amount = transaction.amount,
            "payment executed"
        );
        self.store
            .set_references(id, WorkflowReferences::transaction(transaction.id))
            .await?;
        self.store
            .update_status(id, WorkflowStatus::Completed, None)
            .await
    }

    /// Cancel a workflow that has not reached a terminal state, revoking its
    /// mandates
    pub async fn cancel(&self, id: &WorkflowId, reason: &str) -> Result<Workflow> {
        let workflow = self.store.get(id).await?;
        if workflow.status.is_terminal() {
            return Err(AgentPayError::WorkflowTerminal {
                workflow_id: id.to_string(),
                status: workflow.status.to_string(),
            });
        }

        self.rollback(&workflow).await;
        let cancelled = self
            .store
            .update_status(id, WorkflowStatus::Cancelled, Some(reason.to_string()))
            .await?;
        info!(workflow_id = %id, reason, "payment workflow cancelled");
        Ok(cancelled)
    }

    /// Current state of a workflow
    pub async fn status(&self, id: &WorkflowId) -> Result<Workflow> {
        self.store.get(id).await
    }

    /// Observability view of both breakers
    pub fn breaker_snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        vec![
            self.mandate_breaker.snapshot(),
            self.payment_breaker.snapshot(),
        ]
    }

    async fn fail(&self, id: &WorkflowId, err: AgentPayError) -> AgentPayError {
        match err.category() {
            ErrorCategory::Validation | ErrorCategory::Crypto | ErrorCategory::Integration => {}
            // Missing records, illegal transitions and broken stores are
            // surfaced to the caller as-is, not recorded as payment outcomes
            _ => return err,
        }

        warn!(workflow_id = %id, error = %err, "payment workflow failed");
        match self
            .store
            .update_status(id, WorkflowStatus::Failed, Some(err.to_string()))
            .await
        {
            Ok(workflow) => self.rollback(&workflow).await,
            Err(store_err) => {
                error!(workflow_id = %id, error = %store_err, "could not record workflow failure")
            }
        }
        err
    }

    /// Revoke the workflow's mandates, cart before intent. Failures are
    /// logged, never propagated.
    async fn rollback(&self, workflow: &Workflow) {
        if let Some(cart_id) = &workflow.cart_mandate_id {
            if let Err(e) = self.mandates.revoke(cart_id, "workflow rollback").await {
                warn!(
                    workflow_id = %workflow.id,
                    mandate_id = %cart_id,
                    error = %e,
                    "cart mandate rollback failed"
                );
            }
        }
        if let Some(intent_id) = &workflow.intent_mandate_id {
            if let Err(e) = self.mandates.revoke(intent_id, "workflow rollback").await {
                warn!(
                    workflow_id = %workflow.id,
                    mandate_id = %intent_id,
                    error = %e,
                    "intent mandate rollback failed"
                );
            }
        }
    }
}

fn map_breaker(err: CircuitBreakerError<AgentPayError>) -> AgentPayError {
    match err {
        CircuitBreakerError::Open { name } => AgentPayError::CircuitOpen { breaker: name },
        CircuitBreakerError::Timeout { name, timeout } => AgentPayError::CircuitTimeout {
            breaker: name,
            timeout_ms: timeout.as_millis() as u64,
        },
        CircuitBreakerError::Inner(e) => e,
    }
}
