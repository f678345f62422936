//! Remote payment network client
//!
//! The network creates, stores and revokes mandates and executes payments.
//! Responses carry signed envelopes; callers (the [`crate::MandateManager`])
//! re-verify every returned mandate before trusting it.

use agentpay_types::{AgentPayError, MandateEnvelope, MandateId, Result, Transaction};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Operations the remote payment network exposes
#[async_trait]
pub trait PaymentNetworkClient: Send + Sync {
    /// POST /mandates/intent
    async fn create_intent_mandate(&self, payload: Value) -> Result<MandateEnvelope>;

    /// POST /mandates/cart
    async fn create_cart_mandate(&self, payload: Value) -> Result<MandateEnvelope>;

    /// POST /transactions
    async fn execute_payment(
        &self,
        cart_mandate_id: &MandateId,
        payment_method: &str,
    ) -> Result<Transaction>;

    /// GET /mandates/{id}
    async fn get_mandate(&self, id: &MandateId) -> Result<MandateEnvelope>;

    /// POST /mandates/{id}/revoke
    async fn revoke_mandate(&self, id: &MandateId, reason: &str) -> Result<()>;
}

/// HTTP client for the payment network, authenticating with a bearer
/// credential
pub struct HttpPaymentNetworkClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

impl HttpPaymentNetworkClient {
    /// Create a client for the network at `base_url`
    pub fn new(
        base_url: impl Into<String>,
        bearer_token: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AgentPayError::network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token: bearer_token.into(),
        })
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "payment network POST");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.bearer_token)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentPayError::network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "payment network GET");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(|e| AgentPayError::network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentPayError::RemoteRejected {
                status: status.as_u16(),
                message: body.chars().take(256).collect(),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| AgentPayError::network(format!("undecodable response: {e}")))
    }
}

#[async_trait]
impl PaymentNetworkClient for HttpPaymentNetworkClient {
    async fn create_intent_mandate(&self, payload: Value) -> Result<MandateEnvelope> {
        self.post_json("/mandates/intent", &payload).await
    }

    async fn create_cart_mandate(&self, payload: Value) -> Result<MandateEnvelope> {
        self.post_json("/mandates/cart", &payload).await
    }

    async fn execute_payment(
        &self,
        cart_mandate_id: &MandateId,
        payment_method: &str,
    ) -> Result<Transaction> {
        let body = json!({
            "cartMandateId": cart_mandate_id,
            "paymentMethod": payment_method,
        });
        self.post_json("/transactions", &body).await
    }

    async fn get_mandate(&self, id: &MandateId) -> Result<MandateEnvelope> {
        self.get_json(&format!("/mandates/{id}")).await
    }

    async fn revoke_mandate(&self, id: &MandateId, reason: &str) -> Result<()> {
        let body = json!({ "reason": reason });
        let _: Value = self
            .post_json(&format!("/mandates/{id}/revoke"), &body)
            .await?;
        Ok(())
    }
}
