//! Mandate manager
//!
//! Coordinates mandate creation against the payment network. Everything is
//! checked locally first: business capability, constraint validity, cart
//! limits. The network is only reached once a request is known to be valid,
//! and every mandate the network returns is re-verified before it is cached
//! or handed to a caller.

use crate::{BusinessDirectory, PaymentNetworkClient};
use agentpay_crypto::MandateCrypto;
use agentpay_types::{
    cart_total, AgentPayError, BusinessId, CartItem, IntentConstraints, Mandate, MandateId,
    MandateStatus, MandateType, Result, UserId,
};
use chrono::{Duration, SecondsFormat, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Tuning for mandate creation
#[derive(Debug, Clone)]
pub struct MandateManagerConfig {
    /// Tolerance when comparing a business quote to the cart total
    pub price_epsilon: f64,
    /// Treat a quote disagreement as an error instead of a warning
    pub strict_price_validation: bool,
}

impl Default for MandateManagerConfig {
    fn default() -> Self {
        Self {
            price_epsilon: 0.01,
            strict_price_validation: false,
        }
    }
}

/// Creates, fetches and revokes mandates
pub struct MandateManager {
    crypto: Arc<MandateCrypto>,
    network: Arc<dyn PaymentNetworkClient>,
    businesses: Arc<dyn BusinessDirectory>,
    cache: RwLock<HashMap<MandateId, Mandate>>,
    config: MandateManagerConfig,
}

impl MandateManager {
    /// Create with default configuration
    pub fn new(
        crypto: Arc<MandateCrypto>,
        network: Arc<dyn PaymentNetworkClient>,
        businesses: Arc<dyn BusinessDirectory>,
    ) -> Self {
        Self::with_config(crypto, network, businesses, MandateManagerConfig::default())
    }

    /// Create with explicit configuration
    pub fn with_config(
        crypto: Arc<MandateCrypto>,
        network: Arc<dyn PaymentNetworkClient>,
        businesses: Arc<dyn BusinessDirectory>,
        config: MandateManagerConfig,
    ) -> Self {
        Self {
            crypto,
            network,
            businesses,
            cache: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Create an intent mandate: a signed spending authorization.
    ///
    /// Validation order matters: business capability first, then constraint
    /// validity, and only then the network call.
    pub async fn create_intent(
        &self,
        user_id: &UserId,
        business_id: &BusinessId,
        description: &str,
        constraints: &IntentConstraints,
        expiry_hours: i64,
    ) -> Result<Mandate> {
        if !self.businesses.is_payment_enabled(business_id).await? {
            return Err(AgentPayError::BusinessNotPaymentEnabled {
                business_id: business_id.to_string(),
            });
        }

        let supported = self
            .businesses
            .supported_payment_methods(business_id)
            .await?;
        constraints.validate(&supported).map_err(|e| match e {
            AgentPayError::UnsupportedPaymentMethod { method, .. } => {
                AgentPayError::UnsupportedPaymentMethod {
                    business_id: business_id.to_string(),
                    method,
                }
            }
            other => other,
        })?;

        if expiry_hours <= 0 {
            return Err(AgentPayError::InvalidConstraint {
                field: "expiryHours".into(),
                reason: format!("must be positive, got {expiry_hours}"),
            });
        }

        let now = Utc::now();
        let expires_at = now + Duration::hours(expiry_hours);
        let payload = json!({
            "type": "intent",
            "userId": user_id,
            "businessId": business_id,
            "description": description,
            "constraints": serde_json::to_value(constraints)?,
            "createdAt": now.to_rfc3339_opts(SecondsFormat::Micros, true),
            "expiresAt": expires_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        });

        let envelope = self.network.create_intent_mandate(payload).await?;
        let mandate = self.verify_and_lift(envelope, MandateType::Intent)?;

        info!(
            mandate_id = %mandate.id,
            business_id = %business_id,
            max_amount = constraints.max_amount,
            "intent mandate created"
        );
        self.cache
            .write()
            .await
            .insert(mandate.id.clone(), mandate.clone());
        Ok(mandate)
    }

    /// Create a cart mandate under an existing intent.
    ///
    /// The intent is refreshed from the network first (signature re-verified,
    /// lifecycle status re-read), so a revocation performed elsewhere is
    /// honored here. The cart is then checked against the intent's
    /// constraints before the network is called; a cart that cannot possibly
    /// be authorized never leaves the process. On success the intent is
    /// marked used.
    pub async fn create_cart(
        &self,
        intent_mandate_id: &MandateId,
        items: &[CartItem],
    ) -> Result<Mandate> {
        self.create_cart_with_validation(
            intent_mandate_id,
            items,
            self.config.strict_price_validation,
        )
        .await
    }

    /// [`Self::create_cart`] with an explicit choice of strict or lenient
    /// price validation, overriding the configured default
    pub async fn create_cart_with_validation(
        &self,
        intent_mandate_id: &MandateId,
        items: &[CartItem],
        strict_price: bool,
    ) -> Result<Mandate> {
        let intent = self.refresh(intent_mandate_id).await?;
        if intent.mandate_type != MandateType::Intent {
            return Err(AgentPayError::MalformedMandate {
                reason: format!("{intent_mandate_id} is not an intent mandate"),
            });
        }
        match intent.effective_status() {
            MandateStatus::Active => {}
            MandateStatus::Expired => {
                return Err(AgentPayError::MandateExpired {
                    mandate_id: intent.id.to_string(),
                    expired_at: intent
                        .expires_at
                        .map(|at| at.to_rfc3339())
                        .unwrap_or_default(),
                })
            }
            status => {
                return Err(AgentPayError::MandateInactive {
                    mandate_id: intent.id.to_string(),
                    status: status.to_string(),
                })
            }
        }

        let constraints = intent.constraints()?;
        constraints.check_cart(items)?;
        let total = cart_total(items);

        if let Some(quoted) = self
            .businesses
            .quote_price(&intent.business_id, items)
            .await?
        {
            if (quoted - total).abs() > self.config.price_epsilon {
                if strict_price {
                    return Err(AgentPayError::PriceMismatch {
                        quoted,
                        computed: total,
                    });
                }
                warn!(
                    intent_mandate_id = %intent.id,
                    quoted,
                    computed = total,
                    "business quote disagrees with cart total"
                );
            }
        }

        let payload = json!({
            "type": "cart",
            "userId": intent.user_id,
            "businessId": intent.business_id,
            "intentMandateId": intent.id,
            "items": serde_json::to_value(items)?,
            "total": total,
            "currency": constraints.currency,
            "createdAt": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        });

        let envelope = self.network.create_cart_mandate(payload).await?;
        let cart = self.verify_and_lift(envelope, MandateType::Cart)?;
        if cart.intent_mandate_id.as_ref() != Some(&intent.id) {
            return Err(AgentPayError::MalformedMandate {
                reason: "cart mandate references a different intent".into(),
            });
        }

        info!(
            mandate_id = %cart.id,
            intent_mandate_id = %intent.id,
            total,
            "cart mandate created"
        );

        let mut cache = self.cache.write().await;
        if let Some(cached_intent) = cache.get_mut(&intent.id) {
            cached_intent.status = MandateStatus::Used;
        }
        cache.insert(cart.id.clone(), cart.clone());
        Ok(cart)
    }

    /// Fetch a mandate, from cache or the network
    pub async fn get(&self, id: &MandateId) -> Result<Mandate> {
        if let Some(mandate) = self.cache.read().await.get(id) {
            return Ok(mandate.clone());
        }
        self.refresh(id).await
    }

    /// Fetch the network's authoritative copy of a mandate, bypassing the
    /// cache, and re-verify it before caching
    pub async fn refresh(&self, id: &MandateId) -> Result<Mandate> {
        let envelope = self.network.get_mandate(id).await?;
        let mandate = self.verify_and_lift_any(envelope)?;
        self.cache
            .write()
            .await
            .insert(mandate.id.clone(), mandate.clone());
        Ok(mandate)
    }

    /// Revoke a mandate. Already-revoked and expired mandates are a no-op so
    /// rollback paths can revoke without checking first.
    pub async fn revoke(&self, id: &MandateId, reason: &str) -> Result<()> {
        let mandate = self.get(id).await?;
        match mandate.effective_status() {
            MandateStatus::Revoked | MandateStatus::Expired => return Ok(()),
            _ => {}
        }

        self.network.revoke_mandate(id, reason).await?;
        if let Some(cached) = self.cache.write().await.get_mut(id) {
            cached.status = MandateStatus::Revoked;
        }
        info!(mandate_id = %id, reason, "mandate revoked");
        Ok(())
    }

    fn verify_and_lift(
        &self,
        envelope: agentpay_types::MandateEnvelope,
        expected: MandateType,
    ) -> Result<Mandate> {
        let mandate = self.verify_and_lift_any(envelope)?;
        if mandate.mandate_type != expected {
            return Err(AgentPayError::MalformedMandate {
                reason: format!(
                    "expected a {expected} mandate, network returned {}",
                    mandate.mandate_type
                ),
            });
        }
        Ok(mandate)
    }

    fn verify_and_lift_any(
        &self,
        envelope: agentpay_types::MandateEnvelope,
    ) -> Result<Mandate> {
        let mandate = Mandate::from_envelope(envelope)?;
        if !self.crypto.verify(&mandate.payload, &mandate.signature)? {
            return Err(AgentPayError::InvalidMandateSignature {
                mandate_id: mandate.id.to_string(),
            });
        }
        Ok(mandate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BusinessProfile, StaticBusinessDirectory};
    use agentpay_crypto::KeyManager;
    use agentpay_types::{MandateEnvelope, Transaction, TransactionId};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    const NETWORK_KEY: &str = "network-key";

    /// In-process network that signs with a key the manager can verify
    struct LoopbackNetwork {
        signer: Arc<MandateCrypto>,
        stored: Mutex<HashMap<String, MandateEnvelope>>,
        cart_calls: AtomicU32,
        revoked: Mutex<Vec<String>>,
        /// Corrupt every payload after signing it
        tamper: bool,
    }

    impl LoopbackNetwork {
        fn new(signer: Arc<MandateCrypto>) -> Self {
            Self {
                signer,
                stored: Mutex::new(HashMap::new()),
                cart_calls: AtomicU32::new(0),
                revoked: Mutex::new(Vec::new()),
                tamper: false,
            }
        }

        fn issue(&self, mut payload: Value) -> Result<MandateEnvelope> {
            let id = MandateId::new();
            payload["id"] = json!(id.as_str());
            let signature = self.signer.sign(&payload, NETWORK_KEY)?;
            if self.tamper {
                payload["description"] = json!("tampered-in-flight");
            }
            let envelope = MandateEnvelope {
                mandate: payload,
                signature,
                status: MandateStatus::Active,
            };
            self.stored
                .lock()
                .unwrap()
                .insert(id.to_string(), envelope.clone());
            Ok(envelope)
        }

        fn set_status(&self, id: &str, status: MandateStatus) {
            if let Some(envelope) = self.stored.lock().unwrap().get_mut(id) {
                envelope.status = status;
            }
        }
    }

    #[async_trait]
    impl PaymentNetworkClient for LoopbackNetwork {
        async fn create_intent_mandate(&self, payload: Value) -> Result<MandateEnvelope> {
            self.issue(payload)
        }

        async fn create_cart_mandate(&self, payload: Value) -> Result<MandateEnvelope> {
            self.cart_calls.fetch_add(1, Ordering::SeqCst);
            let envelope = self.issue(payload)?;
            if let Some(intent_id) = envelope.mandate.get("intentMandateId").and_then(Value::as_str)
            {
                self.set_status(intent_id, MandateStatus::Used);
            }
            Ok(envelope)
        }

        async fn execute_payment(
            &self,
            cart_mandate_id: &MandateId,
            _payment_method: &str,
        ) -> Result<Transaction> {
            Ok(Transaction {
                id: TransactionId::new(),
                cart_mandate_id: cart_mandate_id.clone(),
                amount: 0.0,
                currency: "USD".into(),
                status: "completed".into(),
                created_at: Utc::now(),
            })
        }

        async fn get_mandate(&self, id: &MandateId) -> Result<MandateEnvelope> {
            self.stored
                .lock()
                .unwrap()
                .get(id.as_str())
                .cloned()
                .ok_or_else(|| AgentPayError::MandateNotFound {
                    mandate_id: id.to_string(),
                })
        }

        async fn revoke_mandate(&self, id: &MandateId, _reason: &str) -> Result<()> {
            self.revoked.lock().unwrap().push(id.to_string());
            self.set_status(id.as_str(), MandateStatus::Revoked);
            Ok(())
        }
    }

    fn directory() -> Arc<StaticBusinessDirectory> {
        Arc::new(StaticBusinessDirectory::new().with_business(
            BusinessId::new("biz-1"),
            BusinessProfile::enabled(vec!["card".into(), "bank".into()])
                .with_price("widget", 10.0),
        ))
    }

    struct Fixture {
        manager: MandateManager,
        network: Arc<LoopbackNetwork>,
    }

    fn fixture_with(config: MandateManagerConfig, tamper: bool) -> Fixture {
        let keys = Arc::new(KeyManager::new());
        keys.generate(NETWORK_KEY, 2048).unwrap();
        let crypto = Arc::new(MandateCrypto::new(keys));

        let mut network = LoopbackNetwork::new(crypto.clone());
        network.tamper = tamper;
        let network = Arc::new(network);

        let manager = MandateManager::with_config(
            crypto,
            network.clone() as Arc<dyn PaymentNetworkClient>,
            directory(),
            config,
        );
        Fixture { manager, network }
    }

    fn fixture() -> Fixture {
        fixture_with(MandateManagerConfig::default(), false)
    }

    async fn intent(fx: &Fixture, max_amount: f64) -> Mandate {
        fx.manager
            .create_intent(
                &UserId::new("user-1"),
                &BusinessId::new("biz-1"),
                "office supplies",
                &IntentConstraints::max_amount(max_amount, "USD"),
                24,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_intent_signed_and_cached() {
        let fx = fixture();
        let mandate = intent(&fx, 500.0).await;

        assert_eq!(mandate.mandate_type, MandateType::Intent);
        assert_eq!(mandate.status, MandateStatus::Active);
        assert!(mandate.expires_at.is_some());

        // Served from cache, identical view
        let again = fx.manager.get(&mandate.id).await.unwrap();
        assert_eq!(again, mandate);
    }

    #[tokio::test]
    async fn create_intent_rejects_disabled_business() {
        let fx = fixture();
        let err = fx
            .manager
            .create_intent(
                &UserId::new("user-1"),
                &BusinessId::new("no-such-biz"),
                "anything",
                &IntentConstraints::max_amount(10.0, "USD"),
                24,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentPayError::BusinessNotPaymentEnabled { .. }));
    }

    #[tokio::test]
    async fn create_intent_rejects_unsupported_method() {
        let fx = fixture();
        let constraints = IntentConstraints::max_amount(10.0, "USD")
            .with_payment_methods(vec!["crypto".into()]);
        let err = fx
            .manager
            .create_intent(
                &UserId::new("user-1"),
                &BusinessId::new("biz-1"),
                "anything",
                &constraints,
                24,
            )
            .await
            .unwrap_err();
        match err {
            AgentPayError::UnsupportedPaymentMethod { business_id, method } => {
                assert_eq!(business_id, "biz-1");
                assert_eq!(method, "crypto");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn create_intent_rejects_nonpositive_expiry() {
        let fx = fixture();
        let err = fx
            .manager
            .create_intent(
                &UserId::new("user-1"),
                &BusinessId::new("biz-1"),
                "anything",
                &IntentConstraints::max_amount(10.0, "USD"),
                0,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentPayError::InvalidConstraint { .. }));
    }

    #[tokio::test]
    async fn create_cart_marks_intent_used() {
        let fx = fixture();
        let i = intent(&fx, 500.0).await;

        let items = vec![CartItem::new("widget", 10.0, 3)];
        let cart = fx.manager.create_cart(&i.id, &items).await.unwrap();

        assert_eq!(cart.mandate_type, MandateType::Cart);
        assert_eq!(cart.intent_mandate_id, Some(i.id.clone()));
        assert_eq!(cart.payload["total"], json!(30.0));

        let refreshed = fx.manager.get(&i.id).await.unwrap();
        assert_eq!(refreshed.status, MandateStatus::Used);
    }

    #[tokio::test]
    async fn over_ceiling_cart_never_reaches_the_network() {
        let fx = fixture();
        let i = intent(&fx, 100.0).await;

        let items = vec![CartItem::new("widget", 75.0, 2)];
        let err = fx.manager.create_cart(&i.id, &items).await.unwrap_err();
        assert!(matches!(err, AgentPayError::CartExceedsIntent { .. }));
        assert_eq!(fx.network.cart_calls.load(Ordering::SeqCst), 0);

        // The intent is still usable
        let refreshed = fx.manager.get(&i.id).await.unwrap();
        assert_eq!(refreshed.status, MandateStatus::Active);
    }

    #[tokio::test]
    async fn used_intent_rejects_second_cart() {
        let fx = fixture();
        let i = intent(&fx, 500.0).await;
        let items = vec![CartItem::new("widget", 10.0, 1)];

        fx.manager.create_cart(&i.id, &items).await.unwrap();
        let err = fx.manager.create_cart(&i.id, &items).await.unwrap_err();
        assert!(matches!(err, AgentPayError::MandateInactive { .. }));
    }

    #[tokio::test]
    async fn cart_under_cart_mandate_rejected() {
        let fx = fixture();
        let i = intent(&fx, 500.0).await;
        let items = vec![CartItem::new("widget", 10.0, 1)];
        let cart = fx.manager.create_cart(&i.id, &items).await.unwrap();

        let err = fx.manager.create_cart(&cart.id, &items).await.unwrap_err();
        assert!(matches!(err, AgentPayError::MalformedMandate { .. }));
    }

    #[tokio::test]
    async fn tampered_network_response_rejected() {
        let fx = fixture_with(MandateManagerConfig::default(), true);
        let err = fx
            .manager
            .create_intent(
                &UserId::new("user-1"),
                &BusinessId::new("biz-1"),
                "anything",
                &IntentConstraints::max_amount(10.0, "USD"),
                24,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentPayError::InvalidMandateSignature { .. }));
    }

    #[tokio::test]
    async fn strict_price_validation_rejects_bad_quote() {
        let fx = fixture_with(
            MandateManagerConfig {
                strict_price_validation: true,
                ..Default::default()
            },
            false,
        );
        let i = intent(&fx, 500.0).await;

        // Business prices widget at 10.0, the cart claims 5.0
        let items = vec![CartItem::new("widget", 5.0, 2)];
        let err = fx.manager.create_cart(&i.id, &items).await.unwrap_err();
        assert!(matches!(err, AgentPayError::PriceMismatch { .. }));
        assert_eq!(fx.network.cart_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn lenient_price_validation_warns_and_proceeds() {
        let fx = fixture();
        let i = intent(&fx, 500.0).await;
        let items = vec![CartItem::new("widget", 5.0, 2)];
        assert!(fx.manager.create_cart(&i.id, &items).await.is_ok());
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let fx = fixture();
        let i = intent(&fx, 500.0).await;

        fx.manager.revoke(&i.id, "user changed mind").await.unwrap();
        fx.manager.revoke(&i.id, "again").await.unwrap();

        assert_eq!(fx.network.revoked.lock().unwrap().len(), 1);
        let refreshed = fx.manager.get(&i.id).await.unwrap();
        assert_eq!(refreshed.status, MandateStatus::Revoked);
    }

    #[tokio::test]
    async fn intent_revoked_elsewhere_rejects_cart() {
        // Two managers over one network: a revocation performed by one must
        // be honored by the other, whose cache still says Active
        let keys = Arc::new(KeyManager::new());
        keys.generate(NETWORK_KEY, 2048).unwrap();
        let crypto = Arc::new(MandateCrypto::new(keys));
        let network = Arc::new(LoopbackNetwork::new(crypto.clone()));
        let businesses = directory();

        let manager_a = MandateManager::new(
            crypto.clone(),
            network.clone() as Arc<dyn PaymentNetworkClient>,
            businesses.clone(),
        );
        let manager_b = MandateManager::new(
            crypto,
            network.clone() as Arc<dyn PaymentNetworkClient>,
            businesses,
        );

        let intent = manager_a
            .create_intent(
                &UserId::new("user-1"),
                &BusinessId::new("biz-1"),
                "office supplies",
                &IntentConstraints::max_amount(500.0, "USD"),
                24,
            )
            .await
            .unwrap();
        manager_b.revoke(&intent.id, "user revoked").await.unwrap();

        let items = vec![CartItem::new("widget", 10.0, 1)];
        let err = manager_a.create_cart(&intent.id, &items).await.unwrap_err();
        assert!(matches!(err, AgentPayError::MandateInactive { .. }));
        assert_eq!(network.cart_calls.load(Ordering::SeqCst), 0);

        // The refresh also corrected manager A's cached copy
        let cached = manager_a.get(&intent.id).await.unwrap();
        assert_eq!(cached.status, MandateStatus::Revoked);
    }

    #[tokio::test]
    async fn revoked_intent_rejects_cart() {
        let fx = fixture();
        let i = intent(&fx, 500.0).await;
        fx.manager.revoke(&i.id, "rollback").await.unwrap();

        let items = vec![CartItem::new("widget", 10.0, 1)];
        let err = fx.manager.create_cart(&i.id, &items).await.unwrap_err();
        assert!(matches!(err, AgentPayError::MandateInactive { .. }));
    }

    #[tokio::test]
    async fn get_unknown_mandate_not_found() {
        let fx = fixture();
        let err = fx
            .manager
            .get(&MandateId::from_string("mandate_ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentPayError::MandateNotFound { .. }));
    }
}
