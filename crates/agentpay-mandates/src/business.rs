//! Business directory
//!
//! Answers the two questions mandate creation asks about a business: is it
//! payment-enabled, and which payment methods does it accept. Optionally
//! quotes an authoritative price for a cart so agents cannot invent their
//! own numbers.

use agentpay_types::{BusinessId, CartItem, Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// Lookup of business payment capabilities
#[async_trait]
pub trait BusinessDirectory: Send + Sync {
    /// Whether the business accepts agent payments at all
    async fn is_payment_enabled(&self, business_id: &BusinessId) -> Result<bool>;

    /// Payment methods the business accepts. Empty for unknown businesses.
    async fn supported_payment_methods(&self, business_id: &BusinessId) -> Result<Vec<String>>;

    /// Business-authoritative total for a cart, if the business prices it.
    /// `None` means the business offers no quote and the cart's own prices
    /// stand.
    async fn quote_price(&self, business_id: &BusinessId, items: &[CartItem])
        -> Result<Option<f64>>;
}

/// Static capabilities for one business
#[derive(Debug, Clone, Default)]
pub struct BusinessProfile {
    pub payment_enabled: bool,
    pub payment_methods: Vec<String>,
    /// Per-item price overrides by item name; missing items keep their cart
    /// price
    pub prices: HashMap<String, f64>,
}

impl BusinessProfile {
    /// A payment-enabled profile with the given methods
    pub fn enabled(payment_methods: Vec<String>) -> Self {
        Self {
            payment_enabled: true,
            payment_methods,
            prices: HashMap::new(),
        }
    }

    /// Add an authoritative price for an item name
    pub fn with_price(mut self, item: impl Into<String>, price: f64) -> Self {
        self.prices.insert(item.into(), price);
        self
    }
}

/// Fixed in-process directory, used in tests and single-tenant deployments
#[derive(Debug, Default)]
pub struct StaticBusinessDirectory {
    businesses: HashMap<BusinessId, BusinessProfile>,
}

impl StaticBusinessDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a business profile
    pub fn insert(&mut self, business_id: BusinessId, profile: BusinessProfile) {
        self.businesses.insert(business_id, profile);
    }

    /// Builder-style registration
    pub fn with_business(mut self, business_id: BusinessId, profile: BusinessProfile) -> Self {
        self.insert(business_id, profile);
        self
    }
}

#[async_trait]
impl BusinessDirectory for StaticBusinessDirectory {
    async fn is_payment_enabled(&self, business_id: &BusinessId) -> Result<bool> {
        Ok(self
            .businesses
            .get(business_id)
            .map(|p| p.payment_enabled)
            .unwrap_or(false))
    }

    async fn supported_payment_methods(&self, business_id: &BusinessId) -> Result<Vec<String>> {
        Ok(self
            .businesses
            .get(business_id)
            .map(|p| p.payment_methods.clone())
            .unwrap_or_default())
    }

    async fn quote_price(
        &self,
        business_id: &BusinessId,
        items: &[CartItem],
    ) -> Result<Option<f64>> {
        let Some(profile) = self.businesses.get(business_id) else {
            return Ok(None);
        };
        if profile.prices.is_empty() {
            return Ok(None);
        }
        let total = items
            .iter()
            .map(|item| {
                let unit = profile.prices.get(&item.name).copied().unwrap_or(item.price);
                unit * item.quantity as f64
            })
            .sum();
        Ok(Some(total))
    }
}
