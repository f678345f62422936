//! Cart items and intent constraints
//!
//! An intent mandate carries `IntentConstraints` - the spending ceiling and
//! scope the user authorized. A cart mandate commits to specific priced
//! `CartItem`s inside that scope. All constraint checks happen locally,
//! before anything is sent to the payment network.

use crate::{AgentPayError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single priced line item in a cart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Item name or SKU
    pub name: String,
    /// Unit price
    pub price: f64,
    /// Quantity ordered
    pub quantity: u32,
    /// Category, matched against the intent's allow-list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl CartItem {
    /// Create a new item
    pub fn new(name: impl Into<String>, price: f64, quantity: u32) -> Self {
        Self {
            name: name.into(),
            price,
            quantity,
            category: None,
        }
    }

    /// Set the item category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Line total for this item
    pub fn line_total(&self) -> f64 {
        self.price * self.quantity as f64
    }
}

/// Sum of all line totals
pub fn cart_total(items: &[CartItem]) -> f64 {
    items.iter().map(CartItem::line_total).sum()
}

/// Constraints the user placed on an intent mandate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentConstraints {
    /// Spending ceiling for any cart created under this intent
    pub max_amount: f64,
    /// Currency code the ceiling is denominated in
    pub currency: String,
    /// Payment methods the agent may use; empty means any the business supports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payment_methods: Vec<String>,
    /// Item categories the agent may buy; empty means no restriction
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_categories: Vec<String>,
    /// Cap on the quantity of any single line item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_quantity_per_item: Option<u32>,
    /// Hard expiry the user set on the authorization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_time: Option<DateTime<Utc>>,
}

impl IntentConstraints {
    /// Constraints with only a spending ceiling
    pub fn max_amount(max_amount: f64, currency: impl Into<String>) -> Self {
        Self {
            max_amount,
            currency: currency.into(),
            payment_methods: vec![],
            allowed_categories: vec![],
            max_quantity_per_item: None,
            expiry_time: None,
        }
    }

    /// Restrict the usable payment methods
    pub fn with_payment_methods(mut self, methods: Vec<String>) -> Self {
        self.payment_methods = methods;
        self
    }

    /// Restrict the purchasable categories
    pub fn with_allowed_categories(mut self, categories: Vec<String>) -> Self {
        self.allowed_categories = categories;
        self
    }

    /// Cap the quantity of any single line item
    pub fn with_max_quantity_per_item(mut self, cap: u32) -> Self {
        self.max_quantity_per_item = Some(cap);
        self
    }

    /// Validate the constraints themselves, against what the business supports
    pub fn validate(&self, supported_methods: &[String]) -> Result<()> {
        if self.max_amount <= 0.0 || !self.max_amount.is_finite() {
            return Err(AgentPayError::InvalidConstraint {
                field: "maxAmount".into(),
                reason: format!("must be a positive amount, got {}", self.max_amount),
            });
        }
        if self.currency.is_empty() {
            return Err(AgentPayError::InvalidConstraint {
                field: "currency".into(),
                reason: "must not be empty".into(),
            });
        }
        for method in &self.payment_methods {
            if !supported_methods.contains(method) {
                return Err(AgentPayError::UnsupportedPaymentMethod {
                    business_id: String::new(),
                    method: method.clone(),
                });
            }
        }
        if let Some(expiry) = self.expiry_time {
            if expiry <= Utc::now() {
                return Err(AgentPayError::InvalidConstraint {
                    field: "expiryTime".into(),
                    reason: format!("must be in the future, got {}", expiry.to_rfc3339()),
                });
            }
        }
        Ok(())
    }

    /// Check a concrete cart against these constraints
    pub fn check_cart(&self, items: &[CartItem]) -> Result<()> {
        if items.is_empty() {
            return Err(AgentPayError::EmptyCart);
        }

        let total = cart_total(items);
        if total > self.max_amount {
            return Err(AgentPayError::CartExceedsIntent {
                total,
                max_amount: self.max_amount,
            });
        }

        for item in items {
            if let Some(cap) = self.max_quantity_per_item {
                if item.quantity > cap {
                    return Err(AgentPayError::QuantityLimitExceeded {
                        item: item.name.clone(),
                        quantity: item.quantity,
                        limit: cap,
                    });
                }
            }
            if !self.allowed_categories.is_empty() {
                let category = item.category.as_deref().unwrap_or("");
                if !self.allowed_categories.iter().any(|c| c == category) {
                    return Err(AgentPayError::CategoryNotAllowed {
                        category: category.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn items_totaling(amounts: &[(f64, u32)]) -> Vec<CartItem> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, (price, qty))| CartItem::new(format!("item-{i}"), *price, *qty))
            .collect()
    }

    #[test]
    fn test_cart_total() {
        let items = items_totaling(&[(10.0, 3), (5.5, 2)]);
        assert!((cart_total(&items) - 41.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cart_within_ceiling_passes() {
        let constraints = IntentConstraints::max_amount(500.0, "USD");
        let items = items_totaling(&[(100.0, 3)]);
        assert!(constraints.check_cart(&items).is_ok());
    }

    #[test]
    fn test_cart_over_ceiling_rejected() {
        let constraints = IntentConstraints::max_amount(100.0, "USD");
        let items = items_totaling(&[(75.0, 2)]);
        let err = constraints.check_cart(&items).unwrap_err();
        assert!(matches!(err, AgentPayError::CartExceedsIntent { .. }));
    }

    #[test]
    fn test_empty_cart_rejected() {
        let constraints = IntentConstraints::max_amount(100.0, "USD");
        assert!(matches!(
            constraints.check_cart(&[]),
            Err(AgentPayError::EmptyCart)
        ));
    }

    #[test]
    fn test_category_allowlist() {
        let constraints = IntentConstraints::max_amount(100.0, "USD")
            .with_allowed_categories(vec!["books".into()]);

        let ok = vec![CartItem::new("novel", 10.0, 1).with_category("books")];
        assert!(constraints.check_cart(&ok).is_ok());

        let bad = vec![CartItem::new("drone", 10.0, 1).with_category("electronics")];
        assert!(matches!(
            constraints.check_cart(&bad),
            Err(AgentPayError::CategoryNotAllowed { .. })
        ));

        // Uncategorized items do not pass an allow-list
        let uncategorized = vec![CartItem::new("mystery", 10.0, 1)];
        assert!(constraints.check_cart(&uncategorized).is_err());
    }

    #[test]
    fn test_quantity_cap() {
        let constraints =
            IntentConstraints::max_amount(1000.0, "USD").with_max_quantity_per_item(5);
        let items = vec![CartItem::new("widget", 1.0, 6)];
        assert!(matches!(
            constraints.check_cart(&items),
            Err(AgentPayError::QuantityLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_nonpositive_ceiling() {
        let constraints = IntentConstraints::max_amount(0.0, "USD");
        assert!(constraints.validate(&[]).is_err());
    }

    #[test]
    fn test_validate_payment_method_subset() {
        let supported = vec!["card".to_string(), "bank".to_string()];
        let ok = IntentConstraints::max_amount(10.0, "USD")
            .with_payment_methods(vec!["card".into()]);
        assert!(ok.validate(&supported).is_ok());

        let bad = IntentConstraints::max_amount(10.0, "USD")
            .with_payment_methods(vec!["crypto".into()]);
        assert!(matches!(
            bad.validate(&supported),
            Err(AgentPayError::UnsupportedPaymentMethod { .. })
        ));
    }

    #[test]
    fn test_validate_past_expiry_rejected() {
        let mut constraints = IntentConstraints::max_amount(10.0, "USD");
        constraints.expiry_time = Some(Utc::now() - Duration::hours(1));
        assert!(constraints.validate(&[]).is_err());
    }
}
