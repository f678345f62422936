//! Mandate types for AgentPay
//!
//! A mandate is a signed, bounded authorization. An *intent* mandate
//! expresses a spending ceiling and constraints; a *cart* mandate references
//! an intent and commits to specific priced items within it.
//!
//! The signed wire shape is `{"mandate": {...payload...}, "signature": {...}}`
//! where the payload is canonicalized (key-sorted) before signing, so the
//! typed view here is always derived from the payload, never the other way
//! around.

use crate::{AgentPayError, BusinessId, IntentConstraints, MandateId, Result, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The signing algorithm every mandate must carry
pub const MANDATE_ALGORITHM: &str = "RS256-PSS";

/// Detached signature produced over a canonicalized mandate payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureEnvelope {
    /// Base64-encoded RSA-PSS signature
    pub signature: String,
    /// Signing algorithm identifier
    pub algorithm: String,
    /// ID of the key pair that signed
    pub key_id: String,
    /// When the signature was produced
    pub timestamp: DateTime<Utc>,
    /// Hex-encoded random nonce bound into the signed message
    pub nonce: String,
}

/// Kind of authorization a mandate expresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MandateType {
    /// Spending ceiling plus constraints
    Intent,
    /// Priced items committed under an intent
    Cart,
}

impl std::fmt::Display for MandateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intent => write!(f, "intent"),
            Self::Cart => write!(f, "cart"),
        }
    }
}

/// Lifecycle state of a mandate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MandateStatus {
    /// Usable
    Active,
    /// An intent that has had a cart created from it
    Used,
    /// Past its expiry
    Expired,
    /// Explicitly revoked (or rolled back)
    Revoked,
}

impl MandateStatus {
    /// Status of a freshly issued mandate
    pub fn initial() -> Self {
        Self::Active
    }
}

impl std::fmt::Display for MandateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Used => write!(f, "used"),
            Self::Expired => write!(f, "expired"),
            Self::Revoked => write!(f, "revoked"),
        }
    }
}

/// Signed mandate as it travels to and from the payment network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MandateEnvelope {
    /// Canonicalizable payload
    pub mandate: Value,
    /// Detached signature over the payload
    pub signature: SignatureEnvelope,
    /// Network-maintained lifecycle status. Lives outside the signed payload
    /// because it changes after signing (used, revoked).
    #[serde(default = "MandateStatus::initial")]
    pub status: MandateStatus,
}

/// A mandate with its payload fields lifted into a typed view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mandate {
    pub id: MandateId,
    pub mandate_type: MandateType,
    pub user_id: UserId,
    pub business_id: BusinessId,
    /// Present on cart mandates: the intent this cart was created under
    pub intent_mandate_id: Option<MandateId>,
    /// The exact payload the signature covers
    pub payload: Value,
    pub signature: SignatureEnvelope,
    pub status: MandateStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

fn payload_str(payload: &Value, key: &str) -> Result<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AgentPayError::MalformedMandate {
            reason: format!("missing or non-string field `{key}`"),
        })
}

fn payload_datetime(payload: &Value, key: &str) -> Result<Option<DateTime<Utc>>> {
    match payload.get(key).and_then(Value::as_str) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| AgentPayError::MalformedMandate {
                reason: format!("field `{key}` is not RFC3339: {e}"),
            }),
    }
}

impl Mandate {
    /// Lift a signed wire envelope into the typed view.
    ///
    /// This only parses structure; it does NOT verify the signature. Callers
    /// must verify before trusting the result.
    pub fn from_envelope(envelope: MandateEnvelope) -> Result<Self> {
        let payload = envelope.mandate;

        let id = MandateId::from_string(payload_str(&payload, "id")?);
        let mandate_type = match payload_str(&payload, "type")?.as_str() {
            "intent" => MandateType::Intent,
            "cart" => MandateType::Cart,
            other => {
                return Err(AgentPayError::MalformedMandate {
                    reason: format!("unknown mandate type `{other}`"),
                })
            }
        };
        let user_id = UserId::new(payload_str(&payload, "userId")?);
        let business_id = BusinessId::new(payload_str(&payload, "businessId")?);

        let intent_mandate_id = payload
            .get("intentMandateId")
            .and_then(Value::as_str)
            .map(MandateId::from_string);
        if mandate_type == MandateType::Cart && intent_mandate_id.is_none() {
            return Err(AgentPayError::MalformedMandate {
                reason: "cart mandate is missing `intentMandateId`".into(),
            });
        }

        let created_at = payload_datetime(&payload, "createdAt")?
            .unwrap_or(envelope.signature.timestamp);
        let expires_at = payload_datetime(&payload, "expiresAt")?;

        Ok(Self {
            id,
            mandate_type,
            user_id,
            business_id,
            intent_mandate_id,
            payload,
            signature: envelope.signature,
            status: envelope.status,
            created_at,
            expires_at,
        })
    }

    /// Rebuild the signed wire shape
    pub fn envelope(&self) -> MandateEnvelope {
        MandateEnvelope {
            mandate: self.payload.clone(),
            signature: self.signature.clone(),
            status: self.status,
        }
    }

    /// Whether the mandate's own expiry has passed
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }

    /// Status with expiry folded in: an expired mandate reads as `Expired`
    /// regardless of what was stored.
    pub fn effective_status(&self) -> MandateStatus {
        if self.status == MandateStatus::Active && self.is_expired() {
            MandateStatus::Expired
        } else {
            self.status
        }
    }

    /// Whether the mandate can still be used (signature verification is a
    /// separate, independent check)
    pub fn is_active(&self) -> bool {
        self.effective_status() == MandateStatus::Active
    }

    /// Constraints carried in an intent payload
    pub fn constraints(&self) -> Result<IntentConstraints> {
        let raw = self
            .payload
            .get("constraints")
            .ok_or_else(|| AgentPayError::MalformedMandate {
                reason: "intent mandate is missing `constraints`".into(),
            })?;
        serde_json::from_value(raw.clone()).map_err(|e| AgentPayError::MalformedMandate {
            reason: format!("constraints do not parse: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(payload: Value) -> MandateEnvelope {
        MandateEnvelope {
            mandate: payload,
            signature: SignatureEnvelope {
                signature: "c2ln".into(),
                algorithm: MANDATE_ALGORITHM.into(),
                key_id: "key-1".into(),
                timestamp: Utc::now(),
                nonce: "00ff".into(),
            },
            status: MandateStatus::Active,
        }
    }

    fn intent_payload() -> Value {
        json!({
            "id": "mandate_1",
            "type": "intent",
            "userId": "user-1",
            "businessId": "biz-1",
            "constraints": { "maxAmount": 500.0, "currency": "USD" },
        })
    }

    #[test]
    fn test_intent_from_envelope() {
        let mandate = Mandate::from_envelope(envelope(intent_payload())).unwrap();
        assert_eq!(mandate.mandate_type, MandateType::Intent);
        assert_eq!(mandate.user_id.as_str(), "user-1");
        assert_eq!(mandate.status, MandateStatus::Active);
        assert!((mandate.constraints().unwrap().max_amount - 500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cart_requires_intent_reference() {
        let payload = json!({
            "id": "mandate_2",
            "type": "cart",
            "userId": "user-1",
            "businessId": "biz-1",
        });
        let err = Mandate::from_envelope(envelope(payload)).unwrap_err();
        assert!(matches!(err, AgentPayError::MalformedMandate { .. }));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let payload = json!({
            "id": "mandate_3",
            "type": "gift",
            "userId": "user-1",
            "businessId": "biz-1",
        });
        assert!(Mandate::from_envelope(envelope(payload)).is_err());
    }

    #[test]
    fn test_expired_mandate_reads_expired() {
        let mut payload = intent_payload();
        payload["expiresAt"] = json!((Utc::now() - chrono::Duration::hours(1)).to_rfc3339());
        let mandate = Mandate::from_envelope(envelope(payload)).unwrap();
        assert_eq!(mandate.status, MandateStatus::Active);
        assert_eq!(mandate.effective_status(), MandateStatus::Expired);
        assert!(!mandate.is_active());
    }

    #[test]
    fn test_signature_envelope_wire_shape() {
        let sig = SignatureEnvelope {
            signature: "c2ln".into(),
            algorithm: MANDATE_ALGORITHM.into(),
            key_id: "key-1".into(),
            timestamp: Utc::now(),
            nonce: "00ff".into(),
        };
        let json = serde_json::to_value(&sig).unwrap();
        // camelCase wire field names
        assert!(json.get("keyId").is_some());
        assert!(json.get("nonce").is_some());
        assert_eq!(json["algorithm"], "RS256-PSS");
    }

    #[test]
    fn test_envelope_round_trip() {
        let mandate = Mandate::from_envelope(envelope(intent_payload())).unwrap();
        let rebuilt = mandate.envelope();
        assert_eq!(rebuilt.mandate, mandate.payload);
        assert_eq!(rebuilt.status, mandate.status);
    }

    #[test]
    fn test_status_carried_on_the_envelope() {
        let mut env = envelope(intent_payload());
        env.status = MandateStatus::Revoked;
        let mandate = Mandate::from_envelope(env).unwrap();
        assert_eq!(mandate.status, MandateStatus::Revoked);
        assert!(!mandate.is_active());
    }

    #[test]
    fn test_envelope_without_status_defaults_to_active() {
        // Networks that predate lifecycle reporting omit the field
        let json = serde_json::json!({
            "mandate": intent_payload(),
            "signature": {
                "signature": "c2ln",
                "algorithm": MANDATE_ALGORITHM,
                "keyId": "key-1",
                "timestamp": Utc::now().to_rfc3339(),
                "nonce": "00ff",
            },
        });
        let env: MandateEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(env.status, MandateStatus::Active);
    }
}
