//! Webhook signing
//!
//! Deliveries are signed with HMAC-SHA256 over the exact JSON body. The
//! signature header value is `sha256=<hex>`; the delivery carries the
//! envelope id in its own header so receivers can deduplicate.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use agora_types::{EventEnvelope, MarketError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature
pub const SIGNATURE_HEADER: &str = "X-Agora-Signature";
/// Header carrying the event type
pub const EVENT_HEADER: &str = "X-Agora-Event";
/// Header carrying the unique delivery id
pub const DELIVERY_HEADER: &str = "X-Agora-Delivery";

/// Sign a payload body, producing the `sha256=<hex>` header value
pub fn sign_payload(body: &[u8], secret: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| MarketError::internal("invalid webhook secret length"))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Verify a received signature header against the body, in constant time
pub fn verify_signature(body: &[u8], secret: &[u8], header_value: &str) -> bool {
    match sign_payload(body, secret) {
        Ok(expected) => expected.as_bytes().ct_eq(header_value.as_bytes()).into(),
        Err(_) => false,
    }
}

/// A webhook delivery ready to hand to a transport
#[derive(Debug, Clone)]
pub struct SignedDelivery {
    /// Exact JSON body the signature covers
    pub body: String,
    /// `sha256=<hex>` signature of `body`
    pub signature: String,
    pub event_type: String,
    /// Envelope id; receivers deduplicate on this
    pub delivery_id: String,
}

impl SignedDelivery {
    /// Serialize and sign an envelope
    pub fn prepare(envelope: &EventEnvelope, secret: &[u8]) -> Result<Self> {
        let body = serde_json::to_string(envelope)
            .map_err(|e| MarketError::internal(format!("envelope serialization failed: {}", e)))?;
        let signature = sign_payload(body.as_bytes(), secret)?;
        Ok(Self {
            body,
            signature,
            event_type: envelope.event_type.clone(),
            delivery_id: envelope.id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::{AgentId, MarketEvent, TransactionId};

    #[test]
    fn test_signature_format() {
        let sig = sign_payload(b"{}", b"secret").unwrap();
        assert!(sig.starts_with("sha256="));
        assert_eq!(sig.len(), "sha256=".len() + 64);
    }

    #[test]
    fn test_sign_and_verify_roundtrip() {
        let body = br#"{"id":"event_1","type":"trade.executed"}"#;
        let sig = sign_payload(body, b"topsecret").unwrap();
        assert!(verify_signature(body, b"topsecret", &sig));
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let sig = sign_payload(b"original", b"topsecret").unwrap();
        assert!(!verify_signature(b"tampered", b"topsecret", &sig));
        assert!(!verify_signature(b"original", b"wrongsecret", &sig));
        assert!(!verify_signature(b"original", b"topsecret", "sha256=deadbeef"));
    }

    #[test]
    fn test_prepare_delivery() {
        let envelope = MarketEvent::Cancelled {
            transaction_id: TransactionId::new(),
            cancelled_by: AgentId::new(),
        }
        .into_envelope()
        .unwrap();

        let delivery = SignedDelivery::prepare(&envelope, b"hooksecret").unwrap();
        assert_eq!(delivery.event_type, "transaction.cancelled");
        assert_eq!(delivery.delivery_id, envelope.id.to_string());
        assert!(verify_signature(
            delivery.body.as_bytes(),
            b"hooksecret",
            &delivery.signature
        ));
    }
}
