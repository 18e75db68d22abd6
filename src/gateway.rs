//! Payment gateway collaborator: order creation and proof-of-payment signatures.
//!
//! The gateway signs `"{gateway_order_id}|{gateway_payment_id}"` with the account key
//! secret for checkout callbacks, and the raw request body with a separate webhook
//! secret for asynchronous notifications. Both are hex encoded HMAC-SHA256.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use utoipa::ToSchema;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// An order registered with the gateway, to be paid by the buyer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Register an order of `amount` minor units with the gateway.
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> anyhow::Result<GatewayOrder>;
}

/// Issues gateway references locally. Used for development and tests where no
/// gateway account is reachable.
#[derive(Debug, Default, Clone)]
pub struct OfflineGateway;

#[async_trait]
impl PaymentGateway for OfflineGateway {
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> anyhow::Result<GatewayOrder> {
        Ok(GatewayOrder {
            id: format!("order_{}", Uuid::new_v4().simple()),
            amount,
            currency: currency.to_string(),
            receipt: receipt.to_string(),
        })
    }
}

fn mac_for(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length")
}

/// Hex signature the gateway attaches to a successful checkout.
pub fn payment_signature(gateway_order_id: &str, gateway_payment_id: &str, secret: &str) -> String {
    let mut mac = mac_for(secret);
    mac.update(gateway_order_id.as_bytes());
    mac.update(b"|");
    mac.update(gateway_payment_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a checkout signature.
pub fn verify_payment_signature(
    gateway_order_id: &str,
    gateway_payment_id: &str,
    signature: &str,
    secret: &str,
) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let mut mac = mac_for(secret);
    mac.update(gateway_order_id.as_bytes());
    mac.update(b"|");
    mac.update(gateway_payment_id.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Hex signature over a raw webhook body.
pub fn webhook_signature(body: &[u8], secret: &str) -> String {
    let mut mac = mac_for(secret);
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a webhook signature header against the raw body.
pub fn verify_webhook_signature(body: &[u8], signature_header: &str, secret: &str) -> bool {
    let Ok(expected) = hex::decode(signature_header.trim()) else {
        return false;
    };
    let mut mac = mac_for(secret);
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "key_secret_test";

    #[test]
    fn payment_signature_round_trips() {
        let sig = payment_signature("order_abc", "pay_123", SECRET);
        assert_eq!(sig.len(), 64);
        assert!(verify_payment_signature("order_abc", "pay_123", &sig, SECRET));
    }

    #[test]
    fn payment_signature_binds_both_references() {
        let sig = payment_signature("order_abc", "pay_123", SECRET);
        assert!(!verify_payment_signature("order_abc", "pay_124", &sig, SECRET));
        assert!(!verify_payment_signature("order_abd", "pay_123", &sig, SECRET));
        assert!(!verify_payment_signature("order_abc", "pay_123", &sig, "other_secret"));
    }

    #[test]
    fn payment_signature_separator_prevents_shifting() {
        let sig = payment_signature("order_a", "bpay", SECRET);
        assert!(!verify_payment_signature("order_ab", "pay", &sig, SECRET));
    }

    #[test]
    fn malformed_signatures_are_rejected() {
        assert!(!verify_payment_signature("o", "p", "not-hex", SECRET));
        assert!(!verify_payment_signature("o", "p", "", SECRET));
        assert!(!verify_webhook_signature(b"{}", "zz", SECRET));
    }

    #[test]
    fn webhook_signature_covers_raw_body() {
        let body = br#"{"event":"payment.captured"}"#;
        let sig = webhook_signature(body, "whsec");
        assert!(verify_webhook_signature(body, &sig, "whsec"));
        assert!(verify_webhook_signature(body, &sig.to_uppercase(), "whsec"));
        assert!(!verify_webhook_signature(br#"{"event":"payment.failed"}"#, &sig, "whsec"));
        assert!(!verify_webhook_signature(body, &sig, "other"));
    }

    #[tokio::test]
    async fn offline_gateway_issues_unique_references() {
        let gateway = OfflineGateway;
        let first = gateway.create_order(1000, "INR", "ORD1").await.unwrap();
        let second = gateway.create_order(1000, "INR", "ORD1").await.unwrap();
        assert!(first.id.starts_with("order_"));
        assert_ne!(first.id, second.id);
        assert_eq!(first.receipt, "ORD1");
    }
}
