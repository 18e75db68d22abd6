use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::enums::{OrderStatus, PaymentStatus};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreatePaymentOrderRequest {
    pub order_id: Uuid,
}

/// What the storefront needs to open the gateway checkout.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentOrder {
    pub order_number: String,
    pub gateway_order_id: String,
    pub gateway_key_id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VerifyPaymentRequest {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentVerified {
    pub order_number: String,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// The event changed payment or order state.
    Applied,
    /// The payment had already succeeded. Nothing was touched.
    Duplicate,
    /// Unknown event, unknown payment or unparsable payload.
    Ignored,
    /// Recognised but refused, e.g. stock ran out or the order was cancelled.
    Rejected,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookAck {
    pub outcome: WebhookOutcome,
    pub order_number: Option<String>,
}
