use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entity::enums::{OrderStatus, PaymentMethod},
    models::{Order, OrderItem, Payment, StatusChange},
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub shipping_address_id: Uuid,
    pub billing_address_id: Uuid,
    #[serde(default = "default_payment_method")]
    pub payment_method: PaymentMethod,
    /// Client generated token. Retrying with the same key returns the same order.
    pub idempotency_key: String,
    pub customer_notes: Option<String>,
}

fn default_payment_method() -> PaymentMethod {
    PaymentMethod::Gateway
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderCreated {
    pub order_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub total_amount: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderCreated {
    fn from(order: &Order) -> Self {
        OrderCreated {
            order_id: order.id,
            order_number: order.order_number.clone(),
            status: order.status,
            payment_method: order.payment_method,
            total_amount: order.total_amount,
            expires_at: order.expires_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payment: Option<Payment>,
    pub history: Vec<StatusChange>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CancelOrderAck {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub stock_restored: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub carrier_name: Option<String>,
    pub notes: Option<String>,
}
