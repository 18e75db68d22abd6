use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{
    enums::{OrderStatus, PaymentMethod, PaymentStatus},
    order_items::Model as OrderItemModel,
    order_status_history::Model as HistoryModel,
    orders::Model as OrderModel,
    payments::Model as PaymentModel,
};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub subtotal: i64,
    pub tax_amount: i64,
    pub shipping_charge: i64,
    pub discount_amount: i64,
    pub total_amount: i64,
    pub shipping_address_id: Uuid,
    pub billing_address_id: Uuid,
    pub customer_notes: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier_name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub stock_deducted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub product_name: String,
    pub variant_details: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub total_price: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub amount: i64,
    pub currency: String,
    pub gateway_order_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatusChange {
    pub old_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub changed_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<OrderModel> for Order {
    fn from(model: OrderModel) -> Self {
        Order {
            id: model.id,
            order_number: model.order_number,
            user_id: model.user_id,
            status: model.status,
            payment_method: model.payment_method,
            subtotal: model.subtotal,
            tax_amount: model.tax_amount,
            shipping_charge: model.shipping_charge,
            discount_amount: model.discount_amount,
            total_amount: model.total_amount,
            shipping_address_id: model.shipping_address_id,
            billing_address_id: model.billing_address_id,
            customer_notes: model.customer_notes,
            tracking_number: model.tracking_number,
            carrier_name: model.carrier_name,
            expires_at: model.expires_at.map(|dt| dt.with_timezone(&Utc)),
            stock_deducted: model.stock_deducted,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<OrderItemModel> for OrderItem {
    fn from(model: OrderItemModel) -> Self {
        OrderItem {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            variant_id: model.variant_id,
            product_name: model.product_name,
            variant_details: model.variant_details,
            quantity: model.quantity,
            unit_price: model.unit_price,
            total_price: model.total_price,
        }
    }
}

impl From<PaymentModel> for Payment {
    fn from(model: PaymentModel) -> Self {
        Payment {
            id: model.id,
            order_id: model.order_id,
            payment_method: model.payment_method,
            payment_status: model.payment_status,
            amount: model.amount,
            currency: model.currency,
            gateway_order_id: model.gateway_order_id,
            paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

impl From<HistoryModel> for StatusChange {
    fn from(model: HistoryModel) -> Self {
        StatusChange {
            old_status: model.old_status,
            new_status: model.new_status,
            changed_by: model.changed_by,
            notes: model.notes,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}
