use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        orders::{CancelOrderAck, CreateOrderRequest, OrderCreated, OrderDetail, OrderList, UpdateOrderStatusRequest},
        payments::{
            CreatePaymentOrderRequest, PaymentOrder, PaymentVerified, VerifyPaymentRequest, WebhookAck,
            WebhookOutcome,
        },
        stock::{InsufficientStockItem, StockCheckRequest, StockCheckResponse, StockLine},
    },
    entity::enums::{OrderStatus, PaymentMethod, PaymentStatus},
    models::{Order, OrderItem, Payment, StatusChange},
    response::{ApiResponse, Meta},
    routes::{admin, health, orders, params, payments, stock},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::cancel_order,
        payments::create_payment_order,
        payments::verify_payment,
        payments::webhook,
        stock::check_stock,
        admin::update_order_status
    ),
    components(
        schemas(
            Order,
            OrderItem,
            Payment,
            StatusChange,
            OrderStatus,
            PaymentStatus,
            PaymentMethod,
            CreateOrderRequest,
            OrderCreated,
            OrderDetail,
            OrderList,
            CancelOrderAck,
            UpdateOrderStatusRequest,
            CreatePaymentOrderRequest,
            PaymentOrder,
            VerifyPaymentRequest,
            PaymentVerified,
            WebhookAck,
            WebhookOutcome,
            StockLine,
            StockCheckRequest,
            StockCheckResponse,
            InsufficientStockItem,
            params::OrderListQuery,
            params::SortOrder,
            health::HealthData,
            Meta,
            ApiResponse<OrderCreated>,
            ApiResponse<OrderDetail>,
            ApiResponse<OrderList>,
            ApiResponse<PaymentOrder>,
            ApiResponse<PaymentVerified>,
            ApiResponse<StockCheckResponse>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Orders", description = "Order creation, tracking and cancellation"),
        (name = "Payments", description = "Gateway payment orders, verification and webhooks"),
        (name = "Stock", description = "Stock availability"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_checkout_routes() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/orders",
            "/api/orders/{id}/cancel",
            "/api/payments/verify",
            "/api/payments/webhook",
            "/api/stock/check",
            "/api/admin/orders/{id}/status",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
