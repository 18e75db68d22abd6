#![allow(dead_code)]

use std::sync::Arc;

use checkout_core::{
    config::{CheckoutSettings, GatewaySettings, ReservationMode},
    db::{create_pool, orm_from_pool, run_migrations},
    dto::{
        orders::{CreateOrderRequest, OrderCreated},
        payments::{CreatePaymentOrderRequest, PaymentOrder},
    },
    entity::{
        addresses::ActiveModel as AddressActive,
        cart_items::ActiveModel as CartActive,
        enums::PaymentMethod,
        product_variants::{ActiveModel as VariantActive, Entity as ProductVariants},
        products::ActiveModel as ProductActive,
    },
    gateway::{OfflineGateway, payment_signature, webhook_signature},
    middleware::auth::AuthUser,
    notifications::{Notification, Notifier},
    services::{order_service, payment_service},
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use tokio::sync::{OnceCell, mpsc};
use uuid::Uuid;

pub const KEY_SECRET: &str = "test_key_secret";
pub const WEBHOOK_SECRET: &str = "test_webhook_secret";

static MIGRATED: OnceCell<()> = OnceCell::const_new();

pub struct TestApp {
    pub state: AppState,
    pub notifications: mpsc::Receiver<Notification>,
}

pub fn database_url() -> Option<String> {
    match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration tests."
            );
            None
        }
    }
}

/// Every test gets its own pool (pools are bound to the test's runtime) and
/// creates its own rows, so tests can run in parallel without truncating.
pub async fn setup(mode: ReservationMode) -> anyhow::Result<Option<TestApp>> {
    let Some(url) = database_url() else {
        return Ok(None);
    };
    let pool = create_pool(&url).await?;
    let orm = orm_from_pool(&pool);
    MIGRATED
        .get_or_try_init(|| async { run_migrations(&orm).await })
        .await?;

    let checkout = CheckoutSettings {
        reservation_mode: mode,
        ..CheckoutSettings::default()
    };
    let (notifier, notifications) = Notifier::channel(64);
    let state = AppState {
        pool,
        orm,
        checkout: Arc::new(checkout),
        gateway_settings: Arc::new(GatewaySettings {
            key_id: "key_test".into(),
            key_secret: KEY_SECRET.into(),
            webhook_secret: WEBHOOK_SECRET.into(),
        }),
        gateway: Arc::new(OfflineGateway),
        notifier,
    };
    Ok(Some(TestApp {
        state,
        notifications,
    }))
}

pub fn buyer() -> AuthUser {
    AuthUser {
        user_id: Uuid::new_v4(),
        role: "user".into(),
    }
}

pub fn admin() -> AuthUser {
    AuthUser {
        user_id: Uuid::new_v4(),
        role: "admin".into(),
    }
}

/// A product with one variant. Returns the variant id.
pub async fn seed_variant(state: &AppState, stock: i32, base_price: i64) -> anyhow::Result<Uuid> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set("Oxford Shirt".into()),
        base_price: Set(base_price),
        sale_price: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let id = Uuid::new_v4();
    let variant = VariantActive {
        id: Set(id),
        product_id: Set(product.id),
        sku: Set(format!("OX-{}", id.simple())),
        size: Set("M".into()),
        color: Set(Some("Blue".into())),
        stock_quantity: Set(stock),
        additional_price: Set(0),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(variant.id)
}

pub async fn seed_address(state: &AppState, user_id: Uuid) -> anyhow::Result<Uuid> {
    let address = AddressActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        full_name: Set("Test Buyer".into()),
        phone: Set("9000000000".into()),
        address_line1: Set("1 Test Street".into()),
        address_line2: Set(None),
        city: Set("Pune".into()),
        state: Set("Maharashtra".into()),
        pincode: Set("411001".into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(address.id)
}

pub async fn add_to_cart(
    state: &AppState,
    user_id: Uuid,
    variant_id: Uuid,
    quantity: i32,
) -> anyhow::Result<()> {
    CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        variant_id: Set(variant_id),
        quantity: Set(quantity),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(())
}

pub async fn stock_of(state: &AppState, variant_id: Uuid) -> anyhow::Result<i32> {
    let variant = ProductVariants::find_by_id(variant_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("variant {variant_id} missing"))?;
    Ok(variant.stock_quantity)
}

pub fn order_request(address_id: Uuid, method: PaymentMethod, key: &str) -> CreateOrderRequest {
    CreateOrderRequest {
        shipping_address_id: address_id,
        billing_address_id: address_id,
        payment_method: method,
        idempotency_key: key.into(),
        customer_notes: None,
    }
}

/// Cart with `quantity` of `variant_id`, then a gateway order for it.
pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    variant_id: Uuid,
    quantity: i32,
) -> anyhow::Result<OrderCreated> {
    let address_id = seed_address(state, user.user_id).await?;
    add_to_cart(state, user.user_id, variant_id, quantity).await?;
    let resp = order_service::create_order(
        state,
        user,
        order_request(address_id, PaymentMethod::Gateway, &Uuid::new_v4().to_string()),
    )
    .await?;
    resp.data.ok_or_else(|| anyhow::anyhow!("no order in response"))
}

pub async fn open_payment(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> anyhow::Result<PaymentOrder> {
    let request = CreatePaymentOrderRequest { order_id };
    let resp = payment_service::create_payment_order(state, user, request).await?;
    resp.data.ok_or_else(|| anyhow::anyhow!("no payment order in response"))
}

pub fn checkout_signature(gateway_order_id: &str, gateway_payment_id: &str) -> String {
    payment_signature(gateway_order_id, gateway_payment_id, KEY_SECRET)
}

pub fn webhook_body(
    event: &str,
    gateway_order_id: &str,
    gateway_payment_id: &str,
) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(&serde_json::json!({
        "event": event,
        "payload": {
            "payment": {
                "entity": {
                    "id": gateway_payment_id,
                    "order_id": gateway_order_id,
                    "status": if event == "payment.captured" { "captured" } else { "failed" },
                }
            }
        }
    }))
    .unwrap_or_default();
    let signature = webhook_signature(&body, WEBHOOK_SECRET);
    (body, signature)
}
