mod common;

use std::{sync::Arc, time::Duration};

use checkout_core::{
    config::{CheckoutSettings, ReservationMode},
    dto::{
        orders::{OrderCreated, UpdateOrderStatusRequest},
        stock::{StockCheckRequest, StockLine},
    },
    entity::{
        enums::{OrderStatus, PaymentMethod, PaymentStatus},
        product_variants::Entity as ProductVariants,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Order,
    response::ApiResponse,
    routes::params::OrderListQuery,
    services::{admin_service, order_service, stock_service},
    state::AppState,
};
use sea_orm::{EntityTrait, QuerySelect, TransactionTrait, sea_query::LockType};
use uuid::Uuid;

use common::*;

async fn create(
    state: &AppState,
    user: &AuthUser,
    address_id: Uuid,
    method: PaymentMethod,
    key: &str,
) -> AppResult<ApiResponse<OrderCreated>> {
    order_service::create_order(state, user, order_request(address_id, method, key)).await
}

async fn set_status(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    status: OrderStatus,
) -> AppResult<ApiResponse<Order>> {
    let request = UpdateOrderStatusRequest {
        status,
        tracking_number: None,
        carrier_name: None,
        notes: None,
    };
    admin_service::update_order_status(state, user, order_id, request).await
}

#[tokio::test]
async fn immediate_mode_reserves_on_creation_and_cancel_restores_once() -> anyhow::Result<()> {
    let Some(app) = setup(ReservationMode::Immediate).await? else {
        return Ok(());
    };
    let state = &app.state;
    let user = buyer();
    let variant_id = seed_variant(state, 5, 1_000).await?;

    let created = place_order(state, &user, variant_id, 2).await?;
    assert_eq!(created.status, OrderStatus::Pending);
    assert!(created.expires_at.is_some());
    assert!(created.order_number.starts_with("ORD"));
    // 2 x 1000 + 18% tax + flat shipping
    assert_eq!(created.total_amount, 2_000 + 360 + 10_000);
    assert_eq!(stock_of(state, variant_id).await?, 3);

    let cancelled = order_service::cancel_order(state, &user, created.order_id).await?;
    let ack = cancelled.data.unwrap();
    assert!(ack.stock_restored);
    assert_eq!(ack.status, OrderStatus::Cancelled);
    assert_eq!(stock_of(state, variant_id).await?, 5);

    let again = order_service::cancel_order(state, &user, created.order_id).await;
    assert!(matches!(again, Err(AppError::InvalidTransition { .. })));
    assert_eq!(stock_of(state, variant_id).await?, 5);

    let detail = order_service::get_order(state, &user, created.order_id)
        .await?
        .data
        .unwrap();
    let transitions: Vec<_> = detail.history.iter().map(|h| h.new_status).collect();
    assert_eq!(transitions, vec![OrderStatus::Pending, OrderStatus::Cancelled]);
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].variant_details, "Size: M, Color: Blue");
    Ok(())
}

#[tokio::test]
async fn same_idempotency_key_returns_same_order() -> anyhow::Result<()> {
    let Some(app) = setup(ReservationMode::Immediate).await? else {
        return Ok(());
    };
    let state = &app.state;
    let user = buyer();
    let variant_id = seed_variant(state, 4, 500).await?;
    let address_id = seed_address(state, user.user_id).await?;
    add_to_cart(state, user.user_id, variant_id, 1).await?;
    add_to_cart(state, user.user_id, variant_id, 2).await?;

    let key = Uuid::new_v4().to_string();
    let first = create(state, &user, address_id, PaymentMethod::Gateway, &key).await?;
    let second = create(state, &user, address_id, PaymentMethod::Gateway, &key).await?;

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.data.unwrap().order_id, second.data.unwrap().order_id);
    // Both cart lines collapsed into one deduction of 3, applied once.
    assert_eq!(stock_of(state, variant_id).await?, 1);
    Ok(())
}

#[tokio::test]
async fn order_creation_validates_cart_and_addresses() -> anyhow::Result<()> {
    let Some(app) = setup(ReservationMode::Immediate).await? else {
        return Ok(());
    };
    let state = &app.state;
    let user = buyer();
    let address_id = seed_address(state, user.user_id).await?;

    let empty = create(state, &user, address_id, PaymentMethod::Gateway, "empty").await;
    assert!(matches!(empty, Err(AppError::EmptyCart)));

    let variant_id = seed_variant(state, 1, 700).await?;
    add_to_cart(state, user.user_id, variant_id, 1).await?;
    let stranger = buyer();
    let foreign_address = seed_address(state, stranger.user_id).await?;
    let wrong_address =
        create(state, &user, foreign_address, PaymentMethod::Gateway, "addr").await;
    assert!(matches!(wrong_address, Err(AppError::AddressNotFound)));

    add_to_cart(state, user.user_id, variant_id, 1).await?;
    let short = create(state, &user, address_id, PaymentMethod::Gateway, "short").await;
    assert!(matches!(
        short,
        Err(AppError::InsufficientStock { available: 1, requested: 2, .. })
    ));
    assert_eq!(stock_of(state, variant_id).await?, 1);
    Ok(())
}

#[tokio::test]
async fn lock_wait_timeout_aborts_without_side_effects() -> anyhow::Result<()> {
    let Some(mut app) = setup(ReservationMode::Immediate).await? else {
        return Ok(());
    };
    app.state.checkout = Arc::new(CheckoutSettings {
        lock_timeout: Duration::from_millis(200),
        ..CheckoutSettings::clone(&app.state.checkout)
    });
    let state = &app.state;
    let user = buyer();
    let variant_id = seed_variant(state, 5, 1_000).await?;
    let address_id = seed_address(state, user.user_id).await?;
    add_to_cart(state, user.user_id, variant_id, 2).await?;

    let holder = state.orm.begin().await?;
    ProductVariants::find_by_id(variant_id)
        .lock(LockType::Update)
        .one(&holder)
        .await?;

    let blocked = create(state, &user, address_id, PaymentMethod::Gateway, "held").await;
    assert!(matches!(blocked, Err(AppError::LockTimeout)));
    holder.rollback().await?;

    assert_eq!(stock_of(state, variant_id).await?, 5);
    let listed = order_service::list_orders(state, &user, OrderListQuery::default()).await?;
    assert!(listed.data.unwrap().items.is_empty());

    // Cart and key were left untouched, so the same request now goes through.
    let retried = create(state, &user, address_id, PaymentMethod::Gateway, "held").await?;
    assert!(!retried.replayed);
    assert_eq!(stock_of(state, variant_id).await?, 3);
    Ok(())
}

#[tokio::test]
async fn cash_on_delivery_confirms_immediately_even_when_deferred() -> anyhow::Result<()> {
    let Some(app) = setup(ReservationMode::Deferred).await? else {
        return Ok(());
    };
    let state = &app.state;
    let user = buyer();
    let variant_id = seed_variant(state, 3, 1_500).await?;
    let address_id = seed_address(state, user.user_id).await?;
    add_to_cart(state, user.user_id, variant_id, 1).await?;

    let created = create(state, &user, address_id, PaymentMethod::Cod, "cod")
        .await?
        .data
        .unwrap();
    assert_eq!(created.status, OrderStatus::Confirmed);
    assert!(created.expires_at.is_none());
    assert_eq!(stock_of(state, variant_id).await?, 2);

    let detail = order_service::get_order(state, &user, created.order_id)
        .await?
        .data
        .unwrap();
    let payment = detail.payment.expect("cod payment row");
    assert_eq!(payment.payment_method, PaymentMethod::Cod);
    assert_eq!(payment.payment_status, PaymentStatus::Pending);
    assert!(detail.order.stock_deducted);
    Ok(())
}

#[tokio::test]
async fn shipped_orders_cannot_be_cancelled() -> anyhow::Result<()> {
    let Some(app) = setup(ReservationMode::Immediate).await? else {
        return Ok(());
    };
    let state = &app.state;
    let user = buyer();
    let ops = admin();
    let variant_id = seed_variant(state, 2, 900).await?;
    let address_id = seed_address(state, user.user_id).await?;
    add_to_cart(state, user.user_id, variant_id, 1).await?;
    let order = create(state, &user, address_id, PaymentMethod::Cod, "ship")
        .await?
        .data
        .unwrap();

    let forbidden = set_status(state, &user, order.order_id, OrderStatus::Processing).await;
    assert!(matches!(forbidden, Err(AppError::Forbidden)));

    set_status(state, &ops, order.order_id, OrderStatus::Processing).await?;
    let shipped = admin_service::update_order_status(
        state,
        &ops,
        order.order_id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Shipped,
            tracking_number: Some("TRK123".into()),
            carrier_name: Some("BlueDart".into()),
            notes: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(shipped.tracking_number.as_deref(), Some("TRK123"));

    let by_user = order_service::cancel_order(state, &user, order.order_id).await;
    assert!(matches!(
        by_user,
        Err(AppError::InvalidTransition {
            from: OrderStatus::Shipped,
            to: OrderStatus::Cancelled
        })
    ));
    let by_admin = set_status(state, &ops, order.order_id, OrderStatus::Cancelled).await;
    assert!(matches!(by_admin, Err(AppError::InvalidTransition { .. })));
    assert_eq!(stock_of(state, variant_id).await?, 1);

    set_status(state, &ops, order.order_id, OrderStatus::Delivered).await?;
    let delivered = order_service::cancel_order(state, &user, order.order_id).await;
    assert!(matches!(delivered, Err(AppError::InvalidTransition { .. })));
    assert_eq!(stock_of(state, variant_id).await?, 1);
    Ok(())
}

#[tokio::test]
async fn listing_is_scoped_to_the_caller() -> anyhow::Result<()> {
    let Some(app) = setup(ReservationMode::Immediate).await? else {
        return Ok(());
    };
    let state = &app.state;
    let user = buyer();
    let variant_id = seed_variant(state, 10, 100).await?;
    place_order(state, &user, variant_id, 1).await?;
    place_order(state, &user, variant_id, 1).await?;
    place_order(state, &buyer(), variant_id, 1).await?;

    let list = order_service::list_orders(state, &user, OrderListQuery::default()).await?;
    assert_eq!(list.data.unwrap().items.len(), 2);
    assert_eq!(list.meta.unwrap().total, Some(2));

    let confirmed = order_service::list_orders(
        state,
        &user,
        OrderListQuery {
            status: Some(OrderStatus::Confirmed),
            ..OrderListQuery::default()
        },
    )
    .await?;
    assert!(confirmed.data.unwrap().items.is_empty());

    let other = order_service::get_order(state, &buyer(), Uuid::new_v4()).await;
    assert!(matches!(other, Err(AppError::NotFound)));
    Ok(())
}

#[tokio::test]
async fn stock_check_reports_shortages_without_locking() -> anyhow::Result<()> {
    let Some(app) = setup(ReservationMode::Immediate).await? else {
        return Ok(());
    };
    let state = &app.state;
    let plenty = seed_variant(state, 10, 100).await?;
    let scarce = seed_variant(state, 1, 100).await?;
    let missing = Uuid::new_v4();

    let resp = stock_service::check_stock(
        state,
        StockCheckRequest {
            items: vec![
                StockLine { variant_id: plenty, quantity: 3 },
                StockLine { variant_id: scarce, quantity: 2 },
                StockLine { variant_id: missing, quantity: 1 },
            ],
        },
    )
    .await?
    .data
    .unwrap();

    assert!(!resp.available);
    assert_eq!(resp.insufficient_items.len(), 2);
    let short = |id: Uuid, available: i32| {
        resp.insufficient_items
            .iter()
            .any(|i| i.variant_id == id && i.available_quantity == available)
    };
    assert!(short(scarce, 1));
    assert!(short(missing, 0));
    assert_eq!(stock_of(state, scarce).await?, 1);
    Ok(())
}
