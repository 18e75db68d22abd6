use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rand::Rng;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, Statement, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    config::ReservationMode,
    db::{begin_locking, violates_unique},
    dto::orders::{CancelOrderAck, CreateOrderRequest, OrderCreated, OrderDetail, OrderList},
    entity::{
        addresses::{Column as AddressCol, Entity as Addresses},
        cart_items::{Column as CartCol, Entity as CartItems},
        enums::{OrderStatus, PaymentMethod, PaymentStatus},
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        order_status_history::{Column as HistoryCol, Entity as OrderStatusHistory},
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        payments::{ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Order,
    notifications::Notification,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{
        inventory_service::{LockedVariants, collapse},
        pricing,
        reservation_service::{self, record_transition, transition},
    },
    state::AppState,
};

const ORDER_NUMBER_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ORDER_NUMBER_CONSTRAINT: &str = "uq_orders_order_number";
const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderCreated>> {
    let key = payload.idempotency_key.trim().to_string();
    if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(AppError::BadRequest(format!(
            "idempotency_key must be 1 to {MAX_IDEMPOTENCY_KEY_LEN} characters"
        )));
    }

    let settings = state.checkout.as_ref();
    let txn = begin_locking(&state.orm, settings.lock_timeout).await?;

    lock_idempotency_key(&txn, user.user_id, &key).await?;
    let existing = Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
        .filter(OrderCol::IdempotencyKey.eq(key.as_str()))
        .one(&txn)
        .await?;
    if let Some(existing) = existing {
        txn.rollback().await?;
        tracing::info!(order_id = %existing.id, user_id = %user.user_id, "order creation replayed");
        let order = Order::from(existing);
        return Ok(ApiResponse::replayed("Order already exists", OrderCreated::from(&order)));
    }

    let cart = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_asc(CartCol::Id)
        .lock(LockType::Update)
        .all(&txn)
        .await?;
    if cart.is_empty() {
        return Err(AppError::EmptyCart);
    }

    ensure_own_address(&txn, user.user_id, payload.shipping_address_id).await?;
    ensure_own_address(&txn, user.user_id, payload.billing_address_id).await?;

    let wanted = collapse(cart.iter().map(|item| (item.variant_id, item.quantity)))?;
    let mut locked = LockedVariants::acquire(&txn, wanted.keys().copied()).await?;
    locked.ensure_available(&wanted)?;

    let product_ids: BTreeSet<Uuid> = locked.iter().map(|variant| variant.product_id).collect();
    let products: HashMap<Uuid, ProductModel> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .all(&txn)
        .await?
        .into_iter()
        .map(|product| (product.id, product))
        .collect();

    let order_id = Uuid::new_v4();
    let now = Utc::now();
    let mut items = Vec::with_capacity(wanted.len());
    let mut subtotal: i64 = 0;
    for (&variant_id, &quantity) in &wanted {
        let variant = locked.get(variant_id).ok_or(AppError::VariantNotFound(variant_id))?;
        let product = products
            .get(&variant.product_id)
            .ok_or(AppError::VariantNotFound(variant_id))?;
        let unit_price = pricing::unit_price(product, variant);
        let total_price = unit_price * i64::from(quantity);
        subtotal += total_price;
        items.push(OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(product.id),
            variant_id: Set(variant_id),
            product_name: Set(product.name.clone()),
            variant_details: Set(variant.details()),
            quantity: Set(quantity),
            unit_price: Set(unit_price),
            total_price: Set(total_price),
            created_at: Set(now.into()),
        });
    }
    let totals = pricing::totals(subtotal, settings);

    // No later settlement step exists for cash on delivery.
    let reserve_now = payload.payment_method == PaymentMethod::Cod
        || settings.reservation_mode == ReservationMode::Immediate;
    if reserve_now {
        locked.deduct_all(&txn, &wanted).await?;
    }

    let template = OrderActive {
        id: Set(order_id),
        order_number: NotSet,
        user_id: Set(user.user_id),
        status: Set(OrderStatus::Pending),
        payment_method: Set(payload.payment_method),
        subtotal: Set(totals.subtotal),
        tax_amount: Set(totals.tax_amount),
        shipping_charge: Set(totals.shipping_charge),
        discount_amount: Set(totals.discount_amount),
        total_amount: Set(totals.total_amount),
        shipping_address_id: Set(payload.shipping_address_id),
        billing_address_id: Set(payload.billing_address_id),
        customer_notes: Set(payload.customer_notes.clone()),
        tracking_number: Set(None),
        carrier_name: Set(None),
        expires_at: Set(Some((now + settings.reservation_window).into())),
        stock_deducted: Set(reserve_now),
        idempotency_key: Set(key.clone()),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    let mut order =
        insert_with_order_number(&txn, template, settings.order_number_attempts, now).await?;

    for item in items {
        item.insert(&txn).await?;
    }
    record_transition(
        &txn,
        order.id,
        None,
        OrderStatus::Pending,
        Some(user.user_id),
        Some("Order placed".into()),
    )
    .await?;

    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;

    if order.payment_method == PaymentMethod::Cod {
        order = transition(
            &txn,
            order,
            OrderStatus::Confirmed,
            Some(user.user_id),
            Some("Cash on delivery".into()),
            |active| active.expires_at = Set(None),
        )
        .await?;
        PaymentActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            payment_method: Set(PaymentMethod::Cod),
            payment_status: Set(PaymentStatus::Pending),
            amount: Set(order.total_amount),
            currency: Set(settings.currency.clone()),
            gateway_order_id: Set(None),
            gateway_payment_id: Set(None),
            gateway_signature: Set(None),
            paid_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;
    }

    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        user_id = %user.user_id,
        stock_deducted = order.stock_deducted,
        total_amount = order.total_amount,
        "order created"
    );
    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::OrderCreated,
        serde_json::json!({ "order_id": order.id, "order_number": order.order_number }),
    )
    .await;

    if order.status == OrderStatus::Confirmed {
        state.notifier.notify(Notification::OrderConfirmed {
            order_id: order.id,
            order_number: order.order_number.clone(),
            user_id: order.user_id,
        });
    }

    let order = Order::from(order);
    Ok(ApiResponse::success(
        "Order created",
        OrderCreated::from(&order),
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    let payment = Payments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .one(&state.orm)
        .await?
        .map(Into::into);

    let history = OrderStatusHistory::find()
        .filter(HistoryCol::OrderId.eq(order.id))
        .order_by_asc(HistoryCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderDetail {
            order: order.into(),
            items,
            payment,
            history,
        },
        Some(Meta::empty()),
    ))
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<CancelOrderAck>> {
    let owned = Orders::find()
        .filter(OrderCol::Id.eq(id))
        .filter(OrderCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?;
    if owned.is_none() {
        return Err(AppError::NotFound);
    }

    let txn = begin_locking(&state.orm, state.checkout.lock_timeout).await?;
    let released = reservation_service::cancel(
        &txn,
        id,
        Some(user.user_id),
        Some("Cancelled by customer".into()),
    )
    .await?;
    txn.commit().await?;

    tracing::info!(
        order_id = %id,
        stock_restored = released.stock_restored,
        "order cancelled by customer"
    );
    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::OrderCancelled,
        serde_json::json!({ "order_id": id, "stock_restored": released.stock_restored }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order cancelled",
        CancelOrderAck {
            order_id: id,
            status: released.order.status,
            stock_restored: released.stock_restored,
        },
        Some(Meta::empty()),
    ))
}

/// Serializes attempts with the same `(user, key)` until the transaction ends.
async fn lock_idempotency_key(
    txn: &DatabaseTransaction,
    user_id: Uuid,
    key: &str,
) -> AppResult<()> {
    let backend = txn.get_database_backend();
    txn.execute(Statement::from_sql_and_values(
        backend,
        "SELECT pg_advisory_xact_lock(hashtextextended($1, 0))",
        [format!("{user_id}:{key}").into()],
    ))
    .await?;
    Ok(())
}

async fn ensure_own_address(
    txn: &DatabaseTransaction,
    user_id: Uuid,
    address_id: Uuid,
) -> AppResult<()> {
    Addresses::find()
        .filter(AddressCol::Id.eq(address_id))
        .filter(AddressCol::UserId.eq(user_id))
        .one(txn)
        .await?
        .map(|_| ())
        .ok_or(AppError::AddressNotFound)
}

/// Insert under a savepoint, drawing a new number whenever the unique index rejects one.
async fn insert_with_order_number(
    txn: &DatabaseTransaction,
    template: OrderActive,
    attempts: u32,
    now: DateTime<Utc>,
) -> AppResult<OrderModel> {
    for attempt in 1..=attempts.max(1) {
        let number = build_order_number(now);
        let mut active = template.clone();
        active.order_number = Set(number.clone());

        let savepoint = txn.begin().await?;
        match active.insert(&savepoint).await {
            Ok(order) => {
                savepoint.commit().await?;
                return Ok(order);
            }
            Err(err) if violates_unique(&err, ORDER_NUMBER_CONSTRAINT) => {
                savepoint.rollback().await?;
                tracing::warn!(attempt, order_number = %number, "order number collision");
            }
            Err(err) => return Err(err.into()),
        }
    }
    tracing::error!(attempts, "could not allocate a unique order number");
    Err(AppError::OrderNumberExhausted)
}

/// `ORD` + `YYYYMMDD` + eight characters from `[A-Z0-9]`.
pub fn build_order_number(date: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| ORDER_NUMBER_ALPHABET[rng.gen_range(0..ORDER_NUMBER_ALPHABET.len())] as char)
        .collect();
    format!("ORD{}{}", date.format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn order_number_has_date_and_suffix() {
        let date = Utc.with_ymd_and_hms(2026, 3, 9, 23, 59, 0).unwrap();
        let number = build_order_number(date);
        assert_eq!(number.len(), 19);
        assert!(number.starts_with("ORD20260309"));
        assert!(
            number[11..]
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        );
    }

    #[test]
    fn order_numbers_vary() {
        let date = Utc::now();
        let numbers: BTreeSet<String> = (0..50).map(|_| build_order_number(date)).collect();
        assert!(numbers.len() > 45);
    }
}
