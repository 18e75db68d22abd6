//! Order state transitions and stock release.
//!
//! `stock_deducted` is the only thing consulted before restoring stock. It flips
//! to false in the same transaction as the restore, so a second cancellation or
//! sweep has nothing left to give back.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use sea_orm::{
    ActiveModelTrait, DatabaseTransaction, EntityTrait, QuerySelect, Set, sea_query::LockType,
};
use uuid::Uuid;

use crate::{
    entity::{
        enums::OrderStatus,
        order_status_history::ActiveModel as HistoryActive,
        orders::{ActiveModel as OrderActive, Entity as Orders, Model as OrderModel},
    },
    error::{AppError, AppResult},
    services::inventory_service::{LockedVariants, quantities_for_order},
};

pub fn ensure_transition(from: OrderStatus, to: OrderStatus) -> AppResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition { from, to })
    }
}

/// Pending order past its deadline, or with no deadline and older than `fallback`.
pub fn is_expired(order: &OrderModel, now: DateTime<Utc>, fallback: TimeDelta) -> bool {
    if order.status != OrderStatus::Pending {
        return false;
    }
    match order.expires_at {
        Some(expires_at) => expires_at.with_timezone(&Utc) < now,
        None => order.created_at.with_timezone(&Utc) < now - fallback,
    }
}

pub async fn lock_order(
    txn: &DatabaseTransaction,
    order_id: Uuid,
) -> AppResult<Option<OrderModel>> {
    let order = Orders::find_by_id(order_id)
        .lock(LockType::Update)
        .one(txn)
        .await?;
    Ok(order)
}

pub async fn record_transition(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    old_status: Option<OrderStatus>,
    new_status: OrderStatus,
    changed_by: Option<Uuid>,
    notes: Option<String>,
) -> AppResult<()> {
    HistoryActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        old_status: Set(old_status),
        new_status: Set(new_status),
        changed_by: Set(changed_by),
        notes: Set(notes),
        created_at: Set(Utc::now().into()),
    }
    .insert(txn)
    .await?;
    Ok(())
}

/// Move a locked order to `to`, applying `edit` to the same update, and log it.
pub async fn transition<F>(
    txn: &DatabaseTransaction,
    order: OrderModel,
    to: OrderStatus,
    changed_by: Option<Uuid>,
    notes: Option<String>,
    edit: F,
) -> AppResult<OrderModel>
where
    F: FnOnce(&mut OrderActive),
{
    let from = order.status;
    ensure_transition(from, to)?;

    let order_id = order.id;
    let mut active: OrderActive = order.into();
    active.status = Set(to);
    active.updated_at = Set(Utc::now().into());
    edit(&mut active);
    let updated = active.update(txn).await?;

    record_transition(txn, order_id, Some(from), to, changed_by, notes).await?;
    tracing::debug!(%order_id, %from, %to, "order status changed");
    Ok(updated)
}

#[derive(Debug)]
pub struct Released {
    pub order: OrderModel,
    pub stock_restored: bool,
}

/// Cancel an order whose variants and row are already locked.
pub async fn release_locked(
    txn: &DatabaseTransaction,
    order: OrderModel,
    locked: &mut LockedVariants,
    quantities: &BTreeMap<Uuid, i32>,
    changed_by: Option<Uuid>,
    notes: Option<String>,
) -> AppResult<Released> {
    ensure_transition(order.status, OrderStatus::Cancelled)?;

    let stock_restored = order.stock_deducted;
    if stock_restored {
        locked.restore_all(txn, quantities).await?;
    }

    let order = transition(txn, order, OrderStatus::Cancelled, changed_by, notes, |active| {
        active.stock_deducted = Set(false);
        active.expires_at = Set(None);
    })
    .await?;

    Ok(Released {
        order,
        stock_restored,
    })
}

/// Lock in the global order (variants ascending, then the order row) and cancel.
pub async fn cancel(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    changed_by: Option<Uuid>,
    notes: Option<String>,
) -> AppResult<Released> {
    let quantities = quantities_for_order(txn, order_id).await?;
    let mut locked = LockedVariants::acquire(txn, quantities.keys().copied()).await?;
    let order = lock_order(txn, order_id).await?.ok_or(AppError::NotFound)?;
    release_locked(txn, order, &mut locked, &quantities, changed_by, notes).await
}
