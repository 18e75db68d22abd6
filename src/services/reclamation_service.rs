use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    db::begin_locking,
    entity::{
        enums::OrderStatus,
        orders::{Column as OrderCol, Entity as Orders},
    },
    error::AppResult,
    services::{
        inventory_service::{LockedVariants, quantities_for_order},
        reservation_service::{is_expired, lock_order, release_locked},
    },
    state::AppState,
};

/// Cancel every pending order whose reservation has lapsed. Returns how many were reclaimed.
///
/// Each order is handled in its own transaction; a failure is logged and the
/// sweep moves on.
pub async fn reclaim_expired_orders(state: &AppState) -> AppResult<usize> {
    let settings = state.checkout.as_ref();
    let now = Utc::now();
    let fallback_cutoff = now - settings.pending_fallback;
    let batch_size = settings.sweep_batch_size.max(1);

    let mut reclaimed = 0usize;
    loop {
        let candidates: Vec<Uuid> = Orders::find()
            .select_only()
            .column(OrderCol::Id)
            .filter(OrderCol::Status.eq(OrderStatus::Pending))
            .filter(
                Condition::any()
                    .add(OrderCol::ExpiresAt.lt(now))
                    .add(
                        Condition::all()
                            .add(OrderCol::ExpiresAt.is_null())
                            .add(OrderCol::CreatedAt.lt(fallback_cutoff)),
                    ),
            )
            .order_by_asc(OrderCol::CreatedAt)
            .limit(batch_size)
            .into_tuple()
            .all(&state.orm)
            .await?;

        let fetched = candidates.len();
        let mut progressed = 0usize;
        for order_id in candidates {
            match reclaim_one(state, order_id, now).await {
                Ok(true) => progressed += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(error = %err, %order_id, "failed to reclaim order");
                }
            }
        }
        reclaimed += progressed;

        // Rows that failed stay selectable; stop instead of spinning on them.
        if (fetched as u64) < batch_size || progressed == 0 {
            break;
        }
    }

    Ok(reclaimed)
}

async fn reclaim_one(state: &AppState, order_id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
    let settings = state.checkout.as_ref();
    let txn = begin_locking(&state.orm, settings.lock_timeout).await?;

    let quantities = quantities_for_order(&txn, order_id).await?;
    let mut locked = LockedVariants::acquire(&txn, quantities.keys().copied()).await?;
    let Some(order) = lock_order(&txn, order_id).await? else {
        return Ok(false);
    };
    // Settlement may have confirmed it since the candidate query ran.
    if !is_expired(&order, now, settings.pending_fallback) {
        return Ok(false);
    }

    let released = release_locked(
        &txn,
        order,
        &mut locked,
        &quantities,
        None,
        Some("Reservation expired".into()),
    )
    .await?;
    txn.commit().await?;

    tracing::info!(
        %order_id,
        order_number = %released.order.order_number,
        stock_restored = released.stock_restored,
        "expired order reclaimed"
    );
    audit::record(
        &state.pool,
        None,
        AuditAction::OrderExpired,
        serde_json::json!({ "order_id": order_id, "stock_restored": released.stock_restored }),
    )
    .await;

    Ok(true)
}

/// Runs [`reclaim_expired_orders`] on a fixed interval until cancelled.
pub struct ReclamationWorker {
    state: AppState,
    interval: Duration,
}

impl ReclamationWorker {
    pub fn new(state: AppState) -> Self {
        let interval = state.checkout.sweep_interval;
        Self { state, interval }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.interval.as_secs(), "reclamation worker started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match reclaim_expired_orders(&self.state).await {
                        Ok(0) => tracing::debug!("no expired orders"),
                        Ok(count) => tracing::info!(count, "expired orders reclaimed"),
                        Err(err) => tracing::error!(error = %err, "reclamation sweep failed"),
                    }
                }
            }
        }

        tracing::info!("reclamation worker stopped");
    }
}
