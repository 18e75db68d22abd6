//! Per-variant stock counters and the locking discipline around them.
//!
//! Every reservation decision goes through [`LockedVariants`]: rows are locked
//! `FOR UPDATE` one at a time in ascending id order, so two transactions that
//! need overlapping variants always queue instead of deadlocking.

use std::collections::{BTreeMap, BTreeSet};

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QuerySelect,
    Set, sea_query::LockType,
};
use uuid::Uuid;

use crate::{
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        product_variants::{
            ActiveModel as VariantActive, Entity as ProductVariants, Model as VariantModel,
        },
    },
    error::{AppError, AppResult},
};

/// A requested quantity that the shelf cannot cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortage {
    pub variant_id: Uuid,
    pub available: i32,
    pub requested: i32,
}

impl From<Shortage> for AppError {
    fn from(s: Shortage) -> Self {
        AppError::InsufficientStock {
            variant_id: s.variant_id,
            available: s.available,
            requested: s.requested,
        }
    }
}

/// Sum lines per variant. Rejects non-positive quantities.
pub fn collapse<I>(lines: I) -> AppResult<BTreeMap<Uuid, i32>>
where
    I: IntoIterator<Item = (Uuid, i32)>,
{
    let mut totals = BTreeMap::new();
    for (variant_id, quantity) in lines {
        if quantity <= 0 {
            return Err(AppError::BadRequest(format!(
                "Quantity for variant {variant_id} must be positive"
            )));
        }
        let entry = totals.entry(variant_id).or_insert(0i32);
        *entry = entry
            .checked_add(quantity)
            .ok_or_else(|| AppError::BadRequest("Quantity is too large".into()))?;
    }
    Ok(totals)
}

/// Every line whose request exceeds the level. Unknown variants count as zero stock.
pub fn shortages(levels: &BTreeMap<Uuid, i32>, wanted: &BTreeMap<Uuid, i32>) -> Vec<Shortage> {
    wanted
        .iter()
        .filter_map(|(&variant_id, &requested)| {
            let available = levels.get(&variant_id).copied().unwrap_or(0);
            (requested > available).then_some(Shortage {
                variant_id,
                available,
                requested,
            })
        })
        .collect()
}

/// Quantities per variant recorded on an order's lines.
pub async fn quantities_for_order(
    txn: &DatabaseTransaction,
    order_id: Uuid,
) -> AppResult<BTreeMap<Uuid, i32>> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(txn)
        .await?;
    collapse(items.into_iter().map(|item| (item.variant_id, item.quantity)))
}

/// Variant rows held under `FOR UPDATE` for the lifetime of the transaction.
#[derive(Debug)]
pub struct LockedVariants {
    rows: BTreeMap<Uuid, VariantModel>,
}

impl LockedVariants {
    pub async fn acquire<I>(txn: &DatabaseTransaction, ids: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = Uuid>,
    {
        let ordered: BTreeSet<Uuid> = ids.into_iter().collect();
        let mut rows = BTreeMap::new();
        // One statement per row: a multi-row FOR UPDATE does not guarantee lock order.
        for id in ordered {
            let row = ProductVariants::find_by_id(id)
                .lock(LockType::Update)
                .one(txn)
                .await?
                .ok_or(AppError::VariantNotFound(id))?;
            rows.insert(id, row);
        }
        tracing::debug!(count = rows.len(), "variant rows locked");
        Ok(Self { rows })
    }

    pub fn get(&self, id: Uuid) -> Option<&VariantModel> {
        self.rows.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariantModel> {
        self.rows.values()
    }

    fn levels(&self) -> BTreeMap<Uuid, i32> {
        self.rows
            .iter()
            .map(|(id, row)| (*id, row.stock_quantity))
            .collect()
    }

    /// Validate every line before anything is written.
    pub fn ensure_available(&self, wanted: &BTreeMap<Uuid, i32>) -> AppResult<()> {
        for id in wanted.keys() {
            if !self.rows.contains_key(id) {
                return Err(AppError::VariantNotFound(*id));
            }
        }
        match shortages(&self.levels(), wanted).into_iter().next() {
            Some(shortage) => Err(shortage.into()),
            None => Ok(()),
        }
    }

    pub async fn deduct(
        &mut self,
        txn: &DatabaseTransaction,
        id: Uuid,
        quantity: i32,
    ) -> AppResult<()> {
        let row = self.row(id, quantity)?;
        if quantity > row.stock_quantity {
            return Err(AppError::InsufficientStock {
                variant_id: id,
                available: row.stock_quantity,
                requested: quantity,
            });
        }
        let next = row.stock_quantity - quantity;
        self.write(txn, id, next).await
    }

    pub async fn restore(
        &mut self,
        txn: &DatabaseTransaction,
        id: Uuid,
        quantity: i32,
    ) -> AppResult<()> {
        let row = self.row(id, quantity)?;
        let next = row
            .stock_quantity
            .checked_add(quantity)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("stock overflow on variant {id}")))?;
        self.write(txn, id, next).await
    }

    /// All or nothing: on error the caller must drop the transaction.
    pub async fn deduct_all(
        &mut self,
        txn: &DatabaseTransaction,
        wanted: &BTreeMap<Uuid, i32>,
    ) -> AppResult<()> {
        self.ensure_available(wanted)?;
        for (&id, &quantity) in wanted {
            self.deduct(txn, id, quantity).await?;
        }
        Ok(())
    }

    pub async fn restore_all(
        &mut self,
        txn: &DatabaseTransaction,
        wanted: &BTreeMap<Uuid, i32>,
    ) -> AppResult<()> {
        for (&id, &quantity) in wanted {
            self.restore(txn, id, quantity).await?;
        }
        Ok(())
    }

    fn row(&self, id: Uuid, quantity: i32) -> AppResult<&VariantModel> {
        if quantity <= 0 {
            return Err(AppError::BadRequest(format!(
                "Quantity for variant {id} must be positive"
            )));
        }
        self.rows.get(&id).ok_or(AppError::VariantNotFound(id))
    }

    async fn write(
        &mut self,
        txn: &DatabaseTransaction,
        id: Uuid,
        stock_quantity: i32,
    ) -> AppResult<()> {
        let current = self.rows.get(&id).cloned().ok_or(AppError::VariantNotFound(id))?;
        let mut active: VariantActive = current.into();
        active.stock_quantity = Set(stock_quantity);
        let updated = active.update(txn).await?;
        self.rows.insert(id, updated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn collapse_sums_duplicate_variants() {
        let totals = collapse([(id(2), 1), (id(1), 3), (id(2), 4)]).unwrap();
        assert_eq!(totals.get(&id(1)), Some(&3));
        assert_eq!(totals.get(&id(2)), Some(&5));
        assert_eq!(totals.keys().copied().collect::<Vec<_>>(), vec![id(1), id(2)]);
    }

    #[test]
    fn collapse_rejects_non_positive_quantities() {
        assert!(matches!(collapse([(id(1), 0)]), Err(AppError::BadRequest(_))));
        assert!(matches!(collapse([(id(1), -2)]), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn collapse_rejects_overflow() {
        assert!(collapse([(id(1), i32::MAX), (id(1), 1)]).is_err());
    }

    #[test]
    fn shortages_report_every_short_line() {
        let levels = BTreeMap::from([(id(1), 5), (id(2), 0), (id(3), 10)]);
        let wanted = BTreeMap::from([(id(1), 5), (id(2), 1), (id(3), 11)]);
        let short = shortages(&levels, &wanted);
        assert_eq!(
            short,
            vec![
                Shortage { variant_id: id(2), available: 0, requested: 1 },
                Shortage { variant_id: id(3), available: 10, requested: 11 },
            ]
        );
    }

    #[test]
    fn unknown_variant_counts_as_empty_shelf() {
        let short = shortages(&BTreeMap::new(), &BTreeMap::from([(id(9), 2)]));
        assert_eq!(short[0].available, 0);
    }

    #[test]
    fn shortage_converts_to_insufficient_stock() {
        let err: AppError = Shortage { variant_id: id(1), available: 1, requested: 2 }.into();
        assert!(matches!(
            err,
            AppError::InsufficientStock { available: 1, requested: 2, .. }
        ));
    }
}
