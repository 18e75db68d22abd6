use std::collections::BTreeMap;

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{
    dto::stock::{InsufficientStockItem, StockCheckRequest, StockCheckResponse},
    entity::product_variants::{Column as VariantCol, Entity as ProductVariants},
    error::AppResult,
    response::{ApiResponse, Meta},
    services::inventory_service::{collapse, shortages},
    state::AppState,
};

/// Point-in-time availability. Takes no locks, so the answer can be stale by the
/// time an order is placed.
pub async fn check_stock(
    state: &AppState,
    payload: StockCheckRequest,
) -> AppResult<ApiResponse<StockCheckResponse>> {
    let wanted = collapse(payload.items.iter().map(|line| (line.variant_id, line.quantity)))?;

    let levels: BTreeMap<Uuid, i32> = ProductVariants::find()
        .filter(VariantCol::Id.is_in(wanted.keys().copied()))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|variant| (variant.id, variant.stock_quantity))
        .collect();

    let insufficient_items: Vec<InsufficientStockItem> = shortages(&levels, &wanted)
        .into_iter()
        .map(|s| InsufficientStockItem {
            variant_id: s.variant_id,
            available_quantity: s.available,
            requested_quantity: s.requested,
        })
        .collect();

    Ok(ApiResponse::success(
        "Stock checked",
        StockCheckResponse {
            available: insufficient_items.is_empty(),
            insufficient_items,
        },
        Some(Meta::empty()),
    ))
}
