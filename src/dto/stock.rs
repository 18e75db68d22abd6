use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StockLine {
    pub variant_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StockCheckRequest {
    pub items: Vec<StockLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct InsufficientStockItem {
    pub variant_id: Uuid,
    pub available_quantity: i32,
    pub requested_quantity: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockCheckResponse {
    pub available: bool,
    pub insufficient_items: Vec<InsufficientStockItem>,
}
