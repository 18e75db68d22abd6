use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::stock::{StockCheckRequest, StockCheckResponse},
    error::AppResult,
    response::ApiResponse,
    services::stock_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/check", post(check_stock))
}

#[utoipa::path(
    post,
    path = "/api/stock/check",
    request_body = StockCheckRequest,
    responses(
        (status = 200, description = "Availability of each requested variant", body = ApiResponse<StockCheckResponse>),
        (status = 400, description = "Invalid quantity"),
    ),
    tag = "Stock"
)]
pub async fn check_stock(
    State(state): State<AppState>,
    Json(payload): Json<StockCheckRequest>,
) -> AppResult<Json<ApiResponse<StockCheckResponse>>> {
    let resp = stock_service::check_stock(&state, payload).await?;
    Ok(Json(resp))
}
