use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};

use crate::{
    dto::payments::{
        CreatePaymentOrderRequest, PaymentOrder, PaymentVerified, VerifyPaymentRequest, WebhookAck,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    services::{payment_service, webhook_service},
    state::AppState,
};

pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_payment_order))
        .route("/verify", post(verify_payment))
        .route("/webhook", post(webhook))
}

#[utoipa::path(
    post,
    path = "/api/payments/orders",
    request_body = CreatePaymentOrderRequest,
    responses(
        (status = 200, description = "Gateway order to open checkout with", body = ApiResponse<PaymentOrder>),
        (status = 400, description = "Order is not awaiting gateway payment"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Already paid"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_payment_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreatePaymentOrderRequest>,
) -> AppResult<Json<ApiResponse<PaymentOrder>>> {
    let resp = payment_service::create_payment_order(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment captured and order confirmed", body = ApiResponse<PaymentVerified>),
        (status = 400, description = "Invalid signature, insufficient stock or failed payment"),
        (status = 403, description = "Order belongs to another user"),
        (status = 404, description = "Payment not found"),
        (status = 409, description = "Payment already processed"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<VerifyPaymentRequest>,
) -> AppResult<Json<ApiResponse<PaymentVerified>>> {
    let resp = payment_service::verify_payment(&state, &user, payload).await?;
    Ok(Json(resp))
}

/// The raw body is needed as sent: the signature covers its exact bytes.
#[utoipa::path(
    post,
    path = "/api/payments/webhook",
    request_body(content = String, description = "Gateway event JSON", content_type = "application/json"),
    params(("x-gateway-signature" = String, Header, description = "Hex HMAC-SHA256 of the body")),
    responses(
        (status = 200, description = "Event acknowledged", body = ApiResponse<WebhookAck>),
        (status = 400, description = "Invalid signature"),
        (status = 500, description = "Temporary failure, the gateway should retry"),
    ),
    tag = "Payments"
)]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ApiResponse<WebhookAck>>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let ack = webhook_service::handle_notification(&state, &body, signature).await?;
    Ok(Json(ApiResponse::success("Webhook processed", ack, Some(Meta::empty()))))
}
