mod common;

use axum::{extract::State, http::StatusCode};
use checkout_core::{config::ReservationMode, routes::health::health_check};

use common::setup;

#[tokio::test]
async fn health_check_returns_ok() -> anyhow::Result<()> {
    let Some(app) = setup(ReservationMode::Immediate).await? else {
        return Ok(());
    };
    let (status, response) = health_check(State(app.state.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response.0.message, "Health check");

    let data = response.0.data.expect("health data");
    assert_eq!(data.status, "ok");
    assert_eq!(data.database, "up");
    Ok(())
}
