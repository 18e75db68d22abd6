use std::sync::Arc;

use crate::{
    config::{CheckoutSettings, GatewaySettings},
    db::{DbPool, OrmConn},
    gateway::PaymentGateway,
    notifications::Notifier,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub checkout: Arc<CheckoutSettings>,
    pub gateway_settings: Arc<GatewaySettings>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Notifier,
}
