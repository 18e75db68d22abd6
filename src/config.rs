use std::{env, str::FromStr, time::Duration};

use anyhow::Context;
use chrono::TimeDelta;

/// When stock leaves the shelf for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationMode {
    /// Deduct while creating the order. `Pending` implies reserved.
    Immediate,
    /// Deduct while settling the payment, re-validating under lock.
    Deferred,
}

impl FromStr for ReservationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(ReservationMode::Immediate),
            "deferred" | "delayed" => Ok(ReservationMode::Deferred),
            other => anyhow::bail!("unknown reservation mode `{other}`"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub reservation_mode: ReservationMode,
    pub reservation_window: TimeDelta,
    /// Age after which a pending order without `expires_at` is reclaimed.
    pub pending_fallback: TimeDelta,
    pub sweep_interval: Duration,
    pub sweep_batch_size: u64,
    pub lock_timeout: Duration,
    /// Tax rate in basis points, 1800 = 18%.
    pub tax_rate_bps: i64,
    /// Minor units. Orders strictly above this ship for free.
    pub free_shipping_threshold: i64,
    pub shipping_charge: i64,
    pub order_number_attempts: u32,
    pub currency: String,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            reservation_mode: ReservationMode::Immediate,
            reservation_window: TimeDelta::minutes(30),
            pending_fallback: TimeDelta::minutes(30),
            sweep_interval: Duration::from_secs(300),
            sweep_batch_size: 100,
            lock_timeout: Duration::from_millis(5000),
            tax_rate_bps: 1800,
            free_shipping_threshold: 200_000,
            shipping_charge: 10_000,
            order_number_attempts: 10,
            currency: "INR".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub notification_buffer: usize,
    pub gateway: GatewaySettings,
    pub checkout: CheckoutSettings,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);

        let gateway = GatewaySettings {
            key_id: env::var("GATEWAY_KEY_ID").unwrap_or_default(),
            key_secret: env::var("GATEWAY_KEY_SECRET").context("GATEWAY_KEY_SECRET is not set")?,
            webhook_secret: env::var("GATEWAY_WEBHOOK_SECRET")
                .context("GATEWAY_WEBHOOK_SECRET is not set")?,
        };

        let defaults = CheckoutSettings::default();
        let checkout = CheckoutSettings {
            reservation_mode: match env::var("RESERVATION_MODE") {
                Ok(raw) => raw.parse()?,
                Err(_) => defaults.reservation_mode,
            },
            reservation_window: TimeDelta::minutes(env_or("RESERVATION_WINDOW_MINUTES", 30)?),
            pending_fallback: TimeDelta::minutes(env_or("PENDING_FALLBACK_MINUTES", 30)?),
            sweep_interval: Duration::from_secs(env_or("SWEEP_INTERVAL_SECS", 300)?),
            sweep_batch_size: env_or("SWEEP_BATCH_SIZE", defaults.sweep_batch_size)?,
            lock_timeout: Duration::from_millis(env_or("LOCK_TIMEOUT_MS", 5000)?),
            tax_rate_bps: env_or("TAX_RATE_BPS", defaults.tax_rate_bps)?,
            free_shipping_threshold: env_or(
                "FREE_SHIPPING_THRESHOLD",
                defaults.free_shipping_threshold,
            )?,
            shipping_charge: env_or("SHIPPING_CHARGE", defaults.shipping_charge)?,
            order_number_attempts: env_or("ORDER_NUMBER_ATTEMPTS", defaults.order_number_attempts)?,
            currency: defaults.currency,
        };

        Ok(Self {
            port,
            database_url,
            host,
            notification_buffer: env_or("NOTIFICATION_BUFFER", 1024)?,
            gateway,
            checkout,
        })
    }
}

/// Reads `key` or falls back to `default` when unset. A set but malformed value is an error.
fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        Err(_) => Ok(default),
    }
}
