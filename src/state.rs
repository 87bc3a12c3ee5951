use std::{str::FromStr, sync::Arc, time::Duration};

use crate::{
    broker::BrokerBridge,
    error::{AppError, Result},
    message::MessageService,
    websocket::{ConnectionRegistry, SessionConfig},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub message_service: MessageService,
    pub ws_connections: ConnectionRegistry,
    pub broker: Arc<BrokerBridge>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub nats_url: String,
    pub nats_connect_retries: u32,
    pub nats_retry_delay: Duration,
    pub host: String,
    pub port: u16,
    /// Frames buffered per connection before the oldest are dropped.
    pub outbound_queue_capacity: usize,
    pub ws_heartbeat_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            jwt_secret: required("JWT_SECRET")?,
            nats_url: std::env::var("NATS_URL")
                .unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            nats_connect_retries: parse_or("NATS_CONNECT_RETRIES", 5)?,
            nats_retry_delay: Duration::from_secs(parse_or("NATS_RETRY_DELAY_SECS", 2)?),
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_or("PORT", 3000)?,
            outbound_queue_capacity: queue_capacity_or(
                "OUTBOUND_QUEUE_CAPACITY",
                crate::websocket::DEFAULT_OUTBOUND_CAPACITY,
            )?,
            ws_heartbeat_interval: Duration::from_secs(parse_or("WS_HEARTBEAT_SECS", 30)?),
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            outbound_capacity: self.outbound_queue_capacity,
            heartbeat_interval: self.ws_heartbeat_interval,
        }
    }
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| AppError::Config(format!("{} must be set", key)))
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} must be a number, got {:?}", key, raw))),
        Err(_) => Ok(default),
    }
}

/// The outbound queue holds a power-of-two number of frames; any other value
/// would be silently rounded up, so it is rejected instead.
fn queue_capacity_or(key: &str, default: usize) -> Result<usize> {
    let capacity = parse_or(key, default)?;
    if capacity == 0 || !capacity.is_power_of_two() {
        return Err(AppError::Config(format!(
            "{} must be a power of two, got {}",
            key, capacity
        )));
    }
    Ok(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Keys are unique to each test so they can run in parallel.
    #[test]
    fn test_parse_or_default_and_override() {
        assert_eq!(parse_or("PRIVATE_CHAT_TEST_UNSET", 7u32).unwrap(), 7);

        std::env::set_var("PRIVATE_CHAT_TEST_PORT", " 8080 ");
        assert_eq!(parse_or("PRIVATE_CHAT_TEST_PORT", 3000u16).unwrap(), 8080);
    }

    #[test]
    fn test_parse_or_rejects_garbage() {
        std::env::set_var("PRIVATE_CHAT_TEST_BAD", "lots");
        assert!(matches!(
            parse_or("PRIVATE_CHAT_TEST_BAD", 1usize),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_required_reports_missing_key() {
        assert!(matches!(
            required("PRIVATE_CHAT_TEST_MISSING"),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_queue_capacity_must_be_power_of_two() {
        assert_eq!(queue_capacity_or("PRIVATE_CHAT_TEST_QUEUE_UNSET", 256).unwrap(), 256);

        std::env::set_var("PRIVATE_CHAT_TEST_QUEUE_OK", "512");
        assert_eq!(queue_capacity_or("PRIVATE_CHAT_TEST_QUEUE_OK", 256).unwrap(), 512);

        for (key, raw) in [
            ("PRIVATE_CHAT_TEST_QUEUE_ODD", "300"),
            ("PRIVATE_CHAT_TEST_QUEUE_ZERO", "0"),
        ] {
            std::env::set_var(key, raw);
            assert!(matches!(queue_capacity_or(key, 256), Err(AppError::Config(_))));
        }
    }
}
