// src/config.rs
use log::warn;
use std::net::SocketAddr;
use std::time::Duration;

use crate::quotes::TWSE_QUOTE_URL;

const DEFAULT_JWT_SECRET: &str = "your-secret-key";

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub jwt_secret: String,
    pub scylla_node: String,
    pub quote_url: String,
    pub quote_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let listen_addr = var("LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8090".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| format!("invalid LISTEN_ADDR: {}", e))?;

        let jwt_secret = var("JWT_SECRET").filter(|s| !s.is_empty()).unwrap_or_else(|| {
            warn!("JWT_SECRET is not set, using the built-in development secret");
            DEFAULT_JWT_SECRET.to_string()
        });

        let quote_timeout = match var("QUOTE_TIMEOUT_SECS") {
            Some(secs) => Some(Duration::from_secs(
                secs.parse()
                    .map_err(|e| format!("invalid QUOTE_TIMEOUT_SECS: {}", e))?,
            )),
            None => None,
        };

        Ok(Self {
            listen_addr,
            jwt_secret,
            scylla_node: var("SCYLLA_NODE").unwrap_or_else(|| "127.0.0.1:9042".to_string()),
            quote_url: var("TWSE_QUOTE_URL").unwrap_or_else(|| TWSE_QUOTE_URL.to_string()),
            quote_timeout,
        })
    }
}
