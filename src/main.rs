// src/main.rs
mod api;
mod auth;
mod config;
mod db;
mod error;
mod models;
mod quotes;
mod symbol;
mod valuation;

use crate::config::Config;
use crate::db::{HoldingStore, ScyllaStore};
use crate::quotes::{QuoteSource, TwseQuoteFetcher};
use env_logger::Builder;
use log::{error, info, LevelFilter};
use std::sync::Arc;
use warp::Filter;

#[tokio::main]
async fn main() {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_env("RUST_LOG")
        .format_timestamp_secs()
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    let store: Arc<dyn HoldingStore> = match ScyllaStore::connect(&config.scylla_node).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return;
        }
    };
    info!("Connected to database...");

    let quotes: Arc<dyn QuoteSource> = Arc::new(TwseQuoteFetcher::new(
        config.quote_url.clone(),
        config.quote_timeout,
    ));

    let api = api::app(store, quotes, Arc::new(config.jwt_secret.clone()))
        .with(warp::log("stock_keeper"));

    info!("Starting stock keeper on http://{}", config.listen_addr);
    warp::serve(api).run(config.listen_addr).await;
}
