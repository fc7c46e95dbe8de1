// src/quotes.rs
//! Batched real-time quotes from the TWSE "MIS" endpoint.
//!
//! Every symbol is requested twice, once as a listed (`tse_`) channel and once
//! as an over-the-counter (`otc_`) channel, since the caller does not know
//! which market lists a code. Only the channel that exists comes back.

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const TWSE_QUOTE_URL: &str = "https://mis.twse.com.tw/stock/api/getStockInfo.jsp";

const VENUE_PREFIXES: [&str; 2] = ["tse", "otc"];
const NO_TRADE: &str = "-";

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("quote request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("quote endpoint returned HTTP {0}")]
    Status(StatusCode),
    #[error("quote response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Anything that can price a batch of symbols in one round trip.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// `symbols` is non-empty and already deduplicated. Symbols without a
    /// usable price are simply absent from the returned map.
    async fn fetch_quotes(&self, symbols: &[String])
        -> Result<HashMap<String, Decimal>, QuoteError>;
}

/// Most recent trade price. The endpoint sends `"-"` when nothing has traded
/// yet in the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Option<String>")]
enum TradePrice {
    #[default]
    NoTrade,
    Traded(String),
}

impl From<Option<String>> for TradePrice {
    fn from(raw: Option<String>) -> Self {
        match raw {
            Some(price) if price != NO_TRADE => TradePrice::Traded(price),
            _ => TradePrice::NoTrade,
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuoteRecord {
    #[serde(rename = "c", default)]
    code: String,
    #[serde(rename = "z", default)]
    last_trade: TradePrice,
    #[serde(rename = "y", default)]
    previous_close: Option<String>,
    #[serde(rename = "n", default)]
    name: String,
}

impl QuoteRecord {
    /// Last trade, falling back to the previous session's close. Padded or
    /// otherwise non-numeric values are not prices.
    fn price(&self) -> Option<Decimal> {
        let raw = match &self.last_trade {
            TradePrice::Traded(price) => price.as_str(),
            TradePrice::NoTrade => self.previous_close.as_deref()?,
        };
        Decimal::from_str(raw).ok()
    }
}

#[derive(Debug, Deserialize)]
struct TwseResponse {
    #[serde(rename = "msgArray", default)]
    records: Vec<QuoteRecord>,
}

/// `tse_2330.tw|otc_2330.tw|tse_6488.tw|otc_6488.tw`
fn channel_query(symbols: &[String]) -> String {
    symbols
        .iter()
        .flat_map(|s| {
            VENUE_PREFIXES
                .iter()
                .map(move |venue| format!("{}_{}.tw", venue, s))
        })
        .collect::<Vec<_>>()
        .join("|")
}

fn into_price_map(response: TwseResponse) -> HashMap<String, Decimal> {
    let mut prices = HashMap::with_capacity(response.records.len());
    for record in response.records {
        match record.price() {
            Some(price) => {
                debug!("Quote {} ({}) = {}", record.code, record.name, price);
                prices.insert(record.code, price);
            }
            None => debug!("Dropping unparsable quote for {:?}", record.code),
        }
    }
    prices
}

pub struct TwseQuoteFetcher {
    client: Client,
    endpoint: String,
}

impl TwseQuoteFetcher {
    /// With no timeout the reqwest transport default applies.
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Self {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl QuoteSource for TwseQuoteFetcher {
    async fn fetch_quotes(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, Decimal>, QuoteError> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }

        let cache_buster = Utc::now().timestamp_millis().to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("ex_ch", channel_query(symbols).as_str()),
                ("json", "1"),
                ("delay", "0"),
                ("_", cache_buster.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(QuoteError::Status(response.status()));
        }

        let body = response.text().await?;
        let prices = into_price_map(serde_json::from_str::<TwseResponse>(&body)?);
        info!(
            "Fetched {} quotes for {} symbols",
            prices.len(),
            symbols.len()
        );
        Ok(prices)
    }
}
