// src/valuation.rs
use log::{error, warn};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;

use crate::models::Holding;
use crate::quotes::QuoteSource;
use crate::symbol::is_eligible;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// A holding priced at request time. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationResult {
    #[serde(flatten)]
    pub holding: Holding,
    pub current_price: Decimal,
    pub market_value: Decimal,
    pub profit_loss: Decimal,
    pub profit_loss_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub holding_count: usize,
    pub total_cost: Decimal,
    pub total_market_value: Decimal,
    pub total_profit_loss: Decimal,
    pub total_profit_loss_percent: Decimal,
}

/// `profit_loss / base * 100` for portfolio totals, or zero when there is no
/// positive base.
fn percent_of(profit_loss: Decimal, base: Decimal) -> Decimal {
    if base <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    profit_loss
        .checked_div(base)
        .and_then(|ratio| ratio.checked_mul(HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

/// Values one holding. A zero price means "no quote" and is valued as such.
/// Amounts that overflow `Decimal` are reported as zero.
pub fn compute(holding: Holding, current_price: Decimal) -> ValuationResult {
    let quantity = holding.quantity;
    let cost = holding.cost_basis;

    let market_value = current_price.checked_mul(quantity);
    let profit_loss = current_price
        .checked_sub(cost)
        .and_then(|diff| diff.checked_mul(quantity));
    if market_value.is_none() || profit_loss.is_none() {
        warn!("Valuation of holding {} overflowed", holding.id);
    }

    // quantity is signed here; only the cost basis guards the division
    let profit_loss_percent = if cost > Decimal::ZERO {
        profit_loss
            .zip(cost.checked_mul(quantity))
            .and_then(|(pl, base)| pl.checked_div(base))
            .and_then(|ratio| ratio.checked_mul(HUNDRED))
            .unwrap_or(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };

    ValuationResult {
        holding,
        current_price,
        market_value: market_value.unwrap_or(Decimal::ZERO),
        profit_loss: profit_loss.unwrap_or(Decimal::ZERO),
        profit_loss_percent,
    }
}

fn checked_total(values: impl Iterator<Item = Option<Decimal>>) -> Decimal {
    values
        .fold(Some(Decimal::ZERO), |acc, v| acc?.checked_add(v?))
        .unwrap_or(Decimal::ZERO)
}

/// Distinct quotable symbols in first-seen order.
pub fn collect_symbols(holdings: &[Holding]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut symbols = Vec::new();
    for h in holdings {
        if is_eligible(&h.symbol) && seen.insert(h.symbol.as_str()) {
            symbols.push(h.symbol.clone());
        }
    }
    symbols
}

/// Prices every holding with a single quote batch. Quote failures degrade to
/// zero prices; the output always lines up with the input.
pub async fn valuate(holdings: Vec<Holding>, quotes: &dyn QuoteSource) -> Vec<ValuationResult> {
    let symbols = collect_symbols(&holdings);

    let prices = if symbols.is_empty() {
        Default::default()
    } else {
        match quotes.fetch_quotes(&symbols).await {
            Ok(prices) => prices,
            Err(e) => {
                error!("Error fetching quotes for {} symbols: {}", symbols.len(), e);
                Default::default()
            }
        }
    };

    holdings
        .into_iter()
        .map(|h| {
            let price = prices.get(&h.symbol).copied().unwrap_or(Decimal::ZERO);
            compute(h, price)
        })
        .collect()
}

pub fn summarize(results: &[ValuationResult]) -> PortfolioSummary {
    let total_cost = checked_total(
        results
            .iter()
            .map(|r| r.holding.cost_basis.checked_mul(r.holding.quantity)),
    );
    let total_market_value = checked_total(results.iter().map(|r| Some(r.market_value)));
    let total_profit_loss = checked_total(results.iter().map(|r| Some(r.profit_loss)));

    PortfolioSummary {
        holding_count: results.len(),
        total_cost,
        total_market_value,
        total_profit_loss,
        total_profit_loss_percent: percent_of(total_profit_loss, total_cost),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quotes::QuoteError;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::Mutex;

    fn holding(id: &str, symbol: &str, quantity: Decimal, cost: Decimal) -> Holding {
        Holding {
            id: id.to_string(),
            user_id: "u1".to_string(),
            symbol: symbol.to_string(),
            stock_name: String::new(),
            quantity,
            cost_basis: cost,
            purchase_date: Utc::now(),
            brokerage_id: None,
            note: String::new(),
        }
    }

    /// Returns fixed prices and records every batch it is asked for.
    #[derive(Default)]
    struct FixedQuotes {
        prices: HashMap<String, Decimal>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl FixedQuotes {
        fn with(prices: &[(&str, Decimal)]) -> Self {
            Self {
                prices: prices.iter().map(|(s, p)| (s.to_string(), *p)).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QuoteSource for FixedQuotes {
        async fn fetch_quotes(
            &self,
            symbols: &[String],
        ) -> Result<HashMap<String, Decimal>, QuoteError> {
            self.calls.lock().unwrap().push(symbols.to_vec());
            Ok(symbols
                .iter()
                .filter_map(|s| self.prices.get(s).map(|p| (s.clone(), *p)))
                .collect())
        }
    }

    struct DownQuotes;

    #[async_trait]
    impl QuoteSource for DownQuotes {
        async fn fetch_quotes(
            &self,
            _symbols: &[String],
        ) -> Result<HashMap<String, Decimal>, QuoteError> {
            Err(QuoteError::Status(reqwest::StatusCode::BAD_GATEWAY))
        }
    }

    #[test]
    fn worked_example() {
        let r = compute(holding("h1", "2330", dec!(100), dec!(500)), dec!(600));
        assert_eq!(r.market_value, dec!(60000));
        assert_eq!(r.profit_loss, dec!(10000));
        assert_eq!(r.profit_loss_percent, dec!(20));
    }

    #[test]
    fn zero_cost_basis_has_zero_percent() {
        let r = compute(holding("h1", "2330", dec!(10), dec!(0)), dec!(50));
        assert_eq!(r.market_value, dec!(500));
        assert_eq!(r.profit_loss, dec!(500));
        assert_eq!(r.profit_loss_percent, Decimal::ZERO);
    }

    #[test]
    fn zero_quantity_does_not_divide_by_zero() {
        let r = compute(holding("h1", "2330", dec!(0), dec!(500)), dec!(600));
        assert_eq!(r.market_value, Decimal::ZERO);
        assert_eq!(r.profit_loss_percent, Decimal::ZERO);
    }

    #[test]
    fn short_position_percent_follows_the_formula() {
        let r = compute(holding("h1", "2330", dec!(-10), dec!(100)), dec!(110));
        assert_eq!(r.market_value, dec!(-1100));
        assert_eq!(r.profit_loss, dec!(-100));
        assert_eq!(r.profit_loss_percent, dec!(10));
    }

    #[test]
    fn overflowing_amounts_do_not_panic() {
        let huge = Decimal::from_str("100000000000000000000").unwrap();
        let cost = Decimal::from_str("10000000000").unwrap();
        let price = Decimal::from_str("20000000000").unwrap();

        let r = compute(holding("h1", "2330", huge, cost), price);
        assert_eq!(r.current_price, price);
        assert_eq!(r.market_value, Decimal::ZERO);
        assert_eq!(r.profit_loss, Decimal::ZERO);
        assert_eq!(r.profit_loss_percent, Decimal::ZERO);

        let summary = summarize(&[r]);
        assert_eq!(summary.holding_count, 1);
        assert_eq!(summary.total_cost, Decimal::ZERO);
    }

    #[tokio::test]
    async fn overflowing_holding_still_valued_with_the_rest() {
        let quotes = FixedQuotes::with(&[("2330", dec!(600))]);
        let huge = Decimal::from_str("100000000000000000000").unwrap();
        let holdings = vec![
            holding("a", "2330", huge, Decimal::from_str("10000000000").unwrap()),
            holding("b", "2330", dec!(100), dec!(500)),
        ];

        let results = valuate(holdings, &quotes).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].profit_loss_percent, dec!(20));
    }

    #[test]
    fn missing_quote_loses_the_whole_cost() {
        let r = compute(holding("h1", "AAPL", dec!(3), dec!(150.5)), Decimal::ZERO);
        assert_eq!(r.current_price, Decimal::ZERO);
        assert_eq!(r.profit_loss, dec!(-451.5));
        assert_eq!(r.profit_loss_percent, dec!(-100));
    }

    #[test]
    fn symbols_are_deduplicated_in_first_seen_order() {
        let holdings = vec![
            holding("a", "2330", dec!(1), dec!(1)),
            holding("b", "2317", dec!(1), dec!(1)),
            holding("c", "2330", dec!(1), dec!(1)),
            holding("d", "AAPL", dec!(1), dec!(1)),
        ];
        assert_eq!(collect_symbols(&holdings), vec!["2330", "2317"]);
    }

    #[tokio::test]
    async fn one_batch_for_all_holdings() {
        let quotes = FixedQuotes::with(&[("2330", dec!(600)), ("2317", dec!(100))]);
        let holdings = vec![
            holding("a", "2330", dec!(100), dec!(500)),
            holding("b", "2317", dec!(10), dec!(120)),
            holding("c", "2330", dec!(50), dec!(550)),
        ];

        let results = valuate(holdings, &quotes).await;

        assert_eq!(quotes.calls(), vec![vec!["2330".to_string(), "2317".to_string()]]);
        let ids: Vec<_> = results.iter().map(|r| r.holding.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(results[0].current_price, dec!(600));
        assert_eq!(results[1].profit_loss, dec!(-200));
        assert_eq!(results[2].market_value, dec!(30000));
    }

    #[tokio::test]
    async fn foreign_symbols_are_never_fetched() {
        let quotes = FixedQuotes::with(&[("AAPL", dec!(190))]);
        let results = valuate(vec![holding("a", "AAPL", dec!(2), dec!(150))], &quotes).await;

        assert!(quotes.calls().is_empty());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].current_price, Decimal::ZERO);
        assert_eq!(results[0].profit_loss, dec!(-300));
    }

    #[tokio::test]
    async fn unmatched_symbol_defaults_to_zero() {
        let quotes = FixedQuotes::with(&[("2330", dec!(600))]);
        let results = valuate(
            vec![
                holding("a", "2330", dec!(1), dec!(500)),
                holding("b", "9999", dec!(4), dec!(25)),
            ],
            &quotes,
        )
        .await;
        assert_eq!(results[1].current_price, Decimal::ZERO);
        assert_eq!(results[1].profit_loss, dec!(-100));
    }

    #[tokio::test]
    async fn fetch_failure_degrades_to_zero_prices() {
        let holdings = vec![
            holding("a", "2330", dec!(100), dec!(500)),
            holding("b", "0050", dec!(20), dec!(130)),
        ];
        let results = valuate(holdings.clone(), &DownQuotes).await;

        assert_eq!(results.len(), holdings.len());
        for (result, original) in results.iter().zip(&holdings) {
            assert_eq!(&result.holding, original);
            assert_eq!(result.current_price, Decimal::ZERO);
            assert_eq!(
                result.profit_loss,
                -(original.cost_basis * original.quantity)
            );
        }
    }

    #[tokio::test]
    async fn empty_input_gives_empty_output() {
        let quotes = FixedQuotes::default();
        assert!(valuate(Vec::new(), &quotes).await.is_empty());
        assert!(quotes.calls().is_empty());
    }

    #[tokio::test]
    async fn repeated_valuation_is_identical() {
        let quotes = FixedQuotes::with(&[("2330", dec!(612.5))]);
        let holdings = vec![
            holding("a", "2330", dec!(7), dec!(480)),
            holding("b", "AAPL", dec!(1), dec!(10)),
        ];
        let first = valuate(holdings.clone(), &quotes).await;
        let second = valuate(holdings, &quotes).await;
        assert_eq!(first, second);
    }

    #[test]
    fn summary_totals_and_percent() {
        let results = vec![
            compute(holding("a", "2330", dec!(100), dec!(500)), dec!(600)),
            compute(holding("b", "AAPL", dec!(10), dec!(0)), Decimal::ZERO),
            compute(holding("c", "2317", dec!(10), dec!(100)), dec!(50)),
        ];
        let summary = summarize(&results);
        assert_eq!(summary.holding_count, 3);
        assert_eq!(summary.total_cost, dec!(51000));
        assert_eq!(summary.total_market_value, dec!(60500));
        assert_eq!(summary.total_profit_loss, dec!(9500));
        assert_eq!(summary.total_profit_loss_percent.round_dp(4), dec!(18.6275));
    }

    #[test]
    fn empty_summary_is_all_zero() {
        let summary = summarize(&[]);
        assert_eq!(summary.holding_count, 0);
        assert_eq!(summary.total_profit_loss_percent, Decimal::ZERO);
    }
}
