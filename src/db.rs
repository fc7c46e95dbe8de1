// src/db.rs
use crate::error::StoreError;
use crate::models::{Brokerage, Holding, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use rust_decimal::Decimal;
use scylla::{
    frame::response::result::{CqlValue, Row},
    query::Query,
    Session, SessionBuilder,
};
use std::str::FromStr;
#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use tokio::sync::RwLock;

/// Owner-scoped record store. Every holding operation takes the owner id, so a
/// caller can never reach another user's rows.
#[async_trait]
pub trait HoldingStore: Send + Sync {
    /// Holdings for one owner, oldest first.
    async fn list_holdings(&self, user_id: &str) -> Result<Vec<Holding>, StoreError>;
    async fn get_holding(&self, user_id: &str, id: &str) -> Result<Option<Holding>, StoreError>;
    /// Inserts or replaces by (`user_id`, `id`).
    async fn save_holding(&self, holding: &Holding) -> Result<(), StoreError>;
    async fn delete_holding(&self, user_id: &str, id: &str) -> Result<(), StoreError>;
    async fn list_brokerages(&self) -> Result<Vec<Brokerage>, StoreError>;
    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError>;
}

/// Holding ids sort by creation time, which gives the listing its order.
pub fn new_holding_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

const SCHEMA: &[&str] = &[
    "CREATE KEYSPACE IF NOT EXISTS stock_keeper WITH REPLICATION = {'class': 'SimpleStrategy', 'replication_factor': 1}",
    "CREATE TABLE IF NOT EXISTS stock_keeper.holdings (user_id TEXT, id TEXT, symbol TEXT, stock_name TEXT, quantity TEXT, cost_basis TEXT, purchase_date BIGINT, brokerage_id BIGINT, note TEXT, PRIMARY KEY (user_id, id)) WITH CLUSTERING ORDER BY (id ASC)",
    "CREATE TABLE IF NOT EXISTS stock_keeper.brokerages (id BIGINT PRIMARY KEY, name TEXT)",
    "CREATE TABLE IF NOT EXISTS stock_keeper.users (id TEXT PRIMARY KEY, email TEXT, is_active BOOLEAN)",
];

const HOLDING_COLUMNS: &str =
    "id, user_id, symbol, stock_name, quantity, cost_basis, purchase_date, brokerage_id, note";

pub struct ScyllaStore {
    session: Session,
}

impl ScyllaStore {
    pub async fn connect(node: &str) -> Result<Self, StoreError> {
        let session = SessionBuilder::new()
            .known_node(node)
            .build()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        for statement in SCHEMA {
            session.query(*statement, &[]).await.map_err(query_error)?;
        }

        info!("Successfully connected to ScyllaDB at {}.", node);
        Ok(Self { session })
    }
}

fn query_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Query(e.to_string())
}

fn column<'a>(row: &'a Row, idx: usize) -> Option<&'a CqlValue> {
    row.columns.get(idx).and_then(|c| c.as_ref())
}

fn text_column(row: &Row, idx: usize, name: &'static str) -> Result<String, StoreError> {
    match column(row, idx) {
        Some(CqlValue::Text(s)) | Some(CqlValue::Ascii(s)) => Ok(s.clone()),
        None => Ok(String::new()),
        Some(other) => Err(StoreError::Decode {
            column: name,
            reason: format!("expected text, got {:?}", other),
        }),
    }
}

fn bigint_column(row: &Row, idx: usize, name: &'static str) -> Result<Option<i64>, StoreError> {
    match column(row, idx) {
        Some(CqlValue::BigInt(v)) => Ok(Some(*v)),
        None => Ok(None),
        Some(other) => Err(StoreError::Decode {
            column: name,
            reason: format!("expected bigint, got {:?}", other),
        }),
    }
}

fn decimal_column(row: &Row, idx: usize, name: &'static str) -> Result<Decimal, StoreError> {
    let raw = text_column(row, idx, name)?;
    Decimal::from_str(&raw).map_err(|e| StoreError::Decode {
        column: name,
        reason: e.to_string(),
    })
}

fn holding_from_row(row: &Row) -> Result<Holding, StoreError> {
    let millis = bigint_column(row, 6, "purchase_date")?.unwrap_or_default();
    let purchase_date =
        DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| StoreError::Decode {
            column: "purchase_date",
            reason: format!("{} is out of range", millis),
        })?;

    Ok(Holding {
        id: text_column(row, 0, "id")?,
        user_id: text_column(row, 1, "user_id")?,
        symbol: text_column(row, 2, "symbol")?,
        stock_name: text_column(row, 3, "stock_name")?,
        quantity: decimal_column(row, 4, "quantity")?,
        cost_basis: decimal_column(row, 5, "cost_basis")?,
        purchase_date,
        brokerage_id: bigint_column(row, 7, "brokerage_id")?,
        note: text_column(row, 8, "note")?,
    })
}

#[async_trait]
impl HoldingStore for ScyllaStore {
    async fn list_holdings(&self, user_id: &str) -> Result<Vec<Holding>, StoreError> {
        let query = Query::new(format!(
            "SELECT {} FROM stock_keeper.holdings WHERE user_id = ?",
            HOLDING_COLUMNS
        ));
        let rows = self
            .session
            .query(query, (user_id,))
            .await
            .map_err(query_error)?
            .rows
            .unwrap_or_default();

        let holdings = rows
            .iter()
            .map(holding_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        info!("Fetched {} holdings for user: {}", holdings.len(), user_id);
        Ok(holdings)
    }

    async fn get_holding(&self, user_id: &str, id: &str) -> Result<Option<Holding>, StoreError> {
        let query = Query::new(format!(
            "SELECT {} FROM stock_keeper.holdings WHERE user_id = ? AND id = ?",
            HOLDING_COLUMNS
        ));
        let result = self
            .session
            .query(query, (user_id, id))
            .await
            .map_err(query_error)?;

        match result.rows.unwrap_or_default().first() {
            Some(row) => holding_from_row(row).map(Some),
            None => Ok(None),
        }
    }

    async fn save_holding(&self, holding: &Holding) -> Result<(), StoreError> {
        let query = Query::new(format!(
            "INSERT INTO stock_keeper.holdings ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            HOLDING_COLUMNS
        ));
        self.session
            .query(
                query,
                (
                    holding.id.as_str(),
                    holding.user_id.as_str(),
                    holding.symbol.as_str(),
                    holding.stock_name.as_str(),
                    holding.quantity.to_string(),
                    holding.cost_basis.to_string(),
                    holding.purchase_date.timestamp_millis(),
                    holding.brokerage_id,
                    holding.note.as_str(),
                ),
            )
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn delete_holding(&self, user_id: &str, id: &str) -> Result<(), StoreError> {
        let query = Query::new("DELETE FROM stock_keeper.holdings WHERE user_id = ? AND id = ?");
        self.session
            .query(query, (user_id, id))
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn list_brokerages(&self) -> Result<Vec<Brokerage>, StoreError> {
        let query = Query::new("SELECT id, name FROM stock_keeper.brokerages");
        let rows = self
            .session
            .query(query, &[])
            .await
            .map_err(query_error)?
            .rows
            .unwrap_or_default();

        let mut brokerages = rows
            .iter()
            .map(|row| -> Result<Brokerage, StoreError> {
                Ok(Brokerage {
                    id: bigint_column(row, 0, "id")?.unwrap_or_default(),
                    name: text_column(row, 1, "name")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        brokerages.sort_by_key(|b| b.id);
        Ok(brokerages)
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let query = Query::new("SELECT id, email, is_active FROM stock_keeper.users WHERE id = ?");
        let result = self
            .session
            .query(query, (id,))
            .await
            .map_err(query_error)?;

        match result.rows.unwrap_or_default().first() {
            Some(row) => Ok(Some(User {
                id: text_column(row, 0, "id")?,
                email: text_column(row, 1, "email")?,
                is_active: matches!(column(row, 2), Some(CqlValue::Boolean(true))),
            })),
            None => Ok(None),
        }
    }
}

/// Process-local store keeping insertion order, for handler tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    holdings: RwLock<HashMap<String, Vec<Holding>>>,
    brokerages: Vec<Brokerage>,
    users: HashMap<String, User>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.users.insert(user.id.clone(), user);
        self
    }

    pub fn with_brokerage(mut self, id: i64, name: &str) -> Self {
        self.brokerages.push(Brokerage {
            id,
            name: name.to_string(),
        });
        self
    }
}

#[cfg(test)]
#[async_trait]
impl HoldingStore for MemoryStore {
    async fn list_holdings(&self, user_id: &str) -> Result<Vec<Holding>, StoreError> {
        let holdings = self.holdings.read().await;
        Ok(holdings.get(user_id).cloned().unwrap_or_default())
    }

    async fn get_holding(&self, user_id: &str, id: &str) -> Result<Option<Holding>, StoreError> {
        let holdings = self.holdings.read().await;
        Ok(holdings
            .get(user_id)
            .and_then(|owned| owned.iter().find(|h| h.id == id))
            .cloned())
    }

    async fn save_holding(&self, holding: &Holding) -> Result<(), StoreError> {
        let mut holdings = self.holdings.write().await;
        let owned = holdings.entry(holding.user_id.clone()).or_default();
        match owned.iter_mut().find(|h| h.id == holding.id) {
            Some(existing) => *existing = holding.clone(),
            None => owned.push(holding.clone()),
        }
        Ok(())
    }

    async fn delete_holding(&self, user_id: &str, id: &str) -> Result<(), StoreError> {
        let mut holdings = self.holdings.write().await;
        if let Some(owned) = holdings.get_mut(user_id) {
            owned.retain(|h| h.id != id);
        }
        Ok(())
    }

    async fn list_brokerages(&self) -> Result<Vec<Brokerage>, StoreError> {
        Ok(self.brokerages.clone())
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(id).cloned())
    }
}
