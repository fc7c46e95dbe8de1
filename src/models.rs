// src/models.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const NOTE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    #[serde(default)]
    pub stock_name: String,
    pub quantity: Decimal,
    pub cost_basis: Decimal,
    pub purchase_date: DateTime<Utc>,
    pub brokerage_id: Option<i64>,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brokerage {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateHoldingInput {
    pub symbol: String,
    #[serde(default)]
    pub stock_name: String,
    pub quantity: Decimal,
    pub cost_basis: Decimal,
    pub purchase_date: Option<DateTime<Utc>>,
    pub brokerage_id: Option<i64>,
    #[serde(default)]
    pub note: String,
}

impl CreateHoldingInput {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.symbol.trim().is_empty() {
            return Err(AppError::BadRequest("symbol is required".into()));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(AppError::BadRequest("quantity must be greater than 0".into()));
        }
        if self.cost_basis <= Decimal::ZERO {
            return Err(AppError::BadRequest(
                "cost_basis must be greater than 0".into(),
            ));
        }
        check_note(&self.note)
    }

    pub fn into_holding(self, id: String, user_id: &str) -> Holding {
        Holding {
            id,
            user_id: user_id.to_string(),
            symbol: self.symbol,
            stock_name: self.stock_name,
            quantity: self.quantity,
            cost_basis: self.cost_basis,
            purchase_date: self.purchase_date.unwrap_or_else(Utc::now),
            brokerage_id: self.brokerage_id,
            note: self.note,
        }
    }
}

/// Partial update. Empty strings and zero amounts leave the stored value
/// alone; `note` is always overwritten.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateHoldingInput {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub cost_basis: Decimal,
    pub purchase_date: Option<DateTime<Utc>>,
    pub brokerage_id: Option<i64>,
    #[serde(default)]
    pub note: String,
}

impl UpdateHoldingInput {
    pub fn apply(self, holding: &mut Holding) -> Result<(), AppError> {
        check_note(&self.note)?;
        if !self.symbol.is_empty() {
            holding.symbol = self.symbol;
        }
        if !self.quantity.is_zero() {
            holding.quantity = self.quantity;
        }
        if !self.cost_basis.is_zero() {
            holding.cost_basis = self.cost_basis;
        }
        if let Some(date) = self.purchase_date {
            holding.purchase_date = date;
        }
        if self.brokerage_id.is_some() {
            holding.brokerage_id = self.brokerage_id;
        }
        holding.note = self.note;
        Ok(())
    }
}

fn check_note(note: &str) -> Result<(), AppError> {
    if note.chars().count() > NOTE_MAX_CHARS {
        return Err(AppError::BadRequest(format!(
            "note must be at most {} characters",
            NOTE_MAX_CHARS
        )));
    }
    Ok(())
}
