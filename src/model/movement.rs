//! ADC inbound/outbound history and the line type used to request movements.

use chrono::NaiveDateTime;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{text_or_default, timestamp};

/// Vials requested at one spec, as accepted by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementLine {
    pub spec_mg: f64,
    pub quantity: i64,
}

impl MovementLine {
    pub fn new(spec_mg: f64, quantity: i64) -> Self {
        Self { spec_mg, quantity }
    }

    /// Normalizes an untyped `{"spec_mg": .., "quantity": ..}` record.
    ///
    /// Numbers may arrive as JSON numbers or numeric strings; a quantity must
    /// be integral.
    pub fn from_record(record: &Map<String, Value>) -> Result<Self, String> {
        let spec_mg = record
            .get("spec_mg")
            .and_then(number)
            .ok_or_else(|| "line is missing a numeric spec_mg".to_string())?;
        let quantity = record
            .get("quantity")
            .and_then(number)
            .ok_or_else(|| "line is missing a numeric quantity".to_string())?;
        if quantity.fract() != 0.0 || !quantity.is_finite() {
            return Err(format!("line quantity must be a whole number of vials, got {quantity}"));
        }
        Ok(Self::new(spec_mg, quantity as i64))
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.spec_mg.is_finite() || self.spec_mg <= 0.0 {
            return Err(format!("line spec must be a positive number of mg, got {}", self.spec_mg));
        }
        if self.quantity <= 0 {
            return Err(format!("line quantity must be positive, got {}", self.quantity));
        }
        Ok(())
    }
}

impl TryFrom<&Value> for MovementLine {
    type Error = String;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(record) => MovementLine::from_record(record),
            other => Err(format!("line must be an object, got {other}")),
        }
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// One line of a stored inbound/outbound record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdcMovementItem {
    pub id: Option<i64>,
    /// Owning header id.
    pub movement_id: i64,
    pub spec_mg: f64,
    pub quantity: i64,
}

impl AdcMovementItem {
    /// `parent_column` is `outbound_id` or `inbound_id`.
    pub(crate) fn from_row(row: &Row<'_>, parent_column: &str) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            movement_id: row.get(parent_column)?,
            spec_mg: row.get("spec_mg")?,
            quantity: row.get("quantity")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdcOutboundRecord {
    pub id: i64,
    /// Referenced by value; the record outlives edits to the sample.
    pub lot_number: String,
    pub requester: String,
    pub operator: String,
    pub shipping_address: String,
    pub shipping_date: Option<NaiveDateTime>,
    pub notes: String,
    pub created_at: Option<NaiveDateTime>,
    pub items: Vec<AdcMovementItem>,
}

impl AdcOutboundRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            lot_number: row.get("lot_number")?,
            requester: row.get("requester")?,
            operator: row.get("operator")?,
            shipping_address: text_or_default(row, "shipping_address")?,
            shipping_date: timestamp(row, "shipping_date")?,
            notes: text_or_default(row, "notes")?,
            created_at: timestamp(row, "created_at")?,
            items: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdcInboundRecord {
    pub id: i64,
    pub lot_number: String,
    pub operator: String,
    pub owner: String,
    pub storage_position: String,
    pub storage_date: Option<NaiveDateTime>,
    pub notes: String,
    pub created_at: Option<NaiveDateTime>,
    pub items: Vec<AdcMovementItem>,
}

impl AdcInboundRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            lot_number: row.get("lot_number")?,
            operator: row.get("operator")?,
            owner: text_or_default(row, "owner")?,
            storage_position: text_or_default(row, "storage_position")?,
            storage_date: timestamp(row, "storage_date")?,
            notes: text_or_default(row, "notes")?,
            created_at: timestamp(row, "created_at")?,
            items: Vec::new(),
        })
    }
}

/// One entry of the merged movement history, tagged `inbound` or `outbound`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LedgerEntry {
    Inbound(AdcInboundRecord),
    Outbound(AdcOutboundRecord),
}

impl LedgerEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEntry::Inbound(_) => "inbound",
            LedgerEntry::Outbound(_) => "outbound",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            LedgerEntry::Inbound(record) => record.id,
            LedgerEntry::Outbound(record) => record.id,
        }
    }

    pub fn lot_number(&self) -> &str {
        match self {
            LedgerEntry::Inbound(record) => &record.lot_number,
            LedgerEntry::Outbound(record) => &record.lot_number,
        }
    }

    pub fn created_at(&self) -> Option<NaiveDateTime> {
        match self {
            LedgerEntry::Inbound(record) => record.created_at,
            LedgerEntry::Outbound(record) => record.created_at,
        }
    }

    pub fn items(&self) -> &[AdcMovementItem] {
        match self {
            LedgerEntry::Inbound(record) => &record.items,
            LedgerEntry::Outbound(record) => &record.items,
        }
    }

    pub fn total_vials(&self) -> i64 {
        self.items().iter().map(|item| item.quantity).sum()
    }
}
