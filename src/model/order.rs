//! Orders and their material lines.

use chrono::{NaiveDateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{parsed, text_or_default, timestamp, UnknownVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const OPEN: [OrderStatus; 2] = [OrderStatus::Pending, OrderStatus::InProgress];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// `completed` and `cancelled` never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "in_progress" => Ok(OrderStatus::InProgress),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(UnknownVariant {
                kind: "order status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(UnknownVariant {
                kind: "priority",
                value: other.to_string(),
            }),
        }
    }
}

/// One requested material on an order. Name, unit and category are joined in on read.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: Option<i64>,
    pub material_id: i64,
    pub quantity: i64,
    pub notes: String,
    pub material_name: Option<String>,
    pub unit: Option<String>,
    pub category: Option<String>,
}

impl OrderLine {
    pub fn new(material_id: i64, quantity: i64) -> Self {
        Self {
            material_id,
            quantity,
            ..Self::default()
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            material_id: row.get("material_id")?,
            quantity: row.get("quantity")?,
            notes: text_or_default(row, "notes")?,
            material_name: row.get("material_name")?,
            unit: row.get("unit")?,
            category: row.get("category")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Order {
    pub id: Option<i64>,
    /// Generated on create when blank.
    pub order_number: String,
    pub requester: String,
    pub department: String,
    pub status: OrderStatus,
    pub priority: Priority,
    pub notes: String,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub lines: Vec<OrderLine>,
}

impl Order {
    pub fn new(requester: impl Into<String>) -> Self {
        Self {
            requester: requester.into(),
            ..Self::default()
        }
    }

    pub fn with_line(mut self, line: OrderLine) -> Self {
        self.lines.push(line);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.requester.trim().is_empty() {
            return Err("order requester must not be empty".to_string());
        }
        for line in &self.lines {
            line_is_valid(line)?;
        }
        Ok(())
    }

    /// Header only; `lines` is filled by the repository.
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            order_number: row.get("order_number")?,
            requester: row.get("requester")?,
            department: text_or_default(row, "department")?,
            status: parsed(row, "status")?,
            priority: match row.get::<_, Option<String>>("priority")? {
                Some(_) => parsed(row, "priority")?,
                None => Priority::default(),
            },
            notes: text_or_default(row, "notes")?,
            created_at: timestamp(row, "created_at")?,
            updated_at: timestamp(row, "updated_at")?,
            completed_at: timestamp(row, "completed_at")?,
            lines: Vec::new(),
        })
    }
}

pub(crate) fn line_is_valid(line: &OrderLine) -> Result<(), String> {
    if line.quantity <= 0 {
        return Err(format!(
            "order line for material {} must request a positive quantity, got {}",
            line.material_id, line.quantity
        ));
    }
    Ok(())
}

/// `ORD-<YYYYmmddHHMMSS>-<8 hex>`
pub fn generate_order_number() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "ORD-{}-{}",
        Utc::now().format("%Y%m%d%H%M%S"),
        &suffix[..8]
    )
}
