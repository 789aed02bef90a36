//! Materials, their images and their stock movements.

use chrono::NaiveDateTime;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{parsed, text_or_default, timestamp, UnknownVariant};

/// A stocked material. `quantity` only changes through a recorded movement.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Material {
    pub id: Option<i64>,
    pub name: String,
    pub category: String,
    pub description: String,
    pub quantity: i64,
    pub unit: String,
    pub min_stock: i64,
    pub location: String,
    pub supplier: String,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl Material {
    pub fn new(name: impl Into<String>, category: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            unit: unit.into(),
            ..Self::default()
        }
    }

    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_min_stock(mut self, min_stock: i64) -> Self {
        self.min_stock = min_stock;
        self
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_stock
    }

    /// Structural checks applied before any write.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("material name must not be empty".to_string());
        }
        if self.category.trim().is_empty() {
            return Err("material category must not be empty".to_string());
        }
        if self.unit.trim().is_empty() {
            return Err("material unit must not be empty".to_string());
        }
        if self.quantity < 0 {
            return Err(format!("material quantity must not be negative, got {}", self.quantity));
        }
        if self.min_stock < 0 {
            return Err(format!("minimum stock must not be negative, got {}", self.min_stock));
        }
        Ok(())
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            name: row.get("name")?,
            category: row.get("category")?,
            description: text_or_default(row, "description")?,
            quantity: row.get("quantity")?,
            unit: row.get("unit")?,
            min_stock: row.get::<_, Option<i64>>("min_stock")?.unwrap_or(0),
            location: text_or_default(row, "location")?,
            supplier: text_or_default(row, "supplier")?,
            created_at: timestamp(row, "created_at")?,
            updated_at: timestamp(row, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MaterialImage {
    pub id: Option<i64>,
    pub material_id: i64,
    #[serde(skip)]
    pub data: Vec<u8>,
    pub image_type: String,
    pub display_order: i64,
    pub notes: String,
    pub created_at: Option<NaiveDateTime>,
}

impl MaterialImage {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            material_id: row.get("material_id")?,
            data: row.get("image_data")?,
            image_type: text_or_default(row, "image_type")?,
            display_order: row.get::<_, Option<i64>>("display_order")?.unwrap_or(0),
            notes: text_or_default(row, "notes")?,
            created_at: timestamp(row, "created_at")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    In,
    Out,
    Adjustment,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::In => "in",
            MovementKind::Out => "out",
            MovementKind::Adjustment => "adjustment",
        }
    }

    /// Kind and magnitude for a signed quantity change; `None` when nothing moved.
    pub fn for_delta(delta: i64) -> Option<(MovementKind, i64)> {
        match delta {
            0 => None,
            d if d > 0 => Some((MovementKind::In, d)),
            d => Some((MovementKind::Out, -d)),
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(MovementKind::In),
            "out" => Ok(MovementKind::Out),
            "adjustment" => Ok(MovementKind::Adjustment),
            other => Err(UnknownVariant {
                kind: "movement kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Append-only record of a material quantity change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Option<i64>,
    pub material_id: i64,
    pub kind: MovementKind,
    pub quantity: i64,
    pub reference_id: Option<i64>,
    pub notes: String,
    pub created_at: Option<NaiveDateTime>,
}

impl StockMovement {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            material_id: row.get("material_id")?,
            kind: parsed(row, "movement_type")?,
            quantity: row.get("quantity")?,
            reference_id: row.get("reference_id")?,
            notes: text_or_default(row, "notes")?,
            created_at: timestamp(row, "created_at")?,
        })
    }
}
