//! ADC samples and the spec-lots they own.

use chrono::NaiveDateTime;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use super::{text_or_default, timestamp};

/// Packaging specs (mg per vial) offered to callers when adding stock.
pub const PRESET_SPECS: [f64; 5] = [0.5, 1.0, 2.0, 5.0, 10.0];

/// Vials of one sample at one packaging spec.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdcSpecLot {
    pub id: Option<i64>,
    pub adc_id: i64,
    pub spec_mg: f64,
    pub quantity: i64,
    pub created_at: Option<NaiveDateTime>,
}

impl AdcSpecLot {
    pub fn new(spec_mg: f64, quantity: i64) -> Self {
        Self {
            spec_mg,
            quantity,
            ..Self::default()
        }
    }

    pub fn total_mg(&self) -> f64 {
        self.spec_mg * self.quantity as f64
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            adc_id: row.get("adc_id")?,
            spec_mg: row.get("spec_mg")?,
            quantity: row.get("quantity")?,
            created_at: timestamp(row, "created_at")?,
        })
    }
}

/// An ADC sample, identified by its globally unique lot number.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdcSample {
    pub id: Option<i64>,
    pub lot_number: String,
    /// Not unique; several lots can share a sample id.
    pub sample_id: String,
    pub description: String,
    /// mg/mL
    pub concentration: f64,
    pub owner: String,
    pub storage_temp: String,
    pub storage_position: String,
    pub antibody: String,
    pub linker_payload: String,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
    /// Ordered by spec value.
    pub specs: Vec<AdcSpecLot>,
}

impl AdcSample {
    pub fn new(lot_number: impl Into<String>, sample_id: impl Into<String>) -> Self {
        Self {
            lot_number: lot_number.into(),
            sample_id: sample_id.into(),
            ..Self::default()
        }
    }

    pub fn with_spec(mut self, spec_mg: f64, quantity: i64) -> Self {
        self.specs.push(AdcSpecLot::new(spec_mg, quantity));
        self
    }

    pub fn total_vials(&self) -> i64 {
        self.specs.iter().map(|spec| spec.quantity).sum()
    }

    pub fn total_mg(&self) -> f64 {
        self.specs.iter().map(AdcSpecLot::total_mg).sum()
    }

    pub fn spec(&self, spec_mg: f64) -> Option<&AdcSpecLot> {
        self.specs.iter().find(|spec| spec.spec_mg == spec_mg)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.lot_number.trim().is_empty() {
            return Err("lot number must not be empty".to_string());
        }
        if self.sample_id.trim().is_empty() {
            return Err("sample id must not be empty".to_string());
        }
        if !self.concentration.is_finite() || self.concentration < 0.0 {
            return Err(format!("concentration must be a non-negative number, got {}", self.concentration));
        }
        for (index, spec) in self.specs.iter().enumerate() {
            validate_spec(spec.spec_mg, spec.quantity)?;
            if self.specs[..index].iter().any(|earlier| earlier.spec_mg == spec.spec_mg) {
                return Err(format!("spec {} mg listed more than once", spec.spec_mg));
            }
        }
        Ok(())
    }

    /// Header only; `specs` is filled by the repository.
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            lot_number: row.get("lot_number")?,
            sample_id: row.get("sample_id")?,
            description: text_or_default(row, "description")?,
            concentration: row.get::<_, Option<f64>>("concentration")?.unwrap_or(0.0),
            owner: text_or_default(row, "owner")?,
            storage_temp: text_or_default(row, "storage_temp")?,
            storage_position: text_or_default(row, "storage_position")?,
            antibody: text_or_default(row, "antibody")?,
            linker_payload: text_or_default(row, "linker_payload")?,
            created_at: timestamp(row, "created_at")?,
            updated_at: timestamp(row, "updated_at")?,
            specs: Vec::new(),
        })
    }
}

/// Spec values must be positive and finite; vial counts never negative.
pub(crate) fn validate_spec(spec_mg: f64, quantity: i64) -> Result<(), String> {
    if !spec_mg.is_finite() || spec_mg <= 0.0 {
        return Err(format!("spec must be a positive number of mg, got {spec_mg}"));
    }
    if quantity < 0 {
        return Err(format!("vial count must not be negative, got {quantity}"));
    }
    Ok(())
}
