//! Domain records and the value types shared by the repositories.
//!
//! Timestamps are written by this crate as UTC text with microsecond precision
//! (`2024-03-01 09:30:00.123456`). Rows written by older clients may carry
//! second precision or a `T` separator; [`parse_timestamp`] accepts both.

pub mod adc;
pub mod material;
pub mod movement;
pub mod order;

pub use adc::{AdcSample, AdcSpecLot, PRESET_SPECS};
pub use material::{Material, MaterialImage, MovementKind, StockMovement};
pub use movement::{AdcInboundRecord, AdcMovementItem, AdcOutboundRecord, LedgerEntry, MovementLine};
pub use order::{generate_order_number, Order, OrderLine, OrderStatus, Priority};

use chrono::{NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const LEGACY_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

/// Current UTC time in the stored text form.
pub fn now_timestamp() -> String {
    format_timestamp(&Utc::now().naive_utc())
}

pub fn format_timestamp(at: &NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    LEGACY_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

/// Optimistic-lock token for a material: its `updated_at` text as stored.
///
/// Two writes that land in the same microsecond produce the same token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A text column held a value outside a closed set (status, priority, kind).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

// Row helpers shared by the `from_row` constructors.

pub(crate) fn text_or_default(row: &Row<'_>, column: &str) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(column)?.unwrap_or_default())
}

pub(crate) fn timestamp(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<NaiveDateTime>> {
    Ok(row
        .get::<_, Option<String>>(column)?
        .as_deref()
        .and_then(parse_timestamp))
}

pub(crate) fn parsed<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: String = row.get(column)?;
    raw.parse().map_err(|err: UnknownVariant| {
        let index = row.as_ref().column_index(column).unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
    })
}
