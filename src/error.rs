//! Error taxonomy for the inventory services.

use std::fmt;

use crate::executor::StoreError;
use crate::model::OrderStatus;
use crate::registry::RegistryError;

/// Kind of record a lookup or uniqueness check refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Material,
    MaterialImage,
    Order,
    OrderLine,
    Sample,
    SpecLot,
    Outbound,
    Inbound,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Material => "material",
            Entity::MaterialImage => "material image",
            Entity::Order => "order",
            Entity::OrderLine => "order line",
            Entity::Sample => "sample",
            Entity::SpecLot => "spec-lot",
            Entity::Outbound => "outbound record",
            Entity::Inbound => "inbound record",
        };
        f.write_str(name)
    }
}

/// What ran short in a failed outbound or order completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StockItem {
    Material { id: i64, name: String },
    SpecLot { lot_number: String, spec_mg: f64 },
}

impl fmt::Display for StockItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockItem::Material { id, name } => write!(f, "material '{name}' (#{id})"),
            StockItem::SpecLot { lot_number, spec_mg } => write!(f, "{lot_number} @ {spec_mg} mg"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shortage {
    pub item: StockItem,
    pub requested: i64,
    pub available: i64,
}

impl fmt::Display for Shortage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: requested {}, available {}",
            self.item, self.requested, self.available
        )
    }
}

/// Errors returned by every service in this crate
///
/// Expected conditions (missing rows, short stock, lost races) have their own
/// variants; only unexpected driver failures end up in [`InventoryError::Store`].
#[derive(Debug)]
pub enum InventoryError {
    /// No connection could be acquired after retries
    StoreUnavailable(StoreError),
    /// Schema creation/upgrade failed; the store is unusable
    SchemaInitFailed(String),
    NotFound { entity: Entity, key: String },
    /// The sample exists but has no spec-lot at this spec
    SpecNotFound { lot_number: String, spec_mg: f64 },
    /// Another writer changed the material after it was read
    VersionConflict { material_id: i64 },
    /// Every short line, not only the first
    InsufficientStock(Vec<Shortage>),
    DuplicateKey { entity: Entity, key: String },
    ValidationFailed(String),
    /// The order is completed or cancelled
    OrderClosed { order_id: i64, status: OrderStatus },
    Registry(RegistryError),
    Store(StoreError),
}

impl fmt::Display for InventoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InventoryError::StoreUnavailable(e) => write!(f, "Store unavailable: {e}"),
            InventoryError::SchemaInitFailed(s) => write!(f, "Schema initialization failed: {s}"),
            InventoryError::NotFound { entity, key } => write!(f, "{entity} {key} not found"),
            InventoryError::SpecNotFound { lot_number, spec_mg } => {
                write!(f, "sample {lot_number} has no {spec_mg} mg spec-lot")
            }
            InventoryError::VersionConflict { material_id } => write!(
                f,
                "material {material_id} was modified by another writer; reload and retry"
            ),
            InventoryError::InsufficientStock(shortages) => {
                write!(f, "insufficient stock: ")?;
                for (i, shortage) in shortages.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{shortage}")?;
                }
                Ok(())
            }
            InventoryError::DuplicateKey { entity, key } => write!(f, "{entity} {key} already exists"),
            InventoryError::ValidationFailed(s) => write!(f, "Validation failed: {s}"),
            InventoryError::OrderClosed { order_id, status } => {
                write!(f, "order {order_id} is {status} and can no longer change")
            }
            InventoryError::Registry(e) => write!(f, "Store registry error: {e}"),
            InventoryError::Store(e) => write!(f, "Store error: {e}"),
        }
    }
}

impl std::error::Error for InventoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InventoryError::StoreUnavailable(e) | InventoryError::Store(e) => Some(e),
            InventoryError::Registry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for InventoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable { .. } => InventoryError::StoreUnavailable(err),
            StoreError::SchemaInit(s) => InventoryError::SchemaInitFailed(s),
            StoreError::InvalidPath(s) => InventoryError::ValidationFailed(s),
            other => InventoryError::Store(other),
        }
    }
}

impl From<rusqlite::Error> for InventoryError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::from(err).into()
    }
}

impl From<RegistryError> for InventoryError {
    fn from(err: RegistryError) -> Self {
        InventoryError::Registry(err)
    }
}

impl InventoryError {
    pub fn not_found(entity: Entity, key: impl fmt::Display) -> Self {
        InventoryError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn duplicate(entity: Entity, key: impl fmt::Display) -> Self {
        InventoryError::DuplicateKey {
            entity,
            key: key.to_string(),
        }
    }

    /// Maps a unique-constraint failure to `DuplicateKey`, anything else through `From`.
    pub(crate) fn or_duplicate(err: StoreError, entity: Entity, key: impl fmt::Display) -> Self {
        if err.is_unique_violation() {
            InventoryError::duplicate(entity, key)
        } else {
            err.into()
        }
    }

    /// Maps a foreign-key failure to `NotFound` of the referenced parent.
    pub(crate) fn or_missing_parent(err: StoreError, entity: Entity, key: impl fmt::Display) -> Self {
        if err.is_foreign_key_violation() {
            InventoryError::not_found(entity, key)
        } else {
            err.into()
        }
    }
}
