//! # labstock
//!
//! Persistence and consistency core for a lab inventory: materials, orders
//! and ADC sample stock kept in one SQLite file shared by several clients.
//!
//! * [`Store`] acquires tuned connections with busy retry and runs atomic
//!   statement batches.
//! * [`schema`] creates and additively upgrades the tables on open.
//! * [`repository`] holds the SQL for each entity.
//! * [`SampleCatalog`] serves ADC samples from memory and rebuilds after every write.
//! * [`StockLedger`] applies inbound/outbound vial movements without ever
//!   taking a spec-lot below zero.
//! * [`MaterialService`] guards material edits with a version token.
//! * [`OrderCoordinator`] completes orders as one all-or-nothing unit.
//!
//! [`Inventory`] wires all of them to one shared store.

pub mod catalog;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod fulfillment;
pub mod inventory;
pub mod ledger;
pub mod material;
pub mod metrics;
pub mod model;
pub mod registry;
pub mod repository;
pub mod schema;
pub mod store;
pub mod transaction;

#[cfg(test)]
mod test_helpers;

pub use catalog::{SampleCatalog, SampleField};
pub use config::{EngineConfig, StoreSettings};
pub use error::{Entity, InventoryError, Shortage, StockItem};
pub use executor::{StoreError, StoreExecutor};
pub use fulfillment::OrderCoordinator;
pub use inventory::Inventory;
pub use ledger::{InboundRequest, OutboundRequest, StockLedger};
pub use material::MaterialService;
pub use registry::StoreRegistry;
pub use store::Store;
pub use transaction::Statement;
