//! Shared fixtures: a temporary on-disk inventory and seed helpers.

#![allow(dead_code)]

use std::path::PathBuf;

use labstock::model::{AdcSample, Material};
use labstock::{Inventory, StoreSettings};
use tempfile::TempDir;

pub struct TestInventory {
    pub inventory: Inventory,
    pub dir: TempDir,
}

impl TestInventory {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let inventory = Inventory::open_path(dir.path().join("inventory.db"), settings()).expect("Failed to open inventory");
        Self { inventory, dir }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join("inventory.db")
    }

    /// A second, independent handle on the same file (another client).
    pub fn second_client(&self) -> Inventory {
        Inventory::open_path(self.path(), settings()).expect("Failed to open second client")
    }

    pub fn material(&self, name: &str, quantity: i64) -> i64 {
        self.inventory
            .materials()
            .create(&Material::new(name, "Reagent", "mL").with_quantity(quantity))
            .expect("Failed to create material")
    }

    pub fn sample(&self, lot_number: &str, specs: &[(f64, i64)]) -> i64 {
        let sample = specs
            .iter()
            .fold(AdcSample::new(lot_number, format!("S-{lot_number}")), |sample, &(spec_mg, quantity)| {
                sample.with_spec(spec_mg, quantity)
            });
        self.inventory
            .catalog()
            .create(&sample)
            .expect("Failed to create sample")
    }

    /// Vial count read straight from the store, bypassing the cache.
    pub fn stored_vials(&self, lot_number: &str, spec_mg: f64) -> Option<i64> {
        use labstock::StoreExecutor;
        self.inventory
            .store()
            .query_opt(
                "SELECT s.quantity FROM adc_specs s JOIN adc a ON a.id = s.adc_id
                 WHERE a.lot_number = ? AND s.spec_mg = ?",
                &[&lot_number, &spec_mg],
                |row| row.get(0),
            )
            .expect("Failed to query spec-lot")
    }

    pub fn count(&self, table: &str) -> i64 {
        use labstock::StoreExecutor;
        self.inventory
            .store()
            .query_opt(&format!("SELECT COUNT(*) FROM {table}"), &[], |row| row.get(0))
            .expect("Failed to count rows")
            .unwrap_or(0)
    }
}

pub fn settings() -> StoreSettings {
    StoreSettings {
        retry_backoff_ms: 10,
        ..StoreSettings::default()
    }
}
