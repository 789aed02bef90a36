//! One entry point wiring every service to a single shared store.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::catalog::SampleCatalog;
use crate::config::{EngineConfig, StoreSettings};
use crate::error::InventoryError;
use crate::fulfillment::OrderCoordinator;
use crate::ledger::StockLedger;
use crate::material::MaterialService;
use crate::registry::StoreRegistry;
use crate::schema::SchemaReport;
use crate::store::Store;

/// Registry file plus its parsed contents.
#[derive(Debug)]
struct RegistryBinding {
    file: PathBuf,
    registry: StoreRegistry,
}

impl RegistryBinding {
    /// Relative store paths in the registry resolve against its directory.
    fn base(&self) -> &Path {
        self.file.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// The inventory core
///
/// # Examples
///
/// ```no_run
/// use labstock::config::EngineConfig;
/// use labstock::ledger::OutboundRequest;
/// use labstock::model::MovementLine;
/// use labstock::Inventory;
///
/// let inventory = Inventory::open(&EngineConfig::load()?)?;
/// let request = OutboundRequest::new("LOT-001", vec![MovementLine::new(1.0, 4)]);
/// let outbound_id = inventory.ledger().apply_outbound(&request)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Inventory {
    store: Arc<Store>,
    catalog: Arc<SampleCatalog>,
    ledger: StockLedger,
    materials: MaterialService,
    orders: OrderCoordinator,
    registry: Option<Mutex<RegistryBinding>>,
}

impl Inventory {
    /// Opens the current store named by the registry file in `config`.
    pub fn open(config: &EngineConfig) -> Result<Self, InventoryError> {
        let file = config.store.registry_path.clone();
        let binding = RegistryBinding {
            registry: StoreRegistry::load(&file),
            file,
        };
        let path = binding.registry.current_path(binding.base());
        let store = Store::open(&path, config.store.clone())?;
        Ok(Self::assemble(store, Some(binding)))
    }

    /// Opens one store file directly, without a registry.
    pub fn open_path(path: impl AsRef<Path>, settings: StoreSettings) -> Result<Self, InventoryError> {
        let store = Store::open(path, settings)?;
        Ok(Self::assemble(store, None))
    }

    fn assemble(store: Store, registry: Option<RegistryBinding>) -> Self {
        let store = Arc::new(store);
        let catalog = Arc::new(SampleCatalog::new(store.clone()));
        Self {
            ledger: StockLedger::new(store.clone(), catalog.clone()),
            materials: MaterialService::new(store.clone()),
            orders: OrderCoordinator::new(store.clone()),
            catalog,
            store,
            registry: registry.map(Mutex::new),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn materials(&self) -> &MaterialService {
        &self.materials
    }

    pub fn orders(&self) -> &OrderCoordinator {
        &self.orders
    }

    pub fn catalog(&self) -> &SampleCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &StockLedger {
        &self.ledger
    }

    /// Snapshot of the registry, if this inventory was opened through one.
    pub fn registry(&self) -> Option<StoreRegistry> {
        self.registry
            .as_ref()
            .map(|binding| binding.lock().unwrap_or_else(PoisonError::into_inner).registry.clone())
    }

    /// Points every service at another store file and drops cached samples.
    pub fn switch_store(&self, path: impl AsRef<Path>) -> Result<SchemaReport, InventoryError> {
        let report = self.store.switch_to(path)?;
        self.catalog.invalidate();
        Ok(report)
    }

    /// Switches to registry entry `index` and records it as current.
    ///
    /// # Errors
    ///
    /// `Registry` for an unknown index, or when the registry file cannot be
    /// written. The store switch itself has happened in the latter case.
    pub fn switch_database(&self, index: usize) -> Result<PathBuf, InventoryError> {
        let mut binding = self.binding()?;
        let path = binding.registry.path_at(index, binding.base())?;
        self.switch_store(&path)?;
        binding.registry.set_current(index)?;
        binding.registry.save(&binding.file)?;
        log::info!("current store is now #{index} ({})", path.display());
        Ok(path)
    }

    /// Registers another store file and returns its index.
    pub fn add_database(&self, name: &str, path: &str) -> Result<usize, InventoryError> {
        let mut binding = self.binding()?;
        let index = binding.registry.add(name, path)?;
        binding.registry.save(&binding.file)?;
        Ok(index)
    }

    /// Unregisters a store file. Removing the current entry switches to the
    /// entry that becomes current.
    pub fn remove_database(&self, index: usize) -> Result<(), InventoryError> {
        let mut binding = self.binding()?;
        binding.registry.remove(index)?;
        let path = binding.registry.current_path(binding.base());
        if path != self.store.path() {
            self.switch_store(&path)?;
        }
        binding.registry.save(&binding.file)?;
        Ok(())
    }

    fn binding(&self) -> Result<std::sync::MutexGuard<'_, RegistryBinding>, InventoryError> {
        self.registry
            .as_ref()
            .map(|binding| binding.lock().unwrap_or_else(PoisonError::into_inner))
            .ok_or_else(|| InventoryError::ValidationFailed("inventory was opened without a store registry".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AdcSample;
    use crate::registry::StoreEntry;
    use crate::test_helpers::fast_settings;

    fn config_with_registry(dir: &Path) -> EngineConfig {
        let registry = StoreRegistry {
            databases: vec![
                StoreEntry {
                    name: "Main".to_string(),
                    path: "main.db".to_string(),
                },
                StoreEntry {
                    name: "Archive".to_string(),
                    path: "archive.db".to_string(),
                },
            ],
            current_database: 0,
        };
        let file = dir.join("config.json");
        registry.save(&file).expect("save registry");
        EngineConfig {
            store: StoreSettings {
                registry_path: file,
                ..fast_settings()
            },
        }
    }

    #[test]
    fn test_open_resolves_registry_relative_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inventory = Inventory::open(&config_with_registry(dir.path())).expect("open");
        assert_eq!(inventory.store().path(), dir.path().join("main.db"));
        assert!(dir.path().join("main.db").exists());
    }

    #[test]
    fn test_switch_database_drops_cached_samples() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_with_registry(dir.path());
        let inventory = Inventory::open(&config).expect("open");
        inventory.catalog().create(&AdcSample::new("LOT-001", "S-1")).expect("sample");
        assert_eq!(inventory.catalog().get_all().expect("all").len(), 1);

        let path = inventory.switch_database(1).expect("switch");
        assert_eq!(path, dir.path().join("archive.db"));
        assert!(inventory.catalog().get_all().expect("all").is_empty());

        let saved = StoreRegistry::load(&config.store.registry_path);
        assert_eq!(saved.current_database, 1);

        assert!(matches!(
            inventory.switch_database(7),
            Err(InventoryError::Registry(_))
        ));
        assert_eq!(inventory.store().path(), dir.path().join("archive.db"));
    }

    #[test]
    fn test_remove_current_database_switches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inventory = Inventory::open(&config_with_registry(dir.path())).expect("open");
        let index = inventory.add_database("Scratch", "scratch.db").expect("add");
        assert_eq!(index, 2);
        assert!(inventory.add_database("Again", "scratch.db").is_err());

        inventory.remove_database(0).expect("remove current");
        let registry = inventory.registry().expect("registry");
        assert_eq!(registry.databases.len(), 2);
        assert_eq!(inventory.store().path(), dir.path().join("archive.db"));
    }

    #[test]
    fn test_open_path_has_no_registry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inventory = Inventory::open_path(dir.path().join("solo.db"), fast_settings()).expect("open");
        assert!(inventory.registry().is_none());
        assert!(matches!(
            inventory.switch_database(0),
            Err(InventoryError::ValidationFailed(_))
        ));
    }
}
