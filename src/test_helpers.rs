use std::sync::Arc;

use tempfile::TempDir;

use crate::config::StoreSettings;
use crate::store::Store;

/// Fresh on-disk store in its own temporary directory. Keep the directory alive.
pub fn temp_store() -> (TempDir, Arc<Store>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(dir.path().join("inventory.db"), fast_settings()).expect("open store");
    (dir, Arc::new(store))
}

/// Defaults with a short backoff so contention tests finish quickly.
pub fn fast_settings() -> StoreSettings {
    StoreSettings {
        retry_backoff_ms: 10,
        ..StoreSettings::default()
    }
}
