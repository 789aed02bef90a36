//! Read-through cache of ADC samples.
//!
//! The catalog keeps every sample, with its spec-lots, in memory. Reads never
//! touch the store once the index is loaded. Every mutation, here or in the
//! [`StockLedger`](crate::ledger::StockLedger), ends by discarding the index
//! and loading it again from scratch: rebuild cost grows with the number of
//! samples, which is the accepted ceiling of this design.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use rusqlite::Connection;

use crate::error::{Entity, InventoryError};
use crate::model::adc::validate_spec;
use crate::model::{now_timestamp, AdcSample, AdcSpecLot, PRESET_SPECS};
use crate::repository::adc;
use crate::store::Store;
use crate::transaction;

/// Text field a sample search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleField {
    SampleId,
    Antibody,
    LinkerPayload,
    LotNumber,
}

impl SampleField {
    fn of(self, sample: &AdcSample) -> &str {
        match self {
            SampleField::SampleId => &sample.sample_id,
            SampleField::Antibody => &sample.antibody,
            SampleField::LinkerPayload => &sample.linker_payload,
            SampleField::LotNumber => &sample.lot_number,
        }
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    by_id: HashMap<i64, AdcSample>,
    /// Newest first.
    ordered: Vec<i64>,
    initialized: bool,
}

impl CatalogState {
    fn load(store: &Store) -> Result<Self, InventoryError> {
        store.with_connection(|conn: &mut Connection| {
            // One read transaction so samples and spec-lots come from the same snapshot.
            let tx = conn.transaction()?;
            let samples = adc::find_all(&tx)?;
            let specs = adc::find_all_specs(&tx)?;
            drop(tx);

            let mut grouped: HashMap<i64, Vec<AdcSpecLot>> = HashMap::new();
            for spec in specs {
                grouped.entry(spec.adc_id).or_default().push(spec);
            }

            let mut state = CatalogState {
                initialized: true,
                ..CatalogState::default()
            };
            for mut sample in samples {
                let Some(id) = sample.id else { continue };
                sample.specs = grouped.remove(&id).unwrap_or_default();
                state.ordered.push(id);
                state.by_id.insert(id, sample);
            }
            log::debug!("sample catalog loaded {} sample(s)", state.ordered.len());
            Ok(state)
        })
    }

    fn samples(&self) -> impl Iterator<Item = &AdcSample> {
        self.ordered.iter().filter_map(|id| self.by_id.get(id))
    }
}

/// In-memory view of ADC samples over a shared [`Store`].
#[derive(Debug)]
pub struct SampleCatalog {
    store: Arc<Store>,
    state: RwLock<CatalogState>,
}

impl SampleCatalog {
    /// The index is loaded lazily on the first read.
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            state: RwLock::new(CatalogState::default()),
        }
    }

    pub fn preset_specs() -> &'static [f64] {
        &PRESET_SPECS
    }

    pub fn get(&self, id: i64) -> Result<Option<AdcSample>, InventoryError> {
        self.read(|state| state.by_id.get(&id).cloned())
    }

    pub fn get_by_lot_number(&self, lot_number: &str) -> Result<Option<AdcSample>, InventoryError> {
        self.read(|state| {
            state
                .samples()
                .find(|sample| sample.lot_number == lot_number)
                .cloned()
        })
    }

    /// All samples, newest first.
    pub fn get_all(&self) -> Result<Vec<AdcSample>, InventoryError> {
        self.read(|state| state.samples().cloned().collect())
    }

    /// Case-insensitive substring match on one field; a blank needle matches everything.
    pub fn search_by(&self, field: SampleField, needle: &str) -> Result<Vec<AdcSample>, InventoryError> {
        let needle = needle.trim().to_lowercase();
        self.read(|state| {
            state
                .samples()
                .filter(|sample| needle.is_empty() || field.of(sample).to_lowercase().contains(&needle))
                .cloned()
                .collect()
        })
    }

    /// Σ spec × vials of one sample, `None` when the sample is unknown.
    pub fn total_mg(&self, id: i64) -> Result<Option<f64>, InventoryError> {
        self.read(|state| state.by_id.get(&id).map(AdcSample::total_mg))
    }

    pub fn total_vials(&self, id: i64) -> Result<Option<i64>, InventoryError> {
        self.read(|state| state.by_id.get(&id).map(AdcSample::total_vials))
    }

    /// Stores a new sample with its spec-lots and returns its id.
    ///
    /// # Errors
    ///
    /// `DuplicateKey` if the lot number is taken, `ValidationFailed` for
    /// malformed fields or spec-lots.
    pub fn create(&self, sample: &AdcSample) -> Result<i64, InventoryError> {
        sample.validate().map_err(InventoryError::ValidationFailed)?;
        let now = now_timestamp();

        let id = self.store.with_connection(|conn| {
            transaction::immediate(conn, |tx| {
                if adc::lot_owner(tx, &sample.lot_number)?.is_some() {
                    return Err(InventoryError::duplicate(Entity::Sample, &sample.lot_number));
                }
                let id = adc::insert_sample(tx, sample, &now)
                    .map_err(|err| InventoryError::or_duplicate(err, Entity::Sample, &sample.lot_number))?;
                for spec in &sample.specs {
                    adc::insert_spec(tx, id, spec.spec_mg, spec.quantity, &now)?;
                }
                Ok(id)
            })
        })?;

        log::info!("created sample {} (#{id})", sample.lot_number);
        self.reload_after_mutation();
        Ok(id)
    }

    /// Replaces the header fields and the whole spec-lot set of sample `id`.
    ///
    /// An empty `specs` list removes every spec-lot.
    ///
    /// # Errors
    ///
    /// `NotFound` if the sample is gone, `DuplicateKey` if the new lot number
    /// belongs to another sample.
    pub fn update(&self, id: i64, sample: &AdcSample) -> Result<(), InventoryError> {
        sample.validate().map_err(InventoryError::ValidationFailed)?;
        let now = now_timestamp();

        self.store.with_connection(|conn| {
            transaction::immediate(conn, |tx| {
                if adc::find_by_id(tx, id)?.is_none() {
                    return Err(InventoryError::not_found(Entity::Sample, id));
                }
                match adc::lot_owner(tx, &sample.lot_number)? {
                    Some(owner) if owner != id => {
                        return Err(InventoryError::duplicate(Entity::Sample, &sample.lot_number));
                    }
                    _ => {}
                }
                adc::update_sample(tx, id, sample, &now)
                    .map_err(|err| InventoryError::or_duplicate(err, Entity::Sample, &sample.lot_number))?;
                adc::delete_specs_of(tx, id)?;
                for spec in &sample.specs {
                    adc::insert_spec(tx, id, spec.spec_mg, spec.quantity, &now)?;
                }
                Ok(())
            })
        })?;

        log::info!("updated sample {} (#{id})", sample.lot_number);
        self.reload_after_mutation();
        Ok(())
    }

    /// Deletes the sample and, by cascade, its spec-lots. Movement history is kept.
    pub fn delete(&self, id: i64) -> Result<(), InventoryError> {
        if adc::delete_sample(self.store.as_ref(), id)? == 0 {
            return Err(InventoryError::not_found(Entity::Sample, id));
        }
        log::info!("deleted sample #{id}");
        self.reload_after_mutation();
        Ok(())
    }

    /// Adds a spec-lot to sample `adc_id`; one lot per spec value.
    pub fn add_spec(&self, adc_id: i64, spec_mg: f64, quantity: i64) -> Result<i64, InventoryError> {
        validate_spec(spec_mg, quantity).map_err(InventoryError::ValidationFailed)?;
        let now = now_timestamp();

        let spec_id = self.store.with_connection(|conn| {
            transaction::immediate(conn, |tx| {
                let sample = adc::find_by_id(tx, adc_id)?
                    .ok_or_else(|| InventoryError::not_found(Entity::Sample, adc_id))?;
                if adc::find_spec(tx, adc_id, spec_mg)?.is_some() {
                    return Err(InventoryError::duplicate(
                        Entity::SpecLot,
                        format!("{} @ {spec_mg} mg", sample.lot_number),
                    ));
                }
                let spec_id = adc::insert_spec(tx, adc_id, spec_mg, quantity, &now)?;
                adc::touch_sample(tx, adc_id, &now)?;
                Ok(spec_id)
            })
        })?;

        self.reload_after_mutation();
        Ok(spec_id)
    }

    /// Direct correction of a spec-lot's spec value and vial count.
    pub fn update_spec(&self, spec_id: i64, spec_mg: f64, quantity: i64) -> Result<(), InventoryError> {
        validate_spec(spec_mg, quantity).map_err(InventoryError::ValidationFailed)?;
        let now = now_timestamp();

        self.store.with_connection(|conn| {
            transaction::immediate(conn, |tx| {
                let current = adc::find_spec_by_id(tx, spec_id)?
                    .ok_or_else(|| InventoryError::not_found(Entity::SpecLot, spec_id))?;
                if let Some(clash) = adc::find_spec(tx, current.adc_id, spec_mg)? {
                    if clash.id != Some(spec_id) {
                        return Err(InventoryError::duplicate(
                            Entity::SpecLot,
                            format!("sample #{} @ {spec_mg} mg", current.adc_id),
                        ));
                    }
                }
                adc::update_spec(tx, spec_id, spec_mg, quantity)?;
                adc::touch_sample(tx, current.adc_id, &now)?;
                Ok(())
            })
        })?;

        self.reload_after_mutation();
        Ok(())
    }

    pub fn delete_spec(&self, spec_id: i64) -> Result<(), InventoryError> {
        let now = now_timestamp();
        self.store.with_connection(|conn| {
            transaction::immediate(conn, |tx| {
                let current = adc::find_spec_by_id(tx, spec_id)?
                    .ok_or_else(|| InventoryError::not_found(Entity::SpecLot, spec_id))?;
                adc::delete_spec(tx, spec_id)?;
                adc::touch_sample(tx, current.adc_id, &now)?;
                Ok::<_, InventoryError>(())
            })
        })?;

        self.reload_after_mutation();
        Ok(())
    }

    /// Reloads the whole index now.
    ///
    /// The load runs under the write guard, so concurrent reloads install
    /// their snapshots in the order they were read and the last one wins.
    ///
    /// # Errors
    ///
    /// Propagates the store failure; the previous index is left in place.
    pub fn refresh(&self) -> Result<(), InventoryError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = CatalogState::load(&self.store)?;
        Ok(())
    }

    /// Drops the index; the next read loads it again.
    pub fn invalidate(&self) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = CatalogState::default();
    }

    /// Called after every committed mutation.
    ///
    /// The write already succeeded, so a failed reload is not reported to the
    /// caller. The index is dropped instead and the next read retries the load.
    pub(crate) fn reload_after_mutation(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = CatalogState::load(&self.store).unwrap_or_else(|err| {
            log::warn!("sample catalog reload failed, will reload on next read: {err}");
            CatalogState::default()
        });
    }

    fn read<T>(&self, f: impl FnOnce(&CatalogState) -> T) -> Result<T, InventoryError> {
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if state.initialized {
                return Ok(f(&state));
            }
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.initialized {
            *state = CatalogState::load(&self.store)?;
        }
        Ok(f(&state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::StoreExecutor;
    use crate::test_helpers::temp_store;

    fn sample(lot: &str, sample_id: &str) -> AdcSample {
        AdcSample {
            antibody: "Trastuzumab".to_string(),
            linker_payload: "vc-MMAE".to_string(),
            concentration: 5.0,
            ..AdcSample::new(lot, sample_id)
        }
    }

    #[test]
    fn test_create_then_read_from_cache() {
        let (_dir, store) = temp_store();
        let catalog = SampleCatalog::new(store);

        let id = catalog
            .create(&sample("LOT-001", "S-1").with_spec(1.0, 10).with_spec(0.5, 4))
            .expect("create");

        let cached = catalog.get(id).expect("get").expect("present");
        assert_eq!(cached.lot_number, "LOT-001");
        assert_eq!(cached.specs.len(), 2);
        assert_eq!(cached.specs[0].spec_mg, 0.5);
        assert_eq!(catalog.total_vials(id).expect("vials"), Some(14));
        assert_eq!(catalog.total_mg(id).expect("mg"), Some(12.0));
    }

    #[test]
    fn test_duplicate_lot_rejected() {
        let (_dir, store) = temp_store();
        let catalog = SampleCatalog::new(store);
        catalog.create(&sample("LOT-001", "S-1")).expect("first");

        let err = catalog.create(&sample("LOT-001", "S-2")).expect_err("duplicate");
        assert!(matches!(err, InventoryError::DuplicateKey { entity: Entity::Sample, .. }));
        assert_eq!(catalog.get_all().expect("all").len(), 1);
    }

    #[test]
    fn test_update_replaces_specs_and_guards_lot_number() {
        let (_dir, store) = temp_store();
        let catalog = SampleCatalog::new(store);
        let first = catalog.create(&sample("LOT-001", "S-1").with_spec(1.0, 10)).expect("first");
        catalog.create(&sample("LOT-002", "S-2")).expect("second");

        let mut edited = catalog.get(first).expect("get").expect("present");
        edited.lot_number = "LOT-002".to_string();
        let err = catalog.update(first, &edited).expect_err("taken lot");
        assert!(matches!(err, InventoryError::DuplicateKey { .. }));

        edited.lot_number = "LOT-001A".to_string();
        edited.specs = vec![AdcSpecLot::new(2.0, 3)];
        catalog.update(first, &edited).expect("update");

        let reloaded = catalog.get(first).expect("get").expect("present");
        assert_eq!(reloaded.lot_number, "LOT-001A");
        assert_eq!(reloaded.specs.len(), 1);
        assert_eq!(reloaded.specs[0].spec_mg, 2.0);
        assert_eq!(reloaded.specs[0].quantity, 3);

        let err = catalog.update(9_999, &edited).expect_err("missing");
        assert!(matches!(err, InventoryError::NotFound { .. }));
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let (_dir, store) = temp_store();
        let catalog = SampleCatalog::new(store);
        catalog.create(&sample("LOT-001", "HER2-a")).expect("one");
        catalog
            .create(&AdcSample {
                antibody: "Rituximab".to_string(),
                ..AdcSample::new("LOT-002", "CD20-b")
            })
            .expect("two");

        assert_eq!(catalog.search_by(SampleField::SampleId, "her2").expect("search").len(), 1);
        assert_eq!(catalog.search_by(SampleField::Antibody, "XIMAB").expect("search").len(), 1);
        assert_eq!(catalog.search_by(SampleField::LotNumber, "lot-").expect("search").len(), 2);
        assert_eq!(catalog.search_by(SampleField::LinkerPayload, "mmae").expect("search").len(), 1);
        assert_eq!(catalog.search_by(SampleField::LotNumber, "").expect("search").len(), 2);
    }

    #[test]
    fn test_reads_served_from_memory_until_refresh() {
        let (_dir, store) = temp_store();
        let catalog = SampleCatalog::new(store.clone());
        let id = catalog.create(&sample("LOT-001", "S-1").with_spec(1.0, 10)).expect("create");

        // Out-of-band write the catalog cannot see.
        StoreExecutor::execute(store.as_ref(), "UPDATE adc_specs SET quantity = 3 WHERE adc_id = ?", &[&id])
            .expect("raw update");
        assert_eq!(catalog.total_vials(id).expect("cached"), Some(10));

        catalog.refresh().expect("refresh");
        assert_eq!(catalog.total_vials(id).expect("fresh"), Some(3));

        StoreExecutor::execute(store.as_ref(), "UPDATE adc_specs SET quantity = 1 WHERE adc_id = ?", &[&id])
            .expect("raw update");
        catalog.invalidate();
        assert_eq!(catalog.total_vials(id).expect("reloaded"), Some(1));
    }

    #[test]
    fn test_spec_lot_lifecycle() {
        let (_dir, store) = temp_store();
        let catalog = SampleCatalog::new(store);
        let id = catalog.create(&sample("LOT-001", "S-1")).expect("create");

        let spec_id = catalog.add_spec(id, 1.0, 10).expect("add");
        let err = catalog.add_spec(id, 1.0, 1).expect_err("same spec twice");
        assert!(matches!(err, InventoryError::DuplicateKey { entity: Entity::SpecLot, .. }));
        assert!(matches!(
            catalog.add_spec(id, 1.0, -1),
            Err(InventoryError::ValidationFailed(_))
        ));

        catalog.update_spec(spec_id, 2.0, 7).expect("update");
        let cached = catalog.get(id).expect("get").expect("present");
        assert_eq!(cached.spec(2.0).map(|spec| spec.quantity), Some(7));

        catalog.delete_spec(spec_id).expect("delete");
        assert!(catalog.get(id).expect("get").expect("present").specs.is_empty());
        assert!(matches!(
            catalog.delete_spec(spec_id),
            Err(InventoryError::NotFound { entity: Entity::SpecLot, .. })
        ));
    }

    #[test]
    fn test_delete_sample() {
        let (_dir, store) = temp_store();
        let catalog = SampleCatalog::new(store);
        let id = catalog.create(&sample("LOT-001", "S-1").with_spec(1.0, 1)).expect("create");

        catalog.delete(id).expect("delete");
        assert!(catalog.get(id).expect("get").is_none());
        assert!(catalog.get_by_lot_number("LOT-001").expect("by lot").is_none());
        assert!(matches!(catalog.delete(id), Err(InventoryError::NotFound { .. })));
    }
}
