//! SQL for `adc` samples and their `adc_specs` lots.

use crate::executor::{StoreError, StoreExecutor};
use crate::model::{AdcSample, AdcSpecLot};

pub fn insert_sample<E: StoreExecutor>(executor: &E, sample: &AdcSample, now: &str) -> Result<i64, StoreError> {
    executor.insert(
        "INSERT INTO adc
             (lot_number, sample_id, description, concentration, owner, storage_temp,
              storage_position, antibody, linker_payload, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        &[
            &sample.lot_number,
            &sample.sample_id,
            &sample.description,
            &sample.concentration,
            &sample.owner,
            &sample.storage_temp,
            &sample.storage_position,
            &sample.antibody,
            &sample.linker_payload,
            &now,
            &now,
        ],
    )
}

pub fn update_sample<E: StoreExecutor>(executor: &E, id: i64, sample: &AdcSample, now: &str) -> Result<usize, StoreError> {
    executor.execute(
        "UPDATE adc
         SET lot_number = ?, sample_id = ?, description = ?, concentration = ?, owner = ?,
             storage_temp = ?, storage_position = ?, antibody = ?, linker_payload = ?, updated_at = ?
         WHERE id = ?",
        &[
            &sample.lot_number,
            &sample.sample_id,
            &sample.description,
            &sample.concentration,
            &sample.owner,
            &sample.storage_temp,
            &sample.storage_position,
            &sample.antibody,
            &sample.linker_payload,
            &now,
            &id,
        ],
    )
}

pub fn delete_sample<E: StoreExecutor>(executor: &E, id: i64) -> Result<usize, StoreError> {
    executor.execute("DELETE FROM adc WHERE id = ?", &[&id])
}

/// Header only.
pub fn find_by_id<E: StoreExecutor>(executor: &E, id: i64) -> Result<Option<AdcSample>, StoreError> {
    executor.query_opt("SELECT * FROM adc WHERE id = ?", &[&id], AdcSample::from_row)
}

/// Headers, newest first.
pub fn find_all<E: StoreExecutor>(executor: &E) -> Result<Vec<AdcSample>, StoreError> {
    executor.query_all(
        "SELECT * FROM adc ORDER BY created_at DESC, id DESC",
        &[],
        AdcSample::from_row,
    )
}

/// Id of another sample already holding `lot_number`.
pub fn lot_owner<E: StoreExecutor>(executor: &E, lot_number: &str) -> Result<Option<i64>, StoreError> {
    executor.query_opt("SELECT id FROM adc WHERE lot_number = ?", &[&lot_number], |row| row.get(0))
}

pub fn insert_spec<E: StoreExecutor>(
    executor: &E,
    adc_id: i64,
    spec_mg: f64,
    quantity: i64,
    now: &str,
) -> Result<i64, StoreError> {
    executor.insert(
        "INSERT INTO adc_specs (adc_id, spec_mg, quantity, created_at) VALUES (?, ?, ?, ?)",
        &[&adc_id, &spec_mg, &quantity, &now],
    )
}

pub fn update_spec<E: StoreExecutor>(executor: &E, spec_id: i64, spec_mg: f64, quantity: i64) -> Result<usize, StoreError> {
    executor.execute(
        "UPDATE adc_specs SET spec_mg = ?, quantity = ? WHERE id = ?",
        &[&spec_mg, &quantity, &spec_id],
    )
}

pub fn delete_spec<E: StoreExecutor>(executor: &E, spec_id: i64) -> Result<usize, StoreError> {
    executor.execute("DELETE FROM adc_specs WHERE id = ?", &[&spec_id])
}

pub fn delete_specs_of<E: StoreExecutor>(executor: &E, adc_id: i64) -> Result<usize, StoreError> {
    executor.execute("DELETE FROM adc_specs WHERE adc_id = ?", &[&adc_id])
}

pub fn find_spec_by_id<E: StoreExecutor>(executor: &E, spec_id: i64) -> Result<Option<AdcSpecLot>, StoreError> {
    executor.query_opt("SELECT * FROM adc_specs WHERE id = ?", &[&spec_id], AdcSpecLot::from_row)
}

/// Every spec-lot in the store, grouped by sample then spec value.
pub fn find_all_specs<E: StoreExecutor>(executor: &E) -> Result<Vec<AdcSpecLot>, StoreError> {
    executor.query_all(
        "SELECT * FROM adc_specs ORDER BY adc_id, spec_mg, id",
        &[],
        AdcSpecLot::from_row,
    )
}

/// The lot at exactly `spec_mg`; the oldest one if a legacy store holds duplicates.
pub fn find_spec<E: StoreExecutor>(executor: &E, adc_id: i64, spec_mg: f64) -> Result<Option<AdcSpecLot>, StoreError> {
    executor.query_opt(
        "SELECT * FROM adc_specs WHERE adc_id = ? AND spec_mg = ? ORDER BY id LIMIT 1",
        &[&adc_id, &spec_mg],
        AdcSpecLot::from_row,
    )
}

/// Guarded increment: affects no row if the new count would not fit in an `i64`.
///
/// `quantity` must be positive.
pub fn increase_spec<E: StoreExecutor>(executor: &E, spec_id: i64, quantity: i64) -> Result<usize, StoreError> {
    let ceiling = i64::MAX - quantity;
    executor.execute(
        "UPDATE adc_specs SET quantity = quantity + ? WHERE id = ? AND quantity <= ?",
        &[&quantity, &spec_id, &ceiling],
    )
}

/// Compare-and-decrement: affects no row unless `quantity` vials are on hand.
pub fn decrease_spec<E: StoreExecutor>(executor: &E, spec_id: i64, quantity: i64) -> Result<usize, StoreError> {
    executor.execute(
        "UPDATE adc_specs SET quantity = quantity - ? WHERE id = ? AND quantity >= ?",
        &[&quantity, &spec_id, &quantity],
    )
}

pub fn touch_sample<E: StoreExecutor>(executor: &E, id: i64, now: &str) -> Result<usize, StoreError> {
    executor.execute("UPDATE adc SET updated_at = ? WHERE id = ?", &[&now, &id])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::tests::memory_store;

    const NOW: &str = "2024-01-01 00:00:00.000000";

    #[test]
    fn test_lot_number_is_unique() {
        let conn = memory_store();
        insert_sample(&conn, &AdcSample::new("LOT-001", "S-1"), NOW).expect("first");
        let err = insert_sample(&conn, &AdcSample::new("LOT-001", "S-2"), NOW).expect_err("duplicate");
        assert!(err.is_unique_violation());
    }

    #[test]
    fn test_decrease_spec_never_goes_negative() {
        let conn = memory_store();
        let adc_id = insert_sample(&conn, &AdcSample::new("LOT-001", "S-1"), NOW).expect("sample");
        let spec_id = insert_spec(&conn, adc_id, 1.0, 10, NOW).expect("spec");

        assert_eq!(decrease_spec(&conn, spec_id, 11).expect("short"), 0);
        assert_eq!(decrease_spec(&conn, spec_id, 4).expect("enough"), 1);
        assert_eq!(find_spec(&conn, adc_id, 1.0).expect("find").map(|s| s.quantity), Some(6));
        assert_eq!(decrease_spec(&conn, spec_id, 6).expect("exact"), 1);
        assert_eq!(find_spec_by_id(&conn, spec_id).expect("find").map(|s| s.quantity), Some(0));
    }

    #[test]
    fn test_increase_spec_stays_integral() {
        let conn = memory_store();
        let adc_id = insert_sample(&conn, &AdcSample::new("LOT-001", "S-1"), NOW).expect("sample");
        let spec_id = insert_spec(&conn, adc_id, 1.0, 10, NOW).expect("spec");

        assert_eq!(increase_spec(&conn, spec_id, i64::MAX).expect("too many"), 0);
        assert_eq!(increase_spec(&conn, spec_id, i64::MAX - 10).expect("exact fit"), 1);
        assert_eq!(find_spec_by_id(&conn, spec_id).expect("find").map(|s| s.quantity), Some(i64::MAX));
        assert_eq!(increase_spec(&conn, spec_id, 1).expect("full"), 0);
    }

    #[test]
    fn test_specs_cascade_with_sample() {
        let conn = memory_store();
        let adc_id = insert_sample(&conn, &AdcSample::new("LOT-001", "S-1"), NOW).expect("sample");
        insert_spec(&conn, adc_id, 2.0, 1, NOW).expect("spec");
        insert_spec(&conn, adc_id, 0.5, 3, NOW).expect("spec");

        let specs = find_all_specs(&conn).expect("specs");
        assert_eq!(specs.iter().map(|s| s.spec_mg).collect::<Vec<_>>(), vec![0.5, 2.0]);

        delete_sample(&conn, adc_id).expect("delete");
        assert!(find_all_specs(&conn).expect("all specs").is_empty());
    }

    #[test]
    fn test_spec_requires_existing_sample() {
        let conn = memory_store();
        let err = insert_spec(&conn, 999, 1.0, 1, NOW).expect_err("orphan spec");
        assert!(err.is_foreign_key_violation());
    }
}
