//! SQL for ADC inbound/outbound headers and their items.

use std::collections::HashMap;

use crate::executor::{StoreError, StoreExecutor};
use crate::model::{AdcInboundRecord, AdcMovementItem, AdcOutboundRecord, MovementLine};

/// Header fields of an outbound about to be written.
#[derive(Debug, Clone, Copy)]
pub struct NewOutbound<'a> {
    pub lot_number: &'a str,
    pub requester: &'a str,
    pub operator: &'a str,
    pub shipping_address: &'a str,
    pub notes: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct NewInbound<'a> {
    pub lot_number: &'a str,
    pub operator: &'a str,
    pub owner: &'a str,
    pub storage_position: &'a str,
    pub notes: &'a str,
}

/// `moved_at` is stored as both the movement date and `created_at`.
pub fn insert_outbound<E: StoreExecutor>(
    executor: &E,
    header: &NewOutbound<'_>,
    moved_at: &str,
) -> Result<i64, StoreError> {
    executor.insert(
        "INSERT INTO adc_outbound
             (lot_number, requester, operator, shipping_address, shipping_date, notes, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        &[
            &header.lot_number,
            &header.requester,
            &header.operator,
            &header.shipping_address,
            &moved_at,
            &header.notes,
            &moved_at,
        ],
    )
}

pub fn insert_inbound<E: StoreExecutor>(
    executor: &E,
    header: &NewInbound<'_>,
    moved_at: &str,
) -> Result<i64, StoreError> {
    executor.insert(
        "INSERT INTO adc_inbound
             (lot_number, operator, owner, storage_position, storage_date, notes, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        &[
            &header.lot_number,
            &header.operator,
            &header.owner,
            &header.storage_position,
            &moved_at,
            &header.notes,
            &moved_at,
        ],
    )
}

pub fn insert_outbound_item<E: StoreExecutor>(executor: &E, outbound_id: i64, line: &MovementLine) -> Result<i64, StoreError> {
    executor.insert(
        "INSERT INTO adc_outbound_items (outbound_id, spec_mg, quantity) VALUES (?, ?, ?)",
        &[&outbound_id, &line.spec_mg, &line.quantity],
    )
}

pub fn insert_inbound_item<E: StoreExecutor>(executor: &E, inbound_id: i64, line: &MovementLine) -> Result<i64, StoreError> {
    executor.insert(
        "INSERT INTO adc_inbound_items (inbound_id, spec_mg, quantity) VALUES (?, ?, ?)",
        &[&inbound_id, &line.spec_mg, &line.quantity],
    )
}

pub fn find_outbound<E: StoreExecutor>(executor: &E, id: i64) -> Result<Option<AdcOutboundRecord>, StoreError> {
    let Some(mut record) = executor.query_opt(
        "SELECT * FROM adc_outbound WHERE id = ?",
        &[&id],
        AdcOutboundRecord::from_row,
    )?
    else {
        return Ok(None);
    };
    record.items = executor.query_all(
        "SELECT * FROM adc_outbound_items WHERE outbound_id = ? ORDER BY id",
        &[&id],
        |row| AdcMovementItem::from_row(row, "outbound_id"),
    )?;
    Ok(Some(record))
}

pub fn find_inbound<E: StoreExecutor>(executor: &E, id: i64) -> Result<Option<AdcInboundRecord>, StoreError> {
    let Some(mut record) = executor.query_opt(
        "SELECT * FROM adc_inbound WHERE id = ?",
        &[&id],
        AdcInboundRecord::from_row,
    )?
    else {
        return Ok(None);
    };
    record.items = executor.query_all(
        "SELECT * FROM adc_inbound_items WHERE inbound_id = ? ORDER BY id",
        &[&id],
        |row| AdcMovementItem::from_row(row, "inbound_id"),
    )?;
    Ok(Some(record))
}

/// Outbound records whose lot number contains `lot_filter` (all when `None`), with items.
pub fn find_outbounds<E: StoreExecutor>(executor: &E, lot_filter: Option<&str>) -> Result<Vec<AdcOutboundRecord>, StoreError> {
    let pattern = like_pattern(lot_filter);
    let mut records = executor.query_all(
        "SELECT * FROM adc_outbound WHERE lot_number LIKE ? ESCAPE '\\' ORDER BY created_at DESC, id DESC",
        &[&pattern],
        AdcOutboundRecord::from_row,
    )?;
    let mut items = group_items(executor.query_all(
        "SELECT i.* FROM adc_outbound_items i
         JOIN adc_outbound o ON o.id = i.outbound_id
         WHERE o.lot_number LIKE ? ESCAPE '\\' ORDER BY i.id",
        &[&pattern],
        |row| AdcMovementItem::from_row(row, "outbound_id"),
    )?);
    for record in &mut records {
        record.items = items.remove(&record.id).unwrap_or_default();
    }
    Ok(records)
}

pub fn find_inbounds<E: StoreExecutor>(executor: &E, lot_filter: Option<&str>) -> Result<Vec<AdcInboundRecord>, StoreError> {
    let pattern = like_pattern(lot_filter);
    let mut records = executor.query_all(
        "SELECT * FROM adc_inbound WHERE lot_number LIKE ? ESCAPE '\\' ORDER BY created_at DESC, id DESC",
        &[&pattern],
        AdcInboundRecord::from_row,
    )?;
    let mut items = group_items(executor.query_all(
        "SELECT i.* FROM adc_inbound_items i
         JOIN adc_inbound h ON h.id = i.inbound_id
         WHERE h.lot_number LIKE ? ESCAPE '\\' ORDER BY i.id",
        &[&pattern],
        |row| AdcMovementItem::from_row(row, "inbound_id"),
    )?);
    for record in &mut records {
        record.items = items.remove(&record.id).unwrap_or_default();
    }
    Ok(records)
}

fn like_pattern(filter: Option<&str>) -> String {
    match filter.map(str::trim) {
        Some(needle) if !needle.is_empty() => super::contains_pattern(needle),
        _ => "%".to_string(),
    }
}

fn group_items(items: Vec<AdcMovementItem>) -> HashMap<i64, Vec<AdcMovementItem>> {
    let mut grouped: HashMap<i64, Vec<AdcMovementItem>> = HashMap::new();
    for item in items {
        grouped.entry(item.movement_id).or_default().push(item);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::tests::memory_store;

    #[test]
    fn test_outbound_round_trip_with_items() {
        let conn = memory_store();
        let header = NewOutbound {
            lot_number: "LOT-001",
            requester: "QA",
            operator: "lee",
            shipping_address: "Bldg 2",
            notes: "",
        };
        let id = insert_outbound(&conn, &header, "2024-01-01 10:00:00.000001").expect("header");
        insert_outbound_item(&conn, id, &MovementLine::new(1.0, 4)).expect("item");
        insert_outbound_item(&conn, id, &MovementLine::new(0.5, 2)).expect("item");

        let record = find_outbound(&conn, id).expect("find").expect("present");
        assert_eq!(record.items.len(), 2);
        assert_eq!(record.items[0].quantity, 4);
        assert!(record.shipping_date.is_some());
        assert_eq!(record.shipping_date, record.created_at);
    }

    #[test]
    fn test_lot_filter_is_substring_match() {
        let conn = memory_store();
        for (lot, at) in [("LOT-001", "2024-01-01 10:00:00.000001"), ("LOT-002", "2024-01-01 10:00:00.000002")] {
            let header = NewInbound {
                lot_number: lot,
                operator: "lee",
                owner: "lee",
                storage_position: "F1",
                notes: "",
            };
            let id = insert_inbound(&conn, &header, at).expect("header");
            insert_inbound_item(&conn, id, &MovementLine::new(2.0, 5)).expect("item");
        }

        let all = find_inbounds(&conn, None).expect("all");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].lot_number, "LOT-002");
        assert!(all.iter().all(|record| record.items.len() == 1));

        let filtered = find_inbounds(&conn, Some("002")).expect("filtered");
        assert_eq!(filtered.len(), 1);
        assert!(find_inbounds(&conn, Some("LOT_0")).expect("literal underscore").is_empty());
        assert!(find_inbounds(&conn, Some("%")).expect("literal percent").is_empty());
        assert!(find_outbounds(&conn, Some("LOT")).expect("outbounds").is_empty());
    }
}
