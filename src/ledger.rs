//! ADC stock ledger: inbound and outbound movements of spec-lot vials.
//!
//! Every movement is validated and applied inside one IMMEDIATE transaction.
//! An outbound never takes a spec-lot below zero: all lines are checked
//! before anything is written, and each decrement is additionally a
//! compare-and-decrement statement. Committed movements refresh the
//! [`SampleCatalog`].

use std::sync::Arc;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::SampleCatalog;
use crate::error::{Entity, InventoryError, Shortage, StockItem};
use crate::model::{now_timestamp, AdcInboundRecord, AdcOutboundRecord, LedgerEntry, MovementLine};
use crate::repository::adc;
use crate::repository::adc_movement::{self, NewInbound, NewOutbound};
use crate::store::Store;
use crate::transaction;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutboundRequest {
    pub lot_number: String,
    pub lines: Vec<MovementLine>,
    pub requester: String,
    pub operator: String,
    pub address: String,
    pub notes: String,
}

impl OutboundRequest {
    pub fn new(lot_number: impl Into<String>, lines: Vec<MovementLine>) -> Self {
        Self {
            lot_number: lot_number.into(),
            lines,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundRequest {
    pub lot_number: String,
    pub lines: Vec<MovementLine>,
    pub operator: String,
    /// Falls back to `operator` when blank.
    pub owner: String,
    pub position: String,
    pub notes: String,
}

impl InboundRequest {
    pub fn new(lot_number: impl Into<String>, lines: Vec<MovementLine>) -> Self {
        Self {
            lot_number: lot_number.into(),
            lines,
            ..Self::default()
        }
    }
}

/// Normalizes untyped `{"spec_mg", "quantity"}` records into movement lines.
///
/// # Errors
///
/// `ValidationFailed` naming the first malformed record.
pub fn lines_from_json(records: &[Value]) -> Result<Vec<MovementLine>, InventoryError> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            MovementLine::try_from(record)
                .map_err(|reason| InventoryError::ValidationFailed(format!("line {index}: {reason}")))
        })
        .collect()
}

#[derive(Debug)]
pub struct StockLedger {
    store: Arc<Store>,
    catalog: Arc<SampleCatalog>,
}

impl StockLedger {
    pub fn new(store: Arc<Store>, catalog: Arc<SampleCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Ships vials of one sample and returns the new outbound record id.
    ///
    /// # Errors
    ///
    /// * `NotFound` - no sample carries the lot number
    /// * `SpecNotFound` - a line names a spec the sample has no lot for
    /// * `InsufficientStock` - one entry per spec whose vials do not cover the request
    ///
    /// Stock is untouched whenever an error is returned.
    pub fn apply_outbound(&self, request: &OutboundRequest) -> Result<i64, InventoryError> {
        validate_lines(&request.lot_number, &request.lines)?;
        let demand = demand_by_spec(&request.lines)?;
        let now = now_timestamp();

        let outbound_id = self.store.with_connection(|conn| {
            transaction::immediate(conn, |tx| {
                let sample_id = adc::lot_owner(tx, &request.lot_number)?
                    .ok_or_else(|| InventoryError::not_found(Entity::Sample, &request.lot_number))?;

                #[cfg(feature = "tracing")]
                let _span = tracing_helpers::composite_span("adc_outbound", sample_id).entered();

                let mut resolved = Vec::with_capacity(demand.len());
                for &(spec_mg, requested) in &demand {
                    let lot = adc::find_spec(tx, sample_id, spec_mg)?.ok_or_else(|| InventoryError::SpecNotFound {
                        lot_number: request.lot_number.clone(),
                        spec_mg,
                    })?;
                    resolved.push((lot, requested));
                }

                let shortages: Vec<Shortage> = resolved
                    .iter()
                    .filter(|(lot, requested)| lot.quantity < *requested)
                    .map(|(lot, requested)| shortage(&request.lot_number, lot.spec_mg, *requested, lot.quantity))
                    .collect();
                if !shortages.is_empty() {
                    return Err(InventoryError::InsufficientStock(shortages));
                }

                let header = NewOutbound {
                    lot_number: &request.lot_number,
                    requester: &request.requester,
                    operator: &request.operator,
                    shipping_address: &request.address,
                    notes: &request.notes,
                };
                let outbound_id = adc_movement::insert_outbound(tx, &header, &now)?;
                for line in &request.lines {
                    adc_movement::insert_outbound_item(tx, outbound_id, line)?;
                }

                for (lot, requested) in &resolved {
                    let spec_id = lot.id.unwrap_or_default();
                    if adc::decrease_spec(tx, spec_id, *requested)? == 0 {
                        let available = adc::find_spec_by_id(tx, spec_id)?.map_or(0, |lot| lot.quantity);
                        return Err(InventoryError::InsufficientStock(vec![shortage(
                            &request.lot_number,
                            lot.spec_mg,
                            *requested,
                            available,
                        )]));
                    }
                }
                adc::touch_sample(tx, sample_id, &now)?;
                Ok(outbound_id)
            })
        })?;

        log::info!(
            "outbound #{outbound_id}: {} vial(s) of {}",
            vial_count(&demand),
            request.lot_number
        );
        self.catalog.reload_after_mutation();
        Ok(outbound_id)
    }

    /// Receives vials of one sample and returns the new inbound record id.
    ///
    /// Missing spec-lots are created. A receipt that would push a spec-lot
    /// past `i64::MAX` vials is rejected with `ValidationFailed`.
    pub fn apply_inbound(&self, request: &InboundRequest) -> Result<i64, InventoryError> {
        validate_lines(&request.lot_number, &request.lines)?;
        let demand = demand_by_spec(&request.lines)?;
        let owner = if request.owner.trim().is_empty() {
            request.operator.as_str()
        } else {
            request.owner.as_str()
        };
        let now = now_timestamp();

        let inbound_id = self.store.with_connection(|conn| {
            transaction::immediate(conn, |tx| {
                let sample_id = adc::lot_owner(tx, &request.lot_number)?
                    .ok_or_else(|| InventoryError::not_found(Entity::Sample, &request.lot_number))?;

                #[cfg(feature = "tracing")]
                let _span = tracing_helpers::composite_span("adc_inbound", sample_id).entered();

                let header = NewInbound {
                    lot_number: &request.lot_number,
                    operator: &request.operator,
                    owner,
                    storage_position: &request.position,
                    notes: &request.notes,
                };
                let inbound_id = adc_movement::insert_inbound(tx, &header, &now)?;
                for line in &request.lines {
                    adc_movement::insert_inbound_item(tx, inbound_id, line)?;
                }
                for &(spec_mg, received) in &demand {
                    match adc::find_spec(tx, sample_id, spec_mg)? {
                        Some(lot) => {
                            if adc::increase_spec(tx, lot.id.unwrap_or_default(), received)? == 0 {
                                return Err(InventoryError::ValidationFailed(format!(
                                    "{} @ {spec_mg} mg holds {} vial(s) and cannot take {received} more",
                                    request.lot_number, lot.quantity
                                )));
                            }
                        }
                        None => {
                            adc::insert_spec(tx, sample_id, spec_mg, received, &now)?;
                        }
                    }
                }
                adc::touch_sample(tx, sample_id, &now)?;
                Ok::<_, InventoryError>(inbound_id)
            })
        })?;

        log::info!(
            "inbound #{inbound_id}: {} vial(s) of {}",
            vial_count(&demand),
            request.lot_number
        );
        self.catalog.reload_after_mutation();
        Ok(inbound_id)
    }

    /// Every inbound and outbound record, newest first.
    pub fn get_all_movements(&self) -> Result<Vec<LedgerEntry>, InventoryError> {
        self.history(None)
    }

    /// Records whose lot number contains `lot_substring`, newest first.
    pub fn search_movements_by_lot(&self, lot_substring: &str) -> Result<Vec<LedgerEntry>, InventoryError> {
        self.history(Some(lot_substring))
    }

    pub fn get_outbound(&self, id: i64) -> Result<AdcOutboundRecord, InventoryError> {
        adc_movement::find_outbound(self.store.as_ref(), id)?
            .ok_or_else(|| InventoryError::not_found(Entity::Outbound, id))
    }

    pub fn get_inbound(&self, id: i64) -> Result<AdcInboundRecord, InventoryError> {
        adc_movement::find_inbound(self.store.as_ref(), id)?
            .ok_or_else(|| InventoryError::not_found(Entity::Inbound, id))
    }

    fn history(&self, lot_filter: Option<&str>) -> Result<Vec<LedgerEntry>, InventoryError> {
        let mut entries = self.store.with_connection(|conn: &mut Connection| {
            let conn: &Connection = conn;
            let mut entries: Vec<LedgerEntry> = adc_movement::find_inbounds(conn, lot_filter)?
                .into_iter()
                .map(LedgerEntry::Inbound)
                .collect();
            entries.extend(
                adc_movement::find_outbounds(conn, lot_filter)?
                    .into_iter()
                    .map(LedgerEntry::Outbound),
            );
            Ok::<_, InventoryError>(entries)
        })?;
        entries.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        Ok(entries)
    }
}

fn shortage(lot_number: &str, spec_mg: f64, requested: i64, available: i64) -> Shortage {
    Shortage {
        item: StockItem::SpecLot {
            lot_number: lot_number.to_string(),
            spec_mg,
        },
        requested,
        available,
    }
}

fn validate_lines(lot_number: &str, lines: &[MovementLine]) -> Result<(), InventoryError> {
    if lot_number.trim().is_empty() {
        return Err(InventoryError::ValidationFailed("lot number must not be empty".to_string()));
    }
    if lines.is_empty() {
        return Err(InventoryError::ValidationFailed(
            "a movement needs at least one line".to_string(),
        ));
    }
    for line in lines {
        line.validate().map_err(InventoryError::ValidationFailed)?;
    }
    Ok(())
}

/// Total vials per spec, in first-seen order, so repeated specs are checked once.
fn demand_by_spec(lines: &[MovementLine]) -> Result<Vec<(f64, i64)>, InventoryError> {
    let mut demand: Vec<(f64, i64)> = Vec::new();
    for line in lines {
        match demand.iter_mut().find(|(spec_mg, _)| *spec_mg == line.spec_mg) {
            Some((spec_mg, total)) => {
                *total = total.checked_add(line.quantity).ok_or_else(|| {
                    InventoryError::ValidationFailed(format!("total quantity at {spec_mg} mg is out of range"))
                })?;
            }
            None => demand.push((line.spec_mg, line.quantity)),
        }
    }
    Ok(demand)
}

fn vial_count(demand: &[(f64, i64)]) -> i64 {
    demand.iter().fold(0, |count, &(_, quantity)| count.saturating_add(quantity))
}
