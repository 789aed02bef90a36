//! Order lifecycle and atomic order completion.
//!
//! Completing an order touches the order, every material it requests and the
//! movement history. Preconditions are checked first, then all writes go to
//! the store as one guarded [`Statement`] batch: a material that ran short in
//! between, or an order closed by another process, fails a guard and nothing
//! is applied. Completions from this process are additionally serialized by
//! the coordinator's own lock.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::Connection;

use crate::error::{Entity, InventoryError, Shortage, StockItem};
use crate::executor::StoreError;
use crate::model::order::line_is_valid;
use crate::model::{generate_order_number, now_timestamp, MovementKind, Order, OrderLine, OrderStatus};
use crate::repository::movement::{self, NewMovement};
use crate::repository::{material, order};
use crate::store::Store;
use crate::transaction::{self, Statement};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

const COMPLETION_NOTE: &str = "order completed";

#[derive(Debug)]
pub struct OrderCoordinator {
    store: Arc<Store>,
    /// Critical section for composite operations.
    completion: Mutex<()>,
}

impl OrderCoordinator {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            completion: Mutex::new(()),
        }
    }

    /// Stores a pending order with its lines and returns its id.
    ///
    /// A blank order number is replaced by a generated one.
    ///
    /// # Errors
    ///
    /// `DuplicateKey` if the order number exists, `NotFound` if a line
    /// references an unknown material.
    pub fn create(&self, new: &Order) -> Result<i64, InventoryError> {
        new.validate().map_err(InventoryError::ValidationFailed)?;
        let header = Order {
            order_number: match new.order_number.trim() {
                "" => generate_order_number(),
                given => given.to_string(),
            },
            status: OrderStatus::Pending,
            ..new.clone()
        };
        let now = now_timestamp();

        let id = self.store.with_connection(|conn| {
            transaction::immediate(conn, |tx| {
                for line in &header.lines {
                    if material::quantity_of(tx, line.material_id)?.is_none() {
                        return Err(InventoryError::not_found(Entity::Material, line.material_id));
                    }
                }
                let id = order::insert(tx, &header, &now)
                    .map_err(|err| InventoryError::or_duplicate(err, Entity::Order, &header.order_number))?;
                for line in &header.lines {
                    order::insert_line(tx, id, line)?;
                }
                Ok(id)
            })
        })?;

        log::info!(
            "created order {} (#{id}) with {} line(s)",
            header.order_number,
            header.lines.len()
        );
        Ok(id)
    }

    /// The order with its lines.
    pub fn get(&self, id: i64) -> Result<Order, InventoryError> {
        order::find_full(self.store.as_ref(), id)?.ok_or_else(|| InventoryError::not_found(Entity::Order, id))
    }

    /// All orders with their lines, newest first.
    pub fn get_all(&self) -> Result<Vec<Order>, InventoryError> {
        self.with_lines(|conn| order::find_all(conn))
    }

    pub fn by_status(&self, status: OrderStatus) -> Result<Vec<Order>, InventoryError> {
        self.with_lines(|conn| order::find_by_status(conn, status))
    }

    /// Rewrites the header fields of an open order. Status and lines are left alone.
    pub fn update(&self, edited: &Order) -> Result<(), InventoryError> {
        let id = edited
            .id
            .ok_or_else(|| InventoryError::ValidationFailed("order has no id".to_string()))?;
        if edited.requester.trim().is_empty() {
            return Err(InventoryError::ValidationFailed("order requester must not be empty".to_string()));
        }
        if edited.order_number.trim().is_empty() {
            return Err(InventoryError::ValidationFailed("order number must not be empty".to_string()));
        }
        let now = now_timestamp();

        self.store.with_connection(|conn| {
            transaction::immediate(conn, |tx| {
                ensure_open(tx, id)?;
                order::update_header(tx, edited, id, &now)
                    .map_err(|err| InventoryError::or_duplicate(err, Entity::Order, &edited.order_number))?;
                Ok(())
            })
        })
    }

    pub fn add_line(&self, order_id: i64, line: &OrderLine) -> Result<i64, InventoryError> {
        line_is_valid(line).map_err(InventoryError::ValidationFailed)?;
        let now = now_timestamp();

        self.store.with_connection(|conn| {
            transaction::immediate(conn, |tx| {
                ensure_open(tx, order_id)?;
                if material::quantity_of(tx, line.material_id)?.is_none() {
                    return Err(InventoryError::not_found(Entity::Material, line.material_id));
                }
                let line_id = order::insert_line(tx, order_id, line)?;
                order::touch(tx, order_id, &now)?;
                Ok(line_id)
            })
        })
    }

    pub fn remove_line(&self, order_id: i64, line_id: i64) -> Result<(), InventoryError> {
        let now = now_timestamp();
        self.store.with_connection(|conn| {
            transaction::immediate(conn, |tx| {
                ensure_open(tx, order_id)?;
                if order::delete_line(tx, order_id, line_id)? == 0 {
                    return Err(InventoryError::not_found(Entity::OrderLine, line_id));
                }
                order::touch(tx, order_id, &now)?;
                Ok(())
            })
        })
    }

    /// Pending → in progress. Starting an order already in progress is a no-op.
    pub fn start(&self, id: i64) -> Result<(), InventoryError> {
        let store = self.store.as_ref();
        if order::transition(store, id, &[OrderStatus::Pending], OrderStatus::InProgress, &now_timestamp())? == 1 {
            log::info!("order #{id} started");
            return Ok(());
        }
        match order::status_of(store, id)? {
            None => Err(InventoryError::not_found(Entity::Order, id)),
            Some(OrderStatus::InProgress) => Ok(()),
            Some(status) => Err(InventoryError::OrderClosed { order_id: id, status }),
        }
    }

    /// Cancels an open order with one conditional statement.
    ///
    /// # Errors
    ///
    /// `OrderClosed` if the order is already completed or cancelled.
    pub fn cancel(&self, id: i64) -> Result<(), InventoryError> {
        let store = self.store.as_ref();
        if order::transition(store, id, &OrderStatus::OPEN, OrderStatus::Cancelled, &now_timestamp())? == 1 {
            log::info!("order #{id} cancelled");
            return Ok(());
        }
        match order::status_of(store, id)? {
            None => Err(InventoryError::not_found(Entity::Order, id)),
            Some(status) => Err(InventoryError::OrderClosed { order_id: id, status }),
        }
    }

    /// Completes an order, taking every requested material out of stock.
    ///
    /// All or nothing: on error the order keeps its status and no material
    /// quantity or movement changes.
    ///
    /// # Errors
    ///
    /// * `NotFound` - the order does not exist
    /// * `OrderClosed` - the order is already completed or cancelled
    /// * `ValidationFailed` - the lines for one material add up past `i64::MAX`
    /// * `InsufficientStock` - one entry per material whose stock is below the total requested
    pub fn complete(&self, id: i64) -> Result<(), InventoryError> {
        let _guard = self.completion.lock().unwrap_or_else(PoisonError::into_inner);

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::composite_span("order_completion", id).entered();

        let store = self.store.as_ref();
        let pending = order::find_full(store, id)?.ok_or_else(|| InventoryError::not_found(Entity::Order, id))?;
        if pending.status.is_terminal() {
            return Err(InventoryError::OrderClosed {
                order_id: id,
                status: pending.status,
            });
        }

        let mut demand: BTreeMap<i64, i64> = BTreeMap::new();
        for line in &pending.lines {
            let total = demand.entry(line.material_id).or_default();
            *total = total.checked_add(line.quantity).ok_or_else(|| {
                InventoryError::ValidationFailed(format!(
                    "order #{id} requests more of material #{} than can be counted",
                    line.material_id
                ))
            })?;
        }

        let mut shortages = Vec::new();
        for (&material_id, &requested) in &demand {
            let stocked = material::find_by_id(store, material_id)?
                .ok_or_else(|| InventoryError::not_found(Entity::Material, material_id))?;
            if stocked.quantity < requested {
                shortages.push(material_shortage(material_id, stocked.name, requested, stocked.quantity));
            }
        }
        if !shortages.is_empty() {
            log::warn!("order #{id} cannot be completed: {} material(s) short", shortages.len());
            return Err(InventoryError::InsufficientStock(shortages));
        }

        let now = now_timestamp();
        let mut statements: Vec<Statement> = vec![order::complete_statement(id, &now)];
        for (&material_id, &quantity) in &demand {
            statements.push(material::decrement_statement(material_id, quantity, &now));
            statements.push(movement::insert_statement(
                &NewMovement {
                    material_id,
                    kind: MovementKind::Out,
                    quantity,
                    reference_id: Some(id),
                    notes: COMPLETION_NOTE,
                },
                &now,
            ));
        }

        match store.transaction(&statements) {
            Ok(()) => {
                log::info!("order {} (#{id}) completed", pending.order_number);
                Ok(())
            }
            Err(StoreError::GuardFailed { index: 0, .. }) => {
                let status = order::status_of(store, id)?.ok_or_else(|| InventoryError::not_found(Entity::Order, id))?;
                Err(InventoryError::OrderClosed { order_id: id, status })
            }
            Err(StoreError::GuardFailed { index, .. }) => {
                // Statements after the first come in (decrement, movement) pairs.
                let (material_id, requested) = demand
                    .iter()
                    .nth((index - 1) / 2)
                    .map(|(&material_id, &requested)| (material_id, requested))
                    .unwrap_or_default();
                let (name, available) = material::find_by_id(store, material_id)?
                    .map(|m| (m.name, m.quantity))
                    .unwrap_or_default();
                Err(InventoryError::InsufficientStock(vec![material_shortage(
                    material_id,
                    name,
                    requested,
                    available,
                )]))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn with_lines<F>(&self, headers: F) -> Result<Vec<Order>, InventoryError>
    where
        F: FnOnce(&Connection) -> Result<Vec<Order>, StoreError>,
    {
        self.store.with_connection(|conn: &mut Connection| {
            let conn: &Connection = conn;
            let mut orders = headers(conn)?;
            for entry in &mut orders {
                if let Some(order_id) = entry.id {
                    entry.lines = order::find_lines(conn, order_id)?;
                }
            }
            Ok::<_, InventoryError>(orders)
        })
    }
}

/// Fails unless the order exists and is still open.
fn ensure_open(tx: &rusqlite::Transaction<'_>, order_id: i64) -> Result<(), InventoryError> {
    match order::status_of(tx, order_id)? {
        None => Err(InventoryError::not_found(Entity::Order, order_id)),
        Some(status) if status.is_terminal() => Err(InventoryError::OrderClosed { order_id, status }),
        Some(_) => Ok(()),
    }
}

fn material_shortage(id: i64, name: String, requested: i64, available: i64) -> Shortage {
    Shortage {
        item: StockItem::Material { id, name },
        requested,
        available,
    }
}
