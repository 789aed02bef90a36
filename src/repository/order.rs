//! SQL for `orders` and `order_materials`.

use crate::executor::{StoreError, StoreExecutor};
use crate::model::{Order, OrderLine, OrderStatus};
use crate::transaction::Statement;

const OPEN_STATUSES: &str = "('pending', 'in_progress')";

const SELECT_LINES: &str = "SELECT om.id, om.material_id, om.quantity, om.notes,
            m.name AS material_name, m.unit AS unit, m.category AS category
     FROM order_materials om
     LEFT JOIN materials m ON m.id = om.material_id";

pub fn insert<E: StoreExecutor>(executor: &E, order: &Order, now: &str) -> Result<i64, StoreError> {
    executor.insert(
        "INSERT INTO orders
             (order_number, requester, department, status, priority, notes, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        &[
            &order.order_number,
            &order.requester,
            &order.department,
            &order.status.as_str(),
            &order.priority.as_str(),
            &order.notes,
            &now,
            &now,
        ],
    )
}

pub fn insert_line<E: StoreExecutor>(executor: &E, order_id: i64, line: &OrderLine) -> Result<i64, StoreError> {
    executor.insert(
        "INSERT INTO order_materials (order_id, material_id, quantity, notes) VALUES (?, ?, ?, ?)",
        &[&order_id, &line.material_id, &line.quantity, &line.notes],
    )
}

/// Header only.
pub fn find_by_id<E: StoreExecutor>(executor: &E, id: i64) -> Result<Option<Order>, StoreError> {
    executor.query_opt("SELECT * FROM orders WHERE id = ?", &[&id], Order::from_row)
}

pub fn find_lines<E: StoreExecutor>(executor: &E, order_id: i64) -> Result<Vec<OrderLine>, StoreError> {
    executor.query_all(
        &format!("{SELECT_LINES} WHERE om.order_id = ? ORDER BY om.id"),
        &[&order_id],
        OrderLine::from_row,
    )
}

/// Header plus lines.
pub fn find_full<E: StoreExecutor>(executor: &E, id: i64) -> Result<Option<Order>, StoreError> {
    let Some(mut order) = find_by_id(executor, id)? else {
        return Ok(None);
    };
    order.lines = find_lines(executor, id)?;
    Ok(Some(order))
}

/// Headers, newest first.
pub fn find_all<E: StoreExecutor>(executor: &E) -> Result<Vec<Order>, StoreError> {
    executor.query_all(
        "SELECT * FROM orders ORDER BY created_at DESC, id DESC",
        &[],
        Order::from_row,
    )
}

pub fn find_by_status<E: StoreExecutor>(executor: &E, status: OrderStatus) -> Result<Vec<Order>, StoreError> {
    executor.query_all(
        "SELECT * FROM orders WHERE status = ? ORDER BY created_at DESC, id DESC",
        &[&status.as_str()],
        Order::from_row,
    )
}

pub fn status_of<E: StoreExecutor>(executor: &E, id: i64) -> Result<Option<OrderStatus>, StoreError> {
    executor.query_opt("SELECT * FROM orders WHERE id = ?", &[&id], |row| {
        crate::model::parsed(row, "status")
    })
}

/// Header fields of an open order; status and timestamps are not touched here.
pub fn update_header<E: StoreExecutor>(executor: &E, order: &Order, id: i64, now: &str) -> Result<usize, StoreError> {
    executor.execute(
        &format!(
            "UPDATE orders
             SET order_number = ?, requester = ?, department = ?, priority = ?, notes = ?, updated_at = ?
             WHERE id = ? AND status IN {OPEN_STATUSES}"
        ),
        &[
            &order.order_number,
            &order.requester,
            &order.department,
            &order.priority.as_str(),
            &order.notes,
            &now,
            &id,
        ],
    )
}

/// Moves an open order to `to`; returns affected rows (0 when it was already closed or gone).
pub fn transition<E: StoreExecutor>(
    executor: &E,
    id: i64,
    from: &[OrderStatus],
    to: OrderStatus,
    now: &str,
) -> Result<usize, StoreError> {
    let allowed = from
        .iter()
        .map(|status| format!("'{}'", status.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    executor.execute(
        &format!("UPDATE orders SET status = ?, updated_at = ? WHERE id = ? AND status IN ({allowed})"),
        &[&to.as_str(), &now, &id],
    )
}

/// Guarded open → completed transition, stamping `completed_at`.
pub fn complete_statement(id: i64, now: &str) -> Statement {
    Statement::new(format!(
        "UPDATE orders SET status = 'completed', completed_at = ?, updated_at = ?
         WHERE id = ? AND status IN {OPEN_STATUSES}"
    ))
    .bind(now.to_string())
    .bind(now.to_string())
    .bind(id)
    .expect_affected(1)
}

pub fn touch<E: StoreExecutor>(executor: &E, id: i64, now: &str) -> Result<usize, StoreError> {
    executor.execute("UPDATE orders SET updated_at = ? WHERE id = ?", &[&now, &id])
}

pub fn delete_line<E: StoreExecutor>(executor: &E, order_id: i64, line_id: i64) -> Result<usize, StoreError> {
    executor.execute(
        "DELETE FROM order_materials WHERE id = ? AND order_id = ?",
        &[&line_id, &order_id],
    )
}

pub fn delete<E: StoreExecutor>(executor: &E, id: i64) -> Result<usize, StoreError> {
    executor.execute("DELETE FROM orders WHERE id = ?", &[&id])
}
