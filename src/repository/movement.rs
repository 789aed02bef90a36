//! SQL for the append-only `stock_movements` table.

use crate::executor::{StoreError, StoreExecutor};
use crate::model::{MovementKind, StockMovement};
use crate::transaction::Statement;

/// Fields of a movement about to be written.
#[derive(Debug, Clone, Copy)]
pub struct NewMovement<'a> {
    pub material_id: i64,
    pub kind: MovementKind,
    pub quantity: i64,
    pub reference_id: Option<i64>,
    pub notes: &'a str,
}

const INSERT: &str = "INSERT INTO stock_movements (material_id, movement_type, quantity, reference_id, notes, created_at)
     VALUES (?, ?, ?, ?, ?, ?)";

pub fn insert<E: StoreExecutor>(executor: &E, movement: &NewMovement<'_>, now: &str) -> Result<i64, StoreError> {
    executor.insert(
        INSERT,
        &[
            &movement.material_id,
            &movement.kind.as_str(),
            &movement.quantity,
            &movement.reference_id,
            &movement.notes,
            &now,
        ],
    )
}

pub fn insert_statement(movement: &NewMovement<'_>, now: &str) -> Statement {
    Statement::new(INSERT)
        .bind(movement.material_id)
        .bind(movement.kind.as_str().to_string())
        .bind(movement.quantity)
        .bind(movement.reference_id)
        .bind(movement.notes.to_string())
        .bind(now.to_string())
}

/// Newest first.
pub fn find_by_material<E: StoreExecutor>(executor: &E, material_id: i64) -> Result<Vec<StockMovement>, StoreError> {
    executor.query_all(
        "SELECT * FROM stock_movements WHERE material_id = ? ORDER BY created_at DESC, id DESC",
        &[&material_id],
        StockMovement::from_row,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Material;
    use crate::repository::material;
    use crate::repository::tests::memory_store;
    use crate::transaction::apply;

    #[test]
    fn test_insert_and_list_newest_first() {
        let mut conn = memory_store();
        let id = material::insert(&conn, &Material::new("Acetone", "Solvent", "L"), "2024-01-01 00:00:00.000000")
            .expect("material");

        insert(
            &conn,
            &NewMovement {
                material_id: id,
                kind: MovementKind::In,
                quantity: 5,
                reference_id: None,
                notes: "initial stock",
            },
            "2024-01-01 00:00:00.000000",
        )
        .expect("movement");
        let statement = insert_statement(
            &NewMovement {
                material_id: id,
                kind: MovementKind::Out,
                quantity: 2,
                reference_id: Some(42),
                notes: "order completed",
            },
            "2024-01-02 00:00:00.000000",
        );
        apply(&mut conn, &[statement]).expect("apply");

        let history = find_by_material(&conn, id).expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, MovementKind::Out);
        assert_eq!(history[0].reference_id, Some(42));
        assert_eq!(history[1].notes, "initial stock");
    }
}
