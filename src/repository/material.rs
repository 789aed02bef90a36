//! SQL for `materials` and `material_images`.

use crate::executor::{StoreError, StoreExecutor};
use crate::model::{Material, MaterialImage, VersionToken};
use crate::transaction::Statement;

const SELECT: &str = "SELECT * FROM materials";

pub fn insert<E: StoreExecutor>(executor: &E, material: &Material, now: &str) -> Result<i64, StoreError> {
    executor.insert(
        "INSERT INTO materials
             (name, category, description, quantity, unit, min_stock, location, supplier, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        &[
            &material.name,
            &material.category,
            &material.description,
            &material.quantity,
            &material.unit,
            &material.min_stock,
            &material.location,
            &material.supplier,
            &now,
            &now,
        ],
    )
}

pub fn find_by_id<E: StoreExecutor>(executor: &E, id: i64) -> Result<Option<Material>, StoreError> {
    executor.query_opt(&format!("{SELECT} WHERE id = ?"), &[&id], Material::from_row)
}

/// The material plus its raw `updated_at` text as the version token.
pub fn find_with_version<E: StoreExecutor>(
    executor: &E,
    id: i64,
) -> Result<Option<(Material, VersionToken)>, StoreError> {
    executor.query_opt(&format!("{SELECT} WHERE id = ?"), &[&id], |row| {
        let material = Material::from_row(row)?;
        let version: Option<String> = row.get("updated_at")?;
        Ok((material, VersionToken::new(version.unwrap_or_default())))
    })
}

pub fn find_all<E: StoreExecutor>(executor: &E) -> Result<Vec<Material>, StoreError> {
    executor.query_all(&format!("{SELECT} ORDER BY name, id"), &[], Material::from_row)
}

/// Substring match over name, category and description.
pub fn search<E: StoreExecutor>(executor: &E, keyword: &str) -> Result<Vec<Material>, StoreError> {
    let pattern = super::contains_pattern(keyword.trim());
    executor.query_all(
        &format!(
            "{SELECT} WHERE name LIKE ?1 ESCAPE '\\' OR category LIKE ?1 ESCAPE '\\'
             OR description LIKE ?1 ESCAPE '\\' ORDER BY name, id"
        ),
        &[&pattern],
        Material::from_row,
    )
}

pub fn find_low_stock<E: StoreExecutor>(executor: &E) -> Result<Vec<Material>, StoreError> {
    executor.query_all(
        &format!("{SELECT} WHERE quantity <= COALESCE(min_stock, 0) ORDER BY quantity, name"),
        &[],
        Material::from_row,
    )
}

pub fn quantity_of<E: StoreExecutor>(executor: &E, id: i64) -> Result<Option<i64>, StoreError> {
    executor.query_opt("SELECT quantity FROM materials WHERE id = ?", &[&id], |row| row.get(0))
}

/// Field update guarded by the version token; returns affected rows (0 or 1).
pub fn update_if_version<E: StoreExecutor>(
    executor: &E,
    material: &Material,
    id: i64,
    expected: &VersionToken,
    now: &str,
) -> Result<usize, StoreError> {
    executor.execute(
        "UPDATE materials
         SET name = ?, category = ?, description = ?, quantity = ?, unit = ?,
             min_stock = ?, location = ?, supplier = ?, updated_at = ?
         WHERE id = ? AND updated_at = ?",
        &[
            &material.name,
            &material.category,
            &material.description,
            &material.quantity,
            &material.unit,
            &material.min_stock,
            &material.location,
            &material.supplier,
            &now,
            &id,
            &expected.as_str(),
        ],
    )
}

pub fn delete<E: StoreExecutor>(executor: &E, id: i64) -> Result<usize, StoreError> {
    executor.execute("DELETE FROM materials WHERE id = ?", &[&id])
}

/// Guarded decrement that also bumps `updated_at`, so stale edit tokens conflict.
pub fn decrement_statement(id: i64, quantity: i64, now: &str) -> Statement {
    Statement::new(
        "UPDATE materials SET quantity = quantity - ?, updated_at = ?
         WHERE id = ? AND quantity >= ?",
    )
    .bind(quantity)
    .bind(now.to_string())
    .bind(id)
    .bind(quantity)
    .expect_affected(1)
}

pub fn insert_image<E: StoreExecutor>(
    executor: &E,
    material_id: i64,
    data: &[u8],
    image_type: &str,
    display_order: i64,
    notes: &str,
    now: &str,
) -> Result<i64, StoreError> {
    executor.insert(
        "INSERT INTO material_images (material_id, image_data, image_type, display_order, notes, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        &[&material_id, &data, &image_type, &display_order, &notes, &now],
    )
}

pub fn find_images<E: StoreExecutor>(executor: &E, material_id: i64) -> Result<Vec<MaterialImage>, StoreError> {
    executor.query_all(
        "SELECT * FROM material_images WHERE material_id = ? ORDER BY display_order, created_at, id",
        &[&material_id],
        MaterialImage::from_row,
    )
}

pub fn delete_image<E: StoreExecutor>(executor: &E, image_id: i64) -> Result<usize, StoreError> {
    executor.execute("DELETE FROM material_images WHERE id = ?", &[&image_id])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::tests::memory_store;

    #[test]
    fn test_insert_and_find() {
        let conn = memory_store();
        let material = Material::new("Acetone", "Solvent", "L").with_quantity(4);
        let id = insert(&conn, &material, "2024-01-01 00:00:00.000000").expect("insert");

        let found = find_by_id(&conn, id).expect("find").expect("present");
        assert_eq!(found.name, "Acetone");
        assert_eq!(found.quantity, 4);
        assert!(found.updated_at.is_some());
        assert_eq!(quantity_of(&conn, id).expect("qty"), Some(4));
        assert!(find_by_id(&conn, id + 1).expect("find").is_none());
    }

    #[test]
    fn test_update_if_version_requires_matching_token() {
        let conn = memory_store();
        let material = Material::new("Acetone", "Solvent", "L");
        let id = insert(&conn, &material, "2024-01-01 00:00:00.000000").expect("insert");
        let (mut current, token) = find_with_version(&conn, id).expect("find").expect("present");
        assert_eq!(token.as_str(), "2024-01-01 00:00:00.000000");

        current.location = "Cabinet 3".to_string();
        let stale = VersionToken::new("2023-12-31 23:59:59.000000");
        assert_eq!(
            update_if_version(&conn, &current, id, &stale, "2024-01-02 00:00:00.000000").expect("update"),
            0
        );
        assert_eq!(
            update_if_version(&conn, &current, id, &token, "2024-01-02 00:00:00.000000").expect("update"),
            1
        );
    }

    #[test]
    fn test_search_and_low_stock() {
        let conn = memory_store();
        let now = "2024-01-01 00:00:00.000000";
        insert(&conn, &Material::new("Acetone", "Solvent", "L").with_quantity(10).with_min_stock(2), now)
            .expect("insert");
        insert(&conn, &Material::new("Pipette tips", "Consumable", "box").with_quantity(1).with_min_stock(5), now)
            .expect("insert");

        let solvents = search(&conn, "solv").expect("search");
        assert_eq!(solvents.len(), 1);
        assert_eq!(solvents[0].name, "Acetone");
        assert!(search(&conn, "_").expect("literal underscore").is_empty());
        assert_eq!(search(&conn, "").expect("blank keyword").len(), 2);

        let low = find_low_stock(&conn).expect("low stock");
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].name, "Pipette tips");
    }

    #[test]
    fn test_images_cascade_with_material() {
        let conn = memory_store();
        let now = "2024-01-01 00:00:00.000000";
        let id = insert(&conn, &Material::new("Acetone", "Solvent", "L"), now).expect("insert");
        insert_image(&conn, id, &[1, 2, 3], "png", 0, "label", now).expect("image");

        let images = find_images(&conn, id).expect("images");
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].data, vec![1, 2, 3]);

        delete(&conn, id).expect("delete");
        assert!(find_images(&conn, id).expect("images").is_empty());
    }
}
