//! Material records with optimistic edits.
//!
//! A material's `updated_at` text is its version token. An edit carries the
//! token it was based on and lands only if the row still holds it; any other
//! write in between (another edit, an order completion) changes the token and
//! the stale edit is rejected with `VersionConflict`.

use std::sync::Arc;

use crate::error::{Entity, InventoryError};
use crate::model::{now_timestamp, Material, MaterialImage, MovementKind, StockMovement, VersionToken};
use crate::repository::material;
use crate::repository::movement::{self, NewMovement};
use crate::store::Store;
use crate::transaction;

const INITIAL_STOCK_NOTE: &str = "initial stock";
const ADJUSTMENT_NOTE: &str = "stock adjustment";

#[derive(Debug)]
pub struct MaterialService {
    store: Arc<Store>,
}

impl MaterialService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Inserts a material; a positive starting quantity is recorded as an `in` movement.
    pub fn create(&self, new: &Material) -> Result<i64, InventoryError> {
        new.validate().map_err(InventoryError::ValidationFailed)?;
        let now = now_timestamp();

        let id = self.store.with_connection(|conn| {
            transaction::immediate(conn, |tx| {
                let id = material::insert(tx, new, &now)?;
                if new.quantity > 0 {
                    movement::insert(
                        tx,
                        &NewMovement {
                            material_id: id,
                            kind: MovementKind::In,
                            quantity: new.quantity,
                            reference_id: None,
                            notes: INITIAL_STOCK_NOTE,
                        },
                        &now,
                    )?;
                }
                Ok::<_, InventoryError>(id)
            })
        })?;

        log::info!("created material '{}' (#{id}) with {} {}", new.name, new.quantity, new.unit);
        Ok(id)
    }

    pub fn get(&self, id: i64) -> Result<Material, InventoryError> {
        material::find_by_id(self.store.as_ref(), id)?.ok_or_else(|| InventoryError::not_found(Entity::Material, id))
    }

    /// The material together with the token an edit must present.
    pub fn get_with_version(&self, id: i64) -> Result<(Material, VersionToken), InventoryError> {
        material::find_with_version(self.store.as_ref(), id)?
            .ok_or_else(|| InventoryError::not_found(Entity::Material, id))
    }

    /// All materials by name.
    pub fn get_all(&self) -> Result<Vec<Material>, InventoryError> {
        Ok(material::find_all(self.store.as_ref())?)
    }

    pub fn search(&self, keyword: &str) -> Result<Vec<Material>, InventoryError> {
        Ok(material::search(self.store.as_ref(), keyword)?)
    }

    /// Materials at or below their minimum stock.
    pub fn low_stock(&self) -> Result<Vec<Material>, InventoryError> {
        Ok(material::find_low_stock(self.store.as_ref())?)
    }

    /// Writes every field of `edited` if the row still carries `version`.
    ///
    /// A changed quantity is recorded as an `in` or `out` movement of the
    /// difference. Returns the new version token.
    ///
    /// # Errors
    ///
    /// * `NotFound` - the material no longer exists
    /// * `VersionConflict` - someone else wrote the row after `version` was read
    pub fn update(&self, edited: &Material, version: &VersionToken) -> Result<VersionToken, InventoryError> {
        let id = edited
            .id
            .ok_or_else(|| InventoryError::ValidationFailed("material has no id".to_string()))?;
        edited.validate().map_err(InventoryError::ValidationFailed)?;
        let now = now_timestamp();

        let token = self.store.with_connection(|conn| {
            transaction::immediate(conn, |tx| {
                let Some(previous) = material::quantity_of(tx, id)? else {
                    return Err(InventoryError::not_found(Entity::Material, id));
                };
                if material::update_if_version(tx, edited, id, version, &now)? == 0 {
                    return Err(InventoryError::VersionConflict { material_id: id });
                }
                if let Some((kind, quantity)) = MovementKind::for_delta(edited.quantity - previous) {
                    movement::insert(
                        tx,
                        &NewMovement {
                            material_id: id,
                            kind,
                            quantity,
                            reference_id: None,
                            notes: ADJUSTMENT_NOTE,
                        },
                        &now,
                    )?;
                }
                Ok(VersionToken::new(now.clone()))
            })
        })?;

        log::debug!("material #{id} updated, version {token}");
        Ok(token)
    }

    /// Deletes the material with its images, movements and order lines.
    pub fn delete(&self, id: i64) -> Result<(), InventoryError> {
        if material::delete(self.store.as_ref(), id)? == 0 {
            return Err(InventoryError::not_found(Entity::Material, id));
        }
        log::info!("deleted material #{id}");
        Ok(())
    }

    /// Movement history of one material, newest first.
    pub fn movements(&self, material_id: i64) -> Result<Vec<StockMovement>, InventoryError> {
        Ok(movement::find_by_material(self.store.as_ref(), material_id)?)
    }

    /// Attaches an image after the existing ones and returns its id.
    pub fn add_image(&self, material_id: i64, data: &[u8], image_type: &str, notes: &str) -> Result<i64, InventoryError> {
        if data.is_empty() {
            return Err(InventoryError::ValidationFailed("image data must not be empty".to_string()));
        }
        let store = self.store.as_ref();
        let display_order = i64::try_from(material::find_images(store, material_id)?.len()).unwrap_or(i64::MAX);
        material::insert_image(store, material_id, data, image_type, display_order, notes, &now_timestamp())
            .map_err(|err| InventoryError::or_missing_parent(err, Entity::Material, material_id))
    }

    /// Images of one material in display order.
    pub fn images(&self, material_id: i64) -> Result<Vec<MaterialImage>, InventoryError> {
        Ok(material::find_images(self.store.as_ref(), material_id)?)
    }

    pub fn delete_image(&self, image_id: i64) -> Result<(), InventoryError> {
        if material::delete_image(self.store.as_ref(), image_id)? == 0 {
            return Err(InventoryError::not_found(Entity::MaterialImage, image_id));
        }
        Ok(())
    }
}
