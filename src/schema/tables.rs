//! Table, index and additive column definitions for the store.
//!
//! Timestamp columns keep a `CURRENT_TIMESTAMP` default so rows written by
//! older clients sharing the file still get a value; this crate always writes
//! them explicitly.

use sea_query::{ColumnDef, ForeignKey, ForeignKeyAction, Index, IndexCreateStatement, Table, TableCreateStatement};

fn id() -> ColumnDef {
    ColumnDef::new("id")
        .integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn text(name: &'static str) -> ColumnDef {
    ColumnDef::new(name).text().to_owned()
}

fn required_text(name: &'static str) -> ColumnDef {
    ColumnDef::new(name).text().not_null().to_owned()
}

fn stamped(name: &'static str) -> ColumnDef {
    ColumnDef::new(name)
        .text()
        .extra("DEFAULT CURRENT_TIMESTAMP")
        .to_owned()
}

fn cascade(from_table: &'static str, from_col: &'static str, to_table: &'static str) -> sea_query::ForeignKeyCreateStatement {
    ForeignKey::create()
        .from_tbl(from_table)
        .from_col(from_col)
        .to_tbl(to_table)
        .to_col("id")
        .on_delete(ForeignKeyAction::Cascade)
        .to_owned()
}

pub fn materials() -> TableCreateStatement {
    Table::create()
        .table("materials")
        .if_not_exists()
        .col(id())
        .col(required_text("name"))
        .col(required_text("category"))
        .col(text("description"))
        .col(ColumnDef::new("quantity").integer().not_null().default(0))
        .col(required_text("unit"))
        .col(ColumnDef::new("min_stock").integer().default(0))
        .col(text("location"))
        .col(text("supplier"))
        .col(stamped("created_at"))
        .col(stamped("updated_at"))
        .to_owned()
}

pub fn orders() -> TableCreateStatement {
    Table::create()
        .table("orders")
        .if_not_exists()
        .col(id())
        .col(ColumnDef::new("order_number").text().not_null().unique_key())
        .col(required_text("requester"))
        .col(text("department"))
        .col(ColumnDef::new("status").text().not_null().default("pending"))
        .col(ColumnDef::new("priority").text().default("normal"))
        .col(text("notes"))
        .col(stamped("created_at"))
        .col(stamped("updated_at"))
        .col(text("completed_at"))
        .to_owned()
}

pub fn order_materials() -> TableCreateStatement {
    Table::create()
        .table("order_materials")
        .if_not_exists()
        .col(id())
        .col(ColumnDef::new("order_id").integer().not_null())
        .col(ColumnDef::new("material_id").integer().not_null())
        .col(ColumnDef::new("quantity").integer().not_null())
        .col(text("notes"))
        .foreign_key(&mut cascade("order_materials", "order_id", "orders"))
        .foreign_key(&mut cascade("order_materials", "material_id", "materials"))
        .to_owned()
}

pub fn stock_movements() -> TableCreateStatement {
    Table::create()
        .table("stock_movements")
        .if_not_exists()
        .col(id())
        .col(ColumnDef::new("material_id").integer().not_null())
        .col(required_text("movement_type"))
        .col(ColumnDef::new("quantity").integer().not_null())
        .col(ColumnDef::new("reference_id").integer())
        .col(text("notes"))
        .col(stamped("created_at"))
        .foreign_key(&mut cascade("stock_movements", "material_id", "materials"))
        .to_owned()
}

pub fn material_images() -> TableCreateStatement {
    Table::create()
        .table("material_images")
        .if_not_exists()
        .col(id())
        .col(ColumnDef::new("material_id").integer().not_null())
        .col(ColumnDef::new("image_data").blob().not_null())
        .col(text("image_type"))
        .col(ColumnDef::new("display_order").integer().default(0))
        .col(text("notes"))
        .col(stamped("created_at"))
        .foreign_key(&mut cascade("material_images", "material_id", "materials"))
        .to_owned()
}

pub fn adc() -> TableCreateStatement {
    Table::create()
        .table("adc")
        .if_not_exists()
        .col(id())
        .col(ColumnDef::new("lot_number").text().not_null().unique_key())
        .col(required_text("sample_id"))
        .col(text("description"))
        .col(ColumnDef::new("concentration").double().default(0.0))
        .col(text("owner"))
        .col(text("storage_temp"))
        .col(text("storage_position"))
        .col(ColumnDef::new("antibody").text().default(""))
        .col(ColumnDef::new("linker_payload").text().default(""))
        .col(stamped("created_at"))
        .col(stamped("updated_at"))
        .to_owned()
}

pub fn adc_specs() -> TableCreateStatement {
    Table::create()
        .table("adc_specs")
        .if_not_exists()
        .col(id())
        .col(ColumnDef::new("adc_id").integer().not_null())
        .col(ColumnDef::new("spec_mg").double().not_null())
        .col(ColumnDef::new("quantity").integer().not_null().default(0))
        .col(stamped("created_at"))
        .foreign_key(&mut cascade("adc_specs", "adc_id", "adc"))
        .to_owned()
}

pub fn adc_outbound() -> TableCreateStatement {
    Table::create()
        .table("adc_outbound")
        .if_not_exists()
        .col(id())
        .col(required_text("lot_number"))
        .col(required_text("requester"))
        .col(required_text("operator"))
        .col(text("shipping_address"))
        .col(text("shipping_date"))
        .col(text("notes"))
        .col(stamped("created_at"))
        .to_owned()
}

pub fn adc_inbound() -> TableCreateStatement {
    Table::create()
        .table("adc_inbound")
        .if_not_exists()
        .col(id())
        .col(required_text("lot_number"))
        .col(required_text("operator"))
        .col(text("owner"))
        .col(text("storage_position"))
        .col(text("storage_date"))
        .col(text("notes"))
        .col(stamped("created_at"))
        .to_owned()
}

/// Line items of an inbound/outbound header; `parent_col` references `parent`.
fn movement_items(table: &'static str, parent_col: &'static str, parent: &'static str) -> TableCreateStatement {
    Table::create()
        .table(table)
        .if_not_exists()
        .col(id())
        .col(ColumnDef::new(parent_col).integer().not_null())
        .col(ColumnDef::new("spec_mg").double().not_null())
        .col(ColumnDef::new("quantity").integer().not_null())
        .foreign_key(&mut cascade(table, parent_col, parent))
        .to_owned()
}

pub fn adc_outbound_items() -> TableCreateStatement {
    movement_items("adc_outbound_items", "outbound_id", "adc_outbound")
}

pub fn adc_inbound_items() -> TableCreateStatement {
    movement_items("adc_inbound_items", "inbound_id", "adc_inbound")
}

pub fn store_meta() -> TableCreateStatement {
    Table::create()
        .table("store_meta")
        .if_not_exists()
        .col(ColumnDef::new("key").text().not_null().primary_key())
        .col(required_text("value"))
        .to_owned()
}

/// Every table, parents before children.
pub fn all_tables() -> Vec<TableCreateStatement> {
    vec![
        materials(),
        orders(),
        order_materials(),
        stock_movements(),
        material_images(),
        adc(),
        adc_specs(),
        adc_outbound(),
        adc_outbound_items(),
        adc_inbound(),
        adc_inbound_items(),
        store_meta(),
    ]
}

fn index(name: &'static str, table: &'static str, columns: &[&'static str]) -> IndexCreateStatement {
    let mut index = Index::create();
    index.if_not_exists().name(name).table(table);
    for column in columns {
        index.col(*column);
    }
    index
}

pub fn all_indexes() -> Vec<IndexCreateStatement> {
    vec![
        index("idx_adc_sample_id", "adc", &["sample_id"]),
        index("idx_adc_outbound_lot", "adc_outbound", &["lot_number"]),
        index("idx_adc_inbound_lot", "adc_inbound", &["lot_number"]),
        index("idx_adc_specs_adc_spec", "adc_specs", &["adc_id", "spec_mg"]),
        index("idx_stock_movements_material", "stock_movements", &["material_id"]),
        index("idx_order_materials_order", "order_materials", &["order_id"]),
    ]
}

/// Columns added after the first release; attempted on every start.
pub fn additive_columns() -> Vec<(&'static str, &'static str, ColumnDef)> {
    ["antibody", "linker_payload"]
        .into_iter()
        .map(|name| ("adc", name, ColumnDef::new(name).text().default("").to_owned()))
        .collect()
}
