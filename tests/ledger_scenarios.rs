//! Stock ledger behaviour against a real on-disk store.

mod common;

use common::TestInventory;
use labstock::ledger::{InboundRequest, OutboundRequest};
use labstock::model::MovementLine;
use labstock::{InventoryError, StockItem};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn test_outbound_with_sufficient_stock() {
    let t = TestInventory::new();
    t.sample("LOT-001", &[(1.0, 10)]);

    let request = OutboundRequest {
        requester: "QA".to_string(),
        operator: "lee".to_string(),
        address: "Bldg 4, Room 210".to_string(),
        ..OutboundRequest::new("LOT-001", vec![MovementLine::new(1.0, 4)])
    };
    let outbound_id = t.inventory.ledger().apply_outbound(&request).expect("outbound");

    assert_eq!(t.stored_vials("LOT-001", 1.0), Some(6));
    let cached = t
        .inventory
        .catalog()
        .get_by_lot_number("LOT-001")
        .expect("lookup")
        .expect("sample");
    assert_eq!(cached.spec(1.0).map(|spec| spec.quantity), Some(6));

    let record = t.inventory.ledger().get_outbound(outbound_id).expect("record");
    assert_eq!(record.lot_number, "LOT-001");
    assert_eq!(record.requester, "QA");
    assert_eq!(record.items.len(), 1);
    assert_eq!(record.items[0].spec_mg, 1.0);
    assert_eq!(record.items[0].quantity, 4);
    assert_eq!(t.count("adc_outbound"), 1);
}

#[test]
fn test_outbound_with_insufficient_stock_changes_nothing() {
    let t = TestInventory::new();
    t.sample("LOT-001", &[(1.0, 10)]);

    let err = t
        .inventory
        .ledger()
        .apply_outbound(&OutboundRequest::new("LOT-001", vec![MovementLine::new(1.0, 11)]))
        .expect_err("11 of 10 vials");

    match err {
        InventoryError::InsufficientStock(shortages) => {
            assert_eq!(shortages.len(), 1);
            assert_eq!(
                shortages[0].item,
                StockItem::SpecLot {
                    lot_number: "LOT-001".to_string(),
                    spec_mg: 1.0
                }
            );
        }
        other => panic!("expected InsufficientStock, got {other}"),
    }
    assert_eq!(t.stored_vials("LOT-001", 1.0), Some(10));
    assert_eq!(t.count("adc_outbound"), 0);
    assert_eq!(t.count("adc_outbound_items"), 0);
}

#[test]
fn test_inbound_creates_missing_spec_lot() {
    let t = TestInventory::new();
    t.sample("LOT-002", &[(1.0, 3)]);
    assert_eq!(t.stored_vials("LOT-002", 2.0), None);

    let request = InboundRequest {
        operator: "kim".to_string(),
        owner: "Dr. Park".to_string(),
        position: "-80 freezer, rack 3".to_string(),
        ..InboundRequest::new("LOT-002", vec![MovementLine::new(2.0, 5)])
    };
    let inbound_id = t.inventory.ledger().apply_inbound(&request).expect("inbound");

    assert_eq!(t.stored_vials("LOT-002", 2.0), Some(5));
    assert_eq!(t.stored_vials("LOT-002", 1.0), Some(3));
    let record = t.inventory.ledger().get_inbound(inbound_id).expect("record");
    assert_eq!(record.owner, "Dr. Park");
    assert_eq!(record.items.len(), 1);

    let cached = t
        .inventory
        .catalog()
        .get_by_lot_number("LOT-002")
        .expect("lookup")
        .expect("sample");
    assert_eq!(cached.specs.len(), 2);
    assert_eq!(cached.total_vials(), 8);
}

#[test]
fn test_movement_history_survives_sample_deletion() {
    let t = TestInventory::new();
    let id = t.sample("LOT-003", &[(0.5, 4)]);
    t.inventory
        .ledger()
        .apply_outbound(&OutboundRequest::new("LOT-003", vec![MovementLine::new(0.5, 1)]))
        .expect("outbound");

    t.inventory.catalog().delete(id).expect("delete sample");

    let history = t.inventory.ledger().search_movements_by_lot("LOT-003").expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].total_vials(), 1);
    assert!(matches!(
        t.inventory
            .ledger()
            .apply_inbound(&InboundRequest::new("LOT-003", vec![MovementLine::new(0.5, 1)])),
        Err(InventoryError::NotFound { .. })
    ));
}

#[test]
fn test_random_movements_never_go_negative() {
    let t = TestInventory::new();
    let specs = [0.5, 1.0, 2.0];
    t.sample("LOT-RND", &[(0.5, 5), (1.0, 5), (2.0, 5)]);
    let mut expected = [5_i64, 5, 5];
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..60 {
        let slot = rng.gen_range(0..specs.len());
        let quantity = rng.gen_range(1..=6);
        if rng.gen_bool(0.55) {
            let result = t
                .inventory
                .ledger()
                .apply_outbound(&OutboundRequest::new("LOT-RND", vec![MovementLine::new(specs[slot], quantity)]));
            if quantity <= expected[slot] {
                result.expect("covered outbound");
                expected[slot] -= quantity;
            } else {
                assert!(matches!(result, Err(InventoryError::InsufficientStock(_))));
            }
        } else {
            t.inventory
                .ledger()
                .apply_inbound(&InboundRequest::new("LOT-RND", vec![MovementLine::new(specs[slot], quantity)]))
                .expect("inbound");
            expected[slot] += quantity;
        }

        for (spec_mg, want) in specs.iter().zip(expected) {
            let stored = t.stored_vials("LOT-RND", *spec_mg).expect("spec-lot");
            assert!(stored >= 0);
            assert_eq!(stored, want);
        }
    }

    let sample = t
        .inventory
        .catalog()
        .get_by_lot_number("LOT-RND")
        .expect("lookup")
        .expect("sample");
    assert_eq!(sample.total_vials(), expected.iter().sum::<i64>());
}
