//! Composite order completion: atomicity and single success under contention.

mod common;

use std::sync::Arc;
use std::thread;

use common::TestInventory;
use labstock::model::{Order, OrderLine, OrderStatus};
use labstock::{InventoryError, StockItem};

#[test]
fn test_completion_with_one_short_material_is_rolled_back() {
    let t = TestInventory::new();
    let a = t.material("Material A", 5);
    let b = t.material("Material B", 1);
    let order_id = t
        .inventory
        .orders()
        .create(
            &Order::new("Dr. Chen")
                .with_line(OrderLine::new(a, 3))
                .with_line(OrderLine::new(b, 2)),
        )
        .expect("create order");

    let err = t.inventory.orders().complete(order_id).expect_err("B is short");
    match err {
        InventoryError::InsufficientStock(shortages) => {
            assert_eq!(shortages.len(), 1);
            assert!(matches!(shortages[0].item, StockItem::Material { id, .. } if id == b));
            assert_eq!(shortages[0].requested, 2);
            assert_eq!(shortages[0].available, 1);
        }
        other => panic!("expected InsufficientStock, got {other}"),
    }

    let order = t.inventory.orders().get(order_id).expect("order");
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(order.completed_at.is_none());
    assert_eq!(t.inventory.materials().get(a).expect("a").quantity, 5);
    assert_eq!(t.inventory.materials().get(b).expect("b").quantity, 1);
    assert_eq!(t.count("stock_movements"), 2);
}

#[test]
fn test_concurrent_completion_succeeds_exactly_once() {
    let t = TestInventory::new();
    let a = t.material("Material A", 10);
    let order_id = t
        .inventory
        .orders()
        .create(&Order::new("Dr. Chen").with_line(OrderLine::new(a, 4)))
        .expect("create order");

    let inventory = Arc::new(t.second_client());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let inventory = Arc::clone(&inventory);
            thread::spawn(move || inventory.orders().complete(order_id))
        })
        .collect();
    let results: Vec<Result<(), InventoryError>> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread panicked"))
        .collect();

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(results.iter().filter_map(|result| result.as_ref().err()).all(|err| matches!(
        err,
        InventoryError::OrderClosed {
            status: OrderStatus::Completed,
            ..
        }
    )));
    assert_eq!(t.inventory.materials().get(a).expect("a").quantity, 6);
    assert_eq!(
        t.inventory
            .materials()
            .movements(a)
            .expect("movements")
            .iter()
            .filter(|movement| movement.reference_id == Some(order_id))
            .count(),
        1
    );
}

#[test]
fn test_completion_from_two_clients_on_one_file() {
    let t = TestInventory::new();
    let a = t.material("Material A", 10);
    let order_id = t
        .inventory
        .orders()
        .create(&Order::new("Dr. Chen").with_line(OrderLine::new(a, 4)))
        .expect("create order");

    let other = t.second_client();
    other.orders().complete(order_id).expect("first client completes");

    assert!(matches!(
        t.inventory.orders().complete(order_id),
        Err(InventoryError::OrderClosed { .. })
    ));
    assert!(matches!(
        t.inventory.orders().cancel(order_id),
        Err(InventoryError::OrderClosed {
            status: OrderStatus::Completed,
            ..
        })
    ));
    assert_eq!(t.inventory.materials().get(a).expect("a").quantity, 6);
}
