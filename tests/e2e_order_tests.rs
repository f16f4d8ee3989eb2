//! End-to-end tests for order placement
//!
//! Order placement must either record the order and decrement stock
//! together, or do neither.

mod common;

use common::{open_raw_connection, TestStore, GADGET_STOCK, WIDGET_STOCK};
use shop_catalog_store::catalog_store::{
    CatalogError, CatalogStore, CatalogSummary, CustomerId, OrderId, ProductDraft, ProductId,
    SqliteCatalogStore, StoreOptions,
};
use shop_catalog_store::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

// =============================================================================
// Placement
// =============================================================================

#[test]
fn test_place_order_records_order_and_decrements_stock() {
    let fixture = TestStore::seeded();

    let order_id = fixture
        .store
        .place_order(fixture.alice, fixture.widget, 3)
        .unwrap();

    assert_eq!(fixture.stock_of(fixture.widget), 2);

    let orders = fixture.store.list_orders().unwrap();
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.id, order_id);
    assert_eq!(order.customer_id, fixture.alice);
    assert_eq!(order.product_id, fixture.widget);
    assert_eq!(order.quantity, 3);
    assert_eq!(order.order_date, chrono::Utc::now().date_naive());

    assert_eq!(fixture.store.get_order(order_id).unwrap().as_ref(), Some(order));
}

#[test]
fn test_order_can_take_the_last_unit() {
    let fixture = TestStore::seeded();

    fixture
        .store
        .place_order(fixture.bob, fixture.widget, WIDGET_STOCK)
        .unwrap();

    assert_eq!(fixture.stock_of(fixture.widget), 0);
    let err = fixture
        .store
        .place_order(fixture.bob, fixture.widget, 1)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientStock);
}

#[test]
fn test_insufficient_stock_leaves_everything_unchanged() {
    let fixture = TestStore::seeded();

    let err = fixture
        .store
        .place_order(fixture.alice, fixture.widget, 10)
        .unwrap_err();

    match err {
        CatalogError::InsufficientStock {
            product_id,
            requested,
            available,
        } => {
            assert_eq!(product_id, fixture.widget);
            assert_eq!(requested, 10);
            assert_eq!(available, WIDGET_STOCK);
        }
        other => panic!("Expected InsufficientStock, got {:?}", other),
    }
    assert_eq!(fixture.stock_of(fixture.widget), WIDGET_STOCK);
    assert!(fixture.store.list_orders().unwrap().is_empty());
}

#[test]
fn test_non_positive_quantity_is_validation_error() {
    let fixture = TestStore::seeded();

    for quantity in [0, -2] {
        let err = fixture
            .store
            .place_order(fixture.alice, fixture.widget, quantity)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    assert_eq!(fixture.stock_of(fixture.widget), WIDGET_STOCK);
    assert!(fixture.store.list_orders().unwrap().is_empty());
}

#[test]
fn test_unknown_customer_or_product_is_not_found() {
    let fixture = TestStore::seeded();

    let err = fixture
        .store
        .place_order(CustomerId(404), fixture.widget, 1)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), "No customer with id 404");

    let err = fixture
        .store
        .place_order(fixture.alice, ProductId(404), 1)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), "No product with id 404");

    assert_eq!(fixture.stock_of(fixture.widget), WIDGET_STOCK);
    assert!(fixture.store.list_orders().unwrap().is_empty());
}

#[test]
fn test_get_missing_order_returns_none() {
    let fixture = TestStore::seeded();
    assert!(fixture.store.get_order(OrderId(1)).unwrap().is_none());
}

#[test]
fn test_orders_listed_in_placement_order() {
    let fixture = TestStore::seeded();

    let first = fixture
        .store
        .place_order(fixture.alice, fixture.gadget, 1)
        .unwrap();
    let second = fixture
        .store
        .place_order(fixture.bob, fixture.widget, 2)
        .unwrap();
    let third = fixture
        .store
        .place_order(fixture.alice, fixture.widget, 1)
        .unwrap();

    let ids: Vec<_> = fixture
        .store
        .list_orders()
        .unwrap()
        .into_iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(ids, vec![first, second, third]);
    assert_eq!(fixture.stock_of(fixture.widget), WIDGET_STOCK - 3);
    assert_eq!(fixture.stock_of(fixture.gadget), GADGET_STOCK - 1);
}

// =============================================================================
// Summary
// =============================================================================

#[test]
fn test_summary_of_empty_store_is_zero() {
    let store = TestStore::empty();
    assert_eq!(store.summary().unwrap(), CatalogSummary::default());
}

#[test]
fn test_summary_tracks_orders() {
    let fixture = TestStore::seeded();
    fixture
        .store
        .place_order(fixture.alice, fixture.gadget, 4)
        .unwrap();

    let summary = fixture.store.summary().unwrap();

    assert_eq!(summary.product_count, 2);
    assert_eq!(summary.total_stock, WIDGET_STOCK + GADGET_STOCK - 4);
    assert_eq!(summary.customer_count, 2);
    assert_eq!(summary.order_count, 1);
}

// =============================================================================
// Concurrency
// =============================================================================

const BUYERS: usize = 16;

#[test]
fn test_concurrent_orders_never_oversell() {
    let fixture = TestStore::seeded_on_disk();
    let widget = fixture.widget;
    let customer = fixture.alice;

    // Half the buyers share the fixture's store, the other half bring their
    // own connections to the same file.
    let stores: Vec<SqliteCatalogStore> = (0..BUYERS)
        .map(|i| {
            if i % 2 == 0 {
                fixture.store.clone()
            } else {
                SqliteCatalogStore::open(fixture.db_path(), &StoreOptions::default()).unwrap()
            }
        })
        .collect();

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let done = done.clone();
        let conn = open_raw_connection(fixture.db_path());
        thread::spawn(move || {
            let mut observations = 0;
            loop {
                let finished = done.load(Ordering::SeqCst);
                let (stock, ordered): (i64, i64) = conn
                    .query_row(
                        "SELECT (SELECT stock FROM products WHERE id = ?1),
                                (SELECT COALESCE(SUM(quantity), 0) FROM orders WHERE product_id = ?1)",
                        [widget.0],
                        |r| Ok((r.get(0)?, r.get(1)?)),
                    )
                    .unwrap();
                assert!(stock >= 0, "stock went negative: {}", stock);
                assert_eq!(stock + ordered, WIDGET_STOCK);
                observations += 1;
                if finished {
                    break observations;
                }
            }
        })
    };

    let barrier = Arc::new(Barrier::new(BUYERS));
    let handles: Vec<_> = stores
        .into_iter()
        .map(|store| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                store.place_order(customer, widget, 1)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    done.store(true, Ordering::SeqCst);
    let observations = reader.join().unwrap();
    assert!(observations > 0);

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, WIDGET_STOCK as usize);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
    }

    assert_eq!(fixture.stock_of(widget), 0);
    assert_eq!(fixture.store.list_orders().unwrap().len(), WIDGET_STOCK as usize);
}

#[test]
fn test_concurrent_writers_on_distinct_products() {
    let fixture = TestStore::seeded_on_disk();
    let customer = fixture.bob;

    let products: Vec<ProductId> = (0..8)
        .map(|i| {
            fixture
                .store
                .add_product(&ProductDraft::new(format!("Part {}", i), 1.0, 3))
                .unwrap()
        })
        .collect();

    let handles: Vec<_> = products
        .iter()
        .map(|&product| {
            let store = fixture.store.clone();
            thread::spawn(move || {
                for _ in 0..3 {
                    store.place_order(customer, product, 1).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for product in products {
        assert_eq!(fixture.stock_of(product), 0);
    }
    assert_eq!(fixture.store.summary().unwrap().order_count, 24);
}
