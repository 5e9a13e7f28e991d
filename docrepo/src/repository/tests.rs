//! End-to-end behaviour across capabilities

use super::test_support::{order_item_model, order_model, product_model, Order, OrderItem, Product};
use super::*;
use crate::doc;
use crate::store::MemoryStore;

fn products(store: &MemoryStore) -> Repository<Product, MemoryStore> {
    RepositoryFactory::create_full(&product_model(store))
}

#[tokio::test]
async fn test_create_returns_identity_and_fields() {
    let store = MemoryStore::new("shop");
    let repo = products(&store);

    let widget = repo
        .create(doc! { "name": "Widget", "price": 4 }, SessionOptions::new())
        .await
        .unwrap();
    assert!(!widget.id().is_empty());
    assert_eq!(widget.name, "Widget");
}

#[tokio::test]
async fn test_create_then_find_round_trip_and_idempotent_reads() {
    let store = MemoryStore::new("shop");
    let repo = products(&store);

    let input = Product {
        stock_quantity: 12,
        status: "active".into(),
        ..Product::new("Lamp", 25.0)
    };
    let created = repo.create(input.clone(), SessionOptions::new()).await.unwrap();

    let first = repo
        .find_by_id(created.id(), QueryOptions::new())
        .await
        .unwrap()
        .unwrap();
    let second = repo
        .find_by_id(created.id(), QueryOptions::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first,
        Product {
            id: created.id.clone(),
            created_at: created.created_at.clone(),
            updated_at: created.updated_at.clone(),
            ..input
        }
    );
}

#[tokio::test]
async fn test_second_page_of_twenty_five() {
    let store = MemoryStore::new("shop");
    let repo = products(&store);
    repo.create_many(
        (0..25).map(|i| Product::new(&format!("p{i}"), 1.0)).collect(),
        SessionOptions::new(),
    )
    .await
    .unwrap();

    let page = repo
        .find_with_pagination(doc! {}, PaginationOptions::new(2, 10), QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(page.data.len(), 10);
    assert_eq!(
        page.pagination,
        PaginationMeta {
            total: 25,
            page: 2,
            limit: 10,
            pages: 3,
            has_next: true,
            has_prev: true,
        }
    );
}

#[tokio::test]
async fn test_pagination_invariant_over_sizes() {
    let store = MemoryStore::new("shop");
    let repo = products(&store);
    for total in 0..=12u64 {
        for limit in 1..=5u64 {
            for page in 1..=4u64 {
                let result = repo
                    .find_with_pagination(
                        doc! {},
                        PaginationOptions::new(page, limit),
                        QueryOptions::new(),
                    )
                    .await
                    .unwrap();
                let meta = result.pagination;
                assert_eq!(meta.total, total);
                assert_eq!(meta.pages, total.div_ceil(limit));
                assert_eq!(meta.has_next, page < meta.pages);
                assert_eq!(meta.has_prev, page > 1);
                let expected = total.saturating_sub((page - 1) * limit).min(limit);
                assert_eq!(result.data.len() as u64, expected);
            }
        }
        repo.create(Product::new("x", 1.0), SessionOptions::new())
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_failed_bulk_write_rolls_back_whole_transaction() {
    let store = MemoryStore::new("shop");
    let orders = RepositoryFactory::create_full::<Order, _>(&order_model(&store));
    let items = RepositoryFactory::create_full::<OrderItem, _>(&order_item_model(&store));

    let result = run_in_transaction(&store, |session| {
        let (orders, items) = (orders.clone(), items.clone());
        async move {
            let order = orders
                .create(
                    doc! { "orderNumber": "ORD-1001", "total": 30 },
                    SessionOptions::with_session(&session),
                )
                .await?;
            let order_id = order.id.clone().unwrap_or_default();
            items
                .bulk_write(
                    vec![
                        BulkOperation::InsertOne {
                            document: doc! { "orderId": order_id.clone(), "productId": "p1", "quantity": 2 },
                        },
                        BulkOperation::InsertOne {
                            document: doc! { "orderId": order_id, "productId": "p2", "quantity": 0 },
                        },
                    ],
                    SessionOptions::with_session(&session),
                )
                .await?;
            Ok::<_, RepositoryError>(order)
        }
    })
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
    assert_eq!(err.operation, RepositoryOperation::BulkWrite);

    let order = orders
        .find_one(doc! { "orderNumber": "ORD-1001" }, QueryOptions::new())
        .await
        .unwrap();
    assert!(order.is_none());
    assert_eq!(items.count(doc! {}).await.unwrap(), 0);
    assert_eq!(store.open_transactions(), 0);
}

#[tokio::test]
async fn test_cross_collection_commit() {
    let store = MemoryStore::new("shop");
    let orders = RepositoryFactory::create_full::<Order, _>(&order_model(&store));
    let items = RepositoryFactory::create_full::<OrderItem, _>(&order_item_model(&store));

    let order = orders
        .with_transaction(|session| {
            let (orders, items) = (orders.clone(), items.clone());
            async move {
                let order = orders
                    .create(doc! { "orderNumber": "ORD-2" }, SessionOptions::with_session(&session))
                    .await?;
                items
                    .create_many(
                        vec![
                            doc! { "orderId": order.id.clone(), "productId": "p1", "quantity": 1 },
                            doc! { "orderId": order.id.clone(), "productId": "p2", "quantity": 3 },
                        ],
                        SessionOptions::with_session(&session),
                    )
                    .await?;
                Ok::<_, RepositoryError>(order)
            }
        })
        .await
        .unwrap();

    let order_id = order.id.unwrap_or_default();
    assert_eq!(items.count(doc! { "orderId": order_id }).await.unwrap(), 2);
}

#[tokio::test]
async fn test_delete_unknown_id_is_absent() {
    let store = MemoryStore::new("shop");
    let repo = products(&store);
    let removed = repo
        .delete_by_id("nonexistent-id", SessionOptions::new())
        .await
        .unwrap();
    assert!(removed.is_none());
}

#[tokio::test]
async fn test_delete_then_find_is_absent() {
    let store = MemoryStore::new("shop");
    let repo = products(&store);
    let created = repo
        .create(Product::new("Widget", 1.0), SessionOptions::new())
        .await
        .unwrap();

    assert!(repo
        .delete_by_id(created.id(), SessionOptions::new())
        .await
        .unwrap()
        .is_some());
    assert!(repo
        .find_by_id(created.id(), QueryOptions::new())
        .await
        .unwrap()
        .is_none());
    assert!(repo
        .delete_by_id(created.id(), SessionOptions::new())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_negative_price_names_field() {
    let store = MemoryStore::new("shop");
    let repo = products(&store);
    let created = repo
        .create(Product::new("Widget", 5.0), SessionOptions::new())
        .await
        .unwrap();

    let err = repo
        .update_by_id(created.id(), doc! { "price": -5 }, SessionOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(err.field_errors.iter().any(|e| e.field == "price"));
    assert!(err.to_string().contains("price"));
}

#[tokio::test]
async fn test_update_changes_only_patched_fields() {
    let store = MemoryStore::new("shop");
    let repo = products(&store);
    let created = repo
        .create(
            Product {
                stock_quantity: 3,
                ..Product::new("Widget", 5.0)
            },
            SessionOptions::new(),
        )
        .await
        .unwrap();

    repo.update_by_id(created.id(), doc! { "name": "Gizmo" }, SessionOptions::new())
        .await
        .unwrap();
    let after = repo
        .find_by_id(created.id(), QueryOptions::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        after,
        Product {
            name: "Gizmo".into(),
            updated_at: after.updated_at.clone(),
            ..created
        }
    );
}

#[tokio::test]
async fn test_bulk_insert_grows_count_by_n() {
    let store = MemoryStore::new("shop");
    let repo = products(&store);
    repo.create(Product::new("existing", 1.0), SessionOptions::new())
        .await
        .unwrap();
    let before = repo.count(doc! {}).await.unwrap();

    let n = 7;
    let operations = (0..n)
        .map(|i| BulkOperation::InsertOne {
            document: doc! { "name": format!("bulk-{i}"), "price": i },
        })
        .collect();
    let result = repo.bulk_write(operations, SessionOptions::new()).await.unwrap();
    assert_eq!(result.inserted_count, n);
    assert_eq!(repo.count(doc! {}).await.unwrap(), before + n);
}

#[tokio::test]
async fn test_read_only_view_over_shared_model() {
    let store = MemoryStore::new("shop");
    let model = product_model(&store);
    let writer = RepositoryFactory::create_writable::<Product, _>(&model);
    let reader = RepositoryFactory::create_read_only::<Product, _>(&model);

    writer
        .create(Product::new("Widget", 2.0), SessionOptions::new())
        .await
        .unwrap();
    assert!(reader.exists(doc! { "name": "Widget" }).await.unwrap());
    assert_eq!(writer.read_only().count(doc! {}).await.unwrap(), 1);
}

#[tokio::test]
async fn test_populate_and_select() {
    let store = MemoryStore::new("shop");
    let orders = RepositoryFactory::create_full::<serde_json::Value, _>(&order_model(&store));
    let goods = products(&store);
    let lamp = goods
        .create(Product::new("Lamp", 9.0), SessionOptions::new())
        .await
        .unwrap();
    orders
        .create(
            doc! { "orderNumber": "ORD-3", "product": lamp.id() },
            SessionOptions::new(),
        )
        .await
        .unwrap();

    let found = orders
        .find_one(
            doc! { "orderNumber": "ORD-3" },
            QueryOptions::new()
                .select(doc! { "orderNumber": 1, "product": 1 })
                .populate(Populate::new("product", "products").select(doc! { "name": 1 })),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found["product"]["name"], "Lamp");
    assert!(found.get("createdAt").is_none());
}

#[tokio::test]
async fn test_repositories_are_shareable_across_tasks() {
    let store = MemoryStore::new("shop");
    let repo = products(&store);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let repo = repo.clone();
            tokio::spawn(async move {
                repo.create(Product::new(&format!("t{i}"), 1.0), SessionOptions::new())
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(repo.count(doc! {}).await.unwrap(), 8);
}
