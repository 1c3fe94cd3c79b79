//! Transactional behavior against a real PostgreSQL.
//!
//! Run with `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`.

use std::{
    sync::{
        Once,
        atomic::{AtomicI32, Ordering},
    },
    time::Duration,
};

use chrono::{FixedOffset, TimeDelta, Utc};
use diesel::{Connection, ExpressionMethods, PgConnection, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use restaurant_orderservice::{
    infra::{
        app_error::AppError,
        auth::{CurrentUser, Role},
        config::{DatabaseConfig, OrderPolicy},
        db::{self, DbPool},
    },
    models::{
        CreateDiningTableEntity, CreateProductEntity, CreateReservationEntity, DeliveryMethod,
        DiningTableEntity, OrderStatus, ProductEntity, ReservationStatus, TableStatus,
        UpdateProductEntity,
    },
    schema::{dining_tables, products, reservations as reservation_rows},
    services::{
        carts,
        line_items::LineItem,
        order_status,
        orders::{self, OrderSource, OrderView, PlaceOrder},
        products as menu,
        reservations::{self, ReservationRequest},
        schedule::SchedulePolicy,
        tables,
    },
};
use rust_decimal::Decimal;
use tokio::sync::oneshot;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static MIGRATED: Once = Once::new();
static NEXT_TABLE: AtomicI32 = AtomicI32::new(0);

fn database_url() -> String {
    std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set")
}

async fn pool() -> DbPool {
    let url = database_url();
    MIGRATED.call_once(|| {
        let mut conn = PgConnection::establish(&url).unwrap();
        conn.run_pending_migrations(MIGRATIONS).unwrap();
    });

    db::create_pool(&DatabaseConfig {
        url,
        max_connections: 4,
    })
    .await
    .unwrap()
}

async fn new_product(pool: &DbPool, price_cents: i64, quantity: i32) -> ProductEntity {
    let conn = &mut pool.get().await.unwrap();
    menu::create(
        conn,
        CreateProductEntity {
            title: "Tom yum".into(),
            price: Decimal::new(price_cents, 2),
            quantity,
            category_id: None,
            images: vec![],
        },
    )
    .await
    .unwrap()
}

async fn new_table(pool: &DbPool, capacity: i32) -> DiningTableEntity {
    let base = (Utc::now().timestamp_micros() % 100_000_000) as i32;
    let table_number = base * 10 + NEXT_TABLE.fetch_add(1, Ordering::SeqCst) % 10;
    let conn = &mut pool.get().await.unwrap();
    tables::create(
        conn,
        CreateDiningTableEntity {
            table_number,
            capacity,
        },
    )
    .await
    .unwrap()
}

async fn reload_product(pool: &DbPool, id: i32) -> ProductEntity {
    let conn = &mut pool.get().await.unwrap();
    products::table
        .find(id)
        .select(ProductEntity::as_select())
        .first(conn)
        .await
        .unwrap()
}

async fn reload_table(pool: &DbPool, id: i32) -> DiningTableEntity {
    let conn = &mut pool.get().await.unwrap();
    dining_tables::table
        .find(id)
        .select(DiningTableEntity::as_select())
        .first(conn)
        .await
        .unwrap()
}

fn new_user_id() -> i32 {
    let base = (Utc::now().timestamp_micros() % 10_000_000) as i32;
    base * 100 + NEXT_TABLE.fetch_add(1, Ordering::SeqCst) % 100
}

fn item(product_id: i32, count: i32) -> LineItem {
    LineItem {
        product_id,
        count,
        note: None,
    }
}

async fn walk_in(
    pool: &DbPool,
    items: Vec<LineItem>,
    table_id: Option<i32>,
) -> Result<OrderView, AppError> {
    let conn = &mut pool.get().await.unwrap();
    orders::place_order(
        conn,
        PlaceOrder {
            acting_user_id: 900,
            source: OrderSource::Inline(items),
            table_id,
            payment_slip_url: None,
        },
    )
    .await
}

fn all_day_policy() -> SchedulePolicy {
    SchedulePolicy {
        open_hour: 0,
        close_hour: 24,
        duration: TimeDelta::minutes(60),
        max_lead: TimeDelta::hours(2),
        utc_offset: FixedOffset::east_opt(0).unwrap(),
    }
}

#[tokio::test]
#[ignore]
async fn concurrent_buyers_of_the_last_unit() {
    let pool = pool().await;
    let product = new_product(&pool, 500, 1).await;

    let (a, b) = tokio::join!(
        walk_in(&pool, vec![item(product.id, 1)], None),
        walk_in(&pool, vec![item(product.id, 1)], None),
    );

    let outcomes = [a, b];
    let placed = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(placed, 1);
    assert!(outcomes.iter().any(|r| matches!(
        r,
        Err(AppError::StockExceeded {
            available: 0,
            requested: 1,
            ..
        })
    )));

    let product = reload_product(&pool, product.id).await;
    assert_eq!(product.quantity, 0);
    assert_eq!(product.sold, 1);
}

#[tokio::test]
#[ignore]
async fn failed_order_leaves_stock_untouched() {
    let pool = pool().await;
    let plenty = new_product(&pool, 300, 10).await;
    let scarce = new_product(&pool, 300, 1).await;

    let err = walk_in(&pool, vec![item(plenty.id, 2), item(scarce.id, 2)], None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StockExceeded { product_id, .. } if product_id == scarce.id));

    assert_eq!(reload_product(&pool, plenty.id).await.quantity, 10);
    assert_eq!(reload_product(&pool, scarce.id).await.quantity, 1);
}

#[tokio::test]
#[ignore]
async fn order_prices_survive_later_price_changes() {
    let pool = pool().await;
    let product = new_product(&pool, 1250, 5).await;

    let placed = walk_in(&pool, vec![item(product.id, 2)], None)
        .await
        .unwrap();
    assert_eq!(placed.order.cart_total, Decimal::new(2500, 2));
    assert_eq!(placed.order.delivery_method, DeliveryMethod::Delivery);
    assert_eq!(placed.order.status, OrderStatus::PendingConfirmation);

    let conn = &mut pool.get().await.unwrap();
    menu::update(
        conn,
        product.id,
        UpdateProductEntity {
            price: Some(Decimal::new(9900, 2)),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let order = orders::get_order(conn, placed.order.id).await.unwrap();
    assert_eq!(order.items[0].price, Decimal::new(1250, 2));
    assert_eq!(order.order.cart_total, Decimal::new(2500, 2));
}

#[tokio::test]
#[ignore]
async fn table_orders_occupy_the_table() {
    let pool = pool().await;
    let product = new_product(&pool, 100, 10).await;
    let table = new_table(&pool, 4).await;
    assert_eq!(table.status, TableStatus::Available);

    let first = walk_in(&pool, vec![item(product.id, 1)], Some(table.id))
        .await
        .unwrap();
    assert_eq!(first.order.delivery_method, DeliveryMethod::Table);
    assert_eq!(reload_table(&pool, table.id).await.status, TableStatus::Occupied);

    walk_in(&pool, vec![item(product.id, 1)], Some(table.id))
        .await
        .unwrap();
    assert_eq!(reload_table(&pool, table.id).await.status, TableStatus::Occupied);
}

#[tokio::test]
#[ignore]
async fn cart_checkout_uses_the_selected_table_and_deletes_the_cart() {
    let pool = pool().await;
    let product = new_product(&pool, 450, 3).await;
    let table = new_table(&pool, 2).await;
    let user_id = new_user_id();
    let conn = &mut pool.get().await.unwrap();

    carts::save_cart(conn, user_id, vec![item(product.id, 2)])
        .await
        .unwrap();
    carts::set_delivery_option(conn, user_id, DeliveryMethod::Table, Some(table.id))
        .await
        .unwrap();

    let placed = orders::place_order(
        conn,
        PlaceOrder {
            acting_user_id: user_id,
            source: OrderSource::Cart,
            table_id: None,
            payment_slip_url: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(placed.order.table_id, Some(table.id));
    assert_eq!(placed.order.cart_total, Decimal::new(900, 2));
    assert!(carts::find_cart(conn, user_id).await.unwrap().is_none());

    let again = orders::place_order(
        conn,
        PlaceOrder {
            acting_user_id: user_id,
            source: OrderSource::Cart,
            table_id: None,
            payment_slip_url: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(again, AppError::BadRequest(_)));
}

#[tokio::test]
#[ignore]
async fn reservations_drive_table_status() {
    let pool = pool().await;
    let table = new_table(&pool, 4).await;
    let policy = all_day_policy();
    let now = Utc::now();
    let conn = &mut pool.get().await.unwrap();

    let booked = reservations::create_reservation(
        conn,
        &policy,
        ReservationRequest {
            user_id: 7,
            table_id: table.id,
            start: now + TimeDelta::minutes(5),
            guests: 2,
        },
        now,
    )
    .await
    .unwrap();
    assert_eq!(booked.status, ReservationStatus::Pending);

    let overlapping = reservations::create_reservation(
        conn,
        &policy,
        ReservationRequest {
            user_id: 8,
            table_id: table.id,
            start: now + TimeDelta::minutes(30),
            guests: 2,
        },
        now,
    )
    .await
    .unwrap_err();
    assert!(matches!(overlapping, AppError::ScheduleConflict { .. }));

    reservations::update_status(conn, booked.id, ReservationStatus::Confirmed, now)
        .await
        .unwrap();
    assert_eq!(reload_table(&pool, table.id).await.status, TableStatus::Occupied);

    reservations::update_status(conn, booked.id, ReservationStatus::Cancelled, now)
        .await
        .unwrap();
    assert_eq!(reload_table(&pool, table.id).await.status, TableStatus::Available);
}

#[tokio::test]
#[ignore]
async fn too_many_guests_are_rejected() {
    let pool = pool().await;
    let table = new_table(&pool, 2).await;
    let now = Utc::now();
    let conn = &mut pool.get().await.unwrap();

    let err = reservations::create_reservation(
        conn,
        &all_day_policy(),
        ReservationRequest {
            user_id: 7,
            table_id: table.id,
            start: now + TimeDelta::minutes(10),
            guests: 3,
        },
        now,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
#[ignore]
async fn kitchen_finishes_queued_orders_only() {
    let pool = pool().await;
    let product = new_product(&pool, 100, 5).await;
    let placed = walk_in(&pool, vec![item(product.id, 1)], None)
        .await
        .unwrap();
    let conn = &mut pool.get().await.unwrap();

    let cook = CurrentUser {
        user_id: 31,
        role: Role::Cook,
    };
    let done = order_status::update_order_status(
        conn,
        cook,
        placed.order.id,
        OrderStatus::Completed,
        OrderPolicy::default(),
    )
    .await
    .unwrap();
    assert_eq!(done.status, OrderStatus::Completed);

    let err = order_status::update_order_status(
        conn,
        cook,
        placed.order.id,
        OrderStatus::Cancelled,
        OrderPolicy::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ForbiddenResource(_)));
}

#[tokio::test]
#[ignore]
async fn cancellation_restocks_when_enabled() {
    let pool = pool().await;
    let product = new_product(&pool, 100, 5).await;
    let placed = walk_in(&pool, vec![item(product.id, 2)], None)
        .await
        .unwrap();
    let conn = &mut pool.get().await.unwrap();

    let admin = CurrentUser {
        user_id: 1,
        role: Role::Admin,
    };
    order_status::update_order_status(
        conn,
        admin,
        placed.order.id,
        OrderStatus::Cancelled,
        OrderPolicy {
            restock_on_cancel: true,
        },
    )
    .await
    .unwrap();

    let product = reload_product(&pool, product.id).await;
    assert_eq!(product.quantity, 5);
    assert_eq!(product.sold, 2);
}

#[tokio::test]
#[ignore]
async fn unknown_order_is_not_found() {
    let pool = pool().await;
    let conn = &mut pool.get().await.unwrap();
    let admin = CurrentUser {
        user_id: 1,
        role: Role::Admin,
    };

    let err = order_status::update_order_status(
        conn,
        admin,
        i32::MAX,
        OrderStatus::Processing,
        OrderPolicy::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
#[ignore]
async fn cart_save_replaces_every_item() {
    let pool = pool().await;
    let soup = new_product(&pool, 200, 10).await;
    let rice = new_product(&pool, 300, 10).await;
    let user_id = new_user_id();
    let conn = &mut pool.get().await.unwrap();

    let first = carts::save_cart(conn, user_id, vec![item(soup.id, 1), item(rice.id, 1)])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.items.len(), 2);

    let replaced = carts::save_cart(conn, user_id, vec![item(soup.id, 1)])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(replaced.items.len(), 1);
    assert_eq!(replaced.cart.id, first.cart.id);
    assert_eq!(replaced.cart.cart_total, Decimal::new(200, 2));

    let again = carts::save_cart(conn, user_id, vec![item(soup.id, 1)])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.items.len(), 1);
    assert_eq!(again.cart.cart_total, Decimal::new(200, 2));
}

#[tokio::test]
#[ignore]
async fn cart_save_over_stock_keeps_the_previous_cart() {
    let pool = pool().await;
    let soup = new_product(&pool, 200, 10).await;
    let rice = new_product(&pool, 300, 1).await;
    let user_id = new_user_id();
    let conn = &mut pool.get().await.unwrap();

    carts::save_cart(conn, user_id, vec![item(soup.id, 1)])
        .await
        .unwrap();

    let err = carts::save_cart(conn, user_id, vec![item(soup.id, 1), item(rice.id, 2)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::StockExceeded {
            available: 1,
            requested: 2,
            ..
        }
    ));

    let kept = carts::get_cart(conn, user_id).await.unwrap();
    assert_eq!(kept.items.len(), 1);
    assert_eq!(kept.items[0].product_id, soup.id);
    assert_eq!(kept.cart.cart_total, Decimal::new(200, 2));
}

#[tokio::test]
#[ignore]
async fn saving_an_empty_cart_deletes_it() {
    let pool = pool().await;
    let soup = new_product(&pool, 200, 10).await;
    let user_id = new_user_id();
    let conn = &mut pool.get().await.unwrap();

    carts::save_cart(conn, user_id, vec![item(soup.id, 3)])
        .await
        .unwrap();
    let cleared = carts::save_cart(conn, user_id, vec![]).await.unwrap();

    assert!(cleared.is_none());
    assert!(carts::find_cart(conn, user_id).await.unwrap().is_none());
    assert!(matches!(
        carts::get_cart(conn, user_id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
#[ignore]
async fn failed_table_order_leaves_the_table_available() {
    let pool = pool().await;
    let scarce = new_product(&pool, 100, 1).await;
    let table = new_table(&pool, 4).await;

    let err = walk_in(&pool, vec![item(scarce.id, 2)], Some(table.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StockExceeded { .. }));

    assert_eq!(reload_table(&pool, table.id).await.status, TableStatus::Available);
    assert_eq!(reload_product(&pool, scarce.id).await.quantity, 1);
}

#[tokio::test]
#[ignore]
async fn walk_in_to_unknown_table_is_not_found() {
    let pool = pool().await;
    let product = new_product(&pool, 100, 3).await;

    let err = walk_in(&pool, vec![item(product.id, 1)], Some(i32::MAX))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(reload_product(&pool, product.id).await.quantity, 3);
}

#[tokio::test]
#[ignore]
async fn confirming_waits_for_a_concurrent_rebooking_of_the_table() {
    let pool = pool().await;
    let table = new_table(&pool, 4).await;
    let table_id = table.id;
    let policy = all_day_policy();
    let now = Utc::now();

    let first_id = {
        let conn = &mut pool.get().await.unwrap();
        reservations::create_reservation(
            conn,
            &policy,
            ReservationRequest {
                user_id: 7,
                table_id,
                start: now + TimeDelta::minutes(5),
                guests: 2,
            },
            now,
        )
        .await
        .unwrap()
        .id
    };

    let (locked_tx, locked_rx) = oneshot::channel::<()>();

    // Cancels the first booking and takes an overlapping slot while holding the table lock.
    let rebook = async {
        let conn = &mut pool.get().await.unwrap();
        conn.transaction(move |conn| {
            Box::pin(async move {
                tables::lock(conn, table_id).await?;
                diesel::update(reservation_rows::table.find(first_id))
                    .set(reservation_rows::status.eq(ReservationStatus::Cancelled))
                    .execute(conn)
                    .await?;
                diesel::insert_into(reservation_rows::table)
                    .values(CreateReservationEntity {
                        table_id: Some(table_id),
                        user_id: 8,
                        reservation_time: now + TimeDelta::minutes(20),
                        reservation_end_time: now + TimeDelta::minutes(80),
                        number_of_guests: 2,
                        status: ReservationStatus::Pending,
                    })
                    .execute(conn)
                    .await?;

                let _ = locked_tx.send(());
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok::<(), AppError>(())
            })
        })
        .await
    };

    let confirm = async {
        locked_rx.await.unwrap();
        let conn = &mut pool.get().await.unwrap();
        reservations::update_status(conn, first_id, ReservationStatus::Confirmed, now).await
    };

    let (rebooked, confirmed) = tokio::join!(rebook, confirm);
    rebooked.unwrap();
    assert!(matches!(
        confirmed,
        Err(AppError::ScheduleConflict { .. })
    ));

    let conn = &mut pool.get().await.unwrap();
    let live: i64 = reservation_rows::table
        .filter(reservation_rows::table_id.eq(table_id))
        .filter(reservation_rows::status.ne(ReservationStatus::Cancelled))
        .count()
        .get_result(conn)
        .await
        .unwrap();
    assert_eq!(live, 1);
    assert_eq!(reload_table(&pool, table_id).await.status, TableStatus::Available);
}
