//! Ledger tests against a real PostgreSQL instance.
//!
//! Marked `#[ignore]` because they need `DATABASE_URL` pointing at a server
//! where `sqlx::test` may create scratch databases. Run with
//! `cargo test --test postgres_ledger -- --ignored`.

use sqlx::PgPool;
use std::sync::Arc;

use cinema_booking::cache::NoCache;
use cinema_booking::config::Config;
use cinema_booking::database::Database;
use cinema_booking::error::{BookingError, StoreError};
use cinema_booking::ledger::{LedgerStore, PgLedgerStore};
use cinema_booking::models::{NewOrder, OrderRequest, OrderSeatInput};
use cinema_booking::AppState;

const SHOWING: i64 = 1;

async fn seed(pool: &PgPool) {
    for sql in [
        "INSERT INTO locations (id, name) VALUES (1, 'Jakarta')",
        "INSERT INTO cinemas (id, name, image_path) VALUES (1, 'ebv.id', 'ebv.png')",
        "INSERT INTO movies (id, title, age_rating) VALUES (1, 'Spider-Man', 'PG-13')",
        "INSERT INTO schedules (id, movie_id, date, time) VALUES (1, 1, '2025-03-01', '13:00')",
        "INSERT INTO cinemas_schedules (id, cinemas_id, locations_id, schedules_id) VALUES (1, 1, 1, 1), (2, 1, 1, 1)",
        "INSERT INTO seats (id, cinemas_id, seat_number, seat_type) VALUES (1, 1, 'A1', 'regular'), (2, 1, 'A2', 'regular'), (3, 1, 'A3', 'vip')",
        "INSERT INTO users (id, email, virtual_account) VALUES (1, 'a@example.com', 'VA-001'), (2, 'b@example.com', NULL), (3, 'c@example.com', NULL), (4, 'd@example.com', NULL)",
        "INSERT INTO payment_methods (id, name) VALUES (1, 'BCA')",
    ] {
        sqlx::query(sql).execute(pool).await.unwrap();
    }
}

fn state(pool: &PgPool) -> Arc<AppState> {
    let store = PgLedgerStore::new(&Database::from_pool(pool.clone()));
    AppState::from_parts(&Config::default(), Arc::new(store), Arc::new(NoCache))
}

fn request(seats: &[i64]) -> OrderRequest {
    OrderRequest {
        total_price: 50000.0,
        showing_id: SHOWING,
        payment_method_id: 1,
        seats: seats
            .iter()
            .map(|&seat_id| OrderSeatInput {
                seat_id,
                status: None,
            })
            .collect(),
        is_paid: false,
        is_active: true,
    }
}

#[sqlx::test(migrations = "./src/migrations")]
#[ignore]
async fn placement_books_and_conflicts(pool: PgPool) {
    seed(&pool).await;
    let state = state(&pool);

    let order = state.orders.place_order(1, request(&[1, 2])).await.unwrap();
    assert_eq!(order.seats.len(), 2);

    let err = state.orders.place_order(2, request(&[2, 3])).await.unwrap_err();
    assert!(matches!(err, BookingError::Conflict { ref seat_ids } if seat_ids == &vec![2]));

    let store = PgLedgerStore::new(&Database::from_pool(pool.clone()));
    assert_eq!(store.booked_among(SHOWING, &[1, 2, 3]).await.unwrap(), vec![1, 2]);
    assert_eq!(store.booked_among(2, &[1, 2, 3]).await.unwrap(), Vec::<i64>::new());

    let history = state.orders.order_history(1).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].seat_numbers, vec!["A1", "A2"]);
    assert_eq!(history[0].title.as_deref(), Some("Spider-Man"));
    assert_eq!(history[0].virtual_account.as_deref(), Some("VA-001"));
    assert_eq!(history[0].cinema.as_deref(), Some("ebv.id"));
    assert_eq!(history[0].cinema_image.as_deref(), Some("ebv.png"));

    state.orders.place_order(2, request(&[3])).await.unwrap();
    let history = state.orders.order_history(2).await.unwrap();
    assert_eq!(history[0].virtual_account, None);
}

#[sqlx::test(migrations = "./src/migrations")]
#[ignore]
async fn unique_index_rejects_second_booking(pool: PgPool) {
    seed(&pool).await;
    let store = PgLedgerStore::new(&Database::from_pool(pool.clone()));

    let new_order = |qr: &str, user_id: i64| NewOrder {
        qr_code: qr.to_string(),
        is_paid: false,
        is_active: true,
        total_price: 10.0,
        user_id,
        showing_id: SHOWING,
        payment_method_id: 1,
    };

    let mut first = store.begin().await.unwrap();
    let order = first.insert_order(&new_order("QR-1", 1)).await.unwrap();
    first.insert_reservations(order.id, SHOWING, &[3]).await.unwrap();
    first.commit().await.unwrap();

    let mut second = store.begin().await.unwrap();
    let order = second.insert_order(&new_order("QR-2", 2)).await.unwrap();
    let err = second
        .insert_reservations(order.id, SHOWING, &[3])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation(_)));
    second.rollback().await.unwrap();

    let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(orders, 1);
}

#[sqlx::test(migrations = "./src/migrations")]
#[ignore]
async fn concurrent_placements_book_a_seat_once(pool: PgPool) {
    seed(&pool).await;
    let state = state(&pool);

    let attempts: Vec<_> = (1..=4)
        .map(|user_id| {
            let state = state.clone();
            tokio::spawn(async move { state.orders.place_order(user_id, request(&[1])).await })
        })
        .collect();

    let mut won = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => won += 1,
            Err(BookingError::Conflict { seat_ids }) => assert_eq!(seat_ids, vec![1]),
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!(won, 1);

    let booked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders_seats WHERE cinemas_schedule_id = 1 AND seat_id = 1 AND status = 'booked'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(booked, 1);
}

#[sqlx::test(migrations = "./src/migrations")]
#[ignore]
async fn dangling_references_are_invalid_input(pool: PgPool) {
    seed(&pool).await;
    let state = state(&pool);

    let mut req = request(&[1]);
    req.payment_method_id = 999;
    let err = state.orders.place_order(1, req).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidInput(_)), "{:?}", err);

    let err = state.orders.place_order(42, request(&[1])).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidInput(_)), "{:?}", err);

    let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(orders, 0);
}

#[sqlx::test(migrations = "./src/migrations")]
#[ignore]
async fn opposite_order_multi_seat_races_end_in_conflict(pool: PgPool) {
    seed(&pool).await;
    sqlx::query(
        "INSERT INTO seats (id, cinemas_id, seat_number, seat_type) \
         SELECT g, 1, 'R' || g, 'regular' FROM generate_series(4, 200) g",
    )
    .execute(&pool)
    .await
    .unwrap();
    let state = state(&pool);

    let ascending: Vec<i64> = (1..=200).collect();
    let descending: Vec<i64> = ascending.iter().rev().copied().collect();

    for round in 0..10 {
        let up = {
            let state = state.clone();
            let seats = ascending.clone();
            tokio::spawn(async move { state.orders.place_order(1, request(&seats)).await })
        };
        let down = {
            let state = state.clone();
            let seats = descending.clone();
            tokio::spawn(async move { state.orders.place_order(2, request(&seats)).await })
        };

        let mut won = 0;
        for attempt in [up, down] {
            match attempt.await.unwrap() {
                Ok(order) => {
                    won += 1;
                    assert_eq!(order.seats.len(), 200);
                }
                Err(BookingError::Conflict { seat_ids }) => assert!(!seat_ids.is_empty()),
                Err(other) => panic!("round {}: unexpected error: {:?}", round, other),
            }
        }
        assert_eq!(won, 1, "round {}", round);

        let booked: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT seat_id, COUNT(*) FROM orders_seats \
             WHERE cinemas_schedule_id = 1 AND status = 'booked' GROUP BY seat_id",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(booked.len(), 200);
        assert!(booked.iter().all(|(_, count)| *count == 1));

        sqlx::query("DELETE FROM orders").execute(&pool).await.unwrap();
    }
}
