use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use super::{LedgerStore, LedgerUnit};
use crate::database::Database;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    NewOrder, Order, OrderHistory, ReservationStatus, Seat, SeatReservation, Showing,
};

/// Ledger backed by the `orders` / `orders_seats` tables.
///
/// The partial unique index `orders_seats_booked_uniq` enforces the
/// booked-seat constraint; a violating insert blocks until the competing
/// transaction finishes and then fails with SQLSTATE 23505.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool.clone(),
        }
    }
}

type SeatTuple = (i64, String, String);

fn into_seats(rows: Vec<SeatTuple>) -> StoreResult<Vec<Seat>> {
    rows.into_iter()
        .map(|(seat_id, seat_number, seat_type)| {
            Ok(Seat {
                seat_id,
                seat_number,
                seat_type: seat_type.parse().map_err(StoreError::Backend)?,
            })
        })
        .collect()
}

#[derive(sqlx::FromRow)]
struct OrderHistoryRow {
    id: i64,
    isactive: bool,
    ispaid: bool,
    qr_code: String,
    total_prices: f64,
    user_id: i64,
    virtual_account: Option<String>,
    title: Option<String>,
    age_rating: Option<String>,
    cinema: Option<String>,
    cinema_image: Option<String>,
    location: Option<String>,
    date: Option<String>,
    time: Option<String>,
    seat_numbers: Vec<String>,
    seat_types: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<OrderHistoryRow> for OrderHistory {
    fn from(r: OrderHistoryRow) -> Self {
        OrderHistory {
            id: r.id,
            is_active: r.isactive,
            is_paid: r.ispaid,
            qr_code: r.qr_code,
            total_price: r.total_prices,
            user_id: r.user_id,
            virtual_account: r.virtual_account,
            title: r.title,
            age_rating: r.age_rating,
            cinema: r.cinema,
            cinema_image: r.cinema_image,
            location: r.location,
            date: r.date,
            time: r.time,
            seat_numbers: r.seat_numbers,
            seat_types: r.seat_types,
            created_at: r.created_at,
        }
    }
}

const SHOWING_SQL: &str =
    "SELECT id, cinemas_id AS cinema_id FROM cinemas_schedules WHERE id = $1";

const BOOKED_AMONG_SQL: &str = r#"
    SELECT seat_id
    FROM orders_seats
    WHERE cinemas_schedule_id = $1
      AND seat_id = ANY($2)
      AND status = $3
    ORDER BY seat_id
"#;

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn showing(&self, showing_id: i64) -> StoreResult<Option<Showing>> {
        let showing = sqlx::query_as::<_, Showing>(SHOWING_SQL)
            .bind(showing_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(showing)
    }

    async fn seats_for_showing(&self, showing_id: i64) -> StoreResult<Vec<Seat>> {
        let rows = sqlx::query_as::<_, SeatTuple>(
            r#"
            SELECT s.id, s.seat_number, s.seat_type
            FROM seats s
            JOIN cinemas_schedules cs ON cs.cinemas_id = s.cinemas_id
            WHERE cs.id = $1
            ORDER BY s.id
            "#,
        )
        .bind(showing_id)
        .fetch_all(&self.pool)
        .await?;
        into_seats(rows)
    }

    async fn booked_seats(&self, showing_id: i64) -> StoreResult<Vec<Seat>> {
        let rows = sqlx::query_as::<_, SeatTuple>(
            r#"
            SELECT s.id, s.seat_number, s.seat_type
            FROM orders_seats os
            JOIN seats s ON os.seat_id = s.id
            WHERE os.cinemas_schedule_id = $1
              AND os.status = $2
            ORDER BY s.id
            "#,
        )
        .bind(showing_id)
        .bind(ReservationStatus::Booked.as_str())
        .fetch_all(&self.pool)
        .await?;
        into_seats(rows)
    }

    async fn booked_among(&self, showing_id: i64, seat_ids: &[i64]) -> StoreResult<Vec<i64>> {
        let booked = sqlx::query_scalar::<_, i64>(BOOKED_AMONG_SQL)
            .bind(showing_id)
            .bind(seat_ids)
            .bind(ReservationStatus::Booked.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(booked)
    }

    async fn order_history(&self, user_id: i64) -> StoreResult<Vec<OrderHistory>> {
        let rows = sqlx::query_as::<_, OrderHistoryRow>(
            r#"
            SELECT
                o.id,
                o.isactive,
                o.ispaid,
                o.qr_code,
                o.total_prices,
                o.user_id,
                u.virtual_account,
                m.title,
                m.age_rating,
                c.name AS cinema,
                c.image_path AS cinema_image,
                l.name AS location,
                sch.date::text AS date,
                sch.time::text AS time,
                COALESCE(
                    ARRAY_AGG(s.seat_number ORDER BY s.id) FILTER (WHERE s.id IS NOT NULL),
                    '{}'
                ) AS seat_numbers,
                COALESCE(
                    ARRAY_AGG(DISTINCT s.seat_type) FILTER (WHERE s.id IS NOT NULL),
                    '{}'
                ) AS seat_types,
                o.created_at
            FROM orders o
            LEFT JOIN users u ON o.user_id = u.id
            LEFT JOIN cinemas_schedules cs ON o.cinemas_schedule_id = cs.id
            LEFT JOIN cinemas c ON cs.cinemas_id = c.id
            LEFT JOIN locations l ON cs.locations_id = l.id
            LEFT JOIN schedules sch ON cs.schedules_id = sch.id
            LEFT JOIN movies m ON sch.movie_id = m.id
            LEFT JOIN orders_seats os ON os.order_id = o.id AND os.status = $2
            LEFT JOIN seats s ON os.seat_id = s.id
            WHERE o.user_id = $1
            GROUP BY o.id, u.virtual_account, m.title, m.age_rating, c.name, c.image_path,
                     l.name, sch.date, sch.time
            ORDER BY o.created_at ASC, o.id ASC
            "#,
        )
        .bind(user_id)
        .bind(ReservationStatus::Booked.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(OrderHistory::from).collect())
    }

    async fn begin(&self) -> StoreResult<Box<dyn LedgerUnit>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerUnit { tx }))
    }
}

/// One database transaction. sqlx rolls the transaction back when it is
/// dropped uncommitted, which covers cancelled and timed-out requests.
pub struct PgLedgerUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerUnit for PgLedgerUnit {
    async fn showing(&mut self, showing_id: i64) -> StoreResult<Option<Showing>> {
        let showing = sqlx::query_as::<_, Showing>(SHOWING_SQL)
            .bind(showing_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(showing)
    }

    async fn unknown_seats(&mut self, cinema_id: i64, seat_ids: &[i64]) -> StoreResult<Vec<i64>> {
        let unknown = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT req.id
            FROM UNNEST($2::bigint[]) AS req(id)
            WHERE NOT EXISTS (
                SELECT 1 FROM seats s WHERE s.id = req.id AND s.cinemas_id = $1
            )
            ORDER BY req.id
            "#,
        )
        .bind(cinema_id)
        .bind(seat_ids)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(unknown)
    }

    async fn booked_among(&mut self, showing_id: i64, seat_ids: &[i64]) -> StoreResult<Vec<i64>> {
        let booked = sqlx::query_scalar::<_, i64>(BOOKED_AMONG_SQL)
            .bind(showing_id)
            .bind(seat_ids)
            .bind(ReservationStatus::Booked.as_str())
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(booked)
    }

    async fn insert_order(&mut self, order: &NewOrder) -> StoreResult<Order> {
        let (id, created_at, updated_at) =
            sqlx::query_as::<_, (i64, DateTime<Utc>, DateTime<Utc>)>(
                r#"
                INSERT INTO orders
                    (qr_code, ispaid, isactive, total_prices, user_id, cinemas_schedule_id, payment_method_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id, created_at, updated_at
                "#,
            )
            .bind(&order.qr_code)
            .bind(order.is_paid)
            .bind(order.is_active)
            .bind(order.total_price)
            .bind(order.user_id)
            .bind(order.showing_id)
            .bind(order.payment_method_id)
            .fetch_one(&mut *self.tx)
            .await?;

        debug!("inserted order {} for showing {}", id, order.showing_id);

        Ok(Order {
            id,
            qr_code: order.qr_code.clone(),
            is_paid: order.is_paid,
            is_active: order.is_active,
            total_price: order.total_price,
            user_id: order.user_id,
            showing_id: order.showing_id,
            payment_method_id: order.payment_method_id,
            created_at,
            updated_at,
            seats: Vec::new(),
        })
    }

    /// Rows are inserted in ascending seat order so that concurrent units
    /// contending for the same seats take index locks in the same order.
    async fn insert_reservations(
        &mut self,
        order_id: i64,
        showing_id: i64,
        seat_ids: &[i64],
    ) -> StoreResult<Vec<SeatReservation>> {
        let rows = sqlx::query_as::<_, (i64, i64, String, DateTime<Utc>)>(
            r#"
            INSERT INTO orders_seats (status, order_id, seat_id, cinemas_schedule_id)
            SELECT $4, $1, seat_id, $2
            FROM UNNEST($3::bigint[]) AS seat_id
            ORDER BY seat_id
            RETURNING id, seat_id, status, created_at
            "#,
        )
        .bind(order_id)
        .bind(showing_id)
        .bind(seat_ids)
        .bind(ReservationStatus::Booked.as_str())
        .fetch_all(&mut *self.tx)
        .await?;

        let mut reservations = rows
            .into_iter()
            .map(|(id, seat_id, status, created_at)| {
                Ok(SeatReservation {
                    id,
                    order_id,
                    showing_id,
                    seat_id,
                    status: status.parse().map_err(StoreError::Backend)?,
                    created_at,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        reservations.sort_by_key(|r| r.seat_id);
        Ok(reservations)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
