// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed persistence implementation.
//!
//! Seat reservations lock the product row; balance operations lock the
//! giftcard row and then the hold row, always in that order.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use crate::error::CoreError;

use super::{
    BookingRecord, DeliveryRecord, DeliveryTransition, EmployeeRecord, GiftcardRecord, HoldRecord,
    ListBookingsFilter, Persistence, ProductRecord, SeatInsert, SeatReservation,
    TimeEntryRecord, TransactionRecord, ensure_spendable,
};

/// PostgreSQL-backed persistence implementation.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres-backed persistence implementation.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, size the pool and run migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: e.to_string(),
            })?;

        crate::migrations::run_postgres(&pool).await?;

        Ok(Self { pool })
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn booked_seats(
    conn: &mut PgConnection,
    product_id: &str,
    slot_start: DateTime<Utc>,
    exclude_booking: Option<&str>,
) -> Result<i64, CoreError> {
    let (booked,): (i64,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(participants), 0)::BIGINT
        FROM bookings
        WHERE product_id = $1 AND slot_start = $2
          AND status IN ('pending', 'confirmed', 'attended')
          AND ($3::text IS NULL OR booking_id <> $3)
        "#,
    )
    .bind(product_id)
    .bind(slot_start)
    .bind(exclude_booking)
    .fetch_one(&mut *conn)
    .await?;

    Ok(booked)
}

async fn lock_product_capacity(
    conn: &mut PgConnection,
    product_id: &str,
) -> Result<Option<i32>, CoreError> {
    let row: Option<(i32,)> =
        sqlx::query_as("SELECT capacity FROM products WHERE product_id = $1 FOR UPDATE")
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(row.map(|(capacity,)| capacity))
}

async fn fetch_giftcard(
    conn: &mut PgConnection,
    code: &str,
    for_update: bool,
) -> Result<Option<GiftcardRecord>, CoreError> {
    let sql = if for_update {
        r#"
        SELECT code, initial_cents, balance_cents, status, purchaser_name,
               recipient_name, recipient_email, message, expires_at, created_at
        FROM giftcards
        WHERE code = $1
        FOR UPDATE
        "#
    } else {
        r#"
        SELECT code, initial_cents, balance_cents, status, purchaser_name,
               recipient_name, recipient_email, message, expires_at, created_at
        FROM giftcards
        WHERE code = $1
        "#
    };

    let record = sqlx::query_as::<_, GiftcardRecord>(sql)
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(record)
}

async fn fetch_hold(
    conn: &mut PgConnection,
    hold_id: &str,
    for_update: bool,
) -> Result<Option<HoldRecord>, CoreError> {
    let sql = if for_update {
        r#"
        SELECT hold_id, giftcard_code, amount_cents, status, reference,
               expires_at, created_at, resolved_at
        FROM giftcard_holds
        WHERE hold_id = $1
        FOR UPDATE
        "#
    } else {
        r#"
        SELECT hold_id, giftcard_code, amount_cents, status, reference,
               expires_at, created_at, resolved_at
        FROM giftcard_holds
        WHERE hold_id = $1
        "#
    };

    let record = sqlx::query_as::<_, HoldRecord>(sql)
        .bind(hold_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(record)
}

/// Lock the giftcard behind a hold, then the hold itself.
async fn lock_hold_with_card(
    conn: &mut PgConnection,
    hold_id: &str,
) -> Result<HoldRecord, CoreError> {
    let unlocked = fetch_hold(conn, hold_id, false)
        .await?
        .ok_or_else(|| CoreError::not_found("hold", hold_id))?;

    fetch_giftcard(conn, &unlocked.giftcard_code, true).await?;

    fetch_hold(conn, hold_id, true)
        .await?
        .ok_or_else(|| CoreError::not_found("hold", hold_id))
}

async fn active_held_cents(
    conn: &mut PgConnection,
    code: &str,
    now: DateTime<Utc>,
) -> Result<i64, CoreError> {
    let (held,): (i64,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(amount_cents), 0)::BIGINT
        FROM giftcard_holds
        WHERE giftcard_code = $1 AND status = 'active' AND expires_at > $2
        "#,
    )
    .bind(code)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(held)
}

async fn append_transaction(
    conn: &mut PgConnection,
    code: &str,
    kind: &str,
    amount_cents: i64,
    balance_after_cents: i64,
    reference: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO giftcard_transactions
            (giftcard_code, kind, amount_cents, balance_after_cents, reference, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(code)
    .bind(kind)
    .bind(amount_cents)
    .bind(balance_after_cents)
    .bind(reference)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn set_hold_status(
    conn: &mut PgConnection,
    hold_id: &str,
    status: &str,
    now: DateTime<Utc>,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        UPDATE giftcard_holds SET status = $1, resolved_at = $2
        WHERE hold_id = $3 AND status = 'active'
        "#,
    )
    .bind(status)
    .bind(now)
    .bind(hold_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn remaining_seats(capacity: i32, booked: i64) -> i32 {
    (i64::from(capacity) - booked).max(0) as i32
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait::async_trait]
impl Persistence for PostgresPersistence {
    async fn health_check(&self) -> Result<bool, CoreError> {
        let (one,): (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(one == 1)
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    async fn insert_product(&self, product: &ProductRecord) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (product_id, name, kind, technique, price_cents, capacity,
                                  duration_minutes, active, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&product.product_id)
        .bind(&product.name)
        .bind(&product.kind)
        .bind(&product.technique)
        .bind(product.price_cents)
        .bind(product.capacity)
        .bind(product.duration_minutes)
        .bind(product.active)
        .bind(&product.details)
        .bind(product.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_product(&self, product_id: &str) -> Result<Option<ProductRecord>, CoreError> {
        let record = sqlx::query_as::<_, ProductRecord>(
            r#"
            SELECT product_id, name, kind, technique, price_cents, capacity,
                   duration_minutes, active, details, created_at
            FROM products
            WHERE product_id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_products(&self, active_only: bool) -> Result<Vec<ProductRecord>, CoreError> {
        let records = sqlx::query_as::<_, ProductRecord>(
            r#"
            SELECT product_id, name, kind, technique, price_cents, capacity,
                   duration_minutes, active, details, created_at
            FROM products
            WHERE active OR NOT $1
            ORDER BY name, product_id
            "#,
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn set_product_active(
        &self,
        product_id: &str,
        active: bool,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query("UPDATE products SET active = $1 WHERE product_id = $2")
            .bind(active)
            .bind(product_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Bookings
    // ========================================================================

    async fn insert_booking_within_capacity(
        &self,
        booking: &BookingRecord,
    ) -> Result<SeatInsert, CoreError> {
        let mut tx = self.pool.begin().await?;

        let Some(capacity) = lock_product_capacity(&mut tx, &booking.product_id).await? else {
            return Err(CoreError::not_found("product", &booking.product_id));
        };

        let booked = booked_seats(&mut tx, &booking.product_id, booking.slot_start, None).await?;
        if booked + i64::from(booking.participants) > i64::from(capacity) {
            return Ok(SeatInsert::Full {
                remaining: remaining_seats(capacity, booked),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO bookings (booking_id, product_id, customer_name, customer_email,
                                  slot_start, participants, status, technique, price_cents,
                                  hold_id, giftcard_code, details, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(&booking.booking_id)
        .bind(&booking.product_id)
        .bind(&booking.customer_name)
        .bind(&booking.customer_email)
        .bind(booking.slot_start)
        .bind(booking.participants)
        .bind(&booking.status)
        .bind(&booking.technique)
        .bind(booking.price_cents)
        .bind(&booking.hold_id)
        .bind(&booking.giftcard_code)
        .bind(&booking.details)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(SeatInsert::Inserted)
    }

    async fn reschedule_booking_within_capacity(
        &self,
        booking_id: &str,
        expected_status: &str,
        new_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SeatReservation, CoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String,)> =
            sqlx::query_as("SELECT product_id FROM bookings WHERE booking_id = $1")
                .bind(booking_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((product_id,)) = row else {
            return Err(CoreError::not_found("booking", booking_id));
        };

        let Some(capacity) = lock_product_capacity(&mut tx, &product_id).await? else {
            return Err(CoreError::not_found("product", &product_id));
        };

        let (participants, status): (i32, String) = sqlx::query_as(
            "SELECT participants, status FROM bookings WHERE booking_id = $1 FOR UPDATE",
        )
        .bind(booking_id)
        .fetch_one(&mut *tx)
        .await?;
        if status != expected_status {
            return Ok(SeatReservation::Stale);
        }

        let booked = booked_seats(&mut tx, &product_id, new_start, Some(booking_id)).await?;
        if booked + i64::from(participants) > i64::from(capacity) {
            return Ok(SeatReservation::Full {
                remaining: remaining_seats(capacity, booked),
            });
        }

        sqlx::query("UPDATE bookings SET slot_start = $1, updated_at = $2 WHERE booking_id = $3")
            .bind(new_start)
            .bind(now)
            .bind(booking_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(SeatReservation::Reserved)
    }

    async fn get_booking(&self, booking_id: &str) -> Result<Option<BookingRecord>, CoreError> {
        let record = sqlx::query_as::<_, BookingRecord>(
            r#"
            SELECT booking_id, product_id, customer_name, customer_email, slot_start,
                   participants, status, technique, price_cents, hold_id, giftcard_code,
                   details, created_at, updated_at
            FROM bookings
            WHERE booking_id = $1
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_bookings(
        &self,
        filter: &ListBookingsFilter,
    ) -> Result<Vec<BookingRecord>, CoreError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT booking_id, product_id, customer_name, customer_email, slot_start,
                   participants, status, technique, price_cents, hold_id, giftcard_code,
                   details, created_at, updated_at
            FROM bookings
            WHERE TRUE
            "#,
        );

        if let Some(product_id) = &filter.product_id {
            qb.push(" AND product_id = ").push_bind(product_id.clone());
        }
        if let Some(status) = &filter.status {
            qb.push(" AND status = ").push_bind(status.clone());
        }
        if let Some(email) = &filter.customer_email {
            qb.push(" AND customer_email = ").push_bind(email.clone());
        }
        if let Some(from) = filter.from {
            qb.push(" AND slot_start >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND slot_start < ").push_bind(to);
        }
        qb.push(" ORDER BY slot_start, created_at");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let records = qb
            .build_query_as::<BookingRecord>()
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn list_seat_holding_bookings(
        &self,
        product_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BookingRecord>, CoreError> {
        let records = sqlx::query_as::<_, BookingRecord>(
            r#"
            SELECT booking_id, product_id, customer_name, customer_email, slot_start,
                   participants, status, technique, price_cents, hold_id, giftcard_code,
                   details, created_at, updated_at
            FROM bookings
            WHERE product_id = $1 AND slot_start >= $2 AND slot_start < $3
              AND status IN ('pending', 'confirmed', 'attended')
            ORDER BY slot_start, created_at
            "#,
        )
        .bind(product_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn update_booking_status(
        &self,
        booking_id: &str,
        expected: &str,
        to: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $1, updated_at = $2
            WHERE booking_id = $3 AND status = $4
            "#,
        )
        .bind(to)
        .bind(now)
        .bind(booking_id)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_bookings_missing_technique(&self) -> Result<Vec<BookingRecord>, CoreError> {
        let records = sqlx::query_as::<_, BookingRecord>(
            r#"
            SELECT booking_id, product_id, customer_name, customer_email, slot_start,
                   participants, status, technique, price_cents, hold_id, giftcard_code,
                   details, created_at, updated_at
            FROM bookings
            WHERE technique IS NULL
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn set_booking_technique(
        &self,
        booking_id: &str,
        technique: &str,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(
            "UPDATE bookings SET technique = $1 WHERE booking_id = $2 AND technique IS NULL",
        )
        .bind(technique)
        .bind(booking_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_pending_bookings_with_lapsed_holds(
        &self,
        limit: i64,
    ) -> Result<Vec<BookingRecord>, CoreError> {
        let records = sqlx::query_as::<_, BookingRecord>(
            r#"
            SELECT b.booking_id, b.product_id, b.customer_name, b.customer_email, b.slot_start,
                   b.participants, b.status, b.technique, b.price_cents, b.hold_id,
                   b.giftcard_code, b.details, b.created_at, b.updated_at
            FROM bookings b
            JOIN giftcard_holds h ON h.hold_id = b.hold_id
            WHERE b.status = 'pending' AND h.status IN ('expired', 'released')
            ORDER BY b.created_at
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    // ========================================================================
    // Giftcards
    // ========================================================================

    async fn insert_giftcard(&self, giftcard: &GiftcardRecord) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO giftcards (code, initial_cents, balance_cents, status, purchaser_name,
                                   recipient_name, recipient_email, message, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&giftcard.code)
        .bind(giftcard.initial_cents)
        .bind(giftcard.balance_cents)
        .bind(&giftcard.status)
        .bind(&giftcard.purchaser_name)
        .bind(&giftcard.recipient_name)
        .bind(&giftcard.recipient_email)
        .bind(&giftcard.message)
        .bind(giftcard.expires_at)
        .bind(giftcard.created_at)
        .execute(&mut *tx)
        .await?;

        append_transaction(
            &mut tx,
            &giftcard.code,
            "issue",
            giftcard.initial_cents,
            giftcard.balance_cents,
            None,
            giftcard.created_at,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_giftcard(&self, code: &str) -> Result<Option<GiftcardRecord>, CoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_giftcard(&mut conn, code, false).await
    }

    async fn held_cents(&self, code: &str, now: DateTime<Utc>) -> Result<i64, CoreError> {
        let mut conn = self.pool.acquire().await?;
        active_held_cents(&mut conn, code, now).await
    }

    async fn place_hold(&self, hold: &HoldRecord, now: DateTime<Utc>) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await?;

        let card = fetch_giftcard(&mut tx, &hold.giftcard_code, true)
            .await?
            .ok_or_else(|| CoreError::not_found("giftcard", &hold.giftcard_code))?;
        ensure_spendable(&card, now)?;

        let held = active_held_cents(&mut tx, &hold.giftcard_code, now).await?;
        let available = card.balance_cents - held;
        if available < hold.amount_cents {
            return Err(CoreError::InsufficientBalance {
                code: hold.giftcard_code.clone(),
                available_cents: available,
                requested_cents: hold.amount_cents,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO giftcard_holds (hold_id, giftcard_code, amount_cents, status, reference,
                                        expires_at, created_at, resolved_at)
            VALUES ($1, $2, $3, 'active', $4, $5, $6, NULL)
            "#,
        )
        .bind(&hold.hold_id)
        .bind(&hold.giftcard_code)
        .bind(hold.amount_cents)
        .bind(&hold.reference)
        .bind(hold.expires_at)
        .bind(hold.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_hold(&self, hold_id: &str) -> Result<Option<HoldRecord>, CoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_hold(&mut conn, hold_id, false).await
    }

    async fn list_holds(&self, code: &str) -> Result<Vec<HoldRecord>, CoreError> {
        let records = sqlx::query_as::<_, HoldRecord>(
            r#"
            SELECT hold_id, giftcard_code, amount_cents, status, reference,
                   expires_at, created_at, resolved_at
            FROM giftcard_holds
            WHERE giftcard_code = $1
            ORDER BY created_at, hold_id
            "#,
        )
        .bind(code)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn capture_hold(
        &self,
        hold_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(HoldRecord, GiftcardRecord), CoreError> {
        let mut tx = self.pool.begin().await?;

        let hold = lock_hold_with_card(&mut tx, hold_id).await?;
        match hold.status.as_str() {
            "active" => {}
            "expired" => {
                return Err(CoreError::HoldExpired {
                    hold_id: hold_id.to_string(),
                });
            }
            other => return Err(CoreError::invalid_state("hold", hold_id, "active", other)),
        }

        if hold.expires_at <= now {
            set_hold_status(&mut tx, hold_id, "expired", now).await?;
            tx.commit().await?;
            return Err(CoreError::HoldExpired {
                hold_id: hold_id.to_string(),
            });
        }

        set_hold_status(&mut tx, hold_id, "captured", now).await?;

        let card: Option<GiftcardRecord> = sqlx::query_as(
            r#"
            UPDATE giftcards SET balance_cents = balance_cents - $1
            WHERE code = $2 AND balance_cents >= $1
            RETURNING code, initial_cents, balance_cents, status, purchaser_name,
                      recipient_name, recipient_email, message, expires_at, created_at
            "#,
        )
        .bind(hold.amount_cents)
        .bind(&hold.giftcard_code)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(card) = card else {
            let current = fetch_giftcard(&mut tx, &hold.giftcard_code, false).await?;
            return Err(CoreError::InsufficientBalance {
                code: hold.giftcard_code.clone(),
                available_cents: current.map(|c| c.balance_cents).unwrap_or(0),
                requested_cents: hold.amount_cents,
            });
        };

        append_transaction(
            &mut tx,
            &card.code,
            "capture",
            -hold.amount_cents,
            card.balance_cents,
            hold.reference.as_deref(),
            now,
        )
        .await?;

        let hold = fetch_hold(&mut tx, hold_id, false)
            .await?
            .ok_or_else(|| CoreError::not_found("hold", hold_id))?;

        tx.commit().await?;
        Ok((hold, card))
    }

    async fn release_hold(
        &self,
        hold_id: &str,
        now: DateTime<Utc>,
    ) -> Result<HoldRecord, CoreError> {
        let mut tx = self.pool.begin().await?;

        let hold = lock_hold_with_card(&mut tx, hold_id).await?;
        match hold.status.as_str() {
            "active" => {}
            "released" | "expired" => return Ok(hold),
            other => return Err(CoreError::invalid_state("hold", hold_id, "active", other)),
        }

        set_hold_status(&mut tx, hold_id, "released", now).await?;

        let hold = fetch_hold(&mut tx, hold_id, false)
            .await?
            .ok_or_else(|| CoreError::not_found("hold", hold_id))?;

        tx.commit().await?;
        Ok(hold)
    }

    async fn redeem(
        &self,
        code: &str,
        amount_cents: i64,
        reference: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<GiftcardRecord, CoreError> {
        let mut tx = self.pool.begin().await?;

        let card = fetch_giftcard(&mut tx, code, true)
            .await?
            .ok_or_else(|| CoreError::not_found("giftcard", code))?;
        ensure_spendable(&card, now)?;

        let held = active_held_cents(&mut tx, code, now).await?;
        let available = card.balance_cents - held;
        if available < amount_cents {
            return Err(CoreError::InsufficientBalance {
                code: code.to_string(),
                available_cents: available,
                requested_cents: amount_cents,
            });
        }

        let card: GiftcardRecord = sqlx::query_as(
            r#"
            UPDATE giftcards SET balance_cents = balance_cents - $1
            WHERE code = $2
            RETURNING code, initial_cents, balance_cents, status, purchaser_name,
                      recipient_name, recipient_email, message, expires_at, created_at
            "#,
        )
        .bind(amount_cents)
        .bind(code)
        .fetch_one(&mut *tx)
        .await?;

        append_transaction(
            &mut tx,
            code,
            "redeem",
            -amount_cents,
            card.balance_cents,
            reference,
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(card)
    }

    async fn refund(
        &self,
        code: &str,
        amount_cents: i64,
        reference: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<GiftcardRecord, CoreError> {
        let mut tx = self.pool.begin().await?;

        let before = fetch_giftcard(&mut tx, code, true)
            .await?
            .ok_or_else(|| CoreError::not_found("giftcard", code))?;
        if before.status == "void" {
            return Err(CoreError::GiftcardInactive {
                code: code.to_string(),
                reason: "void".to_string(),
            });
        }

        let after: GiftcardRecord = sqlx::query_as(
            r#"
            UPDATE giftcards SET balance_cents = LEAST(balance_cents + $1, initial_cents)
            WHERE code = $2
            RETURNING code, initial_cents, balance_cents, status, purchaser_name,
                      recipient_name, recipient_email, message, expires_at, created_at
            "#,
        )
        .bind(amount_cents)
        .bind(code)
        .fetch_one(&mut *tx)
        .await?;

        let credited = after.balance_cents - before.balance_cents;
        if credited > 0 {
            append_transaction(
                &mut tx,
                code,
                "refund",
                credited,
                after.balance_cents,
                reference,
                now,
            )
            .await?;
        }

        tx.commit().await?;
        Ok(after)
    }

    async fn void_giftcard(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<GiftcardRecord, CoreError> {
        let mut tx = self.pool.begin().await?;

        let card = fetch_giftcard(&mut tx, code, true)
            .await?
            .ok_or_else(|| CoreError::not_found("giftcard", code))?;
        if card.status == "void" {
            return Ok(card);
        }

        sqlx::query(
            r#"
            UPDATE giftcard_holds SET status = 'released', resolved_at = $1
            WHERE giftcard_code = $2 AND status = 'active'
            "#,
        )
        .bind(now)
        .bind(code)
        .execute(&mut *tx)
        .await?;

        let voided: GiftcardRecord = sqlx::query_as(
            r#"
            UPDATE giftcards SET status = 'void', balance_cents = 0
            WHERE code = $1
            RETURNING code, initial_cents, balance_cents, status, purchaser_name,
                      recipient_name, recipient_email, message, expires_at, created_at
            "#,
        )
        .bind(code)
        .fetch_one(&mut *tx)
        .await?;

        append_transaction(&mut tx, code, "void", -card.balance_cents, 0, None, now).await?;

        tx.commit().await?;
        Ok(voided)
    }

    async fn list_transactions(&self, code: &str) -> Result<Vec<TransactionRecord>, CoreError> {
        let records = sqlx::query_as::<_, TransactionRecord>(
            r#"
            SELECT id, giftcard_code, kind, amount_cents, balance_after_cents, reference, created_at
            FROM giftcard_transactions
            WHERE giftcard_code = $1
            ORDER BY id
            "#,
        )
        .bind(code)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn expire_holds(&self, now: DateTime<Utc>, limit: i64) -> Result<u64, CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE giftcard_holds SET status = 'expired', resolved_at = $1
            WHERE hold_id IN (
                SELECT hold_id FROM giftcard_holds
                WHERE status = 'active' AND expires_at <= $1
                ORDER BY expires_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            "#,
        )
        .bind(now)
        .bind(limit)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // ========================================================================
    // Timecards
    // ========================================================================

    async fn insert_employee(&self, employee: &EmployeeRecord) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO employees (employee_id, name, email, role, hourly_rate_cents, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&employee.employee_id)
        .bind(&employee.name)
        .bind(&employee.email)
        .bind(&employee.role)
        .bind(employee.hourly_rate_cents)
        .bind(employee.active)
        .bind(employee.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_employee(&self, employee_id: &str) -> Result<Option<EmployeeRecord>, CoreError> {
        let record = sqlx::query_as::<_, EmployeeRecord>(
            r#"
            SELECT employee_id, name, email, role, hourly_rate_cents, active, created_at
            FROM employees
            WHERE employee_id = $1
            "#,
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_employees(&self, active_only: bool) -> Result<Vec<EmployeeRecord>, CoreError> {
        let records = sqlx::query_as::<_, EmployeeRecord>(
            r#"
            SELECT employee_id, name, email, role, hourly_rate_cents, active, created_at
            FROM employees
            WHERE active OR NOT $1
            ORDER BY name, employee_id
            "#,
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn set_employee_active(
        &self,
        employee_id: &str,
        active: bool,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query("UPDATE employees SET active = $1 WHERE employee_id = $2")
            .bind(active)
            .bind(employee_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn open_time_entry(&self, entry: &TimeEntryRecord) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO time_entries (entry_id, employee_id, clock_in, clock_out, note, created_at)
            VALUES ($1, $2, $3, NULL, $4, $5)
            "#,
        )
        .bind(&entry.entry_id)
        .bind(&entry.employee_id)
        .bind(entry.clock_in)
        .bind(&entry.note)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(CoreError::AlreadyClockedIn {
                employee_id: entry.employee_id.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn close_open_time_entry(
        &self,
        employee_id: &str,
        clock_out: DateTime<Utc>,
    ) -> Result<Option<TimeEntryRecord>, CoreError> {
        let record = sqlx::query_as::<_, TimeEntryRecord>(
            r#"
            UPDATE time_entries SET clock_out = $1
            WHERE employee_id = $2 AND clock_out IS NULL
            RETURNING entry_id, employee_id, clock_in, clock_out, note, created_at
            "#,
        )
        .bind(clock_out)
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_time_entry(&self, entry_id: &str) -> Result<Option<TimeEntryRecord>, CoreError> {
        let record = sqlx::query_as::<_, TimeEntryRecord>(
            r#"
            SELECT entry_id, employee_id, clock_in, clock_out, note, created_at
            FROM time_entries
            WHERE entry_id = $1
            "#,
        )
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update_time_entry(
        &self,
        entry_id: &str,
        clock_in: DateTime<Utc>,
        clock_out: Option<DateTime<Utc>>,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(
            "UPDATE time_entries SET clock_in = $1, clock_out = $2 WHERE entry_id = $3",
        )
        .bind(clock_in)
        .bind(clock_out)
        .bind(entry_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(r) => Ok(r.rows_affected() > 0),
            Err(e) if is_unique_violation(&e) => {
                let employee_id = self
                    .get_time_entry(entry_id)
                    .await?
                    .map(|entry| entry.employee_id)
                    .unwrap_or_default();
                Err(CoreError::AlreadyClockedIn { employee_id })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_time_entries(
        &self,
        employee_id: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimeEntryRecord>, CoreError> {
        let records = sqlx::query_as::<_, TimeEntryRecord>(
            r#"
            SELECT entry_id, employee_id, clock_in, clock_out, note, created_at
            FROM time_entries
            WHERE ($1::text IS NULL OR employee_id = $1)
              AND clock_in < $2
              AND (clock_out IS NULL OR clock_out > $3)
            ORDER BY employee_id, clock_in
            "#,
        )
        .bind(employee_id)
        .bind(to)
        .bind(from)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    // ========================================================================
    // Deliveries
    // ========================================================================

    async fn insert_delivery(&self, delivery: &DeliveryRecord) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO deliveries (delivery_id, booking_id, customer_name, customer_email, pieces,
                                    status, notes, ready_at, picked_up_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&delivery.delivery_id)
        .bind(&delivery.booking_id)
        .bind(&delivery.customer_name)
        .bind(&delivery.customer_email)
        .bind(delivery.pieces)
        .bind(&delivery.status)
        .bind(&delivery.notes)
        .bind(delivery.ready_at)
        .bind(delivery.picked_up_at)
        .bind(delivery.created_at)
        .bind(delivery.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_delivery(&self, delivery_id: &str) -> Result<Option<DeliveryRecord>, CoreError> {
        let record = sqlx::query_as::<_, DeliveryRecord>(
            r#"
            SELECT delivery_id, booking_id, customer_name, customer_email, pieces, status,
                   notes, ready_at, picked_up_at, created_at, updated_at
            FROM deliveries
            WHERE delivery_id = $1
            "#,
        )
        .bind(delivery_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_deliveries(
        &self,
        status: Option<&str>,
    ) -> Result<Vec<DeliveryRecord>, CoreError> {
        let records = sqlx::query_as::<_, DeliveryRecord>(
            r#"
            SELECT delivery_id, booking_id, customer_name, customer_email, pieces, status,
                   notes, ready_at, picked_up_at, created_at, updated_at
            FROM deliveries
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at, delivery_id
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn update_delivery_status(
        &self,
        transition: &DeliveryTransition<'_>,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE deliveries
            SET status = $1,
                ready_at = COALESCE($2, ready_at),
                picked_up_at = COALESCE($3, picked_up_at),
                updated_at = $4
            WHERE delivery_id = $5 AND status = $6
            "#,
        )
        .bind(transition.to)
        .bind(transition.ready_at)
        .bind(transition.picked_up_at)
        .bind(transition.now)
        .bind(transition.delivery_id)
        .bind(transition.expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_uncollected_deliveries(
        &self,
        ready_before: DateTime<Utc>,
    ) -> Result<Vec<DeliveryRecord>, CoreError> {
        let records = sqlx::query_as::<_, DeliveryRecord>(
            r#"
            SELECT delivery_id, booking_id, customer_name, customer_email, pieces, status,
                   notes, ready_at, picked_up_at, created_at, updated_at
            FROM deliveries
            WHERE status = 'ready' AND ready_at < $1
            ORDER BY ready_at
            "#,
        )
        .bind(ready_before)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
