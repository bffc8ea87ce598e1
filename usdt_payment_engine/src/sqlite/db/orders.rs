use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;
use upg_common::MicroUsdt;

use crate::{
    db_types::{Currency, NewOrder, Order, OrderId},
    traits::{LedgerError, MatchWindow, OrderStatSummary},
};

/// Inserts a pending order row. Returns `None` when a unique constraint (the order number, or
/// the pending-amount index backing the disambiguation invariant) rejects the row; callers
/// regenerate the random parts and retry.
pub async fn insert_pending(
    order: &NewOrder,
    order_id: &OrderId,
    amount: MicroUsdt,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, LedgerError> {
    let result = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                user_id,
                base_amount,
                amount,
                currency,
                status,
                agent_id,
                units,
                created_at,
                expires_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, 'Pending', $6, $7, $8, $9, $8)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(order.user_id)
    .bind(order.base_amount)
    .bind(amount)
    .bind(order.currency)
    .bind(order.agent_id.as_deref())
    .bind(order.units)
    .bind(now)
    .bind(expires_at)
    .fetch_one(conn)
    .await;
    match result {
        Ok(order) => Ok(Some(order)),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Whether any pending order of the currency lies within `tolerance` of `amount`. Used at
/// creation time to keep pending amounts pairwise separated by more than the tolerance.
pub async fn pending_amount_collides(
    amount: MicroUsdt,
    currency: Currency,
    tolerance: MicroUsdt,
    conn: &mut SqliteConnection,
) -> Result<bool, LedgerError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders WHERE status = 'Pending' AND currency = $1 AND amount BETWEEN $2 AND $3",
    )
    .bind(currency)
    .bind(amount - tolerance)
    .bind(amount + tolerance)
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_credited_ref(
    external_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE credited_ref = $1").bind(external_ref).fetch_optional(conn).await?;
    Ok(order)
}

/// The candidate search behind payment matching. Pending orders of the currency whose amount is
/// within `tolerance` and whose creation time falls inside the window; the smallest absolute
/// difference wins, ties break on earliest creation.
pub async fn find_candidate(
    amount: MicroUsdt,
    currency: Currency,
    tolerance: MicroUsdt,
    window: MatchWindow,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, LedgerError> {
    trace!("📝️ Searching {currency} candidates for {amount} between {} and {}", window.since, window.until);
    let order = sqlx::query_as(
        r#"
            SELECT * FROM orders
            WHERE status = 'Pending'
              AND currency = $1
              AND amount BETWEEN $2 AND $3
              AND created_at BETWEEN $4 AND $5
            ORDER BY ABS(amount - $6) ASC, created_at ASC
            LIMIT 1;
        "#,
    )
    .bind(currency)
    .bind(amount - tolerance)
    .bind(amount + tolerance)
    .bind(window.since)
    .bind(window.until)
    .bind(amount)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// The conditional Pending → Completed transition. Returns `None` when the order is not pending
/// (or does not exist); the zero-row case is the idempotency boundary, so callers must not touch
/// any balance when they see it.
pub async fn try_complete(
    order_id: &OrderId,
    external_ref: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, LedgerError> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders
            SET status = 'Completed', credited_ref = $2, credited_at = $3, updated_at = $3
            WHERE order_id = $1 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(external_ref)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Expires every pending order whose deadline has passed. Conditional on Pending, so an order
/// credited between the deadline and the sweep is untouched.
pub async fn expire_due(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Vec<Order>, LedgerError> {
    let orders = sqlx::query_as(
        r#"
            UPDATE orders
            SET status = 'Expired', updated_at = $1
            WHERE status = 'Pending' AND expires_at < $1
            RETURNING *;
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

/// Cancels a pending order. `None` when the order is not currently pending.
pub async fn cancel(
    order_id: &OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, LedgerError> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders
            SET status = 'Cancelled', updated_at = $2
            WHERE order_id = $1 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub async fn stats(conn: &mut SqliteConnection) -> Result<Vec<OrderStatSummary>, LedgerError> {
    let rows = sqlx::query_as(
        r#"
            SELECT status, currency, COUNT(*) AS count, COALESCE(SUM(amount), 0) AS total
            FROM orders
            GROUP BY status, currency
            ORDER BY status, currency;
        "#,
    )
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
