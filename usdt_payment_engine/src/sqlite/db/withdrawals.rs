use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, SqliteConnection};
use upg_common::MicroUsdt;

use crate::{
    db_types::{WithdrawalRequest, WithdrawalStatus},
    traits::{AgentError, WithdrawalFilter},
};

pub async fn insert(
    agent_id: &str,
    amount: MicroUsdt,
    fee: MicroUsdt,
    payout_address: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<WithdrawalRequest, AgentError> {
    let request = sqlx::query_as(
        r#"
            INSERT INTO withdrawals (agent_id, amount, fee, payout_address, status, created_at)
            VALUES ($1, $2, $3, $4, 'Pending', $5)
            RETURNING *;
        "#,
    )
    .bind(agent_id)
    .bind(amount)
    .bind(fee)
    .bind(payout_address)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(request)
}

pub async fn fetch(request_id: i64, conn: &mut SqliteConnection) -> Result<Option<WithdrawalRequest>, AgentError> {
    let request =
        sqlx::query_as("SELECT * FROM withdrawals WHERE id = $1").bind(request_id).fetch_optional(conn).await?;
    Ok(request)
}

/// The conditional state transition. Exactly one of two racing admins gets the row; the other
/// sees `None` and must not apply balance side effects.
pub async fn try_transition(
    request_id: i64,
    from: WithdrawalStatus,
    to: WithdrawalStatus,
    reviewer: &str,
    reason: Option<&str>,
    payout_ref: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<WithdrawalRequest>, AgentError> {
    let request = sqlx::query_as(
        r#"
            UPDATE withdrawals
            SET status = $3,
                reviewed_at = $5,
                reviewed_by = $4,
                reason = COALESCE($6, reason),
                payout_ref = COALESCE($7, payout_ref)
            WHERE id = $1 AND status = $2
            RETURNING *;
        "#,
    )
    .bind(request_id)
    .bind(from)
    .bind(to)
    .bind(reviewer)
    .bind(now)
    .bind(reason)
    .bind(payout_ref)
    .fetch_optional(conn)
    .await?;
    Ok(request)
}

/// Fetches withdrawal requests matching the filter, newest first.
pub async fn search(
    filter: WithdrawalFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<WithdrawalRequest>, AgentError> {
    let mut builder = QueryBuilder::new("SELECT * FROM withdrawals ");
    if filter.agent_id.is_some() || filter.status.is_some() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(agent_id) = filter.agent_id {
        where_clause.push("agent_id = ");
        where_clause.push_bind_unseparated(agent_id);
    }
    if let Some(status) = filter.status {
        where_clause.push("status = ");
        where_clause.push_bind_unseparated(status.to_string());
    }
    builder.push(" ORDER BY created_at DESC");
    trace!("🏧️ Executing query: {}", builder.sql());
    let requests = builder
        .build()
        .fetch_all(conn)
        .await?
        .into_iter()
        .map(|row: SqliteRow| WithdrawalRequest::from_row(&row))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(requests)
}
