use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use upg_common::MicroUsdt;

use crate::{db_types::Agent, traits::AgentError};

/// Creates the agent or updates its markup. Balance columns are never touched here.
pub async fn upsert(
    agent_id: &str,
    markup_per_unit: MicroUsdt,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Agent, AgentError> {
    let agent = sqlx::query_as(
        r#"
            INSERT INTO agents (agent_id, markup_per_unit, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (agent_id) DO UPDATE SET markup_per_unit = excluded.markup_per_unit, updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(agent_id)
    .bind(markup_per_unit)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(agent)
}

pub async fn fetch(agent_id: &str, conn: &mut SqliteConnection) -> Result<Option<Agent>, sqlx::Error> {
    let agent = sqlx::query_as("SELECT * FROM agents WHERE agent_id = $1").bind(agent_id).fetch_optional(conn).await?;
    Ok(agent)
}

/// Accrues commission into the available balance. The only caller is the credit transaction.
pub async fn accrue(
    agent_id: &str,
    amount: MicroUsdt,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE agents SET profit_available = profit_available + $2, updated_at = $3 WHERE agent_id = $1")
            .bind(agent_id)
            .bind(amount)
            .bind(now)
            .execute(conn)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Moves `amount` from available to frozen, conditional on sufficient available profit.
/// Returns false (and changes nothing) when the balance does not cover the amount.
pub async fn freeze(
    agent_id: &str,
    amount: MicroUsdt,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE agents
            SET profit_available = profit_available - $2, profit_frozen = profit_frozen + $2, updated_at = $3
            WHERE agent_id = $1 AND profit_available >= $2;
        "#,
    )
    .bind(agent_id)
    .bind(amount)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Returns `amount` from frozen back to available (withdrawal rejected).
pub async fn unfreeze(
    agent_id: &str,
    amount: MicroUsdt,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE agents
            SET profit_frozen = profit_frozen - $2, profit_available = profit_available + $2, updated_at = $3
            WHERE agent_id = $1 AND profit_frozen >= $2;
        "#,
    )
    .bind(agent_id)
    .bind(amount)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Moves `amount` from frozen to total paid (withdrawal paid out).
pub async fn settle(
    agent_id: &str,
    amount: MicroUsdt,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE agents
            SET profit_frozen = profit_frozen - $2, total_paid = total_paid + $2, updated_at = $3
            WHERE agent_id = $1 AND profit_frozen >= $2;
        "#,
    )
    .bind(agent_id)
    .bind(amount)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
