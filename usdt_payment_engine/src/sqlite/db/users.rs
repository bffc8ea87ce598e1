use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use upg_common::MicroUsdt;

use crate::{db_types::UserAccount, traits::LedgerError};

/// Adds `amount` to the user's balance, creating the account row on first credit. The increment
/// happens SQL-side so concurrent credits compose.
pub async fn credit_balance(
    user_id: i64,
    amount: MicroUsdt,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
            INSERT INTO users (user_id, balance, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (user_id) DO UPDATE SET balance = balance + excluded.balance, updated_at = excluded.updated_at;
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_account(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<UserAccount>, LedgerError> {
    let account = sqlx::query_as("SELECT * FROM users WHERE user_id = $1").bind(user_id).fetch_optional(conn).await?;
    Ok(account)
}
