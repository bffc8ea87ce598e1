use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use upg_common::MicroUsdt;

use crate::{
    db_types::{ChainTransfer, ChainTransferEvent, TransferStatus},
    traits::{InsertTransferResult, LedgerError, MatchWindow},
};

/// Mirrors a feed event, keyed by txid. Observing the same txid again is a no-op; the
/// confirmations count is feed state, not ledger state, so it is not stored.
pub async fn idempotent_insert(
    event: &ChainTransferEvent,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<InsertTransferResult, LedgerError> {
    let result = sqlx::query(
        r#"
            INSERT INTO transfers (txid, to_address, amount, block_number, event_time, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'Received', $6, $6);
        "#,
    )
    .bind(&event.txid)
    .bind(&event.to_address)
    .bind(event.amount())
    .bind(event.block_number)
    .bind(event.event_time)
    .bind(now)
    .execute(conn)
    .await;
    match result {
        Ok(_) => Ok(InsertTransferResult::Inserted),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(InsertTransferResult::AlreadyExists),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_transfer(txid: &str, conn: &mut SqliteConnection) -> Result<Option<ChainTransfer>, LedgerError> {
    let transfer = sqlx::query_as("SELECT * FROM transfers WHERE txid = $1").bind(txid).fetch_optional(conn).await?;
    Ok(transfer)
}

pub async fn update_status(
    txid: &str,
    status: TransferStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<ChainTransfer, LedgerError> {
    let transfer = sqlx::query_as("UPDATE transfers SET status = $2, updated_at = $3 WHERE txid = $1 RETURNING *")
        .bind(txid)
        .bind(status)
        .bind(now)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| LedgerError::TransferNotFound(txid.to_string()))?;
    Ok(transfer)
}

pub async fn fetch_by_status(
    status: TransferStatus,
    conn: &mut SqliteConnection,
) -> Result<Vec<ChainTransfer>, LedgerError> {
    let transfers = sqlx::query_as("SELECT * FROM transfers WHERE status = $1 ORDER BY event_time ASC")
        .bind(status)
        .fetch_all(conn)
        .await?;
    Ok(transfers)
}

/// Uncredited transfers near `amount` inside the event-time window, closest amount first.
/// Both Received and Unmatched records qualify: a transfer that found no order on an earlier
/// pass can still be claimed by a rescan.
pub async fn search_uncredited(
    amount: MicroUsdt,
    tolerance: MicroUsdt,
    window: MatchWindow,
    conn: &mut SqliteConnection,
) -> Result<Vec<ChainTransfer>, LedgerError> {
    let transfers = sqlx::query_as(
        r#"
            SELECT * FROM transfers
            WHERE status IN ('Received', 'Unmatched')
              AND amount BETWEEN $1 AND $2
              AND event_time BETWEEN $3 AND $4
            ORDER BY ABS(amount - $5) ASC, event_time ASC;
        "#,
    )
    .bind(amount - tolerance)
    .bind(amount + tolerance)
    .bind(window.since)
    .bind(window.until)
    .bind(amount)
    .fetch_all(conn)
    .await?;
    Ok(transfers)
}
