use crate::db::model::*;
use crate::model::DateRange;
use sqlx::{Connection, SqliteConnection};

/// Ascending by time, rows without a timestamp last, insertion order on ties.
pub const TRANSACTION_ORDER_BY_TIMESTAMP: &str = "timestamp IS NULL, timestamp ASC, id ASC";

pub async fn upsert_transaction(
    conn: &mut SqliteConnection,
    tx: &TransactionDao,
) -> Result<TransactionDao, sqlx::Error> {
    let res = sqlx::query_as::<_, TransactionDao>(
        r"INSERT INTO transactions
(tx_hash, chain_name, block_number, timestamp, from_address, to_address, value, gas_used, gas_price, input_data, contract_address, status, method_id)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
ON CONFLICT(tx_hash) DO UPDATE SET
chain_name = excluded.chain_name,
block_number = excluded.block_number,
timestamp = excluded.timestamp,
from_address = excluded.from_address,
to_address = excluded.to_address,
value = excluded.value,
gas_used = excluded.gas_used,
gas_price = excluded.gas_price,
input_data = excluded.input_data,
contract_address = excluded.contract_address,
status = excluded.status,
method_id = excluded.method_id
RETURNING *;
",
    )
    .bind(&tx.tx_hash)
    .bind(&tx.chain_name)
    .bind(tx.block_number)
    .bind(tx.timestamp)
    .bind(&tx.from_address)
    .bind(&tx.to_address)
    .bind(&tx.value)
    .bind(&tx.gas_used)
    .bind(&tx.gas_price)
    .bind(&tx.input_data)
    .bind(&tx.contract_address)
    .bind(tx.status)
    .bind(&tx.method_id)
    .fetch_one(conn)
    .await?;
    Ok(res)
}

/// Stores a batch atomically.
pub async fn upsert_transactions(
    conn: &mut SqliteConnection,
    txs: &[TransactionDao],
) -> Result<usize, sqlx::Error> {
    let mut db_transaction = conn.begin().await?;
    for tx in txs {
        upsert_transaction(&mut db_transaction, tx).await?;
    }
    db_transaction.commit().await?;
    Ok(txs.len())
}

pub async fn get_transaction_by_hash(
    conn: &mut SqliteConnection,
    tx_hash: &str,
) -> Result<Option<TransactionDao>, sqlx::Error> {
    let row = sqlx::query_as::<_, TransactionDao>(r"SELECT * FROM transactions WHERE tx_hash = $1")
        .bind(tx_hash)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn get_transaction_count(conn: &mut SqliteConnection) -> Result<usize, sqlx::Error> {
    let count = sqlx::query_scalar::<_, i64>(r"SELECT COUNT(*) FROM transactions")
        .fetch_one(conn)
        .await?;
    Ok(count as usize)
}

fn date_range_filter(range: &DateRange) -> String {
    let mut filter = String::new();
    if range.start.is_some() {
        filter.push_str(" AND timestamp >= ?");
    }
    if range.end.is_some() {
        filter.push_str(" AND timestamp <= ?");
    }
    filter
}

/// Every transaction sent or received by any of `addresses`.
pub async fn get_forensic_timeline(
    conn: &mut SqliteConnection,
    addresses: &[String],
    range: &DateRange,
) -> Result<Vec<TransactionDao>, sqlx::Error> {
    if addresses.is_empty() {
        return Ok(vec![]);
    }
    let placeholders = vec!["?"; addresses.len()].join(", ");
    let query = format!(
        r"SELECT * FROM transactions WHERE (from_address IN ({0}) OR to_address IN ({0})){1} ORDER BY {2}",
        placeholders,
        date_range_filter(range),
        TRANSACTION_ORDER_BY_TIMESTAMP
    );
    let mut q = sqlx::query_as::<_, TransactionDao>(query.as_str());
    for address in addresses.iter().chain(addresses.iter()) {
        q = q.bind(address);
    }
    if let Some(start) = range.start {
        q = q.bind(start);
    }
    if let Some(end) = range.end {
        q = q.bind(end);
    }
    let rows = q.fetch_all(conn).await?;
    Ok(rows)
}

pub async fn get_transaction_flow(
    conn: &mut SqliteConnection,
    from_address: &str,
    to_address: &str,
) -> Result<Vec<TransactionDao>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TransactionDao>(
        format!(
            r"SELECT * FROM transactions WHERE from_address = $1 AND to_address = $2 ORDER BY {}",
            TRANSACTION_ORDER_BY_TIMESTAMP
        )
        .as_str(),
    )
    .bind(from_address)
    .bind(to_address)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub async fn get_address_transactions(
    conn: &mut SqliteConnection,
    address: &str,
    range: &DateRange,
) -> Result<Vec<TransactionDao>, sqlx::Error> {
    let query = format!(
        r"SELECT * FROM transactions WHERE (from_address = ? OR to_address = ?){} ORDER BY {}",
        date_range_filter(range),
        TRANSACTION_ORDER_BY_TIMESTAMP
    );
    let mut q = sqlx::query_as::<_, TransactionDao>(query.as_str())
        .bind(address)
        .bind(address);
    if let Some(start) = range.start {
        q = q.bind(start);
    }
    if let Some(end) = range.end {
        q = q.bind(end);
    }
    let rows = q.fetch_all(conn).await?;
    Ok(rows)
}
