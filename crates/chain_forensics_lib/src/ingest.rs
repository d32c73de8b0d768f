use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqliteConnection;
use std::fs;
use std::path::Path;

use crate::db::model::TransactionDao;
use crate::db::ops::upsert_transactions;
use crate::error::ForensicError;
use crate::model::ChainType;
use crate::{err_from, err_invalid_input};

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

pub fn is_evm_address(address: &str) -> bool {
    address.len() == 42
        && (address.starts_with("0x") || address.starts_with("0X"))
        && hex::decode(&address[2..]).is_ok()
}

pub fn is_solana_address(address: &str) -> bool {
    (32..=44).contains(&address.len()) && address.chars().all(|c| BASE58_ALPHABET.contains(c))
}

pub fn validate_address(address: &str, chain_type: ChainType) -> Result<(), ForensicError> {
    let valid = match chain_type {
        ChainType::Evm => is_evm_address(address),
        ChainType::Solana => is_solana_address(address),
    };
    if valid {
        Ok(())
    } else {
        Err(err_invalid_input!("Invalid {} address: {}", chain_type, address))
    }
}

/// EVM addresses are case-insensitive and stored lowercase; anything else is
/// kept as given.
pub fn normalize_address(address: &str) -> String {
    let address = address.trim();
    if is_evm_address(address) {
        address.to_ascii_lowercase()
    } else {
        address.to_string()
    }
}

/// Decimal text of a numeric field: JSON numbers keep their exact digits,
/// `0x` prefixed hex text is converted.
fn decimal_text(field: &str, value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                None
            } else if let Some(hex_digits) = text.strip_prefix("0x") {
                match BigUint::parse_bytes(hex_digits.as_bytes(), 16) {
                    Some(v) => Some(v.to_str_radix(10)),
                    None => Some(text.to_string()),
                }
            } else {
                Some(text.to_string())
            }
        }
        other => {
            log::warn!("Ignoring non-numeric {} {}", field, other);
            None
        }
    }
}

fn status_code(value: &Value) -> Option<i64> {
    match value {
        Value::Null => None,
        Value::Bool(flag) => Some(*flag as i64),
        Value::Number(number) => match number.as_i64() {
            Some(0) => Some(0),
            Some(_) => Some(1),
            None => {
                log::warn!("Unrecognized transaction status {}, storing as unknown", number);
                None
            }
        },
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "1" | "0x1" | "true" | "success" => Some(1),
            "0" | "0x0" | "false" | "failed" => Some(0),
            other => {
                log::warn!("Unrecognized transaction status {:?}, storing as unknown", other);
                None
            }
        },
        other => {
            log::warn!("Unrecognized transaction status {}, storing as unknown", other);
            None
        }
    }
}

fn block_number(value: &Value) -> Option<i64> {
    let parsed = match value {
        Value::Null => return None,
        Value::Number(number) => number.as_i64(),
        Value::String(text) => {
            let text = text.trim();
            match text.strip_prefix("0x") {
                Some(hex_digits) => i64::from_str_radix(hex_digits, 16).ok(),
                None => text.parse::<i64>().ok(),
            }
        }
        _ => None,
    };
    if parsed.is_none() {
        log::warn!("Unparseable block number {}, storing as unknown", value);
    }
    parsed
}

/// A transaction record as delivered by an external fetcher.
///
/// Numeric fields are kept as raw JSON so a value beyond 64 bits, a hex
/// string or a float degrades per record instead of failing the whole file.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    #[serde(default, alias = "txHash")]
    pub hash: String,
    #[serde(default, alias = "chain")]
    pub chain_name: String,
    pub block_number: Option<Value>,
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub from: String,
    pub to: Option<String>,
    pub value: Option<Value>,
    pub gas_used: Option<Value>,
    pub gas_price: Option<Value>,
    #[serde(alias = "inputData")]
    pub input: Option<String>,
    pub contract_address: Option<String>,
    pub status: Option<Value>,
    pub method_id: Option<String>,
}

fn unix_timestamp(secs: i64) -> Result<DateTime<Utc>, ForensicError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| ForensicError::DataError(format!("Timestamp out of range: {}", secs)))
}

fn parse_timestamp(raw: &Value) -> Result<Option<DateTime<Utc>>, ForensicError> {
    match raw {
        Value::Null => Ok(None),
        Value::Number(number) => match number.as_i64() {
            Some(secs) => unix_timestamp(secs).map(Some),
            None => Err(ForensicError::DataError(format!("Unparseable timestamp: {}", number))),
        },
        Value::String(text) => {
            let text = text.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
                return Ok(Some(ts.with_timezone(&Utc)));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
                return Ok(Some(Utc.from_utc_datetime(&naive)));
            }
            if let Ok(secs) = text.parse::<i64>() {
                return unix_timestamp(secs).map(Some);
            }
            Err(ForensicError::DataError(format!("Unparseable timestamp: {}", text)))
        }
        other => Err(ForensicError::DataError(format!("Unparseable timestamp: {}", other))),
    }
}

/// Method selector: `0x` followed by the first four bytes of call data.
pub fn method_selector(input: &str) -> Option<String> {
    let input = input.trim();
    let digits = input.strip_prefix("0x")?;
    let selector = digits.get(..8)?;
    hex::decode(selector).ok()?;
    Some(format!("0x{}", selector.to_ascii_lowercase()))
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn normalize_transaction(raw: &RawTransaction) -> Result<TransactionDao, ForensicError> {
    let tx_hash = raw.hash.trim();
    if tx_hash.is_empty() {
        return Err(ForensicError::DataError("Transaction without hash".to_string()));
    }
    if raw.from.trim().is_empty() {
        return Err(ForensicError::DataError(format!(
            "Transaction {} without sender",
            tx_hash
        )));
    }
    if raw.chain_name.trim().is_empty() {
        return Err(ForensicError::DataError(format!(
            "Transaction {} without chain name",
            tx_hash
        )));
    }
    let timestamp = match &raw.timestamp {
        Some(value) => parse_timestamp(value)?,
        None => None,
    };
    let input_data = non_empty(&raw.input);
    let method_id = non_empty(&raw.method_id)
        .or_else(|| input_data.as_deref().and_then(method_selector));

    Ok(TransactionDao {
        id: 0,
        tx_hash: tx_hash.to_string(),
        chain_name: raw.chain_name.trim().to_string(),
        block_number: raw.block_number.as_ref().and_then(block_number),
        timestamp,
        from_address: normalize_address(&raw.from),
        to_address: non_empty(&raw.to).map(|to| normalize_address(&to)),
        value: raw.value.as_ref().and_then(|v| decimal_text("value", v)),
        gas_used: raw.gas_used.as_ref().and_then(|v| decimal_text("gas used", v)),
        gas_price: raw.gas_price.as_ref().and_then(|v| decimal_text("gas price", v)),
        input_data,
        contract_address: non_empty(&raw.contract_address).map(|c| normalize_address(&c)),
        status: raw.status.as_ref().and_then(status_code),
        method_id,
    })
}

/// Accepts either a bare JSON array of transactions or
/// `{"transactions": [...]}`. A record whose shape cannot be read at all is
/// logged and left out; the rest of the file is still returned.
pub fn parse_transactions(document: Value) -> Result<Vec<RawTransaction>, ForensicError> {
    let records = match document {
        Value::Array(records) => records,
        Value::Object(mut map) => match map.remove("transactions") {
            Some(Value::Array(records)) => records,
            _ => {
                return Err(ForensicError::DataError(
                    "Expected a \"transactions\" array".to_string(),
                ))
            }
        },
        _ => {
            return Err(ForensicError::DataError(
                "Expected a transaction array or object".to_string(),
            ))
        }
    };
    Ok(records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value(record) {
            Ok(raw) => Some(raw),
            Err(err) => {
                log::warn!("Skipping unreadable transaction #{}: {}", index, err);
                None
            }
        })
        .collect())
}

pub fn load_transactions_file<P: AsRef<Path>>(path: P) -> Result<Vec<RawTransaction>, ForensicError> {
    let content = fs::read(path).map_err(err_from!())?;
    let document: Value = serde_json::from_slice(&content).map_err(err_from!())?;
    parse_transactions(document)
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RejectedRecord {
    pub index: usize,
    pub hash: String,
    pub reason: String,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub stored: usize,
    pub rejected: Vec<RejectedRecord>,
}

/// Normalize and store a batch. Malformed records are reported and skipped;
/// the valid ones are written in one database transaction.
pub async fn ingest_transactions(
    conn: &mut SqliteConnection,
    raw: &[RawTransaction],
) -> Result<IngestSummary, ForensicError> {
    let mut summary = IngestSummary::default();
    let mut rows = Vec::with_capacity(raw.len());
    for (index, record) in raw.iter().enumerate() {
        match normalize_transaction(record) {
            Ok(row) => rows.push(row),
            Err(err) => {
                log::warn!("Skipping transaction #{} ({}): {}", index, record.hash, err);
                summary.rejected.push(RejectedRecord {
                    index,
                    hash: record.hash.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
    summary.stored = upsert_transactions(conn, &rows).await.map_err(err_from!())?;
    log::info!(
        "Stored {} transaction(s), rejected {}",
        summary.stored,
        summary.rejected.len()
    );
    Ok(summary)
}
