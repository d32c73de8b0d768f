use chrono::Duration;
use num_bigint::BigUint;
use serde::Serialize;
use std::collections::HashMap;

use crate::db::model::TransactionDao;
use crate::error::ForensicError;
use crate::model::{DateRange, QueryOutcome};
use crate::store::TransactionRepository;
use crate::utils::{big_dec, native_unit};

pub const RAPID_TRANSFER_WINDOW_SECS: i64 = 60;
pub const REPEATED_VALUE_MIN_COUNT: usize = 3;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PatternThresholds {
    /// Adjacent transfers strictly closer than this are rapid.
    #[serde(skip)]
    pub rapid_transfer_window: Duration,
    /// Values strictly above this are high-value. One whole native token.
    #[serde(serialize_with = "big_dec::serialize")]
    pub high_value_threshold: BigUint,
    pub repeated_value_min_count: usize,
}

impl Default for PatternThresholds {
    fn default() -> Self {
        PatternThresholds {
            rapid_transfer_window: Duration::seconds(RAPID_TRANSFER_WINDOW_SECS),
            high_value_threshold: native_unit(),
            repeated_value_min_count: REPEATED_VALUE_MIN_COUNT,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RapidTransfer {
    pub first_tx: String,
    pub second_tx: String,
    pub time_diff_ms: i64,
}

impl RapidTransfer {
    pub fn time_diff_secs(&self) -> f64 {
        self.time_diff_ms as f64 / 1000.0
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepeatedValue {
    pub value: String,
    pub count: usize,
    pub transactions: Vec<TransactionDao>,
}

/// All findings, untruncated. Presentation decides how much to show.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PatternResult {
    pub address: String,
    pub transaction_count: usize,
    pub rapid_transfers: Vec<RapidTransfer>,
    pub high_value_transactions: Vec<TransactionDao>,
    pub contract_interactions: Vec<TransactionDao>,
    pub failed_transactions: Vec<TransactionDao>,
    /// In order of first appearance.
    pub repeated_values: Vec<RepeatedValue>,
}

impl PatternResult {
    pub fn has_findings(&self) -> bool {
        !(self.rapid_transfers.is_empty()
            && self.high_value_transactions.is_empty()
            && self.contract_interactions.is_empty()
            && self.failed_transactions.is_empty()
            && self.repeated_values.is_empty())
    }
}

pub fn find_rapid_transfers(
    transactions: &[TransactionDao],
    window: Duration,
) -> Vec<RapidTransfer> {
    transactions
        .windows(2)
        .filter_map(|pair| {
            let (prev, curr) = (&pair[0], &pair[1]);
            let (Some(prev_ts), Some(curr_ts)) = (prev.timestamp, curr.timestamp) else {
                return None;
            };
            let delta = if curr_ts >= prev_ts {
                curr_ts - prev_ts
            } else {
                prev_ts - curr_ts
            };
            (delta < window).then(|| RapidTransfer {
                first_tx: prev.tx_hash.clone(),
                second_tx: curr.tx_hash.clone(),
                time_diff_ms: delta.num_milliseconds(),
            })
        })
        .collect()
}

pub fn find_high_value(transactions: &[TransactionDao], threshold: &BigUint) -> Vec<TransactionDao> {
    transactions
        .iter()
        .filter(|tx| tx.value_big() > *threshold)
        .cloned()
        .collect()
}

pub fn find_repeated_values(transactions: &[TransactionDao], min_count: usize) -> Vec<RepeatedValue> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<RepeatedValue> = Vec::new();
    for tx in transactions {
        let value = tx.value.as_deref().unwrap_or("0");
        if value == "0" {
            continue;
        }
        let slot = *index.entry(value).or_insert_with(|| {
            groups.push(RepeatedValue {
                value: value.to_string(),
                count: 0,
                transactions: vec![],
            });
            groups.len() - 1
        });
        groups[slot].count += 1;
        groups[slot].transactions.push(tx.clone());
    }
    groups.retain(|group| group.count >= min_count);
    groups
}

/// Run every scan over one address's ordered history.
pub fn scan_transactions(
    address: &str,
    transactions: &[TransactionDao],
    thresholds: &PatternThresholds,
) -> QueryOutcome<PatternResult> {
    if transactions.is_empty() {
        return QueryOutcome::NoData;
    }
    QueryOutcome::Found(PatternResult {
        address: address.to_string(),
        transaction_count: transactions.len(),
        rapid_transfers: find_rapid_transfers(transactions, thresholds.rapid_transfer_window),
        high_value_transactions: find_high_value(transactions, &thresholds.high_value_threshold),
        contract_interactions: transactions
            .iter()
            .filter(|tx| tx.is_contract_interaction())
            .cloned()
            .collect(),
        failed_transactions: transactions
            .iter()
            .filter(|tx| tx.is_failed())
            .cloned()
            .collect(),
        repeated_values: find_repeated_values(transactions, thresholds.repeated_value_min_count),
    })
}

pub async fn detect_patterns(
    repo: &dyn TransactionRepository,
    address: &str,
    range: &DateRange,
    thresholds: &PatternThresholds,
) -> Result<QueryOutcome<PatternResult>, ForensicError> {
    if address.trim().is_empty() {
        return Err(ForensicError::InvalidInput("Address is required".to_string()));
    }
    let transactions = repo.query_address_transactions(address, range).await?;
    let outcome = scan_transactions(address, &transactions, thresholds);
    match &outcome {
        QueryOutcome::NoData => log::info!("No transactions found for {}", address),
        QueryOutcome::Found(result) => log::info!(
            "Patterns for {}: {} rapid, {} high-value, {} contract, {} failed, {} repeated-value",
            address,
            result.rapid_transfers.len(),
            result.high_value_transactions.len(),
            result.contract_interactions.len(),
            result.failed_transactions.len(),
            result.repeated_values.len()
        ),
    }
    Ok(outcome)
}
