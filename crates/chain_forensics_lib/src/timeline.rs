use chrono::{DateTime, NaiveDate, Utc};
use num_bigint::BigUint;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::db::model::TransactionDao;
use crate::error::ForensicError;
use crate::model::{DateRange, QueryOutcome};
use crate::store::{AttributionStore, TransactionRepository};
use crate::utils::big_dec;

/// Calendar day of a transaction. Undated transactions sort after every day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DateBucket {
    Day(NaiveDate),
    Unknown,
}

impl DateBucket {
    pub fn of(timestamp: Option<DateTime<Utc>>) -> Self {
        match timestamp {
            Some(ts) => DateBucket::Day(ts.naive_utc().date()),
            None => DateBucket::Unknown,
        }
    }
}

impl fmt::Display for DateBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateBucket::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            DateBucket::Unknown => f.write_str("unknown"),
        }
    }
}

impl Serialize for DateBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimelineDay {
    pub date: DateBucket,
    pub transactions: Vec<TransactionDao>,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddressStats {
    pub sent: usize,
    pub received: usize,
    #[serde(serialize_with = "big_dec::serialize")]
    pub total_value_sent: BigUint,
    pub flagged: bool,
    pub labels: Vec<String>,
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObservedRange {
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

impl ObservedRange {
    pub fn of<'a>(transactions: impl IntoIterator<Item = &'a TransactionDao>) -> Self {
        let mut range = ObservedRange::default();
        for ts in transactions.into_iter().filter_map(|tx| tx.timestamp) {
            range.earliest = Some(range.earliest.map_or(ts, |e| e.min(ts)));
            range.latest = Some(range.latest.map_or(ts, |l| l.max(ts)));
        }
        range
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimelineResult {
    pub days: Vec<TimelineDay>,
    pub address_stats: BTreeMap<String, AddressStats>,
    pub total_transactions: usize,
    pub date_range: ObservedRange,
}

impl TimelineResult {
    /// All transactions in chronological order, undated ones last.
    pub fn transactions(&self) -> impl Iterator<Item = &TransactionDao> {
        self.days.iter().flat_map(|day| day.transactions.iter())
    }

    /// Mark every address that has at least one attribution label.
    pub fn apply_labels(&mut self, labels: &HashMap<String, Vec<String>>) {
        for (address, stats) in self.address_stats.iter_mut() {
            let found = labels.get(address).cloned().unwrap_or_default();
            stats.flagged = !found.is_empty();
            stats.labels = found;
        }
    }
}

/// Group an already fetched transaction set into day buckets and per-address
/// counters. Pure; the same input always yields the same output.
pub fn group_timeline(mut transactions: Vec<TransactionDao>) -> QueryOutcome<TimelineResult> {
    if transactions.is_empty() {
        return QueryOutcome::NoData;
    }
    transactions.sort_by_key(|tx| (tx.timestamp.is_none(), tx.timestamp));

    let total_transactions = transactions.len();
    let date_range = ObservedRange::of(&transactions);
    let mut by_date: BTreeMap<DateBucket, Vec<TransactionDao>> = BTreeMap::new();
    let mut address_stats: BTreeMap<String, AddressStats> = BTreeMap::new();

    for tx in transactions {
        let from_stats = address_stats.entry(tx.from_address.clone()).or_default();
        from_stats.sent += 1;
        from_stats.total_value_sent += tx.value_big();
        if let Some(to) = &tx.to_address {
            address_stats.entry(to.clone()).or_default().received += 1;
        }
        by_date.entry(DateBucket::of(tx.timestamp)).or_default().push(tx);
    }

    QueryOutcome::Found(TimelineResult {
        days: by_date
            .into_iter()
            .map(|(date, transactions)| TimelineDay { date, transactions })
            .collect(),
        address_stats,
        total_transactions,
        date_range,
    })
}

/// Chronological activity of `addresses`, with each participating address
/// marked flagged when the attribution store knows it.
pub async fn build_timeline(
    repo: &dyn TransactionRepository,
    attributions: &dyn AttributionStore,
    addresses: &[String],
    range: &DateRange,
) -> Result<QueryOutcome<TimelineResult>, ForensicError> {
    if addresses.is_empty() {
        return Err(ForensicError::InvalidInput(
            "At least one address is required".to_string(),
        ));
    }
    log::debug!(
        "Building timeline for {} address(es), range {:?}",
        addresses.len(),
        range
    );
    let transactions = repo.query_timeline(addresses, range).await?;
    let mut outcome = group_timeline(transactions);

    if let QueryOutcome::Found(result) = &mut outcome {
        let mut labels = HashMap::new();
        for address in result.address_stats.keys() {
            let found = attributions.lookup_attributions(address).await?;
            labels.insert(
                address.clone(),
                found.into_iter().map(|a| a.label).collect::<Vec<_>>(),
            );
        }
        result.apply_labels(&labels);
        log::info!(
            "Timeline: {} transaction(s) over {} day bucket(s)",
            result.total_transactions,
            result.days.len()
        );
    } else {
        log::info!("Timeline: no transactions for the requested addresses and range");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::model::RiskLevel;
    use crate::test_utils::*;

    fn sample() -> Vec<TransactionDao> {
        vec![
            tx("0xA", "0x1", Some("0x2"), "10", Some("2024-01-01T10:00:00Z")),
            tx("0xB", "0x2", Some("0x3"), "not-a-number", Some("2024-01-01T23:59:59Z")),
            tx("0xC", "0x1", None, "5", Some("2024-01-03T00:00:00Z")),
            tx("0xD", "0x1", Some("0x3"), "7", None),
        ]
    }

    #[test]
    fn test_grouping_is_idempotent() {
        let first = group_timeline(sample());
        let second = group_timeline(sample());
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_every_transaction_in_exactly_its_bucket() {
        let result = group_timeline(sample()).found().unwrap();
        let mut seen = 0;
        for day in &result.days {
            for tx in &day.transactions {
                assert_eq!(day.date, DateBucket::of(tx.timestamp));
                seen += 1;
            }
        }
        assert_eq!(seen, 4);
        let keys: Vec<String> = result.days.iter().map(|d| d.date.to_string()).collect();
        assert_eq!(keys, vec!["2024-01-01", "2024-01-03", "unknown"]);
    }

    #[test]
    fn test_address_stats() {
        let result = group_timeline(sample()).found().unwrap();
        let one = &result.address_stats["0x1"];
        assert_eq!(one.sent, 3);
        assert_eq!(one.received, 0);
        assert_eq!(one.total_value_sent, BigUint::from(22u32));
        let two = &result.address_stats["0x2"];
        assert_eq!((two.sent, two.received), (1, 1));
        assert_eq!(two.total_value_sent, BigUint::default());
        assert_eq!(result.address_stats["0x3"].received, 2);
        assert_eq!(result.date_range.earliest, Some(ts("2024-01-01T10:00:00Z")));
        assert_eq!(result.date_range.latest, Some(ts("2024-01-03T00:00:00Z")));
    }

    #[test]
    fn test_empty_is_distinct_from_zero_counts() {
        assert!(group_timeline(vec![]).is_empty());
        let zero_value = group_timeline(vec![tx("0xA", "0x1", Some("0x2"), "0", None)]);
        let result = zero_value.found().unwrap();
        assert_eq!(result.total_transactions, 1);
        assert_eq!(result.date_range, ObservedRange::default());
    }

    #[tokio::test]
    async fn test_build_timeline_marks_flagged_addresses() {
        let mut store = MemoryStore::new();
        for t in sample() {
            store.upsert_transaction(t);
        }
        store.upsert_attribution(attribution("0x3", "Exploiter", RiskLevel::High));

        let outcome = build_timeline(&store, &store, &["0x1".to_string()], &DateRange::default())
            .await
            .unwrap();
        let result = outcome.found().unwrap();
        assert_eq!(result.total_transactions, 3);
        assert!(result.address_stats["0x3"].flagged);
        assert_eq!(result.address_stats["0x3"].labels, vec!["Exploiter"]);
        assert!(!result.address_stats["0x1"].flagged);
    }

    #[tokio::test]
    async fn test_build_timeline_requires_addresses() {
        let store = MemoryStore::new();
        let err = build_timeline(&store, &store, &[], &DateRange::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }
}
