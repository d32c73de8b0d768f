use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::db::model::{Attribution, TransactionDao};
use crate::error::ForensicError;
use crate::model::{DateRange, QueryOutcome};
use crate::store::{AttributionStore, TransactionRepository};
use crate::timeline::{group_timeline, ObservedRange, TimelineResult};

pub const DEFAULT_REPORT_TITLE: &str = "Blockchain Forensic Investigation Report";
pub const DEFAULT_INVESTIGATOR: &str = "Automated System";

/// Caller-supplied report header; unset fields fall back to defaults.
#[derive(Debug, Clone, Default)]
pub struct ReportRequest {
    pub case_id: Option<String>,
    pub title: Option<String>,
    pub investigator: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub case_id: String,
    pub title: String,
    pub investigator: String,
    pub generated_at: DateTime<Utc>,
    pub addresses: Vec<String>,
    pub date_range: DateRange,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedInteraction {
    pub tx_hash: String,
    pub chain_name: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub from: String,
    pub to: Option<String>,
    pub value: Option<String>,
    pub from_labels: Vec<String>,
    pub to_labels: Vec<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatistics {
    pub total_transactions: usize,
    pub chains: Vec<String>,
    pub address_count: usize,
    pub flagged_addresses: usize,
    pub date_range: ObservedRange,
}

/// Format-agnostic report; exporters read it without going back to the stores.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForensicReport {
    pub metadata: ReportMetadata,
    /// Attributions of the investigated addresses that have any.
    pub address_attributions: BTreeMap<String, Vec<Attribution>>,
    pub timeline: QueryOutcome<TimelineResult>,
    pub flagged_interactions: Vec<FlaggedInteraction>,
    pub statistics: ReportStatistics,
}

impl ForensicReport {
    pub fn transactions(&self) -> Vec<&TransactionDao> {
        match &self.timeline {
            QueryOutcome::Found(timeline) => timeline.transactions().collect(),
            QueryOutcome::NoData => vec![],
        }
    }
}

/// Attribution lookups for one report run. Never shared between runs.
struct AttributionCache<'a> {
    store: &'a dyn AttributionStore,
    entries: HashMap<String, Vec<Attribution>>,
}

impl<'a> AttributionCache<'a> {
    fn new(store: &'a dyn AttributionStore) -> Self {
        AttributionCache {
            store,
            entries: HashMap::new(),
        }
    }

    async fn get(&mut self, address: &str) -> Result<&[Attribution], ForensicError> {
        if !self.entries.contains_key(address) {
            let found = self.store.lookup_attributions(address).await?;
            self.entries.insert(address.to_string(), found);
        }
        Ok(self
            .entries
            .get(address)
            .map(|v| v.as_slice())
            .unwrap_or_default())
    }

    async fn labels(&mut self, address: &str) -> Result<Vec<String>, ForensicError> {
        Ok(self
            .get(address)
            .await?
            .iter()
            .map(|a| a.label.clone())
            .collect())
    }
}

pub async fn compose_report(
    repo: &dyn TransactionRepository,
    attributions: &dyn AttributionStore,
    addresses: &[String],
    range: &DateRange,
    request: ReportRequest,
) -> Result<ForensicReport, ForensicError> {
    let mut unique: Vec<String> = Vec::with_capacity(addresses.len());
    for address in addresses {
        if !unique.contains(address) {
            unique.push(address.clone());
        }
    }
    if unique.is_empty() {
        return Err(ForensicError::InvalidInput(
            "At least one address is required".to_string(),
        ));
    }

    let generated_at = Utc::now();
    let metadata = ReportMetadata {
        case_id: request
            .case_id
            .unwrap_or_else(|| format!("CASE-{}", generated_at.timestamp_millis())),
        title: request
            .title
            .unwrap_or_else(|| DEFAULT_REPORT_TITLE.to_string()),
        investigator: request
            .investigator
            .unwrap_or_else(|| DEFAULT_INVESTIGATOR.to_string()),
        generated_at,
        addresses: unique.clone(),
        date_range: *range,
    };
    log::info!(
        "Composing report {} for {} address(es)",
        metadata.case_id,
        unique.len()
    );

    let mut cache = AttributionCache::new(attributions);
    let mut address_attributions = BTreeMap::new();
    for address in &unique {
        let found = cache.get(address).await?;
        if !found.is_empty() {
            address_attributions.insert(address.clone(), found.to_vec());
        }
    }

    let transactions = repo.query_timeline(&unique, range).await?;
    let mut timeline = group_timeline(transactions);

    let mut flagged_interactions = Vec::new();
    let mut chains = BTreeSet::new();
    let mut total_transactions = 0;
    let mut date_range = ObservedRange::default();

    if let QueryOutcome::Found(result) = &mut timeline {
        let mut labels = HashMap::new();
        // Counterparties are looked up too, so a transfer to any labelled
        // address is flagged, not only one touching an investigated address.
        for tx in result.transactions() {
            chains.insert(tx.chain_name.clone());
            let from_labels = cache.labels(&tx.from_address).await?;
            let to_labels = match &tx.to_address {
                Some(to) => cache.labels(to).await?,
                None => vec![],
            };
            if !from_labels.is_empty() || !to_labels.is_empty() {
                flagged_interactions.push(FlaggedInteraction {
                    tx_hash: tx.tx_hash.clone(),
                    chain_name: tx.chain_name.clone(),
                    timestamp: tx.timestamp,
                    from: tx.from_address.clone(),
                    to: tx.to_address.clone(),
                    value: tx.value.clone(),
                    from_labels: from_labels.clone(),
                    to_labels: to_labels.clone(),
                });
            }
            labels.insert(tx.from_address.clone(), from_labels);
            if let Some(to) = &tx.to_address {
                labels.insert(to.clone(), to_labels);
            }
        }
        result.apply_labels(&labels);
        total_transactions = result.total_transactions;
        date_range = result.date_range;
    }

    let statistics = ReportStatistics {
        total_transactions,
        chains: chains.into_iter().collect(),
        address_count: unique.len(),
        flagged_addresses: address_attributions.len(),
        date_range,
    };
    log::info!(
        "Report {}: {} transaction(s), {} flagged interaction(s), {} flagged address(es)",
        metadata.case_id,
        statistics.total_transactions,
        flagged_interactions.len(),
        statistics.flagged_addresses
    );

    Ok(ForensicReport {
        metadata,
        address_attributions,
        timeline,
        flagged_interactions,
        statistics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RiskLevel;
    use crate::store::MemoryStore;
    use crate::test_utils::*;

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.upsert_transaction(tx("0xA", "0x1", Some("0x2"), "10", Some("2024-01-01T10:00:00Z")));
        store.upsert_transaction(tx("0xB", "0x2", Some("0x3"), "20", Some("2024-01-02T10:00:00Z")));
        let mut solana = tx("0xC", "0x3", Some("0x1"), "30", None);
        solana.chain_name = "solana".to_string();
        store.upsert_transaction(solana);
        store.upsert_transaction(tx("0xD", "0x4", Some("0x5"), "40", Some("2024-01-03T10:00:00Z")));
        store.upsert_attribution(attribution("0x1", "Victim wallet", RiskLevel::Low));
        store.upsert_attribution(attribution("0x3", "Drainer", RiskLevel::Critical));
        store
    }

    #[tokio::test]
    async fn test_compose_report() {
        let store = store();
        let request = ReportRequest {
            case_id: Some("CASE-1".to_string()),
            ..Default::default()
        };
        let report = compose_report(
            &store,
            &store,
            &["0x1".to_string(), "0x2".to_string(), "0x1".to_string()],
            &DateRange::default(),
            request,
        )
        .await
        .unwrap();

        assert_eq!(report.metadata.case_id, "CASE-1");
        assert_eq!(report.metadata.title, DEFAULT_REPORT_TITLE);
        assert_eq!(report.statistics.address_count, 2);
        assert_eq!(report.statistics.total_transactions, 3);
        assert_eq!(report.statistics.chains, vec!["ethereum", "solana"]);
        assert_eq!(report.statistics.flagged_addresses, 1);
        assert!(report.address_attributions.contains_key("0x1"));
        assert_eq!(
            report.statistics.date_range.earliest,
            Some(ts("2024-01-01T10:00:00Z"))
        );
        assert_eq!(
            report.statistics.date_range.latest,
            Some(ts("2024-01-02T10:00:00Z"))
        );

        let hashes: Vec<&str> = report
            .flagged_interactions
            .iter()
            .map(|i| i.tx_hash.as_str())
            .collect();
        assert_eq!(hashes, vec!["0xA", "0xB", "0xC"]);
        assert_eq!(report.flagged_interactions[1].to_labels, vec!["Drainer"]);
        assert!(report.flagged_interactions[1].from_labels.is_empty());

        let timeline = report.timeline.as_found().unwrap();
        assert!(timeline.address_stats["0x3"].flagged);
        assert!(!timeline.address_stats["0x2"].flagged);
    }

    #[tokio::test]
    async fn test_report_without_transactions() {
        let store = MemoryStore::new();
        let report = compose_report(
            &store,
            &store,
            &["0x7".to_string()],
            &DateRange::default(),
            ReportRequest::default(),
        )
        .await
        .unwrap();
        assert!(report.timeline.is_empty());
        assert_eq!(report.statistics.total_transactions, 0);
        assert!(report.statistics.chains.is_empty());
        assert!(report.metadata.case_id.starts_with("CASE-"));
        assert!(report.transactions().is_empty());
    }
}
