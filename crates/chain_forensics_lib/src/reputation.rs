use serde::Serialize;

use crate::db::model::{Attribution, ClusterMembership};
use crate::error::ForensicError;
use crate::model::RiskLevel;
use crate::store::AttributionStore;

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReputationResult {
    pub address: String,
    pub flagged: bool,
    pub risk_level: RiskLevel,
    pub attributions: Vec<Attribution>,
    /// Every attribution sitting at `risk_level`; ties are all kept.
    pub highest_risk_attributions: Vec<Attribution>,
    pub clusters: Vec<ClusterMembership>,
}

/// Combine attributions and cluster memberships into one verdict.
///
/// Cluster membership alone never raises the risk level: an address without
/// attributions is reported clean at `info` whatever clusters it sits in.
pub fn aggregate_reputation(
    address: &str,
    attributions: Vec<Attribution>,
    clusters: Vec<ClusterMembership>,
) -> ReputationResult {
    let risk_level = attributions
        .iter()
        .map(|a| a.risk_level)
        .max()
        .unwrap_or(RiskLevel::Info);
    let highest_risk_attributions = attributions
        .iter()
        .filter(|a| a.risk_level == risk_level)
        .cloned()
        .collect();
    ReputationResult {
        address: address.to_string(),
        flagged: !attributions.is_empty(),
        risk_level,
        highest_risk_attributions,
        attributions,
        clusters,
    }
}

pub async fn compute_reputation(
    store: &dyn AttributionStore,
    address: &str,
) -> Result<ReputationResult, ForensicError> {
    if address.trim().is_empty() {
        return Err(ForensicError::InvalidInput("Address is required".to_string()));
    }
    let attributions = store.lookup_attributions(address).await?;
    let clusters = store.lookup_cluster_membership(address).await?;
    if attributions.is_empty() && !clusters.is_empty() {
        log::info!(
            "{} has no attributions but belongs to {} cluster(s); reported clean",
            address,
            clusters.len()
        );
    }
    let result = aggregate_reputation(address, attributions, clusters);
    log::debug!(
        "Reputation of {}: flagged={} risk={}",
        address,
        result.flagged,
        result.risk_level
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_highest_risk_wins_and_nothing_is_dropped() {
        let mut store = MemoryStore::new();
        store.upsert_attribution(attribution("0x1", "Phisher", RiskLevel::Low));
        store.upsert_attribution(attribution("0x1", "Lazarus", RiskLevel::Critical));
        store.upsert_attribution(attribution("0x1", "Mixer user", RiskLevel::Medium));

        let result = compute_reputation(&store, "0x1").await.unwrap();
        assert!(result.flagged);
        assert_eq!(result.risk_level, RiskLevel::Critical);
        assert_eq!(result.attributions.len(), 3);
        assert_eq!(result.highest_risk_attributions.len(), 1);
        assert_eq!(result.highest_risk_attributions[0].label, "Lazarus");
    }

    #[tokio::test]
    async fn test_ties_at_maximum_are_retained() {
        let mut store = MemoryStore::new();
        store.upsert_attribution(attribution("0x1", "Hack A", RiskLevel::High));
        store.upsert_attribution(attribution("0x1", "Hack B", RiskLevel::High));
        store.upsert_attribution(attribution("0x1", "Note", RiskLevel::Info));

        let result = compute_reputation(&store, "0x1").await.unwrap();
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.highest_risk_attributions.len(), 2);
    }

    #[tokio::test]
    async fn test_clean_address_is_stable() {
        let store = MemoryStore::new();
        let first = compute_reputation(&store, "0x9").await.unwrap();
        let second = compute_reputation(&store, "0x9").await.unwrap();
        assert!(!first.flagged);
        assert_eq!(first.risk_level, RiskLevel::Info);
        assert!(first.attributions.is_empty());
        assert!(first.clusters.is_empty());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cluster_membership_alone_stays_clean() {
        let mut store = MemoryStore::new();
        store.add_cluster_member(cluster_member("Attacker wallets", "0x9", 0.99));

        let result = compute_reputation(&store, "0x9").await.unwrap();
        assert!(!result.flagged);
        assert_eq!(result.risk_level, RiskLevel::Info);
        assert_eq!(result.clusters.len(), 1);
    }
}
