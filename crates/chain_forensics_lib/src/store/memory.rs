use async_trait::async_trait;

use super::{AttributionStore, TransactionRepository};
use crate::db::model::{Attribution, ClusterMembership, TransactionDao};
use crate::error::ForensicError;
use crate::model::DateRange;

/// In-process store with the same ordering contract as the sqlite one.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    transactions: Vec<TransactionDao>,
    attributions: Vec<Attribution>,
    clusters: Vec<ClusterMembership>,
    unavailable: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same hash replaces the stored row.
    pub fn upsert_transaction(&mut self, tx: TransactionDao) {
        if let Some(existing) = self
            .transactions
            .iter_mut()
            .find(|t| t.tx_hash == tx.tx_hash)
        {
            let id = existing.id;
            *existing = TransactionDao { id, ..tx };
        } else {
            let id = self.transactions.len() as i64 + 1;
            self.transactions.push(TransactionDao { id, ..tx });
        }
    }

    /// Same (address, chain type, label) replaces the stored attribution.
    pub fn upsert_attribution(&mut self, attribution: Attribution) {
        self.attributions.retain(|a| {
            !(a.address == attribution.address
                && a.chain_type == attribution.chain_type
                && a.label == attribution.label)
        });
        self.attributions.push(attribution);
    }

    pub fn add_cluster_member(&mut self, member: ClusterMembership) {
        self.clusters.push(member);
    }

    /// Makes every query fail, for exercising error propagation.
    pub fn set_unavailable(&mut self, reason: Option<&str>) {
        self.unavailable = reason.map(|r| r.to_string());
    }

    fn check_available(&self) -> Result<(), ForensicError> {
        match &self.unavailable {
            Some(reason) => Err(ForensicError::RepositoryUnavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn ordered(&self, filter: impl Fn(&TransactionDao) -> bool) -> Vec<TransactionDao> {
        let mut rows: Vec<TransactionDao> = self
            .transactions
            .iter()
            .filter(|tx| filter(tx))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (a.timestamp.is_none(), a.timestamp, a.id).cmp(&(b.timestamp.is_none(), b.timestamp, b.id))
        });
        rows
    }
}

#[async_trait]
impl TransactionRepository for MemoryStore {
    async fn query_timeline(
        &self,
        addresses: &[String],
        range: &DateRange,
    ) -> Result<Vec<TransactionDao>, ForensicError> {
        self.check_available()?;
        Ok(self.ordered(|tx| {
            addresses.iter().any(|a| tx.touches(a)) && range.contains(tx.timestamp)
        }))
    }

    async fn query_direct_flow(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Vec<TransactionDao>, ForensicError> {
        self.check_available()?;
        Ok(self.ordered(|tx| tx.from_address == from && tx.to_address.as_deref() == Some(to)))
    }

    async fn query_address_transactions(
        &self,
        address: &str,
        range: &DateRange,
    ) -> Result<Vec<TransactionDao>, ForensicError> {
        self.check_available()?;
        Ok(self.ordered(|tx| tx.touches(address) && range.contains(tx.timestamp)))
    }
}

#[async_trait]
impl AttributionStore for MemoryStore {
    async fn lookup_attributions(&self, address: &str) -> Result<Vec<Attribution>, ForensicError> {
        self.check_available()?;
        let mut rows: Vec<Attribution> = self
            .attributions
            .iter()
            .filter(|a| a.address == address)
            .cloned()
            .collect();
        // newest first, later insertions win ties
        rows.reverse();
        rows.sort_by(|a, b| b.date_added.cmp(&a.date_added));
        Ok(rows)
    }

    async fn lookup_cluster_membership(
        &self,
        address: &str,
    ) -> Result<Vec<ClusterMembership>, ForensicError> {
        self.check_available()?;
        let mut rows: Vec<ClusterMembership> = self
            .clusters
            .iter()
            .filter(|c| c.address.eq_ignore_ascii_case(address))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.cluster_name.cmp(&b.cluster_name));
        Ok(rows)
    }
}
