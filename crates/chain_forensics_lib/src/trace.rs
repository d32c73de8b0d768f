use num_bigint::BigUint;
use serde::Serialize;

use crate::db::model::TransactionDao;
use crate::error::ForensicError;
use crate::store::TransactionRepository;
use crate::utils::big_dec;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum HopEvidence {
    #[serde(rename_all = "camelCase")]
    Evidence {
        transaction_count: usize,
        #[serde(serialize_with = "big_dec::serialize")]
        total_value: BigUint,
        transactions: Vec<TransactionDao>,
    },
    /// No direct transfer between the pair; reported, never dropped.
    NoEvidence,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FlowHop {
    pub index: usize,
    pub from: String,
    pub to: String,
    pub evidence: HopEvidence,
}

impl FlowHop {
    pub fn has_evidence(&self) -> bool {
        matches!(self.evidence, HopEvidence::Evidence { .. })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FlowTraceResult {
    pub path: Vec<String>,
    /// One entry per consecutive pair, in path order.
    pub hops: Vec<FlowHop>,
}

impl FlowTraceResult {
    pub fn missing_hops(&self) -> impl Iterator<Item = &FlowHop> {
        self.hops.iter().filter(|hop| !hop.has_evidence())
    }

    pub fn is_complete(&self) -> bool {
        self.hops.iter().all(FlowHop::has_evidence)
    }
}

pub fn aggregate_hop(index: usize, from: &str, to: &str, transactions: Vec<TransactionDao>) -> FlowHop {
    let evidence = if transactions.is_empty() {
        HopEvidence::NoEvidence
    } else {
        let total_value = transactions
            .iter()
            .fold(BigUint::default(), |acc, tx| acc + tx.value_big());
        HopEvidence::Evidence {
            transaction_count: transactions.len(),
            total_value,
            transactions,
        }
    };
    FlowHop {
        index,
        from: from.to_string(),
        to: to.to_string(),
        evidence,
    }
}

/// Check each consecutive pair of a hypothesised path for direct transfers.
pub async fn trace_fund_flow(
    repo: &dyn TransactionRepository,
    path: &[String],
) -> Result<FlowTraceResult, ForensicError> {
    if path.len() < 2 {
        return Err(ForensicError::InvalidInput(format!(
            "Fund flow path needs at least 2 addresses, got {}",
            path.len()
        )));
    }
    log::debug!("Tracing fund flow through {} addresses", path.len());

    let mut hops = Vec::with_capacity(path.len() - 1);
    for (index, pair) in path.windows(2).enumerate() {
        let (from, to) = (&pair[0], &pair[1]);
        let transactions = repo.query_direct_flow(from, to).await?;
        let hop = aggregate_hop(index, from, to, transactions);
        if !hop.has_evidence() {
            log::info!("No direct flow found for hop {}: {} -> {}", index + 1, from, to);
        }
        hops.push(hop);
    }

    let result = FlowTraceResult {
        path: path.to_vec(),
        hops,
    };
    log::info!(
        "Traced {} hop(s), {} without evidence",
        result.hops.len(),
        result.missing_hops().count()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::MemoryStore;
    use crate::test_utils::*;

    fn path(addresses: &[&str]) -> Vec<String> {
        addresses.iter().map(|a| a.to_string()).collect()
    }

    #[tokio::test]
    async fn test_single_address_path_is_invalid() {
        let store = MemoryStore::new();
        let err = trace_fund_flow(&store, &path(&["0xA"])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = trace_fund_flow(&store, &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_hop_count_is_path_len_minus_one() {
        let store = MemoryStore::new();
        for n in 2..6 {
            let addresses: Vec<String> = (0..n).map(|i| format!("0x{}", i)).collect();
            let result = trace_fund_flow(&store, &addresses).await.unwrap();
            assert_eq!(result.hops.len(), n - 1);
            assert_eq!(result.missing_hops().count(), n - 1);
        }
    }

    #[tokio::test]
    async fn test_missing_hop_is_reported_in_place() {
        let mut store = MemoryStore::new();
        store.upsert_transaction(tx("0x01", "0xA", Some("0xB"), "100", Some("2024-01-01T10:00:00Z")));
        store.upsert_transaction(tx("0x02", "0xA", Some("0xB"), "oops", Some("2024-01-01T11:00:00Z")));
        store.upsert_transaction(tx("0x03", "0xA", Some("0xB"), "23", Some("2024-01-01T09:00:00Z")));
        // reverse direction must not count
        store.upsert_transaction(tx("0x04", "0xC", Some("0xB"), "1", Some("2024-01-01T12:00:00Z")));

        let result = trace_fund_flow(&store, &path(&["0xA", "0xB", "0xC"])).await.unwrap();
        assert_eq!(result.hops.len(), 2);
        assert!(!result.is_complete());

        let first = &result.hops[0];
        assert_eq!((first.from.as_str(), first.to.as_str()), ("0xA", "0xB"));
        match &first.evidence {
            HopEvidence::Evidence {
                transaction_count,
                total_value,
                transactions,
            } => {
                assert_eq!(*transaction_count, 3);
                assert_eq!(*total_value, BigUint::from(123u32));
                assert_eq!(transactions[0].tx_hash, "0x03");
            }
            HopEvidence::NoEvidence => panic!("expected evidence for first hop"),
        }
        assert_eq!(result.hops[1].index, 1);
        assert_eq!(result.hops[1].evidence, HopEvidence::NoEvidence);
    }

    #[tokio::test]
    async fn test_self_loop_hop() {
        let mut store = MemoryStore::new();
        store.upsert_transaction(tx("0x01", "0xA", Some("0xA"), "5", Some("2024-01-01T10:00:00Z")));
        let result = trace_fund_flow(&store, &path(&["0xA", "0xA"])).await.unwrap();
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn test_repository_failure_propagates() {
        let mut store = MemoryStore::new();
        store.set_unavailable(Some("connection refused"));
        let err = trace_fund_flow(&store, &path(&["0xA", "0xB"])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RepositoryUnavailable);
    }

    #[test]
    fn test_no_evidence_serialization() {
        let hop = aggregate_hop(0, "0xA", "0xB", vec![]);
        let json = serde_json::to_value(&hop).unwrap();
        assert_eq!(json["evidence"]["status"], "noEvidence");
    }
}
