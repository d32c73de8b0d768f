//! Collaborator seams of the analysis engine.
//!
//! Every analysis operation receives its transaction repository and
//! attribution store explicitly. Both traits return complete, ordered result
//! sets; the engine never retries a failed call.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::db::model::{Attribution, ClusterMembership, TransactionDao};
use crate::error::ForensicError;
use crate::model::DateRange;

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Transactions touching any of `addresses`, ascending by timestamp, nulls last.
    async fn query_timeline(
        &self,
        addresses: &[String],
        range: &DateRange,
    ) -> Result<Vec<TransactionDao>, ForensicError>;

    /// Transactions sent from `from` to `to`, ascending by timestamp.
    async fn query_direct_flow(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Vec<TransactionDao>, ForensicError>;

    async fn query_address_transactions(
        &self,
        address: &str,
        range: &DateRange,
    ) -> Result<Vec<TransactionDao>, ForensicError>;
}

#[async_trait]
pub trait AttributionStore: Send + Sync {
    /// Deterministic order: newest first.
    async fn lookup_attributions(&self, address: &str) -> Result<Vec<Attribution>, ForensicError>;

    async fn lookup_cluster_membership(
        &self,
        address: &str,
    ) -> Result<Vec<ClusterMembership>, ForensicError>;
}
