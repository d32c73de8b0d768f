use async_trait::async_trait;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{AttributionStore, TransactionRepository};
use crate::db::model::{Attribution, ClusterMembership, TransactionDao};
use crate::db::ops::*;
use crate::err_from;
use crate::error::ForensicError;
use crate::model::DateRange;

/// Repository and attribution store backed by one shared sqlite connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<SqliteConnection>>,
}

impl SqliteStore {
    pub fn new(conn: SqliteConnection) -> Self {
        SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn from_shared(conn: Arc<Mutex<SqliteConnection>>) -> Self {
        SqliteStore { conn }
    }

    pub fn connection(&self) -> Arc<Mutex<SqliteConnection>> {
        self.conn.clone()
    }
}

#[async_trait]
impl TransactionRepository for SqliteStore {
    async fn query_timeline(
        &self,
        addresses: &[String],
        range: &DateRange,
    ) -> Result<Vec<TransactionDao>, ForensicError> {
        let mut db_conn = self.conn.lock().await;
        get_forensic_timeline(&mut db_conn, addresses, range)
            .await
            .map_err(err_from!())
    }

    async fn query_direct_flow(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Vec<TransactionDao>, ForensicError> {
        let mut db_conn = self.conn.lock().await;
        get_transaction_flow(&mut db_conn, from, to)
            .await
            .map_err(err_from!())
    }

    async fn query_address_transactions(
        &self,
        address: &str,
        range: &DateRange,
    ) -> Result<Vec<TransactionDao>, ForensicError> {
        let mut db_conn = self.conn.lock().await;
        get_address_transactions(&mut db_conn, address, range)
            .await
            .map_err(err_from!())
    }
}

#[async_trait]
impl AttributionStore for SqliteStore {
    async fn lookup_attributions(&self, address: &str) -> Result<Vec<Attribution>, ForensicError> {
        let mut db_conn = self.conn.lock().await;
        let rows = get_address_attributions(&mut db_conn, address)
            .await
            .map_err(err_from!())?;
        Ok(rows.into_iter().map(Attribution::from).collect())
    }

    async fn lookup_cluster_membership(
        &self,
        address: &str,
    ) -> Result<Vec<ClusterMembership>, ForensicError> {
        let mut db_conn = self.conn.lock().await;
        let rows = get_address_clusters(&mut db_conn, address)
            .await
            .map_err(err_from!())?;
        Ok(rows.into_iter().map(ClusterMembership::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_sqlite_connection;
    use crate::db::model::AttributionDao;
    use crate::model::RiskLevel;
    use crate::test_utils::*;

    async fn store_with(txs: &[TransactionDao]) -> SqliteStore {
        let mut conn = create_sqlite_connection(None, true).await.unwrap();
        upsert_transactions(&mut conn, txs).await.unwrap();
        SqliteStore::new(conn)
    }

    #[tokio::test]
    async fn test_ordering_matches_memory_store() {
        let store = store_with(&[
            tx("0xA", "0x1", Some("0x2"), "1", None),
            tx("0xB", "0x1", Some("0x2"), "1", Some("2024-01-02T00:00:00Z")),
            tx("0xC", "0x2", Some("0x3"), "1", Some("2024-01-01T00:00:00Z")),
        ])
        .await;
        let rows = store
            .query_timeline(&["0x2".to_string()], &DateRange::default())
            .await
            .unwrap();
        let hashes: Vec<&str> = rows.iter().map(|t| t.tx_hash.as_str()).collect();
        assert_eq!(hashes, vec!["0xC", "0xB", "0xA"]);

        let flow = store.query_direct_flow("0x1", "0x2").await.unwrap();
        assert_eq!(flow.len(), 2);
        assert_eq!(flow[0].tx_hash, "0xB");
    }

    #[tokio::test]
    async fn test_date_range_excludes_undated_rows() {
        let store = store_with(&[
            tx("0xA", "0x1", Some("0x2"), "1", None),
            tx("0xB", "0x1", Some("0x2"), "1", Some("2024-01-02T12:00:00Z")),
            tx("0xC", "0x1", Some("0x2"), "1", Some("2024-01-03T00:00:00Z")),
        ])
        .await;
        let range = DateRange::parse(Some("2024-01-01"), Some("2024-01-02")).unwrap();
        let rows = store.query_address_transactions("0x1", &range).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tx_hash, "0xB");
    }

    #[tokio::test]
    async fn test_attribution_lookup_converts_rows() {
        let store = store_with(&[]).await;
        {
            let conn = store.connection();
            let mut db_conn = conn.lock().await;
            let dao = AttributionDao {
                id: 0,
                address: "0x1".to_string(),
                chain_type: "evm".to_string(),
                label: "Exploiter".to_string(),
                category: Some("exploit".to_string()),
                risk_level: Some("high".to_string()),
                description: None,
                source: Some("manual".to_string()),
                date_added: ts("2024-01-01T00:00:00Z"),
            };
            upsert_attribution(&mut db_conn, &dao).await.unwrap();
        }
        let found = store.lookup_attributions("0x1").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label, "Exploiter");
        assert_eq!(found[0].risk_level, RiskLevel::High);
        assert!(store.lookup_cluster_membership("0x1").await.unwrap().is_empty());
    }
}
