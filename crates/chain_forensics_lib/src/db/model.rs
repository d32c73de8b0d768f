use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use serde::Serialize;
use std::str::FromStr;

use crate::model::{Category, ChainType, RiskLevel};
use crate::utils::parse_value;

/// One stored on-chain transfer or contract call. Rows are keyed by `tx_hash`.
#[derive(Serialize, sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDao {
    pub id: i64,
    pub tx_hash: String,
    pub chain_name: String,
    pub block_number: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub from_address: String,
    /// `None` for contract creation.
    pub to_address: Option<String>,
    pub value: Option<String>,
    pub gas_used: Option<String>,
    pub gas_price: Option<String>,
    pub input_data: Option<String>,
    pub contract_address: Option<String>,
    pub status: Option<i64>,
    pub method_id: Option<String>,
}

impl TransactionDao {
    pub fn value_big(&self) -> BigUint {
        parse_value(self.value.as_deref())
    }

    pub fn is_failed(&self) -> bool {
        self.status == Some(0)
    }

    /// Contract creation/interaction, or call data longer than a bare selector.
    pub fn is_contract_interaction(&self) -> bool {
        self.contract_address.is_some()
            || self
                .input_data
                .as_ref()
                .map(|data| data.len() > 10)
                .unwrap_or(false)
    }

    pub fn touches(&self, address: &str) -> bool {
        self.from_address == address || self.to_address.as_deref() == Some(address)
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct AttributionDao {
    pub id: i64,
    pub address: String,
    pub chain_type: String,
    pub label: String,
    pub category: Option<String>,
    pub risk_level: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub date_added: DateTime<Utc>,
}

/// Attribution with its open string columns mapped onto the closed enums.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attribution {
    pub address: String,
    pub chain_type: ChainType,
    pub label: String,
    pub category: Category,
    pub risk_level: RiskLevel,
    pub description: Option<String>,
    pub source: Option<String>,
    pub date_added: DateTime<Utc>,
}

impl From<AttributionDao> for Attribution {
    fn from(dao: AttributionDao) -> Self {
        Attribution {
            chain_type: parse_chain_type(&dao.chain_type),
            category: Category::parse_or_info(dao.category.as_deref()),
            risk_level: RiskLevel::parse_or_info(dao.risk_level.as_deref()),
            address: dao.address,
            label: dao.label,
            description: dao.description,
            source: dao.source,
            date_added: dao.date_added,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ClusterMemberDao {
    pub id: i64,
    pub cluster_name: String,
    pub address: String,
    pub chain_type: String,
    pub confidence_score: Option<f64>,
    pub evidence: Option<String>,
    pub date_added: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMembership {
    pub cluster_name: String,
    pub address: String,
    pub chain_type: ChainType,
    pub confidence_score: Option<f64>,
    pub evidence: Option<String>,
    pub date_added: DateTime<Utc>,
}

impl From<ClusterMemberDao> for ClusterMembership {
    fn from(dao: ClusterMemberDao) -> Self {
        ClusterMembership {
            chain_type: parse_chain_type(&dao.chain_type),
            cluster_name: dao.cluster_name,
            address: dao.address,
            confidence_score: dao.confidence_score,
            evidence: dao.evidence,
            date_added: dao.date_added,
        }
    }
}

#[derive(Serialize, sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummaryDao {
    pub cluster_name: String,
    pub address_count: i64,
}

#[derive(Serialize, sqlx::FromRow, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct KnownEventDao {
    pub id: i64,
    pub event_name: String,
    pub event_type: String,
    pub event_date: Option<DateTime<Utc>>,
    pub chain_name: Option<String>,
    pub description: Option<String>,
    pub estimated_loss: Option<String>,
    pub primary_address: Option<String>,
    pub reference_url: Option<String>,
    pub date_added: DateTime<Utc>,
}

fn parse_chain_type(value: &str) -> ChainType {
    ChainType::from_str(value).unwrap_or_else(|_| {
        log::warn!("Unknown chain type {:?} in store, assuming evm", value);
        ChainType::Evm
    })
}
