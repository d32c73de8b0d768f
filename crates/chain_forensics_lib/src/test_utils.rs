use chrono::{DateTime, TimeZone, Utc};

use crate::db::model::{Attribution, ClusterMembership, TransactionDao};
use crate::model::{Category, ChainType, RiskLevel};

pub fn ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn tx(
    hash: &str,
    from: &str,
    to: Option<&str>,
    value: &str,
    timestamp: Option<&str>,
) -> TransactionDao {
    TransactionDao {
        id: 0,
        tx_hash: hash.to_string(),
        chain_name: "ethereum".to_string(),
        block_number: Some(1),
        timestamp: timestamp.map(ts),
        from_address: from.to_string(),
        to_address: to.map(|t| t.to_string()),
        value: Some(value.to_string()),
        gas_used: None,
        gas_price: None,
        input_data: None,
        contract_address: None,
        status: Some(1),
        method_id: None,
    }
}

pub fn attribution(address: &str, label: &str, risk_level: RiskLevel) -> Attribution {
    Attribution {
        address: address.to_string(),
        chain_type: ChainType::Evm,
        label: label.to_string(),
        category: Category::Hack,
        risk_level,
        description: None,
        source: Some("manual".to_string()),
        date_added: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

pub fn cluster_member(cluster_name: &str, address: &str, confidence: f64) -> ClusterMembership {
    ClusterMembership {
        cluster_name: cluster_name.to_string(),
        address: address.to_string(),
        chain_type: ChainType::Evm,
        confidence_score: Some(confidence),
        evidence: None,
        date_added: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}
