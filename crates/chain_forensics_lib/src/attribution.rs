use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use std::collections::BTreeMap;

use crate::db::model::{
    Attribution, AttributionDao, ClusterMemberDao, ClusterMembership, ClusterSummaryDao, KnownEventDao,
};
use crate::db::ops::*;
use crate::error::ForensicError;
use crate::ingest::{normalize_address, validate_address};
use crate::model::{Category, ChainType, RiskLevel};
use crate::{err_from, err_invalid_input};

pub const DEFAULT_SOURCE: &str = "manual";
pub const DEFAULT_CONFIDENCE: f64 = 0.8;
pub const DEFAULT_EVENT_LIST_LIMIT: i64 = 50;

#[derive(Debug, Clone)]
pub struct TagOptions {
    pub category: Category,
    pub risk_level: RiskLevel,
    pub description: Option<String>,
    pub source: String,
}

impl Default for TagOptions {
    fn default() -> Self {
        TagOptions {
            category: Category::Info,
            risk_level: RiskLevel::Info,
            description: None,
            source: DEFAULT_SOURCE.to_string(),
        }
    }
}

/// Per-address result of a batch write. A failed address does not stop the batch.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddressWriteResult {
    pub address: String,
    pub success: bool,
    pub error: Option<String>,
}

impl AddressWriteResult {
    fn from_result<T>(address: &str, result: Result<T, ForensicError>) -> Self {
        match result {
            Ok(_) => AddressWriteResult {
                address: address.to_string(),
                success: true,
                error: None,
            },
            Err(err) => AddressWriteResult {
                address: address.to_string(),
                success: false,
                error: Some(err.to_string()),
            },
        }
    }
}

pub async fn tag_address(
    conn: &mut SqliteConnection,
    address: &str,
    chain_type: ChainType,
    label: &str,
    options: &TagOptions,
) -> Result<Attribution, ForensicError> {
    let address = normalize_address(address);
    validate_address(&address, chain_type)?;
    if label.trim().is_empty() {
        return Err(err_invalid_input!("Attribution label is required"));
    }
    log::info!(
        "Tagging address {} as {:?} ({})",
        address,
        label,
        options.risk_level
    );
    let dao = AttributionDao {
        id: 0,
        address,
        chain_type: chain_type.to_string(),
        label: label.trim().to_string(),
        category: Some(options.category.to_string()),
        risk_level: Some(options.risk_level.to_string()),
        description: options.description.clone(),
        source: Some(options.source.clone()),
        date_added: Utc::now(),
    };
    let stored = upsert_attribution(conn, &dao).await.map_err(err_from!())?;
    Ok(stored.into())
}

pub async fn bulk_tag_addresses(
    conn: &mut SqliteConnection,
    addresses: &[String],
    chain_type: ChainType,
    label: &str,
    options: &TagOptions,
) -> Vec<AddressWriteResult> {
    log::info!("Bulk tagging {} address(es)...", addresses.len());
    let mut results = Vec::with_capacity(addresses.len());
    for address in addresses {
        let result = tag_address(conn, address, chain_type, label, options).await;
        results.push(AddressWriteResult::from_result(address, result));
    }
    log::info!(
        "Tagged {}/{} address(es)",
        results.iter().filter(|r| r.success).count(),
        addresses.len()
    );
    results
}

#[derive(Debug, Clone)]
pub struct ClusterOptions {
    pub confidence_score: f64,
    pub evidence: Option<String>,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        ClusterOptions {
            confidence_score: DEFAULT_CONFIDENCE,
            evidence: None,
        }
    }
}

pub async fn create_cluster(
    conn: &mut SqliteConnection,
    cluster_name: &str,
    addresses: &[String],
    chain_type: ChainType,
    options: &ClusterOptions,
) -> Result<Vec<AddressWriteResult>, ForensicError> {
    if cluster_name.trim().is_empty() {
        return Err(err_invalid_input!("Cluster name is required"));
    }
    if !(0.0..=1.0).contains(&options.confidence_score) {
        return Err(err_invalid_input!(
            "Confidence score must be between 0 and 1, got {}",
            options.confidence_score
        ));
    }
    log::info!(
        "Creating cluster {:?} with {} address(es)",
        cluster_name,
        addresses.len()
    );
    let mut results = Vec::with_capacity(addresses.len());
    for address in addresses {
        let normalized = normalize_address(address);
        let result = match validate_address(&normalized, chain_type) {
            Ok(()) => {
                let dao = ClusterMemberDao {
                    id: 0,
                    cluster_name: cluster_name.trim().to_string(),
                    address: normalized,
                    chain_type: chain_type.to_string(),
                    confidence_score: Some(options.confidence_score),
                    evidence: options.evidence.clone(),
                    date_added: Utc::now(),
                };
                insert_cluster_member(conn, &dao)
                    .await
                    .map_err(err_from!())
                    .map(|_| ())
            }
            Err(err) => Err(err),
        };
        results.push(AddressWriteResult::from_result(address, result));
    }
    Ok(results)
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    pub name: String,
    pub total_addresses: usize,
    pub members: Vec<ClusterMembership>,
}

/// Clusters that contain `address` (case-insensitive), each with its full
/// member list.
pub async fn find_address_clusters(
    conn: &mut SqliteConnection,
    address: &str,
) -> Result<Vec<ClusterInfo>, ForensicError> {
    let memberships = get_address_clusters(conn, address)
        .await
        .map_err(err_from!())?;
    let mut by_name = BTreeMap::new();
    for membership in memberships {
        if by_name.contains_key(&membership.cluster_name) {
            continue;
        }
        let members: Vec<ClusterMembership> = get_cluster_members(conn, &membership.cluster_name)
            .await
            .map_err(err_from!())?
            .into_iter()
            .map(ClusterMembership::from)
            .collect();
        by_name.insert(membership.cluster_name.clone(), members);
    }
    Ok(by_name
        .into_iter()
        .map(|(name, members)| ClusterInfo {
            name,
            total_addresses: members.len(),
            members,
        })
        .collect())
}

/// Every cluster with its member count, largest first.
pub async fn list_clusters(conn: &mut SqliteConnection) -> Result<Vec<ClusterSummaryDao>, ForensicError> {
    get_all_clusters(conn).await.map_err(err_from!())
}

#[derive(Debug, Clone, Default)]
pub struct EventOptions {
    /// Defaults to "hack".
    pub event_type: Option<String>,
    /// Defaults to now.
    pub event_date: Option<DateTime<Utc>>,
    pub chain_name: Option<String>,
    pub description: Option<String>,
    pub estimated_loss: Option<String>,
    pub primary_address: Option<String>,
    pub reference_url: Option<String>,
}

/// Registers a security event; an existing event with the same name is updated.
pub async fn register_event(
    conn: &mut SqliteConnection,
    event_name: &str,
    options: EventOptions,
) -> Result<KnownEventDao, ForensicError> {
    if event_name.trim().is_empty() {
        return Err(err_invalid_input!("Event name is required"));
    }
    log::info!("Registering event: {}", event_name);
    let now = Utc::now();
    let dao = KnownEventDao {
        id: 0,
        event_name: event_name.trim().to_string(),
        event_type: options.event_type.unwrap_or_else(|| "hack".to_string()),
        event_date: Some(options.event_date.unwrap_or(now)),
        chain_name: options.chain_name,
        description: options.description,
        estimated_loss: options.estimated_loss,
        primary_address: options.primary_address,
        reference_url: options.reference_url,
        date_added: now,
    };
    upsert_known_event(conn, &dao).await.map_err(err_from!())
}

pub async fn list_known_events(
    conn: &mut SqliteConnection,
    limit: Option<i64>,
) -> Result<Vec<KnownEventDao>, ForensicError> {
    let limit = limit.unwrap_or(DEFAULT_EVENT_LIST_LIMIT);
    if limit < 0 {
        return Err(err_invalid_input!("Limit must not be negative"));
    }
    get_known_events(conn, Some(limit)).await.map_err(err_from!())
}
