use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::db::model::{AttributionDao, KnownEventDao};
use crate::db::ops::*;
use crate::err_from;
use crate::error::{ErrorKind, ForensicError};
use crate::ingest::{normalize_address, validate_address};
use crate::model::{Category, ChainType, RiskLevel};

pub const INTELLIGENCE_VERSION: &str = "1.0.0";
pub const EXPORTED_EVENTS_FILE: &str = "exported-events.json";
pub const EXPORTED_ADDRESSES_FILE: &str = "exported-addresses.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntelEvent {
    pub event_name: String,
    pub event_type: String,
    pub event_date: Option<String>,
    pub chain_name: Option<String>,
    pub description: Option<String>,
    pub estimated_loss: Option<String>,
    pub primary_address: Option<String>,
    pub reference_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntelAddress {
    pub address: String,
    pub chain_type: String,
    pub label: String,
    pub category: Option<String>,
    pub risk_level: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub date_tagged: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EventsFile {
    pub version: String,
    pub last_updated: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub events: Vec<IntelEvent>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AddressesFile {
    pub version: String,
    pub last_updated: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub addresses: Vec<IntelAddress>,
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub errors: usize,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub events_count: usize,
    pub addresses_count: usize,
}

fn read_json<T: serde::de::DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T, ForensicError> {
    let content = fs::read(path.as_ref()).map_err(err_from!())?;
    serde_json::from_slice(&content).map_err(err_from!())
}

/// Accepts `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
fn parse_event_date(value: &str) -> Result<DateTime<Utc>, ForensicError> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| ForensicError::DataError(format!("Invalid event date: {}", value)))
}

async fn import_event(
    conn: &mut SqliteConnection,
    event: &IntelEvent,
) -> Result<bool, ForensicError> {
    if event.event_name.trim().is_empty() || event.event_type.trim().is_empty() {
        return Err(ForensicError::DataError(
            "Event needs eventName and eventType".to_string(),
        ));
    }
    if get_known_event_by_name(conn, &event.event_name)
        .await
        .map_err(err_from!())?
        .is_some()
    {
        return Ok(false);
    }
    let dao = KnownEventDao {
        id: 0,
        event_name: event.event_name.clone(),
        event_type: event.event_type.clone(),
        event_date: event.event_date.as_deref().map(parse_event_date).transpose()?,
        chain_name: event.chain_name.clone(),
        description: event.description.clone(),
        estimated_loss: event.estimated_loss.clone(),
        primary_address: event.primary_address.clone(),
        reference_url: event.reference_url.clone(),
        date_added: Utc::now(),
    };
    insert_known_event(conn, &dao).await.map_err(err_from!())?;
    Ok(true)
}

pub async fn import_events(
    conn: &mut SqliteConnection,
    file: &EventsFile,
) -> Result<ImportSummary, ForensicError> {
    log::info!(
        "Importing {} event(s), intelligence version {} ({})",
        file.events.len(),
        file.version,
        file.last_updated
    );
    let mut summary = ImportSummary::default();
    for event in &file.events {
        match import_event(conn, event).await {
            Ok(true) => summary.imported += 1,
            Ok(false) => {
                log::debug!("Skipped event {} (already exists)", event.event_name);
                summary.skipped += 1;
            }
            Err(err) if err.kind() == ErrorKind::RepositoryUnavailable => return Err(err),
            Err(err) => {
                log::warn!("Error importing event {}: {}", event.event_name, err);
                summary.errors += 1;
            }
        }
    }
    log::info!(
        "Events import complete: imported {}, skipped {}, errors {}",
        summary.imported,
        summary.skipped,
        summary.errors
    );
    Ok(summary)
}

pub async fn import_events_file<P: AsRef<Path>>(
    conn: &mut SqliteConnection,
    path: P,
) -> Result<ImportSummary, ForensicError> {
    let file: EventsFile = read_json(path)?;
    import_events(conn, &file).await
}

async fn import_address(
    conn: &mut SqliteConnection,
    entry: &IntelAddress,
) -> Result<bool, ForensicError> {
    let chain_type = ChainType::from_str(&entry.chain_type)
        .map_err(|e| ForensicError::DataError(e.to_string()))?;
    let address = normalize_address(&entry.address);
    validate_address(&address, chain_type)
        .map_err(|e| ForensicError::DataError(e.to_string()))?;
    if entry.label.trim().is_empty() {
        return Err(ForensicError::DataError("Address entry without label".to_string()));
    }
    let existing = get_address_attributions(conn, &address)
        .await
        .map_err(err_from!())?;
    if existing
        .iter()
        .any(|a| a.chain_type == chain_type.as_str() && a.label == entry.label)
    {
        return Ok(false);
    }
    let date_added = match entry.date_tagged.as_deref() {
        Some(date) => parse_event_date(date)?,
        None => Utc::now(),
    };
    let dao = AttributionDao {
        id: 0,
        address,
        chain_type: chain_type.to_string(),
        label: entry.label.clone(),
        category: Some(Category::parse_or_info(entry.category.as_deref()).to_string()),
        risk_level: Some(RiskLevel::parse_or_info(entry.risk_level.as_deref()).to_string()),
        description: entry.description.clone(),
        source: entry.source.clone(),
        date_added,
    };
    upsert_attribution(conn, &dao).await.map_err(err_from!())?;
    Ok(true)
}

pub async fn import_addresses(
    conn: &mut SqliteConnection,
    file: &AddressesFile,
) -> Result<ImportSummary, ForensicError> {
    log::info!(
        "Importing {} address(es), intelligence version {} ({})",
        file.addresses.len(),
        file.version,
        file.last_updated
    );
    let mut summary = ImportSummary::default();
    for entry in &file.addresses {
        match import_address(conn, entry).await {
            Ok(true) => summary.imported += 1,
            Ok(false) => {
                log::debug!("Skipped {} for {} (already exists)", entry.label, entry.address);
                summary.skipped += 1;
            }
            Err(err) if err.kind() == ErrorKind::RepositoryUnavailable => return Err(err),
            Err(err) => {
                log::warn!("Error importing {} ({}): {}", entry.label, entry.address, err);
                summary.errors += 1;
            }
        }
    }
    log::info!(
        "Address import complete: imported {}, skipped {}, errors {}",
        summary.imported,
        summary.skipped,
        summary.errors
    );
    Ok(summary)
}

pub async fn import_addresses_file<P: AsRef<Path>>(
    conn: &mut SqliteConnection,
    path: P,
) -> Result<ImportSummary, ForensicError> {
    let file: AddressesFile = read_json(path)?;
    import_addresses(conn, &file).await
}

fn date_only(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub async fn collect_intelligence(
    conn: &mut SqliteConnection,
) -> Result<(EventsFile, AddressesFile), ForensicError> {
    let today = date_only(Utc::now());
    let events = get_known_events(conn, None).await.map_err(err_from!())?;
    let addresses = get_all_attributions(conn).await.map_err(err_from!())?;

    let events_file = EventsFile {
        version: INTELLIGENCE_VERSION.to_string(),
        last_updated: today.clone(),
        description: Some("Exported threat intelligence - known security events".to_string()),
        events: events
            .into_iter()
            .map(|e| IntelEvent {
                event_name: e.event_name,
                event_type: e.event_type,
                event_date: e.event_date.map(date_only),
                chain_name: e.chain_name,
                description: e.description,
                estimated_loss: e.estimated_loss,
                primary_address: e.primary_address,
                reference_url: e.reference_url,
            })
            .collect(),
    };
    let addresses_file = AddressesFile {
        version: INTELLIGENCE_VERSION.to_string(),
        last_updated: today,
        description: Some("Exported threat intelligence - known addresses".to_string()),
        addresses: addresses
            .into_iter()
            .map(|a| IntelAddress {
                address: a.address,
                chain_type: a.chain_type,
                label: a.label,
                category: a.category,
                risk_level: a.risk_level,
                description: a.description,
                source: a.source,
                date_tagged: Some(date_only(a.date_added)),
            })
            .collect(),
    };
    Ok((events_file, addresses_file))
}

/// Writes `exported-events.json` and `exported-addresses.json` into `out_dir`.
pub async fn export_intelligence<P: AsRef<Path>>(
    conn: &mut SqliteConnection,
    out_dir: P,
) -> Result<ExportSummary, ForensicError> {
    let out_dir: PathBuf = out_dir.as_ref().to_path_buf();
    fs::create_dir_all(&out_dir).map_err(err_from!())?;
    let (events, addresses) = collect_intelligence(conn).await?;

    fs::write(
        out_dir.join(EXPORTED_EVENTS_FILE),
        serde_json::to_string_pretty(&events).map_err(err_from!())?,
    )
    .map_err(err_from!())?;
    fs::write(
        out_dir.join(EXPORTED_ADDRESSES_FILE),
        serde_json::to_string_pretty(&addresses).map_err(err_from!())?,
    )
    .map_err(err_from!())?;

    let summary = ExportSummary {
        events_count: events.events.len(),
        addresses_count: addresses.addresses.len(),
    };
    log::info!(
        "Exported {} event(s) and {} address(es) to {}",
        summary.events_count,
        summary.addresses_count,
        out_dir.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_sqlite_connection;
    use crate::ingest::{ingest_transactions, RawTransaction};
    use crate::model::DateRange;
    use crate::reputation::compute_reputation;
    use crate::store::{SqliteStore, TransactionRepository};

    const A: &str = "0x1111111111111111111111111111111111111111";

    fn events_file() -> EventsFile {
        serde_json::from_value(serde_json::json!({
            "version": "1.0.0",
            "lastUpdated": "2024-06-01",
            "events": [
                {"eventName": "Bridge exploit", "eventType": "exploit", "eventDate": "2022-03-29",
                 "estimatedLoss": "$600M", "primaryAddress": A},
                {"eventName": "Exchange hack", "eventType": "hack", "eventDate": "not a date"},
                {"eventName": "Bridge exploit", "eventType": "hack", "eventDate": "2023-01-01"}
            ]
        }))
        .unwrap()
    }

    fn addresses_file() -> AddressesFile {
        serde_json::from_value(serde_json::json!({
            "version": "1.0.0",
            "lastUpdated": "2024-06-01",
            "addresses": [
                {"address": A, "chainType": "evm", "label": "Exploiter", "category": "hack",
                 "riskLevel": "critical", "source": "intel"},
                {"address": A, "chainType": "evm", "label": "Exploiter", "category": "hack",
                 "riskLevel": "low"},
                {"address": "0x12", "chainType": "evm", "label": "Short", "category": "scam",
                 "riskLevel": "high"},
                {"address": A, "chainType": "evm", "label": "Odd", "category": "weird",
                 "riskLevel": "extreme"}
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_import_events_skips_existing() {
        let mut conn = create_sqlite_connection(None, true).await.unwrap();
        let summary = import_events(&mut conn, &events_file()).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                imported: 1,
                skipped: 1,
                errors: 1
            }
        );
        let stored = get_known_event_by_name(&mut conn, "Bridge exploit")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.event_type, "exploit");

        let again = import_events(&mut conn, &events_file()).await.unwrap();
        assert_eq!(again.imported, 0);
        assert_eq!(again.skipped, 2);
    }

    #[tokio::test]
    async fn test_import_addresses() {
        let mut conn = create_sqlite_connection(None, true).await.unwrap();
        let summary = import_addresses(&mut conn, &addresses_file()).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                imported: 2,
                skipped: 1,
                errors: 1
            }
        );
        let stored = get_address_attributions(&mut conn, A).await.unwrap();
        let odd = stored.iter().find(|a| a.label == "Odd").unwrap();
        assert_eq!(odd.risk_level.as_deref(), Some("info"));
        assert_eq!(odd.category.as_deref(), Some("info"));
    }

    #[tokio::test]
    async fn test_checksummed_import_matches_ingested_transactions() {
        let checksummed = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";
        let lowercase = checksummed.to_ascii_lowercase();
        let mut conn = create_sqlite_connection(None, true).await.unwrap();
        let file: AddressesFile = serde_json::from_value(serde_json::json!({
            "version": "1.0.0",
            "lastUpdated": "2024-06-01",
            "addresses": [
                {"address": checksummed, "chainType": "evm", "label": "Exploiter",
                 "category": "hack", "riskLevel": "critical"}
            ]
        }))
        .unwrap();
        assert_eq!(import_addresses(&mut conn, &file).await.unwrap().imported, 1);

        let raw: Vec<RawTransaction> = serde_json::from_value(serde_json::json!([
            {"hash": "0xabc", "chainName": "ethereum", "from": checksummed, "to": A, "value": "1"}
        ]))
        .unwrap();
        ingest_transactions(&mut conn, &raw).await.unwrap();

        let relabelled: AddressesFile = serde_json::from_value(serde_json::json!({
            "version": "1.0.0",
            "lastUpdated": "2024-06-02",
            "addresses": [
                {"address": lowercase, "chainType": "evm", "label": "Exploiter",
                 "category": "hack", "riskLevel": "critical"}
            ]
        }))
        .unwrap();
        assert_eq!(import_addresses(&mut conn, &relabelled).await.unwrap().skipped, 1);

        let store = SqliteStore::new(conn);
        let history = store
            .query_address_transactions(&lowercase, &DateRange::default())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        let reputation = compute_reputation(&store, &history[0].from_address)
            .await
            .unwrap();
        assert!(reputation.flagged);
        assert_eq!(reputation.risk_level, RiskLevel::Critical);
        assert_eq!(reputation.attributions.len(), 1);
    }

    #[tokio::test]
    async fn test_export_round_trips_through_import() {
        let mut conn = create_sqlite_connection(None, true).await.unwrap();
        import_events(&mut conn, &events_file()).await.unwrap();
        import_addresses(&mut conn, &addresses_file()).await.unwrap();

        let dir = std::env::temp_dir().join(format!(
            "chain_forensics_intel_{}_{}",
            std::process::id(),
            Utc::now().timestamp_millis()
        ));
        let summary = export_intelligence(&mut conn, &dir).await.unwrap();
        assert_eq!(summary.events_count, 1);
        assert_eq!(summary.addresses_count, 2);

        let mut fresh = create_sqlite_connection(None, true).await.unwrap();
        let events = import_events_file(&mut fresh, dir.join(EXPORTED_EVENTS_FILE))
            .await
            .unwrap();
        let addresses = import_addresses_file(&mut fresh, dir.join(EXPORTED_ADDRESSES_FILE))
            .await
            .unwrap();
        assert_eq!(events.imported, 1);
        assert_eq!(addresses.imported, 2);
        fs::remove_dir_all(&dir).unwrap();
    }
}
