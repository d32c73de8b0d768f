use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::db::model::TransactionDao;
use crate::err_from;
use crate::error::ForensicError;
use crate::model::QueryOutcome;
use crate::report::ForensicReport;

pub const CSV_HEADERS: [&str; 11] = [
    "Timestamp",
    "TX Hash",
    "Chain",
    "Block",
    "From Address",
    "From Labels",
    "To Address",
    "To Labels",
    "Value (wei)",
    "Status",
    "Method ID",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Csv,
    All,
}

impl FromStr for ReportFormat {
    type Err = ForensicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "csv" => Ok(ReportFormat::Csv),
            "all" => Ok(ReportFormat::All),
            _ => Err(ForensicError::InvalidInput(format!(
                "Unknown report format: {} (expected json, csv or all)",
                s
            ))),
        }
    }
}

pub fn write_json<W: Write>(report: &ForensicReport, writer: W) -> Result<(), ForensicError> {
    serde_json::to_writer_pretty(writer, report).map_err(err_from!())
}

fn status_text(tx: &TransactionDao) -> &'static str {
    match tx.status {
        Some(0) => "FAILED",
        Some(_) => "SUCCESS",
        None => "UNKNOWN",
    }
}

/// Transaction log, one row per transaction in timeline order.
pub fn write_csv<W: Write>(report: &ForensicReport, writer: W) -> Result<(), ForensicError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CSV_HEADERS).map_err(err_from!())?;

    let address_stats = match &report.timeline {
        QueryOutcome::Found(timeline) => Some(&timeline.address_stats),
        QueryOutcome::NoData => None,
    };
    let labels_of = |address: &str| {
        address_stats
            .and_then(|stats| stats.get(address))
            .map(|stats| stats.labels.join(";"))
            .unwrap_or_default()
    };
    for tx in report.transactions() {
        let to = tx.to_address.clone().unwrap_or_default();
        csv_writer
            .write_record([
                tx.timestamp.map(|t| t.to_rfc3339()).unwrap_or_default(),
                tx.tx_hash.clone(),
                tx.chain_name.clone(),
                tx.block_number.map(|b| b.to_string()).unwrap_or_default(),
                tx.from_address.clone(),
                labels_of(&tx.from_address),
                to.clone(),
                labels_of(&to),
                tx.value.clone().unwrap_or_default(),
                status_text(tx).to_string(),
                tx.method_id.clone().unwrap_or_default(),
            ])
            .map_err(err_from!())?;
    }
    csv_writer.flush().map_err(err_from!())?;
    Ok(())
}

/// Writes `<case id>.json` and/or `<case id>.csv` into `out_dir` and returns
/// the created paths.
pub fn export_report<P: AsRef<Path>>(
    report: &ForensicReport,
    out_dir: P,
    format: ReportFormat,
) -> Result<Vec<PathBuf>, ForensicError> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir).map_err(err_from!())?;
    let base_name = &report.metadata.case_id;
    let mut written = Vec::new();

    if matches!(format, ReportFormat::Json | ReportFormat::All) {
        let path = out_dir.join(format!("{}.json", base_name));
        write_json(report, File::create(&path).map_err(err_from!())?)?;
        log::info!("JSON report exported to: {}", path.display());
        written.push(path);
    }
    if matches!(format, ReportFormat::Csv | ReportFormat::All) {
        let path = out_dir.join(format!("{}.csv", base_name));
        write_csv(report, File::create(&path).map_err(err_from!())?)?;
        log::info!("CSV report exported to: {}", path.display());
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DateRange, RiskLevel};
    use crate::report::{compose_report, ReportRequest};
    use crate::store::MemoryStore;
    use crate::test_utils::*;

    async fn sample_report() -> ForensicReport {
        let mut store = MemoryStore::new();
        let mut first = tx("0xA", "0x1", Some("0x2"), "10", Some("2024-01-01T10:00:00Z"));
        first.method_id = Some("0xa9059cbb".to_string());
        store.upsert_transaction(first);
        let mut failed = tx("0xB", "0x2", None, "0", None);
        failed.status = Some(0);
        failed.block_number = None;
        store.upsert_transaction(failed);
        store.upsert_attribution(attribution("0x2", "Drainer", RiskLevel::High));
        store.upsert_attribution(attribution("0x2", "Mixer user", RiskLevel::Medium));
        compose_report(
            &store,
            &store,
            &["0x1".to_string(), "0x2".to_string()],
            &DateRange::default(),
            ReportRequest {
                case_id: Some("CASE-7".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_csv_log() {
        let report = sample_report().await;
        let mut out = Vec::new();
        write_csv(&report, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADERS.join(","));
        assert_eq!(
            lines[1],
            "2024-01-01T10:00:00+00:00,0xA,ethereum,1,0x1,,0x2,Mixer user;Drainer,10,SUCCESS,0xa9059cbb"
        );
        assert_eq!(lines[2], ",0xB,ethereum,,0x2,Mixer user;Drainer,,,0,FAILED,");
    }

    #[tokio::test]
    async fn test_json_is_the_full_report() {
        let report = sample_report().await;
        let mut out = Vec::new();
        write_json(&report, &mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["metadata"]["caseId"], "CASE-7");
        assert_eq!(json["statistics"]["totalTransactions"], 2);
        assert_eq!(json["flaggedInteractions"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_export_all_formats() {
        let report = sample_report().await;
        let dir = std::env::temp_dir().join(format!("chain_forensics_export_{}", std::process::id()));
        let written = export_report(&report, &dir, ReportFormat::All).unwrap();
        assert_eq!(written, vec![dir.join("CASE-7.json"), dir.join("CASE-7.csv")]);
        assert!(written.iter().all(|p| p.exists()));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(ReportFormat::from_str("CSV").unwrap(), ReportFormat::Csv);
        assert!(ReportFormat::from_str("html").is_err());
    }
}
