use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ForensicError;

/// Attribution risk, ordered so that `max()` yields the worst level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Info => "info",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// Lenient parse for data coming from storage or imports.
    pub fn parse_or_info(value: Option<&str>) -> Self {
        match value {
            None => RiskLevel::Info,
            Some(v) => RiskLevel::from_str(v).unwrap_or_else(|_| {
                log::warn!("Unknown risk level {:?}, using info", v);
                RiskLevel::Info
            }),
        }
    }
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::Info
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = ForensicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(RiskLevel::Info),
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            _ => Err(ForensicError::InvalidInput(format!("Unknown risk level: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Exploit,
    Hack,
    Fraud,
    Scam,
    Phishing,
    Mixer,
    Exchange,
    Dex,
    DefiProtocol,
    Bridge,
    Sanctioned,
    KnownAttacker,
    Victim,
    Intermediary,
    Info,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Exploit => "exploit",
            Category::Hack => "hack",
            Category::Fraud => "fraud",
            Category::Scam => "scam",
            Category::Phishing => "phishing",
            Category::Mixer => "mixer",
            Category::Exchange => "exchange",
            Category::Dex => "dex",
            Category::DefiProtocol => "defi-protocol",
            Category::Bridge => "bridge",
            Category::Sanctioned => "sanctioned",
            Category::KnownAttacker => "known-attacker",
            Category::Victim => "victim",
            Category::Intermediary => "intermediary",
            Category::Info => "info",
        }
    }

    pub fn parse_or_info(value: Option<&str>) -> Self {
        match value {
            None => Category::Info,
            Some(v) => Category::from_str(v).unwrap_or_else(|_| {
                log::warn!("Unknown attribution category {:?}, using info", v);
                Category::Info
            }),
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Info
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ForensicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let category = match s.trim().to_ascii_lowercase().as_str() {
            "exploit" => Category::Exploit,
            "hack" => Category::Hack,
            "fraud" => Category::Fraud,
            "scam" => Category::Scam,
            "phishing" => Category::Phishing,
            "mixer" => Category::Mixer,
            "exchange" => Category::Exchange,
            "dex" => Category::Dex,
            "defi-protocol" => Category::DefiProtocol,
            "bridge" => Category::Bridge,
            "sanctioned" => Category::Sanctioned,
            "known-attacker" => Category::KnownAttacker,
            "victim" => Category::Victim,
            "intermediary" => Category::Intermediary,
            "info" | "uncategorized" | "" => Category::Info,
            _ => {
                return Err(ForensicError::InvalidInput(format!(
                    "Unknown category: {}",
                    s
                )))
            }
        };
        Ok(category)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    Evm,
    Solana,
}

impl ChainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainType::Evm => "evm",
            ChainType::Solana => "solana",
        }
    }
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainType {
    type Err = ForensicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "evm" => Ok(ChainType::Evm),
            "solana" => Ok(ChainType::Solana),
            _ => Err(ForensicError::InvalidInput(format!("Unknown chain type: {}", s))),
        }
    }
}

/// Inclusive time window; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self, ForensicError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(ForensicError::InvalidInput(format!(
                    "Date range start {} is after end {}",
                    start, end
                )));
            }
        }
        Ok(DateRange { start, end })
    }

    /// Accepts RFC 3339 date-times or plain `YYYY-MM-DD` dates. A plain end
    /// date covers the whole day.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, ForensicError> {
        let start = start.map(|s| parse_date_bound(s, false)).transpose()?;
        let end = end.map(|s| parse_date_bound(s, true)).transpose()?;
        DateRange::new(start, end)
    }

    pub fn contains(&self, timestamp: Option<DateTime<Utc>>) -> bool {
        if self.start.is_none() && self.end.is_none() {
            return true;
        }
        let Some(timestamp) = timestamp else {
            return false;
        };
        self.start.map_or(true, |s| timestamp >= s) && self.end.map_or(true, |e| timestamp <= e)
    }
}

fn parse_date_bound(value: &str, end_of_day: bool) -> Result<DateTime<Utc>, ForensicError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ForensicError::InvalidInput(format!("Invalid date: {}", value)))?;
    let time = if end_of_day {
        chrono::NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        chrono::NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| ForensicError::InvalidInput(format!("Invalid date: {}", value)))?;
    Ok(Utc.from_utc_datetime(&date.and_time(time)))
}

/// Result of a query-shaped operation: "nothing found" is a value, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "camelCase")]
pub enum QueryOutcome<T> {
    NoData,
    Found(T),
}

impl<T> QueryOutcome<T> {
    pub fn is_empty(&self) -> bool {
        matches!(self, QueryOutcome::NoData)
    }

    pub fn found(self) -> Option<T> {
        match self {
            QueryOutcome::NoData => None,
            QueryOutcome::Found(t) => Some(t),
        }
    }

    pub fn as_found(&self) -> Option<&T> {
        match self {
            QueryOutcome::NoData => None,
            QueryOutcome::Found(t) => Some(t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_order() {
        assert!(RiskLevel::Info < RiskLevel::Low);
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert_eq!(RiskLevel::parse_or_info(Some("bogus")), RiskLevel::Info);
        assert_eq!(RiskLevel::parse_or_info(Some("CRITICAL")), RiskLevel::Critical);
        assert!(RiskLevel::from_str("bogus").is_err());
    }

    #[test]
    fn test_category_round_trip_names() {
        for name in ["defi-protocol", "known-attacker", "mixer"] {
            assert_eq!(Category::from_str(name).unwrap().as_str(), name);
        }
        assert_eq!(Category::parse_or_info(Some("weird")), Category::Info);
        assert_eq!(
            serde_json::to_string(&Category::DefiProtocol).unwrap(),
            "\"defi-protocol\""
        );
    }

    #[test]
    fn test_date_range_parse() {
        let range = DateRange::parse(Some("2024-01-01"), Some("2024-01-01")).unwrap();
        let noon = DateTime::parse_from_rfc3339("2024-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(range.contains(Some(noon)));
        assert!(!range.contains(None));
        assert!(DateRange::default().contains(None));
        assert!(DateRange::parse(Some("2024-02-01"), Some("2024-01-01")).is_err());
        assert!(DateRange::parse(Some("yesterday"), None).is_err());
    }

    #[test]
    fn test_query_outcome_serialization() {
        let empty: QueryOutcome<u32> = QueryOutcome::NoData;
        assert_eq!(serde_json::to_string(&empty).unwrap(), r#"{"status":"noData"}"#);
        let found = QueryOutcome::Found(0u32);
        assert_eq!(
            serde_json::to_string(&found).unwrap(),
            r#"{"status":"found","data":0}"#
        );
    }
}
