use chain_forensics_lib::export::ReportFormat;
use chain_forensics_lib::ingest::normalize_address;
use chain_forensics_lib::model::{Category, ChainType, RiskLevel};
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
pub struct RangeOptions {
    #[structopt(long = "start", help = "Start date (YYYY-MM-DD or RFC 3339), inclusive")]
    pub start: Option<String>,

    #[structopt(long = "end", help = "End date (YYYY-MM-DD or RFC 3339), inclusive")]
    pub end: Option<String>,
}

#[derive(Debug, StructOpt)]
pub struct TagOptions {
    #[structopt(
        long = "addresses",
        help = "Address, or coma separated list of addresses"
    )]
    pub addresses: String,

    #[structopt(long = "label")]
    pub label: String,

    #[structopt(long = "chain-type", default_value = "evm")]
    pub chain_type: ChainType,

    #[structopt(long = "category", default_value = "info")]
    pub category: Category,

    #[structopt(long = "risk-level", default_value = "info")]
    pub risk_level: RiskLevel,

    #[structopt(long = "description")]
    pub description: Option<String>,

    #[structopt(long = "source", default_value = "manual")]
    pub source: String,
}

#[derive(Debug, StructOpt)]
pub struct ClusterOptions {
    #[structopt(long = "name")]
    pub name: String,

    #[structopt(
        long = "addresses",
        help = "Coma separated list of addresses belonging to the cluster"
    )]
    pub addresses: String,

    #[structopt(long = "chain-type", default_value = "evm")]
    pub chain_type: ChainType,

    #[structopt(long = "confidence", default_value = "0.8")]
    pub confidence: f64,

    #[structopt(long = "evidence")]
    pub evidence: Option<String>,
}

#[derive(Debug, StructOpt)]
pub struct EventOptions {
    #[structopt(long = "name")]
    pub name: String,

    #[structopt(long = "event-type", default_value = "hack")]
    pub event_type: String,

    #[structopt(long = "date", help = "Event date (YYYY-MM-DD), defaults to now")]
    pub date: Option<String>,

    #[structopt(long = "chain")]
    pub chain_name: Option<String>,

    #[structopt(long = "description")]
    pub description: Option<String>,

    #[structopt(long = "estimated-loss")]
    pub estimated_loss: Option<String>,

    #[structopt(long = "primary-address")]
    pub primary_address: Option<String>,

    #[structopt(long = "reference-url")]
    pub reference_url: Option<String>,
}

#[derive(Debug, StructOpt)]
pub struct ReportOptions {
    #[structopt(long = "addresses", help = "Coma separated list of investigated addresses")]
    pub addresses: String,

    #[structopt(flatten)]
    pub range: RangeOptions,

    #[structopt(long = "case-id", help = "Case id, defaults to CASE-<millis>")]
    pub case_id: Option<String>,

    #[structopt(long = "title")]
    pub title: Option<String>,

    #[structopt(long = "investigator")]
    pub investigator: Option<String>,

    #[structopt(long = "out-dir", default_value = "reports")]
    pub out_dir: PathBuf,

    #[structopt(long = "format", default_value = "all", help = "json, csv or all")]
    pub format: ReportFormat,
}

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Import transactions from a JSON file
    #[structopt(name = "import-txs")]
    ImportTxs {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
    },
    /// Import threat intelligence files
    #[structopt(name = "import-intel")]
    ImportIntel {
        #[structopt(long = "events", parse(from_os_str))]
        events: Option<PathBuf>,

        #[structopt(long = "addresses", parse(from_os_str))]
        addresses: Option<PathBuf>,
    },
    /// Export known events and attributions as intelligence files
    #[structopt(name = "export-intel")]
    ExportIntel {
        #[structopt(parse(from_os_str))]
        out_dir: PathBuf,
    },
    /// Tag one or more addresses
    #[structopt(name = "tag")]
    Tag(TagOptions),
    /// Group addresses into a named cluster
    #[structopt(name = "cluster")]
    Cluster(ClusterOptions),
    /// List clusters with their member counts
    #[structopt(name = "clusters")]
    Clusters,
    /// Register a known security event
    #[structopt(name = "event")]
    Event(EventOptions),
    /// List known security events
    #[structopt(name = "events")]
    Events {
        #[structopt(long = "limit")]
        limit: Option<i64>,
    },
    /// Chronological activity of the given addresses
    #[structopt(name = "timeline")]
    Timeline {
        #[structopt(long = "addresses", help = "Coma separated list of addresses")]
        addresses: String,

        #[structopt(flatten)]
        range: RangeOptions,
    },
    /// Check a hypothesised fund-flow path hop by hop
    #[structopt(name = "trace")]
    Trace {
        #[structopt(long = "path", help = "Coma separated list of at least two addresses")]
        path: String,
    },
    /// Scan an address history for suspicious patterns
    #[structopt(name = "patterns")]
    Patterns {
        address: String,

        #[structopt(flatten)]
        range: RangeOptions,
    },
    /// Risk verdict of an address
    #[structopt(name = "reputation")]
    Reputation { address: String },
    /// Compose and export a forensic report
    #[structopt(name = "report")]
    Report(ReportOptions),
    /// Serve the read-only JSON API
    #[structopt(name = "serve")]
    Serve {
        #[structopt(long = "bind", help = "Listen address, overrides the config file")]
        bind: Option<String>,
    },
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "chain_forensics",
    about = "Forensic analysis of stored blockchain transactions"
)]
pub struct CliOptions {
    #[structopt(long = "config", default_value = "config-forensics.toml", parse(from_os_str))]
    pub config: PathBuf,

    #[structopt(
        long = "db-file",
        help = "Sqlite database file, overrides config and DB_SQLITE_FILENAME"
    )]
    pub db_file: Option<String>,

    #[structopt(long = "memory-db", help = "Use memory db, default is file db")]
    pub memory_db: bool,

    #[structopt(subcommand)]
    pub command: Command,
}

/// Splits a coma or semicolon separated argument into addresses, lowercasing
/// EVM ones the way stored rows are.
pub fn split_addresses(value: &str) -> Vec<String> {
    value
        .split(&[',', ';'][..])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(normalize_address)
        .collect()
}
