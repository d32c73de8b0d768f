mod options;

use chain_forensics_lib::attribution::{
    bulk_tag_addresses, create_cluster, list_clusters, list_known_events, register_event, ClusterOptions,
    EventOptions, TagOptions,
};
use chain_forensics_lib::config::Config;
use chain_forensics_lib::db::create_sqlite_connection;
use chain_forensics_lib::error::ForensicError;
use chain_forensics_lib::export::export_report;
use chain_forensics_lib::ingest::{ingest_transactions, load_transactions_file, normalize_address};
use chain_forensics_lib::intelligence::{
    export_intelligence, import_addresses_file, import_events_file,
};
use chain_forensics_lib::model::{DateRange, QueryOutcome};
use chain_forensics_lib::patterns::detect_patterns;
use chain_forensics_lib::report::{compose_report, ReportRequest};
use chain_forensics_lib::reputation::compute_reputation;
use chain_forensics_lib::server::{run_server, ServerData};
use chain_forensics_lib::store::SqliteStore;
use chain_forensics_lib::timeline::build_timeline;
use chain_forensics_lib::trace::{trace_fund_flow, HopEvidence};
use chain_forensics_lib::utils::wei_to_decimal;
use chain_forensics_lib::{err_custom_create, err_from};
use serde::Serialize;
use sqlx::{Connection, SqliteConnection};
use std::sync::Arc;
use structopt::StructOpt;
use tokio::sync::Mutex;

use crate::options::{split_addresses, CliOptions, Command, RangeOptions};

fn print_json<T: Serialize>(value: &T) -> Result<(), ForensicError> {
    println!("{}", serde_json::to_string_pretty(value).map_err(err_from!())?);
    Ok(())
}

fn parse_range(range: &RangeOptions) -> Result<DateRange, ForensicError> {
    DateRange::parse(range.start.as_deref(), range.end.as_deref())
}

async fn run_command(
    command: Command,
    mut conn: SqliteConnection,
    config: &Config,
) -> Result<(), ForensicError> {
    match command {
        Command::ImportTxs { file } => {
            let raw = load_transactions_file(&file)?;
            let summary = ingest_transactions(&mut conn, &raw).await?;
            print_json(&summary)?;
        }
        Command::ImportIntel { events, addresses } => {
            if events.is_none() && addresses.is_none() {
                return Err(err_custom_create!(
                    "Specify --events and/or --addresses to import"
                ));
            }
            if let Some(events) = events {
                let summary = import_events_file(&mut conn, &events).await?;
                println!(
                    "Events: imported {}, skipped {}, errors {}",
                    summary.imported, summary.skipped, summary.errors
                );
            }
            if let Some(addresses) = addresses {
                let summary = import_addresses_file(&mut conn, &addresses).await?;
                println!(
                    "Addresses: imported {}, skipped {}, errors {}",
                    summary.imported, summary.skipped, summary.errors
                );
            }
        }
        Command::ExportIntel { out_dir } => {
            let summary = export_intelligence(&mut conn, &out_dir).await?;
            println!(
                "Exported {} events and {} addresses to {}",
                summary.events_count,
                summary.addresses_count,
                out_dir.display()
            );
        }
        Command::Tag(tag) => {
            let options = TagOptions {
                category: tag.category,
                risk_level: tag.risk_level,
                description: tag.description,
                source: tag.source,
            };
            let addresses = split_addresses(&tag.addresses);
            let results =
                bulk_tag_addresses(&mut conn, &addresses, tag.chain_type, &tag.label, &options)
                    .await;
            print_json(&results)?;
        }
        Command::Cluster(cluster) => {
            let options = ClusterOptions {
                confidence_score: cluster.confidence,
                evidence: cluster.evidence,
            };
            let addresses = split_addresses(&cluster.addresses);
            let results = create_cluster(
                &mut conn,
                &cluster.name,
                &addresses,
                cluster.chain_type,
                &options,
            )
            .await?;
            print_json(&results)?;
        }
        Command::Clusters => {
            let clusters = list_clusters(&mut conn).await?;
            print_json(&clusters)?;
        }
        Command::Event(event) => {
            let event_date = match &event.date {
                Some(date) => DateRange::parse(Some(date.as_str()), None)?.start,
                None => None,
            };
            let stored = register_event(
                &mut conn,
                &event.name,
                EventOptions {
                    event_type: Some(event.event_type),
                    event_date,
                    chain_name: event.chain_name,
                    description: event.description,
                    estimated_loss: event.estimated_loss,
                    primary_address: event.primary_address,
                    reference_url: event.reference_url,
                },
            )
            .await?;
            print_json(&stored)?;
        }
        Command::Events { limit } => {
            let events = list_known_events(&mut conn, limit).await?;
            print_json(&events)?;
        }
        Command::Timeline { addresses, range } => {
            let range = parse_range(&range)?;
            let store = SqliteStore::new(conn);
            let outcome = build_timeline(&store, &store, &split_addresses(&addresses), &range).await?;
            match &outcome {
                QueryOutcome::NoData => println!("No transactions found"),
                QueryOutcome::Found(_) => print_json(&outcome)?,
            }
            return Ok(());
        }
        Command::Trace { path } => {
            let store = SqliteStore::new(conn);
            let result = trace_fund_flow(&store, &split_addresses(&path)).await?;
            for hop in &result.hops {
                match &hop.evidence {
                    HopEvidence::Evidence {
                        transaction_count,
                        total_value,
                        ..
                    } => {
                        let total = wei_to_decimal(total_value, None)
                            .map(|d| d.to_string())
                            .unwrap_or_else(|_| format!("{} wei", total_value));
                        println!(
                            "Hop {}: {} -> {}: {} transaction(s), {} total",
                            hop.index + 1,
                            hop.from,
                            hop.to,
                            transaction_count,
                            total
                        );
                    }
                    HopEvidence::NoEvidence => println!(
                        "Hop {}: {} -> {}: no direct transfer found",
                        hop.index + 1,
                        hop.from,
                        hop.to
                    ),
                }
            }
            if result.is_complete() {
                println!("Every hop of the path is evidenced");
            } else {
                println!(
                    "{} of {} hop(s) without evidence",
                    result.missing_hops().count(),
                    result.hops.len()
                );
            }
            print_json(&result)?;
            return Ok(());
        }
        Command::Patterns { address, range } => {
            let range = parse_range(&range)?;
            let thresholds = config.pattern_thresholds()?;
            let store = SqliteStore::new(conn);
            let outcome =
                detect_patterns(&store, &normalize_address(&address), &range, &thresholds).await?;
            match &outcome {
                QueryOutcome::NoData => println!("No transactions found for {}", address),
                QueryOutcome::Found(result) => {
                    if !result.has_findings() {
                        println!("No suspicious patterns in {} transaction(s)", result.transaction_count);
                    }
                    for rapid in &result.rapid_transfers {
                        println!(
                            "Rapid transfer: {} -> {} ({:.3}s apart)",
                            rapid.first_tx,
                            rapid.second_tx,
                            rapid.time_diff_secs()
                        );
                    }
                    print_json(&outcome)?;
                }
            }
            return Ok(());
        }
        Command::Reputation { address } => {
            let store = SqliteStore::new(conn);
            let result = compute_reputation(&store, &normalize_address(&address)).await?;
            print_json(&result)?;
            return Ok(());
        }
        Command::Report(report) => {
            let range = parse_range(&report.range)?;
            let defaults = config.report_request();
            let request = ReportRequest {
                case_id: report.case_id,
                title: report.title.or(defaults.title),
                investigator: report.investigator.or(defaults.investigator),
            };
            let store = SqliteStore::new(conn);
            let composed = compose_report(
                &store,
                &store,
                &split_addresses(&report.addresses),
                &range,
                request,
            )
            .await?;
            for path in export_report(&composed, &report.out_dir, report.format)? {
                println!("Report written to {}", path.display());
            }
            return Ok(());
        }
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let server_data = ServerData::new(
                Arc::new(Mutex::new(conn)),
                config.pattern_thresholds()?,
                config.report_request(),
            );
            return run_server(server_data, &bind).await;
        }
    }
    conn.close().await.map_err(err_from!())?;
    Ok(())
}

async fn main_internal() -> Result<(), ForensicError> {
    let dotenv_result = dotenv::dotenv();
    env_logger::init();
    if let Err(err) = dotenv_result {
        log::debug!("No .env file loaded: {}", err);
    }

    let cli: CliOptions = CliOptions::from_args();
    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(db_file) = cli.db_file {
        config.db.file = db_file;
    }

    let conn = if cli.memory_db {
        create_sqlite_connection(None, true).await?
    } else {
        create_sqlite_connection(Some(&config.db.file), true).await?
    };
    run_command(cli.command, conn, &config).await
}

#[actix_web::main]
async fn main() -> Result<(), ForensicError> {
    match main_internal().await {
        Ok(_) => Ok(()),
        Err(e) => {
            eprintln!("Error: {}", e);
            Err(e)
        }
    }
}
