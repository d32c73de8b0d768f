use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::web::Data;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::attribution::{find_address_clusters, list_known_events};
use crate::err_from;
use crate::ingest::normalize_address;
use crate::error::{ErrorKind, ForensicError};
use crate::model::DateRange;
use crate::patterns::{detect_patterns, PatternThresholds};
use crate::report::{compose_report, ReportRequest};
use crate::reputation::compute_reputation;
use crate::store::SqliteStore;
use crate::timeline::build_timeline;
use crate::trace::trace_fund_flow;

pub struct ServerData {
    pub db_connection: Arc<Mutex<SqliteConnection>>,
    pub store: SqliteStore,
    pub thresholds: PatternThresholds,
    pub report_defaults: ReportRequest,
}

impl ServerData {
    pub fn new(
        db_connection: Arc<Mutex<SqliteConnection>>,
        thresholds: PatternThresholds,
        report_defaults: ReportRequest,
    ) -> Self {
        ServerData {
            store: SqliteStore::from_shared(db_connection.clone()),
            db_connection,
            thresholds,
            report_defaults,
        }
    }
}

fn error_response(err: &ForensicError) -> HttpResponse {
    let status = match err.kind() {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::RepositoryUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    HttpResponse::build(status).json(json!({
        "error": err.to_string(),
        "kind": err.kind(),
    }))
}

macro_rules! return_on_error {
    ( $e:expr ) => {
        match $e {
            Ok(x) => x,
            Err(err) => {
                log::debug!("Request failed: {}", err);
                return error_response(&err);
            }
        }
    };
}

/// Splits `a,b;c` into trimmed, non-empty addresses, lowercasing EVM ones
/// the way stored rows are.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(&[',', ';'][..])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(normalize_address)
        .collect()
}

fn path_address(req: &HttpRequest) -> Result<String, ForensicError> {
    req.match_info()
        .get("address")
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(normalize_address)
        .ok_or_else(|| ForensicError::InvalidInput("Address is required".to_string()))
}

#[derive(Deserialize, Debug)]
pub struct RangeQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct TimelineQuery {
    pub addresses: String,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct TraceQuery {
    pub path: String,
}

#[derive(Deserialize, Debug)]
pub struct EventsQuery {
    pub limit: Option<i64>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReportBody {
    pub addresses: Vec<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub case_id: Option<String>,
    pub title: Option<String>,
    pub investigator: Option<String>,
}

pub async fn timeline(data: Data<Box<ServerData>>, query: web::Query<TimelineQuery>) -> HttpResponse {
    let range = return_on_error!(DateRange::parse(query.start.as_deref(), query.end.as_deref()));
    let addresses = split_list(&query.addresses);
    let outcome = return_on_error!(build_timeline(&data.store, &data.store, &addresses, &range).await);
    HttpResponse::Ok().json(json!({
        "timeline": outcome,
    }))
}

pub async fn trace(data: Data<Box<ServerData>>, query: web::Query<TraceQuery>) -> HttpResponse {
    let path = split_list(&query.path);
    let result = return_on_error!(trace_fund_flow(&data.store, &path).await);
    HttpResponse::Ok().json(json!({
        "trace": result,
    }))
}

pub async fn patterns(
    data: Data<Box<ServerData>>,
    req: HttpRequest,
    query: web::Query<RangeQuery>,
) -> HttpResponse {
    let address = return_on_error!(path_address(&req));
    let range = return_on_error!(DateRange::parse(query.start.as_deref(), query.end.as_deref()));
    let outcome =
        return_on_error!(detect_patterns(&data.store, &address, &range, &data.thresholds).await);
    HttpResponse::Ok().json(json!({
        "patterns": outcome,
    }))
}

pub async fn reputation(data: Data<Box<ServerData>>, req: HttpRequest) -> HttpResponse {
    let address = return_on_error!(path_address(&req));
    let result = return_on_error!(compute_reputation(&data.store, &address).await);
    HttpResponse::Ok().json(json!({
        "reputation": result,
    }))
}

pub async fn clusters(data: Data<Box<ServerData>>, req: HttpRequest) -> HttpResponse {
    let address = return_on_error!(path_address(&req));
    let clusters = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(find_address_clusters(&mut db_conn, &address).await)
    };
    HttpResponse::Ok().json(json!({
        "clusters": clusters,
    }))
}

pub async fn events(data: Data<Box<ServerData>>, query: web::Query<EventsQuery>) -> HttpResponse {
    let events = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(list_known_events(&mut db_conn, query.limit).await)
    };
    HttpResponse::Ok().json(json!({
        "events": events,
    }))
}

pub async fn report(data: Data<Box<ServerData>>, body: web::Json<ReportBody>) -> HttpResponse {
    let body = body.into_inner();
    let range = return_on_error!(DateRange::parse(body.start.as_deref(), body.end.as_deref()));
    let defaults = data.report_defaults.clone();
    let request = ReportRequest {
        case_id: body.case_id.or(defaults.case_id),
        title: body.title.or(defaults.title),
        investigator: body.investigator.or(defaults.investigator),
    };
    let addresses: Vec<String> = body.addresses.iter().map(|a| normalize_address(a)).collect();
    let report = return_on_error!(
        compose_report(&data.store, &data.store, &addresses, &range, request).await
    );
    HttpResponse::Ok().json(json!({
        "report": report,
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/timeline", web::get().to(timeline))
        .route("/trace", web::get().to(trace))
        .route("/patterns/{address}", web::get().to(patterns))
        .route("/reputation/{address}", web::get().to(reputation))
        .route("/clusters/{address}", web::get().to(clusters))
        .route("/events", web::get().to(events))
        .route("/report", web::post().to(report));
}

pub async fn run_server(server_data: ServerData, bind: &str) -> Result<(), ForensicError> {
    let server_data = Data::new(Box::new(server_data));
    log::info!("Starting forensic API on http://{}", bind);
    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(server_data.clone())
            .configure(configure)
    })
    .bind(bind)
    .map_err(err_from!())?
    .run()
    .await
    .map_err(err_from!())
}
