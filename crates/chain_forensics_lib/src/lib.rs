pub mod attribution;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod ingest;
pub mod intelligence;
pub mod model;
pub mod patterns;
pub mod report;
pub mod reputation;
pub mod server;
pub mod store;
pub mod timeline;
pub mod trace;
pub mod utils;

#[cfg(test)]
mod test_utils;
