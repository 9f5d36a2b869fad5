//! In-process test harness for Pylon clusters: deterministic port
//! allocation, role lifecycle management, segment-bundle ingestion and SQL
//! query helpers for integration tests.

mod cluster;
mod config;
mod decode;
mod errors;
mod ingest;
mod ports;
mod query;

pub use cluster::*;
pub use self::config::*;
pub use decode::*;
pub use errors::*;
pub use ingest::*;
pub use ports::*;
pub use query::*;
