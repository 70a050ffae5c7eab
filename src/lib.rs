// Library exports for huni
// This allows integration tests and external code to use huni modules

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod fanout;
pub mod graph;
pub mod ingest;
pub mod records;
pub mod routes;
pub mod session;
pub mod state;
