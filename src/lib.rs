//! HARVESTER — group-aware household-finance scraper
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod parser;
pub mod browser;
pub mod credentials;
pub mod login;
pub mod scraper;
pub mod storage;
