//! HTTP client library for the Option Chain Scanner API.
//!
//! This crate provides a typed HTTP client for the scanner backend's REST
//! endpoints and a WebSocket client for live scan updates.
//!
//! # Example
//!
//! ```no_run
//! use scanner_client::{ClientConfig, FilterConfig, ScannerClient, SpreadStrategy};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), scanner_client::Error> {
//!     let client = ScannerClient::new(ClientConfig {
//!         base_url: "http://localhost:8080".into(),
//!         timeout: Duration::from_secs(30),
//!     })?;
//!
//!     let filters = vec![FilterConfig::delta(0.20, 0.35), FilterConfig::dte(30, 60)];
//!     let scan = client
//!         .scan_symbol("SPY", Some(&filters), Some(SpreadStrategy::Credit), Some(10))
//!         .await?;
//!     println!("{} spreads for {}", scan.result_count, scan.symbol);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;
mod websocket;

pub use client::{ClientConfig, ScannerClient};
pub use error::Error;
pub use types::*;
pub use websocket::{ClientCommand, WsClient, WsMessage};
