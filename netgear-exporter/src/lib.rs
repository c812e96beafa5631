//! Prometheus exporter for Netgear cable modem DOCSIS statistics.
//!
//! The exporter logs in to the modem's web UI, scrapes the channel status
//! table and exposes per-channel signal statistics via an HTTP `/metrics`
//! endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  Modem web UI   │────>│  Session/Parser │────>│   MetricStore   │────>│   HTTP Server   │
//! │ (DocsisStatus)  │     │  (poll cycle)   │     │  (projection)   │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! Every cycle logs in again, fetches the status page and projects the parsed
//! channel records onto the store. A failed cycle stops the exporter; it is
//! meant to run under a supervisor that restarts it.
//!
//! # Usage
//!
//! ```bash
//! netgear-exporter --url http://192.168.100.1 --user admin --pass secret
//! netgear-exporter --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod config;
pub mod error;
pub mod http;
pub mod parser;
pub mod poller;
pub mod session;
pub mod store;

pub use config::ExporterConfig;
pub use error::{FieldParseError, ScrapeError};
pub use http::HttpServer;
pub use parser::{ChannelRecord, StatusTableParser};
pub use poller::{ModemPoller, PollState};
pub use store::{MetricStore, SharedStore};
