// SPDX-License-Identifier: Apache-2.0

//! Network sink for the analytics collector.
//!
//! Records for one event are sent as a gzip-compressed JSON array in a single
//! POST carrying the destination app id. The collector answers with
//! `{code, msg}` where only `code == 0` is success.

pub mod client;
pub mod error;
pub mod exporter;
pub mod response;

pub use client::{CollectorService, HttpClient, build_service};
pub use error::ExportError;
pub use exporter::{CollectorExporter, CollectorExporterConfig, encode_payload};
pub use response::CollectorResponse;
