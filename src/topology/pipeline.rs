// SPDX-License-Identifier: Apache-2.0

//! Delivers one `(record name, lines)` batch to every enabled sink.
//!
//! Sinks run in the order they were added and each must succeed before the
//! batch counts as delivered. The network sink gets one upload per event
//! config sharing the record name, all parsed from the same lines.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use logship::receivers::gamelog::parser::{EventCatalog, RecordParser};
//! use logship::topology::pipeline::Pipeline;
//!
//! let pipeline = Pipeline::new(Arc::new(EventCatalog::new()), RecordParser::new(false))
//!     .with_console();
//! assert_eq!(pipeline.sink_names(), vec!["console"]);
//! ```

use std::sync::Arc;

use tower::BoxError;
use tracing::{info, warn};

use crate::exporters::collector::CollectorExporter;
use crate::exporters::console::ConsoleExporter;
use crate::receivers::gamelog::BatchHandler;
use crate::receivers::gamelog::error::Result;
use crate::receivers::gamelog::parser::{
    EventCatalog, EventConfig, Record, RecordParser, TIME_FIELD, apply_default_properties,
    split_columns,
};

pub enum Sink {
    Console(ConsoleExporter),
    Collector(CollectorExporter),
}

impl Sink {
    pub fn name(&self) -> &'static str {
        match self {
            Sink::Console(_) => "console",
            Sink::Collector(_) => "collector",
        }
    }
}

/// Records ready to ship for one event, plus how many lines were dropped
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub records: Vec<Record>,
    pub dropped: usize,
}

pub struct Pipeline {
    catalog: Arc<EventCatalog>,
    parser: RecordParser,
    sinks: Vec<Sink>,
}

impl Pipeline {
    pub fn new(catalog: Arc<EventCatalog>, parser: RecordParser) -> Self {
        Self {
            catalog,
            parser,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Sink) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_console(self) -> Self {
        self.with_sink(Sink::Console(ConsoleExporter::stdout()))
    }

    pub fn with_collector(self, exporter: CollectorExporter) -> Self {
        self.with_sink(Sink::Collector(exporter))
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(Sink::name).collect()
    }

    /// Parse `rows` for one event config. Lines the parser rejects and
    /// records without a time field are counted as dropped.
    pub fn parse_rows(&self, config: &EventConfig, rows: &[Vec<&str>]) -> Result<ParsedBatch> {
        let mut batch = ParsedBatch {
            records: Vec::with_capacity(rows.len()),
            dropped: 0,
        };

        for columns in rows {
            let Some(mut record) = self.parser.parse(config, columns)? else {
                batch.dropped += 1;
                continue;
            };
            apply_default_properties(config, &mut record);

            if !record.contains_key(TIME_FIELD) {
                warn!(
                    event = %config.name,
                    record = %serde_json::Value::Object(record),
                    "Record has no time field, dropping"
                );
                batch.dropped += 1;
                continue;
            }
            batch.records.push(record);
        }

        Ok(batch)
    }

    async fn ship(
        &self,
        exporter: &CollectorExporter,
        record_name: &str,
        lines: &[String],
    ) -> std::result::Result<(), BoxError> {
        let configs = self.catalog.get(record_name);
        if configs.is_empty() {
            warn!(record = record_name, "No event config for record, skipping batch");
            return Ok(());
        }

        let rows: Vec<Vec<&str>> = lines.iter().map(|line| split_columns(line)).collect();
        for config in configs {
            let batch = self.parse_rows(config, &rows)?;
            info!(
                event = %config.name,
                record = record_name,
                kind = config.upload_kind.as_str(),
                rows = batch.records.len(),
                dropped = batch.dropped,
                "Parsed batch"
            );
            exporter.export(&config.name, &batch.records).await?;
        }

        Ok(())
    }
}

impl BatchHandler for Pipeline {
    async fn handle(&self, record_name: &str, lines: &[String]) -> std::result::Result<(), BoxError> {
        for sink in &self.sinks {
            match sink {
                Sink::Console(console) => console.export(record_name, lines),
                Sink::Collector(exporter) => self.ship(exporter, record_name, lines).await?,
            }
        }
        Ok(())
    }
}
