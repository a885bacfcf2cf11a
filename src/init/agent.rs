// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::task::JoinSet;
use tokio::time::{Instant, interval_at, timeout};
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, info, warn};

use crate::exporters::collector::CollectorExporter;
use crate::init::args::{AgentRun, Exporter};
use crate::init::server_list::{self, ServerList};
use crate::init::{event_config, wait};
use crate::receivers::gamelog::parser::{EventCatalog, RecordParser};
use crate::receivers::gamelog::{AnyPositionStore, Registration, Scheduler};
use crate::topology::pipeline::Pipeline;

type AgentScheduler = Scheduler<AnyPositionStore>;

pub struct Agent {
    config: Box<AgentRun>,
}

impl Agent {
    pub fn new(config: Box<AgentRun>) -> Self {
        Self { config }
    }

    /// Run until `agent_cancel` fires or a task fails. Either way the
    /// scheduler is stopped and given the grace period to unwind.
    pub async fn run(self, agent_cancel: CancellationToken) -> Result<(), BoxError> {
        let config = self.config;

        info!("Starting logship.");

        let scheduler_config = config.scheduler_config();
        scheduler_config.validate()?;

        let catalog = Arc::new(event_config::load_catalog(&config.event_config)?);
        if catalog.is_empty() {
            warn!(path = ?config.event_config, "Event configuration has no events");
        }

        let servers = server_list::load_server_list(&config.server_list).await?;

        let store = AnyPositionStore::open(
            &config.position_store,
            config.position_store_max_connections,
        )
        .await?;
        info!(backend = store.backend_name(), "Opened position store");

        let scheduler = Arc::new(Scheduler::new(scheduler_config, Arc::new(store)));
        let registered = register_all(&scheduler, &servers, &catalog).await?;
        info!(
            servers = servers.len(),
            tasks = registered,
            "Registered log tasks"
        );

        let pipeline = Arc::new(build_pipeline(&config, catalog.clone())?);
        info!(sinks = ?pipeline.sink_names(), "Built pipeline");

        let mut task_set = JoinSet::new();
        let reload_cancel = CancellationToken::new();

        {
            let scheduler = scheduler.clone();
            let pipeline = pipeline.clone();
            task_set.spawn(async move {
                scheduler
                    .run(pipeline.as_ref())
                    .await
                    .map_err(|e| -> BoxError { e.into() })
            });
        }

        if let Some(configured) = config.server_list_reload_interval {
            let reloader = ServerListReloader {
                scheduler: scheduler.clone(),
                catalog: catalog.clone(),
                path: config.server_list.clone(),
                interval: server_list::reload_interval(configured),
            };
            let cancel = reload_cancel.clone();
            task_set.spawn(async move { reloader.run(cancel).await });
        }

        let mut result = Ok(());
        select! {
            _ = agent_cancel.cancelled() => {
                debug!("Agent cancellation signaled.");
            },
            e = wait::wait_for_any_task(&mut task_set) => {
                match e {
                    Ok(()) => warn!("Unexpected early exit of task."),
                    Err(e) => result = Err(e),
                }
            },
        }

        reload_cancel.cancel();
        if timeout(config.shutdown_grace_period, scheduler.stop())
            .await
            .is_err()
        {
            warn!(
                grace_period = ?config.shutdown_grace_period,
                "Scheduler did not stop within the grace period"
            );
        }

        if let Err(e) =
            wait::wait_for_tasks_with_timeout(&mut task_set, config.shutdown_grace_period).await
        {
            if result.is_ok() {
                result = Err(e);
            }
        }

        result?;
        info!("Logship stopped.");
        Ok(())
    }
}

fn build_pipeline(config: &AgentRun, catalog: Arc<EventCatalog>) -> Result<Pipeline, BoxError> {
    if config.exporters.is_empty() {
        return Err("at least one exporter must be specified".into());
    }

    let mut pipeline = Pipeline::new(catalog, RecordParser::new(config.ignore_field_errors));
    for exporter in &config.exporters {
        pipeline = match exporter {
            Exporter::Console => pipeline.with_console(),
            Exporter::Http => {
                let collector = CollectorExporter::build(config.collector.to_config())?;
                pipeline.with_collector(collector)
            }
        };
    }

    Ok(pipeline)
}

/// Register every record name of the catalog on every server. Returns how
/// many tasks were new.
pub async fn register_all(
    scheduler: &AgentScheduler,
    servers: &ServerList,
    catalog: &EventCatalog,
) -> Result<usize, BoxError> {
    let mut registered = 0;
    for server in servers.values() {
        for (record_name, log_type) in catalog.sources() {
            if scheduler.register(server, record_name, log_type).await? == Registration::Registered {
                registered += 1;
            }
        }
    }
    Ok(registered)
}

/// Periodically re-reads the server list and registers servers added since
/// startup
struct ServerListReloader {
    scheduler: Arc<AgentScheduler>,
    catalog: Arc<EventCatalog>,
    path: PathBuf,
    interval: Duration,
}

impl ServerListReloader {
    async fn run(self, cancel: CancellationToken) -> Result<(), BoxError> {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        info!(interval = ?self.interval, path = ?self.path, "Starting server list reloader");

        loop {
            select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    let servers = match server_list::load_server_list(&self.path).await {
                        Ok(servers) => servers,
                        Err(e) => {
                            warn!(error = %e, path = ?self.path, "Failed to re-read server list, keeping existing tasks");
                            continue;
                        }
                    };

                    let registered = register_all(&self.scheduler, &servers, &self.catalog).await?;
                    if registered > 0 {
                        info!(tasks = registered, "Registered tasks from reloaded server list");
                    }
                }
            }
        }
    }
}
