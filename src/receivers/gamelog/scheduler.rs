// SPDX-License-Identifier: Apache-2.0

//! Per-source task registry and the fixed-interval scan loop.
//!
//! Every registered source owns a `Task` holding its cursor. A scan cycle walks
//! each task from its stored day up to today, tails that day's file from the
//! stored offset and hands completed lines to a `BatchHandler`. The cursor is
//! saved after every delivered batch and whenever the day rolls over, so a
//! restart resumes exactly where delivery stopped.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, RwLock};

use chrono::{Local, NaiveDate};
use tokio::select;
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, info};

use crate::receivers::gamelog::config::SchedulerConfig;
use crate::receivers::gamelog::error::{Error, Result};
use crate::receivers::gamelog::persistence::PositionStore;
use crate::receivers::gamelog::source::{Cursor, ServerConfig, SourceIdentity};
use crate::receivers::gamelog::tailer::SegmentReader;

/// Consumer of completed lines for one record name
pub trait BatchHandler: Send + Sync {
    /// An error is fatal: the batch's cursor is not advanced
    fn handle(
        &self,
        record_name: &str,
        lines: &[String],
    ) -> impl Future<Output = std::result::Result<(), BoxError>> + Send;
}

/// Outcome of `Scheduler::register`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered,
    AlreadyPresent,
}

/// The unit of scheduling: one source, its cursor and its stop signal
pub struct Task {
    cursor: Cursor,
    port: String,
    stop: CancellationToken,
}

impl Task {
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

pub struct Scheduler<S> {
    config: SchedulerConfig,
    store: Arc<S>,
    tasks: RwLock<BTreeMap<String, Arc<Mutex<Task>>>>,
    registering: Mutex<()>,
    cancel: CancellationToken,
    running: watch::Sender<bool>,
}

impl<S: PositionStore> Scheduler<S> {
    pub fn new(config: SchedulerConfig, store: Arc<S>) -> Self {
        Self {
            config,
            store,
            tasks: RwLock::new(BTreeMap::new()),
            registering: Mutex::new(()),
            cancel: CancellationToken::new(),
            running: watch::Sender::new(false),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Start tracking `log_name` on `server`. Registering an identity that is
    /// already tracked is a no-op and never touches its cursor.
    ///
    /// A source seen for the first time is seeded at the configured start day
    /// and saved before it becomes visible to the scan loop.
    pub async fn register(
        &self,
        server: &ServerConfig,
        log_name: &str,
        log_type: &str,
    ) -> Result<Registration> {
        let identity = SourceIdentity::new(server.operator, server.server, log_name);
        let key = identity.key();

        let _guard = self.registering.lock().await;
        if self.read_tasks()?.contains_key(&key) {
            return Ok(Registration::AlreadyPresent);
        }

        let cursor = match self.store.load(&identity).await? {
            Some(cursor) => cursor,
            None => {
                let cursor = Cursor::new(identity, log_type, self.config.start_day);
                self.store.save(&cursor).await?;
                cursor
            }
        };

        info!(cursor = %cursor, port = %server.port, "Registered log task");

        let task = Task {
            cursor,
            port: server.port.clone(),
            stop: self.cancel.child_token(),
        };
        self.write_tasks()?
            .insert(key, Arc::new(Mutex::new(task)));

        Ok(Registration::Registered)
    }

    pub fn task_count(&self) -> usize {
        self.read_tasks().map(|t| t.len()).unwrap_or_default()
    }

    /// Current cursor of a tracked source
    pub async fn cursor(&self, identity: &SourceIdentity) -> Option<Cursor> {
        let task = self.read_tasks().ok()?.get(&identity.key()).cloned()?;
        let task = task.lock().await;
        Some(task.cursor.clone())
    }

    /// Run scan cycles every `process_interval` until `stop` is called.
    /// Returns the first fatal error from a cycle.
    pub async fn run<H: BatchHandler>(&self, handler: &H) -> Result<()> {
        self.running.send_replace(true);
        let result = self.run_loop(handler).await;
        self.running.send_replace(false);
        result
    }

    async fn run_loop<H: BatchHandler>(&self, handler: &H) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.process_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval = ?self.config.process_interval,
            tasks = self.task_count(),
            "Starting log scan scheduler"
        );

        loop {
            select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!(tasks = self.task_count(), "Log scan scheduler stopped");
                    return Ok(());
                }

                _ = ticker.tick() => {
                    let today = Local::now().date_naive();
                    debug!(today = %today, "Starting scan cycle");
                    self.scan_once(handler, today).await?;
                    debug!("Finished scan cycle");
                }
            }
        }
    }

    /// Signal every task to stop and wait for the scan loop to exit.
    /// Returns immediately when the loop is not running.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let mut running = self.running.subscribe();
        let _ = running.wait_for(|running| !*running).await;
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run one scan cycle over every task registered so far, treating `today`
    /// as the last day to read
    pub async fn scan_once<H: BatchHandler>(&self, handler: &H, today: NaiveDate) -> Result<()> {
        let tasks: Vec<_> = self.read_tasks()?.values().cloned().collect();

        for task in tasks {
            if self.cancel.is_cancelled() {
                break;
            }
            let mut task = task.lock().await;
            self.scan_task(&mut task, handler, today).await?;
        }

        Ok(())
    }

    async fn scan_task<H: BatchHandler>(
        &self,
        task: &mut Task,
        handler: &H,
        today: NaiveDate,
    ) -> Result<()> {
        let mut day = task.cursor.last_execute_day;

        while day <= today {
            if task.is_stopped() {
                info!(source = %task.cursor.identity, "Task stopped");
                return Ok(());
            }

            if day != task.cursor.last_execute_day {
                task.cursor.roll_to(day);
                self.store.save(&task.cursor).await?;
                debug!(source = %task.cursor.identity, day = %day, "Rolled over to next day");
            }

            let path = task.cursor.file_path(
                &self.config.root_path,
                &self.config.relative_path,
                &task.port,
                day,
            );
            self.scan_file(task, &path, handler).await?;

            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        Ok(())
    }

    async fn scan_file<H: BatchHandler>(
        &self,
        task: &mut Task,
        path: &Path,
        handler: &H,
    ) -> Result<()> {
        let Some(mut reader) = SegmentReader::open(path, task.cursor.byte_offset).await? else {
            return Ok(());
        };

        let stop = task.stop.clone();
        while let Some(batch) = reader.next_batch(|| stop.is_cancelled()).await? {
            if stop.is_cancelled() {
                debug!(path = ?path, "Task stopped, abandoning batch");
                break;
            }

            if !batch.lines.is_empty() {
                handler
                    .handle(&task.cursor.identity.log_name, &batch.lines)
                    .await
                    .map_err(Error::Handler)?;
            }

            task.cursor.commit(batch.offset, batch.lines.len());
            self.store.save(&task.cursor).await?;

            debug!(
                source = %task.cursor.identity,
                path = ?path,
                lines = batch.lines.len(),
                offset = batch.offset,
                total_rows = task.cursor.total_rows,
                "Processed batch"
            );
        }

        Ok(())
    }

    fn read_tasks(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Arc<Mutex<Task>>>>> {
        self.tasks
            .read()
            .map_err(|e| Error::Registry(e.to_string()))
    }

    fn write_tasks(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Arc<Mutex<Task>>>>> {
        self.tasks
            .write()
            .map_err(|e| Error::Registry(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receivers::gamelog::persistence::MemoryPositionStore;
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        batches: StdMutex<Vec<(String, Vec<String>)>>,
        fail: bool,
    }

    impl BatchHandler for Recorder {
        async fn handle(
            &self,
            record_name: &str,
            lines: &[String],
        ) -> std::result::Result<(), BoxError> {
            if self.fail {
                return Err("sink unavailable".into());
            }
            self.batches
                .lock()
                .unwrap()
                .push((record_name.to_string(), lines.to_vec()));
            Ok(())
        }
    }

    impl Recorder {
        fn lines(&self) -> Vec<String> {
            self.batches
                .lock()
                .unwrap()
                .iter()
                .flat_map(|(_, lines)| lines.clone())
                .collect()
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn server() -> ServerConfig {
        ServerConfig {
            operator: 1,
            server: 2,
            port: "8001".to_string(),
        }
    }

    fn scheduler(root: &Path, start_day: &str) -> (Arc<MemoryPositionStore>, Scheduler<MemoryPositionStore>) {
        let store = Arc::new(MemoryPositionStore::new());
        let config = SchedulerConfig {
            root_path: root.to_path_buf(),
            relative_path: PathBuf::from("log"),
            start_day: day(start_day),
            process_interval: Duration::from_millis(10),
        };
        (store.clone(), Scheduler::new(config, store))
    }

    fn write_day(root: &Path, day: &str, content: &str) {
        let dir = root.join("8001").join("log").join("tlog");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("1_2_Login.{}", day)), content).unwrap();
    }

    #[tokio::test]
    async fn test_registration_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (store, scheduler) = scheduler(dir.path(), "2021-04-20");

        assert_eq!(
            scheduler.register(&server(), "Login", "tlog").await.unwrap(),
            Registration::Registered
        );
        assert_eq!(store.save_count(), 1);

        write_day(dir.path(), "2021-04-20", "a\nb\n");
        let recorder = Recorder::default();
        scheduler.scan_once(&recorder, day("2021-04-20")).await.unwrap();

        assert_eq!(
            scheduler.register(&server(), "Login", "tlog").await.unwrap(),
            Registration::AlreadyPresent
        );
        assert_eq!(scheduler.task_count(), 1);

        let id = SourceIdentity::new(1, 2, "Login");
        let cursor = scheduler.cursor(&id).await.unwrap();
        assert_eq!(cursor.byte_offset, 4);
        assert_eq!(store.get(&id).unwrap().byte_offset, 4);
    }

    #[tokio::test]
    async fn test_registration_resumes_stored_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let (store, scheduler) = scheduler(dir.path(), "2021-04-20");

        let id = SourceIdentity::new(1, 2, "Login");
        let mut stored = Cursor::new(id.clone(), "tlog", day("2021-04-21"));
        stored.commit(2, 1);
        store.save(&stored).await.unwrap();

        scheduler.register(&server(), "Login", "tlog").await.unwrap();
        assert_eq!(scheduler.cursor(&id).await.unwrap(), stored);

        write_day(dir.path(), "2021-04-21", "a\nb\nc\n");
        let recorder = Recorder::default();
        scheduler.scan_once(&recorder, day("2021-04-21")).await.unwrap();
        assert_eq!(recorder.lines(), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_day_rollover() {
        let dir = tempfile::tempdir().unwrap();
        let (store, scheduler) = scheduler(dir.path(), "2021-04-18");
        scheduler.register(&server(), "Login", "tlog").await.unwrap();

        write_day(dir.path(), "2021-04-18", "d1\n");
        write_day(dir.path(), "2021-04-19", "d2\n");
        write_day(dir.path(), "2021-04-21", "d4a\nd4b\n");

        let recorder = Recorder::default();
        scheduler.scan_once(&recorder, day("2021-04-21")).await.unwrap();

        assert_eq!(recorder.lines(), vec!["d1", "d2", "d4a", "d4b"]);

        let id = SourceIdentity::new(1, 2, "Login");
        let cursor = store.get(&id).unwrap();
        assert_eq!(cursor.last_execute_day, day("2021-04-21"));
        assert_eq!(cursor.byte_offset, 8);
        assert_eq!(cursor.total_rows, 4);
    }

    #[tokio::test]
    async fn test_rollover_persists_days_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let (store, scheduler) = scheduler(dir.path(), "2021-04-18");
        scheduler.register(&server(), "Login", "tlog").await.unwrap();

        write_day(dir.path(), "2021-04-18", "d1\n");
        write_day(dir.path(), "2021-04-19", "d2\n");

        let recorder = Recorder::default();
        scheduler.scan_once(&recorder, day("2021-04-21")).await.unwrap();
        assert_eq!(recorder.lines(), vec!["d1", "d2"]);

        let id = SourceIdentity::new(1, 2, "Login");
        let cursor = store.get(&id).unwrap();
        assert_eq!(cursor.last_execute_day, day("2021-04-21"));
        assert_eq!(cursor.byte_offset, 0);
        assert_eq!(cursor.total_rows, 2);

        // seed, two batches, and a rollover to each of 19, 20 and 21
        assert_eq!(store.save_count(), 6);
    }

    #[tokio::test]
    async fn test_handler_failure_keeps_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let (store, scheduler) = scheduler(dir.path(), "2021-04-20");
        scheduler.register(&server(), "Login", "tlog").await.unwrap();
        write_day(dir.path(), "2021-04-20", "a\n");

        let recorder = Recorder {
            fail: true,
            ..Default::default()
        };
        let result = scheduler.scan_once(&recorder, day("2021-04-20")).await;
        assert!(matches!(result, Err(Error::Handler(_))));

        let cursor = store.get(&SourceIdentity::new(1, 2, "Login")).unwrap();
        assert_eq!(cursor.byte_offset, 0);
    }

    #[tokio::test]
    async fn test_save_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (store, scheduler) = scheduler(dir.path(), "2021-04-20");
        scheduler.register(&server(), "Login", "tlog").await.unwrap();
        write_day(dir.path(), "2021-04-20", "a\n");

        store.fail_saves(true);
        let recorder = Recorder::default();
        let result = scheduler.scan_once(&recorder, day("2021-04-20")).await;
        assert!(matches!(result, Err(Error::Persistence(_))));
    }

    #[tokio::test]
    async fn test_poisoned_registry_is_not_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, scheduler) = scheduler(dir.path(), "2021-04-20");
        let scheduler = Arc::new(scheduler);

        let poisoner = scheduler.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.tasks.write().unwrap();
            panic!("writer died holding the registry");
        })
        .join();

        let result = scheduler.register(&server(), "Login", "tlog").await;
        assert!(matches!(result, Err(Error::Registry(_))));
        assert!(matches!(
            scheduler.scan_once(&Recorder::default(), day("2021-04-20")).await,
            Err(Error::Registry(_))
        ));
    }

    #[tokio::test]
    async fn test_stopped_tasks_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, scheduler) = scheduler(dir.path(), "2021-04-20");
        scheduler.register(&server(), "Login", "tlog").await.unwrap();
        write_day(dir.path(), "2021-04-20", "a\n");

        scheduler.stop().await;
        assert!(scheduler.is_stopped());

        let recorder = Recorder::default();
        scheduler.scan_once(&recorder, day("2021-04-20")).await.unwrap();
        assert!(recorder.lines().is_empty());
    }

    #[tokio::test]
    async fn test_run_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, scheduler) = scheduler(dir.path(), "2021-04-20");
        let scheduler = Arc::new(scheduler);
        let today = Local::now().date_naive();
        let server = server();
        scheduler.register(&server, "Login", "tlog").await.unwrap();
        write_day(dir.path(), &today.format("%Y-%m-%d").to_string(), "now\n");

        let recorder = Arc::new(Recorder::default());
        let handle = {
            let scheduler = scheduler.clone();
            let recorder = recorder.clone();
            tokio::spawn(async move { scheduler.run(recorder.as_ref()).await })
        };

        for _ in 0..200 {
            if !recorder.lines().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(recorder.lines(), vec!["now"]);

        scheduler.stop().await;
        handle.await.unwrap().unwrap();
    }
}
