// SPDX-License-Identifier: Apache-2.0

//! End-to-end runs of the log scheduler over a temporary log tree, with the
//! console sink writing to an in-memory buffer.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use tokio::time::timeout;

use logship::exporters::console::ConsoleExporter;
use logship::init::event_config::parse_catalog;
use logship::receivers::gamelog::parser::RecordParser;
use logship::receivers::gamelog::{
    JsonFilePositionStore, PositionStore, Registration, Scheduler, SchedulerConfig, ServerConfig,
    SourceIdentity,
};
use logship::topology::pipeline::{Pipeline, Sink};

const EVENTS: &str = r##"{
    "common_fields": {"#time": {"index": 1, "type": "date"}},
    "events": [{
        "name": "login",
        "record_name": "Login",
        "source_log_type": "tlog",
        "upload_kind": "track",
        "fields": {"level": {"index": 2, "type": "int"}}
    }]
}"##;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn lines(&self) -> Vec<String> {
        String::from_utf8(self.0.lock().unwrap().clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn server() -> ServerConfig {
    ServerConfig {
        operator: 7,
        server: 101,
        port: "8001".to_string(),
    }
}

fn config(root: &Path, start_day: &str) -> SchedulerConfig {
    SchedulerConfig {
        root_path: root.to_path_buf(),
        relative_path: PathBuf::from("log"),
        start_day: day(start_day),
        process_interval: Duration::from_millis(20),
    }
}

fn log_file(root: &Path, day: &str) -> PathBuf {
    let dir = root.join("8001").join("log").join("tlog");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(format!("7_101_Login.{}", day))
}

fn append(root: &Path, day: &str, content: &str) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file(root, day))
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
}

fn console_pipeline(out: &Captured) -> Pipeline {
    let catalog = Arc::new(parse_catalog(EVENTS).unwrap());
    Pipeline::new(catalog, RecordParser::new(false))
        .with_sink(Sink::Console(ConsoleExporter::with_writer(out.clone())))
}

#[tokio::test]
async fn test_catch_up_across_days_and_resume_after_restart() {
    let logs = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    let positions = state.path().join("positions.json");

    append(logs.path(), "2021-04-18", "1618700000000\t1\n1618700001000\t2\n");
    append(logs.path(), "2021-04-20", "1618900000000\t3\npartial");

    let out = Captured::default();
    let pipeline = console_pipeline(&out);

    {
        let store = Arc::new(JsonFilePositionStore::open(&positions).unwrap());
        let scheduler = Scheduler::new(config(logs.path(), "2021-04-18"), store);
        assert_eq!(
            scheduler.register(&server(), "Login", "tlog").await.unwrap(),
            Registration::Registered
        );

        scheduler
            .scan_once(&pipeline, day("2021-04-20"))
            .await
            .unwrap();
    }

    // the unterminated tail is shipped at end of file
    assert_eq!(
        out.lines(),
        vec![
            "Login 1618700000000\t1",
            "Login 1618700001000\t2",
            "Login 1618900000000\t3",
            "Login partial",
        ]
    );

    append(logs.path(), "2021-04-20", "\n1618900002000\t5\n");

    let store = Arc::new(JsonFilePositionStore::open(&positions).unwrap());
    let identity = SourceIdentity::new(7, 101, "Login");
    let saved = store.load(&identity).await.unwrap().unwrap();
    assert_eq!(saved.last_execute_day, day("2021-04-20"));
    assert_eq!(saved.total_rows, 4);

    let scheduler = Scheduler::new(config(logs.path(), "2021-04-20"), store);
    assert_eq!(
        scheduler.register(&server(), "Login", "tlog").await.unwrap(),
        Registration::Registered
    );
    scheduler
        .scan_once(&pipeline, day("2021-04-20"))
        .await
        .unwrap();

    let lines = out.lines();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[4], "Login 1618900002000\t5");

    let cursor = scheduler.cursor(&identity).await.unwrap();
    assert_eq!(cursor.total_rows, 5);
    assert_eq!(
        cursor.byte_offset,
        std::fs::metadata(log_file(logs.path(), "2021-04-20"))
            .unwrap()
            .len()
    );
}

#[tokio::test]
async fn test_run_picks_up_appended_lines_until_stopped() {
    let logs = tempfile::tempdir().unwrap();
    let today = chrono::Local::now().date_naive();
    let today_str = today.format("%Y-%m-%d").to_string();

    append(logs.path(), &today_str, "1618700000000\t1\n");

    let out = Captured::default();
    let pipeline = Arc::new(console_pipeline(&out));
    let store = Arc::new(logship::receivers::gamelog::MemoryPositionStore::new());
    let scheduler = Arc::new(Scheduler::new(config(logs.path(), &today_str), store));
    scheduler.register(&server(), "Login", "tlog").await.unwrap();

    let handle = {
        let scheduler = scheduler.clone();
        let pipeline = pipeline.clone();
        tokio::spawn(async move { scheduler.run(pipeline.as_ref()).await })
    };

    timeout(Duration::from_secs(5), async {
        while out.lines().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    append(logs.path(), &today_str, "1618700001000\t2\n");
    timeout(Duration::from_secs(5), async {
        while out.lines().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    timeout(Duration::from_secs(5), scheduler.stop()).await.unwrap();
    assert!(scheduler.is_stopped());
    handle.await.unwrap().unwrap();

    assert_eq!(
        out.lines(),
        vec!["Login 1618700000000\t1", "Login 1618700001000\t2"]
    );
}
