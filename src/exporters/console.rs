// SPDX-License-Identifier: Apache-2.0

use std::io::{self, Write};
use std::sync::Mutex;

use tracing::warn;

/// Prints each raw line prefixed with its record name
pub struct ConsoleExporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl Default for ConsoleExporter {
    fn default() -> Self {
        Self::stdout()
    }
}

impl ConsoleExporter {
    pub fn stdout() -> Self {
        Self::with_writer(io::stdout())
    }

    pub fn with_writer(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    /// Never fails. Write errors are logged and dropped.
    pub fn export(&self, record_name: &str, lines: &[String]) {
        let Ok(mut out) = self.out.lock() else {
            warn!("Console output lock poisoned, dropping batch");
            return;
        };

        for line in lines {
            if let Err(e) = writeln!(out, "{} {}", record_name, line) {
                warn!(error = %e, "Failed writing to console");
                return;
            }
        }
        let _ = out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_prints_record_name_and_line() {
        let buf = Shared::default();
        let exporter = ConsoleExporter::with_writer(buf.clone());

        exporter.export("Login", &["1\t2".to_string(), "3\t4".to_string()]);

        let printed = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(printed, "Login 1\t2\nLogin 3\t4\n");
    }
}
