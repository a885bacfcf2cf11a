// SPDX-License-Identifier: Apache-2.0

//! Server list file: one `operator server port` entry per line.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tracing::warn;

use crate::receivers::gamelog::{Result, ServerConfig};

/// Re-reads of the server list happen no more often than this
pub const MIN_RELOAD_INTERVAL: Duration = Duration::from_secs(60);

pub type ServerList = BTreeMap<(i64, i64), ServerConfig>;

/// Clamp a configured reload interval to the minimum
pub fn reload_interval(configured: Duration) -> Duration {
    configured.max(MIN_RELOAD_INTERVAL)
}

pub async fn load_server_list(path: &Path) -> Result<ServerList> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(parse_server_list(&content))
}

/// Blank lines and `#` comments are ignored. Malformed entries are skipped
/// with a warning. A later entry for the same `(operator, server)` wins.
pub fn parse_server_list(content: &str) -> ServerList {
    let mut servers = ServerList::new();

    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            warn!(line = n + 1, entry = line, "Server list entry needs operator, server and port");
            continue;
        }

        let (Ok(operator), Ok(server)) = (fields[0].parse::<i64>(), fields[1].parse::<i64>())
        else {
            warn!(line = n + 1, entry = line, "Server list entry has a non-numeric operator or server");
            continue;
        };

        servers.insert(
            (operator, server),
            ServerConfig {
                operator,
                server,
                port: fields[2].to_string(),
            },
        );
    }

    servers
}
