use serde::Serialize;

use mystyle_core::{CacheEntry, SignalStatus};

use crate::commands::{load_config, open_application, runtime, to_data, CommandResult};

#[derive(Debug, Serialize)]
pub(crate) struct SignalLine {
    pub key: String,
    pub status: SignalStatus,
    pub ok: bool,
    pub stale: bool,
    pub fetched_at: Option<String>,
    pub error: Option<String>,
}

impl From<&CacheEntry> for SignalLine {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.to_string(),
            status: entry.status(),
            ok: entry.ok,
            stale: entry.stale,
            fetched_at: entry.fetched_at.map(|at| at.to_rfc3339()),
            error: entry.error.clone(),
        }
    }
}

pub(crate) fn summarize(lines: &[SignalLine]) -> String {
    lines
        .iter()
        .map(|line| format!("{}={}", line.key, line.status.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn run() -> CommandResult {
    let config = match load_config("signals") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("signals") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let app = match open_application("signals", config).await {
            Ok(app) => app,
            Err(failure) => return failure,
        };
        let entries = app.engine.list_cached_signals().await;
        app.db_pool.close().await;

        let lines = entries.iter().map(SignalLine::from).collect::<Vec<_>>();
        CommandResult::success_with_data("signals", summarize(&lines), to_data(&lines))
    })
}
