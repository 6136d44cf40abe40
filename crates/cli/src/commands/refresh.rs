use serde::Serialize;

use mystyle_core::{Engine, RefreshSource, SignalKey, SignalStatus};
use mystyle_server::fetchers::FetcherRegistry;

use crate::commands::{load_config, open_application, runtime, to_data, CommandResult};

#[derive(Debug, Serialize)]
pub struct RefreshLine {
    pub key: String,
    pub status: SignalStatus,
    /// `None` when the entry was still fresh and no fetch ran.
    pub source: Option<RefreshSource>,
}

type Failure = (&'static str, String, u8);

pub fn run(key: Option<&str>, force: bool) -> CommandResult {
    let config = match load_config("refresh") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("refresh") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let app = match open_application("refresh", config).await {
            Ok(app) => app,
            Err(failure) => return failure,
        };
        let result = refresh_keys(&app.engine, &app.fetchers, key, force).await;
        app.db_pool.close().await;

        match result {
            Ok(lines) => {
                let message = lines
                    .iter()
                    .map(|line| format!("{}={}", line.key, line.status.as_str()))
                    .collect::<Vec<_>>()
                    .join(", ");
                CommandResult::success_with_data("refresh", message, to_data(&lines))
            }
            Err((error_class, message, exit_code)) => {
                CommandResult::failure("refresh", error_class, message, exit_code)
            }
        }
    })
}

/// Runs one refresh per requested key, or per key with a fetcher when no key
/// is given.
pub async fn refresh_keys(
    engine: &Engine,
    fetchers: &FetcherRegistry,
    key: Option<&str>,
    force: bool,
) -> Result<Vec<RefreshLine>, Failure> {
    let keys = match key {
        Some(key) => {
            let key = SignalKey::new(key);
            if fetchers.get(&key).is_none() {
                return Err((
                    "unknown_signal",
                    format!("no enabled signal source is named `{key}`"),
                    2,
                ));
            }
            vec![key]
        }
        None => fetchers.keys().cloned().collect(),
    };

    let mut lines = Vec::with_capacity(keys.len());
    for key in keys {
        let Some(fetcher) = fetchers.get(&key) else {
            continue;
        };
        let report = engine
            .refresh_signal(&key, fetcher.as_ref(), force)
            .await
            .map_err(|error| ("signal_refresh", error.to_string(), 7u8))?;
        lines.push(RefreshLine {
            key: key.to_string(),
            status: report.entry.status(),
            source: report.source,
        });
    }
    Ok(lines)
}
