use mystyle_core::config::{AppConfig, LoadOptions, SignalsConfig};
use mystyle_core::{SignalCacheRepository, SignalStatus};
use mystyle_db::{connect_from_config, SqlSignalCacheRepository};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_signal_sources(&config.signals));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["signal_sources", "database_connectivity", "signal_cache"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_signal_sources(signals: &SignalsConfig) -> DoctorCheck {
    let described = signals
        .keys()
        .into_iter()
        .filter_map(|key| {
            let source = signals.source(&key)?;
            let mode = match (source.enabled, source.endpoint.is_some()) {
                (false, _) => "disabled",
                (true, true) => "endpoint",
                (true, false) if key.as_str() == "trends" => "synthetic only",
                (true, false) => "built-in",
            };
            Some(format!("{key} ({mode}, ttl {}s)", source.ttl_secs))
        })
        .collect::<Vec<_>>();

    DoctorCheck { name: "signal_sources", status: CheckStatus::Pass, details: described.join(", ") }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                },
                DoctorCheck {
                    name: "signal_cache",
                    status: CheckStatus::Skipped,
                    details: "skipped because the runtime did not start".to_string(),
                },
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_from_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    DoctorCheck {
                        name: "signal_cache",
                        status: CheckStatus::Skipped,
                        details: "skipped because the database is unreachable".to_string(),
                    },
                ];
            }
        };

        let connectivity = DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        };
        let cache = match SqlSignalCacheRepository::new(pool.clone()).list().await {
            Ok(entries) => {
                let usable = entries
                    .iter()
                    .filter(|entry| matches!(entry.status(), SignalStatus::Fresh | SignalStatus::Stale))
                    .count();
                DoctorCheck {
                    name: "signal_cache",
                    status: CheckStatus::Pass,
                    details: format!(
                        "{usable}/{} configured signals have usable data",
                        config.signals.keys().len()
                    ),
                }
            }
            Err(error) => DoctorCheck {
                name: "signal_cache",
                status: CheckStatus::Fail,
                details: format!("signal cache unreadable (run `mystyle migrate`?): {error}"),
            },
        };

        pool.close().await;
        vec![connectivity, cache]
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
