use loa_core::config::{AppConfig, LoadOptions};
use loa_db::connect_with_settings;
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
                error.to_string().replace('"', "\\\"")
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
            checks.push(check_database_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "db_connectivity",
                status: CheckStatus::Skipped,
                details: "skipped because configuration is invalid".to_string(),
            });
        }
    }

    let failed = checks.iter().filter(|check| check.status == CheckStatus::Fail).count();
    let overall_status = if failed == 0 { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if failed == 0 {
        "all checks passed".to_string()
    } else {
        format!("{failed} check(s) failed")
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "db_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let outcome = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| error.to_string())?;
        pool.close().await;
        Ok::<(), String>(())
    });

    match outcome {
        Ok(()) => DoctorCheck {
            name: "db_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected to `{}`", config.database.url),
        },
        Err(error) => DoctorCheck {
            name: "db_connectivity",
            status: CheckStatus::Fail,
            details: error,
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![format!("doctor: {}", report.summary)];
    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("  [{marker}] {}: {}", check.name, check.details));
    }
    lines.join("\n")
}
