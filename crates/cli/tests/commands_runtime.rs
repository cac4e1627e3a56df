use std::env;
use std::sync::{Mutex, OnceLock};

use loa_cli::commands::{doctor, migrate, seed};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("LOA_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_with_invalid_database_url() {
    with_env(&[("LOA_DATABASE_URL", "postgres://elsewhere/loa")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_returns_deterministic_tier_summary() {
    with_env(&[("LOA_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected deterministic seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("finance/purchasing"));
        assert!(message.contains("hr/leave"));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    with_env(&[("LOA_DATABASE_URL", "sqlite::memory:")], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");

        let first_payload = parse_payload(&first.output);
        let second_payload = parse_payload(&second.output);
        assert_eq!(first_payload["message"], second_payload["message"]);
    });
}

#[test]
fn doctor_reports_pass_with_valid_env() {
    with_env(&[("LOA_DATABASE_URL", "sqlite::memory:")], || {
        let output = doctor::run(true);
        let payload: Value = serde_json::from_str(&output).expect("doctor json output");

        assert_eq!(payload["overall_status"], "pass");
        let checks = payload["checks"].as_array().expect("checks array");
        assert!(checks.iter().any(|check| check["name"] == "config_validation"));
        assert!(checks.iter().any(|check| check["name"] == "db_connectivity"));
    });
}

#[test]
fn doctor_reports_failure_and_skips_db_check_when_config_invalid() {
    with_env(&[("LOA_DATABASE_URL", "postgres://elsewhere/loa")], || {
        let output = doctor::run(true);
        let payload: Value = serde_json::from_str(&output).expect("doctor json output");

        assert_eq!(payload["overall_status"], "fail");
        let checks = payload["checks"].as_array().expect("checks array");
        let db_check = checks
            .iter()
            .find(|check| check["name"] == "db_connectivity")
            .expect("db connectivity check");
        assert_eq!(db_check["status"], "skipped");
    });
}

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const MANAGED_VARS: &[&str] = &[
    "LOA_DATABASE_URL",
    "LOA_DATABASE_MAX_CONNECTIONS",
    "LOA_DATABASE_TIMEOUT_SECS",
    "LOA_SERVER_ADMIN_TOKEN",
    "LOA_AUDIT_SIGNING_KEY",
    "LOA_LOG_LEVEL",
    "LOA_LOG_FORMAT",
];

fn with_env(vars: &[(&str, &str)], run: impl FnOnce()) {
    let lock = ENV_LOCK.get_or_init(|| Mutex::new(()));
    let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    for var in MANAGED_VARS {
        env::remove_var(var);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    run();

    for var in MANAGED_VARS {
        env::remove_var(var);
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be JSON")
}
