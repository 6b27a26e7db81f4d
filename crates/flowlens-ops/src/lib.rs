//! Operational helpers: logging, the dashboard state store, JSON reports.

pub mod store;

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::Utc;
use flowlens_types::{config::OpsConfig, FlowlensError, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub use store::{ArchitectureState, DashboardState, DashboardStore};

pub fn ops_error(msg: impl Into<String>) -> FlowlensError {
    FlowlensError::Ops(msg.into())
}

/// Installs the global subscriber. Output goes to `ops.log_file` when set,
/// which keeps the terminal free while the dashboard is drawn.
pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = log_filter(&config.log_level)?;

    match &config.log_file {
        Some(path) => {
            let file = File::create(path)
                .map_err(|err| ops_error(format!("failed to open log file {path}: {err}")))?;
            fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|err| ops_error(format!("tracing init error: {err}")))?;
        }
        None => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|err| ops_error(format!("tracing init error: {err}")))?;
        }
    }
    Ok(())
}

/// Filter for `level`, or `info` when the directive does not parse.
fn log_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| ops_error(format!("failed to create log filter: {err}")))
}

pub fn ensure_report_dir(path: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    fs::create_dir_all(&dir)
        .map_err(|err| ops_error(format!("failed to create report dir: {err}")))?;
    info!("Report directory ready at {:?}", dir);
    Ok(dir)
}

/// Writes the state as pretty JSON to `flowlens-report-<timestamp>.json` in `dir`.
pub fn write_report(dir: &Path, state: &DashboardState) -> Result<PathBuf> {
    let name = format!(
        "flowlens-report-{}.json",
        Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
    );
    let path = dir.join(name);
    let body = serde_json::to_string_pretty(state)
        .map_err(|err| ops_error(format!("failed to serialize report: {err}")))?;
    fs::write(&path, body)
        .map_err(|err| ops_error(format!("failed to write report {}: {err}", path.display())))?;
    info!(path = %path.display(), "report written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowlens_types::{config::DashboardConfig, Architecture};

    #[tokio::test]
    async fn report_contains_both_architectures() {
        let dir = std::env::temp_dir().join("flowlens-report-test");
        let dir = ensure_report_dir(dir.to_str().expect("utf-8 temp dir")).expect("report dir");

        let store = DashboardStore::new(&DashboardConfig::default());
        store
            .update_metrics(Architecture::SyncFederated, |m| m.latency_ms = Some(120))
            .await;
        let path = write_report(&dir, &store.snapshot().await).expect("write report");

        let raw = fs::read_to_string(&path).expect("read report");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json report");
        assert_eq!(value["federated"]["metrics"]["latency_ms"], 120);
        assert_eq!(value["selected_person"], "person-001");
        assert!(value["projected"]["metrics"]["latency_ms"].is_null());
        fs::remove_file(&path).expect("cleanup report");
    }

    #[test]
    fn invalid_log_level_falls_back_to_info() {
        let filter = log_filter("flowlens=notalevel").expect("fallback filter");
        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    fn valid_log_level_is_kept() {
        let filter = log_filter("flowlens_orchestrator=debug").expect("filter");
        assert!(filter.to_string().contains("flowlens_orchestrator=debug"));
    }
}
