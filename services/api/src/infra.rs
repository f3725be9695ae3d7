use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use epi_report::config::MinistryConfig;
use epi_report::error::AppError;
use epi_report::surveillance::submission::HttpMinistryConnector;
use epi_report::surveillance::{InMemoryStore, MinistryLink, SurveillanceSnapshot};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Opens the JSON snapshot as a file-backed store, so lab results and
/// submission ids are written back to it. Without a path the store starts
/// empty and lives in memory only.
pub(crate) fn load_store(path: Option<&Path>) -> Result<Arc<InMemoryStore>, AppError> {
    let Some(path) = path else {
        return Ok(Arc::new(InMemoryStore::new(SurveillanceSnapshot::default())));
    };
    let store = InMemoryStore::open(path)?;
    let snapshot = store.snapshot();
    info!(
        path = %path.display(),
        patients = snapshot.patients.len(),
        communes = snapshot.communes.len(),
        "surveillance snapshot loaded"
    );
    Ok(Arc::new(store))
}

/// `None` leaves ministry submission disabled.
pub(crate) fn ministry_link(config: &MinistryConfig) -> Option<MinistryLink<HttpMinistryConnector>> {
    let base_url = config.base_url.as_deref()?;
    Some(MinistryLink::new(
        HttpMinistryConnector::new(base_url, config.timeout),
        config.window_start,
        config.missing_demographics,
    ))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Start of `today` when given, the local wall clock otherwise.
pub(crate) fn reference_time(today: Option<NaiveDate>) -> NaiveDateTime {
    today
        .map(|day| day.and_time(NaiveTime::MIN))
        .unwrap_or_else(|| Local::now().naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ministry(base_url: Option<&str>) -> MinistryConfig {
        MinistryConfig {
            base_url: base_url.map(str::to_string),
            timeout: Duration::from_secs(5),
            window_start: NaiveDate::from_ymd_opt(2020, 9, 1)
                .and_then(|day| day.and_hms_opt(0, 0, 0))
                .expect("valid timestamp"),
            missing_demographics: Default::default(),
        }
    }

    #[test]
    fn parse_date_reports_the_raw_value() {
        assert_eq!(
            parse_date(" 2020-07-15 "),
            Ok(NaiveDate::from_ymd_opt(2020, 7, 15).expect("valid date"))
        );
        let err = parse_date("15/07/2020").expect_err("wrong format rejected");
        assert!(err.contains("15/07/2020"));
    }

    #[test]
    fn ministry_link_requires_a_base_url() {
        assert!(ministry_link(&ministry(None)).is_none());
        assert!(ministry_link(&ministry(Some("https://ws.example.cl/api"))).is_some());
    }

    #[test]
    fn missing_snapshot_path_starts_empty() {
        let store = load_store(None).expect("empty store");
        assert!(store.snapshot().patients.is_empty());
        assert!(store.backing_path().is_none());
    }

    #[test]
    fn snapshot_path_opens_a_file_backed_store() {
        let path = std::env::temp_dir().join(format!("epi-api-load-{}.json", std::process::id()));
        SurveillanceSnapshot::default()
            .write_to_path(&path)
            .expect("seed snapshot");

        let store = load_store(Some(path.as_path())).expect("store opened");
        assert_eq!(store.backing_path(), Some(path.as_path()));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unreadable_snapshot_is_a_store_error() {
        let path = std::env::temp_dir().join("epi-api-missing-snapshot.json");
        let err = load_store(Some(path.as_path())).expect_err("missing file rejected");
        assert!(matches!(err, AppError::Store(_)));
    }
}
