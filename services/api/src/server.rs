use crate::cli::ServeArgs;
use crate::infra::{load_store, ministry_link, AppState};
use crate::routes::with_surveillance_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use epi_report::config::AppConfig;
use epi_report::error::AppError;
use epi_report::surveillance::{InMemoryStore, SurveillanceState};
use epi_report::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = load_store(config.data_path.as_deref())?;
    let mut state: SurveillanceState<InMemoryStore> =
        SurveillanceState::new(store, config.surveillance.clone());
    match ministry_link(&config.ministry) {
        Some(link) => state = state.with_ministry(link),
        None => warn!("MINISTRY_WS_URL not set; ministry submission disabled"),
    }

    let app = with_surveillance_routes(Arc::new(state))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        communes = config.surveillance.communes.len(),
        "epidemiological reporting service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
