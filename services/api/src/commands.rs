use crate::infra::{load_store, parse_date, reference_time};
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::Args;
use epi_report::config::AppConfig;
use epi_report::error::AppError;
use epi_report::surveillance::domain::LaboratoryId;
use epi_report::surveillance::submission::{
    pending_batch, submission_laboratory, submission_window, GatewayConnector, GatewayError,
    HttpMinistryConnector, PendingSubmission, SubmissionPipeline,
};
use epi_report::surveillance::{
    InMemoryStore, ReportError, StoreError, SurveillanceReports, EXPORT_FILE_NAME,
};
use epi_report::telemetry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Args, Debug)]
pub(crate) struct ReportArgs {
    /// JSON snapshot to report on (defaults to SURVEILLANCE_DATA)
    #[arg(long)]
    pub(crate) data: Option<PathBuf>,
    /// Evaluation date for ages and windows (defaults to now)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct ExportArgs {
    /// JSON snapshot to export (defaults to SURVEILLANCE_DATA)
    #[arg(long)]
    pub(crate) data: Option<PathBuf>,
    /// Destination file
    #[arg(long, default_value = EXPORT_FILE_NAME)]
    pub(crate) output: PathBuf,
    /// Append positive patients registered without an address
    #[arg(long)]
    pub(crate) unregistered: bool,
    /// Evaluation date for patient ages (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct SubmitArgs {
    /// JSON snapshot holding the cases; submission ids are written back to it
    #[arg(long)]
    pub(crate) data: Option<PathBuf>,
    /// Laboratory whose results are uploaded (defaults to laboratory 1)
    #[arg(long)]
    pub(crate) laboratory: Option<u32>,
    /// List the pending batch without calling the web service
    #[arg(long)]
    pub(crate) dry_run: bool,
}

fn reports(data: Option<PathBuf>) -> Result<SurveillanceReports<InMemoryStore>, AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    let data = data.or(config.data_path);
    let store = load_store(data.as_deref())?;
    Ok(SurveillanceReports::new(store, config.surveillance))
}

pub(crate) fn run_positives_report(args: ReportArgs) -> Result<(), AppError> {
    let reports = reports(args.data)?;
    match reports.positives(reference_time(args.today)) {
        Ok(report) => {
            let json = serde_json::to_string_pretty(&report).map_err(StoreError::from)?;
            println!("{json}");
            Ok(())
        }
        Err(ReportError::NoPositiveCases) => {
            println!("No existen casos positivos o no hay casos con dirección.");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

pub(crate) fn run_export(args: ExportArgs) -> Result<(), AppError> {
    let reports = reports(args.data)?;
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let table = reports.case_tracing(today, args.unregistered)?;
    table.write_to(std::fs::File::create(&args.output)?)?;

    println!(
        "Wrote {} patients to {}",
        table.rows.len(),
        args.output.display()
    );
    Ok(())
}

/// Same laboratory gate as the HTTP submission route.
fn submission_batch(
    store: &InMemoryStore,
    laboratory: Option<u32>,
    window_start: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<(LaboratoryId, Vec<PendingSubmission>), AppError> {
    let laboratory = submission_laboratory(store, laboratory.map(LaboratoryId))?;
    let batch = pending_batch(store, laboratory, submission_window(window_start, now))?;
    Ok((laboratory, batch))
}

pub(crate) async fn run_submit(args: SubmitArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let data = args.data.or(config.data_path.clone());
    let store = load_store(data.as_deref())?;
    let (laboratory, batch) = submission_batch(
        store.as_ref(),
        args.laboratory,
        config.ministry.window_start,
        Local::now().naive_local(),
    )?;

    println!(
        "{} resulted cases pending for laboratory {}",
        batch.len(),
        laboratory
    );
    if args.dry_run {
        for pending in &batch {
            println!(
                "  muestra {} - {} ({})",
                pending.case.id,
                pending.patient.full_name(),
                pending.case.pcr_sars_cov_2.label()
            );
        }
        return Ok(());
    }

    let base_url = config.ministry.base_url.as_deref().ok_or_else(|| {
        AppError::Unavailable("MINISTRY_WS_URL is not configured".to_string())
    })?;
    let connector = HttpMinistryConnector::new(base_url, config.ministry.timeout);
    let pipeline =
        SubmissionPipeline::new(Arc::clone(&store), config.ministry.missing_demographics);

    // The blocking client must not run on the async executor.
    let report = tokio::task::spawn_blocking(move || {
        let gateway = connector.connect()?;
        Ok::<_, GatewayError>(pipeline.run(&gateway, &batch))
    })
    .await
    .map_err(|err| AppError::Server(axum::Error::new(err)))??;

    if let Some(path) = store.backing_path() {
        info!(
            path = %path.display(),
            submitted = report.submitted.len(),
            "submission ids written back to snapshot"
        );
    }

    match &report.failure {
        Some(failure) => Err(AppError::BadRequest(failure.notice().message)),
        None => {
            println!("{}", report.notice().message);
            Ok(())
        }
    }
}
