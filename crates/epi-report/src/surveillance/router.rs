use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Local, NaiveDateTime};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::domain::{CommuneId, EstablishmentId, LaboratoryId, UserId};
use super::export::EXPORT_FILE_NAME;
use super::intake::{IntakeError, IntakeOutcome, LabResultIntake, LabResultMessage};
use super::report::views::CaseListEntry;
use super::report::{ReportError, SurveillanceReports};
use super::scope::{OperatorScope, SurveillanceScope};
use super::store::SurveillanceStore;
use super::submission::{
    pending_batch, submission_laboratory, submission_window, GatewayConnector, GatewayError,
    HttpMinistryConnector, MissingDemographicsPolicy, Notice, SubmissionPipeline,
};
use super::window::{parse_day, ReportWindow};
use crate::error::AppError;

const NO_DATA_NOTICE: &str = "No existen casos positivos o no hay casos con dirección.";

/// Source of "now" for window defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(NaiveDateTime),
}

impl Clock {
    pub fn now(&self) -> NaiveDateTime {
        match self {
            Clock::System => Local::now().naive_local(),
            Clock::Fixed(at) => *at,
        }
    }
}

/// Ministry submission wiring; absent when no web service is configured.
pub struct MinistryLink<C> {
    connector: Arc<C>,
    window_start: NaiveDateTime,
    policy: MissingDemographicsPolicy,
    cancel: Arc<AtomicBool>,
}

impl<C> MinistryLink<C> {
    pub fn new(connector: C, window_start: NaiveDateTime, policy: MissingDemographicsPolicy) -> Self {
        Self {
            connector: Arc::new(connector),
            window_start,
            policy,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Shared state behind every surveillance route.
pub struct SurveillanceState<S, C = HttpMinistryConnector> {
    store: Arc<S>,
    reports: SurveillanceReports<S>,
    intake: LabResultIntake<S>,
    ministry: Option<MinistryLink<C>>,
    clock: Clock,
}

impl<S, C> SurveillanceState<S, C>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    pub fn new(store: Arc<S>, scope: SurveillanceScope) -> Self {
        Self {
            reports: SurveillanceReports::new(Arc::clone(&store), scope),
            intake: LabResultIntake::new(Arc::clone(&store)),
            store,
            ministry: None,
            clock: Clock::System,
        }
    }

    #[must_use]
    pub fn with_ministry(mut self, link: MinistryLink<C>) -> Self {
        self.ministry = Some(link);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn reports(&self) -> &SurveillanceReports<S> {
        &self.reports
    }
}

/// Report, export, lab-interface and ministry routes.
pub fn surveillance_router<S, C>(state: Arc<SurveillanceState<S, C>>) -> Router
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    Router::new()
        .route("/api/v1/reports/positives", get(positives_handler::<S, C>))
        .route("/api/v1/reports/positives/own", get(positives_own_handler::<S, C>))
        .route("/api/v1/reports/positives/range", get(positives_range_handler::<S, C>))
        .route("/api/v1/reports/positives/count", get(count_positives_handler::<S, C>))
        .route("/api/v1/reports/summary", get(summary_handler::<S, C>))
        .route("/api/v1/reports/hospitalized", get(hospitalized_handler::<S, C>))
        .route("/api/v1/reports/deceased", get(deceased_handler::<S, C>))
        .route("/api/v1/reports/pending/range", get(pending_range_handler::<S, C>))
        .route("/api/v1/reports/pending/stale", get(stale_pending_handler::<S, C>))
        .route("/api/v1/reports/without-reception", get(without_reception_handler::<S, C>))
        .route("/api/v1/reports/gestants", get(gestants_handler::<S, C>))
        .route("/api/v1/reports/by-commune", get(by_commune_handler::<S, C>))
        .route("/api/v1/reports/own", get(own_cases_handler::<S, C>))
        .route(
            "/api/v1/reports/laboratories/:laboratory_id/results",
            get(laboratory_results_handler::<S, C>),
        )
        .route(
            "/api/v1/reports/laboratories/:laboratory_id/receptions",
            get(laboratory_receptions_handler::<S, C>),
        )
        .route(
            "/api/v1/reports/laboratories/:laboratory_id/cases",
            get(laboratory_cases_handler::<S, C>),
        )
        .route("/api/v1/reports/exams-with-result", get(exams_with_result_handler::<S, C>))
        .route("/api/v1/reports/chart", get(case_chart_handler::<S, C>))
        .route("/api/v1/reports/tracing/communes", get(tracing_communes_handler::<S, C>))
        .route("/api/v1/reports/tracing/index", get(index_tracing_handler::<S, C>))
        .route(
            "/api/v1/reports/tracing/index/by-patient",
            get(index_tracing_by_patient_handler::<S, C>),
        )
        .route("/api/v1/reports/tracing/licences", get(licences_handler::<S, C>))
        .route("/api/v1/reports/expert-system", get(expert_feed_handler::<S, C>))
        .route("/api/v1/exports/case-tracing", get(case_tracing_export_handler::<S, C>))
        .route("/api/v1/ministry/pending", get(ministry_pending_handler::<S, C>))
        .route("/api/v1/ministry/submissions", post(ministry_submission_handler::<S, C>))
        .route(
            "/api/v1/ministry/submissions/cancel",
            post(ministry_cancel_handler::<S, C>),
        )
        .route("/api/v1/lab/hl7", post(lab_result_handler::<S, C>))
        .with_state(state)
}

/// Operator identity and assignments, read from request headers.
///
/// Missing headers yield an empty scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Operator(pub OperatorScope);

pub const OPERATOR_ID_HEADER: &str = "x-operator-id";
pub const OPERATOR_COMMUNES_HEADER: &str = "x-operator-communes";
pub const OPERATOR_ESTABLISHMENTS_HEADER: &str = "x-operator-establishments";

#[async_trait]
impl<St> FromRequestParts<St> for Operator
where
    St: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let user_id = header_ids::<u64>(headers, OPERATOR_ID_HEADER)?
            .into_iter()
            .next()
            .map(UserId);
        let communes = header_ids::<u32>(headers, OPERATOR_COMMUNES_HEADER)?
            .into_iter()
            .map(CommuneId)
            .collect();
        let establishments = header_ids::<u32>(headers, OPERATOR_ESTABLISHMENTS_HEADER)?
            .into_iter()
            .map(EstablishmentId)
            .collect();

        Ok(Operator(OperatorScope {
            user_id,
            communes,
            establishments,
        }))
    }
}

fn header_ids<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Result<Vec<T>, AppError> {
    let Some(value) = headers.get(name) else {
        return Ok(Vec::new());
    };
    let raw = value
        .to_str()
        .map_err(|_| AppError::BadRequest(format!("{name} must be ASCII")))?;
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<T>()
                .map_err(|_| AppError::BadRequest(format!("{name} holds a non-numeric id `{part}`")))
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RangeQuery {
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    commune: Option<String>,
}

impl RangeQuery {
    fn day_bounds(&self, now: NaiveDateTime) -> ReportWindow {
        ReportWindow::day_bounds(self.from.as_deref(), self.to.as_deref(), now)
    }

    fn shift(&self, now: NaiveDateTime) -> ReportWindow {
        ReportWindow::shift_from_query(self.from.as_deref(), self.to.as_deref(), now)
    }

    /// Empty or non-numeric selections mean "every commune".
    fn commune(&self) -> Option<CommuneId> {
        lenient_id(self.commune.as_deref()).map(CommuneId)
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct HospitalizedQuery {
    #[serde(default)]
    own: bool,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OwnCasesQuery {
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    laboratory_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DateQuery {
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ExportQuery {
    #[serde(default)]
    unregistered: bool,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LaboratoryQuery {
    #[serde(default)]
    laboratory_id: Option<String>,
}

impl LaboratoryQuery {
    fn laboratory(&self) -> Option<LaboratoryId> {
        lenient_id(self.laboratory_id.as_deref()).map(LaboratoryId)
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct NotificationQuery {
    #[serde(default)]
    date_from: Option<String>,
    #[serde(default)]
    date_to: Option<String>,
}

impl NotificationQuery {
    /// Both bounds are needed; otherwise the whole of today.
    fn window(&self, now: NaiveDateTime) -> ReportWindow {
        let from = self.date_from.as_deref().and_then(parse_day);
        let to = self.date_to.as_deref().and_then(parse_day);
        match (from, to) {
            (Some(from), Some(to)) => ReportWindow::new(
                ReportWindow::single_day(from).from,
                ReportWindow::single_day(to).to,
            ),
            _ => ReportWindow::single_day(now.date()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PatientLookupQuery {
    #[serde(default)]
    run: Option<String>,
}

fn lenient_id(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
}

fn no_data_redirect() -> Response {
    let notice = Notice::info(NO_DATA_NOTICE);
    (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, "/")],
        Json(notice),
    )
        .into_response()
}

fn dashboard<T: serde::Serialize>(result: Result<T, ReportError>) -> Result<Response, AppError> {
    match result {
        Ok(report) => Ok(Json(report).into_response()),
        Err(ReportError::NoPositiveCases) => Ok(no_data_redirect()),
        Err(err) => Err(err.into()),
    }
}

pub(crate) async fn positives_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    dashboard(state.reports.positives(state.clock.now()))
}

pub(crate) async fn positives_own_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Operator(operator): Operator,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    dashboard(state.reports.positives_own(&operator, state.clock.now()))
}

pub(crate) async fn summary_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let sampled = query
        .from
        .as_deref()
        .and_then(parse_day)
        .map(|_| query.day_bounds(state.clock.now()));
    dashboard(state.reports.summary(sampled))
}

pub(crate) async fn hospitalized_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Operator(operator): Operator,
    Query(query): Query<HospitalizedQuery>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let scope = query.own.then_some(&operator);
    let today = state.clock.now().date();
    Ok(Json(state.reports.hospitalized(scope, today)?).into_response())
}

pub(crate) async fn deceased_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let today = state.clock.now().date();
    Ok(Json(state.reports.deceased(today)?).into_response())
}

pub(crate) async fn positives_range_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let window = query.day_bounds(state.clock.now());
    Ok(Json(state.reports.positives_by_range(window, query.commune())?).into_response())
}

pub(crate) async fn pending_range_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let window = query.day_bounds(state.clock.now());
    Ok(Json(state.reports.pending_by_range(window, query.commune())?).into_response())
}

pub(crate) async fn stale_pending_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    Ok(Json(state.reports.pending_more_than_two_days(state.clock.now())?).into_response())
}

pub(crate) async fn without_reception_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    Ok(Json(state.reports.without_reception()?).into_response())
}

pub(crate) async fn gestants_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let today = state.clock.now().date();
    Ok(Json(state.reports.gestants(today)?).into_response())
}

pub(crate) async fn by_commune_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Operator(operator): Operator,
    Query(query): Query<RangeQuery>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let window = query.day_bounds(state.clock.now());
    let cases = state
        .reports
        .cases_by_commune(&operator, window, query.commune())?;
    Ok(Json(cases).into_response())
}

pub(crate) async fn own_cases_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Operator(operator): Operator,
    Query(query): Query<OwnCasesQuery>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let window = ReportWindow::shift_from_query(
        query.from.as_deref(),
        query.to.as_deref(),
        state.clock.now(),
    );
    let laboratory = lenient_id(query.laboratory_id.as_deref())
        .filter(|id| *id != 0)
        .map(LaboratoryId);
    Ok(Json(state.reports.own_cases(&operator, window, laboratory)?).into_response())
}

pub(crate) async fn laboratory_results_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Path(laboratory_id): Path<u32>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let window = query.shift(state.clock.now());
    let cases = state
        .reports
        .laboratory_results(LaboratoryId(laboratory_id), window)?;
    Ok(Json(cases).into_response())
}

pub(crate) async fn laboratory_receptions_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Path(laboratory_id): Path<u32>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let window = query.shift(state.clock.now());
    let cases = state
        .reports
        .laboratory_receptions(LaboratoryId(laboratory_id), window)?;
    Ok(Json(cases).into_response())
}

pub(crate) async fn laboratory_cases_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Path(laboratory_id): Path<u32>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let cases = state.reports.laboratory_cases(LaboratoryId(laboratory_id))?;
    Ok(Json(cases).into_response())
}

pub(crate) async fn exams_with_result_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    Ok(Json(state.reports.exams_with_result(state.clock.now())?).into_response())
}

pub(crate) async fn case_chart_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let window = ReportWindow::month_from_query(
        query.from.as_deref(),
        query.to.as_deref(),
        state.clock.now(),
    );
    Ok(Json(state.reports.case_chart(window)?).into_response())
}

pub(crate) async fn tracing_communes_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Query(query): Query<DateQuery>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let date = query
        .date
        .as_deref()
        .and_then(parse_day)
        .unwrap_or_else(|| state.clock.now().date());
    Ok(Json(state.reports.tracing_by_communes(date)?).into_response())
}

pub(crate) async fn index_tracing_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Operator(operator): Operator,
    Query(query): Query<NotificationQuery>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let window = query.window(state.clock.now());
    Ok(Json(state.reports.index_tracings(&operator, window)?).into_response())
}

/// Without a `run` the list is empty rather than an error.
pub(crate) async fn index_tracing_by_patient_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Operator(operator): Operator,
    Query(query): Query<PatientLookupQuery>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let run = query.run.as_deref().unwrap_or_default();
    Ok(Json(state.reports.index_tracing_by_patient(&operator, run)?).into_response())
}

pub(crate) async fn licences_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Operator(operator): Operator,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    Ok(Json(state.reports.licences_required(&operator)?).into_response())
}

pub(crate) async fn count_positives_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let positives = state.reports.count_positives()?;
    Ok(Json(json!({ "positives": positives })).into_response())
}

pub(crate) async fn expert_feed_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    Ok(Json(state.reports.expert_feed(state.clock.now())?).into_response())
}

pub(crate) async fn case_tracing_export_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let today = state.clock.now().date();
    let table = state.reports.case_tracing(today, query.unregistered)?;
    let bytes = table.to_bytes()?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime::TEXT_CSV_UTF_8.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={EXPORT_FILE_NAME}"),
            ),
            (
                header::CACHE_CONTROL,
                "no-cache, must-revalidate".to_string(),
            ),
        ],
        bytes,
    )
        .into_response())
}

fn ministry_link<C>(ministry: Option<&MinistryLink<C>>) -> Result<&MinistryLink<C>, AppError> {
    ministry.ok_or_else(|| AppError::Unavailable("ministry web service is not configured".to_string()))
}

pub(crate) async fn ministry_pending_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Query(query): Query<LaboratoryQuery>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let link = ministry_link(state.ministry.as_ref())?;
    let laboratory = submission_laboratory(state.store.as_ref(), query.laboratory())?;
    let window = submission_window(link.window_start, state.clock.now());
    let cases: Vec<CaseListEntry> = pending_batch(state.store.as_ref(), laboratory, window)?
        .iter()
        .map(|pending| CaseListEntry::new(&pending.patient, &pending.case))
        .collect();
    Ok(Json(cases).into_response())
}

pub(crate) async fn ministry_submission_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Query(query): Query<LaboratoryQuery>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let link = ministry_link(state.ministry.as_ref())?;
    let laboratory = submission_laboratory(state.store.as_ref(), query.laboratory())?;
    let window = submission_window(link.window_start, state.clock.now());
    let batch = pending_batch(state.store.as_ref(), laboratory, window)?;

    link.cancel.store(false, Ordering::SeqCst);
    let pipeline = SubmissionPipeline::with_cancellation(
        Arc::clone(&state.store),
        link.policy,
        Arc::clone(&link.cancel),
    );
    let connector = Arc::clone(&link.connector);

    let report = tokio::task::spawn_blocking(move || {
        let gateway = connector.connect()?;
        Ok::<_, GatewayError>(pipeline.run(&gateway, &batch))
    })
    .await
    .map_err(|err| AppError::Server(axum::Error::new(err)))??;

    let status = if report.failure.is_some() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::OK
    };
    let payload = json!({
        "notice": report.notice(),
        "report": report,
    });
    Ok((status, Json(payload)).into_response())
}

pub(crate) async fn ministry_cancel_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let link = ministry_link(state.ministry.as_ref())?;
    link.cancel.store(true, Ordering::SeqCst);
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "cancelling" }))).into_response())
}

/// Always answers 200 for data problems; only store failures surface as errors.
pub(crate) async fn lab_result_handler<S, C>(
    State(state): State<Arc<SurveillanceState<S, C>>>,
    Json(message): Json<LabResultMessage>,
) -> Result<Response, AppError>
where
    S: SurveillanceStore + 'static,
    C: GatewayConnector,
{
    let payload = match state.intake.ingest(&message) {
        Ok(IntakeOutcome::Recorded { case_id, result, .. }) => {
            json!({ "status": "recorded", "case_id": case_id, "result": result })
        }
        Ok(IntakeOutcome::Unmatched) => json!({ "status": "unmatched" }),
        Ok(IntakeOutcome::UnknownCode(code)) => json!({ "status": "ignored", "code": code }),
        Err(IntakeError::InvalidTimestamp { field, value }) => {
            warn!(field, %value, "lab interface message dropped");
            json!({ "status": "ignored", "field": field })
        }
        Err(err) => return Err(err.into()),
    };
    Ok((StatusCode::OK, Json(payload)).into_response())
}
