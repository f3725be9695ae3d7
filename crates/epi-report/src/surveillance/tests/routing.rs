use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::surveillance::domain::Patient;
use crate::surveillance::router::{
    surveillance_router, Clock, MinistryLink, SurveillanceState, OPERATOR_COMMUNES_HEADER,
    OPERATOR_ESTABLISHMENTS_HEADER,
};
use crate::surveillance::store::InMemoryStore;
use crate::surveillance::submission::MissingDemographicsPolicy;

type TestState = SurveillanceState<InMemoryStore, ScriptedConnector>;

fn state(patients: Vec<Patient>, connector: Option<ScriptedConnector>) -> Arc<TestState> {
    let mut state = TestState::new(store(patients), scope()).with_clock(Clock::Fixed(now()));
    if let Some(connector) = connector {
        state = state.with_ministry(MinistryLink::new(
            connector,
            at(2020, 7, 1, 0, 0),
            MissingDemographicsPolicy::Abort,
        ));
    }
    Arc::new(state)
}

fn router(patients: Vec<Patient>) -> axum::Router {
    surveillance_router(state(patients, None))
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request builds")
}

fn post(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).expect("request builds")
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request builds")
}

fn without_unregistered() -> Vec<Patient> {
    outbreak()
        .into_iter()
        .filter(|patient| patient.demographic.is_some())
        .collect()
}

#[tokio::test]
async fn positives_handler_redirects_home_without_data() {
    let response = crate::surveillance::router::positives_handler::<
        InMemoryStore,
        ScriptedConnector,
    >(State(state(Vec::new(), None)))
    .await
    .expect("handler answers");

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok()),
        Some("/")
    );
    let payload = read_json_body(response).await;
    assert_eq!(payload["level"], json!("info"));
    assert_eq!(
        payload["message"],
        json!("No existen casos positivos o no hay casos con dirección.")
    );
}

#[tokio::test]
async fn positives_route_returns_dashboard() {
    let response = router(outbreak())
        .oneshot(get("/api/v1/reports/positives"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["exams"]["positive"], json!(3));
    assert_eq!(payload["cases_by_commune"]["unregistered"]["total"], json!(1));
    assert_eq!(payload["evolution"]["2020-07-03"], json!(2));
}

#[tokio::test]
async fn count_route_reports_positive_patients() {
    let response = router(outbreak())
        .oneshot(get("/api/v1/reports/positives/count"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await, json!({ "positives": 3 }));
}

#[tokio::test]
async fn summary_route_accepts_a_sample_window() {
    let response = router(outbreak())
        .oneshot(get("/api/v1/reports/summary?from=2020-07-03&to=2020-07-03"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["results"][0]["total"], json!(2));
}

#[tokio::test]
async fn by_commune_route_uses_operator_headers() {
    let request = Request::get("/api/v1/reports/by-commune?from=2020-07-01&to=2020-07-15")
        .header(OPERATOR_COMMUNES_HEADER, "1, 9")
        .body(Body::empty())
        .expect("request builds");

    let response = router(outbreak())
        .oneshot(request)
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    let cases = payload.as_array().expect("case list");
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0]["case_id"], json!(101));
}

#[tokio::test]
async fn malformed_operator_header_is_a_bad_request() {
    let request = Request::get("/api/v1/reports/by-commune")
        .header(OPERATOR_COMMUNES_HEADER, "iquique")
        .body(Body::empty())
        .expect("request builds");

    let response = router(outbreak())
        .oneshot(request)
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tracing_route_defaults_to_today_and_reads_date() {
    let response = router(outbreak())
        .oneshot(get("/api/v1/reports/tracing/communes?date=2020-07-04"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload[0]["commune"], json!("Alto Hospicio"));
    assert_eq!(payload[0]["positives"], json!(1));
}

fn from_clinic(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header(OPERATOR_ESTABLISHMENTS_HEADER, "5")
        .body(Body::empty())
        .expect("request builds")
}

async fn patient_ids(app: axum::Router, request: Request<Body>) -> Vec<u64> {
    let response = app.oneshot(request).await.expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    read_json_body(response)
        .await
        .as_array()
        .expect("patient list")
        .iter()
        .filter_map(|entry| entry["patient_id"].as_u64())
        .collect()
}

#[tokio::test]
async fn index_tracing_route_needs_both_notification_bounds() {
    let ranged = patient_ids(
        router(traced_outbreak()),
        from_clinic("/api/v1/reports/tracing/index?date_from=2020-07-10&date_to=2020-07-15"),
    )
    .await;
    assert_eq!(ranged, vec![2, 1]);

    let today = patient_ids(
        router(traced_outbreak()),
        from_clinic("/api/v1/reports/tracing/index"),
    )
    .await;
    assert_eq!(today, vec![1]);

    let half_open = patient_ids(
        router(traced_outbreak()),
        from_clinic("/api/v1/reports/tracing/index?date_from=2020-07-10"),
    )
    .await;
    assert_eq!(half_open, vec![1]);
}

#[tokio::test]
async fn index_tracing_lookup_route_reads_run() {
    let found = patient_ids(
        router(traced_outbreak()),
        from_clinic("/api/v1/reports/tracing/index/by-patient?run=10000002"),
    )
    .await;
    assert_eq!(found, vec![2]);

    let without_run = patient_ids(
        router(traced_outbreak()),
        from_clinic("/api/v1/reports/tracing/index/by-patient"),
    )
    .await;
    assert!(without_run.is_empty());
}

#[tokio::test]
async fn licences_route_scopes_to_operator_establishments() {
    let clinic = patient_ids(
        router(traced_outbreak()),
        from_clinic("/api/v1/reports/tracing/licences"),
    )
    .await;
    assert_eq!(clinic, vec![4, 1]);

    let anonymous = patient_ids(
        router(traced_outbreak()),
        get("/api/v1/reports/tracing/licences"),
    )
    .await;
    assert!(anonymous.is_empty());
}

#[tokio::test]
async fn laboratory_cases_route_lists_newest_first() {
    let response = router(outbreak())
        .oneshot(get("/api/v1/reports/laboratories/1/cases"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    let ids: Vec<_> = payload
        .as_array()
        .expect("case list")
        .iter()
        .filter_map(|entry| entry["case_id"].as_u64())
        .collect();
    assert_eq!(ids, vec![105, 104, 103, 102, 101]);
}

#[tokio::test]
async fn exams_with_result_route_lists_recent_files() {
    let mut patients = outbreak();
    patients[0].suspect_cases[0].file = true;
    patients[0].suspect_cases[0].pcr_sars_cov_2_at = Some(at(2020, 7, 15, 7, 0));

    let response = router(patients)
        .oneshot(get("/api/v1/reports/exams-with-result"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.as_array().map(Vec::len), Some(1));
    assert_eq!(payload[0]["case_id"], json!(101));
}

#[tokio::test]
async fn export_route_streams_csv_attachment() {
    let response = router(outbreak())
        .oneshot(get("/api/v1/exports/case-tracing?unregistered=true"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        Some("text/csv; charset=utf-8")
    );
    assert_eq!(
        headers
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok()),
        Some("attachment; filename=seguimiento.csv")
    );

    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    assert!(body.starts_with(b"\xEF\xBB\xBF"));
    let text = String::from_utf8_lossy(&body[3..]);
    assert_eq!(text.lines().count(), 4);
}

#[tokio::test]
async fn submission_without_ministry_service_is_unavailable() {
    let response = router(outbreak())
        .oneshot(post("/api/v1/ministry/submissions"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn submission_requires_an_enabled_laboratory() {
    let app = surveillance_router(state(outbreak(), Some(ScriptedConnector::default())));

    let response = app
        .oneshot(post("/api/v1/ministry/submissions?laboratory_id=2"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submission_route_uploads_every_pending_case() {
    let connector = ScriptedConnector::default();
    let gateway = connector.gateway.clone();
    let app = surveillance_router(state(without_unregistered(), Some(connector)));

    let preview = app
        .clone()
        .oneshot(get("/api/v1/ministry/pending"))
        .await
        .expect("route executes");
    assert_eq!(preview.status(), StatusCode::OK);
    let pending = read_json_body(preview).await;
    assert_eq!(pending.as_array().map(Vec::len), Some(3));

    let response = app
        .oneshot(post("/api/v1/ministry/submissions"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["notice"]["level"], json!("success"));
    assert_eq!(payload["report"]["submitted"], json!([103, 102, 101]));
    assert_eq!(gateway.calls().len(), 9);
}

#[tokio::test]
async fn submission_failure_is_unprocessable_with_notice() {
    let app = surveillance_router(state(outbreak(), Some(ScriptedConnector::default())));

    let response = app
        .oneshot(post("/api/v1/ministry/submissions?laboratory_id=1"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert_eq!(payload["report"]["submitted"], json!([103]));
    assert_eq!(payload["report"]["failure"]["case_id"], json!(104));
    assert_eq!(
        payload["report"]["failure"]["kind"],
        json!("missing_demographics")
    );
    assert_eq!(payload["notice"]["level"], json!("info"));
}

#[tokio::test]
async fn cancel_route_acknowledges_the_request() {
    let app = surveillance_router(state(outbreak(), Some(ScriptedConnector::default())));

    let response = app
        .oneshot(post("/api/v1/ministry/submissions/cancel"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn lab_webhook_records_matching_result() {
    let response = router(outbreak())
        .oneshot(post_json(
            "/api/v1/lab/hl7",
            json!({
                "patient_names": "Diego",
                "patient_family_father": "Lagos",
                "patient_family_mother": "",
                "observation_datetime": "20200715083000",
                "observation_value": "P",
                "message_datetime": "20200712075500"
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], json!("recorded"));
    assert_eq!(payload["case_id"], json!(105));
    assert_eq!(payload["result"], json!("positive"));
}

#[tokio::test]
async fn lab_webhook_acknowledges_unusable_messages() {
    let response = router(outbreak())
        .oneshot(post_json(
            "/api/v1/lab/hl7",
            json!({
                "patient_names": "Diego",
                "observation_datetime": "not a date",
                "observation_value": "N",
                "message_datetime": "20200712075500"
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], json!("ignored"));
    assert_eq!(payload["field"], json!("observation_datetime"));
}

#[tokio::test]
async fn lab_webhook_surfaces_store_failures() {
    let state: Arc<SurveillanceState<UnavailableStore, ScriptedConnector>> = Arc::new(
        SurveillanceState::new(Arc::new(UnavailableStore), scope())
            .with_clock(Clock::Fixed(now())),
    );

    let response = surveillance_router(state)
        .oneshot(post_json(
            "/api/v1/lab/hl7",
            json!({
                "patient_names": "Diego",
                "observation_datetime": "20200715083000",
                "observation_value": "N",
                "message_datetime": "20200712075500"
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
