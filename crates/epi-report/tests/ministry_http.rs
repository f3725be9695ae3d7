use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::NaiveDate;
use epi_report::surveillance::domain::{
    CaseId, CommuneId, Demographic, Gender, LaboratoryId, Patient, PatientId, PcrResult,
    SuspectCase,
};
use epi_report::surveillance::submission::{
    FailureKind, GatewayConnector, HttpMinistryConnector, MissingDemographicsPolicy,
    PendingSubmission, SubmissionPipeline, SubmissionReport, SubmissionStep,
};
use epi_report::surveillance::{InMemoryStore, SurveillanceSnapshot};
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct Ministry {
    received: Arc<Mutex<Vec<(String, Value)>>>,
    reject_results: bool,
}

impl Ministry {
    fn record(&self, step: &str, payload: Value) {
        self.received
            .lock()
            .expect("log lock")
            .push((step.to_string(), payload));
    }

    fn steps(&self) -> Vec<String> {
        self.received
            .lock()
            .expect("log lock")
            .iter()
            .map(|(step, _)| step.clone())
            .collect()
    }
}

async fn create(State(ministry): State<Ministry>, Json(payload): Json<Value>) -> Json<Value> {
    let case_id = payload["case_id"].clone();
    ministry.record("create", payload);
    Json(json!({ "status": 1, "id_muestra": case_id }))
}

async fn receive(State(ministry): State<Ministry>, Json(payload): Json<Value>) -> Json<Value> {
    ministry.record("receive", payload);
    Json(json!({ "status": true }))
}

async fn result(State(ministry): State<Ministry>, Json(payload): Json<Value>) -> Json<Value> {
    ministry.record("result", payload);
    if ministry.reject_results {
        Json(json!({ "status": 0, "msg": "Resultado no corresponde" }))
    } else {
        Json(json!({ "status": 1 }))
    }
}

async fn spawn_ministry(ministry: Ministry) -> SocketAddr {
    let app = Router::new()
        .route("/ws/crearMuestras", post(create))
        .route("/ws/recepcionarMuestra", post(receive))
        .route("/ws/entregaResultado", post(result))
        .with_state(ministry);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("ministry stub serves");
    });
    addr
}

fn stamp(day: u32, hour: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 7, day)
        .and_then(|date| date.and_hms_opt(hour, 0, 0))
        .expect("valid timestamp")
}

fn pending(id: u64) -> PendingSubmission {
    let case = SuspectCase {
        id: CaseId(id),
        patient_id: PatientId(id),
        laboratory_id: Some(LaboratoryId(1)),
        establishment_id: None,
        user_id: None,
        origin: None,
        sample_at: stamp(10, 8),
        reception_at: Some(stamp(10, 10)),
        receptor_id: None,
        pcr_sars_cov_2: PcrResult::Negative,
        pcr_sars_cov_2_at: Some(stamp(11, 9)),
        external_laboratory: None,
        minsal_ws_id: None,
        age: Some(33),
        gestation: false,
        close_contact: false,
        symptoms: None,
        epidemiological_week: None,
        epivigila: None,
        paho_flu: None,
        result_ifd_at: None,
        result_ifd: None,
        sent_external_lab_at: None,
        processing_laboratory: None,
        notification_at: None,
        notification_mechanism: None,
        discharged_at: None,
        observation: None,
        file: false,
        created_at: stamp(10, 8),
        updated_at: stamp(11, 9),
    };
    let patient = Patient {
        id: PatientId(id),
        run: Some(15_000_000 + id as u32),
        dv: Some("5".to_string()),
        other_identification: None,
        name: "Camila".to_string(),
        fathers_family: "Vera".to_string(),
        mothers_family: "Cortes".to_string(),
        gender: Gender::Female,
        birthday: NaiveDate::from_ymd_opt(1987, 4, 2),
        status: None,
        deceased_at: None,
        demographic: Some(Demographic {
            commune_id: Some(CommuneId(1101)),
            region_id: None,
            nationality: Some("Chile".to_string()),
            telephones: vec!["912345678".to_string()],
        }),
        suspect_cases: vec![case.clone()],
        immuno_tests: Vec::new(),
        tracing: None,
        index_contacts: 0,
        created_at: stamp(10, 8),
    };
    PendingSubmission { patient, case }
}

async fn submit(
    addr: SocketAddr,
    batch: Vec<PendingSubmission>,
) -> (SubmissionReport, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new(SurveillanceSnapshot {
        patients: batch.iter().map(|pending| pending.patient.clone()).collect(),
        ..SurveillanceSnapshot::default()
    }));
    let connector =
        HttpMinistryConnector::new(&format!("http://{addr}/ws/"), Duration::from_secs(5));
    let pipeline = SubmissionPipeline::new(Arc::clone(&store), MissingDemographicsPolicy::Abort);

    let report = tokio::task::spawn_blocking(move || {
        let gateway = connector.connect().expect("client builds");
        pipeline.run(&gateway, &batch)
    })
    .await
    .expect("blocking task completes");
    (report, store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_gateway_drives_the_three_steps() {
    let ministry = Ministry::default();
    let addr = spawn_ministry(ministry.clone()).await;

    let (report, store) = submit(addr, vec![pending(41)]).await;

    assert!(report.succeeded());
    assert_eq!(report.submitted, vec![CaseId(41)]);
    assert_eq!(ministry.steps(), vec!["create", "receive", "result"]);

    let received = ministry.received.lock().expect("log lock").clone();
    assert_eq!(received[0].1["run"], json!(15_000_041));
    assert_eq!(received[0].1["sample_at"], json!("2020-07-10 08:00:00"));
    assert_eq!(received[0].1.get("external_id"), None);
    assert_eq!(received[1].1["external_id"], json!("41"));
    assert_eq!(received[2].1["result"], json!("negative"));

    let snapshot = store.snapshot();
    assert_eq!(
        snapshot.patients[0].suspect_cases[0].minsal_ws_id.as_deref(),
        Some("41")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_gateway_rejection_aborts_the_batch() {
    let ministry = Ministry {
        reject_results: true,
        ..Ministry::default()
    };
    let addr = spawn_ministry(ministry.clone()).await;

    let (report, store) = submit(addr, vec![pending(41), pending(42)]).await;

    assert!(report.submitted.is_empty());
    let failure = report.failure.as_ref().expect("batch aborted");
    assert_eq!(failure.case_id, CaseId(41));
    assert_eq!(
        failure.kind,
        FailureKind::Step {
            step: SubmissionStep::Result,
            message: "Resultado no corresponde".to_string(),
        }
    );
    assert_eq!(ministry.steps(), vec!["create", "receive", "result"]);
    assert!(store
        .snapshot()
        .patients
        .iter()
        .all(|patient| patient.suspect_cases[0].minsal_ws_id.is_none()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_ministry_counts_as_a_create_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let (report, _) = submit(addr, vec![pending(41)]).await;

    let failure = report.failure.expect("batch aborted");
    assert!(matches!(
        failure.kind,
        FailureKind::Step {
            step: SubmissionStep::Create,
            ..
        }
    ));
}
