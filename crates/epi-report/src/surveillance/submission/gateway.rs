use std::fmt::Debug;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::batch::PendingSubmission;
use crate::surveillance::domain::{CaseId, Gender, PcrResult};

/// Case data sent on every step, plus the ministry sample id once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleSubmission {
    pub case_id: CaseId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_identification: Option<String>,
    pub name: String,
    pub fathers_family: String,
    pub mothers_family: String,
    pub gender: Gender,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthday: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commune_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telephone: Option<String>,
    pub sample_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reception_at: Option<String>,
    pub result: PcrResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl SampleSubmission {
    pub fn from_pending(pending: &PendingSubmission) -> Self {
        let PendingSubmission { patient, case } = pending;
        let demographic = patient.demographic.as_ref();
        let stamp = |at: chrono::NaiveDateTime| at.format("%Y-%m-%d %H:%M:%S").to_string();
        Self {
            case_id: case.id,
            run: patient.run,
            dv: patient.dv.clone(),
            other_identification: patient.other_identification.clone(),
            name: patient.name.clone(),
            fathers_family: patient.fathers_family.clone(),
            mothers_family: patient.mothers_family.clone(),
            gender: patient.gender,
            birthday: patient.birthday,
            commune_id: patient.commune_id().map(|id| id.0),
            nationality: demographic.and_then(|demo| demo.nationality.clone()),
            telephone: demographic.and_then(|demo| demo.telephones.first().cloned()),
            sample_at: stamp(case.sample_at),
            reception_at: case.reception_at.map(stamp),
            result: case.pcr_sars_cov_2,
            result_at: case.pcr_sars_cov_2_at.map(stamp),
            external_id: None,
        }
    }
}

/// Status flag and message returned by each remote step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResponse {
    pub accepted: bool,
    pub message: String,
    pub external_id: Option<String>,
}

impl StepResponse {
    pub fn accepted(external_id: Option<String>) -> Self {
        Self {
            accepted: true,
            message: String::new(),
            external_id,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: message.into(),
            external_id: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("ministry client could not be built: {0}")]
    Client(String),
    #[error("ministry web service unreachable: {0}")]
    Transport(String),
    #[error("unexpected ministry response: {0}")]
    Decode(String),
}

/// The three remote steps of the ministry protocol. Implementations block.
pub trait MinistryGateway: Debug {
    fn create_sample(&self, sample: &SampleSubmission) -> Result<StepResponse, GatewayError>;
    fn receive_sample(&self, sample: &SampleSubmission) -> Result<StepResponse, GatewayError>;
    fn publish_result(&self, sample: &SampleSubmission) -> Result<StepResponse, GatewayError>;
}

/// Builds a gateway on the thread that will drive a batch.
pub trait GatewayConnector: Send + Sync + 'static {
    type Gateway: MinistryGateway;

    fn connect(&self) -> Result<Self::Gateway, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpMinistryConnector {
    base_url: String,
    timeout: Duration,
}

impl HttpMinistryConnector {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

impl GatewayConnector for HttpMinistryConnector {
    type Gateway = HttpMinistryGateway;

    fn connect(&self) -> Result<HttpMinistryGateway, GatewayError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|err| GatewayError::Client(err.to_string()))?;
        Ok(HttpMinistryGateway {
            base_url: self.base_url.clone(),
            client,
        })
    }
}

/// JSON-over-HTTP client for the ministry web service.
///
/// Uses the blocking reqwest client; build and drive it off the async
/// executor (for example inside `tokio::task::spawn_blocking`).
pub struct HttpMinistryGateway {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl Debug for HttpMinistryGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMinistryGateway")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

const CREATE_PATH: &str = "crearMuestras";
const RECEIVE_PATH: &str = "recepcionarMuestra";
const RESULT_PATH: &str = "entregaResultado";

impl HttpMinistryGateway {
    fn call(&self, path: &str, sample: &SampleSubmission) -> Result<StepResponse, GatewayError> {
        let url = format!("{}/{path}", self.base_url);
        debug!(%url, case_id = %sample.case_id, "calling ministry web service");

        let response = self
            .client
            .post(&url)
            .json(sample)
            .send()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        if !status.is_success() {
            return Ok(StepResponse::rejected(rejection_message(&body, status.as_str())));
        }

        let payload: Value = serde_json::from_str(&body)
            .map_err(|err| GatewayError::Decode(err.to_string()))?;
        Ok(step_response(&payload))
    }
}

impl MinistryGateway for HttpMinistryGateway {
    fn create_sample(&self, sample: &SampleSubmission) -> Result<StepResponse, GatewayError> {
        self.call(CREATE_PATH, sample)
    }

    fn receive_sample(&self, sample: &SampleSubmission) -> Result<StepResponse, GatewayError> {
        self.call(RECEIVE_PATH, sample)
    }

    fn publish_result(&self, sample: &SampleSubmission) -> Result<StepResponse, GatewayError> {
        self.call(RESULT_PATH, sample)
    }
}

/// Reads `{"status": bool|0|1, "msg": "...", "id_muestra": ...}`. Only an
/// explicit truthy status is an acceptance; a reply without one is rejected.
fn step_response(payload: &Value) -> StepResponse {
    let accepted = match payload.get("status") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_i64() != Some(0),
        Some(Value::String(text)) => !matches!(text.trim(), "" | "0" | "false"),
        _ => false,
    };
    let message = payload
        .get("msg")
        .or_else(|| payload.get("error"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let external_id = payload.get("id_muestra").and_then(|id| match id {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    });

    StepResponse {
        accepted,
        message,
        external_id,
    }
}

fn rejection_message(body: &str, status: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .map(|payload| step_response(&payload).message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("HTTP {status}: {}", body.trim()))
}
