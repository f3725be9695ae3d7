//! Lab-interface bridge: PCR results forwarded from the HL7 integration engine.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Deserialize;
use tracing::{info, warn};

use super::domain::{CaseId, Patient, PcrResult, SuspectCase};
use super::store::{StoreError, SurveillanceStore};
use super::window::parse_bound;

/// Payload posted by the integration engine for one observation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LabResultMessage {
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub patient_names: String,
    #[serde(default)]
    pub patient_family_father: String,
    #[serde(default)]
    pub patient_family_mother: String,
    #[serde(default)]
    pub observation_datetime: String,
    #[serde(default)]
    pub observation_value: String,
    /// Carries the sample date the case is matched on.
    #[serde(default)]
    pub message_datetime: String,
}

/// Maps an observation code to a PCR result, ignoring case.
pub fn result_from_code(code: &str) -> Option<PcrResult> {
    match code.trim().to_ascii_uppercase().as_str() {
        "N" => Some(PcrResult::Negative),
        "P" => Some(PcrResult::Positive),
        "ENM" => Some(PcrResult::Rejected),
        "INDET" => Some(PcrResult::Undetermined),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    Recorded {
        case_id: CaseId,
        result: PcrResult,
        result_at: NaiveDateTime,
    },
    Unmatched,
    UnknownCode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("unreadable {field} `{value}`")]
    InvalidTimestamp { field: &'static str, value: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Records lab-interface results against the matching suspect case.
pub struct LabResultIntake<S> {
    store: Arc<S>,
}

impl<S> Clone for LabResultIntake<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> LabResultIntake<S>
where
    S: SurveillanceStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn ingest(&self, message: &LabResultMessage) -> Result<IntakeOutcome, IntakeError> {
        info!(
            patient_id = message.patient_id.as_deref().unwrap_or_default(),
            names = %message.patient_names,
            family_father = %message.patient_family_father,
            family_mother = %message.patient_family_mother,
            observation_value = %message.observation_value,
            observation_datetime = %message.observation_datetime,
            message_datetime = %message.message_datetime,
            "lab interface message received"
        );

        let Some(result) = result_from_code(&message.observation_value) else {
            warn!(code = %message.observation_value, "unknown observation code, message dropped");
            return Ok(IntakeOutcome::UnknownCode(message.observation_value.clone()));
        };
        let result_at = timestamp("observation_datetime", &message.observation_datetime)?;
        let sampled_on = timestamp("message_datetime", &message.message_datetime)?.date();

        let patients = self.store.patients()?;
        let matched = patients
            .iter()
            .filter(|patient| names_match(patient, message))
            .flat_map(|patient| patient.suspect_cases.iter())
            .filter(|case| case.sample_at.date() == sampled_on)
            .max_by_key(|case| case.updated_at)
            .map(|case: &SuspectCase| case.id);

        let Some(case_id) = matched else {
            warn!(
                names = %message.patient_names,
                sampled_on = %sampled_on,
                "no suspect case matches lab interface message"
            );
            return Ok(IntakeOutcome::Unmatched);
        };

        self.store.record_result(case_id, result, result_at)?;
        info!(case_id = %case_id, result = result.label(), "lab interface result recorded");
        Ok(IntakeOutcome::Recorded {
            case_id,
            result,
            result_at,
        })
    }
}

fn timestamp(field: &'static str, value: &str) -> Result<NaiveDateTime, IntakeError> {
    parse_bound(value, false).ok_or_else(|| IntakeError::InvalidTimestamp {
        field,
        value: value.to_string(),
    })
}

/// Substring match on every name part, ignoring case; empty fragments match anything.
fn names_match(patient: &Patient, message: &LabResultMessage) -> bool {
    contains(&patient.name, &message.patient_names)
        && contains(&patient.fathers_family, &message.patient_family_father)
        && contains(&patient.mothers_family, &message.patient_family_mother)
}

fn contains(value: &str, fragment: &str) -> bool {
    value.to_lowercase().contains(&fragment.trim().to_lowercase())
}
