use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::surveillance::domain::{
    CaseId, ClinicalStatus, Commune, CommuneId, Demographic, EstablishmentId, Gender, Laboratory,
    LaboratoryId, Patient, PatientId, PcrResult, RegionId, SuspectCase, Tracing, TracingStatus,
    UserId, VentilatorStock,
};
use crate::surveillance::scope::SurveillanceScope;
use crate::surveillance::store::{InMemoryStore, StoreError, SurveillanceSnapshot, SurveillanceStore};
use crate::surveillance::submission::{
    GatewayConnector, GatewayError, MinistryGateway, SampleSubmission, StepResponse,
    SubmissionStep,
};

pub(super) const IQUIQUE: CommuneId = CommuneId(1);
pub(super) const ALTO_HOSPICIO: CommuneId = CommuneId(2);
pub(super) const PICA: CommuneId = CommuneId(3);
pub(super) const ARICA: CommuneId = CommuneId(9);
pub(super) const TARAPACA: RegionId = RegionId(1);
pub(super) const HOSPITAL_LAB: LaboratoryId = LaboratoryId(1);
pub(super) const UNIVERSITY_LAB: LaboratoryId = LaboratoryId(2);
pub(super) const FAMILY_CLINIC: EstablishmentId = EstablishmentId(5);
pub(super) const RURAL_POST: EstablishmentId = EstablishmentId(6);

pub(super) fn day(year: i32, month: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, d).expect("valid date")
}

pub(super) fn at(year: i32, month: u32, d: u32, hour: u32, minute: u32) -> NaiveDateTime {
    day(year, month, d)
        .and_hms_opt(hour, minute, 0)
        .expect("valid time")
}

/// Reference "now" shared by the fixtures.
pub(super) fn now() -> NaiveDateTime {
    at(2020, 7, 15, 10, 30)
}

pub(super) fn communes() -> Vec<Commune> {
    vec![
        Commune {
            id: IQUIQUE,
            name: "Iquique".to_string(),
            region_id: TARAPACA,
        },
        Commune {
            id: ALTO_HOSPICIO,
            name: "Alto Hospicio".to_string(),
            region_id: TARAPACA,
        },
        Commune {
            id: PICA,
            name: "Pica".to_string(),
            region_id: TARAPACA,
        },
        Commune {
            id: ARICA,
            name: "Arica".to_string(),
            region_id: RegionId(15),
        },
    ]
}

pub(super) fn laboratories() -> Vec<Laboratory> {
    vec![
        Laboratory {
            id: HOSPITAL_LAB,
            name: "HETG".to_string(),
            ministry_submission: true,
        },
        Laboratory {
            id: UNIVERSITY_LAB,
            name: "UNAP".to_string(),
            ministry_submission: false,
        },
    ]
}

pub(super) fn scope() -> SurveillanceScope {
    let mut scope = SurveillanceScope::with_communes(vec![IQUIQUE, ALTO_HOSPICIO]);
    scope.region = Some(TARAPACA);
    scope
}

pub(super) fn patient(id: u64, name: &str, family: &str, gender: Gender) -> Patient {
    Patient {
        id: PatientId(id),
        run: Some(10_000_000 + id as u32),
        dv: Some("K".to_string()),
        other_identification: None,
        name: name.to_string(),
        fathers_family: family.to_string(),
        mothers_family: "Rojas".to_string(),
        gender,
        birthday: Some(day(1980, 3, 10)),
        status: None,
        deceased_at: None,
        demographic: None,
        suspect_cases: Vec::new(),
        immuno_tests: Vec::new(),
        tracing: None,
        index_contacts: 0,
        created_at: at(2020, 3, 1, 9, 0),
    }
}

pub(super) fn living_in(mut patient: Patient, commune: CommuneId) -> Patient {
    let region_id = communes()
        .into_iter()
        .find(|candidate| candidate.id == commune)
        .map(|candidate| candidate.region_id);
    patient.demographic = Some(Demographic {
        commune_id: Some(commune),
        region_id,
        nationality: Some("Chilena".to_string()),
        telephones: vec!["912345678".to_string()],
    });
    patient
}

pub(super) fn with_status(mut patient: Patient, status: ClinicalStatus) -> Patient {
    patient.status = Some(status);
    patient
}

pub(super) fn with_case(mut patient: Patient, case: SuspectCase) -> Patient {
    let mut case = case;
    case.patient_id = patient.id;
    patient.suspect_cases.push(case);
    patient
}

/// Received and resulted in the hospital laboratory.
pub(super) fn case(id: u64, sample_at: NaiveDateTime, result: PcrResult) -> SuspectCase {
    let resulted = result != PcrResult::Pending;
    SuspectCase {
        id: CaseId(id),
        patient_id: PatientId(0),
        laboratory_id: Some(HOSPITAL_LAB),
        establishment_id: None,
        user_id: None,
        origin: None,
        sample_at,
        reception_at: Some(sample_at + chrono::Duration::hours(2)),
        receptor_id: Some(UserId(7)),
        pcr_sars_cov_2: result,
        pcr_sars_cov_2_at: resulted.then(|| sample_at + chrono::Duration::days(1)),
        external_laboratory: None,
        minsal_ws_id: None,
        age: Some(40),
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
        created_at: sample_at,
        updated_at: sample_at,
    }
}

pub(super) fn snapshot(patients: Vec<Patient>) -> SurveillanceSnapshot {
    SurveillanceSnapshot {
        communes: communes(),
        laboratories: laboratories(),
        ventilators: Some(VentilatorStock {
            total: 40,
            no_covid: 12,
            covid: 8,
        }),
        patients,
    }
}

pub(super) fn store(patients: Vec<Patient>) -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new(snapshot(patients)))
}

pub(super) fn stored_case(store: &InMemoryStore, id: u64) -> SuspectCase {
    store
        .cases()
        .expect("cases readable")
        .into_iter()
        .find(|case| case.id == CaseId(id))
        .expect("case exists")
}

/// Mixed population used by the dashboard and route tests.
pub(super) fn outbreak() -> Vec<Patient> {
    let ana = with_case(
        with_status(
            living_in(patient(1, "Ana", "Soto", Gender::Female), IQUIQUE),
            ClinicalStatus::HospitalizedUci,
        ),
        case(101, at(2020, 7, 1, 8, 0), PcrResult::Positive),
    );
    let bruno = with_case(
        with_case(
            living_in(patient(2, "Bruno", "Diaz", Gender::Male), ALTO_HOSPICIO),
            case(102, at(2020, 7, 3, 9, 0), PcrResult::Positive),
        ),
        case(103, at(2020, 7, 10, 9, 0), PcrResult::Negative),
    );
    let mut carla = with_case(
        with_status(
            patient(3, "Carla", "Munoz", Gender::Female),
            ClinicalStatus::Deceased,
        ),
        case(104, at(2020, 7, 3, 11, 0), PcrResult::Positive),
    );
    carla.deceased_at = Some(at(2020, 7, 8, 4, 0));
    let diego = with_case(
        living_in(patient(4, "Diego", "Lagos", Gender::Male), IQUIQUE),
        case(105, at(2020, 7, 12, 8, 0), PcrResult::Pending),
    );

    vec![ana, bruno, carla, diego]
}

/// Active index-case tracing by `establishment`, notified at `notified`.
pub(super) fn traced(
    mut patient: Patient,
    establishment: EstablishmentId,
    notified: NaiveDateTime,
) -> Patient {
    patient.tracing = Some(Tracing {
        index_case: true,
        status: Some(TracingStatus::InProgress),
        establishment_id: Some(establishment),
        notification_at: Some(notified),
        requires_licence: false,
    });
    patient
}

/// Outbreak population followed up by two establishments.
///
/// Ana and Bruno are index cases of the family clinic, notified on July 15th
/// and 10th; Carla belongs to the rural post; Diego is a contact, not an
/// index case. Ana and Diego need a sick-leave licence, Bruno's follow-up
/// is finished.
pub(super) fn traced_outbreak() -> Vec<Patient> {
    let mut patients = outbreak();
    patients[0] = traced(patients[0].clone(), FAMILY_CLINIC, at(2020, 7, 15, 8, 0));
    patients[1] = traced(patients[1].clone(), FAMILY_CLINIC, at(2020, 7, 10, 9, 0));
    patients[2] = traced(patients[2].clone(), RURAL_POST, at(2020, 7, 15, 9, 0));
    patients[3] = traced(patients[3].clone(), FAMILY_CLINIC, at(2020, 7, 14, 16, 0));

    for (index, patient) in patients.iter_mut().enumerate() {
        if let Some(tracing) = patient.tracing.as_mut() {
            tracing.requires_licence = index == 0 || index == 1 || index == 3;
            if index == 1 {
                tracing.status = Some(TracingStatus::Finished);
            }
            if index == 3 {
                tracing.index_case = false;
            }
        }
    }
    patients[0].index_contacts = 2;
    patients
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Gateway answering every step, optionally rejecting one step of one case.
#[derive(Debug, Clone, Default)]
pub(super) struct ScriptedGateway {
    calls: Arc<Mutex<Vec<(CaseId, SubmissionStep)>>>,
    rejection: Option<(CaseId, SubmissionStep, String)>,
    omit_sample_id: bool,
}

impl ScriptedGateway {
    pub(super) fn rejecting(case_id: u64, step: SubmissionStep, message: &str) -> Self {
        Self {
            rejection: Some((CaseId(case_id), step, message.to_string())),
            ..Self::default()
        }
    }

    pub(super) fn without_sample_id() -> Self {
        Self {
            omit_sample_id: true,
            ..Self::default()
        }
    }

    pub(super) fn calls(&self) -> Vec<(CaseId, SubmissionStep)> {
        self.calls.lock().expect("gateway mutex poisoned").clone()
    }

    pub(super) fn cases_touched(&self) -> Vec<CaseId> {
        let mut cases: Vec<CaseId> = self.calls().into_iter().map(|(case, _)| case).collect();
        cases.dedup();
        cases
    }

    fn answer(
        &self,
        step: SubmissionStep,
        sample: &SampleSubmission,
    ) -> Result<StepResponse, GatewayError> {
        self.calls
            .lock()
            .expect("gateway mutex poisoned")
            .push((sample.case_id, step));

        if let Some((case_id, rejected_step, message)) = &self.rejection {
            if *case_id == sample.case_id && *rejected_step == step {
                return Ok(StepResponse::rejected(message.clone()));
            }
        }
        if step == SubmissionStep::Create && !self.omit_sample_id {
            return Ok(StepResponse::accepted(Some(format!("M-{}", sample.case_id))));
        }
        Ok(StepResponse::accepted(None))
    }
}

impl MinistryGateway for ScriptedGateway {
    fn create_sample(&self, sample: &SampleSubmission) -> Result<StepResponse, GatewayError> {
        self.answer(SubmissionStep::Create, sample)
    }

    fn receive_sample(&self, sample: &SampleSubmission) -> Result<StepResponse, GatewayError> {
        self.answer(SubmissionStep::Receive, sample)
    }

    fn publish_result(&self, sample: &SampleSubmission) -> Result<StepResponse, GatewayError> {
        self.answer(SubmissionStep::Result, sample)
    }
}

/// Hands out clones of one scripted gateway so tests can inspect its calls.
#[derive(Debug, Clone, Default)]
pub(super) struct ScriptedConnector {
    pub(super) gateway: ScriptedGateway,
}

impl GatewayConnector for ScriptedConnector {
    type Gateway = ScriptedGateway;

    fn connect(&self) -> Result<ScriptedGateway, GatewayError> {
        Ok(self.gateway.clone())
    }
}

/// Store whose every call fails, for error-path tests.
pub(super) struct UnavailableStore;

impl SurveillanceStore for UnavailableStore {
    fn patients(&self) -> Result<Vec<Patient>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn communes(&self) -> Result<Vec<Commune>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn laboratories(&self) -> Result<Vec<Laboratory>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn ventilators(&self) -> Result<Option<VentilatorStock>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn record_result(
        &self,
        _case_id: CaseId,
        _result: PcrResult,
        _result_at: NaiveDateTime,
    ) -> Result<SuspectCase, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn assign_submission_id(
        &self,
        _case_id: CaseId,
        _submission_id: &str,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}
