use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use super::breakdown::{AgeHistogram, CommuneSplit, GenderSplit};
use super::evolution::EvolutionSeries;
use crate::surveillance::domain::{
    CaseId, ClinicalStatus, CommuneId, EstablishmentId, Gender, LaboratoryId, Patient,
    PatientId, PcrResult, SuspectCase, TracingStatus, VentilatorStock,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExamCounts {
    pub total: usize,
    pub positive: usize,
    pub negative: usize,
    pub pending: usize,
    pub undetermined: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositivesReport {
    pub totals: GenderSplit,
    pub evolution: EvolutionSeries,
    pub exams: ExamCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ventilators: Option<VentilatorStock>,
    pub uci_ventilator_patients: usize,
    pub deceased: GenderSplit,
    pub age_ranges: AgeHistogram,
    pub cases_by_commune: CommuneSplit,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnPositivesReport {
    pub total_patients: usize,
    pub evolution: EvolutionSeries,
    pub positives_last_30_days: BTreeMap<NaiveDate, u64>,
    pub deceased: GenderSplit,
    pub age_ranges: AgeHistogram,
    pub cases_by_commune: CommuneSplit,
}

/// Total plus gender breakdown for one row of the summary report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountRow {
    pub label: &'static str,
    pub total: usize,
    pub male: usize,
    pub female: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HospitalizationBlock {
    pub status: ClinicalStatus,
    pub label: &'static str,
    pub total: CountRow,
    pub by_result: Vec<CountRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidenceRate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commune_id: Option<CommuneId>,
    pub name: String,
    pub population: u64,
    pub positives: usize,
    /// Positives per 100 000 inhabitants, rounded to two decimals.
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginRow {
    pub label: &'static str,
    pub total: usize,
    pub positives: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GestationCounts {
    pub total: usize,
    pub positive: usize,
    pub pending: usize,
    pub negative: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub results: Vec<CountRow>,
    pub hospitalizations: Vec<HospitalizationBlock>,
    pub positives_by_commune: CommuneSplit,
    pub incidence: Vec<IncidenceRate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_incidence: Option<IncidenceRate>,
    pub origins: Vec<OriginRow>,
    pub age_ranges: AgeHistogram,
    pub gestation: GestationCounts,
}

/// Flattened case row for list-style reports.
#[derive(Debug, Clone, Serialize)]
pub struct CaseListEntry {
    pub case_id: CaseId,
    pub patient_id: PatientId,
    pub patient: String,
    pub identifier: String,
    pub gender: Gender,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commune_id: Option<CommuneId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub laboratory_id: Option<LaboratoryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    pub sample_at: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reception_at: Option<NaiveDateTime>,
    pub result: PcrResult,
    pub result_label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<String>,
}

impl CaseListEntry {
    pub fn new(patient: &Patient, case: &SuspectCase) -> Self {
        Self {
            case_id: case.id,
            patient_id: patient.id,
            patient: patient.full_name(),
            identifier: patient.identifier(),
            gender: patient.gender,
            age: case.age,
            commune_id: patient.commune_id(),
            laboratory_id: case.laboratory_id,
            origin: case.origin.clone(),
            sample_at: case.sample_at,
            reception_at: case.reception_at,
            result: case.pcr_sars_cov_2,
            result_label: case.pcr_sars_cov_2.label(),
            result_at: case.pcr_sars_cov_2_at,
            submission_id: case.minsal_ws_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientListEntry {
    pub patient_id: PatientId,
    pub patient: String,
    pub identifier: String,
    pub gender: Gender,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commune_id: Option<CommuneId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ClinicalStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deceased_at: Option<NaiveDateTime>,
    pub cases: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_positive_sample: Option<NaiveDate>,
}

impl PatientListEntry {
    pub fn new(patient: &Patient, today: NaiveDate) -> Self {
        Self {
            patient_id: patient.id,
            patient: patient.full_name(),
            identifier: patient.identifier(),
            gender: patient.gender,
            age: patient.age_on(today),
            commune_id: patient.commune_id(),
            status: patient.status,
            deceased_at: patient.deceased_at,
            cases: patient.suspect_cases.len(),
            first_positive_sample: patient.first_positive_sample(),
        }
    }
}

/// Tracing record of one patient with its cases, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct TracingListEntry {
    pub patient_id: PatientId,
    pub patient: String,
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commune_id: Option<CommuneId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub establishment_id: Option<EstablishmentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracing_status: Option<TracingStatus>,
    pub index_case: bool,
    pub requires_licence: bool,
    pub contacts: u32,
    pub cases: Vec<CaseListEntry>,
}

impl TracingListEntry {
    /// `None` for patients without a tracing record.
    pub fn new(patient: &Patient) -> Option<Self> {
        let tracing = patient.tracing.as_ref()?;
        let mut cases: Vec<CaseListEntry> = patient
            .suspect_cases
            .iter()
            .map(|case| CaseListEntry::new(patient, case))
            .collect();
        cases.sort_by(|a, b| b.case_id.cmp(&a.case_id));
        Some(Self {
            patient_id: patient.id,
            patient: patient.full_name(),
            identifier: patient.identifier(),
            commune_id: patient.commune_id(),
            establishment_id: tracing.establishment_id,
            notification_at: tracing.notification_at,
            tracing_status: tracing.status,
            index_case: tracing.index_case,
            requires_licence: tracing.requires_licence,
            contacts: patient.index_contacts,
            cases,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChartDay {
    pub positives: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommuneTracingRow {
    pub commune_id: CommuneId,
    pub commune: String,
    pub positives: usize,
    pub contacts: u32,
    pub in_progress: usize,
    pub finished: usize,
}

pub(crate) fn gender_row<'a, I>(label: &'static str, patients: I) -> CountRow
where
    I: IntoIterator<Item = &'a Patient>,
{
    let mut total = 0;
    let mut split = GenderSplit::default();
    for patient in patients {
        total += 1;
        match patient.gender {
            Gender::Male => split.male += 1,
            Gender::Female => split.female += 1,
            Gender::Other | Gender::Unknown => {}
        }
    }
    CountRow {
        label,
        total,
        male: split.male,
        female: split.female,
    }
}
