//! Immutable filter criteria over patients and their suspect cases.
//!
//! A criterion is a plain list of rules. Narrowing one returns a new value,
//! so every report branch derives its own filter from a shared base without
//! touching it.

use super::domain::{
    ClinicalStatus, CommuneId, EstablishmentId, Gender, LaboratoryId, Patient, PcrResult,
    RegionId, SuspectCase, TracingStatus, UserId,
};
use super::window::ReportWindow;

#[derive(Debug, Clone, PartialEq)]
pub enum CaseRule {
    Result(PcrResult),
    ResultIn(Vec<PcrResult>),
    ResultAtWithin(ReportWindow),
    SampleAtWithin(ReportWindow),
    ReceptionAtWithin(ReportWindow),
    ReceivedOnOrBefore(chrono::NaiveDateTime),
    NotReceived,
    Laboratory(LaboratoryId),
    NoExternalLaboratory,
    NotSubmitted,
    Gestation,
    WithResultFile,
    OriginIn(Vec<String>),
    OriginNotIn(Vec<String>),
    OwnedBy {
        establishments: Vec<EstablishmentId>,
        user: Option<UserId>,
    },
    Patient(PatientRule),
}

impl CaseRule {
    fn matches(&self, patient: &Patient, case: &SuspectCase) -> bool {
        match self {
            Self::Result(result) => case.pcr_sars_cov_2 == *result,
            Self::ResultIn(results) => results.contains(&case.pcr_sars_cov_2),
            Self::ResultAtWithin(window) => window.contains_opt(case.pcr_sars_cov_2_at),
            Self::SampleAtWithin(window) => window.contains(case.sample_at),
            Self::ReceptionAtWithin(window) => window.contains_opt(case.reception_at),
            Self::ReceivedOnOrBefore(limit) => case.reception_at.is_some_and(|at| at <= *limit),
            Self::NotReceived => case.receptor_id.is_none(),
            Self::Laboratory(laboratory) => case.laboratory_id == Some(*laboratory),
            Self::NoExternalLaboratory => case
                .external_laboratory
                .as_deref()
                .map_or(true, |name| name.trim().is_empty()),
            Self::NotSubmitted => !case.is_submitted(),
            Self::Gestation => case.gestation,
            Self::WithResultFile => case.file,
            Self::OriginIn(origins) => case
                .origin
                .as_ref()
                .is_some_and(|origin| origins.iter().any(|o| o == origin)),
            Self::OriginNotIn(origins) => case
                .origin
                .as_ref()
                .map_or(true, |origin| !origins.iter().any(|o| o == origin)),
            Self::OwnedBy {
                establishments,
                user,
            } => {
                case.establishment_id
                    .is_some_and(|id| establishments.contains(&id))
                    || (user.is_some() && case.user_id == *user)
            }
            Self::Patient(rule) => rule.matches(patient),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatientRule {
    /// At least one suspect case satisfies the nested criterion.
    HasCase(CaseCriterion),
    Gender(Gender),
    Status(ClinicalStatus),
    /// Any of the ward, intensive-care or ventilator tiers.
    Hospitalized,
    NoDemographic,
    /// No demographic record, or one without a commune.
    Unregistered,
    CommuneIn(Vec<CommuneId>),
    Commune(CommuneId),
    Region(RegionId),
    /// RUN or foreign identification equal to the given text.
    Identified(String),
    TracingIndexCase,
    TracedBy(Vec<EstablishmentId>),
    TracingNotifiedWithin(ReportWindow),
    TracingInProgress,
    TracingRequiresLicence,
}

impl PatientRule {
    fn matches(&self, patient: &Patient) -> bool {
        match self {
            Self::HasCase(criterion) => patient
                .suspect_cases
                .iter()
                .any(|case| criterion.matches(patient, case)),
            Self::Gender(gender) => patient.gender == *gender,
            Self::Status(status) => patient.status == Some(*status),
            Self::Hospitalized => patient.status.is_some_and(ClinicalStatus::is_hospitalized),
            Self::NoDemographic => patient.demographic.is_none(),
            Self::Unregistered => patient.commune_id().is_none(),
            Self::CommuneIn(communes) => patient
                .commune_id()
                .is_some_and(|commune| communes.contains(&commune)),
            Self::Commune(commune) => patient.commune_id() == Some(*commune),
            Self::Region(region) => patient
                .demographic
                .as_ref()
                .and_then(|demo| demo.region_id)
                == Some(*region),
            Self::Identified(identification) => {
                let wanted = identification.trim();
                !wanted.is_empty()
                    && (patient.run.is_some_and(|run| run.to_string() == wanted)
                        || patient
                            .other_identification
                            .as_deref()
                            .is_some_and(|other| other.trim() == wanted))
            }
            Self::TracingIndexCase => patient
                .tracing
                .as_ref()
                .is_some_and(|tracing| tracing.index_case),
            Self::TracedBy(establishments) => patient
                .tracing
                .as_ref()
                .and_then(|tracing| tracing.establishment_id)
                .is_some_and(|id| establishments.contains(&id)),
            Self::TracingNotifiedWithin(window) => patient
                .tracing
                .as_ref()
                .is_some_and(|tracing| window.contains_opt(tracing.notification_at)),
            Self::TracingInProgress => patient
                .tracing
                .as_ref()
                .is_some_and(|tracing| tracing.status == Some(TracingStatus::InProgress)),
            Self::TracingRequiresLicence => patient
                .tracing
                .as_ref()
                .is_some_and(|tracing| tracing.requires_licence),
        }
    }
}

/// Conjunction of case rules evaluated against `(patient, case)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseCriterion {
    rules: Vec<CaseRule>,
}

impl CaseCriterion {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn positive() -> Self {
        Self::all().with(CaseRule::Result(PcrResult::Positive))
    }

    #[must_use]
    pub fn with(&self, rule: CaseRule) -> Self {
        let mut rules = self.rules.clone();
        rules.push(rule);
        Self { rules }
    }

    #[must_use]
    pub fn with_patient(&self, rule: PatientRule) -> Self {
        self.with(CaseRule::Patient(rule))
    }

    pub fn matches(&self, patient: &Patient, case: &SuspectCase) -> bool {
        self.rules.iter().all(|rule| rule.matches(patient, case))
    }

    pub fn select<'a>(&self, patients: &'a [Patient]) -> Vec<(&'a Patient, &'a SuspectCase)> {
        patients
            .iter()
            .flat_map(|patient| patient.suspect_cases.iter().map(move |case| (patient, case)))
            .filter(|(patient, case)| self.matches(patient, case))
            .collect()
    }

    pub fn count(&self, patients: &[Patient]) -> usize {
        patients
            .iter()
            .map(|patient| {
                patient
                    .suspect_cases
                    .iter()
                    .filter(|case| self.matches(patient, case))
                    .count()
            })
            .sum()
    }
}

/// Conjunction of patient rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientCriterion {
    rules: Vec<PatientRule>,
}

impl PatientCriterion {
    pub fn all() -> Self {
        Self::default()
    }

    /// Patients with at least one positive PCR.
    pub fn positive() -> Self {
        Self::all().with(PatientRule::HasCase(CaseCriterion::positive()))
    }

    #[must_use]
    pub fn with(&self, rule: PatientRule) -> Self {
        let mut rules = self.rules.clone();
        rules.push(rule);
        Self { rules }
    }

    pub fn matches(&self, patient: &Patient) -> bool {
        self.rules.iter().all(|rule| rule.matches(patient))
    }

    pub fn select<'a>(&self, patients: &'a [Patient]) -> Vec<&'a Patient> {
        patients
            .iter()
            .filter(|patient| self.matches(patient))
            .collect()
    }

    pub fn count(&self, patients: &[Patient]) -> usize {
        patients
            .iter()
            .filter(|patient| self.matches(patient))
            .count()
    }
}
