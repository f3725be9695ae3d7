use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for laboratory suspect cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommuneId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaboratoryId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EstablishmentId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl std::fmt::Display for CaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for LaboratoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// PCR SARS-CoV-2 result recorded on a suspect case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PcrResult {
    Pending,
    Positive,
    Negative,
    Undetermined,
    Rejected,
}

impl PcrResult {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Pending,
            Self::Positive,
            Self::Negative,
            Self::Undetermined,
            Self::Rejected,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pendiente",
            Self::Positive => "Positivo",
            Self::Negative => "Negativo",
            Self::Undetermined => "Indeterminado",
            Self::Rejected => "Rechazado",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
    Unknown,
}

impl Gender {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Male => "Masculino",
            Self::Female => "Femenino",
            Self::Other => "Otro",
            Self::Unknown => "Desconocido",
        }
    }
}

/// Clinical status tracked on the patient by upstream case management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClinicalStatus {
    Ambulatory,
    SanitaryResidence,
    HospitalizedBasic,
    HospitalizedMedium,
    HospitalizedUti,
    HospitalizedUci,
    HospitalizedUciVentilator,
    Discharged,
    Deceased,
}

impl ClinicalStatus {
    pub const fn hospitalized() -> [Self; 5] {
        [
            Self::HospitalizedBasic,
            Self::HospitalizedMedium,
            Self::HospitalizedUti,
            Self::HospitalizedUci,
            Self::HospitalizedUciVentilator,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Ambulatory => "Ambulatorio",
            Self::SanitaryResidence => "Residencia Sanitaria",
            Self::HospitalizedBasic => "Hospitalizado Básico",
            Self::HospitalizedMedium => "Hospitalizado Medio",
            Self::HospitalizedUti => "Hospitalizado UTI",
            Self::HospitalizedUci => "Hospitalizado UCI",
            Self::HospitalizedUciVentilator => "Hospitalizado UCI (Ventilador)",
            Self::Discharged => "Alta",
            Self::Deceased => "Fallecido",
        }
    }

    pub fn is_hospitalized(self) -> bool {
        Self::hospitalized().contains(&self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commune {
    pub id: CommuneId,
    pub name: String,
    pub region_id: RegionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Laboratory {
    pub id: LaboratoryId,
    pub name: String,
    #[serde(default)]
    pub ministry_submission: bool,
}

/// Ventilator stock shown next to the UCI tally on the positives dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VentilatorStock {
    pub total: u32,
    pub no_covid: u32,
    pub covid: u32,
}

/// Address and contact details; absent for patients registered without them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demographic {
    #[serde(default)]
    pub commune_id: Option<CommuneId>,
    #[serde(default)]
    pub region_id: Option<RegionId>,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub telephones: Vec<String>,
}

impl Demographic {
    pub fn full_telephones(&self) -> String {
        self.telephones.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImmunoTest {
    pub id: u64,
    #[serde(default)]
    pub register_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub igg: Option<String>,
    #[serde(default)]
    pub igm: Option<String>,
    #[serde(default)]
    pub control: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracingStatus {
    Finished,
    InProgress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracing {
    #[serde(default)]
    pub index_case: bool,
    #[serde(default)]
    pub status: Option<TracingStatus>,
    #[serde(default)]
    pub establishment_id: Option<EstablishmentId>,
    #[serde(default)]
    pub notification_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub requires_licence: bool,
}

/// Laboratory test record tracking one testing episode of a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspectCase {
    pub id: CaseId,
    pub patient_id: PatientId,
    #[serde(default)]
    pub laboratory_id: Option<LaboratoryId>,
    #[serde(default)]
    pub establishment_id: Option<EstablishmentId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Establishment alias the sample originated from.
    #[serde(default)]
    pub origin: Option<String>,
    pub sample_at: NaiveDateTime,
    #[serde(default)]
    pub reception_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub receptor_id: Option<UserId>,
    pub pcr_sars_cov_2: PcrResult,
    #[serde(default)]
    pub pcr_sars_cov_2_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub external_laboratory: Option<String>,
    #[serde(default)]
    pub minsal_ws_id: Option<String>,
    /// Age snapshot captured at intake.
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gestation: bool,
    #[serde(default)]
    pub close_contact: bool,
    #[serde(default)]
    pub symptoms: Option<bool>,
    #[serde(default)]
    pub epidemiological_week: Option<u32>,
    #[serde(default)]
    pub epivigila: Option<u64>,
    #[serde(default)]
    pub paho_flu: Option<u64>,
    #[serde(default)]
    pub result_ifd_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub result_ifd: Option<String>,
    #[serde(default)]
    pub sent_external_lab_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub processing_laboratory: Option<String>,
    #[serde(default)]
    pub notification_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub notification_mechanism: Option<String>,
    #[serde(default)]
    pub discharged_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub observation: Option<String>,
    #[serde(default)]
    pub file: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl SuspectCase {
    pub fn is_positive(&self) -> bool {
        self.pcr_sars_cov_2 == PcrResult::Positive
    }

    pub fn is_submitted(&self) -> bool {
        self.minsal_ws_id.is_some()
    }

    pub fn symptoms_label(&self) -> &'static str {
        match self.symptoms {
            Some(true) => "Si",
            Some(false) => "No",
            None => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    #[serde(default)]
    pub run: Option<u32>,
    #[serde(default)]
    pub dv: Option<String>,
    #[serde(default)]
    pub other_identification: Option<String>,
    pub name: String,
    #[serde(default)]
    pub fathers_family: String,
    #[serde(default)]
    pub mothers_family: String,
    pub gender: Gender,
    #[serde(default)]
    pub birthday: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<ClinicalStatus>,
    #[serde(default)]
    pub deceased_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub demographic: Option<Demographic>,
    #[serde(default)]
    pub suspect_cases: Vec<SuspectCase>,
    #[serde(default)]
    pub immuno_tests: Vec<ImmunoTest>,
    #[serde(default)]
    pub tracing: Option<Tracing>,
    /// Contacts registered with this patient as the index case.
    #[serde(default)]
    pub index_contacts: u32,
    pub created_at: NaiveDateTime,
}

impl Patient {
    pub fn full_name(&self) -> String {
        [
            self.name.as_str(),
            self.fathers_family.as_str(),
            self.mothers_family.as_str(),
        ]
        .iter()
        .filter(|part| !part.trim().is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
    }

    pub fn identifier(&self) -> String {
        match (self.run, &self.other_identification) {
            (Some(run), _) => match &self.dv {
                Some(dv) => format!("{run}-{dv}"),
                None => run.to_string(),
            },
            (None, Some(other)) => other.clone(),
            (None, None) => String::new(),
        }
    }

    /// Full years elapsed between the birthday and `on`.
    pub fn age_on(&self, on: NaiveDate) -> Option<u32> {
        let birthday = self.birthday?;
        if birthday > on {
            return Some(0);
        }
        let mut years = on.year() - birthday.year();
        if (on.month(), on.day()) < (birthday.month(), birthday.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }

    pub fn commune_id(&self) -> Option<CommuneId> {
        self.demographic.as_ref().and_then(|demo| demo.commune_id)
    }

    pub fn has_positive_case(&self) -> bool {
        self.suspect_cases.iter().any(SuspectCase::is_positive)
    }

    pub fn positive_sample_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.suspect_cases
            .iter()
            .filter(|case| case.is_positive())
            .map(|case| case.sample_at.date())
    }

    /// Sample date of the earliest positive case; one entry per patient in the evolution series.
    pub fn first_positive_sample(&self) -> Option<NaiveDate> {
        self.positive_sample_dates().min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient(birthday: Option<NaiveDate>) -> Patient {
        Patient {
            id: PatientId(1),
            run: Some(12345678),
            dv: Some("9".to_string()),
            other_identification: None,
            name: "Ana".to_string(),
            fathers_family: "Rojas".to_string(),
            mothers_family: "".to_string(),
            gender: Gender::Female,
            birthday,
            status: None,
            deceased_at: None,
            demographic: None,
            suspect_cases: Vec::new(),
            immuno_tests: Vec::new(),
            tracing: None,
            index_contacts: 0,
            created_at: NaiveDate::from_ymd_opt(2020, 3, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn age_counts_full_years_only() {
        let birthday = NaiveDate::from_ymd_opt(2010, 6, 15).unwrap();
        let subject = patient(Some(birthday));
        assert_eq!(
            subject.age_on(NaiveDate::from_ymd_opt(2020, 6, 14).unwrap()),
            Some(9)
        );
        assert_eq!(
            subject.age_on(NaiveDate::from_ymd_opt(2020, 6, 15).unwrap()),
            Some(10)
        );
        assert_eq!(patient(None).age_on(birthday), None);
    }

    #[test]
    fn identifier_and_full_name_skip_missing_parts() {
        let subject = patient(None);
        assert_eq!(subject.identifier(), "12345678-9");
        assert_eq!(subject.full_name(), "Ana Rojas");
    }
}
