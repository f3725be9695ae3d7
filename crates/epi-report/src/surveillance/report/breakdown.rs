use chrono::NaiveDate;
use serde::Serialize;

use crate::surveillance::domain::{ClinicalStatus, Commune, CommuneId, Gender, Patient, SuspectCase};
use crate::surveillance::filters::{PatientCriterion, PatientRule};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GenderSplit {
    pub male: usize,
    pub female: usize,
}

impl GenderSplit {
    pub fn of<'a, I>(patients: I) -> Self
    where
        I: IntoIterator<Item = &'a Patient>,
    {
        patients
            .into_iter()
            .fold(Self::default(), |split, patient| split.add(patient.gender))
    }

    /// Same split restricted to patients matching `criterion`.
    pub fn matching(patients: &[Patient], criterion: &PatientCriterion) -> Self {
        Self {
            male: criterion
                .with(PatientRule::Gender(Gender::Male))
                .count(patients),
            female: criterion
                .with(PatientRule::Gender(Gender::Female))
                .count(patients),
        }
    }

    fn add(mut self, gender: Gender) -> Self {
        match gender {
            Gender::Male => self.male += 1,
            Gender::Female => self.female += 1,
            Gender::Other | Gender::Unknown => {}
        }
        self
    }

    pub fn total(&self) -> usize {
        self.male + self.female
    }
}

/// Ten-year band; the last one is open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgeBand {
    pub lower: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper: Option<u32>,
}

impl AgeBand {
    pub const COUNT: usize = 9;

    pub fn ordered() -> [Self; Self::COUNT] {
        let mut bands = [Self {
            lower: 0,
            upper: Some(9),
        }; Self::COUNT];
        for (index, band) in bands.iter_mut().enumerate() {
            let lower = index as u32 * 10;
            band.lower = lower;
            band.upper = if index + 1 == Self::COUNT {
                None
            } else {
                Some(lower + 9)
            };
        }
        bands
    }

    pub fn index_for(age: u32) -> usize {
        ((age / 10) as usize).min(Self::COUNT - 1)
    }

    pub fn label(&self) -> String {
        match self.upper {
            Some(upper) => format!("{}-{}", self.lower, upper),
            None => format!("{}+", self.lower),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeBandCount {
    pub band: AgeBand,
    pub label: String,
    pub male: usize,
    pub female: usize,
    pub total: usize,
}

/// Age histogram with an explicit bucket for missing ages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeHistogram {
    pub bands: Vec<AgeBandCount>,
    pub unknown: usize,
}

impl AgeHistogram {
    fn empty() -> Self {
        Self {
            bands: AgeBand::ordered()
                .into_iter()
                .map(|band| AgeBandCount {
                    band,
                    label: band.label(),
                    male: 0,
                    female: 0,
                    total: 0,
                })
                .collect(),
            unknown: 0,
        }
    }

    fn record(&mut self, age: Option<u32>, gender: Gender) {
        match age {
            Some(age) => {
                let entry = &mut self.bands[AgeBand::index_for(age)];
                entry.total += 1;
                match gender {
                    Gender::Male => entry.male += 1,
                    Gender::Female => entry.female += 1,
                    Gender::Other | Gender::Unknown => {}
                }
            }
            None => self.unknown += 1,
        }
    }

    /// Buckets patients by age on `evaluated_on`, computed from the birthday.
    pub fn by_birthday<'a, I>(patients: I, evaluated_on: NaiveDate) -> Self
    where
        I: IntoIterator<Item = &'a Patient>,
    {
        let mut histogram = Self::empty();
        for patient in patients {
            histogram.record(patient.age_on(evaluated_on), patient.gender);
        }
        histogram
    }

    /// Buckets cases by the age snapshot stored at intake.
    pub fn by_stored_age<'a, I>(cases: I) -> Self
    where
        I: IntoIterator<Item = (&'a Patient, &'a SuspectCase)>,
    {
        let mut histogram = Self::empty();
        for (patient, case) in cases {
            histogram.record(case.age, patient.gender);
        }
        histogram
    }

    pub fn band(&self, label: &str) -> Option<&AgeBandCount> {
        self.bands.iter().find(|entry| entry.label == label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommuneCount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commune_id: Option<CommuneId>,
    pub name: String,
    pub total: usize,
    pub male: usize,
    pub female: usize,
}

pub const UNREGISTERED_LABEL: &str = "Sin Registro";

/// One bucket per allow-listed commune plus the unregistered bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommuneSplit {
    pub communes: Vec<CommuneCount>,
    pub unregistered: CommuneCount,
}

impl CommuneSplit {
    pub fn of(patients: &[Patient], communes: &[Commune]) -> Self {
        let bucket = |commune_id: Option<CommuneId>, name: String, criterion: PatientCriterion| {
            let split = GenderSplit::matching(patients, &criterion);
            CommuneCount {
                commune_id,
                name,
                total: criterion.count(patients),
                male: split.male,
                female: split.female,
            }
        };

        let communes = communes
            .iter()
            .map(|commune| {
                bucket(
                    Some(commune.id),
                    commune.name.clone(),
                    PatientCriterion::all().with(PatientRule::Commune(commune.id)),
                )
            })
            .collect();

        let unregistered = bucket(
            None,
            UNREGISTERED_LABEL.to_string(),
            PatientCriterion::all().with(PatientRule::Unregistered),
        );

        Self {
            communes,
            unregistered,
        }
    }

    pub fn commune(&self, id: CommuneId) -> Option<&CommuneCount> {
        self.communes
            .iter()
            .find(|count| count.commune_id == Some(id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: ClinicalStatus,
    pub label: &'static str,
    pub total: usize,
    pub male: usize,
    pub female: usize,
}

/// Independent equality counts per clinical status; buckets may overlap other filters.
pub fn status_counts(patients: &[Patient], statuses: &[ClinicalStatus]) -> Vec<StatusCount> {
    statuses
        .iter()
        .map(|status| {
            let criterion = PatientCriterion::all().with(PatientRule::Status(*status));
            let split = GenderSplit::matching(patients, &criterion);
            StatusCount {
                status: *status,
                label: status.label(),
                total: criterion.count(patients),
                male: split.male,
                female: split.female,
            }
        })
        .collect()
}
