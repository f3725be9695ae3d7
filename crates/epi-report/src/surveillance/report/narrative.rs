use super::breakdown::{AgeHistogram, CommuneCount, CommuneSplit, UNREGISTERED_LABEL};
use super::views::{
    gender_row, GestationCounts, HospitalizationBlock, IncidenceRate, OriginRow,
    SummaryReport,
};
use super::{ReportError, SurveillanceReports};
use crate::surveillance::domain::{
    ClinicalStatus, Commune, CommuneId, Gender, Patient, PcrResult, SuspectCase,
};
use crate::surveillance::filters::{CaseCriterion, CaseRule, PatientRule};
use crate::surveillance::store::SurveillanceStore;
use crate::surveillance::window::ReportWindow;

const SUMMARY_RESULTS: [(PcrResult, &str); 3] = [
    (PcrResult::Positive, "Positivos"),
    (PcrResult::Negative, "Negativos"),
    (PcrResult::Pending, "Pendiente resultado"),
];

const SUMMARY_HOSPITALIZATIONS: [ClinicalStatus; 2] =
    [ClinicalStatus::HospitalizedBasic, ClinicalStatus::HospitalizedUci];

impl<S> SurveillanceReports<S>
where
    S: SurveillanceStore + 'static,
{
    /// Case-level summary: results, hospitalization blocks, communes,
    /// incidence, origins, stored-age bands and gestation.
    ///
    /// `sampled` restricts the cases by sample date; `None` covers every case.
    pub fn summary(&self, sampled: Option<ReportWindow>) -> Result<SummaryReport, ReportError> {
        let patients = self.store.patients()?;
        let base = match sampled {
            Some(window) => CaseCriterion::all().with(CaseRule::SampleAtWithin(window)),
            None => CaseCriterion::all(),
        };

        let row = |label: &'static str, criterion: &CaseCriterion| {
            gender_row(
                label,
                criterion
                    .select(&patients)
                    .into_iter()
                    .map(|(patient, _)| patient),
            )
        };

        let mut results = vec![row("Enviados a análisis", &base)];
        results.extend(
            SUMMARY_RESULTS
                .iter()
                .map(|(result, label)| row(*label, &base.with(CaseRule::Result(*result)))),
        );

        let hospitalizations = SUMMARY_HOSPITALIZATIONS
            .iter()
            .map(|status| {
                let by_status = base.with_patient(PatientRule::Status(*status));
                HospitalizationBlock {
                    status: *status,
                    label: status.label(),
                    total: row(status.label(), &by_status),
                    by_result: SUMMARY_RESULTS
                        .iter()
                        .map(|(result, label)| {
                            row(*label, &by_status.with(CaseRule::Result(*result)))
                        })
                        .collect(),
                }
            })
            .collect();

        let positive = base.with(CaseRule::Result(PcrResult::Positive));
        let positive_cases = positive.select(&patients);
        let communes = self.scoped_communes()?;
        let positives_by_commune = split_cases_by_commune(&positive_cases, &communes);
        let incidence = self.incidence(&positives_by_commune);
        let region_incidence = self.scope.region_population.map(|population| {
            incidence_rate(None, "Región".to_string(), population, positive_cases.len())
        });

        let origins = self.origin_rows(&patients, &base);
        let age_ranges = AgeHistogram::by_stored_age(positive_cases.iter().copied());

        let gestants = base.with(CaseRule::Gestation);
        let gestation = GestationCounts {
            total: gestants.count(&patients),
            positive: gestants
                .with(CaseRule::Result(PcrResult::Positive))
                .count(&patients),
            pending: gestants
                .with(CaseRule::Result(PcrResult::Pending))
                .count(&patients),
            negative: gestants
                .with(CaseRule::Result(PcrResult::Negative))
                .count(&patients),
        };

        Ok(SummaryReport {
            results,
            hospitalizations,
            positives_by_commune,
            incidence,
            region_incidence,
            origins,
            age_ranges,
            gestation,
        })
    }

    fn incidence(&self, split: &CommuneSplit) -> Vec<IncidenceRate> {
        split
            .communes
            .iter()
            .filter_map(|count| {
                let commune_id = count.commune_id?;
                let population = *self.scope.commune_population.get(&commune_id)?;
                Some(incidence_rate(
                    Some(commune_id),
                    count.name.clone(),
                    population,
                    count.total,
                ))
            })
            .collect()
    }

    fn origin_rows(&self, patients: &[Patient], base: &CaseCriterion) -> Vec<OriginRow> {
        let origins = &self.scope.origins;
        let mut institutional = origins.hospital.clone();
        institutional.extend(origins.private.iter().cloned());

        [
            ("Hospital", CaseRule::OriginIn(origins.hospital.clone())),
            ("APS", CaseRule::OriginNotIn(institutional)),
            ("Privados", CaseRule::OriginIn(origins.private.clone())),
        ]
        .into_iter()
        .map(|(label, rule)| {
            let criterion = base.with(rule);
            OriginRow {
                label,
                total: criterion.count(patients),
                positives: criterion
                    .with(CaseRule::Result(PcrResult::Positive))
                    .count(patients),
            }
        })
        .collect()
    }
}

fn split_cases_by_commune(cases: &[(&Patient, &SuspectCase)], communes: &[Commune]) -> CommuneSplit {
    fn tally<'a>(
        commune_id: Option<CommuneId>,
        name: String,
        patients: impl Iterator<Item = &'a Patient>,
    ) -> CommuneCount {
        let mut count = CommuneCount {
            commune_id,
            name,
            total: 0,
            male: 0,
            female: 0,
        };
        for patient in patients {
            count.total += 1;
            match patient.gender {
                Gender::Male => count.male += 1,
                Gender::Female => count.female += 1,
                Gender::Other | Gender::Unknown => {}
            }
        }
        count
    }

    let in_commune = |id: Option<CommuneId>| {
        cases
            .iter()
            .map(|(patient, _)| *patient)
            .filter(move |patient| patient.commune_id() == id)
    };

    CommuneSplit {
        communes: communes
            .iter()
            .map(|commune| tally(Some(commune.id), commune.name.clone(), in_commune(Some(commune.id))))
            .collect(),
        unregistered: tally(None, UNREGISTERED_LABEL.to_string(), in_commune(None)),
    }
}

fn incidence_rate(
    commune_id: Option<CommuneId>,
    name: String,
    population: u64,
    positives: usize,
) -> IncidenceRate {
    let rate = if population == 0 {
        0.0
    } else {
        (positives as f64 / population as f64 * 100_000.0 * 100.0).round() / 100.0
    };
    IncidenceRate {
        commune_id,
        name,
        population,
        positives,
        rate,
    }
}
