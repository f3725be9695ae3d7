use chrono::NaiveDateTime;
use tracing::info;

use super::breakdown::{AgeHistogram, CommuneSplit, GenderSplit};
use super::evolution::{positives_per_result_day, EvolutionSeries};
use super::views::{ExamCounts, OwnPositivesReport, PositivesReport};
use super::{ReportError, SurveillanceReports};
use crate::surveillance::domain::{ClinicalStatus, Patient, PcrResult};
use crate::surveillance::filters::{CaseCriterion, CaseRule, PatientCriterion, PatientRule};
use crate::surveillance::scope::OperatorScope;
use crate::surveillance::store::SurveillanceStore;
use crate::surveillance::window::ReportWindow;

impl<S> SurveillanceReports<S>
where
    S: SurveillanceStore + 'static,
{
    /// Positives dashboard over the deployment commune allow-list.
    pub fn positives(&self, now: NaiveDateTime) -> Result<PositivesReport, ReportError> {
        let patients = self.store.patients()?;
        let base = PatientCriterion::positive()
            .with(PatientRule::CommuneIn(self.scope.communes.clone()));
        let population: Vec<Patient> = base.select(&patients).into_iter().cloned().collect();

        if population.is_empty() {
            info!(
                communes = self.scope.communes.len(),
                "positives report requested with no positive cases in scope"
            );
            return Err(ReportError::NoPositiveCases);
        }

        let evolution = EvolutionSeries::build(&population)?;
        let exams = ExamCounts::of(&patients);

        let ventilators = self.store.ventilators()?;
        let uci_ventilator_patients = base
            .with(PatientRule::Status(ClinicalStatus::HospitalizedUciVentilator))
            .count(&patients);

        let deceased = GenderSplit::matching(
            &patients,
            &base.with(PatientRule::Status(ClinicalStatus::Deceased)),
        );
        let age_ranges = AgeHistogram::by_birthday(&population, now.date());

        let positives: Vec<Patient> = PatientCriterion::positive()
            .select(&patients)
            .into_iter()
            .cloned()
            .collect();
        let cases_by_commune = CommuneSplit::of(&positives, &self.scoped_communes()?);

        Ok(PositivesReport {
            totals: GenderSplit::of(&population),
            evolution,
            exams,
            ventilators,
            uci_ventilator_patients,
            deceased,
            age_ranges,
            cases_by_commune,
        })
    }

    /// Positives dashboard restricted to the communes assigned to `operator`.
    pub fn positives_own(
        &self,
        operator: &OperatorScope,
        now: NaiveDateTime,
    ) -> Result<OwnPositivesReport, ReportError> {
        let patients = self.store.patients()?;
        let base =
            PatientCriterion::positive().with(PatientRule::CommuneIn(operator.communes.clone()));
        let population: Vec<Patient> = base.select(&patients).into_iter().cloned().collect();

        if population.is_empty() {
            info!(
                communes = operator.communes.len(),
                "operator positives report requested with no positive cases in scope"
            );
            return Err(ReportError::NoPositiveCases);
        }

        let evolution = EvolutionSeries::build(&population)?;

        let last_month = CaseCriterion::positive()
            .with(CaseRule::ResultAtWithin(ReportWindow::last_days(now, 30)));
        let positives_last_30_days = positives_per_result_day(
            last_month
                .select(&population)
                .into_iter()
                .filter_map(|(_, case)| case.pcr_sars_cov_2_at.map(|at| at.date())),
        );

        let deceased = GenderSplit::matching(
            &patients,
            &base.with(PatientRule::Status(ClinicalStatus::Deceased)),
        );
        let age_ranges = AgeHistogram::by_birthday(&population, now.date());
        let positives: Vec<Patient> = PatientCriterion::positive()
            .select(&patients)
            .into_iter()
            .cloned()
            .collect();
        let cases_by_commune =
            CommuneSplit::of(&positives, &self.communes_for(&operator.communes)?);

        Ok(OwnPositivesReport {
            total_patients: population.len(),
            evolution,
            positives_last_30_days,
            deceased,
            age_ranges,
            cases_by_commune,
        })
    }
}

impl ExamCounts {
    /// Case counts by PCR result over every recorded case.
    pub fn of(patients: &[Patient]) -> Self {
        let count = |result| {
            CaseCriterion::all()
                .with(CaseRule::Result(result))
                .count(patients)
        };
        Self {
            total: CaseCriterion::all().count(patients),
            positive: count(PcrResult::Positive),
            negative: count(PcrResult::Negative),
            pending: count(PcrResult::Pending),
            undetermined: count(PcrResult::Undetermined),
            rejected: count(PcrResult::Rejected),
        }
    }
}
