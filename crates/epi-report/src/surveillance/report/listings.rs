use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use super::views::{
    CaseListEntry, ChartDay, CommuneTracingRow, PatientListEntry, TracingListEntry,
};
use super::{ReportError, SurveillanceReports};
use crate::surveillance::domain::{
    ClinicalStatus, CommuneId, LaboratoryId, Patient, PcrResult, TracingStatus,
};
use crate::surveillance::filters::{CaseCriterion, CaseRule, PatientCriterion, PatientRule};
use crate::surveillance::scope::OperatorScope;
use crate::surveillance::store::SurveillanceStore;
use crate::surveillance::window::ReportWindow;

/// Cases still pending this long after reception are flagged as stale.
const STALE_PENDING_DAYS: i64 = 2;

/// Look-back of the recent positives-with-result-file list.
const RESULT_FILE_DAYS: i64 = 2;

impl<S> SurveillanceReports<S>
where
    S: SurveillanceStore + 'static,
{
    /// Positive patients in a hospitalization tier, ordered by status.
    pub fn hospitalized(
        &self,
        operator: Option<&OperatorScope>,
        today: NaiveDate,
    ) -> Result<Vec<PatientListEntry>, ReportError> {
        let patients = self.store.patients()?;
        let mut criterion = PatientCriterion::positive().with(PatientRule::Hospitalized);
        if let Some(operator) = operator {
            criterion = criterion.with(PatientRule::CommuneIn(operator.communes.clone()));
        }

        let mut selected = criterion.select(&patients);
        selected.sort_by_key(|patient| patient.status.map(ClinicalStatus::label));
        Ok(patient_entries(selected, today))
    }

    /// Deceased positive patients, earliest death first.
    pub fn deceased(&self, today: NaiveDate) -> Result<Vec<PatientListEntry>, ReportError> {
        let patients = self.store.patients()?;
        let mut selected = PatientCriterion::positive()
            .with(PatientRule::Status(ClinicalStatus::Deceased))
            .select(&patients);
        selected.sort_by_key(|patient| patient.deceased_at);
        Ok(patient_entries(selected, today))
    }

    /// Every case with a result inside `window`, optionally for one commune.
    pub fn positives_by_range(
        &self,
        window: ReportWindow,
        commune: Option<CommuneId>,
    ) -> Result<Vec<CaseListEntry>, ReportError> {
        let criterion = CaseCriterion::all()
            .with(CaseRule::ResultAtWithin(window))
            .with(CaseRule::ResultIn(PcrResult::ordered().to_vec()));
        self.cases_by_result_at(with_commune(criterion, commune))
    }

    /// Pending cases sampled inside `window`, optionally for one commune.
    pub fn pending_by_range(
        &self,
        window: ReportWindow,
        commune: Option<CommuneId>,
    ) -> Result<Vec<CaseListEntry>, ReportError> {
        let criterion = CaseCriterion::all()
            .with(CaseRule::SampleAtWithin(window))
            .with(CaseRule::Result(PcrResult::Pending));
        self.cases_by_result_at(with_commune(criterion, commune))
    }

    /// Cases with a result inside `window` for the operator's communes.
    ///
    /// A selected commune outside the operator's assignment yields nothing.
    pub fn cases_by_commune(
        &self,
        operator: &OperatorScope,
        window: ReportWindow,
        commune: Option<CommuneId>,
    ) -> Result<Vec<CaseListEntry>, ReportError> {
        let communes = match commune {
            Some(selected) if operator.communes.contains(&selected) => vec![selected],
            Some(_) => Vec::new(),
            None => operator.communes.clone(),
        };
        let criterion = CaseCriterion::all()
            .with(CaseRule::ResultAtWithin(window))
            .with_patient(PatientRule::CommuneIn(communes));
        self.cases_by_result_at(criterion)
    }

    /// Pending cases received at least two days before `now`.
    pub fn pending_more_than_two_days(
        &self,
        now: NaiveDateTime,
    ) -> Result<Vec<CaseListEntry>, ReportError> {
        let criterion = CaseCriterion::all()
            .with(CaseRule::Result(PcrResult::Pending))
            .with(CaseRule::ReceivedOnOrBefore(now - Duration::days(STALE_PENDING_DAYS)));
        self.case_entries(&criterion)
    }

    pub fn without_reception(&self) -> Result<Vec<CaseListEntry>, ReportError> {
        self.case_entries(&CaseCriterion::all().with(CaseRule::NotReceived))
    }

    /// Patients with at least one case flagged as gestation.
    pub fn gestants(&self, today: NaiveDate) -> Result<Vec<PatientListEntry>, ReportError> {
        let patients = self.store.patients()?;
        let selected = PatientCriterion::all()
            .with(PatientRule::HasCase(
                CaseCriterion::all().with(CaseRule::Gestation),
            ))
            .select(&patients);
        Ok(patient_entries(selected, today))
    }

    /// Laboratory cases with a result inside `window`, excluding external labs.
    pub fn laboratory_results(
        &self,
        laboratory: LaboratoryId,
        window: ReportWindow,
    ) -> Result<Vec<CaseListEntry>, ReportError> {
        let criterion = CaseCriterion::all()
            .with(CaseRule::Laboratory(laboratory))
            .with(CaseRule::ResultAtWithin(window))
            .with(CaseRule::NoExternalLaboratory);
        Ok(newest_first(self.case_entries(&criterion)?))
    }

    /// Laboratory cases received inside `window`, excluding external labs.
    pub fn laboratory_receptions(
        &self,
        laboratory: LaboratoryId,
        window: ReportWindow,
    ) -> Result<Vec<CaseListEntry>, ReportError> {
        let criterion = CaseCriterion::all()
            .with(CaseRule::Laboratory(laboratory))
            .with(CaseRule::ReceptionAtWithin(window))
            .with(CaseRule::NoExternalLaboratory);
        Ok(newest_first(self.case_entries(&criterion)?))
    }

    /// Cases sampled inside `window` owned by the operator's establishments
    /// or created by the operator. `None` covers every laboratory.
    pub fn own_cases(
        &self,
        operator: &OperatorScope,
        window: ReportWindow,
        laboratory: Option<LaboratoryId>,
    ) -> Result<Vec<CaseListEntry>, ReportError> {
        let mut criterion = CaseCriterion::all()
            .with(CaseRule::SampleAtWithin(window))
            .with(CaseRule::OwnedBy {
                establishments: operator.establishments.clone(),
                user: operator.user_id,
            });
        if let Some(laboratory) = laboratory {
            criterion = criterion.with(CaseRule::Laboratory(laboratory));
        }
        Ok(newest_first(self.case_entries(&criterion)?))
    }

    /// Every case processed by `laboratory`, newest first.
    pub fn laboratory_cases(
        &self,
        laboratory: LaboratoryId,
    ) -> Result<Vec<CaseListEntry>, ReportError> {
        let criterion = CaseCriterion::all().with(CaseRule::Laboratory(laboratory));
        Ok(newest_first(self.case_entries(&criterion)?))
    }

    /// Positive cases with an uploaded result file, resulted in the last two
    /// days, most recently created first.
    pub fn exams_with_result(&self, now: NaiveDateTime) -> Result<Vec<CaseListEntry>, ReportError> {
        let patients = self.store.patients()?;
        let mut selected = CaseCriterion::positive()
            .with(CaseRule::WithResultFile)
            .with(CaseRule::ResultAtWithin(ReportWindow::last_days(now, RESULT_FILE_DAYS)))
            .select(&patients);
        selected.sort_by(|(_, a), (_, b)| b.created_at.cmp(&a.created_at));
        Ok(selected
            .into_iter()
            .map(|(patient, case)| CaseListEntry::new(patient, case))
            .collect())
    }

    /// Index cases traced by the operator's establishments and notified
    /// inside `window`, earliest notification first.
    pub fn index_tracings(
        &self,
        operator: &OperatorScope,
        window: ReportWindow,
    ) -> Result<Vec<TracingListEntry>, ReportError> {
        let criterion = index_cases_of(operator).with(PatientRule::TracingNotifiedWithin(window));
        self.tracing_entries(&criterion)
    }

    /// Index cases traced by the operator's establishments whose RUN or
    /// foreign identification equals `identification`.
    pub fn index_tracing_by_patient(
        &self,
        operator: &OperatorScope,
        identification: &str,
    ) -> Result<Vec<TracingListEntry>, ReportError> {
        if identification.trim().is_empty() {
            return Ok(Vec::new());
        }
        let criterion = index_cases_of(operator)
            .with(PatientRule::Identified(identification.to_string()));
        self.tracing_entries(&criterion)
    }

    /// Patients under active tracing by the operator's establishments who
    /// need a sick-leave licence.
    pub fn licences_required(
        &self,
        operator: &OperatorScope,
    ) -> Result<Vec<TracingListEntry>, ReportError> {
        let criterion = PatientCriterion::all()
            .with(PatientRule::TracingInProgress)
            .with(PatientRule::TracingRequiresLicence)
            .with(PatientRule::TracedBy(operator.establishments.clone()));
        self.tracing_entries(&criterion)
    }

    /// Number of patients with at least one positive case.
    pub fn count_positives(&self) -> Result<usize, ReportError> {
        let patients = self.store.patients()?;
        Ok(PatientCriterion::positive().count(&patients))
    }

    /// Patients with any result recorded since yesterday, with nested cases.
    pub fn expert_feed(&self, now: NaiveDateTime) -> Result<Vec<Patient>, ReportError> {
        let patients = self.store.patients()?;
        let recent = CaseCriterion::all()
            .with(CaseRule::ResultAtWithin(ReportWindow::since_yesterday(now)));
        Ok(PatientCriterion::all()
            .with(PatientRule::HasCase(recent))
            .select(&patients)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Positive and pending counts per sample day; days without either are absent.
    pub fn case_chart(
        &self,
        window: ReportWindow,
    ) -> Result<BTreeMap<NaiveDate, ChartDay>, ReportError> {
        let patients = self.store.patients()?;
        let criterion = CaseCriterion::all()
            .with(CaseRule::SampleAtWithin(window))
            .with(CaseRule::ResultIn(vec![PcrResult::Positive, PcrResult::Pending]));

        let mut chart: BTreeMap<NaiveDate, ChartDay> = BTreeMap::new();
        for (_, case) in criterion.select(&patients) {
            let day = chart.entry(case.sample_at.date()).or_default();
            match case.pcr_sars_cov_2 {
                PcrResult::Positive => day.positives += 1,
                PcrResult::Pending => day.pending += 1,
                _ => {}
            }
        }
        Ok(chart)
    }

    /// Per region commune, sorted by name: positives resulted on `date`,
    /// contacts registered by those patients and their tracing state.
    pub fn tracing_by_communes(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<CommuneTracingRow>, ReportError> {
        let Some(region) = self.scope.region else {
            return Ok(Vec::new());
        };

        let mut communes: Vec<_> = self
            .store
            .communes()?
            .into_iter()
            .filter(|commune| commune.region_id == region)
            .collect();
        communes.sort_by(|a, b| a.name.cmp(&b.name));

        let mut rows: Vec<CommuneTracingRow> = communes
            .into_iter()
            .map(|commune| CommuneTracingRow {
                commune_id: commune.id,
                commune: commune.name,
                positives: 0,
                contacts: 0,
                in_progress: 0,
                finished: 0,
            })
            .collect();

        let patients = self.store.patients()?;
        let resulted = CaseCriterion::positive()
            .with(CaseRule::ResultAtWithin(ReportWindow::single_day(date)));
        let criterion = PatientCriterion::all()
            .with(PatientRule::HasCase(resulted))
            .with(PatientRule::Region(region));

        for patient in criterion.select(&patients) {
            let Some(row) = patient
                .commune_id()
                .and_then(|id| rows.iter_mut().find(|row| row.commune_id == id))
            else {
                continue;
            };
            row.positives += 1;
            row.contacts += patient.index_contacts;
            if let Some(tracing) = &patient.tracing {
                match tracing.status {
                    Some(TracingStatus::InProgress) => row.in_progress += 1,
                    Some(TracingStatus::Finished) | None => row.finished += 1,
                }
            }
        }

        Ok(rows)
    }

    fn case_entries(&self, criterion: &CaseCriterion) -> Result<Vec<CaseListEntry>, ReportError> {
        let patients = self.store.patients()?;
        Ok(criterion
            .select(&patients)
            .into_iter()
            .map(|(patient, case)| CaseListEntry::new(patient, case))
            .collect())
    }

    fn tracing_entries(
        &self,
        criterion: &PatientCriterion,
    ) -> Result<Vec<TracingListEntry>, ReportError> {
        let patients = self.store.patients()?;
        let mut entries: Vec<TracingListEntry> = criterion
            .select(&patients)
            .into_iter()
            .filter_map(TracingListEntry::new)
            .collect();
        entries.sort_by_key(|entry| (entry.notification_at, entry.patient_id));
        Ok(entries)
    }

    fn cases_by_result_at(&self, criterion: CaseCriterion) -> Result<Vec<CaseListEntry>, ReportError> {
        let mut entries = self.case_entries(&criterion)?;
        entries.sort_by_key(|entry| entry.result_at);
        Ok(entries)
    }
}

fn with_commune(criterion: CaseCriterion, commune: Option<CommuneId>) -> CaseCriterion {
    match commune {
        Some(commune) => criterion.with_patient(PatientRule::Commune(commune)),
        None => criterion,
    }
}

fn index_cases_of(operator: &OperatorScope) -> PatientCriterion {
    PatientCriterion::all()
        .with(PatientRule::TracingIndexCase)
        .with(PatientRule::TracedBy(operator.establishments.clone()))
}

fn newest_first(mut entries: Vec<CaseListEntry>) -> Vec<CaseListEntry> {
    entries.sort_by(|a, b| b.case_id.cmp(&a.case_id));
    entries
}

fn patient_entries(patients: Vec<&Patient>, today: NaiveDate) -> Vec<PatientListEntry> {
    patients
        .into_iter()
        .map(|patient| PatientListEntry::new(patient, today))
        .collect()
}
