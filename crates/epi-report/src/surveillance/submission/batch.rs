use chrono::NaiveDateTime;
use serde::Serialize;

use crate::surveillance::domain::{LaboratoryId, Patient, SuspectCase};
use crate::surveillance::filters::{CaseCriterion, CaseRule};
use crate::surveillance::store::{StoreError, SurveillanceStore};
use crate::surveillance::window::ReportWindow;

/// Laboratory submitted when the caller names none.
pub const DEFAULT_SUBMISSION_LABORATORY: LaboratoryId = LaboratoryId(1);

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("laboratory {0} is not enabled for ministry submission")]
    LaboratoryNotEnabled(LaboratoryId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolves the laboratory of a submission run, rejecting laboratories
/// without the ministry submission flag.
pub fn submission_laboratory<S>(
    store: &S,
    requested: Option<LaboratoryId>,
) -> Result<LaboratoryId, BatchError>
where
    S: SurveillanceStore + ?Sized,
{
    let laboratory = requested.unwrap_or(DEFAULT_SUBMISSION_LABORATORY);
    let enabled = store
        .laboratories()?
        .iter()
        .any(|lab| lab.id == laboratory && lab.ministry_submission);
    if enabled {
        Ok(laboratory)
    } else {
        Err(BatchError::LaboratoryNotEnabled(laboratory))
    }
}

/// Case awaiting submission together with its owning patient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingSubmission {
    pub patient: Patient,
    pub case: SuspectCase,
}

/// From the configured start through the end of the current laboratory shift.
pub fn submission_window(start: NaiveDateTime, now: NaiveDateTime) -> ReportWindow {
    ReportWindow::new(start, ReportWindow::shift_default(now).to)
}

/// Cases of `laboratory` resulted inside `window`, processed in-house and not
/// yet submitted, newest result first.
///
/// Submitted cases carry a submission id and drop out of every later batch.
pub fn pending_batch<S>(
    store: &S,
    laboratory: LaboratoryId,
    window: ReportWindow,
) -> Result<Vec<PendingSubmission>, StoreError>
where
    S: SurveillanceStore + ?Sized,
{
    let patients = store.patients()?;
    let criterion = CaseCriterion::all()
        .with(CaseRule::Laboratory(laboratory))
        .with(CaseRule::ResultAtWithin(window))
        .with(CaseRule::NoExternalLaboratory)
        .with(CaseRule::NotSubmitted);

    let mut batch: Vec<PendingSubmission> = criterion
        .select(&patients)
        .into_iter()
        .map(|(patient, case)| PendingSubmission {
            patient: patient.clone(),
            case: case.clone(),
        })
        .collect();
    batch.sort_by(|a, b| b.case.pcr_sars_cov_2_at.cmp(&a.case.pcr_sars_cov_2_at));
    Ok(batch)
}
