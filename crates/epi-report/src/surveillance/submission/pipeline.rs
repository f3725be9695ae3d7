use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::batch::PendingSubmission;
use super::gateway::{GatewayError, MinistryGateway, SampleSubmission, StepResponse};
use crate::surveillance::domain::CaseId;
use crate::surveillance::store::SurveillanceStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStep {
    Create,
    Receive,
    Result,
}

impl SubmissionStep {
    pub const fn ordered() -> [Self; 3] {
        [Self::Create, Self::Receive, Self::Result]
    }

    fn notice_prefix(self) -> &'static str {
        match self {
            Self::Create => "Error al subir muestra",
            Self::Receive => "Error al recepcionar muestra",
            Self::Result => "Error al subir resultado de muestra",
        }
    }
}

impl fmt::Display for SubmissionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Receive => "receive",
            Self::Result => "result",
        })
    }
}

/// What to do with a case whose patient has no demographic record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDemographicsPolicy {
    /// Stop the batch at the offending case.
    #[default]
    Abort,
    /// Record the case as skipped and continue with the next one.
    Skip,
}

impl FromStr for MissingDemographicsPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    MissingDemographics,
    Step {
        step: SubmissionStep,
        message: String,
    },
    /// All steps succeeded but the submission id could not be stored.
    WriteBack { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionFailure {
    pub case_id: CaseId,
    #[serde(flatten)]
    pub kind: FailureKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Info,
}

/// Operator-facing message summarizing a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }
}

impl SubmissionFailure {
    pub fn notice(&self) -> Notice {
        let case_id = self.case_id;
        match &self.kind {
            FailureKind::MissingDemographics => Notice::info(format!(
                "Error al subir la muestra {case_id} en MINSAL. No existen datos demográficos asociados."
            )),
            FailureKind::Step { step, message } => Notice::info(format!(
                "{} {case_id} en MINSAL. {message}",
                step.notice_prefix()
            )),
            FailureKind::WriteBack { message } => Notice::info(format!(
                "La muestra {case_id} fue aceptada por MINSAL pero no se pudo registrar su identificador. {message}"
            )),
        }
    }
}

/// Outcome of one batch run. Cases listed in `submitted` completed all three
/// steps; a failure or cancellation leaves every later case untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubmissionReport {
    pub submitted: Vec<CaseId>,
    pub skipped: Vec<CaseId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<SubmissionFailure>,
    pub cancelled: bool,
}

impl SubmissionReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none() && !self.cancelled
    }

    pub fn notice(&self) -> Notice {
        if let Some(failure) = &self.failure {
            return failure.notice();
        }
        if self.cancelled {
            return Notice::info(format!(
                "Envío a MINSAL interrumpido; {} muestras enviadas.",
                self.submitted.len()
            ));
        }
        Notice::success("Se ha subido la información a sistema MINSAL.")
    }
}

/// Sequential, fail-fast submission of a pending batch.
///
/// No retry and no compensation: cases submitted before a failure stay
/// submitted remotely and locally.
pub struct SubmissionPipeline<S: ?Sized> {
    store: Arc<S>,
    policy: MissingDemographicsPolicy,
    cancel: Arc<AtomicBool>,
}

impl<S> SubmissionPipeline<S>
where
    S: SurveillanceStore + ?Sized,
{
    pub fn new(store: Arc<S>, policy: MissingDemographicsPolicy) -> Self {
        Self::with_cancellation(store, policy, Arc::new(AtomicBool::new(false)))
    }

    pub fn with_cancellation(
        store: Arc<S>,
        policy: MissingDemographicsPolicy,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            policy,
            cancel,
        }
    }

    /// Flag checked before each case and each step; set it to stop the batch.
    pub fn cancellation(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn run<G>(&self, gateway: &G, batch: &[PendingSubmission]) -> SubmissionReport
    where
        G: MinistryGateway + ?Sized,
    {
        let mut report = SubmissionReport::default();
        info!(cases = batch.len(), policy = ?self.policy, "ministry submission started");

        for pending in batch {
            if self.cancelled() {
                report.cancelled = true;
                break;
            }

            let case_id = pending.case.id;
            if pending.patient.demographic.is_none() {
                warn!(case_id = %case_id, "case patient has no demographic record");
                match self.policy {
                    MissingDemographicsPolicy::Abort => {
                        report.failure = Some(SubmissionFailure {
                            case_id,
                            kind: FailureKind::MissingDemographics,
                        });
                        break;
                    }
                    MissingDemographicsPolicy::Skip => {
                        report.skipped.push(case_id);
                        continue;
                    }
                }
            }

            match self.submit_case(gateway, pending) {
                Ok(CaseOutcome::Submitted) => report.submitted.push(case_id),
                Ok(CaseOutcome::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(kind) => {
                    report.failure = Some(SubmissionFailure { case_id, kind });
                    break;
                }
            }
        }

        match &report.failure {
            Some(failure) => warn!(
                case_id = %failure.case_id,
                submitted = report.submitted.len(),
                "ministry submission aborted"
            ),
            None => info!(
                submitted = report.submitted.len(),
                skipped = report.skipped.len(),
                cancelled = report.cancelled,
                "ministry submission finished"
            ),
        }
        report
    }

    fn submit_case<G>(
        &self,
        gateway: &G,
        pending: &PendingSubmission,
    ) -> Result<CaseOutcome, FailureKind>
    where
        G: MinistryGateway + ?Sized,
    {
        let mut sample = SampleSubmission::from_pending(pending);

        for step in SubmissionStep::ordered() {
            if self.cancelled() {
                return Ok(CaseOutcome::Cancelled);
            }

            let response = call_step(gateway, step, &sample);
            info!(
                case_id = %sample.case_id,
                %step,
                accepted = response.as_ref().is_ok_and(|r| r.accepted),
                "ministry step completed"
            );

            let response = response.map_err(|err| FailureKind::Step {
                step,
                message: err.to_string(),
            })?;
            if !response.accepted {
                return Err(FailureKind::Step {
                    step,
                    message: response.message,
                });
            }

            if step == SubmissionStep::Create {
                let Some(external_id) = response.external_id else {
                    return Err(FailureKind::Step {
                        step,
                        message: "respuesta sin identificador de muestra".to_string(),
                    });
                };
                sample.external_id = Some(external_id);
            }
        }

        let external_id = sample.external_id.unwrap_or_default();
        self.store
            .assign_submission_id(sample.case_id, &external_id)
            .map_err(|err| FailureKind::WriteBack {
                message: err.to_string(),
            })?;
        Ok(CaseOutcome::Submitted)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

enum CaseOutcome {
    Submitted,
    Cancelled,
}

fn call_step<G>(
    gateway: &G,
    step: SubmissionStep,
    sample: &SampleSubmission,
) -> Result<StepResponse, GatewayError>
where
    G: MinistryGateway + ?Sized,
{
    match step {
        SubmissionStep::Create => gateway.create_sample(sample),
        SubmissionStep::Receive => gateway.receive_sample(sample),
        SubmissionStep::Result => gateway.publish_result(sample),
    }
}
