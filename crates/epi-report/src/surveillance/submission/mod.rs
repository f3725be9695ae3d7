//! Outbound submission of resulted cases to the health ministry web service.
//!
//! Each case goes through three remote steps in order (create sample, receive
//! sample, publish result). The first rejected step aborts the whole batch.

mod batch;
mod gateway;
mod pipeline;

pub use batch::{
    pending_batch, submission_laboratory, submission_window, BatchError, PendingSubmission,
    DEFAULT_SUBMISSION_LABORATORY,
};
pub use gateway::{
    GatewayConnector, GatewayError, HttpMinistryConnector, HttpMinistryGateway, MinistryGateway,
    SampleSubmission, StepResponse,
};
pub use pipeline::{
    FailureKind, MissingDemographicsPolicy, Notice, NoticeLevel, SubmissionFailure,
    SubmissionPipeline, SubmissionReport, SubmissionStep,
};
