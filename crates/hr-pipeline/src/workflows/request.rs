//! Client hiring request pipeline, from intake to a placed developer.

use serde::{Deserialize, Serialize};

use super::pipeline::{DefinitionError, PipelineDefinition, PipelineService, PipelineStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    New,
    CvSearch,
    CvSent,
    DetailsClarification,
    ClientReview,
    Precheck,
    #[serde(rename = "interview_1")]
    Interview1,
    #[serde(rename = "interview_2")]
    Interview2,
    #[serde(rename = "interview_3")]
    Interview3,
    WaitDecision,
    OnProject,
    CancelledByUs,
    Rejected,
}

impl PipelineStage for RequestStatus {
    fn all() -> &'static [Self] {
        &[
            Self::New,
            Self::CvSearch,
            Self::CvSent,
            Self::DetailsClarification,
            Self::ClientReview,
            Self::Precheck,
            Self::Interview1,
            Self::Interview2,
            Self::Interview3,
            Self::WaitDecision,
            Self::OnProject,
            Self::CancelledByUs,
            Self::Rejected,
        ]
    }

    fn key(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::CvSearch => "cv_search",
            Self::CvSent => "cv_sent",
            Self::DetailsClarification => "details_clarification",
            Self::ClientReview => "client_review",
            Self::Precheck => "precheck",
            Self::Interview1 => "interview_1",
            Self::Interview2 => "interview_2",
            Self::Interview3 => "interview_3",
            Self::WaitDecision => "wait_decision",
            Self::OnProject => "on_project",
            Self::CancelledByUs => "cancelled_by_us",
            Self::Rejected => "rejected",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::CvSearch => "CV Search",
            Self::CvSent => "CV Sent",
            Self::DetailsClarification => "Details Clarification",
            Self::ClientReview => "Client Review",
            Self::Precheck => "Precheck",
            Self::Interview1 => "Interview 1",
            Self::Interview2 => "Interview 2",
            Self::Interview3 => "Interview 3",
            Self::WaitDecision => "Waiting for Decision",
            Self::OnProject => "On Project",
            Self::CancelledByUs => "Cancelled by Us",
            Self::Rejected => "Rejected",
        }
    }
}

pub type RequestService<R, A> = PipelineService<RequestStatus, R, A>;

/// Request pipeline: ranks start at 0 for `new` and end at 10 for `on_project`.
pub fn request_pipeline() -> Result<PipelineDefinition<RequestStatus>, DefinitionError> {
    use RequestStatus::*;

    PipelineDefinition::builder("request", "status")
        .order(&[
            New,
            CvSearch,
            CvSent,
            DetailsClarification,
            ClientReview,
            Precheck,
            Interview1,
            Interview2,
            Interview3,
            WaitDecision,
            OnProject,
        ])
        .transition(New, &[CvSearch])
        .transition(CvSearch, &[CvSent])
        .transition(CvSent, &[DetailsClarification])
        .transition(DetailsClarification, &[ClientReview])
        .transition(ClientReview, &[Precheck, Interview1])
        .transition(Precheck, &[Interview1])
        .transition(Interview1, &[Interview2, WaitDecision])
        .transition(Interview2, &[Interview3, WaitDecision])
        .transition(Interview3, &[WaitDecision])
        .transition(WaitDecision, &[OnProject])
        .absorbing(&[CancelledByUs, Rejected])
        .build()
}
