//! Developer response (candidate) interview pipeline.

use serde::{Deserialize, Serialize};

use super::pipeline::{DefinitionError, PipelineDefinition, PipelineService, PipelineStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStage {
    CvSelected,
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

impl PipelineStage for ResponseStage {
    fn all() -> &'static [Self] {
        &[
            Self::CvSelected,
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
            Self::CvSelected => "cv_selected",
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
            Self::CvSelected => "CV Selected",
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

pub type ResponseService<R, A> = PipelineService<ResponseStage, R, A>;

/// Response pipeline. Ranks are 1-based (`cv_selected` = 1, `on_project` = 10) so
/// stored high-water marks of existing responses keep their meaning.
pub fn response_pipeline() -> Result<PipelineDefinition<ResponseStage>, DefinitionError> {
    use ResponseStage::*;

    PipelineDefinition::builder("response", "stage")
        .order(&[
            CvSelected,
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
        .base_rank(1)
        .transition(CvSelected, &[CvSent])
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
