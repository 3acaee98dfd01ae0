pub mod answer;
pub mod chart;
pub mod page;
pub mod quiz;
pub mod report;
pub mod submission;

pub use answer::{AnswerMetadata, AnswerPayload, EngineKind, ModelReply};
pub use chart::{ChartSeries, ChartSpec, ChartType};
pub use page::{PageContent, ResourceKind, ResourceLink};
pub use quiz::{Identity, QuizRequest, QuizTask};
pub use report::{
    ChainOutcome, ChainReport, ChainStep, FailureKind, StepRecord, SubmissionRecord,
};
pub use submission::{SubmissionBody, SubmissionResult};
