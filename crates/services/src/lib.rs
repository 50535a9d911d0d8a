#![forbid(unsafe_code)]

pub mod error;
pub mod exposure;
pub mod remote;
pub mod sessions;

pub use exam_core::Clock;
pub use sessions as session;

pub use error::{RemoteSinkError, SessionError};
pub use exposure::{Classified, ExposureTracker};
pub use remote::{AnswerEnvelope, HttpAnswerSink, NoopAnswerSink, RemoteAnswerSink, SyncConfig};

pub use sessions::{
    CompletedSession, CompletionOutcome, DifficultyController, ExamLoopService, ExamSession,
    Pace, RecoveryAction, RecoveryPrompt, SessionAssembler, SessionPlan, SessionProgress,
    SessionResultService,
};
