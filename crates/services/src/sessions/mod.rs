mod difficulty;
mod plan;
mod progress;
mod results;
mod score;
mod session;
mod submission;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use difficulty::{DifficultyController, EASE_BELOW, Pace, PaceChange, RECOVER_AT};
pub use plan::{PlanEntry, PlanTier, SessionAssembler, SessionPlan};
pub use progress::SessionProgress;
pub use results::SessionResultService;
pub use score::ScoreAggregator;
pub use session::ExamSession;
pub use submission::{
    AnswerLedger, AnswerPipeline, AttemptResolution, RecoveryAction, RecoveryPrompt,
};
pub use workflow::{CompletedSession, CompletionOutcome, ExamLoopService};
