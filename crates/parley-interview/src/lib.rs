//! Interview lifecycle for Parley.
//!
//! Holds the answer store ([`store`]), the state machine that moves an
//! interview from `NOT_STARTED` through `IN_PROGRESS` to `FINISHED`
//! ([`InterviewMachine`]), and the scoring policy that turns answer scores
//! into a verdict ([`scoring`]).
//!
//! Every operation takes a SQLite connection from the caller. Mutating
//! transitions open their own immediate transaction on it; store functions
//! run inside whatever transaction the caller holds.
//!
//! # Usage
//!
//! ```rust,ignore
//! use parley_interview::{InterviewMachine, NewAnswer};
//!
//! let machine = InterviewMachine::default();
//! machine.start(&mut conn, interview_id)?;
//! machine.submit_answer(&mut conn, interview_id, &NewAnswer::text(question_id, "..."))?;
//! machine.finish(&mut conn, interview_id, None)?;
//! ```

mod error;
mod machine;
mod model;
pub mod scoring;
pub mod store;

pub use error::InterviewError;
pub use machine::{
    CandidateHook, InterviewMachine, NoopCandidateHook, StoreCandidateHook, TransitionOutcome,
};
pub use model::{Answer, Candidate, Interview, NewAnswer, Position, Question};
pub use scoring::{ScoringPolicy, ThresholdComparison};
