use thiserror::Error;

use crate::data::InvariantClass;

/// Malformed or cross-reference-broken input, detected before modelling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidInputError {
    #[error("duplicate {kind} id `{id}`")]
    DuplicateId { kind: &'static str, id: String },

    #[error("{owner_kind} `{owner}` references unknown {target_kind} `{target}`")]
    DanglingReference {
        owner_kind: &'static str,
        owner: String,
        target_kind: &'static str,
        target: String,
    },

    #[error("course `{course}` has a duration of zero slots")]
    ZeroDuration { course: String },

    #[error("timeslots `{first}` and `{second}` both describe {day} period {period}")]
    DuplicateGridCell {
        first: String,
        second: String,
        day: String,
        period: u32,
    },

    #[error("invalid solve configuration: {0}")]
    Config(String),
}

/// A contradiction discovered while building the constraint model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("course `{course}` has no eligible faculty")]
    NoEligibleFaculty { course: String },

    #[error("course `{course}` has no feasible placement: {reason}")]
    EmptyDomain {
        course: String,
        invariant: InvariantClass,
        reason: String,
    },

    #[error("course `{course}` needs {sessions} sessions but only {timeslots} timeslots exist")]
    TooManySessions {
        course: String,
        sessions: u32,
        timeslots: usize,
    },

    #[error("failed to start search workers: {0}")]
    WorkerPool(String),

    #[error("search produced an invalid assignment: {0}")]
    InvalidSolution(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),

    #[error(transparent)]
    Model(#[from] ModelError),
}
