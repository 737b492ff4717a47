//! Course timetable solver: builds a finite-domain model from courses,
//! faculty, student groups, rooms and timeslots, then races a pool of
//! backtracking workers for a conflict-free timetable under a time budget.
//!
//! With one worker the search is deterministic. With several, the first
//! worker to commit wins, so repeated runs may return different timetables
//! that are equally valid.

pub mod config;
pub mod data;
pub mod error;
pub mod model;
mod report;
mod search;
pub mod server;
mod solver;

pub use config::{Objective, SolveConfig};
pub use data::{SchedulingInput, SchedulingOutput, SolveRequest, SolveStatus};
pub use error::{InvalidInputError, ModelError, SchedulerError};
pub use solver::solve;
