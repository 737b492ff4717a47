use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::SolveConfig;

// Type aliases for clarity
pub type CourseId = String;
pub type FacultyId = String;
pub type GroupId = String;
pub type RoomId = String;
pub type TimeslotId = String;
pub type SessionId = String;

fn one() -> u32 {
    1
}

/// A course to be scheduled, expanded into `sessions_per_week` sessions.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: CourseId,
    #[serde(default)]
    pub name: Option<String>,
    pub sessions_per_week: u32,
    #[serde(default = "one")]
    pub duration_slots: u32,
    pub eligible_faculty_ids: Vec<FacultyId>,
    #[serde(default)]
    pub student_group_ids: Vec<GroupId>,
    #[serde(default)]
    pub room_type: Option<String>,
}

/// A teacher with their scheduling constraints.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Faculty {
    pub id: FacultyId,
    #[serde(default)]
    pub name: Option<String>,
    /// Courses this faculty may teach. Empty means any course listing them.
    #[serde(default)]
    pub course_ids: Vec<CourseId>,
    /// `None` means available in every timeslot.
    #[serde(default)]
    pub available_timeslot_ids: Option<Vec<TimeslotId>>,
    #[serde(default)]
    pub unavailable_timeslot_ids: Vec<TimeslotId>,
    #[serde(default)]
    pub preferred_timeslot_ids: Vec<TimeslotId>,
    /// `None` means unbounded.
    #[serde(default)]
    pub max_weekly_sessions: Option<u32>,
}

/// A cohort of students attending the same set of courses.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGroup {
    pub id: GroupId,
    #[serde(default)]
    pub course_ids: Vec<CourseId>,
    #[serde(default)]
    pub size: u32,
}

/// Represents a physical room with a given capacity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Room {
    pub id: RoomId,
    pub capacity: u32,
    #[serde(rename = "type", default)]
    pub room_type: Option<String>,
}

/// One cell of the weekly grid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Timeslot {
    pub id: TimeslotId,
    pub day: String,
    pub period: u32,
}

/// Shorthand for a regular grid of `days × periods_per_day` timeslots.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeslotGrid {
    pub days: Vec<String>,
    pub periods_per_day: u32,
}

impl TimeslotGrid {
    /// Generates `"<day>-P<period>"` timeslots, day-major, periods starting at 1.
    pub fn timeslots(&self) -> Vec<Timeslot> {
        self.days
            .iter()
            .flat_map(|day| {
                (1..=self.periods_per_day).map(move |period| Timeslot {
                    id: format!("{day}-P{period}"),
                    day: day.clone(),
                    period,
                })
            })
            .collect()
    }
}

/// The complete input for the scheduling problem.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingInput {
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub faculty: Vec<Faculty>,
    #[serde(default)]
    pub student_groups: Vec<StudentGroup>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub timeslots: Vec<Timeslot>,
    #[serde(default)]
    pub grid: Option<TimeslotGrid>,
}

impl SchedulingInput {
    /// Explicit timeslots win over the grid shorthand.
    pub fn resolved_timeslots(&self) -> Vec<Timeslot> {
        match (&self.grid, self.timeslots.is_empty()) {
            (Some(grid), true) => grid.timeslots(),
            _ => self.timeslots.clone(),
        }
    }
}

/// Request body accepted by the HTTP shell and the `solve` subcommand.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SolveRequest {
    #[serde(flatten)]
    pub input: SchedulingInput,
    #[serde(default)]
    pub config: SolveConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolveStatus {
    Feasible,
    Infeasible,
    TimeoutNoSolution,
    TimeoutPartial,
    ModelError,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SolveStatus::Feasible => "FEASIBLE",
            SolveStatus::Infeasible => "INFEASIBLE",
            SolveStatus::TimeoutNoSolution => "TIMEOUT_NO_SOLUTION",
            SolveStatus::TimeoutPartial => "TIMEOUT_PARTIAL",
            SolveStatus::ModelError => "MODEL_ERROR",
        };
        f.write_str(label)
    }
}

/// Represents a single, scheduled session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableEntry {
    pub session_id: SessionId,
    pub course_id: CourseId,
    pub timeslot_id: TimeslotId,
    pub day: String,
    pub period: u32,
    pub faculty_id: FacultyId,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub room_id: Option<RoomId>,
}

/// Which hard-constraint family a diagnostic is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvariantClass {
    Coverage,
    FacultyOverlap,
    StudentGroupOverlap,
    RoomOverlap,
    /// A room too small for the enrolled groups or of the wrong type.
    RoomFit,
    Availability,
    LoadBound,
}

impl fmt::Display for InvariantClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InvariantClass::Coverage => "coverage",
            InvariantClass::FacultyOverlap => "faculty overlap",
            InvariantClass::StudentGroupOverlap => "student group overlap",
            InvariantClass::RoomOverlap => "room overlap",
            InvariantClass::RoomFit => "room fit",
            InvariantClass::Availability => "availability",
            InvariantClass::LoadBound => "load bound",
        };
        f.write_str(label)
    }
}

/// A human-readable reason attached to a failed or timed-out solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub invariant: InvariantClass,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub resource: Option<String>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.invariant, self.message)
    }
}

/// Describes a soft constraint that was not met in the final schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmetSoftConstraint {
    pub constraint_type: String,
    pub description: String,
}

impl fmt::Display for UnmetSoftConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.constraint_type, self.description)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveStats {
    pub solve_time_ms: u64,
    pub time_budget_ms: u64,
    pub worker_count: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub winning_worker: Option<usize>,
    pub nodes_explored: u64,
    pub session_count: usize,
    pub variable_domain_size: usize,
    pub constraint_count: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub objective_value: Option<u64>,
    pub proven_optimal: bool,
}

/// The final output of the solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingOutput {
    pub status: SolveStatus,
    /// Complete timetable; empty unless `status` is `FEASIBLE`.
    pub timetable: Vec<TimetableEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub partial: Vec<TimetableEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub unscheduled_session_ids: Vec<SessionId>,
    pub diagnostics: Vec<Diagnostic>,
    pub unmet_soft_constraints: Vec<UnmetSoftConstraint>,
    pub stats: SolveStats,
}

impl SchedulingOutput {
    pub fn is_feasible(&self) -> bool {
        self.status == SolveStatus::Feasible
    }
}
