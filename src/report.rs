//! Result extraction: turns a search outcome into the public timetable or a
//! structured failure report.

use itertools::Itertools;
use std::collections::BTreeSet;

use crate::data::{
    Diagnostic, InvariantClass, SchedulingOutput, SolveStats, SolveStatus, TimetableEntry,
    UnmetSoftConstraint,
};
use crate::error::ModelError;
use crate::model::{Placement, Resource, TimetableModel, resource_invariant};
use crate::search::WorkerReport;
use crate::solver::{Outcome, Verdict};

const SATURATION_THRESHOLD: f64 = 0.75;
const MAX_REPORTED: usize = 5;

impl SchedulingOutput {
    fn with_status(status: SolveStatus, stats: SolveStats) -> Self {
        Self {
            status,
            timetable: Vec::new(),
            partial: Vec::new(),
            unscheduled_session_ids: Vec::new(),
            diagnostics: Vec::new(),
            unmet_soft_constraints: Vec::new(),
            stats,
        }
    }

    /// Renders a model-construction failure as a `MODEL_ERROR` body.
    pub fn from_model_error(err: &ModelError) -> Self {
        let (invariant, resource) = match err {
            ModelError::NoEligibleFaculty { course }
            | ModelError::TooManySessions { course, .. } => {
                (InvariantClass::Coverage, Some(course.clone()))
            }
            ModelError::EmptyDomain {
                course, invariant, ..
            } => (*invariant, Some(course.clone())),
            ModelError::WorkerPool(_) | ModelError::InvalidSolution(_) => {
                (InvariantClass::Coverage, None)
            }
        };
        let mut output = Self::with_status(SolveStatus::ModelError, SolveStats::default());
        output.diagnostics.push(Diagnostic {
            invariant,
            resource,
            message: err.to_string(),
        });
        output
    }
}

pub(crate) fn empty_timetable(stats: SolveStats) -> SchedulingOutput {
    SchedulingOutput::with_status(SolveStatus::Feasible, stats)
}

pub(crate) fn failure(
    status: SolveStatus,
    diagnostics: Vec<Diagnostic>,
    stats: SolveStats,
) -> SchedulingOutput {
    let mut output = SchedulingOutput::with_status(status, stats);
    output.diagnostics = diagnostics;
    output
}

/// The deadline passed before the search could start.
pub(crate) fn out_of_time(stats: SolveStats) -> SchedulingOutput {
    failure(
        SolveStatus::TimeoutNoSolution,
        vec![undetermined(&stats)],
        stats,
    )
}

fn undetermined(stats: &SolveStats) -> Diagnostic {
    Diagnostic {
        invariant: InvariantClass::Coverage,
        resource: None,
        message: format!(
            "no complete timetable found within the {} ms budget; \
             feasibility is undetermined",
            stats.time_budget_ms
        ),
    }
}

pub(crate) fn extract(
    model: &TimetableModel,
    outcome: Outcome,
    mut stats: SolveStats,
) -> SchedulingOutput {
    match outcome.verdict {
        Verdict::Solved {
            found,
            proven_optimal,
        } => {
            stats.winning_worker = Some(found.worker);
            stats.objective_value = model.objective.map(|_| found.cost);
            stats.proven_optimal = proven_optimal;
            let mut output = SchedulingOutput::with_status(SolveStatus::Feasible, stats);
            output.timetable = entries(model, found.placements.iter().copied().enumerate());
            output.unmet_soft_constraints = unmet_soft_constraints(model, &found.placements);
            output
        }
        Verdict::Infeasible => {
            let mut diagnostics = search_conflicts(model, &outcome.reports);
            diagnostics.extend(saturation(model));
            failure(SolveStatus::Infeasible, with_fallback(diagnostics), stats)
        }
        Verdict::TimedOut { partial } => {
            let mut diagnostics = vec![undetermined(&stats)];
            diagnostics.extend(search_conflicts(model, &outcome.reports));
            diagnostics.extend(saturation(model));
            match partial {
                Some(partial) => {
                    let mut output = failure(SolveStatus::TimeoutPartial, diagnostics, stats);
                    output.partial = entries(
                        model,
                        partial
                            .placements
                            .iter()
                            .enumerate()
                            .filter_map(|(s, p)| p.map(|p| (s, p))),
                    );
                    output.unscheduled_session_ids = partial
                        .placements
                        .iter()
                        .enumerate()
                        .filter(|(_, p)| p.is_none())
                        .map(|(s, _)| model.sessions[s].id.clone())
                        .collect();
                    output
                }
                None => failure(SolveStatus::TimeoutNoSolution, diagnostics, stats),
            }
        }
    }
}

fn entries(
    model: &TimetableModel,
    placements: impl Iterator<Item = (usize, Placement)>,
) -> Vec<TimetableEntry> {
    placements
        .map(|(s, p)| {
            let session = &model.sessions[s];
            let slot = &model.slots[p.start];
            TimetableEntry {
                session_id: session.id.clone(),
                course_id: model.courses[session.course].id.clone(),
                timeslot_id: slot.id.clone(),
                day: slot.day.clone(),
                period: slot.period,
                faculty_id: model.faculty[p.faculty].id.clone(),
                room_id: p.room.map(|r| model.rooms[r].id.clone()),
            }
        })
        .collect()
}

/// Lists preferences the assignment misses: sessions outside the faculty's
/// preferred slots and back-to-back sessions for one faculty.
fn unmet_soft_constraints(
    model: &TimetableModel,
    placements: &[Placement],
) -> Vec<UnmetSoftConstraint> {
    let mut unmet = Vec::new();

    for (s, p) in placements.iter().enumerate() {
        let faculty = &model.faculty[p.faculty];
        let course = model.sessions[s].course;
        let outside = model
            .span(course, p.start)
            .any(|slot| !faculty.preferred[slot]);
        if faculty.has_preferences && outside {
            unmet.push(UnmetSoftConstraint {
                constraint_type: "Outside Preferred Time".to_string(),
                description: format!(
                    "Session {} is taught by faculty {} at {}, outside their preferred timeslots.",
                    model.sessions[s].id, faculty.id, model.slots[p.start].id
                ),
            });
        }
    }

    let by_faculty = placements
        .iter()
        .enumerate()
        .map(|(s, p)| (p.faculty, (s, p)))
        .into_group_map();
    for (faculty, mut taught) in by_faculty.into_iter().sorted_by_key(|(f, _)| *f) {
        taught.sort_by_key(|(_, p)| p.start);
        for ((s, current), (n, next)) in taught.into_iter().tuple_windows() {
            let end = current.start + model.courses[model.sessions[s].course].duration;
            let same_day =
                model.slots[current.start].day_index == model.slots[next.start].day_index;
            if same_day && end == next.start {
                unmet.push(UnmetSoftConstraint {
                    constraint_type: "Avoid Back-to-Back Classes".to_string(),
                    description: format!(
                        "Faculty {} has back-to-back sessions: \
                         {} (ends before {}) and {} (starts at {}).",
                        model.faculty[faculty].id,
                        model.sessions[s].id,
                        model.slots[next.start].id,
                        model.sessions[n].id,
                        model.slots[next.start].id
                    ),
                });
            }
        }
    }
    unmet
}

/// Slots a course can occupy under some placement of its domain.
fn coverable(model: &TimetableModel, course: usize) -> BTreeSet<usize> {
    model.courses[course]
        .domain
        .iter()
        .flat_map(|p| model.span(course, p.start))
        .collect()
}

fn demand(model: &TimetableModel, course: usize) -> usize {
    model.courses[course].sessions.len() * model.courses[course].duration
}

/// A resource's required session slots against the slots it can offer.
struct Pressure {
    invariant: InvariantClass,
    resource: String,
    label: String,
    demand: usize,
    capacity: usize,
}

impl Pressure {
    fn ratio(&self) -> f64 {
        if self.capacity == 0 {
            f64::INFINITY
        } else {
            self.demand as f64 / self.capacity as f64
        }
    }
}

/// Pigeonhole bounds that hold for every assignment: a course, a sole
/// faculty, a student group or a room set cannot absorb more session slots
/// than the timeslots its courses can reach.
fn pressures(model: &TimetableModel) -> Vec<Pressure> {
    let n = model.courses.len();
    let covers: Vec<BTreeSet<usize>> = (0..n).map(|c| coverable(model, c)).collect();
    let union_of = |courses: &[usize]| -> usize {
        courses
            .iter()
            .flat_map(|&c| covers[c].iter().copied())
            .collect::<BTreeSet<_>>()
            .len()
    };
    let faculty_of: Vec<BTreeSet<usize>> = model
        .courses
        .iter()
        .map(|course| course.domain.iter().map(|p| p.faculty).collect())
        .collect();
    let mut out = Vec::new();

    for (c, course) in model.courses.iter().enumerate() {
        out.push(Pressure {
            invariant: InvariantClass::Coverage,
            resource: course.id.clone(),
            label: format!("Course {}", course.id),
            demand: demand(model, c),
            capacity: covers[c].len(),
        });
    }

    for (f, faculty) in model.faculty.iter().enumerate() {
        let sole: Vec<usize> = (0..n)
            .filter(|&c| !model.courses[c].sessions.is_empty())
            .filter(|&c| faculty_of[c].iter().eq([&f]))
            .collect();
        if sole.is_empty() {
            continue;
        }
        out.push(Pressure {
            invariant: InvariantClass::FacultyOverlap,
            resource: faculty.id.clone(),
            label: format!("Faculty {}", faculty.id),
            demand: sole.iter().map(|&c| demand(model, c)).sum(),
            capacity: union_of(&sole),
        });
        if let Some(max) = faculty.max_load {
            out.push(Pressure {
                invariant: InvariantClass::LoadBound,
                resource: faculty.id.clone(),
                label: format!("Faculty {} (weekly load)", faculty.id),
                demand: sole.iter().map(|&c| model.courses[c].sessions.len()).sum(),
                capacity: max as usize,
            });
        }
    }

    for (g, group) in model.groups.iter().enumerate() {
        let enrolled: Vec<usize> = (0..n)
            .filter(|&c| model.courses[c].groups.contains(&g))
            .collect();
        if enrolled.is_empty() {
            continue;
        }
        out.push(Pressure {
            invariant: InvariantClass::StudentGroupOverlap,
            resource: group.id.clone(),
            label: format!("Student group {}", group.id),
            demand: enrolled.iter().map(|&c| demand(model, c)).sum(),
            capacity: union_of(&enrolled),
        });
    }

    if model.rooms_modeled() {
        let room_sets: Vec<BTreeSet<usize>> = (0..n)
            .map(|c| model.courses[c].domain.iter().filter_map(|p| p.room).collect())
            .collect();
        for rooms in room_sets.iter().filter(|r| !r.is_empty()).unique() {
            let confined: Vec<usize> = (0..n)
                .filter(|&c| !room_sets[c].is_empty() && room_sets[c].is_subset(rooms))
                .collect();
            let ids = rooms.iter().map(|&r| model.rooms[r].id.as_str()).join(", ");
            out.push(Pressure {
                invariant: InvariantClass::RoomOverlap,
                resource: ids.clone(),
                label: format!("Rooms [{ids}]"),
                demand: confined.iter().map(|&c| demand(model, c)).sum(),
                capacity: rooms.len() * union_of(&confined),
            });
        }
    }
    out
}

/// Sound infeasibility proofs found without search.
pub(crate) fn static_conflicts(model: &TimetableModel) -> Vec<Diagnostic> {
    pressures(model)
        .into_iter()
        .filter(|p| p.demand > p.capacity)
        .map(|p| {
            let message = match p.invariant {
                InvariantClass::LoadBound => format!(
                    "{} must teach {} sessions but may teach at most {}",
                    p.label, p.demand, p.capacity
                ),
                _ => format!(
                    "{} has {} required session slots but only {} available slots",
                    p.label, p.demand, p.capacity
                ),
            };
            Diagnostic {
                invariant: p.invariant,
                resource: Some(p.resource),
                message,
            }
        })
        .collect()
}

/// The most saturated resources, for reports where no proof was found.
fn saturation(model: &TimetableModel) -> Vec<Diagnostic> {
    pressures(model)
        .into_iter()
        .filter(|p| p.demand > 0 && p.ratio() >= SATURATION_THRESHOLD)
        .sorted_by(|a, b| b.ratio().total_cmp(&a.ratio()))
        .take(MAX_REPORTED)
        .map(|p| Diagnostic {
            invariant: p.invariant,
            message: format!(
                "{} is {:.0}% saturated ({} of {} slots required)",
                p.label,
                p.ratio() * 100.0,
                p.demand,
                p.capacity
            ),
            resource: Some(p.resource),
        })
        .collect()
}

/// Resources that blocked the most placements at dead ends, summed over workers.
fn search_conflicts(model: &TimetableModel, reports: &[WorkerReport]) -> Vec<Diagnostic> {
    let mut totals: Vec<(Resource, InvariantClass, u64)> = Vec::new();
    for index in 0..model.resource_count() {
        let count: u64 = reports.iter().map(|r| r.conflicts[index]).sum();
        if count > 0 {
            let resource = model.resource_at(index);
            totals.push((resource, resource_invariant(resource), count));
        }
    }
    for f in 0..model.faculty.len() {
        let count: u64 = reports.iter().map(|r| r.load_conflicts[f]).sum();
        if count > 0 {
            totals.push((Resource::Faculty(f), InvariantClass::LoadBound, count));
        }
    }
    totals
        .into_iter()
        .sorted_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)))
        .take(MAX_REPORTED)
        .map(|(resource, invariant, count)| Diagnostic {
            invariant,
            resource: Some(model.resource_id(resource).to_string()),
            message: format!(
                "{} blocked {} placements at dead ends ({})",
                model.resource_label(resource),
                count,
                invariant
            ),
        })
        .collect()
}

fn with_fallback(mut diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    if diagnostics.is_empty() {
        diagnostics.push(Diagnostic {
            invariant: InvariantClass::Coverage,
            resource: None,
            message: "no assignment places every session without a conflict".to_string(),
        });
    }
    diagnostics
}
