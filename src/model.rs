//! Model builder: turns institutional input into sessions, finite-domain
//! decision variables and constraint objects.
//!
//! Each session is one decision variable whose domain is the list of
//! compatible `(start slot, faculty, room)` placements of its course. Unary
//! constraints (availability, room fit) are propagated into the domains while
//! building; the remaining constraints are enforced by the search.

use itertools::Itertools;
use log::{debug, info, trace};
use std::collections::{BTreeSet, HashMap};
use std::ops::Range;
use std::time::Instant;

use crate::config::Objective;
use crate::data::{InvariantClass, SchedulingInput, SessionId, Timeslot};
use crate::error::{InvalidInputError, ModelError, SchedulerError};

/// A resource that can host at most one session per timeslot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    Faculty(usize),
    Group(usize),
    Room(usize),
    /// Sessions of one course never share a timeslot.
    Course(usize),
}

/// One value in a session's domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Canonical index of the first occupied slot.
    pub start: usize,
    pub faculty: usize,
    pub room: Option<usize>,
    /// Objective contribution of choosing this placement.
    pub penalty: u32,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub course: usize,
    pub ordinal: u32,
}

#[derive(Debug, Clone)]
pub struct CourseNode {
    pub id: String,
    pub duration: usize,
    pub groups: Vec<usize>,
    pub eligible_faculty: Vec<usize>,
    pub size: u32,
    pub room_type: Option<String>,
    pub sessions: Range<usize>,
    /// Shared by every session of the course, ordered by (start, faculty, room).
    pub domain: Vec<Placement>,
}

#[derive(Debug, Clone)]
pub struct FacultyNode {
    pub id: String,
    pub max_load: Option<u32>,
    pub available: Vec<bool>,
    pub preferred: Vec<bool>,
    pub has_preferences: bool,
}

#[derive(Debug, Clone)]
pub struct GroupNode {
    pub id: String,
    pub size: u32,
}

#[derive(Debug, Clone)]
pub struct RoomNode {
    pub id: String,
    pub capacity: u32,
    pub room_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SlotNode {
    pub id: String,
    pub day: String,
    pub period: u32,
    pub day_index: usize,
    /// 0 for the first period of its day.
    pub rank: u32,
    /// Number of consecutive periods, this one included, left in the day.
    pub run: usize,
}

/// Tagged constraint objects over the session variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Sessions that may use `resource` never occupy a common timeslot.
    NoOverlap {
        resource: Resource,
        sessions: Vec<usize>,
    },
    /// Placements taught by `faculty` lie inside its availability.
    Availability { faculty: usize, courses: Vec<usize> },
    /// The room of each placement of `course` fits its size and type.
    RoomFit { course: usize },
    /// At most `max` of `sessions` are taught by `faculty`.
    LoadBound {
        faculty: usize,
        max: u32,
        sessions: Vec<usize>,
    },
    /// Sessions of `course` take strictly increasing start slots.
    SessionOrder { course: usize },
}

impl Constraint {
    pub fn invariant(&self) -> InvariantClass {
        match self {
            Constraint::NoOverlap { resource, .. } => resource_invariant(*resource),
            Constraint::Availability { .. } => InvariantClass::Availability,
            Constraint::RoomFit { .. } => InvariantClass::RoomFit,
            Constraint::LoadBound { .. } => InvariantClass::LoadBound,
            Constraint::SessionOrder { .. } => InvariantClass::Coverage,
        }
    }

    /// Unary check used for domain propagation. Non-unary constraints admit everything.
    pub fn admits(&self, model: &TimetableModel, course: usize, placement: &Placement) -> bool {
        match self {
            Constraint::Availability { faculty, .. } if placement.faculty == *faculty => model
                .span(course, placement.start)
                .all(|slot| model.faculty[*faculty].available[slot]),
            Constraint::RoomFit { course: target } if *target == course => placement
                .room
                .is_some_and(|room| model.room_fits(course, room)),
            _ => true,
        }
    }

    /// Checks the constraint against a complete assignment indexed by session.
    pub fn is_satisfied(&self, model: &TimetableModel, assignment: &[Placement]) -> bool {
        match self {
            Constraint::NoOverlap { resource, sessions } => {
                let mut occupied = BTreeSet::new();
                sessions
                    .iter()
                    .filter(|&&s| model.session_uses(s, &assignment[s], *resource))
                    .flat_map(|&s| model.span(model.sessions[s].course, assignment[s].start))
                    .all(|slot| occupied.insert(slot))
            }
            Constraint::Availability { courses, .. } => courses.iter().all(|&c| {
                model.courses[c]
                    .sessions
                    .clone()
                    .all(|s| self.admits(model, c, &assignment[s]))
            }),
            Constraint::RoomFit { course } => model.courses[*course]
                .sessions
                .clone()
                .all(|s| self.admits(model, *course, &assignment[s])),
            Constraint::LoadBound {
                faculty,
                max,
                sessions,
            } => {
                let taught = sessions
                    .iter()
                    .filter(|&&s| assignment[s].faculty == *faculty)
                    .count();
                taught <= *max as usize
            }
            Constraint::SessionOrder { course } => model.courses[*course]
                .sessions
                .clone()
                .tuple_windows()
                .all(|(a, b)| assignment[a].start < assignment[b].start),
        }
    }
}

pub fn resource_invariant(resource: Resource) -> InvariantClass {
    match resource {
        Resource::Faculty(_) => InvariantClass::FacultyOverlap,
        Resource::Group(_) => InvariantClass::StudentGroupOverlap,
        Resource::Room(_) => InvariantClass::RoomOverlap,
        Resource::Course(_) => InvariantClass::Coverage,
    }
}

/// The built constraint model. Read-only once built; shared by all workers.
#[derive(Debug, Clone)]
pub struct TimetableModel {
    pub courses: Vec<CourseNode>,
    pub faculty: Vec<FacultyNode>,
    pub groups: Vec<GroupNode>,
    pub rooms: Vec<RoomNode>,
    pub slots: Vec<SlotNode>,
    pub sessions: Vec<Session>,
    pub constraints: Vec<Constraint>,
    pub objective: Option<Objective>,
}

impl TimetableModel {
    pub fn rooms_modeled(&self) -> bool {
        !self.rooms.is_empty()
    }

    /// Canonical slots occupied by a session of `course` starting at `start`.
    pub fn span(&self, course: usize, start: usize) -> Range<usize> {
        start..start + self.courses[course].duration
    }

    pub fn domain(&self, session: usize) -> &[Placement] {
        &self.courses[self.sessions[session].course].domain
    }

    pub fn room_fits(&self, course: usize, room: usize) -> bool {
        let course = &self.courses[course];
        let room = &self.rooms[room];
        room.capacity >= course.size
            && course
                .room_type
                .as_deref()
                .is_none_or(|wanted| room.room_type.as_deref() == Some(wanted))
    }

    pub fn session_uses(&self, session: usize, placement: &Placement, resource: Resource) -> bool {
        let course = self.sessions[session].course;
        match resource {
            Resource::Faculty(f) => placement.faculty == f,
            Resource::Room(r) => placement.room == Some(r),
            Resource::Group(g) => self.courses[course].groups.contains(&g),
            Resource::Course(c) => course == c,
        }
    }

    /// Dense index of a resource, for occupancy tables.
    pub fn resource_index(&self, resource: Resource) -> usize {
        let (f, g, r) = (self.faculty.len(), self.groups.len(), self.rooms.len());
        match resource {
            Resource::Faculty(i) => i,
            Resource::Group(i) => f + i,
            Resource::Room(i) => f + g + i,
            Resource::Course(i) => f + g + r + i,
        }
    }

    pub fn resource_count(&self) -> usize {
        self.faculty.len() + self.groups.len() + self.rooms.len() + self.courses.len()
    }

    pub fn resource_at(&self, index: usize) -> Resource {
        let (f, g, r) = (self.faculty.len(), self.groups.len(), self.rooms.len());
        if index < f {
            Resource::Faculty(index)
        } else if index < f + g {
            Resource::Group(index - f)
        } else if index < f + g + r {
            Resource::Room(index - f - g)
        } else {
            Resource::Course(index - f - g - r)
        }
    }

    pub fn resource_label(&self, resource: Resource) -> String {
        match resource {
            Resource::Faculty(i) => format!("Faculty {}", self.faculty[i].id),
            Resource::Group(i) => format!("Student group {}", self.groups[i].id),
            Resource::Room(i) => format!("Room {}", self.rooms[i].id),
            Resource::Course(i) => format!("Course {}", self.courses[i].id),
        }
    }

    pub fn resource_id(&self, resource: Resource) -> &str {
        match resource {
            Resource::Faculty(i) => &self.faculty[i].id,
            Resource::Group(i) => &self.groups[i].id,
            Resource::Room(i) => &self.rooms[i].id,
            Resource::Course(i) => &self.courses[i].id,
        }
    }

    pub fn domain_size(&self) -> usize {
        self.sessions.iter().map(|s| self.courses[s.course].domain.len()).sum()
    }

    /// Returns the first constraint a complete assignment violates.
    pub fn verify(&self, assignment: &[Placement]) -> Result<(), &Constraint> {
        debug_assert_eq!(assignment.len(), self.sessions.len());
        self.constraints
            .iter()
            .find(|c| !c.is_satisfied(self, assignment))
            .map_or(Ok(()), Err)
    }
}

fn index_ids<'a, T>(
    items: &'a [T],
    kind: &'static str,
    id: impl Fn(&'a T) -> &'a str,
) -> Result<HashMap<&'a str, usize>, InvalidInputError> {
    let mut index = HashMap::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let key = id(item);
        if index.insert(key, i).is_some() {
            return Err(InvalidInputError::DuplicateId {
                kind,
                id: key.to_string(),
            });
        }
    }
    Ok(index)
}

fn resolve(
    index: &HashMap<&str, usize>,
    target: &str,
    owner_kind: &'static str,
    owner: &str,
    target_kind: &'static str,
) -> Result<usize, InvalidInputError> {
    index
        .get(target)
        .copied()
        .ok_or_else(|| InvalidInputError::DanglingReference {
            owner_kind,
            owner: owner.to_string(),
            target_kind,
            target: target.to_string(),
        })
}

/// Orders slots day-major (days in order of first appearance) then by period,
/// so a multi-slot session occupies a contiguous index range.
fn canonical_slots(timeslots: &[Timeslot]) -> Result<Vec<SlotNode>, InvalidInputError> {
    index_ids(timeslots, "timeslot", |t| t.id.as_str())?;
    let days: Vec<&str> = timeslots.iter().map(|t| t.day.as_str()).unique().collect();
    let day_of = |t: &Timeslot| days.iter().position(|d| *d == t.day).unwrap_or(0);

    let ordered: Vec<&Timeslot> = timeslots
        .iter()
        .sorted_by_key(|t| (day_of(*t), t.period))
        .collect();
    for (a, b) in ordered.iter().tuple_windows() {
        if a.day == b.day && a.period == b.period {
            return Err(InvalidInputError::DuplicateGridCell {
                first: a.id.clone(),
                second: b.id.clone(),
                day: a.day.clone(),
                period: a.period,
            });
        }
    }

    let mut slots: Vec<SlotNode> = Vec::with_capacity(ordered.len());
    for &t in &ordered {
        let day_index = day_of(t);
        let rank = match slots.last() {
            Some(prev) if prev.day_index == day_index => prev.rank + 1,
            _ => 0,
        };
        slots.push(SlotNode {
            id: t.id.clone(),
            day: t.day.clone(),
            period: t.period,
            day_index,
            rank,
            run: 1,
        });
    }
    for i in (0..slots.len().saturating_sub(1)).rev() {
        let (head, tail) = slots.split_at_mut(i + 1);
        let (cur, next) = (&mut head[i], &tail[0]);
        if cur.day_index == next.day_index && cur.period + 1 == next.period {
            cur.run = next.run + 1;
        }
    }
    Ok(slots)
}

/// Builds the constraint model for one solve.
///
/// Fails with [`InvalidInputError`] on duplicate ids or dangling references
/// and with [`ModelError`] when a course can never be placed.
pub fn build(
    input: &SchedulingInput,
    objective: Option<Objective>,
) -> Result<TimetableModel, SchedulerError> {
    let mut model = assemble(input, objective)?;
    propagate_domains(&mut model, None)?;
    log_built(&model);
    Ok(model)
}

/// Like [`build`], but gives up once `deadline` passes. `Ok(None)` means the
/// deadline came first.
pub(crate) fn build_until(
    input: &SchedulingInput,
    objective: Option<Objective>,
    deadline: Instant,
) -> Result<Option<TimetableModel>, SchedulerError> {
    let mut model = assemble(input, objective)?;
    if !propagate_domains(&mut model, Some(deadline))? {
        return Ok(None);
    }
    log_built(&model);
    Ok(Some(model))
}

fn assemble(
    input: &SchedulingInput,
    objective: Option<Objective>,
) -> Result<TimetableModel, SchedulerError> {
    let timeslots = input.resolved_timeslots();
    let slots = canonical_slots(&timeslots)?;
    let slot_index: HashMap<&str, usize> = slots
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let course_index = index_ids(&input.courses, "course", |c| c.id.as_str())?;
    let faculty_index = index_ids(&input.faculty, "faculty", |f| f.id.as_str())?;
    let group_index = index_ids(&input.student_groups, "student group", |g| g.id.as_str())?;
    index_ids(&input.rooms, "room", |r| r.id.as_str())?;

    // faculty availability, preferences and teachable courses
    let mut faculty = Vec::with_capacity(input.faculty.len());
    let mut teachable: Vec<Option<Vec<usize>>> = Vec::with_capacity(input.faculty.len());
    for f in &input.faculty {
        let slot_of = |id: &String| resolve(&slot_index, id, "faculty", &f.id, "timeslot");
        let mut available = match &f.available_timeslot_ids {
            None => vec![true; slots.len()],
            Some(ids) => {
                let mut mask = vec![false; slots.len()];
                for id in ids {
                    mask[slot_of(id)?] = true;
                }
                mask
            }
        };
        for id in &f.unavailable_timeslot_ids {
            available[slot_of(id)?] = false;
        }
        let mut preferred = vec![false; slots.len()];
        for id in &f.preferred_timeslot_ids {
            preferred[slot_of(id)?] = true;
        }
        let courses = f
            .course_ids
            .iter()
            .map(|id| resolve(&course_index, id, "faculty", &f.id, "course"))
            .collect::<Result<Vec<_>, _>>()?;
        teachable.push((!courses.is_empty()).then_some(courses));
        faculty.push(FacultyNode {
            id: f.id.clone(),
            max_load: f.max_weekly_sessions,
            available,
            preferred,
            has_preferences: !f.preferred_timeslot_ids.is_empty(),
        });
    }

    // enrollment is the union of both directions
    let mut enrolled: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); input.courses.len()];
    for (g, group) in input.student_groups.iter().enumerate() {
        for id in &group.course_ids {
            let c = resolve(&course_index, id, "student group", &group.id, "course")?;
            enrolled[c].insert(g);
        }
    }
    for (c, course) in input.courses.iter().enumerate() {
        for id in &course.student_group_ids {
            enrolled[c].insert(resolve(&group_index, id, "course", &course.id, "student group")?);
        }
    }

    let groups: Vec<GroupNode> = input
        .student_groups
        .iter()
        .map(|g| GroupNode {
            id: g.id.clone(),
            size: g.size,
        })
        .collect();
    let rooms: Vec<RoomNode> = input
        .rooms
        .iter()
        .map(|r| RoomNode {
            id: r.id.clone(),
            capacity: r.capacity,
            room_type: r.room_type.clone(),
        })
        .collect();

    let mut courses = Vec::with_capacity(input.courses.len());
    let mut sessions = Vec::new();
    for (c, course) in input.courses.iter().enumerate() {
        if course.duration_slots == 0 {
            return Err(InvalidInputError::ZeroDuration {
                course: course.id.clone(),
            }
            .into());
        }
        let mut eligible = Vec::with_capacity(course.eligible_faculty_ids.len());
        for id in &course.eligible_faculty_ids {
            let f = resolve(&faculty_index, id, "course", &course.id, "faculty")?;
            let allowed = teachable[f].as_ref().is_none_or(|list| list.contains(&c));
            if allowed && !eligible.contains(&f) {
                eligible.push(f);
            }
        }
        if eligible.is_empty() {
            return Err(ModelError::NoEligibleFaculty {
                course: course.id.clone(),
            }
            .into());
        }
        if course.sessions_per_week as usize > slots.len() {
            return Err(ModelError::TooManySessions {
                course: course.id.clone(),
                sessions: course.sessions_per_week,
                timeslots: slots.len(),
            }
            .into());
        }

        let first = sessions.len();
        sessions.extend((1..=course.sessions_per_week).map(|ordinal| Session {
            id: format!("{}#{}", course.id, ordinal),
            course: c,
            ordinal,
        }));
        let groups_of: Vec<usize> = enrolled[c].iter().copied().collect();
        courses.push(CourseNode {
            id: course.id.clone(),
            duration: course.duration_slots as usize,
            size: groups_of.iter().map(|&g| groups[g].size).sum(),
            groups: groups_of,
            eligible_faculty: eligible,
            room_type: course.room_type.clone(),
            sessions: first..sessions.len(),
            domain: Vec::new(),
        });
    }

    let mut model = TimetableModel {
        courses,
        faculty,
        groups,
        rooms,
        slots,
        sessions,
        constraints: Vec::new(),
        objective,
    };
    model.constraints = constraints_for(&model);
    Ok(model)
}

fn log_built(model: &TimetableModel) {
    info!(
        "Built model with {} sessions, {} constraints and {} domain values over {} timeslots.",
        model.sessions.len(),
        model.constraints.len(),
        model.domain_size(),
        model.slots.len()
    );
}

fn constraints_for(model: &TimetableModel) -> Vec<Constraint> {
    let sessions_of = |courses: &mut dyn Iterator<Item = usize>| -> Vec<usize> {
        courses
            .flat_map(|c| model.courses[c].sessions.clone())
            .collect()
    };
    let courses_taught_by = |f: usize| {
        (0..model.courses.len()).filter(move |&c| model.courses[c].eligible_faculty.contains(&f))
    };
    let mut constraints = Vec::new();

    for f in 0..model.faculty.len() {
        let sessions = sessions_of(&mut courses_taught_by(f));
        if sessions.len() > 1 {
            constraints.push(Constraint::NoOverlap {
                resource: Resource::Faculty(f),
                sessions,
            });
        }
    }
    for g in 0..model.groups.len() {
        let mut enrolled =
            (0..model.courses.len()).filter(|&c| model.courses[c].groups.contains(&g));
        let sessions = sessions_of(&mut enrolled);
        if sessions.len() > 1 {
            constraints.push(Constraint::NoOverlap {
                resource: Resource::Group(g),
                sessions,
            });
        }
    }
    for r in 0..model.rooms.len() {
        let mut hosted = (0..model.courses.len()).filter(|&c| model.room_fits(c, r));
        let sessions = sessions_of(&mut hosted);
        if sessions.len() > 1 {
            constraints.push(Constraint::NoOverlap {
                resource: Resource::Room(r),
                sessions,
            });
        }
    }
    for (c, course) in model.courses.iter().enumerate() {
        if course.sessions.len() > 1 {
            constraints.push(Constraint::NoOverlap {
                resource: Resource::Course(c),
                sessions: course.sessions.clone().collect(),
            });
            constraints.push(Constraint::SessionOrder { course: c });
        }
    }
    for (f, node) in model.faculty.iter().enumerate() {
        if node.available.iter().any(|a| !a) {
            let courses: Vec<usize> = courses_taught_by(f).collect();
            if !courses.is_empty() {
                constraints.push(Constraint::Availability { faculty: f, courses });
            }
        }
    }
    if model.rooms_modeled() {
        constraints.extend((0..model.courses.len()).map(|course| Constraint::RoomFit { course }));
    }
    for (f, node) in model.faculty.iter().enumerate() {
        if let Some(max) = node.max_load {
            let sessions = sessions_of(&mut courses_taught_by(f));
            if !sessions.is_empty() {
                constraints.push(Constraint::LoadBound {
                    faculty: f,
                    max,
                    sessions,
                });
            }
        }
    }
    constraints
}

fn penalty(model: &TimetableModel, course: usize, start: usize, faculty: usize) -> u32 {
    match model.objective {
        None => 0,
        Some(Objective::PreferredTimes) => {
            let node = &model.faculty[faculty];
            if !node.has_preferences {
                return 0;
            }
            model
                .span(course, start)
                .filter(|&slot| !node.preferred[slot])
                .count() as u32
        }
        Some(Objective::EarlyPeriods) => model.slots[start].rank,
    }
}

/// Enumerates every placement of each course and keeps those the unary
/// constraints admit.
/// Filters every course's placements through its unary constraints. Returns
/// `false` when `deadline` passed before all courses were done.
fn propagate_domains(
    model: &mut TimetableModel,
    deadline: Option<Instant>,
) -> Result<bool, ModelError> {
    let room_choices: Vec<Option<usize>> = if model.rooms_modeled() {
        (0..model.rooms.len()).map(Some).collect()
    } else {
        vec![None]
    };

    for c in 0..model.courses.len() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            debug!("Deadline passed while propagating course {c}.");
            return Ok(false);
        }
        let course = &model.courses[c];
        let unary: Vec<&Constraint> = model
            .constraints
            .iter()
            .filter(|k| match k {
                Constraint::Availability { courses, .. } => courses.contains(&c),
                Constraint::RoomFit { course } => *course == c,
                _ => false,
            })
            .collect();

        let mut domain = Vec::new();
        let (mut fitting_starts, mut available_pairs) = (0usize, 0usize);
        for start in 0..model.slots.len() {
            if model.slots[start].run < course.duration {
                continue;
            }
            fitting_starts += 1;
            for &faculty in &course.eligible_faculty {
                let unroomed = Placement {
                    start,
                    faculty,
                    room: None,
                    penalty: 0,
                };
                let available = unary
                    .iter()
                    .filter(|k| matches!(k, Constraint::Availability { .. }))
                    .all(|k| k.admits(model, c, &unroomed));
                if !available {
                    continue;
                }
                available_pairs += 1;
                let penalty = penalty(model, c, start, faculty);
                for &room in &room_choices {
                    let placement = Placement {
                        start,
                        faculty,
                        room,
                        penalty,
                    };
                    if unary.iter().all(|k| k.admits(model, c, &placement)) {
                        domain.push(placement);
                    }
                }
            }
        }

        trace!(
            "Course {}: {} placements after propagation \
             ({} fitting starts, {} available faculty pairs).",
            course.id,
            domain.len(),
            fitting_starts,
            available_pairs
        );

        if domain.is_empty() && !course.sessions.is_empty() {
            let (invariant, reason) = if fitting_starts == 0 {
                let reason = format!(
                    "no day has {} consecutive periods for one session",
                    course.duration
                );
                (InvariantClass::Coverage, reason)
            } else if available_pairs == 0 {
                let reason =
                    "no eligible faculty is available in any timeslot the course fits".to_string();
                (InvariantClass::Availability, reason)
            } else {
                let wanted = course
                    .room_type
                    .as_deref()
                    .map(|t| format!(" of type `{t}`"))
                    .unwrap_or_default();
                let reason = format!("no room{wanted} seats {} students", course.size);
                (InvariantClass::RoomFit, reason)
            };
            return Err(ModelError::EmptyDomain {
                course: course.id.clone(),
                invariant,
                reason,
            });
        }
        model.courses[c].domain = domain;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Course, Faculty, Room, StudentGroup, TimeslotGrid};

    fn course(id: &str, sessions: u32, faculty: &[&str], groups: &[&str]) -> Course {
        Course {
            id: id.into(),
            name: None,
            sessions_per_week: sessions,
            duration_slots: 1,
            eligible_faculty_ids: faculty.iter().map(|s| s.to_string()).collect(),
            student_group_ids: groups.iter().map(|s| s.to_string()).collect(),
            room_type: None,
        }
    }

    fn faculty(id: &str) -> Faculty {
        Faculty {
            id: id.into(),
            name: None,
            course_ids: vec![],
            available_timeslot_ids: None,
            unavailable_timeslot_ids: vec![],
            preferred_timeslot_ids: vec![],
            max_weekly_sessions: None,
        }
    }

    fn input(days: &[&str], periods: u32) -> SchedulingInput {
        SchedulingInput {
            grid: Some(TimeslotGrid {
                days: days.iter().map(|s| s.to_string()).collect(),
                periods_per_day: periods,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn sessions_are_expanded_in_course_order() {
        let mut problem = input(&["Mon"], 4);
        problem.faculty = vec![faculty("f1")];
        problem.courses = vec![course("a", 2, &["f1"], &[]), course("b", 1, &["f1"], &[])];
        let model = build(&problem, None).unwrap();
        let ids: Vec<_> = model.sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["a#1", "a#2", "b#1"]);
        assert_eq!(model.courses[0].sessions, 0..2);
    }

    #[test]
    fn dangling_faculty_reference_is_invalid_input() {
        let mut problem = input(&["Mon"], 2);
        problem.courses = vec![course("a", 1, &["ghost"], &[])];
        let err = build(&problem, None).unwrap_err();
        assert_eq!(
            err,
            SchedulerError::InvalidInput(InvalidInputError::DanglingReference {
                owner_kind: "course",
                owner: "a".into(),
                target_kind: "faculty",
                target: "ghost".into(),
            })
        );
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut problem = input(&["Mon"], 2);
        problem.faculty = vec![faculty("f1"), faculty("f1")];
        assert!(matches!(
            build(&problem, None),
            Err(SchedulerError::InvalidInput(InvalidInputError::DuplicateId { .. }))
        ));
    }

    #[test]
    fn empty_eligible_faculty_is_model_error() {
        let mut problem = input(&["Mon"], 2);
        problem.courses = vec![course("a", 1, &[], &[])];
        assert_eq!(
            build(&problem, None).unwrap_err(),
            SchedulerError::Model(ModelError::NoEligibleFaculty { course: "a".into() })
        );
    }

    #[test]
    fn faculty_without_availability_overlap_is_model_error() {
        let mut problem = input(&["Mon"], 2);
        let mut f = faculty("f1");
        f.available_timeslot_ids = Some(vec![]);
        problem.faculty = vec![f];
        problem.courses = vec![course("a", 1, &["f1"], &[])];
        assert!(matches!(
            build(&problem, None),
            Err(SchedulerError::Model(ModelError::EmptyDomain { .. }))
        ));
    }

    #[test]
    fn availability_prunes_domain() {
        let mut problem = input(&["Mon"], 3);
        let mut f = faculty("f1");
        f.unavailable_timeslot_ids = vec!["Mon-P2".into()];
        problem.faculty = vec![f];
        problem.courses = vec![course("a", 1, &["f1"], &[])];
        let model = build(&problem, None).unwrap();
        let starts: Vec<_> = model.courses[0].domain.iter().map(|p| p.start).collect();
        assert_eq!(starts, [0, 2]);
    }

    #[test]
    fn multi_slot_sessions_stay_within_one_day() {
        let mut problem = input(&["Mon", "Tue"], 3);
        problem.faculty = vec![faculty("f1")];
        let mut long = course("a", 1, &["f1"], &[]);
        long.duration_slots = 2;
        problem.courses = vec![long];
        let model = build(&problem, None).unwrap();
        let starts: Vec<_> = model.courses[0]
            .domain
            .iter()
            .map(|p| model.slots[p.start].id.as_str())
            .collect();
        assert_eq!(starts, ["Mon-P1", "Mon-P2", "Tue-P1", "Tue-P2"]);
    }

    #[test]
    fn rooms_filter_by_capacity_and_type() {
        let mut problem = input(&["Mon"], 1);
        problem.faculty = vec![faculty("f1")];
        problem.student_groups = vec![StudentGroup {
            id: "g1".into(),
            course_ids: vec![],
            size: 40,
        }];
        let mut lab = course("a", 1, &["f1"], &["g1"]);
        lab.room_type = Some("lab".into());
        problem.courses = vec![lab];
        problem.rooms = vec![
            Room {
                id: "small-lab".into(),
                capacity: 20,
                room_type: Some("lab".into()),
            },
            Room {
                id: "hall".into(),
                capacity: 200,
                room_type: None,
            },
            Room {
                id: "big-lab".into(),
                capacity: 60,
                room_type: Some("lab".into()),
            },
        ];
        let model = build(&problem, None).unwrap();
        let rooms: Vec<_> = model.courses[0].domain.iter().map(|p| p.room).collect();
        assert_eq!(rooms, [Some(2)]);
    }

    #[test]
    fn unseatable_course_is_a_room_fit_error() {
        let mut problem = input(&["Mon"], 2);
        problem.faculty = vec![faculty("f1")];
        problem.student_groups = vec![StudentGroup {
            id: "g1".into(),
            course_ids: vec![],
            size: 40,
        }];
        problem.courses = vec![course("a", 1, &["f1"], &["g1"])];
        problem.rooms = vec![Room {
            id: "closet".into(),
            capacity: 10,
            room_type: None,
        }];
        let err = build(&problem, None).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Model(ModelError::EmptyDomain {
                invariant: InvariantClass::RoomFit,
                ..
            })
        ));
        assert_eq!(
            Constraint::RoomFit { course: 0 }.invariant(),
            InvariantClass::RoomFit
        );
    }

    #[test]
    fn passed_deadline_stops_propagation() {
        let mut problem = input(&["Mon"], 2);
        problem.faculty = vec![faculty("f1")];
        problem.courses = vec![course("a", 1, &["f1"], &[])];
        assert!(build_until(&problem, None, Instant::now()).unwrap().is_none());
        let later = Instant::now() + std::time::Duration::from_secs(60);
        assert!(build_until(&problem, None, later).unwrap().is_some());
    }

    #[test]
    fn faculty_course_list_restricts_eligibility() {
        let mut problem = input(&["Mon"], 2);
        let mut picky = faculty("f1");
        picky.course_ids = vec!["b".into()];
        problem.faculty = vec![picky, faculty("f2")];
        problem.courses = vec![course("a", 1, &["f1", "f2"], &[]), course("b", 1, &["f1"], &[])];
        let model = build(&problem, None).unwrap();
        assert_eq!(model.courses[0].eligible_faculty, [1]);
        assert_eq!(model.courses[1].eligible_faculty, [0]);
    }

    #[test]
    fn enrollment_is_merged_from_both_sides() {
        let mut problem = input(&["Mon"], 2);
        problem.faculty = vec![faculty("f1")];
        problem.student_groups = vec![
            StudentGroup {
                id: "g1".into(),
                course_ids: vec!["a".into()],
                size: 10,
            },
            StudentGroup {
                id: "g2".into(),
                course_ids: vec![],
                size: 5,
            },
        ];
        problem.courses = vec![course("a", 1, &["f1"], &["g2"])];
        let model = build(&problem, None).unwrap();
        assert_eq!(model.courses[0].groups, [0, 1]);
        assert_eq!(model.courses[0].size, 15);
    }

    #[test]
    fn removing_availability_never_grows_domains() {
        let mut problem = input(&["Mon", "Tue"], 3);
        problem.faculty = vec![faculty("f1")];
        problem.courses = vec![course("a", 2, &["f1"], &[])];
        let full = build(&problem, None).unwrap().courses[0].domain.len();
        problem.faculty[0].unavailable_timeslot_ids = vec!["Tue-P1".into()];
        let reduced = build(&problem, None).unwrap().courses[0].domain.len();
        assert!(reduced < full);
    }

    #[test]
    fn build_is_deterministic() {
        let mut problem = input(&["Mon", "Tue"], 3);
        problem.faculty = vec![faculty("f1"), faculty("f2")];
        problem.courses = vec![course("a", 2, &["f2", "f1"], &[]), course("b", 1, &["f1"], &[])];
        let first = build(&problem, Some(Objective::EarlyPeriods)).unwrap();
        let second = build(&problem, Some(Objective::EarlyPeriods)).unwrap();
        assert_eq!(first.constraints, second.constraints);
        assert_eq!(first.courses[0].domain, second.courses[0].domain);
    }

    #[test]
    fn too_many_sessions_is_model_error() {
        let mut problem = input(&["Mon"], 2);
        problem.faculty = vec![faculty("f1")];
        problem.courses = vec![course("a", 3, &["f1"], &[])];
        assert!(matches!(
            build(&problem, None),
            Err(SchedulerError::Model(ModelError::TooManySessions { .. }))
        ));
    }
}
