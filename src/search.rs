//! Depth-first search owned by a single worker.
//!
//! Variable choice is fail-first (fewest consistent placements), ties broken
//! by a per-worker session order. Worker 0 keeps input order everywhere and
//! draws no random numbers, which makes single-worker solves reproducible.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::model::{Placement, Resource, TimetableModel};
use crate::solver::Shared;

/// Sessions scanned by `select` between two deadline checks.
const SESSIONS_PER_POLL: usize = 16;
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Halt,
}

/// Why a placement is inconsistent with the current partial assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Blocker {
    /// Dense resource index already occupied in one of the spanned slots.
    Resource(usize),
    /// Faculty already at their weekly maximum.
    Load(usize),
}

enum Choice {
    Halt,
    Complete,
    DeadEnd(usize),
    Branch(usize, Vec<u32>),
}

/// What a worker hands back once it stops.
#[derive(Debug, Clone)]
pub(crate) struct WorkerReport {
    pub worker: usize,
    pub nodes: u64,
    /// Rejections at dead ends, by dense resource index.
    pub conflicts: Vec<u64>,
    /// Rejections at dead ends caused by a faculty's load bound.
    pub load_conflicts: Vec<u64>,
    /// The worker explored its whole tree.
    pub exhausted: bool,
}

pub(crate) struct Worker<'a> {
    id: usize,
    model: &'a TimetableModel,
    shared: &'a Shared,
    slot_count: usize,
    occupancy: Vec<Option<u32>>,
    load: Vec<u32>,
    assignment: Vec<Option<u32>>,
    assigned: usize,
    cost: u64,
    remaining_floor: u64,
    min_penalty: Vec<u64>,
    order: Vec<usize>,
    rng: Option<StdRng>,
    nodes: u64,
    conflicts: Vec<u64>,
    load_conflicts: Vec<u64>,
    best_depth: usize,
    best_partial: Vec<Option<u32>>,
}

impl<'a> Worker<'a> {
    pub fn new(id: usize, seed: u64, model: &'a TimetableModel, shared: &'a Shared) -> Self {
        let slot_count = model.slots.len();
        let min_penalty: Vec<u64> = model
            .courses
            .iter()
            .map(|c| c.domain.iter().map(|p| u64::from(p.penalty)).min().unwrap_or(0))
            .collect();
        let remaining_floor = model
            .sessions
            .iter()
            .map(|s| min_penalty[s.course])
            .sum();

        let mut order: Vec<usize> = (0..model.sessions.len()).collect();
        let worker_seed = seed.wrapping_add((id as u64).wrapping_mul(SEED_STRIDE));
        let mut rng = (id > 0).then(|| StdRng::seed_from_u64(worker_seed));
        if let Some(rng) = rng.as_mut() {
            order.shuffle(rng);
        }

        Self {
            id,
            model,
            shared,
            slot_count,
            occupancy: vec![None; model.resource_count() * slot_count],
            load: vec![0; model.faculty.len()],
            assignment: vec![None; model.sessions.len()],
            assigned: 0,
            cost: 0,
            remaining_floor,
            min_penalty,
            order,
            rng,
            nodes: 0,
            conflicts: vec![0; model.resource_count()],
            load_conflicts: vec![0; model.faculty.len()],
            best_depth: 0,
            best_partial: Vec::new(),
        }
    }

    pub fn run(mut self) -> WorkerReport {
        let exhausted = self.search() == Flow::Continue;
        if exhausted {
            self.shared.report_exhausted(self.id);
        } else if self.shared.allow_partial() && self.best_depth > 0 {
            let placements = self
                .best_partial
                .iter()
                .enumerate()
                .map(|(s, vi)| vi.map(|vi| self.model.domain(s)[vi as usize]))
                .collect();
            self.shared.offer_partial(self.id, placements, self.best_depth);
        }
        WorkerReport {
            worker: self.id,
            nodes: self.nodes,
            conflicts: self.conflicts,
            load_conflicts: self.load_conflicts,
            exhausted,
        }
    }

    fn optimizing(&self) -> bool {
        self.model.objective.is_some()
    }

    fn search(&mut self) -> Flow {
        self.nodes += 1;
        if self.shared.poll_deadline() {
            return Flow::Halt;
        }
        if self.optimizing() && self.cost + self.remaining_floor >= self.shared.incumbent() {
            return Flow::Continue;
        }

        let (session, mut values) = match self.select() {
            Choice::Halt => return Flow::Halt,
            Choice::Complete => return self.commit(),
            Choice::DeadEnd(session) => {
                self.blame(session);
                return Flow::Continue;
            }
            Choice::Branch(session, values) => (session, values),
        };
        self.order_values(session, &mut values);

        let course = self.model.sessions[session].course;
        for vi in values {
            if self.optimizing() {
                let penalty = u64::from(self.model.domain(session)[vi as usize].penalty);
                let floor = self.cost + penalty + self.remaining_floor - self.min_penalty[course];
                // values are sorted by penalty, so nothing after this can do better
                if floor >= self.shared.incumbent() {
                    break;
                }
            }
            self.place(session, vi);
            let flow = self.search();
            self.unplace(session, vi);
            if flow == Flow::Halt {
                return Flow::Halt;
            }
        }
        Flow::Continue
    }

    /// Picks the unassigned session with the fewest consistent placements.
    /// A scan over large domains is slow, so the deadline is checked as it goes.
    fn select(&self) -> Choice {
        let mut best: Option<(usize, Vec<u32>)> = None;
        let mut scratch = Vec::new();
        let mut scanned = 0;
        for &session in &self.order {
            if self.assignment[session].is_some() {
                continue;
            }
            scanned += 1;
            if scanned % SESSIONS_PER_POLL == 0 && self.shared.poll_deadline() {
                return Choice::Halt;
            }
            let limit = best.as_ref().map_or(usize::MAX, |(_, v)| v.len());
            scratch.clear();
            for (vi, placement) in self.model.domain(session).iter().enumerate() {
                if self.fits(session, placement).is_ok() {
                    scratch.push(vi as u32);
                    if scratch.len() >= limit {
                        break;
                    }
                }
            }
            if scratch.is_empty() {
                return Choice::DeadEnd(session);
            }
            if scratch.len() < limit {
                best = Some((session, std::mem::take(&mut scratch)));
            }
        }
        match best {
            Some((session, values)) => Choice::Branch(session, values),
            None => Choice::Complete,
        }
    }

    fn order_values(&mut self, session: usize, values: &mut [u32]) {
        if let Some(rng) = self.rng.as_mut() {
            values.shuffle(rng);
        }
        if self.optimizing() {
            let domain = self.model.domain(session);
            values.sort_by_key(|&vi| domain[vi as usize].penalty);
        }
    }

    fn fits(&self, session: usize, placement: &Placement) -> Result<(), Blocker> {
        let model = self.model;
        let course_index = model.sessions[session].course;
        let course = &model.courses[course_index];

        if let Some(max) = model.faculty[placement.faculty].max_load {
            if self.load[placement.faculty] >= max {
                return Err(Blocker::Load(placement.faculty));
            }
        }

        // sessions of a course take increasing start slots
        let course_resource = model.resource_index(Resource::Course(course_index));
        if session > course.sessions.start {
            if let Some(prev) = self.placed(session - 1) {
                if prev.start >= placement.start {
                    return Err(Blocker::Resource(course_resource));
                }
            }
        }
        if session + 1 < course.sessions.end {
            if let Some(next) = self.placed(session + 1) {
                if next.start <= placement.start {
                    return Err(Blocker::Resource(course_resource));
                }
            }
        }

        let occupied = |r: usize| {
            model
                .span(course_index, placement.start)
                .any(|slot| self.occupancy[r * self.slot_count + slot].is_some())
        };
        let faculty = model.resource_index(Resource::Faculty(placement.faculty));
        let room = placement
            .room
            .map(|r| model.resource_index(Resource::Room(r)));
        let groups = course
            .groups
            .iter()
            .map(|&g| model.resource_index(Resource::Group(g)));
        match std::iter::once(faculty)
            .chain(room)
            .chain(groups)
            .chain(std::iter::once(course_resource))
            .find(|&r| occupied(r))
        {
            Some(busy) => Err(Blocker::Resource(busy)),
            None => Ok(()),
        }
    }

    fn placed(&self, session: usize) -> Option<Placement> {
        self.assignment[session].map(|vi| self.model.domain(session)[vi as usize])
    }

    fn touched(&self, session: usize, placement: &Placement) -> Vec<usize> {
        let model = self.model;
        let course = model.sessions[session].course;
        let mut resources = vec![
            model.resource_index(Resource::Faculty(placement.faculty)),
            model.resource_index(Resource::Course(course)),
        ];
        resources.extend(placement.room.map(|r| model.resource_index(Resource::Room(r))));
        resources.extend(
            model.courses[course]
                .groups
                .iter()
                .map(|&g| model.resource_index(Resource::Group(g))),
        );
        resources
    }

    fn place(&mut self, session: usize, vi: u32) {
        let placement = self.model.domain(session)[vi as usize];
        let course = self.model.sessions[session].course;
        for r in self.touched(session, &placement) {
            for slot in self.model.span(course, placement.start) {
                self.occupancy[r * self.slot_count + slot] = Some(session as u32);
            }
        }
        self.load[placement.faculty] += 1;
        self.cost += u64::from(placement.penalty);
        self.remaining_floor -= self.min_penalty[course];
        self.assignment[session] = Some(vi);
        self.assigned += 1;

        if self.assigned > self.best_depth {
            self.best_depth = self.assigned;
            if self.shared.allow_partial() {
                self.best_partial.clone_from(&self.assignment);
            }
        }
    }

    fn unplace(&mut self, session: usize, vi: u32) {
        let placement = self.model.domain(session)[vi as usize];
        let course = self.model.sessions[session].course;
        for r in self.touched(session, &placement) {
            for slot in self.model.span(course, placement.start) {
                self.occupancy[r * self.slot_count + slot] = None;
            }
        }
        self.load[placement.faculty] -= 1;
        self.cost -= u64::from(placement.penalty);
        self.remaining_floor += self.min_penalty[course];
        self.assignment[session] = None;
        self.assigned -= 1;
    }

    /// Attributes every rejected placement of a dead-end session to its blocker.
    fn blame(&mut self, session: usize) {
        let blockers: Vec<Blocker> = self
            .model
            .domain(session)
            .iter()
            .filter_map(|p| self.fits(session, p).err())
            .collect();
        for blocker in blockers {
            match blocker {
                Blocker::Resource(r) => self.conflicts[r] += 1,
                Blocker::Load(f) => self.load_conflicts[f] += 1,
            }
        }
    }

    fn commit(&mut self) -> Flow {
        let placements: Vec<Placement> = (0..self.assignment.len())
            .filter_map(|s| self.placed(s))
            .collect();
        if self.shared.offer_solution(self.id, placements, self.cost) {
            Flow::Halt
        } else {
            Flow::Continue
        }
    }
}
