#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use timetable_solver::data::{
    Course, Faculty, Room, SchedulingInput, SchedulingOutput, StudentGroup, TimeslotGrid,
};
use timetable_solver::{SolveConfig, SolveStatus};

pub fn grid(days: &[&str], periods: u32) -> SchedulingInput {
    SchedulingInput {
        grid: Some(TimeslotGrid {
            days: days.iter().map(|d| d.to_string()).collect(),
            periods_per_day: periods,
        }),
        ..Default::default()
    }
}

pub fn course(id: &str, sessions: u32, faculty: &[&str], groups: &[&str]) -> Course {
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

pub fn faculty(id: &str) -> Faculty {
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

pub fn available_only(id: &str, slots: &[&str]) -> Faculty {
    Faculty {
        available_timeslot_ids: Some(slots.iter().map(|s| s.to_string()).collect()),
        ..faculty(id)
    }
}

pub fn group(id: &str, size: u32) -> StudentGroup {
    StudentGroup {
        id: id.into(),
        course_ids: vec![],
        size,
    }
}

pub fn room(id: &str, capacity: u32) -> Room {
    Room {
        id: id.into(),
        capacity,
        room_type: None,
    }
}

pub fn config(workers: usize, budget_secs: f64) -> SolveConfig {
    SolveConfig {
        worker_count: workers,
        time_budget_seconds: Some(budget_secs),
        ..Default::default()
    }
}

/// Checks every hard invariant of a `FEASIBLE` output against its input.
pub fn assert_valid(input: &SchedulingInput, output: &SchedulingOutput) {
    assert_eq!(output.status, SolveStatus::Feasible);

    let slots = input.resolved_timeslots();
    let slot_by_id: HashMap<&str, (&str, u32)> = slots
        .iter()
        .map(|t| (t.id.as_str(), (t.day.as_str(), t.period)))
        .collect();
    let courses: HashMap<&str, &Course> =
        input.courses.iter().map(|c| (c.id.as_str(), c)).collect();

    // every session exactly once
    let expected: HashSet<String> = input
        .courses
        .iter()
        .flat_map(|c| (1..=c.sessions_per_week).map(move |k| format!("{}#{}", c.id, k)))
        .collect();
    let seen: Vec<&str> = output.timetable.iter().map(|e| e.session_id.as_str()).collect();
    let unique: HashSet<String> = seen.iter().map(|s| s.to_string()).collect();
    assert_eq!(seen.len(), unique.len(), "duplicate sessions in {seen:?}");
    assert_eq!(unique, expected);

    let mut enrolled: HashMap<&str, HashSet<&str>> = HashMap::new();
    for c in &input.courses {
        for g in &c.student_group_ids {
            enrolled.entry(c.id.as_str()).or_default().insert(g.as_str());
        }
    }
    for g in &input.student_groups {
        for c in &g.course_ids {
            enrolled.entry(c.as_str()).or_default().insert(g.id.as_str());
        }
    }

    let mut busy: HashSet<(String, String, u32)> = HashSet::new();
    let mut load: HashMap<&str, u32> = HashMap::new();
    for entry in &output.timetable {
        let course = courses[entry.course_id.as_str()];
        assert!(course.eligible_faculty_ids.contains(&entry.faculty_id));
        *load.entry(entry.faculty_id.as_str()).or_default() += 1;

        let (day, period) = slot_by_id[entry.timeslot_id.as_str()];
        let f = input.faculty.iter().find(|f| f.id == entry.faculty_id).unwrap();
        for offset in 0..course.duration_slots {
            let p = period + offset;
            let slot = slots
                .iter()
                .find(|t| t.day == day && t.period == p)
                .expect("session runs past the end of its day");
            if let Some(available) = &f.available_timeslot_ids {
                assert!(available.contains(&slot.id), "{} unavailable at {}", f.id, slot.id);
            }
            assert!(!f.unavailable_timeslot_ids.contains(&slot.id));

            let mut claim = |kind: &str, id: &str| {
                assert!(
                    busy.insert((format!("{kind}:{id}"), day.to_string(), p)),
                    "{kind} {id} double-booked on {day} period {p}"
                );
            };
            claim("faculty", entry.faculty_id.as_str());
            claim("course", entry.course_id.as_str());
            if let Some(room) = &entry.room_id {
                claim("room", room.as_str());
            }
            for g in enrolled.get(entry.course_id.as_str()).into_iter().flatten() {
                claim("group", *g);
            }
        }
    }

    for f in &input.faculty {
        if let Some(max) = f.max_weekly_sessions {
            assert!(load.get(f.id.as_str()).copied().unwrap_or(0) <= max);
        }
    }
    if input.rooms.is_empty() {
        assert!(output.timetable.iter().all(|e| e.room_id.is_none()));
    } else {
        assert!(output.timetable.iter().all(|e| e.room_id.is_some()));
    }
}
