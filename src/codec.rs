//! Reading and writing per-date attendance entries embedded in class records.
//!
//! An entry starts life as a scalar mark for session 1 and turns into a
//! structured per-session list the first time a later session is marked.
//! It never turns back into a scalar.

use crate::model::{AttendanceEntry, Class, Mark, SessionMark};
use chrono::{DateTime, Utc};

/// Upper bound on sessions read from a legacy `{status, count}` entry.
pub const MAX_TALLIED_SESSIONS: u32 = 1000;

pub fn session_mark_id(session_number: u32) -> String {
    format!("session_{}", session_number)
}

pub fn session_mark_name(session_number: u32) -> String {
    format!("QR Session {}", session_number)
}

fn session_ordinal(id: &str) -> Option<u32> {
    id.strip_prefix("session_")?.parse().ok()
}

/// Number of sessions with a recorded outcome in one entry.
pub fn valid_sessions(entry: &AttendanceEntry) -> u32 {
    match entry {
        AttendanceEntry::Scalar(mark) => {
            if mark.is_blank() {
                0
            } else {
                1
            }
        }
        AttendanceEntry::Structured { sessions, .. } => {
            sessions.iter().filter(|s| s.status.is_some()).count() as u32
        }
        AttendanceEntry::Tallied {
            status: Some(_),
            count,
        } => (*count).min(MAX_TALLIED_SESSIONS),
        AttendanceEntry::Tallied { status: None, .. } => 0,
    }
}

/// Highest number of recorded sessions any student has for `date`.
///
/// This is a maximum, not a sum: the next session to open on `date` is
/// numbered one past it.
pub fn count_valid_sessions(class: &Class, date: &str) -> u32 {
    class
        .students
        .iter()
        .filter_map(|s| s.attendance.get(date))
        .map(valid_sessions)
        .max()
        .unwrap_or(0)
}

/// The recorded outcome of `session_number` in `entry`, if any.
pub fn session_status(entry: Option<&AttendanceEntry>, session_number: u32) -> Option<&Mark> {
    match entry? {
        AttendanceEntry::Scalar(mark) => {
            (session_number == 1 && !mark.is_blank()).then_some(mark)
        }
        AttendanceEntry::Structured { sessions, .. } => {
            let id = session_mark_id(session_number);
            sessions
                .iter()
                .find(|s| s.id == id)
                .and_then(|s| s.status.as_ref())
        }
        AttendanceEntry::Tallied { status, .. } => {
            if session_number == 1 {
                status.as_ref()
            } else {
                None
            }
        }
    }
}

/// Session-1 value carried over when a scalar-like entry is expanded.
fn carried_first_mark(entry: Option<&AttendanceEntry>) -> Option<Mark> {
    match entry? {
        AttendanceEntry::Scalar(mark) if !mark.is_blank() => Some(mark.clone()),
        AttendanceEntry::Tallied {
            status: Some(mark), ..
        } => Some(mark.clone()),
        _ => None,
    }
}

/// Returns `entry` with `mark` recorded for `session_number` (1-based).
///
/// Session 1 on a scalar or missing entry stays scalar. Any later session
/// produces the structured form, padding missing sessions with `A`. Applying
/// the same mark twice yields the same entry apart from `updated_at`.
pub fn apply_mark(
    entry: Option<&AttendanceEntry>,
    session_number: u32,
    mark: Mark,
    now: DateTime<Utc>,
) -> AttendanceEntry {
    let session_number = session_number.max(1);
    match entry {
        Some(AttendanceEntry::Structured { sessions, .. }) => {
            let mut sessions = sessions.clone();
            fill_sessions(&mut sessions, session_number);
            let target = session_mark_id(session_number);
            if let Some(slot) = sessions.iter_mut().find(|s| s.id == target) {
                slot.status = Some(mark);
            }
            AttendanceEntry::Structured {
                sessions,
                updated_at: Some(now),
            }
        }
        _ if session_number == 1 => AttendanceEntry::Scalar(mark),
        _ => {
            let first = carried_first_mark(entry).unwrap_or(Mark::Absent);
            let sessions = (1..=session_number)
                .map(|i| SessionMark {
                    id: session_mark_id(i),
                    name: session_mark_name(i),
                    status: Some(if i == session_number {
                        mark.clone()
                    } else if i == 1 {
                        first.clone()
                    } else {
                        Mark::Absent
                    }),
                })
                .collect();
            AttendanceEntry::Structured {
                sessions,
                updated_at: Some(now),
            }
        }
    }
}

/// Inserts `A` marks for any of sessions `1..=up_to` missing from the list,
/// keeping the list ordered by session number.
fn fill_sessions(sessions: &mut Vec<SessionMark>, up_to: u32) {
    for i in 1..=up_to {
        let id = session_mark_id(i);
        if sessions.iter().any(|s| s.id == id) {
            continue;
        }
        let at = sessions
            .iter()
            .position(|s| session_ordinal(&s.id).map(|n| n > i).unwrap_or(false))
            .unwrap_or(sessions.len());
        sessions.insert(
            at,
            SessionMark {
                id,
                name: session_mark_name(i),
                status: Some(Mark::Absent),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EnrollmentMode, StudentRecord};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn statuses(entry: &AttendanceEntry) -> Vec<Option<&str>> {
        match entry {
            AttendanceEntry::Structured { sessions, .. } => sessions
                .iter()
                .map(|s| s.status.as_ref().map(|m| m.code()))
                .collect(),
            other => panic!("expected structured entry, got {:?}", other),
        }
    }

    fn mark(id: &str, status: Option<Mark>) -> SessionMark {
        SessionMark {
            id: id.to_string(),
            name: String::new(),
            status,
        }
    }

    #[test]
    fn first_session_stays_scalar() {
        let e = apply_mark(None, 1, Mark::Present, now());
        assert_eq!(e, AttendanceEntry::Scalar(Mark::Present));
        let e = apply_mark(Some(&e), 1, Mark::Absent, now());
        assert_eq!(e, AttendanceEntry::Scalar(Mark::Absent));
    }

    #[test]
    fn second_session_expands_scalar_and_keeps_first_mark() {
        let prior = AttendanceEntry::Scalar(Mark::Present);
        let e = apply_mark(Some(&prior), 2, Mark::Absent, now());
        assert_eq!(statuses(&e), vec![Some("P"), Some("A")]);

        let e = apply_mark(Some(&prior), 3, Mark::Present, now());
        assert_eq!(statuses(&e), vec![Some("P"), Some("A"), Some("P")]);
        if let AttendanceEntry::Structured { sessions, updated_at } = &e {
            assert_eq!(sessions[2].id, "session_3");
            assert_eq!(sessions[2].name, "QR Session 3");
            assert_eq!(*updated_at, Some(now()));
        }
    }

    #[test]
    fn missing_entry_pads_with_absent() {
        let e = apply_mark(None, 3, Mark::Present, now());
        assert_eq!(statuses(&e), vec![Some("A"), Some("A"), Some("P")]);
    }

    #[test]
    fn structured_entry_is_extended_in_order() {
        let prior = AttendanceEntry::Structured {
            sessions: vec![
                mark("session_1", Some(Mark::Present)),
                mark("session_3", None),
            ],
            updated_at: None,
        };
        let e = apply_mark(Some(&prior), 4, Mark::Present, now());
        let AttendanceEntry::Structured { sessions, .. } = &e else {
            panic!("structured");
        };
        let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["session_1", "session_2", "session_3", "session_4"]);
        assert_eq!(statuses(&e), vec![Some("P"), Some("A"), None, Some("P")]);
    }

    #[test]
    fn structured_entry_only_overwrites_target_session() {
        let prior = AttendanceEntry::Structured {
            sessions: vec![
                mark("session_1", Some(Mark::Present)),
                mark("session_2", Some(Mark::Absent)),
                mark("session_3", Some(Mark::Present)),
            ],
            updated_at: None,
        };
        let once = apply_mark(Some(&prior), 2, Mark::Present, now());
        let twice = apply_mark(Some(&once), 2, Mark::Present, now());
        assert_eq!(once, twice);
        assert_eq!(statuses(&twice), vec![Some("P"), Some("P"), Some("P")]);
    }

    #[test]
    fn structured_entry_never_reverts_to_scalar() {
        let prior = AttendanceEntry::Structured {
            sessions: vec![mark("session_1", None), mark("session_2", None)],
            updated_at: None,
        };
        let e = apply_mark(Some(&prior), 1, Mark::Present, now());
        assert_eq!(statuses(&e), vec![Some("P"), None]);
    }

    #[test]
    fn tallied_entry_expands_like_scalar() {
        let prior = AttendanceEntry::Tallied {
            status: Some(Mark::Present),
            count: 1,
        };
        let e = apply_mark(Some(&prior), 2, Mark::Present, now());
        assert_eq!(statuses(&e), vec![Some("P"), Some("P")]);
    }

    #[test]
    fn count_takes_maximum_across_students() {
        let mut class = Class::new("c1", "t1", EnrollmentMode::EnrollmentViaId);
        let date = "2024-03-01";

        let mut a = StudentRecord::new("a");
        a.attendance
            .insert(date.into(), AttendanceEntry::Scalar(Mark::Present));
        let mut b = StudentRecord::new("b");
        b.attendance.insert(
            date.into(),
            AttendanceEntry::Structured {
                sessions: vec![
                    mark("session_1", Some(Mark::Present)),
                    mark("session_2", Some(Mark::Absent)),
                    mark("session_3", None),
                ],
                updated_at: None,
            },
        );
        let mut c = StudentRecord::new("c");
        c.attendance.insert(
            "2024-03-02".into(),
            AttendanceEntry::Tallied {
                status: Some(Mark::Present),
                count: 5,
            },
        );
        class.students = vec![a, b, c, StudentRecord::new("d")];

        assert_eq!(count_valid_sessions(&class, date), 2);
        assert_eq!(count_valid_sessions(&class, "2024-03-02"), 5);
        assert_eq!(count_valid_sessions(&class, "2024-03-03"), 0);
    }

    #[test]
    fn oversized_tallied_count_is_capped() {
        let mut class = Class::new("c1", "t1", EnrollmentMode::EnrollmentViaId);
        let mut a = StudentRecord::new("a");
        a.attendance.insert(
            "2024-03-01".into(),
            AttendanceEntry::Tallied {
                status: Some(Mark::Present),
                count: u32::MAX,
            },
        );
        class.students.push(a);
        let count = count_valid_sessions(&class, "2024-03-01");
        assert_eq!(count, MAX_TALLIED_SESSIONS);
        assert_eq!(count.saturating_add(1), MAX_TALLIED_SESSIONS + 1);
    }

    #[test]
    fn blank_scalar_counts_as_nothing() {
        let blank = AttendanceEntry::Scalar(Mark::Other(String::new()));
        assert_eq!(valid_sessions(&blank), 0);
        assert_eq!(session_status(Some(&blank), 1), None);
        let e = apply_mark(Some(&blank), 2, Mark::Present, now());
        assert_eq!(statuses(&e), vec![Some("A"), Some("P")]);
    }

    #[test]
    fn session_status_reads_each_shape() {
        let scalar = AttendanceEntry::Scalar(Mark::Present);
        assert_eq!(session_status(Some(&scalar), 1), Some(&Mark::Present));
        assert_eq!(session_status(Some(&scalar), 2), None);

        let structured = AttendanceEntry::Structured {
            sessions: vec![mark("session_1", None), mark("session_2", Some(Mark::Absent))],
            updated_at: None,
        };
        assert_eq!(session_status(Some(&structured), 1), None);
        assert_eq!(session_status(Some(&structured), 2), Some(&Mark::Absent));
        assert_eq!(session_status(None, 1), None);
    }
}
