//! QR attendance sessions: start, lazy code rotation, scans and absence
//! closure for one `(class_id, date)` at a time.
//!
//! Every operation is a read of the stored records followed by full-record
//! writes, so each one runs under the class's key in [`KeyedLocks`]. All
//! validation happens before the first write.

use crate::clock::Clock;
use crate::codec;
use crate::codegen::CodeGenerator;
use crate::locks::KeyedLocks;
use crate::model::{AttendanceEntry, Mark, QrSession, QrSessionStatus};
use crate::store::{Store, StoreError};
use chrono::Duration;
use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("class not found")]
    ClassNotFound,

    #[error("unauthorized")]
    Unauthorized,

    #[error("QR attendance is only available for classes with student enrollment via Class ID")]
    EnrollmentModeUnsupported,

    #[error("there is already an active QR session for this date; stop it first")]
    SessionAlreadyActive,

    #[error("no active QR session")]
    NoActiveSession,

    #[error("invalid or expired QR code")]
    InvalidOrExpiredCode,

    #[error("student not actively enrolled in this class")]
    StudentNotEnrolled,

    #[error("student record not found")]
    StudentRecordNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AttendanceError {
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::ClassNotFound => "class_not_found",
            AttendanceError::Unauthorized => "unauthorized",
            AttendanceError::EnrollmentModeUnsupported => "enrollment_mode_unsupported",
            AttendanceError::SessionAlreadyActive => "session_already_active",
            AttendanceError::NoActiveSession => "no_active_session",
            AttendanceError::InvalidOrExpiredCode => "invalid_or_expired_code",
            AttendanceError::StudentNotEnrolled => "student_not_enrolled",
            AttendanceError::StudentRecordNotFound => "student_record_not_found",
            AttendanceError::Store(_) => "store_failed",
        }
    }
}

pub type AttendanceResult<T> = Result<T, AttendanceError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReceipt {
    pub session_number: u32,
    pub date: String,
    pub student_record_id: String,
    pub already_scanned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopSummary {
    pub session_number: u32,
    pub date: String,
    pub scanned_count: usize,
    pub absent_count: usize,
}

/// The code a student submitted: either the bare code or a JSON object
/// carrying it under `code`. Anything else is taken literally.
pub fn submitted_code(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(obj)) => match obj.get("code") {
            Some(serde_json::Value::String(code)) => code.clone(),
            _ => raw.to_string(),
        },
        _ => raw.to_string(),
    }
}

pub struct AttendanceSessionManager {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn CodeGenerator>,
    locks: KeyedLocks,
}

impl AttendanceSessionManager {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        codes: Arc<dyn CodeGenerator>,
    ) -> Self {
        Self {
            store,
            clock,
            codes,
            locks: KeyedLocks::default(),
        }
    }

    /// Opens session `count_valid_sessions + 1` for `date`.
    pub fn start(
        &self,
        class_id: &str,
        teacher_id: &str,
        date: &str,
        rotation_interval: u32,
    ) -> AttendanceResult<QrSession> {
        self.locks.with_key(class_id, || {
            let class = self
                .store
                .get_class(class_id)?
                .ok_or(AttendanceError::ClassNotFound)?;
            if class.teacher_id != teacher_id {
                warn!(
                    "event=qr_start module=attendance status=unauthorized class_id={}",
                    class_id
                );
                return Err(AttendanceError::Unauthorized);
            }
            if !class.allows_qr_attendance() {
                return Err(AttendanceError::EnrollmentModeUnsupported);
            }
            if let Some(existing) = self.store.get_qr_session(class_id, date)? {
                if existing.is_active() {
                    return Err(AttendanceError::SessionAlreadyActive);
                }
            }

            let session_number = codec::count_valid_sessions(&class, date).saturating_add(1);
            let now = self.clock.now();
            let session = QrSession {
                class_id: class_id.to_string(),
                teacher_id: teacher_id.to_string(),
                date: date.to_string(),
                session_number,
                started_at: now,
                rotation_interval,
                current_code: self.codes.generate(),
                code_generated_at: now,
                scanned_students: Vec::new(),
                status: QrSessionStatus::Active,
                last_scan_at: None,
                stopped_at: None,
                updated_at: Some(now),
            };
            self.store.put_qr_session(&session)?;
            info!(
                "event=qr_start module=attendance status=ok class_id={} date={} session_number={}",
                class_id, date, session_number
            );
            Ok(session)
        })
    }

    /// The active session for `date`, with its code replaced first if it
    /// is at least `rotation_interval` seconds old.
    pub fn get_active(&self, class_id: &str, date: &str) -> AttendanceResult<Option<QrSession>> {
        self.locks.with_key(class_id, || {
            let Some(mut session) = self.store.get_qr_session(class_id, date)? else {
                return Ok(None);
            };
            if !session.is_active() {
                return Ok(None);
            }

            let now = self.clock.now();
            let elapsed = now - session.code_generated_at;
            if elapsed >= Duration::seconds(i64::from(session.rotation_interval)) {
                session.current_code = self.codes.generate();
                session.code_generated_at = now;
                session.updated_at = Some(now);
                self.store.put_qr_session(&session)?;
                info!(
                    "event=qr_rotate module=attendance class_id={} date={} session_number={}",
                    class_id, date, session.session_number
                );
            }
            Ok(Some(session))
        })
    }

    /// Marks `student_id` present for the active session.
    pub fn scan(
        &self,
        student_id: &str,
        class_id: &str,
        qr_code: &str,
        date: &str,
    ) -> AttendanceResult<ScanReceipt> {
        self.locks.with_key(class_id, || {
            let mut session = self
                .store
                .get_qr_session(class_id, date)?
                .filter(QrSession::is_active)
                .ok_or(AttendanceError::NoActiveSession)?;

            if session.current_code != submitted_code(qr_code) {
                warn!(
                    "event=qr_scan module=attendance status=invalid_code class_id={} date={}",
                    class_id, date
                );
                return Err(AttendanceError::InvalidOrExpiredCode);
            }

            let enrollment = self
                .store
                .get_active_enrollments(class_id)?
                .into_iter()
                .find(|e| e.student_id == student_id)
                .ok_or(AttendanceError::StudentNotEnrolled)?;
            let record_id = enrollment.student_record_id;

            let mut class = self
                .store
                .get_class(class_id)?
                .ok_or(AttendanceError::ClassNotFound)?;
            let record = class
                .student_mut(&record_id)
                .ok_or(AttendanceError::StudentRecordNotFound)?;

            let now = self.clock.now();
            let entry = codec::apply_mark(
                record.attendance.get(date),
                session.session_number,
                Mark::Present,
                now,
            );
            record.attendance.insert(date.to_string(), entry);
            class.updated_at = Some(now);
            self.store.put_class(&class)?;

            let first_scan = session.record_scan(&record_id);
            session.last_scan_at = Some(now);
            session.updated_at = Some(now);
            self.store.put_qr_session(&session)?;

            info!(
                "event=qr_scan module=attendance status=ok class_id={} date={} session_number={} repeat={}",
                class_id, date, session.session_number, !first_scan
            );
            Ok(ScanReceipt {
                session_number: session.session_number,
                date: date.to_string(),
                student_record_id: record_id,
                already_scanned: !first_scan,
            })
        })
    }

    /// Closes the active session, marking every actively enrolled student
    /// who did not scan as absent for it.
    ///
    /// Session 1 always ends as `A`. For later sessions the sweep only fills
    /// missing slots, so a structured entry that already holds an outcome
    /// for this session keeps it. Either way the student counts as absent.
    pub fn stop(
        &self,
        class_id: &str,
        teacher_id: &str,
        date: &str,
    ) -> AttendanceResult<StopSummary> {
        self.locks.with_key(class_id, || {
            let mut session = self
                .store
                .get_qr_session(class_id, date)?
                .filter(QrSession::is_active)
                .ok_or(AttendanceError::NoActiveSession)?;
            if session.teacher_id != teacher_id {
                warn!(
                    "event=qr_stop module=attendance status=unauthorized class_id={}",
                    class_id
                );
                return Err(AttendanceError::Unauthorized);
            }

            let active: HashSet<String> = self
                .store
                .get_active_enrollments(class_id)?
                .into_iter()
                .map(|e| e.student_record_id)
                .collect();
            let scanned: HashSet<&str> =
                session.scanned_students.iter().map(String::as_str).collect();
            let mut class = self
                .store
                .get_class(class_id)?
                .ok_or(AttendanceError::ClassNotFound)?;

            let now = self.clock.now();
            let n = session.session_number;
            let mut absent_count = 0;
            let mut kept_count = 0;
            for student in class.students.iter_mut() {
                if !active.contains(&student.id) || scanned.contains(student.id.as_str()) {
                    continue;
                }
                absent_count += 1;
                let existing = student.attendance.get(date);
                let filled_slot = matches!(existing, Some(AttendanceEntry::Structured { .. }))
                    && codec::session_status(existing, n).is_some();
                if n > 1 && filled_slot {
                    kept_count += 1;
                    continue;
                }
                let entry = codec::apply_mark(existing, n, Mark::Absent, now);
                student.attendance.insert(date.to_string(), entry);
            }
            class.updated_at = Some(now);
            self.store.put_class(&class)?;

            let scanned_count = session.scanned_students.len();
            session.status = QrSessionStatus::Stopped;
            session.stopped_at = Some(now);
            session.updated_at = Some(now);
            self.store.put_qr_session(&session)?;

            info!(
                "event=qr_stop module=attendance status=ok class_id={} date={} session_number={} scanned={} absent={} kept={}",
                class_id, date, n, scanned_count, absent_count, kept_count
            );
            Ok(StopSummary {
                session_number: n,
                date: date.to_string(),
                scanned_count,
                absent_count,
            })
        })
    }

    /// Sessions already recorded for `date`; the next `start` opens one more.
    pub fn count_sessions(&self, class_id: &str, date: &str) -> AttendanceResult<u32> {
        self.locks.with_key(class_id, || {
            let class = self
                .store
                .get_class(class_id)?
                .ok_or(AttendanceError::ClassNotFound)?;
            Ok(codec::count_valid_sessions(&class, date))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::codegen::SequenceCodeGenerator;
    use crate::model::{
        AttendanceEntry, Class, Enrollment, EnrollmentMode, EnrollmentStatus, StudentRecord,
    };
    use crate::store::{FileStore, SqliteStore};
    use chrono::{TimeZone, Utc};
    use serde_json::Map;

    const DATE: &str = "2024-03-01";

    struct Fixture {
        store: Arc<dyn Store>,
        clock: Arc<ManualClock>,
        manager: AttendanceSessionManager,
    }

    fn fixture_with(store: Arc<dyn Store>) -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        ));
        let manager = AttendanceSessionManager::new(
            Arc::clone(&store),
            clock.clone(),
            Arc::new(SequenceCodeGenerator::default()),
        );
        let mut class = Class::new("c1", "t1", EnrollmentMode::EnrollmentViaId);
        class.students = ["r1", "r2", "r3", "r4"]
            .into_iter()
            .map(StudentRecord::new)
            .collect();
        store.put_class(&class).expect("seed class");
        // s4 left the class; r4 must never be touched
        for (sid, rid, active) in [
            ("s1", "r1", true),
            ("s2", "r2", true),
            ("s3", "r3", true),
            ("s4", "r4", false),
        ] {
            store
                .put_enrollment(&Enrollment {
                    class_id: "c1".into(),
                    student_id: sid.into(),
                    student_record_id: rid.into(),
                    status: if active {
                        EnrollmentStatus::Active
                    } else {
                        EnrollmentStatus::Other("dropped".into())
                    },
                    created_at: None,
                    updated_at: None,
                    extra: Map::new(),
                })
                .expect("seed enrollment");
        }
        Fixture {
            store,
            clock,
            manager,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(
            SqliteStore::open_in_memory().expect("in-memory store"),
        ))
    }

    impl Fixture {
        fn entry(&self, record_id: &str) -> Option<AttendanceEntry> {
            self.store
                .get_class("c1")
                .expect("get class")
                .expect("class")
                .student(record_id)
                .expect("record")
                .attendance
                .get(DATE)
                .cloned()
        }

        fn session(&self) -> QrSession {
            self.store
                .get_qr_session("c1", DATE)
                .expect("get session")
                .expect("session")
        }
    }

    fn statuses(entry: &AttendanceEntry) -> Vec<Option<String>> {
        match entry {
            AttendanceEntry::Structured { sessions, .. } => sessions
                .iter()
                .map(|s| s.status.as_ref().map(|m| m.code().to_string()))
                .collect(),
            other => panic!("expected structured entry, got {:?}", other),
        }
    }

    #[test]
    fn first_session_on_fresh_date_is_number_one() {
        let f = fixture();
        let s = f.manager.start("c1", "t1", DATE, 5).expect("start");
        assert_eq!(s.session_number, 1);
        assert_eq!(s.current_code, "CODE0001");
        assert!(s.is_active());
        assert_eq!(f.session(), s);
    }

    #[test]
    fn absence_closure_marks_only_unscanned_active_students() {
        let f = fixture();
        let s = f.manager.start("c1", "t1", DATE, 5).expect("start");
        f.manager.scan("s1", "c1", &s.current_code, DATE).expect("scan s1");
        f.manager.scan("s2", "c1", &s.current_code, DATE).expect("scan s2");

        let summary = f.manager.stop("c1", "t1", DATE).expect("stop");
        assert_eq!(summary.scanned_count, 2);
        assert_eq!(summary.absent_count, 1);
        assert_eq!(summary.session_number, 1);

        assert_eq!(f.entry("r1"), Some(AttendanceEntry::Scalar(Mark::Present)));
        assert_eq!(f.entry("r2"), Some(AttendanceEntry::Scalar(Mark::Present)));
        assert_eq!(f.entry("r3"), Some(AttendanceEntry::Scalar(Mark::Absent)));
        assert_eq!(f.entry("r4"), None);

        let stored = f.session();
        assert_eq!(stored.status, QrSessionStatus::Stopped);
        assert!(stored.stopped_at.is_some());
    }

    #[test]
    fn session_numbers_increase_after_stop() {
        let f = fixture();
        let first = f.manager.start("c1", "t1", DATE, 5).expect("start 1");
        f.manager.scan("s1", "c1", &first.current_code, DATE).expect("scan");
        f.manager.stop("c1", "t1", DATE).expect("stop 1");
        assert_eq!(f.manager.count_sessions("c1", DATE).expect("count"), 1);

        let second = f.manager.start("c1", "t1", DATE, 5).expect("start 2");
        assert_eq!(second.session_number, 2);
        f.manager.scan("s3", "c1", &second.current_code, DATE).expect("scan");
        f.manager.stop("c1", "t1", DATE).expect("stop 2");

        // r1: present then absent; r3: absent then present
        let r1 = f.entry("r1").expect("r1");
        assert_eq!(statuses(&r1), vec![Some("P".into()), Some("A".into())]);
        let r3 = f.entry("r3").expect("r3");
        assert_eq!(statuses(&r3), vec![Some("A".into()), Some("P".into())]);
        assert_eq!(f.entry("r4"), None);

        let third = f.manager.start("c1", "t1", DATE, 5).expect("start 3");
        assert_eq!(third.session_number, 3);
    }

    #[test]
    fn repeated_scan_is_idempotent() {
        let f = fixture();
        let s = f.manager.start("c1", "t1", DATE, 5).expect("start");
        let a = f.manager.scan("s1", "c1", &s.current_code, DATE).expect("first");
        let b = f.manager.scan("s1", "c1", &s.current_code, DATE).expect("second");
        assert!(!a.already_scanned);
        assert!(b.already_scanned);
        assert_eq!(f.session().scanned_students, vec!["r1".to_string()]);
        assert_eq!(f.entry("r1"), Some(AttendanceEntry::Scalar(Mark::Present)));
    }

    #[test]
    fn scan_accepts_json_payload() {
        let f = fixture();
        let s = f.manager.start("c1", "t1", DATE, 5).expect("start");
        let payload = format!(r#"{{"code":"{}","class":"c1"}}"#, s.current_code);
        let r = f.manager.scan("s2", "c1", &payload, DATE).expect("scan");
        assert_eq!(r.student_record_id, "r2");
        assert_eq!(r.session_number, 1);
    }

    #[test]
    fn invalid_code_changes_nothing() {
        let f = fixture();
        f.manager.start("c1", "t1", DATE, 5).expect("start");
        let before_class = f.store.get_class("c1").expect("get");
        let e = f
            .manager
            .scan("s1", "c1", "WRONG123", DATE)
            .expect_err("bad code");
        assert!(matches!(e, AttendanceError::InvalidOrExpiredCode));
        assert_eq!(f.store.get_class("c1").expect("get"), before_class);
        assert!(f.session().scanned_students.is_empty());
        assert!(f.session().last_scan_at.is_none());
    }

    #[test]
    fn unauthorized_start_persists_nothing() {
        let f = fixture();
        let e = f.manager.start("c1", "intruder", DATE, 5).expect_err("unauthorized");
        assert!(matches!(e, AttendanceError::Unauthorized));
        assert!(f.store.get_qr_session("c1", DATE).expect("get").is_none());
    }

    #[test]
    fn start_rejections() {
        let f = fixture();
        assert!(matches!(
            f.manager.start("missing", "t1", DATE, 5),
            Err(AttendanceError::ClassNotFound)
        ));

        f.store
            .put_class(&Class::new("manual", "t1", EnrollmentMode::ManualEntry))
            .expect("seed");
        assert!(matches!(
            f.manager.start("manual", "t1", DATE, 5),
            Err(AttendanceError::EnrollmentModeUnsupported)
        ));

        let first = f.manager.start("c1", "t1", DATE, 5).expect("start");
        assert!(matches!(
            f.manager.start("c1", "t1", DATE, 5),
            Err(AttendanceError::SessionAlreadyActive)
        ));
        assert_eq!(f.session(), first);
    }

    #[test]
    fn code_rotates_lazily_on_read() {
        let f = fixture();
        let s = f.manager.start("c1", "t1", DATE, 5).expect("start");

        f.clock.advance_secs(4);
        let read = f.manager.get_active("c1", DATE).expect("read").expect("active");
        assert_eq!(read.current_code, s.current_code);
        assert_eq!(read.code_generated_at, s.code_generated_at);

        f.clock.advance_secs(2);
        let read = f.manager.get_active("c1", DATE).expect("read").expect("active");
        assert_ne!(read.current_code, s.current_code);
        assert_eq!(read.code_generated_at, f.clock.now());
        assert_eq!(f.session().current_code, read.current_code);

        // the old code is now rejected
        assert!(matches!(
            f.manager.scan("s1", "c1", &s.current_code, DATE),
            Err(AttendanceError::InvalidOrExpiredCode)
        ));
        f.manager.scan("s1", "c1", &read.current_code, DATE).expect("scan new code");
    }

    #[test]
    fn rotation_boundary_is_inclusive() {
        let f = fixture();
        let s = f.manager.start("c1", "t1", DATE, 5).expect("start");
        f.clock.advance_secs(5);
        let read = f.manager.get_active("c1", DATE).expect("read").expect("active");
        assert_ne!(read.current_code, s.current_code);
    }

    #[test]
    fn stopped_session_is_not_active() {
        let f = fixture();
        f.manager.start("c1", "t1", DATE, 5).expect("start");
        f.manager.stop("c1", "t1", DATE).expect("stop");
        assert!(f.manager.get_active("c1", DATE).expect("read").is_none());
        assert!(matches!(
            f.manager.stop("c1", "t1", DATE),
            Err(AttendanceError::NoActiveSession)
        ));
        assert!(matches!(
            f.manager.scan("s1", "c1", "CODE0001", DATE),
            Err(AttendanceError::NoActiveSession)
        ));
        assert!(f.manager.get_active("c1", "2024-03-02").expect("read").is_none());
    }

    #[test]
    fn stop_requires_session_owner() {
        let f = fixture();
        f.manager.start("c1", "t1", DATE, 5).expect("start");
        assert!(matches!(
            f.manager.stop("c1", "t2", DATE),
            Err(AttendanceError::Unauthorized)
        ));
        assert!(f.session().is_active());
        assert_eq!(f.entry("r3"), None);
    }

    #[test]
    fn scan_rejects_unenrolled_and_orphaned_students() {
        let f = fixture();
        let s = f.manager.start("c1", "t1", DATE, 5).expect("start");
        assert!(matches!(
            f.manager.scan("s4", "c1", &s.current_code, DATE),
            Err(AttendanceError::StudentNotEnrolled)
        ));
        assert!(matches!(
            f.manager.scan("stranger", "c1", &s.current_code, DATE),
            Err(AttendanceError::StudentNotEnrolled)
        ));

        let mut class = f.store.get_class("c1").expect("get").expect("class");
        class.students.retain(|r| r.id != "r2");
        f.store.put_class(&class).expect("put");
        assert!(matches!(
            f.manager.scan("s2", "c1", &s.current_code, DATE),
            Err(AttendanceError::StudentRecordNotFound)
        ));
        assert!(f.session().scanned_students.is_empty());
    }

    #[test]
    fn stop_marks_first_session_absent_over_any_prior_value() {
        let f = fixture();
        f.manager.start("c1", "t1", DATE, 5).expect("start");
        let mut class = f.store.get_class("c1").expect("get").expect("class");
        class
            .student_mut("r3")
            .expect("r3")
            .attendance
            .insert(DATE.into(), AttendanceEntry::Scalar(Mark::Present));
        f.store.put_class(&class).expect("put");

        let summary = f.manager.stop("c1", "t1", DATE).expect("stop");
        assert_eq!(summary.absent_count, 3);
        assert_eq!(f.entry("r3"), Some(AttendanceEntry::Scalar(Mark::Absent)));
        assert_eq!(f.entry("r1"), Some(AttendanceEntry::Scalar(Mark::Absent)));
        assert_eq!(f.entry("r4"), None);
    }

    #[test]
    fn stop_fills_only_missing_slots_in_later_sessions() {
        let f = fixture();
        let s1 = f.manager.start("c1", "t1", DATE, 5).expect("start");
        f.manager.scan("s1", "c1", &s1.current_code, DATE).expect("scan");
        f.manager.stop("c1", "t1", DATE).expect("stop 1");

        let s2 = f.manager.start("c1", "t1", DATE, 5).expect("start 2");
        assert_eq!(s2.session_number, 2);
        let mut class = f.store.get_class("c1").expect("get").expect("class");
        class.student_mut("r2").expect("r2").attendance.insert(
            DATE.into(),
            codec::apply_mark(
                Some(&AttendanceEntry::Scalar(Mark::Absent)),
                2,
                Mark::Other("L".into()),
                Utc::now(),
            ),
        );
        f.store.put_class(&class).expect("put");

        let summary = f.manager.stop("c1", "t1", DATE).expect("stop 2");
        assert_eq!((summary.scanned_count, summary.absent_count), (0, 3));
        let r2 = f.entry("r2").expect("r2");
        assert_eq!(statuses(&r2), vec![Some("A".to_string()), Some("L".to_string())]);
        let r1 = f.entry("r1").expect("r1");
        assert_eq!(statuses(&r1), vec![Some("P".to_string()), Some("A".to_string())]);
    }

    #[test]
    fn lifecycle_on_file_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(FileStore::open(dir.path().join("data")).expect("file store"));
        let f = fixture_with(store);
        let s = f.manager.start("c1", "t1", DATE, 5).expect("start");
        f.manager.scan("s1", "c1", &s.current_code, DATE).expect("scan");
        let summary = f.manager.stop("c1", "t1", DATE).expect("stop");
        assert_eq!((summary.scanned_count, summary.absent_count), (1, 2));
        let s2 = f.manager.start("c1", "t1", DATE, 5).expect("restart");
        assert_eq!(s2.session_number, 2);
    }

    #[test]
    fn concurrent_scans_lose_no_updates() {
        let f = Arc::new(fixture());
        let s = f.manager.start("c1", "t1", DATE, 3600).expect("start");
        let handles: Vec<_> = ["s1", "s2", "s3"]
            .into_iter()
            .map(|sid| {
                let f = Arc::clone(&f);
                let code = s.current_code.clone();
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        f.manager.scan(sid, "c1", &code, DATE).expect("scan");
                        f.manager.get_active("c1", DATE).expect("read");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("worker");
        }
        let mut scanned = f.session().scanned_students;
        scanned.sort();
        assert_eq!(scanned, vec!["r1", "r2", "r3"]);
        for rid in ["r1", "r2", "r3"] {
            assert_eq!(f.entry(rid), Some(AttendanceEntry::Scalar(Mark::Present)));
        }
    }

    #[test]
    fn submitted_code_fallbacks() {
        assert_eq!(submitted_code("ABCD1234"), "ABCD1234");
        assert_eq!(submitted_code(r#"{"code":"ABCD1234"}"#), "ABCD1234");
        assert_eq!(submitted_code(r#"{"other":1}"#), r#"{"other":1}"#);
        assert_eq!(submitted_code("12345678"), "12345678");
        assert_eq!(submitted_code(r#""QUOTED""#), r#""QUOTED""#);
    }
}
