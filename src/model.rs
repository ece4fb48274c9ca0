use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Timestamps are written as RFC 3339 UTC. Older records were written as
/// naive ISO 8601 without an offset; those are read as UTC.
pub mod iso_time {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let t = raw.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(t) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => s.serialize_str(&super::format(ts)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let Some(raw) = Option::<String>::deserialize(d)? else {
                return Ok(None);
            };
            super::parse(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
        }
    }
}

/// A single attendance code. `P` and `A` are the only values this service
/// writes; anything else found in stored data is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mark {
    Present,
    Absent,
    Other(String),
}

impl Mark {
    pub fn from_code(code: &str) -> Self {
        match code {
            "P" => Mark::Present,
            "A" => Mark::Absent,
            other => Mark::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Mark::Present => "P",
            Mark::Absent => "A",
            Mark::Other(code) => code,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.code().trim().is_empty()
    }
}

impl Serialize for Mark {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Mark {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(Mark::from_code(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMark {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub status: Option<Mark>,
}

/// One student's attendance for one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttendanceEntry {
    /// Single mark meaning "session 1 only".
    Scalar(Mark),
    /// Ordered per-session marks, `session_1` first.
    Structured {
        sessions: Vec<SessionMark>,
        #[serde(
            default,
            with = "iso_time::option",
            skip_serializing_if = "Option::is_none"
        )]
        updated_at: Option<DateTime<Utc>>,
    },
    /// Old `{status, count}` shape; read only, never written.
    Tallied {
        status: Option<Mark>,
        #[serde(default = "one")]
        count: u32,
    },
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentMode {
    #[default]
    ManualEntry,
    EnrollmentViaId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: String,
    #[serde(default, deserialize_with = "drop_null_entries")]
    pub attendance: BTreeMap<String, AttendanceEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StudentRecord {
    #[cfg(test)]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attendance: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

fn drop_null_entries<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<BTreeMap<String, AttendanceEntry>, D::Error> {
    let raw = Option::<BTreeMap<String, Option<AttendanceEntry>>>::deserialize(d)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(date, entry)| entry.map(|e| (date, e)))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub class_id: String,
    pub teacher_id: String,
    #[serde(default)]
    pub enrollment_mode: EnrollmentMode,
    #[serde(default)]
    pub students: Vec<StudentRecord>,
    #[serde(
        default,
        with = "iso_time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "iso_time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Class {
    pub fn new(
        class_id: impl Into<String>,
        teacher_id: impl Into<String>,
        enrollment_mode: EnrollmentMode,
    ) -> Self {
        Self {
            class_id: class_id.into(),
            teacher_id: teacher_id.into(),
            enrollment_mode,
            students: Vec::new(),
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    pub fn allows_qr_attendance(&self) -> bool {
        self.enrollment_mode == EnrollmentMode::EnrollmentViaId
    }

    pub fn student(&self, record_id: &str) -> Option<&StudentRecord> {
        self.students.iter().find(|s| s.id == record_id)
    }

    pub fn student_mut(&mut self, record_id: &str) -> Option<&mut StudentRecord> {
        self.students.iter_mut().find(|s| s.id == record_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentStatus {
    Active,
    Other(String),
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Other(s) => s,
        }
    }
}

impl Serialize for EnrollmentStatus {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EnrollmentStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(match raw.as_str() {
            "active" => EnrollmentStatus::Active,
            _ => EnrollmentStatus::Other(raw),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub class_id: String,
    pub student_id: String,
    pub student_record_id: String,
    pub status: EnrollmentStatus,
    #[serde(
        default,
        with = "iso_time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "iso_time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Enrollment {
    pub fn is_active(&self) -> bool {
        self.status == EnrollmentStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(
        default,
        with = "iso_time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "iso_time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(
        default,
        with = "iso_time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "iso_time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactMessage {
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
    #[serde(
        default,
        with = "iso_time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QrSessionStatus {
    Active,
    Stopped,
}

/// The open attendance window for one `(class_id, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrSession {
    pub class_id: String,
    pub teacher_id: String,
    pub date: String,
    pub session_number: u32,
    #[serde(with = "iso_time")]
    pub started_at: DateTime<Utc>,
    pub rotation_interval: u32,
    pub current_code: String,
    #[serde(with = "iso_time")]
    pub code_generated_at: DateTime<Utc>,
    #[serde(default)]
    pub scanned_students: Vec<String>,
    pub status: QrSessionStatus,
    #[serde(
        default,
        with = "iso_time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_scan_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "iso_time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "iso_time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl QrSession {
    pub fn is_active(&self) -> bool {
        self.status == QrSessionStatus::Active
    }

    pub fn has_scanned(&self, student_record_id: &str) -> bool {
        self.scanned_students.iter().any(|s| s == student_record_id)
    }

    /// Returns false when the student was already recorded.
    pub fn record_scan(&mut self, student_record_id: &str) -> bool {
        if self.has_scanned(student_record_id) {
            return false;
        }
        self.scanned_students.push(student_record_id.to_string());
        true
    }
}
