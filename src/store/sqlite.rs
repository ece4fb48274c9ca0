use super::{Store, StoreError, StoreResult};
use crate::model::{iso_time, Class, ContactMessage, Enrollment, QrSession, Student, User};
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Document store on SQLite: each collection is a table holding the JSON
/// document next to the columns it is looked up by.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open database {}", db_path.display()))?;
        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        ensure_schema(&conn).context("failed to create schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ensure_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            user_id TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            doc TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users(email)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            class_id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            doc TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_teacher ON classes(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            student_id TEXT PRIMARY KEY,
            email TEXT,
            doc TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_email ON students(email)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            doc TEXT NOT NULL,
            PRIMARY KEY(class_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_class ON enrollments(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS contact_messages(
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            created_at TEXT,
            doc TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_contact_messages_email ON contact_messages(email)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS qr_sessions(
            class_id TEXT NOT NULL,
            date TEXT NOT NULL,
            doc TEXT NOT NULL,
            PRIMARY KEY(class_id, date)
        )",
        [],
    )?;

    Ok(())
}

fn encode<T: Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(StoreError::Encode)
}

fn decode<T: DeserializeOwned>(table: &str, key: &str, doc: &str) -> StoreResult<T> {
    serde_json::from_str(doc).map_err(|source| StoreError::Corrupt {
        location: format!("{}/{}", table, key),
        source,
    })
}

fn decode_all<T: DeserializeOwned>(table: &str, rows: Vec<(String, String)>) -> StoreResult<Vec<T>> {
    rows.iter()
        .map(|(key, doc)| decode(table, key, doc))
        .collect()
}

impl Store for SqliteStore {
    fn get_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        let doc: Option<String> = self
            .conn()
            .query_row("SELECT doc FROM users WHERE user_id = ?", [user_id], |r| {
                r.get(0)
            })
            .optional()?;
        doc.map(|d| decode("users", user_id, &d)).transpose()
    }

    fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row: Option<(String, String)> = self
            .conn()
            .query_row(
                "SELECT user_id, doc FROM users WHERE email = ?",
                [email],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        row.map(|(id, d)| decode("users", &id, &d)).transpose()
    }

    fn put_user(&self, user: &User) -> StoreResult<()> {
        let doc = encode(user)?;
        self.conn().execute(
            "INSERT INTO users(user_id, email, doc) VALUES(?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
               email = excluded.email,
               doc = excluded.doc",
            (&user.user_id, &user.email, &doc),
        )?;
        Ok(())
    }

    fn delete_user(&self, user_id: &str) -> StoreResult<bool> {
        let n = self
            .conn()
            .execute("DELETE FROM users WHERE user_id = ?", [user_id])?;
        Ok(n > 0)
    }

    fn get_class(&self, class_id: &str) -> StoreResult<Option<Class>> {
        let doc: Option<String> = self
            .conn()
            .query_row(
                "SELECT doc FROM classes WHERE class_id = ?",
                [class_id],
                |r| r.get(0),
            )
            .optional()?;
        doc.map(|d| decode("classes", class_id, &d)).transpose()
    }

    fn put_class(&self, class: &Class) -> StoreResult<()> {
        let doc = encode(class)?;
        self.conn().execute(
            "INSERT INTO classes(class_id, teacher_id, doc) VALUES(?, ?, ?)
             ON CONFLICT(class_id) DO UPDATE SET
               teacher_id = excluded.teacher_id,
               doc = excluded.doc",
            (&class.class_id, &class.teacher_id, &doc),
        )?;
        Ok(())
    }

    fn delete_class(&self, class_id: &str) -> StoreResult<bool> {
        let n = self
            .conn()
            .execute("DELETE FROM classes WHERE class_id = ?", [class_id])?;
        Ok(n > 0)
    }

    fn list_classes(&self, teacher_id: &str) -> StoreResult<Vec<Class>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT class_id, doc FROM classes WHERE teacher_id = ? ORDER BY class_id",
        )?;
        let rows: Vec<(String, String)> = stmt
            .query_map([teacher_id], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        decode_all("classes", rows)
    }

    fn get_student(&self, student_id: &str) -> StoreResult<Option<Student>> {
        let doc: Option<String> = self
            .conn()
            .query_row(
                "SELECT doc FROM students WHERE student_id = ?",
                [student_id],
                |r| r.get(0),
            )
            .optional()?;
        doc.map(|d| decode("students", student_id, &d)).transpose()
    }

    fn put_student(&self, student: &Student) -> StoreResult<()> {
        let doc = encode(student)?;
        self.conn().execute(
            "INSERT INTO students(student_id, email, doc) VALUES(?, ?, ?)
             ON CONFLICT(student_id) DO UPDATE SET
               email = excluded.email,
               doc = excluded.doc",
            (&student.student_id, &student.email, &doc),
        )?;
        Ok(())
    }

    fn list_enrollments(&self, class_id: &str) -> StoreResult<Vec<Enrollment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT student_id, doc FROM enrollments WHERE class_id = ? ORDER BY rowid",
        )?;
        let rows: Vec<(String, String)> = stmt
            .query_map([class_id], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        decode_all("enrollments", rows)
    }

    fn put_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()> {
        let doc = encode(enrollment)?;
        self.conn().execute(
            "INSERT INTO enrollments(class_id, student_id, doc) VALUES(?, ?, ?)
             ON CONFLICT(class_id, student_id) DO UPDATE SET
               doc = excluded.doc",
            (&enrollment.class_id, &enrollment.student_id, &doc),
        )?;
        Ok(())
    }

    fn save_contact_message(&self, message: &ContactMessage) -> StoreResult<()> {
        let doc = encode(message)?;
        let id = Uuid::new_v4().to_string();
        let created_at = message.created_at.as_ref().map(iso_time::format);
        self.conn().execute(
            "INSERT INTO contact_messages(id, email, created_at, doc) VALUES(?, ?, ?, ?)",
            (&id, &message.email, &created_at, &doc),
        )?;
        Ok(())
    }

    fn list_contact_messages(&self, email: Option<&str>) -> StoreResult<Vec<ContactMessage>> {
        let conn = self.conn();
        let rows = match email {
            Some(email) => {
                let mut stmt = conn.prepare(
                    "SELECT id, doc FROM contact_messages
                     WHERE email = ?
                     ORDER BY created_at IS NULL, created_at DESC",
                )?;
                let rows: Vec<(String, String)> = stmt
                    .query_map([email], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, doc FROM contact_messages
                     ORDER BY created_at IS NULL, created_at DESC",
                )?;
                let rows: Vec<(String, String)> = stmt
                    .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        decode_all("contact_messages", rows)
    }

    fn get_qr_session(&self, class_id: &str, date: &str) -> StoreResult<Option<QrSession>> {
        let doc: Option<String> = self
            .conn()
            .query_row(
                "SELECT doc FROM qr_sessions WHERE class_id = ? AND date = ?",
                (class_id, date),
                |r| r.get(0),
            )
            .optional()?;
        doc.map(|d| decode("qr_sessions", &format!("{}/{}", class_id, date), &d))
            .transpose()
    }

    fn put_qr_session(&self, session: &QrSession) -> StoreResult<()> {
        let doc = encode(session)?;
        self.conn().execute(
            "INSERT INTO qr_sessions(class_id, date, doc) VALUES(?, ?, ?)
             ON CONFLICT(class_id, date) DO UPDATE SET
               doc = excluded.doc",
            (&session.class_id, &session.date, &doc),
        )?;
        Ok(())
    }
}
