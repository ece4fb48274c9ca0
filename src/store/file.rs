use super::{check_key, Store, StoreError, StoreResult};
use crate::model::{iso_time, Class, ContactMessage, Enrollment, QrSession, Student, User};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// JSON documents in a directory tree:
///
/// ```text
/// users/<user_id>/user.json
/// users/<teacher_id>/classes/class_<class_id>.json
/// students/<student_id>/student.json
/// enrollments/class_<class_id>_enrollments.json
/// contact/message_<stamp>_<suffix>.json
/// qr_sessions/class_<class_id>_<date>.json
/// ```
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn open(base_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let store = Self {
            base_dir: base_dir.into(),
        };
        for dir in [
            store.users_dir(),
            store.students_dir(),
            store.contact_dir(),
            store.enrollments_dir(),
            store.qr_sessions_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|source| StoreError::Io { path: dir, source })?;
        }
        Ok(store)
    }

    fn users_dir(&self) -> PathBuf {
        self.base_dir.join("users")
    }

    fn students_dir(&self) -> PathBuf {
        self.base_dir.join("students")
    }

    fn contact_dir(&self) -> PathBuf {
        self.base_dir.join("contact")
    }

    fn enrollments_dir(&self) -> PathBuf {
        self.base_dir.join("enrollments")
    }

    fn qr_sessions_dir(&self) -> PathBuf {
        self.base_dir.join("qr_sessions")
    }

    fn user_path(&self, user_id: &str) -> StoreResult<PathBuf> {
        Ok(self.users_dir().join(check_key(user_id)?).join("user.json"))
    }

    fn classes_dir(&self, teacher_id: &str) -> StoreResult<PathBuf> {
        Ok(self.users_dir().join(check_key(teacher_id)?).join("classes"))
    }

    fn class_path(&self, teacher_id: &str, class_id: &str) -> StoreResult<PathBuf> {
        Ok(self
            .classes_dir(teacher_id)?
            .join(format!("class_{}.json", check_key(class_id)?)))
    }

    fn student_path(&self, student_id: &str) -> StoreResult<PathBuf> {
        Ok(self
            .students_dir()
            .join(check_key(student_id)?)
            .join("student.json"))
    }

    fn enrollments_path(&self, class_id: &str) -> StoreResult<PathBuf> {
        Ok(self
            .enrollments_dir()
            .join(format!("class_{}_enrollments.json", check_key(class_id)?)))
    }

    fn qr_session_path(&self, class_id: &str, date: &str) -> StoreResult<PathBuf> {
        Ok(self.qr_sessions_dir().join(format!(
            "class_{}_{}.json",
            check_key(class_id)?,
            check_key(date)?
        )))
    }

    /// Every teacher directory that holds a copy of `class_id`.
    fn class_locations(&self, class_id: &str) -> StoreResult<Vec<PathBuf>> {
        let mut found = Vec::new();
        for teacher_id in list_names(&self.users_dir())? {
            let path = self.class_path(&teacher_id, class_id)?;
            if path.is_file() {
                found.push(path);
            }
        }
        Ok(found)
    }
}

/// Sorted entry names of `dir`; a missing directory has none.
fn list_names(dir: &Path) -> StoreResult<Vec<String>> {
    let io_err = |source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let entries = match fs::read_dir(dir) {
        Ok(v) => v,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(e)),
    };
    let mut names = Vec::new();
    for ent in entries {
        let ent = ent.map_err(io_err)?;
        if let Some(name) = ent.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(v) => v,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            location: path.to_string_lossy().to_string(),
            source,
        })
}

/// Writes through a sibling temp file so readers never see half a record.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(StoreError::Encode)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

fn remove_file(path: &Path) -> StoreResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

impl Store for FileStore {
    fn get_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        read_json(&self.user_path(user_id)?)
    }

    fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        for user_id in list_names(&self.users_dir())? {
            if let Some(user) = self.get_user(&user_id)? {
                if user.email == email {
                    return Ok(Some(user));
                }
            }
        }
        Ok(None)
    }

    fn put_user(&self, user: &User) -> StoreResult<()> {
        write_json(&self.user_path(&user.user_id)?, user)
    }

    // Only the profile goes; a teacher's class files stay where they are.
    fn delete_user(&self, user_id: &str) -> StoreResult<bool> {
        remove_file(&self.user_path(user_id)?)
    }

    fn get_class(&self, class_id: &str) -> StoreResult<Option<Class>> {
        match self.class_locations(class_id)?.first() {
            Some(path) => read_json(path),
            None => Ok(None),
        }
    }

    fn put_class(&self, class: &Class) -> StoreResult<()> {
        let target = self.class_path(&class.teacher_id, &class.class_id)?;
        write_json(&target, class)?;
        for stale in self.class_locations(&class.class_id)? {
            if stale != target {
                remove_file(&stale)?;
            }
        }
        Ok(())
    }

    fn delete_class(&self, class_id: &str) -> StoreResult<bool> {
        let mut removed = false;
        for path in self.class_locations(class_id)? {
            removed |= remove_file(&path)?;
        }
        Ok(removed)
    }

    fn list_classes(&self, teacher_id: &str) -> StoreResult<Vec<Class>> {
        let dir = self.classes_dir(teacher_id)?;
        let mut classes = Vec::new();
        for name in list_names(&dir)? {
            if !(name.starts_with("class_") && name.ends_with(".json")) {
                continue;
            }
            if let Some(class) = read_json(&dir.join(&name))? {
                classes.push(class);
            }
        }
        Ok(classes)
    }

    fn get_student(&self, student_id: &str) -> StoreResult<Option<Student>> {
        read_json(&self.student_path(student_id)?)
    }

    fn put_student(&self, student: &Student) -> StoreResult<()> {
        write_json(&self.student_path(&student.student_id)?, student)
    }

    fn list_enrollments(&self, class_id: &str) -> StoreResult<Vec<Enrollment>> {
        Ok(read_json(&self.enrollments_path(class_id)?)?.unwrap_or_default())
    }

    fn put_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()> {
        let path = self.enrollments_path(&enrollment.class_id)?;
        let mut all: Vec<Enrollment> = read_json(&path)?.unwrap_or_default();
        match all
            .iter_mut()
            .find(|e| e.student_id == enrollment.student_id)
        {
            Some(slot) => *slot = enrollment.clone(),
            None => all.push(enrollment.clone()),
        }
        write_json(&path, &all)
    }

    fn save_contact_message(&self, message: &ContactMessage) -> StoreResult<()> {
        let stamp = message
            .created_at
            .map(|ts| ts.format("%Y%m%d_%H%M%S").to_string())
            .unwrap_or_else(|| "undated".to_string());
        let suffix = Uuid::new_v4().simple().to_string();
        let path = self
            .contact_dir()
            .join(format!("message_{}_{}.json", stamp, &suffix[..8]));
        write_json(&path, message)
    }

    fn list_contact_messages(&self, email: Option<&str>) -> StoreResult<Vec<ContactMessage>> {
        let dir = self.contact_dir();
        let mut messages: Vec<ContactMessage> = Vec::new();
        for name in list_names(&dir)? {
            if !name.ends_with(".json") {
                continue;
            }
            let Some(message) = read_json::<ContactMessage>(&dir.join(&name))? else {
                continue;
            };
            if email.map(|e| e == message.email).unwrap_or(true) {
                messages.push(message);
            }
        }
        messages.sort_by(|a, b| {
            let a = a.created_at.as_ref().map(iso_time::format);
            let b = b.created_at.as_ref().map(iso_time::format);
            b.cmp(&a)
        });
        Ok(messages)
    }

    fn get_qr_session(&self, class_id: &str, date: &str) -> StoreResult<Option<QrSession>> {
        read_json(&self.qr_session_path(class_id, date)?)
    }

    fn put_qr_session(&self, session: &QrSession) -> StoreResult<()> {
        write_json(
            &self.qr_session_path(&session.class_id, &session.date)?,
            session,
        )
    }
}
