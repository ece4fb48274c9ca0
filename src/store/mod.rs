mod file;
mod sqlite;

pub use file::FileStore;
pub use sqlite::SqliteStore;

use crate::config::{BackendKind, Config};
use crate::model::{Class, ContactMessage, Enrollment, QrSession, Student, User};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record at {location}: {source}")]
    Corrupt {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid key `{0}`")]
    InvalidKey(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed persistence for every entity the service keeps.
///
/// `get_*` returns `Ok(None)` when nothing is stored under the key. `put_*`
/// replaces the whole record; two puts are never atomic together.
pub trait Store: Send + Sync {
    fn get_user(&self, user_id: &str) -> StoreResult<Option<User>>;
    fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    fn put_user(&self, user: &User) -> StoreResult<()>;
    fn delete_user(&self, user_id: &str) -> StoreResult<bool>;

    fn get_class(&self, class_id: &str) -> StoreResult<Option<Class>>;
    fn put_class(&self, class: &Class) -> StoreResult<()>;
    fn delete_class(&self, class_id: &str) -> StoreResult<bool>;
    fn list_classes(&self, teacher_id: &str) -> StoreResult<Vec<Class>>;

    fn get_student(&self, student_id: &str) -> StoreResult<Option<Student>>;
    fn put_student(&self, student: &Student) -> StoreResult<()>;

    /// All enrollments of a class in insertion order.
    fn list_enrollments(&self, class_id: &str) -> StoreResult<Vec<Enrollment>>;
    /// Inserts or replaces the enrollment for `(class_id, student_id)`.
    fn put_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()>;

    fn save_contact_message(&self, message: &ContactMessage) -> StoreResult<()>;
    /// Newest first, optionally only those sent from `email`.
    fn list_contact_messages(&self, email: Option<&str>) -> StoreResult<Vec<ContactMessage>>;

    fn get_qr_session(&self, class_id: &str, date: &str) -> StoreResult<Option<QrSession>>;
    /// Upserts under the session's own `(class_id, date)`.
    fn put_qr_session(&self, session: &QrSession) -> StoreResult<()>;

    fn get_active_enrollments(&self, class_id: &str) -> StoreResult<Vec<Enrollment>> {
        Ok(self
            .list_enrollments(class_id)?
            .into_iter()
            .filter(Enrollment::is_active)
            .collect())
    }
}

/// Rejects keys that would escape their directory or collide with the
/// file naming scheme.
pub(crate) fn check_key(key: &str) -> StoreResult<&str> {
    let bad = key.trim().is_empty()
        || key.contains('/')
        || key.contains('\\')
        || key.contains('\0')
        || key.contains("..");
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(key)
}

pub fn open_store(config: &Config, workspace: &Path) -> anyhow::Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match config.backend {
        BackendKind::File => Arc::new(FileStore::open(workspace.join("data"))?),
        BackendKind::Sqlite => Arc::new(SqliteStore::open(&workspace.join("lernova.sqlite3"))?),
    };
    log::info!(
        "event=store_open module=store backend={} workspace={}",
        config.backend.as_str(),
        workspace.display()
    );
    Ok(store)
}
