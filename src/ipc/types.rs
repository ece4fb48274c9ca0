use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::attendance::AttendanceSessionManager;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::store::Store;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub store: Option<Arc<dyn Store>>,
    pub attendance: Option<AttendanceSessionManager>,
}

impl AppState {
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            workspace: None,
            config: Config::default(),
            clock: Arc::new(SystemClock),
            store: None,
            attendance: None,
        }
    }
}
