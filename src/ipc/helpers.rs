use crate::attendance::AttendanceError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::{Store, StoreError};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        log::error!("event=store_failure module=ipc error={}", e);
        Self::new("store_failed", e.to_string())
    }
}

impl From<AttendanceError> for HandlerErr {
    fn from(e: AttendanceError) -> Self {
        if let AttendanceError::Store(inner) = e {
            return inner.into();
        }
        Self::new(e.code(), e.to_string())
    }
}

/// Runs `f` against the open store, or answers `no_workspace`.
pub fn with_store(
    state: &AppState,
    req: &Request,
    f: impl FnOnce(&Arc<dyn Store>) -> Result<Value, HandlerErr>,
) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(req, f(store))
}

pub fn respond(req: &Request, result: Result<Value, HandlerErr>) -> Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// A calendar date in `YYYY-MM-DD` form.
pub fn get_date(params: &Value, key: &str) -> Result<String, HandlerErr> {
    let raw = get_required_str(params, key)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))?;
    Ok(raw)
}

pub fn get_object(params: &Value, key: &str) -> Result<Map<String, Value>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(obj)) => Ok(obj.clone()),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be an object", key))),
    }
}

pub fn to_json<T: Serialize>(value: &T) -> Result<Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr::new("encode_failed", e.to_string()))
}

/// Builds a record from loose fields, reporting shape problems as
/// `bad_params`.
pub fn from_json<T: DeserializeOwned>(value: Value) -> Result<T, HandlerErr> {
    serde_json::from_value(value).map_err(|e| HandlerErr::bad_params(e.to_string()))
}

/// Overlays `patch` onto `record`, leaving the `locked` keys alone.
pub fn merge_patch<T: Serialize + DeserializeOwned>(
    record: &T,
    patch: &Map<String, Value>,
    locked: &[&str],
) -> Result<T, HandlerErr> {
    let mut doc = to_json(record)?;
    let Some(fields) = doc.as_object_mut() else {
        return Err(HandlerErr::new("encode_failed", "record is not an object"));
    };
    for (k, v) in patch {
        if locked.contains(&k.as_str()) {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("{} cannot be changed", k),
                details: Some(json!({ "field": k })),
            });
        }
        fields.insert(k.clone(), v.clone());
    }
    from_json(doc)
}
