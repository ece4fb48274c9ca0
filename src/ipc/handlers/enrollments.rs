use crate::ipc::helpers::{get_object, get_required_str, to_json, with_store, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{Enrollment, EnrollmentStatus};
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

const RECORD_KEYS: [&str; 6] = [
    "class_id",
    "student_id",
    "student_record_id",
    "status",
    "created_at",
    "updated_at",
];

/// Free-form `fields`, minus anything that would shadow a record key.
fn extra_fields(params: &Value) -> Result<Map<String, Value>, HandlerErr> {
    let mut fields = get_object(params, "fields")?;
    for key in RECORD_KEYS {
        fields.remove(key);
    }
    Ok(fields)
}

fn parse_status(params: &Value) -> Result<EnrollmentStatus, HandlerErr> {
    match params.get("status") {
        None | Some(Value::Null) => Ok(EnrollmentStatus::Active),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|_| HandlerErr::bad_params("status must be a string")),
    }
}

fn enrollments_create(
    store: &dyn Store,
    now: DateTime<Utc>,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let student_id = get_required_str(params, "studentId")?;
    let student_record_id = get_required_str(params, "studentRecordId")?;
    let status = parse_status(params)?;

    let class = store
        .get_class(&class_id)?
        .ok_or_else(|| HandlerErr::not_found("class not found"))?;
    if class.student(&student_record_id).is_none() {
        return Err(HandlerErr::not_found("student record not found"));
    }
    if store
        .list_enrollments(&class_id)?
        .iter()
        .any(|e| e.student_id == student_id)
    {
        return Err(HandlerErr::new("already_exists", "student already enrolled"));
    }

    let enrollment = Enrollment {
        class_id,
        student_id,
        student_record_id,
        status,
        created_at: Some(now),
        updated_at: None,
        extra: extra_fields(params)?,
    };
    store.put_enrollment(&enrollment)?;
    Ok(json!({ "enrollment": to_json(&enrollment)? }))
}

fn enrollments_list(store: &dyn Store, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let active_only = params
        .get("activeOnly")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let rows = if active_only {
        store.get_active_enrollments(&class_id)?
    } else {
        store.list_enrollments(&class_id)?
    };
    let enrollments = rows.iter().map(to_json).collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "enrollments": enrollments }))
}

fn enrollments_update(
    store: &dyn Store,
    now: DateTime<Utc>,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let student_id = get_required_str(params, "studentId")?;
    let mut enrollment = store
        .list_enrollments(&class_id)?
        .into_iter()
        .find(|e| e.student_id == student_id)
        .ok_or_else(|| HandlerErr::not_found("enrollment not found"))?;
    if params.get("status").is_some() {
        enrollment.status = parse_status(params)?;
    }
    for (k, v) in extra_fields(params)? {
        enrollment.extra.insert(k, v);
    }
    enrollment.updated_at = Some(now);
    store.put_enrollment(&enrollment)?;
    Ok(json!({ "enrollment": to_json(&enrollment)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let now = state.now();
    let p = &req.params;
    match req.method.as_str() {
        "enrollments.create" => Some(with_store(state, req, |s| {
            enrollments_create(s.as_ref(), now, p)
        })),
        "enrollments.list" => Some(with_store(state, req, |s| enrollments_list(s.as_ref(), p))),
        "enrollments.update" => Some(with_store(state, req, |s| {
            enrollments_update(s.as_ref(), now, p)
        })),
        _ => None,
    }
}
