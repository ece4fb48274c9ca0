use crate::ipc::helpers::{
    from_json, get_object, get_optional_str, get_required_str, merge_patch, to_json, with_store,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Student;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

fn students_create(store: &dyn Store, now: DateTime<Utc>, params: &Value) -> Result<Value, HandlerErr> {
    let student_id =
        get_optional_str(params, "studentId").unwrap_or_else(|| Uuid::new_v4().to_string());
    if store.get_student(&student_id)?.is_some() {
        return Err(HandlerErr::new("already_exists", "student already exists"));
    }
    let mut doc = get_object(params, "profile")?;
    doc.insert("student_id".into(), json!(student_id));
    if let Some(email) = get_optional_str(params, "email") {
        doc.insert("email".into(), json!(email));
    }
    let mut student: Student = from_json(Value::Object(doc))?;
    student.created_at = Some(now);
    store.put_student(&student)?;
    Ok(json!({ "studentId": student.student_id, "student": to_json(&student)? }))
}

fn students_get(store: &dyn Store, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let student = store
        .get_student(&student_id)?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    Ok(json!({ "student": to_json(&student)? }))
}

fn students_update(store: &dyn Store, now: DateTime<Utc>, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let patch = get_object(params, "patch")?;
    let existing = store
        .get_student(&student_id)?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    let mut student = merge_patch(&existing, &patch, &["student_id", "created_at"])?;
    student.updated_at = Some(now);
    store.put_student(&student)?;
    Ok(json!({ "student": to_json(&student)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let now = state.now();
    let p = &req.params;
    match req.method.as_str() {
        "students.create" => Some(with_store(state, req, |s| students_create(s.as_ref(), now, p))),
        "students.get" => Some(with_store(state, req, |s| students_get(s.as_ref(), p))),
        "students.update" => Some(with_store(state, req, |s| students_update(s.as_ref(), now, p))),
        _ => None,
    }
}
