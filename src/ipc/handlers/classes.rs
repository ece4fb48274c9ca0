use crate::ipc::helpers::{
    from_json, get_object, get_optional_str, get_required_str, merge_patch, to_json, with_store,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Class, EnrollmentMode, StudentRecord};
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

fn parse_enrollment_mode(params: &Value) -> Result<EnrollmentMode, HandlerErr> {
    match params.get("enrollmentMode") {
        None | Some(Value::Null) => Ok(EnrollmentMode::default()),
        Some(v) => serde_json::from_value(v.clone()).map_err(|_| {
            HandlerErr::bad_params("enrollmentMode must be manual_entry or enrollment_via_id")
        }),
    }
}

fn load_class(store: &dyn Store, params: &Value) -> Result<Class, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    store
        .get_class(&class_id)?
        .ok_or_else(|| HandlerErr::not_found("class not found"))
}

fn classes_create(store: &dyn Store, now: DateTime<Utc>, params: &Value) -> Result<Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let mode = parse_enrollment_mode(params)?;
    let class_id = get_optional_str(params, "classId").unwrap_or_else(|| Uuid::new_v4().to_string());
    if store.get_class(&class_id)?.is_some() {
        return Err(HandlerErr::new("already_exists", "class already exists"));
    }

    let mut class = Class::new(class_id, teacher_id, mode);
    let mut fields = get_object(params, "fields")?;
    for key in ["students", "created_at", "updated_at"] {
        fields.remove(key);
    }
    class = merge_patch(&class, &fields, &["class_id", "teacher_id", "enrollment_mode"])?;
    if let Some(name) = get_optional_str(params, "name") {
        class.extra.insert("name".into(), json!(name));
    }
    class.created_at = Some(now);
    store.put_class(&class)?;
    Ok(json!({ "classId": class.class_id, "class": to_json(&class)? }))
}

fn classes_get(store: &dyn Store, params: &Value) -> Result<Value, HandlerErr> {
    let class = load_class(store, params)?;
    Ok(json!({ "class": to_json(&class)? }))
}

fn classes_list(store: &dyn Store, params: &Value) -> Result<Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let classes = store
        .list_classes(&teacher_id)?
        .iter()
        .map(to_json)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "classes": classes }))
}

fn classes_update(store: &dyn Store, now: DateTime<Utc>, params: &Value) -> Result<Value, HandlerErr> {
    let existing = load_class(store, params)?;
    let patch = get_object(params, "patch")?;
    let mut class = merge_patch(&existing, &patch, &["class_id", "created_at"])?;
    class.updated_at = Some(now);
    store.put_class(&class)?;
    Ok(json!({ "class": to_json(&class)? }))
}

fn classes_delete(store: &dyn Store, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let deleted = store.delete_class(&class_id)?;
    Ok(json!({ "deleted": deleted }))
}

/// Appends an embedded student record; enrollments point at its id.
fn classes_add_student_record(
    store: &dyn Store,
    now: DateTime<Utc>,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let mut class = load_class(store, params)?;
    let record_id =
        get_optional_str(params, "recordId").unwrap_or_else(|| Uuid::new_v4().to_string());
    if class.student(&record_id).is_some() {
        return Err(HandlerErr::new("already_exists", "student record already exists"));
    }
    let mut doc = get_object(params, "fields")?;
    doc.insert("id".into(), json!(record_id));
    doc.remove("attendance");
    let record: StudentRecord = from_json(Value::Object(doc))?;
    class.students.push(record);
    class.updated_at = Some(now);
    store.put_class(&class)?;
    Ok(json!({ "recordId": record_id, "studentCount": class.students.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let now = state.now();
    let p = &req.params;
    match req.method.as_str() {
        "classes.create" => Some(with_store(state, req, |s| classes_create(s.as_ref(), now, p))),
        "classes.get" => Some(with_store(state, req, |s| classes_get(s.as_ref(), p))),
        "classes.list" => Some(with_store(state, req, |s| classes_list(s.as_ref(), p))),
        "classes.update" => Some(with_store(state, req, |s| classes_update(s.as_ref(), now, p))),
        "classes.delete" => Some(with_store(state, req, |s| classes_delete(s.as_ref(), p))),
        "classes.addStudentRecord" => Some(with_store(state, req, |s| {
            classes_add_student_record(s.as_ref(), now, p)
        })),
        _ => None,
    }
}
