use crate::ipc::helpers::{
    from_json, get_object, get_optional_str, get_required_str, merge_patch, to_json, with_store,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::User;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

fn users_create(store: &dyn Store, now: DateTime<Utc>, params: &Value) -> Result<Value, HandlerErr> {
    let email = get_required_str(params, "email")?;
    let user_id = get_optional_str(params, "userId").unwrap_or_else(|| Uuid::new_v4().to_string());
    if store.get_user_by_email(&email)?.is_some() {
        return Err(HandlerErr::new("already_exists", "email already registered"));
    }
    if store.get_user(&user_id)?.is_some() {
        return Err(HandlerErr::new("already_exists", "user already exists"));
    }

    let mut doc = get_object(params, "profile")?;
    doc.insert("user_id".into(), json!(user_id));
    doc.insert("email".into(), json!(email));
    if let Some(role) = get_optional_str(params, "role") {
        doc.insert("role".into(), json!(role));
    }
    let mut user: User = from_json(Value::Object(doc))?;
    user.created_at = Some(now);
    store.put_user(&user)?;
    Ok(json!({ "userId": user.user_id, "user": to_json(&user)? }))
}

fn users_get(store: &dyn Store, params: &Value) -> Result<Value, HandlerErr> {
    let user_id = get_required_str(params, "userId")?;
    let user = store
        .get_user(&user_id)?
        .ok_or_else(|| HandlerErr::not_found("user not found"))?;
    Ok(json!({ "user": to_json(&user)? }))
}

fn users_get_by_email(store: &dyn Store, params: &Value) -> Result<Value, HandlerErr> {
    let email = get_required_str(params, "email")?;
    let user = store.get_user_by_email(&email)?;
    Ok(json!({ "user": user.as_ref().map(to_json).transpose()? }))
}

fn users_update(store: &dyn Store, now: DateTime<Utc>, params: &Value) -> Result<Value, HandlerErr> {
    let user_id = get_required_str(params, "userId")?;
    let patch = get_object(params, "patch")?;
    let existing = store
        .get_user(&user_id)?
        .ok_or_else(|| HandlerErr::not_found("user not found"))?;
    let mut user = merge_patch(&existing, &patch, &["user_id", "created_at"])?;
    if user.email != existing.email {
        if let Some(other) = store.get_user_by_email(&user.email)? {
            if other.user_id != user_id {
                return Err(HandlerErr::new("already_exists", "email already registered"));
            }
        }
    }
    user.updated_at = Some(now);
    store.put_user(&user)?;
    Ok(json!({ "user": to_json(&user)? }))
}

fn users_delete(store: &dyn Store, params: &Value) -> Result<Value, HandlerErr> {
    let user_id = get_required_str(params, "userId")?;
    let deleted = store.delete_user(&user_id)?;
    Ok(json!({ "deleted": deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let now = state.now();
    let p = &req.params;
    match req.method.as_str() {
        "users.create" => Some(with_store(state, req, |s| users_create(s.as_ref(), now, p))),
        "users.get" => Some(with_store(state, req, |s| users_get(s.as_ref(), p))),
        "users.getByEmail" => Some(with_store(state, req, |s| users_get_by_email(s.as_ref(), p))),
        "users.update" => Some(with_store(state, req, |s| users_update(s.as_ref(), now, p))),
        "users.delete" => Some(with_store(state, req, |s| users_delete(s.as_ref(), p))),
        _ => None,
    }
}
