use crate::ipc::helpers::{
    from_json, get_object, get_optional_str, get_required_str, to_json, with_store, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::ContactMessage;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

fn contact_save(store: &dyn Store, now: DateTime<Utc>, params: &Value) -> Result<Value, HandlerErr> {
    let email = get_required_str(params, "email")?;
    let message = get_required_str(params, "message")?;
    let mut doc = get_object(params, "fields")?;
    doc.insert("email".into(), json!(email));
    doc.insert("message".into(), json!(message));
    for key in ["name", "subject"] {
        if let Some(v) = get_optional_str(params, key) {
            doc.insert(key.into(), json!(v));
        }
    }
    let mut msg: ContactMessage = from_json(Value::Object(doc))?;
    msg.created_at = Some(now);
    store.save_contact_message(&msg)?;
    Ok(json!({ "saved": true }))
}

fn contact_list(store: &dyn Store, params: &Value) -> Result<Value, HandlerErr> {
    let email = get_optional_str(params, "email");
    let messages = store
        .list_contact_messages(email.as_deref())?
        .iter()
        .map(to_json)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "messages": messages }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let now = state.now();
    let p = &req.params;
    match req.method.as_str() {
        "contact.save" => Some(with_store(state, req, |s| contact_save(s.as_ref(), now, p))),
        "contact.list" => Some(with_store(state, req, |s| contact_list(s.as_ref(), p))),
        _ => None,
    }
}
