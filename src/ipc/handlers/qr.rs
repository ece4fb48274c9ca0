use crate::attendance::AttendanceSessionManager;
use crate::ipc::error::err;
use crate::ipc::helpers::{get_date, get_required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{iso_time, QrSession};
use serde_json::{json, Value};

fn session_json(s: &QrSession) -> Value {
    json!({
        "classId": s.class_id,
        "teacherId": s.teacher_id,
        "date": s.date,
        "sessionNumber": s.session_number,
        "status": if s.is_active() { "active" } else { "stopped" },
        "currentCode": s.current_code,
        "codeGeneratedAt": iso_time::format(&s.code_generated_at),
        "rotationInterval": s.rotation_interval,
        "startedAt": iso_time::format(&s.started_at),
        "scannedCount": s.scanned_students.len(),
        "scannedStudents": s.scanned_students,
    })
}

/// `qrCode` may arrive as the bare code, a JSON string wrapping
/// `{"code": ..}`, or that object itself.
fn get_qr_code(params: &Value) -> Result<String, HandlerErr> {
    match params.get("qrCode") {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(obj @ Value::Object(_)) => Ok(obj.to_string()),
        _ => Err(HandlerErr::bad_params("missing qrCode")),
    }
}

fn qr_start(
    mgr: &AttendanceSessionManager,
    default_interval: u32,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let teacher_id = get_required_str(params, "teacherId")?;
    let date = get_date(params, "date")?;
    let interval = match params.get("rotationInterval") {
        None | Some(Value::Null) => default_interval,
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| HandlerErr::bad_params("rotationInterval must be a whole number of seconds"))?,
    };
    let session = mgr.start(&class_id, &teacher_id, &date, interval)?;
    Ok(json!({ "session": session_json(&session) }))
}

fn qr_active(mgr: &AttendanceSessionManager, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let date = get_date(params, "date")?;
    let session = mgr.get_active(&class_id, &date)?;
    Ok(json!({ "session": session.as_ref().map(session_json) }))
}

fn qr_scan(mgr: &AttendanceSessionManager, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let class_id = get_required_str(params, "classId")?;
    let date = get_date(params, "date")?;
    let code = get_qr_code(params)?;
    let receipt = mgr.scan(&student_id, &class_id, &code, &date)?;
    Ok(json!({
        "sessionNumber": receipt.session_number,
        "date": receipt.date,
        "studentRecordId": receipt.student_record_id,
        "alreadyScanned": receipt.already_scanned,
    }))
}

fn qr_stop(mgr: &AttendanceSessionManager, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let teacher_id = get_required_str(params, "teacherId")?;
    let date = get_date(params, "date")?;
    let summary = mgr.stop(&class_id, &teacher_id, &date)?;
    Ok(json!({
        "sessionNumber": summary.session_number,
        "date": summary.date,
        "scannedCount": summary.scanned_count,
        "absentCount": summary.absent_count,
    }))
}

fn count_sessions(mgr: &AttendanceSessionManager, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let date = get_date(params, "date")?;
    let count = mgr.count_sessions(&class_id, &date)?;
    Ok(json!({ "count": count, "nextSessionNumber": count.saturating_add(1) }))
}

fn with_attendance(
    state: &AppState,
    req: &Request,
    f: impl FnOnce(&AttendanceSessionManager) -> Result<Value, HandlerErr>,
) -> Value {
    let Some(mgr) = state.attendance.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(req, f(mgr))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let p = &req.params;
    let default_interval = state.config.default_rotation_interval;
    match req.method.as_str() {
        "qr.start" => Some(with_attendance(state, req, |m| qr_start(m, default_interval, p))),
        "qr.active" => Some(with_attendance(state, req, |m| qr_active(m, p))),
        "qr.scan" => Some(with_attendance(state, req, |m| qr_scan(m, p))),
        "qr.stop" => Some(with_attendance(state, req, |m| qr_stop(m, p))),
        "attendance.countSessions" => Some(with_attendance(state, req, |m| count_sessions(m, p))),
        _ => None,
    }
}
