use crate::attendance::AttendanceSessionManager;
use crate::codegen::RandomCodeGenerator;
use crate::config::{BackendKind, Config};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "backend": state.store.as_ref().map(|_| state.config.backend.as_str()),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };
    if let Err(e) = std::fs::create_dir_all(&path) {
        return err(&req.id, "workspace_unavailable", e.to_string(), None);
    }

    let mut config = match Config::load(&path) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "config_invalid", format!("{e:#}"), None),
    };
    if let Some(raw) = req.params.get("backend").and_then(|v| v.as_str()) {
        match raw.parse::<BackendKind>() {
            Ok(kind) => config.backend = kind,
            Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
        }
    }

    match store::open_store(&config, &path) {
        Ok(store) => {
            let codes = Arc::new(RandomCodeGenerator::from_entropy(config.code_length));
            state.attendance = Some(AttendanceSessionManager::new(
                Arc::clone(&store),
                Arc::clone(&state.clock),
                codes,
            ));
            state.store = Some(store);
            state.workspace = Some(path.clone());
            state.config = config;
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "backend": state.config.backend.as_str(),
                }),
            )
        }
        Err(e) => {
            log::error!("event=store_open module=store status=failed error={e:#}");
            err(&req.id, "store_open_failed", format!("{e:#}"), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
