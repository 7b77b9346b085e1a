use crate::auth;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::settings_of;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_unlock(state: &mut AppState, req: &Request) -> serde_json::Value {
    let settings = match settings_of(&state.settings, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(password) = req.params.get("password").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing password", None);
    };

    if auth::verify_password(settings, password) {
        state.teacher_unlocked = true;
        tracing::info!("teacher view unlocked");
        ok(&req.id, json!({ "unlocked": true }))
    } else {
        tracing::warn!("teacher unlock rejected");
        err(&req.id, "bad_password", "incorrect password", None)
    }
}

fn handle_lock(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.teacher_unlocked = false;
    ok(&req.id, json!({ "unlocked": false }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teacher.unlock" => Some(handle_unlock(state, req)),
        "teacher.lock" => Some(handle_lock(state, req)),
        _ => None,
    }
}
