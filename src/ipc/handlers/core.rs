use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{required_str, settings_of};
use crate::ipc::types::{AppState, Request};
use crate::settings;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "settingsLoaded": state.settings.is_some(),
            "settingsPath": state
                .settings
                .as_ref()
                .and_then(|s| s.source_path.as_ref())
                .map(|p| p.to_string_lossy().to_string()),
            "teacherUnlocked": state.teacher_unlocked,
            "cachedRooms": state.cache.len(),
        }),
    )
}

fn handle_settings_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };

    match settings::load_settings_from(&path) {
        Ok(s) => {
            tracing::info!(path = %path.display(), rooms = s.rooms.len(), "settings loaded");
            let rooms = s.rooms.len();
            let cycles = s.cycles.len();
            state.replace_settings(s);
            ok(
                &req.id,
                json!({
                    "settingsPath": path.to_string_lossy(),
                    "rooms": rooms,
                    "cycles": cycles,
                }),
            )
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %format!("{:#}", e), "settings load failed");
            err(&req.id, "settings_load_failed", format!("{:#}", e), None)
        }
    }
}

fn handle_rooms_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let settings = match settings_of(&state.settings, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rooms: Vec<&str> = settings.rooms.keys().map(|k| k.as_str()).collect();
    ok(&req.id, json!({ "rooms": rooms }))
}

fn handle_cycles_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let settings = match settings_of(&state.settings, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({
            "cycles": settings.cycles,
            "studentCycle": settings.student_cycle,
        }),
    )
}

fn handle_cache_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    let dropped = state.cache.clear();
    tracing::info!(dropped, "sheet cache cleared");
    ok(&req.id, json!({ "dropped": dropped }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "settings.load" => Some(handle_settings_load(state, req)),
        "rooms.list" => Some(handle_rooms_list(state, req)),
        "cycles.list" => Some(handle_cycles_list(state, req)),
        "cache.clear" => Some(handle_cache_clear(state, req)),
        _ => None,
    }
}
