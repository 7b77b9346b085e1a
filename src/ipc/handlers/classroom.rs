use crate::ipc::error::ok;
use crate::ipc::helpers::{
    calc_err, default_teacher_cycle, load_room, require_teacher, required_str, settings_of,
    view_params,
};
use crate::ipc::types::{AppState, Request};
use crate::report::{self, ClassroomSummary};
use serde_json::json;

fn summarize(state: &mut AppState, req: &Request) -> Result<ClassroomSummary, serde_json::Value> {
    require_teacher(state, req)?;
    let settings = settings_of(&state.settings, req)?;
    let room_id = required_str(req, "roomId")?;
    let params = view_params(settings, req, default_teacher_cycle(settings))?;
    let room = load_room(settings, &mut state.cache, req, &room_id)?;
    report::classroom_summary(room, &params).map_err(|e| calc_err(req, e))
}

fn handle_class_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    match summarize(state, req) {
        Ok(summary) => ok(&req.id, json!(summary)),
        Err(e) => e,
    }
}

fn handle_class_pass_chart(state: &mut AppState, req: &Request) -> serde_json::Value {
    match summarize(state, req) {
        Ok(summary) => ok(&req.id, json!(report::pass_chart(&summary))),
        Err(e) => e,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "class.summary" => Some(handle_class_summary(state, req)),
        "class.passChart" => Some(handle_class_pass_chart(state, req)),
        _ => None,
    }
}
