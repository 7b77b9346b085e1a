use crate::ipc::error::ok;
use crate::ipc::helpers::{
    calc_err, default_teacher_cycle, find_student, load_room, require_teacher, required_str,
    settings_of, view_params,
};
use crate::ipc::types::{AppState, Request};
use crate::report;
use serde_json::json;

fn handle_report_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_teacher(state, req) {
        return e;
    }
    let settings = match settings_of(&state.settings, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let room_id = match required_str(req, "roomId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let params = match view_params(settings, req, default_teacher_cycle(settings)) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let room = match load_room(settings, &mut state.cache, req, &room_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student = match find_student(room, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match report::printable_report(
        room,
        student,
        &params,
        settings.term_label.as_deref(),
        chrono::Local::now(),
    ) {
        Ok(r) => ok(&req.id, json!(r)),
        Err(e) => calc_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "report.student" => Some(handle_report_student(state, req)),
        _ => None,
    }
}
