use crate::ipc::error::ok;
use crate::ipc::helpers::{calc_err, find_student, load_room, required_str, settings_of, view_params};
use crate::ipc::types::{AppState, Request};
use crate::report;
use serde_json::json;

/// Single-student lookup. Open to everyone; scored over the student cycle
/// unless the request names its own periods.
fn handle_student_lookup(state: &mut AppState, req: &Request) -> serde_json::Value {
    let settings = match settings_of(&state.settings, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let room_id = match required_str(req, "roomId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = required_str(req, "studentId") {
        return e;
    }
    let params = match view_params(settings, req, &settings.student_cycle) {
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

    match report::student_view(room, student, &params) {
        Ok(view) => ok(&req.id, json!(view)),
        Err(e) => calc_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "student.lookup" => Some(handle_student_lookup(state, req)),
        _ => None,
    }
}
