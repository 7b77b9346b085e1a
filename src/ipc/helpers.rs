use crate::cache::SheetCache;
use crate::calc::{CalcError, GradingPeriod, PeriodSet, RoundingMode};
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::report::ViewParams;
use crate::settings::Settings;
use crate::sheets::{self, LoadError, RoomData, StudentRow};
use serde_json::{json, Value};

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn optional_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

pub fn settings_of<'a>(settings: &'a Option<Settings>, req: &Request) -> Result<&'a Settings, Value> {
    settings
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_settings", "load settings first", None))
}

pub fn require_teacher(state: &AppState, req: &Request) -> Result<(), Value> {
    if state.teacher_unlocked {
        Ok(())
    } else {
        Err(err(&req.id, "locked", "teacher view is locked", None))
    }
}

pub fn calc_err(req: &Request, e: CalcError) -> Value {
    err(&req.id, &e.code, e.message, e.details)
}

pub fn load_err(req: &Request, e: LoadError) -> Value {
    tracing::warn!(code = e.code(), message = %e.message(), "room load failed");
    let details = match &e {
        LoadError::RoomNotFound(room) | LoadError::ConfigNotFound(room) => {
            Some(json!({ "roomId": room }))
        }
        LoadError::Source(_) | LoadError::BadCsv(_) => None,
    };
    err(&req.id, e.code(), e.message(), details)
}

pub fn load_room<'a>(
    settings: &Settings,
    cache: &'a mut SheetCache,
    req: &Request,
    room_id: &str,
) -> Result<&'a RoomData, Value> {
    cache
        .get_or_load(room_id, || sheets::load_room(settings, room_id))
        .map_err(|e| load_err(req, e))
}

fn parse_periods(req: &Request, raw: &Value) -> Result<PeriodSet, Value> {
    let Some(items) = raw.as_array() else {
        return Err(err(
            &req.id,
            "bad_params",
            "periods must be an array of period names",
            None,
        ));
    };
    let mut out = PeriodSet::new();
    for item in items {
        let Some(name) = item.as_str() else {
            return Err(err(
                &req.id,
                "bad_params",
                "periods must be an array of period names",
                None,
            ));
        };
        let period: GradingPeriod = name.parse().map_err(|e| calc_err(req, e))?;
        out.insert(period);
    }
    Ok(out)
}

/// Resolves `periods` / `cycle` / `passRatio` / `rounding` request params
/// against the settings. Explicit `periods` win over `cycle`.
pub fn view_params(settings: &Settings, req: &Request, default_cycle: &str) -> Result<ViewParams, Value> {
    let (periods, cycle_label) = match req.params.get("periods").filter(|v| !v.is_null()) {
        Some(raw) => {
            let periods = parse_periods(req, raw)?;
            let label = periods
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join("+");
            (periods, Some(label))
        }
        None => {
            let cycle_id = optional_str(req, "cycle").unwrap_or(default_cycle);
            let Some(cycle) = settings.cycle(cycle_id) else {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!("unknown cycle: {}", cycle_id),
                    Some(json!({
                        "cycle": cycle_id,
                        "known": settings.cycles.iter().map(|c| c.id.clone()).collect::<Vec<_>>(),
                    })),
                ));
            };
            (cycle.period_set(), Some(cycle.label.clone()))
        }
    };

    let pass_ratio = match req.params.get("passRatio").filter(|v| !v.is_null()) {
        None => settings.pass_ratio,
        Some(v) => match v.as_f64() {
            Some(r) if (0.0..=1.0).contains(&r) => r,
            _ => {
                return Err(err(
                    &req.id,
                    "bad_params",
                    "passRatio must be a number within [0, 1]",
                    None,
                ))
            }
        },
    };

    let mut options = settings.calc_options();
    if let Some(raw) = optional_str(req, "rounding") {
        options.rounding = raw
            .parse::<RoundingMode>()
            .map_err(|e| calc_err(req, e))?;
    }

    Ok(ViewParams {
        periods,
        options,
        pass_ratio,
        cycle_label,
    })
}

pub fn default_teacher_cycle(settings: &Settings) -> &str {
    settings
        .cycles
        .first()
        .map(|c| c.id.as_str())
        .unwrap_or_default()
}

/// Locates a student by `studentId`, or by `studentName` when no id is given.
pub fn find_student<'a>(room: &'a RoomData, req: &Request) -> Result<&'a StudentRow, Value> {
    let found = if let Some(id) = optional_str(req, "studentId") {
        room.students.iter().find(|s| s.student_id == id)
    } else if let Some(name) = optional_str(req, "studentName") {
        room.students.iter().find(|s| s.display_name == name)
    } else {
        return Err(err(
            &req.id,
            "bad_params",
            "missing studentId or studentName",
            None,
        ));
    };
    found.ok_or_else(|| {
        err(
            &req.id,
            "student_not_found",
            format!("no such student in room {}", room.room),
            Some(json!({ "roomId": room.room })),
        )
    })
}
