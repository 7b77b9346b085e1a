use crate::calc::{
    self, declared_max, parse_cell, period_of, task_label, CalcError, CalcOptions, CellValue,
    CompositeResult, PeriodBreakdown, PeriodSet, RoomConfig, Verdict,
};
use crate::sheets::{RoomData, StudentRow};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt::Write as _;

pub const PASS_COLOR: &str = "#2ecc71";
pub const FAIL_COLOR: &str = "#e74c3c";

/// 1-decimal half-up rounding used for class averages.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// Parameters shared by every view: which periods, how to score, where the
/// pass mark sits.
#[derive(Debug, Clone)]
pub struct ViewParams {
    pub periods: PeriodSet,
    pub options: CalcOptions,
    pub pass_ratio: f64,
    pub cycle_label: Option<String>,
}

pub fn score_student(
    row: &StudentRow,
    config: &RoomConfig,
    params: &ViewParams,
) -> Result<CompositeResult, CalcError> {
    calc::compute_composite(row.cells(), config, &params.periods, &params.options)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentView {
    pub student_id: String,
    pub display_name: String,
    pub room: String,
    pub subject_name: String,
    pub cycle: Option<String>,
    pub score: f64,
    pub denominator: f64,
    pub threshold: f64,
    pub pass_ratio: f64,
    pub verdict: Verdict,
    pub progress: f64,
    pub empty_selection: bool,
    pub periods: Vec<PeriodBreakdown>,
}

pub fn student_view(
    room: &RoomData,
    row: &StudentRow,
    params: &ViewParams,
) -> Result<StudentView, CalcError> {
    let result = score_student(row, &room.config, params)?;
    let progress = if result.denominator > 0.0 {
        (result.score / result.denominator).clamp(0.0, 1.0)
    } else {
        0.0
    };
    Ok(StudentView {
        student_id: row.student_id.clone(),
        display_name: row.display_name.clone(),
        room: room.room.clone(),
        subject_name: room.config.subject_name.clone(),
        cycle: params.cycle_label.clone(),
        score: result.score,
        denominator: result.denominator,
        threshold: calc::threshold(result.denominator, params.pass_ratio),
        pass_ratio: params.pass_ratio,
        verdict: calc::classify(result.score, result.denominator, params.pass_ratio),
        progress,
        empty_selection: params.periods.is_empty(),
        periods: result.periods,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRow {
    pub student_id: String,
    pub display_name: String,
    pub score: f64,
    pub denominator: f64,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomSummary {
    pub room: String,
    pub subject_name: String,
    pub cycle: Option<String>,
    pub pass_ratio: f64,
    pub total: usize,
    pub pass_count: usize,
    pub fail_count: usize,
    pub pass_percent: f64,
    pub fail_percent: f64,
    pub mean_score: f64,
    pub empty_selection: bool,
    pub rows: Vec<ClassRow>,
}

pub fn classroom_summary(
    room: &RoomData,
    params: &ViewParams,
) -> Result<ClassroomSummary, CalcError> {
    let mut rows = Vec::with_capacity(room.students.len());
    for s in &room.students {
        let r = score_student(s, &room.config, params)?;
        rows.push(ClassRow {
            student_id: s.student_id.clone(),
            display_name: s.display_name.clone(),
            score: r.score,
            denominator: r.denominator,
            verdict: calc::classify(r.score, r.denominator, params.pass_ratio),
        });
    }

    let total = rows.len();
    let pass_count = rows.iter().filter(|r| r.verdict == Verdict::Pass).count();
    let fail_count = total - pass_count;
    let pct = |n: usize| {
        if total > 0 {
            100.0 * (n as f64) / (total as f64)
        } else {
            0.0
        }
    };
    let mean_score = if total > 0 {
        round_off_1_decimal(rows.iter().map(|r| r.score).sum::<f64>() / (total as f64))
    } else {
        0.0
    };

    Ok(ClassroomSummary {
        room: room.room.clone(),
        subject_name: room.config.subject_name.clone(),
        cycle: params.cycle_label.clone(),
        pass_ratio: params.pass_ratio,
        total,
        pass_count,
        fail_count,
        pass_percent: pct(pass_count),
        fail_percent: pct(fail_count),
        mean_score,
        empty_selection: params.periods.is_empty(),
        rows,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PieSlice {
    pub label: Verdict,
    pub count: usize,
    pub percent: f64,
    pub color: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassChart {
    pub total: usize,
    pub slices: Vec<PieSlice>,
}

pub fn pass_chart(summary: &ClassroomSummary) -> PassChart {
    PassChart {
        total: summary.total,
        slices: vec![
            PieSlice {
                label: Verdict::Pass,
                count: summary.pass_count,
                percent: summary.pass_percent,
                color: PASS_COLOR,
            },
            PieSlice {
                label: Verdict::Fail,
                count: summary.fail_count,
                percent: summary.fail_percent,
                color: FAIL_COLOR,
            },
        ],
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportItem {
    pub column: String,
    pub label: String,
    pub raw: Option<f64>,
    pub raw_text: String,
    pub max: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintableReport {
    pub subject_name: String,
    pub term_label: Option<String>,
    pub cycle: Option<String>,
    pub student_id: String,
    pub display_name: String,
    pub room: String,
    pub items: Vec<ReportItem>,
    pub score: f64,
    pub denominator: f64,
    pub verdict: Verdict,
    pub pass_percent: f64,
    pub generated_at: String,
    pub text: String,
}

/// Task columns of the selected periods that declare a bracketed maximum.
pub fn report_items(row: &StudentRow, periods: &PeriodSet) -> Vec<ReportItem> {
    row.cells()
        .filter(|(header, _)| {
            period_of(header).is_some_and(|p| periods.contains(&p)) && header.contains('[')
        })
        .map(|(header, value)| ReportItem {
            column: header.to_string(),
            label: task_label(header),
            raw: match parse_cell(value) {
                CellValue::Number(v) => Some(v),
                CellValue::Blank | CellValue::Malformed => None,
            },
            raw_text: value.trim().to_string(),
            max: declared_max(header),
        })
        .collect()
}

pub fn printable_report(
    room: &RoomData,
    row: &StudentRow,
    params: &ViewParams,
    term_label: Option<&str>,
    generated_at: DateTime<Local>,
) -> Result<PrintableReport, CalcError> {
    let result = score_student(row, &room.config, params)?;
    let mut report = PrintableReport {
        subject_name: room.config.subject_name.clone(),
        term_label: term_label.map(|s| s.to_string()),
        cycle: params.cycle_label.clone(),
        student_id: row.student_id.clone(),
        display_name: row.display_name.clone(),
        room: room.room.clone(),
        items: report_items(row, &params.periods),
        score: result.score,
        denominator: result.denominator,
        verdict: calc::classify(result.score, result.denominator, params.pass_ratio),
        pass_percent: round_off_1_decimal(100.0 * params.pass_ratio),
        generated_at: generated_at.format("%Y-%m-%d %H:%M").to_string(),
        text: String::new(),
    };
    report.text = render_text(&report);
    Ok(report)
}

fn fmt_number(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        let s = format!("{:.2}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

pub fn render_text(r: &PrintableReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "STUDENT ACHIEVEMENT REPORT");
    let mut subject_line = format!("Subject: {}", r.subject_name);
    if let Some(term) = &r.term_label {
        let _ = write!(subject_line, " | Term {}", term);
    }
    if let Some(cycle) = &r.cycle {
        let _ = write!(subject_line, " | {}", cycle);
    }
    let _ = writeln!(out, "{}", subject_line);
    let _ = writeln!(
        out,
        "Name: {}  ID: {}  Room: {}",
        r.display_name, r.student_id, r.room
    );
    let _ = writeln!(out, "{}", "-".repeat(40));
    let _ = writeln!(out, "{:<24}{:>8}{:>8}", "Item", "Raw", "Max");
    for item in &r.items {
        let raw = item.raw.map(fmt_number).unwrap_or_else(|| "-".to_string());
        let _ = writeln!(out, "{:<24}{:>8}{:>8}", item.label, raw, item.max);
    }
    let _ = writeln!(out, "{}", "-".repeat(40));
    let _ = writeln!(
        out,
        "Total: {} / {}",
        fmt_number(r.score),
        fmt_number(r.denominator)
    );
    let verdict = match r.verdict {
        Verdict::Pass => "PASS",
        Verdict::Fail => "FAIL",
    };
    let _ = writeln!(
        out,
        "Result: {} (pass mark {}%)",
        verdict,
        fmt_number(r.pass_percent)
    );
    let _ = writeln!(out, "Generated automatically on {}", r.generated_at);
    out
}
