use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Grading periods in canonical order. `Ord` follows declaration order, so a
/// `BTreeSet<GradingPeriod>` always iterates Pre, Mid, Post, Final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GradingPeriod {
    Pre,
    Mid,
    Post,
    Final,
}

pub type PeriodSet = BTreeSet<GradingPeriod>;

impl GradingPeriod {
    pub const ALL: [GradingPeriod; 4] = [
        GradingPeriod::Pre,
        GradingPeriod::Mid,
        GradingPeriod::Post,
        GradingPeriod::Final,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GradingPeriod::Pre => "Pre",
            GradingPeriod::Mid => "Mid",
            GradingPeriod::Post => "Post",
            GradingPeriod::Final => "Final",
        }
    }

    /// Column-name prefix that marks a task column as belonging to this period.
    pub fn prefix(self) -> &'static str {
        match self {
            GradingPeriod::Pre => "Pre_",
            GradingPeriod::Mid => "Mid_",
            GradingPeriod::Post => "Post_",
            GradingPeriod::Final => "Final_",
        }
    }

    /// Header of the config-sheet column holding this period's scale.
    pub fn scale_key(self) -> &'static str {
        match self {
            GradingPeriod::Pre => "Scale_Pre",
            GradingPeriod::Mid => "Scale_Mid",
            GradingPeriod::Post => "Scale_Post",
            GradingPeriod::Final => "Scale_Final",
        }
    }
}

impl fmt::Display for GradingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GradingPeriod {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        GradingPeriod::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(t))
            .ok_or_else(|| {
                CalcError::new("bad_params", format!("unknown grading period: {}", t))
                    .with_details(serde_json::json!({ "period": t }))
            })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CalcError {}

static BRACKETED_MAX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("bracketed max pattern"));

pub fn period_of(column: &str) -> Option<GradingPeriod> {
    GradingPeriod::ALL
        .into_iter()
        .find(|p| column.starts_with(p.prefix()))
}

/// Maximum raw points declared in a header, taken from the last `[n]` group.
/// Headers without one (or with a number too large to be a mark) declare 0.
pub fn declared_max(column: &str) -> u32 {
    BRACKETED_MAX
        .captures_iter(column)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(0)
}

/// Short label for report tables: `"Pre_HW.Quiz1[10]"` -> `"Quiz1"`.
pub fn task_label(column: &str) -> String {
    let mut rest = column;
    if let Some(p) = period_of(rest) {
        rest = &rest[p.prefix().len()..];
    }
    rest = rest.strip_prefix("HW.").unwrap_or(rest);
    let head = rest.split('[').next().unwrap_or(rest);
    head.trim().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellValue {
    Blank,
    Number(f64),
    Malformed,
}

pub fn parse_cell(raw: &str) -> CellValue {
    let t = raw.trim();
    if t.is_empty() {
        return CellValue::Blank;
    }
    match t.parse::<f64>() {
        Ok(v) if v.is_finite() => CellValue::Number(v),
        _ => CellValue::Malformed,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodTotals {
    pub raw_sum: f64,
    pub max_sum: u64,
    pub columns: usize,
    pub malformed: usize,
}

/// Sums every cell whose header carries `period`'s prefix. Blank and
/// non-numeric cells contribute nothing to `raw_sum`; non-numeric ones are
/// counted in `malformed`.
pub fn aggregate<'a, I>(cells: I, period: GradingPeriod) -> PeriodTotals
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut totals = PeriodTotals::default();
    for (header, value) in cells {
        if period_of(header) != Some(period) {
            continue;
        }
        totals.columns += 1;
        totals.max_sum += u64::from(declared_max(header));
        match parse_cell(value) {
            CellValue::Blank => {}
            CellValue::Number(v) => totals.raw_sum += v,
            CellValue::Malformed => {
                totals.malformed += 1;
                tracing::debug!(column = header, value, "non-numeric score treated as 0");
            }
        }
    }
    totals
}

/// What a period contributes when none of its columns declare a maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroMaxFallback {
    UseRawScore,
    UseZero,
}

pub fn normalize(raw_sum: f64, max_sum: u64, scale: f64, fallback: ZeroMaxFallback) -> f64 {
    if max_sum > 0 {
        raw_sum / (max_sum as f64) * scale
    } else {
        match fallback {
            ZeroMaxFallback::UseRawScore => raw_sum,
            ZeroMaxFallback::UseZero => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackPolicy {
    pub pre: ZeroMaxFallback,
    pub mid: ZeroMaxFallback,
    pub post: ZeroMaxFallback,
    #[serde(rename = "final")]
    pub final_: ZeroMaxFallback,
}

impl Default for FallbackPolicy {
    /// Mid passes raw scores through; the other periods drop to 0.
    fn default() -> Self {
        Self {
            pre: ZeroMaxFallback::UseZero,
            mid: ZeroMaxFallback::UseRawScore,
            post: ZeroMaxFallback::UseZero,
            final_: ZeroMaxFallback::UseZero,
        }
    }
}

impl FallbackPolicy {
    pub fn for_period(&self, period: GradingPeriod) -> ZeroMaxFallback {
        match period {
            GradingPeriod::Pre => self.pre,
            GradingPeriod::Mid => self.mid,
            GradingPeriod::Post => self.post,
            GradingPeriod::Final => self.final_,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingMode {
    #[default]
    Rounded,
    Precise,
}

impl FromStr for RoundingMode {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rounded" => Ok(RoundingMode::Rounded),
            "precise" => Ok(RoundingMode::Precise),
            other => Err(CalcError::new(
                "bad_params",
                format!("rounding must be one of: rounded, precise (got {})", other),
            )),
        }
    }
}

/// Round half up: `Int(x + 0.5)`, so 31.5 -> 32 and 31.4 -> 31.
pub fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalcOptions {
    pub fallback: FallbackPolicy,
    pub rounding: RoundingMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomConfig {
    pub subject_name: String,
    pub scales: BTreeMap<GradingPeriod, f64>,
}

impl RoomConfig {
    pub fn new(subject_name: impl Into<String>) -> Self {
        Self {
            subject_name: subject_name.into(),
            scales: BTreeMap::new(),
        }
    }

    pub fn with_scale(mut self, period: GradingPeriod, scale: f64) -> Self {
        self.scales.insert(period, scale);
        self
    }

    pub fn scale(&self, period: GradingPeriod) -> Option<f64> {
        self.scales.get(&period).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodBreakdown {
    pub period: GradingPeriod,
    pub scale: f64,
    pub raw_sum: f64,
    pub max_sum: u64,
    pub columns: usize,
    pub malformed: usize,
    pub fallback_applied: bool,
    pub weighted: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeResult {
    pub score: f64,
    pub denominator: f64,
    pub periods: Vec<PeriodBreakdown>,
}

/// Weighted composite over the selected periods.
///
/// Every selected period adds its scale to `denominator` whether or not the
/// row has columns for it. `score` is never clamped to `denominator`.
pub fn compute_composite<'a, I>(
    cells: I,
    config: &RoomConfig,
    periods: &PeriodSet,
    options: &CalcOptions,
) -> Result<CompositeResult, CalcError>
where
    I: IntoIterator<Item = (&'a str, &'a str)> + Clone,
{
    let mut result = CompositeResult::default();

    for &period in periods {
        let Some(scale) = config.scale(period) else {
            return Err(CalcError::new(
                "missing_config",
                format!("room config has no {}", period.scale_key()),
            )
            .with_details(serde_json::json!({
                "period": period,
                "scaleKey": period.scale_key(),
            })));
        };
        if scale < 0.0 {
            return Err(CalcError::new(
                "invalid_scale",
                format!("{} must be non-negative", period.scale_key()),
            )
            .with_details(serde_json::json!({ "period": period, "scale": scale })));
        }

        let totals = aggregate(cells.clone(), period);
        let fallback = options.fallback.for_period(period);
        let weighted = normalize(totals.raw_sum, totals.max_sum, scale, fallback);

        result.score += weighted;
        result.denominator += scale;
        result.periods.push(PeriodBreakdown {
            period,
            scale,
            raw_sum: totals.raw_sum,
            max_sum: totals.max_sum,
            columns: totals.columns,
            malformed: totals.malformed,
            fallback_applied: totals.max_sum == 0 && totals.columns > 0,
            weighted,
        });
    }

    if options.rounding == RoundingMode::Rounded {
        result.score = round_half_up(result.score);
    }
    Ok(result)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

pub const DEFAULT_PASS_RATIO: f64 = 0.7;

pub fn threshold(denominator: f64, pass_ratio: f64) -> f64 {
    pass_ratio * denominator
}

/// A zero denominator passes any non-negative score.
pub fn classify(score: f64, denominator: f64, pass_ratio: f64) -> Verdict {
    if score >= threshold(denominator, pass_ratio) {
        Verdict::Pass
    } else {
        Verdict::Fail
    }
}
