use crate::calc::{CalcOptions, FallbackPolicy, GradingPeriod, PeriodSet, RoundingMode};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_SETTINGS_PATH: &str = "GRADEBOARD_SETTINGS";

/// Header names used to pull identity fields out of a score sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub email: String,
    pub name: String,
    pub room: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            email: "Email".to_string(),
            name: "ชื่อ นามสกุล".to_string(),
            room: "ห้อง".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cycle {
    pub id: String,
    pub label: String,
    pub periods: Vec<GradingPeriod>,
}

impl Cycle {
    pub fn period_set(&self) -> PeriodSet {
        self.periods.iter().copied().collect()
    }
}

pub fn default_cycles() -> Vec<Cycle> {
    use GradingPeriod::*;
    vec![
        Cycle {
            id: "round1".to_string(),
            label: "Round 1 (Pre+Mid)".to_string(),
            periods: vec![Pre, Mid],
        },
        Cycle {
            id: "round2".to_string(),
            label: "Round 2 (Pre+Mid+Post)".to_string(),
            periods: vec![Pre, Mid, Post],
        },
        Cycle {
            id: "final".to_string(),
            label: "Final (Pre+Final)".to_string(),
            periods: vec![Pre, Final],
        },
    ]
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    config_url: String,
    #[serde(default)]
    teacher_password_sha256: Option<String>,
    #[serde(default)]
    teacher_password: Option<String>,
    #[serde(default = "default_ttl")]
    cache_ttl_secs: u64,
    #[serde(default = "default_pass_ratio")]
    pass_ratio: f64,
    #[serde(default)]
    rounding: RoundingMode,
    #[serde(default)]
    student_cycle: Option<String>,
    #[serde(default)]
    term_label: Option<String>,
    #[serde(default)]
    columns: ColumnNames,
    #[serde(default)]
    fallback: FallbackPolicy,
    #[serde(default)]
    rooms: BTreeMap<String, String>,
    #[serde(default)]
    cycles: Option<Vec<Cycle>>,
}

fn default_ttl() -> u64 {
    300
}

fn default_pass_ratio() -> f64 {
    crate::calc::DEFAULT_PASS_RATIO
}

/// Everything the sidecar needs to find and score a room. Owned by the
/// process state; nothing here is global.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source_path: Option<PathBuf>,
    pub config_url: String,
    pub password_sha256: Option<String>,
    pub cache_ttl_secs: u64,
    pub pass_ratio: f64,
    pub rounding: RoundingMode,
    pub student_cycle: String,
    pub term_label: Option<String>,
    pub columns: ColumnNames,
    pub fallback: FallbackPolicy,
    pub rooms: BTreeMap<String, String>,
    pub cycles: Vec<Cycle>,
}

impl Settings {
    pub fn calc_options(&self) -> CalcOptions {
        CalcOptions {
            fallback: self.fallback.clone(),
            rounding: self.rounding,
        }
    }

    pub fn cycle(&self, id: &str) -> Option<&Cycle> {
        self.cycles.iter().find(|c| c.id.eq_ignore_ascii_case(id.trim()))
    }

    pub fn room_location(&self, room: &str) -> Option<&str> {
        self.rooms.get(room).map(|s| s.as_str())
    }
}

pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading settings from {}", path.display()))?;
    let mut settings =
        parse_settings(&content).with_context(|| format!("parsing {}", path.display()))?;
    settings.source_path = Some(path.to_path_buf());

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    settings.config_url = resolve_location(base, &settings.config_url);
    for loc in settings.rooms.values_mut() {
        *loc = resolve_location(base, loc);
    }
    Ok(settings)
}

/// `$GRADEBOARD_SETTINGS` if set; `Ok(None)` when it is not.
pub fn load_settings_from_env() -> Result<Option<Settings>> {
    match std::env::var(ENV_SETTINGS_PATH) {
        Ok(p) if !p.trim().is_empty() => {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!(
                    "{} points to non-existent path {}",
                    ENV_SETTINGS_PATH,
                    pb.display()
                ));
            }
            load_settings_from(&pb).map(Some)
        }
        _ => Ok(None),
    }
}

pub fn parse_settings(s: &str) -> Result<Settings> {
    let raw: RawSettings = toml::from_str(s)?;

    if raw.config_url.trim().is_empty() {
        bail!("config_url must not be empty");
    }
    if !(0.0..=1.0).contains(&raw.pass_ratio) {
        bail!("pass_ratio must be within [0, 1], got {}", raw.pass_ratio);
    }

    let cycles = raw.cycles.unwrap_or_else(default_cycles);
    if cycles.is_empty() {
        bail!("at least one cycle is required");
    }
    for c in &cycles {
        if c.periods.is_empty() {
            bail!("cycle {} selects no periods", c.id);
        }
    }

    let student_cycle = raw.student_cycle.unwrap_or_else(|| {
        cycles
            .iter()
            .find(|c| c.id == "round2")
            .unwrap_or(&cycles[0])
            .id
            .clone()
    });
    if !cycles.iter().any(|c| c.id.eq_ignore_ascii_case(&student_cycle)) {
        bail!("student_cycle {} is not a configured cycle", student_cycle);
    }

    let password_sha256 = match (raw.teacher_password_sha256, raw.teacher_password) {
        (Some(h), _) if !h.trim().is_empty() => Some(h.trim().to_ascii_lowercase()),
        (_, Some(p)) if !p.is_empty() => Some(sha256_hex(&p)),
        _ => None,
    };

    Ok(Settings {
        source_path: None,
        config_url: raw.config_url.trim().to_string(),
        password_sha256,
        cache_ttl_secs: raw.cache_ttl_secs,
        pass_ratio: raw.pass_ratio,
        rounding: raw.rounding,
        student_cycle,
        term_label: raw.term_label,
        columns: raw.columns,
        fallback: raw.fallback,
        rooms: raw
            .rooms
            .into_iter()
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect(),
        cycles,
    })
}

/// Relative local paths are taken relative to the settings file.
fn resolve_location(base: &Path, loc: &str) -> String {
    if loc.starts_with("http://") || loc.starts_with("https://") || loc.starts_with("file://") {
        return loc.to_string();
    }
    let p = Path::new(loc);
    if p.is_absolute() {
        loc.to_string()
    } else {
        base.join(p).to_string_lossy().to_string()
    }
}
