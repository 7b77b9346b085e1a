use crate::cache::SheetCache;
use crate::settings::Settings;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub settings: Option<Settings>,
    pub cache: SheetCache,
    pub teacher_unlocked: bool,
}

impl AppState {
    pub fn new(settings: Option<Settings>) -> Self {
        let ttl = settings.as_ref().map(|s| s.cache_ttl_secs).unwrap_or(0);
        Self {
            settings,
            cache: SheetCache::new(Duration::from_secs(ttl)),
            teacher_unlocked: false,
        }
    }

    /// Swaps in new settings. Cached sheets and the teacher session belong
    /// to the old settings and are dropped.
    pub fn replace_settings(&mut self, settings: Settings) {
        *self = AppState::new(Some(settings));
    }
}
