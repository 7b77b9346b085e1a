use crate::sheets::{LoadError, RoomData};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct CachedRoom {
    fetched_at: Instant,
    data: RoomData,
}

/// Per-room sheet cache. Entries older than `ttl` are refetched on next use;
/// a zero ttl disables caching.
pub struct SheetCache {
    ttl: Duration,
    entries: HashMap<String, CachedRoom>,
}

impl SheetCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    pub fn get_or_load<F>(&mut self, room: &str, load: F) -> Result<&RoomData, LoadError>
    where
        F: FnOnce() -> Result<RoomData, LoadError>,
    {
        self.get_or_load_at(room, Instant::now(), load)
    }

    fn get_or_load_at<F>(&mut self, room: &str, now: Instant, load: F) -> Result<&RoomData, LoadError>
    where
        F: FnOnce() -> Result<RoomData, LoadError>,
    {
        let ttl = self.ttl;
        match self.entries.entry(room.to_string()) {
            Entry::Occupied(mut e) => {
                let age = now.saturating_duration_since(e.get().fetched_at);
                if age >= ttl {
                    tracing::debug!(room, age_secs = age.as_secs(), "sheet cache expired");
                    let data = load()?;
                    e.insert(CachedRoom {
                        fetched_at: now,
                        data,
                    });
                } else {
                    tracing::debug!(room, "sheet cache hit");
                }
                Ok(&e.into_mut().data)
            }
            Entry::Vacant(v) => {
                tracing::debug!(room, "sheet cache miss");
                let data = load()?;
                Ok(&v
                    .insert(CachedRoom {
                        fetched_at: now,
                        data,
                    })
                    .data)
            }
        }
    }
}
