//! Opt-in record of the minute each reminder line last fired, so repeated
//! invocations inside one minute do not notify twice.
//!
//! Entries are keyed by line occurrence (`<raw>#<n>`, where `n` counts the
//! identical lines above it), so duplicate lines are tracked separately.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::store;

const MINUTE_FORMAT: &str = "%Y-%m-%dT%H:%M%:z";

#[derive(Debug, Default, Serialize, Deserialize)]
struct FiredEntries {
    #[serde(default)]
    last_fired: BTreeMap<String, String>,
}

pub struct FiredLog {
    path: PathBuf,
    entries: FiredEntries,
}

impl FiredLog {
    /// A missing or unparsable log starts empty.
    pub fn load(path: PathBuf) -> Self {
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring corrupt fired log {}: {e}", path.display());
                FiredEntries::default()
            }),
            Err(_) => FiredEntries::default(),
        };
        Self { path, entries }
    }

    pub fn already_fired<Tz: TimeZone>(&self, key: &str, now: &DateTime<Tz>) -> bool
    where
        Tz::Offset: std::fmt::Display,
    {
        self.entries
            .last_fired
            .get(key)
            .is_some_and(|minute| *minute == minute_key(now))
    }

    pub fn mark<Tz: TimeZone>(&mut self, key: &str, now: &DateTime<Tz>)
    where
        Tz::Offset: std::fmt::Display,
    {
        self.entries
            .last_fired
            .insert(key.to_string(), minute_key(now));
    }

    /// Move entries from their old keys to the keys the lines have in the
    /// rewritten store. Entries without a move are forgotten.
    pub fn carry_over<'a>(&mut self, moves: impl IntoIterator<Item = (&'a str, &'a str)>) {
        let mut old = std::mem::take(&mut self.entries.last_fired);
        for (from, to) in moves {
            if let Some(minute) = old.remove(from) {
                self.entries.last_fired.insert(to.to_string(), minute);
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        store::write_atomic(&self.path, json.as_bytes())
            .with_context(|| format!("Failed to save fired log: {}", self.path.display()))
    }
}

pub fn occurrence_keys<'a>(raws: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    raws.into_iter()
        .map(|raw| {
            let n = seen.entry(raw).or_default();
            let key = format!("{raw}#{n}");
            *n += 1;
            key
        })
        .collect()
}

fn minute_key<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format(MINUTE_FORMAT).to_string()
}
