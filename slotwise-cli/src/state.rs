//! On-disk state under the Slotwise home (`~/.slotwise`, or `$SLOTWISE_HOME`).
//!
//! - `store.json`     tasks, quota records and sync snapshots
//! - `calendar.json`  events of the local calendar provider
//! - `sync_state.json` last automatic sync per user

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use slotwise_sync::{Document, RemoteEvent};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub fn slotwise_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("SLOTWISE_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".slotwise"))
}

pub fn ensure_slotwise_home() -> Result<PathBuf> {
    let dir = slotwise_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn store_path(home: &Path) -> PathBuf {
    home.join("store.json")
}

pub fn calendar_path(home: &Path) -> PathBuf {
    home.join("calendar.json")
}

pub fn sync_state_path(home: &Path) -> PathBuf {
    home.join("sync_state.json")
}

pub fn load_document(home: &Path) -> Result<Document> {
    read_json_or_default(&store_path(home))
}

pub fn save_document(home: &Path, doc: &Document) -> Result<()> {
    write_json(&store_path(home), doc)
}

pub fn load_local_events(home: &Path) -> Result<Vec<RemoteEvent>> {
    read_json_or_default(&calendar_path(home))
}

pub fn save_local_events(home: &Path, events: &[RemoteEvent]) -> Result<()> {
    write_json(&calendar_path(home), &events)
}

pub fn load_sync_state(home: &Path) -> Result<BTreeMap<String, DateTime<Utc>>> {
    read_json_or_default(&sync_state_path(home))
}

pub fn save_sync_state(home: &Path, state: &BTreeMap<String, DateTime<Utc>>) -> Result<()> {
    write_json(&sync_state_path(home), state)
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))
}

/// Write through a temp file so a crash never leaves a truncated document.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}
