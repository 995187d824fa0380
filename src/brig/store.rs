//! Brig store
//!
//! In-memory registry of brig entries keyed by (guild, member), mirrored to a
//! JSON file after every change. The file is keyed by guild id, each guild
//! holding a `brigMembers` map of member id to sentence window.

use crate::brig::{BrigEntry, BrigResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use poise::serenity_prelude::{GuildId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// On-disk layout: guild id -> guild record
type BrigFile = BTreeMap<u64, GuildRecord>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct GuildRecord {
    #[serde(rename = "brigMembers", default)]
    brig_members: BTreeMap<u64, StoredWindow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredWindow {
    #[serde(with = "chrono::serde::ts_seconds_option", default)]
    start: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_seconds_option", default)]
    end: Option<DateTime<Utc>>,
}

/// Store for brig entries
#[derive(Clone)]
pub struct BrigStore {
    records: Arc<DashMap<(GuildId, UserId), BrigEntry>>,
    /// Backing file, `None` keeps the store in memory only
    path: Option<Arc<PathBuf>>,
    /// Serializes snapshot + write so saves land in mutation order
    write_lock: Arc<Mutex<()>>,
}

impl Default for BrigStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl BrigStore {
    /// Create a store that is never written to disk
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            path: None,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Open the store backed by `path`, loading existing entries
    ///
    /// A missing file yields an empty store.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> BrigResult<Self> {
        let path = path.into();
        let store = Self {
            path: Some(Arc::new(path.clone())),
            ..Self::in_memory()
        };

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let file: BrigFile = serde_json::from_str(&content)?;
                store.import(file);
                info!(
                    path = %path.display(),
                    entries = store.len(),
                    "Loaded brig file"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No brig file yet, starting empty");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(store)
    }

    /// Insert or replace the entry for its (guild, member)
    pub fn upsert(&self, entry: BrigEntry) -> Option<BrigEntry> {
        self.records
            .insert((entry.guild_id, entry.member_id), entry)
    }

    /// Get the entry for a member
    #[must_use]
    pub fn get(&self, guild_id: GuildId, member_id: UserId) -> Option<BrigEntry> {
        self.records
            .get(&(guild_id, member_id))
            .map(|entry| entry.value().clone())
    }

    /// Remove the entry for a member
    pub fn remove(&self, guild_id: GuildId, member_id: UserId) -> Option<BrigEntry> {
        self.records
            .remove(&(guild_id, member_id))
            .map(|(_, entry)| entry)
    }

    /// All entries of a guild, ordered by start time then member id
    #[must_use]
    pub fn for_guild(&self, guild_id: GuildId) -> Vec<BrigEntry> {
        let mut entries: Vec<BrigEntry> = self
            .records
            .iter()
            .filter(|entry| entry.key().0 == guild_id)
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by_key(|entry| (entry.start, entry.member_id));
        entries
    }

    /// Keys of all entries whose sentence is over at `now`
    #[must_use]
    pub fn expired_at(&self, now: DateTime<Utc>) -> Vec<(GuildId, UserId)> {
        self.records
            .iter()
            .filter(|entry| entry.value().is_expired_at(now))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Number of entries across all guilds
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no member is brigged anywhere
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write the current entries to the backing file
    ///
    /// # Errors
    /// Returns an error if the file cannot be serialized or written.
    pub async fn persist(&self) -> BrigResult<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        let json = serde_json::to_string_pretty(&self.export())?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Write beside the target then rename so readers never see a torn file
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, json).await?;
        tokio::fs::rename(&staging, path).await?;

        Ok(())
    }

    fn export(&self) -> BrigFile {
        let mut file = BrigFile::new();
        for entry in self.records.iter() {
            let entry = entry.value();
            file.entry(entry.guild_id.get())
                .or_default()
                .brig_members
                .insert(
                    entry.member_id.get(),
                    StoredWindow {
                        start: entry.start,
                        end: entry.end,
                    },
                );
        }
        file
    }

    fn import(&self, file: BrigFile) {
        for (guild_id, record) in file {
            for (member_id, window) in record.brig_members {
                if guild_id == 0 || member_id == 0 {
                    warn!(guild_id, member_id, "Skipping brig entry with a zero id");
                    continue;
                }
                self.upsert(BrigEntry {
                    guild_id: GuildId::new(guild_id),
                    member_id: UserId::new(member_id),
                    start: window.start,
                    end: window.end,
                });
            }
        }
    }
}
