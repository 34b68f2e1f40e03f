use anyhow::{Context, Result};
use clap::ValueEnum;
use log::{debug, warn};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::models::{ConversationKind, Identified, MetadataRecord, MetadataSets, User};

pub const MESSAGE_FILE_EXTENSION: &str = "json";
pub const USERS_FILE: &str = "users.json";
/// Present while a conversation's date files are being written.
pub const INCOMPLETE_MARKER: &str = ".incomplete";
/// Holds the id of the conversation a directory belongs to.
pub const OWNER_FILE: &str = ".conversation";

/// Whether a conversation has to be (re)processed, decided once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStatus {
    NotStarted,
    Complete,
    ForceRequested,
}

impl BackupStatus {
    pub fn needs_processing(&self) -> bool {
        !matches!(self, BackupStatus::Complete)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DirectoryLayout {
    /// `<root>/<label>`, falling back to `<label>__<id>` on collisions
    #[default]
    Label,
    /// `<root>/<label>__<id>` for everything except direct messages
    #[value(name = "label-id")]
    LabelWithId,
}

/// Serializes `value` as pretty JSON into `path` through a temporary sibling file.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;

    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.flush()?;
    file.persist(path)
        .with_context(|| format!("Failed to move file into {}", path.display()))?;

    Ok(())
}

/// Overlays `new` onto `existing` by id. New records win; output is sorted by id.
pub fn merge<T: Identified + Clone>(existing: Vec<T>, new: &[T]) -> Vec<T> {
    let mut by_id: BTreeMap<String, T> = existing
        .into_iter()
        .map(|item| (item.id().to_string(), item))
        .collect();

    for item in new {
        by_id.insert(item.id().to_string(), item.clone());
    }

    by_id.into_values().collect()
}

/// The on-disk state of a backup: conversation directories and metadata files.
#[derive(Debug, Clone)]
pub struct IncrementalStore {
    root: PathBuf,
}

impl IncrementalStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create output directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn conversation_dir(&self, dir_name: &str) -> PathBuf {
        self.root.join(dir_name)
    }

    /// Id recorded in the directory's owner file, if any.
    pub fn owner_of(&self, dir_name: &str) -> Option<String> {
        fs::read_to_string(self.conversation_dir(dir_name).join(OWNER_FILE))
            .ok()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
    }

    /// A directory counts as backed up when it holds at least one message
    /// file, no unfinished-write marker, and does not belong to another id.
    pub fn is_backed_up(&self, dir_name: &str, conversation_id: &str) -> bool {
        let dir = self.conversation_dir(dir_name);

        let Ok(entries) = fs::read_dir(&dir) else {
            return false;
        };

        if self.is_unfinished(dir_name) {
            debug!("{} still holds {}", dir.display(), INCOMPLETE_MARKER);
            return false;
        }

        if self
            .owner_of(dir_name)
            .is_some_and(|owner| owner != conversation_id)
        {
            return false;
        }

        entries.filter_map(|entry| entry.ok()).any(|entry| {
            let path = entry.path();
            path.is_file()
                && path.extension().and_then(|ext| ext.to_str()) == Some(MESSAGE_FILE_EXTENSION)
        })
    }

    /// A previous run started writing this directory and did not finish.
    pub fn is_unfinished(&self, dir_name: &str) -> bool {
        self.conversation_dir(dir_name).join(INCOMPLETE_MARKER).exists()
    }

    pub fn status(&self, dir_name: &str, conversation_id: &str, force: bool) -> BackupStatus {
        if force {
            BackupStatus::ForceRequested
        } else if self.is_backed_up(dir_name, conversation_id) {
            BackupStatus::Complete
        } else {
            BackupStatus::NotStarted
        }
    }

    /// Creates the conversation directory and marks it as being written.
    pub fn begin_conversation(&self, dir_name: &str, conversation_id: &str) -> Result<PathBuf> {
        let dir = self.conversation_dir(dir_name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        fs::write(dir.join(OWNER_FILE), conversation_id)
            .with_context(|| format!("Failed to record owner of {}", dir.display()))?;
        fs::write(dir.join(INCOMPLETE_MARKER), "")
            .with_context(|| format!("Failed to mark {} as in progress", dir.display()))?;
        Ok(dir)
    }

    pub fn finish_conversation(&self, dir_name: &str) -> Result<()> {
        let marker = self.conversation_dir(dir_name).join(INCOMPLETE_MARKER);
        fs::remove_file(&marker)
            .with_context(|| format!("Failed to remove {}", marker.display()))
    }

    /// Reads a JSON array; a missing or unreadable file is an empty list.
    pub fn load_records<T: DeserializeOwned>(&self, file_name: &str) -> Vec<T> {
        let path = self.root.join(file_name);
        if !path.exists() {
            return Vec::new();
        }

        let parsed = fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|content| serde_json::from_str(&content).map_err(anyhow::Error::from));

        match parsed {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to load existing {}: {:#}", file_name, e);
                Vec::new()
            }
        }
    }

    pub fn load_metadata(&self) -> MetadataSets {
        let mut sets = MetadataSets::default();
        for kind in ConversationKind::ALL {
            *sets.records_mut(kind) = self.load_records(kind.metadata_file());
        }
        sets
    }

    /// Merges `new` into every per-kind metadata file and writes them back.
    ///
    /// All four files are attempted; any failure is reported after the others
    /// have been written.
    pub fn persist_metadata(&self, new: &MetadataSets) -> Result<MetadataSets> {
        let mut merged = MetadataSets::default();
        let mut failures = Vec::new();

        for kind in ConversationKind::ALL {
            let file_name = kind.metadata_file();
            let existing: Vec<MetadataRecord> = self.load_records(file_name);
            let records = merge(existing, new.records(kind));

            debug!("writing {} records to {}", records.len(), file_name);
            if let Err(e) = write_json(&self.root.join(file_name), &records) {
                warn!("Failed to write {}: {:#}", file_name, e);
                failures.push(file_name);
            }

            *merged.records_mut(kind) = records;
        }

        if !failures.is_empty() {
            anyhow::bail!("cannot write {}", failures.join(", "));
        }

        Ok(merged)
    }

    pub fn persist_users(&self, users: &[User]) -> Result<()> {
        let existing: Vec<User> = self.load_records(USERS_FILE);
        let merged = merge(existing, users);
        write_json(&self.root.join(USERS_FILE), &merged)
            .with_context(|| format!("Failed to write {}", USERS_FILE))
    }
}

/// Hands out one directory name per conversation so that no two
/// conversations share a directory, on disk or within the run.
#[derive(Debug)]
pub struct DirectoryAllocator {
    layout: DirectoryLayout,
    claimed: HashMap<String, String>,
}

impl DirectoryAllocator {
    pub fn new(layout: DirectoryLayout) -> Self {
        Self {
            layout,
            claimed: HashMap::new(),
        }
    }

    pub fn allocate(
        &mut self,
        store: &IncrementalStore,
        kind: ConversationKind,
        label: &str,
        conversation_id: &str,
    ) -> String {
        let with_id = format!("{label}__{conversation_id}");
        let preferred = match (self.layout, kind) {
            (_, ConversationKind::DirectMessage) | (DirectoryLayout::Label, _) => label.to_string(),
            (DirectoryLayout::LabelWithId, _) => with_id.clone(),
        };

        // A conversation moved aside by an earlier collision keeps its directory.
        if preferred != with_id
            && store.owner_of(&with_id).as_deref() == Some(conversation_id)
        {
            self.claimed
                .insert(with_id.clone(), conversation_id.to_string());
            return with_id;
        }

        let taken_in_run = self
            .claimed
            .get(&preferred)
            .is_some_and(|owner| owner != conversation_id);
        let taken_on_disk = store
            .owner_of(&preferred)
            .is_some_and(|owner| owner != conversation_id);

        let dir_name = if taken_in_run || taken_on_disk {
            warn!(
                "directory {} already belongs to another conversation, using {} for {}",
                preferred, with_id, conversation_id
            );
            with_id
        } else {
            preferred
        };

        self.claimed
            .insert(dir_name.clone(), conversation_id.to_string());
        dir_name
    }
}
