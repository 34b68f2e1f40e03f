use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::fmt;

use super::classifier::{self, Classified, classify};
use super::collector::{HistoryWindow, MessageCollector};
use super::enumerator::ConversationEnumerator;
use super::partitioner::{partition, write_partitions};
use super::store::{BackupStatus, DirectoryAllocator, DirectoryLayout, IncrementalStore};
use crate::api::Requester;
use crate::error::is_cancelled;
use crate::models::{Conversation, ConversationKind, ConversationType, MetadataSets};

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub types: Vec<ConversationType>,
    pub window: HistoryWindow,
    /// Back up only this conversation.
    pub conversation_id: Option<String>,
    pub force: bool,
    /// Conversations processed concurrently.
    pub jobs: usize,
    pub layout: DirectoryLayout,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            types: ConversationType::default_selection(),
            window: HistoryWindow::default(),
            conversation_id: None,
            force: false,
            jobs: 1,
            layout: DirectoryLayout::default(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// The run stopped early on cancellation.
    pub interrupted: bool,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} skipped (already backed up), {} failed",
            self.processed, self.skipped, self.failed
        )?;
        if self.interrupted {
            write!(f, ", interrupted")?;
        }
        Ok(())
    }
}

enum Outcome {
    /// Carries the metadata of a backed up conversation whose record was missing.
    Skipped(Option<Box<Classified>>),
    Processed(Box<Classified>),
    Failed,
    Cancelled,
}

/// Drives one backup run: users, conversation list, per-conversation
/// skip-or-process, then the metadata merge.
pub struct BackupOrchestrator {
    requester: Requester,
    store: IncrementalStore,
    options: BackupOptions,
    progress: ProgressBar,
}

impl BackupOrchestrator {
    pub fn new(requester: Requester, store: IncrementalStore, options: BackupOptions) -> Self {
        Self {
            requester,
            store,
            options,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let enumerator = ConversationEnumerator::new(&self.requester);

        let users = enumerator
            .list_users()
            .await
            .context("Failed to load users")?;
        info!("loaded {} users", users.len());
        self.store.persist_users(&users)?;

        let names: HashMap<String, String> = users
            .iter()
            .map(|user| (user.id.clone(), user.display_name().to_string()))
            .collect();

        let conversations = match &self.options.conversation_id {
            Some(id) => {
                let conversation = enumerator.resolve_one(id).await?;
                info!(
                    "backing up single conversation {}",
                    conversation.name.as_deref().unwrap_or(id)
                );
                vec![conversation]
            }
            None => enumerator
                .list_conversations(&self.options.types)
                .await
                .context("Failed to list conversations")?,
        };

        let mut allocator = DirectoryAllocator::new(self.options.layout);
        let plan: Vec<(Conversation, String)> = conversations
            .into_iter()
            .map(|conv| {
                let dir_name = allocator.allocate(
                    &self.store,
                    classifier::kind_of(&conv),
                    &classifier::label(&conv),
                    &conv.id,
                );
                (conv, dir_name)
            })
            .collect();

        let known = self.store.load_metadata().ids();

        self.progress.set_length(plan.len() as u64);

        let mut summary = RunSummary::default();
        let mut collected = MetadataSets::default();

        let mut outcomes = stream::iter(&plan)
            .map(|(conv, dir_name)| self.process(conv, dir_name, &names, &known))
            .buffer_unordered(self.options.jobs.max(1));

        while let Some(outcome) = outcomes.next().await {
            self.progress.inc(1);
            match outcome {
                Outcome::Skipped(restored) => {
                    summary.skipped += 1;
                    if let Some(classified) = restored {
                        collected.push(classified.kind, classified.record);
                    }
                }
                Outcome::Processed(classified) => {
                    summary.processed += 1;
                    collected.push(classified.kind, classified.record);
                }
                Outcome::Failed => summary.failed += 1,
                Outcome::Cancelled => summary.interrupted = true,
            }
        }

        self.progress.finish_and_clear();

        if summary.interrupted {
            warn!(
                "run interrupted, saving metadata of {} finished conversations",
                collected.len()
            );
        }

        self.store
            .persist_metadata(&collected)
            .context("Failed to write conversation metadata")?;

        Ok(summary)
    }

    async fn process(
        &self,
        conv: &Conversation,
        dir_name: &str,
        names: &HashMap<String, String>,
        known: &HashSet<String>,
    ) -> Outcome {
        if self.requester.is_cancelled() {
            return Outcome::Cancelled;
        }

        let status = self.store.status(dir_name, &conv.id, self.options.force);
        match status {
            BackupStatus::Complete if known.contains(&conv.id) => {
                debug!("{} ({}) already backed up, skipping", dir_name, conv.id);
                return Outcome::Skipped(None);
            }
            BackupStatus::Complete => {
                info!(
                    "{} ({}) is backed up but has no metadata record, restoring it",
                    dir_name, conv.id
                );
                return match self.classify_members(conv).await {
                    Ok(classified) => Outcome::Skipped(Some(Box::new(classified))),
                    Err(e) if is_cancelled(&e) => Outcome::Cancelled,
                    Err(e) => {
                        warn!("skipping {} ({}): {:#}", dir_name, conv.id, e);
                        Outcome::Failed
                    }
                };
            }
            BackupStatus::ForceRequested => debug!("reprocessing {} ({})", dir_name, conv.id),
            BackupStatus::NotStarted => {
                if self.store.is_unfinished(dir_name) {
                    info!("{} holds an unfinished backup, processing again", dir_name);
                }
            }
        }

        self.progress.set_message(display_name(conv, dir_name, names));

        match self.backup_conversation(conv, dir_name).await {
            Ok(classified) => Outcome::Processed(Box::new(classified)),
            Err(e) if is_cancelled(&e) => Outcome::Cancelled,
            Err(e) => {
                warn!("skipping {} ({}): {:#}", dir_name, conv.id, e);
                Outcome::Failed
            }
        }
    }

    async fn classify_members(&self, conv: &Conversation) -> Result<Classified> {
        let members = MessageCollector::new(&self.requester, self.options.window)
            .members(&conv.id)
            .await
            .with_context(|| format!("Failed to list members of {}", conv.id))?;

        Ok(classify(conv, members))
    }

    async fn backup_conversation(&self, conv: &Conversation, dir_name: &str) -> Result<Classified> {
        let collector = MessageCollector::new(&self.requester, self.options.window);

        let messages = collector
            .collect(&conv.id)
            .await
            .with_context(|| format!("Failed to collect messages of {}", conv.id))?;

        let classified = self.classify_members(conv).await?;

        if messages.is_empty() {
            debug!("{} has no messages in range", conv.id);
            return Ok(classified);
        }

        let partitions = partition(messages);
        let dir = self.store.begin_conversation(dir_name, &conv.id)?;
        let report = write_partitions(&dir, &partitions);

        if report.failed == 0 {
            self.store.finish_conversation(dir_name)?;
        } else {
            warn!(
                "{} of {} date files for {} were not written, it will be processed again next run",
                report.failed,
                partitions.len(),
                conv.id
            );
        }

        Ok(classified)
    }
}

fn display_name(conv: &Conversation, dir_name: &str, names: &HashMap<String, String>) -> String {
    if classifier::kind_of(conv) == ConversationKind::DirectMessage
        && let Some(name) = conv.user.as_ref().and_then(|user| names.get(user))
    {
        return format!("@{name}");
    }
    dir_name.to_string()
}
