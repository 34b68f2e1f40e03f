//! The incremental conversation backup engine.
//!
//! A run loads users, enumerates conversations, and for every conversation
//! either skips it (already on disk) or collects its history with thread
//! expansion, writes one file per UTC date and classifies its metadata.
//! Metadata is merged into the per-kind files at the end of the run.

pub mod classifier;
pub mod collector;
pub mod enumerator;
pub mod orchestrator;
pub mod partitioner;
pub mod store;

pub use classifier::{Classified, classify};
pub use collector::{HistoryWindow, MessageCollector};
pub use enumerator::ConversationEnumerator;
pub use orchestrator::{BackupOptions, BackupOrchestrator, RunSummary};
pub use partitioner::{WriteReport, partition, write_partitions};
pub use store::{BackupStatus, DirectoryAllocator, DirectoryLayout, IncrementalStore};
