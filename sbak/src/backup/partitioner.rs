use chrono::DateTime;
use log::warn;
use std::collections::BTreeMap;
use std::path::Path;

use super::store::{MESSAGE_FILE_EXTENSION, write_json};
use crate::models::Message;

pub const UNKNOWN_DATE: &str = "unknown-date";

/// UTC calendar date of the message `ts`, or [`UNKNOWN_DATE`].
pub fn date_key(message: &Message) -> String {
    let date = message
        .timestamp()
        .and_then(|ts| DateTime::from_timestamp(ts.floor() as i64, 0))
        .map(|date| date.format("%Y-%m-%d").to_string());

    match date {
        Some(date) => date,
        None => {
            warn!("invalid message timestamp {:?}", message.ts());
            UNKNOWN_DATE.to_string()
        }
    }
}

/// Groups messages by UTC date, each group sorted ascending by numeric `ts`.
pub fn partition(messages: Vec<Message>) -> BTreeMap<String, Vec<Message>> {
    let mut groups: BTreeMap<String, Vec<Message>> = BTreeMap::new();

    for message in messages {
        groups.entry(date_key(&message)).or_default().push(message);
    }

    for group in groups.values_mut() {
        group.sort_by(|a, b| {
            let a = a.timestamp().unwrap_or(0.0);
            let b = b.timestamp().unwrap_or(0.0);
            a.total_cmp(&b)
        });
    }

    groups
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    pub written: usize,
    pub failed: usize,
}

/// Writes `<dir>/<date>.json` per group, replacing whatever was there.
pub fn write_partitions(dir: &Path, partitions: &BTreeMap<String, Vec<Message>>) -> WriteReport {
    let mut report = WriteReport::default();

    for (date, messages) in partitions {
        let path = dir.join(format!("{date}.{MESSAGE_FILE_EXTENSION}"));
        match write_json(&path, messages) {
            Ok(()) => report.written += 1,
            Err(e) => {
                warn!("Failed to write {}: {:#}", path.display(), e);
                report.failed += 1;
            }
        }
    }

    report
}
