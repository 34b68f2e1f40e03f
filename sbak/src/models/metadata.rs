use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use super::{ConversationKind, Identified};

/// Persisted projection of a conversation, one entry in `channels.json` and friends.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_general: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<Value>,
}

impl Identified for MetadataRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Metadata records accumulated during a run, one list per kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataSets {
    pub channels: Vec<MetadataRecord>,
    pub groups: Vec<MetadataRecord>,
    pub dms: Vec<MetadataRecord>,
    pub mpims: Vec<MetadataRecord>,
}

impl MetadataSets {
    pub fn records(&self, kind: ConversationKind) -> &[MetadataRecord] {
        match kind {
            ConversationKind::Channel => &self.channels,
            ConversationKind::PrivateGroup => &self.groups,
            ConversationKind::GroupDm => &self.mpims,
            ConversationKind::DirectMessage => &self.dms,
        }
    }

    pub fn records_mut(&mut self, kind: ConversationKind) -> &mut Vec<MetadataRecord> {
        match kind {
            ConversationKind::Channel => &mut self.channels,
            ConversationKind::PrivateGroup => &mut self.groups,
            ConversationKind::GroupDm => &mut self.mpims,
            ConversationKind::DirectMessage => &mut self.dms,
        }
    }

    pub fn push(&mut self, kind: ConversationKind, record: MetadataRecord) {
        self.records_mut(kind).push(record);
    }

    pub fn len(&self) -> usize {
        ConversationKind::ALL
            .iter()
            .map(|kind| self.records(*kind).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every conversation id present in any of the lists.
    pub fn ids(&self) -> HashSet<String> {
        ConversationKind::ALL
            .iter()
            .flat_map(|kind| self.records(*kind))
            .map(|record| record.id.clone())
            .collect()
    }
}
