use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::Identified;

/// Conversation type filter understood by `conversations.list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    #[value(name = "public_channel")]
    PublicChannel,
    #[value(name = "private_channel")]
    PrivateChannel,
    Mpim,
    Im,
}

impl ConversationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationType::PublicChannel => "public_channel",
            ConversationType::PrivateChannel => "private_channel",
            ConversationType::Mpim => "mpim",
            ConversationType::Im => "im",
        }
    }

    pub fn default_selection() -> Vec<ConversationType> {
        vec![
            ConversationType::Im,
            ConversationType::Mpim,
            ConversationType::PrivateChannel,
        ]
    }

    /// Comma separated form used in the `types` request parameter.
    pub fn join(types: &[ConversationType]) -> String {
        types
            .iter()
            .map(ConversationType::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for ConversationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four kinds a conversation is classified into, one metadata file each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConversationKind {
    Channel,
    PrivateGroup,
    GroupDm,
    DirectMessage,
}

impl ConversationKind {
    pub const ALL: [ConversationKind; 4] = [
        ConversationKind::Channel,
        ConversationKind::PrivateGroup,
        ConversationKind::DirectMessage,
        ConversationKind::GroupDm,
    ];

    pub fn metadata_file(&self) -> &'static str {
        match self {
            ConversationKind::Channel => "channels.json",
            ConversationKind::PrivateGroup => "groups.json",
            ConversationKind::GroupDm => "mpims.json",
            ConversationKind::DirectMessage => "dms.json",
        }
    }
}

/// A conversation record as returned by `conversations.list` / `conversations.info`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Conversation {
    pub id: String,
    pub name: Option<String>,
    pub created: Option<i64>,
    pub creator: Option<String>,
    pub topic: Option<Value>,
    pub purpose: Option<Value>,
    pub is_archived: Option<bool>,
    pub is_general: Option<bool>,
    #[serde(default)]
    pub is_im: bool,
    #[serde(default)]
    pub is_mpim: bool,
    #[serde(default)]
    pub is_private: bool,
    /// The other party of a direct message.
    pub user: Option<String>,
}

/// A message is kept as the opaque JSON object the API returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(pub Value);

impl Message {
    pub fn ts(&self) -> Option<&str> {
        self.0.get("ts").and_then(Value::as_str)
    }

    pub fn thread_ts(&self) -> Option<&str> {
        self.0.get("thread_ts").and_then(Value::as_str)
    }

    pub fn reply_count(&self) -> u64 {
        self.0
            .get("reply_count")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    /// A thread root anchors its own thread and has at least one reply.
    pub fn is_thread_root(&self) -> bool {
        match (self.ts(), self.thread_ts()) {
            (Some(ts), Some(thread_ts)) => ts == thread_ts && self.reply_count() > 0,
            _ => false,
        }
    }

    /// `ts` as fractional Unix seconds.
    pub fn timestamp(&self) -> Option<f64> {
        self.ts()?
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|ts| ts.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct User {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl User {
    /// Best human readable name: profile display name, then real name, then handle.
    pub fn display_name(&self) -> &str {
        let profile = self.fields.get("profile");
        let candidates = [
            profile.and_then(|p| p.get("display_name")),
            profile.and_then(|p| p.get("real_name")),
            self.fields.get("real_name"),
            self.fields.get("name"),
        ];

        candidates
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .find(|name| !name.trim().is_empty())
            .unwrap_or(self.id.as_str())
    }
}

impl Identified for User {
    fn id(&self) -> &str {
        &self.id
    }
}
