use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::models::{Conversation, ConversationKind, MetadataRecord};

pub const UNNAMED_LABEL: &str = "unnamed_channel";
const MAX_LABEL_BYTES: usize = 200;

static FORBIDDEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[/\\:*?"<>|\x00-\x1f\x7f]"#).expect("valid forbidden-char pattern")
});
static UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("_+").expect("valid underscore pattern"));

#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub kind: ConversationKind,
    pub label: String,
    pub record: MetadataRecord,
}

/// Earlier flags take precedence: DM, then multi-party DM, then private.
pub fn kind_of(conv: &Conversation) -> ConversationKind {
    if conv.is_im {
        ConversationKind::DirectMessage
    } else if conv.is_mpim {
        ConversationKind::GroupDm
    } else if conv.is_private {
        ConversationKind::PrivateGroup
    } else {
        ConversationKind::Channel
    }
}

/// Filesystem safe form of `name`, or `None` when nothing usable is left.
fn sanitize_label(name: &str) -> Option<String> {
    let replaced = FORBIDDEN.replace_all(name, "_");
    let collapsed = UNDERSCORES.replace_all(&replaced, "_");
    let mut label = collapsed
        .trim_matches(|c| c == ' ' || c == '_')
        .to_string();

    if label.len() > MAX_LABEL_BYTES {
        let mut end = MAX_LABEL_BYTES;
        while !label.is_char_boundary(end) {
            end -= 1;
        }
        label.truncate(end);
        label = label.trim_end_matches('_').to_string();
    }

    (!label.is_empty()).then_some(label)
}

/// Sanitizes a name for use as a directory name.
///
/// Forbidden characters become `_`, runs of `_` collapse, surrounding spaces
/// and underscores are trimmed and the result is cut to 200 bytes on a char
/// boundary. An empty result becomes [`UNNAMED_LABEL`].
pub fn sanitize(name: &str) -> String {
    sanitize_label(name).unwrap_or_else(|| UNNAMED_LABEL.to_string())
}

/// Directory label: the raw id for DMs, the sanitized name otherwise.
pub fn label(conv: &Conversation) -> String {
    if kind_of(conv) == ConversationKind::DirectMessage {
        return conv.id.clone();
    }

    conv.name
        .as_deref()
        .and_then(sanitize_label)
        .or_else(|| sanitize_label(&conv.id))
        .unwrap_or_else(|| UNNAMED_LABEL.to_string())
}

fn present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        _ => true,
    }
}

pub fn classify(conv: &Conversation, members: Vec<String>) -> Classified {
    let kind = kind_of(conv);
    let label = label(conv);

    let members = match members.as_slice() {
        [only] if kind == ConversationKind::DirectMessage => vec![only.clone(), only.clone()],
        _ => members,
    };

    let mut record = MetadataRecord {
        id: conv.id.clone(),
        created: conv.created.filter(|created| *created != 0),
        members,
        ..Default::default()
    };

    if kind != ConversationKind::DirectMessage {
        record.name = Some(label.clone());
        record.creator = conv.creator.clone().filter(|creator| !creator.is_empty());
        record.is_archived = conv.is_archived;
        record.is_general = conv.is_general;
        record.topic = conv.topic.clone().filter(present);
        record.purpose = conv.purpose.clone().filter(present);
    }

    Classified {
        kind,
        label,
        record,
    }
}
