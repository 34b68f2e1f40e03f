use log::debug;
use serde_json::Value;

use crate::api::Requester;
use crate::error::{ApiError, BackupError};
use crate::models::{Conversation, ConversationType, User};

pub struct ConversationEnumerator<'a> {
    requester: &'a Requester,
}

impl<'a> ConversationEnumerator<'a> {
    pub fn new(requester: &'a Requester) -> Self {
        Self { requester }
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.requester
            .paginate("users.list", "members")
            .collect_as()
            .await
    }

    /// Every non-archived conversation of the requested types.
    pub async fn list_conversations(
        &self,
        types: &[ConversationType],
    ) -> Result<Vec<Conversation>, ApiError> {
        let conversations: Vec<Conversation> = self
            .requester
            .paginate("conversations.list", "channels")
            .param("types", ConversationType::join(types))
            .param("exclude_archived", "true")
            .collect_as()
            .await?;

        debug!("listed {} conversations", conversations.len());
        Ok(conversations)
    }

    /// Looks up a single conversation by id.
    ///
    /// Any failure to resolve it is reported as [`BackupError::NotFound`],
    /// except cancellation which is passed through.
    pub async fn resolve_one(&self, conversation_id: &str) -> Result<Conversation, BackupError> {
        let not_found = |source| BackupError::NotFound {
            id: conversation_id.to_string(),
            source,
        };

        let mut body = match self
            .requester
            .request("conversations.info", &[("channel", conversation_id.to_string())])
            .await
        {
            Ok(body) => body,
            Err(ApiError::Cancelled) => return Err(ApiError::Cancelled.into()),
            Err(source) => return Err(not_found(source)),
        };

        let channel = body.get_mut("channel").map(Value::take).unwrap_or_default();
        serde_json::from_value(channel).map_err(|source| {
            not_found(ApiError::Decode {
                method: "conversations.info".to_string(),
                source,
            })
        })
    }
}
