use log::{debug, warn};
use std::collections::HashSet;

use crate::api::Requester;
use crate::error::ApiError;
use crate::models::Message;

/// Exclusive `oldest`/`latest` bounds on history, in fractional epoch seconds.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct HistoryWindow {
    pub oldest: Option<f64>,
    pub latest: Option<f64>,
}

pub struct MessageCollector<'a> {
    requester: &'a Requester,
    window: HistoryWindow,
}

impl<'a> MessageCollector<'a> {
    pub fn new(requester: &'a Requester, window: HistoryWindow) -> Self {
        Self { requester, window }
    }

    /// Full message set of a conversation with every thread expanded.
    ///
    /// Messages keep server order; replies follow their root. Each `ts`
    /// appears once, so thread roots returned again by `conversations.replies`
    /// and replies broadcast to the channel are not duplicated. Messages
    /// without `ts` are dropped.
    pub async fn collect(&self, channel_id: &str) -> Result<Vec<Message>, ApiError> {
        let mut collected = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let mut pages = self
            .requester
            .paginate("conversations.history", "messages")
            .param("channel", channel_id)
            .param("inclusive", "false");
        if let Some(oldest) = self.window.oldest {
            pages = pages.param("oldest", oldest.to_string());
        }
        if let Some(latest) = self.window.latest {
            pages = pages.param("latest", latest.to_string());
        }

        while let Some(page) = pages.next_page().await? {
            for message in page.into_iter().map(Message) {
                let Some(ts) = message.ts().map(str::to_string) else {
                    warn!("dropping message without ts in {}", channel_id);
                    continue;
                };

                if !seen.insert(ts.clone()) {
                    debug!("{} already collected in {}", ts, channel_id);
                    continue;
                }

                let expand = message.is_thread_root();
                collected.push(message);

                if expand {
                    for reply in self.replies(channel_id, &ts).await? {
                        match reply.ts().map(str::to_string) {
                            None => warn!("dropping reply without ts in thread {}", ts),
                            Some(reply_ts) if reply_ts == ts => {}
                            Some(reply_ts) => {
                                if seen.insert(reply_ts) {
                                    collected.push(reply);
                                }
                            }
                        }
                    }
                }
            }
        }

        debug!("collected {} messages from {}", collected.len(), channel_id);
        Ok(collected)
    }

    /// Every message of a thread, parent included.
    pub async fn replies(
        &self,
        channel_id: &str,
        parent_ts: &str,
    ) -> Result<Vec<Message>, ApiError> {
        let messages = self
            .requester
            .paginate("conversations.replies", "messages")
            .param("channel", channel_id)
            .param("ts", parent_ts)
            .collect_all()
            .await?;

        Ok(messages.into_iter().map(Message).collect())
    }

    pub async fn members(&self, channel_id: &str) -> Result<Vec<String>, ApiError> {
        self.requester
            .paginate("conversations.members", "members")
            .param("channel", channel_id)
            .collect_as()
            .await
    }
}
