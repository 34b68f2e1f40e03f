#![allow(dead_code)]

use async_trait::async_trait;
use sbak::api::{RateLimiter, Requester, RetryPolicy, SlackApi};
use sbak::error::ApiError;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Items served per page, small enough that every listing spans pages.
const PAGE_SIZE: usize = 2;

/// In-memory workspace answering the Web API methods the backup uses.
#[derive(Default)]
pub struct FakeSlack {
    pub users: Vec<Value>,
    pub conversations: Vec<Value>,
    pub history: HashMap<String, Vec<Value>>,
    pub threads: HashMap<(String, String), Vec<Value>>,
    pub members: HashMap<String, Vec<String>>,
    /// Channels whose history requests fail with `internal_error`.
    pub broken: HashSet<String>,
    /// Remaining 429 responses per method.
    pub throttled: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<String>>,
}

impl FakeSlack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, id: &str, real_name: &str) -> Self {
        self.users.push(json!({"id": id, "real_name": real_name}));
        self
    }

    pub fn conversation(
        mut self,
        conversation: Value,
        members: &[&str],
        messages: Vec<Value>,
    ) -> Self {
        let id = conversation["id"].as_str().unwrap().to_string();
        self.members
            .insert(id.clone(), members.iter().map(|m| m.to_string()).collect());
        self.history.insert(id, messages);
        self.conversations.push(conversation);
        self
    }

    pub fn thread(mut self, channel: &str, parent_ts: &str, messages: Vec<Value>) -> Self {
        self.threads
            .insert((channel.to_string(), parent_ts.to_string()), messages);
        self
    }

    pub fn broken(mut self, channel: &str) -> Self {
        self.broken.insert(channel.to_string());
        self
    }

    pub fn throttle(self, method: &str, times: u32) -> Self {
        self.throttled
            .lock()
            .unwrap()
            .insert(method.to_string(), times);
        self
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.as_str() == method)
            .count()
    }

    fn page(field: &str, items: &[Value], params: &[(&str, String)]) -> Value {
        let start: usize = param(params, "cursor")
            .and_then(|cursor| cursor.parse().ok())
            .unwrap_or(0);
        let end = (start + PAGE_SIZE).min(items.len());
        let next_cursor = if end < items.len() {
            end.to_string()
        } else {
            String::new()
        };

        json!({
            "ok": true,
            field: items[start.min(end)..end],
            "response_metadata": {"next_cursor": next_cursor},
        })
    }

    fn slack_error(method: &str, error: &str) -> ApiError {
        ApiError::Slack {
            method: method.to_string(),
            error: error.to_string(),
        }
    }
}

fn param<'a>(params: &'a [(&str, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.as_str())
}

#[async_trait]
impl SlackApi for FakeSlack {
    async fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value, ApiError> {
        self.calls.lock().unwrap().push(method.to_string());

        if let Some(remaining) = self.throttled.lock().unwrap().get_mut(method)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ApiError::RateLimited {
                method: method.to_string(),
                retry_after: None,
            });
        }

        let channel = param(params, "channel").unwrap_or_default().to_string();

        match method {
            "users.list" => Ok(Self::page("members", &self.users, params)),
            "conversations.list" => {
                let types = param(params, "types").unwrap_or_default();
                let selected: Vec<Value> = self
                    .conversations
                    .iter()
                    .filter(|conv| types.split(',').any(|t| t == type_of(conv)))
                    .cloned()
                    .collect();
                Ok(Self::page("channels", &selected, params))
            }
            "conversations.info" => self
                .conversations
                .iter()
                .find(|conv| conv["id"] == channel.as_str())
                .map(|conv| json!({"ok": true, "channel": conv}))
                .ok_or_else(|| Self::slack_error(method, "channel_not_found")),
            "conversations.members" => {
                let members: Vec<Value> = self
                    .members
                    .get(&channel)
                    .into_iter()
                    .flatten()
                    .map(|m| json!(m))
                    .collect();
                Ok(Self::page("members", &members, params))
            }
            "conversations.history" => {
                if self.broken.contains(&channel) {
                    return Err(Self::slack_error(method, "internal_error"));
                }
                let oldest = param(params, "oldest").and_then(|ts| ts.parse::<f64>().ok());
                let latest = param(params, "latest").and_then(|ts| ts.parse::<f64>().ok());
                let messages: Vec<Value> = self
                    .history
                    .get(&channel)
                    .into_iter()
                    .flatten()
                    .filter(|message| {
                        let ts = message["ts"].as_str().and_then(|ts| ts.parse::<f64>().ok());
                        match ts {
                            Some(ts) => {
                                oldest.is_none_or(|oldest| ts > oldest)
                                    && latest.is_none_or(|latest| ts < latest)
                            }
                            None => true,
                        }
                    })
                    .cloned()
                    .collect();
                Ok(Self::page("messages", &messages, params))
            }
            "conversations.replies" => {
                let ts = param(params, "ts").unwrap_or_default().to_string();
                let replies = self
                    .threads
                    .get(&(channel, ts))
                    .cloned()
                    .unwrap_or_default();
                Ok(Self::page("messages", &replies, params))
            }
            _ => Err(Self::slack_error(method, "unknown_method")),
        }
    }
}

fn type_of(conv: &Value) -> &'static str {
    let flag = |name: &str| conv[name].as_bool().unwrap_or(false);
    if flag("is_im") {
        "im"
    } else if flag("is_mpim") {
        "mpim"
    } else if flag("is_private") {
        "private_channel"
    } else {
        "public_channel"
    }
}

pub fn requester(api: Arc<FakeSlack>) -> Requester {
    requester_with_cancel(api, CancellationToken::new())
}

pub fn requester_with_cancel(api: Arc<FakeSlack>, cancel: CancellationToken) -> Requester {
    let policy = RetryPolicy {
        default_wait: Duration::ZERO,
        ..RetryPolicy::default()
    };
    Requester::new(api, Arc::new(RateLimiter::new(policy)), cancel)
}

pub fn message(ts: &str, text: &str) -> Value {
    json!({"type": "message", "ts": ts, "text": text})
}

pub fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}
