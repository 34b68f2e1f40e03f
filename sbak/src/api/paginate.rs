use serde::de::DeserializeOwned;
use serde_json::Value;

use super::Requester;
use crate::error::ApiError;

/// Largest page size the Web API accepts.
pub const PAGE_LIMIT: u32 = 1000;

/// Follows `response_metadata.next_cursor` until the server stops handing one out.
///
/// Items are yielded in the order the server returned them. Use
/// [`Paginator::next_page`] to stream page by page, or
/// [`Paginator::collect_all`] to gather everything.
pub struct Paginator<'a> {
    requester: &'a Requester,
    method: &'a str,
    field: &'a str,
    params: Vec<(&'a str, String)>,
    limit: u32,
    cursor: Option<String>,
    finished: bool,
}

impl<'a> Paginator<'a> {
    pub fn new(requester: &'a Requester, method: &'a str, field: &'a str) -> Self {
        Self {
            requester,
            method,
            field,
            params: Vec::new(),
            limit: PAGE_LIMIT,
            cursor: None,
            finished: false,
        }
    }

    pub fn param(mut self, key: &'a str, value: impl Into<String>) -> Self {
        self.params.push((key, value.into()));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>, ApiError> {
        if self.finished {
            return Ok(None);
        }

        let mut params = self.params.clone();
        params.push(("limit", self.limit.to_string()));
        if let Some(cursor) = &self.cursor {
            params.push(("cursor", cursor.clone()));
        }

        let mut body = self.requester.request(self.method, &params).await?;

        self.cursor = next_cursor(&body);
        self.finished = self.cursor.is_none();

        let items = match body.get_mut(self.field).map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };

        Ok(Some(items))
    }

    pub async fn collect_all(mut self) -> Result<Vec<Value>, ApiError> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }

    pub async fn collect_as<T: DeserializeOwned>(self) -> Result<Vec<T>, ApiError> {
        let method = self.method.to_string();
        self.collect_all()
            .await?
            .into_iter()
            .map(|item| {
                serde_json::from_value(item).map_err(|source| ApiError::Decode {
                    method: method.clone(),
                    source,
                })
            })
            .collect()
    }
}

fn next_cursor(body: &Value) -> Option<String> {
    body.pointer("/response_metadata/next_cursor")
        .and_then(Value::as_str)
        .filter(|cursor| !cursor.is_empty())
        .map(str::to_string)
}
