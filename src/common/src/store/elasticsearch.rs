//! Elasticsearch document store over its REST API.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use super::{LogStore, PageCursor, StoreError, StoredRecord};
use crate::config::StoreConfig;
use crate::model::LogEntry;

pub struct ElasticsearchStore {
    client: Client,
    base_url: Url,
    index: String,
    service_field: String,
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source")]
    source: Value,
    /// `[timestamp_millis, _id]` as echoed back for the sort below.
    #[serde(default)]
    sort: Vec<Value>,
}

impl Hit {
    /// Sort timestamp of the hit, preferring the value echoed by the search.
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.sort
            .first()
            .and_then(Value::as_i64)
            .and_then(DateTime::from_timestamp_millis)
            .or_else(|| {
                let raw = self.source.get("timestamp")?.as_str()?;
                DateTime::parse_from_rfc3339(raw)
                    .ok()
                    .map(|ts| ts.with_timezone(&Utc))
            })
    }
}

impl ElasticsearchStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let base_url =
            Url::parse(&config.url).map_err(|_| StoreError::InvalidUrl(config.url.clone()))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(config.url.clone()));
        }

        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            base_url,
            index: config.index.clone(),
            service_field: config.service_field.clone(),
        })
    }

    /// `{base}/{index}/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(&self.index)
            .extend(segments);
        Ok(url)
    }

    fn search_body(
        &self,
        service: &str,
        before: DateTime<Utc>,
        after: Option<&PageCursor>,
        page_size: usize,
    ) -> Value {
        let mut term = serde_json::Map::new();
        term.insert(self.service_field.clone(), Value::from(service));

        let mut body = json!({
            "size": page_size,
            "sort": [{ "timestamp": "asc" }, { "_id": "asc" }],
            "query": {
                "bool": {
                    "filter": [
                        { "term": term },
                        { "range": { "timestamp": {
                            "lt": before.to_rfc3339_opts(SecondsFormat::Secs, true)
                        } } }
                    ]
                }
            }
        });

        // Search is near-real-time: documents deleted from the previous page
        // may still match, so the next page starts strictly after the last hit.
        if let Some(cursor) = after {
            body["search_after"] = json!([cursor.timestamp.timestamp_millis(), &cursor.id]);
        }

        body
    }
}

async fn status_error(response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StoreError::Status { status, body }
}

#[async_trait]
impl LogStore for ElasticsearchStore {
    async fn write(&self, entry: &LogEntry) -> Result<String, StoreError> {
        let response = self
            .client
            .post(self.endpoint(&["_doc"])?)
            .json(entry)
            .send()
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(status_error(response).await);
        }

        let created: IndexResponse = response.json().await?;
        Ok(created.id)
    }

    async fn query_expired(
        &self,
        service: &str,
        before: DateTime<Utc>,
        after: Option<&PageCursor>,
        page_size: usize,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let response = self
            .client
            .post(self.endpoint(&["_search"])?)
            .json(&self.search_body(service, before, after, page_size))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let result: SearchResponse = response.json().await?;
        result
            .hits
            .hits
            .into_iter()
            .map(|hit| {
                let timestamp = hit
                    .timestamp()
                    .ok_or_else(|| StoreError::MissingSortPosition(hit.id.clone()))?;
                Ok(StoredRecord {
                    body: Bytes::from(serde_json::to_vec(&hit.source)?),
                    id: hit.id,
                    timestamp,
                })
            })
            .collect()
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.endpoint(&["_doc", id])?)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(id.to_string())),
            status if status.is_success() => Ok(()),
            _ => Err(status_error(response).await),
        }
    }
}
