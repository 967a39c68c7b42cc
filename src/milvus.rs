//! Milvus / Zilliz Cloud client over the RESTful v2 API.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::embeddings::EmbeddedPassage;
use crate::provision::{CollectionSchema, OUTPUT_FIELDS, VECTOR_FIELD};
use crate::vector_store::{
    CollectionName, CollectionStats, SearchHit, SearchQuery, StoreError, VectorStore,
};

/// `nprobe` sent with every search; ignored by indexes that do not use it.
const SEARCH_NPROBE: u32 = 10;

/// Error code Milvus uses for a missing collection.
const COLLECTION_NOT_FOUND_CODE: i64 = 100;

/// Shared handle to one Milvus deployment.
#[derive(Clone)]
pub struct MilvusClient {
    client: Client,
    base_url: String,
}

impl MilvusClient {
    /// Builds a client for `uri`, authenticating with `token` when present.
    pub fn new(uri: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(
            uri.starts_with("http://") || uri.starts_with("https://"),
            "vector store URI must be an http(s) URL"
        );
        let mut headers = HeaderMap::new();
        if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .context("invalid vector store token")?,
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build vector store HTTP client")?;
        Ok(Self {
            client,
            base_url: uri.trim_end_matches('/').to_string(),
        })
    }

    /// Builds a client and verifies the deployment answers.
    pub async fn connect(uri: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = Self::new(uri, token, timeout)?;
        let collections = client
            .list_collections()
            .await
            .with_context(|| format!("failed to reach vector store at {uri}"))?;
        debug!(collections = collections.len(), "vector store reachable");
        Ok(client)
    }

    async fn call<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, StoreError> {
        let url = format!("{}/v2/vectordb/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        if !status.is_success() {
            return Err(StoreError::Api {
                code: i64::from(status.as_u16()),
                message: text,
            });
        }
        let envelope: Envelope = serde_json::from_str(&text)
            .map_err(|err| StoreError::Malformed(format!("{path}: {err}")))?;
        if envelope.code != 0 && envelope.code != 200 {
            return Err(classify_error(envelope.code, envelope.message));
        }
        serde_json::from_value(envelope.data)
            .map_err(|err| StoreError::Malformed(format!("{path}: {err}")))
    }
}

fn classify_error(code: i64, message: String) -> StoreError {
    let lowered = message.to_lowercase();
    if code == COLLECTION_NOT_FOUND_CODE
        || lowered.contains("collection not found")
        || lowered.contains("can't find collection")
    {
        StoreError::CollectionNotFound(message)
    } else {
        StoreError::Api { code, message }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct HasData {
    has: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertData {
    insert_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsData {
    row_count: u64,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(default)]
    content: String,
    #[serde(default)]
    page: String,
    #[serde(default)]
    book: String,
    #[serde(alias = "score")]
    distance: f64,
}

fn create_collection_body(schema: &CollectionSchema) -> Value {
    json!({
        "collectionName": schema.name.as_str(),
        "schema": {
            "autoId": true,
            "enableDynamicField": true,
            "fields": [
                {"fieldName": "id", "dataType": "Int64", "isPrimary": true},
                {
                    "fieldName": VECTOR_FIELD,
                    "dataType": "FloatVector",
                    "elementTypeParams": {"dim": schema.dimension.to_string()}
                },
                {
                    "fieldName": "content",
                    "dataType": "VarChar",
                    "elementTypeParams": {"max_length": schema.content_max_length.to_string()}
                },
                {
                    "fieldName": "page",
                    "dataType": "VarChar",
                    "elementTypeParams": {"max_length": schema.page_max_length.to_string()}
                },
                {
                    "fieldName": "book",
                    "dataType": "VarChar",
                    "elementTypeParams": {"max_length": schema.book_max_length.to_string()}
                }
            ]
        },
        "indexParams": [{
            "fieldName": VECTOR_FIELD,
            "indexName": VECTOR_FIELD,
            "metricType": schema.metric.as_str(),
            "indexType": "AUTOINDEX"
        }]
    })
}

fn search_body(name: &CollectionName, query: &SearchQuery<'_>) -> Value {
    let mut body = json!({
        "collectionName": name.as_str(),
        "data": [query.vector],
        "annsField": VECTOR_FIELD,
        "limit": query.limit,
        "outputFields": OUTPUT_FIELDS,
        "searchParams": {
            "metricType": "COSINE",
            "params": {"nprobe": SEARCH_NPROBE}
        }
    });
    if let Some(filter) = query.filter {
        body["filter"] = Value::String(filter.to_string());
    }
    body
}

#[async_trait]
impl VectorStore for MilvusClient {
    async fn has_collection(&self, name: &CollectionName) -> Result<bool, StoreError> {
        let data: HasData = self
            .call("collections/has", json!({"collectionName": name.as_str()}))
            .await?;
        Ok(data.has)
    }

    async fn drop_collection(&self, name: &CollectionName) -> Result<(), StoreError> {
        let _: Value = self
            .call("collections/drop", json!({"collectionName": name.as_str()}))
            .await?;
        Ok(())
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StoreError> {
        let _: Value = self
            .call("collections/create", create_collection_body(schema))
            .await?;
        Ok(())
    }

    async fn insert(
        &self,
        name: &CollectionName,
        rows: &[EmbeddedPassage],
    ) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let data: InsertData = self
            .call(
                "entities/insert",
                json!({"collectionName": name.as_str(), "data": rows}),
            )
            .await?;
        Ok(data.insert_count)
    }

    async fn search(
        &self,
        name: &CollectionName,
        query: SearchQuery<'_>,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let hits: Vec<RawHit> = self
            .call("entities/search", search_body(name, &query))
            .await?;
        Ok(hits
            .into_iter()
            .map(|hit| SearchHit {
                content: hit.content,
                page: hit.page,
                book: hit.book,
                score: hit.distance,
            })
            .collect())
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        self.call("collections/list", json!({})).await
    }

    async fn collection_stats(&self, name: &CollectionName) -> Result<CollectionStats, StoreError> {
        let data: StatsData = self
            .call(
                "collections/get_stats",
                json!({"collectionName": name.as_str()}),
            )
            .await?;
        Ok(CollectionStats {
            row_count: data.row_count,
        })
    }
}
