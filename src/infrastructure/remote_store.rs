use crate::domain::models::{
    BlockCandidate, BlockPatch, Category, CategoryDraft, CategoryPatch, TimeBlock,
};
use crate::infrastructure::error::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use url::Url;

const REST_PATH: [&str; 2] = ["rest", "v1"];
const CATEGORIES_TABLE: &str = "categories";
const TIME_BLOCKS_TABLE: &str = "time_blocks";

/// Filter for the block list operation: owner equality, optional category
/// equality, and the overlap range used by the 3-day window query.
#[derive(Debug, Clone, Default)]
pub struct BlockQuery {
    pub owner_id: String,
    pub category_id: Option<String>,
    pub ends_after: Option<DateTime<Utc>>,
    pub starts_before: Option<DateTime<Utc>>,
}

impl BlockQuery {
    pub fn for_owner(owner_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category_id: &str) -> Self {
        self.category_id = Some(category_id.to_string());
        self
    }

    pub fn overlapping(mut self, range_start: DateTime<Utc>, range_end: DateTime<Utc>) -> Self {
        self.ends_after = Some(range_start);
        self.starts_before = Some(range_end);
        self
    }
}

/// The remote CRUD collaborator. List operations return raw records so the
/// caller can run admission filtering before trusting them.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list_categories(&self, owner_id: &str) -> Result<Vec<serde_json::Value>, CoreError>;

    async fn insert_category(&self, draft: &CategoryDraft) -> Result<Category, CoreError>;

    async fn update_category(
        &self,
        id: &str,
        owner_id: &str,
        patch: &CategoryPatch,
    ) -> Result<(), CoreError>;

    async fn delete_category(&self, id: &str, owner_id: &str) -> Result<(), CoreError>;

    async fn list_blocks(&self, query: &BlockQuery) -> Result<Vec<serde_json::Value>, CoreError>;

    async fn insert_block(&self, candidate: &BlockCandidate) -> Result<TimeBlock, CoreError>;

    async fn update_block(
        &self,
        id: &str,
        owner_id: &str,
        patch: &BlockPatch,
    ) -> Result<(), CoreError>;

    async fn delete_block(&self, id: &str, owner_id: &str) -> Result<(), CoreError>;
}

/// PostgREST-dialect implementation: equality filters as `column=eq.value`,
/// ranges as `gte.`/`lte.`, writes with `Prefer: return=representation`.
#[derive(Debug, Clone)]
pub struct RestRemoteStore {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl RestRemoteStore {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key: api_key.into(),
        }
    }

    fn table_endpoint(&self, table: &str) -> Result<Url, CoreError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                CoreError::RemoteUnavailable("remote base URL cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            for part in REST_PATH {
                segments.push(part);
            }
            segments.push(table);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=representation")
    }

    fn transport_error(context: &str, error: reqwest::Error) -> CoreError {
        CoreError::RemoteUnavailable(format!("network error while {context}: {error}"))
    }

    fn http_error(context: &str, status: StatusCode, body: &str) -> CoreError {
        let message = if body.trim().is_empty() {
            format!("remote error while {context}: http {}", status.as_u16())
        } else {
            format!("remote error while {context}: http {}; body={body}", status.as_u16())
        };
        CoreError::RemoteUnavailable(message)
    }

    async fn send_for_rows(
        request: RequestBuilder,
        context: &str,
    ) -> Result<Vec<serde_json::Value>, CoreError> {
        let response = request
            .send()
            .await
            .map_err(|error| Self::transport_error(context, error))?;
        let status = response.status();
        let body = response.text().await.map_err(|error| {
            CoreError::RemoteUnavailable(format!("failed reading response while {context}: {error}"))
        })?;
        if !status.is_success() {
            return Err(Self::http_error(context, status, &body));
        }
        let rows: Vec<serde_json::Value> = serde_json::from_str(&body).map_err(|error| {
            CoreError::ReconciliationConflict(format!(
                "invalid payload while {context}: {error}; body={body}"
            ))
        })?;
        Ok(rows)
    }

    async fn send_for_status(request: RequestBuilder, context: &str) -> Result<(), CoreError> {
        let response = request
            .send()
            .await
            .map_err(|error| Self::transport_error(context, error))?;
        let status = response.status();
        let body = response.text().await.map_err(|error| {
            CoreError::RemoteUnavailable(format!("failed reading response while {context}: {error}"))
        })?;
        if !status.is_success() {
            return Err(Self::http_error(context, status, &body));
        }
        Ok(())
    }

    fn inserted_row<T: serde::de::DeserializeOwned>(
        rows: Vec<serde_json::Value>,
        context: &str,
    ) -> Result<T, CoreError> {
        let row = rows.into_iter().next().ok_or_else(|| {
            CoreError::ReconciliationConflict(format!("{context} returned no representation"))
        })?;
        let id_present = row
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .is_some_and(|id| !id.is_empty());
        if !id_present {
            return Err(CoreError::ReconciliationConflict(format!(
                "{context} returned a record without an id"
            )));
        }
        serde_json::from_value(row).map_err(|error| {
            CoreError::ReconciliationConflict(format!("{context} returned a malformed record: {error}"))
        })
    }

    fn eq(value: &str) -> String {
        format!("eq.{value}")
    }
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn list_categories(&self, owner_id: &str) -> Result<Vec<serde_json::Value>, CoreError> {
        let url = self.table_endpoint(CATEGORIES_TABLE)?;
        let request = self
            .request(Method::GET, url)
            .query(&[("user_id", Self::eq(owner_id))]);
        Self::send_for_rows(request, "listing categories").await
    }

    async fn insert_category(&self, draft: &CategoryDraft) -> Result<Category, CoreError> {
        let url = self.table_endpoint(CATEGORIES_TABLE)?;
        let request = self.request(Method::POST, url).json(draft);
        let rows = Self::send_for_rows(request, "inserting category").await?;
        Self::inserted_row(rows, "category insert")
    }

    async fn update_category(
        &self,
        id: &str,
        owner_id: &str,
        patch: &CategoryPatch,
    ) -> Result<(), CoreError> {
        let url = self.table_endpoint(CATEGORIES_TABLE)?;
        let request = self
            .request(Method::PATCH, url)
            .query(&[("id", Self::eq(id)), ("user_id", Self::eq(owner_id))])
            .json(patch);
        Self::send_for_status(request, "updating category").await
    }

    async fn delete_category(&self, id: &str, owner_id: &str) -> Result<(), CoreError> {
        let url = self.table_endpoint(CATEGORIES_TABLE)?;
        let request = self
            .request(Method::DELETE, url)
            .query(&[("id", Self::eq(id)), ("user_id", Self::eq(owner_id))]);
        Self::send_for_status(request, "deleting category").await
    }

    async fn list_blocks(&self, query: &BlockQuery) -> Result<Vec<serde_json::Value>, CoreError> {
        let url = self.table_endpoint(TIME_BLOCKS_TABLE)?;
        let mut request = self
            .request(Method::GET, url)
            .query(&[("user_id", Self::eq(&query.owner_id))]);
        if let Some(category_id) = query.category_id.as_deref() {
            request = request.query(&[("category_id", Self::eq(category_id))]);
        }
        if let Some(ends_after) = query.ends_after {
            request = request.query(&[("end_time", format!("gte.{}", ends_after.to_rfc3339()))]);
        }
        if let Some(starts_before) = query.starts_before {
            request = request.query(&[("start_time", format!("lte.{}", starts_before.to_rfc3339()))]);
        }
        Self::send_for_rows(request, "listing time blocks").await
    }

    async fn insert_block(&self, candidate: &BlockCandidate) -> Result<TimeBlock, CoreError> {
        let url = self.table_endpoint(TIME_BLOCKS_TABLE)?;
        let request = self.request(Method::POST, url).json(candidate);
        let rows = Self::send_for_rows(request, "inserting time block").await?;
        Self::inserted_row(rows, "time block insert")
    }

    async fn update_block(
        &self,
        id: &str,
        owner_id: &str,
        patch: &BlockPatch,
    ) -> Result<(), CoreError> {
        let url = self.table_endpoint(TIME_BLOCKS_TABLE)?;
        let request = self
            .request(Method::PATCH, url)
            .query(&[("id", Self::eq(id)), ("user_id", Self::eq(owner_id))])
            .json(patch);
        Self::send_for_status(request, "updating time block").await
    }

    async fn delete_block(&self, id: &str, owner_id: &str) -> Result<(), CoreError> {
        let url = self.table_endpoint(TIME_BLOCKS_TABLE)?;
        let request = self
            .request(Method::DELETE, url)
            .query(&[("id", Self::eq(id)), ("user_id", Self::eq(owner_id))]);
        Self::send_for_status(request, "deleting time block").await
    }
}
