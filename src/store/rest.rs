//! Supabase PostgREST backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::app::{KeepsakeError, Result};
use crate::domain::{FavoriteRecord, NewFavorite, PropertyId, RecordId, UserId};
use crate::realtime::FAVORITES_TABLE;
use crate::retry::RetryPolicy;
use crate::store::FavoriteStore;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Postgres unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

const RECORD_SELECT: &str = "id,user_id,property_id,created_at";

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

#[derive(Deserialize)]
struct PropertyRow {
    property_id: PropertyId,
}

pub struct RestStore {
    client: Client,
    table_url: Url,
    headers: HeaderMap,
    retry: RetryPolicy,
}

impl RestStore {
    /// `base_url` is the project URL (`https://<ref>.supabase.co`). Requests
    /// authenticate with `access_token` when present, else the anon key.
    pub fn new(
        base_url: &str,
        anon_key: &str,
        access_token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let table_url = Url::parse(base_url)?.join(&format!("rest/v1/{}", FAVORITES_TABLE))?;

        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .user_agent("keepsake/0.1.0")
            .build()?;

        let headers = Self::build_headers(anon_key, access_token.unwrap_or(anon_key))?;

        Ok(Self {
            client,
            table_url,
            headers,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build_headers(anon_key: &str, bearer: &str) -> Result<HeaderMap> {
        let invalid = |e: reqwest::header::InvalidHeaderValue| {
            KeepsakeError::Config(format!("Invalid API credentials: {}", e))
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("apikey"),
            HeaderValue::from_str(anon_key).map_err(invalid)?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", bearer)).map_err(invalid)?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn filtered_url(&self, select: Option<&str>, filters: &[(&str, &str)]) -> Url {
        let mut url = self.table_url.clone();
        {
            let mut query = url.query_pairs_mut();
            if let Some(select) = select {
                query.append_pair("select", select);
            }
            for (column, value) in filters {
                query.append_pair(column, &format!("eq.{}", value));
            }
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &body, None));
        }

        Ok(response.json::<T>().await?)
    }

    async fn delete(&self, url: Url) -> Result<()> {
        let response = self
            .client
            .delete(url)
            .headers(self.headers.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &body, None));
        }
        Ok(())
    }
}

/// Map a failed PostgREST response onto the crate error.
fn classify_error(status: StatusCode, body: &str, property_id: Option<&PropertyId>) -> KeepsakeError {
    let api: ApiError = serde_json::from_str(body).unwrap_or_default();

    if status == StatusCode::CONFLICT || api.code.as_deref() == Some(UNIQUE_VIOLATION) {
        return KeepsakeError::Conflict {
            property_id: property_id.map(|p| p.to_string()).unwrap_or_default(),
        };
    }

    let message = match (api.message, api.details) {
        (Some(m), Some(d)) => format!("{} ({})", m, d),
        (Some(m), None) => m,
        (None, _) if !body.is_empty() => body.to_string(),
        (None, _) => status.canonical_reason().unwrap_or("request failed").to_string(),
    };

    KeepsakeError::Backend {
        status: status.as_u16(),
        code: api.code,
        message,
    }
}

#[async_trait]
impl FavoriteStore for RestStore {
    async fn insert(&self, favorite: &NewFavorite) -> Result<FavoriteRecord> {
        let url = self.filtered_url(Some(RECORD_SELECT), &[]);
        let response = self
            .client
            .post(url)
            .headers(self.headers.clone())
            .header("Prefer", "return=representation")
            .json(favorite)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &body, Some(&favorite.property_id)));
        }

        response
            .json::<Vec<FavoriteRecord>>()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| KeepsakeError::Other("Insert returned no row".into()))
    }

    async fn delete_by_id(&self, user_id: &UserId, id: &RecordId) -> Result<()> {
        let url = self.filtered_url(None, &[("id", id.as_str()), ("user_id", user_id.as_str())]);
        self.retry
            .run("favorite delete", move || self.delete(url.clone()))
            .await
    }

    async fn delete_by_keys(&self, user_id: &UserId, property_id: &PropertyId) -> Result<()> {
        let url = self.filtered_url(
            None,
            &[
                ("user_id", user_id.as_str()),
                ("property_id", property_id.as_str()),
            ],
        );
        self.retry
            .run("favorite delete", move || self.delete(url.clone()))
            .await
    }

    async fn find(
        &self,
        user_id: &UserId,
        property_id: &PropertyId,
    ) -> Result<Option<FavoriteRecord>> {
        let mut url = self.filtered_url(
            Some(RECORD_SELECT),
            &[
                ("user_id", user_id.as_str()),
                ("property_id", property_id.as_str()),
            ],
        );
        url.query_pairs_mut().append_pair("limit", "1");

        let rows: Vec<FavoriteRecord> = self
            .retry
            .run("favorite lookup", move || self.get_json(url.clone()))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn property_ids(&self, user_id: &UserId) -> Result<Vec<PropertyId>> {
        let url = self.filtered_url(Some("property_id"), &[("user_id", user_id.as_str())]);
        let rows: Vec<PropertyRow> = self
            .retry
            .run("favorites fetch", move || self.get_json(url.clone()))
            .await?;
        Ok(rows.into_iter().map(|r| r.property_id).collect())
    }

    async fn list(&self, user_id: &UserId) -> Result<Vec<FavoriteRecord>> {
        let mut url = self.filtered_url(Some(RECORD_SELECT), &[("user_id", user_id.as_str())]);
        url.query_pairs_mut().append_pair("order", "created_at.desc");

        self.retry
            .run("favorites list", move || self.get_json(url.clone()))
            .await
    }
}
