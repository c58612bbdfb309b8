//! Wellness API client.
//!
//! One GET per window against `/wellness-api/rest/{dataset}`. The primary
//! query mode filters by upload time, the fallback mode by summary time;
//! both describe the same range in different parameter vocabularies.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use serde_json::Value;
use wellsync_core::health::DatasetKey;
use wellsync_core::sync::{
    QueryMode, SyncWindow, UpstreamCallError, UpstreamCredential, WellnessUpstream,
};

use crate::error::{Result, WellnessApiError};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

pub const DEFAULT_BASE_URL: &str = "https://apis.garmin.com";
pub const PERMISSIONS_PATH: &str = "/wellness-api/rest/user/permissions";
const PERMISSIONS_SOURCE: &str = "permissions";

/// Start/end parameter names for a query mode.
fn time_range_params(mode: QueryMode) -> (&'static str, &'static str) {
    match mode {
        QueryMode::Primary => ("uploadStartTimeInSeconds", "uploadEndTimeInSeconds"),
        QueryMode::Fallback => ("summaryStartTimeInSeconds", "summaryEndTimeInSeconds"),
    }
}

/// Permissions come back as a bare array; some deployments wrap it.
#[derive(Deserialize)]
#[serde(untagged)]
enum PermissionsBody {
    List(Vec<String>),
    Wrapped { permissions: Vec<String> },
}

/// JSON array rows from a success body. Empty, non-JSON and non-array
/// bodies yield no rows.
fn parse_rows(path: &str, body: &str) -> Vec<Value> {
    if body.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(rows)) => rows,
        Ok(_) => {
            debug!("[WellnessApi] {} returned a non-array body, treating as empty", path);
            Vec::new()
        }
        Err(e) => {
            warn!("[WellnessApi] {} returned unparseable JSON: {}", path, e);
            Vec::new()
        }
    }
}

/// Client for the wearable vendor's wellness REST API.
#[derive(Debug, Clone)]
pub struct WellnessApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl WellnessApiClient {
    fn log_response(path: &str, status: reqwest::StatusCode, body: &str) {
        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        if status.is_success() {
            debug!(
                "[WellnessApi] {} -> {} ({} bytes)",
                path,
                status,
                body.len()
            );
        } else {
            debug!("[WellnessApi] {} -> {}: {}", path, status, preview);
        }
    }

    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root, e.g. "https://apis.garmin.com". A trailing
    ///   slash is ignored.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self, token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| WellnessApiError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        Ok(headers)
    }

    /// GET `path` and return the raw body of a success response.
    async fn get_body(
        &self,
        token: &str,
        path: &str,
        dataset_source: &str,
        query: &[(&str, i64)],
    ) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        debug!("[WellnessApi] GET {} {:?}", path, query);

        let response = self
            .client
            .get(&url)
            .headers(self.headers(token)?)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        Self::log_response(path, status, &body);

        if !status.is_success() {
            return Err(WellnessApiError::api(
                status.as_u16(),
                path,
                dataset_source,
                body,
            ));
        }
        Ok(body)
    }

    /// Rows of `dataset` for one window in the window's query mode.
    pub async fn get_dataset_window(
        &self,
        token: &str,
        dataset: DatasetKey,
        window: &SyncWindow,
    ) -> Result<Vec<Value>> {
        let path = dataset.path();
        let (start_param, end_param) = time_range_params(window.mode);
        let body = self
            .get_body(
                token,
                &path,
                dataset.as_str(),
                &[
                    (start_param, window.start_epoch_seconds),
                    (end_param, window.end_epoch_seconds),
                ],
            )
            .await?;
        Ok(parse_rows(&path, &body))
    }

    /// Permission scopes granted to `token`.
    pub async fn get_permissions(&self, token: &str) -> Result<Vec<String>> {
        let body = self
            .get_body(token, PERMISSIONS_PATH, PERMISSIONS_SOURCE, &[])
            .await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let permissions = match serde_json::from_str::<PermissionsBody>(&body)? {
            PermissionsBody::List(list) => list,
            PermissionsBody::Wrapped { permissions } => permissions,
        };
        Ok(permissions)
    }
}

#[async_trait]
impl WellnessUpstream for WellnessApiClient {
    async fn fetch_window(
        &self,
        credential: &UpstreamCredential,
        dataset: DatasetKey,
        window: &SyncWindow,
    ) -> std::result::Result<Vec<Value>, UpstreamCallError> {
        self.get_dataset_window(credential.token(), dataset, window)
            .await
            .map_err(UpstreamCallError::from)
    }

    async fn fetch_permissions(
        &self,
        token: &str,
    ) -> std::result::Result<Vec<String>, UpstreamCallError> {
        self.get_permissions(token)
            .await
            .map_err(UpstreamCallError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_use_distinct_parameter_vocabularies() {
        assert_eq!(
            time_range_params(QueryMode::Primary),
            ("uploadStartTimeInSeconds", "uploadEndTimeInSeconds")
        );
        assert_eq!(
            time_range_params(QueryMode::Fallback),
            ("summaryStartTimeInSeconds", "summaryEndTimeInSeconds")
        );
    }

    #[test]
    fn non_array_bodies_parse_as_empty() {
        assert!(parse_rows("/p", "").is_empty());
        assert!(parse_rows("/p", "  \n").is_empty());
        assert!(parse_rows("/p", "{\"items\":[]}").is_empty());
        assert!(parse_rows("/p", "not json").is_empty());
        assert_eq!(parse_rows("/p", "[{\"a\":1},{\"b\":2}]").len(), 2);
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = WellnessApiClient::new("https://example.test/").unwrap();
        assert_eq!(client.base_url(), "https://example.test");
    }
}
