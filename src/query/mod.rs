//! SQL query and debug-endpoint client for the router role.
//!
//! Thin JSON-over-HTTP wrapper: the harness drives assertions with it and
//! never interprets result sets beyond parsing them into [`serde_json::Value`].

use std::time::Duration;

use serde_json::json;
use serde_json::Value;
use tracing::debug;

use crate::ClientError;
use crate::Result;

/// Query endpoint path on the router.
pub const QUERY_PATH: &str = "/query/sql";

/// Options sent with every query unless the caller overrides them.
pub const DEFAULT_QUERY_OPTIONS: &str = "groupByMode=sql;responseFormat=sql";

/// Fixed client-side socket timeout for each query call.
pub const QUERY_SOCKET_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Client bound to one router's base URL.
pub struct QueryClient {
    http: reqwest::Client,
    base_url: String,
}

impl QueryClient {
    /// `base_url` is scheme + authority, e.g. `http://localhost:18099`.
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(QUERY_SOCKET_TIMEOUT)
            .build()
            .map_err(ClientError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Posts `sql` with the default query options and parses the JSON reply.
    pub async fn post_query(&self, sql: &str) -> Result<Value> {
        self.post_query_with_headers(sql, &[]).await
    }

    /// Same as [`post_query`](Self::post_query) with extra request headers,
    /// e.g. auth tokens.
    pub async fn post_query_with_headers(
        &self,
        sql: &str,
        headers: &[(&str, &str)],
    ) -> Result<Value> {
        let url = format!("{}{QUERY_PATH}", self.base_url);
        debug!(sql, url, "posting query");

        let mut request = self.http.post(&url).json(&json!({
            "sql": sql,
            "queryOptions": DEFAULT_QUERY_OPTIONS,
        }));
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(ClientError::Http)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::UnexpectedStatus {
                status: status.as_u16(),
            }
            .into());
        }
        let body = response.text().await.map_err(ClientError::Http)?;
        Ok(serde_json::from_str(&body).map_err(ClientError::Json)?)
    }

    /// GET against a debug/inspection path on the same router, returning the
    /// raw body. Non-2xx is an error just like for queries.
    pub async fn get_debug_info(&self, path: &str) -> Result<String> {
        let url = format!("{}{path}", self.base_url);
        debug!(url, "fetching debug info");

        let response = self.http.get(&url).send().await.map_err(ClientError::Http)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::UnexpectedStatus {
                status: status.as_u16(),
            }
            .into());
        }
        Ok(response.text().await.map_err(ClientError::Http)?)
    }
}

/// One-shot query against an arbitrary router URL, for callers that do not
/// hold a [`QueryClient`].
pub async fn post_query_to(
    base_url: &str,
    sql: &str,
    headers: &[(&str, &str)],
) -> Result<Value> {
    QueryClient::new(base_url)?
        .post_query_with_headers(sql, headers)
        .await
}
