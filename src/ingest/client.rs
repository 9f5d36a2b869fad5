use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use super::TableType;
use super::HEADER_DOWNLOAD_URI;
use super::HEADER_UPLOAD_TYPE;
use super::PARAM_PARALLEL_PUSH_PROTECTION;
use super::PARAM_SEGMENT_NAME;
use super::PARAM_TABLE_NAME;
use super::PARAM_TABLE_TYPE;
use super::UPLOAD_SEGMENT_PATH;
use super::UPLOAD_SOCKET_TIMEOUT;
use super::UPLOAD_TYPE_METADATA;
use crate::IngestError;
use crate::Result;

/// Client side of the upload endpoint (external collaborator).
///
/// Implementations return the raw numeric status code; interpreting it is the
/// dispatcher's job.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IngestClient: Send + Sync + 'static {
    /// Direct payload: bundle bytes inline, tagged with the target table.
    async fn upload_segment(
        &self,
        segment_name: &str,
        table_name: &str,
        payload: Vec<u8>,
    ) -> Result<u16>;

    /// Metadata reference: no bytes, only a `file://` URI the service fetches
    /// from, with the upload-type marker set to metadata.
    async fn upload_segment_metadata(
        &self,
        segment_name: &str,
        table_name: &str,
        download_uri: &str,
    ) -> Result<u16>;

    /// Direct payload with explicit table type and parallel-push-protection
    /// flag (the deterministic dispatcher overload).
    async fn upload_segment_with_options(
        &self,
        segment_name: &str,
        table_name: &str,
        payload: Vec<u8>,
        table_type: TableType,
        parallel_push_protection: bool,
    ) -> Result<u16>;
}

/// HTTP implementation of [`IngestClient`] with a fixed socket timeout per
/// call.
pub struct HttpIngestClient {
    http: reqwest::Client,
    upload_url: String,
}

impl HttpIngestClient {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(UPLOAD_SOCKET_TIMEOUT)
            .build()
            .map_err(IngestError::Http)?;
        Ok(Self {
            http,
            upload_url: format!("http://{host}:{port}{UPLOAD_SEGMENT_PATH}"),
        })
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }
}

#[async_trait]
impl IngestClient for HttpIngestClient {
    async fn upload_segment(
        &self,
        segment_name: &str,
        table_name: &str,
        payload: Vec<u8>,
    ) -> Result<u16> {
        debug!(segment_name, table_name, bytes = payload.len(), "direct payload upload");
        let response = self
            .http
            .post(&self.upload_url)
            .query(&[
                (PARAM_SEGMENT_NAME, segment_name),
                (PARAM_TABLE_NAME, table_name),
            ])
            .body(payload)
            .send()
            .await
            .map_err(IngestError::Http)?;
        Ok(response.status().as_u16())
    }

    async fn upload_segment_metadata(
        &self,
        segment_name: &str,
        table_name: &str,
        download_uri: &str,
    ) -> Result<u16> {
        debug!(segment_name, table_name, download_uri, "metadata-reference upload");
        let response = self
            .http
            .post(&self.upload_url)
            .header(HEADER_DOWNLOAD_URI, download_uri)
            .header(HEADER_UPLOAD_TYPE, UPLOAD_TYPE_METADATA)
            .query(&[
                (PARAM_SEGMENT_NAME, segment_name),
                (PARAM_TABLE_NAME, table_name),
            ])
            .send()
            .await
            .map_err(IngestError::Http)?;
        Ok(response.status().as_u16())
    }

    async fn upload_segment_with_options(
        &self,
        segment_name: &str,
        table_name: &str,
        payload: Vec<u8>,
        table_type: TableType,
        parallel_push_protection: bool,
    ) -> Result<u16> {
        debug!(
            segment_name,
            table_name,
            %table_type,
            parallel_push_protection,
            "typed direct payload upload"
        );
        let response = self
            .http
            .post(&self.upload_url)
            .query(&[
                (PARAM_SEGMENT_NAME, segment_name),
                (PARAM_TABLE_NAME, table_name),
                (PARAM_TABLE_TYPE, table_type.as_str()),
                (
                    PARAM_PARALLEL_PUSH_PROTECTION,
                    if parallel_push_protection { "true" } else { "false" },
                ),
            ])
            .body(payload)
            .send()
            .await
            .map_err(IngestError::Http)?;
        Ok(response.status().as_u16())
    }
}
