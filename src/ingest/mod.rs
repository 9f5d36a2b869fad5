//! Segment-bundle ingestion: enumeration, upload strategies and the
//! concurrent dispatcher.
//!
//! Two upload protocols exist against the same endpoint: sending the bundle
//! bytes inline ("direct payload") and sending a small metadata request that
//! points at the bundle on local storage by `file://` URI
//! ("metadata reference"). Which one a bundle gets is decided per bundle by a
//! [`StrategySelector`].

mod client;
mod dispatcher;
mod strategy;

pub use client::*;
pub use dispatcher::*;
pub use strategy::*;


use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::IngestError;
use crate::Result;

/// The one status value the upload endpoint returns on success.
pub const STATUS_OK: u16 = 200;

/// Upload endpoint path on the ingestion service.
pub const UPLOAD_SEGMENT_PATH: &str = "/v2/segments";

/// Header carrying the file-reference URI of a metadata upload.
pub const HEADER_DOWNLOAD_URI: &str = "DOWNLOAD_URI";

/// Header discriminating the upload protocol.
pub const HEADER_UPLOAD_TYPE: &str = "UPLOAD_TYPE";

/// [`HEADER_UPLOAD_TYPE`] value for metadata-reference uploads.
pub const UPLOAD_TYPE_METADATA: &str = "METADATA";

pub const PARAM_TABLE_NAME: &str = "tableName";
pub const PARAM_SEGMENT_NAME: &str = "segmentName";
pub const PARAM_TABLE_TYPE: &str = "tableType";
pub const PARAM_PARALLEL_PUSH_PROTECTION: &str = "enableParallelPushProtection";

/// Fixed client-side socket timeout for each individual upload call. A batch
/// has no overall deadline beyond the sum of its units' timeouts.
pub const UPLOAD_SOCKET_TIMEOUT: Duration = Duration::from_millis(600_000);

/// Table-type discriminator carried by the deterministic upload overload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableType {
    Offline,
    Realtime,
}

impl TableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableType::Offline => "OFFLINE",
            TableType::Realtime => "REALTIME",
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One data segment file to ingest. Immutable, read-only input to the
/// dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentBundle {
    pub name: String,
    pub path: PathBuf,
}

impl SegmentBundle {
    pub fn new(path: PathBuf) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| IngestError::InvalidBundlePath { path: path.clone() })?;
        Ok(Self { name, path })
    }

    /// Enumerates every bundle file across the given source directories.
    ///
    /// # Errors
    /// Returns [`IngestError::EmptyBundleSet`] if no files are found:
    /// driving an upload with nothing to upload is a test-setup error.
    pub fn from_dirs(sources: &[PathBuf]) -> Result<Vec<Self>> {
        let mut bundles = Vec::new();
        for dir in sources {
            for entry in std::fs::read_dir(dir).map_err(IngestError::Io)? {
                let path = entry.map_err(IngestError::Io)?.path();
                if path.is_file() {
                    bundles.push(Self::new(path)?);
                }
            }
        }
        if bundles.is_empty() {
            return Err(IngestError::EmptyBundleSet {
                sources: sources
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            }
            .into());
        }
        bundles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(bundles)
    }

    /// `file://` reference to this bundle, built from its absolute path.
    pub fn download_uri(&self) -> Result<url::Url> {
        let absolute = canonical(&self.path)?;
        url::Url::from_file_path(&absolute).map_err(|_| {
            IngestError::InvalidBundlePath {
                path: self.path.clone(),
            }
            .into()
        })
    }
}

fn canonical(path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|_| {
        IngestError::InvalidBundlePath {
            path: path.to_path_buf(),
        }
        .into()
    })
}

/// Result of one bundle's upload attempt.
///
/// Transport-level failures carry status `0` plus the error text; the upload
/// endpoint never returns `0` itself.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub segment: String,
    pub status: u16,
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn success(segment: String, status: u16) -> Self {
        Self {
            segment,
            status,
            error: None,
        }
    }

    pub fn transport_failure(segment: String, detail: String) -> Self {
        Self {
            segment,
            status: 0,
            error: Some(detail),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }
}
