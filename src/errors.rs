//! Harness Error Hierarchy
//!
//! Defines error types for the cluster orchestration and ingestion harness,
//! categorized by subsystem. The harness never retries: every error here is
//! surfaced to the driving test as-is.

use std::path::PathBuf;

use tokio::task::JoinError;

use crate::cluster::RoleKind;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Instance bring-up, teardown and restart failures
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Segment bundle enumeration and upload failures
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// Query and debug endpoint client failures
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Record decoding failures (unrecoverable per call)
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Harness configuration loading failures
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    /// Harness configuration validation failures
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unrecoverable failures requiring test termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// Dynamic port allocation exhausted its search window
    #[error(transparent)]
    Port(#[from] PortError),

    /// Precondition: stop/restart/accessor called on a role never started
    #[error("Role {role} has no running instances")]
    RoleNotStarted { role: RoleKind },

    /// Singleton violation: the task-runner role context is process-global
    #[error("A task-runner instance is already running in this process")]
    TaskRunnerAlreadyRunning,

    /// Instance failed to come up (fatal to the bring-up attempt)
    #[error("{role} instance {instance_id} failed to start: {reason}")]
    StartFailed {
        role: RoleKind,
        instance_id: u32,
        reason: String,
    },

    /// Shutdown signal receiver already dropped
    #[error("Failed to signal shutdown to {role} instance {instance_id}")]
    ShutdownSignal { role: RoleKind, instance_id: u32 },

    /// Instance background task panicked or was aborted
    #[error("Instance task failed: {0}")]
    TaskFailed(#[from] JoinError),

    /// Directory creation/removal failures
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// Bounded linear search found no open port
    #[error("No open port found within {attempts} ports at or above {preferred}")]
    Exhausted { preferred: u16, attempts: u16 },
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Precondition: the bundle sources contained no files
    #[error("No segment bundles found under {sources}")]
    EmptyBundleSet { sources: String },

    /// One bundle of a batch came back with a non-success status
    #[error("Upload of segment {segment} failed with status {status}: {detail}")]
    UploadFailed {
        segment: String,
        status: u16,
        detail: String,
    },

    /// Bundle path could not be turned into a file-reference URI
    #[error("Not a valid bundle path: {path}")]
    InvalidBundlePath { path: PathBuf },

    /// HTTP transport failures on the upload endpoint
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Upload worker task panicked or was aborted
    #[error("Upload task failed: {0}")]
    TaskFailed(#[from] JoinError),

    /// Bundle enumeration / read failures
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Query endpoint answered outside the 2xx range
    #[error("Query endpoint returned unexpected status {status}")]
    UnexpectedStatus { status: u16 },

    /// HTTP transport failures on the query/debug endpoints
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Response body was not parseable JSON
    #[error("Failed to parse response body as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Schema header could not be read from the sample file
    #[error("Failed to load schema header from {path}")]
    SchemaLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Schema header framing is broken
    #[error("Malformed schema header: {0}")]
    MalformedHeader(String),

    /// Schema header is not valid JSON
    #[error("Schema header is not valid JSON: {0}")]
    SchemaJson(#[from] serde_json::Error),

    /// Requested projection field missing from the loaded schema
    #[error("Field {0} not present in schema")]
    UnknownField(String),

    /// decode() called with a slice outside the payload
    #[error("Record slice out of bounds (offset {offset}, length {length}, payload {payload_len})")]
    OutOfBounds {
        offset: usize,
        length: usize,
        payload_len: usize,
    },

    /// Record value count disagrees with the loaded schema
    #[error("Record has {actual} values but schema defines {expected} fields")]
    FieldCountMismatch { expected: usize, actual: usize },

    /// Decoded value does not match the declared field type
    #[error("Value for field {field} does not match declared type")]
    TypeMismatch { field: String },

    /// Binary record body decoding failures
    #[error(transparent)]
    Record(#[from] bincode::Error),
}

// ============== Conversion Implementations ============== //
impl From<PortError> for Error {
    fn from(e: PortError) -> Self {
        Error::Lifecycle(LifecycleError::Port(e))
    }
}

impl From<JoinError> for Error {
    fn from(e: JoinError) -> Self {
        Error::Lifecycle(LifecycleError::TaskFailed(e))
    }
}
