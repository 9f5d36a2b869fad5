use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::IngestClient;
use super::RandomSelector;
use super::SegmentBundle;
use super::StrategySelector;
use super::TableType;
use super::UploadOutcome;
use super::UploadStrategy;
use crate::IngestError;
use crate::Result;

/// Pushes segment bundles into the cluster and reduces the per-bundle
/// outcomes into a single verdict.
///
/// A single bundle is dispatched on the caller's task; more than one bundle
/// fans out to one worker task per bundle. Either way every dispatched unit
/// runs to completion before the aggregate result is reported; there is no
/// cancellation mid-batch.
pub struct SegmentUploadDispatcher {
    client: Arc<dyn IngestClient>,
    selector: Arc<dyn StrategySelector>,
}

impl SegmentUploadDispatcher {
    /// Dispatcher with the default random per-bundle strategy selection.
    pub fn new(client: Arc<dyn IngestClient>) -> Self {
        Self::with_selector(client, Arc::new(RandomSelector))
    }

    pub fn with_selector(client: Arc<dyn IngestClient>, selector: Arc<dyn StrategySelector>) -> Self {
        Self { client, selector }
    }

    /// Uploads every bundle found under `sources` to `table_name`, each via
    /// the strategy the selector picks for it.
    ///
    /// # Errors
    /// - [`IngestError::EmptyBundleSet`] if the sources hold no files
    /// - [`IngestError::UploadFailed`] carrying the first non-success outcome
    ///   observed, raised only after every dispatched upload has completed
    pub async fn upload_segments(&self, table_name: &str, sources: &[PathBuf]) -> Result<()> {
        let bundles = SegmentBundle::from_dirs(sources)?;
        info!(table_name, count = bundles.len(), "uploading segment bundles");

        if bundles.len() == 1 {
            let strategy = self.selector.select(&bundles[0]);
            let outcome = dispatch(Arc::clone(&self.client), table_name, &bundles[0], strategy).await;
            return verify_all_succeeded(vec![outcome]);
        }

        let mut handles = Vec::with_capacity(bundles.len());
        for bundle in bundles {
            let client = Arc::clone(&self.client);
            let strategy = self.selector.select(&bundle);
            let table = table_name.to_string();
            handles.push(tokio::spawn(async move {
                dispatch(client, &table, &bundle, strategy).await
            }));
        }

        // join_all waits for every worker, success or failure, before any
        // outcome is inspected.
        let mut outcomes = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            outcomes.push(joined.map_err(IngestError::TaskFailed)?);
        }
        verify_all_succeeded(outcomes)
    }

    /// Deterministic overload: always direct payload, with an explicit table
    /// type and the parallel-push-protection flag. Never consults the
    /// selector; callers of this path need protection-aware, reproducible
    /// behavior.
    pub async fn upload_segments_with_type(
        &self,
        table_name: &str,
        sources: &[PathBuf],
        table_type: TableType,
        parallel_push_protection: bool,
    ) -> Result<()> {
        let bundles = SegmentBundle::from_dirs(sources)?;
        info!(
            table_name,
            count = bundles.len(),
            %table_type,
            parallel_push_protection,
            "uploading segment bundles (typed)"
        );

        if bundles.len() == 1 {
            let outcome = dispatch_typed(
                Arc::clone(&self.client),
                table_name,
                &bundles[0],
                table_type,
                parallel_push_protection,
            )
            .await;
            return verify_all_succeeded(vec![outcome]);
        }

        let mut handles = Vec::with_capacity(bundles.len());
        for bundle in bundles {
            let client = Arc::clone(&self.client);
            let table = table_name.to_string();
            handles.push(tokio::spawn(async move {
                dispatch_typed(client, &table, &bundle, table_type, parallel_push_protection).await
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            outcomes.push(joined.map_err(IngestError::TaskFailed)?);
        }
        verify_all_succeeded(outcomes)
    }
}

async fn dispatch(
    client: Arc<dyn IngestClient>,
    table_name: &str,
    bundle: &SegmentBundle,
    strategy: UploadStrategy,
) -> UploadOutcome {
    debug!(segment = %bundle.name, ?strategy, "dispatching bundle");
    let result = match strategy {
        UploadStrategy::DirectPayload => match tokio::fs::read(&bundle.path).await {
            Ok(payload) => client.upload_segment(&bundle.name, table_name, payload).await,
            Err(e) => Err(IngestError::Io(e).into()),
        },
        UploadStrategy::MetadataReference => match bundle.download_uri() {
            Ok(uri) => {
                client
                    .upload_segment_metadata(&bundle.name, table_name, uri.as_str())
                    .await
            }
            Err(e) => Err(e),
        },
    };
    into_outcome(bundle, result)
}

async fn dispatch_typed(
    client: Arc<dyn IngestClient>,
    table_name: &str,
    bundle: &SegmentBundle,
    table_type: TableType,
    parallel_push_protection: bool,
) -> UploadOutcome {
    let result = match tokio::fs::read(&bundle.path).await {
        Ok(payload) => {
            client
                .upload_segment_with_options(
                    &bundle.name,
                    table_name,
                    payload,
                    table_type,
                    parallel_push_protection,
                )
                .await
        }
        Err(e) => Err(IngestError::Io(e).into()),
    };
    into_outcome(bundle, result)
}

fn into_outcome(bundle: &SegmentBundle, result: Result<u16>) -> UploadOutcome {
    match result {
        Ok(status) => UploadOutcome::success(bundle.name.clone(), status),
        Err(e) => {
            error!(segment = %bundle.name, "upload transport failure: {e}");
            UploadOutcome::transport_failure(bundle.name.clone(), e.to_string())
        }
    }
}

/// The batch passes only if every outcome carries the success status; the
/// first failure observed is surfaced with its segment and status.
fn verify_all_succeeded(outcomes: Vec<UploadOutcome>) -> Result<()> {
    for outcome in outcomes {
        if !outcome.is_success() {
            return Err(IngestError::UploadFailed {
                segment: outcome.segment,
                status: outcome.status,
                detail: outcome
                    .error
                    .unwrap_or_else(|| "non-success status code".to_string()),
            }
            .into());
        }
    }
    Ok(())
}
