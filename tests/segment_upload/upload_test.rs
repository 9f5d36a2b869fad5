use std::sync::Arc;

use pylon_harness::Error;
use pylon_harness::FixedSelector;
use pylon_harness::HttpIngestClient;
use pylon_harness::IngestError;
use pylon_harness::SegmentUploadDispatcher;
use pylon_harness::TableType;
use pylon_harness::UploadStrategy;

use crate::common::write_segment_bundles;
use crate::common::StubPlatform;
use crate::common::FIXTURE_ROWS_PER_BUNDLE;
use crate::enable_logger;

fn dispatcher_for(platform: &StubPlatform, strategy: UploadStrategy) -> SegmentUploadDispatcher {
    let client = HttpIngestClient::new("localhost", platform.port()).unwrap();
    SegmentUploadDispatcher::with_selector(Arc::new(client), Arc::new(FixedSelector(strategy)))
}

#[tokio::test]
async fn direct_uploads_land_every_row() {
    enable_logger();
    let platform = StubPlatform::start().await;
    let bundle_dir = tempfile::tempdir().unwrap();
    write_segment_bundles(bundle_dir.path(), &["seg_0", "seg_1", "seg_2"]);

    dispatcher_for(&platform, UploadStrategy::DirectPayload)
        .upload_segments("events", &[bundle_dir.path().to_path_buf()])
        .await
        .unwrap();

    assert_eq!(platform.state.rows(), 3 * FIXTURE_ROWS_PER_BUNDLE);
    let mut segments = platform.state.segments();
    segments.sort();
    assert_eq!(segments, vec!["seg_0", "seg_1", "seg_2"]);
    platform.shutdown().await;
}

#[tokio::test]
async fn metadata_uploads_are_fetched_through_their_file_uri() {
    enable_logger();
    let platform = StubPlatform::start().await;
    let bundle_dir = tempfile::tempdir().unwrap();
    write_segment_bundles(bundle_dir.path(), &["seg_0", "seg_1"]);

    dispatcher_for(&platform, UploadStrategy::MetadataReference)
        .upload_segments("events", &[bundle_dir.path().to_path_buf()])
        .await
        .unwrap();

    // The endpoint read the bundle contents from disk, not from the request.
    assert_eq!(platform.state.rows(), 2 * FIXTURE_ROWS_PER_BUNDLE);
    platform.shutdown().await;
}

#[tokio::test]
async fn default_dispatcher_mixes_strategies_without_losing_rows() {
    enable_logger();
    let platform = StubPlatform::start().await;
    let bundle_dir = tempfile::tempdir().unwrap();
    let names: Vec<String> = (0..8).map(|i| format!("seg_{i}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    write_segment_bundles(bundle_dir.path(), &name_refs);

    let client = HttpIngestClient::new("localhost", platform.port()).unwrap();
    SegmentUploadDispatcher::new(Arc::new(client))
        .upload_segments("events", &[bundle_dir.path().to_path_buf()])
        .await
        .unwrap();

    assert_eq!(platform.state.rows(), 8 * FIXTURE_ROWS_PER_BUNDLE);
    platform.shutdown().await;
}

#[tokio::test]
async fn rejected_segment_fails_the_batch_with_its_status() {
    enable_logger();
    let platform = StubPlatform::start().await;
    platform.state.fail_segment("seg_1");
    let bundle_dir = tempfile::tempdir().unwrap();
    write_segment_bundles(bundle_dir.path(), &["seg_0", "seg_1", "seg_2"]);

    let err = dispatcher_for(&platform, UploadStrategy::DirectPayload)
        .upload_segments("events", &[bundle_dir.path().to_path_buf()])
        .await
        .unwrap_err();

    match err {
        Error::Ingest(IngestError::UploadFailed { segment, status, .. }) => {
            assert_eq!(segment, "seg_1");
            assert_eq!(status, 500);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    platform.shutdown().await;
}

#[tokio::test]
async fn typed_upload_reaches_the_endpoint_with_its_table() {
    enable_logger();
    let platform = StubPlatform::start().await;
    let bundle_dir = tempfile::tempdir().unwrap();
    write_segment_bundles(bundle_dir.path(), &["seg_0"]);

    dispatcher_for(&platform, UploadStrategy::DirectPayload)
        .upload_segments_with_type(
            "events",
            &[bundle_dir.path().to_path_buf()],
            TableType::Offline,
            true,
        )
        .await
        .unwrap();

    assert_eq!(platform.state.tables(), vec!["events"]);
    assert_eq!(platform.state.rows(), FIXTURE_ROWS_PER_BUNDLE);
    platform.shutdown().await;
}
