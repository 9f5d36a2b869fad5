use std::sync::Arc;

use pylon_harness::ClientError;
use pylon_harness::Error;
use pylon_harness::FixedSelector;
use pylon_harness::HttpIngestClient;
use pylon_harness::QueryClient;
use pylon_harness::SegmentUploadDispatcher;
use pylon_harness::UploadStrategy;

use crate::common::write_segment_bundles;
use crate::common::StubPlatform;
use crate::common::FIXTURE_ROWS_PER_BUNDLE;
use crate::enable_logger;

async fn ingest_one_bundle(platform: &StubPlatform) {
    let bundle_dir = tempfile::tempdir().unwrap();
    write_segment_bundles(bundle_dir.path(), &["seg_0"]);
    let client = HttpIngestClient::new("localhost", platform.port()).unwrap();
    SegmentUploadDispatcher::with_selector(
        Arc::new(client),
        Arc::new(FixedSelector(UploadStrategy::DirectPayload)),
    )
    .upload_segments("events", &[bundle_dir.path().to_path_buf()])
    .await
    .unwrap();
}

#[tokio::test]
async fn count_query_reflects_ingested_rows() {
    enable_logger();
    let platform = StubPlatform::start().await;
    ingest_one_bundle(&platform).await;

    let client = QueryClient::new(&platform.base_url()).unwrap();
    let response = client.post_query("SELECT COUNT(*) FROM events").await.unwrap();

    let count = response["resultTable"]["rows"][0][0].as_u64().unwrap();
    assert_eq!(count as usize, FIXTURE_ROWS_PER_BUNDLE);
    platform.shutdown().await;
}

#[tokio::test]
async fn queries_accept_extra_headers() {
    enable_logger();
    let platform = StubPlatform::start().await;
    ingest_one_bundle(&platform).await;

    let client = QueryClient::new(&platform.base_url()).unwrap();
    let response = client
        .post_query_with_headers(
            "SELECT COUNT(*) FROM events",
            &[("Authorization", "Bearer test-token")],
        )
        .await
        .unwrap();
    assert!(response["resultTable"]["rows"][0][0].is_u64());
    platform.shutdown().await;
}

#[tokio::test]
async fn one_shot_query_works_against_any_base_url() {
    enable_logger();
    let platform = StubPlatform::start().await;
    ingest_one_bundle(&platform).await;

    let response = pylon_harness::post_query_to(
        &platform.base_url(),
        "SELECT COUNT(*) FROM events",
        &[],
    )
    .await
    .unwrap();
    assert_eq!(
        response["resultTable"]["rows"][0][0].as_u64().unwrap() as usize,
        FIXTURE_ROWS_PER_BUNDLE
    );
    platform.shutdown().await;
}

#[tokio::test]
async fn debug_endpoint_lists_ingested_segments() {
    enable_logger();
    let platform = StubPlatform::start().await;
    ingest_one_bundle(&platform).await;

    let client = QueryClient::new(&platform.base_url()).unwrap();
    let body = client.get_debug_info("/debug/segments").await.unwrap();
    assert!(body.contains("seg_0"));
    platform.shutdown().await;
}

#[tokio::test]
async fn unknown_debug_path_is_an_unexpected_status() {
    enable_logger();
    let platform = StubPlatform::start().await;

    let client = QueryClient::new(&platform.base_url()).unwrap();
    let err = client.get_debug_info("/debug/nope").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Client(ClientError::UnexpectedStatus { status: 404 })
    ));
    platform.shutdown().await;
}

#[tokio::test]
async fn unreachable_router_is_a_transport_error() {
    enable_logger();
    let client = QueryClient::new("http://localhost:1").unwrap();
    let err = client.post_query("SELECT 1").await.unwrap_err();
    assert!(matches!(err, Error::Client(ClientError::Http(_))));
}
