use std::collections::HashMap;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use pylon_harness::HarnessConfig;
use pylon_harness::Result;
use pylon_harness::RoleConfig;
use pylon_harness::RoleLauncher;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::Filter;

pub const WAIT_FOR_READY_IN_SEC: u64 = 5;

/// Rows per bundle written by [`write_segment_bundles`].
pub const FIXTURE_ROWS_PER_BUNDLE: usize = 10;

#[derive(Default)]
struct PlatformState {
    segments: Vec<String>,
    tables: HashSet<String>,
    rows: usize,
    fail_segments: HashSet<String>,
}

/// Shared, inspectable state behind the stub platform endpoints.
#[derive(Clone, Default)]
pub struct PlatformStateHandle(Arc<Mutex<PlatformState>>);

impl PlatformStateHandle {
    pub fn rows(&self) -> usize {
        self.0.lock().unwrap().rows
    }

    pub fn segments(&self) -> Vec<String> {
        self.0.lock().unwrap().segments.clone()
    }

    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.0.lock().unwrap().tables.iter().cloned().collect();
        tables.sort();
        tables
    }

    /// Makes the endpoints answer uploads of `segment` with a server error.
    pub fn fail_segment(&self, segment: &str) {
        self.0
            .lock()
            .unwrap()
            .fail_segments
            .insert(segment.to_string());
    }
}

/// Stand-in for the platform's ingestion and query endpoints.
///
/// `/v2/segments` accepts both upload protocols: inline payloads are counted
/// directly, metadata references are resolved through their `file://` URI and
/// read from disk. `/query/sql` answers any query with the total ingested row
/// count so count assertions line up with uploads.
fn platform_routes(
    state: PlatformStateHandle,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone + Send + Sync + 'static
{
    let upload_state = state.clone();
    let upload = warp::path("v2")
        .and(warp::path("segments"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::header::optional::<String>("UPLOAD_TYPE"))
        .and(warp::header::optional::<String>("DOWNLOAD_URI"))
        .and(warp::body::bytes())
        .map(
            move |params: HashMap<String, String>,
                  upload_type: Option<String>,
                  download_uri: Option<String>,
                  body: Bytes| {
                let segment = params.get("segmentName").cloned().unwrap_or_default();
                let table = params.get("tableName").cloned().unwrap_or_default();

                let mut state = upload_state.0.lock().unwrap();
                if state.fail_segments.contains(&segment) {
                    return warp::reply::with_status(
                        warp::reply::json(&json!({"error": "rejected by test"})),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    );
                }

                let rows = if upload_type.as_deref() == Some("METADATA") {
                    let uri = download_uri.unwrap_or_default();
                    let path = uri.strip_prefix("file://").unwrap_or(&uri);
                    match std::fs::read_to_string(path) {
                        Ok(content) => count_rows(content.as_bytes()),
                        Err(_) => {
                            return warp::reply::with_status(
                                warp::reply::json(&json!({"error": "bad download uri"})),
                                StatusCode::BAD_REQUEST,
                            );
                        }
                    }
                } else {
                    count_rows(&body)
                };

                state.segments.push(segment);
                state.tables.insert(table);
                state.rows += rows;
                warp::reply::with_status(
                    warp::reply::json(&json!({"status": "ok"})),
                    StatusCode::OK,
                )
            },
        );

    let query_state = state.clone();
    let query = warp::path("query")
        .and(warp::path("sql"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .map(move |request: serde_json::Value| {
            assert!(request.get("sql").is_some(), "query request carries no sql");
            let state = query_state.0.lock().unwrap();
            warp::reply::json(&json!({
                "resultTable": {
                    "dataSchema": {
                        "columnNames": ["count(*)"],
                        "columnDataTypes": ["LONG"],
                    },
                    "rows": [[state.rows]],
                },
                "numSegmentsQueried": state.segments.len(),
            }))
        });

    let debug_state = state;
    let debug = warp::path("debug")
        .and(warp::path("segments"))
        .and(warp::path::end())
        .and(warp::get())
        .map(move || {
            let segments = debug_state.0.lock().unwrap().segments.clone();
            warp::reply::json(&json!({"segments": segments}))
        });

    upload.or(query).or(debug)
}

/// Standalone stub platform on an ephemeral port, for tests that drive the
/// clients directly without a managed cluster.
pub struct StubPlatform {
    port: u16,
    pub state: PlatformStateHandle,
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<()>,
}

impl StubPlatform {
    pub async fn start() -> Self {
        let state = PlatformStateHandle::default();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(());

        let bind_addr: SocketAddr = ([127, 0, 0, 1], 0).into();
        let (addr, server) = warp::serve(platform_routes(state.clone()))
            .bind_with_graceful_shutdown(bind_addr, async move {
                let _ = shutdown_rx.changed().await;
            });
        let handle = tokio::spawn(server);

        Self {
            port: addr.port(),
            state,
            shutdown_tx,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }
}

/// Launcher that serves the stub platform endpoints on each instance's admin
/// port, so a managed cluster is reachable over real HTTP.
pub struct StubRoleLauncher {
    state: PlatformStateHandle,
}

impl StubRoleLauncher {
    pub fn new(state: PlatformStateHandle) -> Self {
        Self { state }
    }
}

#[async_trait]
impl RoleLauncher for StubRoleLauncher {
    async fn launch(
        &self,
        config: RoleConfig,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<JoinHandle<Result<()>>> {
        let bind_addr: SocketAddr = ([127, 0, 0, 1], config.ports.admin).into();
        let (_, server) = warp::serve(platform_routes(self.state.clone()))
            .bind_with_graceful_shutdown(bind_addr, async move {
                let _ = shutdown.changed().await;
            });
        Ok(tokio::spawn(async move {
            server.await;
            Ok(())
        }))
    }
}

fn count_rows(content: &[u8]) -> usize {
    content.split(|b| *b == b'\n').filter(|line| !line.is_empty()).count()
}

/// Validated harness configuration rooted in `work_dir` with every role's
/// port bases spread out from `port_base` so concurrent tests do not collide.
pub fn harness_config(work_dir: &Path, port_base: u16) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.work_dir = work_dir.to_path_buf();
    config.cluster_name = "PylonTestCluster".to_string();

    config.router.admin_port_base = port_base;
    config.router.data_port_base = port_base + 100;
    config.router.rpc_port_base = port_base + 200;
    config.storage.admin_port_base = port_base + 300;
    config.storage.data_port_base = port_base + 400;
    config.storage.rpc_port_base = port_base + 500;
    config.task_runner.admin_port_base = port_base + 600;
    config.task_runner.data_port_base = port_base + 700;
    config.task_runner.rpc_port_base = port_base + 800;

    config.validate().unwrap()
}

/// Writes one bundle file per name, each holding
/// [`FIXTURE_ROWS_PER_BUNDLE`] newline-separated records.
pub fn write_segment_bundles(dir: &Path, names: &[&str]) {
    for name in names {
        let content: String = (0..FIXTURE_ROWS_PER_BUNDLE)
            .map(|i| format!("{name},{i}\n"))
            .collect();
        std::fs::write(dir.join(name), content).unwrap();
    }
}
