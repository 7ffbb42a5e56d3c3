//! Common test utilities for API tests.
//!
//! The fixture builds the real router over SQLite stores in a temp dir, with
//! an execution worker running the deterministic solver.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tower::ServiceExt;

use lottery_core::{
    create_execution_pipeline, AuditService, Config, DatabaseConfig, DeterministicSolver,
    ExecutionService, LotteryEvents, LotteryId, LotteryOrchestrator, LotteryStore,
    SqliteAuditStore, SqliteLotteryStore,
};

/// Re-export fixtures for test convenience
pub use lottery_core::testing::fixtures;

pub struct TestFixture {
    pub router: Router,
    /// Store for seeding projects and checking assignments
    pub store: Arc<SqliteLotteryStore>,
    shutdown_tx: broadcast::Sender<()>,
    _temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            ..Default::default()
        };

        let store = Arc::new(
            SqliteLotteryStore::new(&db_path).expect("Failed to create lottery store"),
        );
        let audit = AuditService::new(Arc::new(
            SqliteAuditStore::new(&db_path).expect("Failed to create audit store"),
        ));

        let orchestrator = Arc::new(LotteryOrchestrator::new(
            Arc::new(DeterministicSolver),
            audit.clone(),
            store.clone(),
            LotteryEvents::default(),
        ));
        let base = ExecutionService::new(store.clone(), audit.clone());
        let (handle, worker) = create_execution_pipeline(4, orchestrator, base.clone());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(worker.run(shutdown_rx));

        let state = Arc::new(lottery_server::state::AppState::new(
            config,
            base.with_dispatcher(handle, false),
            audit,
        ));
        let router = lottery_server::api::create_router(state);

        Self {
            router,
            store,
            shutdown_tx,
            _temp_dir: temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Wait until the worker has settled the lottery.
    pub async fn wait_for_executed(&self, lottery_id: LotteryId) {
        for _ in 0..500 {
            let lottery = self.store.lottery(lottery_id).unwrap().unwrap();
            if lottery.is_executed() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("lottery {} was never executed", lottery_id);
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

impl Drop for TestFixture {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
