//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with a mock novel source injected, so the full HTTP surface can be
//! exercised without network access.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use atlas_core::{
    create_progress_tracker, testing::MockSource, ChapterFetchCoordinator, Config, DatabaseConfig,
    LibraryManager, LibraryStore, NovelSource, ServerConfig, SourceRegistry, SqliteLibraryStore,
};
use atlas_server::api::WsBroadcaster;
use atlas_server::state::AppState;

/// Re-export fixtures for test convenience
pub use atlas_core::testing::fixtures;

/// Name of the mock source registered by the fixture.
pub const MOCK_SOURCE: &str = "Mock";

/// Test fixture for API testing with a mock source.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_add_to_library() {
///     let fixture = TestFixture::new().await;
///     let novel = fixture.add_source_novel("Shadow Slave", 5).await;
///
///     let response = fixture.post("/api/v1/library", serde_json::to_value(&novel).unwrap()).await;
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock source - configure search results, chapter lists and bodies
    pub source: Arc<MockSource>,
    /// The store behind the router, for direct assertions
    pub store: Arc<dyn LibraryStore>,
    /// Temporary directory holding the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with a short progress debounce.
    pub async fn new() -> Self {
        Self::with_debounce(Duration::from_millis(50)).await
    }

    /// Create a test fixture with a custom progress debounce.
    pub async fn with_debounce(debounce: Duration) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let source = Arc::new(MockSource::new(MOCK_SOURCE));

        let mut config = Config {
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
            },
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            ..Default::default()
        };
        config.reader.progress_debounce_ms = debounce.as_millis() as u64;

        let store: Arc<dyn LibraryStore> =
            Arc::new(SqliteLibraryStore::new(&db_path).expect("Failed to create library store"));

        let registry =
            SourceRegistry::new(vec![Arc::clone(&source) as Arc<dyn NovelSource>]);
        let library = Arc::new(LibraryManager::new(Arc::clone(&store), registry));
        let coordinator = ChapterFetchCoordinator::new(library);

        let (tracker, writer) = create_progress_tracker(Arc::clone(&store), debounce, 100);
        tokio::spawn(writer.run());

        let ws_broadcaster = WsBroadcaster::default();
        ws_broadcaster.forward_store_events(&store);

        let state = Arc::new(AppState::new(config, coordinator, tracker, ws_broadcaster));
        let router = atlas_server::api::create_router(state);

        Self {
            router,
            source,
            store,
            temp_dir,
        }
    }

    /// Register a novel with `chapters` chapters on the mock source.
    pub async fn add_source_novel(&self, title: &str, chapters: u32) -> atlas_core::Novel {
        let novel = fixtures::novel(MOCK_SOURCE, title);
        self.source.add_novel(&novel, chapters).await;
        novel
    }

    /// Register a novel on the source and add it to the library.
    pub async fn add_library_novel(&self, title: &str, chapters: u32) -> atlas_core::Novel {
        let novel = self.add_source_novel(title, chapters).await;
        let response = self
            .post("/api/v1/library", serde_json::to_value(&novel).unwrap())
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        serde_json::from_value(response.body).expect("Failed to parse novel")
    }

    /// Open a reader session and return its id.
    pub async fn open_reader(&self, novel_id: &str, start_index: u32) -> String {
        let response = self
            .post(
                "/api/v1/reader",
                serde_json::json!({ "novel_id": novel_id, "start_index": start_index }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["session_id"]
            .as_str()
            .expect("session_id missing")
            .to_string()
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

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
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

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
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
