use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::tempdir;
use tower::ServiceExt;
use wellsync_core::health::DatasetKey;
use wellsync_core::sync::{
    QueryMode, SyncConfig, SyncWindow, UpstreamCallError, UpstreamCredential, UpstreamFailure,
    WellnessUpstream,
};

use super::app_router;
use crate::config::Config;
use crate::main_lib::build_state_with_upstream;

type Handler =
    dyn Fn(DatasetKey, &SyncWindow) -> Result<Vec<Value>, UpstreamCallError> + Send + Sync;

struct StubUpstream {
    permissions: Vec<String>,
    handler: Box<Handler>,
    calls: Mutex<Vec<(DatasetKey, QueryMode)>>,
    permission_delay: Option<Duration>,
}

impl StubUpstream {
    fn new<F>(permissions: &[&str], handler: F) -> Arc<Self>
    where
        F: Fn(DatasetKey, &SyncWindow) -> Result<Vec<Value>, UpstreamCallError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            permission_delay: None,
        })
    }

    /// Holds every permission lookup open for `delay`.
    fn with_permission_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        let mut stub = Arc::try_unwrap(self).unwrap_or_else(|_| panic!("stub already shared"));
        stub.permission_delay = Some(delay);
        Arc::new(stub)
    }

    fn fallback_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, mode)| *mode == QueryMode::Fallback)
            .count()
    }
}

#[async_trait]
impl WellnessUpstream for StubUpstream {
    async fn fetch_window(
        &self,
        _credential: &UpstreamCredential,
        dataset: DatasetKey,
        window: &SyncWindow,
    ) -> Result<Vec<Value>, UpstreamCallError> {
        self.calls.lock().unwrap().push((dataset, window.mode));
        (self.handler)(dataset, window)
    }

    async fn fetch_permissions(&self, token: &str) -> Result<Vec<String>, UpstreamCallError> {
        if let Some(delay) = self.permission_delay {
            tokio::time::sleep(delay).await;
        }
        if token == "expired" {
            return Err(status_error(DatasetKey::Sleeps, 401, "token expired"));
        }
        Ok(self.permissions.clone())
    }
}

fn status_error(dataset: DatasetKey, http_status: u16, body: &str) -> UpstreamCallError {
    UpstreamCallError::Status(UpstreamFailure {
        dataset_source: dataset.as_str().to_string(),
        http_status,
        raw_body: body.to_string(),
        request_path: dataset.path(),
    })
}

fn sleep_row() -> Value {
    json!({
        "sleepSummaryId": "abc",
        "calendarDate": "2024-03-01",
        "startTimeInSeconds": 1_709_251_200,
        "durationInSeconds": 27_000,
        "validation": "ENHANCED_FINAL"
    })
}

fn test_app(upstream: Arc<StubUpstream>) -> Router {
    let data_dir = tempdir()
        .expect("tempdir")
        .keep()
        .to_string_lossy()
        .to_string();
    let config = Config {
        listen_addr: "127.0.0.1:0".to_string(),
        data_dir,
        wellness_api_url: "http://stub.invalid".to_string(),
        log_level: "info".to_string(),
        sync: SyncConfig::default(),
    };
    let state = build_state_with_upstream(config, upstream).expect("state");
    app_router(state)
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header("authorization", format!("Bearer {}", token));
    }
    let response = app
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = test_app(StubUpstream::new(&[], |_, _| Ok(vec![])));
    let (status, body) = call(&app, Method::GET, "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn sleep_read_returns_normalized_rows_from_upload_mode() {
    let app = test_app(StubUpstream::new(&["HEALTH_EXPORT"], |dataset, _| {
        if dataset == DatasetKey::Sleeps {
            Ok(vec![sleep_row()])
        } else {
            Ok(vec![])
        }
    }));

    let (status, body) = call(
        &app,
        Method::GET,
        "/api/v1/wellness/sleep?userId=u1&days=1",
        Some("tok"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["source"], "upload");
    assert_eq!(body["sleep"].as_array().unwrap().len(), 1);
    assert_eq!(body["sleep"][0]["kind"], "sleep_session");
    assert_eq!(body["permissions"], json!(["HEALTH_EXPORT"]));
}

#[tokio::test]
async fn missing_inputs_are_rejected_before_upstream() {
    let upstream = StubUpstream::new(&["HEALTH_EXPORT"], |_, _| Ok(vec![]));
    let app = test_app(upstream.clone());

    let (status, body) = call(&app, Method::GET, "/api/v1/wellness/sleep", Some("tok")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "userId is required");

    let (status, body) = call(&app, Method::GET, "/api/v1/wellness/sleep?userId=u1", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["needsReauth"], true);

    let (status, _) = call(
        &app,
        Method::GET,
        "/api/v1/wellness/sleep?userId=u1&days=soon",
        Some("tok"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::GET,
        "/api/v1/wellness/datasets/heartbeats?userId=u1",
        Some("tok"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(upstream.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn expired_token_answers_needs_reauth() {
    let app = test_app(StubUpstream::new(&["HEALTH_EXPORT"], |_, _| Ok(vec![])));
    let (status, body) = call(
        &app,
        Method::GET,
        "/api/v1/wellness/sleep?userId=u1",
        Some("expired"),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["needsReauth"], true);
    assert_eq!(body["action"], "reconnect");
}

#[tokio::test]
async fn missing_dataset_scope_is_forbidden() {
    let app = test_app(StubUpstream::new(&["HEALTH_EXPORT"], |_, _| Ok(vec![])));
    let (status, body) = call(
        &app,
        Method::GET,
        "/api/v1/wellness/datasets/activities?userId=u1",
        Some("tok"),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["requiredPermissions"], json!(["ACTIVITY_EXPORT"]));
}

#[tokio::test]
async fn rejected_upload_query_without_historical_scope_conflicts() {
    let upstream = StubUpstream::new(&["HEALTH_EXPORT"], |dataset, window| {
        match window.mode {
            QueryMode::Primary => Err(status_error(
                dataset,
                400,
                "{\"errorMessage\":\"InvalidPullTokenException failure\"}",
            )),
            QueryMode::Fallback => Ok(vec![]),
        }
    });
    let app = test_app(upstream.clone());

    let (status, body) = call(
        &app,
        Method::GET,
        "/api/v1/wellness/datasets/hrv?userId=u1&days=3",
        Some("tok"),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["source"], "hrv");
    assert_eq!(body["requiredPermissions"], json!(["HISTORICAL_DATA_EXPORT"]));
    assert_eq!(upstream.fallback_calls(), 0);
}

#[tokio::test]
async fn backfill_rows_are_labelled_with_their_source() {
    let upstream = StubUpstream::new(
        &["HEALTH_EXPORT", "HISTORICAL_DATA_EXPORT"],
        |dataset, window| match window.mode {
            QueryMode::Primary => Err(status_error(dataset, 400, "InvalidPullTokenException")),
            QueryMode::Fallback => Ok(vec![sleep_row()]),
        },
    );
    let app = test_app(upstream);

    let (status, body) = call(
        &app,
        Method::GET,
        "/api/v1/wellness/datasets/sleeps?userId=u1&days=2",
        Some("tok"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["datasetKey"], "sleeps");
    assert_eq!(body["source"], "backfill");
    assert_eq!(body["days"], 2);
    // Same summary id in both windows collapses to one record.
    assert_eq!(body["rows"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn sync_pass_imports_once_and_records_are_queryable() {
    let app = test_app(StubUpstream::new(&["HEALTH_EXPORT"], |dataset, _| {
        if dataset == DatasetKey::Sleeps {
            Ok(vec![sleep_row(), sleep_row()])
        } else {
            Ok(vec![])
        }
    }));

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/wellness/sync?userId=u1&days=2",
        Some("tok"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["imported"], 1);
    assert_eq!(body["device"]["connectionStatus"], "connected");

    let (_, again) = call(
        &app,
        Method::POST,
        "/api/v1/wellness/sync?userId=u1&days=2",
        Some("tok"),
    )
    .await;
    assert_eq!(again["imported"], 0);

    let (status, records) = call(
        &app,
        Method::GET,
        "/api/v1/wellness/records?userId=u1&datasetKey=sleeps",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(records["records"].as_array().unwrap().len(), 1);
    assert_eq!(records["records"][0]["source"], "upload");

    let (status, connection) = call(
        &app,
        Method::GET,
        "/api/v1/wellness/connection?userId=u1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(connection["connection"]["connectionStatus"], "connected");
    assert_eq!(connection["syncing"], false);
}

#[tokio::test]
async fn concurrent_first_syncs_for_new_user_conflict() {
    let upstream = StubUpstream::new(&["HEALTH_EXPORT"], |_, _| Ok(vec![]))
        .with_permission_delay(Duration::from_millis(200));
    let app = test_app(upstream);
    let uri = "/api/v1/wellness/sync?userId=new-user&days=1";

    let (first, second) = tokio::join!(
        call(&app, Method::POST, uri, Some("tok")),
        call(&app, Method::POST, uri, Some("tok")),
    );

    let mut statuses = vec![first.0, second.0];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);
    let rejected = if first.0 == StatusCode::CONFLICT { first.1 } else { second.1 };
    assert_eq!(rejected["success"], false);
    assert_eq!(rejected["error"], "sync already in progress");

    let (status, body) = call(
        &app,
        Method::GET,
        "/api/v1/wellness/connection?userId=new-user",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connection"]["connectionStatus"], "connected");
    assert_eq!(body["syncing"], false);
}

#[tokio::test]
async fn sync_with_expired_token_marks_device_error() {
    let app = test_app(StubUpstream::new(&["HEALTH_EXPORT"], |_, _| Ok(vec![])));

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/wellness/sync?userId=u1",
        Some("expired"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["needsReauth"], true);

    let (_, connection) = call(
        &app,
        Method::GET,
        "/api/v1/wellness/connection?userId=u1",
        None,
    )
    .await;
    assert_eq!(connection["connection"]["connectionStatus"], "error");
}

#[tokio::test]
async fn sync_catalog_lists_every_dataset() {
    let app = test_app(StubUpstream::new(&["HEALTH_EXPORT"], |_, _| Ok(vec![])));

    let (status, body) = call(&app, Method::GET, "/api/v1/wellness/sync?userId=u1", Some("tok")).await;
    assert_eq!(status, StatusCode::OK);
    let datasets = body["datasets"].as_array().unwrap();
    assert_eq!(datasets.len(), DatasetKey::ALL.len());
    let activities = datasets
        .iter()
        .find(|d| d["datasetKey"] == "activities")
        .unwrap();
    assert_eq!(activities["permissionGranted"], false);
    assert_eq!(activities["enabledForSync"], false);
}

#[tokio::test]
async fn record_range_must_be_ordered() {
    let app = test_app(StubUpstream::new(&[], |_, _| Ok(vec![])));
    let (status, _) = call(
        &app,
        Method::GET,
        "/api/v1/wellness/records?userId=u1&datasetKey=sleeps&from=10&to=5",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
