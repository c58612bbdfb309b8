use serde_json::json;
use wellsync_core::health::DatasetKey;
use wellsync_core::sync::{
    classify_failure, FailureClass, QueryMode, SyncWindow, UpstreamCallError, UpstreamCredential,
    WellnessUpstream,
};
use wellsync_wellness_api::{WellnessApiClient, WellnessApiError, PERMISSIONS_PATH};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn window(mode: QueryMode) -> SyncWindow {
    SyncWindow {
        start_epoch_seconds: 1_709_251_200,
        end_epoch_seconds: 1_709_337_600,
        mode,
    }
}

fn credential() -> UpstreamCredential {
    UpstreamCredential::new("access-1", vec!["HEALTH_EXPORT".to_string()])
}

#[tokio::test]
async fn primary_window_uses_upload_parameters_and_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wellness-api/rest/sleeps"))
        .and(header("authorization", "Bearer access-1"))
        .and(query_param("uploadStartTimeInSeconds", "1709251200"))
        .and(query_param("uploadEndTimeInSeconds", "1709337600"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"sleepSummaryId": "abc", "calendarDate": "2024-03-01"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = WellnessApiClient::new(&server.uri()).unwrap();
    let rows = client
        .fetch_window(&credential(), DatasetKey::Sleeps, &window(QueryMode::Primary))
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["sleepSummaryId"], "abc");
}

#[tokio::test]
async fn fallback_window_uses_summary_parameters_on_same_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wellness-api/rest/dailies"))
        .and(query_param("summaryStartTimeInSeconds", "1709251200"))
        .and(query_param("summaryEndTimeInSeconds", "1709337600"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .expect(1)
        .mount(&server)
        .await;

    let client = WellnessApiClient::new(&server.uri()).unwrap();
    let rows = client
        .fetch_window(&credential(), DatasetKey::Dailies, &window(QueryMode::Fallback))
        .await
        .unwrap();

    assert!(rows.is_empty());
}

#[tokio::test]
async fn error_status_preserves_body_and_request_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wellness-api/rest/sleeps"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_string("{\"errorMessage\":\"InvalidPullTokenException\"}"),
        )
        .mount(&server)
        .await;

    let client = WellnessApiClient::new(&server.uri()).unwrap();
    let err = client
        .fetch_window(&credential(), DatasetKey::Sleeps, &window(QueryMode::Primary))
        .await
        .unwrap_err();

    match err {
        UpstreamCallError::Status(failure) => {
            assert_eq!(failure.http_status, 400);
            assert_eq!(failure.dataset_source, "sleeps");
            assert_eq!(failure.request_path, "/wellness-api/rest/sleeps");
            assert!(failure.raw_body.contains("InvalidPullTokenException"));
            assert_eq!(classify_failure(&failure), FailureClass::InvalidPullToken);
        }
        other => panic!("expected status failure, got {:?}", other),
    }
}

#[tokio::test]
async fn unreachable_server_is_a_transport_failure() {
    // Nothing listens on the discard port.
    let client = WellnessApiClient::new("http://127.0.0.1:9").unwrap();
    let err = client
        .fetch_window(&credential(), DatasetKey::Sleeps, &window(QueryMode::Primary))
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamCallError::Transport(_)));
}

#[tokio::test]
async fn permissions_accept_bare_and_wrapped_lists() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PERMISSIONS_PATH))
        .and(header("authorization", "Bearer bare"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!(["HEALTH_EXPORT", "HISTORICAL_DATA_EXPORT"])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(PERMISSIONS_PATH))
        .and(header("authorization", "Bearer wrapped"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"permissions": ["ACTIVITY_EXPORT"]})),
        )
        .mount(&server)
        .await;

    let client = WellnessApiClient::new(&server.uri()).unwrap();
    assert_eq!(
        client.get_permissions("bare").await.unwrap(),
        vec!["HEALTH_EXPORT".to_string(), "HISTORICAL_DATA_EXPORT".to_string()]
    );
    assert_eq!(
        client.fetch_permissions("wrapped").await.unwrap(),
        vec!["ACTIVITY_EXPORT".to_string()]
    );
}

#[tokio::test]
async fn permissions_unauthorized_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PERMISSIONS_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;

    let client = WellnessApiClient::new(&server.uri()).unwrap();
    let err = client.get_permissions("stale").await.unwrap_err();
    assert_eq!(err.status_code(), Some(401));
    assert!(matches!(err, WellnessApiError::Api { .. }));
}
