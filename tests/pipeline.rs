use axum::body::Body;
use axum::http::{Request, StatusCode};
use claims::{assert_ok, assert_some};
use pretty_assertions::assert_eq;
use secrecy::Secret;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use url::Url;
use weather_ingest::model::CityList;
use weather_ingest::server::{router, AppState};
use weather_ingest::services::memory::{InMemoryQueue, InMemoryStore};
use weather_ingest::services::{WeatherApiClient, WeatherQueue};
use weather_ingest::settings::ProcessorSettings;
use weather_ingest::{Processor, Scheduler};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "test_weather_api_key";

fn report(city: &str, country: &str, localtime: &str, temp_c: f64, condition: &str) -> Value {
    json!({
        "location": {
            "name": city,
            "region": "",
            "country": country,
            "lat": 32.82,
            "lon": 34.99,
            "tz_id": "Asia/Jerusalem",
            "localtime_epoch": 1724238300,
            "localtime": localtime,
        },
        "current": {
            "last_updated": localtime,
            "temp_c": temp_c,
            "temp_f": temp_c * 9.0 / 5.0 + 32.0,
            "is_day": 1,
            "condition": { "text": condition, "code": 1000 },
            "humidity": 60,
        },
    })
}

async fn mount_report(server: &MockServer, city: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path("/v1/current.json"))
        .and(query_param("key", API_KEY))
        .and(query_param("q", city))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn weather_api(server: &MockServer) -> WeatherApiClient {
    let base_url = assert_ok!(Url::parse(&format!("{}/v1/", server.uri())));
    assert_ok!(WeatherApiClient::new(
        base_url,
        Secret::new(API_KEY.to_string()),
        Duration::from_secs(5)
    ))
}

fn processor_settings(max_receive_count: Option<u32>) -> ProcessorSettings {
    ProcessorSettings {
        idle_backoff: Duration::ZERO,
        max_receive_count,
        ..ProcessorSettings::default()
    }
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let request = assert_ok!(Request::builder().uri(uri).body(Body::empty()));
    let response = assert_ok!(app.oneshot(request).await);
    let status = response.status();
    let bytes = assert_ok!(hyper::body::to_bytes(response.into_body()).await);
    (status, assert_ok!(serde_json::from_slice(&bytes)))
}

#[tokio::test]
async fn test_tick_publishes_raw_report_per_city() {
    let server = MockServer::start().await;
    let haifa = report("Haifa", "Israel", "2024-08-21 14:05", 30.0, "Sunny");
    let lansing = report("Lansing", "United States of America", "2024-08-21 07:05", 18.0, "Mist");
    mount_report(&server, "Haifa", haifa.clone()).await;
    mount_report(&server, "Lansing", lansing.clone()).await;

    let queue = InMemoryQueue::default();
    let scheduler = Scheduler::new(
        Arc::new(weather_api(&server)),
        Arc::new(queue.clone()),
        CityList::new(["Haifa", "Lansing"]),
        Duration::from_secs(60),
    );

    let summary = scheduler.run_tick().await;
    assert_eq!(summary.published, 2);
    assert_eq!(summary.failed, 0);

    let mut sent = queue.sent().await;
    sent.sort_by(|lhs, rhs| lhs.city.cmp(&rhs.city));
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].city, "Haifa");
    assert_eq!(assert_ok!(serde_json::from_str::<Value>(&sent[0].body)), haifa);
    assert_eq!(sent[1].city, "Lansing");
    assert_eq!(assert_ok!(serde_json::from_str::<Value>(&sent[1].body)), lansing);
}

#[tokio::test]
async fn test_unknown_city_does_not_block_tick() {
    let server = MockServer::start().await;
    mount_report(&server, "Haifa", report("Haifa", "Israel", "2024-08-21 14:05", 30.0, "Sunny"))
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/current.json"))
        .and(query_param("q", "Atlantis"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 1006, "message": "No matching location found." }
        })))
        .mount(&server)
        .await;

    let queue = InMemoryQueue::default();
    let scheduler = Scheduler::new(
        Arc::new(weather_api(&server)),
        Arc::new(queue.clone()),
        CityList::new(["Atlantis", "Haifa"]),
        Duration::from_secs(60),
    );

    let summary = scheduler.run_tick().await;
    assert_eq!(summary.published, 1);
    assert_eq!(summary.failed, 1);

    let sent = queue.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].city, "Haifa");
}

#[tokio::test]
async fn test_reports_flow_from_weather_api_to_query_api() {
    let server = MockServer::start().await;
    mount_report(&server, "Haifa", report("Haifa", "Israel", "2024-08-21 14:05", 20.0, "Sunny"))
        .await;
    mount_report(&server, "Eilat", report("Eilat", "Israel", "2024-08-21 14:05", 36.0, "Clear"))
        .await;

    let queue = InMemoryQueue::default();
    let store = InMemoryStore::default();
    let scheduler = Scheduler::new(
        Arc::new(weather_api(&server)),
        Arc::new(queue.clone()),
        CityList::new(["Haifa", "Eilat"]),
        Duration::from_secs(60),
    );
    let processor = Processor::new(
        Arc::new(queue.clone()),
        Arc::new(store.clone()),
        &processor_settings(None),
    );

    scheduler.run_tick().await;
    let first = assert_ok!(processor.poll_once().await);
    assert_eq!(first.stored, 2);

    // a later reading for Haifa changes its average and latest condition
    server.reset().await;
    mount_report(&server, "Haifa", report("Haifa", "Israel", "2024-08-21 15:05", 30.0, "Rain"))
        .await;
    let scheduler = Scheduler::new(
        Arc::new(weather_api(&server)),
        Arc::new(queue.clone()),
        CityList::new(["Haifa"]),
        Duration::from_secs(60),
    );
    scheduler.run_tick().await;
    let second = assert_ok!(processor.poll_once().await);
    assert_eq!(second.stored, 1);

    assert_eq!(queue.deleted().await.len(), 3);
    assert_eq!(queue.visible_len().await, 0);
    assert_eq!(queue.in_flight_len().await, 0);

    let app = router(AppState::new(Arc::new(store)));
    let (status, body) = get(app.clone(), "/exercise/Israel").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            {"city": "Eilat", "average_temp_c": 36.0, "lastest_condition_text": "Clear"},
            {"city": "Haifa", "average_temp_c": 25.0, "lastest_condition_text": "Rain"},
        ])
    );

    let (status, body) = get(app, "/exercise/France").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"detail": "No data found for the given country"}));
}

#[tokio::test]
async fn test_malformed_message_is_redelivered_until_discarded() {
    let queue = InMemoryQueue::default();
    let store = InMemoryStore::default();
    assert_ok!(queue.send("Haifa", "not a report".to_string()).await);

    let processor = Processor::new(
        Arc::new(queue.clone()),
        Arc::new(store.clone()),
        &processor_settings(Some(2)),
    );

    for _ in 0..2 {
        let summary = assert_ok!(processor.poll_once().await);
        assert_eq!(summary.malformed, 1);
        assert!(queue.deleted().await.is_empty());
        queue.expire_visibility().await;
    }

    let summary = assert_ok!(processor.poll_once().await);
    assert_eq!(summary.discarded, 1);
    let deleted = queue.deleted().await;
    assert_eq!(assert_some!(deleted.first()), "00000001");
    assert!(store.observations().await.is_empty());
}
