use std::time::{Duration, Instant};

use actix_web::{test, web, App};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use pbrelay::{ClientConfig, ProductboardClient, RetryConfig};
use pbrelay_server::config::{MetricsAccess, ResponseMode};
use pbrelay_server::dispatcher::Dispatcher;
use pbrelay_server::routes;
use pbrelay_server::state::AppState;

fn make_state(
    upstream: &str,
    response_mode: ResponseMode,
    metrics: MetricsAccess,
) -> web::Data<AppState> {
    let client = ProductboardClient::new(
        ClientConfig::new("test-token")
            .with_base_url(upstream)
            .with_retry(RetryConfig {
                max_attempts: 3,
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
                jitter: 0.0,
                retry_transport: false,
            }),
    )
    .unwrap();

    web::Data::new(AppState {
        dispatcher: Dispatcher::new(client),
        response_mode,
        metrics,
    })
}

fn async_state(upstream: &str) -> web::Data<AppState> {
    make_state(upstream, ResponseMode::Async, MetricsAccess::Disabled)
}

async fn mount_lookup(server: &MockServer, id: &str, name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/components/{id}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"id": id, "name": name}})),
        )
        .mount(server)
        .await;
}

async fn mount_create(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/features"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "f-1"}})))
        .mount(server)
        .await;
}

fn requests_matching<'a>(requests: &'a [Request], verb: &str, route: &str) -> Vec<&'a Request> {
    requests
        .iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == route)
        .collect()
}

/// Poll the mock upstream until `count` requests hit `verb route`.
async fn wait_for(server: &MockServer, verb: &str, route: &str, count: usize) -> Vec<Request> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let requests = server.received_requests().await.unwrap_or_default();
        if requests_matching(&requests, verb, route).len() >= count || Instant::now() > deadline {
            return requests;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Give background processing time to make calls it should not make.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}

fn post_event(uri: &str, body: serde_json::Value) -> test::TestRequest {
    test::TestRequest::post()
        .uri(uri)
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body.to_string())
}

#[actix_rt::test]
async fn get_echoes_validation_token_exactly() {
    let state = async_state("http://127.0.0.1:1");
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    let req = test::TestRequest::get()
        .uri("/?validationToken=tok-123_ABC.xyz")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"tok-123_ABC.xyz");
}

#[actix_rt::test]
async fn get_echoes_decoded_token_on_webhook_alias() {
    let state = async_state("http://127.0.0.1:1");
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    let req = test::TestRequest::get()
        .uri("/webhook?validationToken=a%20b%2Bc")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"a b+c");
}

#[actix_rt::test]
async fn get_echoes_non_utf8_token_byte_for_byte() {
    let state = async_state("http://127.0.0.1:1");
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    let req = test::TestRequest::get()
        .uri("/?validationToken=%FF%FEok")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"\xff\xfeok");
}

#[actix_rt::test]
async fn get_with_repeated_token_echoes_first() {
    let state = async_state("http://127.0.0.1:1");
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    let req = test::TestRequest::get()
        .uri("/?validationToken=a&validationToken=b")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"a");
}

#[actix_rt::test]
async fn get_without_token_is_client_error() {
    let state = async_state("http://127.0.0.1:1");
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    for uri in ["/", "/?validationToken=", "/?other=1"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400, "{uri}");
        let body = test::read_body(resp).await;
        assert_eq!(&body[..], b"Missing validationToken");
    }
}

#[actix_rt::test]
async fn post_verification_header_is_echoed_without_processing() {
    let server = MockServer::start().await;
    let state = async_state(&server.uri());
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    let req = test::TestRequest::post()
        .uri("/")
        .insert_header(("X-Productboard-Webhook-Verification-Token", "hdr-token"))
        .set_payload(json!({"data": {"eventType": "component.created", "id": "42"}}).to_string())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"hdr-token");

    settle().await;
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[actix_rt::test]
async fn post_is_acknowledged_before_upstream_completes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/components/42"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": {"name": "Auth"}}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;
    mount_create(&server).await;

    let state = async_state(&server.uri());
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    let started = Instant::now();
    let resp = test::call_service(
        &app,
        post_event("/", json!({"data": {"eventType": "component.created", "id": "42"}})).to_request(),
    )
    .await;

    assert_eq!(resp.status(), 202);
    assert!(started.elapsed() < Duration::from_millis(1500));
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "accepted");
    assert!(body["deliveryId"].as_str().is_some());
}

#[actix_rt::test]
async fn created_event_looks_up_then_creates_feature() {
    let server = MockServer::start().await;
    mount_lookup(&server, "42", "Auth").await;
    mount_create(&server).await;

    let state = async_state(&server.uri());
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    let resp = test::call_service(
        &app,
        post_event("/", json!({"data": {"eventType": "component.created", "id": "42"}})).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 202);

    let requests = wait_for(&server, "POST", "/features", 1).await;
    assert_eq!(requests_matching(&requests, "GET", "/components/42").len(), 1);
    let creates = requests_matching(&requests, "POST", "/features");
    assert_eq!(creates.len(), 1);

    let body: serde_json::Value = serde_json::from_slice(&creates[0].body).unwrap();
    assert_eq!(body["data"]["parent"]["component"]["id"], "42");
    assert_eq!(body["data"]["name"], "Auth");
    assert_eq!(body["data"]["status"]["name"], "Blocked");
    assert_eq!(body["data"]["type"], "feature");
}

#[actix_rt::test]
async fn updated_and_legacy_events_are_processed() {
    let server = MockServer::start().await;
    mount_lookup(&server, "7", "Billing").await;
    mount_lookup(&server, "8", "Search").await;
    mount_create(&server).await;

    let state = async_state(&server.uri());
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    let resp = test::call_service(
        &app,
        post_event("/", json!({"data": {"eventType": "component.updated", "id": "7"}})).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 202);
    let resp = test::call_service(
        &app,
        post_event("/webhook", json!({"data": {"type": "component", "id": "8"}})).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 202);

    let requests = wait_for(&server, "POST", "/features", 2).await;
    assert_eq!(requests_matching(&requests, "POST", "/features").len(), 2);
    assert_eq!(requests_matching(&requests, "GET", "/components/7").len(), 1);
    assert_eq!(requests_matching(&requests, "GET", "/components/8").len(), 1);
}

#[actix_rt::test]
async fn unrecognized_events_make_no_upstream_calls() {
    let server = MockServer::start().await;
    mount_lookup(&server, "42", "Auth").await;
    mount_create(&server).await;

    let state = async_state(&server.uri());
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    let payloads = [
        json!({"data": {"eventType": "feature.created", "id": "42"}}),
        json!({"data": {"eventType": "component.created"}}),
        json!({"data": {"type": "feature", "id": "42"}}),
        json!({"nothing": true}),
        json!([1, 2, 3]),
    ];
    for payload in payloads {
        let resp = test::call_service(&app, post_event("/", payload).to_request()).await;
        assert_eq!(resp.status(), 202);
    }

    let req = test::TestRequest::post()
        .uri("/")
        .set_payload("{ not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 202);

    settle().await;
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[actix_rt::test]
async fn lookup_503_exhausts_retries_and_skips_creation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/components/42"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_create(&server).await;

    let state = async_state(&server.uri());
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    let resp = test::call_service(
        &app,
        post_event("/", json!({"data": {"eventType": "component.created", "id": "42"}})).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 202);

    let requests = wait_for(&server, "GET", "/components/42", 3).await;
    settle().await;
    let requests = server.received_requests().await.unwrap_or(requests);
    assert_eq!(requests_matching(&requests, "GET", "/components/42").len(), 3);
    assert!(requests_matching(&requests, "POST", "/features").is_empty());
}

#[actix_rt::test]
async fn lookup_404_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/components/42"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;
    mount_create(&server).await;

    let state = async_state(&server.uri());
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    test::call_service(
        &app,
        post_event("/", json!({"data": {"eventType": "component.created", "id": "42"}})).to_request(),
    )
    .await;

    wait_for(&server, "GET", "/components/42", 1).await;
    settle().await;
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests_matching(&requests, "GET", "/components/42").len(), 1);
    assert!(requests_matching(&requests, "POST", "/features").is_empty());
}

#[actix_rt::test]
async fn duplicate_deliveries_create_twice() {
    let server = MockServer::start().await;
    mount_lookup(&server, "42", "Auth").await;
    mount_create(&server).await;

    let state = async_state(&server.uri());
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    let payload = json!({"data": {"eventType": "component.created", "id": "42"}});
    for _ in 0..2 {
        let resp = test::call_service(&app, post_event("/", payload.clone()).to_request()).await;
        assert_eq!(resp.status(), 202);
    }

    let requests = wait_for(&server, "POST", "/features", 2).await;
    assert_eq!(requests_matching(&requests, "GET", "/components/42").len(), 2);
    assert_eq!(requests_matching(&requests, "POST", "/features").len(), 2);
}

#[actix_rt::test]
async fn sync_mode_reports_outcome_in_status() {
    let server = MockServer::start().await;
    mount_lookup(&server, "42", "Auth").await;
    Mock::given(method("GET"))
        .and(path("/components/500"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_create(&server).await;

    let state = make_state(&server.uri(), ResponseMode::Sync, MetricsAccess::Disabled);
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    let resp = test::call_service(
        &app,
        post_event("/", json!({"data": {"eventType": "component.created", "id": "42"}})).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"Feature created successfully!");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests_matching(&requests, "POST", "/features").len(), 1);

    let resp = test::call_service(
        &app,
        post_event("/", json!({"data": {"eventType": "feature.created", "id": "42"}})).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);
    let body = test::read_body(resp).await;
    assert!(body.starts_with(b"Invalid event type or missing data"));

    let resp = test::call_service(
        &app,
        post_event("/", json!({"data": {"eventType": "component.created", "id": "500"}})).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 500);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests_matching(&requests, "GET", "/components/500").len(), 3);
    assert_eq!(requests_matching(&requests, "POST", "/features").len(), 1);
}

#[actix_rt::test]
async fn health_reports_ok() {
    let state = async_state("http://127.0.0.1:1");
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
}

#[actix_rt::test]
async fn metrics_requires_token_when_configured() {
    let state = make_state(
        "http://127.0.0.1:1",
        ResponseMode::Async,
        MetricsAccess::Token(b"metrics-token-123".to_vec()),
    );
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    let req = test::TestRequest::get().uri("/metrics").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::get()
        .uri("/metrics")
        .insert_header(("Authorization", "Bearer wrong"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::get()
        .uri("/metrics")
        .insert_header(("Authorization", "Bearer metrics-token-123"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_rt::test]
async fn metrics_forbidden_unless_public() {
    let state = async_state("http://127.0.0.1:1");
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;
    let req = test::TestRequest::get().uri("/metrics").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let state = make_state("http://127.0.0.1:1", ResponseMode::Async, MetricsAccess::Public);
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;
    let req = test::TestRequest::get().uri("/metrics").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_rt::test]
async fn sync_mode_answers_500_when_creation_fails() {
    let server = MockServer::start().await;
    mount_lookup(&server, "42", "Auth").await;
    Mock::given(method("POST"))
        .and(path("/features"))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid parent"))
        .mount(&server)
        .await;

    let state = make_state(&server.uri(), ResponseMode::Sync, MetricsAccess::Disabled);
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    let resp = test::call_service(
        &app,
        post_event("/", json!({"data": {"eventType": "component.created", "id": "42"}})).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 500);
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"Error processing webhook");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests_matching(&requests, "GET", "/components/42").len(), 1);
    assert_eq!(requests_matching(&requests, "POST", "/features").len(), 1);
}

#[actix_rt::test]
async fn async_creation_failure_is_logged_after_ack() {
    let server = MockServer::start().await;
    mount_lookup(&server, "42", "Auth").await;
    Mock::given(method("POST"))
        .and(path("/features"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .mount(&server)
        .await;

    let state = async_state(&server.uri());
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    let resp = test::call_service(
        &app,
        post_event("/", json!({"data": {"eventType": "component.created", "id": "42"}})).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 202);

    wait_for(&server, "POST", "/features", 1).await;
    settle().await;
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests_matching(&requests, "GET", "/components/42").len(), 1);
    assert_eq!(requests_matching(&requests, "POST", "/features").len(), 1);
}

#[actix_rt::test]
async fn component_id_reaches_upstream_unchanged() {
    let server = MockServer::start().await;
    mount_lookup(&server, "42", "Auth").await;
    mount_create(&server).await;

    let state = make_state(&server.uri(), ResponseMode::Sync, MetricsAccess::Disabled);
    let app = test::init_service(App::new().app_data(state).configure(routes::configure)).await;

    let resp = test::call_service(
        &app,
        post_event("/", json!({"data": {"eventType": "component.created", "id": "42 "}})).to_request(),
    )
    .await;
    // Lookup of "42%20" is not mounted, so the unchanged id fails at lookup.
    assert_eq!(resp.status(), 500);

    let requests = server.received_requests().await.unwrap();
    let paths: Vec<&str> = requests.iter().map(|r| r.url.path()).collect();
    assert_eq!(paths, vec!["/components/42%20"]);
}
