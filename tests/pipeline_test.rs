//! End-to-end pipeline tests against a mock platform API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use strata_sdk::auth::{TokenFn, TokenProvider};
use strata_sdk::{Error, HttpRequest, StrataClient};

fn counting_provider(calls: Arc<AtomicUsize>) -> Arc<dyn TokenProvider> {
    Arc::new(TokenFn(move || {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        std::future::ready(Ok::<_, Error>(format!("token{n}")))
    }))
}

async fn client_for(server: &MockServer, calls: Arc<AtomicUsize>) -> StrataClient {
    StrataClient::builder()
        .app_id("pipeline-tests")
        .project("unit-test")
        .base_url(server.uri())
        .token_provider(counting_provider(calls))
        .build()
        .unwrap()
}

#[tokio::test]
async fn recovers_from_401_by_refreshing_the_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/test"))
        .and(header("authorization", "Bearer token1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": 401, "message": "token expired"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/test"))
        .and(header("authorization", "Bearer token2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let client = client_for(&server, Arc::clone(&calls)).await;
    client.authenticate().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let response: strata_sdk::HttpResponse<Value> = client.get("/test").await.unwrap();
    assert_eq!(response.data, json!({"ok": true}));
    // Sign-in plus one refresh.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn gives_up_when_the_refreshed_token_is_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": 401, "message": "nope"}
        })))
        .mount(&server)
        .await;

    // Provider always returns the same token.
    let provider = Arc::new(TokenFn(|| {
        std::future::ready(Ok::<_, Error>("fixed".to_string()))
    }));
    let client = StrataClient::builder()
        .app_id("pipeline-tests")
        .project("unit-test")
        .base_url(server.uri())
        .token_provider(provider)
        .build()
        .unwrap();
    client.authenticate().await.unwrap();

    let err = client.get::<Value>("/test").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    // No resend happens once the handler rejects.
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_401s_share_one_token_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/test"))
        .and(header("authorization", "Bearer token1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": 401, "message": "token expired"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/test"))
        .and(header("authorization", "Bearer token2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    // A slow provider keeps the refresh in flight while every 401
    // handler arrives, so they all join the same fetch.
    let calls = Arc::new(AtomicUsize::new(0));
    let provider_calls = Arc::clone(&calls);
    let provider = Arc::new(TokenFn(move || {
        let calls = Arc::clone(&provider_calls);
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            Ok::<_, Error>(format!("token{n}"))
        }
    }));
    let client = Arc::new(
        StrataClient::builder()
            .app_id("pipeline-tests")
            .project("unit-test")
            .base_url(server.uri())
            .token_provider(provider)
            .build()
            .unwrap(),
    );
    client.authenticate().await.unwrap();

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.get::<Value>("/test").await })
        })
        .collect();
    // Every request recovers, even those that did not install the
    // refreshed token themselves.
    for task in tasks {
        let response = task.await.unwrap().unwrap();
        assert_eq!(response.data, json!({"ok": true}));
    }
    // Sign-in plus exactly one shared refresh.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn one_time_headers_apply_to_the_next_request_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&server)
        .await;

    let client = StrataClient::builder()
        .app_id("pipeline-tests")
        .project("unit-test")
        .base_url(server.uri())
        .api_key("secret")
        .build()
        .unwrap();

    client.add_one_time_header("x-upload-id", "42").unwrap();
    client.get::<Value>("/items").await.unwrap();
    client.get::<Value>("/items").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[0].headers.get("x-upload-id").unwrap(),
        "42"
    );
    assert!(requests[1].headers.get("x-upload-id").is_none());
}

#[tokio::test]
async fn one_time_headers_survive_backoff_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let client = StrataClient::builder()
        .app_id("pipeline-tests")
        .project("unit-test")
        .base_url(server.uri())
        .api_key("secret")
        .build()
        .unwrap();

    client.add_one_time_header("x-upload-id", "42").unwrap();
    client.get::<Value>("/flaky").await.unwrap();
    client.get::<Value>("/flaky").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    // Both attempts of the first call carry the header; the next call
    // does not.
    assert_eq!(requests[0].headers.get("x-upload-id").unwrap(), "42");
    assert_eq!(requests[1].headers.get("x-upload-id").unwrap(), "42");
    assert!(requests[2].headers.get("x-upload-id").is_none());
}

#[tokio::test]
async fn credentials_are_stripped_from_cross_origin_requests() {
    let own = MockServer::start().await;
    let other = MockServer::start().await;
    for server in [&own, &other] {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(server)
            .await;
    }

    let client = StrataClient::builder()
        .app_id("pipeline-tests")
        .project("unit-test")
        .base_url(own.uri())
        .api_key("secret")
        .build()
        .unwrap();

    client.get::<Value>("/same").await.unwrap();
    let foreign = format!("{}/foreign", other.uri());
    client.get::<Value>(&foreign).await.unwrap();
    client
        .send(HttpRequest::get(&foreign).with_credentials(true))
        .await
        .unwrap();

    let same_origin = &own.received_requests().await.unwrap()[0];
    assert_eq!(same_origin.headers.get("api-key").unwrap(), "secret");
    assert_eq!(
        same_origin.headers.get("x-strata-app").unwrap(),
        "pipeline-tests"
    );

    let cross = other.received_requests().await.unwrap();
    assert!(cross[0].headers.get("api-key").is_none());
    assert!(cross[0].headers.get("x-strata-app").is_none());
    assert!(cross[0].headers.get("x-strata-sdk").is_none());
    // Explicit opt-in restores them.
    assert_eq!(cross[1].headers.get("api-key").unwrap(), "secret");
}

#[tokio::test]
async fn api_error_envelope_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/projects/unit-test/assets"))
        .respond_with(
            ResponseTemplate::new(400)
                .insert_header("x-request-id", "req-77")
                .set_body_json(json!({
                    "error": {
                        "code": 400,
                        "message": "Invalid externalId",
                        "duplicated": [{"externalId": "a"}]
                    }
                })),
        )
        .mount(&server)
        .await;

    let client = StrataClient::builder()
        .app_id("pipeline-tests")
        .project("unit-test")
        .base_url(server.uri())
        .api_key("secret")
        .build()
        .unwrap();

    let err = client
        .post::<Value>(
            "/api/v1/projects/unit-test/assets",
            json!({"items": [{"externalId": "a"}]}),
        )
        .await
        .unwrap_err();
    let api = err.as_api().expect("expected a decoded api error");
    assert_eq!(api.status, 400);
    assert_eq!(api.message, "Invalid externalId");
    assert_eq!(api.request_id.as_deref(), Some("req-77"));
    assert_eq!(api.duplicated.as_ref().unwrap().len(), 1);
}

#[tokio::test]
async fn idempotent_requests_retry_through_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let client = StrataClient::builder()
        .app_id("pipeline-tests")
        .project("unit-test")
        .base_url(server.uri())
        .api_key("secret")
        .build()
        .unwrap();

    let response = client.get::<Value>("/flaky").await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn allowlisted_post_endpoints_retry_too() {
    let server = MockServer::start().await;
    let list_path = "/api/v1/projects/unit-test/assets/list";
    Mock::given(method("POST"))
        .and(path(list_path))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(list_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&server)
        .await;

    let client = StrataClient::builder()
        .app_id("pipeline-tests")
        .project("unit-test")
        .base_url(server.uri())
        .api_key("secret")
        .build()
        .unwrap();

    let response = client.post::<Value>(list_path, json!({})).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn unlisted_posts_do_not_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/projects/unit-test/assets"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = StrataClient::builder()
        .app_id("pipeline-tests")
        .project("unit-test")
        .base_url(server.uri())
        .api_key("secret")
        .build()
        .unwrap();

    let err = client
        .post::<Value>("/api/v1/projects/unit-test/assets", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn bulk_create_reports_partial_failure() {
    let server = MockServer::start().await;
    let assets_path = "/api/v1/projects/unit-test/assets";
    Mock::given(method("POST"))
        .and(path(assets_path))
        .and(body_partial_json(json!({"items": [{"name": "a"}]})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "items": [{"name": "a", "id": 1}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(assets_path))
        .and(body_partial_json(json!({"items": [{"name": "b"}]})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "invalid asset"}
        })))
        .mount(&server)
        .await;

    let client = StrataClient::builder()
        .app_id("pipeline-tests")
        .project("unit-test")
        .base_url(server.uri())
        .api_key("secret")
        .build()
        .unwrap();

    let assets = client.resource("assets").with_chunk_size(1);
    let items = vec![json!({"name": "a"}), json!({"name": "b"}), json!({"name": "c"})];
    let err = assets
        .create::<Value, Value>(&items)
        .await
        .unwrap_err();
    let bulk = err.as_bulk().expect("expected a bulk error");
    assert_eq!(bulk.succeeded, vec![json!({"name": "a"})]);
    // Sequential dispatch: the failing chunk and everything after it.
    assert_eq!(
        bulk.failed,
        vec![json!({"name": "b"}), json!({"name": "c"})]
    );
    assert_eq!(bulk.status, Some(400));
}

#[tokio::test]
async fn listing_walks_the_cursor_chain() {
    let server = MockServer::start().await;
    let list_path = "/api/v1/projects/unit-test/events/list";
    Mock::given(method("POST"))
        .and(path(list_path))
        .and(body_partial_json(json!({"cursor": "c1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": 3}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(list_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": 1}, {"id": 2}],
            "nextCursor": "c1"
        })))
        .mount(&server)
        .await;

    let client = StrataClient::builder()
        .app_id("pipeline-tests")
        .project("unit-test")
        .base_url(server.uri())
        .api_key("secret")
        .build()
        .unwrap();

    let list = client
        .resource("events")
        .list::<Value>(json!({"filter": {}}))
        .await
        .unwrap();
    assert_eq!(list.items.len(), 2);

    let all = list
        .pager()
        .to_array(strata_sdk::PageLimit::Unbounded)
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[2], json!({"id": 3}));
}

#[tokio::test]
async fn tracked_results_expose_response_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/projects/unit-test/timeseries/byids"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-request-id", "req-meta")
                .set_body_json(json!({"items": [{"id": 9}]})),
        )
        .mount(&server)
        .await;

    let client = StrataClient::builder()
        .app_id("pipeline-tests")
        .project("unit-test")
        .base_url(server.uri())
        .api_key("secret")
        .build()
        .unwrap();

    let tracked = client
        .resource("timeseries")
        .retrieve::<Value, Value>(&[json!({"id": 9})])
        .await
        .unwrap();
    assert_eq!(tracked.len(), 1);

    let metadata = client.get_metadata(&tracked).unwrap();
    assert_eq!(metadata.status, 200);
    assert_eq!(metadata.request_id(), Some("req-meta"));
}
