mod common;

use common::{spawn_gateway, test_config, GAME_SERVICE, USER_SERVICE};
use mockito::Matcher;
use serde_json::Value;

#[tokio::test]
async fn test_status_route() {
    let gw = spawn_gateway(test_config()).await;
    let response = gw.http.get(gw.url("/status")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "Gateway is up and running!");
}

#[tokio::test]
async fn test_proxy_forwards_status_content_type_and_body() {
    let mut backend = mockito::Server::new_async().await;
    let mock = backend
        .mock("GET", "/users/42")
        .with_status(404)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"not found"}"#)
        .expect(1)
        .create_async()
        .await;

    let gw = spawn_gateway(test_config()).await;
    gw.register(USER_SERVICE, &backend);

    let response = gw.http.get(gw.url("/users/42")).send().await.unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    assert_eq!(response.text().await.unwrap(), r#"{"error":"not found"}"#);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_proxy_forwards_post_body() {
    let mut backend = mockito::Server::new_async().await;
    let mock = backend
        .mock("POST", "/game/answer")
        .match_body(r#"{"answer":3}"#)
        .with_status(200)
        .with_body("ok")
        .create_async()
        .await;

    let gw = spawn_gateway(test_config()).await;
    gw.register(GAME_SERVICE, &backend);

    let response = gw
        .http
        .post(gw.url("/game/answer"))
        .header("content-type", "application/json")
        .body(r#"{"answer":3}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_allow_listed_get_is_cached() {
    let mut backend = mockito::Server::new_async().await;
    let mock = backend
        .mock("GET", "/game/questions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"q":"2+2"}]"#)
        .expect(1)
        .create_async()
        .await;

    let gw = spawn_gateway(test_config()).await;
    gw.register(GAME_SERVICE, &backend);

    for _ in 0..3 {
        let response = gw.http.get(gw.url("/game/questions")).send().await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "application/json"
        );
        assert_eq!(response.text().await.unwrap(), r#"[{"q":"2+2"}]"#);
    }

    mock.assert_async().await;
    let stats = gw.gateway.cache().stats();
    assert_eq!(stats.stores, 1);
    assert_eq!(stats.hits, 2);
}

#[tokio::test]
async fn test_failing_instance_is_retried_then_bypassed() {
    let mut broken = mockito::Server::new_async().await;
    let broken_mock = broken
        .mock("GET", "/users/7")
        .with_status(500)
        .expect(2)
        .create_async()
        .await;
    let mut healthy = mockito::Server::new_async().await;
    let healthy_mock = healthy
        .mock("GET", "/users/7")
        .with_status(200)
        .with_body("seven")
        .expect(2)
        .create_async()
        .await;

    let gw = spawn_gateway(test_config().with_max_retries(1)).await;
    gw.register(USER_SERVICE, &broken);
    gw.register(USER_SERVICE, &healthy);

    // First request: two attempts on the broken instance, then failover.
    let response = gw.http.get(gw.url("/users/7")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "seven");

    // The broken instance's circuit is open; it is never tried again.
    let response = gw.http.get(gw.url("/users/7")).send().await.unwrap();
    assert_eq!(response.status(), 200);

    broken_mock.assert_async().await;
    healthy_mock.assert_async().await;
    assert_eq!(gw.events.events_of_kind("circuit_opened").len(), 1);
    assert_eq!(gw.events.events_of_kind("redirected").len(), 1);
}

#[tokio::test]
async fn test_no_instances_is_service_unavailable() {
    let gw = spawn_gateway(test_config()).await;

    let response = gw.http.get(gw.url("/game/questions")).send().await.unwrap();
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["message"],
        "game engine service is currently unavailable. Please try again later."
    );
}

#[tokio::test]
async fn test_exhausted_redirects_report_last_error() {
    let mut first = mockito::Server::new_async().await;
    first
        .mock("GET", "/users/1")
        .with_status(502)
        .create_async()
        .await;
    let mut second = mockito::Server::new_async().await;
    second
        .mock("GET", "/users/1")
        .with_status(503)
        .create_async()
        .await;

    let gw = spawn_gateway(test_config().with_max_retries(0).with_max_redirects(1)).await;
    gw.register(USER_SERVICE, &first);
    gw.register(USER_SERVICE, &second);

    let response = gw.http.get(gw.url("/users/1")).send().await.unwrap();
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Unable to process the request");
    assert!(body["last_error"].as_str().unwrap().contains("Max retries reached"));
}

#[tokio::test]
async fn test_unknown_prefix_is_not_found() {
    let gw = spawn_gateway(test_config()).await;
    let response = gw.http.get(gw.url("/admin/circuits")).send().await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_rate_limit_rejects_excess_requests_but_not_status() {
    let mut backend = mockito::Server::new_async().await;
    backend
        .mock("GET", "/users/1")
        .with_status(200)
        .create_async()
        .await;

    let gw = spawn_gateway(test_config().with_rate_limit("2/300")).await;
    gw.register(USER_SERVICE, &backend);

    for _ in 0..2 {
        let response = gw.http.get(gw.url("/users/1")).send().await.unwrap();
        assert_eq!(response.status(), 200);
    }
    let response = gw.http.get(gw.url("/users/1")).send().await.unwrap();
    assert_eq!(response.status(), 429);
    let retry_after: u64 = response.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=150).contains(&retry_after));
    assert_eq!(
        response.text().await.unwrap(),
        "Too many requests, please try again later."
    );

    let response = gw.http.get(gw.url("/status")).send().await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_accept_encoding_is_not_forwarded() {
    let mut backend = mockito::Server::new_async().await;
    let mock = backend
        .mock("GET", "/users/5")
        .match_header("accept-encoding", Matcher::Missing)
        .with_status(200)
        .with_body("plain")
        .expect(1)
        .create_async()
        .await;

    let gw = spawn_gateway(test_config()).await;
    gw.register(USER_SERVICE, &backend);

    let response = gw
        .http
        .get(gw.url("/users/5"))
        .header("accept-encoding", "gzip")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "plain");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_encoded_backend_body_keeps_its_content_encoding() {
    let mut backend = mockito::Server::new_async().await;
    backend
        .mock("GET", "/game/archive")
        .with_status(200)
        .with_header("content-encoding", "gzip")
        .with_body(vec![0x1f, 0x8b, 0x08, 0x00])
        .create_async()
        .await;

    let gw = spawn_gateway(test_config()).await;
    gw.register(GAME_SERVICE, &backend);

    let response = gw.http.get(gw.url("/game/archive")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-encoding"].to_str().unwrap(),
        "gzip"
    );
    assert_eq!(
        response.bytes().await.unwrap().as_ref(),
        &[0x1f, 0x8b, 0x08, 0x00]
    );
}

#[tokio::test]
async fn test_non_post_composite_path_is_proxied() {
    let mut backend = mockito::Server::new_async().await;
    let mock = backend
        .mock("GET", "/users/create_with_game")
        .with_status(200)
        .with_body("from user service")
        .expect(1)
        .create_async()
        .await;

    let gw = spawn_gateway(test_config()).await;
    gw.register(USER_SERVICE, &backend);

    let response = gw
        .http
        .get(gw.url("/users/create_with_game"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "from user service");
    mock.assert_async().await;
}
