//! End-to-end tests against a running ingress.

use std::time::Duration;

use serde_json::Value;

mod common;

#[tokio::test]
async fn small_request_reaches_the_processor() {
    let mut config = common::test_config();
    config.size_guard.enabled = true;
    config.size_guard.max_body_bytes = 16;
    let ingress = common::start_ingress(config).await;
    let client = common::client();

    let res = client
        .post(format!("{}/orders?id=7", common::base_url(&ingress)))
        .body("sixteen bytes!!!")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "application/json");
    let summary: Value = res.json().await.unwrap();
    assert_eq!(summary["method"], "POST");
    assert_eq!(summary["target"], "/orders?id=7");
    assert_eq!(summary["body_bytes"], 16);
    assert_eq!(summary["shared_lane"], true);

    ingress.stop().await.unwrap();
}

#[tokio::test]
async fn oversized_request_gets_the_configured_rejection() {
    let mut config = common::test_config();
    config.size_guard.enabled = true;
    config.size_guard.max_body_bytes = 8;
    config.size_guard.reject_reason_text = "Payload exceeds 8 bytes".into();
    let ingress = common::start_ingress(config).await;
    let client = common::client();

    let res = client
        .post(common::base_url(&ingress))
        .body("nine bytes")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 413);
    assert_eq!(res.headers()["content-type"], "text/plain");
    assert_eq!(res.headers()["content-encoding"], "identity");
    assert_eq!(res.headers()["connection"], "keep-alive");
    assert_eq!(res.text().await.unwrap(), "Payload exceeds 8 bytes");

    ingress.stop().await.unwrap();
}

#[tokio::test]
async fn custom_reject_status_is_used() {
    let mut config = common::test_config();
    config.size_guard.enabled = true;
    config.size_guard.max_body_bytes = 0;
    config.size_guard.reject_status = 400;
    let ingress = common::start_ingress(config).await;

    let res = common::client()
        .put(common::base_url(&ingress))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    let empty = common::client()
        .get(common::base_url(&ingress))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 200);

    ingress.stop().await.unwrap();
}

#[tokio::test]
async fn connection_survives_a_rejection() {
    let mut config = common::test_config();
    config.size_guard.enabled = true;
    config.size_guard.max_body_bytes = 4;
    let ingress = common::start_ingress(config).await;
    let client = common::client();
    let url = common::base_url(&ingress);

    let first: Value = client.post(&url).body("ok").send().await.unwrap().json().await.unwrap();

    let rejected = client.post(&url).body("too long").send().await.unwrap();
    assert_eq!(rejected.status(), 413);
    rejected.bytes().await.unwrap();

    let third: Value = client.post(&url).body("ok").send().await.unwrap().json().await.unwrap();

    assert_eq!(first["connection_id"], third["connection_id"]);
    assert_ne!(first["request_id"], third["request_id"]);

    ingress.stop().await.unwrap();
}

#[tokio::test]
async fn dedicated_lanes_tag_messages() {
    let mut config = common::test_config();
    config.channel.shared = false;
    config.channel.lanes = 2;
    let ingress = common::start_ingress(config).await;

    let summary: Value = common::client()
        .get(common::base_url(&ingress))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(summary["shared_lane"], false);
    assert!(summary["lane"].as_u64().unwrap() < 2);

    ingress.stop().await.unwrap();
}

#[tokio::test]
async fn stop_drains_connections() {
    let mut config = common::test_config();
    config.timeouts.shutdown_grace_secs = 10;
    let ingress = common::start_ingress(config).await;
    let client = common::client();

    let res = client.get(common::base_url(&ingress)).send().await.unwrap();
    assert_eq!(res.status(), 200);
    res.bytes().await.unwrap();

    // Workers finish as soon as the lanes close, well inside the grace period.
    let tracker = ingress.pipeline().tracker().clone();
    tokio::time::timeout(Duration::from_secs(5), ingress.stop())
        .await
        .expect("shutdown should not wait out the grace period")
        .unwrap();
    assert_eq!(tracker.active_count(), 0);
}
