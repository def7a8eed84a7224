//! Connection-level behaviour: assembly, size guard, handoff and cleanup together.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::{header, Method, StatusCode, Version};
use uuid::Uuid;

use super::*;
use crate::config::{BackpressurePolicy, IngressConfig, UpstreamConfig};
use crate::handoff::LaneReceiver;
use crate::net::ConnectionInfo;
use crate::upstream::{IdlePool, LinkError, RouteKey, UpstreamHandle};

fn remote() -> std::net::SocketAddr {
    "192.0.2.10:51000".parse().unwrap()
}

fn local() -> std::net::SocketAddr {
    "192.0.2.1:8080".parse().unwrap()
}

fn config(max_body_bytes: Option<usize>) -> IngressConfig {
    let mut config = IngressConfig::default();
    if let Some(max) = max_body_bytes {
        config.size_guard.enabled = true;
        config.size_guard.max_body_bytes = max;
    }
    config.size_guard.reject_status = 413;
    config.size_guard.reject_reason_text = "body over limit".into();
    config
}

fn build(config: &IngressConfig) -> (Pipeline, Vec<LaneReceiver>, Arc<IdlePool>) {
    let pool = Arc::new(IdlePool::new(&UpstreamConfig::default()));
    let (pipeline, receivers) = Pipeline::new(config, pool.clone()).unwrap();
    (pipeline, receivers, pool)
}

fn head(target: &str) -> Fragment {
    Fragment::Head(RequestHead::new(Method::GET, target, Version::HTTP_11))
}

fn chunk(data: &'static [u8]) -> Fragment {
    Fragment::Chunk(Bytes::from_static(data))
}

fn end() -> Fragment {
    Fragment::End(Bytes::new())
}

async fn feed(context: &mut ConnectionContext, fragments: Vec<Fragment>) -> Vec<Disposition> {
    let mut dispositions = Vec::new();
    for fragment in fragments {
        dispositions.push(context.on_fragment(fragment).await);
    }
    dispositions
}

fn drain(receiver: &mut LaneReceiver) -> Vec<InboundMessage> {
    std::iter::from_fn(|| receiver.try_recv()).collect()
}

#[tokio::test]
async fn unlimited_request_is_published_whole() {
    let (pipeline, mut receivers, _pool) = build(&config(None));
    let (mut context, mut endpoints) = pipeline.connect(remote(), local());

    let dispositions = feed(&mut context, vec![head("/x"), chunk(b"ab"), chunk(b"cd"), end()]).await;
    assert_eq!(
        dispositions,
        vec![
            Disposition::Pending,
            Disposition::Pending,
            Disposition::Pending,
            Disposition::Published
        ]
    );

    let published = drain(&mut receivers[0]);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].method(), &Method::GET);
    assert_eq!(published[0].target(), "/x");
    assert_eq!(published[0].body(), Bytes::from_static(b"abcd"));
    assert!(published[0].is_complete());
    assert!(endpoints.responses.try_recv().is_err());
}

#[tokio::test]
async fn oversized_request_is_rejected_and_never_published() {
    let (pipeline, mut receivers, _pool) = build(&config(Some(3)));
    let (mut context, mut endpoints) = pipeline.connect(remote(), local());

    let dispositions = feed(&mut context, vec![head("/x"), chunk(b"ab"), chunk(b"cd"), end()]).await;
    assert_eq!(dispositions.last(), Some(&Disposition::Rejected));

    let response = endpoints.responses.try_recv().unwrap();
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.body, Bytes::from_static(b"body over limit"));
    assert_eq!(response.headers[header::CONTENT_LENGTH], "15");
    assert!(drain(&mut receivers[0]).is_empty());
}

#[tokio::test]
async fn body_at_limit_passes_and_one_over_fails() {
    let (pipeline, mut receivers, _pool) = build(&config(Some(4)));
    let (mut context, mut endpoints) = pipeline.connect(remote(), local());

    let at_limit = feed(&mut context, vec![head("/a"), chunk(b"abcd"), end()]).await;
    let over = feed(&mut context, vec![head("/b"), chunk(b"abcd"), Fragment::End(Bytes::from_static(b"e"))]).await;

    assert_eq!(at_limit.last(), Some(&Disposition::Published));
    assert_eq!(over.last(), Some(&Disposition::Rejected));
    assert_eq!(drain(&mut receivers[0]).len(), 1);
    assert_eq!(endpoints.responses.try_recv().unwrap().status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn publish_count_matches_accepted_count() {
    let (pipeline, mut receivers, _pool) = build(&config(Some(2)));
    let (mut context, mut endpoints) = pipeline.connect(remote(), local());

    let bodies: [&'static [u8]; 5] = [b"", b"ab", b"abc", b"a", b"abcdef"];
    let mut accepted = 0;
    for body in bodies {
        let outcome = feed(&mut context, vec![head("/"), chunk(body), end()]).await;
        if outcome.last() == Some(&Disposition::Published) {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 3);
    let published = drain(&mut receivers[0]);
    assert_eq!(published.len(), accepted);
    let rejections = std::iter::from_fn(|| endpoints.responses.try_recv().ok()).count();
    assert_eq!(rejections, 2);
}

#[tokio::test]
async fn chunk_on_fresh_connection_is_ignored() {
    let (pipeline, mut receivers, _pool) = build(&config(None));
    let (mut context, mut endpoints) = pipeline.connect(remote(), local());

    assert_eq!(context.on_fragment(chunk(b"stray")).await, Disposition::Dropped);
    assert_eq!(context.on_fragment(end()).await, Disposition::Dropped);
    assert!(drain(&mut receivers[0]).is_empty());
    assert!(endpoints.responses.try_recv().is_err());
}

#[tokio::test]
async fn same_connection_messages_keep_completion_order() {
    let (pipeline, mut receivers, _pool) = build(&config(None));
    let (mut context, _endpoints) = pipeline.connect(remote(), local());

    feed(&mut context, vec![head("/first"), chunk(b"1"), end()]).await;
    feed(&mut context, vec![head("/second"), chunk(b"2"), end()]).await;

    let targets: Vec<_> = drain(&mut receivers[0])
        .iter()
        .map(|m| m.target().to_string())
        .collect();
    assert_eq!(targets, vec!["/first", "/second"]);
}

#[tokio::test]
async fn overlapping_start_publishes_only_the_newest() {
    let (pipeline, mut receivers, _pool) = build(&config(None));
    let (mut context, _endpoints) = pipeline.connect(remote(), local());

    feed(&mut context, vec![head("/abandoned"), chunk(b"half")]).await;
    feed(&mut context, vec![head("/kept"), chunk(b"whole"), end()]).await;

    let published = drain(&mut receivers[0]);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].target(), "/kept");
    assert_eq!(published[0].body(), Bytes::from_static(b"whole"));
}

#[tokio::test]
async fn full_lane_answers_busy() {
    let mut cfg = config(None);
    cfg.channel.capacity = 1;
    cfg.channel.backpressure = BackpressurePolicy::Reject;
    let (pipeline, mut receivers, _pool) = build(&cfg);
    let (mut context, mut endpoints) = pipeline.connect(remote(), local());

    let first = feed(&mut context, vec![head("/1"), end()]).await;
    let second = feed(&mut context, vec![head("/2"), end()]).await;

    assert_eq!(first.last(), Some(&Disposition::Published));
    assert_eq!(second.last(), Some(&Disposition::Failed("full")));
    assert_eq!(endpoints.responses.try_recv().unwrap().status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(drain(&mut receivers[0]).len(), 1);
}

#[tokio::test]
async fn close_mid_request_discards_and_releases() {
    let (pipeline, mut receivers, pool) = build(&config(None));
    let (mut context, _endpoints) = pipeline.connect(remote(), local());
    assert_eq!(pipeline.tracker().active_count(), 1);
    assert_eq!(pipeline.channel().bound_connections(0), 1);

    let route = RouteKey::new("http", "backend", 9000);
    context
        .routes_mut()
        .put(route.clone(), UpstreamHandle::new(route.clone()));
    feed(&mut context, vec![head("/partial"), chunk(b"abc")]).await;
    assert!(context.in_flight().is_some());

    context.close(CloseReason::Fault("connection reset".into()));

    assert!(drain(&mut receivers[0]).is_empty());
    assert_eq!(pool.idle_count(&route), 1);
    assert_eq!(pipeline.tracker().active_count(), 0);
    assert_eq!(pipeline.channel().bound_connections(0), 0);
}

#[derive(Default)]
struct RecordingHooks {
    events: Mutex<Vec<String>>,
    veto_target: Option<&'static str>,
}

impl RecordingHooks {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl IngressHooks for RecordingHooks {
    fn connection_opened(&self, _connection: &ConnectionInfo) {
        self.push("opened".into());
    }

    fn connection_closed(&self, _connection: &ConnectionInfo) {
        self.push("closed".into());
    }

    fn request_received(&self, message: &InboundMessage) {
        self.push(format!("received {}", message.target()));
    }

    fn admit(&self, message: &InboundMessage) -> Admission {
        if Some(message.target()) == self.veto_target {
            Admission::Respond(OutboundResponse::text(StatusCode::FORBIDDEN, "denied"))
        } else {
            Admission::Continue
        }
    }

    fn request_handed_off(&self, _connection: &ConnectionInfo, _request_id: Uuid) {
        self.push("handed off".into());
    }
}

#[tokio::test]
async fn hooks_follow_the_request_lifecycle() {
    let hooks = Arc::new(RecordingHooks {
        veto_target: Some("/private"),
        ..Default::default()
    });
    let pool = Arc::new(IdlePool::new(&UpstreamConfig::default()));
    let (pipeline, mut receivers) =
        Pipeline::with_hooks(&config(None), pool, hooks.clone()).unwrap();
    let (mut context, mut endpoints) = pipeline.connect(remote(), local());

    let vetoed = feed(&mut context, vec![head("/private"), chunk(b"secret"), end()]).await;
    assert_eq!(vetoed, vec![Disposition::Pending, Disposition::Pending, Disposition::Answered]);
    assert_eq!(endpoints.responses.try_recv().unwrap().status, StatusCode::FORBIDDEN);

    let allowed = feed(&mut context, vec![head("/public"), end()]).await;
    assert_eq!(allowed.last(), Some(&Disposition::Published));
    context.close(CloseReason::Closed);

    assert_eq!(drain(&mut receivers[0]).len(), 1);
    assert_eq!(
        *hooks.events.lock().unwrap(),
        vec![
            "opened".to_string(),
            "received /private".to_string(),
            "received /public".to_string(),
            "handed off".to_string(),
            "closed".to_string(),
        ]
    );
}

#[tokio::test]
async fn consumers_reach_the_registry_through_the_driver() {
    let (pipeline, mut receivers, pool) = build(&config(None));
    let (driver, transport) = pipeline.open_connection(remote(), local());
    let running = tokio::spawn(driver.run());

    transport.send(head("/proxy")).await.unwrap();
    transport.send(end()).await.unwrap();
    let mut message = receivers[0].recv().await.unwrap();

    let route = RouteKey::new("http", "backend", 9000);
    let first = UpstreamHandle::new(route.clone());
    let second = UpstreamHandle::new(route.clone());
    let link = message.upstream().clone();

    assert_eq!(link.get(route.clone()).await, Ok(None));
    assert_eq!(link.put(route.clone(), first.clone()).await, Ok(None));
    assert_eq!(link.put(route.clone(), second.clone()).await, Ok(Some(first)));
    assert_eq!(link.get(route.clone()).await, Ok(Some(second.clone())));

    message
        .respond(OutboundResponse::text(StatusCode::OK, "done"))
        .unwrap();
    assert_eq!(transport.next_response().await.unwrap().body, Bytes::from_static(b"done"));

    transport.close(CloseReason::Closed).await;
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(pool.checkout(&route), Some(second));
    assert_eq!(link.remove(route).await, Err(LinkError::ConnectionClosed));
}

#[tokio::test]
async fn unanswered_message_still_answers_the_client() {
    let (pipeline, mut receivers, _pool) = build(&config(None));
    let (driver, transport) = pipeline.open_connection(remote(), local());
    tokio::spawn(driver.run());

    transport.send(head("/ignored")).await.unwrap();
    transport.send(end()).await.unwrap();
    let message = receivers[0].recv().await.unwrap();
    drop(message);

    let response = tokio::time::timeout(Duration::from_millis(500), transport.next_response())
        .await
        .expect("client must not be left waiting")
        .unwrap();
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body, Bytes::from_static(b"Request dropped"));

    transport.close(CloseReason::Closed).await;
}

#[tokio::test]
async fn registry_is_served_while_publish_waits_for_room() {
    let mut cfg = config(None);
    cfg.channel.capacity = 1;
    cfg.channel.backpressure = BackpressurePolicy::Block;
    cfg.channel.publish_timeout_ms = 10_000;
    let (pipeline, mut receivers, _pool) = build(&cfg);
    let (driver, transport) = pipeline.open_connection(remote(), local());
    tokio::spawn(driver.run());

    for target in ["/1", "/2", "/3"] {
        transport.send(head(target)).await.unwrap();
        transport.send(end()).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Taking "/1" lets "/2" in; the driver then waits for room for "/3".
    let mut first = receivers[0].try_recv().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pipeline.channel().depth(0), 1);

    let route = RouteKey::new("http", "backend", 9000);
    let handle = UpstreamHandle::new(route.clone());
    let put = tokio::time::timeout(
        Duration::from_secs(1),
        first.upstream().put(route.clone(), handle.clone()),
    )
    .await
    .expect("registry must answer while publishing");
    assert_eq!(put, Ok(None));

    let mut rest = Vec::new();
    for _ in 0..2 {
        let message = tokio::time::timeout(Duration::from_secs(1), receivers[0].recv())
            .await
            .unwrap()
            .unwrap();
        rest.push(message);
    }
    assert_eq!(rest[1].target(), "/3");
    assert_eq!(rest[1].upstream().get(route).await, Ok(Some(handle)));

    first
        .respond(OutboundResponse::text(StatusCode::OK, "one"))
        .unwrap();
    transport.close(CloseReason::Closed).await;
}
