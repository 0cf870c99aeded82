//! End-to-end engine tests over real sockets: a client socket talks to the
//! bound engine, which relays to a scripted upstream.
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use hickory_proto::{
    op::{Message, MessageType, OpCode, Query, ResponseCode},
    rr::{Name, RData, RecordType},
    serialize::binary::{BinDecodable, BinEncodable},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, UdpSocket},
    sync::{broadcast, mpsc},
};
use warden_common::{Action, Signal, audit::{self, AuditConfig, AuditRecord}};
use warden_dns::{DnsConfig, DnsServer, server::BoundServer};
use warden_filter::{DecisionCache, MatchMode, Rule, RuleStore};

struct Harness {
    addr: SocketAddr,
    server: Arc<DnsServer>,
    audit_rx: mpsc::Receiver<AuditRecord>,
    shutdown: broadcast::Sender<Signal>,
    upstream_reply: &'static [u8],
}

/// Upstream stand-in answering every request with a canned blob.
async fn scripted_upstream(reply: &'static [u8]) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        while let Ok((_, peer)) = socket.recv_from(&mut buf).await {
            let _ = socket.send_to(reply, peer).await;
        }
    });
    addr
}

async fn start(rules: Vec<Rule>, cache_ttl: Duration, upstream: Option<SocketAddr>) -> Harness {
    const UPSTREAM_REPLY: &[u8] = b"verbatim-upstream-reply";

    let upstream_addr = match upstream {
        Some(addr) => addr,
        None => scripted_upstream(UPSTREAM_REPLY).await,
    };

    let cache = Arc::new(DecisionCache::with(cache_ttl, 1000));
    let store = Arc::new(RuleStore::new().with_cache(Arc::clone(&cache)));
    for rule in rules {
        store.upsert(rule).unwrap();
    }

    let (publisher, audit_rx) = audit::channel(&AuditConfig::default());
    let config = DnsConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        upstreams: vec![upstream_addr],
        upstream_timeout_secs: 1,
        ..DnsConfig::default()
    };

    let bound: BoundServer = DnsServer::new(config, store, cache, publisher)
        .bind()
        .await
        .expect("engine must bind");
    let addr = bound.local_addr().unwrap();
    let server = bound.handle();

    let (shutdown, _) = broadcast::channel(4);
    let receiver = shutdown.subscribe();
    tokio::spawn(bound.serve(receiver));

    Harness {
        addr,
        server,
        audit_rx,
        shutdown,
        upstream_reply: UPSTREAM_REPLY,
    }
}

fn query_bytes(name: &str, qtype: RecordType) -> Vec<u8> {
    let mut message = Message::new();
    message
        .set_id(0x1234)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    message.add_query(Query::query(Name::from_utf8(name).unwrap(), qtype));
    message.to_bytes().unwrap()
}

async fn exchange_udp(addr: SocketAddr, payload: &[u8]) -> Option<Vec<u8>> {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.connect(addr).await.unwrap();
    socket.send(payload).await.unwrap();

    let mut buf = vec![0u8; 4096];
    match tokio::time::timeout(Duration::from_millis(2000), socket.recv(&mut buf)).await {
        Ok(Ok(len)) => {
            buf.truncate(len);
            Some(buf)
        }
        _ => None,
    }
}

fn block_rule(id: &str, pattern: &str, priority: i32) -> Rule {
    Rule::new(id, Action::Block, pattern, MatchMode::Domain).with_priority(priority)
}

#[tokio::test]
async fn suffix_block_answers_with_sinkhole() {
    let harness = start(
        vec![block_rule("r1", "example.com", 100)],
        Duration::from_secs(300),
        None,
    )
    .await;

    let reply = exchange_udp(harness.addr, &query_bytes("ads.example.com.", RecordType::A))
        .await
        .expect("blocked query must be answered");
    let message = Message::from_bytes(&reply).unwrap();

    assert_eq!(message.id(), 0x1234);
    assert!(message.authoritative());
    assert_eq!(message.response_code(), ResponseCode::NoError);
    assert_eq!(message.answers().len(), 1);
    let answer = &message.answers()[0];
    assert_eq!(answer.ttl(), 60);
    match answer.data() {
        RData::A(a) => assert_eq!(a.0, std::net::Ipv4Addr::UNSPECIFIED),
        other => panic!("unexpected rdata {other:?}"),
    }

    let stats = harness.server.stats();
    assert_eq!(stats.blocked, 1);
    assert_eq!(stats.allowed, 0);

    let _ = harness.shutdown.send(Signal::Shutdown);
}

#[tokio::test]
async fn priority_tie_break_and_audit_rule_ids() {
    let rules = vec![
        block_rule("low", "example.com", 10),
        Rule::new("high", Action::Allow, "safe.example.com", MatchMode::Domain)
            .with_priority(100),
    ];
    let mut harness = start(rules, Duration::from_secs(300), None).await;

    // The allow rule wins for the safe name: relayed verbatim.
    let reply = exchange_udp(harness.addr, &query_bytes("safe.example.com.", RecordType::A))
        .await
        .expect("allowed query must be answered");
    assert_eq!(reply, harness.upstream_reply);

    // Everything else under example.com is sinkholed.
    let reply = exchange_udp(harness.addr, &query_bytes("bad.example.com.", RecordType::A))
        .await
        .expect("blocked query must be answered");
    let message = Message::from_bytes(&reply).unwrap();
    assert_eq!(message.answers().len(), 1);

    let first = harness.audit_rx.recv().await.unwrap();
    assert_eq!(first.decision.rule_id.as_deref(), Some("high"));
    let second = harness.audit_rx.recv().await.unwrap();
    assert_eq!(second.decision.rule_id.as_deref(), Some("low"));

    let _ = harness.shutdown.send(Signal::Shutdown);
}

#[tokio::test]
async fn cache_hit_skips_upstream_accounting_until_expiry() {
    let harness = start(Vec::new(), Duration::from_millis(200), None).await;
    let payload = query_bytes("news.example.org.", RecordType::A);

    exchange_udp(harness.addr, &payload).await.expect("first query answered");
    let stats = harness.server.stats();
    assert_eq!(stats.upstream_lookups, 1);
    assert_eq!(stats.cache_hits, 0);

    exchange_udp(harness.addr, &payload).await.expect("second query answered");
    let stats = harness.server.stats();
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.upstream_lookups, 1);

    // Let the cached decision expire and the accounting starts over.
    tokio::time::sleep(Duration::from_millis(250)).await;
    exchange_udp(harness.addr, &payload).await.expect("third query answered");
    let stats = harness.server.stats();
    assert_eq!(stats.upstream_lookups, 2);

    let _ = harness.shutdown.send(Signal::Shutdown);
}

#[tokio::test]
async fn rule_mutation_invalidates_cached_decisions() {
    let harness = start(Vec::new(), Duration::from_secs(300), None).await;
    let payload = query_bytes("site.test.", RecordType::A);

    let reply = exchange_udp(harness.addr, &payload).await.expect("allowed");
    assert_eq!(reply, harness.upstream_reply);

    harness
        .server
        .add_rule(block_rule("r3", "test", 1))
        .unwrap();

    // Immediately re-query: the insertion cleared the cache.
    let reply = exchange_udp(harness.addr, &payload).await.expect("blocked");
    let message = Message::from_bytes(&reply).unwrap();
    assert_eq!(message.answers().len(), 1);
    assert!(message.authoritative());

    let _ = harness.shutdown.send(Signal::Shutdown);
}

#[tokio::test]
async fn malformed_messages_are_dropped_and_counted() {
    let harness = start(Vec::new(), Duration::from_secs(300), None).await;

    let reply = exchange_udp(harness.addr, b"\x00\x01garbage").await;
    assert!(reply.is_none());
    assert_eq!(harness.server.stats().errors, 1);
    assert_eq!(harness.server.stats().queries, 0);

    let _ = harness.shutdown.send(Signal::Shutdown);
}

#[tokio::test]
async fn message_without_questions_is_dropped() {
    let harness = start(Vec::new(), Duration::from_secs(300), None).await;

    let mut message = Message::new();
    message
        .set_id(7)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query);
    let reply = exchange_udp(harness.addr, &message.to_bytes().unwrap()).await;

    assert!(reply.is_none());
    assert_eq!(harness.server.stats().errors, 1);

    let _ = harness.shutdown.send(Signal::Shutdown);
}

#[tokio::test]
async fn exhausted_upstreams_yield_servfail() {
    // An upstream that never answers.
    let dead = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    std::mem::forget(dead);

    let mut harness = start(Vec::new(), Duration::from_secs(300), Some(dead_addr)).await;

    let reply = exchange_udp(harness.addr, &query_bytes("slow.example.net.", RecordType::A))
        .await
        .expect("servfail must be returned");
    let message = Message::from_bytes(&reply).unwrap();
    assert_eq!(message.response_code(), ResponseCode::ServFail);
    assert!(message.answers().is_empty());
    assert_eq!(harness.server.stats().errors, 1);

    // The fresh decision is audited first, then the exhaustion.
    let first = harness.audit_rx.recv().await.unwrap();
    assert_eq!(first.decision.reason, "no matching rules");
    let second = harness.audit_rx.recv().await.unwrap();
    assert_eq!(second.decision.reason, "upstream exhausted");

    let _ = harness.shutdown.send(Signal::Shutdown);
}

#[tokio::test]
async fn tcp_listener_speaks_length_prefixed_messages() {
    let harness = start(
        vec![block_rule("r1", "example.com", 100)],
        Duration::from_secs(300),
        None,
    )
    .await;

    let payload = query_bytes("tracker.example.com.", RecordType::A);
    let mut stream = TcpStream::connect(harness.addr).await.unwrap();
    let len = u16::try_from(payload.len()).unwrap();
    stream.write_all(&len.to_be_bytes()).await.unwrap();
    stream.write_all(&payload).await.unwrap();

    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await.unwrap();
    let mut reply = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
    stream.read_exact(&mut reply).await.unwrap();

    let message = Message::from_bytes(&reply).unwrap();
    assert!(message.authoritative());
    assert_eq!(message.answers().len(), 1);

    let _ = harness.shutdown.send(Signal::Shutdown);
}

#[tokio::test]
async fn shutdown_stops_the_listeners() {
    let harness = start(Vec::new(), Duration::from_secs(300), None).await;
    let _ = harness.shutdown.send(Signal::Shutdown);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // After shutdown the socket no longer answers.
    let reply = exchange_udp(harness.addr, &query_bytes("late.example.org.", RecordType::A)).await;
    assert!(reply.is_none());
}
