//! Per-query worker logic.
//!
//! One invocation per incoming message. The audit publish for a decision
//! happens before the reply is produced, so the record always
//! happens-before the client sees an answer.

use hickory_proto::{
    op::Message,
    serialize::binary::{BinDecodable, BinEncodable},
};
use tracing::{debug, trace};
use warden_common::audit::{AuditError, AuditRecord};
use warden_filter::{canonicalize, evaluate, fingerprint};

use crate::sinkhole;

use super::DnsServer;

/// Handle one wire message and produce the reply bytes, or `None` to drop.
pub(super) async fn handle(server: &DnsServer, payload: &[u8], transport: &str) -> Option<Vec<u8>> {
    let request = match Message::from_bytes(payload) {
        Ok(message) => message,
        Err(err) => {
            debug!(%err, transport, "dropping malformed message");
            server.stats.record_error();
            return None;
        }
    };

    // A message with no question has nothing to evaluate or answer.
    let Some(question) = request.queries().first() else {
        debug!(transport, "dropping message without questions");
        server.stats.record_error();
        return None;
    };

    let canonical = canonicalize(&question.name().to_utf8());
    server.stats.record_query();

    // Wire queries carry no process attribution; scoped rules participate
    // through the evaluator API and scoped cache entries through
    // inventory-driven invalidation.
    let key = fingerprint(&canonical, None);
    let (decision, fresh) = match server.cache.lookup(&key) {
        Some(decision) => {
            server.stats.record_cache_hit();
            trace!(query = %canonical, "cache hit");
            (decision, false)
        }
        None => {
            let decision = evaluate(&server.store.snapshot(), &canonical, None);
            server.cache.store(key, decision.clone());
            publish_audit(
                server,
                AuditRecord::new(decision.clone()).with_detail("transport", transport),
            );
            (decision, true)
        }
    };

    if decision.is_block() {
        server.stats.record_blocked();
        let response =
            sinkhole::block_response(&request, server.config.block_ipv4, server.config.block_ipv6);
        return encode(server, response);
    }

    // Allow and Log both forward the original bytes and relay the upstream
    // reply verbatim.
    match server.upstreams.exchange(payload, &canonical).await {
        Ok(reply) => {
            server.stats.record_allowed();
            if fresh {
                server.stats.record_upstream_lookup();
            }
            Some(reply)
        }
        Err(err) => {
            debug!(query = %canonical, %err, "upstream exhausted");
            server.stats.record_error();
            publish_audit(
                server,
                AuditRecord::new(decision.with_reason("upstream exhausted"))
                    .with_detail("transport", transport),
            );
            encode(server, sinkhole::servfail_response(&request))
        }
    }
}

fn publish_audit(server: &DnsServer, record: AuditRecord) {
    match server.audit.publish(record) {
        Ok(()) => {}
        Err(AuditError::SinkFull | AuditError::Closed) => {
            server.stats.record_error();
        }
    }
}

fn encode(server: &DnsServer, response: Message) -> Option<Vec<u8>> {
    match response.to_bytes() {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            debug!(%err, "failed to encode response");
            server.stats.record_error();
            None
        }
    }
}
