//! Synthesized replies for the block path.

use std::net::{Ipv4Addr, Ipv6Addr};

use hickory_proto::{
    op::{Message, MessageType, OpCode, ResponseCode},
    rr::{
        RData, Record, RecordType,
        rdata::{A, AAAA},
    },
};

/// TTL of synthesized sinkhole answers.
pub const SINKHOLE_TTL: u32 = 60;

/// Build the authoritative reply for a blocked query.
///
/// `A` queries receive exactly one A record with the IPv4 sinkhole, `AAAA`
/// one AAAA record with the IPv6 sinkhole. Every other type gets a reply
/// with an empty answer section.
#[must_use]
pub fn block_response(request: &Message, ipv4: Ipv4Addr, ipv6: Ipv6Addr) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(OpCode::Query)
        .set_authoritative(true)
        .set_recursion_desired(request.recursion_desired())
        .set_recursion_available(true)
        .set_response_code(ResponseCode::NoError);

    if let Some(query) = request.queries().first() {
        let name = query.name().clone();
        let rdata = match query.query_type() {
            RecordType::A => Some(RData::A(A(ipv4))),
            RecordType::AAAA => Some(RData::AAAA(AAAA(ipv6))),
            _ => None,
        };

        response.add_query(query.clone());
        if let Some(rdata) = rdata {
            response.add_answer(Record::from_rdata(name, SINKHOLE_TTL, rdata));
        }
    }

    response
}

/// SERVFAIL reply, used when every upstream failed.
#[must_use]
pub fn servfail_response(request: &Message) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(request.recursion_desired())
        .set_recursion_available(true)
        .set_response_code(ResponseCode::ServFail);

    if let Some(query) = request.queries().first() {
        response.add_query(query.clone());
    }

    response
}
