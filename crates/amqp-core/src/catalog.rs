//! AMQP 0-9-1 method catalog.
//!
//! Covers the connection, channel, exchange, queue and basic classes. Formats
//! follow the argument order of the 0-9-1 XML definition, with reserved
//! fields kept so payloads line up with what brokers send.

use crate::{MethodSig, MethodSpec, MethodTable};

pub const CONNECTION_START: MethodSig = MethodSig::new(10, 10);
pub const CONNECTION_START_OK: MethodSig = MethodSig::new(10, 11);
pub const CONNECTION_SECURE: MethodSig = MethodSig::new(10, 20);
pub const CONNECTION_SECURE_OK: MethodSig = MethodSig::new(10, 21);
pub const CONNECTION_TUNE: MethodSig = MethodSig::new(10, 30);
pub const CONNECTION_TUNE_OK: MethodSig = MethodSig::new(10, 31);
pub const CONNECTION_OPEN: MethodSig = MethodSig::new(10, 40);
pub const CONNECTION_OPEN_OK: MethodSig = MethodSig::new(10, 41);
pub const CONNECTION_CLOSE: MethodSig = MethodSig::new(10, 50);
pub const CONNECTION_CLOSE_OK: MethodSig = MethodSig::new(10, 51);
pub const CONNECTION_BLOCKED: MethodSig = MethodSig::new(10, 60);
pub const CONNECTION_UNBLOCKED: MethodSig = MethodSig::new(10, 61);

pub const CHANNEL_OPEN: MethodSig = MethodSig::new(20, 10);
pub const CHANNEL_OPEN_OK: MethodSig = MethodSig::new(20, 11);
pub const CHANNEL_FLOW: MethodSig = MethodSig::new(20, 20);
pub const CHANNEL_FLOW_OK: MethodSig = MethodSig::new(20, 21);
pub const CHANNEL_CLOSE: MethodSig = MethodSig::new(20, 40);
pub const CHANNEL_CLOSE_OK: MethodSig = MethodSig::new(20, 41);

pub const EXCHANGE_DECLARE: MethodSig = MethodSig::new(40, 10);
pub const EXCHANGE_DECLARE_OK: MethodSig = MethodSig::new(40, 11);
pub const EXCHANGE_DELETE: MethodSig = MethodSig::new(40, 20);
pub const EXCHANGE_DELETE_OK: MethodSig = MethodSig::new(40, 21);

pub const QUEUE_DECLARE: MethodSig = MethodSig::new(50, 10);
pub const QUEUE_DECLARE_OK: MethodSig = MethodSig::new(50, 11);
pub const QUEUE_BIND: MethodSig = MethodSig::new(50, 20);
pub const QUEUE_BIND_OK: MethodSig = MethodSig::new(50, 21);
pub const QUEUE_PURGE: MethodSig = MethodSig::new(50, 30);
pub const QUEUE_PURGE_OK: MethodSig = MethodSig::new(50, 31);
pub const QUEUE_DELETE: MethodSig = MethodSig::new(50, 40);
pub const QUEUE_DELETE_OK: MethodSig = MethodSig::new(50, 41);

pub const BASIC_QOS: MethodSig = MethodSig::new(60, 10);
pub const BASIC_QOS_OK: MethodSig = MethodSig::new(60, 11);
pub const BASIC_CONSUME: MethodSig = MethodSig::new(60, 20);
pub const BASIC_CONSUME_OK: MethodSig = MethodSig::new(60, 21);
pub const BASIC_CANCEL: MethodSig = MethodSig::new(60, 30);
pub const BASIC_CANCEL_OK: MethodSig = MethodSig::new(60, 31);
pub const BASIC_PUBLISH: MethodSig = MethodSig::new(60, 40);
pub const BASIC_RETURN: MethodSig = MethodSig::new(60, 50);
pub const BASIC_DELIVER: MethodSig = MethodSig::new(60, 60);
pub const BASIC_GET: MethodSig = MethodSig::new(60, 70);
pub const BASIC_GET_OK: MethodSig = MethodSig::new(60, 71);
pub const BASIC_GET_EMPTY: MethodSig = MethodSig::new(60, 72);
pub const BASIC_ACK: MethodSig = MethodSig::new(60, 80);
pub const BASIC_REJECT: MethodSig = MethodSig::new(60, 90);
pub const BASIC_NACK: MethodSig = MethodSig::new(60, 120);

/// Argument format of connection.close and channel.close:
/// reply code, reply text, failing class id, failing method id.
pub const CLOSE_ARGS: &str = "BsBB";

/// Build the 0-9-1 method table.
pub fn amqp_0_9_1() -> MethodTable {
    MethodTable::new()
        .with(CONNECTION_START, MethodSpec::new("connection.start", "ooFSS"))
        .with(CONNECTION_START_OK, MethodSpec::new("connection.start-ok", "FsSs"))
        .with(CONNECTION_SECURE, MethodSpec::new("connection.secure", "S"))
        .with(CONNECTION_SECURE_OK, MethodSpec::new("connection.secure-ok", "S"))
        .with(CONNECTION_TUNE, MethodSpec::new("connection.tune", "BlB"))
        .with(CONNECTION_TUNE_OK, MethodSpec::new("connection.tune-ok", "BlB"))
        .with(CONNECTION_OPEN, MethodSpec::new("connection.open", "ssb"))
        .with(CONNECTION_OPEN_OK, MethodSpec::new("connection.open-ok", "s"))
        .with(CONNECTION_CLOSE, MethodSpec::new("connection.close", CLOSE_ARGS))
        .with(CONNECTION_CLOSE_OK, MethodSpec::new("connection.close-ok", ""))
        .with(CONNECTION_BLOCKED, MethodSpec::new("connection.blocked", "s"))
        .with(CONNECTION_UNBLOCKED, MethodSpec::new("connection.unblocked", ""))
        .with(CHANNEL_OPEN, MethodSpec::new("channel.open", "s"))
        .with(CHANNEL_OPEN_OK, MethodSpec::new("channel.open-ok", "S"))
        .with(CHANNEL_FLOW, MethodSpec::new("channel.flow", "b"))
        .with(CHANNEL_FLOW_OK, MethodSpec::new("channel.flow-ok", "b"))
        .with(CHANNEL_CLOSE, MethodSpec::new("channel.close", CLOSE_ARGS))
        .with(CHANNEL_CLOSE_OK, MethodSpec::new("channel.close-ok", ""))
        .with(EXCHANGE_DECLARE, MethodSpec::new("exchange.declare", "BssbbbbbF"))
        .with(EXCHANGE_DECLARE_OK, MethodSpec::new("exchange.declare-ok", ""))
        .with(EXCHANGE_DELETE, MethodSpec::new("exchange.delete", "Bsbb"))
        .with(EXCHANGE_DELETE_OK, MethodSpec::new("exchange.delete-ok", ""))
        .with(QUEUE_DECLARE, MethodSpec::new("queue.declare", "BsbbbbbF"))
        .with(QUEUE_DECLARE_OK, MethodSpec::new("queue.declare-ok", "sll"))
        .with(QUEUE_BIND, MethodSpec::new("queue.bind", "BsssbF"))
        .with(QUEUE_BIND_OK, MethodSpec::new("queue.bind-ok", ""))
        .with(QUEUE_PURGE, MethodSpec::new("queue.purge", "Bsb"))
        .with(QUEUE_PURGE_OK, MethodSpec::new("queue.purge-ok", "l"))
        .with(QUEUE_DELETE, MethodSpec::new("queue.delete", "Bsbbb"))
        .with(QUEUE_DELETE_OK, MethodSpec::new("queue.delete-ok", "l"))
        .with(BASIC_QOS, MethodSpec::new("basic.qos", "lBb"))
        .with(BASIC_QOS_OK, MethodSpec::new("basic.qos-ok", ""))
        .with(BASIC_CONSUME, MethodSpec::new("basic.consume", "BssbbbbF"))
        .with(BASIC_CONSUME_OK, MethodSpec::new("basic.consume-ok", "s"))
        .with(BASIC_CANCEL, MethodSpec::new("basic.cancel", "sb"))
        .with(BASIC_CANCEL_OK, MethodSpec::new("basic.cancel-ok", "s"))
        .with(BASIC_PUBLISH, MethodSpec::with_content("basic.publish", "Bssbb"))
        .with(BASIC_RETURN, MethodSpec::with_content("basic.return", "Bsss"))
        .with(BASIC_DELIVER, MethodSpec::with_content("basic.deliver", "sLbss"))
        .with(BASIC_GET, MethodSpec::new("basic.get", "Bsb"))
        .with(BASIC_GET_OK, MethodSpec::with_content("basic.get-ok", "Lbssl"))
        .with(BASIC_GET_EMPTY, MethodSpec::new("basic.get-empty", "s"))
        .with(BASIC_ACK, MethodSpec::new("basic.ack", "Lb"))
        .with(BASIC_REJECT, MethodSpec::new("basic.reject", "Lb"))
        .with(BASIC_NACK, MethodSpec::new("basic.nack", "Lbb"))
}
