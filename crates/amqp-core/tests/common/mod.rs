#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use amqp_core::{
    Connection, ConnectionConfig, Frame, MethodSig, MethodSpec, MethodTable, Transport, Value,
    dumps, loads,
};

pub const REQUEST: MethodSig = MethodSig::new(100, 10);
pub const RESPONSE: MethodSig = MethodSig::new(100, 11);
pub const EVENT: MethodSig = MethodSig::new(100, 20);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The 0-9-1 catalog plus a small request/response/event schema.
pub fn test_methods() -> Arc<MethodTable> {
    let mut table = amqp_core::catalog::amqp_0_9_1();
    table.insert(REQUEST, MethodSpec::new("test.request", ""));
    table.insert(RESPONSE, MethodSpec::new("test.response", "l"));
    table.insert(EVENT, MethodSpec::new("test.event", "l"));
    Arc::new(table)
}

/// A connection over an in-memory transport and the peer's end of it.
pub fn connect() -> (Connection, Transport) {
    connect_with(ConnectionConfig::default())
}

pub fn connect_with(config: ConnectionConfig) -> (Connection, Transport) {
    init_tracing();
    let (local, peer) = Transport::mem_pair();
    (Connection::with_methods(local, test_methods(), config), peer)
}

pub fn method(channel_id: u16, sig: MethodSig, format: &str, values: Vec<Value>) -> Frame {
    Frame::new(channel_id, sig, dumps(format, &values).expect("encode"))
}

pub async fn send(peer: &Transport, frame: Frame) {
    peer.send_frame(frame).await.expect("peer send");
}

pub async fn recv(peer: &Transport) -> Frame {
    tokio::time::timeout(Duration::from_secs(5), peer.recv_frame())
        .await
        .expect("peer recv timed out")
        .expect("peer recv")
}

/// Receive the next frame and check its channel and signature.
pub async fn expect(peer: &Transport, channel_id: u16, sig: MethodSig) -> Frame {
    let frame = recv(peer).await;
    assert_eq!(frame.channel_id, channel_id, "unexpected channel for {}", frame.sig);
    assert_eq!(frame.sig, sig);
    frame
}

pub fn decode(format: &str, frame: &Frame) -> Vec<Value> {
    loads(format, &frame.payload, 0).expect("decode").0
}

/// True if no frame reaches the peer within a short grace period.
pub async fn nothing_sent(peer: &Transport) -> bool {
    !matches!(
        tokio::time::timeout(Duration::from_millis(50), peer.recv_frame()).await,
        Ok(Ok(_))
    )
}
