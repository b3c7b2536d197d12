mod common;

use std::time::Duration;

use amqp_core::catalog::{
    CHANNEL_CLOSE, CHANNEL_CLOSE_OK, CHANNEL_OPEN, CHANNEL_OPEN_OK, CLOSE_ARGS, CONNECTION_CLOSE,
    CONNECTION_CLOSE_OK,
};
use amqp_core::{ChannelError, ChannelState, Close, ConnectionConfig, MethodCall, Value, dumps};

use common::*;

fn close_values(code: u16, text: &str, class_id: u16, method_id: u16) -> Vec<Value> {
    vec![
        Value::U16(code),
        Value::from(text),
        Value::U16(class_id),
        Value::U16(method_id),
    ]
}

#[tokio::test]
async fn channel_ids_are_allocated_lowest_first() {
    let (conn, _peer) = connect_with(ConnectionConfig::default().with_channel_max(3));

    let first = conn.channel(None).expect("first");
    let third = conn.channel(Some(3)).expect("explicit");
    let second = conn.channel(None).expect("second");
    assert_eq!(first.channel_id(), 1);
    assert_eq!(second.channel_id(), 2);
    assert_eq!(third.channel_id(), 3);
    assert_eq!(conn.channel_ids(), vec![0, 1, 2, 3]);

    assert!(matches!(
        conn.channel(None),
        Err(ChannelError::NoFreeChannelIds { max: 3 })
    ));
    assert!(matches!(
        conn.channel(Some(2)),
        Err(ChannelError::ChannelIdInUse(2))
    ));
    assert!(matches!(
        conn.channel(Some(0)),
        Err(ChannelError::InvalidArgument(_))
    ));
    assert!(matches!(
        conn.channel(Some(4)),
        Err(ChannelError::InvalidArgument(_))
    ));

    assert_eq!(conn.get_channel(2).map(|c| c.channel_id()), Some(2));
    assert!(conn.get_channel(0).is_none());
}

#[tokio::test]
async fn open_channel_performs_handshake() {
    let (conn, peer) = connect();

    let server = tokio::spawn(async move {
        let open = expect(&peer, 1, CHANNEL_OPEN).await;
        assert_eq!(decode("s", &open), vec![Value::from("")]);
        send(&peer, method(1, CHANNEL_OPEN_OK, "S", vec![Value::LongStr(String::new())])).await;
        peer
    });

    let channel = conn.open_channel(None).await.expect("open");
    assert_eq!(channel.channel_id(), 1);
    assert!(channel.is_open());

    server.await.expect("server");
}

#[tokio::test]
async fn channel_close_handshake_detaches_channel() {
    let (conn, peer) = connect();
    let channel = conn.channel(None).expect("channel");

    let server = tokio::spawn(async move {
        let close = expect(&peer, 1, CHANNEL_CLOSE).await;
        assert_eq!(
            decode(CLOSE_ARGS, &close),
            close_values(200, "Normal shutdown", 0, 0)
        );
        send(&peer, method(1, CHANNEL_CLOSE_OK, "", vec![])).await;
        peer
    });

    channel.close().await.expect("close");
    let peer = server.await.expect("server");

    assert_eq!(channel.state(), ChannelState::Closed);
    assert_eq!(conn.channel_ids(), vec![0]);

    // Closing twice is a no-op.
    channel.close().await.expect("second close");

    let err = channel
        .send_method(MethodCall::new(REQUEST))
        .await
        .expect_err("closed channel");
    assert!(err.is_closed());
    assert!(nothing_sent(&peer).await);

    // The id is free again.
    assert_eq!(conn.channel(None).expect("reuse").channel_id(), 1);
}

#[tokio::test]
async fn peer_channel_close_is_acknowledged_and_reported() {
    let (conn, peer) = connect();
    let channel = conn.channel(Some(7)).expect("channel 7");

    send(
        &peer,
        method(7, CHANNEL_CLOSE, CLOSE_ARGS, close_values(404, "NOT_FOUND - no queue 'jobs'", 50, 10)),
    )
    .await;

    let err = channel
        .wait(&[RESPONSE], Some(Duration::from_secs(1)))
        .await
        .expect_err("peer closed the channel");
    match err {
        ChannelError::Status { code, message } => {
            assert_eq!(code, 404);
            assert!(message.starts_with("NOT_FOUND"));
        }
        other => panic!("unexpected error: {other}"),
    }

    expect(&peer, 7, CHANNEL_CLOSE_OK).await;
    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(channel.pending().is_empty());
    assert!(conn.get_channel(7).is_none());
    assert!(!conn.is_closed());
}

#[tokio::test]
async fn connection_close_handshake_closes_every_channel() {
    let (conn, peer) = connect();
    let channel = conn.channel(None).expect("channel");

    let server = tokio::spawn(async move {
        let close = expect(&peer, 0, CONNECTION_CLOSE).await;
        assert_eq!(
            decode(CLOSE_ARGS, &close),
            close_values(200, "Normal shutdown", 0, 0)
        );
        send(&peer, method(0, CONNECTION_CLOSE_OK, "", vec![])).await;
        peer
    });

    conn.close().await.expect("close");
    let peer = server.await.expect("server");

    assert!(conn.is_closed());
    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(conn.transport().is_closed());

    let err = channel
        .send_method(MethodCall::new(REQUEST))
        .await
        .expect_err("connection closed");
    assert!(err.is_closed());
    assert!(nothing_sent(&peer).await);

    let err = channel.wait(&[RESPONSE], None).await.expect_err("closed");
    assert!(err.is_closed());
    assert!(conn.drain_events(None).await.expect_err("closed").is_closed());
    assert!(conn.channel(None).expect_err("closed").is_closed());

    conn.close().await.expect("second close");
}

#[tokio::test]
async fn peer_connection_close_tears_everything_down() {
    let (conn, peer) = connect();
    let channel = conn.channel(None).expect("channel");

    send(
        &peer,
        method(0, CONNECTION_CLOSE, CLOSE_ARGS, close_values(320, "CONNECTION_FORCED", 0, 0)),
    )
    .await;

    let err = conn.drain_events(None).await.expect_err("forced close");
    assert!(matches!(err, ChannelError::Status { code: 320, .. }));

    expect(&peer, 0, CONNECTION_CLOSE_OK).await;
    assert!(conn.is_closed());
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[tokio::test]
async fn dispatch_on_closed_channel_is_rejected() {
    let (conn, peer) = connect();
    let channel = conn.channel(None).expect("channel");

    let server = tokio::spawn(async move {
        expect(&peer, 1, CHANNEL_CLOSE).await;
        send(&peer, method(1, CHANNEL_CLOSE_OK, "", vec![])).await;
        peer
    });
    channel.close().await.expect("close");
    server.await.expect("server");

    let err = channel
        .dispatch_method(RESPONSE, dumps("l", &[Value::U32(1)]).expect("encode"), None)
        .await
        .expect_err("closed");
    assert!(err.is_closed());
}

#[tokio::test]
async fn close_times_out_when_peer_never_answers() {
    let (conn, _peer) = connect_with(
        ConnectionConfig::default().with_close_timeout(Some(Duration::from_millis(20))),
    );
    let channel = conn.channel(None).expect("channel");

    let err = channel.close().await.expect_err("no close-ok");
    assert!(err.is_timeout());
    assert_eq!(channel.state(), ChannelState::Closed);
    assert_eq!(conn.channel_ids(), vec![0]);
}
