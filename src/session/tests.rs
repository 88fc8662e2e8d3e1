use super::*;
use crate::config::{ApiConfig, AppConfig};
use crate::error::TransportError;
use crate::osc::{decode_packet, encode_message, FrameDecoder};
use crate::transport::TransportMode;
use async_trait::async_trait;
use std::io;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream, UdpSocket};
use tokio::time::timeout;

struct FailingDns;

#[async_trait]
impl DnsLookup for FailingDns {
    async fn lookup(&self, _host: &str) -> io::Result<Vec<IpAddr>> {
        Err(io::Error::new(io::ErrorKind::NotFound, "no such host"))
    }
}

fn config(host: &str, port: u16, protocol: TransportMode) -> AppConfig {
    AppConfig {
        connection: ConnectionConfig {
            host: host.to_string(),
            target_port: port,
            protocol,
            listen: true,
            feedback_port: None,
            polling: false,
            reconnect: false,
        },
        units: UnitsConfig::default(),
        api: ApiConfig::default(),
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(3), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn recv_message(console: &UdpSocket) -> (Message, SocketAddr) {
    let mut buf = [0u8; 2048];
    let (len, from) = timeout(Duration::from_secs(2), console.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let mut messages = decode_packet(&buf[..len]).unwrap();
    (messages.remove(0), from)
}

async fn read_stream_message(stream: &mut TcpStream, framing: crate::osc::Framing) -> Option<Message> {
    let mut decoder = FrameDecoder::new(framing);
    let mut buf = [0u8; 2048];
    loop {
        if let Some(frame) = decoder.next_frame() {
            return decode_packet(&frame.unwrap()).unwrap().into_iter().next();
        }
        let len = timeout(Duration::from_secs(2), stream.read(&mut buf)).await.unwrap().unwrap();
        if len == 0 {
            return None;
        }
        decoder.push(&buf[..len]);
    }
}

/// Listener whose accept queue is full, so a further connect hangs in SYN_SENT.
/// The returned streams keep the queue occupied.
async fn stalled_listener() -> (TcpListener, Vec<TcpStream>, u16) {
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(1).unwrap();
    let addr = listener.local_addr().unwrap();

    let mut queued = Vec::new();
    while let Ok(Ok(stream)) = timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
        queued.push(stream);
        assert!(queued.len() < 64, "accept queue never filled");
    }
    (listener, queued, addr.port())
}

#[tokio::test]
async fn test_udp_send_and_feedback_round_trip() {
    let console = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = console.local_addr().unwrap().port();
    let controller = SessionController::new();

    controller.init(&config("127.0.0.1", port, TransportMode::Udp)).await.unwrap();
    assert_eq!(controller.status(), InstanceStatus::Ok);
    assert_eq!(controller.live_sockets(), 1);

    controller
        .send("/channel/1/mute", vec![OscArg::String("true".into())])
        .await
        .unwrap();
    let (sent, gateway) = recv_message(&console).await;
    assert_eq!(sent.path, "/channel/1/mute");
    assert_eq!(controller.variables().get("channel_1_mute").as_deref(), Some("true"));

    let reply = encode_message("/channel/1/mute", &[OscArg::Int(1)]).unwrap();
    console.send_to(&reply, gateway).await.unwrap();

    wait_until(|| controller.lookup("/channel/1/mute").is_some()).await;
    assert_eq!(controller.lookup("/channel/1/mute"), Some(vec![OscArg::Int(1)]));
    assert_eq!(controller.variables().get("channel_1_mute").as_deref(), Some("1"));

    let query = FeedbackQuery::Integer {
        path: "/channel/1/mute".into(),
        value: "1".into(),
        comparison: crate::feedback::Comparison::Equal,
    };
    assert!(controller.evaluate(&query));

    controller.shutdown().await;
    assert_eq!(controller.live_sockets(), 0);
}

#[tokio::test]
async fn test_reconfiguration_holds_one_socket() {
    let console_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let console_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let ports = [
        console_a.local_addr().unwrap().port(),
        console_b.local_addr().unwrap().port(),
    ];
    let controller = SessionController::new();

    for round in 0..6 {
        let port = ports[round % 2];
        controller
            .config_updated(&config("127.0.0.1", port, TransportMode::Udp))
            .await
            .unwrap();
        assert_eq!(controller.live_sockets(), 1, "round {}", round);
    }

    // Sends go to the last configured target
    controller.send("/ping", vec![]).await.unwrap();
    let (msg, _) = recv_message(&console_b).await;
    assert_eq!(msg.path, "/ping");

    controller.shutdown().await;
    assert_eq!(controller.live_sockets(), 0);
    assert_eq!(controller.status(), InstanceStatus::Disconnected);
}

#[tokio::test]
async fn test_tcp_session_then_switch_to_udp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let controller = SessionController::new();

    controller.init(&config("127.0.0.1", port, TransportMode::Tcp)).await.unwrap();
    let (mut console, _) = listener.accept().await.unwrap();
    assert_eq!(controller.connection_state(), Some(ConnectionState::Connected));

    controller.send_text("/channel/2/input/name", r#""Lead Vox""#).await.unwrap();
    let msg = read_stream_message(&mut console, crate::osc::Framing::Slip).await.unwrap();
    assert_eq!(msg.args, vec![OscArg::String("Lead Vox".into())]);

    let udp_console = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let udp_port = udp_console.local_addr().unwrap().port();
    controller
        .config_updated(&config("127.0.0.1", udp_port, TransportMode::Udp))
        .await
        .unwrap();

    // Old stream was closed before the new socket opened
    assert!(read_stream_message(&mut console, crate::osc::Framing::Slip).await.is_none());
    assert_eq!(controller.live_sockets(), 1);

    controller.shutdown().await;
}

#[tokio::test]
async fn test_tcp_raw_polling_requests_resend() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut cfg = config("127.0.0.1", listener.local_addr().unwrap().port(), TransportMode::TcpRaw);
    cfg.connection.polling = true;
    let controller = SessionController::new();

    controller.init(&cfg).await.unwrap();
    let (mut console, _) = listener.accept().await.unwrap();

    let msg = read_stream_message(&mut console, crate::osc::Framing::LengthPrefixed)
        .await
        .unwrap();
    assert_eq!(msg.path, RESEND_PATH);
    assert!(msg.args.is_empty());

    controller.shutdown().await;
}

#[tokio::test]
async fn test_refused_connection_reports_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let controller = SessionController::new();
    let err = controller
        .init(&config("127.0.0.1", port, TransportMode::Tcp))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Transport(TransportError::Connect { .. })));
    assert!(matches!(controller.status(), InstanceStatus::ConnectionFailure(_)));
    assert_eq!(controller.live_sockets(), 0);

    let send = controller.send("/x", vec![]).await.unwrap_err();
    assert!(matches!(send, SessionError::NoSession));
}

#[tokio::test]
async fn test_unresolvable_host_is_bad_config() {
    let controller = SessionController::with_dns(Arc::new(FailingDns));
    let err = controller
        .init(&config("console.invalid", 8000, TransportMode::Udp))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::BadConfig(_)));
    match controller.status() {
        InstanceStatus::BadConfig(reason) => assert!(reason.contains("console.invalid")),
        other => panic!("unexpected status {:?}", other),
    }
    assert_eq!(controller.live_sockets(), 0);
    assert!(matches!(
        controller.send("/x", vec![]).await,
        Err(SessionError::NoSession)
    ));
}

#[tokio::test]
async fn test_empty_host_is_bad_config() {
    let controller = SessionController::new();
    let _ = controller.init(&config("  ", 8000, TransportMode::Udp)).await;
    assert_eq!(
        controller.status(),
        InstanceStatus::BadConfig("no host configured".into())
    );
}

#[tokio::test]
async fn test_rebuild_clears_cache() {
    let console = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let cfg = config("127.0.0.1", console.local_addr().unwrap().port(), TransportMode::Udp);
    let controller = SessionController::new();
    controller.init(&cfg).await.unwrap();

    controller.on_receive(Message::new("/scene", vec![OscArg::Int(3)]));
    assert!(controller.lookup("/scene").is_some());

    controller.config_updated(&cfg).await.unwrap();
    assert_eq!(controller.lookup("/scene"), None);
    controller.shutdown().await;
}

#[tokio::test]
async fn test_consume_once_through_controller() {
    let controller = SessionController::new();
    controller.on_receive(Message::new("/go", vec![OscArg::Int(1)]));

    let query = FeedbackQuery::NoArgs { path: "/go".into() };
    assert!(controller.evaluate(&query));
    assert!(!controller.evaluate(&query));

    controller.on_receive(Message::new("/go", vec![OscArg::Int(1)]));
    assert!(controller.consume_once("/go"));
    assert!(!controller.consume_once("/go"));
}

#[tokio::test]
async fn test_execute_action_expands_bands() {
    let console = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let controller = SessionController::new();
    controller
        .init(&config("127.0.0.1", console.local_addr().unwrap().port(), TransportMode::Udp))
        .await
        .unwrap();

    let params: HashMap<String, String> = [("channel", "2"), ("band", "1,2")]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let sent = controller.execute_action("eq.gain", &params, "3").await.unwrap();
    assert_eq!(sent.len(), 2);

    let (first, _) = recv_message(&console).await;
    let (second, _) = recv_message(&console).await;
    assert_eq!(first.path, "/channel/2/eq/1/gain");
    assert_eq!(second.path, "/channel/2/eq/2/gain");
    assert_eq!(controller.variables().get("channel_2_eq_2_gain").as_deref(), Some("3"));

    let unknown = controller.execute_action("eq.nope", &params, "3").await.unwrap_err();
    assert!(matches!(unknown, SessionError::UnknownAction(_)));

    controller.shutdown().await;
}

#[tokio::test]
async fn test_status_subscription_starts_with_current() {
    let controller = SessionController::new();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    controller.subscribe_status(Arc::new(move |status| sink.lock().push(status)));

    let _ = controller.init(&config("", 8000, TransportMode::Udp)).await;

    assert_eq!(
        *seen.lock(),
        vec![
            InstanceStatus::Disconnected,
            InstanceStatus::BadConfig("no host configured".into()),
        ]
    );
}

#[tokio::test]
async fn test_tcp_reconnects_after_peer_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut cfg = config("127.0.0.1", listener.local_addr().unwrap().port(), TransportMode::Tcp);
    cfg.connection.reconnect = true;
    let controller = SessionController::new();

    controller.init(&cfg).await.unwrap();
    let (first, _) = listener.accept().await.unwrap();
    drop(first);

    wait_until(|| controller.status() == InstanceStatus::Disconnected).await;

    // First retry fires after one second
    let (_second, _) = timeout(Duration::from_secs(3), listener.accept()).await.unwrap().unwrap();
    wait_until(|| controller.status() == InstanceStatus::Ok).await;
    assert_eq!(controller.live_sockets(), 1);

    controller.shutdown().await;
    assert_eq!(controller.live_sockets(), 0);
}

#[tokio::test]
async fn test_send_while_connecting_fails_fast() {
    let (_listener, _queued, port) = stalled_listener().await;
    let controller = SessionController::new();

    let rebuild = {
        let controller = controller.clone();
        tokio::spawn(async move {
            let _ = controller.config_updated(&config("127.0.0.1", port, TransportMode::Tcp)).await;
        })
    };
    wait_until(|| controller.connection_state() == Some(ConnectionState::Connecting)).await;
    assert_eq!(controller.status(), InstanceStatus::Connecting);

    let sent = timeout(Duration::from_secs(1), controller.send("/x", vec![]))
        .await
        .expect("send waited for the connect");
    assert!(matches!(
        sent,
        Err(SessionError::Transport(TransportError::NotConnected(ConnectionState::Connecting)))
    ));

    rebuild.abort();
    let _ = rebuild.await;
    controller.shutdown().await;
    assert_eq!(controller.live_sockets(), 0);
}

#[tokio::test]
async fn test_stale_generation_is_not_cached() {
    let controller = SessionController::new();
    let stale = controller.generation();
    controller.shutdown().await;

    let delivered = controller
        .inbound
        .deliver_from(stale, Message::new("/channel/1/mute", vec![OscArg::Int(1)]));
    assert!(!delivered);
    assert_eq!(controller.lookup("/channel/1/mute"), None);
    assert_eq!(controller.variables().get("channel_1_mute"), None);

    let current = controller.generation();
    assert!(controller
        .inbound
        .deliver_from(current, Message::new("/channel/1/mute", vec![OscArg::Int(1)])));
    assert_eq!(controller.lookup("/channel/1/mute"), Some(vec![OscArg::Int(1)]));
}

#[tokio::test]
async fn test_tcp_reconnects_after_repeated_peer_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut cfg = config("127.0.0.1", listener.local_addr().unwrap().port(), TransportMode::Tcp);
    cfg.connection.reconnect = true;
    let controller = SessionController::new();

    controller.init(&cfg).await.unwrap();
    for round in 0..2 {
        let (stream, _) = timeout(Duration::from_secs(3), listener.accept())
            .await
            .unwrap()
            .unwrap();
        wait_until(|| controller.status() == InstanceStatus::Ok).await;
        drop(stream);
        wait_until(|| controller.status() == InstanceStatus::Disconnected).await;
        assert!(controller.live_sockets() <= 1, "round {}", round);
    }

    let (_last, _) = timeout(Duration::from_secs(3), listener.accept()).await.unwrap().unwrap();
    wait_until(|| controller.status() == InstanceStatus::Ok).await;
    assert_eq!(controller.live_sockets(), 1);

    controller.shutdown().await;
}

#[tokio::test]
async fn test_reload_keeps_healthy_session() {
    let console = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut cfg = config("127.0.0.1", console.local_addr().unwrap().port(), TransportMode::Udp);
    let controller = SessionController::new();
    controller.init(&cfg).await.unwrap();
    controller.on_receive(Message::new("/scene", vec![OscArg::Int(3)]));
    let generation = controller.generation();

    // Same file saved again
    assert!(!controller.reload(&cfg).await.unwrap());
    assert_eq!(controller.generation(), generation);
    assert_eq!(controller.lookup("/scene"), Some(vec![OscArg::Int(3)]));

    cfg.connection.polling = true;
    assert!(controller.reload(&cfg).await.unwrap());
    assert_eq!(controller.generation(), generation + 1);
    assert_eq!(controller.live_sockets(), 1);

    controller.shutdown().await;
}

#[tokio::test]
async fn test_reload_retries_failed_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let cfg = config("127.0.0.1", port, TransportMode::Tcp);
    let controller = SessionController::new();
    assert!(controller.init(&cfg).await.is_err());

    // Unchanged settings, but the last attempt failed
    assert!(controller.reload(&cfg).await.is_err());
    assert!(matches!(controller.status(), InstanceStatus::ConnectionFailure(_)));
}
