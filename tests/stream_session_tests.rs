use async_trait::async_trait;
use bingx_connector::core::errors::BingxError;
use bingx_connector::core::kernel::{
    ListenKeyRenewer, SerdeJson, SessionState, StreamSession, WsConfig,
};
use bingx_connector::exchanges::bingx::{BingxStreams, Interval, KlineEvent};
use flate2::write::GzEncoder;
use flate2::Compression;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type ServerWs = WebSocketStream<TcpStream>;

fn gzip(data: &[u8]) -> Message {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    Message::Binary(encoder.finish().unwrap())
}

/// Accept one client and run `script` against it
async fn spawn_server<F, Fut>(script: F) -> String
where
    F: FnOnce(ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        script(ws).await;
    });
    format!("ws://{}/market", addr)
}

/// Keep the connection open until the client closes it
async fn drain(ws: &mut ServerWs) {
    while let Some(Ok(msg)) = ws.next().await {
        if msg.is_close() {
            break;
        }
    }
}

fn collect<T: Send + 'static>() -> (
    impl FnMut(T) + Send + 'static,
    mpsc::UnboundedReceiver<T>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |item| {
            let _ = tx.send(item);
        },
        rx,
    )
}

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_ping_answered_and_not_forwarded() {
    let (pong_tx, pong_rx) = oneshot::channel();
    let url = spawn_server(|mut ws| async move {
        ws.send(gzip(br#"{"ping":"abc","time":"2024-01-01T00:00:00Z"}"#))
            .await
            .unwrap();
        let pong = ws.next().await.unwrap().unwrap();
        let _ = pong_tx.send(pong);
        for i in 0..3 {
            ws.send(gzip(format!(r#"{{"seq":{i}}}"#).as_bytes()))
                .await
                .unwrap();
        }
        drain(&mut ws).await;
    })
    .await;

    let (on_frame, mut frames) = collect::<Vec<u8>>();
    let mut on_frame = on_frame;
    let (on_error, mut errors) = collect::<BingxError>();
    let session = StreamSession::new(WsConfig::new(url), SerdeJson)
        .serve(
            move |frame| {
                on_frame(frame);
                Ok(())
            },
            on_error,
        )
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Active);

    let pong = timeout(WAIT, pong_rx).await.unwrap().unwrap();
    assert_eq!(
        pong,
        Message::Text(r#"{"pong":"abc","time":"2024-01-01T00:00:00Z"}"#.to_string())
    );

    for i in 0..3 {
        let frame = timeout(WAIT, frames.recv()).await.unwrap().unwrap();
        assert_eq!(frame, format!(r#"{{"seq":{i}}}"#).into_bytes());
    }

    session.stop();
    timeout(WAIT, session.done()).await.unwrap();
    assert!(frames.try_recv().is_err(), "ping must not be forwarded");
    assert!(errors.try_recv().is_err());
}

#[tokio::test]
async fn test_corrupted_payload_reported_once_and_session_ends() {
    let url = spawn_server(|mut ws| async move {
        ws.send(Message::Binary(b"definitely not gzip".to_vec()))
            .await
            .unwrap();
        let _ = ws.send(gzip(br#"{"never":"delivered"}"#)).await;
        drain(&mut ws).await;
    })
    .await;

    let (on_frame, mut frames) = collect::<Vec<u8>>();
    let mut on_frame = on_frame;
    let (on_error, mut errors) = collect::<BingxError>();
    let session = StreamSession::new(WsConfig::new(url), SerdeJson)
        .serve(
            move |frame| {
                on_frame(frame);
                Ok(())
            },
            on_error,
        )
        .await
        .unwrap();
    let stopper = session.stopper();

    let err = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert!(matches!(err, BingxError::DecompressionError(_)));

    timeout(WAIT, session.done()).await.unwrap();
    assert_eq!(stopper.state(), SessionState::Closed);
    assert!(frames.try_recv().is_err());
    assert!(errors.try_recv().is_err(), "error must be reported exactly once");
}

#[tokio::test]
async fn test_stop_is_silent() {
    let (closed_tx, closed_rx) = oneshot::channel();
    let url = spawn_server(|mut ws| async move {
        drain(&mut ws).await;
        let _ = closed_tx.send(());
    })
    .await;

    let (on_error, mut errors) = collect::<BingxError>();
    let session = StreamSession::new(WsConfig::new(url), SerdeJson)
        .serve(|_| Ok(()), on_error)
        .await
        .unwrap();
    assert!(session.is_active());

    let stopper = session.stopper();
    stopper.stop();
    // idempotent
    stopper.stop();
    assert!(!session.is_active());

    timeout(WAIT, session.done()).await.unwrap();
    assert_eq!(stopper.state(), SessionState::Closed);
    timeout(WAIT, closed_rx).await.unwrap().unwrap();
    assert!(errors.try_recv().is_err());
}

#[tokio::test]
async fn test_peer_close_reported_once() {
    let url = spawn_server(|mut ws| async move {
        let _ = ws.close(None).await;
        drain(&mut ws).await;
    })
    .await;

    let (on_error, mut errors) = collect::<BingxError>();
    let session = StreamSession::new(WsConfig::new(url), SerdeJson)
        .serve(|_| Ok(()), on_error)
        .await
        .unwrap();

    let err = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert_eq!(err.kind(), bingx_connector::ErrorKind::Transport);
    timeout(WAIT, session.done()).await.unwrap();
    assert!(errors.try_recv().is_err());
}

#[tokio::test]
async fn test_handler_error_reported_and_reading_continues() {
    let url = spawn_server(|mut ws| async move {
        ws.send(gzip(b"first")).await.unwrap();
        ws.send(gzip(b"second")).await.unwrap();
        drain(&mut ws).await;
    })
    .await;

    let (on_frame, mut frames) = collect::<Vec<u8>>();
    let mut on_frame = on_frame;
    let (on_error, mut errors) = collect::<BingxError>();
    let session = StreamSession::new(WsConfig::new(url), SerdeJson)
        .serve(
            move |frame| {
                if frame == b"first" {
                    return Err(BingxError::InvalidParameters("rejected".to_string()));
                }
                on_frame(frame);
                Ok(())
            },
            on_error,
        )
        .await
        .unwrap();

    let err = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert!(matches!(err, BingxError::InvalidParameters(_)));
    let frame = timeout(WAIT, frames.recv()).await.unwrap().unwrap();
    assert_eq!(frame, b"second".to_vec());
    assert!(session.is_active());

    session.stop();
    timeout(WAIT, session.done()).await.unwrap();
}

#[tokio::test]
async fn test_kline_subscription_end_to_end() {
    let (init_tx, init_rx) = oneshot::channel();
    let url = spawn_server(|mut ws| async move {
        let init = ws.next().await.unwrap().unwrap();
        let _ = init_tx.send(init);
        ws.send(gzip(
            br#"{"id":"x","code":0,"msg":"SUCCESS","dataType":"","data":null}"#,
        ))
        .await
        .unwrap();
        for end in [100, 100, 200] {
            let frame = format!(
                r#"{{"code":0,"dataType":"BTC-USDT@kline_1min","s":"BTC-USDT","data":[{{"c":"2.5","o":"2.0","h":"3.0","l":"1.5","v":"10","T":{end}}}]}}"#
            );
            ws.send(gzip(frame.as_bytes())).await.unwrap();
        }
        drain(&mut ws).await;
    })
    .await;

    let (on_event, mut events) = collect::<KlineEvent>();
    let (on_error, mut errors) = collect::<BingxError>();
    let streams = BingxStreams::new(url, SerdeJson);
    let session = streams
        .subscribe_klines("BTC-USDT", Interval::Minutes1, on_event, on_error)
        .await
        .unwrap();

    let init = timeout(WAIT, init_rx).await.unwrap().unwrap();
    let init: serde_json::Value = match init {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("subscribe frame must be text, got {other:?}"),
    };
    assert_eq!(init["reqType"], "sub");
    assert_eq!(init["dataType"], "BTC-USDT@kline_1min");
    assert!(init["id"].as_str().is_some_and(|id| id.len() == 36));

    let mut flags = Vec::new();
    for _ in 0..3 {
        let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        flags.push(event.completed);
    }
    assert_eq!(flags, vec![false, false, true]);

    session.stop();
    timeout(WAIT, session.done()).await.unwrap();
    assert!(errors.try_recv().is_err());
}

#[tokio::test]
async fn test_frame_inflating_past_limit_ends_session() {
    let url = spawn_server(|mut ws| async move {
        ws.send(gzip(&vec![b' '; 64 * 1024])).await.unwrap();
        let _ = ws.send(gzip(br#"{"never":"delivered"}"#)).await;
        drain(&mut ws).await;
    })
    .await;

    let (on_frame, mut frames) = collect::<Vec<u8>>();
    let mut on_frame = on_frame;
    let (on_error, mut errors) = collect::<BingxError>();
    let session = StreamSession::new(WsConfig::new(url).with_inflate_limit(1024), SerdeJson)
        .serve(
            move |frame| {
                on_frame(frame);
                Ok(())
            },
            on_error,
        )
        .await
        .unwrap();

    let err = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert!(matches!(err, BingxError::DecompressionError(_)));
    timeout(WAIT, session.done()).await.unwrap();
    assert!(frames.try_recv().is_err());
    assert!(errors.try_recv().is_err());
}

struct CountingRenewer {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl ListenKeyRenewer for CountingRenewer {
    async fn extend_listen_key(&self, listen_key: &str) -> Result<(), BingxError> {
        assert_eq!(listen_key, "lk-1");
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(BingxError::ApiError {
                code: 100_001,
                message: "listen key expired".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn test_listen_key_renewed_periodically() {
    let url = spawn_server(|mut ws| async move { drain(&mut ws).await }).await;
    let renewer = Arc::new(CountingRenewer {
        calls: AtomicUsize::new(0),
        fail: false,
    });

    let (on_error, mut errors) = collect::<BingxError>();
    let session = StreamSession::new(
        WsConfig::new(url).with_renewal_interval(Duration::from_millis(30)),
        SerdeJson,
    )
    .with_renewal(renewer.clone(), "lk-1".to_string())
    .serve(|_| Ok(()), on_error)
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(renewer.calls.load(Ordering::SeqCst) >= 2);

    session.stop();
    timeout(WAIT, session.done()).await.unwrap();
    let after_stop = renewer.calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(renewer.calls.load(Ordering::SeqCst), after_stop);
    assert!(errors.try_recv().is_err());
}

#[tokio::test]
async fn test_renewal_failure_reported_without_ending_session() {
    let url = spawn_server(|mut ws| async move { drain(&mut ws).await }).await;
    let renewer = Arc::new(CountingRenewer {
        calls: AtomicUsize::new(0),
        fail: true,
    });

    let (on_error, mut errors) = collect::<BingxError>();
    let session = StreamSession::new(
        WsConfig::new(url).with_renewal_interval(Duration::from_millis(20)),
        SerdeJson,
    )
    .with_renewal(renewer, "lk-1".to_string())
    .serve(|_| Ok(()), on_error)
    .await
    .unwrap();

    let err = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert!(matches!(err, BingxError::ApiError { code: 100_001, .. }));
    assert!(session.is_active());

    session.stop();
    timeout(WAIT, session.done()).await.unwrap();
}

/// Holds every renewal until released, then fails it
struct GatedRenewer {
    entered: mpsc::UnboundedSender<()>,
    release: Arc<Notify>,
}

#[async_trait]
impl ListenKeyRenewer for GatedRenewer {
    async fn extend_listen_key(&self, _listen_key: &str) -> Result<(), BingxError> {
        let _ = self.entered.send(());
        self.release.notified().await;
        Err(BingxError::NetworkError("renewal interrupted".to_string()))
    }
}

#[tokio::test]
async fn test_renewal_failing_after_stop_is_silent() {
    let url = spawn_server(|mut ws| async move { drain(&mut ws).await }).await;
    let (entered_tx, mut entered) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let renewer = Arc::new(GatedRenewer {
        entered: entered_tx,
        release: release.clone(),
    });

    let (on_error, mut errors) = collect::<BingxError>();
    let session = StreamSession::new(
        WsConfig::new(url).with_renewal_interval(Duration::from_millis(20)),
        SerdeJson,
    )
    .with_renewal(renewer, "lk-1".to_string())
    .serve(|_| Ok(()), on_error)
    .await
    .unwrap();

    // the renewal call is now in flight
    timeout(WAIT, entered.recv()).await.unwrap().unwrap();

    // fail it and stop without yielding in between, so the renewal task
    // resumes with the session already stopping
    release.notify_one();
    session.stop();

    timeout(WAIT, session.done()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(errors.try_recv().is_err());
}
