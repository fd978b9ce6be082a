use crate::core::config::{
    ClientConfig, DEFAULT_RENEWAL_INTERVAL, DEFAULT_WS_INFLATE_LIMIT, DEFAULT_WS_READ_LIMIT,
};
use crate::core::errors::BingxError;
use crate::core::kernel::codec::{decode_gzip, JsonCodec, SerdeJson};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, ACCEPT_ENCODING};
use tokio_tungstenite::tungstenite::protocol::{Message, WebSocketConfig};
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Renews the credential that authorizes a private stream
#[async_trait]
pub trait ListenKeyRenewer: Send + Sync {
    async fn extend_listen_key(&self, listen_key: &str) -> Result<(), BingxError>;
}

/// Stream session configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub endpoint: String,
    /// Largest inbound message accepted, in bytes
    pub read_limit: usize,
    /// Largest size one frame may inflate to, in bytes
    pub inflate_limit: usize,
    /// Period of the listen-key renewal timer (private sessions only)
    pub renewal_interval: Duration,
}

impl WsConfig {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            read_limit: DEFAULT_WS_READ_LIMIT,
            inflate_limit: DEFAULT_WS_INFLATE_LIMIT,
            renewal_interval: DEFAULT_RENEWAL_INTERVAL,
        }
    }

    pub fn from_client_config(endpoint: String, config: &ClientConfig) -> Self {
        Self {
            endpoint,
            read_limit: config.ws_read_limit,
            inflate_limit: config.ws_inflate_limit,
            renewal_interval: config.renewal_interval,
        }
    }

    pub fn with_renewal_interval(mut self, interval: Duration) -> Self {
        self.renewal_interval = interval;
        self
    }

    pub fn with_inflate_limit(mut self, limit: usize) -> Self {
        self.inflate_limit = limit;
        self
    }

    /// Same settings pointed at another endpoint
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }
}

/// Lifecycle of a stream session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Connecting = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionState {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PingFrame {
    ping: Value,
    #[serde(default)]
    time: Value,
}

#[derive(Debug, Serialize)]
struct PongFrame<'a> {
    pong: &'a Value,
    time: &'a Value,
}

/// Recognize a venue keepalive frame `{"ping": <id>, "time": <t>}`.
fn parse_ping<C: JsonCodec>(codec: &C, frame: &[u8]) -> Option<PingFrame> {
    const NEEDLE: &[u8] = b"\"ping\"";
    if !frame.windows(NEEDLE.len()).any(|w| w == NEEDLE) {
        return None;
    }

    let ping: PingFrame = codec.decode(frame).ok()?;
    match &ping.ping {
        Value::Null => None,
        Value::String(id) if id.is_empty() => None,
        _ => Some(ping),
    }
}

/// State shared between the session task, the renewal task and the handle
struct Shared {
    state: AtomicU8,
    active: AtomicBool,
    stopping: AtomicBool,
    stop: Notify,
}

impl Shared {
    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }
}

struct Renewal {
    renewer: Arc<dyn ListenKeyRenewer>,
    listen_key: String,
}

/// One WebSocket connection to the venue.
///
/// Inbound frames are gzip-decompressed, keepalive pings are answered in-band
/// and every other frame is passed to the handler in arrival order from a
/// single task. An error returned by the handler is reported and the session
/// keeps reading; transport and decompression failures are reported once and
/// end the session. Nothing is reported after [`SessionHandle::stop`].
///
/// There is no read timeout: liveness relies on the venue pinging periodically.
/// A silent peer leaves the session waiting until it is stopped.
pub struct StreamSession<C: JsonCodec = SerdeJson> {
    config: WsConfig,
    codec: C,
    init_message: Option<String>,
    renewal: Option<Renewal>,
}

impl<C: JsonCodec> StreamSession<C> {
    pub fn new(config: WsConfig, codec: C) -> Self {
        Self {
            config,
            codec,
            init_message: None,
            renewal: None,
        }
    }

    /// Frame sent right after the handshake, before any read
    pub fn with_init_message<T: Serialize>(mut self, message: &T) -> Result<Self, BingxError> {
        let bytes = self.codec.encode(message)?;
        let text = String::from_utf8(bytes).map_err(|e| {
            BingxError::InvalidParameters(format!("init message is not UTF-8: {}", e))
        })?;
        self.init_message = Some(text);
        Ok(self)
    }

    /// Renew `listen_key` every `renewal_interval` while the session is active
    pub fn with_renewal(mut self, renewer: Arc<dyn ListenKeyRenewer>, listen_key: String) -> Self {
        self.renewal = Some(Renewal {
            renewer,
            listen_key,
        });
        self
    }

    /// Connect and start the read loop.
    ///
    /// Dial and init-message failures are returned here; later failures go to
    /// `err_handler`.
    #[instrument(skip_all, fields(endpoint = %self.config.endpoint))]
    pub async fn serve<H, E>(self, handler: H, err_handler: E) -> Result<SessionHandle, BingxError>
    where
        H: FnMut(Vec<u8>) -> Result<(), BingxError> + Send + 'static,
        E: FnMut(BingxError) + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: AtomicU8::new(SessionState::Connecting as u8),
            active: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            stop: Notify::new(),
        });

        let mut request = self.config.endpoint.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.config.read_limit);

        let (stream, _) = connect_async_with_config(request, Some(ws_config), false)
            .await
            .map_err(|e| BingxError::NetworkError(format!("WebSocket connection failed: {}", e)))?;
        let (mut write, read) = stream.split();

        if let Some(init) = self.init_message {
            debug!(message = %init, "sending init message");
            write
                .send(Message::Text(init))
                .await
                .map_err(|e| BingxError::NetworkError(format!("Failed to send init message: {}", e)))?;
        }

        shared.active.store(true, Ordering::Release);
        shared.set_state(SessionState::Active);
        info!("stream session active");

        let (renew_err_tx, renew_err_rx) = mpsc::channel(4);
        let renewal_task = self.renewal.map(|renewal| {
            spawn_renewal(
                renewal,
                self.config.renewal_interval,
                shared.clone(),
                renew_err_tx.clone(),
            )
        });

        let task = tokio::spawn(read_loop(
            read,
            write,
            shared.clone(),
            self.codec,
            self.config.inflate_limit,
            handler,
            err_handler,
            renew_err_tx,
            renew_err_rx,
            renewal_task,
        ));

        Ok(SessionHandle { shared, task })
    }
}

fn spawn_renewal(
    renewal: Renewal,
    period: Duration,
    shared: Arc<Shared>,
    errors: mpsc::Sender<BingxError>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !shared.active.load(Ordering::Acquire) {
                return;
            }

            match renewal.renewer.extend_listen_key(&renewal.listen_key).await {
                Ok(()) => debug!("listen key extended"),
                Err(e) => {
                    if shared.is_stopping() {
                        return;
                    }
                    warn!(error = %e, "failed to extend listen key");
                    if errors.send(e).await.is_err() {
                        return;
                    }
                }
            }
        }
    })
}

#[allow(clippy::too_many_arguments)]
async fn read_loop<C, H, E>(
    mut read: WsRead,
    mut write: WsWrite,
    shared: Arc<Shared>,
    codec: C,
    inflate_limit: usize,
    mut handler: H,
    mut err_handler: E,
    // held so the receiver never observes a closed channel
    _renew_err_tx: mpsc::Sender<BingxError>,
    mut renew_err_rx: mpsc::Receiver<BingxError>,
    renewal_task: Option<JoinHandle<()>>,
) where
    C: JsonCodec,
    H: FnMut(Vec<u8>) -> Result<(), BingxError> + Send,
    E: FnMut(BingxError) + Send,
{
    let mut report = |err: BingxError| {
        if !shared.is_stopping() {
            warn!(error = %err, "stream session error");
            err_handler(err);
        }
    };

    loop {
        if shared.is_stopping() {
            break;
        }

        tokio::select! {
            biased;

            () = shared.stop.notified() => break,

            Some(err) = renew_err_rx.recv() => {
                if shared.is_stopping() {
                    break;
                }
                report(err);
            }

            frame = read.next() => {
                let payload = match frame {
                    Some(Ok(Message::Binary(data))) => data,
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Close(close))) => {
                        report(BingxError::NetworkError(format!("connection closed by peer: {:?}", close)));
                        break;
                    }
                    // transport-level control frames
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        report(e.into());
                        break;
                    }
                    None => {
                        report(BingxError::NetworkError("connection closed".to_string()));
                        break;
                    }
                };

                let decoded = match decode_gzip(&payload, inflate_limit) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        report(e);
                        break;
                    }
                };

                if let Some(ping) = parse_ping(&codec, &decoded) {
                    if let Err(e) = send_pong(&mut write, &codec, &ping).await {
                        report(e);
                        break;
                    }
                    continue;
                }

                if shared.is_stopping() {
                    break;
                }
                if let Err(e) = handler(decoded) {
                    report(e);
                }
            }
        }
    }

    shared.active.store(false, Ordering::Release);
    shared.set_state(SessionState::Closing);
    if let Some(task) = renewal_task {
        task.abort();
    }

    if shared.is_stopping() {
        let _ = write.send(Message::Close(None)).await;
    }
    drop(write);
    drop(read);

    shared.set_state(SessionState::Closed);
    info!("stream session closed");
}

async fn send_pong<C: JsonCodec>(
    write: &mut WsWrite,
    codec: &C,
    ping: &PingFrame,
) -> Result<(), BingxError> {
    let pong = codec.encode(&PongFrame {
        pong: &ping.ping,
        time: &ping.time,
    })?;
    let text = String::from_utf8(pong)
        .map_err(|e| BingxError::InvalidParameters(format!("pong is not UTF-8: {}", e)))?;

    write
        .send(Message::Text(text))
        .await
        .map_err(|e| BingxError::NetworkError(format!("Failed to send pong: {}", e)))
}

/// Cheap clonable stop switch for a running session
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Request a cooperative shutdown. Idempotent.
    ///
    /// Once this returns no handler or error callback starts for this session.
    pub fn stop(&self) {
        if !self.shared.stopping.swap(true, Ordering::AcqRel) {
            self.shared.active.store(false, Ordering::Release);
            self.shared.stop.notify_one();
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.shared.state.load(Ordering::Acquire))
    }
}

impl std::fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopHandle")
            .field("state", &self.state())
            .finish()
    }
}

/// Owner handle of a running session
pub struct SessionHandle {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn stop(&self) {
        self.stopper().stop();
    }

    pub fn stopper(&self) -> StopHandle {
        StopHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Resolve once the session has reached `Closed`.
    pub async fn done(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "stream session task ended abnormally");
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
