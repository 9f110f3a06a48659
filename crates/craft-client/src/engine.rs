//! Connection actor.
//!
//! One spawned task owns the socket, the request counter, the
//! [`CorrelationTable`] and the keepalive timer. Callers reach it through
//! an unbounded command channel, so [`Connection::send`] never blocks.
//!
//! Every exit path (local close, remote close, transport error, dropped
//! owner) runs the same teardown: queued and pending requests fail with
//! [`CraftError::ConnectionClosed`], the observer is told the generation
//! closed, and only then does [`Connection::closed`] return.

use std::future::Future;
use std::pin::Pin;
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use craft_core::{ActionData, ActionType, CraftError, Result};

use crate::codec::{self, InboundFrame, ServerEvent};
use crate::correlation::{CorrelationTable, ReplyResult, ReplySender};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Receives what a connection observes. Implemented by the client.
pub trait ConnectionObserver: Send + Sync {
    /// An event frame arrived.
    fn on_event(&self, generation: u64, event: ServerEvent);
    /// A non-fatal error: an undecodable frame or a transport failure.
    fn on_error(&self, generation: u64, error: CraftError);
    /// Teardown finished. Every request of this generation is resolved.
    fn on_closed(&self, generation: u64);
}

struct Request {
    action: ActionType,
    payload: ActionData,
    reply: ReplySender,
}

/// Completes with the reply to one request.
#[must_use = "a reply does nothing unless awaited"]
#[derive(Debug)]
pub struct PendingReply {
    action: ActionType,
    rx: oneshot::Receiver<ReplyResult>,
}

impl PendingReply {
    /// Action this reply answers.
    pub fn action(&self) -> ActionType {
        self.action
    }
}

impl Future for PendingReply {
    type Output = ReplyResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(CraftError::ConnectionClosed)))
    }
}

/// Handle to a running connection actor.
#[derive(Debug)]
pub struct Connection {
    generation: u64,
    commands: mpsc::UnboundedSender<Request>,
    shutdown: CancellationToken,
    closed: watch::Receiver<bool>,
    authenticated: AtomicBool,
}

impl Connection {
    /// Open the socket at `url` and spawn the actor.
    ///
    /// The keepalive timer starts now; the first heartbeat goes out one
    /// `keepalive` period after the socket opens.
    pub async fn open(
        url: &str,
        generation: u64,
        keepalive: Duration,
        observer: Weak<dyn ConnectionObserver>,
    ) -> Result<Self> {
        if keepalive.is_zero() {
            return Err(CraftError::InvalidSettings("keepalive interval must be positive".into()));
        }
        if url.starts_with("wss:") {
            install_crypto_provider();
        }
        debug!(generation, url, "opening socket");
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| CraftError::Transport(format!("connect {url}: {e}")))?;
        info!(generation, url, "socket open");

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed) = watch::channel(false);
        let shutdown = CancellationToken::new();

        let actor = ConnectionActor {
            generation,
            table: CorrelationTable::new(generation),
            next_nonce: 0,
            observer,
        };
        let _ = tokio::spawn(actor.run(ws, command_rx, shutdown.clone(), keepalive, closed_tx));

        Ok(Self {
            generation,
            commands,
            shutdown,
            closed,
            authenticated: AtomicBool::new(false),
        })
    }

    /// Generation tag of this connection.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a request. Fails with [`CraftError::NotConnected`] once the
    /// actor has stopped accepting commands.
    pub fn send(&self, action: ActionType, payload: ActionData) -> Result<PendingReply> {
        if self.is_closed() {
            return Err(CraftError::NotConnected);
        }
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Request {
                action,
                payload,
                reply,
            })
            .map_err(|_| CraftError::NotConnected)?;
        Ok(PendingReply { action, rx })
    }

    /// Ask the actor to close the socket. Returns immediately.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Wait until teardown has finished.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        // An error means the actor is gone without signalling; nothing left to wait for.
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Whether the actor has stopped or is stopping.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow() || self.commands.is_closed() || self.shutdown.is_cancelled()
    }

    /// Whether the actor is gone without having run teardown.
    pub(crate) fn is_lost(&self) -> bool {
        !*self.closed.borrow() && self.closed.has_changed().is_err()
    }

    /// Whether the `authenticate` round-trip has succeeded.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub(crate) fn mark_authenticated(&self) {
        self.authenticated.store(true, Ordering::Release);
    }
}

/// `wss` handshakes need a process-wide rustls provider. Another part of the
/// process may already have installed one.
fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider().install_default().is_ok() {
        debug!("installed rustls ring crypto provider");
    }
}

#[cfg(test)]
impl Connection {
    /// A handle whose actor has already died.
    pub(crate) fn lost(generation: u64) -> Self {
        let (commands, _) = mpsc::unbounded_channel();
        let (_, closed) = watch::channel(false);
        Self {
            generation,
            commands,
            shutdown: CancellationToken::new(),
            closed,
            authenticated: AtomicBool::new(false),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Debug)]
enum CloseReason {
    Requested,
    OwnerDropped,
    Remote,
    Transport(String),
}

struct ConnectionActor {
    generation: u64,
    table: CorrelationTable,
    next_nonce: u64,
    observer: Weak<dyn ConnectionObserver>,
}

impl ConnectionActor {
    async fn run(
        mut self,
        ws: WsStream,
        mut commands: mpsc::UnboundedReceiver<Request>,
        shutdown: CancellationToken,
        keepalive: Duration,
        closed_tx: watch::Sender<bool>,
    ) {
        let (mut sink, mut stream) = ws.split();
        let mut keepalive_timer = time::interval_at(Instant::now() + keepalive, keepalive);
        keepalive_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        debug!(generation = self.generation, error = %e, "close frame not sent");
                    }
                    break CloseReason::Requested;
                }

                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => self.handle_text(text),
                        Err(e) => self.report_decode_error(CraftError::Decode(e.to_string())),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        debug!(generation = self.generation, ?frame, "server closed the socket");
                        break CloseReason::Remote;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break CloseReason::Transport(e.to_string()),
                    None => break CloseReason::Remote,
                },

                cmd = commands.recv() => {
                    let Some(Request { action, payload, reply }) = cmd else {
                        break CloseReason::OwnerDropped;
                    };
                    if let Err(e) = self.write_request(&mut sink, action, payload, Some(reply)).await {
                        break CloseReason::Transport(e);
                    }
                }

                _ = keepalive_timer.tick() => {
                    trace!(generation = self.generation, "keepalive tick");
                    if let Err(e) = self.write_request(&mut sink, ActionType::Heartbeat, ActionData::new(), None).await {
                        break CloseReason::Transport(e);
                    }
                }
            }
        };

        drop(keepalive_timer);
        self.teardown(reason, commands, closed_tx);
    }

    /// Register first so a failed write is resolved by teardown like any
    /// other in-flight request.
    async fn write_request(
        &mut self,
        sink: &mut WsSink,
        action: ActionType,
        payload: ActionData,
        reply: Option<ReplySender>,
    ) -> std::result::Result<(), String> {
        self.next_nonce += 1;
        let nonce = self.next_nonce;
        let _ = self.table.register(nonce, action, reply);

        let frame = codec::encode_request(action, nonce, payload);
        trace!(generation = self.generation, nonce, %action, "sending request");
        sink.send(Message::Text(frame.into()))
            .await
            .map_err(|e| e.to_string())
    }

    fn handle_text(&mut self, text: &str) {
        match codec::decode(text) {
            Ok(InboundFrame { reply, event }) => {
                if let Some(reply) = reply {
                    let nonce = reply.nonce;
                    if !self.table.resolve_reply(nonce, reply.ok, reply.data) {
                        debug!(generation = self.generation, nonce, "reply for unknown nonce");
                    }
                }
                match event {
                    Some(Ok(event)) => self.forward_event(event),
                    Some(Err(error)) => self.report_decode_error(error),
                    None => {}
                }
            }
            Err(error) => self.report_decode_error(error),
        }
    }

    fn forward_event(&self, event: ServerEvent) {
        if let ServerEvent::Unknown { kind, .. } = &event {
            debug!(generation = self.generation, kind = %kind, "ignoring unhandled event type");
            return;
        }
        if let Some(observer) = self.observer.upgrade() {
            observer.on_event(self.generation, event);
        }
    }

    fn report_decode_error(&self, error: CraftError) {
        warn!(generation = self.generation, %error, "dropping undecodable frame");
        if let Some(observer) = self.observer.upgrade() {
            observer.on_error(self.generation, error);
        }
    }

    fn teardown(
        mut self,
        reason: CloseReason,
        mut commands: mpsc::UnboundedReceiver<Request>,
        closed_tx: watch::Sender<bool>,
    ) {
        let generation = self.generation;
        let observer = self.observer.upgrade();

        if let CloseReason::Transport(message) = &reason {
            warn!(generation, error = %message, "socket failed");
            if let Some(observer) = &observer {
                observer.on_error(generation, CraftError::Transport(message.clone()));
            }
        }

        commands.close();
        let mut queued = 0usize;
        while let Ok(request) = commands.try_recv() {
            let _ = request.reply.send(Err(CraftError::ConnectionClosed));
            queued += 1;
        }
        let drained = self.table.drain_all(&CraftError::ConnectionClosed);

        info!(
            generation,
            ?reason,
            pending = drained.len(),
            queued,
            "connection closed"
        );

        if let Some(observer) = observer {
            observer.on_closed(generation);
        }
        let _ = closed_tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn pending_reply_maps_dropped_sender_to_connection_closed() {
        let (tx, rx) = oneshot::channel::<ReplyResult>();
        let reply = PendingReply {
            action: ActionType::GetSize,
            rx,
        };
        drop(tx);
        assert_matches!(reply.await, Err(CraftError::ConnectionClosed));
    }

    #[tokio::test]
    async fn pending_reply_forwards_result() {
        let (tx, rx) = oneshot::channel::<ReplyResult>();
        let reply = PendingReply {
            action: ActionType::GetBlock,
            rx,
        };
        assert_eq!(reply.action(), ActionType::GetBlock);
        let _ = tx.send(Ok(ActionData::new()));
        assert_eq!(reply.await, Ok(ActionData::new()));
    }

    #[tokio::test]
    async fn open_fails_with_transport_error_when_nothing_listens() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let observer: Weak<dyn ConnectionObserver> = Weak::<NullObserver>::new();
        let result = Connection::open(
            &format!("ws://127.0.0.1:{port}/gateway"),
            1,
            Duration::from_secs(15),
            observer,
        )
        .await;
        assert_matches!(result, Err(CraftError::Transport(_)));
    }

    #[tokio::test]
    async fn wss_reaches_the_tls_handshake() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let observer: Weak<dyn ConnectionObserver> = Weak::<NullObserver>::new();
        let result = Connection::open(
            &format!("wss://127.0.0.1:{port}/gateway"),
            1,
            Duration::from_secs(15),
            observer,
        )
        .await;
        let Err(CraftError::Transport(message)) = result else {
            panic!("expected a transport error");
        };
        assert!(!message.contains("not compiled"), "{message}");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn open_rejects_zero_keepalive() {
        let observer: Weak<dyn ConnectionObserver> = Weak::<NullObserver>::new();
        let result = Connection::open("ws://127.0.0.1:1/gateway", 1, Duration::ZERO, observer).await;
        assert_matches!(result, Err(CraftError::InvalidSettings(_)));
    }

    #[test]
    fn lost_actor_is_detected() {
        let connection = Connection::lost(3);
        assert!(connection.is_lost());
        assert!(connection.is_closed());
    }

    struct NullObserver;

    impl ConnectionObserver for NullObserver {
        fn on_event(&self, _: u64, _: ServerEvent) {}
        fn on_error(&self, _: u64, _: CraftError) {}
        fn on_closed(&self, _: u64) {}
    }
}
