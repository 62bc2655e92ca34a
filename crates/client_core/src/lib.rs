use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use shared::{
    domain::RoomId,
    protocol::{room_topic, send_message_destination, user_notification_topic, ChatMessage},
};
use stomp::{Command, Frame, HeartBeat, StompMessage};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

pub mod config;
pub mod error;
pub mod handlers;
pub mod history;
mod inbound;
pub mod registry;
pub mod session_store;
pub mod transport;

pub use config::{load_settings, ClientSettings};
pub use error::{ConnectError, TransportError};
pub use handlers::{ConnectionStatusHandler, MessageHandler, NotificationHandler};
pub use history::HistoryClient;
pub use registry::{RoomSubscription, SubscriptionHandle, SubscriptionId};
pub use session_store::{ChatSessionStore, MessageOutcome, StoredMessage};
pub use transport::{Transport, TransportChannel, WsTransport};

use handlers::HandlerRegistry;
use inbound::{decode_notification, decode_room_message};
use registry::RoomRegistry;

const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Clone)]
pub struct Credentials {
    pub token: String,
    /// Account identity (email) used for the personal notification topic.
    pub identity: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("identity", &self.identity)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Disconnected,
    Connecting,
    Connected,
}

struct ActiveLink {
    outbound: mpsc::UnboundedSender<StompMessage>,
    reader_task: JoinHandle<()>,
    heartbeat_task: Option<JoinHandle<()>>,
}

impl ActiveLink {
    fn send(&self, frame: Frame) -> bool {
        self.outbound.send(StompMessage::Frame(frame)).is_ok()
    }
}

struct ClientState {
    credentials: Option<Credentials>,
    phase: Phase,
    /// Bumped by every connect attempt and every explicit disconnect; work
    /// tagged with an older value is stale and must not touch the state.
    generation: u64,
    link: Option<ActiveLink>,
    rooms: RoomRegistry,
    notification_subscription: Option<SubscriptionHandle>,
    reconnect_task: Option<JoinHandle<()>>,
}

struct Established {
    channel: TransportChannel,
    server_heart_beat: HeartBeat,
}

enum Route {
    Notifications,
    Room(RoomId),
}

/// Shared connection to the chat broker.
///
/// Every public operation is best-effort: failures are logged and never
/// returned. Connection state changes are observable only through the
/// connection-status handlers.
pub struct ChatClient {
    transport: Arc<dyn Transport>,
    settings: ClientSettings,
    connected: AtomicBool,
    handlers: HandlerRegistry,
    state: Mutex<ClientState>,
}

impl ChatClient {
    pub fn new(transport: Arc<dyn Transport>, settings: ClientSettings) -> Arc<Self> {
        Arc::new(Self {
            transport,
            settings,
            connected: AtomicBool::new(false),
            handlers: HandlerRegistry::default(),
            state: Mutex::new(ClientState {
                credentials: None,
                phase: Phase::Disconnected,
                generation: 0,
                link: None,
                rooms: RoomRegistry::default(),
                notification_subscription: None,
                reconnect_task: None,
            }),
        })
    }

    pub fn from_settings(settings: ClientSettings) -> Result<Arc<Self>, TransportError> {
        let transport = WsTransport::new(&settings.broker_url)?;
        Ok(Self::new(Arc::new(transport), settings))
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn set_credentials(self: &Arc<Self>, token: impl Into<String>, identity: impl Into<String>) {
        {
            let mut state = self.state.lock().await;
            state.credentials = Some(Credentials {
                token: token.into(),
                identity: identity.into(),
            });
        }
        if !self.is_connected() {
            self.connect().await;
        }
    }

    pub async fn connect(self: &Arc<Self>) {
        self.connect_attempt(None).await;
    }

    /// `scheduled_at` is set for reconnects: the attempt is dropped if the
    /// client moved to another generation while the timer ran.
    async fn connect_attempt(self: &Arc<Self>, scheduled_at: Option<u64>) {
        let (credentials, attempt) = {
            let mut state = self.state.lock().await;
            if scheduled_at.is_some_and(|generation| generation != state.generation) {
                debug!("chat: stale reconnect skipped");
                return;
            }
            if state.phase != Phase::Disconnected {
                debug!(phase = ?state.phase, "chat: connect skipped; already active");
                return;
            }
            let Some(credentials) = state.credentials.clone() else {
                debug!("chat: connect skipped; no credentials");
                return;
            };
            state.phase = Phase::Connecting;
            state.generation += 1;
            (credentials, state.generation)
        };

        info!(identity = %credentials.identity, attempt, "chat: connecting");
        match self.handshake(&credentials).await {
            Ok(established) => self.on_connected(attempt, &credentials, established).await,
            Err(err) => {
                warn!(error = %err, "chat: connect failed");
                self.on_connect_failed(attempt).await;
            }
        }
    }

    async fn handshake(&self, credentials: &Credentials) -> Result<Established, ConnectError> {
        let mut channel = self
            .transport
            .open()
            .await
            .map_err(ConnectError::Transport)?;
        let connect = Frame::connect(&self.transport.host(), self.settings.heart_beat)
            .with_header("Authorization", format!("Bearer {}", credentials.token));
        channel
            .outbound
            .send(StompMessage::Frame(connect))
            .map_err(|_| ConnectError::ClosedDuringHandshake)?;

        loop {
            let frame = match channel.inbound.recv().await {
                None => return Err(ConnectError::ClosedDuringHandshake),
                Some(StompMessage::Heartbeat) => continue,
                Some(StompMessage::Frame(frame)) => frame,
            };
            return match frame.command {
                Command::Connected => {
                    let server_heart_beat = frame
                        .header("heart-beat")
                        .map(HeartBeat::parse)
                        .transpose()?
                        .unwrap_or_default();
                    Ok(Established {
                        channel,
                        server_heart_beat,
                    })
                }
                Command::Error => Err(ConnectError::Rejected(
                    frame
                        .header("message")
                        .unwrap_or("no reason given")
                        .to_string(),
                )),
                other => Err(ConnectError::UnexpectedFrame(other)),
            };
        }
    }

    async fn on_connected(
        self: &Arc<Self>,
        attempt: u64,
        credentials: &Credentials,
        established: Established,
    ) {
        let Established {
            channel,
            server_heart_beat,
        } = established;
        let TransportChannel { outbound, inbound } = channel;

        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            if state.generation != attempt || state.phase != Phase::Connecting {
                info!(attempt, "chat: connection superseded before handshake finished; closing");
                let _ = outbound.send(StompMessage::Frame(Frame::disconnect()));
                return;
            }

            let notification_handle = SubscriptionHandle {
                id: state.rooms.next_subscription_id(),
                generation: attempt,
            };
            let topic = user_notification_topic(&credentials.identity);
            if outbound
                .send(StompMessage::Frame(Frame::subscribe(
                    notification_handle.id.as_str(),
                    &topic,
                )))
                .is_ok()
            {
                debug!(subscription_id = %notification_handle.id, topic, "chat: notification channel subscribed");
                state.notification_subscription = Some(notification_handle);
            } else {
                warn!("chat: notification subscribe failed; transport closed");
            }

            for room_id in state.rooms.room_ids() {
                open_room_subscription(&mut state.rooms, attempt, &outbound, room_id);
            }

            let heartbeat_task = self
                .settings
                .heart_beat
                .negotiate_outgoing(&server_heart_beat)
                .map(|interval| spawn_heartbeats(outbound.clone(), interval));
            let idle_limit = self
                .settings
                .heart_beat
                .negotiate_incoming(&server_heart_beat)
                .map(|interval| interval * 2);
            let reader_task = tokio::spawn(Arc::clone(self).read_loop(attempt, inbound, idle_limit));

            state.link = Some(ActiveLink {
                outbound,
                reader_task,
                heartbeat_task,
            });
            state.phase = Phase::Connected;
            self.connected.store(true, Ordering::SeqCst);
            info!(identity = %credentials.identity, attempt, "chat: connected");
            // Reported under the state lock; handlers observe flips in order.
            self.handlers.notify_status(true);
        }
    }

    async fn on_connect_failed(self: &Arc<Self>, attempt: u64) {
        let mut state = self.state.lock().await;
        if state.generation != attempt || state.phase != Phase::Connecting {
            return;
        }
        state.phase = Phase::Disconnected;
        self.schedule_reconnect(&mut state);
    }

    fn schedule_reconnect(self: &Arc<Self>, state: &mut ClientState) {
        let client = Arc::clone(self);
        let delay = self.settings.reconnect_delay;
        let scheduled_at = state.generation;
        info!(delay_ms = delay.as_millis() as u64, "chat: reconnect scheduled");
        state.reconnect_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            client.connect_attempt(Some(scheduled_at)).await;
        }));
    }

    async fn read_loop(
        self: Arc<Self>,
        generation: u64,
        mut inbound: mpsc::UnboundedReceiver<StompMessage>,
        idle_limit: Option<Duration>,
    ) {
        loop {
            let next = match idle_limit {
                Some(limit) => match tokio::time::timeout(limit, inbound.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(
                            idle_ms = limit.as_millis() as u64,
                            "chat: broker went silent past heart-beat window"
                        );
                        None
                    }
                },
                None => inbound.recv().await,
            };
            match next {
                None => break,
                Some(StompMessage::Heartbeat) => {}
                Some(StompMessage::Frame(frame)) => self.handle_frame(generation, frame).await,
            }
        }
        self.on_connection_lost(generation).await;
    }

    async fn handle_frame(&self, generation: u64, frame: Frame) {
        match frame.command {
            Command::Message => {}
            Command::Error => {
                warn!(
                    reason = frame.header("message").unwrap_or_default(),
                    "chat: broker reported an error"
                );
                return;
            }
            other => {
                debug!(command = %other, "chat: ignoring frame");
                return;
            }
        }

        let Some(subscription) = frame.header("subscription") else {
            warn!("chat: MESSAGE frame without subscription header dropped");
            return;
        };
        let route = {
            let state = self.state.lock().await;
            if state.generation != generation {
                return;
            }
            if state
                .notification_subscription
                .as_ref()
                .is_some_and(|handle| handle.id.as_str() == subscription)
            {
                Some(Route::Notifications)
            } else {
                state
                    .rooms
                    .room_for_subscription(subscription, generation)
                    .cloned()
                    .map(Route::Room)
            }
        };

        let body = match frame.body_str() {
            Ok(body) => body,
            Err(err) => {
                warn!(subscription, error = %err, "chat: dropping frame with unreadable body");
                return;
            }
        };
        match route {
            Some(Route::Room(room_id)) => match decode_room_message(body, &room_id) {
                Ok(message) => {
                    let delivered = self.handlers.dispatch_message(&room_id, &message);
                    debug!(room_id = %room_id, delivered, "chat: room message dispatched");
                }
                Err(err) => {
                    warn!(room_id = %room_id, error = %format!("{err:#}"), "chat: dropping malformed room message");
                }
            },
            Some(Route::Notifications) => match decode_notification(body) {
                Ok(notification) => {
                    let delivered = self.handlers.dispatch_notification(&notification);
                    debug!(room_id = %notification.room_id, delivered, "chat: notification dispatched");
                }
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "chat: dropping malformed notification");
                }
            },
            None => debug!(subscription, "chat: MESSAGE for unknown subscription dropped"),
        }
    }

    async fn on_connection_lost(self: &Arc<Self>, generation: u64) {
        {
            let mut state = self.state.lock().await;
            if state.generation != generation || state.phase != Phase::Connected {
                return;
            }
            if let Some(link) = state.link.take() {
                if let Some(task) = link.heartbeat_task {
                    task.abort();
                }
            }
            state.phase = Phase::Disconnected;
            state.notification_subscription = None;
            state.rooms.invalidate_all();
            self.connected.store(false, Ordering::SeqCst);
            self.schedule_reconnect(&mut state);
            warn!(generation, "chat: connection lost");
            self.handlers.notify_status(false);
        }
    }

    pub async fn disconnect(&self) {
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            state.generation += 1;
            if let Some(task) = state.reconnect_task.take() {
                task.abort();
            }
            let notification = state.notification_subscription.take();
            let rooms = state.rooms.drain();
            if let Some(link) = state.link.take() {
                if let Some(handle) = notification {
                    link.send(Frame::unsubscribe(handle.id.as_str()));
                }
                for (room_id, subscription) in rooms {
                    if let RoomSubscription::Subscribed(handle) = subscription {
                        debug!(room_id = %room_id, subscription_id = %handle.id, "chat: unsubscribing room");
                        link.send(Frame::unsubscribe(handle.id.as_str()));
                    }
                }
                link.send(Frame::disconnect());
                link.reader_task.abort();
                if let Some(task) = link.heartbeat_task {
                    task.abort();
                }
            }
            state.phase = Phase::Disconnected;
            info!("chat: disconnected");
            if self.connected.swap(false, Ordering::SeqCst) {
                self.handlers.notify_status(false);
            }
        }
    }

    pub async fn subscribe_to_room(&self, room_id: RoomId) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        match (&state.link, state.phase) {
            (Some(link), Phase::Connected) => {
                open_room_subscription(&mut state.rooms, state.generation, &link.outbound, room_id);
            }
            _ => {
                debug!(room_id = %room_id, "chat: room subscription queued until connected");
                state.rooms.mark_pending(room_id);
            }
        }
    }

    pub async fn unsubscribe_from_room(&self, room_id: &RoomId) {
        let mut state = self.state.lock().await;
        match state.rooms.remove(room_id) {
            Some(RoomSubscription::Subscribed(handle)) => {
                let live = handle.generation == state.generation;
                match state.link.as_ref() {
                    Some(link) if live => {
                        if link.send(Frame::unsubscribe(handle.id.as_str())) {
                            debug!(room_id = %room_id, subscription_id = %handle.id, "chat: room unsubscribed");
                        } else {
                            warn!(room_id = %room_id, "chat: unsubscribe failed; transport closed");
                        }
                    }
                    _ => debug!(room_id = %room_id, "chat: dropped stale room subscription"),
                }
            }
            Some(RoomSubscription::Pending) => {
                debug!(room_id = %room_id, "chat: pending room subscription cancelled");
            }
            None => debug!(room_id = %room_id, "chat: unsubscribe for unknown room ignored"),
        }
    }

    pub async fn send_message(&self, room_id: &RoomId, message: &ChatMessage) {
        let state = self.state.lock().await;
        let link = match (&state.link, state.phase) {
            (Some(link), Phase::Connected) => link,
            _ => {
                warn!(room_id = %room_id, "chat: not connected; message dropped");
                return;
            }
        };
        let body = match serde_json::to_vec(message) {
            Ok(body) => body,
            Err(err) => {
                error!(room_id = %room_id, error = %err, "chat: failed to encode message");
                return;
            }
        };
        let frame = Frame::send(&send_message_destination(room_id), JSON_CONTENT_TYPE, body);
        if !link.send(frame) {
            warn!(room_id = %room_id, "chat: transport closed; message dropped");
        }
    }

    pub async fn subscribed_rooms(&self) -> Vec<RoomId> {
        self.state.lock().await.rooms.subscribed_rooms()
    }

    pub async fn pending_rooms(&self) -> Vec<RoomId> {
        self.state.lock().await.rooms.pending_rooms()
    }

    pub async fn room_subscription(&self, room_id: &RoomId) -> Option<RoomSubscription> {
        self.state.lock().await.rooms.get(room_id).cloned()
    }

    pub fn add_message_handler(&self, room_id: RoomId, handler: MessageHandler) -> bool {
        self.handlers.add_message_handler(room_id, handler)
    }

    pub fn remove_message_handler(&self, room_id: &RoomId, handler: &MessageHandler) -> bool {
        self.handlers.remove_message_handler(room_id, handler)
    }

    pub fn add_notification_handler(&self, handler: NotificationHandler) -> bool {
        self.handlers.add_notification_handler(handler)
    }

    pub fn remove_notification_handler(&self, handler: &NotificationHandler) -> bool {
        self.handlers.remove_notification_handler(handler)
    }

    /// Newly registered handlers are called right away with the current
    /// status. If the status flips while that call runs, the handler is
    /// called again so its last value matches `is_connected`.
    pub fn add_connection_status_handler(&self, handler: ConnectionStatusHandler) -> bool {
        if !self.handlers.add_status_handler(Arc::clone(&handler)) {
            return false;
        }
        let mut reported = self.is_connected();
        handler(reported);
        loop {
            let current = self.is_connected();
            if current == reported {
                break;
            }
            handler(current);
            reported = current;
        }
        true
    }

    pub fn remove_connection_status_handler(&self, handler: &ConnectionStatusHandler) -> bool {
        self.handlers.remove_status_handler(handler)
    }
}

/// Replaces any live handle for the room: the old one is unsubscribed
/// before the new SUBSCRIBE goes out.
fn open_room_subscription(
    rooms: &mut RoomRegistry,
    generation: u64,
    outbound: &mpsc::UnboundedSender<StompMessage>,
    room_id: RoomId,
) {
    if let Some(previous) = rooms.live_handle(&room_id, generation).cloned() {
        let _ = outbound.send(StompMessage::Frame(Frame::unsubscribe(previous.id.as_str())));
        debug!(room_id = %room_id, subscription_id = %previous.id, "chat: replaced room subscription");
    }

    let handle = SubscriptionHandle {
        id: rooms.next_subscription_id(),
        generation,
    };
    let frame = Frame::subscribe(handle.id.as_str(), &room_topic(&room_id));
    if outbound.send(StompMessage::Frame(frame)).is_err() {
        warn!(room_id = %room_id, "chat: subscribe failed; transport closed");
        rooms.mark_pending(room_id);
        return;
    }
    debug!(room_id = %room_id, subscription_id = %handle.id, "chat: room subscribed");
    rooms.mark_subscribed(room_id, handle);
}

fn spawn_heartbeats(
    outbound: mpsc::UnboundedSender<StompMessage>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if outbound.send(StompMessage::Heartbeat).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
