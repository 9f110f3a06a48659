//! Client facade.
//!
//! [`Client`] is a cheap handle: clones share one connection slot, one
//! event router and one settings value. At most one connection exists at a
//! time. Each connection gets a fresh generation tag, and callbacks from a
//! connection that is no longer current are ignored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use craft_core::{
    ActionData, ActionType, Block, CraftError, Entity, FuelInfo, InventoryData, ItemSlot, Location,
    Player, Result, Token, decode_reply,
};
use craft_settings::ClientSettings;

use crate::codec::ServerEvent;
use crate::engine::{Connection, ConnectionObserver, PendingReply};
use crate::events::{BlockUpdateEvent, ClientEvent, EventKind};
use crate::router::EventRouter;
use crate::transaction::Transaction;

/// Lifecycle state of a [`Client`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket.
    Disconnected,
    /// Socket opening or `authenticate` in flight.
    Connecting,
    /// Authenticated and ready.
    Connected,
}

/// Arguments of [`Client::move_item`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveItem {
    /// Container holding the item.
    pub source: Location,
    /// Slot index inside `source`.
    pub index: u32,
    /// How many items to move; all when `None`.
    pub amount: Option<u32>,
    /// Container to move into.
    pub target: Location,
    /// Slot index inside `target`; first free slot when `None`.
    pub target_index: Option<u32>,
}

impl MoveItem {
    /// Move the whole stack in `slot` into `target`.
    pub fn from_slot(slot: &ItemSlot, target: Location) -> Self {
        Self {
            source: slot.location,
            index: slot.index,
            amount: None,
            target,
            target_index: None,
        }
    }

    fn to_fields(self) -> ActionData {
        let mut data = self.source.to_fields("");
        data.extend(self.target.to_fields("target_"));
        let _ = data.insert("index".into(), Value::from(self.index));
        if let Some(amount) = self.amount {
            let _ = data.insert("amount".into(), Value::from(amount));
        }
        if let Some(target_index) = self.target_index {
            let _ = data.insert("target_index".into(), Value::from(target_index));
        }
        data
    }
}

enum Slot {
    Disconnected,
    Opening(u64),
    Open(Arc<Connection>),
}

impl Slot {
    fn generation(&self) -> Option<u64> {
        match self {
            Self::Disconnected => None,
            Self::Opening(generation) => Some(*generation),
            Self::Open(connection) => Some(connection.generation()),
        }
    }
}

struct ClientInner {
    me: Weak<ClientInner>,
    settings: ClientSettings,
    router: EventRouter,
    slot: Mutex<Slot>,
    generations: AtomicU64,
    token: Mutex<Option<Token>>,
}

impl ClientInner {
    fn connection(&self) -> Result<Arc<Connection>> {
        match &*self.slot.lock() {
            Slot::Open(connection) => Ok(Arc::clone(connection)),
            Slot::Disconnected | Slot::Opening(_) => Err(CraftError::NotConnected),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.slot.lock().generation() == Some(generation)
    }

    /// Undo an unfinished `connect`: forget an opening slot, close an
    /// installed but unauthenticated connection. A connection whose actor
    /// died without tearing down is released here, since nothing else will.
    fn abandon(&self, generation: u64) {
        let previous = {
            let mut slot = self.slot.lock();
            match &*slot {
                Slot::Opening(g) if *g == generation => std::mem::replace(&mut *slot, Slot::Disconnected),
                Slot::Open(connection) if connection.generation() == generation => {
                    connection.close();
                    if !connection.is_lost() {
                        return;
                    }
                    warn!(generation, "connection stopped without teardown");
                    std::mem::replace(&mut *slot, Slot::Disconnected)
                }
                _ => return,
            }
        };
        drop(previous);
    }

    /// Reset the slot if it still belongs to `generation`.
    fn release(&self, generation: u64) -> bool {
        let previous = {
            let mut slot = self.slot.lock();
            if slot.generation() != Some(generation) {
                return false;
            }
            std::mem::replace(&mut *slot, Slot::Disconnected)
        };
        drop(previous);
        true
    }
}

/// Abandons the attempt unless `connect` ran to success.
struct ConnectAttempt<'a> {
    inner: &'a ClientInner,
    generation: u64,
    completed: bool,
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.inner.abandon(self.generation);
        }
    }
}

impl ConnectionObserver for ClientInner {
    fn on_event(&self, generation: u64, event: ServerEvent) {
        if !self.is_current(generation) {
            debug!(generation, "dropping event from stale connection");
            return;
        }
        let event = match event {
            ServerEvent::BlockUpdate(update) => ClientEvent::BlockUpdate(update),
            ServerEvent::Transaction(request) => {
                let Some(inner) = self.me.upgrade() else {
                    return;
                };
                ClientEvent::Transaction(Transaction::new(Client { inner }, request))
            }
            ServerEvent::Unknown { .. } => return,
        };
        let _ = self.router.dispatch(&event);
    }

    fn on_error(&self, generation: u64, error: CraftError) {
        if !self.is_current(generation) {
            debug!(generation, %error, "dropping error from stale connection");
            return;
        }
        let _ = self.router.dispatch(&ClientEvent::Error(error));
    }

    fn on_closed(&self, generation: u64) {
        if self.release(generation) {
            let _ = self.router.dispatch(&ClientEvent::Close);
        } else {
            debug!(generation, "stale connection closed");
        }
    }
}

/// Client for one structure on a craft server.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Client using the global settings.
    pub fn new() -> Self {
        Self::with_settings(craft_settings::get_settings().clone())
    }

    /// Client using explicit settings.
    pub fn with_settings(settings: ClientSettings) -> Self {
        Self {
            inner: Arc::new_cyclic(|me| ClientInner {
                me: me.clone(),
                settings,
                router: EventRouter::new(),
                slot: Mutex::new(Slot::Disconnected),
                generations: AtomicU64::new(0),
                token: Mutex::new(None),
            }),
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Connect and authenticate with `token`.
    ///
    /// Completes once the server accepted the token. A rejected token
    /// closes the socket and returns the server's error. Settings that fail
    /// validation are rejected before anything is opened.
    pub async fn connect(&self, token: Token) -> Result<()> {
        self.inner
            .settings
            .validate()
            .map_err(|e| CraftError::InvalidSettings(e.to_string()))?;
        let generation = {
            let mut slot = self.inner.slot.lock();
            if !matches!(*slot, Slot::Disconnected) {
                return Err(CraftError::AlreadyConnected);
            }
            let generation = self.inner.generations.fetch_add(1, Ordering::AcqRel) + 1;
            *slot = Slot::Opening(generation);
            generation
        };
        let mut attempt = ConnectAttempt {
            inner: &self.inner,
            generation,
            completed: false,
        };

        let url = self.inner.settings.gateway_url(token.host());
        let raw = token.raw().to_string();
        *self.inner.token.lock() = Some(token);

        let observer: Weak<dyn ConnectionObserver> = self.inner.me.clone();
        let connection = Arc::new(
            Connection::open(
                &url,
                generation,
                self.inner.settings.keepalive_interval(),
                observer,
            )
            .await?,
        );

        {
            let mut slot = self.inner.slot.lock();
            if !matches!(*slot, Slot::Opening(g) if g == generation) {
                // Torn down before it was installed.
                return Err(CraftError::ConnectionClosed);
            }
            *slot = Slot::Open(Arc::clone(&connection));
        }

        let mut credentials = ActionData::new();
        let _ = credentials.insert("token".into(), Value::from(raw));
        let authenticated = match connection.send(ActionType::Authenticate, credentials) {
            Ok(reply) => reply.await,
            Err(error) => Err(error),
        };

        match authenticated {
            Ok(_) => {
                attempt.completed = true;
                connection.mark_authenticated();
                info!(generation, "authenticated");
                let _ = self.inner.router.dispatch(&ClientEvent::Open);
                Ok(())
            }
            Err(error) => {
                warn!(generation, %error, "authentication failed");
                connection.close();
                connection.closed().await;
                Err(error)
            }
        }
    }

    /// Close the connection.
    ///
    /// Returns after every pending request has failed with
    /// [`CraftError::ConnectionClosed`] and the close event was dispatched.
    pub async fn disconnect(&self) -> Result<()> {
        let connection = self.inner.connection()?;
        connection.close();
        connection.closed().await;
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        match &*self.inner.slot.lock() {
            Slot::Disconnected => ConnectionState::Disconnected,
            Slot::Open(connection) if connection.is_authenticated() => ConnectionState::Connected,
            Slot::Opening(_) | Slot::Open(_) => ConnectionState::Connecting,
        }
    }

    /// Whether the client is authenticated and ready.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Token of the most recent `connect`.
    pub fn token(&self) -> Option<Token> {
        self.inner.token.lock().clone()
    }

    /// Settings this client was built with.
    pub fn settings(&self) -> &ClientSettings {
        &self.inner.settings
    }

    // ── Events ──────────────────────────────────────────────────────────

    /// Run `handler` for every event of `kind`.
    pub fn on(&self, kind: EventKind, handler: impl Fn(&ClientEvent) + Send + Sync + 'static) {
        self.inner.router.on(kind, handler);
    }

    /// Run `handler` for the next event of `kind` only.
    pub fn once(&self, kind: EventKind, handler: impl Fn(&ClientEvent) + Send + Sync + 'static) {
        self.inner.router.once(kind, handler);
    }

    /// Run `handler` for every block update.
    pub fn on_block_update(&self, handler: impl Fn(&BlockUpdateEvent) + Send + Sync + 'static) {
        self.on(EventKind::BlockUpdate, move |event| {
            if let ClientEvent::BlockUpdate(update) = event {
                handler(update);
            }
        });
    }

    /// Run `handler` for every transaction.
    pub fn on_transaction(&self, handler: impl Fn(&Transaction) + Send + Sync + 'static) {
        self.on(EventKind::Transaction, move |event| {
            if let ClientEvent::Transaction(transaction) = event {
                handler(transaction);
            }
        });
    }

    /// Stream of every event from now on.
    ///
    /// Dropping the receiver unsubscribes it; each kind's registration is
    /// removed the next time an event of that kind fires.
    pub fn events(&self) -> mpsc::UnboundedReceiver<ClientEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        for kind in [
            EventKind::Open,
            EventKind::Close,
            EventKind::Error,
            EventKind::BlockUpdate,
            EventKind::Transaction,
        ] {
            let tx = tx.clone();
            self.inner
                .router
                .on_while(kind, move |event| tx.send(event.clone()).is_ok());
        }
        rx
    }

    // ── Requests ────────────────────────────────────────────────────────

    /// Send a raw request.
    ///
    /// Fails immediately with [`CraftError::NotConnected`] when there is no
    /// connection. The returned future completes with the reply payload.
    pub fn send(&self, action: ActionType, payload: ActionData) -> Result<PendingReply> {
        self.inner.connection()?.send(action, payload)
    }

    async fn request<T: DeserializeOwned>(&self, action: ActionType, payload: ActionData) -> Result<T> {
        let data = self.send(action, payload)?.await?;
        decode_reply(action, data)
    }

    async fn request_unit(&self, action: ActionType, payload: ActionData) -> Result<()> {
        let _ = self.send(action, payload)?.await?;
        Ok(())
    }

    /// Size of the structure.
    pub async fn get_size(&self) -> Result<Location> {
        self.request(ActionType::GetSize, ActionData::new()).await
    }

    /// World coordinates of the structure's origin.
    pub async fn get_location(&self) -> Result<Location> {
        self.request(ActionType::GetLocation, ActionData::new()).await
    }

    /// Block at `location`.
    pub async fn get_block(&self, location: Location) -> Result<Block> {
        #[derive(Deserialize)]
        struct Reply {
            block: Block,
        }
        let reply: Reply = self.request(ActionType::GetBlock, location.to_fields("")).await?;
        Ok(reply.block)
    }

    /// Replace the block at `location`; `None` places air.
    pub async fn set_block(&self, location: Location, block: Option<&Block>) -> Result<()> {
        let block = block.map_or_else(Block::air, Clone::clone);
        let mut payload = location.to_fields("");
        let _ = payload.insert("blockData".into(), Value::from(block.to_string()));
        self.request_unit(ActionType::SetBlock, payload).await
    }

    /// Receive block updates for `location`.
    pub async fn watch(&self, location: Location) -> Result<()> {
        self.request_unit(ActionType::Watch, location.to_fields("")).await
    }

    /// Stop watching `location`.
    pub async fn unwatch(&self, location: Location) -> Result<()> {
        self.request_unit(ActionType::Unwatch, location.to_fields("")).await
    }

    /// Poll `location` for updates. Slower and less reliable than `watch`.
    pub async fn poll(&self, location: Location) -> Result<()> {
        self.request_unit(ActionType::Poll, location.to_fields("")).await
    }

    /// Stop polling `location`.
    pub async fn unpoll(&self, location: Location) -> Result<()> {
        self.request_unit(ActionType::Unpoll, location.to_fields("")).await
    }

    /// Privately message `player`.
    pub async fn tell(&self, player: &Player, message: &str) -> Result<()> {
        let mut payload = ActionData::new();
        let _ = payload.insert("target".into(), Value::from(player.to_string()));
        let _ = payload.insert("message".into(), Value::from(message));
        self.request_unit(ActionType::Tell, payload).await
    }

    /// Accept or deny the transaction with `query_nonce`.
    ///
    /// Prefer [`Transaction::accept`] and [`Transaction::deny`], which guard
    /// against replying twice.
    pub async fn respond_transaction(&self, query_nonce: u64, accept: bool) -> Result<()> {
        let mut payload = ActionData::new();
        let _ = payload.insert("queryNonce".into(), Value::from(query_nonce));
        let _ = payload.insert("accept".into(), Value::from(accept));
        self.request_unit(ActionType::Respond, payload).await
    }

    /// Entities inside the structure.
    pub async fn get_entities(&self) -> Result<Vec<Entity>> {
        #[derive(Deserialize)]
        struct Reply {
            entities: Vec<Entity>,
        }
        let reply: Reply = self.request(ActionType::GetEntities, ActionData::new()).await?;
        Ok(reply.entities)
    }

    /// Occupied slots of the container at `location`.
    pub async fn get_inventory(&self, location: Location) -> Result<Vec<ItemSlot>> {
        let data: InventoryData = self
            .request(ActionType::GetInventory, location.to_fields(""))
            .await?;
        Ok(data.into_slots(location))
    }

    /// Move items between containers.
    pub async fn move_item(&self, movement: MoveItem) -> Result<()> {
        self.request_unit(ActionType::MoveItem, movement.to_fields()).await
    }

    /// Fuel usage and costs of the owner's structures.
    pub async fn get_fuel_info(&self) -> Result<FuelInfo> {
        self.request(ActionType::FuelInfo, ActionData::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn new_client_is_disconnected() {
        let client = Client::with_settings(ClientSettings::default());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.is_connected());
        assert!(client.token().is_none());
    }

    #[test]
    fn send_without_connection_fails_synchronously() {
        let client = Client::with_settings(ClientSettings::default());
        for action in ActionType::ALL {
            assert_matches!(
                client.send(action, ActionData::new()),
                Err(CraftError::NotConnected),
                "{action}"
            );
        }
    }

    #[tokio::test]
    async fn facade_calls_fail_when_disconnected() {
        let client = Client::with_settings(ClientSettings::default());
        assert_matches!(client.get_size().await, Err(CraftError::NotConnected));
        assert_matches!(
            client.set_block(Location::new(0, 0, 0), None).await,
            Err(CraftError::NotConnected)
        );
        assert_matches!(client.disconnect().await, Err(CraftError::NotConnected));
    }

    #[test]
    fn move_item_fields() {
        let movement = MoveItem {
            source: Location::new(0, 0, 0),
            index: 4,
            amount: Some(16),
            target: Location::new(1, 0, 0),
            target_index: None,
        };
        assert_eq!(
            Value::Object(movement.to_fields()),
            json!({
                "x": 0, "y": 0, "z": 0, "index": 4, "amount": 16,
                "target_x": 1, "target_y": 0, "target_z": 0
            })
        );
    }

    #[test]
    fn stale_generation_callbacks_are_ignored() {
        let client = Client::with_settings(ClientSettings::default());
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&events);
        client.on(EventKind::Close, move |event| seen.lock().push(event.kind()));
        let seen = Arc::clone(&events);
        client.on(EventKind::Error, move |event| seen.lock().push(event.kind()));

        *client.inner.slot.lock() = Slot::Opening(5);
        client.inner.on_error(4, CraftError::Decode("late".into()));
        client.inner.on_closed(4);
        assert!(events.lock().is_empty());
        assert_eq!(client.state(), ConnectionState::Connecting);

        client.inner.on_closed(5);
        assert_eq!(*events.lock(), vec![EventKind::Close]);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn abandon_releases_connection_lost_without_teardown() {
        let client = Client::with_settings(ClientSettings::default());
        *client.inner.slot.lock() = Slot::Open(Arc::new(Connection::lost(2)));
        assert_eq!(client.state(), ConnectionState::Connecting);

        client.inner.abandon(2);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn dropped_event_stream_unsubscribes() {
        let client = Client::with_settings(ClientSettings::default());
        let events = client.events();
        assert_eq!(client.inner.router.handler_count(EventKind::Open), 1);

        drop(events);
        let _ = client.inner.router.dispatch(&ClientEvent::Open);
        assert_eq!(client.inner.router.handler_count(EventKind::Open), 0);
        assert_eq!(client.inner.router.handler_count(EventKind::Close), 1);
    }
}
