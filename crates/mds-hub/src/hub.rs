//! Hub coordinator.
//!
//! One task owns the connection registry and the symbol → subscribers map and
//! applies [`HubCommand`]s in arrival order. Everything else talks to it
//! through a cloneable [`HubHandle`]. Commands travel on an unbounded channel,
//! so handle methods never wait on the coordinator (except the ones that ask
//! for a reply).
//!
//! Each connection's mailbox is a bounded `mpsc` sender held only by the
//! coordinator. Delivery uses `try_send`; a full mailbox drops the
//! connection: it leaves the registry and every subscription set, and
//! dropping the sender closes the mailbox, which ends the session's writer.
//! Because the registry is the only owner of the sender, a connection can be
//! closed at most once.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use ahash::RandomState;
use mds_core::time_util::now_ms;
use mds_core::{Bar, IndicatorValue, Tick};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::{DataKind, encode_data};

/// Outbound queue of one connection. Frames are pre-encoded JSON text.
pub type Mailbox = mpsc::Sender<Arc<str>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("hub is not running")]
    Closed,

    #[error("connection {0} is already registered")]
    DuplicateConnection(String),
}

#[derive(Debug)]
pub enum HubCommand {
    Register {
        id: String,
        mailbox: Mailbox,
        ack: oneshot::Sender<Result<(), HubError>>,
    },
    Unregister {
        id: String,
    },
    Subscribe {
        id: String,
        symbol: String,
    },
    Unsubscribe {
        id: String,
        symbol: String,
    },
    /// Deliver to every registered connection.
    Broadcast {
        message: Arc<str>,
    },
    /// Deliver to the subscribers of one symbol.
    BroadcastToSymbol {
        symbol: String,
        message: Arc<str>,
    },
    /// Deliver to one connection (acknowledgements, pong).
    SendTo {
        id: String,
        message: Arc<str>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
    Shutdown,
}

/// Snapshot of hub state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    /// Subscriber count per symbol; symbols with no subscribers are absent.
    pub subscribers: BTreeMap<String, usize>,
}

/// Coordinator state. Lives inside the task started by [`spawn_hub`].
#[derive(Default)]
struct Hub {
    clients: HashMap<String, Mailbox, RandomState>,
    subscriptions: HashMap<String, HashSet<String, RandomState>, RandomState>,
}

impl Hub {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<HubCommand>) {
        info!("[hub] started");
        while let Some(command) = commands.recv().await {
            if !self.apply(command) {
                break;
            }
        }
        let open = self.clients.len();
        self.clients.clear();
        self.subscriptions.clear();
        info!("[hub] stopped ({open} connection(s) closed)");
    }

    /// Returns `false` on shutdown.
    fn apply(&mut self, command: HubCommand) -> bool {
        match command {
            HubCommand::Register { id, mailbox, ack } => {
                let result = if self.clients.contains_key(&id) {
                    Err(HubError::DuplicateConnection(id))
                } else {
                    info!("[hub] client connected: {id}");
                    self.clients.insert(id, mailbox);
                    Ok(())
                };
                let _ = ack.send(result);
            }
            HubCommand::Unregister { id } => {
                if self.drop_connection(&id) {
                    info!("[hub] client disconnected: {id}");
                }
            }
            HubCommand::Subscribe { id, symbol } => {
                if self.clients.contains_key(&id) {
                    debug!("[hub] {id} subscribed to {symbol}");
                    self.subscriptions.entry(symbol).or_default().insert(id);
                }
            }
            HubCommand::Unsubscribe { id, symbol } => {
                if let Some(set) = self.subscriptions.get_mut(&symbol) {
                    set.remove(&id);
                    if set.is_empty() {
                        self.subscriptions.remove(&symbol);
                    }
                    debug!("[hub] {id} unsubscribed from {symbol}");
                }
            }
            HubCommand::Broadcast { message } => {
                let targets: Vec<String> = self.clients.keys().cloned().collect();
                self.deliver(&targets, &message);
            }
            HubCommand::BroadcastToSymbol { symbol, message } => {
                let targets: Vec<String> = match self.subscriptions.get(&symbol) {
                    Some(set) => set.iter().cloned().collect(),
                    None => return true,
                };
                self.deliver(&targets, &message);
            }
            HubCommand::SendTo { id, message } => {
                self.deliver(std::slice::from_ref(&id), &message);
            }
            HubCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            HubCommand::Shutdown => return false,
        }
        true
    }

    fn deliver(&mut self, targets: &[String], message: &Arc<str>) {
        for id in targets {
            let Some(mailbox) = self.clients.get(id) else {
                continue;
            };
            match mailbox.try_send(message.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("[hub] mailbox full, dropping client {id}");
                    self.drop_connection(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("[hub] mailbox closed, dropping client {id}");
                    self.drop_connection(id);
                }
            }
        }
    }

    /// Remove `id` everywhere. Returns whether it was registered.
    fn drop_connection(&mut self, id: &str) -> bool {
        if self.clients.remove(id).is_none() {
            return false;
        }
        self.subscriptions.retain(|_, set| {
            set.remove(id);
            !set.is_empty()
        });
        true
    }

    fn stats(&self) -> HubStats {
        HubStats {
            connections: self.clients.len(),
            subscribers: self.subscriptions.iter().map(|(s, set)| (s.clone(), set.len())).collect(),
        }
    }
}

/// Start the coordinator task.
pub fn spawn_hub() -> (HubHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(Hub::default().run(rx));
    (HubHandle { commands: tx }, task)
}

/// Cloneable front end to the coordinator.
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    fn send(&self, command: HubCommand) {
        if self.commands.send(command).is_err() {
            debug!("[hub] command dropped, hub stopped");
        }
    }

    /// Register a connection. Waits for the coordinator so the caller knows
    /// the id was accepted before it starts reading.
    pub async fn register(&self, id: impl Into<String>, mailbox: Mailbox) -> Result<(), HubError> {
        let (ack, rx) = oneshot::channel();
        self.commands
            .send(HubCommand::Register { id: id.into(), mailbox, ack })
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)?
    }

    /// Idempotent.
    pub fn unregister(&self, id: impl Into<String>) {
        self.send(HubCommand::Unregister { id: id.into() });
    }

    pub fn subscribe(&self, id: impl Into<String>, symbol: impl Into<String>) {
        self.send(HubCommand::Subscribe { id: id.into(), symbol: symbol.into() });
    }

    pub fn unsubscribe(&self, id: impl Into<String>, symbol: impl Into<String>) {
        self.send(HubCommand::Unsubscribe { id: id.into(), symbol: symbol.into() });
    }

    pub fn broadcast(&self, message: impl Into<Arc<str>>) {
        self.send(HubCommand::Broadcast { message: message.into() });
    }

    pub fn broadcast_to_symbol(&self, symbol: impl Into<String>, message: impl Into<Arc<str>>) {
        self.send(HubCommand::BroadcastToSymbol { symbol: symbol.into(), message: message.into() });
    }

    pub fn send_to(&self, id: impl Into<String>, message: impl Into<Arc<str>>) {
        self.send(HubCommand::SendTo { id: id.into(), message: message.into() });
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(HubCommand::Stats { reply }).map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Close every connection and stop the coordinator.
    pub fn shutdown(&self) {
        self.send(HubCommand::Shutdown);
    }

    pub fn send_tick(&self, tick: &Tick) {
        self.send_data(DataKind::Tick, &tick.symbol, tick);
    }

    pub fn send_bar(&self, bar: &Bar) {
        self.send_data(DataKind::Ohlcv, &bar.symbol, bar);
    }

    pub fn send_indicator(&self, value: &IndicatorValue) {
        self.send_data(DataKind::Indicator, &value.symbol, value);
    }

    fn send_data<T: Serialize>(&self, kind: DataKind, symbol: &str, data: &T) {
        match encode_data(kind, symbol, data, now_ms()) {
            Ok(frame) => self.broadcast_to_symbol(symbol, frame),
            Err(e) => warn!("[hub] failed to encode {} for {symbol}: {e}", kind.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mds_core::Timeframe;
    use serde_json::Value;

    async fn connect(hub: &HubHandle, id: &str, size: usize) -> mpsc::Receiver<Arc<str>> {
        let (tx, rx) = mpsc::channel(size);
        hub.register(id, tx).await.unwrap();
        rx
    }

    fn tick(symbol: &str) -> Tick {
        Tick { timestamp: 1, symbol: symbol.into(), price: 10.0, volume: 1.0, bid: None, ask: None }
    }

    #[tokio::test]
    async fn tick_reaches_only_symbol_subscribers() {
        let (hub, _task) = spawn_hub();
        let mut c1 = connect(&hub, "c1", 8).await;
        let mut c2 = connect(&hub, "c2", 8).await;

        hub.subscribe("c1", "AAPL");
        hub.send_tick(&tick("AAPL"));
        hub.stats().await.unwrap();

        let frame: Value = serde_json::from_str(&c1.try_recv().unwrap()).unwrap();
        assert_eq!(frame["type"], "tick");
        assert_eq!(frame["symbol"], "AAPL");
        assert_eq!(frame["data"]["price"], 10.0);
        assert!(c1.try_recv().is_err());
        assert!(c2.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_mailbox_drops_connection_once() {
        let (hub, _task) = spawn_hub();
        let mut slow = connect(&hub, "slow", 1).await;
        let mut fast = connect(&hub, "fast", 8).await;
        hub.subscribe("slow", "AAPL");
        hub.subscribe("fast", "AAPL");

        hub.broadcast_to_symbol("AAPL", "one");
        hub.broadcast_to_symbol("AAPL", "two");
        hub.broadcast("three");

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.subscribers.get("AAPL"), Some(&1));

        // The queued frame is still readable, then the mailbox reports closed.
        assert_eq!(&*slow.recv().await.unwrap(), "one");
        assert!(slow.recv().await.is_none());

        for expected in ["one", "two", "three"] {
            assert_eq!(&*fast.recv().await.unwrap(), expected);
        }

        // Later operations on the dropped id are no-ops.
        hub.unregister("slow");
        hub.send_to("slow", "late");
        assert_eq!(hub.stats().await.unwrap().connections, 1);
    }

    #[tokio::test]
    async fn last_unsubscribe_prunes_symbol() {
        let (hub, _task) = spawn_hub();
        let mut c1 = connect(&hub, "c1", 8).await;
        let _c2 = connect(&hub, "c2", 8).await;

        hub.subscribe("c1", "AAPL");
        hub.subscribe("c1", "AAPL");
        hub.subscribe("c2", "AAPL");
        assert_eq!(hub.stats().await.unwrap().subscribers.get("AAPL"), Some(&2));

        hub.unsubscribe("c1", "AAPL");
        hub.unsubscribe("c2", "AAPL");
        assert!(hub.stats().await.unwrap().subscribers.is_empty());

        hub.broadcast_to_symbol("AAPL", "nobody");
        hub.stats().await.unwrap();
        assert!(c1.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_removes_all_subscriptions_and_closes_mailbox() {
        let (hub, _task) = spawn_hub();
        let mut c1 = connect(&hub, "c1", 8).await;
        let _c2 = connect(&hub, "c2", 8).await;
        hub.subscribe("c1", "AAPL");
        hub.subscribe("c1", "MSFT");
        hub.subscribe("c2", "MSFT");

        hub.unregister("c1");
        hub.unregister("c1");
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.subscribers, BTreeMap::from([("MSFT".to_string(), 1)]));
        assert!(c1.recv().await.is_none());
    }

    #[tokio::test]
    async fn subscribe_requires_registration() {
        let (hub, _task) = spawn_hub();
        hub.subscribe("ghost", "AAPL");
        assert!(hub.stats().await.unwrap().subscribers.is_empty());
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let (hub, _task) = spawn_hub();
        let _c1 = connect(&hub, "c1", 8).await;
        let (tx, _rx) = mpsc::channel(1);
        assert_eq!(
            hub.register("c1", tx).await.unwrap_err(),
            HubError::DuplicateConnection("c1".into())
        );
    }

    #[tokio::test]
    async fn bar_and_indicator_envelopes() {
        let (hub, _task) = spawn_hub();
        let mut c1 = connect(&hub, "c1", 8).await;
        hub.subscribe("c1", "AAPL");

        hub.send_bar(&Bar {
            timestamp: 60_000,
            symbol: "AAPL".into(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 100.0,
            timeframe: Timeframe::M1,
        });
        hub.send_indicator(&IndicatorValue {
            timestamp: 60_000,
            symbol: "AAPL".into(),
            timeframe: Timeframe::M1,
            name: "rsi".into(),
            value: 55.0,
            metadata: None,
        });
        hub.stats().await.unwrap();

        let bar: Value = serde_json::from_str(&c1.try_recv().unwrap()).unwrap();
        assert_eq!(bar["type"], "ohlcv");
        assert_eq!(bar["data"]["timeframe"], "1m");
        let ind: Value = serde_json::from_str(&c1.try_recv().unwrap()).unwrap();
        assert_eq!(ind["type"], "indicator");
        assert_eq!(ind["data"]["name"], "rsi");
    }

    #[tokio::test]
    async fn shutdown_closes_everything() {
        let (hub, task) = spawn_hub();
        let mut c1 = connect(&hub, "c1", 8).await;
        hub.shutdown();
        task.await.unwrap();

        assert!(c1.recv().await.is_none());
        assert_eq!(hub.stats().await.unwrap_err(), HubError::Closed);
        let (tx, _rx) = mpsc::channel(1);
        assert_eq!(hub.register("c2", tx).await.unwrap_err(), HubError::Closed);
    }
}
