//! Periodic tick producers.
//!
//! Each `subscribe_ticks` call spawns one tokio task that, on a fixed
//! interval, asks a [`TickSource`] for a tick per subscribed symbol and hands
//! it to the callback. The task's symbol set lives in a `watch` channel:
//! unsubscribing edits the set, and an empty set stops the task. Each round
//! runs under a per-producer gate and re-reads the set before every callback.
//! Unsubscribing waits on the gate of producers that keep running, and
//! stopping waits for the task to finish, so once
//! [`TickProducers::unsubscribe`] or [`TickProducers::stop_all`] returns the
//! callback will not run again for the removed symbols.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mds_core::Tick;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::TickCallback;

/// Where a producer gets its ticks from.
#[async_trait]
pub trait TickSource: Send + Sync + 'static {
    /// `None` skips the symbol for this round.
    async fn next_tick(&self, symbol: &str) -> Option<Tick>;
}

struct Producer {
    id: u64,
    symbols: watch::Sender<Vec<String>>,
    /// Held for the duration of one delivery round.
    gate: Arc<Mutex<()>>,
    task: JoinHandle<()>,
}

/// The live producers of one provider.
pub struct TickProducers {
    label: String,
    producers: Mutex<Vec<Producer>>,
    next_id: AtomicU64,
}

impl TickProducers {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            producers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Spawn a producer for `symbols`. The first round fires one `interval`
    /// after the call.
    pub async fn spawn(
        &self,
        symbols: Vec<String>,
        interval: Duration,
        source: Arc<dyn TickSource>,
        callback: TickCallback,
    ) {
        if symbols.is_empty() {
            return;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (symbols_tx, symbols_rx) = watch::channel(symbols);
        let label = format!("{}#{id}", self.label);
        let gate = Arc::new(Mutex::new(()));

        info!("[{label}] producer started for {:?}", *symbols_rx.borrow());
        let task = tokio::spawn(produce_loop(
            label,
            interval,
            symbols_rx,
            gate.clone(),
            source,
            callback,
        ));

        self.producers.lock().await.push(Producer { id, symbols: symbols_tx, gate, task });
    }

    /// Remove `symbols` from every producer. Producers left without symbols
    /// are stopped and awaited; the rest finish any round already in flight
    /// before this returns. Returns how many producers stopped.
    pub async fn unsubscribe(&self, symbols: &[String]) -> usize {
        let (finished, in_flight) = {
            let mut producers = self.producers.lock().await;
            for p in producers.iter() {
                p.symbols.send_modify(|set| set.retain(|s| !symbols.contains(s)));
            }
            let (done, live): (Vec<_>, Vec<_>) =
                producers.drain(..).partition(|p| p.symbols.borrow().is_empty());
            *producers = live;
            let gates: Vec<_> = producers.iter().map(|p| p.gate.clone()).collect();
            (done, gates)
        };
        for gate in in_flight {
            drop(gate.lock().await);
        }
        self.join(finished).await
    }

    /// Stop every producer and wait for all of them.
    pub async fn stop_all(&self) -> usize {
        let finished: Vec<Producer> = {
            let mut producers = self.producers.lock().await;
            producers.drain(..).collect()
        };
        for p in &finished {
            p.symbols.send_replace(Vec::new());
        }
        self.join(finished).await
    }

    pub async fn active(&self) -> usize {
        self.producers.lock().await.len()
    }

    async fn join(&self, finished: Vec<Producer>) -> usize {
        let count = finished.len();
        for p in finished {
            if let Err(e) = p.task.await {
                warn!("[{}#{}] producer task failed: {e}", self.label, p.id);
            }
        }
        if count > 0 {
            debug!("[{}] stopped {count} producer(s)", self.label);
        }
        count
    }
}

async fn produce_loop(
    label: String,
    period: Duration,
    mut symbols_rx: watch::Receiver<Vec<String>>,
    gate: Arc<Mutex<()>>,
    source: Arc<dyn TickSource>,
    callback: TickCallback,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = symbols_rx.changed() => {
                if changed.is_err() || symbols_rx.borrow().is_empty() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let _round = gate.lock().await;
                let symbols = symbols_rx.borrow().clone();
                if symbols.is_empty() {
                    break;
                }
                for symbol in &symbols {
                    let Some(tick) = source.next_tick(symbol).await else {
                        continue;
                    };
                    if symbols_rx.borrow().contains(symbol) {
                        callback(tick);
                    }
                }
            }
        }
    }

    info!("[{label}] producer stopped");
}
