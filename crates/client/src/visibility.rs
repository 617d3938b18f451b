//! Visibility reconciliation feed.
//!
//! Three channels feed one timeline for the current key: a one-shot cached
//! query, a live push subscription, and a trigger mutation that asks the
//! server to (re)compute. Whenever the key changes the feed bumps an epoch;
//! only results carrying the current epoch may commit, so a late arrival for
//! a superseded key can never leak into the new view. There is no network
//! cancellation: staleness discard plus dropping the old subscription is
//! the cancellation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, warn};

use satwatch_shared::models::VisibilityWindow;

pub use crate::api::VisibilityKey;
use crate::transport::{VisibilityTransport, WindowSubscription};

/// What the timeline renders: merged windows, a loading flag for the cached
/// query, and the aggregated error of the three channels.
#[derive(Debug, Clone, Default)]
pub struct VisibilityView {
    pub windows: Vec<VisibilityWindow>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Default)]
struct FeedState {
    epoch: u64,
    key: Option<VisibilityKey>,
    query_windows: Vec<VisibilityWindow>,
    /// Subscription batches accumulated for the current key, in arrival order.
    pushed: Vec<VisibilityWindow>,
    merged: Vec<VisibilityWindow>,
    loading: bool,
    query_error: Option<String>,
    subscription_error: Option<String>,
    trigger_error: Option<String>,
}

impl FeedState {
    fn reset_for(&mut self, key: VisibilityKey) -> u64 {
        self.epoch += 1;
        self.key = Some(key);
        self.query_windows.clear();
        self.pushed.clear();
        self.merged.clear();
        self.loading = true;
        self.query_error = None;
        self.subscription_error = None;
        self.trigger_error = None;
        self.epoch
    }

    fn remerge(&mut self) {
        self.merged = merge_windows(&self.query_windows, &self.pushed);
    }

    /// First non-empty message in query -> subscription -> mutation order.
    fn aggregated_error(&self) -> Option<String> {
        self.query_error
            .clone()
            .or_else(|| self.subscription_error.clone())
            .or_else(|| self.trigger_error.clone())
    }
}

pub struct VisibilityFeed<T: VisibilityTransport> {
    transport: T,
    state: Arc<Mutex<FeedState>>,
    /// Broadcasts the current epoch so subscription pump tasks stop as soon
    /// as their key is superseded, not only on the next pushed event.
    epoch_tx: watch::Sender<u64>,
}

impl<T: VisibilityTransport> VisibilityFeed<T> {
    pub fn new(transport: T) -> Self {
        let (epoch_tx, _) = watch::channel(0);
        VisibilityFeed { transport, state: Arc::new(Mutex::new(FeedState::default())), epoch_tx }
    }

    /// Point the feed at a new `(observer, location, time window)` key:
    /// issue the trigger mutation, (re)issue the cached query, and
    /// (re)subscribe, all against the new key. Results for any previous key
    /// are discarded on arrival.
    pub async fn set_key(&self, key: VisibilityKey) {
        let epoch = self.state.lock().unwrap().reset_for(key.clone());
        let _ = self.epoch_tx.send(epoch);

        // Subscribe before awaiting anything so pushes that race the cached
        // query are buffered rather than lost.
        let sub = self.transport.subscribe(&key);
        self.spawn_pump(epoch, sub);

        if let Err(e) = self.transport.trigger_compute(&key).await {
            let mut g = self.state.lock().unwrap();
            if g.epoch == epoch {
                g.trigger_error = Some(e);
            }
        }

        let result = self.transport.query_windows(&key).await;
        let mut g = self.state.lock().unwrap();
        if g.epoch != epoch {
            debug!(epoch, current = g.epoch, "discarding query result for superseded key");
            return;
        }
        g.loading = false;
        match result {
            Ok(windows) => {
                g.query_windows = windows;
                g.remerge();
            }
            Err(e) => {
                g.query_error = Some(e);
            }
        }
    }

    /// Detach from the current key, e.g. when the consuming view unmounts.
    /// The pump exits and the subscription drops, which is the unsubscribe.
    pub fn clear(&self) {
        let mut g = self.state.lock().unwrap();
        g.epoch += 1;
        let epoch = g.epoch;
        g.key = None;
        g.query_windows.clear();
        g.pushed.clear();
        g.merged.clear();
        g.loading = false;
        g.query_error = None;
        g.subscription_error = None;
        g.trigger_error = None;
        drop(g);
        let _ = self.epoch_tx.send(epoch);
    }

    pub fn view(&self) -> VisibilityView {
        let g = self.state.lock().unwrap();
        VisibilityView {
            windows: g.merged.clone(),
            loading: g.loading,
            error: g.aggregated_error(),
        }
    }

    pub fn current_key(&self) -> Option<VisibilityKey> {
        self.state.lock().unwrap().key.clone()
    }

    fn spawn_pump(&self, epoch: u64, mut sub: WindowSubscription) {
        let state = Arc::clone(&self.state);
        let mut epoch_rx = self.epoch_tx.subscribe();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    changed = epoch_rx.changed() => {
                        match changed {
                            // Epoch moved on; this subscription is history.
                            Ok(()) if *epoch_rx.borrow() != epoch => break,
                            Ok(()) => continue,
                            Err(_) => break,
                        }
                    }
                    event = sub.next() => event,
                };
                match event {
                    Some(Ok(batch)) => {
                        let mut g = state.lock().unwrap();
                        if g.epoch != epoch {
                            break;
                        }
                        g.pushed.extend(batch);
                        g.remerge();
                    }
                    Some(Err(message)) => {
                        let mut g = state.lock().unwrap();
                        if g.epoch == epoch {
                            g.subscription_error = Some(message);
                        }
                        break;
                    }
                    // Producer went away; a closed channel is a normal end.
                    None => break,
                }
            }
        });
    }
}

/// Merge the cached-query result with subscription batches: drop invalid
/// windows, deduplicate by `(satellite_id, aos, los)` with the first
/// occurrence winning (a pushed duplicate of a query window is an idempotent
/// no-op), then sort ascending by AOS with the satellite id as a
/// deterministic tie-break. Windows whose LOS is already past are kept; the
/// feed does not filter by recency.
pub fn merge_windows(
    base: &[VisibilityWindow],
    extra: &[VisibilityWindow],
) -> Vec<VisibilityWindow> {
    let mut seen = HashSet::new();
    let mut out: Vec<VisibilityWindow> = Vec::with_capacity(base.len() + extra.len());
    for w in base.iter().chain(extra.iter()) {
        if !w.is_valid() {
            warn!(satellite_id = %w.satellite_id, "dropping window with AOS after LOS");
            continue;
        }
        if seen.insert(w.dedup_key()) {
            out.push(w.clone());
        }
    }
    out.sort_by(|a, b| {
        a.aos_utc
            .cmp(&b.aos_utc)
            .then_with(|| a.satellite_id.cmp(&b.satellite_id))
    });
    out
}
