use chrono::{DateTime, Utc};
use mthub_core::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::session::SessionGuard;

/// Configuration for the polling data loader.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// How often the background refresh fires.
    pub refresh_interval: Duration,
    /// Trailing window for the closed-trade history, in days.
    pub history_window_days: i64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5),
            history_window_days: 7,
        }
    }
}

/// Everything one successful poll produces. Replaced atomically as a whole;
/// a failed poll never touches it.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSnapshot {
    pub account: AccountSnapshot,
    pub positions: Vec<Position>,
    pub history: Vec<HistoryTrade>,
    pub fetched_at: DateTime<Utc>,
}

impl DashboardSnapshot {
    /// Per-symbol net exposure, recomputed from the current positions.
    pub fn summaries(&self) -> Vec<SymbolSummary> {
        symbol_summaries(&self.positions)
    }
}

/// Loader state machine.
///
/// `LoadingInitial` is entered only for the very first load; refreshes
/// stay in `Loaded`/`Stale` so the held snapshot remains visible while
/// the fetch is in flight. `Stale` carries the last-good snapshot through
/// transient failures; `Failed` is the hard-error state reached only when
/// a load fails before any snapshot ever existed.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Idle,
    LoadingInitial,
    Loaded(DashboardSnapshot),
    Stale {
        snapshot: DashboardSnapshot,
        error: ApiError,
    },
    Failed(ApiError),
}

impl LoadState {
    /// The displayable snapshot, if any poll has ever succeeded.
    pub fn snapshot(&self) -> Option<&DashboardSnapshot> {
        match self {
            LoadState::Loaded(snapshot) | LoadState::Stale { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }
}

/// Events pushed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LoaderEvent {
    /// A poll succeeded and the snapshot was replaced.
    Updated { at: DateTime<Utc> },
    /// A poll failed; the previous snapshot (if any) is still current.
    FetchFailed { initial: bool, error: ApiError },
    /// An endpoint rejected the credential; the session has been cleared
    /// and the viewer must be sent back to login.
    SessionExpired,
}

/// Result of a single `load` call, for callers that need to notify.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Updated,
    Failed(ApiError),
    SessionExpired,
    /// Another load was already in flight (single-flight guard), or the
    /// loader has been shut down.
    Skipped,
}

/// Polls the three account endpoints and owns the resulting snapshot.
///
/// Single writer: state changes only at the completion points of `load`.
/// Overlapping loads are prevented by a single-flight guard, so snapshots
/// are always applied in fetch order.
pub struct AccountDataLoader {
    api: Arc<dyn AccountApi>,
    session: Arc<SessionGuard>,
    config: LoaderConfig,
    state: RwLock<LoadState>,
    in_flight: AtomicBool,
    closed: AtomicBool,
    subscribers: Mutex<Vec<mpsc::Sender<LoaderEvent>>>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl AccountDataLoader {
    pub fn new(api: Arc<dyn AccountApi>, session: Arc<SessionGuard>, config: LoaderConfig) -> Self {
        Self {
            api,
            session,
            config,
            state: RwLock::new(LoadState::Idle),
            in_flight: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
            refresh_task: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> LoadState {
        self.state.read().await.clone()
    }

    pub async fn snapshot(&self) -> Option<DashboardSnapshot> {
        self.state.read().await.snapshot().cloned()
    }

    /// Register a consumer for loader events.
    pub async fn subscribe(&self) -> mpsc::Receiver<LoaderEvent> {
        let (tx, rx) = mpsc::channel(32);
        self.subscribers.lock().await.push(tx);
        rx
    }

    async fn emit(&self, event: LoaderEvent) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Fetch all three endpoints and replace the snapshot atomically.
    ///
    /// Auth rejection on any endpoint aborts the whole batch and clears
    /// the session; any other failure leaves the previous snapshot in
    /// place (or enters the hard-error state if none exists yet).
    pub async fn load(&self, initial: bool) -> LoadOutcome {
        if self.closed.load(Ordering::SeqCst) {
            return LoadOutcome::Skipped;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Load already in flight, skipping");
            return LoadOutcome::Skipped;
        }
        let outcome = self.load_inner(initial).await;
        self.in_flight.store(false, Ordering::SeqCst);
        outcome
    }

    async fn load_inner(&self, initial: bool) -> LoadOutcome {
        let Some(token) = self.session.current_token().await else {
            // No authenticated session: never issue a request.
            self.session.clear().await;
            self.emit(LoaderEvent::SessionExpired).await;
            return LoadOutcome::SessionExpired;
        };

        if initial {
            *self.state.write().await = LoadState::LoadingInitial;
        }

        let to = Utc::now();
        let from = to - chrono::Duration::days(self.config.history_window_days);

        let (account, positions, history) = tokio::join!(
            self.api.account_info(&token),
            self.api.open_positions(&token),
            self.api.closed_trades(&token, from, to),
        );

        // A fetch that settles after teardown must not touch state.
        if self.closed.load(Ordering::SeqCst) {
            return LoadOutcome::Skipped;
        }

        // Credential rejection on any endpoint wins over everything else,
        // before any body is applied.
        let auth_rejected = [
            account.as_ref().err(),
            positions.as_ref().err(),
            history.as_ref().err(),
        ]
        .into_iter()
        .flatten()
        .any(ApiError::is_auth);

        if auth_rejected {
            warn!("Endpoint rejected the session token, forcing logout");
            self.session.clear().await;
            if initial {
                *self.state.write().await = LoadState::Idle;
            }
            self.emit(LoaderEvent::SessionExpired).await;
            return LoadOutcome::SessionExpired;
        }

        match (account, positions, history) {
            (Ok(account), Ok(positions), Ok(history)) => {
                let fetched_at = Utc::now();
                let snapshot = DashboardSnapshot {
                    account,
                    positions,
                    history,
                    fetched_at,
                };
                info!(
                    positions = snapshot.positions.len(),
                    trades = snapshot.history.len(),
                    "Snapshot updated"
                );
                *self.state.write().await = LoadState::Loaded(snapshot);
                self.emit(LoaderEvent::Updated { at: fetched_at }).await;
                LoadOutcome::Updated
            }
            (account, positions, history) => {
                let error = account
                    .err()
                    .or(positions.err())
                    .or(history.err())
                    .unwrap_or_else(|| {
                        ApiError::MalformedResponse("batch failed without an error".to_string())
                    });
                warn!(%error, initial, "Fetch batch failed");

                let mut state = self.state.write().await;
                *state = match std::mem::replace(&mut *state, LoadState::Idle) {
                    LoadState::Loaded(snapshot) | LoadState::Stale { snapshot, .. } => {
                        // Stale-but-valid data survives transient failures.
                        LoadState::Stale {
                            snapshot,
                            error: error.clone(),
                        }
                    }
                    _ => LoadState::Failed(error.clone()),
                };
                drop(state);

                self.emit(LoaderEvent::FetchFailed {
                    initial,
                    error: error.clone(),
                })
                .await;
                LoadOutcome::Failed(error)
            }
        }
    }

    /// User-triggered refresh; the caller turns the outcome into a
    /// visible notification, unlike the silent timer-driven path.
    pub async fn manual_refresh(&self) -> LoadOutcome {
        self.load(false).await
    }

    /// Start the recurring background refresh. Call after the initial
    /// load has settled; canceled by [`shutdown`](Self::shutdown).
    pub async fn spawn_auto_refresh(self: Arc<Self>) {
        let loader = Arc::clone(&self);
        let interval = self.config.refresh_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; the initial load already ran.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if loader.closed.load(Ordering::SeqCst) {
                    break;
                }
                match loader.load(false).await {
                    LoadOutcome::SessionExpired => break,
                    LoadOutcome::Failed(error) => {
                        debug!(%error, "Background refresh failed, keeping last snapshot");
                    }
                    _ => {}
                }
            }
        });
        if let Some(prev) = self.refresh_task.lock().await.replace(handle) {
            prev.abort();
        }
    }

    /// Tear down the consuming view: cancel the refresh timer and block
    /// any in-flight fetch from applying its result.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.refresh_task.lock().await.take() {
            handle.abort();
        }
    }
}
