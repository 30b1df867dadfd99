/// Optimistic action engine.
///
/// Every user action follows the same protocol:
/// 1. capture the previous record for the item
/// 2. apply the new value to the replica store right away
/// 3. open a commit window (default 10s) for (item, category) with a live countdown
/// 4. cancel -> restore the previous value, push the inverse event, request a render
///    expiry -> push the forward event, request a render
///
/// Exactly one of cancel / expiry fires per window. Whoever removes the window from the
/// registry owns its resolution; a window that is replaced or torn down is dropped
/// without firing either, leaving the optimistic mutation in place.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use crate::store::ReplicaStore;
use crate::sync::{PushEvent, StateEventAction, StatePayload, SyncGateway, VoteEvent};
use crate::types::{StateAction, Vote};

pub const DEFAULT_WINDOW_SECS: u32 = 10;
pub const EXAM_DONE_NOTICE: &str = "Exam done marked - will auto-remove after 7 days";

const TICK: Duration = Duration::from_secs(1);

/// A user gesture on a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Right,
    Wrong,
    Applied,
    NotInterested,
    ExamDone,
}

/// Independent undo slots on one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Vote,
    Interest,
}

enum Mutation {
    Vote(Vote),
    State(StateAction),
}

impl ActionKind {
    fn mutation(&self) -> Mutation {
        match self {
            ActionKind::Right => Mutation::Vote(Vote::Right),
            ActionKind::Wrong => Mutation::Vote(Vote::Wrong),
            ActionKind::Applied => Mutation::State(StateAction::Applied),
            ActionKind::NotInterested => Mutation::State(StateAction::NotInterested),
            ActionKind::ExamDone => Mutation::State(StateAction::ExamDone),
        }
    }

    pub fn category(&self) -> Category {
        match self.mutation() {
            Mutation::Vote(_) => Category::Vote,
            Mutation::State(_) => Category::Interest,
        }
    }

    /// Shown in the undo control: "Undo {label} (Ns)".
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Right | ActionKind::Wrong => "vote",
            ActionKind::Applied => "applied",
            ActionKind::NotInterested => "choice",
            ActionKind::ExamDone => "exam done",
        }
    }

    /// Actions that must be confirmed before anything is mutated.
    pub fn confirmation_prompt(&self) -> Option<&'static str> {
        match self {
            ActionKind::Applied => Some("Mark as Applied?"),
            ActionKind::NotInterested => Some("Move to Other (Not interested)?"),
            _ => None,
        }
    }
}

/// Blocking yes/no step in front of the confirmed actions.
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

/// An answer given up front (e.g. a `confirmed` flag on a request).
#[async_trait]
impl Confirmer for bool {
    async fn confirm(&self, _prompt: &str) -> bool {
        *self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActionRequest {
    pub item_id: String,
    pub kind: ActionKind,
    /// Details link of the listing; forwarded with vote pushes.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// No item id; nothing happened.
    Ignored,
    /// Confirmation refused; nothing happened.
    Declined,
    Pending(PendingView),
}

/// Read-only view of an open commit window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingView {
    pub item_id: String,
    pub category: Category,
    pub kind: ActionKind,
    pub label: &'static str,
    pub seconds_left: u32,
}

impl PendingView {
    pub fn caption(&self) -> String {
        format!("Undo {} ({}s)", self.label, self.seconds_left)
    }
}

/// Engine notifications for display surfaces and the render driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionEvent {
    WindowOpened(PendingView),
    Tick {
        item_id: String,
        category: Category,
        seconds_left: u32,
    },
    Committed {
        item_id: String,
        kind: ActionKind,
    },
    Reverted {
        item_id: String,
        kind: ActionKind,
    },
    /// Window dropped without commit or revert (replaced or torn down).
    Discarded {
        item_id: String,
        category: Category,
    },
    Notification {
        message: String,
    },
    RenderRequested,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SurfaceKey {
    item_id: String,
    category: Category,
}

/// The value to put back on cancel. `None` means there was no live record.
#[derive(Debug, Clone, Copy)]
enum Previous {
    Vote(Option<Vote>),
    State(Option<StateAction>),
}

struct PendingUndo {
    id: u64,
    kind: ActionKind,
    prev: Previous,
    url: Option<String>,
    seconds_left: Arc<AtomicU32>,
    ticker: JoinHandle<()>,
}

impl PendingUndo {
    fn view(&self, key: &SurfaceKey) -> PendingView {
        PendingView {
            item_id: key.item_id.clone(),
            category: key.category,
            kind: self.kind,
            label: self.kind.label(),
            seconds_left: self.seconds_left.load(Ordering::SeqCst),
        }
    }
}

struct EngineInner {
    store: Arc<ReplicaStore>,
    gateway: Arc<dyn SyncGateway>,
    window_secs: u32,
    windows: Mutex<HashMap<SurfaceKey, PendingUndo>>,
    next_window_id: AtomicU64,
    events: broadcast::Sender<ActionEvent>,
}

#[derive(Clone)]
pub struct ActionEngine {
    inner: Arc<EngineInner>,
}

impl ActionEngine {
    pub fn new(store: Arc<ReplicaStore>, gateway: Arc<dyn SyncGateway>, window_secs: u32) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(EngineInner {
                store,
                gateway,
                window_secs: window_secs.max(1),
                windows: Mutex::new(HashMap::new()),
                next_window_id: AtomicU64::new(1),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActionEvent> {
        self.inner.events.subscribe()
    }

    pub fn store(&self) -> &Arc<ReplicaStore> {
        &self.inner.store
    }

    pub fn window_secs(&self) -> u32 {
        self.inner.window_secs
    }

    fn emit(&self, event: ActionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn windows(&self) -> MutexGuard<'_, HashMap<SurfaceKey, PendingUndo>> {
        self.inner.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run the optimistic protocol for one gesture. Must be called inside a tokio runtime.
    pub async fn perform_action(
        &self,
        request: ActionRequest,
        confirmer: &dyn Confirmer,
    ) -> ActionOutcome {
        let ActionRequest { item_id, kind, url } = request;
        if item_id.is_empty() {
            log::debug!("[vacancy.action] Ignoring {:?} without an item id", kind);
            return ActionOutcome::Ignored;
        }

        if let Some(prompt) = kind.confirmation_prompt() {
            if !confirmer.confirm(prompt).await {
                log::info!("[vacancy.action] {:?} on {} not confirmed", kind, item_id);
                return ActionOutcome::Declined;
            }
        }

        let store = &self.inner.store;
        let prev = match kind.mutation() {
            Mutation::Vote(vote) => {
                let prev = store.vote(&item_id).and_then(|e| e.value());
                store.set_vote(&item_id, Some(vote));
                Previous::Vote(prev)
            }
            Mutation::State(action) => {
                let prev = store.state(&item_id).and_then(|e| e.value());
                store.set_state(&item_id, action);
                Previous::State(prev)
            }
        };

        let view = self.open_window(item_id, kind, prev, url);
        self.emit(ActionEvent::WindowOpened(view.clone()));
        // The optimistic value must show up before the window resolves.
        self.emit(ActionEvent::RenderRequested);
        ActionOutcome::Pending(view)
    }

    fn open_window(
        &self,
        item_id: String,
        kind: ActionKind,
        prev: Previous,
        url: Option<String>,
    ) -> PendingView {
        let key = SurfaceKey {
            item_id,
            category: kind.category(),
        };
        let id = self.inner.next_window_id.fetch_add(1, Ordering::SeqCst);
        let seconds_left = Arc::new(AtomicU32::new(self.inner.window_secs));

        let ticker = tokio::spawn(run_window(
            self.clone(),
            key.clone(),
            id,
            seconds_left.clone(),
        ));
        let pending = PendingUndo {
            id,
            kind,
            prev,
            url,
            seconds_left,
            ticker,
        };
        let view = pending.view(&key);

        let replaced = self.windows().insert(key.clone(), pending);
        if let Some(old) = replaced {
            old.ticker.abort();
            log::debug!(
                "[vacancy.action] Replaced pending {:?} window on {}",
                old.kind,
                key.item_id
            );
            self.emit(ActionEvent::Discarded {
                item_id: key.item_id.clone(),
                category: key.category,
            });
        }
        view
    }

    /// Take a window out of the registry, but only if it is still the one `id` names.
    fn take_window(&self, key: &SurfaceKey, id: Option<u64>) -> Option<PendingUndo> {
        let mut windows = self.windows();
        match windows.get(key) {
            Some(pending) if id.map_or(true, |id| pending.id == id) => windows.remove(key),
            _ => None,
        }
    }

    /// Explicit cancel. Returns false when no window was open.
    pub async fn cancel(&self, item_id: &str, category: Category) -> bool {
        let key = SurfaceKey {
            item_id: item_id.to_string(),
            category,
        };
        let Some(pending) = self.take_window(&key, None) else {
            return false;
        };
        pending.ticker.abort();
        self.revert(&key.item_id, pending).await;
        true
    }

    /// Tear down every window on a listing's surface without firing commit or revert.
    pub fn discard_surface(&self, item_id: &str) -> usize {
        let removed: Vec<(SurfaceKey, PendingUndo)> = {
            let mut windows = self.windows();
            let keys: Vec<SurfaceKey> = windows
                .keys()
                .filter(|k| k.item_id == item_id)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|k| windows.remove(&k).map(|p| (k, p)))
                .collect()
        };
        for (key, pending) in &removed {
            pending.ticker.abort();
            self.emit(ActionEvent::Discarded {
                item_id: key.item_id.clone(),
                category: key.category,
            });
        }
        removed.len()
    }

    /// Drop every open window without firing. Used on shutdown.
    pub fn discard_all(&self) -> usize {
        let drained: Vec<PendingUndo> = self.windows().drain().map(|(_, p)| p).collect();
        for pending in &drained {
            pending.ticker.abort();
        }
        drained.len()
    }

    pub fn pending(&self, item_id: &str, category: Category) -> Option<PendingView> {
        let key = SurfaceKey {
            item_id: item_id.to_string(),
            category,
        };
        self.windows().get(&key).map(|p| p.view(&key))
    }

    pub fn pending_windows(&self) -> Vec<PendingView> {
        let mut views: Vec<PendingView> = self.windows().iter().map(|(k, p)| p.view(k)).collect();
        views.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        views
    }

    async fn expire(&self, key: &SurfaceKey, id: u64) {
        let Some(pending) = self.take_window(key, Some(id)) else {
            return;
        };
        self.commit(&key.item_id, pending).await;
    }

    async fn commit(&self, item_id: &str, pending: PendingUndo) {
        let ts = self.inner.store.now();
        let event = match pending.kind.mutation() {
            Mutation::Vote(vote) => PushEvent::Vote {
                vote: VoteEvent::forward(vote),
                job_id: item_id.to_string(),
                url: pending.url.clone(),
                ts,
            },
            Mutation::State(action) => PushEvent::State {
                payload: StatePayload {
                    job_id: item_id.to_string(),
                    action: action.into(),
                    ts,
                },
            },
        };
        self.push(&event).await;

        if pending.kind == ActionKind::ExamDone {
            self.emit(ActionEvent::Notification {
                message: EXAM_DONE_NOTICE.to_string(),
            });
        }
        log::info!("[vacancy.action] Committed {:?} on {}", pending.kind, item_id);
        self.emit(ActionEvent::Committed {
            item_id: item_id.to_string(),
            kind: pending.kind,
        });
        self.emit(ActionEvent::RenderRequested);
    }

    async fn revert(&self, item_id: &str, pending: PendingUndo) {
        let store = &self.inner.store;
        match pending.prev {
            Previous::Vote(prev) => store.set_vote(item_id, prev),
            Previous::State(Some(action)) => store.set_state(item_id, action),
            Previous::State(None) => store.retract_state(item_id),
        }

        let ts = store.now();
        let event = match pending.kind.mutation() {
            Mutation::Vote(vote) => PushEvent::Vote {
                vote: VoteEvent::inverse(vote),
                job_id: item_id.to_string(),
                url: pending.url.clone(),
                ts,
            },
            Mutation::State(_) => PushEvent::State {
                payload: StatePayload {
                    job_id: item_id.to_string(),
                    action: StateEventAction::Undo,
                    ts,
                },
            },
        };
        self.push(&event).await;

        log::info!("[vacancy.action] Reverted {:?} on {}", pending.kind, item_id);
        self.emit(ActionEvent::Reverted {
            item_id: item_id.to_string(),
            kind: pending.kind,
        });
        self.emit(ActionEvent::RenderRequested);
    }

    async fn push(&self, event: &PushEvent) {
        if let Err(e) = self.inner.gateway.push(event).await {
            log::warn!("[vacancy.action] {} push failed: {}", event.kind(), e);
        }
    }
}

async fn run_window(engine: ActionEngine, key: SurfaceKey, id: u64, seconds_left: Arc<AtomicU32>) {
    let mut interval = interval_at(Instant::now() + TICK, TICK);
    let mut left = seconds_left.load(Ordering::SeqCst);
    loop {
        interval.tick().await;
        left = left.saturating_sub(1);
        if left == 0 {
            engine.expire(&key, id).await;
            return;
        }
        seconds_left.store(left, Ordering::SeqCst);
        engine.emit(ActionEvent::Tick {
            item_id: key.item_id.clone(),
            category: key.category,
            seconds_left: left,
        });
    }
}
