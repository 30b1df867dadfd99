/// Render pass driver.
///
/// A pass takes a generation token, fetches the item feed, and publishes a view only if
/// its token is still current once the fetch resolves. Overlapping passes therefore
/// converge on the last one started; an older pass that resolves late is dropped.
///
/// The published view is the sorted feed split into buckets, each card carrying its vote
/// flags and any open commit windows. Listings that vanish from the feed have their
/// windows torn down without firing.
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::action::{ActionEngine, ActionEvent, Category, PendingView};
use crate::derive::{derive_buckets, sort_by_deadline};
use crate::generation::{GenerationToken, RenderGeneration};
use crate::types::{FeedDocument, Item, Vote, VoteMap};

/// Source of the listings document.
#[async_trait]
pub trait ItemFeed: Send + Sync {
    async fn fetch(&self) -> Result<FeedDocument, FeedError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Feed document is malformed: {0}")]
    Malformed(String),
}

/// One listing as shown on a display surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    #[serde(flatten)]
    pub item: Item,
    pub vote: Option<Vote>,
    /// Voted "right".
    pub verified: bool,
    /// Any live vote; the vote buttons are hidden.
    pub has_voted: bool,
    pub applied: bool,
    pub pending: Vec<PendingView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenderedView {
    /// No pass has completed yet.
    Loading,
    Ready {
        generation: u64,
        open: Vec<Card>,
        applied: Vec<Card>,
        other: Vec<Card>,
    },
    Unavailable {
        generation: u64,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Published(GenerationToken),
    /// A newer pass started while this one was fetching.
    Stale(GenerationToken),
}

pub struct Renderer {
    generation: RenderGeneration,
    engine: ActionEngine,
    feed: Arc<dyn ItemFeed>,
    view: watch::Sender<Arc<RenderedView>>,
    on_surface: Mutex<HashSet<String>>,
}

impl Renderer {
    pub fn new(engine: ActionEngine, feed: Arc<dyn ItemFeed>) -> Self {
        let (view, _) = watch::channel(Arc::new(RenderedView::Loading));
        Self {
            generation: RenderGeneration::new(),
            engine,
            feed,
            view,
            on_surface: Mutex::new(HashSet::new()),
        }
    }

    pub fn view(&self) -> Arc<RenderedView> {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<RenderedView>> {
        self.view.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.generation.current()
    }

    /// Run one render pass.
    pub async fn render(&self) -> PassOutcome {
        let token = self.generation.begin_pass();
        let fetched = self.feed.fetch().await;
        if !self.generation.is_current(token) {
            log::debug!(
                "[vacancy.render] Dropping stale pass {} (current {})",
                token.value(),
                self.generation.current()
            );
            return PassOutcome::Stale(token);
        }

        let view = match fetched {
            Ok(document) => self.build_view(token, document),
            Err(e) => {
                log::warn!("[vacancy.render] Item feed unavailable: {}", e);
                RenderedView::Unavailable {
                    generation: token.value(),
                    reason: e.to_string(),
                }
            }
        };
        self.view.send_replace(Arc::new(view));
        PassOutcome::Published(token)
    }

    fn build_view(&self, token: GenerationToken, document: FeedDocument) -> RenderedView {
        let FeedDocument {
            mut items,
            seed,
        } = document;
        sort_by_deadline(&mut items);

        self.retire_vanished(&items);

        let store = self.engine.store();
        let snapshot = store.snapshot();
        let now = store.now().as_datetime();
        let buckets = derive_buckets(&items, &seed, &snapshot.states, now);

        let cards = |items: Vec<Item>, applied: bool| -> Vec<Card> {
            items
                .into_iter()
                .map(|item| self.card(item, &snapshot.votes, applied))
                .collect()
        };

        RenderedView::Ready {
            generation: token.value(),
            open: cards(buckets.open, false),
            applied: cards(buckets.applied, true),
            other: cards(buckets.other, false),
        }
    }

    fn card(&self, item: Item, votes: &VoteMap, applied: bool) -> Card {
        let vote = votes.get(item.id()).and_then(|e| e.value());
        let pending = if item.id().is_empty() {
            Vec::new()
        } else {
            [Category::Vote, Category::Interest]
                .iter()
                .filter_map(|c| self.engine.pending(item.id(), *c))
                .collect()
        };
        Card {
            vote,
            verified: vote == Some(Vote::Right),
            has_voted: vote.is_some(),
            applied,
            pending,
            item,
        }
    }

    /// Tear down windows of listings that were on the previous surface but not this one.
    fn retire_vanished(&self, items: &[Item]) {
        let current: HashSet<String> = items
            .iter()
            .map(|i| i.id())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();

        let vanished: Vec<String> = {
            let mut on_surface = self.on_surface.lock().unwrap_or_else(|e| e.into_inner());
            let vanished = on_surface.difference(&current).cloned().collect();
            *on_surface = current;
            vanished
        };

        for id in vanished {
            let dropped = self.engine.discard_surface(&id);
            if dropped > 0 {
                log::info!(
                    "[vacancy.render] {} left the feed; discarded {} pending window(s)",
                    id,
                    dropped
                );
            }
        }
    }
}

/// Start a pass for every render request the engine emits. Passes run concurrently;
/// the generation check keeps only the newest.
pub fn spawn_render_driver(renderer: Arc<Renderer>) -> JoinHandle<()> {
    let mut events = renderer.engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ActionEvent::RenderRequested) | Err(RecvError::Lagged(_)) => {
                    let renderer = renderer.clone();
                    tokio::spawn(async move {
                        renderer.render().await;
                    });
                }
                Ok(_) => {}
                Err(RecvError::Closed) => break,
            }
        }
    })
}
