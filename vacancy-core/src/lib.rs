pub mod action;
pub mod clock;
pub mod derive;
pub mod generation;
pub mod merge;
pub mod render;
pub mod storage;
pub mod store;
pub mod submission;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use action::{ActionEngine, ActionEvent, ActionKind, ActionOutcome, ActionRequest, Category};
pub use render::{ItemFeed, RenderedView, Renderer};
pub use store::ReplicaStore;
pub use sync::{PushEvent, SyncGateway};
