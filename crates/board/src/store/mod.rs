mod atomic_io;
mod file;
mod memory;
mod persister;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::state::{BoardState, SceneId};

pub use file::JsonFileBackend;
pub use memory::MemoryBoardStore;
pub use persister::{DebouncedPersister, FlushOutcome, PersistBackend};

pub type BoardListener = Box<dyn FnMut(&BoardState)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Gateway to the shared board document.
///
/// Mutation goes through `update_state`: the store hands out a draft, the
/// mutator edits it, and the store swaps it in and notifies subscribers.
/// Nothing may hold a draft across calls.
pub trait BoardStore {
    fn state(&self) -> &BoardState;

    fn update_state<R, F>(&mut self, mutator: F) -> R
    where
        F: FnOnce(&mut BoardState) -> R;

    fn subscribe(&mut self, listener: BoardListener) -> SubscriptionId;

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;

    fn mark_scene_state_dirty(&mut self, scene_id: &SceneId);

    /// Requests a write of the current document. Fire-and-forget: failures are
    /// reported through logs and store status, never to the caller.
    fn persist_board_state(&mut self);
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to read/write board file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("board file {path} is not a valid board document: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode board state: {0}")]
    Encode(#[from] serde_json::Error),
}
