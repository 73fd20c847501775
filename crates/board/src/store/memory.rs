use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use tracing::debug;

use super::persister::{DebouncedPersister, FlushOutcome, PersistBackend};
use super::{BoardListener, BoardStore, SubscriptionId};
use crate::state::{BoardState, SceneId};

/// In-process board document with draft/commit updates and an optional
/// debounced writer.
pub struct MemoryBoardStore {
    state: BoardState,
    revision: u64,
    listeners: Vec<(SubscriptionId, BoardListener)>,
    next_subscription: u64,
    dirty_scenes: BTreeSet<SceneId>,
    persister: Option<DebouncedPersister<Box<dyn PersistBackend>>>,
}

impl Default for MemoryBoardStore {
    fn default() -> Self {
        Self::new(BoardState::default())
    }
}

impl MemoryBoardStore {
    pub fn new(state: BoardState) -> Self {
        Self {
            state,
            revision: 0,
            listeners: Vec::new(),
            next_subscription: 0,
            dirty_scenes: BTreeSet::new(),
            persister: None,
        }
    }

    pub fn with_backend<B>(mut self, backend: B, debounce: Duration) -> Self
    where
        B: PersistBackend + 'static,
    {
        self.persister = Some(DebouncedPersister::new(Box::new(backend), debounce));
        self
    }

    /// Bumped on every committed update.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn dirty_scenes(&self) -> &BTreeSet<SceneId> {
        &self.dirty_scenes
    }

    pub fn is_persist_pending(&self) -> bool {
        self.persister
            .as_ref()
            .is_some_and(DebouncedPersister::is_pending)
    }

    pub fn last_persist_error(&self) -> Option<&str> {
        self.persister
            .as_ref()
            .and_then(DebouncedPersister::last_error)
    }

    pub fn persist_board_state_at(&mut self, now: Instant) {
        match self.persister.as_mut() {
            Some(persister) => persister.schedule(now),
            None => {
                debug!(
                    dirty_scenes = self.dirty_scenes.len(),
                    "board_persist_skipped_no_backend"
                );
                // Nothing will ever write these out.
                self.dirty_scenes.clear();
            }
        }
    }

    /// Writes if the debounce deadline has passed. Call from the host's tick.
    pub fn flush_due(&mut self, now: Instant) -> FlushOutcome {
        let outcome = match self.persister.as_mut() {
            Some(persister) => persister.flush_due(now, &self.state),
            None => FlushOutcome::Idle,
        };
        self.after_flush(outcome)
    }

    /// Writes any pending request immediately, e.g. on shutdown.
    pub fn flush(&mut self) -> FlushOutcome {
        let outcome = match self.persister.as_mut() {
            Some(persister) => persister.flush(&self.state),
            None => FlushOutcome::Idle,
        };
        self.after_flush(outcome)
    }

    fn after_flush(&mut self, outcome: FlushOutcome) -> FlushOutcome {
        if outcome == FlushOutcome::Written {
            self.dirty_scenes.clear();
        }
        outcome
    }
}

impl BoardStore for MemoryBoardStore {
    fn state(&self) -> &BoardState {
        &self.state
    }

    fn update_state<R, F>(&mut self, mutator: F) -> R
    where
        F: FnOnce(&mut BoardState) -> R,
    {
        let mut draft = self.state.clone();
        let result = mutator(&mut draft);
        self.state = draft;
        self.revision = self.revision.wrapping_add(1);
        for (_, listener) in &mut self.listeners {
            listener(&self.state);
        }
        result
    }

    fn subscribe(&mut self, listener: BoardListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription = self.next_subscription.wrapping_add(1);
        self.listeners.push((id, listener));
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    fn mark_scene_state_dirty(&mut self, scene_id: &SceneId) {
        self.dirty_scenes.insert(scene_id.clone());
    }

    fn persist_board_state(&mut self) {
        self.persist_board_state_at(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::grid::GridConfig;
    use crate::store::PersistError;

    #[derive(Clone, Default)]
    struct SharedBackend {
        written: Rc<RefCell<Vec<BoardState>>>,
    }

    impl PersistBackend for SharedBackend {
        fn write(&mut self, state: &BoardState) -> Result<(), PersistError> {
            self.written.borrow_mut().push(state.clone());
            Ok(())
        }
    }

    #[test]
    fn update_commits_draft_and_notifies_subscribers() {
        let mut store = MemoryBoardStore::default();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = store.subscribe(Box::new(move |state: &BoardState| {
            sink.borrow_mut().push(state.scene_state.len());
        }));

        let created = store.update_state(|state| {
            state.ensure_scene(&SceneId::from("s1"), GridConfig::default());
            true
        });
        assert!(created);
        assert_eq!(store.revision(), 1);
        assert_eq!(*seen.borrow(), vec![1]);

        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.update_state(|state| state.scene_state.clear());
        assert_eq!(*seen.borrow(), vec![1]);
    }

    #[test]
    fn dirty_scenes_clear_after_successful_write() {
        let backend = SharedBackend::default();
        let written = Rc::clone(&backend.written);
        let mut store =
            MemoryBoardStore::default().with_backend(backend, Duration::from_millis(50));
        let base = Instant::now();

        store.update_state(|state| {
            state.ensure_scene(&SceneId::from("s1"), GridConfig::default());
        });
        store.mark_scene_state_dirty(&SceneId::from("s1"));
        store.persist_board_state_at(base);
        assert!(store.is_persist_pending());
        assert_eq!(store.flush_due(base), FlushOutcome::NotDue);
        assert_eq!(store.dirty_scenes().len(), 1);

        assert_eq!(
            store.flush_due(base + Duration::from_millis(50)),
            FlushOutcome::Written
        );
        assert!(store.dirty_scenes().is_empty());
        assert_eq!(written.borrow().len(), 1);
        assert_eq!(written.borrow()[0], *store.state());
        assert_eq!(store.last_persist_error(), None);
    }

    #[test]
    fn without_backend_persist_drops_dirty_scenes() {
        let mut store = MemoryBoardStore::default();
        store.mark_scene_state_dirty(&SceneId::from("s1"));
        assert_eq!(store.dirty_scenes().len(), 1);
        store.persist_board_state();
        assert!(!store.is_persist_pending());
        assert_eq!(store.flush(), FlushOutcome::Idle);
        assert!(store.dirty_scenes().is_empty());
    }
}
