use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::PersistError;
use crate::state::BoardState;

/// Destination for board writes.
pub trait PersistBackend {
    fn write(&mut self, state: &BoardState) -> Result<(), PersistError>;
}

impl<B: PersistBackend + ?Sized> PersistBackend for Box<B> {
    fn write(&mut self, state: &BoardState) -> Result<(), PersistError> {
        (**self).write(state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Idle,
    NotDue,
    Written,
    Failed,
}

/// Coalesces bursts of persist requests into one write per quiet period.
///
/// Every `schedule` pushes the deadline to `now + debounce`. A failed write is
/// not retried; it is kept as status text until the next successful write.
#[derive(Debug)]
pub struct DebouncedPersister<B> {
    backend: B,
    debounce: Duration,
    due: Option<Instant>,
    last_error: Option<String>,
    writes: u64,
}

impl<B: PersistBackend> DebouncedPersister<B> {
    pub fn new(backend: B, debounce: Duration) -> Self {
        Self {
            backend,
            debounce,
            due: None,
            last_error: None,
            writes: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_pending(&self) -> bool {
        self.due.is_some()
    }

    pub fn due_at(&self) -> Option<Instant> {
        self.due
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn schedule(&mut self, now: Instant) {
        self.due = Some(now + self.debounce);
    }

    pub fn flush_due(&mut self, now: Instant, state: &BoardState) -> FlushOutcome {
        match self.due {
            None => FlushOutcome::Idle,
            Some(due) if now < due => FlushOutcome::NotDue,
            Some(_) => self.write_now(state),
        }
    }

    /// Writes immediately if anything is pending.
    pub fn flush(&mut self, state: &BoardState) -> FlushOutcome {
        if self.due.is_none() {
            return FlushOutcome::Idle;
        }
        self.write_now(state)
    }

    fn write_now(&mut self, state: &BoardState) -> FlushOutcome {
        self.due = None;
        match self.backend.write(state) {
            Ok(()) => {
                self.writes = self.writes.saturating_add(1);
                self.last_error = None;
                info!(
                    scenes = state.scene_state.len(),
                    writes = self.writes,
                    "board_state_persisted"
                );
                FlushOutcome::Written
            }
            Err(error) => {
                warn!(error = %error, "board_state_persist_failed");
                self.last_error = Some(error.to_string());
                FlushOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::PathBuf;

    use super::*;

    #[derive(Default)]
    struct CountingBackend {
        writes: usize,
        fail: bool,
    }

    impl PersistBackend for CountingBackend {
        fn write(&mut self, _state: &BoardState) -> Result<(), PersistError> {
            if self.fail {
                return Err(PersistError::Io {
                    path: PathBuf::from("board.json"),
                    source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
                });
            }
            self.writes += 1;
            Ok(())
        }
    }

    #[test]
    fn burst_of_requests_writes_once_after_quiet_period() {
        let mut persister =
            DebouncedPersister::new(CountingBackend::default(), Duration::from_millis(100));
        let state = BoardState::default();
        let base = Instant::now();

        assert_eq!(persister.flush_due(base, &state), FlushOutcome::Idle);
        persister.schedule(base);
        persister.schedule(base + Duration::from_millis(60));
        assert_eq!(
            persister.flush_due(base + Duration::from_millis(120), &state),
            FlushOutcome::NotDue
        );
        assert_eq!(
            persister.flush_due(base + Duration::from_millis(160), &state),
            FlushOutcome::Written
        );
        assert_eq!(persister.backend().writes, 1);
        assert!(!persister.is_pending());
    }

    #[test]
    fn failure_is_kept_as_status_and_not_retried() {
        let backend = CountingBackend {
            writes: 0,
            fail: true,
        };
        let mut persister = DebouncedPersister::new(backend, Duration::ZERO);
        let state = BoardState::default();
        let now = Instant::now();

        persister.schedule(now);
        assert_eq!(persister.flush_due(now, &state), FlushOutcome::Failed);
        assert!(persister
            .last_error()
            .is_some_and(|message| message.contains("read-only")));
        assert_eq!(persister.flush_due(now, &state), FlushOutcome::Idle);
    }

    #[test]
    fn forced_flush_ignores_deadline() {
        let mut persister =
            DebouncedPersister::new(CountingBackend::default(), Duration::from_secs(60));
        let state = BoardState::default();
        assert_eq!(persister.flush(&state), FlushOutcome::Idle);
        persister.schedule(Instant::now());
        assert_eq!(persister.flush(&state), FlushOutcome::Written);
        assert_eq!(persister.writes(), 1);
    }
}
