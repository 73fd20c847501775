use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::atomic_io::write_text_atomic;
use super::persister::PersistBackend;
use super::PersistError;
use crate::state::BoardState;

/// Board document kept as pretty JSON on disk.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and normalizes the stored document. A missing file is an empty
    /// board.
    pub fn read(&self) -> Result<BoardState, PersistError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(BoardState::default())
            }
            Err(source) => {
                return Err(PersistError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw).map_err(|source| PersistError::Decode {
            path: self.path.clone(),
            source,
        })
    }
}

impl PersistBackend for JsonFileBackend {
    fn write(&mut self, state: &BoardState) -> Result<(), PersistError> {
        let mut text = serde_json::to_string_pretty(state)?;
        text.push('\n');
        write_text_atomic(&self.path, &text).map_err(|source| PersistError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
