//! retrace-history: snapshot-based undo/redo for a canvas.
//!
//! Design rules:
//! - History is owned per canvas; nothing is shared between canvases.
//! - The undo stack holds states to return to, never the current one.
//! - Only direct repeats of the last recorded state are deduplicated.
//! - A restore in flight suppresses recording and drops further undo/redo.
//! - Every restore settles: success, canvas failure and timeout all release it.

use retrace_core::CanvasError;
use thiserror::Error;

pub mod config;
pub mod controller;
pub mod host;

pub use config::{load_config, save_config, HistoryConfig, CONFIG_FILE_EXT};
pub use controller::{Direction, HistoryController, StepOutcome};
pub use host::HistoryCanvas;

/// Errors surfaced by the history layer.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Canvas(#[from] CanvasError),

    #[error("history is detached from its canvas")]
    Detached,

    #[error("invalid history config: {reason}")]
    InvalidConfig { reason: String },
}
