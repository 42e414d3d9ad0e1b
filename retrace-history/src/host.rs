//! A canvas that owns its history.
//!
//! `HistoryCanvas` wires a [`HistoryController`] to a canvas at construction and
//! tears it down on `dispose` (or on drop), so subscribe/unsubscribe always pair up.

use retrace_core::Canvas;

use crate::{HistoryConfig, HistoryController, HistoryError, StepOutcome};

pub struct HistoryCanvas<C: Canvas> {
    canvas: C,
    history: HistoryController,
}

impl<C: Canvas> HistoryCanvas<C> {
    pub fn new(mut canvas: C, config: HistoryConfig) -> Result<Self, HistoryError> {
        let history = HistoryController::attach(&mut canvas, config)?;
        Ok(Self { canvas, history })
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn history(&self) -> &HistoryController {
        &self.history
    }

    /// Run a mutation against the canvas, then process the notifications it fired.
    /// Each distinct state a notification captured becomes its own undo point.
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut C) -> R) -> R {
        let result = f(&mut self.canvas);
        self.history.pump(&mut self.canvas);
        result
    }

    /// Process notifications fired outside `edit` (async restore completions, for one).
    pub fn sync(&mut self) -> usize {
        self.history.pump(&mut self.canvas)
    }

    pub fn record_undo_point(&mut self) -> Result<bool, HistoryError> {
        self.history.record_undo_point(&mut self.canvas)
    }

    pub fn undo(&mut self) -> Result<StepOutcome, HistoryError> {
        self.history.undo(&mut self.canvas)
    }

    pub fn redo(&mut self) -> Result<StepOutcome, HistoryError> {
        self.history.redo(&mut self.canvas)
    }

    pub fn clear_history(&mut self) {
        self.history.clear_history(&mut self.canvas);
    }

    pub fn dispose(&mut self) {
        self.history.dispose(&mut self.canvas);
    }
}

impl<C: Canvas> Drop for HistoryCanvas<C> {
    fn drop(&mut self) {
        self.history.dispose(&mut self.canvas);
    }
}
