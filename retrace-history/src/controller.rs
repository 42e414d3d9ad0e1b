// Undo/redo history controller for a canvas.

use retrace_core::{
    Canvas, CanvasError, CanvasEvent, HistoryEvent, RestoreStatus, RestoreTicket, Snapshot,
    Subscription,
};
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::{HistoryConfig, HistoryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Undo,
    Redo,
}

impl Direction {
    fn event(self) -> HistoryEvent {
        match self {
            Direction::Undo => HistoryEvent::Undo,
            Direction::Redo => HistoryEvent::Redo,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Undo => f.write_str("undo"),
            Direction::Redo => f.write_str("redo"),
        }
    }
}

/// What an undo/redo call did. Callers are free to ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The scene was restored and the notification emitted.
    Restored,
    /// The canvas is still loading; completion arrives through `pump`.
    Pending,
    /// Nothing to undo/redo.
    Empty,
    /// Another restore is in flight; the call was dropped.
    Busy,
}

#[derive(Debug)]
struct InFlight {
    ticket: RestoreTicket,
    direction: Direction,
    started: Instant,
    /// Snapshot being applied.
    target: Snapshot,
    /// Scene as captured before the restore, parked on the opposite stack.
    displaced: Snapshot,
    /// Last recorded state before the restore began.
    prior_state: Snapshot,
}

/// Two-stack snapshot history bound to one canvas.
#[derive(Debug)]
pub struct HistoryController {
    id: Uuid,
    config: HistoryConfig,
    undo: Vec<Snapshot>,
    redo: Vec<Snapshot>,
    /// The state as of the last recorded point.
    next_state: Snapshot,
    /// Some while a restore is applying a snapshot to the canvas.
    in_flight: Option<InFlight>,
    /// A timed-out restore the canvas could not cancel. If it still lands,
    /// the resulting scene is recorded like any other edit.
    abandoned: Option<RestoreTicket>,
    subscription: Option<Subscription>,
}

impl HistoryController {
    /// Subscribe to the canvas and take the initial state as the baseline.
    pub fn attach<C: Canvas + ?Sized>(
        canvas: &mut C,
        config: HistoryConfig,
    ) -> Result<Self, HistoryError> {
        config.validate()?;

        let next_state = canvas.serialize_scene(&config.extra_props)?;
        let subscription = canvas.subscribe(&config.events, &config.extra_props);
        let id = Uuid::new_v4();

        info!(
            history = %id,
            subscription = %subscription.id,
            events = config.events.len(),
            "history attached to canvas"
        );

        Ok(Self {
            id,
            config,
            undo: Vec::new(),
            redo: Vec::new(),
            next_state,
            in_flight: None,
            abandoned: None,
            subscription: Some(subscription),
        })
    }

    /// Unsubscribe exactly what `attach` subscribed. Safe to call twice.
    pub fn dispose<C: Canvas + ?Sized>(&mut self, canvas: &mut C) {
        let Some(subscription) = self.subscription.take() else {
            trace!(history = %self.id, "dispose on detached history ignored");
            return;
        };

        if !canvas.unsubscribe(subscription.id) {
            warn!(
                history = %self.id,
                subscription = %subscription.id,
                "canvas had already dropped the history subscription"
            );
        }
        info!(history = %self.id, "history disposed");
    }

    /// Process queued canvas notifications in emission order.
    /// Returns how many were handled.
    pub fn pump<C: Canvas + ?Sized>(&mut self, canvas: &mut C) -> usize {
        self.expire_stale_restore(canvas);
        self.drain(canvas)
    }

    /// Record the current scene as an undo point, for mutations the
    /// subscribed notifications do not cover (text edits, for instance).
    /// Returns true if a new entry was archived.
    pub fn record_undo_point<C: Canvas + ?Sized>(
        &mut self,
        canvas: &mut C,
    ) -> Result<bool, HistoryError> {
        self.ensure_attached()?;
        self.pump(canvas);
        self.record_mutation(canvas)
    }

    pub fn undo<C: Canvas + ?Sized>(&mut self, canvas: &mut C) -> Result<StepOutcome, HistoryError> {
        self.step(canvas, Direction::Undo)
    }

    pub fn redo<C: Canvas + ?Sized>(&mut self, canvas: &mut C) -> Result<StepOutcome, HistoryError> {
        self.step(canvas, Direction::Redo)
    }

    /// Drop both stacks. The current state and any restore in flight are untouched.
    pub fn clear_history<C: Canvas + ?Sized>(&mut self, canvas: &mut C) {
        let dropped = self.undo.len() + self.redo.len();
        self.undo.clear();
        self.redo.clear();
        info!(history = %self.id, dropped, "history cleared");
        canvas.emit(&HistoryEvent::Clear);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn is_processing(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Oldest first; the last entry is the next undo target.
    pub fn undo_entries(&self) -> &[Snapshot] {
        &self.undo
    }

    /// Oldest first; the last entry is the next redo target.
    pub fn redo_entries(&self) -> &[Snapshot] {
        &self.redo
    }

    pub fn current_state(&self) -> &Snapshot {
        &self.next_state
    }

    fn ensure_attached(&self) -> Result<(), HistoryError> {
        if self.subscription.is_none() {
            return Err(HistoryError::Detached);
        }
        Ok(())
    }

    fn drain<C: Canvas + ?Sized>(&mut self, canvas: &mut C) -> usize {
        let mut handled = 0;
        loop {
            let Some(subscription) = &self.subscription else {
                break;
            };
            let Ok(event) = subscription.events.try_recv() else {
                break;
            };
            handled += 1;
            self.handle_event(canvas, event);
        }
        handled
    }

    fn handle_event<C: Canvas + ?Sized>(&mut self, canvas: &mut C, event: CanvasEvent) {
        match event {
            CanvasEvent::Mutation { kind, snapshot } => {
                trace!(history = %self.id, kind = kind.name(), "canvas mutation");
                match snapshot {
                    Ok(candidate) => {
                        self.record_candidate(canvas, candidate);
                    }
                    Err(err) => warn!(
                        history = %self.id,
                        kind = kind.name(),
                        error = %err,
                        "canvas could not serialize mutation, not recorded"
                    ),
                }
            }
            CanvasEvent::RestoreFinished { ticket, outcome } => {
                self.finish_restore(canvas, ticket, outcome);
            }
        }
    }

    /// Capture the live scene and record it.
    fn record_mutation<C: Canvas + ?Sized>(&mut self, canvas: &mut C) -> Result<bool, HistoryError> {
        if self.in_flight.is_some() {
            return Ok(false);
        }
        let candidate = canvas.serialize_scene(&self.config.extra_props)?;
        Ok(self.record_candidate(canvas, candidate))
    }

    /// Archive the current state if `candidate` differs from it.
    fn record_candidate<C: Canvas + ?Sized>(
        &mut self,
        canvas: &mut C,
        candidate: Snapshot,
    ) -> bool {
        if self.in_flight.is_some() {
            trace!(history = %self.id, "restore in progress, mutation not recorded");
            return false;
        }
        if candidate == self.next_state {
            trace!(history = %self.id, "scene unchanged, nothing to record");
            return false;
        }

        self.redo.clear();
        let previous = std::mem::replace(&mut self.next_state, candidate);
        self.undo.push(previous.clone());
        self.enforce_depth();

        debug!(
            history = %self.id,
            undo = self.undo.len(),
            "recorded undo point"
        );
        canvas.emit(&HistoryEvent::Append { snapshot: previous });
        true
    }

    fn enforce_depth(&mut self) {
        let Some(max_depth) = self.config.max_depth else {
            return;
        };
        if self.undo.len() > max_depth {
            let overflow = self.undo.len() - max_depth;
            self.undo.drain(..overflow);
            debug!(history = %self.id, overflow, "dropped oldest undo entries");
        }
    }

    fn step<C: Canvas + ?Sized>(
        &mut self,
        canvas: &mut C,
        direction: Direction,
    ) -> Result<StepOutcome, HistoryError> {
        self.ensure_attached()?;
        // Queued notifications belong before this step.
        self.pump(canvas);

        if let Some(in_flight) = &self.in_flight {
            debug!(
                history = %self.id,
                requested = %direction,
                running = %in_flight.direction,
                "restore in flight, {} dropped",
                direction
            );
            return Ok(StepOutcome::Busy);
        }

        let Some(target) = self.source_mut(direction).pop() else {
            trace!(history = %self.id, "nothing to {}", direction);
            return Ok(StepOutcome::Empty);
        };

        let current = match canvas.serialize_scene(&self.config.extra_props) {
            Ok(current) => current,
            Err(err) => {
                self.source_mut(direction).push(target);
                warn!(history = %self.id, error = %err, "could not capture scene before {}", direction);
                return Err(err.into());
            }
        };

        let ticket = RestoreTicket::new();
        self.in_flight = Some(InFlight {
            ticket,
            direction,
            started: Instant::now(),
            target: target.clone(),
            displaced: current.clone(),
            prior_state: self.next_state.clone(),
        });

        let status = match canvas.restore_from_snapshot(&target, ticket) {
            Ok(status) => status,
            Err(err) => {
                // Rejected up front: the scene is untouched, so the stacks are too.
                self.in_flight = None;
                self.source_mut(direction).push(target);
                error!(
                    history = %self.id,
                    ticket = %ticket,
                    error = %err,
                    "canvas rejected {} snapshot",
                    direction
                );
                return Err(err.into());
            }
        };

        self.next_state = target;
        self.target_mut(direction).push(current);
        debug!(
            history = %self.id,
            undo = self.undo.len(),
            redo = self.redo.len(),
            "{} restore started",
            direction
        );

        match status {
            RestoreStatus::Complete => {
                // Swallow the notifications the restore itself fired.
                self.drain(canvas);
                self.finish_restore(canvas, ticket, Ok(()));
                Ok(StepOutcome::Restored)
            }
            RestoreStatus::Pending => Ok(StepOutcome::Pending),
        }
    }

    fn finish_restore<C: Canvas + ?Sized>(
        &mut self,
        canvas: &mut C,
        ticket: RestoreTicket,
        outcome: Result<(), CanvasError>,
    ) {
        let in_flight = match self.in_flight.take() {
            Some(in_flight) if in_flight.ticket == ticket => in_flight,
            other => {
                self.in_flight = other;
                self.finish_abandoned(canvas, ticket, outcome);
                return;
            }
        };
        let direction = in_flight.direction;

        match outcome {
            Ok(()) => {
                // The flag stays up until the notification is out.
                self.in_flight = Some(in_flight);
                canvas.rerender();
                canvas.emit(&direction.event());
                self.in_flight = None;
                debug!(history = %self.id, "{} complete", direction);
            }
            Err(err) => {
                error!(
                    history = %self.id,
                    ticket = %ticket,
                    error = %err,
                    "{} restore failed, rolling back",
                    direction
                );
                self.roll_back(in_flight);
            }
        }
    }

    /// Undo the stack transfer of a restore the canvas reported as failed.
    /// The canvas keeps its scene on failure, so history returns to match it.
    fn roll_back(&mut self, in_flight: InFlight) {
        let InFlight {
            direction,
            target,
            displaced,
            prior_state,
            ..
        } = in_flight;

        // clear_history may have run while the restore was pending.
        if self.target_mut(direction).last() == Some(&displaced) {
            self.target_mut(direction).pop();
            self.source_mut(direction).push(target);
        }
        self.next_state = prior_state;
    }

    /// A completion for a restore history no longer waits on. Only a late
    /// success for an abandoned ticket matters: the scene moved, so it is
    /// recorded as an edit.
    fn finish_abandoned<C: Canvas + ?Sized>(
        &mut self,
        canvas: &mut C,
        ticket: RestoreTicket,
        outcome: Result<(), CanvasError>,
    ) {
        if self.abandoned != Some(ticket) {
            trace!(history = %self.id, ticket = %ticket, "ignoring completion for unknown restore");
            return;
        }
        self.abandoned = None;

        if let Err(err) = outcome {
            debug!(
                history = %self.id,
                ticket = %ticket,
                error = %err,
                "abandoned restore failed, scene untouched"
            );
            return;
        }

        warn!(
            history = %self.id,
            ticket = %ticket,
            "abandoned restore landed late, recording scene"
        );
        canvas.rerender();
        if let Err(err) = self.record_mutation(canvas) {
            warn!(history = %self.id, error = %err, "could not record late restore");
        }
    }

    fn expire_stale_restore<C: Canvas + ?Sized>(&mut self, canvas: &mut C) {
        let Some(timeout) = self.config.restore_timeout() else {
            return;
        };
        let expired = match &self.in_flight {
            Some(in_flight) => in_flight.started.elapsed() >= timeout,
            None => false,
        };
        if !expired {
            return;
        }
        let Some(in_flight) = self.in_flight.take() else {
            return;
        };

        let ticket = in_flight.ticket;
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        if canvas.cancel_restore(ticket) {
            warn!(
                history = %self.id,
                ticket = %ticket,
                direction = %in_flight.direction,
                timeout_ms,
                "restore never completed, cancelled and rolled back"
            );
            self.roll_back(in_flight);
        } else {
            warn!(
                history = %self.id,
                ticket = %ticket,
                direction = %in_flight.direction,
                timeout_ms,
                "restore never completed and could not be cancelled, releasing history"
            );
            self.abandoned = Some(ticket);
        }
    }

    fn source_mut(&mut self, direction: Direction) -> &mut Vec<Snapshot> {
        match direction {
            Direction::Undo => &mut self.undo,
            Direction::Redo => &mut self.redo,
        }
    }

    fn target_mut(&mut self, direction: Direction) -> &mut Vec<Snapshot> {
        match direction {
            Direction::Undo => &mut self.redo,
            Direction::Redo => &mut self.undo,
        }
    }
}
