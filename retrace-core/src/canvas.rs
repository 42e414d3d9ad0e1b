//! The canvas collaborator contract.
//!
//! A canvas owns the scene graph. History talks to it only through this trait:
//! - subscribe/unsubscribe to mutation notifications (delivered over a channel)
//! - serialize the whole scene to a [`Snapshot`]
//! - restore the scene from a snapshot, possibly asynchronously
//! - force a redraw and publish history notifications

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc::Receiver;
use uuid::Uuid;

use crate::{ExtraProps, HistoryEvent, MutationKind, Snapshot};

/// Identifies one subscription on one canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlates a restore request with its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RestoreTicket(pub Uuid);

impl RestoreTicket {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RestoreTicket {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RestoreTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Typed payload carried on a subscription channel.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasEvent {
    /// The scene changed. `snapshot` is the scene right after the change,
    /// serialized with the subscriber's extra props.
    Mutation {
        kind: MutationKind,
        snapshot: Result<Snapshot, CanvasError>,
    },
    /// A pending restore finished. Broadcast to every live subscription;
    /// receivers match on the ticket.
    RestoreFinished {
        ticket: RestoreTicket,
        outcome: Result<(), CanvasError>,
    },
}

/// Receiving side of a canvas subscription. The canvas keeps the sender.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: Receiver<CanvasEvent>,
}

/// Whether a restore finished inside the call or will report back later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStatus {
    Complete,
    Pending,
}

pub trait Canvas {
    /// Register for the given notifications. Events arrive in emission order,
    /// each carrying a snapshot taken with `extra` at the moment it fired.
    fn subscribe(&mut self, kinds: &[MutationKind], extra: &ExtraProps) -> Subscription;

    /// Remove exactly the subscription created by the matching `subscribe`.
    /// Returns false if it was already gone.
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;

    /// Canonical, deterministic encoding of the whole scene.
    fn serialize_scene(&self, extra: &ExtraProps) -> Result<Snapshot, CanvasError>;

    /// Replace the live scene with `snapshot`. A `Pending` result promises a
    /// later [`CanvasEvent::RestoreFinished`] carrying `ticket`.
    ///
    /// Failure, whether returned here or reported later, leaves the previous
    /// scene in place.
    fn restore_from_snapshot(
        &mut self,
        snapshot: &Snapshot,
        ticket: RestoreTicket,
    ) -> Result<RestoreStatus, CanvasError>;

    /// Drop a pending restore before it touches the scene. Returns false if
    /// the restore is unknown, already applied, or cannot be stopped; a
    /// `RestoreFinished` may still follow in that case.
    fn cancel_restore(&mut self, ticket: RestoreTicket) -> bool;

    fn rerender(&mut self);

    fn emit(&mut self, event: &HistoryEvent);
}

/// Canvas-level errors. Cloneable so a restore outcome can be broadcast.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CanvasError {
    #[error("scene serialization failed: {reason}")]
    Serialize { reason: String },

    #[error("scene restore failed: {reason}")]
    Restore { reason: String },

    #[error("snapshot is corrupt: {reason}")]
    Corrupt { reason: String },
}
