//! retrace-core: shared vocabulary for canvas undo/redo history.
//!
//! Design rules:
//! - A snapshot is opaque. History only stores, moves and compares it.
//! - Equality of snapshots is string equality of the canonical form.
//! - The canvas owns serialization; history never looks inside.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Serialized full-scene state at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(String);

impl Snapshot {
    pub fn new(encoded: impl Into<String>) -> Self {
        Snapshot(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extra per-object property names a snapshot keeps on top of the canvas's
/// standard fields. Ordered so serialization stays canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtraProps(BTreeSet<String>);

impl ExtraProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>) -> Self {
        self.0.insert(name.into());
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ExtraProps {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        ExtraProps(iter.into_iter().map(Into::into).collect())
    }
}

/// Scene mutation notifications a canvas fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationKind {
    ObjectAdded,
    ObjectRemoved,
    ObjectModified,
    ObjectSkewing,
}

impl MutationKind {
    /// The notifications history listens to unless configured otherwise.
    pub const HISTORY: [MutationKind; 4] = [
        MutationKind::ObjectAdded,
        MutationKind::ObjectRemoved,
        MutationKind::ObjectModified,
        MutationKind::ObjectSkewing,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MutationKind::ObjectAdded => "object-added",
            MutationKind::ObjectRemoved => "object-removed",
            MutationKind::ObjectModified => "object-modified",
            MutationKind::ObjectSkewing => "object-skewing",
        }
    }
}

/// Notifications published by history for application code (button state etc).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HistoryEvent {
    /// A state was archived onto the undo stack.
    Append { snapshot: Snapshot },
    Undo,
    Redo,
    Clear,
}

impl HistoryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HistoryEvent::Append { .. } => "history:append",
            HistoryEvent::Undo => "history:undo",
            HistoryEvent::Redo => "history:redo",
            HistoryEvent::Clear => "history:clear",
        }
    }
}

pub mod canvas;

pub use canvas::{
    Canvas, CanvasError, CanvasEvent, RestoreStatus, RestoreTicket, Subscription, SubscriptionId,
};
