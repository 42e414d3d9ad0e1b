// In-memory reference scene.
// Implements the canvas contract so history can be driven end to end without a renderer.

use retrace_core::{
    Canvas, CanvasError, CanvasEvent, ExtraProps, HistoryEvent, MutationKind, RestoreStatus,
    RestoreTicket, Snapshot, Subscription, SubscriptionId,
};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{channel, Sender};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::{ObjectId, SceneObject};

/// How `restore_from_snapshot` completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreMode {
    /// Rebuild inside the call.
    #[default]
    Immediate,
    /// Park the load until `resolve_pending` or `fail_pending`, like a load
    /// that waits on images.
    Deferred,
}

/// Canonical serialized form of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    pub width: u32,
    pub height: u32,
    pub background: String,
    pub objects: Vec<SceneObject>,
}

#[derive(Debug)]
struct Subscriber {
    id: SubscriptionId,
    kinds: Vec<MutationKind>,
    extra: ExtraProps,
    sender: Sender<CanvasEvent>,
}

#[derive(Debug)]
struct PendingLoad {
    ticket: RestoreTicket,
    document: SceneDocument,
}

#[derive(Debug)]
pub struct Scene {
    width: u32,
    height: u32,
    background: String,
    objects: Vec<SceneObject>,
    restore_mode: RestoreMode,
    pending: Option<PendingLoad>,
    subscribers: Vec<Subscriber>,
    history_log: Vec<HistoryEvent>,
    render_count: u64,
}

impl Scene {
    pub fn new(width: u32, height: u32, background: impl Into<String>) -> Self {
        let background = background.into();
        info!(
            "Creating new scene of size {}x{} with background {}",
            width, height, background
        );

        Self {
            width,
            height,
            background,
            objects: Vec::new(),
            restore_mode: RestoreMode::Immediate,
            pending: None,
            subscribers: Vec::new(),
            history_log: Vec::new(),
            render_count: 0,
        }
    }

    pub fn with_restore_mode(mut self, mode: RestoreMode) -> Self {
        self.restore_mode = mode;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn background(&self) -> &str {
        &self.background
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    /// History notifications published on this scene, oldest first.
    pub fn history_log(&self) -> &[HistoryEvent] {
        &self.history_log
    }

    pub fn render_count(&self) -> u64 {
        self.render_count
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn has_pending_restore(&self) -> bool {
        self.pending.is_some()
    }

    // Add an object on top of the stack
    pub fn add(&mut self, object: SceneObject) -> ObjectId {
        let id = object.id;
        debug!("Adding {:?} object {}", object.kind, id);
        self.objects.push(object);
        self.notify(MutationKind::ObjectAdded);
        id
    }

    pub fn remove(&mut self, id: ObjectId) -> Result<SceneObject, SceneError> {
        let index = self.index_of(id)?;
        let object = self.objects.remove(index);
        debug!("Removed object {}", id);
        self.notify(MutationKind::ObjectRemoved);
        Ok(object)
    }

    pub fn modify(
        &mut self,
        id: ObjectId,
        f: impl FnOnce(&mut SceneObject),
    ) -> Result<(), SceneError> {
        let index = self.index_of(id)?;
        f(&mut self.objects[index]);
        // The closure must not swap identity out from under us.
        self.objects[index].id = id;
        trace!("Modified object {}", id);
        self.notify(MutationKind::ObjectModified);
        Ok(())
    }

    pub fn skew(&mut self, id: ObjectId, skew_x: f64, skew_y: f64) -> Result<(), SceneError> {
        let index = self.index_of(id)?;
        let object = &mut self.objects[index];
        object.skew_x = skew_x;
        object.skew_y = skew_y;
        trace!("Skewed object {} to ({}, {})", id, skew_x, skew_y);
        self.notify(MutationKind::ObjectSkewing);
        Ok(())
    }

    // Text edits fire no notification; callers record an undo point themselves
    pub fn set_text(&mut self, id: ObjectId, text: impl Into<String>) -> Result<(), SceneError> {
        let index = self.index_of(id)?;
        self.objects[index].text = Some(text.into());
        trace!("Updated text of object {}", id);
        Ok(())
    }

    pub fn set_background(&mut self, background: impl Into<String>) {
        self.background = background.into();
        trace!("Background set to {}", self.background);
    }

    pub fn select(&mut self, id: ObjectId) -> Result<(), SceneError> {
        let index = self.index_of(id)?;
        for object in self.objects.iter_mut() {
            object.selected = false;
        }
        self.objects[index].selected = true;
        Ok(())
    }

    /// Finish a deferred restore. Returns false if none was waiting.
    pub fn resolve_pending(&mut self) -> bool {
        let Some(pending) = self.pending.take() else {
            warn!("No pending restore to resolve");
            return false;
        };
        self.apply(pending.document);
        self.broadcast(CanvasEvent::RestoreFinished {
            ticket: pending.ticket,
            outcome: Ok(()),
        });
        true
    }

    /// Abort a deferred restore, leaving the scene as it was.
    pub fn fail_pending(&mut self, reason: impl Into<String>) -> bool {
        let Some(pending) = self.pending.take() else {
            warn!("No pending restore to fail");
            return false;
        };
        let reason = reason.into();
        warn!(ticket = %pending.ticket, reason = %reason, "scene restore failed");
        self.broadcast(CanvasEvent::RestoreFinished {
            ticket: pending.ticket,
            outcome: Err(CanvasError::Restore { reason }),
        });
        true
    }

    pub fn document(&self, extra: &ExtraProps) -> SceneDocument {
        let objects = self
            .objects
            .iter()
            .map(|object| {
                let mut object = object.clone();
                object.props.retain(|name, _| extra.contains(name));
                object
            })
            .collect();

        SceneDocument {
            width: self.width,
            height: self.height,
            background: self.background.clone(),
            objects,
        }
    }

    fn index_of(&self, id: ObjectId) -> Result<usize, SceneError> {
        self.objects
            .iter()
            .position(|o| o.id == id)
            .ok_or(SceneError::UnknownObject { id })
    }

    fn apply(&mut self, document: SceneDocument) {
        self.width = document.width;
        self.height = document.height;
        self.background = document.background;
        self.objects.clear();
        for object in document.objects {
            self.objects.push(object);
            self.notify(MutationKind::ObjectAdded);
        }
        debug!("Scene rebuilt with {} objects", self.objects.len());
    }

    fn notify(&mut self, kind: MutationKind) {
        // Each subscriber gets the scene as it is right now, in its own projection.
        let events: Vec<Option<CanvasEvent>> = self
            .subscribers
            .iter()
            .map(|subscriber| {
                subscriber.kinds.contains(&kind).then(|| CanvasEvent::Mutation {
                    kind,
                    snapshot: self.serialize_scene(&subscriber.extra),
                })
            })
            .collect();

        // Drop subscribers whose receiver is gone.
        let mut events = events.into_iter();
        self.subscribers
            .retain(|subscriber| match events.next().flatten() {
                Some(event) => subscriber.sender.send(event).is_ok(),
                None => true,
            });
    }

    fn broadcast(&mut self, event: CanvasEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.sender.send(event.clone()).is_ok());
    }
}

impl Default for Scene {
    fn default() -> Self {
        Scene::new(800, 600, "#ffffff")
    }
}

impl Canvas for Scene {
    fn subscribe(&mut self, kinds: &[MutationKind], extra: &ExtraProps) -> Subscription {
        let (sender, events) = channel();
        let id = SubscriptionId::new();
        self.subscribers.push(Subscriber {
            id,
            kinds: kinds.to_vec(),
            extra: extra.clone(),
            sender,
        });
        debug!("Subscription {} registered for {} events", id, kinds.len());
        Subscription { id, events }
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| subscriber.id != id);
        let removed = before != self.subscribers.len();
        debug!("Subscription {} removed: {}", id, removed);
        removed
    }

    fn serialize_scene(&self, extra: &ExtraProps) -> Result<Snapshot, CanvasError> {
        let json = serde_json::to_string(&self.document(extra)).map_err(|err| {
            CanvasError::Serialize {
                reason: err.to_string(),
            }
        })?;
        Ok(Snapshot::new(json))
    }

    fn restore_from_snapshot(
        &mut self,
        snapshot: &Snapshot,
        ticket: RestoreTicket,
    ) -> Result<RestoreStatus, CanvasError> {
        let document: SceneDocument =
            serde_json::from_str(snapshot.as_str()).map_err(|err| CanvasError::Corrupt {
                reason: err.to_string(),
            })?;

        match self.restore_mode {
            RestoreMode::Immediate => {
                self.apply(document);
                Ok(RestoreStatus::Complete)
            }
            RestoreMode::Deferred => {
                if let Some(previous) = self.pending.replace(PendingLoad { ticket, document }) {
                    warn!(ticket = %previous.ticket, "Superseded pending restore");
                }
                trace!("Restore {} parked", ticket);
                Ok(RestoreStatus::Pending)
            }
        }
    }

    fn cancel_restore(&mut self, ticket: RestoreTicket) -> bool {
        match &self.pending {
            Some(pending) if pending.ticket == ticket => {
                self.pending = None;
                debug!("Restore {} cancelled before it was applied", ticket);
                true
            }
            _ => false,
        }
    }

    fn rerender(&mut self) {
        self.render_count += 1;
        trace!("Render #{}", self.render_count);
    }

    fn emit(&mut self, event: &HistoryEvent) {
        debug!("Emitting {}", event.name());
        self.history_log.push(event.clone());
    }
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("unknown object: {id}")]
    UnknownObject { id: ObjectId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_is_deterministic() {
        let mut scene = Scene::default();
        scene.add(SceneObject::rect(0.0, 0.0, 10.0, 10.0).with_fill("#ff0000"));
        scene.add(SceneObject::ellipse(5.0, 5.0, 3.0, 3.0));

        let extra = ExtraProps::new();
        let a = scene.serialize_scene(&extra).unwrap();
        let b = scene.serialize_scene(&extra).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_only_extra_props_are_kept() {
        let mut scene = Scene::default();
        scene.add(
            SceneObject::rect(0.0, 0.0, 1.0, 1.0)
                .with_prop("name", "door")
                .with_prop("cache_key", 42),
        );

        let bare = scene.serialize_scene(&ExtraProps::new()).unwrap();
        assert!(!bare.as_str().contains("door"));
        assert!(!bare.as_str().contains("cache_key"));

        let named = scene
            .serialize_scene(&ExtraProps::new().with("name"))
            .unwrap();
        assert!(named.as_str().contains("door"));
        assert!(!named.as_str().contains("cache_key"));
    }

    #[test]
    fn test_selection_is_not_serialized() {
        let mut scene = Scene::default();
        let id = scene.add(SceneObject::rect(0.0, 0.0, 1.0, 1.0));
        let before = scene.serialize_scene(&ExtraProps::new()).unwrap();
        scene.select(id).unwrap();
        assert_eq!(scene.serialize_scene(&ExtraProps::new()).unwrap(), before);
    }

    #[test]
    fn test_restore_rebuilds_scene() {
        let mut scene = Scene::default();
        let id = scene.add(SceneObject::text(1.0, 2.0, "hello"));
        let snapshot = scene.serialize_scene(&ExtraProps::new()).unwrap();

        scene.remove(id).unwrap();
        scene.set_background("#000000");
        let status = scene
            .restore_from_snapshot(&snapshot, RestoreTicket::new())
            .unwrap();

        assert_eq!(status, RestoreStatus::Complete);
        assert_eq!(scene.background(), "#ffffff");
        assert_eq!(scene.object(id).unwrap().text.as_deref(), Some("hello"));
    }

    #[test]
    fn test_corrupt_snapshot_rejected() {
        let mut scene = Scene::default();
        let err = scene
            .restore_from_snapshot(&Snapshot::new("{not json"), RestoreTicket::new())
            .unwrap_err();
        assert!(matches!(err, CanvasError::Corrupt { .. }));
    }

    #[test]
    fn test_notifications_follow_subscription() {
        let mut scene = Scene::default();
        let subscription = scene.subscribe(&[MutationKind::ObjectRemoved], &ExtraProps::new());

        let id = scene.add(SceneObject::rect(0.0, 0.0, 1.0, 1.0));
        assert!(subscription.events.try_recv().is_err());

        scene.remove(id).unwrap();
        assert_eq!(
            subscription.events.try_recv().unwrap(),
            CanvasEvent::Mutation {
                kind: MutationKind::ObjectRemoved,
                snapshot: scene.serialize_scene(&ExtraProps::new()),
            }
        );

        assert!(scene.unsubscribe(subscription.id));
        assert!(!scene.unsubscribe(subscription.id));
        assert_eq!(scene.subscriber_count(), 0);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let mut scene = Scene::default();
        let subscription = scene.subscribe(&MutationKind::HISTORY, &ExtraProps::new());
        drop(subscription);
        scene.add(SceneObject::rect(0.0, 0.0, 1.0, 1.0));
        assert_eq!(scene.subscriber_count(), 0);
    }

    #[test]
    fn test_unknown_object() {
        let mut scene = Scene::default();
        let err = scene.skew(ObjectId::new(), 1.0, 0.0).unwrap_err();
        assert!(matches!(err, SceneError::UnknownObject { .. }));
    }

    #[test]
    fn test_notification_carries_scene_at_emit_time() {
        let mut scene = Scene::default();
        let extra = ExtraProps::new().with("name");
        let subscription = scene.subscribe(&MutationKind::HISTORY, &extra);

        scene.add(SceneObject::rect(0.0, 0.0, 1.0, 1.0).with_prop("name", "first"));
        let after_first = scene.serialize_scene(&extra).unwrap();
        scene.add(SceneObject::rect(2.0, 2.0, 1.0, 1.0));

        let CanvasEvent::Mutation { snapshot, .. } = subscription.events.try_recv().unwrap() else {
            panic!("expected a mutation");
        };
        let snapshot = snapshot.unwrap();
        assert_eq!(snapshot, after_first);
        assert!(snapshot.as_str().contains("first"));

        let CanvasEvent::Mutation { snapshot, .. } = subscription.events.try_recv().unwrap() else {
            panic!("expected a mutation");
        };
        assert_eq!(snapshot.unwrap(), scene.serialize_scene(&extra).unwrap());
    }

    #[test]
    fn test_pending_restore_can_be_cancelled() {
        let mut scene = Scene::default().with_restore_mode(RestoreMode::Deferred);
        let snapshot = scene.serialize_scene(&ExtraProps::new()).unwrap();
        scene.add(SceneObject::rect(0.0, 0.0, 1.0, 1.0));

        let ticket = RestoreTicket::new();
        scene.restore_from_snapshot(&snapshot, ticket).unwrap();
        assert!(!scene.cancel_restore(RestoreTicket::new()));
        assert!(scene.cancel_restore(ticket));
        assert!(!scene.cancel_restore(ticket));

        assert!(!scene.has_pending_restore());
        assert!(!scene.resolve_pending());
        assert_eq!(scene.objects().len(), 1);
    }
}
