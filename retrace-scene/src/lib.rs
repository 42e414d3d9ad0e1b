//! retrace-scene: an in-memory canvas for driving history end to end.
//!
//! The scene keeps just enough state to produce distinct canonical snapshots:
//! ordered objects with geometry, fill, text and custom properties. Rendering is
//! a counter and history notifications are recorded in a log.

pub mod object;
pub mod scene;

pub use object::{ObjectId, SceneObject, ShapeKind};
pub use scene::{RestoreMode, Scene, SceneDocument, SceneError};
