// Objects placed on the reference scene.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Object identifier, kept across snapshots so restores reproduce identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub Uuid);

impl ObjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Rect,
    Ellipse,
    Line,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub id: ObjectId,
    pub kind: ShapeKind,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
    pub skew_x: f64,
    pub skew_y: f64,
    pub fill: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Custom properties. Only the names listed in the history's extra props
    /// make it into a snapshot.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: BTreeMap<String, Value>,

    /// Selection is UI state, never part of a snapshot.
    #[serde(skip)]
    pub selected: bool,
}

impl SceneObject {
    pub fn new(kind: ShapeKind, left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            id: ObjectId::new(),
            kind,
            left,
            top,
            width,
            height,
            angle: 0.0,
            skew_x: 0.0,
            skew_y: 0.0,
            fill: "#000000".into(),
            text: None,
            props: BTreeMap::new(),
            selected: false,
        }
    }

    pub fn rect(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self::new(ShapeKind::Rect, left, top, width, height)
    }

    pub fn ellipse(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self::new(ShapeKind::Ellipse, left, top, width, height)
    }

    pub fn text(left: f64, top: f64, content: impl Into<String>) -> Self {
        let mut object = Self::new(ShapeKind::Text, left, top, 0.0, 0.0);
        object.text = Some(content.into());
        object
    }

    pub fn with_fill(mut self, fill: impl Into<String>) -> Self {
        self.fill = fill.into();
        self
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }
}
