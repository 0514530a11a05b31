use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Saved windows keyed by object name, in creation order.
pub type WorkspaceTree = IndexMap<String, WindowRecord>;

/// Saved panels keyed by object name, in stacking order.
pub type WidgetTree = IndexMap<String, WidgetRecord>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Geometry {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub objectname: String,
    pub geometry: Geometry,
    pub name: String,
    pub is_fullscreen: bool,
    #[serde(default)]
    pub widgets: WidgetTree,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetRecord {
    pub class: String,
    pub objectname: String,
    pub geometry: Geometry,
    /// Class-specific payload; `null` when the panel has nothing to save
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub children: WidgetTree,
}
