//! Typed settings tree shared by every service.
//!
//! The tree mirrors the JSON settings file: `workspace`, `logger` and
//! `broker` at the top level. Services hold a [`SharedSettings`] handle and
//! read the values they need at the moment they need them.

mod broker;
mod store;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::logger::LoggerSettings;
use crate::workspace::WorkspaceTree;

pub use broker::{BrokerSettings, IbSettings, SimulatorSettings};
pub use store::{SettingsError, SettingsStore};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub workspace: WorkspaceTree,
    pub logger: LoggerSettings,
    pub broker: BrokerSettings,
}

pub type SharedSettings = Arc<RwLock<Settings>>;

pub fn shared(settings: Settings) -> SharedSettings {
    Arc::new(RwLock::new(settings))
}

impl Settings {
    pub fn to_value(&self) -> Result<Value, SettingsError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Overlays `value` on the current tree. Nested objects are merged key by
    /// key so omitted keys keep their current values; the workspace tree is
    /// replaced as a whole.
    pub fn update_from_value(&mut self, value: Value) -> Result<(), SettingsError> {
        let Value::Object(mut patch) = value else {
            return Err(SettingsError::Shape("settings root must be an object".into()));
        };
        let mut merged = self.to_value()?;
        if let (Some(workspace), Value::Object(root)) = (patch.remove("workspace"), &mut merged) {
            root.insert("workspace".to_string(), workspace);
        }
        merge(&mut merged, Value::Object(patch));
        *self = serde_json::from_value(merged)?;
        Ok(())
    }
}

fn merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                merge(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, patch) => *base = patch,
    }
}
