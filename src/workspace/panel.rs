use serde_json::{json, Value};

use crate::broker::RequestId;

use super::records::Geometry;

/// State every panel carries regardless of its class.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelBase {
    pub object_name: String,
    pub geometry: Geometry,
}

impl PanelBase {
    fn new(width: i32, height: i32) -> Self {
        Self {
            object_name: uuid::Uuid::new_v4().to_string(),
            geometry: Geometry::new(50, 50, width, height),
        }
    }
}

/// A node of the live window tree.
///
/// `save_parameters` returning `None` marks the panel as not persistable:
/// the save walk skips it together with everything below it.
pub trait Panel: Send {
    /// Class name written to and matched against the saved tree.
    fn class_name(&self) -> &'static str;

    fn base(&self) -> &PanelBase;

    fn base_mut(&mut self) -> &mut PanelBase;

    fn children(&self) -> &[Box<dyn Panel>];

    fn children_mut(&mut self) -> &mut Vec<Box<dyn Panel>>;

    fn save_parameters(&self) -> Option<Value>;

    fn restore_parameters(&mut self, params: &Value);
}

fn string_param(params: &Value, key: &str) -> Option<String> {
    params.get(key).and_then(Value::as_str).map(str::to_string)
}

macro_rules! panel_plumbing {
    () => {
        fn base(&self) -> &PanelBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut PanelBase {
            &mut self.base
        }

        fn children(&self) -> &[Box<dyn Panel>] {
            &self.children
        }

        fn children_mut(&mut self) -> &mut Vec<Box<dyn Panel>> {
            &mut self.children
        }
    };
}

/// Plain container frame.
pub struct BasePanel {
    base: PanelBase,
    children: Vec<Box<dyn Panel>>,
}

impl Default for BasePanel {
    fn default() -> Self {
        Self { base: PanelBase::new(150, 300), children: Vec::new() }
    }
}

impl Panel for BasePanel {
    fn class_name(&self) -> &'static str {
        "BaseWidget"
    }

    panel_plumbing!();

    fn save_parameters(&self) -> Option<Value> {
        Some(json!({}))
    }

    fn restore_parameters(&mut self, _params: &Value) {}
}

pub struct LabelPanel {
    base: PanelBase,
    children: Vec<Box<dyn Panel>>,
    pub text: String,
}

impl LabelPanel {
    pub const DEFAULT_TEXT: &'static str = "Custom Label Widget";
}

impl Default for LabelPanel {
    fn default() -> Self {
        Self {
            base: PanelBase::new(150, 300),
            children: Vec::new(),
            text: Self::DEFAULT_TEXT.to_string(),
        }
    }
}

impl Panel for LabelPanel {
    fn class_name(&self) -> &'static str {
        "CustomLabelWidget"
    }

    panel_plumbing!();

    fn save_parameters(&self) -> Option<Value> {
        Some(json!({ "text": self.text }))
    }

    fn restore_parameters(&mut self, params: &Value) {
        self.text = string_param(params, "text").unwrap_or_else(|| Self::DEFAULT_TEXT.to_string());
    }
}

pub struct ButtonPanel {
    base: PanelBase,
    children: Vec<Box<dyn Panel>>,
    pub title: String,
    pub description: String,
}

impl Default for ButtonPanel {
    fn default() -> Self {
        Self {
            base: PanelBase::new(150, 300),
            children: Vec::new(),
            title: "Title".to_string(),
            description: "Description".to_string(),
        }
    }
}

impl Panel for ButtonPanel {
    fn class_name(&self) -> &'static str {
        "CustomButtonWidget"
    }

    panel_plumbing!();

    fn save_parameters(&self) -> Option<Value> {
        Some(json!({ "title": self.title, "description": self.description }))
    }

    fn restore_parameters(&mut self, params: &Value) {
        if let Some(title) = string_param(params, "title") {
            self.title = title;
        }
        if let Some(description) = string_param(params, "description") {
            self.description = description;
        }
    }
}

/// Shows the live quote of one symbol, fed by a market data subscription.
pub struct DataPanel {
    base: PanelBase,
    children: Vec<Box<dyn Panel>>,
    pub symbol: String,
    pub request_id: Option<RequestId>,
}

impl Default for DataPanel {
    fn default() -> Self {
        Self {
            base: PanelBase::new(200, 120),
            children: Vec::new(),
            symbol: String::new(),
            request_id: None,
        }
    }
}

impl Panel for DataPanel {
    fn class_name(&self) -> &'static str {
        "CustomDataWidget"
    }

    panel_plumbing!();

    fn save_parameters(&self) -> Option<Value> {
        Some(json!({ "symbol": self.symbol, "request_id": self.request_id }))
    }

    fn restore_parameters(&mut self, params: &Value) {
        self.symbol = string_param(params, "symbol").unwrap_or_default();
        self.request_id = params
            .get("request_id")
            .and_then(Value::as_i64)
            .and_then(|id| RequestId::try_from(id).ok());
    }
}

/// Broker connection status strip. Rebuilt on every start, never saved.
pub struct ConnectorPanel {
    base: PanelBase,
    children: Vec<Box<dyn Panel>>,
}

impl Default for ConnectorPanel {
    fn default() -> Self {
        Self { base: PanelBase::new(240, 40), children: Vec::new() }
    }
}

impl Panel for ConnectorPanel {
    fn class_name(&self) -> &'static str {
        "ConnectionWidget"
    }

    panel_plumbing!();

    fn save_parameters(&self) -> Option<Value> {
        None
    }

    fn restore_parameters(&mut self, _params: &Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_falls_back_to_default_text() {
        let mut label = LabelPanel::default();
        label.restore_parameters(&json!({"text": "SPY"}));
        assert_eq!(label.text, "SPY");
        label.restore_parameters(&Value::Null);
        assert_eq!(label.text, LabelPanel::DEFAULT_TEXT);
    }

    #[test]
    fn test_button_keeps_fields_missing_from_params() {
        let mut button = ButtonPanel::default();
        button.restore_parameters(&json!({"title": "Buy"}));
        assert_eq!(button.title, "Buy");
        assert_eq!(button.description, "Description");
    }

    #[test]
    fn test_data_panel_parameters() {
        let mut panel = DataPanel::default();
        panel.restore_parameters(&json!({"symbol": "AAPL", "request_id": 12}));
        assert_eq!(panel.symbol, "AAPL");
        assert_eq!(panel.request_id, Some(12));
        assert_eq!(panel.save_parameters(), Some(json!({"symbol": "AAPL", "request_id": 12})));
    }

    #[test]
    fn test_connector_is_not_persistable() {
        assert!(ConnectorPanel::default().save_parameters().is_none());
        assert_eq!(BasePanel::default().save_parameters(), Some(json!({})));
    }
}
