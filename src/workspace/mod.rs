//! Live window/panel tree and its conversion to and from the saved
//! workspace tree stored in the settings file.

mod panel;
mod records;
mod registry;

use tracing::{debug, info};

pub use panel::{BasePanel, ButtonPanel, ConnectorPanel, DataPanel, LabelPanel, Panel, PanelBase};
pub use records::{Geometry, WidgetRecord, WidgetTree, WindowRecord, WorkspaceTree};
pub use registry::PanelRegistry;

const WINDOW_TYPE: &str = "MainWindow";

pub struct Window {
    pub objectname: String,
    pub name: String,
    pub geometry: Geometry,
    pub is_fullscreen: bool,
    pub panels: Vec<Box<dyn Panel>>,
}

impl Window {
    /// Empty window named with a fresh UUID.
    pub fn new() -> Self {
        Self {
            objectname: uuid::Uuid::new_v4().to_string(),
            name: "Workstation".to_string(),
            geometry: Geometry::new(100, 100, 1280, 800),
            is_fullscreen: false,
            panels: Vec::new(),
        }
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct Workspace {
    windows: Vec<Window>,
    registry: PanelRegistry,
}

impl Workspace {
    pub fn new(registry: PanelRegistry) -> Self {
        Self { windows: Vec::new(), registry }
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn windows_mut(&mut self) -> &mut Vec<Window> {
        &mut self.windows
    }

    pub fn save(&self) -> WorkspaceTree {
        self.windows
            .iter()
            .map(|window| {
                let record = WindowRecord {
                    kind: WINDOW_TYPE.to_string(),
                    objectname: window.objectname.clone(),
                    geometry: window.geometry,
                    name: window.name.clone(),
                    is_fullscreen: window.is_fullscreen,
                    widgets: save_panels(&window.panels),
                };
                (window.objectname.clone(), record)
            })
            .collect()
    }

    /// Replaces the open windows with the ones in `tree`. An empty tree opens
    /// a single default window.
    pub fn restore(&mut self, tree: &WorkspaceTree) {
        self.windows.clear();
        if tree.is_empty() {
            info!("No saved windows, starting with a default window");
            self.windows.push(Window::new());
            return;
        }
        for record in tree.values() {
            let window = Window {
                objectname: record.objectname.clone(),
                name: record.name.clone(),
                geometry: record.geometry,
                is_fullscreen: record.is_fullscreen,
                panels: restore_panels(&self.registry, &record.widgets),
            };
            self.windows.push(window);
        }
        debug!(windows = self.windows.len(), "workspace restored");
    }
}

fn save_panels(panels: &[Box<dyn Panel>]) -> WidgetTree {
    let mut saved = WidgetTree::new();
    for panel in panels {
        let Some(parameters) = panel.save_parameters() else {
            continue;
        };
        let base = panel.base();
        saved.insert(
            base.object_name.clone(),
            WidgetRecord {
                class: panel.class_name().to_string(),
                objectname: base.object_name.clone(),
                geometry: base.geometry,
                parameters,
                children: save_panels(panel.children()),
            },
        );
    }
    saved
}

fn restore_panels(registry: &PanelRegistry, widgets: &WidgetTree) -> Vec<Box<dyn Panel>> {
    let mut panels = Vec::with_capacity(widgets.len());
    for record in widgets.values() {
        let Some(mut panel) = registry.create(&record.class) else {
            debug!(class = %record.class, "skipping unknown panel class");
            continue;
        };
        {
            let base = panel.base_mut();
            base.object_name = record.objectname.clone();
            base.geometry = record.geometry;
        }
        panel.restore_parameters(&record.parameters);
        *panel.children_mut() = restore_panels(registry, &record.children);
        panels.push(panel);
    }
    panels
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn label(name: &str, text: &str, geometry: Geometry) -> Box<dyn Panel> {
        let mut label = LabelPanel::default();
        label.text = text.to_string();
        label.base_mut().object_name = name.to_string();
        label.base_mut().geometry = geometry;
        Box::new(label)
    }

    fn sample_workspace() -> Workspace {
        let mut frame = BasePanel::default();
        frame.base_mut().object_name = "frame".into();
        frame.children_mut().push(label("inner", "SPY", Geometry::new(5, 5, 90, 20)));

        let mut data = DataPanel::default();
        data.base_mut().object_name = "quote".into();
        data.symbol = "AAPL".into();
        data.request_id = Some(3);

        let mut window = Window::new();
        window.objectname = "main".into();
        window.name = "Trading".into();
        window.geometry = Geometry::new(0, 0, 1920, 1080);
        window.is_fullscreen = true;
        window.panels.push(Box::new(frame));
        window.panels.push(Box::new(data));

        let mut workspace = Workspace::default();
        workspace.windows_mut().push(window);
        workspace
    }

    #[test]
    fn test_save_restore_round_trip() {
        let saved = sample_workspace().save();

        let mut restored = Workspace::default();
        restored.restore(&saved);
        assert_eq!(restored.save(), saved);

        let window = &restored.windows()[0];
        assert_eq!(window.geometry, Geometry::new(0, 0, 1920, 1080));
        assert!(window.is_fullscreen);
        let frame = window.panels.iter().find(|p| p.base().object_name == "frame").unwrap();
        assert_eq!(frame.children()[0].base().geometry, Geometry::new(5, 5, 90, 20));
        assert_eq!(saved["main"].widgets["frame"].children["inner"].parameters, json!({"text": "SPY"}));
    }

    #[test]
    fn test_unpersistable_subtree_is_skipped() {
        let mut connector = ConnectorPanel::default();
        connector.base_mut().object_name = "connector".into();
        connector.children_mut().push(label("status", "Connected", Geometry::default()));

        let mut workspace = sample_workspace();
        workspace.windows_mut()[0].panels.push(Box::new(connector));

        let saved = workspace.save();
        let widgets = &saved["main"].widgets;
        assert_eq!(widgets.len(), 2);
        assert!(!widgets.contains_key("connector"));
        assert!(widgets.values().all(|w| !w.children.contains_key("status")));
    }

    #[test]
    fn test_unknown_class_dropped_with_children() {
        let mut saved = sample_workspace().save();
        let frame = saved.get_mut("main").unwrap().widgets.get_mut("frame").unwrap();
        frame.class = "ChartWidget".into();

        let mut restored = Workspace::default();
        restored.restore(&saved);
        let panels = &restored.windows()[0].panels;
        assert_eq!(panels.len(), 1);
        assert_eq!(panels[0].class_name(), "CustomDataWidget");
    }

    #[test]
    fn test_sibling_stacking_order_survives_save_and_reload() {
        let mut window = Window::new();
        window.objectname = "main".into();
        for name in ["zeta", "alpha", "mid"] {
            window.panels.push(label(name, name, Geometry::default()));
        }
        let mut workspace = Workspace::default();
        workspace.windows_mut().push(window);

        let text = serde_json::to_string(&workspace.save()).unwrap();
        let from_file: WorkspaceTree = serde_json::from_str(&text).unwrap();
        let through_value: WorkspaceTree = serde_json::from_value(serde_json::to_value(&from_file).unwrap()).unwrap();

        let mut restored = Workspace::default();
        restored.restore(&through_value);
        let order: Vec<&str> = restored.windows()[0]
            .panels
            .iter()
            .map(|p| p.base().object_name.as_str())
            .collect();
        assert_eq!(order, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_empty_tree_opens_default_window() {
        let mut workspace = Workspace::default();
        workspace.restore(&WorkspaceTree::new());
        assert_eq!(workspace.windows().len(), 1);
        let name = &workspace.windows()[0].objectname;
        assert!(uuid::Uuid::parse_str(name).is_ok());
    }

    #[test]
    fn test_saved_tree_serializes_with_file_keys() {
        let value = serde_json::to_value(sample_workspace().save()).unwrap();
        assert_eq!(value["main"]["type"], "MainWindow");
        assert_eq!(value["main"]["widgets"]["quote"]["class"], "CustomDataWidget");
        assert_eq!(value["main"]["widgets"]["quote"]["parameters"]["request_id"], 3);
    }
}
