use std::collections::HashMap;

use super::panel::{BasePanel, ButtonPanel, DataPanel, LabelPanel, Panel};

type Constructor = fn() -> Box<dyn Panel>;

fn boxed<P: Panel + Default + 'static>() -> Box<dyn Panel> {
    Box::new(P::default())
}

/// Closed map from saved class name to panel constructor. Only persistable
/// panel classes are listed.
pub struct PanelRegistry {
    constructors: HashMap<&'static str, Constructor>,
}

impl Default for PanelRegistry {
    fn default() -> Self {
        let mut constructors: HashMap<&'static str, Constructor> = HashMap::new();
        constructors.insert("BaseWidget", boxed::<BasePanel>);
        constructors.insert("CustomLabelWidget", boxed::<LabelPanel>);
        constructors.insert("CustomButtonWidget", boxed::<ButtonPanel>);
        constructors.insert("CustomDataWidget", boxed::<DataPanel>);
        Self { constructors }
    }
}

impl PanelRegistry {
    pub fn create(&self, class: &str) -> Option<Box<dyn Panel>> {
        self.constructors.get(class).map(|make| make())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_classes() {
        let registry = PanelRegistry::default();
        for class in ["BaseWidget", "CustomLabelWidget", "CustomButtonWidget", "CustomDataWidget"] {
            assert_eq!(registry.create(class).unwrap().class_name(), class);
        }
        assert!(registry.create("ConnectionWidget").is_none());
        assert!(registry.create("ChartWidget").is_none());
    }
}
