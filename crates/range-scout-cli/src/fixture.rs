//! JSON descriptions of pickers and recorded page sessions.

use std::collections::BTreeMap;

use range_scout::{InputField, MemoryElement, NavigationKind, RawValue};
use serde::Deserialize;

/// A picker element: `{"attributes": {...}, "properties": {...}, "encapsulated": [...]}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ElementFixture {
    /// Defaults to the configured picker tag.
    pub tag: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub properties: BTreeMap<String, RawValue>,
    pub encapsulated: Option<Vec<InputField>>,
}

impl ElementFixture {
    pub fn build(self, default_tag: &str) -> MemoryElement {
        let mut element = MemoryElement::new(self.tag.as_deref().unwrap_or(default_tag));
        for (name, value) in &self.attributes {
            element = element.with_attribute(name, value);
        }
        for (name, value) in self.properties {
            element = element.with_property(&name, value);
        }
        if let Some(inputs) = self.encapsulated {
            element = element.with_encapsulated(inputs);
        }
        element
    }
}

/// A recorded page: the starting state plus a timeline of actions.
#[derive(Debug, Deserialize)]
pub struct SessionFixture {
    pub path: String,
    /// Path of the enclosing top frame when the picker page is nested.
    #[serde(default)]
    pub top_path: Option<String>,
    /// Picker present before the controller starts.
    #[serde(default)]
    pub picker: Option<ElementFixture>,
    #[serde(default)]
    pub actions: Vec<TimedAction>,
}

#[derive(Debug, Deserialize)]
pub struct TimedAction {
    /// Offset from session start.
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: PageAction,
}

/// Page mutations. Element actions apply to the most recently inserted picker.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PageAction {
    Insert {
        #[serde(default)]
        element: ElementFixture,
    },
    Remove,
    SetAttribute {
        name: String,
        value: String,
    },
    RemoveAttribute {
        name: String,
    },
    SetProperty {
        name: String,
        value: RawValue,
    },
    AttachEncapsulated {
        inputs: Vec<InputField>,
    },
    SetInput {
        index: usize,
        value: String,
        #[serde(default)]
        commit: bool,
    },
    Navigate {
        path: String,
        #[serde(default = "default_navigation")]
        kind: NavigationKind,
    },
    Unload,
}

fn default_navigation() -> NavigationKind {
    NavigationKind::PopState
}
