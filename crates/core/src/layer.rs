//! Annotation layers
//!
//! Layers group annotations by name. Visibility and lock are independent: a
//! locked layer can still be shown, and a hidden layer can still be edited
//! programmatically. Filtering never touches the store.

use crate::annotation::{Annotation, DEFAULT_LAYER};
use std::collections::BTreeSet;

/// A named annotation layer
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Layer {
    pub name: String,
    pub visible: bool,
    pub locked: bool,
}

impl Layer {
    /// A visible, unlocked layer
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            locked: false,
        }
    }
}

/// Project annotations down to those on visible layers
///
/// With no explicit visible set every layer is visible.
pub fn visible<'a>(
    annotations: &'a [Annotation],
    visible_layer_names: Option<&BTreeSet<String>>,
) -> Vec<&'a Annotation> {
    match visible_layer_names {
        None => annotations.iter().collect(),
        Some(names) => annotations
            .iter()
            .filter(|a| names.contains(a.layer()))
            .collect(),
    }
}

/// Ordered set of layers for one session
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRegistry {
    layers: Vec<Layer>,
}

impl Default for LayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerRegistry {
    /// Registry containing only the default layer
    pub fn new() -> Self {
        Self {
            layers: vec![Layer::new(DEFAULT_LAYER)],
        }
    }

    /// All layers in creation order
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn get(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Register a layer if it does not exist yet
    pub fn ensure(&mut self, name: &str) -> &mut Layer {
        let index = match self.layers.iter().position(|l| l.name == name) {
            Some(index) => index,
            None => {
                self.layers.push(Layer::new(name));
                self.layers.len() - 1
            }
        };
        &mut self.layers[index]
    }

    /// Show or hide a layer, registering it if needed
    pub fn set_visible(&mut self, name: &str, visible: bool) {
        self.ensure(name).visible = visible;
    }

    /// Lock or unlock a layer, registering it if needed
    pub fn set_locked(&mut self, name: &str, locked: bool) {
        self.ensure(name).locked = locked;
    }

    /// Unknown layers are unlocked
    pub fn is_locked(&self, name: &str) -> bool {
        self.get(name).is_some_and(|l| l.locked)
    }

    /// Whether [`filter`](Self::filter) keeps annotations on this layer
    ///
    /// Unknown layers are visible only while no layer is hidden, matching
    /// [`visible`] with [`visible_layer_names`](Self::visible_layer_names).
    pub fn is_visible(&self, name: &str) -> bool {
        match self.get(name) {
            Some(layer) => layer.visible,
            None => self.layers.iter().all(|l| l.visible),
        }
    }

    /// Names of visible layers, or `None` while nothing is hidden
    pub fn visible_layer_names(&self) -> Option<BTreeSet<String>> {
        if self.layers.iter().all(|l| l.visible) {
            return None;
        }
        Some(
            self.layers
                .iter()
                .filter(|l| l.visible)
                .map(|l| l.name.clone())
                .collect(),
        )
    }

    /// Annotations that should be rendered
    pub fn filter<'a>(&self, annotations: &'a [Annotation]) -> Vec<&'a Annotation> {
        visible(annotations, self.visible_layer_names().as_ref())
    }
}
