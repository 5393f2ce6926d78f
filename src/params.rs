//! Merge parameters of a cluster.
//!
//! These structs describe *what* a cluster's output should be, not *how* to
//! compose it. The [`pipeline`](crate::pipeline) turns them into codec calls.
//!
//! ## Types
//!
//! - [`Layer`]: one entry reference plus its blend weight (opacity, 0 to 1).
//! - [`LayerOrder`]: which end of the layer list is composed first.
//! - [`MergeSettings`]: global settings shared by all layers.
//! - [`MergeParameters`]: ordered layers + settings. A value type: two
//!   parameter sets are equal iff layers, weights and settings are equal.

use crate::entries::EntryId;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Weight given to layers of a freshly created cluster.
pub const DEFAULT_WEIGHT: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub entry: EntryId,
    pub weight: f32,
}

/// Composition order of the layer list.
///
/// `BottomUp` composes the first layer first, so the last layer ends up on
/// top. `TopDown` is the reverse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerOrder {
    #[default]
    BottomUp,
    TopDown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeSettings {
    pub order: LayerOrder,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeParameters {
    layers: Vec<Layer>,
    #[serde(default)]
    settings: MergeSettings,
}

/// Reject NaN and anything outside `[0, 1]`.
pub fn validate_weight(weight: f32) -> Result<f32> {
    if (0.0..=1.0).contains(&weight) {
        Ok(weight)
    } else {
        Err(CoreError::Validation(format!(
            "weight {weight} is outside [0, 1]"
        )))
    }
}

impl MergeParameters {
    /// One layer per entry, in the given order, at [`DEFAULT_WEIGHT`].
    pub fn for_members<'a>(entries: impl IntoIterator<Item = &'a EntryId>) -> Self {
        Self {
            layers: entries
                .into_iter()
                .map(|entry| Layer {
                    entry: entry.clone(),
                    weight: DEFAULT_WEIGHT,
                })
                .collect(),
            settings: MergeSettings::default(),
        }
    }

    pub fn new(layers: Vec<Layer>, settings: MergeSettings) -> Self {
        Self { layers, settings }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn settings(&self) -> MergeSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: MergeSettings) {
        self.settings = settings;
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn weights(&self) -> Vec<f32> {
        self.layers.iter().map(|l| l.weight).collect()
    }

    pub fn weight_of(&self, entry: &EntryId) -> Option<f32> {
        self.layers
            .iter()
            .find(|l| &l.entry == entry)
            .map(|l| l.weight)
    }

    /// Layers in the order the compositor must apply them.
    pub fn composition_order(&self) -> Vec<&Layer> {
        match self.settings.order {
            LayerOrder::BottomUp => self.layers.iter().collect(),
            LayerOrder::TopDown => self.layers.iter().rev().collect(),
        }
    }

    pub fn set_weight(&mut self, entry: &EntryId, weight: f32) -> Result<()> {
        let weight = validate_weight(weight)?;
        let layer = self
            .layers
            .iter_mut()
            .find(|l| &l.entry == entry)
            .ok_or_else(|| {
                CoreError::Validation(format!("entry {entry} is not a layer of this cluster"))
            })?;
        layer.weight = weight;
        Ok(())
    }

    /// Reorder layers. `order` must name every current layer exactly once.
    pub fn reorder(&mut self, order: &[EntryId]) -> Result<()> {
        let current: BTreeSet<&EntryId> = self.layers.iter().map(|l| &l.entry).collect();
        let requested: BTreeSet<&EntryId> = order.iter().collect();
        if order.len() != self.layers.len() || requested != current {
            return Err(CoreError::Validation(
                "layer order must list every layer exactly once".into(),
            ));
        }
        let mut reordered = Vec::with_capacity(self.layers.len());
        for entry in order {
            if let Some(pos) = self.layers.iter().position(|l| &l.entry == entry) {
                reordered.push(self.layers.swap_remove(pos));
            }
        }
        self.layers = reordered;
        Ok(())
    }

    /// Copy the weights and settings of `source` onto these layers, position by
    /// position. Returns `None` when the layer counts differ.
    pub fn with_settings_of(&self, source: &MergeParameters) -> Option<MergeParameters> {
        if self.layers.len() != source.layers.len() {
            return None;
        }
        let layers = self
            .layers
            .iter()
            .zip(&source.layers)
            .map(|(own, theirs)| Layer {
                entry: own.entry.clone(),
                weight: theirs.weight,
            })
            .collect();
        Some(MergeParameters {
            layers,
            settings: source.settings,
        })
    }

    /// Check that the layers are exactly `members` and all weights are valid.
    pub fn validate_for(&self, members: &BTreeSet<EntryId>) -> Result<()> {
        for layer in &self.layers {
            validate_weight(layer.weight)?;
        }
        let layer_entries: BTreeSet<&EntryId> = self.layers.iter().map(|l| &l.entry).collect();
        if self.layers.len() != members.len()
            || layer_entries.len() != members.len()
            || !members.iter().all(|m| layer_entries.contains(m))
        {
            return Err(CoreError::Validation(
                "layers must reference each cluster member exactly once".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn remove_layer(&mut self, entry: &EntryId) -> Option<Layer> {
        let pos = self.layers.iter().position(|l| &l.entry == entry)?;
        Some(self.layers.remove(pos))
    }

    pub(crate) fn append_layers(&mut self, layers: impl IntoIterator<Item = Layer>) {
        self.layers.extend(layers);
    }
}
