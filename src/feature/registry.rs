//! The cross-tile feature registry.

use dashmap::{DashMap, DashSet};

use super::{Feature, FeatureId};

/// Mapping from stable feature identity to the feature record, plus the
/// global selected and hovered identity sets.
///
/// All operations are O(1) average. The registry never mutates feature
/// geometry; interaction flags on materialized features mirror set
/// membership so draw passes can partition without set lookups.
#[derive(Debug, Default)]
pub struct FeatureRegistry {
    features: DashMap<FeatureId, Feature>,
    selected: DashSet<FeatureId>,
    hovered: DashSet<FeatureId>,
}

impl FeatureRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a feature; no-op when the id is already registered.
    ///
    /// A newly registered feature inherits current set membership for its
    /// id, so selection applied before the feature materialized sticks.
    pub fn register(&self, mut feature: Feature) {
        let id = feature.id.clone();
        if self.features.contains_key(&id) {
            return;
        }
        feature.selected = self.selected.contains(&id);
        feature.hovered = self.hovered.contains(&id);
        self.features.insert(id, feature);
    }

    /// Remove a feature and its membership in both identity sets.
    pub fn unregister(&self, id: &FeatureId) {
        self.features.remove(id);
        self.selected.remove(id);
        self.hovered.remove(id);
    }

    /// Run a closure over the feature record, if materialized.
    pub fn with_feature<R>(&self, id: &FeatureId, f: impl FnOnce(&Feature) -> R) -> Option<R> {
        self.features.get(id).map(|entry| f(entry.value()))
    }

    /// Run a closure over the mutable feature record, if materialized.
    pub fn with_feature_mut<R>(
        &self,
        id: &FeatureId,
        f: impl FnOnce(&mut Feature) -> R,
    ) -> Option<R> {
        self.features.get_mut(id).map(|mut entry| f(entry.value_mut()))
    }

    /// Whether a feature record exists for the id.
    pub fn contains(&self, id: &FeatureId) -> bool {
        self.features.contains_key(id)
    }

    /// Selection membership for an id.
    pub fn is_selected(&self, id: &FeatureId) -> bool {
        self.selected.contains(id)
    }

    /// Hover membership for an id.
    pub fn is_hovered(&self, id: &FeatureId) -> bool {
        self.hovered.contains(id)
    }

    /// Flip selection membership, mirroring onto the feature when present.
    pub fn mark_selected(&self, id: &FeatureId, selected: bool) {
        if selected {
            self.selected.insert(id.clone());
        } else {
            self.selected.remove(id);
        }
        if let Some(mut feature) = self.features.get_mut(id) {
            feature.selected = selected;
        }
    }

    /// Flip hover membership, mirroring onto the feature when present.
    pub fn mark_hovered(&self, id: &FeatureId, hovered: bool) {
        if hovered {
            self.hovered.insert(id.clone());
        } else {
            self.hovered.remove(id);
        }
        if let Some(mut feature) = self.features.get_mut(id) {
            feature.hovered = hovered;
        }
    }

    /// Snapshot of the selected identity set.
    pub fn selected_ids(&self) -> Vec<FeatureId> {
        self.selected.iter().map(|id| id.clone()).collect()
    }

    /// Snapshot of the hovered identity set.
    pub fn hovered_ids(&self) -> Vec<FeatureId> {
        self.hovered.iter().map(|id| id.clone()).collect()
    }

    /// Snapshot of every registered id.
    pub fn feature_ids(&self) -> Vec<FeatureId> {
        self.features.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of registered features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether no features are registered.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Drop every feature record but keep the selected identity set.
    ///
    /// Used across zoom changes: the layer map rebuilds, but previously
    /// selected ids are reapplied to newly materialized features.
    pub fn clear_features(&self) {
        self.features.clear();
        self.hovered.clear();
    }

    /// Drop everything, including the identity sets.
    pub fn clear(&self) {
        self.features.clear();
        self.selected.clear();
        self.hovered.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvt::GeomType;
    use serde_json::Map;

    fn feature(id: &str) -> Feature {
        Feature::new(id.to_string(), GeomType::Polygon, Map::new())
    }

    #[test]
    fn register_is_idempotent() {
        let registry = FeatureRegistry::new();
        registry.register(feature("a"));
        registry.register(feature("a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registration_inherits_prior_selection() {
        let registry = FeatureRegistry::new();
        registry.mark_selected(&"a".to_string(), true);
        registry.register(feature("a"));
        assert!(registry
            .with_feature(&"a".to_string(), |f| f.selected)
            .unwrap());
    }

    #[test]
    fn unregister_removes_from_both_sets() {
        let registry = FeatureRegistry::new();
        registry.register(feature("a"));
        registry.mark_selected(&"a".to_string(), true);
        registry.mark_hovered(&"a".to_string(), true);

        registry.unregister(&"a".to_string());
        assert!(!registry.contains(&"a".to_string()));
        assert!(!registry.is_selected(&"a".to_string()));
        assert!(!registry.is_hovered(&"a".to_string()));
    }

    #[test]
    fn mark_selected_mirrors_onto_feature() {
        let registry = FeatureRegistry::new();
        registry.register(feature("a"));

        registry.mark_selected(&"a".to_string(), true);
        assert!(registry.is_selected(&"a".to_string()));
        assert!(registry
            .with_feature(&"a".to_string(), |f| f.selected)
            .unwrap());

        registry.mark_selected(&"a".to_string(), false);
        assert!(!registry.is_selected(&"a".to_string()));
        assert!(!registry
            .with_feature(&"a".to_string(), |f| f.selected)
            .unwrap());
    }

    #[test]
    fn select_then_deselect_restores_initial_state() {
        let registry = FeatureRegistry::new();
        registry.register(feature("a"));
        registry.mark_selected(&"a".to_string(), true);
        registry.mark_selected(&"a".to_string(), false);

        assert!(registry.selected_ids().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn clear_features_preserves_selected_ids() {
        let registry = FeatureRegistry::new();
        registry.register(feature("a"));
        registry.mark_selected(&"a".to_string(), true);
        registry.mark_hovered(&"a".to_string(), true);

        registry.clear_features();
        assert!(registry.is_empty());
        assert_eq!(registry.selected_ids(), vec!["a".to_string()]);
        assert!(registry.hovered_ids().is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let registry = FeatureRegistry::new();
        registry.register(feature("a"));
        registry.mark_selected(&"a".to_string(), true);

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.selected_ids().is_empty());
    }

    #[test]
    fn snapshots_are_consistent_sets() {
        let registry = FeatureRegistry::new();
        for id in ["a", "b", "c"] {
            registry.register(feature(id));
        }
        registry.mark_selected(&"a".to_string(), true);
        registry.mark_selected(&"b".to_string(), true);

        let mut selected = registry.selected_ids();
        selected.sort();
        assert_eq!(selected, vec!["a".to_string(), "b".to_string()]);

        let mut all = registry.feature_ids();
        all.sort();
        assert_eq!(all, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }
}
