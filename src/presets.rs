//! Named, reusable filter configurations.
//!
//! A [`PresetStore`] starts with a handful of built-in strategies and accepts
//! user-defined presets at runtime. Every preset's filters are validated on
//! the way in, so a stored preset always builds a chain.

use crate::filters::{FilterChain, FilterError, RawFilterConfig};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

/// Preset store errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PresetError {
    /// No preset has this id.
    #[error("preset not found: {0}")]
    NotFound(String),

    /// Name missing or blank.
    #[error("preset name is required")]
    MissingName,

    /// The filters do not build a chain.
    #[error(transparent)]
    InvalidFilters(#[from] FilterError),
}

/// A stored filter preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FilterPreset {
    /// Unique id (UUID v4).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Filters in evaluation order.
    pub filters: Vec<RawFilterConfig>,
    /// Labels for grouping.
    pub tags: Vec<String>,
    /// Creation time.
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: DateTime<Utc>,
    /// Times the preset was fetched by id.
    pub usage_count: u64,
}

/// Request body creating a preset.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PresetInput {
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Filters in evaluation order.
    pub filters: Vec<RawFilterConfig>,
    /// Labels for grouping.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Request body modifying a preset. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PresetUpdate {
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// New filters.
    #[serde(default)]
    pub filters: Option<Vec<RawFilterConfig>>,
    /// New labels.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// In-memory preset registry.
#[derive(Debug, Default)]
pub struct PresetStore {
    presets: DashMap<String, FilterPreset>,
}

impl PresetStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            presets: DashMap::new(),
        }
    }

    /// Creates a store holding the built-in presets.
    #[must_use]
    pub fn with_defaults() -> Self {
        let store = Self::new();
        for input in default_presets() {
            let preset = new_preset(input, Utc::now());
            store.presets.insert(preset.id.clone(), preset);
        }
        info!("Loaded {} built-in filter presets", store.len());
        store
    }

    /// Number of presets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.presets.len()
    }

    /// Whether the store holds no presets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Every preset, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<FilterPreset> {
        let mut presets: Vec<FilterPreset> =
            self.presets.iter().map(|entry| entry.value().clone()).collect();
        presets.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        presets
    }

    /// Fetches a preset and counts the use.
    ///
    /// # Errors
    /// Returns [`PresetError::NotFound`] for unknown ids.
    pub fn get(&self, id: &str) -> Result<FilterPreset, PresetError> {
        let mut entry = self
            .presets
            .get_mut(id)
            .ok_or_else(|| PresetError::NotFound(id.to_string()))?;
        entry.usage_count += 1;
        Ok(entry.clone())
    }

    /// Validates and stores a new preset.
    ///
    /// # Errors
    /// Returns [`PresetError::MissingName`] for a blank name and
    /// [`PresetError::InvalidFilters`] when the filters do not build a chain.
    pub fn create(&self, mut input: PresetInput) -> Result<FilterPreset, PresetError> {
        input.name = input.name.trim().to_string();
        if input.name.is_empty() {
            return Err(PresetError::MissingName);
        }
        FilterChain::from_raw(&input.filters)?;

        let preset = new_preset(input, Utc::now());
        self.presets.insert(preset.id.clone(), preset.clone());
        info!("Created filter preset {} ({})", preset.name, preset.id);
        Ok(preset)
    }

    /// Applies a partial update.
    ///
    /// # Errors
    /// Returns [`PresetError::NotFound`] for unknown ids, and the same
    /// validation errors as [`PresetStore::create`].
    pub fn update(&self, id: &str, update: PresetUpdate) -> Result<FilterPreset, PresetError> {
        let name = match update.name {
            Some(name) if name.trim().is_empty() => return Err(PresetError::MissingName),
            Some(name) => Some(name.trim().to_string()),
            None => None,
        };
        if let Some(filters) = &update.filters {
            FilterChain::from_raw(filters)?;
        }

        let mut entry = self
            .presets
            .get_mut(id)
            .ok_or_else(|| PresetError::NotFound(id.to_string()))?;
        if let Some(name) = name {
            entry.name = name;
        }
        if let Some(description) = update.description {
            entry.description = description;
        }
        if let Some(filters) = update.filters {
            entry.filters = filters;
        }
        if let Some(tags) = update.tags {
            entry.tags = tags;
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Removes a preset.
    ///
    /// # Errors
    /// Returns [`PresetError::NotFound`] for unknown ids.
    pub fn delete(&self, id: &str) -> Result<FilterPreset, PresetError> {
        let (_, preset) = self
            .presets
            .remove(id)
            .ok_or_else(|| PresetError::NotFound(id.to_string()))?;
        info!("Deleted filter preset {} ({})", preset.name, preset.id);
        Ok(preset)
    }
}

fn new_preset(input: PresetInput, now: DateTime<Utc>) -> FilterPreset {
    FilterPreset {
        id: Uuid::new_v4().to_string(),
        name: input.name,
        description: input.description,
        filters: input.filters,
        tags: input.tags,
        created_at: now,
        updated_at: now,
        usage_count: 0,
    }
}

fn income_filters(delta: (f64, f64), dte: (u32, u32), oi: u64, volume: u64) -> Vec<RawFilterConfig> {
    vec![
        RawFilterConfig::new("delta", json!({"min": delta.0, "max": delta.1})),
        RawFilterConfig::new("dte", json!({"min": dte.0, "max": dte.1})),
        RawFilterConfig::new("open_interest", json!({"min": oi})),
        RawFilterConfig::new("volume", json!({"min": volume})),
    ]
}

fn preset(name: &str, description: &str, filters: Vec<RawFilterConfig>, tags: &[&str]) -> PresetInput {
    PresetInput {
        name: name.to_string(),
        description: description.to_string(),
        filters,
        tags: tags.iter().map(|t| (*t).to_string()).collect(),
    }
}

fn default_presets() -> Vec<PresetInput> {
    let mut high_probability = income_filters((0.10, 0.20), (30, 45), 500, 100);
    high_probability.push(RawFilterConfig::new("pop", json!({"min": 0.70})));

    vec![
        preset(
            "Conservative",
            "Lower-delta short strikes with a month or two to expiration",
            income_filters((0.25, 0.35), (30, 60), 500, 100),
            &["conservative", "income", "low-risk"],
        ),
        preset(
            "Balanced",
            "Moderate delta and expiration range",
            income_filters((0.20, 0.30), (21, 45), 250, 50),
            &["balanced", "moderate"],
        ),
        preset(
            "Aggressive",
            "Further out-of-the-money strikes on shorter expirations",
            income_filters((0.15, 0.25), (14, 30), 100, 25),
            &["aggressive", "high-risk", "high-reward"],
        ),
        preset(
            "Weekly Income",
            "Weekly expirations on heavily traded contracts",
            income_filters((0.20, 0.30), (5, 10), 1000, 200),
            &["weekly", "income", "short-term"],
        ),
        preset(
            "High Probability",
            "Low-delta spreads with at least 70% estimated probability of profit",
            high_probability,
            &["high-probability", "conservative", "income"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str) -> PresetInput {
        PresetInput {
            name: name.to_string(),
            description: String::new(),
            filters: vec![RawFilterConfig::new("dte", json!({"min": 7, "max": 14}))],
            tags: vec!["custom".to_string()],
        }
    }

    #[test]
    fn test_defaults_are_valid_and_sorted() {
        let store = PresetStore::with_defaults();
        let presets = store.list();
        assert_eq!(presets.len(), 5);
        assert_eq!(presets[0].name, "Aggressive");
        for preset in &presets {
            assert!(FilterChain::from_raw(&preset.filters).is_ok(), "{}", preset.name);
            assert!(Uuid::parse_str(&preset.id).is_ok());
        }
    }

    #[test]
    fn test_create_get_counts_usage() {
        let store = PresetStore::new();
        let created = store.create(input("  Scalps ")).unwrap();
        assert_eq!(created.name, "Scalps");
        assert_eq!(created.usage_count, 0);

        store.get(&created.id).unwrap();
        let fetched = store.get(&created.id).unwrap();
        assert_eq!(fetched.usage_count, 2);
        assert_eq!(store.list()[0].usage_count, 2);
    }

    #[test]
    fn test_create_validates() {
        let store = PresetStore::new();
        assert_eq!(store.create(input("   ")).unwrap_err(), PresetError::MissingName);

        let mut bad = input("Bad");
        bad.filters = vec![RawFilterConfig::new("delta", json!({"min": 0.9, "max": 0.1}))];
        assert!(matches!(
            store.create(bad).unwrap_err(),
            PresetError::InvalidFilters(FilterError::InvalidRange { kind: "delta", .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_partial_update() {
        let store = PresetStore::new();
        let created = store.create(input("Scalps")).unwrap();

        let updated = store
            .update(
                &created.id,
                PresetUpdate {
                    description: Some("short dated".to_string()),
                    ..PresetUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Scalps");
        assert_eq!(updated.description, "short dated");
        assert_eq!(updated.filters, created.filters);
        assert!(updated.updated_at >= created.updated_at);

        let err = store
            .update(
                &created.id,
                PresetUpdate {
                    filters: Some(vec![RawFilterConfig::new("vibes", json!({}))]),
                    ..PresetUpdate::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, PresetError::InvalidFilters(FilterError::UnknownKind(_))));
    }

    #[test]
    fn test_unknown_ids() {
        let store = PresetStore::new();
        assert_eq!(
            store.get("nope").unwrap_err(),
            PresetError::NotFound("nope".to_string())
        );
        assert!(matches!(
            store.update("nope", PresetUpdate::default()),
            Err(PresetError::NotFound(_))
        ));
        assert!(matches!(store.delete("nope"), Err(PresetError::NotFound(_))));
    }

    #[test]
    fn test_delete() {
        let store = PresetStore::new();
        let created = store.create(input("Scalps")).unwrap();
        assert_eq!(store.delete(&created.id).unwrap().id, created.id);
        assert!(store.is_empty());
    }
}
