//! Data-driven registry loading from JSON.
//!
//! Feature-gated behind `data-loader`. Provides JSON deserialization into
//! [`RegistryBuilder`] for content defined in data files. Cure and setting
//! targets reference materials by name and are resolved in a second phase,
//! so definition order does not matter.

use crate::registry::{CureRule, RegistryBuilder, RegistryError, SettingRule};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("unknown material reference: {0}")]
    UnknownMaterialRef(String),
    #[error("unknown category reference: {0}")]
    UnknownCategoryRef(String),
}

// ---------------------------------------------------------------------------
// JSON data structures
// ---------------------------------------------------------------------------

/// Top-level content data structure for JSON deserialization.
#[derive(Debug, serde::Deserialize)]
pub struct ContentData {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub materials: Vec<MaterialData>,
}

/// JSON representation of a material definition.
#[derive(Debug, serde::Deserialize)]
pub struct MaterialData {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Defaults to 1 (stacks one-high) when omitted.
    #[serde(default)]
    pub stack_limit: Option<u32>,
    #[serde(default)]
    pub cure: Option<ConversionData>,
    #[serde(default)]
    pub setting: Option<ConversionData>,
}

/// JSON representation of a cure or setting rule.
#[derive(Debug, serde::Deserialize)]
pub struct ConversionData {
    /// Target material, referenced by name.
    pub into: String,
    pub duration: u64,
}

// ---------------------------------------------------------------------------
// Loading functions
// ---------------------------------------------------------------------------

/// Load content from a JSON string into a registry builder.
pub fn load_content_json(json: &str) -> Result<RegistryBuilder, DataLoadError> {
    let data: ContentData = serde_json::from_str(json)?;
    build_content(data)
}

/// Load content from JSON bytes.
pub fn load_content_json_bytes(bytes: &[u8]) -> Result<RegistryBuilder, DataLoadError> {
    let data: ContentData = serde_json::from_slice(bytes)?;
    build_content(data)
}

fn build_content(data: ContentData) -> Result<RegistryBuilder, DataLoadError> {
    let mut builder = RegistryBuilder::new();

    // Phase 1: register all categories and materials.
    for category in &data.categories {
        builder.register_category(category);
    }
    for material in &data.materials {
        builder.register_material(&material.name, material.stack_limit.unwrap_or(1));
    }

    // Phase 2: resolve name references now that every material has an id.
    for material in &data.materials {
        let category = match &material.category {
            Some(name) => Some(
                builder
                    .category_id(name)
                    .ok_or_else(|| DataLoadError::UnknownCategoryRef(name.clone()))?,
            ),
            None => None,
        };
        let cure = match &material.cure {
            Some(rule) => Some(CureRule {
                cured: builder
                    .material_id(&rule.into)
                    .ok_or_else(|| DataLoadError::UnknownMaterialRef(rule.into.clone()))?,
                duration: rule.duration,
            }),
            None => None,
        };
        let setting = match &material.setting {
            Some(rule) => Some(SettingRule {
                byproduct: builder
                    .material_id(&rule.into)
                    .ok_or_else(|| DataLoadError::UnknownMaterialRef(rule.into.clone()))?,
                duration: rule.duration,
            }),
            None => None,
        };

        builder.mutate_material(&material.name, |def| {
            def.category = category;
            def.cure = cure;
            def.setting = setting;
        })?;
    }

    Ok(builder)
}

// ===========================================================================
// Tests
// ===========================================================================
